//! Thin OS helpers: liveness, termination, niceness and process naming.

use std::io;

/// Whether `pid` names a live (or not yet reaped) process.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // EPERM: the process exists but belongs to someone else.
    matches!(kill(nix::unistd::Pid::from_raw(raw), None::<Signal>), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
pub fn is_alive(_pid: u32) -> bool {
    false
}

/// Ask `pid` to terminate gracefully.
#[cfg(unix)]
pub fn terminate(pid: u32) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};

    let raw = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    kill(nix::unistd::Pid::from_raw(raw), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "signals are not supported on this platform",
    ))
}

/// Set the niceness of the whole current process.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn set_process_niceness(niceness: i32) -> io::Result<()> {
    // SAFETY: setpriority only reads its integer arguments; who = 0 is the caller.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, niceness) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn set_process_niceness(_niceness: i32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "niceness is not supported on this platform",
    ))
}

/// Set the niceness of the calling thread only.
///
/// Linux schedules threads individually, so `setpriority` on the thread id
/// affects just this thread.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
pub fn set_thread_niceness(niceness: i32) -> io::Result<()> {
    // SAFETY: gettid has no preconditions; setpriority only reads its integer arguments.
    let rc = unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, niceness)
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_thread_niceness(_niceness: i32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "per-thread niceness is only supported on Linux",
    ))
}

/// Rename the current process as shown by `ps -o comm` and `top`.
///
/// The kernel keeps at most 15 bytes; longer names are truncated.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
pub fn set_process_title(name: &str) -> io::Result<()> {
    let mut bytes: Vec<u8> = name.bytes().filter(|b| *b != 0).take(15).collect();
    bytes.push(0);
    // SAFETY: `bytes` is NUL terminated and outlives the call.
    let rc = unsafe { libc::prctl(libc::PR_SET_NAME, bytes.as_ptr() as libc::c_ulong, 0, 0, 0) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_process_title(_name: &str) -> io::Result<()> {
    Ok(())
}

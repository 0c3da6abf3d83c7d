//! End-to-end tests for isolated processes, using the `offshoot` binary as
//! the child program.

#![cfg(unix)]

use std::time::Duration;

use offshoot::process::{is_alive, HandleKind};
use offshoot::{Job, JobCatalog, OptionOverrides, Outcome, SpawnError, Spawner, Strategy, Work};
use serde_json::json;

fn spawner() -> Spawner {
    let spawner = Spawner::builder()
        .catalog(JobCatalog::with_builtins())
        .child_program(env!("CARGO_BIN_EXE_offshoot"))
        .build();
    spawner.catalog().install_fan_out(spawner.clone());
    spawner
}

fn isolated() -> OptionOverrides {
    OptionOverrides::new().strategy(Strategy::IsolatedProcess)
}

fn sleep_ms(ms: u64) -> Job {
    Job::new("sleep").payload(json!({ "ms": ms }))
}

#[tokio::test]
async fn test_child_is_alive_until_waited() {
    let spawner = spawner();
    let handle = spawner.spawn(&isolated(), sleep_ms(300)).unwrap();

    assert_eq!(handle.kind(), HandleKind::Process);
    let pid = handle.pid().unwrap();
    assert!(is_alive(pid));
    assert!(spawner.children().is_empty());

    assert_eq!(spawner.wait(&[handle]).await, vec![Outcome::Succeeded]);
    assert!(!is_alive(pid));
}

#[tokio::test]
async fn test_kill_on_exit_children_are_swept() {
    let spawner = spawner();
    let overrides = isolated().kill_on_exit(true);
    let handles: Vec<_> = (0..3)
        .map(|_| spawner.spawn(&overrides, sleep_ms(30_000)).unwrap())
        .collect();
    assert_eq!(spawner.children().len(), 3);

    let report = spawner.shutdown_hook().fire();

    assert_eq!(report.signalled.len(), 3);
    assert!(spawner.children().is_empty());
    let outcomes = tokio::time::timeout(Duration::from_secs(10), spawner.wait(&handles))
        .await
        .unwrap();
    assert_eq!(outcomes, vec![Outcome::Signalled(libc::SIGTERM); 3]);
}

#[tokio::test]
async fn test_guard_sweeps_on_drop() {
    let spawner = spawner();
    let handle = spawner
        .spawn(&isolated().kill_on_exit(true), sleep_ms(30_000))
        .unwrap();

    drop(spawner.install_shutdown_hook());

    assert_eq!(spawner.wait(&[handle]).await, vec![Outcome::Signalled(libc::SIGTERM)]);
}

#[tokio::test]
async fn test_dead_children_are_pruned_on_next_launch() {
    let spawner = spawner();
    let overrides = isolated().kill_on_exit(true);
    let first = spawner.spawn(&overrides, sleep_ms(10)).unwrap();
    let first_pid = first.pid().unwrap();
    spawner.wait(&[first]).await;

    let second = spawner.spawn(&overrides, sleep_ms(10)).unwrap();

    assert!(!spawner.children().contains(first_pid));
    assert!(spawner.children().contains(second.pid().unwrap()));
    spawner.wait(&[second]).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_child_reaped_elsewhere_still_settles() {
    use nix::sys::wait::waitpid;
    use nix::unistd::Pid;

    let spawner = spawner();
    let handle = spawner.spawn(&isolated(), sleep_ms(200)).unwrap();
    let pid = Pid::from_raw(i32::try_from(handle.pid().unwrap()).unwrap());

    // Whoever gets there first, waiting must not fail.
    let _ = tokio::task::spawn_blocking(move || waitpid(pid, None)).await.unwrap();

    let outcomes = tokio::time::timeout(Duration::from_secs(10), spawner.wait(&[handle]))
        .await
        .unwrap();
    assert!(matches!(outcomes[0], Outcome::Reaped | Outcome::Succeeded));
}

#[tokio::test]
async fn test_failing_child_exits_nonzero() {
    let spawner = spawner();
    let fail = spawner.spawn(&isolated(), Job::new("fail")).unwrap();
    let panic = spawner.spawn(&isolated(), Job::new("panic")).unwrap();

    assert_eq!(
        spawner.wait(&[fail, panic]).await,
        vec![Outcome::Exited(1), Outcome::Exited(1)]
    );
}

#[tokio::test]
async fn test_fan_out_inside_child() {
    let spawner = spawner();
    let handle = spawner
        .spawn(&isolated(), Job::new("fan-out").payload(json!({ "count": 2, "ms": 50 })))
        .unwrap();

    assert_eq!(spawner.wait(&[handle]).await, vec![Outcome::Succeeded]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fan_out_from_concurrent_task() {
    let spawner = spawner();
    let handle = spawner
        .spawn(
            &OptionOverrides::new().strategy(Strategy::ConcurrentTask),
            Job::new("fan-out").payload(json!({ "count": 2, "ms": 50 })),
        )
        .unwrap();

    assert_eq!(spawner.wait(&[handle]).await, vec![Outcome::Succeeded]);
}

#[tokio::test]
async fn test_rejected_before_launch() {
    let spawner = spawner();

    let closure = spawner.spawn(&isolated(), Work::closure(|| Ok(())));
    assert!(matches!(closure, Err(SpawnError::NotTransferable(_))));

    let unknown = spawner.spawn(&isolated(), Job::new("missing"));
    assert!(matches!(unknown, Err(SpawnError::UnknownJob(_))));
}

#[tokio::test]
async fn test_missing_child_program() {
    let spawner = Spawner::builder()
        .catalog(JobCatalog::with_builtins())
        .child_program("/nonexistent/offshoot-child")
        .build();

    let err = spawner.spawn(&isolated(), sleep_ms(1)).unwrap_err();

    assert!(matches!(err, SpawnError::Process { .. }));
    assert!(spawner.children().is_empty());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_display_name_becomes_process_title() {
    let spawner = spawner();
    let handle = spawner
        .spawn(&isolated().display_name("offshoot-probe"), sleep_ms(2_000))
        .unwrap();
    let comm = format!("/proc/{}/comm", handle.pid().unwrap());

    let mut title = String::new();
    for _ in 0..100 {
        title = std::fs::read_to_string(&comm).unwrap_or_default();
        if title.trim() == "offshoot-probe" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(title.trim(), "offshoot-probe");
    spawner.wait(&[handle]).await;
}

/// Pids whose parent is `pid`.
#[cfg(target_os = "linux")]
fn children_of(pid: u32) -> Vec<u32> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir("/proc").unwrap().flatten() {
        let Ok(candidate) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{candidate}/stat")) else {
            continue;
        };
        // Fields after the parenthesised command: state, ppid, ...
        let Some((_, rest)) = stat.rsplit_once(')') else {
            continue;
        };
        let ppid = rest.split_whitespace().nth(1).and_then(|p| p.parse::<u32>().ok());
        if ppid == Some(pid) {
            found.push(candidate);
        }
    }
    found
}

/// Gone or a zombie nobody has reaped yet.
#[cfg(target_os = "linux")]
fn has_exited(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with(|state| state == 'Z' || state == 'X')),
        Err(_) => true,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_swept_child_sweeps_its_own_children() {
    let spawner = spawner();
    let handle = spawner
        .spawn(
            &isolated().kill_on_exit(true),
            Job::new("fan-out").payload(json!({ "count": 2, "ms": 30_000 })),
        )
        .unwrap();
    let child = handle.pid().unwrap();

    let mut grandchildren = Vec::new();
    for _ in 0..250 {
        grandchildren = children_of(child);
        if grandchildren.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(grandchildren.len(), 2, "fan-out never launched its sleeps");
    // Let the child record the second pid before it is told to stop.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(spawner.shutdown_hook().fire().signalled, vec![child]);
    let outcomes = tokio::time::timeout(Duration::from_secs(10), spawner.wait(&[handle]))
        .await
        .unwrap();
    assert_eq!(outcomes, vec![Outcome::Signalled(libc::SIGTERM)]);

    for _ in 0..250 {
        if grandchildren.iter().all(|pid| has_exited(*pid)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let survivors: Vec<_> = grandchildren.into_iter().filter(|pid| !has_exited(*pid)).collect();
    assert!(survivors.is_empty(), "outlived their parent: {survivors:?}");
}

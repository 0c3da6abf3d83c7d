//! The boundary every unit of work runs behind.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

use crate::jobs::Runnable;

use super::Outcome;

thread_local! {
    static GUARDED: Cell<bool> = const { Cell::new(false) };
}

/// Whether this thread is running work inside [`run_guarded`].
///
/// The panic hook uses it to leave reporting of contained panics to the
/// guard.
pub fn in_guarded_work() -> bool {
    GUARDED.with(Cell::get)
}

/// Run `work`, turning errors and panics into a logged [`Outcome::Failed`].
pub(crate) fn run_guarded(label: &str, work: Runnable) -> Outcome {
    let outer = GUARDED.with(|guarded| guarded.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(work));
    GUARDED.with(|guarded| guarded.set(outer));

    match result {
        Ok(Ok(())) => Outcome::Succeeded,
        Ok(Err(e)) => {
            error!(
                pid = std::process::id(),
                work = label,
                error = %format!("{e:#}"),
                "work failed"
            );
            Outcome::Failed
        }
        Err(payload) => {
            error!(
                pid = std::process::id(),
                work = label,
                panic = %panic_message(payload.as_ref()),
                "work panicked"
            );
            Outcome::Failed
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_work_succeeds() {
        assert_eq!(run_guarded("ok", Box::new(|| -> anyhow::Result<()> { Ok(()) })), Outcome::Succeeded);
    }

    #[test]
    fn test_error_is_contained() {
        let outcome = run_guarded("bad", Box::new(|| -> anyhow::Result<()> { anyhow::bail!("nope") }));
        assert_eq!(outcome, Outcome::Failed);
    }

    #[test]
    fn test_panic_is_contained() {
        let outcome = run_guarded("boom", Box::new(|| -> anyhow::Result<()> { panic!("kaboom") }));
        assert_eq!(outcome, Outcome::Failed);
    }

    #[test]
    fn test_guarded_flag_covers_only_the_work() {
        assert!(!in_guarded_work());
        let outcome = run_guarded(
            "outer",
            Box::new(|| -> anyhow::Result<()> {
                anyhow::ensure!(in_guarded_work(), "flag not set");
                run_guarded("inner", Box::new(|| -> anyhow::Result<()> { panic!("inner") }));
                anyhow::ensure!(in_guarded_work(), "inner guard cleared the flag");
                Ok(())
            }),
        );
        assert_eq!(outcome, Outcome::Succeeded);
        assert!(!in_guarded_work());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}

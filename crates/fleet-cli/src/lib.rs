//! Fleet CLI library.
//!
//! A thin consumer of `fleet-store`: each invocation performs at most one
//! lock cycle against the state directory and exits.

pub mod cli;
pub mod commands;

use fleet_store::StoreError;

/// Exit status for a busy document (`EX_TEMPFAIL`); scripts may retry.
pub const EXIT_BUSY: i32 = 75;

/// Maps a command error to a process exit status.
pub fn exit_code(err: &(dyn std::error::Error + 'static)) -> i32 {
    match err.downcast_ref::<StoreError>() {
        Some(store_err) if store_err.is_retryable() => EXIT_BUSY,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_exit_code_for_contention() {
        let err: Box<dyn std::error::Error> = Box::new(StoreError::LockContention {
            path: PathBuf::from("tasks.json.lock"),
            owner: "alex".into(),
            age: Duration::from_secs(1),
        });
        assert_eq!(exit_code(err.as_ref()), EXIT_BUSY);
    }

    #[test]
    fn test_exit_code_for_other_errors() {
        let err: Box<dyn std::error::Error> = Box::new(StoreError::InvalidName("..".into()));
        assert_eq!(exit_code(err.as_ref()), 1);

        let err: Box<dyn std::error::Error> = "plain message".into();
        assert_eq!(exit_code(err.as_ref()), 1);
    }
}

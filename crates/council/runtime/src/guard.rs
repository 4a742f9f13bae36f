//! Re-entrancy guard
//!
//! Execution of a winning batch runs external code that may call back into
//! the engine that dispatched it. Every mutating entry point holds a
//! [`GuardToken`] for its whole duration:
//! - callers on other threads wait for the token, so mutations are totally
//!   ordered;
//! - a nested entry from the thread already holding it fails with
//!   [`GovernanceError::Reentrant`].
//!
//! The busy flag clears when the token drops, on success and error paths
//! alike.

use council_types::{GovernanceError, GovernanceResult};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::Cell;

#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    lock: ReentrantMutex<Cell<bool>>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> GovernanceResult<GuardToken<'_>> {
        let held = self.lock.lock();
        if held.get() {
            return Err(GovernanceError::Reentrant);
        }
        held.set(true);
        Ok(GuardToken { held })
    }

    /// True while any thread holds a token
    #[cfg(test)]
    fn is_busy(&self) -> bool {
        self.lock.try_lock().map_or(true, |held| held.get())
    }
}

/// Held while a mutating call is in progress
pub struct GuardToken<'a> {
    held: ReentrantMutexGuard<'a, Cell<bool>>,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.held.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_nested_entry_rejected() {
        let guard = ReentrancyGuard::new();
        let token = guard.enter().unwrap();
        assert!(guard.is_busy());
        assert_eq!(guard.enter().err(), Some(GovernanceError::Reentrant));
        drop(token);
        assert!(!guard.is_busy());
        assert!(guard.enter().is_ok());
    }

    #[test]
    fn test_released_on_error_path() {
        fn failing(guard: &ReentrancyGuard) -> GovernanceResult<()> {
            let _token = guard.enter()?;
            Err(GovernanceError::CannotVouchForSelf)
        }

        let guard = ReentrancyGuard::new();
        assert!(failing(&guard).is_err());
        assert!(!guard.is_busy());
    }

    #[test]
    fn test_other_threads_wait_instead_of_failing() {
        let guard = Arc::new(ReentrancyGuard::new());
        let token = guard.enter().unwrap();

        let worker = {
            let guard = Arc::clone(&guard);
            std::thread::spawn(move || guard.enter().map(|_| ()))
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(token);

        assert!(worker.join().unwrap().is_ok());
    }
}

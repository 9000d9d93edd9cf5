//! Cooperative cancellation of long running computations

use std::time::{Duration, Instant};

use crate::SolverError;

/// Point in time after which a computation should be abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Deadline that never expires
    pub fn none() -> Self {
        Self { at: None }
    }

    /// Deadline expiring `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// Deadline expiring after `timeout` if one is given
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map(Self::after).unwrap_or_default()
    }

    /// Check whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Returns [`SolverError::Timeout`] if the deadline has passed
    pub fn check(&self) -> Result<(), SolverError> {
        if self.is_expired() {
            return Err(SolverError::Timeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline() {
        assert!(!Deadline::none().is_expired());
        assert!(Deadline::none().check().is_ok());
        assert!(Deadline::after(Duration::ZERO).is_expired());
        assert_eq!(
            Deadline::after(Duration::ZERO).check(),
            Err(SolverError::Timeout)
        );
        assert!(!Deadline::from_timeout(Some(Duration::from_secs(3600))).is_expired());
        assert_eq!(Deadline::from_timeout(None), Deadline::none());
    }
}

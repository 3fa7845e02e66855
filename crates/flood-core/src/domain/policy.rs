use std::time::Duration;

use crate::error::FloodError;

/// The single flood rule: at most `quota` requests per identity per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloodPolicy {
    window: Duration,
    quota: u64,
}

impl FloodPolicy {
    pub fn new(window: Duration, quota: u64) -> Result<Self, FloodError> {
        if window.is_zero() {
            return Err(FloodError::InvalidPolicy(
                "window must be longer than zero".to_string(),
            ));
        }
        if quota == 0 {
            return Err(FloodError::InvalidPolicy(
                "quota must allow at least one request".to_string(),
            ));
        }
        Ok(Self { window, quota })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn quota(&self) -> u64 {
        self.quota
    }

    pub fn permits(&self, count: u64) -> bool {
        count <= self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_degenerate_rules() {
        assert!(matches!(
            FloodPolicy::new(Duration::ZERO, 5),
            Err(FloodError::InvalidPolicy(_))
        ));
        assert!(matches!(
            FloodPolicy::new(Duration::from_secs(5), 0),
            Err(FloodError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_permits_up_to_quota() {
        let policy = FloodPolicy::new(Duration::from_secs(5), 5).unwrap();
        assert!(policy.permits(5));
        assert!(!policy.permits(6));
    }
}

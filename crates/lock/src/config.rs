//! Lock manager configuration.

/// Tuning knobs for automatic escalation.
#[derive(Clone, Debug, PartialEq)]
pub struct LockConfig {
    /// Saturation at or above which a context is escalated.
    pub escalation_threshold: f64,
    /// Contexts with a smaller declared capacity are never auto-escalated.
    pub min_escalation_capacity: usize,
}

impl LockConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            escalation_threshold: 0.2,
            min_escalation_capacity: 10,
        }
    }

    /// Sets the escalation threshold.
    pub fn escalation_threshold(mut self, threshold: f64) -> Self {
        self.escalation_threshold = threshold;
        self
    }

    /// Sets the minimum capacity for auto-escalation.
    pub fn min_escalation_capacity(mut self, capacity: usize) -> Self {
        self.min_escalation_capacity = capacity;
        self
    }

    /// Returns true if a context with `capacity` children at `saturation`
    /// should be escalated.
    pub fn should_escalate(&self, capacity: usize, saturation: f64) -> bool {
        capacity >= self.min_escalation_capacity && saturation >= self.escalation_threshold
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LockConfig::default();
        assert_eq!(config.escalation_threshold, 0.2);
        assert_eq!(config.min_escalation_capacity, 10);
    }

    #[test]
    fn test_should_escalate() {
        let config = LockConfig::new()
            .escalation_threshold(0.5)
            .min_escalation_capacity(4);

        assert!(config.should_escalate(4, 0.5));
        assert!(config.should_escalate(100, 0.75));
        assert!(!config.should_escalate(3, 1.0));
        assert!(!config.should_escalate(10, 0.4));
    }
}

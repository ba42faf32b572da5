use std::time::Duration;

use crate::error::{bail, Result};
use crate::report::Reporter;

/// Smallest stack we will hand to a child. The entry point keeps a few fixed-size line buffers on
/// its stack, and unoptimized builds are generous with frame sizes.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Parameters shared by the parent and every spawned context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Experiment {
    /// Loops stop incrementing once the shared counter reaches this value.
    pub threshold: i32,

    /// How long each loop iteration sleeps.
    pub interval: Duration,

    /// Size of the stack allocated for each spawned context.
    pub stack_size: usize,

    /// Where parent and children write their observations.
    pub reporter: Reporter,
}

impl Default for Experiment {
    fn default() -> Self {
        Experiment {
            threshold: 4,
            interval: Duration::from_secs(1),
            stack_size: 1024 * 1024,
            reporter: Reporter::stdout(),
        }
    }
}

impl Experiment {
    pub fn validate(&self) -> Result<()> {
        if self.stack_size < MIN_STACK_SIZE {
            bail!("stack_size is smaller than MIN_STACK_SIZE");
        }
        if self.threshold < 0 {
            bail!("threshold must not be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let experiment = Experiment::default();
        assert_eq!(experiment.threshold, 4);
        assert_eq!(experiment.interval, Duration::from_secs(1));
        assert_eq!(experiment.reporter, Reporter::stdout());
        assert!(experiment.validate().is_ok());
    }

    #[test]
    fn tiny_stack_is_rejected() {
        let experiment = Experiment {
            stack_size: 4096,
            ..Experiment::default()
        };
        assert!(experiment.validate().is_err());
    }
}

//! Exception break policy.

use crate::isolate::Isolate;
use serde::{Deserialize, Serialize};

/// Which thrown exceptions raise an `Exception` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionBreak {
    Caught,
    Uncaught,
    /// Both caught and uncaught.
    All,
}

/// Two independent toggles; kept across debugger unloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExceptionPolicy {
    pub break_on_caught: bool,
    pub break_on_uncaught: bool,
}

impl ExceptionPolicy {
    pub fn new(break_on_caught: bool, break_on_uncaught: bool) -> Self {
        Self {
            break_on_caught,
            break_on_uncaught,
        }
    }

    /// Whether an exception classified as `caught` at its throw site fires.
    pub fn should_break(&self, caught: bool) -> bool {
        (caught && self.break_on_caught) || (!caught && self.break_on_uncaught)
    }

    pub fn set(&mut self, kind: ExceptionBreak, enabled: bool) {
        match kind {
            ExceptionBreak::Caught => self.break_on_caught = enabled,
            ExceptionBreak::Uncaught => self.break_on_uncaught = enabled,
            ExceptionBreak::All => {
                self.break_on_caught = enabled;
                self.break_on_uncaught = enabled;
            }
        }
    }
}

impl Isolate {
    /// Change one or both exception toggles.
    pub fn set_break_on_exception(&mut self, kind: ExceptionBreak, enabled: bool) {
        self.debug.exceptions.set(kind, enabled);
        tracing::debug!(?kind, enabled, "exception break changed");
    }

    pub fn exception_policy(&self) -> ExceptionPolicy {
        self.debug.exceptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(false, false, false, false)]
    #[case(false, true, false, true)]
    #[case(true, false, true, false)]
    #[case(true, true, true, true)]
    fn test_policy_matrix(
        #[case] on_caught: bool,
        #[case] on_uncaught: bool,
        #[case] fires_caught: bool,
        #[case] fires_uncaught: bool,
    ) {
        let policy = ExceptionPolicy::new(on_caught, on_uncaught);
        assert_eq!(policy.should_break(true), fires_caught);
        assert_eq!(policy.should_break(false), fires_uncaught);
    }

    #[test]
    fn test_all_sets_both() {
        let mut policy = ExceptionPolicy::default();
        policy.set(ExceptionBreak::All, true);
        assert_eq!(policy, ExceptionPolicy::new(true, true));
        policy.set(ExceptionBreak::Caught, false);
        assert_eq!(policy, ExceptionPolicy::new(false, true));
    }
}

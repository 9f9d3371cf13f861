//! Auto-finalize policy gate.

use serde::{Deserialize, Serialize};

use crate::jobs::SuggestedAction;

/// Read-only capability check for auto-finalize preparation.
///
/// Strict-default: both actions are disallowed unless explicitly enabled.
/// Processors consult the gate before preparing a finalize and downgrade the
/// suggestion to REVIEW when it says no.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizePolicy {
    pub auto_release: bool,
    pub auto_refund: bool,
}

impl FinalizePolicy {
    pub fn new(auto_release: bool, auto_refund: bool) -> Self {
        Self {
            auto_release,
            auto_refund,
        }
    }

    pub fn allows_auto_finalize(&self, action: SuggestedAction) -> bool {
        match action {
            SuggestedAction::Release => self.auto_release,
            SuggestedAction::Refund => self.auto_refund,
            SuggestedAction::Review => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_denies_everything() {
        let policy = FinalizePolicy::default();
        assert!(!policy.allows_auto_finalize(SuggestedAction::Release));
        assert!(!policy.allows_auto_finalize(SuggestedAction::Refund));
        assert!(!policy.allows_auto_finalize(SuggestedAction::Review));
    }

    #[test]
    fn flags_enable_individual_actions() {
        let policy = FinalizePolicy::new(true, false);
        assert!(policy.allows_auto_finalize(SuggestedAction::Release));
        assert!(!policy.allows_auto_finalize(SuggestedAction::Refund));
    }
}

//! Per-step action availability mask.
//!
//! The mask is rebuilt at the start of every step from the previous step's
//! outcome only: an action disabled after a failure comes back on the
//! following step unless the failure recurs. `answer` can never be disabled.

use crate::types::ActionKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAvailability {
    search: bool,
    visit: bool,
    reflect: bool,
    answer: bool,
}

impl Default for ActionAvailability {
    fn default() -> Self {
        Self::all_enabled()
    }
}

impl ActionAvailability {
    pub fn all_enabled() -> Self {
        Self {
            search: true,
            visit: true,
            reflect: true,
            answer: true,
        }
    }

    /// Fresh mask for a step, with the given actions turned off.
    pub fn for_step(disabled: &[ActionKind]) -> Self {
        let mut mask = Self::all_enabled();
        for kind in disabled {
            mask.disable(*kind);
        }
        mask
    }

    /// Disable an action. Returns `false` (and leaves the mask untouched) for `answer`.
    pub fn disable(&mut self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::Search => self.search = false,
            ActionKind::Visit => self.visit = false,
            ActionKind::Reflect => self.reflect = false,
            ActionKind::Answer => return false,
        }
        true
    }

    pub fn is_enabled(&self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::Search => self.search,
            ActionKind::Visit => self.visit,
            ActionKind::Reflect => self.reflect,
            ActionKind::Answer => self.answer,
        }
    }

    pub fn enabled(&self) -> Vec<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .filter(|k| self.is_enabled(*k))
            .collect()
    }

    pub fn disabled(&self) -> Vec<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .filter(|k| !self.is_enabled(*k))
            .collect()
    }

    pub fn any_enabled(&self) -> bool {
        self.search || self.visit || self.reflect || self.answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_enabled_by_default() {
        let mask = ActionAvailability::default();
        assert_eq!(mask.enabled(), ActionKind::ALL.to_vec());
        assert!(mask.disabled().is_empty());
    }

    #[test]
    fn test_answer_cannot_be_disabled() {
        let mut mask = ActionAvailability::all_enabled();
        assert!(!mask.disable(ActionKind::Answer));
        assert!(mask.is_enabled(ActionKind::Answer));
    }

    #[test]
    fn test_disabling_everything_leaves_answer() {
        let mask = ActionAvailability::for_step(&ActionKind::ALL);
        assert_eq!(mask.enabled(), vec![ActionKind::Answer]);
        assert!(mask.any_enabled());
    }

    #[test]
    fn test_for_step_only_disables_given() {
        let mask = ActionAvailability::for_step(&[ActionKind::Search]);
        assert!(!mask.is_enabled(ActionKind::Search));
        assert!(mask.is_enabled(ActionKind::Visit));
        assert!(mask.is_enabled(ActionKind::Reflect));
    }

    #[test]
    fn test_mask_resets_each_step() {
        // Step N disabled search; step N+1 had no failure, so the mask is full again.
        let step_n = ActionAvailability::for_step(&[ActionKind::Search]);
        assert!(!step_n.is_enabled(ActionKind::Search));
        let step_n1 = ActionAvailability::for_step(&[]);
        assert!(step_n1.is_enabled(ActionKind::Search));
    }

    #[test]
    fn test_serializes_as_flags() {
        let json = serde_json::to_value(ActionAvailability::for_step(&[ActionKind::Visit])).unwrap();
        assert_eq!(json["visit"], false);
        assert_eq!(json["answer"], true);
    }
}

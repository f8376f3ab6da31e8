// Keymapper Key Map
// A trigger, the actions it fires and the constraints gating it

use crate::action::KeyMapAction;
use crate::constraint::ConstraintState;
use crate::trigger::{new_uid, Trigger};

/// A complete key map.
///
/// Only the functions in [`crate::builder`] change a key map, so the
/// trigger invariants and the action/constraint companions always hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMap {
    pub(crate) id: i64,
    pub(crate) uid: String,
    pub(crate) trigger: Trigger,
    pub(crate) actions: Vec<KeyMapAction>,
    pub(crate) constraint_state: ConstraintState,
    pub(crate) enabled: bool,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyMap {
    /// Create an empty, enabled key map with a fresh uid
    pub fn new() -> Self {
        Self {
            id: 0,
            uid: new_uid(),
            trigger: Trigger::new(),
            actions: Vec::new(),
            constraint_state: ConstraintState::new(),
            enabled: true,
        }
    }

    /// Repository row id, 0 until saved
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn actions(&self) -> &[KeyMapAction] {
        &self.actions
    }

    pub fn action(&self, uid: &str) -> Option<&KeyMapAction> {
        self.actions.iter().find(|action| action.uid == uid)
    }

    pub fn constraint_state(&self) -> &ConstraintState {
        &self.constraint_state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the key map can be handed to the detection engine.
    pub fn is_valid(&self) -> bool {
        !self.trigger.is_empty() && !self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keymap() {
        let keymap = KeyMap::new();
        assert!(keymap.is_enabled());
        assert_eq!(keymap.id(), 0);
        assert!(keymap.trigger().is_empty());
        assert!(keymap.actions().is_empty());
        assert!(keymap.constraint_state().is_empty());
        assert!(!keymap.is_valid());
    }

    #[test]
    fn test_keymaps_get_unique_uids() {
        assert_ne!(KeyMap::new().uid(), KeyMap::new().uid());
    }
}

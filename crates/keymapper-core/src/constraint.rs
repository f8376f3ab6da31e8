// Keymapper Constraints
// Preconditions that gate whether a key map may fire

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// A single precondition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    AppInForeground { package_name: String },
    AppNotInForeground { package_name: String },
    MediaPlaying,
    NoMediaPlaying,
    ScreenOn,
    ScreenOff,
    OrientationPortrait,
    OrientationLandscape,
    WifiOn,
    WifiOff,
    DeviceIsLocked,
    DeviceIsUnlocked,
    InPhoneCall,
    NotInPhoneCall,
    PhoneRinging,
    Charging,
    Discharging,
}

/// How the constraints of a key map combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintMode {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhoneState {
    #[default]
    Idle,
    Ringing,
    InCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Host state that constraints are evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintSnapshot {
    pub foreground_app: Option<String>,
    pub media_playing: bool,
    pub screen_on: bool,
    pub orientation: Orientation,
    pub wifi_on: bool,
    pub locked: bool,
    pub phone_state: PhoneState,
    pub charging: bool,
}

impl Default for ConstraintSnapshot {
    fn default() -> Self {
        Self {
            foreground_app: None,
            media_playing: false,
            screen_on: true,
            orientation: Orientation::default(),
            wifi_on: false,
            locked: false,
            phone_state: PhoneState::default(),
            charging: false,
        }
    }
}

impl Constraint {
    pub fn is_satisfied(&self, snapshot: &ConstraintSnapshot) -> bool {
        match self {
            Constraint::AppInForeground { package_name } => {
                snapshot.foreground_app.as_deref() == Some(package_name.as_str())
            }
            Constraint::AppNotInForeground { package_name } => {
                snapshot.foreground_app.as_deref() != Some(package_name.as_str())
            }
            Constraint::MediaPlaying => snapshot.media_playing,
            Constraint::NoMediaPlaying => !snapshot.media_playing,
            Constraint::ScreenOn => snapshot.screen_on,
            Constraint::ScreenOff => !snapshot.screen_on,
            Constraint::OrientationPortrait => snapshot.orientation == Orientation::Portrait,
            Constraint::OrientationLandscape => snapshot.orientation == Orientation::Landscape,
            Constraint::WifiOn => snapshot.wifi_on,
            Constraint::WifiOff => !snapshot.wifi_on,
            Constraint::DeviceIsLocked => snapshot.locked,
            Constraint::DeviceIsUnlocked => !snapshot.locked,
            Constraint::InPhoneCall => snapshot.phone_state == PhoneState::InCall,
            Constraint::NotInPhoneCall => snapshot.phone_state != PhoneState::InCall,
            Constraint::PhoneRinging => snapshot.phone_state == PhoneState::Ringing,
            Constraint::Charging => snapshot.charging,
            Constraint::Discharging => !snapshot.charging,
        }
    }
}

/// Set of constraints plus the mode combining them.
///
/// Constraints keep insertion order and are never duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConstraintState {
    pub(crate) constraints: IndexSet<Constraint>,
    pub(crate) mode: ConstraintMode,
}

impl ConstraintState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn contains(&self, constraint: &Constraint) -> bool {
        self.constraints.contains(constraint)
    }

    pub fn mode(&self) -> ConstraintMode {
        self.mode
    }

    /// An empty set is always satisfied.
    pub fn is_satisfied(&self, snapshot: &ConstraintSnapshot) -> bool {
        if self.constraints.is_empty() {
            return true;
        }

        match self.mode {
            ConstraintMode::And => self.constraints.iter().all(|c| c.is_satisfied(snapshot)),
            ConstraintMode::Or => self.constraints.iter().any(|c| c.is_satisfied(snapshot)),
        }
    }
}

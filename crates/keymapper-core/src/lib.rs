// Keymapper Core Library
// Trigger model, key event classification, trigger matching and action dispatch

pub mod action;
pub mod builder;
pub mod classifier;
pub mod constraint;
pub mod dispatch;
pub mod input;
pub mod keycode;
pub mod keymap;
pub mod matcher;
pub mod record;
pub mod repository;
pub mod settings;
pub mod trigger;

#[cfg(feature = "evdev-input")]
pub mod event;

pub use action::{ActionData, HoldDownMode, InputEventType, KeyMapAction, RepeatMode};
pub use classifier::{Classified, ClassifierConfig, KeyEventClassifier, PressId, PressKind};
pub use constraint::{
    Constraint, ConstraintMode, ConstraintSnapshot, ConstraintState, Orientation, PhoneState,
};
pub use dispatch::{
    ActionDispatcher, ActionDispatchers, ActionOutcome, ActionPerformer, DispatchTimings,
    PerformError,
};
pub use input::{
    is_trigger_source, is_virtual_device, matches_device_filter, DeviceCapabilities,
    InputDeviceInfo, InputEvent, KeyEventAction, RawKeyEvent,
};
pub use keymap::KeyMap;
pub use matcher::{
    Detection, DetectionEngine, EngineOutput, Fire, MatchState, MatcherOptions, TriggerMatcher,
};
pub use record::{KeyMapRecord, RecordError};
pub use repository::{KeyMapRepository, RepositoryError};
pub use settings::{Settings, SettingsError};
pub use trigger::{
    AssistantKind, ClickType, EvdevDeviceInfo, FingerprintGesture, Trigger, TriggerKey,
    TriggerKeyDevice, TriggerMode,
};

#[cfg(feature = "evdev-input")]
pub use event::{EventLoop, EventLoopError, EventLoopResult};

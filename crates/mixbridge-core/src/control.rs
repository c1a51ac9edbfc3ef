//! Addressable controls
//!
//! Every parameter the bridge publishes is addressed by a [`ConfigKey`]
//! (group + item). The control types here only hold values and enforce
//! their button/range semantics; the owning component applies side effects
//! after a write.

use std::fmt;

use thiserror::Error;

/// Address of a control or persisted setting: `(group, item)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey {
    pub group: String,
    pub item: String,
}

impl ConfigKey {
    pub fn new(group: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            item: item.into(),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.group, self.item)
    }
}

/// Errors returned when writing to the control surface
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    #[error("Unknown control: {0}")]
    UnknownControl(ConfigKey),

    #[error("Control is read-only: {0}")]
    ReadOnly(ConfigKey),
}

/// How a push button reacts to writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonMode {
    /// Momentary trigger
    Push,
    /// Cycles through `states` values
    Toggle,
    /// Latching on/off button (treated as a two-state toggle)
    PowerWindow,
}

/// Button-like control holding a discrete value in `0..states`
#[derive(Debug, Clone)]
pub struct ControlPushButton {
    value: f64,
    mode: ButtonMode,
    states: u32,
}

impl ControlPushButton {
    pub fn new(mode: ButtonMode, initial: f64) -> Self {
        Self {
            value: initial,
            mode,
            states: 2,
        }
    }

    /// Set the number of discrete states (at least 1)
    pub fn set_states(&mut self, states: u32) {
        self.states = states.max(1);
        // Keep the current value inside the new range
        let max = f64::from(self.states - 1);
        if self.mode != ButtonMode::Push && self.value > max {
            self.value = max;
        }
    }

    pub fn get(&self) -> f64 {
        self.value
    }

    pub fn to_bool(&self) -> bool {
        self.value > 0.0
    }

    /// Store a value, snapping it to a valid state for latching modes
    ///
    /// Returns `true` if the stored value changed.
    pub fn set(&mut self, value: f64) -> bool {
        let value = match self.mode {
            ButtonMode::Push => value,
            ButtonMode::Toggle | ButtonMode::PowerWindow => {
                let max = f64::from(self.states - 1);
                value.round().clamp(0.0, max)
            }
        };
        let changed = value != self.value;
        self.value = value;
        changed
    }
}

/// Continuous control bounded to `[min, max]`
#[derive(Debug, Clone)]
pub struct ControlPotmeter {
    value: f64,
    default: f64,
    min: f64,
    max: f64,
}

impl ControlPotmeter {
    pub fn new(min: f64, max: f64, default: f64) -> Self {
        Self {
            value: default,
            default,
            min,
            max,
        }
    }

    pub fn get(&self) -> f64 {
        self.value
    }

    /// Store a value clamped to the control range
    pub fn set(&mut self, value: f64) {
        self.value = value.clamp(self.min, self.max);
    }

    pub fn default_value(&self) -> f64 {
        self.default
    }

    pub fn set_default_value(&mut self, default: f64) {
        self.default = default.clamp(self.min, self.max);
    }
}

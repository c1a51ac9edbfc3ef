//! Common types for Mixbridge
//!
//! Channel handles, processing stages, mix modes and the stereo sample type
//! shared by the control side and the real-time engine.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of input channels an engine chain keeps per-channel state for
///
/// Per-channel tables in the engine are pre-sized to this, so registering a
/// channel never grows anything on the audio thread.
pub const MAX_INPUT_CHANNELS: usize = 32;

/// Maximum number of effect slots a single chain can hold
pub const MAX_EFFECT_SLOTS: usize = 8;

/// Maximum number of chains per signal processing stage
pub const MAX_CHAINS_PER_STAGE: usize = 64;

/// Maximum buffer size (frames) the engine pre-allocates scratch for
/// Larger buffers are processed in chunks of this size.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Audio sample type
pub type Sample = f32;

/// A single stereo frame
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Scale both channels by a factor
    #[inline]
    pub fn scale(&self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::Sub for StereoSample {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self {
            left: self.left - other.left,
            right: self.right - other.right,
        }
    }
}

/// Where in the mixer a chain is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum SignalProcessingStage {
    /// Before the channel fader
    Prefader = 0,
    /// After the channel fader
    Postfader = 1,
}

impl SignalProcessingStage {
    /// Number of stages
    pub const COUNT: usize = 2;

    /// All stages in processing order
    pub const ALL: [SignalProcessingStage; Self::COUNT] =
        [SignalProcessingStage::Prefader, SignalProcessingStage::Postfader];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Strategy for blending the processed signal with the unprocessed one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectChainMixMode {
    /// Crossfade: `dry * (1 - mix) + wet * mix`
    #[default]
    DrySlashWet,
    /// Additive: `dry + wet * mix`
    DryPlusWet,
}

impl EffectChainMixMode {
    /// Number of mix modes (state count of the `mix_mode` control)
    pub const COUNT: usize = 2;

    /// Convert from the numeric control value
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::DrySlashWet),
            1 => Some(Self::DryPlusWet),
            _ => None,
        }
    }

    /// Numeric control value of this mode
    pub fn index(self) -> usize {
        match self {
            Self::DrySlashWet => 0,
            Self::DryPlusWet => 1,
        }
    }
}

/// Opaque engine-facing identity of an input channel
///
/// Handles are small dense integers so the engine can index fixed-size
/// per-channel arrays with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandle(usize);

impl ChannelHandle {
    /// Index into per-channel tables
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A channel handle paired with its group name (e.g. `[Channel1]`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandleAndGroup {
    handle: ChannelHandle,
    group: String,
}

impl ChannelHandleAndGroup {
    pub fn handle(&self) -> ChannelHandle {
        self.handle
    }

    /// Group name the channel is addressed by
    pub fn name(&self) -> &str {
        &self.group
    }
}

impl fmt::Display for ChannelHandleAndGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.group)
    }
}

/// Hands out stable channel handles per group name
#[derive(Debug, Default)]
pub struct ChannelHandleFactory {
    handles: HashMap<String, ChannelHandle>,
}

impl ChannelHandleFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the handle for `group`, creating one if needed
    ///
    /// Returns `None` once [`MAX_INPUT_CHANNELS`] distinct groups exist.
    pub fn get_or_create(&mut self, group: &str) -> Option<ChannelHandleAndGroup> {
        let handle = match self.handles.get(group) {
            Some(handle) => *handle,
            None => {
                if self.handles.len() >= MAX_INPUT_CHANNELS {
                    log::warn!(
                        "ChannelHandleFactory: cannot register {}, limit of {} channels reached",
                        group,
                        MAX_INPUT_CHANNELS
                    );
                    return None;
                }
                let handle = ChannelHandle(self.handles.len());
                self.handles.insert(group.to_string(), handle);
                handle
            }
        };
        Some(ChannelHandleAndGroup {
            handle,
            group: group.to_string(),
        })
    }

    /// Look up an existing handle without creating one
    pub fn lookup(&self, group: &str) -> Option<ChannelHandleAndGroup> {
        self.handles.get(group).map(|handle| ChannelHandleAndGroup {
            handle: *handle,
            group: group.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_stable_per_group() {
        let mut factory = ChannelHandleFactory::new();
        let a = factory.get_or_create("[Channel1]").unwrap();
        let b = factory.get_or_create("[Channel2]").unwrap();
        let a_again = factory.get_or_create("[Channel1]").unwrap();

        assert_eq!(a, a_again);
        assert_ne!(a.handle(), b.handle());
        assert_eq!(a.handle().index(), 0);
        assert_eq!(b.handle().index(), 1);
        assert_eq!(factory.lookup("[Channel2]"), Some(b));
        assert!(factory.lookup("[Channel9]").is_none());
    }

    #[test]
    fn test_factory_limit() {
        let mut factory = ChannelHandleFactory::new();
        for i in 0..MAX_INPUT_CHANNELS {
            assert!(factory.get_or_create(&format!("[Channel{}]", i + 1)).is_some());
        }
        assert!(factory.get_or_create("[Overflow]").is_none());
        // Existing groups still resolve at the limit
        assert!(factory.get_or_create("[Channel1]").is_some());
    }

    #[test]
    fn test_mix_mode_index_roundtrip() {
        for i in 0..EffectChainMixMode::COUNT {
            let mode = EffectChainMixMode::from_index(i).unwrap();
            assert_eq!(mode.index(), i);
        }
        assert!(EffectChainMixMode::from_index(EffectChainMixMode::COUNT).is_none());
    }
}

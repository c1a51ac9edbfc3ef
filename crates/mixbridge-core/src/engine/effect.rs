//! Engine-side effect instances and per-channel processing state
//!
//! An effect is split in two:
//! - [`EffectProcessor`]: the DSP instance, one per loaded effect slot
//! - [`EffectState`]: per input channel working memory (filter history,
//!   delay lines, smoothing targets)
//!
//! States are always created on the control thread and shipped to the
//! engine inside a message, so the audio thread never allocates them.

use std::any::Any;

use crate::types::{ChannelHandle, StereoSample, MAX_EFFECT_SLOTS};

/// Per-channel working memory of one effect instance
pub trait EffectState: Send + 'static {
    /// Downcast hook so a processor can reach its concrete state type
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Parameters passed to an effect for one processing call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectProcessParams {
    /// Meta-parameter driven by the chain's super knob (0.0-1.0)
    pub meta_parameter: f64,
}

/// The DSP half of an effect
///
/// `process` runs on the audio thread: it must not allocate, lock or block.
pub trait EffectProcessor: Send {
    /// Process `buffer` in place using the channel's `state`
    fn process(
        &mut self,
        state: &mut dyn EffectState,
        buffer: &mut [StereoSample],
        params: &EffectProcessParams,
    );
}

/// An effect instance living in an engine chain slot
pub struct EngineEffect {
    id: String,
    processor: Box<dyn EffectProcessor>,
    meta_parameter: f64,
}

impl EngineEffect {
    pub fn new(id: impl Into<String>, processor: Box<dyn EffectProcessor>, meta_parameter: f64) -> Self {
        Self {
            id: id.into(),
            processor,
            meta_parameter,
        }
    }

    /// Effect id from the manifest it was created from
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn meta_parameter(&self) -> f64 {
        self.meta_parameter
    }

    pub(crate) fn set_meta_parameter(&mut self, value: f64) {
        self.meta_parameter = value;
    }

    #[inline]
    pub(crate) fn process(&mut self, state: &mut dyn EffectState, buffer: &mut [StereoSample]) {
        let params = EffectProcessParams {
            meta_parameter: self.meta_parameter,
        };
        self.processor.process(state, buffer, &params);
    }
}

/// Per-effect states for one input channel of one chain
///
/// Entry `i` belongs to effect slot `i`; `None` means the slot was empty
/// when the table was built.
pub struct EffectStatesTable {
    entries: Vec<Option<Box<dyn EffectState>>>,
}

impl EffectStatesTable {
    /// Build a table from one entry per effect slot
    pub fn new(entries: Vec<Option<Box<dyn EffectState>>>) -> Self {
        debug_assert!(entries.len() <= MAX_EFFECT_SLOTS);
        Self { entries }
    }

    /// Number of slots covered (always the chain's slot count)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether slot `index` has a state
    pub fn has_state(&self, index: usize) -> bool {
        matches!(self.entries.get(index), Some(Some(_)))
    }

    #[inline]
    pub(crate) fn state_mut(&mut self, index: usize) -> Option<&mut dyn EffectState> {
        self.entries.get_mut(index).and_then(|entry| entry.as_deref_mut())
    }

    /// Exchange slot `index` with `other`, returning whether the slot exists
    ///
    /// The previous state ends up in `other`, which keeps its release off
    /// the audio thread when `other` lives inside a deferred allocation.
    pub(crate) fn swap_entry(&mut self, index: usize, other: &mut Option<Box<dyn EffectState>>) -> bool {
        match self.entries.get_mut(index) {
            Some(entry) => {
                std::mem::swap(entry, other);
                true
            }
            None => false,
        }
    }
}

/// States for a newly loaded effect, one per currently enabled channel
///
/// Shipped with [`super::EffectsRequest::LoadEffect`]. After the engine swaps
/// them in, the transfer holds the states of the effect that was replaced.
#[derive(Default)]
pub struct EffectStatesTransfer {
    entries: Vec<(ChannelHandle, Option<Box<dyn EffectState>>)>,
}

impl EffectStatesTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, channel: ChannelHandle, state: Option<Box<dyn EffectState>>) {
        self.entries.push((channel, state));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries_mut(
        &mut self,
    ) -> impl Iterator<Item = &mut (ChannelHandle, Option<Box<dyn EffectState>>)> {
        self.entries.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);

    impl EffectState for Counter {
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn counter_value(state: &mut dyn EffectState) -> u32 {
        state.as_any_mut().downcast_mut::<Counter>().map(|c| c.0).unwrap()
    }

    #[test]
    fn test_table_swap_moves_previous_state_out() {
        let first: Box<dyn EffectState> = Box::new(Counter(1));
        let mut table = EffectStatesTable::new(vec![Some(first), None]);
        assert!(table.has_state(0));
        assert!(!table.has_state(1));

        let mut incoming: Option<Box<dyn EffectState>> = Some(Box::new(Counter(2)));
        assert!(table.swap_entry(0, &mut incoming));

        assert_eq!(counter_value(table.state_mut(0).unwrap()), 2);
        assert_eq!(counter_value(incoming.as_deref_mut().unwrap()), 1);
    }

    #[test]
    fn test_swap_out_of_range_is_rejected() {
        let mut table = EffectStatesTable::new(vec![None]);
        let mut incoming: Option<Box<dyn EffectState>> = Some(Box::new(Counter(5)));
        assert!(!table.swap_entry(3, &mut incoming));
        assert!(incoming.is_some());
    }
}

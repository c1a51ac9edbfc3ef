//! Engine-side mirror of one effect chain
//!
//! An [`EngineEffectChain`] is built on the control thread, handed to the
//! engine in an `AddEffectChain` request and from then on mutated only by
//! the engine applying requests. Nothing here is shared with the control
//! thread, so no field needs a lock or an atomic.
//!
//! All storage is sized at construction: effect slots up to
//! [`MAX_EFFECT_SLOTS`], per-channel status up to [`MAX_INPUT_CHANNELS`] and
//! scratch buffers up to [`MAX_BUFFER_SIZE`] frames.

use basedrop::Owned;

use super::effect::{EffectStatesTable, EffectStatesTransfer, EngineEffect};
use super::message::{ChainId, ChainParameters};
use crate::types::{
    ChannelHandle, EffectChainMixMode, StereoSample, MAX_BUFFER_SIZE, MAX_EFFECT_SLOTS,
    MAX_INPUT_CHANNELS,
};

/// Per-channel enablement plus the states installed with it
#[derive(Default)]
struct ChannelStatus {
    enabled: bool,
    states: Option<Owned<EffectStatesTable>>,
}

/// Real-time mirror of a chain's parameters, effects and channel states
pub struct EngineEffectChain {
    id: ChainId,
    group: String,
    params: ChainParameters,
    effects: [Option<Owned<EngineEffect>>; MAX_EFFECT_SLOTS],
    channels: [ChannelStatus; MAX_INPUT_CHANNELS],
    /// Copy of the unprocessed input for mixing
    dry: Vec<StereoSample>,
    /// Requests applied to this chain, in order
    applied_requests: u64,
}

impl EngineEffectChain {
    /// Build a chain mirror (control thread: allocates scratch)
    pub fn new(id: ChainId, group: impl Into<String>) -> Self {
        Self {
            id,
            group: group.into(),
            params: ChainParameters::default(),
            effects: std::array::from_fn(|_| None),
            channels: std::array::from_fn(|_| ChannelStatus::default()),
            dry: vec![StereoSample::silence(); MAX_BUFFER_SIZE],
            applied_requests: 0,
        }
    }

    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn parameters(&self) -> ChainParameters {
        self.params
    }

    pub fn is_enabled_for_channel(&self, channel: ChannelHandle) -> bool {
        self.channels
            .get(channel.index())
            .is_some_and(|status| status.enabled)
    }

    /// Number of state entries installed for `channel`, if enabled
    pub fn channel_state_count(&self, channel: ChannelHandle) -> Option<usize> {
        self.channels
            .get(channel.index())
            .and_then(|status| status.states.as_ref())
            .map(|states| states.len())
    }

    /// Whether `channel` has a state for effect slot `slot`
    pub fn has_channel_state(&self, channel: ChannelHandle, slot: usize) -> bool {
        self.channels
            .get(channel.index())
            .and_then(|status| status.states.as_ref())
            .is_some_and(|states| states.has_state(slot))
    }

    /// Effect loaded in `slot`, if any
    pub fn effect(&self, slot: usize) -> Option<&EngineEffect> {
        self.effects.get(slot).and_then(|e| e.as_deref())
    }

    pub fn applied_requests(&self) -> u64 {
        self.applied_requests
    }

    pub(crate) fn set_parameters(&mut self, params: ChainParameters) {
        self.params = params;
        self.applied_requests += 1;
    }

    pub(crate) fn enable_for_channel(&mut self, channel: ChannelHandle, states: Owned<EffectStatesTable>) {
        self.applied_requests += 1;
        if let Some(status) = self.channels.get_mut(channel.index()) {
            status.enabled = true;
            // Any previous table is released through the collector
            status.states = Some(states);
        }
    }

    pub(crate) fn disable_for_channel(&mut self, channel: ChannelHandle) {
        self.applied_requests += 1;
        if let Some(status) = self.channels.get_mut(channel.index()) {
            status.enabled = false;
            status.states = None;
        }
    }

    /// Swap an effect into `slot`, exchanging per-channel states with `transfer`
    ///
    /// Returns the effect previously in the slot. Out-of-range slots leave
    /// the chain untouched and hand `effect` straight back.
    pub(crate) fn load_effect(
        &mut self,
        slot: usize,
        effect: Option<Owned<EngineEffect>>,
        transfer: &mut EffectStatesTransfer,
    ) -> Option<Owned<EngineEffect>> {
        self.applied_requests += 1;
        let Some(target) = self.effects.get_mut(slot) else {
            return effect;
        };

        for (channel, state) in transfer.entries_mut() {
            if let Some(table) = self
                .channels
                .get_mut(channel.index())
                .and_then(|status| status.states.as_deref_mut())
            {
                table.swap_entry(slot, state);
            }
        }

        std::mem::replace(target, effect)
    }

    pub(crate) fn set_effect_meta_parameter(&mut self, slot: usize, value: f64) {
        self.applied_requests += 1;
        if let Some(Some(effect)) = self.effects.get_mut(slot) {
            effect.set_meta_parameter(value);
        }
    }

    /// Process `buffer` in place for `channel`
    ///
    /// Returns `false` (buffer untouched) when the chain is disabled or not
    /// enabled for the channel.
    pub fn process(&mut self, channel: ChannelHandle, buffer: &mut [StereoSample]) -> bool {
        if !self.params.enabled {
            return false;
        }
        let Some(status) = self.channels.get_mut(channel.index()) else {
            return false;
        };
        if !status.enabled {
            return false;
        }
        let Some(states) = status.states.as_deref_mut() else {
            return false;
        };

        let mix = self.params.mix as f32;
        let mode = self.params.mix_mode;

        for chunk in buffer.chunks_mut(MAX_BUFFER_SIZE) {
            let dry = &mut self.dry[..chunk.len()];
            dry.copy_from_slice(chunk);

            for (slot, effect) in self.effects.iter_mut().enumerate() {
                let Some(effect) = effect.as_deref_mut() else {
                    continue;
                };
                if let Some(state) = states.state_mut(slot) {
                    effect.process(state, chunk);
                }
            }

            match mode {
                EffectChainMixMode::DrySlashWet => {
                    for (out, dry) in chunk.iter_mut().zip(dry.iter()) {
                        *out = dry.scale(1.0 - mix) + out.scale(mix);
                    }
                }
                EffectChainMixMode::DryPlusWet => {
                    for (out, dry) in chunk.iter_mut().zip(dry.iter()) {
                        *out = *dry + out.scale(mix);
                    }
                }
            }
        }
        true
    }
}

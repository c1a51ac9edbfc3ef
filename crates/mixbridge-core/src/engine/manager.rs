//! Audio-thread owner of all engine chain mirrors
//!
//! ```text
//! Control thread                          Audio thread
//! ──────────────                          ────────────
//! EffectChainSlot ──▶ EffectsMessenger ──rtrb──▶ EngineEffectsManager
//!                                                ├ process_messages()   once per cycle
//!                                                └ process_stage()      per channel buffer
//! ```
//!
//! Everything here runs on the audio thread: no allocation, no locks, no
//! logging. Problems (unknown chain ids, a full stage) are counted instead
//! and can be read back from the control thread after shutdown or through
//! the host's own telemetry.

use basedrop::Owned;

use super::chain::EngineEffectChain;
use super::message::{ChainId, EffectsRequest};
use crate::types::{ChannelHandle, SignalProcessingStage, StereoSample, MAX_CHAINS_PER_STAGE};

/// Engine-side effects processor, owned by the audio thread
pub struct EngineEffectsManager {
    requests: rtrb::Consumer<EffectsRequest>,
    /// Chains per stage, in registration order
    stages: [Vec<Owned<EngineEffectChain>>; SignalProcessingStage::COUNT],
    /// Requests that addressed a chain the engine does not know
    unknown_target_count: u64,
    /// Chains dropped because their stage was full
    rejected_chain_count: u64,
}

impl EngineEffectsManager {
    /// Create the engine side of a request channel (control thread)
    pub fn new(requests: rtrb::Consumer<EffectsRequest>) -> Self {
        Self {
            requests,
            stages: std::array::from_fn(|_| Vec::with_capacity(MAX_CHAINS_PER_STAGE)),
            unknown_target_count: 0,
            rejected_chain_count: 0,
        }
    }

    /// Apply every pending request
    ///
    /// Bounded by the ring capacity. Returns the number applied.
    pub fn process_messages(&mut self) -> usize {
        self.process_messages_bounded(usize::MAX)
    }

    /// Apply at most `max` pending requests, oldest first
    ///
    /// The rest stay queued for the next callback.
    pub fn process_messages_bounded(&mut self, max: usize) -> usize {
        let mut applied = 0;
        while applied < max {
            let Ok(request) = self.requests.pop() else {
                break;
            };
            self.apply(request);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, request: EffectsRequest) {
        match request {
            EffectsRequest::AddEffectChain { stage, chain } => {
                let chains = &mut self.stages[stage.index()];
                if chains.len() < chains.capacity() {
                    chains.push(chain);
                } else {
                    // Pushing would reallocate; drop through the collector instead
                    self.rejected_chain_count += 1;
                }
            }
            EffectsRequest::RemoveEffectChain { stage, chain } => {
                let chains = &mut self.stages[stage.index()];
                match chains.iter().position(|c| c.id() == chain) {
                    Some(pos) => {
                        // Keeps processing order; the mirror is freed by the collector
                        chains.remove(pos);
                    }
                    None => self.unknown_target_count += 1,
                }
            }
            EffectsRequest::SetEffectChainParameters { chain, params } => {
                match self.chain_mut(chain) {
                    Some(c) => c.set_parameters(params),
                    None => self.unknown_target_count += 1,
                }
            }
            EffectsRequest::EnableEffectChainForInputChannel {
                chain,
                channel,
                states,
            } => match self.chain_mut(chain) {
                Some(c) => c.enable_for_channel(channel, states),
                None => self.unknown_target_count += 1,
            },
            EffectsRequest::DisableEffectChainForInputChannel { chain, channel } => {
                match self.chain_mut(chain) {
                    Some(c) => c.disable_for_channel(channel),
                    None => self.unknown_target_count += 1,
                }
            }
            EffectsRequest::LoadEffect {
                chain,
                slot,
                effect,
                mut states,
            } => match self.chain_mut(chain) {
                Some(c) => {
                    // The replaced effect and its states drop here, deferred
                    let _previous = c.load_effect(slot, effect, &mut states);
                }
                None => self.unknown_target_count += 1,
            },
            EffectsRequest::SetEffectMetaParameter { chain, slot, value } => {
                match self.chain_mut(chain) {
                    Some(c) => c.set_effect_meta_parameter(slot, value),
                    None => self.unknown_target_count += 1,
                }
            }
        }
    }

    fn chain_mut(&mut self, id: ChainId) -> Option<&mut EngineEffectChain> {
        self.stages
            .iter_mut()
            .flat_map(|chains| chains.iter_mut())
            .find(|c| c.id() == id)
            .map(|c| &mut **c)
    }

    /// Look up a chain mirror by id
    pub fn chain(&self, id: ChainId) -> Option<&EngineEffectChain> {
        self.stages
            .iter()
            .flat_map(|chains| chains.iter())
            .find(|c| c.id() == id)
            .map(|c| &**c)
    }

    /// Number of chains registered for `stage`
    pub fn chain_count(&self, stage: SignalProcessingStage) -> usize {
        self.stages[stage.index()].len()
    }

    /// Run every chain of `stage` over `buffer` for `channel`
    ///
    /// Returns the number of chains that processed the buffer.
    pub fn process_stage(
        &mut self,
        stage: SignalProcessingStage,
        channel: ChannelHandle,
        buffer: &mut [StereoSample],
    ) -> usize {
        let mut processed = 0;
        for chain in self.stages[stage.index()].iter_mut() {
            if chain.process(channel, buffer) {
                processed += 1;
            }
        }
        processed
    }

    pub fn unknown_target_count(&self) -> u64 {
        self.unknown_target_count
    }

    pub fn rejected_chain_count(&self) -> u64 {
        self.rejected_chain_count
    }
}

//! Lock-free request queue from the control thread to the effects engine
//!
//! The control thread never touches an engine chain directly. Every change
//! is packaged as an [`EffectsRequest`] and pushed into an `rtrb`
//! single-producer/single-consumer ring. The audio thread drains the ring
//! once per cycle and applies each request to its own chain mirrors.
//!
//! # Ownership
//!
//! Requests are move-only. Heap payloads (chains, effects, state tables)
//! are `basedrop::Owned`, built on the control thread. Once a request is
//! applied the engine owns the payload; whatever it replaces is dropped on
//! the audio thread, which only enqueues the pointer for the collector.
//! Requests still in the ring when both ends are dropped are dropped with
//! the ring.
//!
//! # Ordering
//!
//! The ring is FIFO, so requests for one chain apply in send order. When
//! the ring is full, [`EffectsMessenger`] parks requests in an ordered
//! overflow queue on the control side and flushes it ahead of the next
//! send, so the control thread never blocks and order is kept.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use basedrop::Owned;

use super::chain::EngineEffectChain;
use super::effect::{EffectStatesTable, EffectStatesTransfer, EngineEffect};
use crate::types::{ChannelHandle, EffectChainMixMode, SignalProcessingStage};

/// Identity of a chain shared by its controller and its engine mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(u64);

static NEXT_CHAIN_ID: AtomicU64 = AtomicU64::new(1);

impl ChainId {
    /// Allocate a process-unique chain id
    pub fn next() -> Self {
        Self(NEXT_CHAIN_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// The full chain parameter triple, always sent together
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainParameters {
    pub enabled: bool,
    pub mix_mode: EffectChainMixMode,
    pub mix: f64,
}

impl Default for ChainParameters {
    fn default() -> Self {
        Self {
            enabled: true,
            mix_mode: EffectChainMixMode::DrySlashWet,
            mix: 0.0,
        }
    }
}

/// Requests sent from the control thread to the effects engine
pub enum EffectsRequest {
    /// Register a new chain mirror with a processing stage
    AddEffectChain {
        stage: SignalProcessingStage,
        chain: Owned<EngineEffectChain>,
    },
    /// Unregister a chain; the mirror is released by the collector
    RemoveEffectChain {
        stage: SignalProcessingStage,
        chain: ChainId,
    },
    /// Replace enabled flag, mix mode and mix amount in one step
    SetEffectChainParameters {
        chain: ChainId,
        params: ChainParameters,
    },
    /// Start processing `channel` through the chain
    ///
    /// `states` holds one entry per effect slot of the chain and is
    /// installed in the same cycle the channel becomes enabled.
    EnableEffectChainForInputChannel {
        chain: ChainId,
        channel: ChannelHandle,
        states: Owned<EffectStatesTable>,
    },
    /// Stop processing `channel` through the chain and release its states
    DisableEffectChainForInputChannel {
        chain: ChainId,
        channel: ChannelHandle,
    },
    /// Put an effect into slot `slot` (or empty the slot with `None`)
    ///
    /// `states` carries the new effect's state for every channel the chain
    /// is currently enabled for.
    LoadEffect {
        chain: ChainId,
        slot: usize,
        effect: Option<Owned<EngineEffect>>,
        states: Owned<EffectStatesTransfer>,
    },
    /// Update one effect's meta-parameter
    SetEffectMetaParameter {
        chain: ChainId,
        slot: usize,
        value: f64,
    },
}

impl EffectsRequest {
    /// The chain this request addresses
    pub fn target_chain(&self) -> ChainId {
        match self {
            EffectsRequest::AddEffectChain { chain, .. } => chain.id(),
            EffectsRequest::RemoveEffectChain { chain, .. }
            | EffectsRequest::SetEffectChainParameters { chain, .. }
            | EffectsRequest::EnableEffectChainForInputChannel { chain, .. }
            | EffectsRequest::DisableEffectChainForInputChannel { chain, .. }
            | EffectsRequest::LoadEffect { chain, .. }
            | EffectsRequest::SetEffectMetaParameter { chain, .. } => *chain,
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            EffectsRequest::AddEffectChain { .. } => "AddEffectChain",
            EffectsRequest::RemoveEffectChain { .. } => "RemoveEffectChain",
            EffectsRequest::SetEffectChainParameters { .. } => "SetEffectChainParameters",
            EffectsRequest::EnableEffectChainForInputChannel { .. } => "EnableEffectChainForInputChannel",
            EffectsRequest::DisableEffectChainForInputChannel { .. } => "DisableEffectChainForInputChannel",
            EffectsRequest::LoadEffect { .. } => "LoadEffect",
            EffectsRequest::SetEffectMetaParameter { .. } => "SetEffectMetaParameter",
        }
    }
}

/// Capacity of the request ring
///
/// Loading a preset into a 4-slot chain costs one request per slot plus a
/// parameter update; 1024 leaves room for every chain reloading at once.
pub const REQUEST_QUEUE_CAPACITY: usize = 1024;

/// Create a request ring (producer for the control thread, consumer for the engine)
pub fn request_channel(
    capacity: usize,
) -> (rtrb::Producer<EffectsRequest>, rtrb::Consumer<EffectsRequest>) {
    rtrb::RingBuffer::new(capacity)
}

/// Control-side sender for [`EffectsRequest`]s
///
/// Never blocks: a full ring spills into an ordered overflow queue that is
/// flushed before every later send.
pub struct EffectsMessenger {
    producer: rtrb::Producer<EffectsRequest>,
    overflow: VecDeque<EffectsRequest>,
    sent: u64,
}

impl EffectsMessenger {
    pub fn new(producer: rtrb::Producer<EffectsRequest>) -> Self {
        Self {
            producer,
            overflow: VecDeque::new(),
            sent: 0,
        }
    }

    /// Queue a request for the engine, preserving order
    pub fn write_request(&mut self, request: EffectsRequest) {
        self.flush();

        if !self.overflow.is_empty() {
            self.overflow.push_back(request);
            return;
        }

        match self.producer.push(request) {
            Ok(()) => self.sent += 1,
            Err(rtrb::PushError::Full(request)) => {
                log::warn!(
                    "EffectsMessenger: request queue full, deferring {}",
                    request.kind()
                );
                self.overflow.push_back(request);
            }
        }
    }

    /// Move as many overflowed requests into the ring as fit
    ///
    /// Returns the number of requests still waiting.
    pub fn flush(&mut self) -> usize {
        while let Some(request) = self.overflow.pop_front() {
            match self.producer.push(request) {
                Ok(()) => self.sent += 1,
                Err(rtrb::PushError::Full(request)) => {
                    self.overflow.push_front(request);
                    break;
                }
            }
        }
        self.overflow.len()
    }

    /// Requests waiting on the control side for ring space
    pub fn pending(&self) -> usize {
        self.overflow.len()
    }

    /// Total requests handed to the ring so far
    pub fn sent_count(&self) -> u64 {
        self.sent
    }
}

/// Messenger shared by every chain controller on the control thread
pub type SharedMessenger = Arc<Mutex<EffectsMessenger>>;

/// Wrap a producer into a [`SharedMessenger`]
pub fn shared_messenger(producer: rtrb::Producer<EffectsRequest>) -> SharedMessenger {
    Arc::new(Mutex::new(EffectsMessenger::new(producer)))
}

/// Lock the messenger, recovering from a poisoned lock
pub fn lock_messenger(messenger: &SharedMessenger) -> MutexGuard<'_, EffectsMessenger> {
    match messenger.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mix: f64) -> EffectsRequest {
        EffectsRequest::SetEffectChainParameters {
            chain: ChainId(7),
            params: ChainParameters {
                enabled: true,
                mix_mode: EffectChainMixMode::DrySlashWet,
                mix,
            },
        }
    }

    fn mix_of(request: &EffectsRequest) -> f64 {
        match request {
            EffectsRequest::SetEffectChainParameters { params, .. } => params.mix,
            other => panic!("unexpected request {}", other.kind()),
        }
    }

    #[test]
    fn test_request_channel_fifo() {
        let (tx, mut rx) = request_channel(8);
        let mut messenger = EffectsMessenger::new(tx);

        for i in 0..5 {
            messenger.write_request(params(i as f64));
        }

        for i in 0..5 {
            assert_eq!(mix_of(&rx.pop().unwrap()), i as f64);
        }
        assert!(rx.pop().is_err());
        assert_eq!(messenger.sent_count(), 5);
    }

    #[test]
    fn test_overflow_keeps_order() {
        let (tx, mut rx) = request_channel(2);
        let mut messenger = EffectsMessenger::new(tx);

        for i in 0..5 {
            messenger.write_request(params(i as f64));
        }
        assert_eq!(messenger.pending(), 3);

        // Consumer frees space, next flush moves the backlog in order
        assert_eq!(mix_of(&rx.pop().unwrap()), 0.0);
        assert_eq!(mix_of(&rx.pop().unwrap()), 1.0);
        assert_eq!(messenger.flush(), 1);

        messenger.write_request(params(5.0));
        let mut seen = Vec::new();
        loop {
            while let Ok(request) = rx.pop() {
                seen.push(mix_of(&request));
            }
            if messenger.flush() == 0 && rx.is_empty() {
                break;
            }
        }
        assert_eq!(seen, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_chain_ids_are_unique() {
        let a = ChainId::next();
        let b = ChainId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_request_size() {
        // Payloads are Owned pointers, so the enum stays small in the ring
        let size = std::mem::size_of::<EffectsRequest>();
        assert!(size <= 48, "EffectsRequest is {} bytes, expected <= 48", size);
    }
}

//! One effect position inside a chain slot

use std::collections::BTreeSet;
use std::sync::Arc;

use basedrop::Owned;

use super::backend::{EffectError, EffectManifest, EffectsRegistry, RegisteredEffect};
use super::preset::EffectPreset;
use crate::engine::{
    lock_messenger, ChainId, EffectState, EffectStatesTransfer, EffectsRequest, EngineEffect,
    SharedMessenger,
};
use crate::types::ChannelHandle;

/// Stable index of an effect slot within its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectSlotHandle(usize);

impl EffectSlotHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Everything a slot needs to talk to the engine
#[derive(Clone)]
pub(crate) struct SlotContext {
    pub registry: Arc<EffectsRegistry>,
    pub messenger: SharedMessenger,
    pub gc: basedrop::Handle,
}

/// Control-side state of one effect slot
pub struct EffectSlot {
    ctx: SlotContext,
    chain: ChainId,
    index: usize,
    group: String,
    loaded: Option<RegisteredEffect>,
    meta_parameter: f64,
}

impl EffectSlot {
    pub(crate) fn new(ctx: SlotContext, chain: ChainId, index: usize, group: String) -> Self {
        Self {
            ctx,
            chain,
            index,
            group,
            loaded: None,
            meta_parameter: 0.0,
        }
    }

    pub fn handle(&self) -> EffectSlotHandle {
        EffectSlotHandle(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Control group, e.g. `[EffectRack1_EffectUnit1_Effect2]`
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn manifest(&self) -> Option<&EffectManifest> {
        self.loaded.as_ref().map(|e| e.manifest.as_ref())
    }

    pub fn effect_id(&self) -> Option<&str> {
        self.manifest().map(|m| m.id.as_str())
    }

    pub fn meta_parameter(&self) -> f64 {
        self.meta_parameter
    }

    /// Load the effect named by `preset`, or clear the slot if it names none
    ///
    /// `enabled_channels` are the channels the chain currently processes;
    /// each gets a fresh state shipped in the same request as the effect.
    pub fn load_effect_from_preset(
        &mut self,
        preset: Option<&EffectPreset>,
        enabled_channels: &BTreeSet<ChannelHandle>,
    ) -> Result<(), EffectError> {
        let Some(id) = preset.and_then(|p| p.effect_id.as_deref()) else {
            self.clear(enabled_channels);
            return Ok(());
        };

        let effect = self.ctx.registry.get(id)?.clone();
        let meta = preset
            .and_then(|p| p.meta_parameter)
            .unwrap_or(effect.manifest.default_meta_parameter);

        let mut transfer = EffectStatesTransfer::new();
        for &channel in enabled_channels {
            transfer.push(channel, Some(effect.factory.create_state()));
        }
        let engine_effect = EngineEffect::new(effect.manifest.id.clone(), effect.factory.instantiate(), meta);

        log::debug!("{}: loading {} into slot {}", self.group, id, self.index);
        lock_messenger(&self.ctx.messenger).write_request(EffectsRequest::LoadEffect {
            chain: self.chain,
            slot: self.index,
            effect: Some(Owned::new(&self.ctx.gc, engine_effect)),
            states: Owned::new(&self.ctx.gc, transfer),
        });

        self.loaded = Some(effect);
        self.meta_parameter = meta;
        Ok(())
    }

    /// Unload the current effect, if any
    pub fn clear(&mut self, enabled_channels: &BTreeSet<ChannelHandle>) {
        if self.loaded.take().is_none() {
            return;
        }

        // Empty entries pull the old states out of the engine tables
        let mut transfer = EffectStatesTransfer::new();
        for &channel in enabled_channels {
            transfer.push(channel, None);
        }
        lock_messenger(&self.ctx.messenger).write_request(EffectsRequest::LoadEffect {
            chain: self.chain,
            slot: self.index,
            effect: None,
            states: Owned::new(&self.ctx.gc, transfer),
        });
    }

    /// Propagate the chain's super knob to this effect
    ///
    /// Unchanged values are not re-sent unless `force` is set.
    pub fn set_meta_parameter(&mut self, value: f64, force: bool) {
        if !force && value == self.meta_parameter {
            return;
        }
        self.meta_parameter = value;
        if self.loaded.is_none() {
            return;
        }
        lock_messenger(&self.ctx.messenger).write_request(EffectsRequest::SetEffectMetaParameter {
            chain: self.chain,
            slot: self.index,
            value,
        });
    }

    /// Fresh engine state for this slot's effect, `None` when empty
    pub(crate) fn fill_effect_state(&self) -> Option<Box<dyn EffectState>> {
        self.loaded.as_ref().map(|e| e.factory.create_state())
    }
}

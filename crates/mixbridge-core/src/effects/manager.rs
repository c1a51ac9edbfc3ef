//! Control-side entry point for the effects subsystem
//!
//! [`EffectsManager::new`] creates the request ring and returns both ends:
//! the manager keeps the producer, the caller moves the returned
//! [`EngineEffectsManager`] to the audio thread.

use std::sync::Arc;

use super::backend::{EffectManifest, EffectVisibility, EffectsRegistry};
use super::chain_slot::{ChainError, EffectChainSlot};
use super::preset::SharedPresets;
use super::slot::SlotContext;
use crate::config::SettingsProvider;
use crate::engine::{
    gc_handle, lock_messenger, request_channel, shared_messenger, EngineEffectsManager,
    SharedMessenger, REQUEST_QUEUE_CAPACITY,
};
use crate::types::{ChannelHandleAndGroup, ChannelHandleFactory, SignalProcessingStage};

/// Owns every chain slot and the control end of the request ring
pub struct EffectsManager {
    ctx: SlotContext,
    presets: SharedPresets,
    channels: ChannelHandleFactory,
    /// Registered input channels with their initial enable value
    input_channels: Vec<(ChannelHandleAndGroup, f64)>,
    chains: Vec<EffectChainSlot>,
    visibility: EffectVisibility,
    shut_down: bool,
}

impl EffectsManager {
    /// Create the manager and the engine side it talks to
    pub fn new(registry: EffectsRegistry, presets: SharedPresets) -> (Self, EngineEffectsManager) {
        Self::with_gc_handle(registry, presets, gc_handle())
    }

    /// Like [`new`](Self::new) but with an explicit collector handle
    pub fn with_gc_handle(
        registry: EffectsRegistry,
        presets: SharedPresets,
        gc: basedrop::Handle,
    ) -> (Self, EngineEffectsManager) {
        let (producer, consumer) = request_channel(REQUEST_QUEUE_CAPACITY);
        let manager = Self {
            ctx: SlotContext {
                registry: Arc::new(registry),
                messenger: shared_messenger(producer),
                gc,
            },
            presets,
            channels: ChannelHandleFactory::new(),
            input_channels: Vec::new(),
            chains: Vec::new(),
            visibility: EffectVisibility::new(),
            shut_down: false,
        };
        (manager, EngineEffectsManager::new(consumer))
    }

    pub fn registry(&self) -> &EffectsRegistry {
        &self.ctx.registry
    }

    pub fn presets(&self) -> &SharedPresets {
        &self.presets
    }

    pub fn messenger(&self) -> &SharedMessenger {
        &self.ctx.messenger
    }

    /// Create a chain with `num_effect_slots` slots named `<group>_Effect<N>`
    ///
    /// Already registered input channels are registered on the new chain,
    /// which seals its slot table.
    pub fn add_chain(
        &mut self,
        group: &str,
        stage: SignalProcessingStage,
        num_effect_slots: usize,
    ) -> Result<usize, ChainError> {
        let mut chain = EffectChainSlot::new(group, stage, self.ctx.clone(), self.presets.clone());
        let base = group.trim_end_matches(']');
        for i in 0..num_effect_slots {
            chain.add_effect_slot(format!("{}_Effect{}]", base, i + 1))?;
        }
        for (channel, initial) in &self.input_channels {
            chain.register_input_channel(channel, *initial);
        }
        log::info!("EffectsManager: added chain {} with {} slots", group, num_effect_slots);
        self.chains.push(chain);
        Ok(self.chains.len() - 1)
    }

    pub fn chain(&self, index: usize) -> Option<&EffectChainSlot> {
        self.chains.get(index)
    }

    pub fn chain_mut(&mut self, index: usize) -> Option<&mut EffectChainSlot> {
        self.chains.get_mut(index)
    }

    pub fn chain_by_group(&mut self, group: &str) -> Option<&mut EffectChainSlot> {
        self.chains.iter_mut().find(|c| c.group() == group)
    }

    pub fn chains(&self) -> impl Iterator<Item = &EffectChainSlot> {
        self.chains.iter()
    }

    /// Register an input channel with every existing and future chain
    pub fn register_input_channel(&mut self, group: &str, initial_value: f64) -> Option<ChannelHandleAndGroup> {
        let channel = self.channels.get_or_create(group)?;
        if self.input_channels.iter().any(|(c, _)| c == &channel) {
            log::warn!("EffectsManager: input channel {} already registered", channel);
            return Some(channel);
        }
        for chain in &mut self.chains {
            chain.register_input_channel(&channel, initial_value);
        }
        self.input_channels.push((channel.clone(), initial_value));
        Some(channel)
    }

    pub fn registered_input_channels(&self) -> impl Iterator<Item = &ChannelHandleAndGroup> {
        self.input_channels.iter().map(|(c, _)| c)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Effect visibility
    // ─────────────────────────────────────────────────────────────────────

    pub fn load_visibility(&mut self, settings: &dyn SettingsProvider) {
        self.visibility.load(&self.ctx.registry, settings);
    }

    pub fn save_visibility(&self, settings: &mut dyn SettingsProvider) {
        self.visibility.save(&self.ctx.registry, settings);
    }

    pub fn set_effect_visible(&mut self, manifest: &EffectManifest, visible: bool) {
        self.visibility.set_visible(manifest, visible);
    }

    pub fn visible_effects(&self) -> Vec<Arc<EffectManifest>> {
        self.visibility
            .visible_effects(&self.ctx.registry)
            .cloned()
            .collect()
    }

    /// Push overflowed requests into the ring, returns how many still wait
    pub fn flush(&self) -> usize {
        lock_messenger(&self.ctx.messenger).flush()
    }

    /// Clear and unregister every chain
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        for chain in &mut self.chains {
            chain.clear();
            chain.remove_from_engine();
        }
        self.chains.clear();
        self.shut_down = true;
        log::info!("EffectsManager: shut down");
    }
}

impl Drop for EffectsManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::preset::{shared_presets, ChainPreset, ChainPresetManager, EffectPreset};
    use crate::types::StereoSample;
    use basedrop::Collector;

    fn presets() -> SharedPresets {
        shared_presets(ChainPresetManager::from_presets([ChainPreset::new("Silence")
            .with_effects(vec![EffectPreset {
                effect_id: Some("gain".to_string()),
                meta_parameter: Some(0.0),
            }])]))
    }

    #[test]
    fn test_channels_reach_every_chain() {
        let collector = Collector::new();
        let (mut manager, mut engine) =
            EffectsManager::with_gc_handle(EffectsRegistry::with_builtins(), presets(), collector.handle());

        manager.add_chain("[EffectRack1_EffectUnit1]", SignalProcessingStage::Postfader, 2).unwrap();
        let ch = manager.register_input_channel("[Channel1]", 1.0).unwrap();
        manager.add_chain("[EffectRack1_EffectUnit2]", SignalProcessingStage::Prefader, 2).unwrap();

        for chain in manager.chains() {
            assert!(chain.is_enabled_for_input_channel(ch.handle()));
        }
        assert_eq!(
            manager.chain(0).unwrap().effect_slot(1).unwrap().group(),
            "[EffectRack1_EffectUnit1_Effect2]"
        );

        engine.process_messages();
        assert_eq!(engine.chain_count(SignalProcessingStage::Postfader), 1);
        assert_eq!(engine.chain_count(SignalProcessingStage::Prefader), 1);
    }

    #[test]
    fn test_preset_drives_engine_output() {
        let collector = Collector::new();
        let (mut manager, mut engine) =
            EffectsManager::with_gc_handle(EffectsRegistry::with_builtins(), presets(), collector.handle());
        manager.add_chain("[EffectRack1_EffectUnit1]", SignalProcessingStage::Postfader, 1).unwrap();
        let ch = manager.register_input_channel("[Channel1]", 1.0).unwrap();

        let chain = manager.chain_mut(0).unwrap();
        chain.select_next_preset();
        chain.set_mix(1.0);
        engine.process_messages();

        let mut buffer = vec![StereoSample::new(1.0, 1.0); 8192];
        assert_eq!(
            engine.process_stage(SignalProcessingStage::Postfader, ch.handle(), &mut buffer),
            1
        );
        assert!(buffer[8191].left.abs() < 0.01);
    }

    #[test]
    fn test_shutdown_unregisters_cleanly() {
        let mut collector = Collector::new();
        let (mut manager, mut engine) =
            EffectsManager::with_gc_handle(EffectsRegistry::with_builtins(), presets(), collector.handle());
        manager.add_chain("[EffectRack1_EffectUnit1]", SignalProcessingStage::Postfader, 1).unwrap();
        manager.register_input_channel("[Channel1]", 1.0);
        manager.chain_mut(0).unwrap().select_next_preset();
        engine.process_messages();

        manager.shutdown();
        assert_eq!(manager.chains().count(), 0);
        engine.process_messages();
        assert_eq!(engine.chain_count(SignalProcessingStage::Postfader), 0);
        assert_eq!(engine.unknown_target_count(), 0);

        drop(manager);
        drop(engine);
        for _ in 0..4 {
            collector.collect();
        }
        assert_eq!(collector.alloc_count(), 0);
    }

    #[test]
    fn test_visibility_round_trip_through_manager() {
        let collector = Collector::new();
        let (mut manager, _engine) =
            EffectsManager::with_gc_handle(EffectsRegistry::with_builtins(), presets(), collector.handle());
        let gain = manager.registry().get("gain").unwrap().manifest.clone();
        manager.set_effect_visible(&gain, false);
        assert!(!manager.visible_effects().iter().any(|m| m.id == "gain"));

        let mut settings = crate::config::YamlSettings::in_memory();
        manager.save_visibility(&mut settings);
        let (mut other, _engine2) =
            EffectsManager::with_gc_handle(EffectsRegistry::with_builtins(), presets(), collector.handle());
        other.load_visibility(&settings);
        assert!(!other.visible_effects().iter().any(|m| m.id == "gain"));
    }
}

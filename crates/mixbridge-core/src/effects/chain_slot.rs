//! Control-side owner of one effect chain
//!
//! ```text
//! set_control("mix", 0.5)
//!   └ EffectChainSlot updates its own control state
//!       └ send_parameter_update() ──▶ EffectsMessenger ──▶ EngineEffectChain
//! ```
//!
//! Every mutator applies local state first and then publishes exactly the
//! requests the engine needs. The engine mirror is never touched from here.
//!
//! Effect slots live in a fixed arena addressed by [`EffectSlotHandle`]. The
//! arena is sealed once the chain starts talking about per-slot state
//! (first channel registration, enable or preset load): after that every
//! per-channel state table must keep exactly one entry per slot.

use std::collections::BTreeSet;
use std::sync::Arc;

use basedrop::Owned;
use thiserror::Error;

use super::preset::{read_presets, ChainPreset, SharedPresets};
use super::slot::{EffectSlot, EffectSlotHandle, SlotContext};
use crate::control::{ButtonMode, ConfigKey, ControlError, ControlPotmeter, ControlPushButton};
use crate::engine::{
    lock_messenger, ChainId, ChainParameters, EffectStatesTable, EffectsRequest, EngineEffectChain,
};
use crate::report_violation;
use crate::types::{
    ChannelHandle, ChannelHandleAndGroup, EffectChainMixMode, SignalProcessingStage,
    MAX_EFFECT_SLOTS,
};

/// Errors from building a chain's slot table
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("Effect slots of {0} are sealed")]
    SlotsSealed(String),

    #[error("{group} already has the maximum of {max} effect slots")]
    TooManyEffectSlots { group: String, max: usize },
}

/// Per-channel enable toggle, `group_<channel>_enable`
struct ChannelEnableControl {
    channel: ChannelHandleAndGroup,
    button: ControlPushButton,
}

/// Controller for one chain: parameters, presets, effect slots, channels
pub struct EffectChainSlot {
    id: ChainId,
    group: String,
    stage: SignalProcessingStage,
    ctx: SlotContext,
    presets: SharedPresets,

    slots: Vec<EffectSlot>,
    slots_sealed: bool,
    enabled_channels: BTreeSet<ChannelHandle>,
    channel_controls: Vec<ChannelEnableControl>,
    preset_name: String,
    removed: bool,

    // Control surface
    clear: ControlPushButton,
    loaded: f64,
    enabled: ControlPushButton,
    mix: ControlPotmeter,
    super1: ControlPotmeter,
    mix_mode: ControlPushButton,
    load_preset: f64,
    loaded_preset: f64,
    next_chain: ControlPushButton,
    prev_chain: ControlPushButton,
    chain_selector: f64,
    show_focus: ControlPushButton,
    controller_input_active: ControlPushButton,
    show_parameters: ControlPushButton,
    focused_effect: ControlPushButton,
}

impl EffectChainSlot {
    /// Create the controller and register its engine mirror
    ///
    /// The `AddEffectChain` request is sent before any parameter update.
    pub(crate) fn new(
        group: impl Into<String>,
        stage: SignalProcessingStage,
        ctx: SlotContext,
        presets: SharedPresets,
    ) -> Self {
        let group = group.into();
        let id = ChainId::next();

        let mut enabled = ControlPushButton::new(ButtonMode::PowerWindow, 1.0);
        enabled.set(1.0);
        // Default 1.0 but starts at the DrySlashWet discriminant
        let mut mix = ControlPotmeter::new(0.0, 1.0, 1.0);
        mix.set(EffectChainMixMode::DrySlashWet.index() as f64);
        let mut mix_mode = ControlPushButton::new(ButtonMode::Toggle, 0.0);
        mix_mode.set_states(EffectChainMixMode::COUNT as u32);
        let mut focused_effect = ControlPushButton::new(ButtonMode::Toggle, 0.0);
        focused_effect.set_states(1);

        let mut slot = Self {
            id,
            group: group.clone(),
            stage,
            ctx,
            presets,
            slots: Vec::with_capacity(MAX_EFFECT_SLOTS),
            slots_sealed: false,
            enabled_channels: BTreeSet::new(),
            channel_controls: Vec::new(),
            preset_name: String::new(),
            removed: false,
            clear: ControlPushButton::new(ButtonMode::Push, 0.0),
            loaded: 1.0,
            enabled,
            mix,
            super1: ControlPotmeter::new(0.0, 1.0, 0.0),
            mix_mode,
            load_preset: 0.0,
            loaded_preset: -1.0,
            next_chain: ControlPushButton::new(ButtonMode::Push, 0.0),
            prev_chain: ControlPushButton::new(ButtonMode::Push, 0.0),
            chain_selector: 0.0,
            show_focus: ControlPushButton::new(ButtonMode::Toggle, 0.0),
            controller_input_active: ControlPushButton::new(ButtonMode::Toggle, 0.0),
            show_parameters: ControlPushButton::new(ButtonMode::Toggle, 0.0),
            focused_effect,
        };

        let chain = Owned::new(&slot.ctx.gc, EngineEffectChain::new(id, group));
        lock_messenger(&slot.ctx.messenger).write_request(EffectsRequest::AddEffectChain { stage, chain });
        slot.send_parameter_update();
        log::debug!("{}: added to engine ({:?})", slot.group, stage);
        slot
    }

    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn stage(&self) -> SignalProcessingStage {
        self.stage
    }

    // ─────────────────────────────────────────────────────────────────────
    // Effect slots
    // ─────────────────────────────────────────────────────────────────────

    /// Append an effect slot
    pub fn add_effect_slot(&mut self, group: impl Into<String>) -> Result<EffectSlotHandle, ChainError> {
        if self.slots_sealed {
            return Err(ChainError::SlotsSealed(self.group.clone()));
        }
        if self.slots.len() >= MAX_EFFECT_SLOTS {
            return Err(ChainError::TooManyEffectSlots {
                group: self.group.clone(),
                max: MAX_EFFECT_SLOTS,
            });
        }

        let index = self.slots.len();
        let slot = EffectSlot::new(self.ctx.clone(), self.id, index, group.into());
        let handle = slot.handle();
        self.slots.push(slot);
        // State 0 means no effect focused
        self.focused_effect.set_states(self.slots.len() as u32 + 1);
        Ok(handle)
    }

    /// Freeze the slot table; later `add_effect_slot` calls fail
    pub fn seal_effect_slots(&mut self) {
        self.slots_sealed = true;
    }

    pub fn num_effect_slots(&self) -> usize {
        self.slots.len()
    }

    /// Slot at `index`, reporting a violation when out of range
    pub fn effect_slot(&self, index: usize) -> Option<&EffectSlot> {
        let slot = self.slots.get(index);
        if slot.is_none() {
            report_violation!("{}: effect slot {} out of range ({} slots)", self.group, index, self.slots.len());
        }
        slot
    }

    pub fn effect_slot_mut(&mut self, handle: EffectSlotHandle) -> Option<&mut EffectSlot> {
        self.slots.get_mut(handle.index())
    }

    /// Clear every effect slot; preset name and mix parameters are kept
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.clear(&self.enabled_channels);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Presets
    // ─────────────────────────────────────────────────────────────────────

    pub fn preset_name(&self) -> &str {
        &self.preset_name
    }

    /// Position of the current preset in the store
    pub fn preset_index(&self) -> Option<usize> {
        if self.preset_name.is_empty() {
            return None;
        }
        read_presets(&self.presets).preset_index(&self.preset_name)
    }

    /// Replace the chain's effects, mix mode and super knob default
    ///
    /// Not transactional: an effect that fails to load leaves its slot
    /// cleared while the other slots keep their new effects.
    pub fn load_chain_preset(&mut self, preset: Option<Arc<ChainPreset>>) {
        let Some(preset) = preset else {
            report_violation!("{}: load_chain_preset called without a preset", self.group);
            return;
        };
        self.slots_sealed = true;
        self.clear();

        if preset.effect_presets.len() > self.slots.len() {
            log::warn!(
                "{}: preset '{}' has {} effects, chain only has {} slots",
                self.group,
                preset.name,
                preset.effect_presets.len(),
                self.slots.len()
            );
        }
        for (slot, effect_preset) in self.slots.iter_mut().zip(preset.effect_presets.iter()) {
            let effect_preset = (!effect_preset.is_empty()).then_some(effect_preset);
            if let Err(e) = slot.load_effect_from_preset(effect_preset, &self.enabled_channels) {
                log::warn!("{}: slot {}: {}", self.group, slot.index(), e);
            }
        }

        self.set_mix_mode(preset.mix_mode);
        self.super1.set_default_value(preset.super_knob);

        self.preset_name = preset.name.clone();
        self.loaded_preset = self.preset_index().map_or(-1.0, |i| i as f64);
        log::info!("{}: loaded preset '{}'", self.group, self.preset_name);
    }

    /// Load the preset after the current one, wrapping at the end
    pub fn select_next_preset(&mut self) {
        let index = self.preset_index().map_or(0, |i| i as isize + 1);
        self.load_preset_at(index);
    }

    /// Load the preset before the current one, wrapping at the start
    pub fn select_prev_preset(&mut self) {
        let index = self.preset_index().map_or(-1, |i| i as isize - 1);
        self.load_preset_at(index);
    }

    /// Load by 1-indexed control value
    pub fn select_preset_by_index(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.load_preset_at((value as isize).saturating_sub(1));
    }

    /// Encoder input: positive moves forward, anything else backward
    pub fn select_preset_by_delta(&mut self, delta: f64) {
        if delta > 0.0 {
            self.select_next_preset();
        } else {
            self.select_prev_preset();
        }
    }

    fn load_preset_at(&mut self, index: isize) {
        let preset = read_presets(&self.presets).preset_at_index(index);
        self.load_chain_preset(preset);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Chain parameters
    // ─────────────────────────────────────────────────────────────────────

    pub fn is_enabled(&self) -> bool {
        self.enabled.to_bool()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled.set(if enabled { 1.0 } else { 0.0 }) {
            self.send_parameter_update();
        }
    }

    pub fn mix(&self) -> f64 {
        self.mix.get()
    }

    pub fn set_mix(&mut self, mix: f64) {
        if !mix.is_finite() {
            return;
        }
        let before = self.mix.get();
        self.mix.set(mix);
        if self.mix.get() != before {
            self.send_parameter_update();
        }
    }

    pub fn mix_mode(&self) -> EffectChainMixMode {
        EffectChainMixMode::from_index(self.mix_mode.get() as usize).unwrap_or_default()
    }

    /// Set the mix mode; always sends the full parameter triple
    pub fn set_mix_mode(&mut self, mode: EffectChainMixMode) {
        self.mix_mode.set(mode.index() as f64);
        self.send_parameter_update();
    }

    pub fn super_parameter(&self) -> f64 {
        self.super1.get()
    }

    pub fn super_parameter_default(&self) -> f64 {
        self.super1.default_value()
    }

    /// Set the super knob and push it to every effect's meta-parameter
    pub fn set_super_parameter(&mut self, value: f64, force: bool) {
        if !value.is_finite() {
            return;
        }
        self.super1.set(value);
        let value = self.super1.get();
        for slot in &mut self.slots {
            slot.set_meta_parameter(value, force);
        }
    }

    fn send_parameter_update(&self) {
        let params = ChainParameters {
            enabled: self.enabled.to_bool(),
            mix_mode: self.mix_mode(),
            mix: self.mix.get(),
        };
        lock_messenger(&self.ctx.messenger).write_request(EffectsRequest::SetEffectChainParameters {
            chain: self.id,
            params,
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Input channels
    // ─────────────────────────────────────────────────────────────────────

    /// Register a channel and create its enable toggle
    pub fn register_input_channel(&mut self, channel: &ChannelHandleAndGroup, initial_value: f64) {
        if self
            .channel_controls
            .iter()
            .any(|c| c.channel.handle() == channel.handle())
        {
            report_violation!("{}: input channel {} registered twice", self.group, channel);
            return;
        }
        self.slots_sealed = true;

        let button = ControlPushButton::new(ButtonMode::PowerWindow, initial_value);
        let enable = button.to_bool();
        self.channel_controls.push(ChannelEnableControl {
            channel: channel.clone(),
            button,
        });
        if enable {
            self.enable_for_input_channel(channel.handle());
        }
    }

    pub fn registered_input_channels(&self) -> impl Iterator<Item = &ChannelHandleAndGroup> {
        self.channel_controls.iter().map(|c| &c.channel)
    }

    pub fn enabled_input_channels(&self) -> &BTreeSet<ChannelHandle> {
        &self.enabled_channels
    }

    pub fn is_enabled_for_input_channel(&self, channel: ChannelHandle) -> bool {
        self.enabled_channels.contains(&channel)
    }

    /// Start processing `channel`; no-op if already enabled
    ///
    /// Effect states for every slot are built here and travel in the same
    /// request as the enable flag.
    pub fn enable_for_input_channel(&mut self, channel: ChannelHandle) {
        if self.enabled_channels.contains(&channel) {
            return;
        }
        self.slots_sealed = true;

        let states: Vec<_> = self.slots.iter().map(|slot| slot.fill_effect_state()).collect();
        lock_messenger(&self.ctx.messenger).write_request(EffectsRequest::EnableEffectChainForInputChannel {
            chain: self.id,
            channel,
            states: Owned::new(&self.ctx.gc, EffectStatesTable::new(states)),
        });

        self.enabled_channels.insert(channel);
        self.sync_channel_button(channel, true);
    }

    /// Stop processing `channel`; no-op if not enabled
    pub fn disable_for_input_channel(&mut self, channel: ChannelHandle) {
        if !self.enabled_channels.remove(&channel) {
            return;
        }
        lock_messenger(&self.ctx.messenger).write_request(EffectsRequest::DisableEffectChainForInputChannel {
            chain: self.id,
            channel,
        });
        self.sync_channel_button(channel, false);
    }

    fn sync_channel_button(&mut self, channel: ChannelHandle, enabled: bool) {
        if let Some(control) = self
            .channel_controls
            .iter_mut()
            .find(|c| c.channel.handle() == channel)
        {
            control.button.set(if enabled { 1.0 } else { 0.0 });
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Control surface
    // ─────────────────────────────────────────────────────────────────────

    fn key(&self, item: &str) -> ConfigKey {
        ConfigKey::new(self.group.clone(), item)
    }

    fn channel_control_index(&self, item: &str) -> Option<usize> {
        let name = item.strip_prefix("group_")?.strip_suffix("_enable")?;
        self.channel_controls
            .iter()
            .position(|c| c.channel.name() == name)
    }

    /// Write a control addressed by `(self.group(), item)`
    ///
    /// Non-finite values are ignored so they never reach the engine.
    pub fn set_control(&mut self, item: &str, value: f64) -> Result<(), ControlError> {
        if !value.is_finite() {
            log::warn!("EffectChainSlot: ignoring non-finite write to {}", self.key(item));
            return Ok(());
        }
        match item {
            "num_effectslots" | "loaded" | "loaded_preset" => {
                return Err(ControlError::ReadOnly(self.key(item)));
            }
            "clear" => {
                self.clear.set(value);
                if value > 0.0 {
                    self.clear();
                }
            }
            "enabled" => {
                if self.enabled.set(value) {
                    self.send_parameter_update();
                }
            }
            "mix" => self.set_mix(value),
            "super1" => self.set_super_parameter(value, false),
            "mix_mode" => {
                if self.mix_mode.set(value) {
                    self.send_parameter_update();
                }
            }
            "load_preset" => {
                self.load_preset = value;
                self.select_preset_by_index(value);
            }
            "next_chain" => {
                self.next_chain.set(value);
                if value > 0.0 {
                    self.select_next_preset();
                }
            }
            "prev_chain" => {
                self.prev_chain.set(value);
                if value > 0.0 {
                    self.select_prev_preset();
                }
            }
            "chain_selector" => {
                self.chain_selector = value;
                self.select_preset_by_delta(value);
            }
            "show_focus" => {
                self.show_focus.set(value);
            }
            "controller_input_active" => {
                self.controller_input_active.set(value);
            }
            "show_parameters" => {
                self.show_parameters.set(value);
            }
            "focused_effect" => {
                self.focused_effect.set(value);
            }
            _ => {
                let index = self
                    .channel_control_index(item)
                    .ok_or_else(|| ControlError::UnknownControl(self.key(item)))?;
                let control = &mut self.channel_controls[index];
                control.button.set(value);
                let channel = control.channel.handle();
                if control.button.to_bool() {
                    self.enable_for_input_channel(channel);
                } else {
                    self.disable_for_input_channel(channel);
                }
            }
        }
        Ok(())
    }

    /// Read a control addressed by `(self.group(), item)`
    pub fn control_value(&self, item: &str) -> Option<f64> {
        let value = match item {
            "clear" => self.clear.get(),
            "num_effectslots" => self.slots.len() as f64,
            "loaded" => self.loaded,
            "enabled" => self.enabled.get(),
            "mix" => self.mix.get(),
            "super1" => self.super1.get(),
            "mix_mode" => self.mix_mode.get(),
            "load_preset" => self.load_preset,
            "loaded_preset" => self.loaded_preset,
            "next_chain" => self.next_chain.get(),
            "prev_chain" => self.prev_chain.get(),
            "chain_selector" => self.chain_selector,
            "show_focus" => self.show_focus.get(),
            "controller_input_active" => self.controller_input_active.get(),
            "show_parameters" => self.show_parameters.get(),
            "focused_effect" => self.focused_effect.get(),
            _ => {
                let index = self.channel_control_index(item)?;
                self.channel_controls[index].button.get()
            }
        };
        Some(value)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────────────

    /// Unregister the engine mirror
    ///
    /// Callers are expected to [`clear`](Self::clear) first. Leftover
    /// effects are cleared here and reported. Runs at most once.
    pub fn remove_from_engine(&mut self) {
        if self.removed {
            return;
        }
        if self.slots.iter().any(EffectSlot::is_loaded) {
            self.clear();
            report_violation!("{}: removed from engine with effects still loaded", self.group);
        }

        lock_messenger(&self.ctx.messenger).write_request(EffectsRequest::RemoveEffectChain {
            stage: self.stage,
            chain: self.id,
        });
        self.removed = true;
        self.loaded = 0.0;
        log::debug!("{}: removed from engine", self.group);
    }
}

impl Drop for EffectChainSlot {
    fn drop(&mut self) {
        self.remove_from_engine();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::backend::EffectsRegistry;
    use crate::effects::preset::{shared_presets, ChainPresetManager, EffectPreset};
    use crate::engine::{request_channel, shared_messenger, EngineEffectsManager};
    use crate::types::ChannelHandleFactory;
    use crate::violation::violation_count;
    use basedrop::Collector;

    struct Harness {
        engine: EngineEffectsManager,
        ctx: SlotContext,
        presets: SharedPresets,
        channels: ChannelHandleFactory,
        // Last so it is dropped after everything holding its handles
        collector: Collector,
    }

    impl Harness {
        fn new(presets: ChainPresetManager) -> Self {
            let collector = Collector::new();
            let (tx, rx) = request_channel(1024);
            let ctx = SlotContext {
                registry: Arc::new(EffectsRegistry::with_builtins()),
                messenger: shared_messenger(tx),
                gc: collector.handle(),
            };
            Self {
                engine: EngineEffectsManager::new(rx),
                ctx,
                presets: shared_presets(presets),
                channels: ChannelHandleFactory::new(),
                collector,
            }
        }

        fn chain(&self, slots: usize) -> EffectChainSlot {
            let mut chain = EffectChainSlot::new(
                "[EffectRack1_EffectUnit1]",
                SignalProcessingStage::Postfader,
                self.ctx.clone(),
                self.presets.clone(),
            );
            for i in 0..slots {
                chain
                    .add_effect_slot(format!("[EffectRack1_EffectUnit1_Effect{}]", i + 1))
                    .unwrap();
            }
            chain
        }

        fn channel(&mut self, group: &str) -> ChannelHandleAndGroup {
            self.channels.get_or_create(group).unwrap()
        }

        fn sent(&self) -> u64 {
            lock_messenger(&self.ctx.messenger).sent_count()
        }
    }

    fn presets(names: &[&str]) -> ChainPresetManager {
        ChainPresetManager::from_presets(
            names
                .iter()
                .map(|n| ChainPreset::new(*n).with_effects(vec![EffectPreset::effect("gain")])),
        )
    }

    #[test]
    fn test_construction_registers_before_parameters() {
        let mut h = Harness::new(ChainPresetManager::new());
        let chain = h.chain(0);
        assert_eq!(h.sent(), 2);
        assert_eq!(h.engine.process_messages(), 2);

        let mirror = h.engine.chain(chain.id()).unwrap();
        assert_eq!(mirror.applied_requests(), 1);
        assert!(mirror.parameters().enabled);
        assert_eq!(chain.control_value("loaded"), Some(1.0));
    }

    #[test]
    fn test_scenario_preset_with_empty_entry() {
        let preset = ChainPreset::new("P").with_effects(vec![
            EffectPreset::effect("gain"),
            EffectPreset::effect("invert"),
            EffectPreset::effect("gain"),
            EffectPreset::empty(),
        ]);
        let mut h = Harness::new(ChainPresetManager::from_presets([
            ChainPreset::new("Other"),
            preset,
        ]));
        let mut chain = h.chain(4);
        let p = crate::effects::preset::read_presets(&h.presets).preset("P");
        chain.load_chain_preset(p);

        assert_eq!(chain.effect_slot(0).unwrap().effect_id(), Some("gain"));
        assert_eq!(chain.effect_slot(1).unwrap().effect_id(), Some("invert"));
        assert_eq!(chain.effect_slot(2).unwrap().effect_id(), Some("gain"));
        assert!(!chain.effect_slot(3).unwrap().is_loaded());
        assert_eq!(chain.preset_index(), Some(1));
        assert_eq!(chain.control_value("loaded_preset"), Some(1.0));

        h.engine.process_messages();
        let mirror = h.engine.chain(chain.id()).unwrap();
        assert_eq!(mirror.effect(1).map(|e| e.id()), Some("invert"));
        assert!(mirror.effect(3).is_none());

        chain.clear();
        assert_eq!(chain.preset_name(), "P");
    }

    #[test]
    fn test_null_preset_is_a_violation_without_state_change() {
        let h = Harness::new(ChainPresetManager::new());
        let mut chain = h.chain(2);
        let before_sent = h.sent();
        let before = violation_count();

        chain.load_chain_preset(None);
        assert!(violation_count() > before);
        assert_eq!(h.sent(), before_sent);
        assert_eq!(chain.preset_name(), "");
        assert_eq!(chain.control_value("loaded_preset"), Some(-1.0));
    }

    #[test]
    fn test_scenario_register_initially_enabled() {
        let mut h = Harness::new(ChainPresetManager::new());
        let mut chain = h.chain(3);
        let ch0 = h.channel("[Channel1]");
        h.engine.process_messages();

        chain.register_input_channel(&ch0, 1.0);
        assert!(chain.is_enabled_for_input_channel(ch0.handle()));
        assert_eq!(h.sent(), 3);
        assert_eq!(h.engine.process_messages(), 1);
        assert_eq!(chain.control_value("group_[Channel1]_enable"), Some(1.0));

        // Atomic pairing: one state entry per effect slot
        let mirror = h.engine.chain(chain.id()).unwrap();
        assert!(mirror.is_enabled_for_channel(ch0.handle()));
        assert_eq!(mirror.channel_state_count(ch0.handle()), Some(3));
    }

    #[test]
    fn test_register_twice_is_ignored() {
        let mut h = Harness::new(ChainPresetManager::new());
        let mut chain = h.chain(1);
        let ch0 = h.channel("[Channel1]");
        chain.register_input_channel(&ch0, 0.0);
        let before = violation_count();
        let sent = h.sent();

        chain.register_input_channel(&ch0, 1.0);
        assert!(violation_count() > before);
        assert_eq!(h.sent(), sent);
        assert!(!chain.is_enabled_for_input_channel(ch0.handle()));
        assert_eq!(chain.registered_input_channels().count(), 1);
    }

    #[test]
    fn test_enable_disable_idempotent() {
        let mut h = Harness::new(ChainPresetManager::new());
        let mut chain = h.chain(2);
        let ch = h.channel("[Channel2]").handle();
        let base = h.sent();

        chain.enable_for_input_channel(ch);
        let once = chain.enabled_input_channels().clone();
        chain.enable_for_input_channel(ch);
        assert_eq!(chain.enabled_input_channels(), &once);
        assert_eq!(h.sent(), base + 1);

        chain.disable_for_input_channel(ch);
        chain.disable_for_input_channel(ch);
        assert!(chain.enabled_input_channels().is_empty());
        assert_eq!(h.sent(), base + 2);
    }

    #[test]
    fn test_slots_seal_on_first_channel() {
        let mut h = Harness::new(ChainPresetManager::new());
        let mut chain = h.chain(2);
        let ch = h.channel("[Channel1]");
        chain.register_input_channel(&ch, 0.0);
        assert_eq!(
            chain.add_effect_slot("[Late]"),
            Err(ChainError::SlotsSealed("[EffectRack1_EffectUnit1]".to_string()))
        );

        let mut full = h.chain(MAX_EFFECT_SLOTS);
        assert!(matches!(
            full.add_effect_slot("[Extra]"),
            Err(ChainError::TooManyEffectSlots { .. })
        ));
        assert_eq!(full.control_value("num_effectslots"), Some(MAX_EFFECT_SLOTS as f64));
    }

    #[test]
    fn test_mix_mode_sends_unchanged_enabled_and_mix() {
        let mut h = Harness::new(ChainPresetManager::new());
        let mut chain = h.chain(0);
        chain.set_enabled(false);
        chain.set_mix(0.3);
        h.engine.process_messages();

        chain.set_mix_mode(EffectChainMixMode::DryPlusWet);
        assert_eq!(h.engine.process_messages(), 1);
        let params = h.engine.chain(chain.id()).unwrap().parameters();
        assert!(!params.enabled);
        assert_eq!(params.mix, 0.3);
        assert_eq!(params.mix_mode, EffectChainMixMode::DryPlusWet);
        assert_eq!(chain.mix_mode(), EffectChainMixMode::DryPlusWet);
    }

    #[test]
    fn test_next_wraps_around() {
        let mut h = Harness::new(presets(&["a", "b", "c"]));
        let mut chain = h.chain(1);

        chain.select_next_preset();
        assert_eq!(chain.preset_index(), Some(0));
        for _ in 0..3 {
            chain.select_next_preset();
        }
        assert_eq!(chain.preset_index(), Some(0));

        chain.select_prev_preset();
        assert_eq!(chain.preset_name(), "c");
        chain.select_preset_by_delta(1.0);
        assert_eq!(chain.preset_name(), "a");
        chain.select_preset_by_delta(0.0);
        assert_eq!(chain.preset_name(), "c");

        chain.clear();
        h.engine.process_messages();
    }

    #[test]
    fn test_prev_without_preset_loads_last() {
        let h = Harness::new(presets(&["a", "b", "c"]));
        let mut chain = h.chain(1);
        chain.select_prev_preset();
        assert_eq!(chain.preset_name(), "c");
        chain.clear();
    }

    #[test]
    fn test_control_surface() {
        let mut h = Harness::new(presets(&["a", "b"]));
        let mut chain = h.chain(2);
        let ch = h.channel("[Channel1]");
        chain.register_input_channel(&ch, 0.0);

        assert_eq!(
            chain.set_control("num_effectslots", 3.0),
            Err(ControlError::ReadOnly(ConfigKey::new("[EffectRack1_EffectUnit1]", "num_effectslots")))
        );
        assert!(matches!(
            chain.set_control("bogus", 1.0),
            Err(ControlError::UnknownControl(_))
        ));

        chain.set_control("load_preset", 2.0).unwrap();
        assert_eq!(chain.preset_name(), "b");
        chain.set_control("next_chain", 1.0).unwrap();
        assert_eq!(chain.preset_name(), "a");
        chain.set_control("prev_chain", 0.0).unwrap();
        assert_eq!(chain.preset_name(), "a");

        chain.set_control("group_[Channel1]_enable", 1.0).unwrap();
        assert!(chain.is_enabled_for_input_channel(ch.handle()));
        chain.set_control("group_[Channel1]_enable", 0.0).unwrap();
        assert!(!chain.is_enabled_for_input_channel(ch.handle()));

        chain.set_control("super1", 0.75).unwrap();
        assert_eq!(chain.effect_slot(0).unwrap().meta_parameter(), 0.75);

        chain.set_control("mix_mode", 5.0).unwrap();
        assert_eq!(chain.mix_mode(), EffectChainMixMode::DryPlusWet);

        chain.set_control("focused_effect", 2.0).unwrap();
        assert_eq!(chain.control_value("focused_effect"), Some(2.0));
        chain.set_control("show_parameters", 1.0).unwrap();
        assert_eq!(chain.control_value("show_parameters"), Some(1.0));

        chain.set_control("clear", 1.0).unwrap();
        assert!(!chain.effect_slot(0).unwrap().is_loaded());
        h.engine.process_messages();
    }

    #[test]
    fn test_out_of_range_slot_is_reported() {
        let h = Harness::new(ChainPresetManager::new());
        let chain = h.chain(2);
        let before = violation_count();
        assert!(chain.effect_slot(2).is_none());
        assert!(violation_count() > before);
    }

    #[test]
    fn test_teardown_clears_and_frees_engine_side() {
        let mut h = Harness::new(presets(&["a"]));
        let mut chain = h.chain(2);
        let ch = h.channel("[Channel1]");
        chain.register_input_channel(&ch, 1.0);
        chain.select_next_preset();
        h.engine.process_messages();
        let id = chain.id();

        let before = violation_count();
        drop(chain);
        assert!(violation_count() > before);

        h.engine.process_messages();
        assert!(h.engine.chain(id).is_none());
        assert_eq!(h.engine.chain_count(SignalProcessingStage::Postfader), 0);

        // Chain mirrors own nested allocations; each pass frees one level
        for _ in 0..4 {
            h.collector.collect();
        }
        assert_eq!(h.collector.alloc_count(), 0);
    }

    #[test]
    fn test_extreme_and_non_finite_writes() {
        let mut h = Harness::new(presets(&["Only", "Second"]));
        let mut chain = h.chain(1);

        // Saturates to the lowest index and wraps instead of overflowing
        chain.set_control("load_preset", f64::MIN).unwrap();
        assert_eq!(chain.preset_name(), "Only");
        chain.select_preset_by_index(f64::MIN);
        assert_eq!(chain.preset_name(), "Only");

        chain.set_control("mix", 0.5).unwrap();
        h.engine.process_messages();
        let before = h.sent();

        chain.set_control("mix", f64::NAN).unwrap();
        chain.set_control("mix_mode", f64::NAN).unwrap();
        chain.set_control("super1", f64::INFINITY).unwrap();
        chain.set_control("load_preset", f64::NAN).unwrap();
        chain.set_mix(f64::NEG_INFINITY);
        assert_eq!(h.sent(), before);
        assert_eq!(chain.mix(), 0.5);
        assert_eq!(chain.mix_mode(), EffectChainMixMode::default());
        assert_eq!(chain.preset_name(), "Only");

        h.engine.process_messages();
        let mirror = h.engine.chain(chain.id()).unwrap();
        assert_eq!(mirror.parameters().mix, 0.5);

        chain.clear();
    }
}

//! Vinyl control coordinator
//!
//! Lives on the control thread and owns the per-deck controls
//! (`vinylcontrol_enabled`, `vinylcontrol_cueing`, `vinylcontrol_mode`),
//! their persistence, and the fan-out of signal quality reports to
//! listeners such as scope widgets.
//!
//! ```text
//! Audio thread                            Control thread
//! ────────────                            ──────────────
//! VinylControlProcessor ──rtrb reports──▶ VinylControlManager::on_timer_tick()
//!                                          └ every listener, in arrival order
//! ```

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};

use super::processor::{VinylProcessorHandle, MAX_VINYL_DECKS};
use super::report::SignalQualityReport;
use crate::config::{lock_settings, SharedSettings};
use crate::control::{ButtonMode, ConfigKey, ControlError, ControlPushButton};

/// Settings group for vinyl control preferences
const VINYL_PREF_GROUP: &str = "[VinylControl]";

/// Interval between report drains
pub const SCOPE_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound of reports dispatched per drain
pub const MAX_REPORTS_PER_TICK: usize = 256;

/// How cue points react to the needle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CueingMode {
    #[default]
    Off = 0,
    One = 1,
    Hot = 2,
}

impl CueingMode {
    pub const COUNT: usize = 3;

    pub fn from_value(value: f64) -> Option<Self> {
        match value.round() as i64 {
            0 => Some(Self::Off),
            1 => Some(Self::One),
            2 => Some(Self::Hot),
            _ => None,
        }
    }
}

/// How the timecode position drives the deck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VinylControlMode {
    Absolute = 0,
    #[default]
    Relative = 1,
    Constant = 2,
}

impl VinylControlMode {
    pub const COUNT: usize = 3;

    pub fn from_value(value: f64) -> Option<Self> {
        match value.round() as i64 {
            0 => Some(Self::Absolute),
            1 => Some(Self::Relative),
            2 => Some(Self::Constant),
            _ => None,
        }
    }
}

/// Events published by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum VinylControlEvent {
    DeckEnabled { deck: usize, enabled: bool },
}

/// Receiver of signal quality reports
pub trait SignalQualityListener: Send + Sync {
    fn on_signal_quality_update(&self, report: &SignalQualityReport);
}

/// `[Channel<N>]` (N ≥ 1) to a 0-based vinyl input index
///
/// The whole group must match. Strings that merely contain a channel group,
/// such as `foo[Channel2]`, are rejected rather than searched.
pub fn vinyl_input_from_group(group: &str) -> Option<usize> {
    let digits = group.strip_prefix("[Channel")?.strip_suffix(']')?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<usize>().ok().map(|n| n - 1)
}

fn group_for_deck(deck: usize) -> String {
    format!("[Channel{}]", deck + 1)
}

/// Cooperative periodic timer polled from the host's UI tick
#[derive(Debug, Clone)]
pub struct DrainTimer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl DrainTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        if self.next_due.is_none() {
            self.next_due = Some(now + self.interval);
        }
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    /// Whether a tick is due at `now`; schedules the next one if so
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

struct DeckControls {
    group: String,
    enabled: ControlPushButton,
    cueing: ControlPushButton,
    mode: ControlPushButton,
}

impl DeckControls {
    fn restore(deck: usize, settings: &SharedSettings) -> Self {
        let settings = lock_settings(settings);
        let cueing_value = settings.get_i32(&cueing_key(deck), CueingMode::Off as i32);
        let mode_value = settings.get_i32(&mode_key(deck), VinylControlMode::Relative as i32);

        let mut cueing = ControlPushButton::new(ButtonMode::Toggle, CueingMode::Off as i32 as f64);
        cueing.set_states(CueingMode::COUNT as u32);
        cueing.set(f64::from(cueing_value));
        let mut mode = ControlPushButton::new(ButtonMode::Toggle, VinylControlMode::Relative as i32 as f64);
        mode.set_states(VinylControlMode::COUNT as u32);
        mode.set(f64::from(mode_value));

        Self {
            group: group_for_deck(deck),
            enabled: ControlPushButton::new(ButtonMode::PowerWindow, 0.0),
            cueing,
            mode,
        }
    }
}

fn cueing_key(deck: usize) -> ConfigKey {
    ConfigKey::new(VINYL_PREF_GROUP, format!("cueing_ch{}", deck + 1))
}

fn mode_key(deck: usize) -> ConfigKey {
    ConfigKey::new(VINYL_PREF_GROUP, format!("mode_ch{}", deck + 1))
}

/// Coordinates vinyl decks between settings, the processor and listeners
pub struct VinylControlManager {
    settings: SharedSettings,
    processor: Option<VinylProcessorHandle>,
    decks: Vec<DeckControls>,
    listeners: Vec<Weak<dyn SignalQualityListener>>,
    timer: DrainTimer,
    events: Sender<VinylControlEvent>,
}

impl VinylControlManager {
    pub fn new(settings: SharedSettings, processor: VinylProcessorHandle) -> (Self, Receiver<VinylControlEvent>) {
        let (events, receiver) = channel::unbounded();
        let manager = Self {
            settings,
            processor: Some(processor),
            decks: Vec::new(),
            listeners: Vec::new(),
            timer: DrainTimer::new(SCOPE_UPDATE_INTERVAL),
            events,
        };
        (manager, receiver)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Decks
    // ─────────────────────────────────────────────────────────────────────

    pub fn configured_deck_count(&self) -> usize {
        self.decks.len()
    }

    /// Grow the set of vinyl-controlled decks; never shrinks
    pub fn set_configured_deck_count(&mut self, count: usize) {
        let count = if count > MAX_VINYL_DECKS {
            log::warn!(
                "Number of decks increased to {}, but only {} vinyl inputs are supported. \
                 Decks above the maximum will not have vinyl control",
                count,
                MAX_VINYL_DECKS
            );
            MAX_VINYL_DECKS
        } else {
            count
        };

        if count <= self.decks.len() {
            return;
        }
        for deck in self.decks.len()..count {
            self.decks.push(DeckControls::restore(deck, &self.settings));
        }
        log::debug!("VinylControlManager: {} decks configured", self.decks.len());
    }

    pub fn is_vinyl_control_enabled(&self, deck: usize) -> bool {
        self.decks.get(deck).is_some_and(|d| d.enabled.to_bool())
    }

    /// Flip a deck's enable toggle; out-of-range decks are ignored
    pub fn toggle_vinyl_control(&mut self, deck: usize) {
        let Some(controls) = self.decks.get(deck) else {
            return;
        };
        let enabled = !controls.enabled.to_bool();
        self.set_vinyl_control_enabled(deck, enabled);
    }

    pub fn set_vinyl_control_enabled(&mut self, deck: usize, enabled: bool) {
        let Some(controls) = self.decks.get_mut(deck) else {
            return;
        };
        if !controls.enabled.set(if enabled { 1.0 } else { 0.0 }) {
            return;
        }
        if let Some(processor) = &self.processor {
            processor.set_deck_enabled(deck, enabled);
        }
        // A dropped receiver only means nobody is listening
        let _ = self.events.send(VinylControlEvent::DeckEnabled { deck, enabled });
    }

    pub fn cueing_mode(&self, deck: usize) -> Option<CueingMode> {
        self.decks
            .get(deck)
            .and_then(|d| CueingMode::from_value(d.cueing.get()))
    }

    pub fn set_cueing_mode(&mut self, deck: usize, mode: CueingMode) {
        if let Some(controls) = self.decks.get_mut(deck) {
            controls.cueing.set(mode as i32 as f64);
        }
    }

    pub fn control_mode(&self, deck: usize) -> Option<VinylControlMode> {
        self.decks
            .get(deck)
            .and_then(|d| VinylControlMode::from_value(d.mode.get()))
    }

    pub fn set_control_mode(&mut self, deck: usize, mode: VinylControlMode) {
        if let Some(controls) = self.decks.get_mut(deck) {
            controls.mode.set(mode as i32 as f64);
        }
    }

    /// Write a deck control addressed by `(group, item)`
    pub fn set_control(&mut self, group: &str, item: &str, value: f64) -> Result<(), ControlError> {
        let unknown = || ControlError::UnknownControl(ConfigKey::new(group, item));
        let deck = vinyl_input_from_group(group)
            .filter(|&deck| deck < self.decks.len())
            .ok_or_else(unknown)?;
        match item {
            "vinylcontrol_enabled" => self.set_vinyl_control_enabled(deck, value > 0.0),
            "vinylcontrol_cueing" => {
                self.decks[deck].cueing.set(value);
            }
            "vinylcontrol_mode" => {
                self.decks[deck].mode.set(value);
            }
            _ => return Err(unknown()),
        }
        Ok(())
    }

    pub fn control_value(&self, group: &str, item: &str) -> Option<f64> {
        let controls = self.decks.get(vinyl_input_from_group(group)?)?;
        match item {
            "vinylcontrol_enabled" => Some(controls.enabled.get()),
            "vinylcontrol_cueing" => Some(controls.cueing.get()),
            "vinylcontrol_mode" => Some(controls.mode.get()),
            _ => None,
        }
    }

    /// Whether an audio input is routed to a configured deck
    pub fn vinyl_input_connected(&self, deck: usize) -> bool {
        if deck >= self.decks.len() {
            return false;
        }
        self.processor
            .as_ref()
            .is_some_and(|processor| processor.deck_configured(deck))
    }

    pub fn request_reload_config(&self) {
        if let Some(processor) = &self.processor {
            processor.request_reload_config();
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Signal quality listeners
    // ─────────────────────────────────────────────────────────────────────

    /// Register a listener; the first one arms the drain timer and reporting
    pub fn add_signal_quality_listener(&mut self, listener: &Arc<dyn SignalQualityListener>, now: Instant) {
        let weak = Arc::downgrade(listener);
        if !self.listeners.iter().any(|l| l.ptr_eq(&weak)) {
            self.listeners.push(weak);
        }
        if let Some(processor) = &self.processor {
            processor.set_signal_quality_reporting(true);
        }
        self.timer.start(now);
    }

    /// Unregister a listener; removing the last disarms timer and reporting
    pub fn remove_signal_quality_listener(&mut self, listener: &Arc<dyn SignalQualityListener>) {
        let weak = Arc::downgrade(listener);
        self.listeners.retain(|l| !l.ptr_eq(&weak));
        if self.listeners.is_empty() {
            self.disarm();
        }
    }

    fn disarm(&mut self) {
        if let Some(processor) = &self.processor {
            processor.set_signal_quality_reporting(false);
        }
        self.timer.stop();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_draining(&self) -> bool {
        self.timer.is_armed()
    }

    /// Poll the drain timer; drains if a tick is due. Returns reports dispatched.
    pub fn on_timer_tick(&mut self, now: Instant) -> usize {
        if !self.timer.poll(now) {
            return 0;
        }
        self.update_signal_quality_listeners()
    }

    /// Dispatch pending reports to every listener, in arrival order
    pub fn update_signal_quality_listeners(&mut self) -> usize {
        let Some(processor) = self.processor.as_mut() else {
            return 0;
        };

        // Listeners dropped without unregistering are pruned here
        self.listeners.retain(|l| l.strong_count() > 0);
        let listeners: Vec<_> = self.listeners.iter().filter_map(Weak::upgrade).collect();

        let reports = processor.reports();
        let mut dispatched = 0;
        while dispatched < MAX_REPORTS_PER_TICK {
            let Some(report) = reports.pop() else {
                break;
            };
            for listener in &listeners {
                listener.on_signal_quality_update(&report);
            }
            dispatched += 1;
        }

        if self.listeners.is_empty() {
            self.disarm();
        }
        dispatched
    }

    // ─────────────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────────────

    /// Persist deck settings, disable every deck and release the processor
    pub fn shutdown(&mut self) {
        let Some(processor) = self.processor.as_ref() else {
            return;
        };
        processor.set_signal_quality_reporting(false);
        self.timer.stop();

        {
            let mut settings = lock_settings(&self.settings);
            for (deck, controls) in self.decks.iter().enumerate() {
                settings.set_bool(&ConfigKey::new(controls.group.clone(), "vinylcontrol_enabled"), false);
                settings.set_i32(&cueing_key(deck), controls.cueing.get() as i32);
                settings.set_i32(&mode_key(deck), controls.mode.get() as i32);
            }
        }

        for deck in 0..self.decks.len() {
            self.set_vinyl_control_enabled(deck, false);
        }
        self.processor = None;
        log::info!("VinylControlManager: shut down ({} decks)", self.decks.len());
    }
}

impl Drop for VinylControlManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Mixbridge demo - drives the effects and vinyl bridges end to end
//!
//! Runs a simulated audio thread (engine + vinyl processor) next to a
//! control loop that loads presets, moves knobs and drains scope reports.
//!
//! Usage: `mixbridge-demo [--seconds N] [--no-save]`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use mixbridge_core::config::{
    default_presets_path, default_settings_path, lock_settings, SharedSettings, YamlSettings,
};
use mixbridge_core::effects::{
    read_presets, shared_presets, ChainPreset, ChainPresetManager, EffectPreset,
    EffectsManager, EffectsRegistry,
};
use mixbridge_core::vinyl::{
    vinyl_processor, SignalQualityListener, SignalQualityReport, VinylControlManager,
    REPORT_QUEUE_CAPACITY,
};
use mixbridge_core::{ChannelHandle, SignalProcessingStage, StereoSample};

const NUM_DECKS: usize = 4;
const BUFFER_FRAMES: usize = 256;
const SAMPLE_RATE: f64 = 48_000.0;

/// Logs a summary line per drained report
struct ScopeLogger;

impl SignalQualityListener for ScopeLogger {
    fn on_signal_quality_update(&self, report: &SignalQualityReport) {
        log::debug!(
            "deck {}: quality {:.2}, angle {:.1}",
            report.processor + 1,
            report.timecode_quality,
            report.angle
        );
    }
}

fn default_presets() -> Vec<ChainPreset> {
    vec![
        ChainPreset::new("Clean").with_effects(vec![EffectPreset::effect("gain")]),
        ChainPreset::new("Flip").with_effects(vec![EffectPreset::effect("invert"), EffectPreset::effect("gain")]),
        ChainPreset::new("Empty"),
    ]
}

/// Quadrature test tone standing in for a timecode record
fn timecode_tone(phase: &mut f64, buffer: &mut [StereoSample]) {
    let step = 2.0 * std::f64::consts::PI * 1000.0 / SAMPLE_RATE;
    for sample in buffer.iter_mut() {
        *sample = StereoSample::new((phase.cos() * 0.4) as f32, (phase.sin() * 0.4) as f32);
        *phase = (*phase + step) % (2.0 * std::f64::consts::PI);
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let no_save = args.iter().any(|arg| arg == "--no-save");
    let seconds: u64 = args
        .iter()
        .position(|arg| arg == "--seconds")
        .and_then(|i| args.get(i + 1))
        .map(|v| v.parse().context("--seconds expects a whole number"))
        .transpose()?
        .unwrap_or(3);

    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("mixbridge-demo starting up ({}s)", seconds);

    // Settings and presets
    let settings_path = default_settings_path();
    let yaml_settings = Arc::new(Mutex::new(YamlSettings::open(&settings_path)));
    let settings: SharedSettings = yaml_settings.clone();

    let presets_path = default_presets_path();
    let mut preset_store = ChainPresetManager::load_from_file(&presets_path)?;
    if preset_store.is_empty() {
        for preset in default_presets() {
            preset_store.import_preset(preset);
        }
    }
    let presets = shared_presets(preset_store);

    // Effects: control side stays here, engine side moves to the audio thread
    let (mut effects, mut engine) = EffectsManager::new(EffectsRegistry::with_builtins(), presets.clone());
    effects.load_visibility(&*lock_settings(&settings));
    effects.add_chain("[EffectRack1_EffectUnit1]", SignalProcessingStage::Postfader, 3)?;
    effects.add_chain("[EffectRack1_EffectUnit2]", SignalProcessingStage::Prefader, 3)?;

    let mut channels: Vec<ChannelHandle> = Vec::with_capacity(NUM_DECKS);
    for deck in 0..NUM_DECKS {
        let group = format!("[Channel{}]", deck + 1);
        let initial = if deck == 0 { 1.0 } else { 0.0 };
        let channel = effects
            .register_input_channel(&group, initial)
            .with_context(|| format!("no channel handle for {}", group))?;
        channels.push(channel.handle());
    }

    // Vinyl control
    let (mut processor, vinyl_handle) = vinyl_processor(REPORT_QUEUE_CAPACITY);
    vinyl_handle.set_input_configured(0, true);
    let (mut vinyl, vinyl_events) = VinylControlManager::new(settings.clone(), vinyl_handle);
    vinyl.set_configured_deck_count(NUM_DECKS);
    let scope: Arc<dyn SignalQualityListener> = Arc::new(ScopeLogger);
    vinyl.add_signal_quality_listener(&scope, Instant::now());
    vinyl.toggle_vinyl_control(0);

    // Audio thread
    let running = Arc::new(AtomicBool::new(true));
    let audio_running = running.clone();
    let period = Duration::from_secs_f64(BUFFER_FRAMES as f64 / SAMPLE_RATE);
    let audio = thread::Builder::new()
        .name("demo-audio".to_string())
        .spawn(move || {
            let mut buffer = vec![StereoSample::silence(); BUFFER_FRAMES];
            let mut phase = 0.0;
            let mut cycles = 0u64;
            let mut reloads = 0u64;
            while audio_running.load(Ordering::Relaxed) {
                engine.process_messages();
                for (deck, &channel) in channels.iter().enumerate() {
                    timecode_tone(&mut phase, &mut buffer);
                    processor.receive_buffer(deck, &buffer);
                    for stage in SignalProcessingStage::ALL {
                        engine.process_stage(stage, channel, &mut buffer);
                    }
                }
                if processor.take_reload_request() {
                    reloads += 1;
                }
                cycles += 1;
                thread::sleep(period);
            }
            // Drain teardown requests so every chain is unregistered
            engine.process_messages();
            (cycles, reloads, engine.unknown_target_count())
        })
        .context("Failed to spawn audio thread")?;

    // Control loop
    let started = Instant::now();
    let mut step = 0u32;
    while started.elapsed() < Duration::from_secs(seconds) {
        let now = Instant::now();
        vinyl.on_timer_tick(now);
        for event in vinyl_events.try_iter() {
            log::info!("vinyl: {:?}", event);
        }

        let round = step / 20;
        if let Some(chain) = effects.chain_mut(0) {
            match step % 20 {
                0 => chain.select_next_preset(),
                5 => chain.set_mix((f64::from(step % 100)) / 100.0),
                10 => chain.set_super_parameter(0.25 + f64::from(round % 4) * 0.25, false),
                15 => {
                    if let Err(e) = chain.set_control("group_[Channel2]_enable", f64::from(round % 2)) {
                        log::warn!("{}", e);
                    }
                }
                _ => {}
            }
        }
        if step == 25 {
            vinyl.request_reload_config();
        }
        effects.flush();

        step += 1;
        thread::sleep(Duration::from_millis(50));
    }

    // Teardown: unregister chains before stopping the engine
    log::info!(
        "chain 1 ended on preset '{}'",
        effects.chain(0).map(|c| c.preset_name().to_string()).unwrap_or_default()
    );
    effects.shutdown();
    vinyl.remove_signal_quality_listener(&scope);
    vinyl.shutdown();

    running.store(false, Ordering::Relaxed);
    match audio.join() {
        Ok((cycles, reloads, unknown)) => log::info!(
            "audio thread ran {} cycles ({} config reloads, {} unknown targets)",
            cycles,
            reloads,
            unknown
        ),
        Err(_) => log::error!("audio thread panicked"),
    }

    if !no_save {
        effects.save_visibility(&mut *lock_settings(&settings));
        yaml_settings
            .lock()
            .map_err(|_| anyhow::anyhow!("settings lock poisoned"))?
            .save()?;
        read_presets(&presets).save_to_file(&presets_path)?;
        log::info!("Saved settings to {:?}", settings_path);
    }

    log::info!("mixbridge-demo done ({} presets)", read_presets(&presets).len());
    Ok(())
}

//! Real-time side of vinyl control
//!
//! [`VinylControlProcessor`] receives each deck's input buffer on the audio
//! thread and, while reporting is on, publishes one [`SignalQualityReport`]
//! per buffer. The control thread steers it through a
//! [`VinylProcessorHandle`]; the two share only relaxed atomics and the
//! report ring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::report::{report_channel, ReportConsumer, ReportProducer, SignalQualityReport, SCOPE_SIZE};
use crate::types::StereoSample;

/// Highest number of decks with vinyl control
pub const MAX_VINYL_DECKS: usize = 4;

/// Scope cells brighten by this much per sample that lands in them
const SCOPE_INCREMENT: u8 = 32;

/// Level (peak) that counts as a full-quality timecode signal
const REFERENCE_LEVEL: f32 = 0.5;

#[derive(Default)]
struct ProcessorFlags {
    reporting: AtomicBool,
    reload_requested: AtomicBool,
    deck_enabled: [AtomicBool; MAX_VINYL_DECKS],
    input_configured: [AtomicBool; MAX_VINYL_DECKS],
}

/// Create a processor and the control-side handle steering it
pub fn vinyl_processor(report_capacity: usize) -> (VinylControlProcessor, VinylProcessorHandle) {
    let flags = Arc::new(ProcessorFlags::default());
    let (producer, consumer) = report_channel(report_capacity);
    (
        VinylControlProcessor {
            flags: flags.clone(),
            reports: producer,
        },
        VinylProcessorHandle {
            flags,
            reports: consumer,
        },
    )
}

/// Audio-thread receiver of vinyl input buffers
pub struct VinylControlProcessor {
    flags: Arc<ProcessorFlags>,
    reports: ReportProducer,
}

impl VinylControlProcessor {
    /// Process one input buffer for `deck`
    ///
    /// Returns `true` if a report was published.
    pub fn receive_buffer(&mut self, deck: usize, samples: &[StereoSample]) -> bool {
        if deck >= MAX_VINYL_DECKS || samples.is_empty() {
            return false;
        }
        if !self.flags.deck_enabled[deck].load(Ordering::Relaxed) {
            return false;
        }
        if !self.flags.reporting.load(Ordering::Relaxed) {
            return false;
        }
        self.reports.push(measure(deck, samples))
    }

    /// Take a pending configuration reload request
    pub fn take_reload_request(&self) -> bool {
        self.flags.reload_requested.swap(false, Ordering::Relaxed)
    }
}

/// Peak level, stereo phase angle and X/Y scope of a buffer
fn measure(deck: usize, samples: &[StereoSample]) -> SignalQualityReport {
    let mut report = SignalQualityReport::new(deck);
    let mut peak = 0.0f32;
    let half = (SCOPE_SIZE / 2) as f32;

    for sample in samples {
        peak = peak.max(sample.left.abs()).max(sample.right.abs());
        let x = ((sample.left.clamp(-1.0, 1.0) + 1.0) * half) as usize;
        let y = ((sample.right.clamp(-1.0, 1.0) + 1.0) * half) as usize;
        let cell = &mut report.scope[y.min(SCOPE_SIZE - 1) * SCOPE_SIZE + x.min(SCOPE_SIZE - 1)];
        *cell = cell.saturating_add(SCOPE_INCREMENT);
    }

    // Timecode is a quadrature pair, so the last frame's phase tracks the platter
    let last = samples[samples.len() - 1];
    report.angle = last.right.atan2(last.left).to_degrees().rem_euclid(360.0);
    report.timecode_quality = (peak / REFERENCE_LEVEL).min(1.0);
    report
}

/// Control-thread handle to the processor
pub struct VinylProcessorHandle {
    flags: Arc<ProcessorFlags>,
    reports: ReportConsumer,
}

impl VinylProcessorHandle {
    pub fn set_signal_quality_reporting(&self, enabled: bool) {
        self.flags.reporting.store(enabled, Ordering::Relaxed);
    }

    pub fn is_reporting(&self) -> bool {
        self.flags.reporting.load(Ordering::Relaxed)
    }

    pub fn set_deck_enabled(&self, deck: usize, enabled: bool) {
        if let Some(flag) = self.flags.deck_enabled.get(deck) {
            flag.store(enabled, Ordering::Relaxed);
        }
    }

    /// Mark whether an audio input is routed to `deck`
    pub fn set_input_configured(&self, deck: usize, configured: bool) {
        if let Some(flag) = self.flags.input_configured.get(deck) {
            flag.store(configured, Ordering::Relaxed);
        }
    }

    pub fn deck_configured(&self, deck: usize) -> bool {
        self.flags
            .input_configured
            .get(deck)
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Ask the processor to re-read its configuration
    pub fn request_reload_config(&self) {
        self.flags.reload_requested.store(true, Ordering::Relaxed);
    }

    pub fn reports(&mut self) -> &mut ReportConsumer {
        &mut self.reports
    }
}

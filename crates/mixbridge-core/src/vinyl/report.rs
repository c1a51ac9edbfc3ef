//! Signal quality reports and the ring that carries them off the audio thread

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Side length of the square scope image
pub const SCOPE_SIZE: usize = 100;

/// Reports buffered between drain ticks
///
/// At one report per deck per audio callback this covers several ticks at
/// typical buffer sizes; anything beyond is dropped and counted.
pub const REPORT_QUEUE_CAPACITY: usize = 64;

/// One measurement of a deck's timecode signal
#[derive(Clone, Copy)]
pub struct SignalQualityReport {
    /// Deck index the measurement belongs to
    pub processor: usize,
    /// 0.0 (no usable signal) to 1.0 (clean timecode)
    pub timecode_quality: f32,
    /// Platter angle in degrees
    pub angle: f32,
    /// X/Y scope intensity, row-major
    pub scope: [u8; SCOPE_SIZE * SCOPE_SIZE],
}

impl SignalQualityReport {
    pub fn new(processor: usize) -> Self {
        Self {
            processor,
            timecode_quality: 0.0,
            angle: 0.0,
            scope: [0; SCOPE_SIZE * SCOPE_SIZE],
        }
    }

    /// Scope intensity at column `x`, row `y`
    pub fn scope_at(&self, x: usize, y: usize) -> u8 {
        self.scope[y * SCOPE_SIZE + x]
    }
}

impl Default for SignalQualityReport {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for SignalQualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalQualityReport")
            .field("processor", &self.processor)
            .field("timecode_quality", &self.timecode_quality)
            .field("angle", &self.angle)
            .finish_non_exhaustive()
    }
}

/// Create a report ring of `capacity` entries
pub fn report_channel(capacity: usize) -> (ReportProducer, ReportConsumer) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        ReportProducer {
            inner: producer,
            dropped: dropped.clone(),
        },
        ReportConsumer {
            inner: consumer,
            dropped,
        },
    )
}

/// Audio-thread end: wait-free, drops the newest report when full
pub struct ReportProducer {
    inner: rtrb::Producer<SignalQualityReport>,
    dropped: Arc<AtomicU64>,
}

impl ReportProducer {
    /// Returns `false` if the ring was full and `report` was dropped
    pub fn push(&mut self, report: SignalQualityReport) -> bool {
        match self.inner.push(report) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Control-thread end
pub struct ReportConsumer {
    inner: rtrb::Consumer<SignalQualityReport>,
    dropped: Arc<AtomicU64>,
}

impl ReportConsumer {
    pub fn pop(&mut self) -> Option<SignalQualityReport> {
        self.inner.pop().ok()
    }

    /// Reports waiting to be drained
    pub fn len(&self) -> usize {
        self.inner.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Reports lost to a full ring since creation
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

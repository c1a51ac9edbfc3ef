//! Vinyl control: deck coordination and signal quality telemetry
//!
//! The processor runs on the audio thread and only publishes fixed-size
//! reports; the manager owns everything else on the control thread.

pub mod manager;
pub mod processor;
pub mod report;

pub use manager::{
    vinyl_input_from_group, CueingMode, DrainTimer, SignalQualityListener, VinylControlEvent,
    VinylControlManager, VinylControlMode, MAX_REPORTS_PER_TICK, SCOPE_UPDATE_INTERVAL,
};
pub use processor::{vinyl_processor, VinylControlProcessor, VinylProcessorHandle, MAX_VINYL_DECKS};
pub use report::{
    report_channel, ReportConsumer, ReportProducer, SignalQualityReport, REPORT_QUEUE_CAPACITY,
    SCOPE_SIZE,
};

//! Effects engine - the real-time side of the bridge
//!
//! - Request queue from the control thread (`rtrb` SPSC ring)
//! - Chain mirrors mutated only by applied requests
//! - Effect instances and per-channel state tables
//! - Deferred deallocation of anything the audio thread discards

mod chain;
mod effect;
mod gc;
mod manager;
mod message;

pub use chain::*;
pub use effect::*;
pub use gc::gc_handle;
pub use manager::*;
pub use message::*;

//! RT-safe deferred deallocation for engine payloads
//!
//! Everything the control thread hands to the engine and that the engine
//! may later discard (whole chains, effect instances, per-effect state
//! tables) is wrapped in `basedrop::Owned<T>`. Dropping an `Owned` on the
//! audio thread only enqueues a pointer; the free happens on a dedicated
//! collector thread.
//!
//! ```ignore
//! use basedrop::Owned;
//! use mixbridge_core::engine::gc_handle;
//!
//! let table = Owned::new(&gc_handle(), EffectStatesTable::new(Vec::new()));
//! // ...moved into a message, consumed by the engine, later dropped there...
//! ```
//!
//! Components take a `basedrop::Handle` at construction so tests can use a
//! local `Collector` and observe its allocation count.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Global handle; the `Collector` lives on the "engine-gc" thread
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector thread frees deferred drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("engine-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it is created on the thread that runs it
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }

            log::info!("Engine GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    match spawned.ok().and_then(|_| rx.recv().ok()) {
        Some(handle) => handle,
        None => {
            // Without a collector thread, fall back to a leaked collector.
            // Deferred drops then accumulate until process exit.
            log::error!("Failed to start engine GC thread, deferred drops will not be collected");
            let collector = Box::leak(Box::new(Collector::new()));
            collector.handle()
        }
    }
}

/// Get a handle for creating `Owned<T>` / `Shared<T>` allocations
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Owned;

    #[test]
    fn test_global_handle_accepts_allocations() {
        let value = Owned::new(&gc_handle(), vec![1u32, 2, 3]);
        assert_eq!(value.len(), 3);
    }

    #[test]
    fn test_local_collector_frees_after_collect() {
        let mut collector = Collector::new();
        let owned = Owned::new(&collector.handle(), [0u8; 64]);
        assert_eq!(collector.alloc_count(), 1);

        drop(owned);
        collector.collect();
        assert_eq!(collector.alloc_count(), 0);
    }
}

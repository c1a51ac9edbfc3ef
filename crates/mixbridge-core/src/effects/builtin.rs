//! Built-in effects
//!
//! Only the simplest processors live here; they exist so chains can be
//! exercised end to end without plugin backends.

use std::any::Any;
use std::sync::Arc;

use super::backend::{EffectBackendType, EffectFactory, EffectManifest, EffectsRegistry};
use crate::engine::{EffectProcessParams, EffectProcessor, EffectState};
use crate::types::StereoSample;

/// Per-sample smoothing coefficient for gain changes
const GAIN_SMOOTHING: f32 = 0.002;

/// Smoothed gain of one channel
#[derive(Debug, Default)]
pub struct GainState {
    current: f32,
}

impl EffectState for GainState {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Gain driven by the meta-parameter: 0.0 = silence, 0.5 = unity, 1.0 = +6 dB
pub struct GainProcessor;

impl EffectProcessor for GainProcessor {
    fn process(&mut self, state: &mut dyn EffectState, buffer: &mut [StereoSample], params: &EffectProcessParams) {
        let Some(state) = state.as_any_mut().downcast_mut::<GainState>() else {
            return;
        };
        let target = (params.meta_parameter.clamp(0.0, 1.0) * 2.0) as f32;
        for sample in buffer.iter_mut() {
            state.current += (target - state.current) * GAIN_SMOOTHING;
            *sample = sample.scale(state.current);
        }
    }
}

struct GainFactory;

impl EffectFactory for GainFactory {
    fn instantiate(&self) -> Box<dyn EffectProcessor> {
        Box::new(GainProcessor)
    }

    fn create_state(&self) -> Box<dyn EffectState> {
        // Start at unity so enabling a channel doesn't fade in from silence
        Box::new(GainState { current: 1.0 })
    }
}

/// Polarity inversion, no parameters
pub struct InvertProcessor;

/// Stateless effects still get an (empty) state per channel
#[derive(Debug, Default)]
pub struct EmptyState;

impl EffectState for EmptyState {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl EffectProcessor for InvertProcessor {
    fn process(&mut self, _state: &mut dyn EffectState, buffer: &mut [StereoSample], _params: &EffectProcessParams) {
        for sample in buffer.iter_mut() {
            *sample = sample.scale(-1.0);
        }
    }
}

struct InvertFactory;

impl EffectFactory for InvertFactory {
    fn instantiate(&self) -> Box<dyn EffectProcessor> {
        Box::new(InvertProcessor)
    }

    fn create_state(&self) -> Box<dyn EffectState> {
        Box::new(EmptyState)
    }
}

pub(crate) fn register_builtins(registry: &mut EffectsRegistry) {
    let builtins: [(EffectManifest, Arc<dyn EffectFactory>); 2] = [
        (
            EffectManifest::new("gain", "Gain", EffectBackendType::BuiltIn),
            Arc::new(GainFactory),
        ),
        (
            EffectManifest::new("invert", "Invert", EffectBackendType::BuiltIn)
                .with_default_meta_parameter(0.0),
            Arc::new(InvertFactory),
        ),
    ];
    for (manifest, factory) in builtins {
        if let Err(e) = registry.register(manifest, factory) {
            log::warn!("register_builtins: {}", e);
        }
    }
}

use std::f64::consts::PI;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DahditError;
use crate::morse::MorseSymbol;
use crate::timing::Timing;

const BELL_SECS: f64 = 0.35;
const BELL_FREQUENCY_HZ: f64 = 1000.0;
const BELL_DECAY: f64 = 6.0;
const BELL_AMPLITUDE: f64 = 0.45;

/// Sidetone configuration, fixed for the length of a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneSpec {
    pub frequency_hz: f64,
    pub sample_rate: u32,
    /// Linear attack and release length at each tone edge
    pub envelope_ms: f64,
    pub amplitude: f64,
}

impl Default for ToneSpec {
    fn default() -> Self {
        Self {
            frequency_hz: 800.0,
            sample_rate: 44_100,
            envelope_ms: 5.0,
            amplitude: 0.3,
        }
    }
}

impl ToneSpec {
    /// Checks that don't depend on speed
    pub fn validate(&self) -> Result<(), DahditError> {
        if !self.frequency_hz.is_finite() || self.frequency_hz <= 0.0 {
            return Err(DahditError::InvalidToneSpec(format!(
                "frequency must be positive, got {} Hz",
                self.frequency_hz
            )));
        }
        if self.sample_rate == 0 {
            return Err(DahditError::InvalidToneSpec(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.frequency_hz >= self.sample_rate as f64 / 2.0 {
            return Err(DahditError::InvalidToneSpec(format!(
                "{} Hz is above the Nyquist limit of {} Hz",
                self.frequency_hz,
                self.sample_rate / 2
            )));
        }
        if !self.envelope_ms.is_finite() || self.envelope_ms < 0.0 {
            return Err(DahditError::InvalidToneSpec(format!(
                "envelope must not be negative, got {} ms",
                self.envelope_ms
            )));
        }
        if !(self.amplitude > 0.0 && self.amplitude <= 1.0) {
            return Err(DahditError::InvalidToneSpec(format!(
                "amplitude must be in (0, 1], got {}",
                self.amplitude
            )));
        }
        Ok(())
    }

    /// Full check against a speed: the envelope may not outlast a dot
    pub fn validate_for(&self, timing: &Timing) -> Result<(), DahditError> {
        self.validate()?;
        if self.envelope_ms > timing.dot_ms() {
            return Err(DahditError::InvalidToneSpec(format!(
                "envelope of {} ms is longer than a {:.1} ms dot at {} wpm",
                self.envelope_ms,
                timing.dot_ms(),
                timing.wpm()
            )));
        }
        Ok(())
    }

    fn samples_for_ms(&self, ms: f64) -> usize {
        (ms / 1000.0 * self.sample_rate as f64).round() as usize
    }
}

/// Mono audio for one prompt
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTone {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl RenderedTone {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Render one character: keyed tones separated by intra-character silence.
///
/// No trailing gap is appended; spacing between characters belongs to the caller.
pub fn render(
    symbols: &[MorseSymbol],
    timing: &Timing,
    spec: &ToneSpec,
) -> Result<RenderedTone, DahditError> {
    spec.validate_for(timing)?;

    let gap_len = spec.samples_for_ms(timing.intra_gap_ms());
    let ramp_len = spec.samples_for_ms(spec.envelope_ms);
    let mut samples = Vec::with_capacity(spec.samples_for_ms(timing.character_ms(symbols)));

    for (idx, &symbol) in symbols.iter().enumerate() {
        if idx > 0 {
            samples.extend(std::iter::repeat(0.0).take(gap_len));
        }
        let tone_len = spec.samples_for_ms(timing.symbol_ms(symbol));
        push_keyed_tone(&mut samples, tone_len, ramp_len, spec);
    }

    Ok(RenderedTone {
        samples,
        sample_rate: spec.sample_rate,
    })
}

fn push_keyed_tone(out: &mut Vec<f32>, len: usize, ramp_len: usize, spec: &ToneSpec) {
    let ramp = ramp_len.min(len / 2);
    let step = 2.0 * PI * spec.frequency_hz / spec.sample_rate as f64;

    out.extend((0..len).map(|i| {
        let gain = if ramp == 0 {
            1.0
        } else {
            let edge = i.min(len - 1 - i);
            (edge as f64 / ramp as f64).min(1.0)
        };
        (spec.amplitude * gain * (step * i as f64).sin()) as f32
    }));
}

/// End-of-session bell: a short exponentially decaying sine
pub fn render_bell(sample_rate: u32) -> RenderedTone {
    let len = (BELL_SECS * sample_rate as f64).round() as usize;
    let samples = (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let decay = (-BELL_DECAY * t).exp();
            (BELL_AMPLITUDE * decay * (2.0 * PI * BELL_FREQUENCY_HZ * t).sin()) as f32
        })
        .collect();
    RenderedTone {
        samples,
        sample_rate,
    }
}

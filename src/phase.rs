//! Respiratory phase detection
//!
//! The respiration sensor is compared against a threshold that is re-read from the
//! potentiometer on every update, so the operator can tune it during a trial. A second, lower
//! threshold forms a hysteresis band: between the two the previous phase is held.
use serde::{Deserialize, Serialize};

use crate::{config::ThresholdConfig, io::AnalogInput, Error};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Inspiration,
    Expiration,
}

/// The up and down thresholds in sensor units.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Threshold {
    pub up: u16,
    pub down: u16,
}

impl Threshold {
    /// Map a raw potentiometer code onto the configured threshold range.
    pub fn map(config: &ThresholdConfig, raw: u16) -> Self {
        let span = config.high.saturating_sub(config.low) as u32;
        let up = config.low as u32
            + raw.min(config.raw_max) as u32 * span / config.raw_max.max(1) as u32;
        let up = up as u16;
        Self {
            up,
            down: (up as f32 * config.hysteresis) as u16,
        }
    }

    /// Classify a sensor value. Values within the band return `previous`.
    pub fn classify(&self, value: u16, previous: Option<Phase>) -> Option<Phase> {
        if value > self.up {
            Some(Phase::Inspiration)
        } else if value < self.down {
            Some(Phase::Expiration)
        } else {
            previous
        }
    }
}

/// Result of one detector update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub value: u16,
    pub threshold: Threshold,
    /// The latched phase after this sample.
    pub phase: Option<Phase>,
    /// Set if this sample changed the latched phase.
    pub entered: Option<Phase>,
}

pub struct PhaseDetector<S, P> {
    sensor: S,
    pot: P,
    config: ThresholdConfig,
    phase: Option<Phase>,
}

impl<S: AnalogInput, P: AnalogInput> PhaseDetector<S, P> {
    pub fn new(sensor: S, pot: P, config: ThresholdConfig) -> Self {
        Self {
            sensor,
            pot,
            config,
            phase: None,
        }
    }

    /// Read the potentiometer and compute the current thresholds.
    pub fn threshold(&mut self) -> Result<Threshold, Error> {
        let raw = self.pot.read()?;
        Ok(Threshold::map(&self.config, raw))
    }

    /// Sample the sensor and the threshold and update the latched phase.
    pub fn update(&mut self) -> Result<Sample, Error> {
        let value = self.sensor.read()?;
        let threshold = self.threshold()?;
        let phase = threshold.classify(value, self.phase);
        let entered = if phase != self.phase { phase } else { None };
        if let Some(p) = entered {
            log::debug!("{:?} at {} (threshold {})", p, value, threshold.up);
        }
        self.phase = phase;
        Ok(Sample {
            value,
            threshold,
            phase,
            entered,
        })
    }

    /// The latched phase, `None` until the first classification.
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    /// Forget the latched phase.
    pub fn reset(&mut self) {
        self.phase = None;
    }
}

//! Startup configuration
//!
//! Everything that used to be a compile-time constant of a particular rig revision (threshold
//! mapping, PWM resolution, DAC scaling) lives here with documented defaults.
use serde::{Deserialize, Serialize};

use crate::{io::MAX_DURATION, protocol::Protocol, Error};

/// Maximum number of protocols in a settings document.
pub const MAX_PROTOCOLS: usize = 16;

/// Kernel clock of the timer generating the PWM carrier.
///
/// The counter needs at least one tick per duty level, which bounds the carrier frequency from
/// above for a given resolution.
pub const PWM_TIMER_CLOCK_HZ: u32 = 200_000_000;

/// Binary PWM output configuration.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PwmConfig {
    /// Number of duty levels is `2^resolution_bits`.
    pub resolution_bits: u8,
    /// PWM carrier frequency in Hertz.
    pub frequency_hz: f32,
}

impl PwmConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(1..=15).contains(&self.resolution_bits) {
            return Err(Error::Config("PWM resolution out of range"));
        }
        let max = (PWM_TIMER_CLOCK_HZ >> self.resolution_bits) as f32;
        if !(self.frequency_hz >= 1.0 && self.frequency_hz <= max) {
            return Err(Error::Config("PWM frequency out of range"));
        }
        Ok(())
    }
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            resolution_bits: 4,
            frequency_hz: 73_242.19,
        }
    }
}

/// Sigmoidal analog output configuration.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SigmoidConfig {
    /// DAC resolution in bits.
    pub dac_bits: u8,
    /// DAC reference voltage.
    pub v_ref: f32,
    /// Idle voltage just below the laser emission threshold.
    pub null_voltage: f32,
    /// Duration of the on and off ramps in microseconds.
    pub rise_time_us: u32,
    /// Logistic steepness over the normalized ramp time.
    pub steepness: f32,
}

impl SigmoidConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(1..=16).contains(&self.dac_bits) {
            return Err(Error::Config("DAC resolution out of range"));
        }
        if !(self.v_ref >= 1.0 && self.v_ref.is_finite()) {
            return Err(Error::Config("DAC reference below full scale"));
        }
        if !(0.0..1.0).contains(&self.null_voltage) {
            return Err(Error::Config("Null voltage out of range"));
        }
        if !(self.steepness > 0.0 && self.steepness.is_finite()) {
            return Err(Error::Config("Invalid ramp steepness"));
        }
        if self.rise_time_us as u64 > MAX_DURATION.ticks() as u64 * 1000 {
            return Err(Error::Config("Ramp too long"));
        }
        Ok(())
    }
}

impl Default for SigmoidConfig {
    fn default() -> Self {
        Self {
            dac_bits: 12,
            v_ref: 3.3,
            null_voltage: 0.3,
            rise_time_us: 2000,
            steepness: 10.0,
        }
    }
}

/// Output strategy of the laser channel.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OutputConfig {
    /// Instantaneous on/off with a PWM level and a notify line.
    Binary(PwmConfig),
    /// Logistic ramps on an analog modulation input.
    Sigmoidal(SigmoidConfig),
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::Binary(PwmConfig::default())
    }
}

/// Potentiometer to threshold mapping.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Largest raw potentiometer code.
    pub raw_max: u16,
    /// Threshold at raw code 0, in sensor units.
    pub low: u16,
    /// Threshold at `raw_max`, in sensor units.
    pub high: u16,
    /// Down-threshold as a fraction of the threshold.
    pub hysteresis: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            raw_max: 8191,
            low: 4000,
            high: 5500,
            hysteresis: 0.9,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.raw_max == 0 {
            return Err(Error::Config("Zero potentiometer range"));
        }
        if self.high < self.low {
            return Err(Error::Config("Inverted threshold range"));
        }
        if !(self.hysteresis > 0.0 && self.hysteresis <= 1.0) {
            return Err(Error::Config("Hysteresis out of range"));
        }
        Ok(())
    }
}

/// Known rig revisions.
///
/// The two revisions disagree on the lower bound of the threshold range. Both are kept as
/// presets until the rigs are recalibrated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Revision {
    /// 12-bit DAC driving the analog modulation input, sigmoidal ramps.
    AnalogCobalt,
    /// Digital modulation input driven by PWM, with a notify line.
    DigitalPwm,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub output: OutputConfig,
    pub threshold: ThresholdConfig,
}

impl Config {
    /// Configuration preset of a rig revision.
    pub fn revision(revision: Revision) -> Self {
        match revision {
            Revision::AnalogCobalt => Self {
                output: OutputConfig::Sigmoidal(SigmoidConfig::default()),
                threshold: ThresholdConfig {
                    low: 3000,
                    ..Default::default()
                },
            },
            Revision::DigitalPwm => Self::default(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.threshold.validate()?;
        match self.output {
            OutputConfig::Binary(pwm) => pwm.validate(),
            OutputConfig::Sigmoidal(sigm) => sigm.validate(),
        }
    }
}

/// The settings document the firmware runs at startup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub config: Config,
    pub protocols: heapless::Vec<Protocol, MAX_PROTOCOLS>,
}

impl Settings {
    /// Parse and validate a JSON settings document.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let (settings, _): (Self, _) = serde_json_core::from_str(json)
            .map_err(|_| Error::Config("Malformed settings"))?;
        settings.config.validate()?;
        Ok(settings)
    }
}

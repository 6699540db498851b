//! Laser output strategies
//!
//! The laser channel is driven either instantaneously by a PWM pin ([BinaryPwm]) or by a DAC
//! following logistic ramps ([SigmoidalAnalog]). Both implement [Output]; the strategy is fixed
//! when the driver is constructed. [AnyOutput] selects one of them from an [OutputConfig] at
//! startup.
use embedded_hal::digital::OutputPin;

use crate::{
    config::{OutputConfig, PwmConfig, SigmoidConfig},
    io::{AnalogOutput, Clock, Duration, PwmOutput},
    Error,
};

/// Check an amplitude and saturate it at full scale.
pub fn amplitude(amp: f32) -> Result<f32, Error> {
    if !amp.is_finite() || amp < 0.0 {
        return Err(Error::InvalidParameter("Amplitude"));
    }
    Ok(amp.min(1.0))
}

/// A laser output channel.
pub trait Output {
    /// Drive the idle level after power-up.
    fn init(&mut self) -> Result<(), Error> {
        self.idle()
    }

    /// Turn the light on at the normalized amplitude `amp`.
    fn turn_on<C: Clock>(&mut self, clock: &mut C, amp: f32) -> Result<(), Error>;

    /// Return the light from amplitude `amp` to idle.
    fn turn_off<C: Clock>(&mut self, clock: &mut C, amp: f32) -> Result<(), Error>;

    /// Force the idle level immediately.
    fn idle(&mut self) -> Result<(), Error>;
}

/// Instantaneous PWM output with a laser-on notify line.
///
/// The notify line rises before the output turns on and falls after it turns off. Downstream
/// acquisition uses its edges as the laser-on marker.
pub struct BinaryPwm<P, N> {
    pwm: P,
    notify: N,
    levels: u16,
}

impl<P: PwmOutput, N: OutputPin> BinaryPwm<P, N> {
    pub fn new(pwm: P, notify: N, config: &PwmConfig) -> Result<Self, Error> {
        config.validate()?;
        let levels = 1 << config.resolution_bits;
        if pwm.max_duty() == 0 {
            return Err(Error::HardwareUnavailable("PWM"));
        }
        Ok(Self {
            pwm,
            notify,
            levels,
        })
    }

    /// The duty level for an amplitude. `levels()` and above are full scale.
    pub fn level(&self, amp: f32) -> u16 {
        (amp * self.levels as f32) as u16
    }

    pub fn levels(&self) -> u16 {
        self.levels
    }

    fn duty(&self, level: u16) -> u16 {
        (level as u32 * self.pwm.max_duty() as u32 / self.levels as u32) as u16
    }
}

impl<P: PwmOutput, N: OutputPin> Output for BinaryPwm<P, N> {
    fn turn_on<C: Clock>(
        &mut self,
        _clock: &mut C,
        amp: f32,
    ) -> Result<(), Error> {
        let level = self.level(amplitude(amp)?);
        self.notify.set_high()?;
        if level >= self.levels {
            self.pwm.set_high()?;
        } else {
            self.pwm.set_duty(self.duty(level))?;
        }
        Ok(())
    }

    fn turn_off<C: Clock>(
        &mut self,
        _clock: &mut C,
        _amp: f32,
    ) -> Result<(), Error> {
        self.idle()
    }

    fn idle(&mut self) -> Result<(), Error> {
        // Notify must not fall while the output may still be on.
        self.pwm.set_low()?;
        self.notify.set_low()?;
        Ok(())
    }
}

/// Logistic function over normalized time `t` in `[0, 1]`.
fn logistic(steepness: f32, t: f32) -> f32 {
    1.0 / (1.0 + num_traits::Float::exp(-steepness * (t - 0.5)))
}

/// DAC output ramping between a null voltage and the target along a logistic curve.
///
/// The ramps busy-wait for the whole rise time, updating the DAC on every iteration.
pub struct SigmoidalAnalog<D> {
    dac: D,
    base: f32,
    codes_per_volt: f32,
    rise: Duration,
    steepness: f32,
}

impl<D: AnalogOutput> SigmoidalAnalog<D> {
    pub fn new(dac: D, config: &SigmoidConfig) -> Result<Self, Error> {
        config.validate()?;
        let range = ((1u32 << config.dac_bits) - 1) as f32;
        if (dac.max_code() as f32) < range {
            return Err(Error::HardwareUnavailable("DAC resolution"));
        }
        let codes_per_volt = range / config.v_ref;
        Ok(Self {
            dac,
            base: config.null_voltage * codes_per_volt,
            codes_per_volt,
            rise: Duration::from_ticks(config.rise_time_us),
            steepness: config.steepness,
        })
    }

    /// The idle DAC code.
    pub fn base(&self) -> u16 {
        self.base as u16
    }

    /// The DAC code at the end of a ramp to `amp` (volts on the modulation input).
    pub fn target(&self, amp: f32) -> u16 {
        (amp * self.codes_per_volt) as u16
    }

    fn ramp<C: Clock>(
        &mut self,
        clock: &mut C,
        amp: f32,
        rising: bool,
    ) -> Result<(), Error> {
        let target = amp * self.codes_per_volt;
        let start = clock.now();
        loop {
            let elapsed = clock.elapsed(start);
            if elapsed >= self.rise {
                break;
            }
            let t = elapsed.ticks() as f32 / self.rise.ticks() as f32;
            let s = logistic(self.steepness, t);
            let s = if rising { s } else { 1.0 - s };
            self.dac.set_code((self.base + s * (target - self.base)) as u16)?;
        }
        let end = if rising { target } else { self.base };
        self.dac.set_code(end as u16)?;
        Ok(())
    }
}

impl<D: AnalogOutput> Output for SigmoidalAnalog<D> {
    fn turn_on<C: Clock>(&mut self, clock: &mut C, amp: f32) -> Result<(), Error> {
        let amp = amplitude(amp)?;
        self.ramp(clock, amp, true)
    }

    fn turn_off<C: Clock>(
        &mut self,
        clock: &mut C,
        amp: f32,
    ) -> Result<(), Error> {
        let amp = amplitude(amp)?;
        self.ramp(clock, amp, false)
    }

    fn idle(&mut self) -> Result<(), Error> {
        self.dac.set_code(self.base())?;
        Ok(())
    }
}

/// Either output strategy, chosen from the configuration at startup.
pub enum AnyOutput<P, N, D> {
    Binary(BinaryPwm<P, N>),
    Sigmoidal(SigmoidalAnalog<D>),
}

impl<P: PwmOutput, N: OutputPin, D: AnalogOutput> AnyOutput<P, N, D> {
    /// Build the configured strategy. The peripherals of the other strategy are dropped.
    pub fn new(
        config: &OutputConfig,
        pwm: P,
        notify: N,
        dac: D,
    ) -> Result<Self, Error> {
        Ok(match config {
            OutputConfig::Binary(pwm_config) => {
                Self::Binary(BinaryPwm::new(pwm, notify, pwm_config)?)
            }
            OutputConfig::Sigmoidal(sigm_config) => {
                Self::Sigmoidal(SigmoidalAnalog::new(dac, sigm_config)?)
            }
        })
    }
}

impl<P: PwmOutput, N: OutputPin, D: AnalogOutput> Output for AnyOutput<P, N, D> {
    fn turn_on<C: Clock>(&mut self, clock: &mut C, amp: f32) -> Result<(), Error> {
        match self {
            Self::Binary(o) => o.turn_on(clock, amp),
            Self::Sigmoidal(o) => o.turn_on(clock, amp),
        }
    }

    fn turn_off<C: Clock>(
        &mut self,
        clock: &mut C,
        amp: f32,
    ) -> Result<(), Error> {
        match self {
            Self::Binary(o) => o.turn_off(clock, amp),
            Self::Sigmoidal(o) => o.turn_off(clock, amp),
        }
    }

    fn idle(&mut self) -> Result<(), Error> {
        match self {
            Self::Binary(o) => o.idle(),
            Self::Sigmoidal(o) => o.idle(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::{Drive, Line, SimClock, SimDac, SimPin, SimPwm, World};

    fn binary(world: &crate::sim::Sim) -> BinaryPwm<SimPwm, SimPin> {
        BinaryPwm::new(
            SimPwm::new(world),
            SimPin::new(world),
            &PwmConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn amplitude_checks() {
        assert_eq!(amplitude(0.25), Ok(0.25));
        assert_eq!(amplitude(3.0), Ok(1.0));
        assert!(amplitude(-0.1).is_err());
        assert!(amplitude(f32::NAN).is_err());
    }

    #[test]
    fn binary_levels() {
        let world = World::new(10);
        let out = binary(&world);
        assert_eq!(out.levels(), 16);
        assert_eq!(out.level(0.5), 8);
        assert_eq!(out.level(0.25), 4);
        assert_eq!(out.level(0.99), 15);
        assert_eq!(out.level(1.0), 16);
    }

    #[test]
    fn binary_notify_ordering() {
        let world = World::new(10);
        let mut clock = SimClock::new(&world);
        let mut out = binary(&world);
        out.turn_on(&mut clock, 0.5).unwrap();
        out.turn_off(&mut clock, 0.5).unwrap();
        let lines: std::vec::Vec<Line> =
            world.events().iter().map(|e| e.line).collect();
        assert_eq!(
            lines,
            [
                Line::Notify(true),
                Line::Pwm(Drive::Duty(8 * SimPwm::MAX_DUTY / 16)),
                Line::Pwm(Drive::Low),
                Line::Notify(false),
            ]
        );
    }

    #[test]
    fn binary_full_scale_is_static_high() {
        let world = World::new(10);
        let mut clock = SimClock::new(&world);
        let mut out = binary(&world);
        out.turn_on(&mut clock, 1.0).unwrap();
        // Idempotent: the level is simply set again.
        out.turn_on(&mut clock, 1.0).unwrap();
        let events = world.events();
        assert_eq!(events[1].line, Line::Pwm(Drive::High));
        assert_eq!(events[3].line, Line::Pwm(Drive::High));
        assert!(!events
            .iter()
            .any(|e| e.line == Line::Pwm(Drive::Duty(SimPwm::MAX_DUTY))));
    }

    #[test]
    fn binary_rejects_before_touching_pins() {
        let world = World::new(10);
        let mut clock = SimClock::new(&world);
        let mut out = binary(&world);
        assert!(out.turn_on(&mut clock, f32::NAN).is_err());
        assert!(world.events().is_empty());
    }

    #[test]
    fn sigmoid_ramps() {
        let world = World::new(10);
        let mut clock = SimClock::new(&world);
        let config = SigmoidConfig::default();
        let mut out = SigmoidalAnalog::new(SimDac::new(&world), &config).unwrap();
        assert_eq!(out.base(), 372);
        assert_eq!(out.target(1.0), 1240);

        out.init().unwrap();
        let start = world.now();
        out.turn_on(&mut clock, 1.0).unwrap();
        let rise = world.now() - start;
        assert!((2000..2100).contains(&rise));

        let codes = world.dac_codes();
        assert_eq!(codes[0], 372);
        assert!(codes.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*codes.last().unwrap(), 1240);
        // The ramp passes through the midpoint half way.
        assert!(codes.iter().any(|&c| (780..830).contains(&c)));

        out.turn_off(&mut clock, 1.0).unwrap();
        let codes = world.dac_codes();
        let fall = &codes[codes.iter().rposition(|&c| c == 1240).unwrap()..];
        assert!(fall.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(*fall.last().unwrap(), 372);
    }

    #[test]
    fn sigmoid_requires_dac_resolution() {
        let world = World::new(10);
        let config = SigmoidConfig {
            dac_bits: 16,
            ..Default::default()
        };
        assert!(matches!(
            SigmoidalAnalog::new(SimDac::new(&world), &config),
            Err(Error::HardwareUnavailable(_))
        ));
    }

    #[test]
    fn sigmoid_rejects_invalid_scaling() {
        let world = World::new(10);
        for config in [
            SigmoidConfig {
                v_ref: 0.0,
                ..Default::default()
            },
            SigmoidConfig {
                steepness: f32::NAN,
                ..Default::default()
            },
            SigmoidConfig {
                null_voltage: -0.5,
                ..Default::default()
            },
            SigmoidConfig {
                rise_time_us: u32::MAX,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                SigmoidalAnalog::new(SimDac::new(&world), &config),
                Err(Error::Config(_))
            ));
        }
        assert!(world.events().is_empty());
    }

    #[test]
    fn binary_rejects_invalid_carrier() {
        let world = World::new(10);
        let config = PwmConfig {
            frequency_hz: 50.0e6,
            ..Default::default()
        };
        assert!(matches!(
            BinaryPwm::new(SimPwm::new(&world), SimPin::new(&world), &config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn any_output_follows_config() {
        let world = World::new(10);
        let mut clock = SimClock::new(&world);
        let config = OutputConfig::Sigmoidal(SigmoidConfig::default());
        let mut out = AnyOutput::new(
            &config,
            SimPwm::new(&world),
            SimPin::new(&world),
            SimDac::new(&world),
        )
        .unwrap();
        assert!(matches!(out, AnyOutput::Sigmoidal(_)));
        out.turn_on(&mut clock, 0.5).unwrap();
        out.idle().unwrap();
        assert!(world
            .events()
            .iter()
            .all(|e| matches!(e.line, Line::Dac(_))));
        assert_eq!(*world.dac_codes().last().unwrap(), 372);
    }
}

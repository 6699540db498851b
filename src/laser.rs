//! Open-loop pulse and train generation
//!
//! [Laser] owns the output channel and the clock. Every operation validates its parameters before
//! touching the output and drives the output back to idle on any error.
use fugit::MillisDurationU32;

use crate::{
    io::{micros, AnalogInput, Clock, Duration, MAX_DURATION},
    output::{amplitude, Output},
    Error,
};

/// Number of pulses in a standard tagging run.
pub const TAGGING_PULSES: u32 = 75;

/// Pulse length and interval of the tagging protocol.
const TAGGING_PULSE: MillisDurationU32 = MillisDurationU32::from_ticks(10);
const TAGGING_INTERVAL: MillisDurationU32 = MillisDurationU32::from_ticks(5000);

/// Power meter sampling: settling time, number of readings and their spacing.
const POWER_SETTLE: MillisDurationU32 = MillisDurationU32::from_ticks(100);
const POWER_READINGS: u32 = 20;
const POWER_INTERVAL: MillisDurationU32 = MillisDurationU32::from_ticks(5);

/// Headroom left when a pulse is clamped to the train duration.
const CLAMP_MARGIN: Duration = Duration::from_ticks(5000);

/// Convert a pulse frequency into a period on the clock.
fn period(freq_hz: f32) -> Result<Duration, Error> {
    if !freq_hz.is_finite() || freq_hz <= 0.0 {
        return Err(Error::InvalidParameter("Frequency"));
    }
    let period = 1e6 / freq_hz;
    if period < 1e3 {
        return Err(Error::InvalidParameter("Frequency above 1 kHz"));
    }
    if period > (MAX_DURATION.ticks() as f32 * 1e3) {
        return Err(Error::InvalidParameter("Frequency too low"));
    }
    Ok(Duration::from_ticks(period as u32))
}

/// Validated timing of a pulse train.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrainTiming {
    pub period: Duration,
    pub pulse: Duration,
    pub train: Duration,
}

impl TrainTiming {
    /// Timing of `freq_hz` pulses of length `pulse` over `train`.
    ///
    /// A pulse longer than the train is clamped to 5 ms less than the train.
    pub fn new(
        freq_hz: f32,
        pulse: MillisDurationU32,
        train: MillisDurationU32,
    ) -> Result<Self, Error> {
        let period = period(freq_hz)?;
        let pulse = micros(pulse)?;
        Self::build(period, pulse, micros(train)?)
    }

    /// Timing of a train with pulses covering `duty` of each period. Duty saturates at 1.
    pub fn duty(
        freq_hz: f32,
        duty: f32,
        train: MillisDurationU32,
    ) -> Result<Self, Error> {
        if !duty.is_finite() || duty <= 0.0 {
            return Err(Error::InvalidParameter("Duty cycle"));
        }
        let period = period(freq_hz)?;
        let pulse =
            Duration::from_ticks((period.ticks() as f32 * duty.min(1.0)) as u32);
        Self::build(period, pulse, micros(train)?)
    }

    fn build(
        period: Duration,
        mut pulse: Duration,
        train: Duration,
    ) -> Result<Self, Error> {
        if train.ticks() == 0 {
            return Err(Error::InvalidParameter("Empty train"));
        }
        if pulse > train {
            let clamped =
                Duration::from_ticks(train.ticks().saturating_sub(CLAMP_MARGIN.ticks()));
            log::warn!(
                "Pulse of {} us exceeds train of {} us, clamped to {} us",
                pulse.ticks(),
                train.ticks(),
                clamped.ticks()
            );
            pulse = clamped;
        }
        if pulse > period {
            return Err(Error::InvalidParameter("Pulse longer than period"));
        }
        Ok(Self {
            period,
            pulse,
            train,
        })
    }
}

pub struct Laser<O, C> {
    output: O,
    clock: C,
}

impl<O: Output, C: Clock> Laser<O, C> {
    /// Take ownership of the output channel and drive it idle.
    pub fn new(mut output: O, clock: C) -> Result<Self, Error> {
        output
            .init()
            .map_err(|_| Error::HardwareUnavailable("Laser output"))?;
        Ok(Self { output, clock })
    }

    pub fn clock(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn turn_on(&mut self, amp: f32) -> Result<(), Error> {
        let amp = amplitude(amp)?;
        self.guard(|l| l.output.turn_on(&mut l.clock, amp))
    }

    pub fn turn_off(&mut self, amp: f32) -> Result<(), Error> {
        let amp = amplitude(amp)?;
        self.guard(|l| l.output.turn_off(&mut l.clock, amp))
    }

    /// Force the idle level immediately.
    pub fn idle(&mut self) -> Result<(), Error> {
        self.guard(|l| l.output.idle())
    }

    /// Best effort return to idle. Failures are logged and otherwise ignored.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.output.idle() {
            log::warn!("Laser shutdown failed: {}", e);
        }
    }

    /// Run `f`, shutting the output down if it fails.
    pub(crate) fn guard<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let result = f(self);
        if result.is_err() {
            self.shutdown();
        }
        result
    }

    pub fn delay(&mut self, duration: MillisDurationU32) -> Result<(), Error> {
        let duration = micros(duration)?;
        self.clock.delay(duration);
        Ok(())
    }

    /// One on/off cycle at `amp` lasting `duration`.
    pub fn pulse(
        &mut self,
        amp: f32,
        duration: MillisDurationU32,
    ) -> Result<(), Error> {
        let amp = amplitude(amp)?;
        let duration = micros(duration)?;
        self.emit(amp, duration)
    }

    /// Emit one pulse with already validated parameters.
    pub(crate) fn emit(&mut self, amp: f32, duration: Duration) -> Result<(), Error> {
        self.guard(|l| {
            l.output.turn_on(&mut l.clock, amp)?;
            l.clock.delay(duration);
            l.output.turn_off(&mut l.clock, amp)
        })
    }

    /// Pulses of `pulse` at `freq_hz` for the duration of `train`.
    pub fn train(
        &mut self,
        amp: f32,
        freq_hz: f32,
        pulse: MillisDurationU32,
        train: MillisDurationU32,
    ) -> Result<(), Error> {
        let amp = amplitude(amp)?;
        let timing = TrainTiming::new(freq_hz, pulse, train)?;
        self.run_train(amp, &timing)
    }

    /// Pulses covering `duty` of each period at `freq_hz` for the duration of `train`.
    pub fn train_duty(
        &mut self,
        amp: f32,
        freq_hz: f32,
        duty: f32,
        train: MillisDurationU32,
    ) -> Result<(), Error> {
        let amp = amplitude(amp)?;
        let timing = TrainTiming::duty(freq_hz, duty, train)?;
        self.run_train(amp, &timing)
    }

    /// Onsets are scheduled from the train start so that pulse overhead does not accumulate.
    fn run_train(&mut self, amp: f32, timing: &TrainTiming) -> Result<(), Error> {
        let start = self.clock.now();
        let mut onset = Duration::from_ticks(0);
        let mut count = 0u32;
        while onset < timing.train {
            self.clock.wait(start, onset);
            self.emit(amp, timing.pulse)?;
            onset = onset + timing.period;
            count += 1;
        }
        self.clock.wait(start, onset);
        log::debug!("Train of {} pulses done", count);
        Ok(())
    }

    /// `count` pulses, each followed by `interval`.
    pub fn run_multiple_pulses(
        &mut self,
        count: u32,
        amp: f32,
        pulse: MillisDurationU32,
        interval: MillisDurationU32,
    ) -> Result<(), Error> {
        let amp = amplitude(amp)?;
        let pulse = micros(pulse)?;
        let interval = micros(interval)?;
        for _ in 0..count {
            self.emit(amp, pulse)?;
            self.clock.delay(interval);
        }
        Ok(())
    }

    /// `count` trains, each followed by `interval`.
    pub fn run_multiple_trains(
        &mut self,
        count: u32,
        amp: f32,
        freq_hz: f32,
        pulse: MillisDurationU32,
        train: MillisDurationU32,
        interval: MillisDurationU32,
    ) -> Result<(), Error> {
        let amp = amplitude(amp)?;
        let timing = TrainTiming::new(freq_hz, pulse, train)?;
        let interval = micros(interval)?;
        for _ in 0..count {
            self.run_train(amp, &timing)?;
            self.clock.delay(interval);
        }
        Ok(())
    }

    /// Optotagging: 10 ms full scale pulses 5 s apart.
    pub fn run_tagging(&mut self, count: u32) -> Result<(), Error> {
        log::info!("Tagging with {} pulses", count);
        self.run_multiple_pulses(count, 1.0, TAGGING_PULSE, TAGGING_INTERVAL)
    }

    /// Turn on at `amp` and return the mean power meter reading once settled.
    pub fn measure_power<M: AnalogInput>(
        &mut self,
        amp: f32,
        meter: &mut M,
    ) -> Result<u16, Error> {
        let amp = amplitude(amp)?;
        let settle = micros(POWER_SETTLE)?;
        let interval = micros(POWER_INTERVAL)?;
        self.guard(|l| {
            l.output.turn_on(&mut l.clock, amp)?;
            l.clock.delay(settle);
            let mut sum = 0u32;
            for _ in 0..POWER_READINGS {
                sum += meter.read()? as u32;
                l.clock.delay(interval);
            }
            l.output.turn_off(&mut l.clock, amp)?;
            Ok((sum / POWER_READINGS) as u16)
        })
    }
}

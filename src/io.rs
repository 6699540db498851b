//! Pin and peripheral abstraction
//!
//! The stimulation core only touches hardware through the traits in this module. Digital lines
//! use the embedded-hal [OutputPin](embedded_hal::digital::OutputPin) directly. The analog and
//! PWM channels reuse the embedded-hal digital [ErrorType] so that every board error maps onto a
//! single [ErrorKind](embedded_hal::digital::ErrorKind).
use embedded_hal::digital::ErrorType;
use fugit::{MicrosDurationU32, MillisDurationU32, TimerInstantU32};

use crate::Error;

/// A point in time on the 32-bit microsecond monotonic clock.
pub type Instant = TimerInstantU32<1_000_000>;

/// A span on the 32-bit microsecond monotonic clock.
pub type Duration = MicrosDurationU32;

/// The longest duration accepted for any single timed parameter.
///
/// Busy-wait comparisons are done on a wrapping 32-bit microsecond counter. Keeping every
/// duration (and the sum of a train duration and its period) below half of the wrap range keeps
/// the wrap-aware instant comparisons unambiguous.
pub const MAX_DURATION: MillisDurationU32 = MillisDurationU32::from_ticks(600_000);

/// Convert a millisecond parameter into clock units.
pub fn micros(duration: MillisDurationU32) -> Result<Duration, Error> {
    if duration > MAX_DURATION {
        return Err(Error::InvalidParameter("Duration too long"));
    }
    Ok(Duration::from_ticks(duration.ticks() * 1000))
}

/// A single-ended analog input, e.g. an ADC channel.
pub trait AnalogInput: ErrorType {
    /// Perform one blocking conversion and return the raw code.
    fn read(&mut self) -> Result<u16, Self::Error>;
}

/// A single-ended analog output, e.g. a DAC channel.
pub trait AnalogOutput: ErrorType {
    /// The code corresponding to the reference voltage.
    fn max_code(&self) -> u16;

    /// Drive the output to `code`.
    fn set_code(&mut self, code: u16) -> Result<(), Self::Error>;
}

/// A PWM capable output pin.
///
/// Some PWM peripherals glitch at 100% duty cycle, so full scale is requested explicitly through
/// [PwmOutput::set_high] and implementations are expected to switch the pin to a static level.
pub trait PwmOutput: ErrorType {
    /// The duty value corresponding to a full period.
    fn max_duty(&self) -> u16;

    /// Output a PWM waveform with the given duty.
    fn set_duty(&mut self, duty: u16) -> Result<(), Self::Error>;

    /// Drive the pin statically high, not as a duty value.
    fn set_high(&mut self) -> Result<(), Self::Error>;

    /// Drive the pin statically low.
    fn set_low(&mut self) -> Result<(), Self::Error>;
}

/// A free-running monotonic microsecond clock.
///
/// All waits are busy-waits on this clock. Nothing else runs while an operation is in progress.
pub trait Clock {
    /// The current time. The counter is expected to wrap at `u32::MAX`.
    fn now(&mut self) -> Instant;

    /// Time elapsed since `since`, robust against counter wrap.
    fn elapsed(&mut self, since: Instant) -> Duration {
        self.now()
            .checked_duration_since(since)
            .unwrap_or(Duration::from_ticks(0))
    }

    /// Spin until `duration` has passed.
    fn delay(&mut self, duration: Duration) {
        let start = self.now();
        self.wait(start, duration);
    }

    /// Spin until `offset` has passed since `start`.
    fn wait(&mut self, start: Instant, offset: Duration) {
        while self.elapsed(start) < offset {}
    }
}

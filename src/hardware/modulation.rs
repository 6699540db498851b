//! Laser modulation outputs
//!
//! The digital modulation input is driven by TIM3 channel 1, the analog one by the internal
//! 12-bit DAC.
use core::convert::Infallible;

use embedded_hal::digital::ErrorType;
use embedded_hal_02::PwmPin;
use stm32h7xx_hal as hal;

use crate::io::{AnalogOutput, PwmOutput};

/// TIM3 channel 1 driving the digital modulation input.
///
/// Duty values are produced in PWM mode 1. Full scale and off are not duty values: the channel is
/// switched to forced active or forced inactive output compare mode, so the pin sits at a static
/// level independent of the timer period.
pub struct LaserPwm<P> {
    channel: P,
}

#[derive(Copy, Clone)]
enum Mode {
    Pwm,
    ForceHigh,
    ForceLow,
}

impl<P: PwmPin<Duty = u16>> LaserPwm<P> {
    pub fn new(mut channel: P) -> Self {
        channel.set_duty(0);
        channel.enable();
        let mut pwm = Self { channel };
        pwm.mode(Mode::ForceLow);
        pwm
    }

    fn mode(&mut self, mode: Mode) {
        // SAFETY: `channel` owns TIM3 channel 1 and only its OC1M field is touched. The other
        // channels of TIM3 are unused.
        let tim = unsafe { &*hal::stm32::TIM3::ptr() };
        tim.ccmr1_output().modify(|_, w| match mode {
            Mode::Pwm => w.oc1m().pwm_mode1(),
            Mode::ForceHigh => w.oc1m().force_active(),
            Mode::ForceLow => w.oc1m().force_inactive(),
        });
    }
}

impl<P> ErrorType for LaserPwm<P> {
    type Error = Infallible;
}

impl<P: PwmPin<Duty = u16>> PwmOutput for LaserPwm<P> {
    fn max_duty(&self) -> u16 {
        self.channel.get_max_duty()
    }

    fn set_duty(&mut self, duty: u16) -> Result<(), Infallible> {
        self.channel.set_duty(duty.min(self.channel.get_max_duty()));
        self.mode(Mode::Pwm);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.mode(Mode::ForceHigh);
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.mode(Mode::ForceLow);
        self.channel.set_duty(0);
        Ok(())
    }
}

/// DAC channel 1.
pub struct LaserDac {
    channel: hal::dac::C1<hal::stm32::DAC, hal::dac::Enabled>,
}

impl LaserDac {
    pub fn new(channel: hal::dac::C1<hal::stm32::DAC, hal::dac::Enabled>) -> Self {
        Self { channel }
    }
}

impl ErrorType for LaserDac {
    type Error = Infallible;
}

impl AnalogOutput for LaserDac {
    fn max_code(&self) -> u16 {
        0xfff
    }

    fn set_code(&mut self, code: u16) -> Result<(), Infallible> {
        self.channel.set_value(code.min(0xfff));
        Ok(())
    }
}

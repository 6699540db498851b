//! Single-ended inputs on the internal ADC
//!
//! The respiration sensor, the threshold potentiometer and the power meter are channels of the
//! same ADC. The converter is shared behind a mutex and each channel owns its pin.
use embedded_hal::digital::{self, ErrorType};
use embedded_hal_02::adc::{Channel, OneShot};
use stm32h7xx_hal as hal;

use crate::io::AnalogInput;

/// Converter codes are reduced to this resolution.
const RESOLUTION_BITS: u32 = 13;

#[derive(Debug, Copy, Clone)]
pub enum AdcError {
    Allocated,
    Conversion,
}

impl digital::Error for AdcError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

pub struct AdcChannel<'a, Adc, PIN> {
    pin: PIN,
    adc: &'a cortex_m::interrupt::Mutex<
        core::cell::RefCell<hal::adc::Adc<Adc, hal::adc::Enabled>>,
    >,
}

impl<Adc, PIN> ErrorType for AdcChannel<'_, Adc, PIN> {
    type Error = AdcError;
}

impl<Adc, PIN> AnalogInput for AdcChannel<'_, Adc, PIN>
where
    PIN: Channel<Adc, ID = u8>,
    hal::adc::Adc<Adc, hal::adc::Enabled>: OneShot<Adc, u32, PIN>,
{
    fn read(&mut self) -> Result<u16, AdcError> {
        let raw = cortex_m::interrupt::free(|cs| {
            let adc = self.adc.borrow(cs);
            adc.borrow_mut()
                .read(&mut self.pin)
                .map_err(|_| AdcError::Conversion)
        })?;
        Ok((raw >> (16 - RESOLUTION_BITS)) as u16)
    }
}

pub struct SharedAdc<Adc> {
    mutex: cortex_m::interrupt::Mutex<
        core::cell::RefCell<hal::adc::Adc<Adc, hal::adc::Enabled>>,
    >,
    allocated_channels: core::cell::RefCell<[bool; 20]>,
}

impl<Adc> SharedAdc<Adc> {
    /// The converter must run at 16 bit resolution.
    pub fn new(adc: hal::adc::Adc<Adc, hal::adc::Enabled>) -> Self {
        Self {
            mutex: cortex_m::interrupt::Mutex::new(core::cell::RefCell::new(
                adc,
            )),
            allocated_channels: core::cell::RefCell::new([false; 20]),
        }
    }

    pub fn create_channel<PIN: Channel<Adc, ID = u8>>(
        &self,
        pin: PIN,
    ) -> Result<AdcChannel<'_, Adc, PIN>, AdcError> {
        let mut channels = self.allocated_channels.borrow_mut();
        if channels[PIN::channel() as usize] {
            return Err(AdcError::Allocated);
        }

        channels[PIN::channel() as usize] = true;

        Ok(AdcChannel {
            pin,
            adc: &self.mutex,
        })
    }
}

//! Board constants
//!
//! Pin assignments:
//!
//! | Signal               | Pin  | Peripheral     |
//! |----------------------|------|----------------|
//! | Respiration sensor   | PC0  | ADC1 INP10     |
//! | Threshold pot        | PC1  | ADC1 INP11     |
//! | Power meter          | PA3  | ADC1 INP15     |
//! | Laser digital input  | PC6  | TIM3 CH1 (AF2) |
//! | Laser analog input   | PA4  | DAC1 OUT1      |
//! | Laser-on notify      | PB0  | GPIO           |
use stm32h7xx_hal::time::{Hertz, MegaHertz};

/// The CPU core clock. The microsecond clock counts core cycles.
pub const SYSCLK: MegaHertz = MegaHertz::MHz(400);

/// The external crystal.
pub const HSE: MegaHertz = MegaHertz::MHz(8);

/// Kernel clock of the internal ADC.
pub const ADC_CLOCK: Hertz = Hertz::MHz(25);

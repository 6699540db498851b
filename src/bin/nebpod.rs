//! # nebpod
//!
//! Runs the protocol sequence of the settings document compiled into the image, then parks the
//! laser at idle. Progress and power readings are logged over RTT.
#![no_std]
#![no_main]

use cortex_m_rt::entry;

use nebpod::{hardware, Settings};

/// The settings document run at startup.
const SETTINGS: &str = include_str!("../../settings.json");

#[entry]
fn main() -> ! {
    hardware::setup_logging();

    let settings = Settings::from_json(SETTINGS).unwrap();
    let core = cortex_m::Peripherals::take().unwrap();
    let device = hardware::hal::stm32::Peripherals::take().unwrap();
    let mut rig = hardware::setup(core, device, &settings.config).unwrap();

    match rig.run_all(&settings.protocols) {
        Ok(()) => log::info!("All protocols done"),
        Err(e) => log::error!("Aborted: {}", e),
    }
    rig.laser.shutdown();

    loop {
        cortex_m::asm::wfi();
    }
}

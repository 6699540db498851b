///! Module for all hardware-specific setup of the rig
pub use stm32h7xx_hal as hal;

mod cycle_counter;
mod delay;
pub mod design_parameters;
mod metadata;
mod modulation;
mod setup;
mod shared_adc;

pub use cycle_counter::CycleCounter;
pub use modulation::{LaserDac, LaserPwm};
pub use setup::{setup, setup_logging};
pub use shared_adc::{AdcChannel, AdcError, SharedAdc};

#[cfg(not(test))]
#[inline(never)]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use core::{
        fmt::Write,
        sync::atomic::{AtomicBool, Ordering},
    };
    use cortex_m::asm;
    use rtt_target::{ChannelMode, UpChannel};

    cortex_m::interrupt::disable();

    // Recursion protection
    static PANICKED: AtomicBool = AtomicBool::new(false);
    while PANICKED.load(Ordering::Relaxed) {
        asm::bkpt();
    }
    PANICKED.store(true, Ordering::Relaxed);

    // Laser off: take PC6 from the timer and drive it low, zero the DAC, then release notify.
    let gpioc = unsafe { &*hal::stm32::GPIOC::ptr() };
    gpioc.odr.modify(|_, w| w.odr6().low());
    gpioc.moder.modify(|_, w| w.moder6().output());
    let dac = unsafe { &*hal::stm32::DAC::ptr() };
    dac.dhr12r1.write(|w| unsafe { w.dacc1dhr().bits(0) });
    let gpiob = unsafe { &*hal::stm32::GPIOB::ptr() };
    gpiob.odr.modify(|_, w| w.odr0().low());

    // Analogous to panic-rtt-target
    if let Some(mut channel) = unsafe { UpChannel::conjure(0) } {
        channel.set_mode(ChannelMode::BlockIfFull);
        writeln!(channel, "{}", info).ok();
    }

    // Abort
    asm::udf();
}

#[cortex_m_rt::exception]
unsafe fn HardFault(ef: &cortex_m_rt::ExceptionFrame) -> ! {
    panic!("HardFault at {:#?}", ef);
}

#[cortex_m_rt::exception]
unsafe fn DefaultHandler(irqn: i16) {
    panic!("Unhandled exception (IRQn = {})", irqn);
}

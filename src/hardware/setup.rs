//! Rig hardware configuration
//!
//! Brings up clocks, the shared ADC, the laser modulation outputs and RTT logging, and assembles
//! the [Rig].
use embedded_hal_compat::ForwardCompat;
use stm32h7xx_hal::{self as hal, prelude::*};

use super::{
    cycle_counter::CycleCounter,
    delay::AsmDelay,
    design_parameters, metadata,
    modulation::{LaserDac, LaserPwm},
    shared_adc::SharedAdc,
};
use crate::{
    config::{Config, OutputConfig, PwmConfig, PWM_TIMER_CLOCK_HZ},
    io::AnalogInput,
    laser::Laser,
    output::{AnyOutput, Output},
    phase::PhaseDetector,
    protocol::Rig,
    Error,
};

/// Bind the `log` facade to RTT.
pub fn setup_logging() {
    rtt_target::rtt_init_print!();

    static LOGGER: rtt_logger::RTTLogger =
        rtt_logger::RTTLogger::new(log::LevelFilter::Info);
    if log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(log::LevelFilter::Trace))
        .is_ok()
    {
        log::info!("Starting");
        metadata::log_build_info();
    }
}

/// Configure the board and take ownership of the rig peripherals.
///
/// Every failure here is fatal: the rig cannot run without all of its peripherals.
pub fn setup(
    mut core: cortex_m::Peripherals,
    device: hal::stm32::Peripherals,
    config: &Config,
) -> Result<
    Rig<
        impl Output,
        CycleCounter,
        impl AnalogInput,
        impl AnalogInput,
        impl AnalogInput,
    >,
    Error,
> {
    config.validate()?;

    let pwr = device.PWR.constrain();
    let vos = pwr.freeze();

    // The ADC kernel clock is derived from per_ck.
    device.RCC.d3ccipr.modify(|_, w| w.adcsel().per());

    let rcc = device.RCC.constrain();
    let ccdr = rcc
        .use_hse(design_parameters::HSE.convert())
        .sysclk(design_parameters::SYSCLK.convert())
        .hclk(200.MHz())
        .pclk1(100.MHz())
        .per_ck(64.MHz()) // fixed frequency HSI, only used for the internal ADC
        .freeze(vos, &device.SYSCFG);

    core.SCB.enable_icache();

    let mut delay = AsmDelay::new(ccdr.clocks.c_ck().to_Hz());
    let clock = CycleCounter::new(core.DWT, &mut core.DCB, ccdr.clocks.c_ck());

    let gpioa = device.GPIOA.split(ccdr.peripheral.GPIOA);
    let gpiob = device.GPIOB.split(ccdr.peripheral.GPIOB);
    let gpioc = device.GPIOC.split(ccdr.peripheral.GPIOC);

    let adc: &'static SharedAdc<hal::stm32::ADC1> = {
        let mut adc1 = hal::adc::Adc::adc1(
            device.ADC1,
            design_parameters::ADC_CLOCK,
            &mut delay,
            ccdr.peripheral.ADC12,
            &ccdr.clocks,
        );
        adc1.set_sample_time(hal::adc::AdcSampleTime::T_64);
        adc1.set_resolution(hal::adc::Resolution::SixteenBit);
        adc1.calibrate();
        let adc1 = adc1.enable();

        // The channels borrow the converter for the lifetime of the firmware.
        cortex_m::singleton!(: SharedAdc<hal::stm32::ADC1> = SharedAdc::new(adc1))
            .ok_or(Error::HardwareUnavailable("ADC"))?
    };

    let sensor = adc
        .create_channel(gpioc.pc0.into_analog())
        .map_err(|_| Error::HardwareUnavailable("Sensor channel"))?;
    let pot = adc
        .create_channel(gpioc.pc1.into_analog())
        .map_err(|_| Error::HardwareUnavailable("Potentiometer channel"))?;
    let meter = adc
        .create_channel(gpioa.pa3.into_analog())
        .map_err(|_| Error::HardwareUnavailable("Power meter channel"))?;

    let pwm_frequency = match config.output {
        OutputConfig::Binary(pwm) => pwm.frequency_hz,
        OutputConfig::Sigmoidal(_) => PwmConfig::default().frequency_hz,
    };
    // Carrier frequencies are validated against this clock.
    if ccdr.clocks.timx_ker_ck().to_Hz() != PWM_TIMER_CLOCK_HZ {
        return Err(Error::HardwareUnavailable("PWM timer clock"));
    }
    let pwm = device.TIM3.pwm(
        gpioc.pc6.into_alternate::<2>(),
        (pwm_frequency as u32).Hz(),
        ccdr.peripheral.TIM3,
        &ccdr.clocks,
    );

    let dac = device
        .DAC
        .dac(gpioa.pa4.into_analog(), ccdr.peripheral.DAC12)
        .calibrate_buffer(&mut delay)
        .enable();

    let notify = gpiob.pb0.into_push_pull_output().forward();

    let output = AnyOutput::new(
        &config.output,
        LaserPwm::new(pwm),
        notify,
        LaserDac::new(dac),
    )?;
    let laser = Laser::new(output, clock)?;
    let detector = PhaseDetector::new(sensor, pot, config.threshold);

    log::info!("Rig ready: {:?}", config);
    Ok(Rig::new(laser, detector, meter))
}

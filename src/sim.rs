//! Simulated rig for host tests
//!
//! All peripherals share one [World] holding the simulated time and a record of every line
//! change. The clock advances by a fixed step on each reading, so busy-waits terminate and every
//! recorded event carries the time it happened at.
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use embedded_hal::digital::{self, ErrorType, OutputPin};

use crate::{
    config::{PwmConfig, SigmoidConfig, ThresholdConfig},
    io::{AnalogInput, AnalogOutput, Clock, Instant, PwmOutput},
    laser::Laser,
    output::{BinaryPwm, SigmoidalAnalog},
    phase::PhaseDetector,
};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Fault;

impl digital::Error for Fault {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Drive {
    Duty(u16),
    High,
    Low,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Line {
    Notify(bool),
    Pwm(Drive),
    Dac(u16),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Event {
    pub at: u32,
    pub line: Line,
}

pub struct World {
    now: Cell<u32>,
    step: u32,
    events: RefCell<Vec<Event>>,
    trace: RefCell<Box<dyn Fn(u32) -> u16>>,
    pub pot: Cell<u16>,
    pub meter: Cell<u16>,
    pub pwm_fault: Cell<bool>,
    /// Time in microseconds from which sensor conversions fail.
    pub sensor_fault: Cell<Option<u32>>,
}

pub type Sim = Rc<World>;

impl World {
    /// A world whose clock advances by `step` microseconds per reading.
    pub fn new(step: u32) -> Sim {
        Rc::new(Self {
            now: Cell::new(0),
            step,
            events: RefCell::new(Vec::new()),
            trace: RefCell::new(Box::new(|_| 0)),
            pot: Cell::new(0),
            meter: Cell::new(0),
            pwm_fault: Cell::new(false),
            sensor_fault: Cell::new(None),
        })
    }

    pub fn now(&self) -> u32 {
        self.now.get()
    }

    pub fn set_now(&self, now: u32) {
        self.now.set(now);
    }

    /// Set the respiration sensor signal as a function of time in microseconds.
    pub fn set_trace(&self, trace: impl Fn(u32) -> u16 + 'static) {
        *self.trace.borrow_mut() = Box::new(trace);
    }

    fn record(&self, line: Line) {
        self.events.borrow_mut().push(Event {
            at: self.now(),
            line,
        });
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn dac_codes(&self) -> Vec<u16> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e.line {
                Line::Dac(code) => Some(code),
                _ => None,
            })
            .collect()
    }

    /// Times at which the PWM output was turned on and back off, as `(on, off)` pairs.
    pub fn laser_intervals(&self) -> Vec<(u32, u32)> {
        let mut intervals = Vec::new();
        let mut on = None;
        for e in self.events.borrow().iter() {
            match e.line {
                Line::Pwm(Drive::Low) => {
                    if let Some(start) = on.take() {
                        intervals.push((start, e.at));
                    }
                }
                Line::Pwm(_) => {
                    on.get_or_insert(e.at);
                }
                _ => {}
            }
        }
        intervals
    }

    /// Whether the PWM output was left on at the end of the record.
    pub fn laser_on(&self) -> bool {
        self.events
            .borrow()
            .iter()
            .rev()
            .find_map(|e| match e.line {
                Line::Pwm(drive) => Some(drive != Drive::Low),
                _ => None,
            })
            .unwrap_or(false)
    }
}

pub struct SimClock(Sim);

impl SimClock {
    pub fn new(world: &Sim) -> Self {
        Self(world.clone())
    }
}

impl Clock for SimClock {
    fn now(&mut self) -> Instant {
        let t = self.0.now();
        self.0.set_now(t.wrapping_add(self.0.step));
        Instant::from_ticks(t)
    }
}

pub struct SimPwm(Sim);

impl SimPwm {
    pub const MAX_DUTY: u16 = 1000;

    pub fn new(world: &Sim) -> Self {
        Self(world.clone())
    }

    fn drive(&mut self, drive: Drive) -> Result<(), Fault> {
        if self.0.pwm_fault.get() {
            return Err(Fault);
        }
        self.0.record(Line::Pwm(drive));
        Ok(())
    }
}

impl ErrorType for SimPwm {
    type Error = Fault;
}

impl PwmOutput for SimPwm {
    fn max_duty(&self) -> u16 {
        Self::MAX_DUTY
    }

    fn set_duty(&mut self, duty: u16) -> Result<(), Fault> {
        self.drive(Drive::Duty(duty))
    }

    fn set_high(&mut self) -> Result<(), Fault> {
        self.drive(Drive::High)
    }

    fn set_low(&mut self) -> Result<(), Fault> {
        self.drive(Drive::Low)
    }
}

pub struct SimPin(Sim);

impl SimPin {
    pub fn new(world: &Sim) -> Self {
        Self(world.clone())
    }
}

impl ErrorType for SimPin {
    type Error = Fault;
}

impl OutputPin for SimPin {
    fn set_high(&mut self) -> Result<(), Fault> {
        self.0.record(Line::Notify(true));
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Fault> {
        self.0.record(Line::Notify(false));
        Ok(())
    }
}

/// A 12-bit DAC.
pub struct SimDac(Sim);

impl SimDac {
    pub fn new(world: &Sim) -> Self {
        Self(world.clone())
    }
}

impl ErrorType for SimDac {
    type Error = Fault;
}

impl AnalogOutput for SimDac {
    fn max_code(&self) -> u16 {
        4095
    }

    fn set_code(&mut self, code: u16) -> Result<(), Fault> {
        self.0.record(Line::Dac(code));
        Ok(())
    }
}

pub struct SimSensor(Sim);

impl ErrorType for SimSensor {
    type Error = Fault;
}

impl AnalogInput for SimSensor {
    fn read(&mut self) -> Result<u16, Fault> {
        let t = self.0.now();
        if self.0.sensor_fault.get().is_some_and(|at| t >= at) {
            return Err(Fault);
        }
        Ok((*self.0.trace.borrow())(t))
    }
}

pub struct SimPot(Sim);

impl ErrorType for SimPot {
    type Error = Fault;
}

impl AnalogInput for SimPot {
    fn read(&mut self) -> Result<u16, Fault> {
        Ok(self.0.pot.get())
    }
}

pub struct SimMeter(pub Sim);

impl ErrorType for SimMeter {
    type Error = Fault;
}

impl AnalogInput for SimMeter {
    fn read(&mut self) -> Result<u16, Fault> {
        Ok(self.0.meter.get())
    }
}

pub type BinaryLaser = Laser<BinaryPwm<SimPwm, SimPin>, SimClock>;
pub type SigmoidLaser = Laser<SigmoidalAnalog<SimDac>, SimClock>;
pub type Detector = PhaseDetector<SimSensor, SimPot>;

pub fn binary_laser(world: &Sim) -> BinaryLaser {
    let output = BinaryPwm::new(
        SimPwm::new(world),
        SimPin::new(world),
        &PwmConfig::default(),
    )
    .unwrap();
    let laser = Laser::new(output, SimClock::new(world)).unwrap();
    world.clear();
    laser
}

pub fn sigmoid_laser(world: &Sim) -> SigmoidLaser {
    let output =
        SigmoidalAnalog::new(SimDac::new(world), &SigmoidConfig::default())
            .unwrap();
    let laser = Laser::new(output, SimClock::new(world)).unwrap();
    world.clear();
    laser
}

pub fn detector(world: &Sim) -> Detector {
    PhaseDetector::new(
        SimSensor(world.clone()),
        SimPot(world.clone()),
        ThresholdConfig::default(),
    )
}

/// A sensor trace that is high (inspiration) within the given windows in milliseconds.
pub fn breathing(windows: &'static [(u32, u32)]) -> impl Fn(u32) -> u16 {
    move |t| {
        let ms = t / 1000;
        if windows.iter().any(|&(start, end)| (start..end).contains(&ms)) {
            6000
        } else {
            1000
        }
    }
}

//! Respiration-locked stimulation
//!
//! A phasic protocol runs a number of trials. Each trial polls the [PhaseDetector] for the
//! duration of its active window and stimulates while the target phase holds, in one of three
//! styles:
//!
//! * [Style::Continuous]: the laser is latched on from phase entry until the opposite crossing.
//! * [Style::Pulse]: a single pulse on every entry into the phase.
//! * [Style::Train]: pulses at a fixed rate while the phase holds. Consecutive pulse onsets are
//!   at least one period apart within a trial, across phase changes. The first pulse of a trial
//!   fires on phase entry.
//!
//! Pulses block the polling loop, so the phase is not sampled while a pulse is emitted.
use fugit::MillisDurationU32;
use serde::{Deserialize, Serialize};
use smlang::statemachine;

use crate::{
    io::{micros, AnalogInput, Clock, Duration, Instant},
    laser::{Laser, TrainTiming},
    output::{amplitude, Output},
    phase::{Phase, PhaseDetector},
    Error,
};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Style {
    Continuous,
    Pulse { pulse_ms: u32 },
    Train { freq_hz: f32, pulse_ms: u32 },
}

/// A phasic stimulation protocol.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Phasic {
    /// The phase stimulation is locked to.
    pub phase: Phase,
    pub style: Style,
    /// Number of trials.
    pub trials: u32,
    pub amplitude: f32,
    /// Polling window of each trial in milliseconds. The window end is inclusive.
    pub active_ms: u32,
    /// Delay after each trial in milliseconds.
    pub intertrial_ms: u32,
}

pub mod sm {
    use super::statemachine;

    statemachine! {
        transitions: {
            *Idle + Arm = ArmedWaitingPhase,
            ArmedWaitingPhase + PhaseEntered = Active,
            Active + PhaseExited = ArmedWaitingPhase,
            ArmedWaitingPhase + Expired = Done,
            Active + Expired = Done
        }
    }
}

pub struct TrialContext;

impl sm::StateMachineContext for TrialContext {}

type Trial = sm::StateMachine<TrialContext>;

fn fire(trial: &mut Trial, event: sm::Events) {
    if trial.process_event(event).is_err() {
        log::warn!("Trial: invalid transition");
    }
}

/// Validated stimulation of one style.
#[derive(Copy, Clone, Debug)]
enum Stimulus {
    Continuous,
    Pulse(Duration),
    Train { period: Duration, pulse: Duration },
}

/// Validated trial parameters.
struct Plan {
    phase: Phase,
    stimulus: Stimulus,
    amplitude: f32,
    active: Duration,
    intertrial: Duration,
}

impl Plan {
    fn new(phasic: &Phasic) -> Result<Self, Error> {
        if phasic.trials == 0 {
            return Err(Error::InvalidParameter("No trials"));
        }
        if phasic.active_ms == 0 {
            return Err(Error::InvalidParameter("Empty active window"));
        }
        let stimulus = match phasic.style {
            Style::Continuous => Stimulus::Continuous,
            Style::Pulse { pulse_ms } => {
                Stimulus::Pulse(micros(MillisDurationU32::from_ticks(pulse_ms))?)
            }
            Style::Train { freq_hz, pulse_ms } => {
                let pulse = MillisDurationU32::from_ticks(pulse_ms);
                // The train keeps running while the phase holds, bounded by the window.
                let window = MillisDurationU32::from_ticks(phasic.active_ms);
                let timing = TrainTiming::new(freq_hz, pulse, window)?;
                Stimulus::Train {
                    period: timing.period,
                    pulse: timing.pulse,
                }
            }
        };
        Ok(Self {
            phase: phasic.phase,
            stimulus,
            amplitude: amplitude(phasic.amplitude)?,
            active: micros(MillisDurationU32::from_ticks(phasic.active_ms))?,
            intertrial: micros(MillisDurationU32::from_ticks(phasic.intertrial_ms))?,
        })
    }
}

/// Run all trials of a phasic protocol.
pub fn run<O, C, S, P>(
    laser: &mut Laser<O, C>,
    detector: &mut PhaseDetector<S, P>,
    phasic: &Phasic,
) -> Result<(), Error>
where
    O: Output,
    C: Clock,
    S: AnalogInput,
    P: AnalogInput,
{
    let plan = Plan::new(phasic)?;
    for trial in 0..phasic.trials {
        log::info!(
            "Trial {}/{}: {:?} locked, {:?}",
            trial + 1,
            phasic.trials,
            plan.phase,
            phasic.style
        );
        laser.guard(|l| run_trial(l, detector, &plan))?;
        laser.clock().delay(plan.intertrial);
    }
    Ok(())
}

fn run_trial<O, C, S, P>(
    laser: &mut Laser<O, C>,
    detector: &mut PhaseDetector<S, P>,
    plan: &Plan,
) -> Result<(), Error>
where
    O: Output,
    C: Clock,
    S: AnalogInput,
    P: AnalogInput,
{
    let mut trial = Trial::new(TrialContext);
    laser.idle()?;
    detector.reset();
    fire(&mut trial, sm::Events::Arm);

    let start = laser.clock().now();
    let mut last_onset: Option<Instant> = None;
    let mut pulses = 0u32;
    while laser.clock().elapsed(start) <= plan.active {
        let sample = detector.update()?;
        let active = matches!(trial.state(), sm::States::Active);
        match sample.entered {
            Some(phase) if phase == plan.phase => {
                fire(&mut trial, sm::Events::PhaseEntered);
                match plan.stimulus {
                    Stimulus::Continuous => laser.turn_on(plan.amplitude)?,
                    Stimulus::Pulse(pulse) => {
                        laser.emit(plan.amplitude, pulse)?;
                        pulses += 1;
                    }
                    Stimulus::Train { .. } => {}
                }
            }
            Some(_) if active => {
                fire(&mut trial, sm::Events::PhaseExited);
                if let Stimulus::Continuous = plan.stimulus {
                    laser.turn_off(plan.amplitude)?;
                }
            }
            _ => {}
        }

        if let Stimulus::Train { period, pulse } = plan.stimulus {
            if matches!(trial.state(), sm::States::Active) {
                let due = match last_onset {
                    Some(onset) => laser.clock().elapsed(onset) >= period,
                    None => true,
                };
                if due {
                    last_onset = Some(laser.clock().now());
                    laser.emit(plan.amplitude, pulse)?;
                    pulses += 1;
                }
            }
        }
    }

    if matches!(trial.state(), sm::States::Active) {
        if let Stimulus::Continuous = plan.stimulus {
            laser.turn_off(plan.amplitude)?;
        }
    }
    fire(&mut trial, sm::Events::Expired);
    log::debug!("Trial done, {} pulses", pulses);
    Ok(())
}

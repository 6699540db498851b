//! Protocol descriptions and the rig that runs them
use fugit::MillisDurationU32;
use serde::{Deserialize, Serialize};

use crate::{
    io::{AnalogInput, Clock},
    laser::{Laser, TAGGING_PULSES},
    output::Output,
    phase::{Phase, PhaseDetector},
    phasic::{self, Phasic, Style},
    Error,
};

/// One stimulation invocation. Durations are in milliseconds.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Protocol {
    Pulse {
        amplitude: f32,
        duration_ms: u32,
    },
    Train {
        amplitude: f32,
        freq_hz: f32,
        pulse_ms: u32,
        train_ms: u32,
    },
    TrainDuty {
        amplitude: f32,
        freq_hz: f32,
        duty: f32,
        train_ms: u32,
    },
    MultiplePulses {
        count: u32,
        amplitude: f32,
        pulse_ms: u32,
        interval_ms: u32,
    },
    MultipleTrains {
        count: u32,
        amplitude: f32,
        freq_hz: f32,
        pulse_ms: u32,
        train_ms: u32,
        interval_ms: u32,
    },
    Tagging {
        #[serde(default = "tagging_pulses")]
        count: u32,
    },
    Phasic(Phasic),
    /// Measure and log the laser power at an amplitude.
    PowerCheck {
        amplitude: f32,
    },
    Delay {
        duration_ms: u32,
    },
}

fn tagging_pulses() -> u32 {
    TAGGING_PULSES
}

fn ms(ticks: u32) -> MillisDurationU32 {
    MillisDurationU32::from_ticks(ticks)
}

/// The stimulation rig: laser output, respiration phase detector and power meter.
pub struct Rig<O, C, S, P, M> {
    pub laser: Laser<O, C>,
    pub detector: PhaseDetector<S, P>,
    pub meter: M,
}

impl<O, C, S, P, M> Rig<O, C, S, P, M>
where
    O: Output,
    C: Clock,
    S: AnalogInput,
    P: AnalogInput,
    M: AnalogInput,
{
    pub fn new(
        laser: Laser<O, C>,
        detector: PhaseDetector<S, P>,
        meter: M,
    ) -> Self {
        Self {
            laser,
            detector,
            meter,
        }
    }

    pub fn run(&mut self, protocol: &Protocol) -> Result<(), Error> {
        log::info!("Running {:?}", protocol);
        match *protocol {
            Protocol::Pulse {
                amplitude,
                duration_ms,
            } => self.laser.pulse(amplitude, ms(duration_ms)),
            Protocol::Train {
                amplitude,
                freq_hz,
                pulse_ms,
                train_ms,
            } => self
                .laser
                .train(amplitude, freq_hz, ms(pulse_ms), ms(train_ms)),
            Protocol::TrainDuty {
                amplitude,
                freq_hz,
                duty,
                train_ms,
            } => self.laser.train_duty(amplitude, freq_hz, duty, ms(train_ms)),
            Protocol::MultiplePulses {
                count,
                amplitude,
                pulse_ms,
                interval_ms,
            } => self.laser.run_multiple_pulses(
                count,
                amplitude,
                ms(pulse_ms),
                ms(interval_ms),
            ),
            Protocol::MultipleTrains {
                count,
                amplitude,
                freq_hz,
                pulse_ms,
                train_ms,
                interval_ms,
            } => self.laser.run_multiple_trains(
                count,
                amplitude,
                freq_hz,
                ms(pulse_ms),
                ms(train_ms),
                ms(interval_ms),
            ),
            Protocol::Tagging { count } => self.laser.run_tagging(count),
            Protocol::Phasic(ref phasic) => {
                phasic::run(&mut self.laser, &mut self.detector, phasic)
            }
            Protocol::PowerCheck { amplitude } => {
                let power = self.laser.measure_power(amplitude, &mut self.meter)?;
                log::info!("Power at {}: {}", amplitude, power);
                Ok(())
            }
            Protocol::Delay { duration_ms } => self.laser.delay(ms(duration_ms)),
        }
    }

    /// Run a sequence of protocols, stopping at the first failure.
    pub fn run_all<'a>(
        &mut self,
        protocols: impl IntoIterator<Item = &'a Protocol>,
    ) -> Result<(), Error> {
        for protocol in protocols {
            if let Err(e) = self.run(protocol) {
                log::error!("{:?} failed: {}", protocol, e);
                return Err(e);
            }
        }
        Ok(())
    }

    fn phasic(
        &mut self,
        phase: Phase,
        style: Style,
        trials: u32,
        amplitude: f32,
        active: MillisDurationU32,
        intertrial: MillisDurationU32,
    ) -> Result<(), Error> {
        let protocol = Phasic {
            phase,
            style,
            trials,
            amplitude,
            active_ms: active.ticks(),
            intertrial_ms: intertrial.ticks(),
        };
        phasic::run(&mut self.laser, &mut self.detector, &protocol)
    }

    /// Laser latched on during inspiration.
    pub fn phasic_stim_insp(
        &mut self,
        trials: u32,
        amplitude: f32,
        active: MillisDurationU32,
        intertrial: MillisDurationU32,
    ) -> Result<(), Error> {
        self.phasic(
            Phase::Inspiration,
            Style::Continuous,
            trials,
            amplitude,
            active,
            intertrial,
        )
    }

    /// One pulse at every inspiration onset.
    pub fn phasic_stim_insp_pulse(
        &mut self,
        trials: u32,
        amplitude: f32,
        active: MillisDurationU32,
        intertrial: MillisDurationU32,
        pulse: MillisDurationU32,
    ) -> Result<(), Error> {
        let style = Style::Pulse {
            pulse_ms: pulse.ticks(),
        };
        self.phasic(
            Phase::Inspiration,
            style,
            trials,
            amplitude,
            active,
            intertrial,
        )
    }

    /// Pulse train while inspiration holds.
    pub fn phasic_stim_insp_train(
        &mut self,
        trials: u32,
        amplitude: f32,
        freq_hz: f32,
        pulse: MillisDurationU32,
        active: MillisDurationU32,
        intertrial: MillisDurationU32,
    ) -> Result<(), Error> {
        let style = Style::Train {
            freq_hz,
            pulse_ms: pulse.ticks(),
        };
        self.phasic(
            Phase::Inspiration,
            style,
            trials,
            amplitude,
            active,
            intertrial,
        )
    }

    /// Laser latched on during expiration.
    pub fn phasic_stim_exp(
        &mut self,
        trials: u32,
        amplitude: f32,
        active: MillisDurationU32,
        intertrial: MillisDurationU32,
    ) -> Result<(), Error> {
        self.phasic(
            Phase::Expiration,
            Style::Continuous,
            trials,
            amplitude,
            active,
            intertrial,
        )
    }

    /// One pulse at every expiration onset.
    pub fn phasic_stim_exp_pulse(
        &mut self,
        trials: u32,
        amplitude: f32,
        active: MillisDurationU32,
        intertrial: MillisDurationU32,
        pulse: MillisDurationU32,
    ) -> Result<(), Error> {
        let style = Style::Pulse {
            pulse_ms: pulse.ticks(),
        };
        self.phasic(
            Phase::Expiration,
            style,
            trials,
            amplitude,
            active,
            intertrial,
        )
    }

    /// Pulse train while expiration holds.
    pub fn phasic_stim_exp_train(
        &mut self,
        trials: u32,
        amplitude: f32,
        freq_hz: f32,
        pulse: MillisDurationU32,
        active: MillisDurationU32,
        intertrial: MillisDurationU32,
    ) -> Result<(), Error> {
        let style = Style::Train {
            freq_hz,
            pulse_ms: pulse.ticks(),
        };
        self.phasic(
            Phase::Expiration,
            style,
            trials,
            amplitude,
            active,
            intertrial,
        )
    }
}

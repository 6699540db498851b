use cortex_m::peripheral::{DCB, DWT};
use stm32h7xx_hal::time::Hertz;

use crate::io::{Clock, Instant};

/// Microsecond clock derived from the DWT cycle counter.
pub struct CycleCounter {
    // Cycle count at the previous reading.
    last: u32,

    // Cycles not yet accounted for as a full microsecond.
    residual: u32,

    // Accumulated microseconds, wrapping.
    micros: u32,

    // Clock cycles per microsecond.
    cycles_per_us: u32,
}

impl CycleCounter {
    /// Construct the cycle counting clock.
    ///
    /// # Args
    /// * `dwt` - The debug watch and trace unit of the CPU core.
    /// * `dcb` - The debug control block, used to enable tracing.
    /// * `cpu_frequency` - The frequency that the cycle counter counts at.
    pub fn new(
        mut dwt: DWT,
        dcb: &mut DCB,
        cpu_frequency: impl Into<Hertz>,
    ) -> Self {
        dcb.enable_trace();
        dwt.enable_cycle_counter();

        Self {
            last: DWT::cycle_count(),
            residual: 0,
            micros: 0,
            cycles_per_us: cpu_frequency.into().to_MHz(),
        }
    }
}

impl Clock for CycleCounter {
    /// # Note
    /// The cycle counter wraps after about 10 seconds at 400 MHz. The clock must be read more
    /// often than that, which every busy-wait does.
    fn now(&mut self) -> Instant {
        let cycles = DWT::cycle_count();
        let elapsed = cycles.wrapping_sub(self.last).wrapping_add(self.residual);
        self.last = cycles;
        self.micros = self.micros.wrapping_add(elapsed / self.cycles_per_us);
        self.residual = elapsed % self.cycles_per_us;
        Instant::from_ticks(self.micros)
    }
}

//! Driver statistics collection and reporting.
//!
//! This module tracks what a driver session did. It provides:
//! 1. **Execution:** RUN transitions and hardware ticks executed, with the derived emulation rate.
//! 2. **Events:** Scheduled events fired and triggers that stopped or were claimed by callbacks.
//! 3. **Checkpoints:** Snapshots saved and loaded.

use std::time::Instant;

/// Counters for one driver session.
#[derive(Debug, Clone)]
pub struct DriverStats {
    start_time: Instant,
    /// Number of PAUSE -> RUN transitions.
    pub run_transitions: u64,
    /// Hardware ticks executed across all RUNs.
    pub ticks_executed: u64,
    /// Scheduled events executed.
    pub events_fired: u64,
    /// Input signal writes applied by events.
    pub signals_set: u64,
    /// Active triggers observed at PAUSE.
    pub triggers_fired: u64,
    /// Active triggers consumed by a registered callback.
    pub triggers_claimed: u64,
    /// Checkpoints written.
    pub checkpoints_saved: u64,
    /// Checkpoints restored.
    pub checkpoints_loaded: u64,
}

impl Default for DriverStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            run_transitions: 0,
            ticks_executed: 0,
            events_fired: 0,
            signals_set: 0,
            triggers_fired: 0,
            triggers_claimed: 0,
            checkpoints_saved: 0,
            checkpoints_loaded: 0,
        }
    }
}

impl DriverStats {
    /// Host seconds since the session started.
    pub fn host_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Prints the statistics to stdout.
    pub fn print(&self) {
        let seconds = self.host_seconds();
        let khz = if seconds > 0.0 {
            (self.ticks_executed as f64 / seconds) / 1000.0
        } else {
            0.0
        };
        let avg_run = if self.run_transitions > 0 {
            self.ticks_executed as f64 / self.run_transitions as f64
        } else {
            0.0
        };
        println!("\n==========================================================");
        println!("EMULATION DRIVER STATISTICS");
        println!("==========================================================");
        println!("host_seconds             {seconds:.4} s");
        println!("emu_ticks                {}", self.ticks_executed);
        println!("emu_freq                 {khz:.2} kHz");
        println!("run.transitions          {}", self.run_transitions);
        println!("run.avg_ticks            {avg_run:.1}");
        println!("----------------------------------------------------------");
        println!("events.fired             {}", self.events_fired);
        println!("events.signals_set       {}", self.signals_set);
        println!("triggers.fired           {}", self.triggers_fired);
        println!("triggers.claimed         {}", self.triggers_claimed);
        println!("----------------------------------------------------------");
        println!("checkpoints.saved        {}", self.checkpoints_saved);
        println!("checkpoints.loaded       {}", self.checkpoints_loaded);
        println!("==========================================================");
    }
}

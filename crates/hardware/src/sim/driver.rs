//! Session driver: the PAUSE-time control loop.
//!
//! The driver owns the controller, the checkpoint store, the event queue, and the signal trace.
//! It provides:
//! 1. **Startup:** Fresh recording, recording from an earlier checkpoint, or replay.
//! 2. **Run loop:** At every PAUSE, collect active triggers, fire due events, then program the
//!    distance to the next event and start a RUN.
//! 3. **Checkpoints:** Scan out, copy AXI regions and RAM models, write the trace; loading does
//!    the inverse and re-schedules traced signal values.
//!
//! The interrupt flag is sampled only while the hardware is paused; a RUN is never cut short.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use super::event::{Action, Event};
use super::scheduler::EventScheduler;
use crate::checkpoint::{CheckpointStore, CircuitState, SignalTrace, item};
use crate::common::bitvector::BitVector;
use crate::common::error::{CheckpointError, Error, ProtocolError, Result};
use crate::config::{DriverOptions, RunMode, SysInfo, flatten_name};
use crate::controller::{Controller, Mode, ScanDirection};
use crate::model::{RAMMODEL_TYPE, RamModel, RamModelConfig};
use crate::stats::DriverStats;

/// Handler for an active trigger; returning `true` claims it so execution continues.
pub type TriggerCallback = Box<dyn FnMut(&mut Controller) -> bool>;

/// Why the run loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A scheduled stop event fired.
    Scheduled,
    /// Enabled triggers fired and no callback claimed them.
    Triggers(Vec<usize>),
    /// The interrupt flag was raised.
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled stop"),
            Self::Triggers(t) => write!(f, "{} trigger(s) activated", t.len()),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Drives one emulation session.
pub struct Driver {
    ctrl: Controller,
    store: CheckpointStore,
    scheduler: EventScheduler,
    circuit: CircuitState,
    trace: SignalTrace,
    ram_models: BTreeMap<String, RamModel>,
    trigger_callbacks: BTreeMap<usize, TriggerCallback>,
    options: DriverOptions,
    stats: DriverStats,
    interrupt: Arc<AtomicBool>,
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("ctrl", &self.ctrl)
            .field("store", &self.store)
            .field("pending_events", &self.scheduler.len())
            .field("ram_models", &self.ram_models.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Driver {
    /// Binds a driver to an initialized controller.
    ///
    /// Opens the checkpoint store under the scan layout's fingerprint and instantiates every
    /// `rammodel` in the description. Other model types are ignored with a warning.
    pub fn new(sysinfo: &SysInfo, ctrl: Controller, options: DriverOptions) -> Result<Self> {
        let circuit = CircuitState::new(sysinfo)?;
        let store =
            CheckpointStore::open_root(&options.checkpoint_dir, circuit.layout().fingerprint())?;

        let mut ram_models = BTreeMap::new();
        for info in &sysinfo.model {
            let name = flatten_name(&info.name);
            if info.kind == RAMMODEL_TYPE {
                let model = RamModel::new(RamModelConfig::from_model_info(info)?)?;
                info!(model = %name, mem_size = model.config().mem_size, "RAM model recognized");
                let _ = ram_models.insert(name, model);
            } else {
                warn!(model = %name, kind = %info.kind, "model of unrecognized type is ignored");
            }
        }

        Ok(Self {
            ctrl,
            store,
            scheduler: EventScheduler::new(),
            circuit,
            trace: SignalTrace::new(),
            ram_models,
            trigger_callbacks: BTreeMap::new(),
            options,
            stats: DriverStats::default(),
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The hardware controller.
    pub const fn controller(&self) -> &Controller {
        &self.ctrl
    }

    /// Mutable access to the hardware controller.
    pub const fn controller_mut(&mut self) -> &mut Controller {
        &mut self.ctrl
    }

    /// The checkpoint store.
    pub const fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Circuit state decoded from the most recent scan.
    pub const fn circuit(&self) -> &CircuitState {
        &self.circuit
    }

    /// Recorded input signal history.
    pub const fn trace(&self) -> &SignalTrace {
        &self.trace
    }

    /// Session statistics.
    pub const fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Session options.
    pub const fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// The RAM model named `name`.
    pub fn ram_model(&self, name: &str) -> Option<&RamModel> {
        self.ram_models.get(name)
    }

    /// Mutable access to the RAM model named `name`.
    pub fn ram_model_mut(&mut self, name: &str) -> Option<&mut RamModel> {
        self.ram_models.get_mut(name)
    }

    /// Flag that stops the run loop at the next PAUSE when set.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Whether the session replays without saving.
    pub const fn is_replay_mode(&self) -> bool {
        matches!(self.options.mode, RunMode::Replay(_))
    }

    /// Queues a write of input signal `index` at `tick`.
    ///
    /// The index and value width are checked now so a bad request fails at the call site.
    pub fn schedule_signal_set(&mut self, tick: u64, index: usize, value: BitVector) -> Result<()> {
        let sig = self.ctrl.signals().get(index)?;
        if value.width() != sig.width {
            return Err(ProtocolError::SignalWidthMismatch {
                name: sig.name.clone(),
                expected: sig.width,
                found: value.width(),
            }
            .into());
        }
        self.scheduler.schedule(tick, Action::SetSignal { index, value });
        Ok(())
    }

    /// Queues a stop at `tick`, tagged with `reason` for the log.
    pub fn schedule_stop(&mut self, tick: u64, reason: impl Into<String>) {
        self.scheduler.schedule(
            tick,
            Action::Stop {
                reason: reason.into(),
            },
        );
    }

    /// Queues a checkpoint at `start` that re-arms every `period` ticks.
    pub fn schedule_periodic_checkpoint(&mut self, start: u64, period: u64) {
        self.scheduler
            .schedule(start, Action::PeriodicCheckpoint { period });
    }

    /// Installs a handler for trigger `index`, replacing any previous one.
    pub fn register_trigger_callback(
        &mut self,
        index: usize,
        callback: TriggerCallback,
    ) -> Result<()> {
        let _ = self.ctrl.triggers().get(index)?;
        let _ = self.trigger_callbacks.insert(index, callback);
        Ok(())
    }

    /// Snapshots the design, AXI memory, RAM models, and trace at the current tick.
    pub fn save_checkpoint(&mut self) -> Result<u64> {
        let tick = self.ctrl.tick_count();
        info!(tick, "saving checkpoint");

        let writer = self.store.open(tick)?;

        self.ctrl.do_scan(ScanDirection::Out)?;
        let blob = self.ctrl.read_scan_window();
        let len = self.circuit.layout().encoded_len();
        self.circuit.decode(&blob)?;
        writer.write_item(item::SCANCHAIN, &blob[..len])?;

        for index in 0..self.ctrl.axis().len() {
            let name = item::mem(&self.ctrl.axis().get(index)?.name);
            let path = writer.path(&name);
            let mut out = writer.create_item(&name)?;
            let _ = self
                .ctrl
                .save_axi_mem(index, &mut out)?
                .and_then(|n| out.flush().map(|()| n))
                .map_err(|e| CheckpointError::io(path, e))?;
        }

        for (name, model) in &self.ram_models {
            model.save_checkpoint(&writer, name)?;
        }

        writer.write_trace(&self.trace)?;
        self.store.commit(writer)?;
        self.stats.checkpoints_saved += 1;
        info!(tick, "saved checkpoint");
        Ok(tick)
    }

    /// Restores the snapshot at `tick` into the hardware.
    ///
    /// The signal trace is taken from the latest snapshot: each input signal gets its value in
    /// effect at `tick`, and every later traced value is re-scheduled.
    pub fn load_checkpoint(&mut self, tick: u64) -> Result<()> {
        info!(tick, "loading checkpoint");
        let reader = self.store.read(tick)?;
        self.ctrl.set_tick_count(reader.read_tick()?);

        let latest = self.store.latest()?.unwrap_or(tick);
        self.trace = self.store.read(latest)?.read_trace()?;

        let inputs: Vec<usize> = self
            .ctrl
            .signals()
            .iter()
            .filter(|s| !s.output)
            .map(|s| s.index)
            .collect();
        for index in inputs {
            if let Some((_, value)) = self.trace.value_at(index, tick) {
                let value = value.clone();
                self.ctrl.set_signal(index, &value)?;
            }
            let later: Vec<(u64, BitVector)> = self
                .trace
                .after(index, tick)
                .map(|(t, v)| (t, v.clone()))
                .collect();
            for (t, value) in later {
                self.scheduler.schedule(t, Action::SetSignal { index, value });
            }
        }

        for index in 0..self.ctrl.axis().len() {
            let name = item::mem(&self.ctrl.axis().get(index)?.name);
            let path = reader.path(&name);
            let mut input = reader.open_item(&name)?;
            let _ = self
                .ctrl
                .load_axi_mem(index, &mut input)?
                .map_err(|e| CheckpointError::io(path, e))?;
        }

        for (name, model) in &mut self.ram_models {
            model.load_checkpoint(&reader, name)?;
        }

        let blob = reader.read_item(item::SCANCHAIN)?;
        self.circuit.decode(&blob)?;
        self.ctrl.write_scan_window(&blob);
        self.ctrl.do_scan(ScanDirection::In)?;

        self.stats.checkpoints_loaded += 1;
        info!(tick, "loaded checkpoint");
        Ok(())
    }

    fn init_axi_mem(&mut self) -> Result<()> {
        for init in self.options.init_axi_mem.clone() {
            let Some(index) = self.ctrl.lookup_axi(&init.name) else {
                warn!(axi = %init.name, "AXI port given for memory initialization not found");
                continue;
            };
            info!(axi = %init.name, file = %init.path.display(), "initializing AXI memory");
            let file = match File::open(&init.path) {
                Ok(f) => f,
                Err(e) => {
                    warn!(file = %init.path.display(), error = %e, "cannot open memory image");
                    continue;
                }
            };
            let mut input = BufReader::new(file);
            let _ = self
                .ctrl
                .load_axi_mem(index, &mut input)?
                .map_err(|source| Error::Io {
                    path: init.path.clone(),
                    source,
                })?;

            if let Some(model) = self.ram_models.get_mut(&init.name) {
                let mut input = File::open(&init.path)
                    .map(BufReader::new)
                    .map_err(|source| Error::Io {
                        path: init.path.clone(),
                        source,
                    })?;
                let _ = model.load_data(&mut input).map_err(|source| Error::Io {
                    path: init.path.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn schedule_signal_options(&mut self, current: u64) -> Result<()> {
        for init in self.options.set_signal.clone() {
            let Some(index) = self.ctrl.lookup_signal(&init.name) else {
                warn!(signal = %init.name, "signal given for initialization not found");
                continue;
            };
            if init.tick < current {
                warn!(signal = %init.name, tick = init.tick, current, "signal set before start tick is skipped");
                continue;
            }
            let width = self.ctrl.signals().get(index)?.width;
            let value = BitVector::parse(width, &init.value)?;
            self.schedule_signal_set(init.tick, index, value)?;
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        match self.options.mode {
            RunMode::Record => {
                self.schedule_signal_options(0)?;
                self.init_axi_mem()?;
                self.store.clear()?;
                self.trace = SignalTrace::new();
                self.ctrl.set_tick_count(0);
                match self.options.checkpoint_period {
                    Some(period) if period > 0 => self.schedule_periodic_checkpoint(0, period),
                    _ => {
                        let _ = self.save_checkpoint()?;
                    }
                }
            }
            RunMode::RecordFrom(tick) => {
                let nearest = self.store.find_nearest(tick)?;
                self.store.truncate(nearest)?;
                self.load_checkpoint(nearest)?;
                self.trace.truncate(nearest);
                self.schedule_signal_options(nearest)?;
                if let Some(period) = self.options.checkpoint_period.filter(|&p| p > 0) {
                    self.schedule_periodic_checkpoint(nearest + period, period);
                }
            }
            RunMode::Replay(tick) => {
                let nearest = self.store.find_nearest(tick)?;
                self.load_checkpoint(nearest)?;
            }
        }

        if let Some(stop) = self.options.stop_tick {
            let current = self.ctrl.tick_count();
            if stop < current {
                warn!(stop, current, "stop tick already passed; stopping immediately");
            }
            self.schedule_stop(stop.max(current), "stop tick reached");
        }
        Ok(())
    }

    /// Executes one event; returns `true` if it requests a stop.
    fn execute(&mut self, event: Event) -> Result<bool> {
        self.stats.events_fired += 1;
        match event.action {
            Action::SetSignal { index, value } => {
                self.ctrl.set_signal(index, &value)?;
                if !self.is_replay_mode() {
                    self.trace.record(index, event.tick, value);
                }
                self.stats.signals_set += 1;
                Ok(false)
            }
            Action::Stop { reason } => {
                info!(tick = event.tick, %reason, "stop requested");
                Ok(true)
            }
            Action::PeriodicCheckpoint { period } => {
                if !self.is_replay_mode() {
                    let _ = self.save_checkpoint()?;
                }
                self.schedule_periodic_checkpoint(event.tick + period, period);
                Ok(false)
            }
        }
    }

    fn poll_triggers(&mut self, tick: u64) -> Vec<usize> {
        let mut unclaimed = Vec::new();
        for index in self.ctrl.active_triggers(true) {
            self.stats.triggers_fired += 1;
            let claimed = self
                .trigger_callbacks
                .get_mut(&index)
                .is_some_and(|callback| callback(&mut self.ctrl));
            if claimed {
                self.stats.triggers_claimed += 1;
                continue;
            }
            let name = self
                .ctrl
                .triggers()
                .get(index)
                .map(|t| t.name.clone())
                .unwrap_or_default();
            info!(tick, trigger = %name, "trigger activated");
            unclaimed.push(index);
        }
        unclaimed
    }

    /// Runs the session until a stop condition, then saves a final checkpoint when recording.
    ///
    /// Fails before touching the hardware if it is not paused.
    pub fn run(&mut self) -> Result<StopReason> {
        let mode = self.ctrl.mode()?;
        if mode != Mode::Pause {
            return Err(ProtocolError::BadInitialMode(mode).into());
        }

        self.start()?;
        info!(tick = self.ctrl.tick_count(), "start execution");

        let reason = loop {
            let tick = self.ctrl.tick_count();

            let triggers = self.poll_triggers(tick);
            let mut stop = (!triggers.is_empty()).then_some(StopReason::Triggers(triggers));

            while let Some(event) = self.scheduler.pop_due(tick)? {
                if self.execute(event)? && stop.is_none() {
                    stop = Some(StopReason::Scheduled);
                }
            }

            if stop.is_none() && self.interrupt.load(Ordering::SeqCst) {
                stop = Some(StopReason::Interrupted);
            }
            if let Some(reason) = stop {
                info!(tick, %reason, "stop execution");
                break reason;
            }

            let step = self
                .scheduler
                .next_tick()
                .map_or(u64::from(u32::MAX), |next| next - tick)
                .min(u64::from(u32::MAX)) as u32;
            self.ctrl.run(step)?;
            self.stats.run_transitions += 1;
            self.ctrl.wait_for_pause();
            self.stats.ticks_executed += self.ctrl.tick_count().saturating_sub(tick);
        };

        if !self.is_replay_mode() || self.options.save_on_stop {
            let _ = self.save_checkpoint()?;
        }
        Ok(reason)
    }
}

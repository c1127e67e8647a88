//! REMU emulation driver CLI.
//!
//! This binary is the host-side entry point for an emulation session. It performs:
//! 1. **Run:** Bind the system description to the platform transports and record or replay.
//! 2. **List:** Show the ticks held by a checkpoint store.
//! 3. **Inspect:** Decode a checkpoint's scan chain and print wire and RAM contents.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use remu_core::checkpoint::{CheckpointStore, CircuitState, ScanLayout, item};
use remu_core::config::{AxiMemInit, DriverOptions, PlatInfo, RunMode, SignalInit};
use remu_core::{Controller, Driver, SysInfo, uma};

#[derive(Parser, Debug)]
#[command(
    name = "remu",
    author,
    version,
    about = "FPGA emulator control and checkpointing driver",
    long_about = "Drive a hardware design on an emulation fabric: run it, record checkpoints, and replay from any saved tick.\n\nExamples:\n  remu run --sysinfo sysinfo.json --platinfo plat.json --ckpt ckpt --period 1000000\n  remu run --sysinfo sysinfo.json --platinfo plat.json --ckpt ckpt --replay 5000000 --to 6000000\n  remu list --ckpt ckpt\n  remu inspect --sysinfo sysinfo.json --ckpt ckpt --tick 5000000"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the design, recording checkpoints or replaying from one.
    Run {
        /// System description (JSON).
        #[arg(long)]
        sysinfo: PathBuf,

        /// Platform transport description (JSON).
        #[arg(long)]
        platinfo: PathBuf,

        /// Checkpoint store directory.
        #[arg(long)]
        ckpt: PathBuf,

        /// Save a checkpoint every PERIOD ticks while recording.
        #[arg(long)]
        period: Option<u64>,

        /// Stop at this tick.
        #[arg(long)]
        to: Option<u64>,

        /// Replay from the nearest checkpoint at or before this tick.
        #[arg(long, conflicts_with = "record")]
        replay: Option<u64>,

        /// Continue recording from the nearest checkpoint at or before this tick.
        #[arg(long)]
        record: Option<u64>,

        /// Schedule an input signal write, as NAME=VALUE[@TICK].
        #[arg(long = "set-signal", value_parser = parse_signal_init)]
        set_signal: Vec<SignalInit>,

        /// Load a binary image into an AXI region, as NAME=FILE.
        #[arg(long = "init-axi-mem", value_parser = parse_axi_mem_init)]
        init_axi_mem: Vec<AxiMemInit>,

        /// Save a checkpoint on stop even when replaying.
        #[arg(long)]
        save_on_stop: bool,

        /// Busy-wait poll interval in milliseconds.
        #[arg(long, default_value_t = 10)]
        poll_ms: u64,
    },

    /// List checkpointed ticks.
    List {
        /// Checkpoint store directory.
        #[arg(long)]
        ckpt: PathBuf,
    },

    /// Decode and print the circuit state of a checkpoint.
    Inspect {
        /// System description (JSON).
        #[arg(long)]
        sysinfo: PathBuf,

        /// Checkpoint store directory.
        #[arg(long)]
        ckpt: PathBuf,

        /// Checkpoint tick; the nearest earlier checkpoint is used.
        #[arg(long)]
        tick: u64,
    },
}

static INTERRUPT: OnceLock<Arc<AtomicBool>> = OnceLock::new();

extern "C" fn on_sigint(_: libc::c_int) {
    if let Some(flag) = INTERRUPT.get() {
        flag.store(true, Ordering::SeqCst);
    }
}

fn install_sigint(flag: Arc<AtomicBool>) {
    let _ = INTERRUPT.set(flag);
    let handler: extern "C" fn(libc::c_int) = on_sigint;
    // SAFETY: the handler only performs an atomic store through a fully initialized OnceLock.
    let _ = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
}

fn parse_signal_init(text: &str) -> Result<SignalInit, String> {
    let (name, rest) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE[@TICK], got `{text}`"))?;
    let (value, tick) = match rest.split_once('@') {
        Some((value, tick)) => (
            value,
            tick.parse()
                .map_err(|e| format!("invalid tick `{tick}`: {e}"))?,
        ),
        None => (rest, 0),
    };
    Ok(SignalInit {
        name: name.to_string(),
        value: value.to_string(),
        tick,
    })
}

fn parse_axi_mem_init(text: &str) -> Result<AxiMemInit, String> {
    let (name, path) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=FILE, got `{text}`"))?;
    Ok(AxiMemInit {
        name: name.to_string(),
        path: PathBuf::from(path),
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            sysinfo,
            platinfo,
            ckpt,
            period,
            to,
            replay,
            record,
            set_signal,
            init_axi_mem,
            save_on_stop,
            poll_ms,
        } => {
            let mut options = DriverOptions::new(ckpt);
            options.checkpoint_period = period;
            options.stop_tick = to;
            options.mode = match (replay, record) {
                (Some(tick), _) => RunMode::Replay(tick),
                (None, Some(tick)) => RunMode::RecordFrom(tick),
                (None, None) => RunMode::Record,
            };
            options.set_signal = set_signal;
            options.init_axi_mem = init_axi_mem;
            options.save_on_stop = save_on_stop;
            options.poll_interval_ms = poll_ms;
            cmd_run(&sysinfo, &platinfo, options)
        }
        Commands::List { ckpt } => cmd_list(ckpt),
        Commands::Inspect {
            sysinfo,
            ckpt,
            tick,
        } => cmd_inspect(&sysinfo, ckpt, tick),
    };

    if let Err(e) = result {
        error!("{e}");
        process::exit(1);
    }
}

/// Opens the transports, initializes the fabric, and runs a session to its stop condition.
fn cmd_run(
    sysinfo_path: &Path,
    platinfo_path: &Path,
    options: DriverOptions,
) -> remu_core::Result<()> {
    let sysinfo = SysInfo::load(sysinfo_path)?;
    let platinfo = PlatInfo::load(platinfo_path)?;
    let (mem, reg) = uma::open_transports(&platinfo)?;
    let ctrl = Controller::new(&sysinfo, mem, reg, options.poll_interval())?;
    let mut driver = Driver::new(&sysinfo, ctrl, options)?;
    install_sigint(driver.interrupt_handle());

    let reason = driver.run()?;
    info!(%reason, "session finished");
    driver.stats().print();
    Ok(())
}

/// Prints every committed tick in the store.
fn cmd_list(ckpt: PathBuf) -> remu_core::Result<()> {
    let store = CheckpointStore::open_existing(ckpt, 0)?;
    for tick in store.ticks()? {
        println!("{tick}");
    }
    Ok(())
}

/// Decodes the scan chain of the nearest checkpoint and prints each wire and RAM.
fn cmd_inspect(sysinfo_path: &Path, ckpt: PathBuf, tick: u64) -> remu_core::Result<()> {
    let sysinfo = SysInfo::load(sysinfo_path)?;
    let layout = ScanLayout::new(&sysinfo)?;
    let store = CheckpointStore::open_existing(ckpt, layout.fingerprint())?;
    let nearest = store.find_nearest(tick)?;
    let reader = store.read(nearest)?;

    let mut circuit = CircuitState::new(&sysinfo)?;
    circuit.decode(&reader.read_item(item::SCANCHAIN)?)?;

    println!("checkpoint tick {}", reader.read_tick()?);
    for (name, value) in &circuit.wire {
        println!("  wire {name:<40} {value}");
    }
    for (name, ram) in &circuit.ram {
        let note = if ram.dissolved { " (dissolved)" } else { "" };
        println!(
            "  ram  {name:<40} {}x{} @ {}{note}",
            ram.data.depth(),
            ram.data.width(),
            ram.data.start_offset()
        );
    }
    Ok(())
}

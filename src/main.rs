use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use rust_beeb::bus::{BeebBus, Bus};
use rust_beeb::cpu::{CpuType, CPU};
use rust_beeb::dispatch::{DispatchStrategy, Dispatcher};
use rust_beeb::monitor::Monitor;
use rust_beeb::rom::ROM;
use rust_beeb::util::parse_hex_u16;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(version, about = "BBC Micro 6502/65C02 cycle-timed CPU core")]
struct Args {
    /// Binary image (or Intel HEX file with --intel-hex) to load
    image: PathBuf,

    /// Load address for binary images (hex)
    #[arg(long, default_value = "1900", value_parser = parse_address)]
    load: u16,

    /// Start execution here instead of the reset vector (hex)
    #[arg(long, value_parser = parse_address)]
    entry: Option<u16>,

    #[arg(long)]
    intel_hex: bool,

    #[arg(long, value_enum, default_value_t = CpuType::NMOS6502)]
    cpu: CpuType,

    #[arg(long, value_enum, default_value_t = DispatchStrategy::Table)]
    dispatch: DispatchStrategy,

    /// Stop the headless run after this many instructions
    #[arg(long)]
    max_instructions: Option<u64>,

    /// Log every instruction at trace level
    #[arg(long)]
    trace: bool,

    #[arg(long)]
    monitor: bool,

    /// Symbol file of `ADDR NAME` lines used to annotate disassembly
    #[arg(long)]
    symbols: Option<PathBuf>,
}

fn parse_address(text: &str) -> Result<u16, String> {
    parse_hex_u16(text).ok_or_else(|| format!("'{}' is not a 16-bit hex address", text))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.trace {
        logger.filter_module("rust_beeb", LevelFilter::Trace);
    }
    logger.init();

    let dispatcher = Dispatcher::build(args.cpu, args.dispatch)
        .context("failed to compile the instruction set")?;
    info!(
        "{:?} dispatcher ready for {:?}: {} opcodes compiled",
        dispatcher.strategy(),
        dispatcher.cpu_type(),
        dispatcher.compiled_count()
    );

    let image = if args.intel_hex {
        ROM::load_from_intel(&args.image)
    } else {
        ROM::load_from_file(&args.image, args.load)
    }
    .with_context(|| format!("failed to load image {}", args.image.display()))?;

    let mut bus = BeebBus::new();
    bus.load(image.base, &image.data);

    let mut cpu = CPU::new(bus, Arc::new(dispatcher));

    if let Some(path) = &args.symbols {
        let count = cpu
            .symbol_table
            .load_from_file(path)
            .with_context(|| format!("failed to read symbols from {}", path.display()))?;
        info!("Loaded {} symbols from {}", count, path.display());
    }

    cpu.entry_point_override = args.entry;
    cpu.reset();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("failed to install the Ctrl-C handler")?;
    }

    if args.monitor {
        let mut monitor = Monitor::new(&mut cpu, stop);
        monitor.repl().context("monitor I/O failed")?;
        return Ok(());
    }

    run_headless(&mut cpu, &stop, args.max_instructions)
}

fn run_headless(cpu: &mut CPU<BeebBus>, stop: &AtomicBool, budget: Option<u64>) -> Result<()> {
    let mut executed: u64 = 0;
    let mut failure = None;

    while budget.map_or(true, |limit| executed < limit) {
        if stop.load(Ordering::SeqCst) {
            info!("Interrupted by Ctrl-C");
            break;
        }
        if let Err(err) = cpu.step() {
            failure = Some(err);
            break;
        }
        executed += 1;
    }

    info!(
        "Ran {} instructions in {} cycles",
        executed,
        cpu.bus.cycles()
    );
    println!(
        "PC={:04X} A={:02X} X={:02X} Y={:02X} SP={:02X} P={:?} cycles={}",
        cpu.pc,
        cpu.regs.a,
        cpu.regs.x,
        cpu.regs.y,
        cpu.regs.sp,
        cpu.p,
        cpu.bus.cycles()
    );

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

use crate::bus::{BeebBus, Bus};
use crate::cpu::{Flags, CPU, DEFAULT_ENTRY};
use crate::disassembler::Disassembler;
use crate::rom::ROM;
use crate::util::parse_hex_u16;
use owo_colors::OwoColorize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Monitor<'a> {
    cpu: &'a mut CPU<BeebBus>,
    breakpoints: HashSet<u16>,
    stop: Arc<AtomicBool>,
}

impl<'a> Monitor<'a> {
    /// `stop` is raised by the Ctrl-C handler to break out of `continue`.
    pub fn new(cpu: &'a mut CPU<BeebBus>, stop: Arc<AtomicBool>) -> Self {
        Self {
            cpu,
            breakpoints: HashSet::new(),
            stop,
        }
    }

    pub fn repl(&mut self) -> io::Result<()> {
        self.load_rc_file();

        let stdin = io::stdin();
        loop {
            print!("monitor> ");
            io::stdout().flush()?;

            let mut input = String::new();
            if stdin.read_line(&mut input)? == 0 {
                break;
            }
            let input = input.trim();

            if input.is_empty() {
                continue;
            }

            if !self.execute_command(input) {
                break;
            }
        }

        Ok(())
    }

    /// Returns false when the monitor should exit.
    pub fn execute_command(&mut self, input: &str) -> bool {
        let args: Vec<&str> = input.split_whitespace().collect();

        if args.is_empty() {
            return true;
        }

        match args[0] {
            "help" => self.show_help(),
            "reset" => self.cpu.reset(),
            "step" | "s" => self.step(args.get(1).copied()),
            "continue" | "c" => self.run(),
            "break" if args.len() == 2 => self.set_breakpoint(args[1]),
            "delete" if args.len() == 2 => self.remove_breakpoint(args[1]),
            "registers" | "r" => self.show_registers(),
            "flags" => self.show_flags(),
            "cycles" => println!("{} cycles", self.cpu.bus.cycles()),
            "halt" => self.halt_cpu(),
            "load" if args.len() == 2 => self.load_rom(args[1], None),
            "load" if args.len() == 3 => self.load_rom(args[1], Some(args[2])),
            "mem" if args.len() == 2 => self.view_memory(args[1], None),
            "mem" if args.len() == 3 => self.view_memory(args[1], Some(args[2])),
            "page" if args.len() == 2 => self.view_memory_page(args[1]),
            "write" if args.len() == 3 => self.write_memory(args[1], args[2]),
            "dis" => self.disassemble(args.get(1).copied(), args.get(2).copied()),
            "exit" | "quit" => {
                println!("Exiting monitor.");
                return false;
            }
            _ => println!("Unknown command. Type 'help' for available commands."),
        }

        true
    }

    fn show_help(&self) {
        println!("Available commands:");
        println!("  help           - Show this help message");
        println!("  load <file> [addr]  - Load a binary image at [addr] (default 1900)");
        println!("  reset          - Reset the CPU");
        println!("  step (s) [n]   - Execute n instructions (default 1)");
        println!("  continue (c)   - Run until a breakpoint, halt or Ctrl-C");
        println!("  break <addr>   - Set a breakpoint at <addr> (hex)");
        println!("  delete <addr>  - Remove a breakpoint at <addr> (hex)");
        println!("  registers (r)  - Show CPU registers");
        println!("  flags          - Show CPU status flags");
        println!("  cycles         - Show the cycle counter");
        println!("  halt           - Halt the CPU");
        println!("  mem <addr>     - View memory at <addr> (hex)");
        println!("  mem <start> <end> - View memory range (hex)");
        println!("  page <addr>    - View a full 256-byte memory page");
        println!("  write <addr> <value> - Write <value> (hex) to <addr> (hex)");
        println!("  dis [addr] [n] - Disassemble n instructions (default PC, 16)");
        println!("  quit | exit    - Exit the monitor");
    }

    fn load_rc_file(&mut self) {
        let path = Path::new(".monitorrc");
        if let Ok(file) = File::open(path) {
            let reader = BufReader::new(file);
            for line in reader.lines() {
                match line {
                    Ok(cmd) if !cmd.trim().is_empty() && !cmd.trim().starts_with('#') => {
                        if !self.execute_command(cmd.trim()) {
                            break;
                        }
                    }
                    Err(e) => eprintln!("Error reading line: {}", e),
                    _ => {}
                }
            }
        }
    }

    fn load_rom(&mut self, filename: &str, addr: Option<&str>) {
        let load_address = addr.and_then(parse_hex_u16).unwrap_or(DEFAULT_ENTRY);

        match ROM::load_from_file(Path::new(filename), load_address) {
            Ok(rom) => {
                self.cpu.bus.load(rom.base, &rom.data);
                println!(
                    "Loaded '{}' at ${:04X} ({} bytes, crc32 {:08X})",
                    filename,
                    rom.base,
                    rom.data.len(),
                    rom.crc32
                );
            }
            Err(err) => println!("Error loading image: {}", err),
        }
    }

    fn step(&mut self, count: Option<&str>) {
        if self.cpu.halted {
            println!("CPU is halted. Use 'reset' to restart.");
            return;
        }

        let count = count.and_then(|n| n.parse::<u32>().ok()).unwrap_or(1);
        for _ in 0..count {
            println!(
                "{}",
                Disassembler::disassemble(&self.cpu.bus, self.cpu.pc, self.cpu.cpu_type)
            );
            if let Err(err) = self.cpu.step() {
                println!("{}", err.to_string().red());
                break;
            }
            if self.breakpoints.contains(&self.cpu.pc) {
                println!("Hit breakpoint at {:04X}.", self.cpu.pc);
                break;
            }
        }

        self.show_registers();
    }

    fn run(&mut self) {
        if self.cpu.halted {
            println!("CPU is halted. Use 'reset' to restart.");
            return;
        }

        println!("Resuming execution...");
        self.stop.store(false, Ordering::SeqCst);
        let start = self.cpu.bus.cycles();

        loop {
            if self.stop.swap(false, Ordering::SeqCst) {
                println!("Interrupted at {:04X}.", self.cpu.pc);
                break;
            }
            if let Err(err) = self.cpu.step() {
                println!("{}", err.to_string().red());
                break;
            }
            if self.breakpoints.contains(&self.cpu.pc) {
                println!("Hit breakpoint at {:04X}. Execution halted.", self.cpu.pc);
                break;
            }
        }

        println!("{} cycles elapsed", self.cpu.bus.cycles() - start);
        self.show_registers();
    }

    fn halt_cpu(&mut self) {
        self.cpu.halted = true;
        println!("CPU halted.");
    }

    fn set_breakpoint(&mut self, addr: &str) {
        if let Some(addr) = parse_hex_u16(addr) {
            self.breakpoints.insert(addr);
            println!("Breakpoint set at ${:04X}", addr);
        }
    }

    fn remove_breakpoint(&mut self, addr: &str) {
        if let Some(addr) = parse_hex_u16(addr) {
            self.breakpoints.remove(&addr);
            println!("Breakpoint removed at ${:04X}", addr);
        }
    }

    fn show_registers(&self) {
        println!(
            "PC: {}  A: {:02X}  X: {:02X}  Y: {:02X}  SP: {:02X}  P: {:?}  {}",
            format!("{:04X}", self.cpu.pc).yellow(),
            self.cpu.regs.a,
            self.cpu.regs.x,
            self.cpu.regs.y,
            self.cpu.regs.sp,
            self.cpu.p,
            self.cpu.bus.interrupts.status_string().dimmed()
        );
    }

    fn show_flags(&self) {
        println!(
            "Flags: C={} Z={} I={} D={} V={} N={}",
            self.cpu.p.contains(Flags::CARRY) as u8,
            self.cpu.p.contains(Flags::ZERO) as u8,
            self.cpu.p.contains(Flags::IRQ_DISABLE) as u8,
            self.cpu.p.contains(Flags::DECIMAL) as u8,
            self.cpu.p.contains(Flags::OVERFLOW) as u8,
            self.cpu.p.contains(Flags::NEGATIVE) as u8
        );
    }

    fn view_memory(&self, start: &str, end: Option<&str>) {
        if let Some(start_addr) = parse_hex_u16(start) {
            let end_addr = end.and_then(parse_hex_u16).unwrap_or(start_addr);

            if start_addr > end_addr {
                println!("Invalid range: start address must be <= end address");
                return;
            }

            for addr in start_addr..=end_addr {
                println!("${:04X}: {:02X}", addr, self.cpu.bus.peek(addr));
            }
        }
    }

    fn view_memory_page(&self, addr: &str) {
        if let Some(addr) = parse_hex_u16(addr) {
            let page_start = addr & 0xFF00;
            print!(
                "{}",
                self.cpu.bus.memory().dump_range(page_start..=page_start | 0x00FF)
            );
        }
    }

    fn write_memory(&mut self, addr: &str, value: &str) {
        if let (Some(addr), Ok(value)) = (parse_hex_u16(addr), u8::from_str_radix(value, 16)) {
            self.cpu.bus.write_byte(addr, value);
            println!("Wrote {:02X} to ${:04X}", value, addr);
        }
    }

    fn disassemble(&self, addr: Option<&str>, count: Option<&str>) {
        let mut addr = addr.and_then(parse_hex_u16).unwrap_or(self.cpu.pc);
        let count = count.and_then(|n| n.parse::<u32>().ok()).unwrap_or(16);

        for _ in 0..count {
            let line = Disassembler::disassemble(&self.cpu.bus, addr, self.cpu.cpu_type);
            let symbol = self.cpu.symbol_table.append_symbol(&line);
            let marker = if addr == self.cpu.pc { ">" } else { " " };
            println!("{}{}{}", marker, line, symbol.green());
            addr = addr.wrapping_add(Disassembler::instruction_length(
                &self.cpu.bus,
                addr,
                self.cpu.cpu_type,
            ));
        }
    }
}

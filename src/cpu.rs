use crate::bus::Bus;
use crate::disassembler::{Disassembler, SymbolTable};
use crate::dispatch::Dispatcher;
use crate::error::InvalidOpcode;
use crate::interrupts::InterruptType;
use crate::semantics::Register;
use bitflags::bitflags;
use core::fmt;
use log::{debug, error, info, log_enabled, trace, Level};
use std::sync::Arc;

/// Where execution starts when neither an override nor a reset vector is set.
pub const DEFAULT_ENTRY: u16 = 0x1900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum CpuType {
    /// NMOS 6502 as fitted to the Model B.
    #[value(name = "nmos")]
    NMOS6502,
    /// 65C02 as fitted to the Master series.
    #[value(name = "cmos")]
    CMOS65C02,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,  // Accumulator
    pub x: u8,  // X Register
    pub y: u8,  // Y Register
    pub sp: u8, // Stack Pointer
}

bitflags! {
    #[derive(Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Flags: u8 {
        const CARRY       = 0b0000_0001;
        const ZERO        = 0b0000_0010;
        const IRQ_DISABLE = 0b0000_0100;
        const DECIMAL     = 0b0000_1000;
        const BREAK       = 0b0001_0000;
        const UNUSED      = 0b0010_0000;
        const OVERFLOW    = 0b0100_0000;
        const NEGATIVE    = 0b1000_0000;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", format_flags(self.bits()))
    }
}

pub fn format_flags(flags: u8) -> String {
    let flag_map = [
        ('N', Flags::NEGATIVE),
        ('V', Flags::OVERFLOW),
        ('-', Flags::UNUSED),
        ('B', Flags::BREAK),
        ('D', Flags::DECIMAL),
        ('I', Flags::IRQ_DISABLE),
        ('Z', Flags::ZERO),
        ('C', Flags::CARRY),
    ];

    flag_map
        .iter()
        .map(|&(ch, flag)| if flags & flag.bits() != 0 { ch } else { '.' })
        .collect()
}

/// Bits 4 and 5 only exist on the stack; the live register holds the other six.
const STACK_ONLY_FLAGS: Flags = Flags::BREAK.union(Flags::UNUSED);

pub struct CPU<B: Bus> {
    pub cpu_type: CpuType,

    pub bus: B,
    pub regs: Registers,
    pub pc: u16,
    pub p: Flags,

    /// Set after an invalid opcode; `step` does nothing until cleared.
    pub halted: bool,

    pub symbol_table: SymbolTable,
    pub entry_point_override: Option<u16>,

    take_int: bool,
    dispatcher: Arc<Dispatcher>,
}

impl<B: Bus> CPU<B> {
    pub fn new(bus: B, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            cpu_type: dispatcher.cpu_type(),
            bus,
            regs: Registers::default(),
            pc: 0,
            p: Flags::IRQ_DISABLE,
            halted: false,
            symbol_table: SymbolTable::new(),
            entry_point_override: None,
            take_int: false,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn peek_word(&self, addr: u16) -> u16 {
        let lo = self.bus.peek(addr) as u16;
        let hi = self.bus.peek(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn resolve_entry_point(&self) -> u16 {
        if let Some(entry) = self.entry_point_override {
            info!("Using manually set entry point: {:#06X}", entry);
            return entry;
        }

        let reset_vector = self.peek_word(0xFFFC);
        if reset_vector != 0xFFFF && reset_vector != 0x0000 {
            info!("Using reset vector entry point: {:#06X}", reset_vector);
            return reset_vector;
        }

        info!("No valid reset vector, defaulting to {:#06X}", DEFAULT_ENTRY);
        DEFAULT_ENTRY
    }

    pub fn reset(&mut self) {
        self.pc = self.resolve_entry_point();

        self.initialize_registers();
        self.initialize_flags();
        self.take_int = false;
        self.halted = false;

        info!(
            "Reset complete: PC={:#06X}, SP={:#04X}, P={:?}",
            self.pc, self.regs.sp, self.p
        );
    }

    fn initialize_registers(&mut self) {
        self.regs.a = 0x00;
        self.regs.x = 0x00;
        self.regs.y = 0x00;
        self.regs.sp = 0xFF;
    }

    fn initialize_flags(&mut self) {
        self.p = Flags::IRQ_DISABLE;
    }

    pub fn fetch_byte(&mut self) -> u8 {
        let byte = self.bus.read_byte(self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    pub fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch_byte() as u16;
        let hi = self.fetch_byte() as u16;
        (hi << 8) | lo
    }

    pub fn read_byte(&mut self, addr: u16) -> u8 {
        self.bus.read_byte(addr)
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) {
        self.bus.write_byte(addr, value);
    }

    pub fn read_zp_stack(&mut self, addr: u16) -> u8 {
        self.bus.read_zp_stack(addr)
    }

    pub fn write_zp_stack(&mut self, addr: u16, value: u8) {
        self.bus.write_zp_stack(addr, value);
    }

    pub fn poll_time(&mut self, cycles: u32) {
        self.bus.advance(cycles);
    }

    pub fn push_stack(&mut self, value: u8) {
        self.bus.write_zp_stack(0x0100 | self.regs.sp as u16, value);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    pub fn pop_stack(&mut self) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        self.bus.read_zp_stack(0x0100 | self.regs.sp as u16)
    }

    pub fn register(&self, reg: Register) -> u8 {
        match reg {
            Register::A => self.regs.a,
            Register::X => self.regs.x,
            Register::Y => self.regs.y,
            Register::S => self.regs.sp,
        }
    }

    pub fn set_register(&mut self, reg: Register, value: u8) {
        match reg {
            Register::A => self.regs.a = value,
            Register::X => self.regs.x = value,
            Register::Y => self.regs.y = value,
            Register::S => self.regs.sp = value,
        }
    }

    /// Status byte as pushed by PHP and BRK, with bits 4 and 5 set.
    pub fn flags_to_byte(&self) -> u8 {
        self.p.difference(STACK_ONLY_FLAGS).bits() | STACK_ONLY_FLAGS.bits()
    }

    pub fn flags_from_byte(&mut self, value: u8) {
        self.p = Flags::from_bits_truncate(value).difference(STACK_ONLY_FLAGS);
    }

    pub fn update_zero_and_negative_flags(&mut self, value: u8) {
        self.p.set(Flags::ZERO, value == 0);
        self.p.set(Flags::NEGATIVE, (value & 0b1000_0000) != 0);
    }

    pub fn compare(&mut self, reg: u8, value: u8) {
        let result = reg.wrapping_sub(value);

        self.p.set(Flags::CARRY, reg >= value);
        self.update_zero_and_negative_flags(result);
    }

    pub fn adc(&mut self, value: u8) {
        let carry_in = if self.p.contains(Flags::CARRY) { 1 } else { 0 };
        let a_before = self.regs.a;
        let sum_16 = a_before as u16 + value as u16 + carry_in as u16;
        let mut a_after = (sum_16 & 0xFF) as u8;
        let mut carry_out = sum_16 > 0xFF;

        if self.p.contains(Flags::DECIMAL) {
            let mut low_nibble = (a_before & 0x0F)
                .wrapping_add(value & 0x0F)
                .wrapping_add(carry_in);
            let mut high_nibble = (a_before >> 4).wrapping_add(value >> 4);

            if low_nibble > 9 {
                low_nibble = low_nibble.wrapping_sub(10);
                high_nibble = high_nibble.wrapping_add(1);
            }

            carry_out = high_nibble > 9;
            if carry_out {
                high_nibble = high_nibble.wrapping_sub(10);
            }

            a_after = (high_nibble << 4) | (low_nibble & 0x0F);
        }

        self.regs.a = a_after;
        self.p.set(Flags::CARRY, carry_out);

        let overflow = ((a_before ^ value) & 0x80 == 0) && ((a_before ^ a_after) & 0x80 != 0);
        self.p.set(Flags::OVERFLOW, overflow);

        self.update_zero_and_negative_flags(self.regs.a);
    }

    pub fn sbc(&mut self, value: u8) {
        let carry_in = if self.p.contains(Flags::CARRY) { 1 } else { 0 };
        let a_before = self.regs.a;

        let binary_result = (a_before as u16) + (!value as u16) + carry_in as u16;
        let mut result = (binary_result & 0xFF) as u8;
        let mut did_borrow = binary_result < 0x100;

        if self.p.contains(Flags::DECIMAL) {
            let mut low_nibble = (a_before & 0x0F)
                .wrapping_sub(value & 0x0F)
                .wrapping_sub(1 - carry_in);
            let mut high_nibble = (a_before >> 4).wrapping_sub(value >> 4);

            if (low_nibble & 0x10) != 0 {
                low_nibble = low_nibble.wrapping_sub(6) & 0x0F;
                high_nibble = high_nibble.wrapping_sub(1);
            }

            if high_nibble > 9 {
                high_nibble = high_nibble.wrapping_sub(6) & 0x0F;
                did_borrow = true;
            }

            result = (high_nibble << 4) | (low_nibble & 0x0F);
        }

        self.regs.a = result;
        self.p.set(Flags::CARRY, !did_borrow);

        let overflow = ((a_before ^ value) & 0x80 != 0) && ((a_before ^ result) & 0x80 != 0);
        self.p.set(Flags::OVERFLOW, overflow);

        self.update_zero_and_negative_flags(self.regs.a);
    }

    /// Relative branch. Owns its own timing: 2 cycles not taken, 3 taken,
    /// 4 if the target is on another page. Interrupts are sampled before the
    /// final cycle.
    pub fn branch(&mut self, taken: bool) {
        let offset = self.fetch_byte() as i8;
        if !taken {
            self.poll_time(1);
            self.check_interrupt();
            self.poll_time(1);
            return;
        }

        let target = self.pc.wrapping_add(offset as u16);
        let page_crossed = (self.pc & 0xFF00) != (target & 0xFF00);
        self.pc = target;
        self.poll_time(if page_crossed { 3 } else { 2 });
        self.check_interrupt();
        self.poll_time(1);
    }

    pub fn brk(&mut self) {
        let return_addr = self.pc.wrapping_add(1);
        self.push_stack((return_addr >> 8) as u8);
        self.push_stack(return_addr as u8);
        self.push_stack(self.flags_to_byte());

        self.p.insert(Flags::IRQ_DISABLE);
        if self.cpu_type != CpuType::NMOS6502 {
            self.p.remove(Flags::DECIMAL);
        }

        self.pc = self.read_vector(InterruptType::BRK.vector());
    }

    fn read_vector(&mut self, addr: u16) -> u16 {
        let lo = self.bus.read_byte(addr) as u16;
        let hi = self.bus.read_byte(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// Sample the interrupt lines. The decision is acted on once the current
    /// instruction completes.
    pub fn check_interrupt(&mut self) {
        let irq = self.bus.irq_asserted() && !self.p.contains(Flags::IRQ_DISABLE);
        self.take_int = irq || self.bus.nmi_asserted();
    }

    fn service_interrupt(&mut self) {
        let interrupt_type = if self.bus.nmi_asserted() {
            self.bus.acknowledge_nmi();
            InterruptType::NMI
        } else {
            InterruptType::IRQ
        };

        self.push_stack((self.pc >> 8) as u8);
        self.push_stack(self.pc as u8);
        self.push_stack(self.flags_to_byte() & !Flags::BREAK.bits());

        self.p.insert(Flags::IRQ_DISABLE);
        if self.cpu_type != CpuType::NMOS6502 {
            self.p.remove(Flags::DECIMAL);
        }

        self.pc = self.read_vector(interrupt_type.vector());
        self.poll_time(7);

        debug!(
            "Handling {:?} interrupt: jumping to {:#06X}",
            interrupt_type, self.pc
        );
    }

    /// Run the instruction for an already-fetched opcode.
    pub fn execute(&mut self, opcode: u8) -> Result<(), InvalidOpcode> {
        let dispatcher = Arc::clone(&self.dispatcher);
        dispatcher.execute(self, opcode)
    }

    /// Fetch and run one instruction, then take a pending interrupt.
    ///
    /// An invalid opcode leaves every register as it was, halts the CPU and
    /// returns the diagnostic. A halted CPU does nothing.
    pub fn step(&mut self) -> Result<(), InvalidOpcode> {
        if self.halted {
            return Ok(());
        }

        let pc = self.pc;

        let instruction =
            log_enabled!(Level::Trace).then(|| Disassembler::disassemble(&self.bus, pc, self.cpu_type));

        let opcode = self.fetch_byte();

        if let Err(err) = self.execute(opcode) {
            self.pc = pc;
            self.halted = true;
            error!(
                "{}: {}",
                err,
                Disassembler::disassemble(&self.bus, pc, self.cpu_type)
            );
            return Err(err);
        }

        if let Some(instruction) = instruction {
            trace!(
                "{} A:{:02X} X:{:02X} Y:{:02X} P:{}[{:02X}] SP:{:02X} CYC:{}{}",
                instruction,
                self.regs.a,
                self.regs.x,
                self.regs.y,
                format_flags(self.p.bits()),
                self.p.bits(),
                self.regs.sp,
                self.bus.cycles(),
                self.symbol_table.append_symbol(&instruction),
            );
        }

        if self.take_int {
            self.take_int = false;
            self.service_interrupt();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BeebBus;
    use crate::dispatch::DispatchStrategy;

    fn setup_cpu(cpu_type: CpuType) -> CPU<BeebBus> {
        let dispatcher = Dispatcher::build(cpu_type, DispatchStrategy::Table).unwrap();
        let mut cpu = CPU::new(BeebBus::new(), Arc::new(dispatcher));
        cpu.pc = 0x1000;
        cpu.regs.sp = 0xFF;
        cpu.p = Flags::empty();
        cpu
    }

    #[test]
    fn test_flag_byte_has_stack_only_bits() {
        let mut cpu = setup_cpu(CpuType::NMOS6502);
        cpu.p = Flags::CARRY | Flags::NEGATIVE;
        assert_eq!(cpu.flags_to_byte(), 0b1011_0001);

        cpu.flags_from_byte(0xFF);
        assert!(!cpu.p.contains(Flags::BREAK));
        assert!(!cpu.p.contains(Flags::UNUSED));
        assert!(cpu.p.contains(Flags::DECIMAL | Flags::OVERFLOW));
    }

    #[test]
    fn test_format_flags() {
        assert_eq!(format_flags(0b1010_0011), "N.-...ZC");
    }

    #[test]
    fn test_stack_wraps_within_page_one() {
        let mut cpu = setup_cpu(CpuType::NMOS6502);
        cpu.regs.sp = 0x00;
        cpu.push_stack(0x42);
        assert_eq!(cpu.regs.sp, 0xFF);
        assert_eq!(cpu.bus.peek(0x0100), 0x42);
        assert_eq!(cpu.pop_stack(), 0x42);
        assert_eq!(cpu.regs.sp, 0x00);
    }

    #[test]
    fn test_adc_binary() {
        let mut cpu = setup_cpu(CpuType::NMOS6502);
        cpu.regs.a = 0x7F;
        cpu.adc(0x01);
        assert_eq!(cpu.regs.a, 0x80);
        assert!(cpu.p.contains(Flags::OVERFLOW | Flags::NEGATIVE));
        assert!(!cpu.p.contains(Flags::CARRY));

        cpu.regs.a = 0xFF;
        cpu.p = Flags::empty();
        cpu.adc(0x01);
        assert_eq!(cpu.regs.a, 0x00);
        assert!(cpu.p.contains(Flags::CARRY | Flags::ZERO));
    }

    #[test]
    fn test_adc_decimal() {
        let mut cpu = setup_cpu(CpuType::NMOS6502);
        cpu.p = Flags::DECIMAL;
        cpu.regs.a = 0x19;
        cpu.adc(0x28);
        assert_eq!(cpu.regs.a, 0x47);
        assert!(!cpu.p.contains(Flags::CARRY));

        cpu.regs.a = 0x99;
        cpu.adc(0x01);
        assert_eq!(cpu.regs.a, 0x00);
        assert!(cpu.p.contains(Flags::CARRY));
    }

    #[test]
    fn test_sbc_binary() {
        let mut cpu = setup_cpu(CpuType::NMOS6502);
        cpu.p = Flags::CARRY;
        cpu.regs.a = 0x10;
        cpu.sbc(0x01);
        assert_eq!(cpu.regs.a, 0x0F);
        assert!(cpu.p.contains(Flags::CARRY));

        cpu.regs.a = 0x00;
        cpu.sbc(0x01);
        assert_eq!(cpu.regs.a, 0xFF);
        assert!(!cpu.p.contains(Flags::CARRY));
        assert!(cpu.p.contains(Flags::NEGATIVE));
    }

    #[test]
    fn test_branch_timing() {
        let mut cpu = setup_cpu(CpuType::NMOS6502);
        cpu.bus.load(0x1000, &[0x10]);
        cpu.branch(false);
        assert_eq!(cpu.pc, 0x1001);
        assert_eq!(cpu.bus.cycles(), 2);

        let mut cpu = setup_cpu(CpuType::NMOS6502);
        cpu.bus.load(0x1000, &[0x10]);
        cpu.branch(true);
        assert_eq!(cpu.pc, 0x1011);
        assert_eq!(cpu.bus.cycles(), 3);

        let mut cpu = setup_cpu(CpuType::NMOS6502);
        cpu.bus.load(0x1000, &[0x80]);
        cpu.branch(true);
        assert_eq!(cpu.pc, 0x0F81);
        assert_eq!(cpu.bus.cycles(), 4);
    }

    #[test]
    fn test_brk_pushes_and_vectors() {
        let mut cpu = setup_cpu(CpuType::CMOS65C02);
        cpu.bus.load(0xFFFE, &[0x00, 0x80]);
        cpu.p = Flags::DECIMAL | Flags::CARRY;
        cpu.pc = 0x1001;
        cpu.brk();

        assert_eq!(cpu.pc, 0x8000);
        assert_eq!(cpu.bus.peek(0x01FF), 0x10);
        assert_eq!(cpu.bus.peek(0x01FE), 0x02);
        assert_eq!(cpu.bus.peek(0x01FD), 0b0011_1001);
        assert!(cpu.p.contains(Flags::IRQ_DISABLE));
        assert!(!cpu.p.contains(Flags::DECIMAL));
    }

    #[test]
    fn test_resolve_entry_point() {
        let mut cpu = setup_cpu(CpuType::NMOS6502);
        assert_eq!(cpu.resolve_entry_point(), DEFAULT_ENTRY);

        cpu.bus.load(0xFFFC, &[0x00, 0xC0]);
        assert_eq!(cpu.resolve_entry_point(), 0xC000);

        cpu.entry_point_override = Some(0x2000);
        assert_eq!(cpu.resolve_entry_point(), 0x2000);
    }

    #[test]
    fn test_halted_cpu_does_nothing() {
        let mut cpu = setup_cpu(CpuType::NMOS6502);
        cpu.halted = true;
        assert!(cpu.step().is_ok());
        assert_eq!(cpu.pc, 0x1000);
        assert_eq!(cpu.bus.cycles(), 0);
    }
}

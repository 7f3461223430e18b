use crate::interrupts::{InterruptController, IrqSource};
use crate::memory::Memory;
#[cfg(feature = "debug-mode")]
use log::debug;

const MEMORY_SIZE: usize = 64 * 1024;

/// Interrupt feedback register used by interrupt test images. Bit 0 drives
/// IRQ, a rising edge on bit 1 raises NMI.
pub const FEEDBACK_REGISTER: u16 = 0xBFFC;

/// Which 32-byte blocks of &FE00-&FEFF sit on the 1MHz bus.
const FE_SLOW_BLOCKS: [bool; 8] = [true, false, true, true, false, false, true, false];

/// True for addresses that are accessed at 1MHz on the BBC Micro.
pub fn is_slow_address(addr: u16) -> bool {
    match addr {
        0xFC00..=0xFDFF => true,
        0xFE00..=0xFEFF => FE_SLOW_BLOCKS[((addr >> 5) & 7) as usize],
        _ => false,
    }
}

/// The memory and clock as the CPU sees them.
///
/// Reads and writes are untimed; the compiled instructions advance the clock
/// explicitly through [`Bus::advance`].
pub trait Bus {
    fn read_byte(&mut self, addr: u16) -> u8;

    fn write_byte(&mut self, addr: u16, value: u8);

    /// Zero page and stack accesses. These never hit I/O.
    fn read_zp_stack(&mut self, addr: u16) -> u8 {
        self.read_byte(addr)
    }

    fn write_zp_stack(&mut self, addr: u16, value: u8) {
        self.write_byte(addr, value)
    }

    /// Read without side effects, for disassembly and the monitor.
    fn peek(&self, addr: u16) -> u8;

    fn is_slow_access(&self, _addr: u16) -> bool {
        false
    }

    fn advance(&mut self, cycles: u32);

    fn cycles(&self) -> u64;

    fn irq_asserted(&self) -> bool {
        false
    }

    fn nmi_asserted(&self) -> bool {
        false
    }

    fn acknowledge_nmi(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Read { addr: u16, value: u8 },
    Write { addr: u16, value: u8 },
    ZeroPageRead { addr: u16, value: u8 },
    ZeroPageWrite { addr: u16, value: u8 },
    Wait(u32),
}

/// 64 KiB of RAM with the BBC Micro's 1MHz region and an interrupt
/// controller.
pub struct BeebBus {
    ram: Memory,
    cycles: u64,
    pub interrupts: InterruptController,
    pub i_port: u8,
    trace: Option<Vec<BusEvent>>,
}

impl Default for BeebBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BeebBus {
    pub fn new() -> Self {
        Self {
            ram: Memory::new(MEMORY_SIZE, "BUSRAM".into()),
            cycles: 0,
            interrupts: InterruptController::default(),
            i_port: 0,
            trace: None,
        }
    }

    pub fn load(&mut self, addr: u16, bytes: &[u8]) -> usize {
        self.ram.load_bytes(addr, bytes)
    }

    pub fn memory(&self) -> &Memory {
        &self.ram
    }

    pub fn enable_trace(&mut self) {
        self.trace = Some(Vec::new());
    }

    /// Drain the recorded events, leaving tracing enabled.
    pub fn take_trace(&mut self) -> Vec<BusEvent> {
        self.trace.as_mut().map(std::mem::take).unwrap_or_default()
    }

    fn record(&mut self, event: BusEvent) {
        #[cfg(feature = "debug-mode")]
        debug!("bus {:?} @ {}", event, self.cycles);

        if let Some(trace) = self.trace.as_mut() {
            trace.push(event);
        }
    }

    fn write_feedback(&mut self, value: u8) {
        let nmi_edge = value & 0x02 != 0 && self.i_port & 0x02 == 0;
        self.i_port = value;

        if value & 0x01 != 0 {
            self.interrupts.request_irq(IrqSource::FEEDBACK);
        } else {
            self.interrupts.clear_irq(IrqSource::FEEDBACK);
        }

        if nmi_edge {
            self.interrupts.request_nmi();
        }
    }
}

impl Bus for BeebBus {
    fn read_byte(&mut self, addr: u16) -> u8 {
        let value = self.peek(addr);
        self.record(BusEvent::Read { addr, value });
        value
    }

    fn write_byte(&mut self, addr: u16, value: u8) {
        self.record(BusEvent::Write { addr, value });
        match addr {
            FEEDBACK_REGISTER => self.write_feedback(value),
            _ => self.ram.write_byte(addr, value),
        }
    }

    fn read_zp_stack(&mut self, addr: u16) -> u8 {
        let value = self.ram.read_byte(addr);
        self.record(BusEvent::ZeroPageRead { addr, value });
        value
    }

    fn write_zp_stack(&mut self, addr: u16, value: u8) {
        self.record(BusEvent::ZeroPageWrite { addr, value });
        self.ram.write_byte(addr, value);
    }

    fn peek(&self, addr: u16) -> u8 {
        match addr {
            FEEDBACK_REGISTER => self.i_port,
            _ => self.ram.read_byte(addr),
        }
    }

    fn is_slow_access(&self, addr: u16) -> bool {
        is_slow_address(addr)
    }

    fn advance(&mut self, cycles: u32) {
        self.cycles += cycles as u64;
        self.record(BusEvent::Wait(cycles));
    }

    fn cycles(&self) -> u64 {
        self.cycles
    }

    fn irq_asserted(&self) -> bool {
        self.interrupts.irq_asserted()
    }

    fn nmi_asserted(&self) -> bool {
        self.interrupts.nmi_pending()
    }

    fn acknowledge_nmi(&mut self) {
        self.interrupts.acknowledge_nmi();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slow_region_classification() {
        assert!(!is_slow_address(0xFBFF));
        assert!(is_slow_address(0xFC00));
        assert!(is_slow_address(0xFDFF));
        assert!(is_slow_address(0xFE00)); // block 0
        assert!(!is_slow_address(0xFE20)); // block 1
        assert!(is_slow_address(0xFE40)); // block 2
        assert!(is_slow_address(0xFE7F)); // block 3
        assert!(!is_slow_address(0xFE80)); // block 4
        assert!(!is_slow_address(0xFEA0)); // block 5
        assert!(is_slow_address(0xFEC0)); // block 6
        assert!(!is_slow_address(0xFEE0)); // block 7
        assert!(!is_slow_address(0xFF00));
    }

    #[test]
    fn test_feedback_register_drives_interrupts() {
        let mut bus = BeebBus::new();
        bus.write_byte(FEEDBACK_REGISTER, 0x01);
        assert!(bus.irq_asserted());
        assert_eq!(bus.peek(FEEDBACK_REGISTER), 0x01);

        bus.write_byte(FEEDBACK_REGISTER, 0x02);
        assert!(!bus.irq_asserted());
        assert!(bus.nmi_asserted());

        bus.acknowledge_nmi();
        // No new edge while bit 1 stays high
        bus.write_byte(FEEDBACK_REGISTER, 0x02);
        assert!(!bus.nmi_asserted());
    }

    #[test]
    fn test_trace_records_accesses() {
        let mut bus = BeebBus::new();
        bus.write_byte(0x2000, 0x42);
        bus.enable_trace();
        assert_eq!(bus.read_byte(0x2000), 0x42);
        bus.write_zp_stack(0x01FF, 0x10);
        bus.advance(3);

        assert_eq!(
            bus.take_trace(),
            vec![
                BusEvent::Read {
                    addr: 0x2000,
                    value: 0x42
                },
                BusEvent::ZeroPageWrite {
                    addr: 0x01FF,
                    value: 0x10
                },
                BusEvent::Wait(3),
            ]
        );
        assert!(bus.take_trace().is_empty());
        assert_eq!(bus.cycles(), 3);
    }
}

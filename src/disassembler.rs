use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::bus::Bus;
use crate::cpu::CpuType;
use crate::opcodes::{decode, AddressingMode};
use crate::util::parse_hex_u16;

const ADDRESS_PATTERN: &str = r"\$([0-9A-F]{4})";

/// Address to label map used to annotate disassembly.
pub struct SymbolTable {
    symbols: HashMap<u16, String>,
    pattern: Option<Regex>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            symbols: HashMap::new(),
            pattern: Regex::new(ADDRESS_PATTERN).ok(),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn insert(&mut self, addr: u16, name: impl Into<String>) {
        self.symbols.insert(addr, name.into());
    }

    pub fn get(&self, addr: u16) -> Option<&str> {
        self.symbols.get(&addr).map(String::as_str)
    }

    /// Returns ` ; NAME` for the first operand address with a known symbol,
    /// or an empty string. The leading instruction address is skipped.
    pub fn append_symbol(&self, disassembly: &str) -> String {
        let Some(pattern) = &self.pattern else {
            return String::new();
        };

        pattern
            .captures_iter(disassembly)
            .skip(1)
            .filter_map(|cap| cap.get(1))
            .filter_map(|hex| u16::from_str_radix(hex.as_str(), 16).ok())
            .find_map(|addr| self.get(addr))
            .map(|symbol| format!(" ; {}", symbol))
            .unwrap_or_default()
    }

    /// Parse `ADDR NAME` lines. Addresses are hex with an optional `$` or
    /// `&` prefix; anything else is ignored.
    pub fn load_symbols(&mut self, data: &str) -> usize {
        let mut loaded = 0;
        for line in data.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                if let Some(address) = parse_hex_u16(parts[0]) {
                    self.symbols.insert(address, parts[1].to_string());
                    loaded += 1;
                }
            }
        }
        loaded
    }

    pub fn load_from_file(&mut self, path: &Path) -> io::Result<usize> {
        let data = fs::read_to_string(path)?;
        Ok(self.load_symbols(&data.replace('\r', "")))
    }
}

pub struct Disassembler;

impl Disassembler {
    pub fn disassemble<B: Bus>(bus: &B, addr: u16, cpu_type: CpuType) -> String {
        let opcode = bus.peek(addr);
        let (mnemonic, mode) = match decode(cpu_type, opcode) {
            Some(info) => (info.mnemonic.name(), info.mode),
            None => ("???", AddressingMode::Implied),
        };
        let operand_bytes = mode.operand_bytes();

        let operand1 = bus.peek(addr.wrapping_add(1));
        let operand2 = bus.peek(addr.wrapping_add(2));

        let formatted_operand = Disassembler::format_operands(addr, mode, operand1, operand2);

        let mut byte_dump = format!("{:02X}", opcode);
        if operand_bytes >= 1 {
            byte_dump.push_str(&format!(" {:02X}", operand1));
        }
        if operand_bytes == 2 {
            byte_dump.push_str(&format!(" {:02X}", operand2));
        }

        format!(
            "${:04X}  {:<8}  -  {:<4} {:<8}",
            addr, byte_dump, mnemonic, formatted_operand
        )
    }

    /// Bytes occupied by the instruction at `addr`, including the opcode.
    pub fn instruction_length<B: Bus>(bus: &B, addr: u16, cpu_type: CpuType) -> u16 {
        let operand_bytes = decode(cpu_type, bus.peek(addr)).map_or(0, |info| info.mode.operand_bytes());
        1 + operand_bytes as u16
    }

    pub fn format_operands(addr: u16, mode: AddressingMode, operand1: u8, operand2: u8) -> String {
        let word = (operand2 as u16) << 8 | operand1 as u16;
        match mode {
            AddressingMode::Implied => String::new(),
            AddressingMode::Accumulator => "A".to_string(),
            AddressingMode::Immediate => format!("#${:02X}", operand1),
            AddressingMode::ZeroPage => format!("${:02X}", operand1),
            AddressingMode::ZeroPageX => format!("${:02X},X", operand1),
            AddressingMode::ZeroPageY => format!("${:02X},Y", operand1),
            AddressingMode::Absolute => format!("${:04X}", word),
            AddressingMode::AbsoluteX => format!("${:04X},X", word),
            AddressingMode::AbsoluteY => format!("${:04X},Y", word),
            AddressingMode::Indirect => format!("(${:04X})", word),
            AddressingMode::IndexedIndirect => format!("(${:02X},X)", operand1),
            AddressingMode::IndirectIndexed => format!("(${:02X}),Y", operand1),
            AddressingMode::Relative => {
                let offset = operand1 as i8;
                let target = addr.wrapping_add(2).wrapping_add(offset as u16);
                format!("${:04X}", target)
            }
        }
    }
}

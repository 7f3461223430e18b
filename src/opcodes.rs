//! Opcode decoding tables.
//!
//! Each CPU type has a 256-entry table mapping an opcode byte to a
//! (mnemonic, addressing mode) pair. `None` marks a byte with no entry; such
//! opcodes dispatch to the invalid-opcode handler at run time.

use crate::cpu::CpuType;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    /// `JMP ($nnnn)` only.
    Indirect,
    /// `($nn,X)`
    IndexedIndirect,
    /// `($nn),Y`
    IndirectIndexed,
    Relative,
}

impl AddressingMode {
    pub fn operand_bytes(&self) -> usize {
        match self {
            AddressingMode::Implied | AddressingMode::Accumulator => 0,
            AddressingMode::Immediate
            | AddressingMode::ZeroPage
            | AddressingMode::ZeroPageX
            | AddressingMode::ZeroPageY
            | AddressingMode::Relative
            | AddressingMode::IndexedIndirect
            | AddressingMode::IndirectIndexed => 1,
            AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY
            | AddressingMode::Indirect => 2,
        }
    }

    /// Short operand notation used in log lines, e.g. `abs,x`.
    pub fn notation(&self) -> &'static str {
        match self {
            AddressingMode::Implied => "",
            AddressingMode::Accumulator => "A",
            AddressingMode::Immediate => "imm",
            AddressingMode::ZeroPage => "zp",
            AddressingMode::ZeroPageX => "zp,x",
            AddressingMode::ZeroPageY => "zp,y",
            AddressingMode::Absolute => "abs",
            AddressingMode::AbsoluteX => "abs,x",
            AddressingMode::AbsoluteY => "abs,y",
            AddressingMode::Indirect => "()",
            AddressingMode::IndexedIndirect => "(,x)",
            AddressingMode::IndirectIndexed => "(),y",
            AddressingMode::Relative => "branch",
        }
    }
}

macro_rules! mnemonics {
    ($($variant:ident => $name:literal),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Mnemonic {
            $($variant,)*
        }

        impl Mnemonic {
            pub const fn name(&self) -> &'static str {
                match self {
                    $(Mnemonic::$variant => $name,)*
                }
            }
        }
    };
}

mnemonics! {
    Adc => "ADC", And => "AND", Asl => "ASL", Bcc => "BCC", Bcs => "BCS", Beq => "BEQ",
    Bit => "BIT", Bmi => "BMI", Bne => "BNE", Bpl => "BPL", Bra => "BRA", Brk => "BRK",
    Bvc => "BVC", Bvs => "BVS", Clc => "CLC", Cld => "CLD", Cli => "CLI", Clv => "CLV",
    Cmp => "CMP", Cpx => "CPX", Cpy => "CPY", Dec => "DEC", Dex => "DEX", Dey => "DEY",
    Eor => "EOR", Inc => "INC", Inx => "INX", Iny => "INY", Jmp => "JMP", Jsr => "JSR",
    Lda => "LDA", Ldx => "LDX", Ldy => "LDY", Lsr => "LSR", Nop => "NOP", Ora => "ORA",
    Pha => "PHA", Php => "PHP", Phx => "PHX", Phy => "PHY", Pla => "PLA", Plp => "PLP",
    Plx => "PLX", Ply => "PLY", Rol => "ROL", Ror => "ROR", Rti => "RTI", Rts => "RTS",
    Sbc => "SBC", Sec => "SEC", Sed => "SED", Sei => "SEI", Sta => "STA", Stx => "STX",
    Sty => "STY", Stz => "STZ", Tax => "TAX", Tay => "TAY", Trb => "TRB", Tsb => "TSB",
    Tsx => "TSX", Txa => "TXA", Txs => "TXS", Tya => "TYA",
    // Undocumented NMOS opcodes
    Anc => "ANC", Ane => "ANE", Arr => "ARR", Asr => "ASR", Dcp => "DCP", Isb => "ISB",
    Las => "LAS", Lax => "LAX", Rla => "RLA", Rra => "RRA", Sax => "SAX", Sbx => "SBX",
    Sha => "SHA", Shs => "SHS", Shx => "SHX", Shy => "SHY", Slo => "SLO", Sre => "SRE",
}

impl Mnemonic {
    pub const fn is_undocumented(&self) -> bool {
        matches!(
            self,
            Mnemonic::Anc
                | Mnemonic::Ane
                | Mnemonic::Arr
                | Mnemonic::Asr
                | Mnemonic::Dcp
                | Mnemonic::Isb
                | Mnemonic::Las
                | Mnemonic::Lax
                | Mnemonic::Rla
                | Mnemonic::Rra
                | Mnemonic::Sax
                | Mnemonic::Sbx
                | Mnemonic::Sha
                | Mnemonic::Shs
                | Mnemonic::Shx
                | Mnemonic::Shy
                | Mnemonic::Slo
                | Mnemonic::Sre
        )
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode {
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
}

impl Opcode {
    pub const fn new(mnemonic: Mnemonic, mode: AddressingMode) -> Self {
        Self { mnemonic, mode }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.mode {
            AddressingMode::Implied => write!(f, "{}", self.mnemonic),
            mode => write!(f, "{} {}", self.mnemonic, mode.notation()),
        }
    }
}

const fn op(mnemonic: Mnemonic, mode: AddressingMode) -> Option<Opcode> {
    Some(Opcode::new(mnemonic, mode))
}

#[rustfmt::skip]
pub const NMOS_OPCODES: [Option<Opcode>; 256] = {
    use AddressingMode::*;
    use Mnemonic::*;

    let mut t: [Option<Opcode>; 256] = [None; 256];

    t[0x00] = op(Brk, Implied);         t[0x01] = op(Ora, IndexedIndirect);
    t[0x03] = op(Slo, IndexedIndirect); t[0x04] = op(Nop, ZeroPage);
    t[0x05] = op(Ora, ZeroPage);        t[0x06] = op(Asl, ZeroPage);
    t[0x07] = op(Slo, ZeroPage);        t[0x08] = op(Php, Implied);
    t[0x09] = op(Ora, Immediate);       t[0x0A] = op(Asl, Accumulator);
    t[0x0B] = op(Anc, Immediate);       t[0x0C] = op(Nop, Absolute);
    t[0x0D] = op(Ora, Absolute);        t[0x0E] = op(Asl, Absolute);
    t[0x0F] = op(Slo, Absolute);

    t[0x10] = op(Bpl, Relative);        t[0x11] = op(Ora, IndirectIndexed);
    t[0x13] = op(Slo, IndirectIndexed); t[0x14] = op(Nop, ZeroPageX);
    t[0x15] = op(Ora, ZeroPageX);       t[0x16] = op(Asl, ZeroPageX);
    t[0x17] = op(Slo, ZeroPageX);       t[0x18] = op(Clc, Implied);
    t[0x19] = op(Ora, AbsoluteY);       t[0x1A] = op(Nop, Implied);
    t[0x1B] = op(Slo, AbsoluteY);       t[0x1C] = op(Nop, AbsoluteX);
    t[0x1D] = op(Ora, AbsoluteX);       t[0x1E] = op(Asl, AbsoluteX);
    t[0x1F] = op(Slo, AbsoluteX);

    t[0x20] = op(Jsr, Absolute);        t[0x21] = op(And, IndexedIndirect);
    t[0x23] = op(Rla, IndexedIndirect); t[0x24] = op(Bit, ZeroPage);
    t[0x25] = op(And, ZeroPage);        t[0x26] = op(Rol, ZeroPage);
    t[0x27] = op(Rla, ZeroPage);        t[0x28] = op(Plp, Implied);
    t[0x29] = op(And, Immediate);       t[0x2A] = op(Rol, Accumulator);
    t[0x2B] = op(Anc, Immediate);       t[0x2C] = op(Bit, Absolute);
    t[0x2D] = op(And, Absolute);        t[0x2E] = op(Rol, Absolute);
    t[0x2F] = op(Rla, Absolute);

    t[0x30] = op(Bmi, Relative);        t[0x31] = op(And, IndirectIndexed);
    t[0x33] = op(Rla, IndirectIndexed); t[0x34] = op(Nop, ZeroPageX);
    t[0x35] = op(And, ZeroPageX);       t[0x36] = op(Rol, ZeroPageX);
    t[0x37] = op(Rla, ZeroPageX);       t[0x38] = op(Sec, Implied);
    t[0x39] = op(And, AbsoluteY);       t[0x3A] = op(Nop, Implied);
    t[0x3B] = op(Rla, AbsoluteY);       t[0x3C] = op(Nop, AbsoluteX);
    t[0x3D] = op(And, AbsoluteX);       t[0x3E] = op(Rol, AbsoluteX);
    t[0x3F] = op(Rla, AbsoluteX);

    t[0x40] = op(Rti, Implied);         t[0x41] = op(Eor, IndexedIndirect);
    t[0x43] = op(Sre, IndexedIndirect); t[0x44] = op(Nop, ZeroPage);
    t[0x45] = op(Eor, ZeroPage);        t[0x46] = op(Lsr, ZeroPage);
    t[0x47] = op(Sre, ZeroPage);        t[0x48] = op(Pha, Implied);
    t[0x49] = op(Eor, Immediate);       t[0x4A] = op(Lsr, Accumulator);
    t[0x4B] = op(Asr, Immediate);       t[0x4C] = op(Jmp, Absolute);
    t[0x4D] = op(Eor, Absolute);        t[0x4E] = op(Lsr, Absolute);
    t[0x4F] = op(Sre, Absolute);

    t[0x50] = op(Bvc, Relative);        t[0x51] = op(Eor, IndirectIndexed);
    t[0x53] = op(Sre, IndirectIndexed); t[0x54] = op(Nop, ZeroPageX);
    t[0x55] = op(Eor, ZeroPageX);       t[0x56] = op(Lsr, ZeroPageX);
    t[0x57] = op(Sre, ZeroPageX);       t[0x58] = op(Cli, Implied);
    t[0x59] = op(Eor, AbsoluteY);       t[0x5A] = op(Nop, Implied);
    t[0x5B] = op(Sre, AbsoluteY);       t[0x5C] = op(Nop, AbsoluteX);
    t[0x5D] = op(Eor, AbsoluteX);       t[0x5E] = op(Lsr, AbsoluteX);
    t[0x5F] = op(Sre, AbsoluteX);

    t[0x60] = op(Rts, Implied);         t[0x61] = op(Adc, IndexedIndirect);
    t[0x63] = op(Rra, IndexedIndirect); t[0x64] = op(Nop, ZeroPage);
    t[0x65] = op(Adc, ZeroPage);        t[0x66] = op(Ror, ZeroPage);
    t[0x67] = op(Rra, ZeroPage);        t[0x68] = op(Pla, Implied);
    t[0x69] = op(Adc, Immediate);       t[0x6A] = op(Ror, Accumulator);
    t[0x6B] = op(Arr, Immediate);       t[0x6C] = op(Jmp, Indirect);
    t[0x6D] = op(Adc, Absolute);        t[0x6E] = op(Ror, Absolute);
    t[0x6F] = op(Rra, Absolute);

    t[0x70] = op(Bvs, Relative);        t[0x71] = op(Adc, IndirectIndexed);
    t[0x73] = op(Rra, IndirectIndexed); t[0x74] = op(Nop, ZeroPageX);
    t[0x75] = op(Adc, ZeroPageX);       t[0x76] = op(Ror, ZeroPageX);
    t[0x77] = op(Rra, ZeroPageX);       t[0x78] = op(Sei, Implied);
    t[0x79] = op(Adc, AbsoluteY);       t[0x7A] = op(Nop, Implied);
    t[0x7B] = op(Rra, AbsoluteY);
    t[0x7D] = op(Adc, AbsoluteX);       t[0x7E] = op(Ror, AbsoluteX);
    t[0x7F] = op(Rra, AbsoluteX);

    t[0x80] = op(Nop, Immediate);       t[0x81] = op(Sta, IndexedIndirect);
    t[0x82] = op(Nop, Immediate);       t[0x83] = op(Sax, IndexedIndirect);
    t[0x84] = op(Sty, ZeroPage);        t[0x85] = op(Sta, ZeroPage);
    t[0x86] = op(Stx, ZeroPage);        t[0x87] = op(Sax, ZeroPage);
    t[0x88] = op(Dey, Implied);         t[0x89] = op(Nop, Immediate);
    t[0x8A] = op(Txa, Implied);         t[0x8B] = op(Ane, Immediate);
    t[0x8C] = op(Sty, Absolute);        t[0x8D] = op(Sta, Absolute);
    t[0x8E] = op(Stx, Absolute);        t[0x8F] = op(Sax, Absolute);

    t[0x90] = op(Bcc, Relative);        t[0x91] = op(Sta, IndirectIndexed);
    t[0x93] = op(Sha, IndirectIndexed); t[0x94] = op(Sty, ZeroPageX);
    t[0x95] = op(Sta, ZeroPageX);       t[0x96] = op(Stx, ZeroPageY);
    t[0x97] = op(Sax, ZeroPageY);       t[0x98] = op(Tya, Implied);
    t[0x99] = op(Sta, AbsoluteY);       t[0x9A] = op(Txs, Implied);
    t[0x9B] = op(Shs, AbsoluteY);       t[0x9C] = op(Shy, AbsoluteX);
    t[0x9D] = op(Sta, AbsoluteX);       t[0x9E] = op(Shx, AbsoluteY);
    t[0x9F] = op(Sha, AbsoluteY);

    t[0xA0] = op(Ldy, Immediate);       t[0xA1] = op(Lda, IndexedIndirect);
    t[0xA2] = op(Ldx, Immediate);       t[0xA3] = op(Lax, IndexedIndirect);
    t[0xA4] = op(Ldy, ZeroPage);        t[0xA5] = op(Lda, ZeroPage);
    t[0xA6] = op(Ldx, ZeroPage);        t[0xA7] = op(Lax, ZeroPage);
    t[0xA8] = op(Tay, Implied);         t[0xA9] = op(Lda, Immediate);
    t[0xAA] = op(Tax, Implied);         t[0xAB] = op(Lax, Immediate);
    t[0xAC] = op(Ldy, Absolute);        t[0xAD] = op(Lda, Absolute);
    t[0xAE] = op(Ldx, Absolute);        t[0xAF] = op(Lax, Absolute);

    t[0xB0] = op(Bcs, Relative);        t[0xB1] = op(Lda, IndirectIndexed);
    t[0xB3] = op(Lax, IndirectIndexed); t[0xB4] = op(Ldy, ZeroPageX);
    t[0xB5] = op(Lda, ZeroPageX);       t[0xB6] = op(Ldx, ZeroPageY);
    t[0xB7] = op(Lax, ZeroPageY);       t[0xB8] = op(Clv, Implied);
    t[0xB9] = op(Lda, AbsoluteY);       t[0xBA] = op(Tsx, Implied);
    t[0xBB] = op(Las, AbsoluteY);       t[0xBC] = op(Ldy, AbsoluteX);
    t[0xBD] = op(Lda, AbsoluteX);       t[0xBE] = op(Ldx, AbsoluteY);
    t[0xBF] = op(Lax, AbsoluteY);

    t[0xC0] = op(Cpy, Immediate);       t[0xC1] = op(Cmp, IndexedIndirect);
    t[0xC2] = op(Nop, Immediate);       t[0xC3] = op(Dcp, IndexedIndirect);
    t[0xC4] = op(Cpy, ZeroPage);        t[0xC5] = op(Cmp, ZeroPage);
    t[0xC6] = op(Dec, ZeroPage);        t[0xC7] = op(Dcp, ZeroPage);
    t[0xC8] = op(Iny, Implied);         t[0xC9] = op(Cmp, Immediate);
    t[0xCA] = op(Dex, Implied);         t[0xCB] = op(Sbx, Immediate);
    t[0xCC] = op(Cpy, Absolute);        t[0xCD] = op(Cmp, Absolute);
    t[0xCE] = op(Dec, Absolute);        t[0xCF] = op(Dcp, Absolute);

    t[0xD0] = op(Bne, Relative);        t[0xD1] = op(Cmp, IndirectIndexed);
    t[0xD3] = op(Dcp, IndirectIndexed); t[0xD4] = op(Nop, ZeroPageX);
    t[0xD5] = op(Cmp, ZeroPageX);       t[0xD6] = op(Dec, ZeroPageX);
    t[0xD7] = op(Dcp, ZeroPageX);       t[0xD8] = op(Cld, Implied);
    t[0xD9] = op(Cmp, AbsoluteY);       t[0xDA] = op(Nop, Implied);
    t[0xDB] = op(Dcp, AbsoluteY);       t[0xDC] = op(Nop, AbsoluteX);
    t[0xDD] = op(Cmp, AbsoluteX);       t[0xDE] = op(Dec, AbsoluteX);
    t[0xDF] = op(Dcp, AbsoluteX);

    t[0xE0] = op(Cpx, Immediate);       t[0xE1] = op(Sbc, IndexedIndirect);
    t[0xE2] = op(Nop, Immediate);       t[0xE3] = op(Isb, IndexedIndirect);
    t[0xE4] = op(Cpx, ZeroPage);        t[0xE5] = op(Sbc, ZeroPage);
    t[0xE6] = op(Inc, ZeroPage);        t[0xE7] = op(Isb, ZeroPage);
    t[0xE8] = op(Inx, Implied);         t[0xE9] = op(Sbc, Immediate);
    t[0xEA] = op(Nop, Implied);         t[0xEB] = op(Sbc, Immediate);
    t[0xEC] = op(Cpx, Absolute);        t[0xED] = op(Sbc, Absolute);
    t[0xEE] = op(Inc, Absolute);        t[0xEF] = op(Isb, Absolute);

    t[0xF0] = op(Beq, Relative);        t[0xF1] = op(Sbc, IndirectIndexed);
    t[0xF3] = op(Isb, IndirectIndexed); t[0xF4] = op(Nop, ZeroPageX);
    t[0xF5] = op(Sbc, ZeroPageX);       t[0xF6] = op(Inc, ZeroPageX);
    t[0xF7] = op(Isb, ZeroPageX);       t[0xF8] = op(Sed, Implied);
    t[0xF9] = op(Sbc, AbsoluteY);       t[0xFA] = op(Nop, Implied);
    t[0xFB] = op(Isb, AbsoluteY);       t[0xFC] = op(Nop, AbsoluteX);
    t[0xFD] = op(Sbc, AbsoluteX);       t[0xFE] = op(Inc, AbsoluteX);
    t[0xFF] = op(Isb, AbsoluteX);

    t
};

/// Opcodes that decode for disassembly but have no cycle timing. They
/// dispatch as invalid.
pub const UNTIMED_OPCODES: [u8; 1] = [0xF4];

/// The 65C02 (as fitted to the Master series) drops the NMOS undocumented
/// opcodes and adds a handful of new instructions in the freed slots.
///
/// The table is partial. The `(zp)` mode (0x12, 0x32, ... 0xF2) and
/// `JMP (abs,X)` (0x7C) have no entry, so they halt as invalid. Undefined
/// slots keep the NMOS NOP entry where there is one; the other undefined
/// slots, which are NOPs on the real part, halt as invalid too.
#[rustfmt::skip]
pub const CMOS_OPCODES: [Option<Opcode>; 256] = {
    use AddressingMode::*;
    use Mnemonic::*;

    let mut t = NMOS_OPCODES;
    let mut i = 0;
    while i < 256 {
        if let Some(entry) = t[i] {
            if entry.mnemonic.is_undocumented() {
                t[i] = None;
            }
        }
        i += 1;
    }

    t[0x04] = op(Tsb, ZeroPage);   t[0x0C] = op(Tsb, Absolute);
    t[0x14] = op(Trb, ZeroPage);   t[0x1C] = op(Trb, Absolute);
    t[0x1A] = op(Inc, Accumulator);
    t[0x3A] = op(Dec, Accumulator);
    t[0x34] = op(Bit, ZeroPageX);  t[0x3C] = op(Bit, AbsoluteX);
    t[0x5A] = op(Phy, Implied);    t[0x7A] = op(Ply, Implied);
    t[0xDA] = op(Phx, Implied);    t[0xFA] = op(Plx, Implied);
    t[0x64] = op(Stz, ZeroPage);   t[0x74] = op(Stz, ZeroPageX);
    t[0x9C] = op(Stz, Absolute);   t[0x9E] = op(Stz, AbsoluteX);
    t[0x80] = op(Bra, Relative);
    t[0x89] = op(Bit, Immediate);

    t
};

pub fn opcode_table(cpu_type: CpuType) -> &'static [Option<Opcode>; 256] {
    match cpu_type {
        CpuType::NMOS6502 => &NMOS_OPCODES,
        CpuType::CMOS65C02 => &CMOS_OPCODES,
    }
}

pub fn decode(cpu_type: CpuType, opcode: u8) -> Option<Opcode> {
    opcode_table(cpu_type)[opcode as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nmos_documented_entries() {
        assert_eq!(
            decode(CpuType::NMOS6502, 0xA9),
            Some(Opcode::new(Mnemonic::Lda, AddressingMode::Immediate))
        );
        assert_eq!(
            decode(CpuType::NMOS6502, 0x6C),
            Some(Opcode::new(Mnemonic::Jmp, AddressingMode::Indirect))
        );
        assert_eq!(
            decode(CpuType::NMOS6502, 0x96),
            Some(Opcode::new(Mnemonic::Stx, AddressingMode::ZeroPageY))
        );
    }

    #[test]
    fn test_nmos_unmapped_entries() {
        for opcode in [0x02, 0x12, 0x22, 0x32, 0x42, 0x52, 0x62, 0x72, 0x92, 0xB2, 0xD2, 0xF2] {
            assert_eq!(decode(CpuType::NMOS6502, opcode), None, "opcode {:#04X}", opcode);
        }
    }

    #[test]
    fn test_unlisted_nmos_slots() {
        assert_eq!(decode(CpuType::NMOS6502, 0x7C), None);
        assert_eq!(
            decode(CpuType::NMOS6502, 0xF4),
            Some(Opcode::new(Mnemonic::Nop, AddressingMode::ZeroPageX))
        );
        assert_eq!(decode(CpuType::CMOS65C02, 0x7C), None);
    }

    #[test]
    fn test_cmos_drops_undocumented() {
        assert_eq!(decode(CpuType::CMOS65C02, 0x07), None);
        assert_eq!(decode(CpuType::CMOS65C02, 0x87), None);
        assert!(CMOS_OPCODES
            .iter()
            .flatten()
            .all(|entry| !entry.mnemonic.is_undocumented()));
    }

    #[test]
    fn test_cmos_additions() {
        assert_eq!(
            decode(CpuType::CMOS65C02, 0xDA),
            Some(Opcode::new(Mnemonic::Phx, AddressingMode::Implied))
        );
        assert_eq!(
            decode(CpuType::CMOS65C02, 0x9E),
            Some(Opcode::new(Mnemonic::Stz, AddressingMode::AbsoluteX))
        );
        assert_eq!(
            decode(CpuType::CMOS65C02, 0x1A),
            Some(Opcode::new(Mnemonic::Inc, AddressingMode::Accumulator))
        );
        // Documented entries carry over unchanged
        assert_eq!(decode(CpuType::CMOS65C02, 0xAD), decode(CpuType::NMOS6502, 0xAD));
    }

    #[test]
    fn test_opcode_display() {
        let lda = Opcode::new(Mnemonic::Lda, AddressingMode::AbsoluteX);
        assert_eq!(lda.to_string(), "LDA abs,x");
        let clc = Opcode::new(Mnemonic::Clc, AddressingMode::Implied);
        assert_eq!(clc.to_string(), "CLC");
    }

    #[test]
    fn test_operand_bytes() {
        assert_eq!(AddressingMode::Implied.operand_bytes(), 0);
        assert_eq!(AddressingMode::IndirectIndexed.operand_bytes(), 1);
        assert_eq!(AddressingMode::Indirect.operand_bytes(), 2);
    }
}

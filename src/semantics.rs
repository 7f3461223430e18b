//! What each mnemonic does, independent of how its operand is addressed.
//!
//! An instruction is described as a short list of primitive [`Effect`]s run
//! against the operand latch, plus whether it reads and/or writes its memory
//! operand. The cycle builder decides *when* the bus accesses happen; this
//! module only decides *what* happens to registers, flags and the operand.

use crate::bus::Bus;
use crate::cpu::{Flags, CPU};
use crate::opcodes::{AddressingMode, Mnemonic, Opcode};
use crate::timeline::Latches;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    A,
    X,
    Y,
    S,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    SetFlag(Flags, bool),
    /// Register = operand, updating Z and N.
    Load(Register),
    /// Operand = register.
    Store(Register),
    StoreAandX,
    StoreZero,
    IncrementOperand,
    DecrementOperand,
    Increment(Register),
    Decrement(Register),
    AddWithCarry,
    SubtractWithCarry,
    BitTest,
    BitTestImmediate,
    /// Shift or rotate the operand. `logical` shifts a zero in instead of the carry.
    Rotate { left: bool, logical: bool },
    Or,
    And,
    Xor,
    Compare(Register),
    Transfer { from: Register, to: Register },
    Branch { flag: Flags, when: bool },
    BranchAlways,
    Push(Register),
    PushFlags,
    Pull(Register),
    PullFlags,
    ReturnFromSubroutine,
    ReturnFromInterrupt,
    JumpToSubroutine,
    Jump,
    Break,
    AndAccumulatorIntoOperand,
    OperandToAccumulator,
    /// Write the operand to the un-indexed effective address.
    WriteBackToBase,
    OrIntoAccumulator,
    TestAndSet,
    TestAndReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Semantics {
    /// Effects that run at cycle 0, before the interrupt probe.
    pub preop: &'static [Effect],
    pub op: &'static [Effect],
    pub reads: bool,
    pub writes: bool,
    /// Extra internal cycles beyond the addressing mode's minimum.
    pub extra: u32,
}

impl Semantics {
    const fn new(op: &'static [Effect]) -> Self {
        Self {
            preop: &[],
            op,
            reads: false,
            writes: false,
            extra: 0,
        }
    }

    const fn reading(mut self) -> Self {
        self.reads = true;
        self
    }

    const fn writing(mut self) -> Self {
        self.writes = true;
        self
    }

    const fn modifying(self) -> Self {
        self.reading().writing()
    }

    const fn extra(mut self, cycles: u32) -> Self {
        self.extra = cycles;
        self
    }

    const fn preop(mut self, preop: &'static [Effect]) -> Self {
        self.preop = preop;
        self
    }

    pub fn is_read_modify_write(&self) -> bool {
        self.reads && self.writes
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.op, [Effect::Branch { .. }] | [Effect::BranchAlways])
    }

    pub fn is_jump(&self) -> bool {
        matches!(self.op, [Effect::Jump])
    }
}

/// Returns `None` for mnemonics with no modelled behaviour; those opcodes
/// dispatch as invalid.
pub fn semantics(mnemonic: Mnemonic) -> Option<Semantics> {
    use Effect::*;
    use Register::*;

    let semantics = match mnemonic {
        Mnemonic::Nop => Semantics::new(&[]),
        Mnemonic::Brk => Semantics::new(&[Break]).extra(6),

        Mnemonic::Clc => Semantics::new(&[SetFlag(Flags::CARRY, false)]),
        Mnemonic::Sec => Semantics::new(&[SetFlag(Flags::CARRY, true)]),
        Mnemonic::Cli => Semantics::new(&[SetFlag(Flags::IRQ_DISABLE, false)]),
        Mnemonic::Sei => Semantics::new(&[SetFlag(Flags::IRQ_DISABLE, true)]),
        Mnemonic::Clv => Semantics::new(&[SetFlag(Flags::OVERFLOW, false)]),
        Mnemonic::Cld => Semantics::new(&[SetFlag(Flags::DECIMAL, false)]),
        Mnemonic::Sed => Semantics::new(&[SetFlag(Flags::DECIMAL, true)]),

        Mnemonic::Lda => Semantics::new(&[Load(A)]).reading(),
        Mnemonic::Ldx => Semantics::new(&[Load(X)]).reading(),
        Mnemonic::Ldy => Semantics::new(&[Load(Y)]).reading(),
        Mnemonic::Sta => Semantics::new(&[Store(A)]).writing(),
        Mnemonic::Stx => Semantics::new(&[Store(X)]).writing(),
        Mnemonic::Sty => Semantics::new(&[Store(Y)]).writing(),
        Mnemonic::Stz => Semantics::new(&[StoreZero]).writing(),

        Mnemonic::Inc => Semantics::new(&[IncrementOperand]).modifying(),
        Mnemonic::Dec => Semantics::new(&[DecrementOperand]).modifying(),
        Mnemonic::Inx => Semantics::new(&[Increment(X)]),
        Mnemonic::Iny => Semantics::new(&[Increment(Y)]),
        Mnemonic::Dex => Semantics::new(&[Decrement(X)]),
        Mnemonic::Dey => Semantics::new(&[Decrement(Y)]),

        Mnemonic::Adc => Semantics::new(&[AddWithCarry]).reading(),
        Mnemonic::Sbc => Semantics::new(&[SubtractWithCarry]).reading(),
        Mnemonic::Bit => Semantics::new(&[BitTest]).reading(),

        Mnemonic::Asl => Semantics::new(&[Rotate { left: true, logical: true }]).modifying(),
        Mnemonic::Lsr => Semantics::new(&[Rotate { left: false, logical: true }]).modifying(),
        Mnemonic::Rol => Semantics::new(&[Rotate { left: true, logical: false }]).modifying(),
        Mnemonic::Ror => Semantics::new(&[Rotate { left: false, logical: false }]).modifying(),

        Mnemonic::Ora => Semantics::new(&[Or]).reading(),
        Mnemonic::And => Semantics::new(&[Effect::And]).reading(),
        Mnemonic::Eor => Semantics::new(&[Xor]).reading(),
        Mnemonic::Cmp => Semantics::new(&[Compare(A)]).reading(),
        Mnemonic::Cpx => Semantics::new(&[Compare(X)]).reading(),
        Mnemonic::Cpy => Semantics::new(&[Compare(Y)]).reading(),

        Mnemonic::Tax => Semantics::new(&[Transfer { from: A, to: X }]),
        Mnemonic::Tay => Semantics::new(&[Transfer { from: A, to: Y }]),
        Mnemonic::Txa => Semantics::new(&[Transfer { from: X, to: A }]),
        Mnemonic::Tya => Semantics::new(&[Transfer { from: Y, to: A }]),
        Mnemonic::Tsx => Semantics::new(&[Transfer { from: S, to: X }]),
        Mnemonic::Txs => Semantics::new(&[Transfer { from: X, to: S }]),

        Mnemonic::Bpl => Semantics::new(&[Branch { flag: Flags::NEGATIVE, when: false }]),
        Mnemonic::Bmi => Semantics::new(&[Branch { flag: Flags::NEGATIVE, when: true }]),
        Mnemonic::Bvc => Semantics::new(&[Branch { flag: Flags::OVERFLOW, when: false }]),
        Mnemonic::Bvs => Semantics::new(&[Branch { flag: Flags::OVERFLOW, when: true }]),
        Mnemonic::Bcc => Semantics::new(&[Branch { flag: Flags::CARRY, when: false }]),
        Mnemonic::Bcs => Semantics::new(&[Branch { flag: Flags::CARRY, when: true }]),
        Mnemonic::Bne => Semantics::new(&[Branch { flag: Flags::ZERO, when: false }]),
        Mnemonic::Beq => Semantics::new(&[Branch { flag: Flags::ZERO, when: true }]),
        Mnemonic::Bra => Semantics::new(&[BranchAlways]),

        Mnemonic::Pha => Semantics::new(&[Push(A)]).extra(2),
        Mnemonic::Phx => Semantics::new(&[Push(X)]).extra(2),
        Mnemonic::Phy => Semantics::new(&[Push(Y)]).extra(2),
        Mnemonic::Php => Semantics::new(&[PushFlags]).extra(2),
        Mnemonic::Pla => Semantics::new(&[Pull(A)]).extra(3),
        Mnemonic::Plx => Semantics::new(&[Pull(X)]).extra(3),
        Mnemonic::Ply => Semantics::new(&[Pull(Y)]).extra(3),
        Mnemonic::Plp => Semantics::new(&[PullFlags]).extra(3),

        Mnemonic::Rts => Semantics::new(&[ReturnFromSubroutine]).extra(5),
        Mnemonic::Rti => Semantics::new(&[]).preop(&[ReturnFromInterrupt]).extra(5),
        Mnemonic::Jsr => Semantics::new(&[JumpToSubroutine]).extra(3),
        Mnemonic::Jmp => Semantics::new(&[Jump]),

        Mnemonic::Tsb => Semantics::new(&[TestAndSet]).modifying(),
        Mnemonic::Trb => Semantics::new(&[TestAndReset]).modifying(),

        // Approximations of the undocumented opcodes that software is known to use.
        Mnemonic::Sax => Semantics::new(&[StoreAandX]).writing(),
        Mnemonic::Asr => Semantics::new(&[
            AndAccumulatorIntoOperand,
            Rotate { left: false, logical: false },
            OperandToAccumulator,
        ]),
        Mnemonic::Slo => Semantics::new(&[
            Rotate { left: true, logical: false },
            WriteBackToBase,
            OrIntoAccumulator,
        ])
        .modifying(),

        Mnemonic::Anc
        | Mnemonic::Ane
        | Mnemonic::Arr
        | Mnemonic::Dcp
        | Mnemonic::Isb
        | Mnemonic::Las
        | Mnemonic::Lax
        | Mnemonic::Rla
        | Mnemonic::Rra
        | Mnemonic::Sbx
        | Mnemonic::Sha
        | Mnemonic::Shs
        | Mnemonic::Shx
        | Mnemonic::Shy
        | Mnemonic::Sre => return None,
    };

    Some(semantics)
}

/// Semantics for a decoded opcode. `BIT #` is the one mnemonic whose
/// behaviour depends on the addressing mode: it only touches Z.
pub fn semantics_for(opcode: Opcode) -> Option<Semantics> {
    match (opcode.mnemonic, opcode.mode) {
        (Mnemonic::Bit, AddressingMode::Immediate) => {
            Some(Semantics::new(&[Effect::BitTestImmediate]).reading())
        }
        (mnemonic, _) => semantics(mnemonic),
    }
}

/// Shift or rotate `value` one bit, returning the result and the carry out.
pub fn rotate(value: u8, carry: bool, left: bool, logical: bool) -> (u8, bool) {
    let carry_in = carry && !logical;
    if left {
        ((value << 1) | carry_in as u8, value & 0x80 != 0)
    } else {
        ((value >> 1) | ((carry_in as u8) << 7), value & 0x01 != 0)
    }
}

impl Effect {
    pub fn apply<B: Bus>(self, cpu: &mut CPU<B>, latches: &mut Latches) {
        match self {
            Effect::SetFlag(flag, on) => cpu.p.set(flag, on),
            Effect::Load(reg) => {
                cpu.set_register(reg, latches.operand);
                cpu.update_zero_and_negative_flags(latches.operand);
            }
            Effect::Store(reg) => latches.operand = cpu.register(reg),
            Effect::StoreAandX => latches.operand = cpu.regs.a & cpu.regs.x,
            Effect::StoreZero => latches.operand = 0,
            Effect::IncrementOperand => {
                latches.operand = latches.operand.wrapping_add(1);
                cpu.update_zero_and_negative_flags(latches.operand);
            }
            Effect::DecrementOperand => {
                latches.operand = latches.operand.wrapping_sub(1);
                cpu.update_zero_and_negative_flags(latches.operand);
            }
            Effect::Increment(reg) => {
                let value = cpu.register(reg).wrapping_add(1);
                cpu.set_register(reg, value);
                cpu.update_zero_and_negative_flags(value);
            }
            Effect::Decrement(reg) => {
                let value = cpu.register(reg).wrapping_sub(1);
                cpu.set_register(reg, value);
                cpu.update_zero_and_negative_flags(value);
            }
            Effect::AddWithCarry => cpu.adc(latches.operand),
            Effect::SubtractWithCarry => cpu.sbc(latches.operand),
            Effect::BitTest => {
                let value = latches.operand;
                cpu.p.set(Flags::ZERO, cpu.regs.a & value == 0);
                cpu.p.set(Flags::NEGATIVE, value & 0x80 != 0);
                cpu.p.set(Flags::OVERFLOW, value & 0x40 != 0);
            }
            Effect::BitTestImmediate => {
                cpu.p.set(Flags::ZERO, cpu.regs.a & latches.operand == 0);
            }
            Effect::Rotate { left, logical } => {
                let (result, carry) =
                    rotate(latches.operand, cpu.p.contains(Flags::CARRY), left, logical);
                cpu.p.set(Flags::CARRY, carry);
                latches.operand = result;
                cpu.update_zero_and_negative_flags(result);
            }
            Effect::Or => {
                cpu.regs.a |= latches.operand;
                cpu.update_zero_and_negative_flags(cpu.regs.a);
            }
            Effect::And => {
                cpu.regs.a &= latches.operand;
                cpu.update_zero_and_negative_flags(cpu.regs.a);
            }
            Effect::Xor => {
                cpu.regs.a ^= latches.operand;
                cpu.update_zero_and_negative_flags(cpu.regs.a);
            }
            Effect::Compare(reg) => cpu.compare(cpu.register(reg), latches.operand),
            Effect::Transfer { from, to } => {
                let value = cpu.register(from);
                cpu.set_register(to, value);
                if to != Register::S {
                    cpu.update_zero_and_negative_flags(value);
                }
            }
            Effect::Branch { flag, when } => {
                let taken = cpu.p.contains(flag) == when;
                cpu.branch(taken);
            }
            Effect::BranchAlways => cpu.branch(true),
            Effect::Push(reg) => cpu.push_stack(cpu.register(reg)),
            Effect::PushFlags => cpu.push_stack(cpu.flags_to_byte()),
            Effect::Pull(reg) => {
                let value = cpu.pop_stack();
                cpu.set_register(reg, value);
                cpu.update_zero_and_negative_flags(value);
            }
            Effect::PullFlags => {
                let value = cpu.pop_stack();
                cpu.flags_from_byte(value);
            }
            Effect::ReturnFromSubroutine => {
                let lo = cpu.pop_stack() as u16;
                let hi = cpu.pop_stack() as u16;
                cpu.pc = ((hi << 8) | lo).wrapping_add(1);
            }
            Effect::ReturnFromInterrupt => {
                let flags = cpu.pop_stack();
                cpu.flags_from_byte(flags);
                let lo = cpu.pop_stack() as u16;
                let hi = cpu.pop_stack() as u16;
                cpu.pc = (hi << 8) | lo;
            }
            Effect::JumpToSubroutine => {
                let return_addr = cpu.pc.wrapping_sub(1);
                cpu.push_stack((return_addr >> 8) as u8);
                cpu.push_stack(return_addr as u8);
                cpu.pc = latches.addr;
            }
            Effect::Jump => cpu.pc = latches.addr,
            Effect::Break => cpu.brk(),
            Effect::AndAccumulatorIntoOperand => latches.operand &= cpu.regs.a,
            Effect::OperandToAccumulator => cpu.regs.a = latches.operand,
            Effect::WriteBackToBase => cpu.write_byte(latches.addr, latches.operand),
            Effect::OrIntoAccumulator => {
                cpu.regs.a |= latches.operand;
                cpu.update_zero_and_negative_flags(cpu.regs.a);
            }
            Effect::TestAndSet => {
                cpu.p.set(Flags::ZERO, cpu.regs.a & latches.operand == 0);
                latches.operand |= cpu.regs.a;
            }
            Effect::TestAndReset => {
                cpu.p.set(Flags::ZERO, cpu.regs.a & latches.operand == 0);
                latches.operand &= !cpu.regs.a;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_left_through_carry() {
        assert_eq!(rotate(0x81, false, true, false), (0x02, true));
        assert_eq!(rotate(0x40, true, true, false), (0x81, false));
    }

    #[test]
    fn test_rotate_right_through_carry() {
        assert_eq!(rotate(0x01, true, false, false), (0x80, true));
        assert_eq!(rotate(0x02, false, false, false), (0x01, false));
    }

    #[test]
    fn test_logical_shifts_ignore_carry() {
        assert_eq!(rotate(0x81, true, true, true), (0x02, true));
        assert_eq!(rotate(0x81, true, false, true), (0x40, true));
    }

    #[test]
    fn test_access_flags() {
        let lda = semantics(Mnemonic::Lda).unwrap();
        assert!(lda.reads && !lda.writes);

        let sta = semantics(Mnemonic::Sta).unwrap();
        assert!(!sta.reads && sta.writes);

        let inc = semantics(Mnemonic::Inc).unwrap();
        assert!(inc.is_read_modify_write());

        // ASR takes its operand from an immediate fetch, never from memory
        let asr = semantics(Mnemonic::Asr).unwrap();
        assert!(!asr.reads && !asr.writes);
    }

    #[test]
    fn test_extra_cycles() {
        assert_eq!(semantics(Mnemonic::Brk).unwrap().extra, 6);
        assert_eq!(semantics(Mnemonic::Pha).unwrap().extra, 2);
        assert_eq!(semantics(Mnemonic::Plp).unwrap().extra, 3);
        assert_eq!(semantics(Mnemonic::Rts).unwrap().extra, 5);
        assert_eq!(semantics(Mnemonic::Jsr).unwrap().extra, 3);
    }

    #[test]
    fn test_rti_restores_before_probe() {
        let rti = semantics(Mnemonic::Rti).unwrap();
        assert_eq!(rti.preop, &[Effect::ReturnFromInterrupt]);
        assert!(rti.op.is_empty());
    }

    #[test]
    fn test_unmodelled_undocumented() {
        for mnemonic in [Mnemonic::Lax, Mnemonic::Dcp, Mnemonic::Anc, Mnemonic::Sre] {
            assert!(semantics(mnemonic).is_none(), "{}", mnemonic);
        }
    }

    #[test]
    fn test_bit_immediate_only_touches_zero() {
        let bit_imm = semantics_for(Opcode::new(Mnemonic::Bit, AddressingMode::Immediate)).unwrap();
        assert_eq!(bit_imm.op, &[Effect::BitTestImmediate]);

        let bit_abs = semantics_for(Opcode::new(Mnemonic::Bit, AddressingMode::Absolute)).unwrap();
        assert_eq!(bit_abs.op, &[Effect::BitTest]);
    }

    #[test]
    fn test_branch_and_jump_classification() {
        assert!(semantics(Mnemonic::Beq).unwrap().is_branch());
        assert!(semantics(Mnemonic::Bra).unwrap().is_branch());
        assert!(!semantics(Mnemonic::Jmp).unwrap().is_branch());
        assert!(semantics(Mnemonic::Jmp).unwrap().is_jump());
    }
}

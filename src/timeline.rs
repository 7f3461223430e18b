//! Cycle-by-cycle construction of an instruction's bus activity.
//!
//! A [`Timeline`] maps cycle indices to [`CycleOp`] slots. Slots that touch
//! the bus at a point where the rest of the machine can observe it are
//! *exact*; the compressor must line the clock up with them before they run.
//! Everything else is *inexact* and can be batched into a single wait.

use crate::cpu::CpuType;
use crate::error::BuildError;
use crate::opcodes::{AddressingMode, Opcode};
use crate::semantics::{Effect, Semantics};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    X,
    Y,
}

/// An address computed while the instruction runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrExpr {
    Effective,
    /// Effective address plus index, with carry into the high byte.
    Carried,
    /// Effective address plus index, without carry into the high byte.
    NonCarried,
    /// Zero-page pointer location.
    Pointer,
    /// Second pointer byte, wrapping inside the zero page.
    PointerNext,
    /// Effective address + 1 within the same page (NMOS `JMP ()`).
    EffectiveNextInPage,
    EffectiveNext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latch {
    Operand,
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroOp {
    /// Fetch a zero-page address from the instruction stream, optionally indexed.
    FetchZeroPage(Option<Index>),
    FetchAbsolute,
    /// Derive the carried and non-carried addresses from the effective address.
    IndexAbsolute(Index),
    /// Fetch a zero-page pointer location, optionally pre-indexed.
    FetchPointer(Option<Index>),
    /// Effective address = low | high << 8.
    JoinPointer,
    FetchImmediate,
    LoadAccumulator,
    StoreAccumulator,
    Read { at: AddrExpr, into: Option<Latch> },
    Write { at: AddrExpr },
    ZeroPageRead { at: AddrExpr, into: Latch },
    ZeroPageWrite { at: AddrExpr },
    /// Extra cycle and read at the non-carried address, only when the index carried.
    PageCrossProbe,
    CheckInterrupt,
    Effect(Effect),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Read,
    Write,
    Internal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleOp {
    pub ops: Vec<MicroOp>,
    pub exact: bool,
    pub addr: Option<AddrExpr>,
}

impl CycleOp {
    pub fn kind(&self) -> CycleKind {
        let writes = self
            .ops
            .iter()
            .any(|op| matches!(op, MicroOp::Write { .. } | MicroOp::ZeroPageWrite { .. }));
        let reads = self
            .ops
            .iter()
            .any(|op| matches!(op, MicroOp::Read { .. } | MicroOp::ZeroPageRead { .. }));

        if writes {
            CycleKind::Write
        } else if reads {
            CycleKind::Read
        } else {
            CycleKind::Internal
        }
    }
}

/// Values computed by one execution of a compiled instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Latches {
    pub operand: u8,
    pub addr: u16,
    pub carried: u16,
    pub non_carried: u16,
    pub pointer: u8,
    pub lo: u8,
    pub hi: u8,
}

impl Latches {
    pub fn resolve(&self, at: AddrExpr) -> u16 {
        match at {
            AddrExpr::Effective => self.addr,
            AddrExpr::Carried => self.carried,
            AddrExpr::NonCarried => self.non_carried,
            AddrExpr::Pointer => self.pointer as u16,
            AddrExpr::PointerNext => self.pointer.wrapping_add(1) as u16,
            AddrExpr::EffectiveNextInPage => {
                (self.addr & 0xFF00) | (self.addr.wrapping_add(1) & 0x00FF)
            }
            AddrExpr::EffectiveNext => self.addr.wrapping_add(1),
        }
    }

    pub fn store(&mut self, latch: Latch, value: u8) {
        match latch {
            Latch::Operand => self.operand = value,
            Latch::Low => self.lo = value,
            Latch::High => self.hi = value,
        }
    }

    pub fn index(&mut self, index: u8) {
        self.carried = self.addr.wrapping_add(index as u16);
        self.non_carried = (self.addr & 0xFF00) | (self.carried & 0x00FF);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    slots: BTreeMap<u32, CycleOp>,
    cycle: u32,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn slot(&self, cycle: u32) -> Option<&CycleOp> {
        self.slots.get(&cycle)
    }

    pub fn slots(&self) -> impl Iterator<Item = (u32, &CycleOp)> {
        self.slots.iter().map(|(&cycle, slot)| (cycle, slot))
    }

    fn combine(
        &mut self,
        cycle: u32,
        ops: &[MicroOp],
        exact: bool,
        addr: Option<AddrExpr>,
        prepend: bool,
    ) {
        let slot = self.slots.entry(cycle).or_default();
        if prepend {
            slot.ops.splice(0..0, ops.iter().copied());
        } else {
            slot.ops.extend_from_slice(ops);
        }
        slot.exact |= exact;
        if slot.addr.is_none() {
            slot.addr = addr;
        }
    }

    pub fn append_at(&mut self, cycle: u32, ops: &[MicroOp], exact: bool, addr: Option<AddrExpr>) {
        self.combine(cycle, ops, exact, addr, false);
    }

    pub fn prepend_at(&mut self, cycle: u32, ops: &[MicroOp], exact: bool, addr: Option<AddrExpr>) {
        self.combine(cycle, ops, exact, addr, true);
    }

    /// Append inexact ops at the current cycle.
    pub fn append(&mut self, ops: &[MicroOp]) {
        self.append_at(self.cycle, ops, false, None);
    }

    /// Mark the current cycle exact without adding work.
    pub fn flush(&mut self) {
        self.append_at(self.cycle, &[], true, None);
    }

    pub fn tick(&mut self, cycles: u32) {
        self.cycle += cycles;
    }

    pub fn read_op(&mut self, at: AddrExpr, into: Option<Latch>) {
        self.cycle += 1;
        self.append_at(self.cycle, &[MicroOp::Read { at, into }], true, Some(at));
    }

    pub fn write_op(&mut self, at: AddrExpr) {
        self.cycle += 1;
        self.append_at(self.cycle, &[MicroOp::Write { at }], true, Some(at));
    }

    /// Zero-page and stack reads are never slow and nothing observes them.
    pub fn zp_read_op(&mut self, at: AddrExpr, into: Latch) {
        self.cycle += 1;
        self.append_at(self.cycle, &[MicroOp::ZeroPageRead { at, into }], false, None);
    }

    pub fn zp_write_op(&mut self, at: AddrExpr) {
        self.cycle += 1;
        self.append_at(self.cycle, &[MicroOp::ZeroPageWrite { at }], true, None);
    }

    /// Pad to the two-cycle minimum and place the interrupt probe one cycle
    /// before the last.
    pub fn finish(mut self) -> Self {
        if self.cycle < 2 {
            self.cycle = 2;
        }
        let probe = self.cycle - 1;
        self.prepend_at(probe, &[MicroOp::CheckInterrupt], true, None);
        self
    }
}

/// Outcome of building one opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Timed(Timeline),
    /// Branches own their timing; their effects run as-is.
    Delegated(Vec<MicroOp>),
}

fn effects(list: &[Effect]) -> Vec<MicroOp> {
    list.iter().copied().map(MicroOp::Effect).collect()
}

/// Lay out the cycles of `info` executing `semantics`.
pub fn build(
    opcode: u8,
    info: Opcode,
    semantics: &Semantics,
    cpu_type: CpuType,
) -> Result<Schedule, BuildError> {
    let mnemonic = info.mnemonic;
    let op = effects(semantics.op);
    let mut t = Timeline::new();

    match info.mode {
        AddressingMode::Implied => {
            if semantics.reads || semantics.writes {
                return Err(BuildError::MemoryOperandInImplied { opcode, mnemonic });
            }
            t.append(&effects(semantics.preop));
            t.tick(2.max(1 + semantics.extra));
            t.flush();
            t.append(&op);
        }

        AddressingMode::Relative => {
            if !semantics.is_branch() {
                return Err(BuildError::UnsupportedMode {
                    opcode,
                    mnemonic,
                    mode: info.mode,
                });
            }
            return Ok(Schedule::Delegated(op));
        }

        AddressingMode::ZeroPage | AddressingMode::ZeroPageX | AddressingMode::ZeroPageY => {
            match info.mode {
                AddressingMode::ZeroPageX => {
                    t.tick(3);
                    t.append(&[MicroOp::FetchZeroPage(Some(Index::X))]);
                }
                AddressingMode::ZeroPageY => {
                    t.tick(3);
                    t.append(&[MicroOp::FetchZeroPage(Some(Index::Y))]);
                }
                _ => {
                    t.tick(2);
                    t.append(&[MicroOp::FetchZeroPage(None)]);
                }
            }
            if semantics.reads {
                t.zp_read_op(AddrExpr::Effective, Latch::Operand);
                if semantics.writes {
                    // Spurious write cycle; nothing reaches the bus
                    t.flush();
                    t.tick(1);
                }
            }
            t.append(&op);
            if semantics.writes {
                t.zp_write_op(AddrExpr::Effective);
            }
        }

        AddressingMode::Absolute => {
            t.tick(3 + semantics.extra);
            t.append(&[MicroOp::FetchAbsolute]);
            if semantics.reads {
                t.read_op(AddrExpr::Effective, Some(Latch::Operand));
                if semantics.writes {
                    t.write_op(AddrExpr::Effective);
                }
            }
            t.append(&op);
            if semantics.writes {
                t.write_op(AddrExpr::Effective);
            }
        }

        AddressingMode::AbsoluteX | AddressingMode::AbsoluteY => {
            let index = if info.mode == AddressingMode::AbsoluteX {
                Index::X
            } else {
                Index::Y
            };
            t.tick(3);
            t.append(&[MicroOp::FetchAbsolute, MicroOp::IndexAbsolute(index)]);
            indexed_access(&mut t, semantics);
            t.append(&op);
            if semantics.writes {
                t.write_op(AddrExpr::Carried);
            }
        }

        AddressingMode::Immediate => {
            if semantics.writes {
                return Err(BuildError::WriteInImmediate { opcode, mnemonic });
            }
            t.tick(2);
            t.append(&[MicroOp::FetchImmediate]);
            t.append(&op);
        }

        AddressingMode::Accumulator => {
            t.tick(2);
            t.append(&[MicroOp::LoadAccumulator]);
            t.append(&op);
            t.append(&[MicroOp::StoreAccumulator]);
        }

        AddressingMode::IndexedIndirect => {
            // Two cycles plus the dummy read of the unindexed pointer
            t.tick(3);
            t.append(&[MicroOp::FetchPointer(Some(Index::X))]);
            t.zp_read_op(AddrExpr::Pointer, Latch::Low);
            t.zp_read_op(AddrExpr::PointerNext, Latch::High);
            t.append(&[MicroOp::JoinPointer]);
            if semantics.reads {
                t.read_op(AddrExpr::Effective, Some(Latch::Operand));
            }
            t.append(&op);
            if semantics.writes {
                t.write_op(AddrExpr::Effective);
            }
        }

        AddressingMode::IndirectIndexed => {
            t.tick(2);
            t.append(&[MicroOp::FetchPointer(None)]);
            t.zp_read_op(AddrExpr::Pointer, Latch::Low);
            t.zp_read_op(AddrExpr::PointerNext, Latch::High);
            t.append(&[MicroOp::JoinPointer, MicroOp::IndexAbsolute(Index::Y)]);
            indexed_access(&mut t, semantics);
            t.append(&op);
            if semantics.writes {
                t.write_op(AddrExpr::Carried);
            }
        }

        AddressingMode::Indirect => {
            if !semantics.is_jump() {
                return Err(BuildError::UnsupportedMode {
                    opcode,
                    mnemonic,
                    mode: info.mode,
                });
            }
            match cpu_type {
                CpuType::NMOS6502 => {
                    t.tick(3);
                    t.append(&[MicroOp::FetchAbsolute]);
                    t.read_op(AddrExpr::Effective, Some(Latch::Low));
                    t.read_op(AddrExpr::EffectiveNextInPage, Some(Latch::High));
                }
                CpuType::CMOS65C02 => {
                    t.tick(4);
                    t.append(&[MicroOp::FetchAbsolute]);
                    t.read_op(AddrExpr::Effective, Some(Latch::Low));
                    t.read_op(AddrExpr::EffectiveNext, Some(Latch::High));
                }
            }
            t.append(&[MicroOp::JoinPointer]);
            t.append(&op);
        }
    }

    Ok(Schedule::Timed(t))
}

/// Bus accesses between computing an indexed address and running the
/// instruction, shared by `abs,X`, `abs,Y` and `(),Y`.
fn indexed_access(t: &mut Timeline, semantics: &Semantics) {
    match (semantics.reads, semantics.writes) {
        (true, false) => {
            // Only a carry costs the extra read
            t.append(&[MicroOp::PageCrossProbe]);
            t.flush();
            t.read_op(AddrExpr::Carried, Some(Latch::Operand));
        }
        (true, true) => {
            t.read_op(AddrExpr::NonCarried, None);
            t.read_op(AddrExpr::Carried, Some(Latch::Operand));
            t.write_op(AddrExpr::Carried);
        }
        (false, true) => {
            // Stores always read the non-carried address first
            t.read_op(AddrExpr::NonCarried, None);
        }
        (false, false) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::{decode, Mnemonic};
    use crate::semantics::semantics_for;

    fn timeline_for(cpu_type: CpuType, opcode: u8) -> Timeline {
        let info = decode(cpu_type, opcode).unwrap();
        let semantics = semantics_for(info).unwrap();
        match build(opcode, info, &semantics, cpu_type).unwrap() {
            Schedule::Timed(t) => t.finish(),
            Schedule::Delegated(_) => panic!("expected a timed schedule"),
        }
    }

    fn kinds(t: &Timeline) -> Vec<(u32, CycleKind)> {
        t.slots()
            .filter(|(_, slot)| slot.kind() != CycleKind::Internal)
            .map(|(cycle, slot)| (cycle, slot.kind()))
            .collect()
    }

    #[test]
    fn test_append_and_prepend_order() {
        let mut t = Timeline::new();
        t.append_at(1, &[MicroOp::FetchAbsolute], false, None);
        t.append_at(1, &[MicroOp::JoinPointer], false, None);
        t.prepend_at(1, &[MicroOp::CheckInterrupt], true, None);

        let slot = t.slot(1).unwrap();
        assert_eq!(
            slot.ops,
            vec![
                MicroOp::CheckInterrupt,
                MicroOp::FetchAbsolute,
                MicroOp::JoinPointer
            ]
        );
        assert!(slot.exact);
    }

    #[test]
    fn test_first_address_wins() {
        let mut t = Timeline::new();
        t.append_at(2, &[], true, Some(AddrExpr::NonCarried));
        t.append_at(2, &[], true, Some(AddrExpr::Carried));
        assert_eq!(t.slot(2).unwrap().addr, Some(AddrExpr::NonCarried));
    }

    #[test]
    fn test_short_instructions_pad_to_two_cycles() {
        let t = Timeline::new().finish();
        assert_eq!(t.cycle(), 2);
        assert_eq!(t.slot(1).unwrap().ops, vec![MicroOp::CheckInterrupt]);
    }

    #[test]
    fn test_probe_sits_one_cycle_before_last() {
        // LDA abs: operand read on cycle 4
        let t = timeline_for(CpuType::NMOS6502, 0xAD);
        assert_eq!(t.cycle(), 4);
        assert_eq!(t.slot(3).unwrap().ops[0], MicroOp::CheckInterrupt);
    }

    #[test]
    fn test_zero_page_rmw_has_idle_cycle() {
        // INC zp: read on 3, idle 4, write on 5
        let t = timeline_for(CpuType::NMOS6502, 0xE6);
        assert_eq!(t.cycle(), 5);
        assert_eq!(
            kinds(&t),
            vec![(3, CycleKind::Read), (5, CycleKind::Write)]
        );
        assert!(t.slot(4).unwrap().ops.contains(&MicroOp::CheckInterrupt));
    }

    #[test]
    fn test_absolute_rmw_writes_twice() {
        let t = timeline_for(CpuType::NMOS6502, 0x0E);
        assert_eq!(t.cycle(), 6);
        assert_eq!(
            kinds(&t),
            vec![
                (4, CycleKind::Read),
                (5, CycleKind::Write),
                (6, CycleKind::Write)
            ]
        );
    }

    #[test]
    fn test_indexed_rmw_order() {
        // ASL abs,X: read non-carried, read carried, write carried twice
        let t = timeline_for(CpuType::NMOS6502, 0x1E);
        assert_eq!(t.cycle(), 7);
        assert_eq!(
            t.slot(4).unwrap().ops,
            vec![MicroOp::Read {
                at: AddrExpr::NonCarried,
                into: None
            }]
        );
        assert_eq!(t.slot(5).unwrap().addr, Some(AddrExpr::Carried));
        assert_eq!(kinds(&t)[2..], [(6, CycleKind::Write), (7, CycleKind::Write)]);
    }

    #[test]
    fn test_indexed_store_reads_non_carried() {
        let t = timeline_for(CpuType::NMOS6502, 0x9D);
        assert_eq!(t.cycle(), 5);
        assert_eq!(t.slot(4).unwrap().addr, Some(AddrExpr::NonCarried));
        assert_eq!(t.slot(5).unwrap().kind(), CycleKind::Write);
    }

    #[test]
    fn test_indexed_load_probes_page_cross() {
        let t = timeline_for(CpuType::NMOS6502, 0xBD);
        assert_eq!(t.cycle(), 4);
        let slot = t.slot(3).unwrap();
        assert!(slot.exact);
        assert!(slot.ops.contains(&MicroOp::PageCrossProbe));
    }

    #[test]
    fn test_indirect_jump_per_cpu() {
        let nmos = timeline_for(CpuType::NMOS6502, 0x6C);
        assert_eq!(nmos.cycle(), 5);
        assert_eq!(nmos.slot(5).unwrap().addr, Some(AddrExpr::EffectiveNextInPage));

        let cmos = timeline_for(CpuType::CMOS65C02, 0x6C);
        assert_eq!(cmos.cycle(), 6);
        assert_eq!(cmos.slot(6).unwrap().addr, Some(AddrExpr::EffectiveNext));
    }

    #[test]
    fn test_branches_are_delegated() {
        let info = decode(CpuType::NMOS6502, 0xF0).unwrap();
        let semantics = semantics_for(info).unwrap();
        let schedule = build(0xF0, info, &semantics, CpuType::NMOS6502).unwrap();
        assert!(matches!(schedule, Schedule::Delegated(ops) if ops.len() == 1));
    }

    #[test]
    fn test_immediate_write_is_refused() {
        let info = Opcode::new(Mnemonic::Sta, AddressingMode::Immediate);
        let semantics = semantics_for(info).unwrap();
        assert_eq!(
            build(0x89, info, &semantics, CpuType::NMOS6502),
            Err(BuildError::WriteInImmediate {
                opcode: 0x89,
                mnemonic: Mnemonic::Sta
            })
        );
    }

    #[test]
    fn test_implied_memory_access_is_refused() {
        let info = Opcode::new(Mnemonic::Lda, AddressingMode::Implied);
        let semantics = semantics_for(info).unwrap();
        assert!(matches!(
            build(0x00, info, &semantics, CpuType::NMOS6502),
            Err(BuildError::MemoryOperandInImplied { .. })
        ));
    }

    #[test]
    fn test_mode_mismatches_are_refused() {
        let lda_ind = Opcode::new(Mnemonic::Lda, AddressingMode::Indirect);
        let semantics = semantics_for(lda_ind).unwrap();
        assert!(matches!(
            build(0x00, lda_ind, &semantics, CpuType::NMOS6502),
            Err(BuildError::UnsupportedMode { .. })
        ));

        let lda_rel = Opcode::new(Mnemonic::Lda, AddressingMode::Relative);
        assert!(matches!(
            build(0x00, lda_rel, &semantics, CpuType::NMOS6502),
            Err(BuildError::UnsupportedMode { .. })
        ));
    }

    #[test]
    fn test_latch_address_wrapping() {
        let mut latches = Latches {
            addr: 0x20FF,
            pointer: 0xFF,
            ..Latches::default()
        };
        latches.index(0x02);
        assert_eq!(latches.carried, 0x2101);
        assert_eq!(latches.non_carried, 0x2001);
        assert_eq!(latches.resolve(AddrExpr::PointerNext), 0x0000);
        assert_eq!(latches.resolve(AddrExpr::EffectiveNextInPage), 0x2000);
        assert_eq!(latches.resolve(AddrExpr::EffectiveNext), 0x2100);
    }
}

//! Compiled instructions and the dispatchers that hold them.

use crate::bus::Bus;
use crate::compressor::{compress, stretch, Step};
use crate::cpu::{CpuType, CPU};
use crate::error::{BuildError, InvalidOpcode};
use crate::opcodes::{decode, UNTIMED_OPCODES};
use crate::semantics::semantics_for;
use crate::timeline::{build, Index, Latches, MicroOp, Schedule};
use log::debug;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DispatchStrategy {
    /// One 256-entry table.
    #[default]
    Table,
    /// Two independently compiled halves, 0x00-0x7F and 0x80-0xFF.
    Split,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    opcode: u8,
    steps: Box<[Step]>,
}

impl CompiledInstruction {
    /// Returns `Ok(None)` when the mnemonic has no modelled behaviour.
    pub fn compile(cpu_type: CpuType, opcode: u8) -> Result<Option<Self>, BuildError> {
        if UNTIMED_OPCODES.contains(&opcode) {
            return Ok(None);
        }
        let Some(info) = decode(cpu_type, opcode) else {
            return Ok(None);
        };
        let Some(semantics) = semantics_for(info) else {
            return Ok(None);
        };

        let steps = match build(opcode, info, &semantics, cpu_type)? {
            Schedule::Timed(timeline) => compress(&timeline.finish()),
            Schedule::Delegated(ops) => ops.into_iter().map(Step::Op).collect(),
        };

        Ok(Some(Self {
            opcode,
            steps: steps.into_boxed_slice(),
        }))
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run the instruction. The opcode byte has already been fetched.
    pub fn execute<B: Bus>(&self, cpu: &mut CPU<B>) {
        let mut latches = Latches::default();

        for step in self.steps.iter() {
            match *step {
                Step::Wait(cycles) => cpu.poll_time(cycles),
                Step::StretchedWait { cycles, at } => {
                    let slow = cpu.bus.is_slow_access(latches.resolve(at));
                    let extra = stretch(cycles, slow, cpu.bus.cycles());
                    cpu.poll_time(cycles + extra);
                }
                Step::Op(op) => perform(op, cpu, &mut latches),
            }
        }
    }
}

fn index_value<B: Bus>(cpu: &CPU<B>, index: Index) -> u8 {
    match index {
        Index::X => cpu.regs.x,
        Index::Y => cpu.regs.y,
    }
}

fn perform<B: Bus>(op: MicroOp, cpu: &mut CPU<B>, latches: &mut Latches) {
    match op {
        MicroOp::FetchZeroPage(index) => {
            let base = cpu.fetch_byte();
            let offset = index.map_or(0, |index| index_value(cpu, index));
            latches.addr = base.wrapping_add(offset) as u16;
        }
        MicroOp::FetchAbsolute => latches.addr = cpu.fetch_word(),
        MicroOp::IndexAbsolute(index) => {
            let offset = index_value(cpu, index);
            latches.index(offset);
        }
        MicroOp::FetchPointer(index) => {
            let base = cpu.fetch_byte();
            let offset = index.map_or(0, |index| index_value(cpu, index));
            latches.pointer = base.wrapping_add(offset);
        }
        MicroOp::JoinPointer => latches.addr = (latches.hi as u16) << 8 | latches.lo as u16,
        MicroOp::FetchImmediate => latches.operand = cpu.fetch_byte(),
        MicroOp::LoadAccumulator => latches.operand = cpu.regs.a,
        MicroOp::StoreAccumulator => cpu.regs.a = latches.operand,
        MicroOp::Read { at, into } => {
            let value = cpu.read_byte(latches.resolve(at));
            if let Some(latch) = into {
                latches.store(latch, value);
            }
        }
        MicroOp::Write { at } => cpu.write_byte(latches.resolve(at), latches.operand),
        MicroOp::ZeroPageRead { at, into } => {
            let value = cpu.read_zp_stack(latches.resolve(at));
            latches.store(into, value);
        }
        MicroOp::ZeroPageWrite { at } => cpu.write_zp_stack(latches.resolve(at), latches.operand),
        MicroOp::PageCrossProbe => {
            if latches.carried != latches.non_carried {
                cpu.poll_time(1);
                latches.operand = cpu.read_byte(latches.non_carried);
            }
        }
        MicroOp::CheckInterrupt => cpu.check_interrupt(),
        MicroOp::Effect(effect) => effect.apply(cpu, latches),
    }
}

fn compile_range(
    cpu_type: CpuType,
    range: RangeInclusive<u8>,
) -> Result<Vec<Option<CompiledInstruction>>, BuildError> {
    range
        .map(|opcode| CompiledInstruction::compile(cpu_type, opcode))
        .collect()
}

fn compiled_count(entries: &[Option<CompiledInstruction>]) -> usize {
    entries.iter().flatten().count()
}

pub struct DispatchTable {
    entries: Vec<Option<CompiledInstruction>>,
}

impl DispatchTable {
    pub fn build(cpu_type: CpuType) -> Result<Self, BuildError> {
        Ok(Self {
            entries: compile_range(cpu_type, 0x00..=0xFF)?,
        })
    }

    pub fn get(&self, opcode: u8) -> Option<&CompiledInstruction> {
        self.entries[opcode as usize].as_ref()
    }
}

/// Compiled instructions for a contiguous opcode range.
pub struct RangeDispatcher {
    range: RangeInclusive<u8>,
    entries: Vec<Option<CompiledInstruction>>,
}

impl RangeDispatcher {
    pub fn build(cpu_type: CpuType, range: RangeInclusive<u8>) -> Result<Self, BuildError> {
        let entries = compile_range(cpu_type, range.clone())?;
        Ok(Self { range, entries })
    }

    pub fn contains(&self, opcode: u8) -> bool {
        self.range.contains(&opcode)
    }

    pub fn get(&self, opcode: u8) -> Option<&CompiledInstruction> {
        if !self.contains(opcode) {
            return None;
        }
        self.entries[(opcode - self.range.start()) as usize].as_ref()
    }
}

pub struct SplitDispatcher {
    lower: RangeDispatcher,
    upper: RangeDispatcher,
}

impl SplitDispatcher {
    pub fn build(cpu_type: CpuType) -> Result<Self, BuildError> {
        Ok(Self {
            lower: RangeDispatcher::build(cpu_type, 0x00..=0x7F)?,
            upper: RangeDispatcher::build(cpu_type, 0x80..=0xFF)?,
        })
    }

    pub fn get(&self, opcode: u8) -> Option<&CompiledInstruction> {
        if opcode < 0x80 {
            self.lower.get(opcode)
        } else {
            self.upper.get(opcode)
        }
    }
}

/// Immutable once built; share it between CPUs through an `Arc`.
pub enum Dispatcher {
    Table {
        cpu_type: CpuType,
        table: DispatchTable,
    },
    Split {
        cpu_type: CpuType,
        split: SplitDispatcher,
    },
}

impl Dispatcher {
    pub fn build(cpu_type: CpuType, strategy: DispatchStrategy) -> Result<Self, BuildError> {
        let dispatcher = match strategy {
            DispatchStrategy::Table => {
                let table = DispatchTable::build(cpu_type)?;
                debug!(
                    "dispatch table built for {:?}: {} of 256 opcodes compiled",
                    cpu_type,
                    compiled_count(&table.entries)
                );
                Dispatcher::Table { cpu_type, table }
            }
            DispatchStrategy::Split => {
                let split = SplitDispatcher::build(cpu_type)?;
                debug!(
                    "split dispatcher built for {:?}: {} + {} opcodes compiled",
                    cpu_type,
                    compiled_count(&split.lower.entries),
                    compiled_count(&split.upper.entries)
                );
                Dispatcher::Split { cpu_type, split }
            }
        };
        Ok(dispatcher)
    }

    pub fn cpu_type(&self) -> CpuType {
        match self {
            Dispatcher::Table { cpu_type, .. } | Dispatcher::Split { cpu_type, .. } => *cpu_type,
        }
    }

    pub fn strategy(&self) -> DispatchStrategy {
        match self {
            Dispatcher::Table { .. } => DispatchStrategy::Table,
            Dispatcher::Split { .. } => DispatchStrategy::Split,
        }
    }

    pub fn lookup(&self, opcode: u8) -> Option<&CompiledInstruction> {
        match self {
            Dispatcher::Table { table, .. } => table.get(opcode),
            Dispatcher::Split { split, .. } => split.get(opcode),
        }
    }

    pub fn compiled_count(&self) -> usize {
        (0..=0xFF).filter(|&opcode| self.lookup(opcode).is_some()).count()
    }

    /// Run the instruction for `opcode`, fetched from `pc - 1`. Nothing is
    /// touched when the opcode has no compiled instruction.
    pub fn execute<B: Bus>(&self, cpu: &mut CPU<B>, opcode: u8) -> Result<(), InvalidOpcode> {
        match self.lookup(opcode) {
            Some(instruction) => {
                instruction.execute(cpu);
                Ok(())
            }
            None => Err(InvalidOpcode {
                opcode,
                pc: cpu.pc.wrapping_sub(1),
                mnemonic: decode(self.cpu_type(), opcode).map(|info| info.mnemonic),
            }),
        }
    }
}

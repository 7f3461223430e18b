//! Cycle-timed 6502 and 65C02 core for BBC Micro emulation.
//!
//! Every opcode is compiled once at startup into a flat list of steps: bus
//! accesses, register effects and clock advances placed on the exact cycle
//! the real part performs them. Accesses to the 1MHz region are stretched
//! at run time according to clock parity.

pub mod bus;
pub mod compressor;
pub mod cpu;
pub mod disassembler;
pub mod dispatch;
pub mod error;
pub mod interrupts;
pub mod memory;
pub mod monitor;
pub mod opcodes;
pub mod rom;
pub mod semantics;
pub mod timeline;
pub mod util;

pub use bus::{BeebBus, Bus};
pub use cpu::{CpuType, Flags, CPU};
pub use dispatch::{DispatchStrategy, Dispatcher};
pub use error::{BuildError, InvalidOpcode};

use crate::opcodes::{AddressingMode, Mnemonic};
use thiserror::Error;

/// Refusals raised while compiling the dispatch tables. Any of these means
/// an opcode table entry and the semantic table disagree, so startup stops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("opcode {opcode:#04X}: {mnemonic} writes memory and cannot use immediate addressing")]
    WriteInImmediate { opcode: u8, mnemonic: Mnemonic },

    #[error("opcode {opcode:#04X}: {mnemonic} accesses memory and cannot use implied addressing")]
    MemoryOperandInImplied { opcode: u8, mnemonic: Mnemonic },

    #[error("opcode {opcode:#04X}: {mnemonic} does not support {mode:?} addressing")]
    UnsupportedMode {
        opcode: u8,
        mnemonic: Mnemonic,
        mode: AddressingMode,
    },
}

/// Raised at run time when the fetched opcode has no compiled instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "invalid opcode {opcode:#04X} ({}) at {pc:#06X}",
    .mnemonic.map_or("unmapped", |m| m.name())
)]
pub struct InvalidOpcode {
    pub opcode: u8,
    /// Address the opcode byte was fetched from.
    pub pc: u16,
    pub mnemonic: Option<Mnemonic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_opcode_message() {
        let err = InvalidOpcode {
            opcode: 0x02,
            pc: 0x1900,
            mnemonic: None,
        };
        assert_eq!(err.to_string(), "invalid opcode 0x02 (unmapped) at 0x1900");

        let err = InvalidOpcode {
            opcode: 0xAB,
            pc: 0x2000,
            mnemonic: Some(Mnemonic::Lax),
        };
        assert_eq!(err.to_string(), "invalid opcode 0xAB (LAX) at 0x2000");
    }

    #[test]
    fn test_build_error_message() {
        let err = BuildError::WriteInImmediate {
            opcode: 0x89,
            mnemonic: Mnemonic::Sta,
        };
        assert!(err.to_string().contains("STA writes memory"));
    }
}

use crate::util::hexdump;
use log::{debug, warn};

pub struct Memory {
    data: Vec<u8>,
    id: String,
}

impl Memory {
    pub fn new(size: usize, id: String) -> Self {
        debug!("memory {:>8} online, {} KB", id, size / 1024);
        Self {
            data: vec![0x00; size],
            id,
        }
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        self.data.get(addr as usize).copied().unwrap_or(0x00)
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) {
        if let Some(byte) = self.data.get_mut(addr as usize) {
            *byte = value;
        }
    }

    pub fn dump_range(&self, range: std::ops::RangeInclusive<u16>) -> String {
        let start = *range.start() as usize;
        let end = (*range.end() as usize).min(self.data.len().saturating_sub(1));

        if start > end {
            return String::new();
        }

        hexdump(&self.data[start..=end], Some(start as u16), None)
    }

    /// Copy `bytes` in at `offset`, truncating at the end of the bank.
    /// Returns the number of bytes copied.
    pub fn load_bytes(&mut self, offset: u16, bytes: &[u8]) -> usize {
        let start = offset as usize;
        if start >= self.data.len() {
            warn!(
                "memory[{}] load at {:#06X} is past the end of the bank",
                self.id, offset
            );
            return 0;
        }
        let count = bytes.len().min(self.data.len() - start);
        if count < bytes.len() {
            warn!(
                "memory[{}] load at {:#06X} truncated: {} of {} bytes fit",
                self.id,
                offset,
                count,
                bytes.len()
            );
        }
        self.data[start..start + count].copy_from_slice(&bytes[..count]);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_truncates_at_end_of_bank() {
        let mut memory = Memory::new(0x100, "TEST".into());
        assert_eq!(memory.load_bytes(0xFE, &[1, 2, 3, 4]), 2);
        assert_eq!(memory.read_byte(0xFE), 1);
        assert_eq!(memory.read_byte(0xFF), 2);
    }

    #[test]
    fn test_load_past_end_of_bank_copies_nothing() {
        let mut memory = Memory::new(0x100, "TEST".into());
        assert_eq!(memory.load_bytes(0x1000, &[1, 2, 3]), 0);
        assert_eq!(memory.load_bytes(0x100, &[1]), 0);
        assert_eq!(memory.read_byte(0xFF), 0x00);
    }

    #[test]
    fn test_out_of_range_access() {
        let mut memory = Memory::new(0x100, "TEST".into());
        memory.write_byte(0x1234, 0xAA);
        assert_eq!(memory.read_byte(0x1234), 0x00);
    }

    #[test]
    fn test_dump_range() {
        let mut memory = Memory::new(0x100, "TEST".into());
        memory.load_bytes(0x10, b"HELLO");
        let dump = memory.dump_range(0x10..=0x14);
        assert!(dump.starts_with("0010: 48 45 4C 4C 4F"));
    }
}

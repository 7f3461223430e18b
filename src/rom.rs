use std::fs;
use std::io;
use std::path::Path;

use log::{debug, info};

use crate::util::hexdump;

const ADDRESS_SPACE: usize = 0x10000;

/// A program or ROM image and the address its first byte loads at.
pub struct ROM {
    pub data: Vec<u8>,
    pub base: u16,
    pub crc32: u32,
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

impl ROM {
    pub fn load_from_file(path: &Path, base: u16) -> io::Result<Self> {
        let data = fs::read(path)?;
        Self::load_from_bytes(&data, base)
    }

    pub fn load_from_bytes(bytes: &[u8], base: u16) -> io::Result<Self> {
        if bytes.is_empty() {
            return Err(invalid("image is empty"));
        }

        if base as usize + bytes.len() > ADDRESS_SPACE {
            return Err(invalid(format!(
                "image too large: {} bytes at {:#06X} runs past {:#06X}",
                bytes.len(),
                base,
                ADDRESS_SPACE - 1
            )));
        }

        Ok(Self::from_parts(bytes.to_vec(), base))
    }

    pub fn load_from_intel(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse_intel_hex(&text)
    }

    /// Data records are placed at their absolute addresses; the image spans
    /// from the lowest to the highest byte written, with gaps filled by &FF.
    pub fn parse_intel_hex(text: &str) -> io::Result<Self> {
        let mut memory = vec![0xFF; ADDRESS_SPACE];
        let mut lowest = usize::MAX;
        let mut highest = 0;
        let mut address_offset: usize = 0;

        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let record = parse_record(line)
                .map_err(|err| invalid(format!("line {}: {}", number + 1, err)))?;

            match record.record_type {
                0x00 => {
                    let addr = address_offset + record.address as usize;
                    if addr + record.data.len() > ADDRESS_SPACE {
                        return Err(invalid(format!(
                            "line {}: data runs past the 64K address space",
                            number + 1
                        )));
                    }
                    if !record.data.is_empty() {
                        memory[addr..addr + record.data.len()].copy_from_slice(&record.data);
                        lowest = lowest.min(addr);
                        highest = highest.max(addr + record.data.len() - 1);
                    }
                }
                0x01 => break,
                0x02 => {
                    if record.data.len() != 2 {
                        return Err(invalid(format!("line {}: bad segment record", number + 1)));
                    }
                    let segment = (record.data[0] as usize) << 8 | record.data[1] as usize;
                    address_offset = segment * 16;
                }
                _ => continue,
            }
        }

        if lowest == usize::MAX {
            return Err(invalid("Intel HEX file has no data records"));
        }

        Ok(Self::from_parts(memory[lowest..=highest].to_vec(), lowest as u16))
    }

    fn from_parts(data: Vec<u8>, base: u16) -> Self {
        let crc32 = crc32fast::hash(&data);

        info!(
            "Image loaded | {} bytes at {:#06X} | crc32 {:08X}",
            data.len(),
            base,
            crc32
        );
        debug!("\n{}", hexdump(&data, Some(base), Some(data.len().min(0x100))));

        Self { data, base, crc32 }
    }
}

struct Record {
    address: u16,
    record_type: u8,
    data: Vec<u8>,
}

fn hex_byte(line: &str, at: usize) -> Result<u8, String> {
    line.get(at..at + 2)
        .and_then(|digits| u8::from_str_radix(digits, 16).ok())
        .ok_or_else(|| format!("bad hex digits at column {}", at + 1))
}

fn parse_record(line: &str) -> Result<Record, String> {
    if !line.starts_with(':') || line.len() < 11 {
        return Err("invalid Intel HEX record".into());
    }

    let byte_count = hex_byte(line, 1)? as usize;
    if line.len() != 11 + byte_count * 2 {
        return Err(format!("record length does not match byte count {}", byte_count));
    }

    let mut checksum: u8 = 0;
    for i in (1..line.len() - 2).step_by(2) {
        checksum = checksum.wrapping_add(hex_byte(line, i)?);
    }
    let expected = hex_byte(line, line.len() - 2)?;
    if checksum.wrapping_neg() != expected {
        return Err(format!(
            "checksum mismatch: expected {:02X}, computed {:02X}",
            expected,
            checksum.wrapping_neg()
        ));
    }

    let address = (hex_byte(line, 3)? as u16) << 8 | hex_byte(line, 5)? as u16;
    let record_type = hex_byte(line, 7)?;
    let data = (0..byte_count)
        .map(|i| hex_byte(line, 9 + i * 2))
        .collect::<Result<Vec<u8>, String>>()?;

    Ok(Record {
        address,
        record_type,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_binary() {
        let rom = ROM::load_from_bytes(&[0xA9, 0x01, 0x60], 0x1900).unwrap();
        assert_eq!(rom.base, 0x1900);
        assert_eq!(rom.data, vec![0xA9, 0x01, 0x60]);
        assert_eq!(rom.crc32, crc32fast::hash(&[0xA9, 0x01, 0x60]));
    }

    #[test]
    fn test_binary_bounds() {
        assert!(ROM::load_from_bytes(&[], 0x1900).is_err());
        assert!(ROM::load_from_bytes(&[0; 0x200], 0xFF00).is_err());
        assert!(ROM::load_from_bytes(&[0; 0x100], 0xFF00).is_ok());
    }

    #[test]
    fn test_parse_intel_hex() {
        let text = ":03190000A90160DA\n:0219100060EA8B\n:00000001FF\n";
        let rom = ROM::parse_intel_hex(text).unwrap();
        assert_eq!(rom.base, 0x1900);
        assert_eq!(rom.data.len(), 0x12);
        assert_eq!(&rom.data[..3], &[0xA9, 0x01, 0x60]);
        assert_eq!(rom.data[3], 0xFF);
        assert_eq!(&rom.data[0x10..], &[0x60, 0xEA]);
    }

    #[test]
    fn test_intel_hex_bad_checksum() {
        let err = ROM::parse_intel_hex(":03190000A90160DB\n").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_intel_hex_rejects_garbage() {
        assert!(ROM::parse_intel_hex("hello\n").is_err());
        assert!(ROM::parse_intel_hex(":00000001FF\n").is_err());
    }
}

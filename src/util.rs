use std::fmt::Write;

/// Classic 16-bytes-per-row hex and ASCII dump. `start` is the address of
/// `data[0]`.
pub fn hexdump(data: &[u8], start: Option<u16>, length: Option<usize>) -> String {
    let start = start.unwrap_or(0x0000) as usize;
    let length = length.unwrap_or(data.len()).min(data.len());

    let mut out = String::new();
    if length == 0 {
        return out;
    }

    let end = start + length - 1;
    let chunk_size = 16;

    for chunk_start in (start..=end).step_by(chunk_size) {
        let _ = write!(out, "{:04X}: ", chunk_start);

        for i in chunk_start..chunk_start + chunk_size {
            if i <= end {
                let _ = write!(out, "{:02X} ", data[i - start]);
            } else {
                out.push_str("   ");
            }
        }

        out.push_str(" | ");

        for i in chunk_start..=end.min(chunk_start + chunk_size - 1) {
            let byte = data[i - start];
            let ascii = if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            };
            out.push(ascii);
        }

        out.push('\n');
    }

    out
}

/// Parse a hex number with an optional `$`, `&` or `0x` prefix.
pub fn parse_hex_u16(text: &str) -> Option<u16> {
    let digits = text
        .strip_prefix('$')
        .or_else(|| text.strip_prefix('&'))
        .or_else(|| text.strip_prefix("0x"))
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).ok()
}

/// Format `buffer` as 16-byte hex lines labelled from `base`.
pub fn hexdump(buffer: &[u8], base: u16) -> String {
    let mut str = String::new();
    for (n, chunk) in buffer.chunks(16).enumerate() {
        let addr = base.wrapping_add((n * 16) as u16);
        let mut line = format!("{:04x}: ", addr);
        let mut chars = String::new();
        for &byte in chunk {
            line.push_str(&format!("{:02x} ", byte));
            let c = byte as char;
            chars.push(if c.is_ascii_graphic() || c == ' ' {
                c
            } else {
                '.'
            });
        }

        let dump_line = format!("{:<54} {}\n", line, chars);
        str.push_str(&dump_line);
    }

    str
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexdump() {
        let bytes: Vec<u8> = (0x40..0x54).collect();
        let dump = hexdump(&bytes, 0x8000);
        println!("{}", dump);

        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("8000: 40 41 42"));
        assert!(lines[0].ends_with("@ABCDEFGHIJKLMNO"));
        assert!(lines[1].starts_with("8010: 50 51 52 53"));
        assert!(lines[1].ends_with("PQRS"));
    }
}

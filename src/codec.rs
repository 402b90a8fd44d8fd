//! Codec (C3) — UTF-8 ⇄ UTF-16 conversion, stateless and stateful.
//!
//! Ported from the behavior of `iutfcodec_p.h` (BOM detection, lone
//! surrogate replacement with U+FFFD, a "convert invalid to null" switch)
//! rather than translating its code: the original is a hand-rolled table
//! driven state machine, this uses `char`/`u16` primitives the way
//! idiomatic Rust UTF handling normally does (no ecosystem crate fits this;
//! it is small, self-contained, bit-level text logic).

const REPLACEMENT_CHAR: char = '\u{FFFD}';
const BOM: u16 = 0xFEFF;

/// Endianness used for 16-bit code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

bitflags::bitflags! {
    /// Behavior switches for the stateless conversion functions, mirroring
    /// `iutfcodec_p.h`'s `ConversionFlag` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConvertFlags: u8 {
        /// Replace invalid input with `\0` instead of U+FFFD.
        const CONVERT_INVALID_TO_NULL = 0b0000_0001;
        /// Emit a leading BOM when encoding to UTF-16.
        const WRITE_BOM = 0b0000_0010;
    }
}

/// Decode a UTF-16 byte stream (consuming and stripping a leading BOM if
/// present, otherwise defaulting to `default_endian`) into a `String`.
/// Lone surrogates become U+FFFD (or `\0` under `CONVERT_INVALID_TO_NULL`).
pub fn utf16_to_utf8(bytes: &[u8], default_endian: Endian, flags: ConvertFlags) -> String {
    let mut units = Vec::with_capacity(bytes.len() / 2);
    let mut endian = default_endian;
    let mut start = 0;

    if bytes.len() >= 2 {
        let be = u16::from_be_bytes([bytes[0], bytes[1]]);
        let le = u16::from_le_bytes([bytes[0], bytes[1]]);
        if be == BOM {
            endian = Endian::Big;
            start = 2;
        } else if le == BOM {
            endian = Endian::Little;
            start = 2;
        }
    }

    let mut chunks = bytes[start..].chunks_exact(2);
    for pair in &mut chunks {
        let unit = match endian {
            Endian::Big => u16::from_be_bytes([pair[0], pair[1]]),
            Endian::Little => u16::from_le_bytes([pair[0], pair[1]]),
        };
        units.push(unit);
    }

    let invalid_fill = if flags.contains(ConvertFlags::CONVERT_INVALID_TO_NULL) {
        '\0'
    } else {
        REPLACEMENT_CHAR
    };

    let mut out = String::with_capacity(units.len());
    let mut iter = units.into_iter().peekable();
    while let Some(unit) = iter.next() {
        match unit {
            // High surrogate: needs a following low surrogate to pair with.
            0xD800..=0xDBFF => {
                if let Some(&low) = iter.peek() {
                    if (0xDC00..=0xDFFF).contains(&low) {
                        iter.next();
                        let c = 0x10000
                            + ((unit as u32 - 0xD800) << 10)
                            + (low as u32 - 0xDC00);
                        out.push(char::from_u32(c).unwrap_or(invalid_fill));
                        continue;
                    }
                }
                out.push(invalid_fill);
            }
            // Lone low surrogate.
            0xDC00..=0xDFFF => out.push(invalid_fill),
            _ => out.push(char::from_u32(unit as u32).unwrap_or(invalid_fill)),
        }
    }
    out
}

/// Encode a `&str` into UTF-16 bytes in `endian` order, optionally prefixed
/// with a BOM.
pub fn utf8_to_utf16(text: &str, endian: Endian, flags: ConvertFlags) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 2 + 2);
    if flags.contains(ConvertFlags::WRITE_BOM) {
        push_unit(&mut out, BOM, endian);
    }
    let mut buf = [0u16; 2];
    for ch in text.chars() {
        for unit in ch.encode_utf16(&mut buf) {
            push_unit(&mut out, *unit, endian);
        }
    }
    out
}

fn push_unit(out: &mut Vec<u8>, unit: u16, endian: Endian) {
    match endian {
        Endian::Big => out.extend_from_slice(&unit.to_be_bytes()),
        Endian::Little => out.extend_from_slice(&unit.to_le_bytes()),
    }
}

/// Stateful converter for decoding UTF-16 delivered across multiple chunks
/// (e.g. successive STREAM_DATA frames), carrying an unpaired high
/// surrogate or a split byte across calls.
#[derive(Debug, Default)]
pub struct Utf16Decoder {
    endian: Option<Endian>,
    pending_byte: Option<u8>,
    pending_high_surrogate: Option<u16>,
    flags: ConvertFlags,
}

impl Utf16Decoder {
    pub fn new(default_endian: Endian, flags: ConvertFlags) -> Self {
        Utf16Decoder {
            endian: None,
            pending_byte: None,
            pending_high_surrogate: None,
            flags,
            ..Default::default()
        }
        .with_default_endian(default_endian)
    }

    fn with_default_endian(mut self, endian: Endian) -> Self {
        self.endian.get_or_insert(endian);
        self
    }

    /// Feed the next chunk of bytes, appending any complete characters to
    /// `out`. Call `finish` once the stream ends to flush/flag any
    /// leftover unpaired surrogate.
    pub fn feed(&mut self, chunk: &[u8], out: &mut String) {
        let mut bytes: Vec<u8> = Vec::with_capacity(chunk.len() + 1);
        if let Some(b) = self.pending_byte.take() {
            bytes.push(b);
        }
        bytes.extend_from_slice(chunk);

        if self.endian.is_none() && bytes.len() >= 2 {
            let be = u16::from_be_bytes([bytes[0], bytes[1]]);
            let le = u16::from_be_bytes([bytes[1], bytes[0]]);
            if be == BOM {
                self.endian = Some(Endian::Big);
                bytes.drain(0..2);
            } else if le == BOM {
                self.endian = Some(Endian::Little);
                bytes.drain(0..2);
            } else {
                self.endian = Some(Endian::Big);
            }
        }
        let endian = self.endian.unwrap_or(Endian::Big);

        if bytes.len() % 2 == 1 {
            self.pending_byte = bytes.pop();
        }

        let invalid_fill = if self.flags.contains(ConvertFlags::CONVERT_INVALID_TO_NULL) {
            '\0'
        } else {
            REPLACEMENT_CHAR
        };

        for pair in bytes.chunks_exact(2) {
            let unit = match endian {
                Endian::Big => u16::from_be_bytes([pair[0], pair[1]]),
                Endian::Little => u16::from_le_bytes([pair[0], pair[1]]),
            };
            match (self.pending_high_surrogate.take(), unit) {
                (Some(high), low) if (0xDC00..=0xDFFF).contains(&low) => {
                    let c = 0x10000 + ((high as u32 - 0xD800) << 10) + (low as u32 - 0xDC00);
                    out.push(char::from_u32(c).unwrap_or(invalid_fill));
                }
                (Some(_high), _) => {
                    out.push(invalid_fill);
                    if (0xD800..=0xDBFF).contains(&unit) {
                        self.pending_high_surrogate = Some(unit);
                    } else if (0xDC00..=0xDFFF).contains(&unit) {
                        out.push(invalid_fill);
                    } else {
                        out.push(char::from_u32(unit as u32).unwrap_or(invalid_fill));
                    }
                }
                (None, u) if (0xD800..=0xDBFF).contains(&u) => {
                    self.pending_high_surrogate = Some(u);
                }
                (None, u) if (0xDC00..=0xDFFF).contains(&u) => {
                    out.push(invalid_fill);
                }
                (None, u) => out.push(char::from_u32(u as u32).unwrap_or(invalid_fill)),
            }
        }
    }

    /// Flush any unpaired trailing surrogate/byte as a replacement
    /// character, at stream end.
    pub fn finish(mut self, out: &mut String) {
        let invalid_fill = if self.flags.contains(ConvertFlags::CONVERT_INVALID_TO_NULL) {
            '\0'
        } else {
            REPLACEMENT_CHAR
        };
        if self.pending_high_surrogate.take().is_some() {
            out.push(invalid_fill);
        }
        if self.pending_byte.take().is_some() {
            out.push(invalid_fill);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_ascii_big_endian() {
        let encoded = utf8_to_utf16("hello", Endian::Big, ConvertFlags::empty());
        let decoded = utf16_to_utf8(&encoded, Endian::Big, ConvertFlags::empty());
        assert_eq!(decoded, "hello");
    }

    #[test]
    fn roundtrips_astral_plane_surrogate_pair() {
        let text = "\u{1F600}";
        let encoded = utf8_to_utf16(text, Endian::Little, ConvertFlags::empty());
        assert_eq!(encoded.len(), 4);
        let decoded = utf16_to_utf8(&encoded, Endian::Little, ConvertFlags::empty());
        assert_eq!(decoded, text);
    }

    #[test]
    fn bom_selects_endianness_over_default() {
        let mut bytes = vec![0xFF, 0xFE]; // little-endian BOM
        bytes.extend_from_slice(&0x0041u16.to_le_bytes()); // 'A'
        let decoded = utf16_to_utf8(&bytes, Endian::Big, ConvertFlags::empty());
        assert_eq!(decoded, "A");
    }

    #[test]
    fn lone_high_surrogate_becomes_replacement_char() {
        let bytes = 0xD800u16.to_be_bytes();
        let decoded = utf16_to_utf8(&bytes, Endian::Big, ConvertFlags::empty());
        assert_eq!(decoded, "\u{FFFD}");
    }

    #[test]
    fn lone_surrogate_becomes_null_when_flagged() {
        let bytes = 0xD800u16.to_be_bytes();
        let decoded = utf16_to_utf8(&bytes, Endian::Big, ConvertFlags::CONVERT_INVALID_TO_NULL);
        assert_eq!(decoded, "\0");
    }

    #[test]
    fn stateful_decoder_handles_surrogate_pair_split_across_chunks() {
        let text = "\u{1F600}";
        let encoded = utf8_to_utf16(text, Endian::Big, ConvertFlags::empty());
        let mut decoder = Utf16Decoder::new(Endian::Big, ConvertFlags::empty());
        let mut out = String::new();
        decoder.feed(&encoded[..2], &mut out);
        decoder.feed(&encoded[2..], &mut out);
        decoder.finish(&mut out);
        assert_eq!(out, text);
    }

    #[test]
    fn stateful_decoder_handles_byte_split_mid_code_unit() {
        let encoded = utf8_to_utf16("AB", Endian::Big, ConvertFlags::empty());
        let mut decoder = Utf16Decoder::new(Endian::Big, ConvertFlags::empty());
        let mut out = String::new();
        decoder.feed(&encoded[..1], &mut out);
        decoder.feed(&encoded[1..], &mut out);
        decoder.finish(&mut out);
        assert_eq!(out, "AB");
    }
}

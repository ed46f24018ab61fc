//! Variable-width LZW compression as used by GIF image data
//!
//! Codes start at `min_code_size + 1` bits and widen as the dictionary grows.
//! When all 4096 codes are taken a Clear code is sent and the dictionary
//! starts over. Codes are packed least significant bit first into sub-blocks
//! of at most 255 bytes, terminated by an empty block.

use std::io::{self, Write};

/// Largest code width allowed by the format
pub const MAX_CODE_BITS: u32 = 12;
const MAX_CODES: u32 = 1 << MAX_CODE_BITS;

// Open addressing table sized as a prime above 4096 for ~80% occupancy
const HASH_SIZE: usize = 5003;
const HASH_SHIFT: u32 = 4;

/// Buffers bytes into length-prefixed sub-blocks
struct BlockWriter<'a, W: Write> {
    w: &'a mut W,
    len: usize,
    buf: [u8; 0xFF],
}

impl<'a, W: Write> BlockWriter<'a, W> {
    fn new(w: &'a mut W) -> Self {
        Self {
            w,
            len: 0,
            buf: [0; 0xFF],
        }
    }

    fn push(&mut self, byte: u8) -> io::Result<()> {
        self.buf[self.len] = byte;
        self.len += 1;
        if self.len == self.buf.len() {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> io::Result<()> {
        if self.len > 0 {
            self.w.write_all(&[self.len as u8])?;
            self.w.write_all(&self.buf[..self.len])?;
            self.len = 0;
        }
        Ok(())
    }

    /// Write the pending block and the zero-length terminator
    fn finish(mut self) -> io::Result<()> {
        self.flush_block()?;
        self.w.write_all(&[0])
    }
}

/// Packs variable-width codes LSB first
struct CodeWriter<'a, W: Write> {
    blocks: BlockWriter<'a, W>,
    accum: u32,
    bits: u32,
}

impl<'a, W: Write> CodeWriter<'a, W> {
    fn write(&mut self, code: u32, width: u32) -> io::Result<()> {
        self.accum |= code << self.bits;
        self.bits += width;
        while self.bits >= 8 {
            self.blocks.push(self.accum as u8)?;
            self.accum >>= 8;
            self.bits -= 8;
        }
        Ok(())
    }

    fn finish(mut self) -> io::Result<()> {
        if self.bits > 0 {
            self.blocks.push(self.accum as u8)?;
        }
        self.blocks.finish()
    }
}

enum Lookup {
    Found(u32),
    Vacant(usize),
}

/// GIF-flavored LZW encoder
pub struct LzwEncoder {
    min_code_size: u8,
    /// `(byte << 12) + prefix` per slot, -1 when empty
    keys: Vec<i32>,
    codes: Vec<u16>,
}

impl LzwEncoder {
    /// Create an encoder for indices below `2^color_depth`
    pub fn new(color_depth: u8) -> Self {
        Self {
            min_code_size: color_depth.clamp(2, 8),
            keys: vec![-1; HASH_SIZE],
            codes: vec![0; HASH_SIZE],
        }
    }

    /// The minimum code size byte that precedes the image data
    pub fn min_code_size(&self) -> u8 {
        self.min_code_size
    }

    fn reset(&mut self) {
        self.keys.fill(-1);
    }

    fn lookup(&self, key: i32, mut slot: usize) -> Lookup {
        if self.keys[slot] == key {
            return Lookup::Found(self.codes[slot] as u32);
        }
        if self.keys[slot] >= 0 {
            let disp = if slot == 0 { 1 } else { HASH_SIZE - slot };
            loop {
                slot = if slot >= disp {
                    slot - disp
                } else {
                    slot + HASH_SIZE - disp
                };
                if self.keys[slot] == key {
                    return Lookup::Found(self.codes[slot] as u32);
                }
                if self.keys[slot] < 0 {
                    break;
                }
            }
        }
        Lookup::Vacant(slot)
    }

    /// Compress `indices` and write the sub-blocks plus terminator to `w`.
    ///
    /// The minimum code size byte is not written; see [`Self::min_code_size`].
    pub fn encode<W: Write>(&mut self, indices: &[u8], w: &mut W) -> io::Result<()> {
        let init_width = self.min_code_size as u32 + 1;
        let clear_code = 1u32 << self.min_code_size;
        let end_code = clear_code + 1;
        let index_mask = clear_code - 1;

        let mut out = CodeWriter {
            blocks: BlockWriter::new(w),
            accum: 0,
            bits: 0,
        };
        let mut width = init_width;
        let mut max_code = (1u32 << width) - 1;
        let mut next_code = clear_code + 2;
        let mut clearing = false;

        // Widen (or reset after Clear) once the next code no longer fits
        macro_rules! emit {
            ($code:expr) => {{
                out.write($code, width)?;
                if clearing {
                    width = init_width;
                    max_code = (1u32 << width) - 1;
                    clearing = false;
                } else if next_code > max_code {
                    width += 1;
                    max_code = if width == MAX_CODE_BITS {
                        MAX_CODES
                    } else {
                        (1u32 << width) - 1
                    };
                }
            }};
        }

        self.reset();
        emit!(clear_code);

        let mut pixels = indices.iter().map(|&p| p as u32 & index_mask);
        let Some(mut prefix) = pixels.next() else {
            emit!(end_code);
            return out.finish();
        };

        for c in pixels {
            let key = ((c << MAX_CODE_BITS) + prefix) as i32;
            let slot = ((c << HASH_SHIFT) ^ prefix) as usize;
            match self.lookup(key, slot) {
                Lookup::Found(code) => prefix = code,
                Lookup::Vacant(slot) => {
                    emit!(prefix);
                    prefix = c;
                    if next_code < MAX_CODES {
                        self.codes[slot] = next_code as u16;
                        self.keys[slot] = key;
                        next_code += 1;
                    } else {
                        self.reset();
                        next_code = clear_code + 2;
                        clearing = true;
                        emit!(clear_code);
                    }
                }
            }
        }

        emit!(prefix);
        emit!(end_code);
        out.finish()
    }
}

/// Write the minimum code size byte followed by the compressed sub-blocks
pub fn write_image_data<W: Write>(w: &mut W, indices: &[u8], color_depth: u8) -> io::Result<()> {
    let mut encoder = LzwEncoder::new(color_depth);
    w.write_all(&[encoder.min_code_size()])?;
    encoder.encode(indices, w)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Split a sub-block stream into its payload, checking the framing
    fn unblock(stream: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut pos = 0;
        loop {
            let len = stream[pos] as usize;
            pos += 1;
            if len == 0 {
                break;
            }
            data.extend_from_slice(&stream[pos..pos + len]);
            pos += len;
        }
        assert_eq!(pos, stream.len(), "trailing bytes after terminator");
        data
    }

    fn decode(stream: &[u8], min_code_size: u8) -> Vec<u8> {
        weezl::decode::Decoder::new(weezl::BitOrder::Lsb, min_code_size)
            .decode(&unblock(stream))
            .unwrap()
    }

    #[test]
    fn test_known_vector() {
        let mut out = Vec::new();
        LzwEncoder::new(2).encode(&[0, 0, 1, 3], &mut out).unwrap();
        assert_eq!(out, vec![3, 0x04, 0x32, 0x05, 0]);
    }

    #[test]
    fn test_single_color_stream_is_small() {
        let data = vec![1u8; 100 * 50];
        let mut out = Vec::new();
        LzwEncoder::new(2).encode(&data, &mut out).unwrap();
        assert!(out.len() < 200, "got {} bytes", out.len());
        assert_eq!(decode(&out, 2), data);
    }

    #[test]
    fn test_empty_input() {
        let mut out = Vec::new();
        LzwEncoder::new(8).encode(&[], &mut out).unwrap();
        assert!(decode(&out, 8).is_empty());
    }

    #[test]
    fn test_dictionary_reset_round_trip() {
        // Enough noise to exhaust the 4096-entry dictionary several times
        let mut seed = 0x1234_5678u32;
        let data: Vec<u8> = (0..200_000)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                (seed >> 24) as u8
            })
            .collect();

        let mut out = Vec::new();
        LzwEncoder::new(8).encode(&data, &mut out).unwrap();
        assert_eq!(decode(&out, 8), data);
    }

    #[test]
    fn test_sub_blocks_are_bounded() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i * 7 % 251) as u8).collect();
        let mut out = Vec::new();
        LzwEncoder::new(8).encode(&data, &mut out).unwrap();

        let mut pos = 0;
        while out[pos] != 0 {
            assert!(out[pos] as usize <= 255);
            pos += out[pos] as usize + 1;
        }
        assert_eq!(pos + 1, out.len());
    }

    #[test]
    fn test_image_data_prefix() {
        let mut out = Vec::new();
        write_image_data(&mut out, &[0, 1, 2, 3], 1).unwrap();
        // Depth below two is raised to the format minimum
        assert_eq!(out[0], 2);
        assert_eq!(decode(&out[1..], 2), vec![0, 1, 2, 3]);
    }
}

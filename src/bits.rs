//! MSB-first bit cursor used by every codec header parser.
//!
//! Only ever asked to read a few hundred bits of a parameter-set header, so
//! there's no streaming mode: the caller hands over the whole candidate
//! buffer up front.

/// MSB-first cursor over a byte slice.
///
/// Reading past the end of the buffer does not error: it returns all-1 bits,
/// matching the permissive behavior of the bitstream reader this parses
/// against (codec headers are read speculatively before the scan loop knows
/// whether a candidate frame boundary is real).
pub struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
    bit_position: u8,
}

impl<'a> BitReader<'a> {
    /// Wraps `data` for bit-at-a-time reading starting at bit 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            bit_position: 0,
        }
    }

    /// True once the cursor has consumed every bit of the buffer.
    pub fn eof(&self) -> bool {
        self.position >= self.data.len()
    }

    fn current_byte(&self) -> u8 {
        if self.position < self.data.len() {
            self.data[self.position]
        } else {
            0xFF
        }
    }

    /// Reads a single bit.
    pub fn get_bit(&mut self) -> u32 {
        let byte = self.current_byte();
        let bit = (byte >> (7 - self.bit_position)) & 1;

        self.bit_position += 1;
        if self.bit_position == 8 {
            self.bit_position = 0;
            self.position += 1;
        }

        bit as u32
    }

    /// Reads `count` bits (`count` must be ≤ 32) as an MSB-first integer.
    pub fn get_bits(&mut self, count: u8) -> u32 {
        debug_assert!(count <= 32, "cannot read more than 32 bits at once");

        let mut result = 0u32;
        for _ in 0..count {
            result = (result << 1) | self.get_bit();
        }
        result
    }

    /// Unsigned Exp-Golomb code (`ue(v)`).
    pub fn read_golomb(&mut self) -> u32 {
        let mut leading_zero_bits = 0u32;
        while self.get_bit() == 0 {
            leading_zero_bits += 1;
            if self.eof() {
                break;
            }
        }

        if leading_zero_bits == 0 {
            return 0;
        }

        let remaining = self.get_bits(leading_zero_bits.min(32) as u8);
        (1u32 << leading_zero_bits.min(31)) - 1 + remaining
    }

    /// Signed Exp-Golomb code (`se(v)`).
    pub fn read_signed_golomb(&mut self) -> i32 {
        let code = self.read_golomb();
        if code == 0 {
            return 0;
        }

        let magnitude = ((code + 1) >> 1) as i32;
        if code & 1 == 1 {
            magnitude
        } else {
            -magnitude
        }
    }

    /// Skips `count` bits without returning them.
    pub fn skip_bits(&mut self, count: u32) {
        let new_pos = self.position * 8 + self.bit_position as usize + count as usize;
        self.position = new_pos / 8;
        self.bit_position = (new_pos % 8) as u8;
    }

    /// Rewinds the cursor to the start of the buffer.
    pub fn reset(&mut self) {
        self.position = 0;
        self.bit_position = 0;
    }

    /// Advances to the next byte boundary if not already aligned.
    pub fn byte_align(&mut self) {
        if self.bit_position > 0 {
            self.bit_position = 0;
            self.position += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_bits_msb_first() {
        let mut reader = BitReader::new(&[0b1010_0110]);
        assert_eq!(reader.get_bit(), 1);
        assert_eq!(reader.get_bit(), 0);
        assert_eq!(reader.get_bits(6), 0b10_0110);
        assert!(reader.eof());
    }

    #[test]
    fn reads_past_end_as_ones() {
        let mut reader = BitReader::new(&[0xFF]);
        reader.skip_bits(8);
        assert!(reader.eof());
        assert_eq!(reader.get_bits(8), 0xFF);
    }

    #[test]
    fn golomb_roundtrip_small_values() {
        // ue(v)=0 encodes as "1"; ue(v)=1 encodes as "010"; ue(v)=2 as "011"
        let mut reader = BitReader::new(&[0b1_010_011_0]);
        assert_eq!(reader.read_golomb(), 0);
        assert_eq!(reader.read_golomb(), 1);
        assert_eq!(reader.read_golomb(), 2);
    }

    #[test]
    fn signed_golomb_alternates_sign() {
        // se(v) mapping: ue=0->0, ue=1->1, ue=2->-1, ue=3->2, ue=4->-2
        let mut reader = BitReader::new(&[0b1_010_011_0]);
        assert_eq!(reader.read_signed_golomb(), 0);
        assert_eq!(reader.read_signed_golomb(), 1);
        assert_eq!(reader.read_signed_golomb(), -1);
    }

    #[test]
    fn byte_align_skips_to_boundary() {
        let mut reader = BitReader::new(&[0xFF, 0x00]);
        reader.get_bit();
        reader.byte_align();
        assert_eq!(reader.get_bits(8), 0x00);
    }
}

//! QuickXorHash, the content fingerprint OneDrive reports for every file.
//!
//! Bytes are XORed into a 160-bit register, each successive byte shifted 11
//! bits further than the previous one (wrapping). The total length is XORed
//! into the last 8 bytes when finishing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

const WIDTH_IN_BITS: usize = 160;
const SHIFT: usize = 11;
const BITS_IN_LAST_CELL: usize = 32;
const CELLS: usize = (WIDTH_IN_BITS - 1) / 64 + 1;
const DIGEST_LEN: usize = (WIDTH_IN_BITS - 1) / 8 + 1;

#[derive(Debug, Clone, Default)]
pub struct QuickXorHash {
    data: [u64; CELLS],
    length_so_far: u64,
    shift_so_far: usize,
}

impl QuickXorHash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        let mut index = self.shift_so_far / 64;
        let mut offset = self.shift_so_far % 64;
        let iterations = bytes.len().min(WIDTH_IN_BITS);

        for i in 0..iterations {
            let is_last_cell = index == CELLS - 1;
            let bits_in_cell = if is_last_cell { BITS_IN_LAST_CELL } else { 64 };

            if offset <= bits_in_cell - 8 {
                for &byte in bytes[i..].iter().step_by(WIDTH_IN_BITS) {
                    self.data[index] ^= u64::from(byte) << offset;
                }
            } else {
                let next = if is_last_cell { 0 } else { index + 1 };
                let low = bits_in_cell - offset;
                let xored = bytes[i..]
                    .iter()
                    .step_by(WIDTH_IN_BITS)
                    .fold(0u8, |acc, &b| acc ^ b);
                self.data[index] ^= u64::from(xored) << offset;
                self.data[next] ^= u64::from(xored) >> low;
            }

            offset += SHIFT;
            while offset >= bits_in_cell {
                index = if is_last_cell { 0 } else { index + 1 };
                offset -= bits_in_cell;
            }
        }

        self.shift_so_far = (self.shift_so_far + SHIFT * (bytes.len() % WIDTH_IN_BITS)) % WIDTH_IN_BITS;
        self.length_so_far += bytes.len() as u64;
    }

    pub fn finalize(&self) -> [u8; DIGEST_LEN] {
        let mut digest = [0u8; DIGEST_LEN];
        for (i, cell) in self.data.iter().take(CELLS - 1).enumerate() {
            digest[i * 8..i * 8 + 8].copy_from_slice(&cell.to_le_bytes());
        }
        let tail = (CELLS - 1) * 8;
        digest[tail..].copy_from_slice(&self.data[CELLS - 1].to_le_bytes()[..DIGEST_LEN - tail]);

        let length = self.length_so_far.to_le_bytes();
        let start = WIDTH_IN_BITS / 8 - length.len();
        for (i, b) in length.iter().enumerate() {
            digest[start + i] ^= b;
        }
        digest
    }
}

/// Base64 QuickXorHash of `data`, in the form Graph reports it.
pub fn quick_xor_hash(data: &[u8]) -> String {
    let mut hasher = QuickXorHash::new();
    hasher.update(data);
    STANDARD.encode(hasher.finalize())
}

/// Compare a Graph-reported hash against `data`.
///
/// The remote value is decoded first, so padding and formatting differences
/// do not matter. An undecodable value never matches.
pub fn matches(remote: &str, data: &[u8]) -> bool {
    let Ok(remote) = STANDARD.decode(remote.trim()) else {
        return false;
    };
    let mut hasher = QuickXorHash::new();
    hasher.update(data);
    remote.as_slice() == hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(quick_xor_hash(b""), "AAAAAAAAAAAAAAAAAAAAAAAAAAA=");
    }

    #[test]
    fn test_single_byte_and_length() {
        assert_eq!(quick_xor_hash(b"a"), "YQAAAAAAAAAAAAAAAQAAAAAAAAA=");
    }

    #[test]
    fn test_known_sentence() {
        assert_eq!(
            quick_xor_hash(b"The quick brown fox jumps over the lazy dog"),
            "bMSlbysmxJL6S75XwfMcQZOpcr4="
        );
    }

    #[test]
    fn test_chunked_updates_match_single_update() {
        let data: Vec<u8> = (0..1000u32).map(|i| ((i * 7 + 3) % 256) as u8).collect();
        assert_eq!(quick_xor_hash(&data), "dgD8j0n8sM0aPE5CUJ8tqmilX/E=");

        let mut hasher = QuickXorHash::new();
        hasher.update(&data[..1]);
        hasher.update(&data[1..333]);
        hasher.update(&data[333..]);
        assert_eq!(STANDARD.encode(hasher.finalize()), quick_xor_hash(&data));
    }

    #[test]
    fn test_matches() {
        assert!(matches("YQAAAAAAAAAAAAAAAQAAAAAAAAA=", b"a"));
        assert!(!matches("YQAAAAAAAAAAAAAAAQAAAAAAAAA=", b"b"));
        assert!(!matches("not base64!", b"a"));
    }
}

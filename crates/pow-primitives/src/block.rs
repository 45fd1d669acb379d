//! Consensus-relevant block header.

use pow_consensus::Hash256;

use crate::encoding::{DecodeError, Decoder, Encoder};
use crate::hash::sha256d;

pub const CURRENT_VERSION: i32 = 4;

/// The consensus-relevant subset of a block header: every field the proof-of-work
/// core reads, and nothing a wallet, RPC layer, or block assembler would add.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub hash_reserved: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: Hash256,
    pub solution: Vec<u8>,
}

impl BlockHeader {
    /// `I` in the Equihash challenge: the header serialized without `nonce`
    /// and `solution`, little-endian, fixed widths `4|32|32|32|4|4`.
    pub fn equihash_input(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_i32_le(self.version);
        encoder.write_hash_le(&self.prev_block);
        encoder.write_hash_le(&self.merkle_root);
        encoder.write_hash_le(&self.hash_reserved);
        encoder.write_u32_le(self.time);
        encoder.write_u32_le(self.bits);
        encoder.into_inner()
    }

    /// Full wire encoding, including `nonce` and `solution`.
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_bytes(&self.equihash_input());
        encoder.write_hash_le(&self.nonce);
        encoder.write_var_bytes(&self.solution);
        encoder.into_inner()
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let header = Self::decode_from(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(header)
    }

    fn decode_from(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let version = decoder.read_i32_le()?;
        let prev_block = decoder.read_hash_le()?;
        let merkle_root = decoder.read_hash_le()?;
        let hash_reserved = decoder.read_hash_le()?;
        let time = decoder.read_u32_le()?;
        let bits = decoder.read_u32_le()?;
        let nonce = decoder.read_hash_le()?;
        let solution = decoder.read_var_bytes()?;
        Ok(Self {
            version,
            prev_block,
            merkle_root,
            hash_reserved,
            time,
            bits,
            nonce,
            solution,
        })
    }

    /// Block hash used for target comparison. The spec treats this as
    /// computed by an external hasher (§3); this is a convenience for tests
    /// that want a concrete `powHash`, never called by the validator itself.
    pub fn pow_hash(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BlockHeader {
        BlockHeader {
            version: CURRENT_VERSION,
            prev_block: [1u8; 32],
            merkle_root: [2u8; 32],
            hash_reserved: [3u8; 32],
            time: 1_700_000_000,
            bits: 0x1d00ffff,
            nonce: [4u8; 32],
            solution: vec![9, 9, 9, 9],
        }
    }

    #[test]
    fn round_trips_through_wire_encoding() {
        let header = sample();
        let bytes = header.consensus_encode();
        let decoded = BlockHeader::consensus_decode(&bytes).expect("decode");
        assert_eq!(decoded, header);
    }

    #[test]
    fn equihash_input_excludes_nonce_and_solution() {
        let header = sample();
        let input = header.equihash_input();
        assert_eq!(input.len(), 4 + 32 + 32 + 32 + 4 + 4);
    }
}

//! Header validator: proof-of-work target check and Equihash solution check.

use pow_consensus::ConsensusParams;
use pow_consensus::Hash256;
use pow_primitives::block::BlockHeader;
use primitive_types::U256;

use crate::difficulty::{compact_to_u256, CompactError};
use crate::equihash::check_equihash_solution;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowError {
    InvalidBits(&'static str),
    HashMismatch,
    InvalidEquihashSolution,
    Compact(CompactError),
}

impl std::fmt::Display for PowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowError::InvalidBits(message) => write!(f, "{message}"),
            PowError::HashMismatch => write!(f, "pow hash does not meet target"),
            PowError::InvalidEquihashSolution => write!(f, "invalid equihash solution"),
            PowError::Compact(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PowError {}

impl From<CompactError> for PowError {
    fn from(err: CompactError) -> Self {
        PowError::Compact(err)
    }
}

/// `CheckProofOfWork`: true iff `nBits` decodes to a positive, non-overflowing
/// target no larger than `powLimit`, and `powHash` (as a 256-bit
/// little-endian integer) is at or below that target.
///
/// Total: any failure mode collapses to `false`, with no error taxonomy
/// beyond the boolean, matching the published contract.
pub fn check_proof_of_work(pow_hash: &Hash256, bits: u32, params: &ConsensusParams) -> bool {
    let target = match compact_to_u256(bits) {
        Ok(target) => target,
        Err(_) => return false,
    };
    if target.is_zero() {
        return false;
    }

    let pow_limit = U256::from_little_endian(&params.pow_limit);
    if target > pow_limit {
        return false;
    }

    let hash_value = U256::from_little_endian(pow_hash);
    hash_value <= target
}

/// Convenience wrapper combining both parts of header validation: the
/// caller supplies the already-computed `powHash` (this core does not
/// prescribe which hash function feeds the target check).
pub fn validate_header_pow(
    header: &BlockHeader,
    pow_hash: &Hash256,
    params: &ConsensusParams,
) -> Result<(), PowError> {
    if !check_proof_of_work(pow_hash, header.bits, params) {
        let target = compact_to_u256(header.bits)?;
        if target.is_zero() {
            return Err(PowError::InvalidBits("pow target is zero"));
        }
        let pow_limit = U256::from_little_endian(&params.pow_limit);
        if target > pow_limit {
            return Err(PowError::InvalidBits("pow target above limit"));
        }
        return Err(PowError::HashMismatch);
    }

    if !check_equihash_solution(header) {
        return Err(PowError::InvalidEquihashSolution);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pow_consensus::{consensus_params, Network};

    fn params() -> ConsensusParams {
        consensus_params(Network::Regtest)
    }

    // P3: CheckProofOfWork boolean contract.
    #[test]
    fn hash_at_exactly_the_target_passes() {
        let params = params();
        let bits = 0x2000_00ff;
        let (target, negative, overflow) = crate::difficulty::decode_compact(bits);
        assert!(!negative && !overflow);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&target.to_little_endian());
        assert!(check_proof_of_work(&hash, bits, &params));
    }

    #[test]
    fn hash_one_above_the_target_fails() {
        let params = params();
        let bits = 0x2000_00ff;
        let (target, _, _) = crate::difficulty::decode_compact(bits);
        let above = target + U256::from(1u64);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&above.to_little_endian());
        assert!(!check_proof_of_work(&hash, bits, &params));
    }

    #[test]
    fn zero_target_always_fails() {
        let params = params();
        assert!(!check_proof_of_work(&[0u8; 32], 0, &params));
    }

    #[test]
    fn target_above_pow_limit_fails() {
        let params = params();
        let pow_limit = U256::from_little_endian(&params.pow_limit);
        let above_limit = crate::difficulty::encode_compact(pow_limit + U256::from(1u64));
        assert!(!check_proof_of_work(&[0u8; 32], above_limit, &params));
    }

    #[test]
    fn negative_bits_fail_closed() {
        let params = params();
        assert!(!check_proof_of_work(&[0u8; 32], 0x0380_0000, &params));
    }
}

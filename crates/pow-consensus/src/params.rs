//! Chain parameter bundle consumed by the retarget engine and header validator.

use crate::Hash256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

/// Immutable, per-network configuration. Every field here is consumed by
/// `pow-core`'s retarget engine or header validator; nothing here belongs to
/// wallet, RPC, or networking configuration.
#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,

    /// Maximum allowed (easiest) target.
    pub pow_limit: Hash256,

    /// Regtest escape hatch: every retarget returns the parent's `nBits` unchanged.
    pub f_pow_no_retargeting: bool,

    /// Testnet/regtest escape hatch: a block far enough past its parent's time
    /// may carry `powLimit` directly.
    pub f_pow_allow_min_difficulty_blocks: bool,

    /// Exclusive height at which Zawy LWMA takes over from Digishield v3.
    pub n_zawy_lwma_height: i32,

    /// Height at which Equihash replaces the pre-fork proof-of-work.
    pub n_equihash_fork_height: i32,

    /// Digishield averaging window, in blocks.
    pub n_digishield_averaging_window: i32,
    /// Digishield target block spacing, in seconds.
    pub n_digishield_target_spacing: i64,
    /// Percentage points the actual timespan may fall below the target before clamping.
    pub digishield_max_adjust_down: i64,
    /// Percentage points the actual timespan may rise above the target before clamping.
    pub digishield_max_adjust_up: i64,

    /// Post-fork target block spacing, in seconds, used by Zawy LWMA.
    pub n_pow_target_spacing: i64,
    /// Zawy LWMA averaging window, in blocks (`N`).
    pub n_zawy_lwma_averaging_window: i64,
    /// Zawy LWMA recency weight (`k`).
    pub n_zawy_lwma_adjusted_weight: i64,
    /// Denominator used to floor the weighted solvetime sum.
    pub n_zawy_lwma_min_denominator: i64,
    /// Whether an individual solvetime is clamped to `6T` before weighting.
    pub b_zawy_lwma_solvetime_limitation: bool,
}

impl ConsensusParams {
    pub fn digishield_averaging_window_timespan(&self) -> i64 {
        self.n_digishield_averaging_window as i64 * self.n_digishield_target_spacing
    }

    pub fn digishield_min_actual_timespan(&self) -> i64 {
        (self.digishield_averaging_window_timespan() * (100 - self.digishield_max_adjust_up))
            / 100
    }

    pub fn digishield_max_actual_timespan(&self) -> i64 {
        (self.digishield_averaging_window_timespan() * (100 + self.digishield_max_adjust_down))
            / 100
    }
}

#[derive(Debug)]
pub enum HexError {
    InvalidLength,
    InvalidHex,
}

/// Parses a big-endian hex target literal into little-endian `Hash256` bytes,
/// matching the textual form consensus constants are usually written in.
pub fn hash256_from_hex(input: &str) -> Result<Hash256, HexError> {
    let mut hex = input.trim();
    if let Some(stripped) = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")) {
        hex = stripped;
    }

    if hex.is_empty() {
        return Err(HexError::InvalidLength);
    }

    let mut hex_owned = if hex.len() % 2 == 1 {
        let mut padded = String::with_capacity(hex.len() + 1);
        padded.push('0');
        padded.push_str(hex);
        padded
    } else {
        hex.to_string()
    };

    if hex_owned.len() > 64 {
        return Err(HexError::InvalidLength);
    }

    if hex_owned.len() < 64 {
        let mut padded = String::with_capacity(64);
        for _ in 0..(64 - hex_owned.len()) {
            padded.push('0');
        }
        padded.push_str(&hex_owned);
        hex_owned = padded;
    }

    let mut bytes = [0u8; 32];
    for (i, byte_out) in bytes.iter_mut().enumerate() {
        let start = i * 2;
        let byte = u8::from_str_radix(&hex_owned[start..start + 2], 16)
            .map_err(|_| HexError::InvalidHex)?;
        *byte_out = byte;
    }
    bytes.reverse();

    Ok(bytes)
}

pub fn consensus_params(network: Network) -> ConsensusParams {
    match network {
        Network::Mainnet => mainnet_consensus_params(),
        Network::Testnet => testnet_consensus_params(),
        Network::Regtest => regtest_consensus_params(),
    }
}

fn mainnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Mainnet,
        pow_limit: hash256_from_hex(
            "0007ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("mainnet pow limit"),
        f_pow_no_retargeting: false,
        f_pow_allow_min_difficulty_blocks: false,
        n_zawy_lwma_height: 350_000,
        n_equihash_fork_height: 95_000,
        n_digishield_averaging_window: 17,
        n_digishield_target_spacing: 150,
        digishield_max_adjust_down: 32,
        digishield_max_adjust_up: 16,
        n_pow_target_spacing: 150,
        n_zawy_lwma_averaging_window: 45,
        n_zawy_lwma_adjusted_weight: 124_200,
        n_zawy_lwma_min_denominator: 10,
        b_zawy_lwma_solvetime_limitation: true,
    }
}

fn testnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Testnet,
        pow_limit: hash256_from_hex(
            "07ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("testnet pow limit"),
        f_pow_no_retargeting: false,
        f_pow_allow_min_difficulty_blocks: true,
        n_zawy_lwma_height: 40_000,
        n_equihash_fork_height: 38_000,
        n_digishield_averaging_window: 17,
        n_digishield_target_spacing: 150,
        digishield_max_adjust_down: 32,
        digishield_max_adjust_up: 16,
        n_pow_target_spacing: 150,
        n_zawy_lwma_averaging_window: 45,
        n_zawy_lwma_adjusted_weight: 124_200,
        n_zawy_lwma_min_denominator: 10,
        b_zawy_lwma_solvetime_limitation: true,
    }
}

fn regtest_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Regtest,
        pow_limit: hash256_from_hex(
            "0fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("regtest pow limit"),
        f_pow_no_retargeting: true,
        f_pow_allow_min_difficulty_blocks: true,
        n_zawy_lwma_height: 1_000,
        n_equihash_fork_height: 0,
        n_digishield_averaging_window: 17,
        n_digishield_target_spacing: 150,
        digishield_max_adjust_down: 32,
        digishield_max_adjust_up: 16,
        n_pow_target_spacing: 150,
        n_zawy_lwma_averaging_window: 45,
        n_zawy_lwma_adjusted_weight: 124_200,
        n_zawy_lwma_min_denominator: 10,
        b_zawy_lwma_solvetime_limitation: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digishield_timespan_bounds_are_84_to_132_percent() {
        let params = mainnet_consensus_params();
        let target = params.digishield_averaging_window_timespan();
        assert_eq!(params.digishield_min_actual_timespan(), target * 84 / 100);
        assert_eq!(params.digishield_max_actual_timespan(), target * 132 / 100);
    }

    #[test]
    fn regtest_disables_retargeting() {
        let params = regtest_consensus_params();
        assert!(params.f_pow_no_retargeting);
    }

    #[test]
    fn hex_literal_round_trips_byte_order() {
        let bytes = hash256_from_hex("0007ffff").expect("parse");
        assert_eq!(bytes[0], 0xff);
        assert_eq!(bytes[1], 0xff);
        assert_eq!(bytes[2], 0x07);
        assert_eq!(bytes[3], 0x00);
        assert!(bytes[4..].iter().all(|b| *b == 0));
    }
}

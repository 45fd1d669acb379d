//! Compact target codec, U256 arithmetic, median-time-past, and the
//! Digishield v3 / Zawy LWMA retarget engine.

use pow_consensus::ConsensusParams;
use pow_log::log_debug;
use primitive_types::U256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactError {
    Negative,
    Overflow,
}

impl std::fmt::Display for CompactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactError::Negative => write!(f, "compact target has negative sign bit"),
            CompactError::Overflow => write!(f, "compact target overflows 256-bit range"),
        }
    }
}

impl std::error::Error for CompactError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetargetError {
    /// The supplied ancestor window is not contiguous by height (programmer error).
    NonContiguousWindow,
    Compact(CompactError),
}

impl std::fmt::Display for RetargetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetargetError::NonContiguousWindow => {
                write!(f, "ancestor window must be contiguous by height")
            }
            RetargetError::Compact(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RetargetError {}

impl From<CompactError> for RetargetError {
    fn from(err: CompactError) -> Self {
        RetargetError::Compact(err)
    }
}

/// A single ancestor's consensus-relevant fields, as supplied by the
/// (external, read-only) chain index.
#[derive(Clone, Copy, Debug)]
pub struct HeaderInfo {
    pub height: i64,
    pub time: i64,
    pub bits: u32,
}

/// A read-only, contiguous run of ancestor headers ending at `parent`,
/// oldest first. This is the "chain index" boundary from the spec: the
/// retarget engine only ever walks backward through it, never mutates it,
/// and never caches results across calls.
pub struct AncestorWindow<'a> {
    headers: &'a [HeaderInfo],
}

impl<'a> AncestorWindow<'a> {
    pub fn new(headers: &'a [HeaderInfo]) -> Result<Self, RetargetError> {
        if let Some(first) = headers.first() {
            for (offset, header) in headers.iter().enumerate() {
                if header.height != first.height + offset as i64 {
                    return Err(RetargetError::NonContiguousWindow);
                }
            }
        }
        Ok(Self { headers })
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn parent(&self) -> Option<&HeaderInfo> {
        self.headers.last()
    }

    /// Ancestor window oldest-first, e.g. `tail(W)` is the last `W` entries.
    pub fn tail(&self, count: usize) -> &'a [HeaderInfo] {
        let start = self.headers.len().saturating_sub(count);
        &self.headers[start..]
    }

    fn as_slice(&self) -> &'a [HeaderInfo] {
        self.headers
    }
}

/// Decodes a compact (`nBits`) target into a 256-bit target.
///
/// Always total: `negative`/`overflow` are reported for the caller to act on
/// rather than raised as an error, matching §4.A's "always total" contract.
pub fn decode_compact(bits: u32) -> (U256, bool, bool) {
    let size = bits >> 24;
    let mut word = bits & 0x007f_ffff;
    let negative = (bits & 0x0080_0000) != 0;

    let value = if size <= 3 {
        let shift = 8 * (3 - size);
        word >>= shift;
        U256::from(word)
    } else {
        let shift = 8 * (size - 3);
        U256::from(word) << shift
    };

    let overflow =
        word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

    (value, negative, overflow)
}

/// Total decode that turns `negative`/`overflow` into `CompactError`s, for
/// callers (like the retarget engine) that treat either as fatal.
pub fn compact_to_u256(bits: u32) -> Result<U256, CompactError> {
    let (value, negative, overflow) = decode_compact(bits);
    if negative {
        return Err(CompactError::Negative);
    }
    if overflow {
        return Err(CompactError::Overflow);
    }
    Ok(value)
}

/// Encodes a 256-bit target into its canonical compact form: strip leading
/// zero bytes, and if the remaining mantissa's high bit would be set, shift
/// right a further byte and bump the exponent so the sign bit stays clear.
pub fn encode_compact(value: U256) -> u32 {
    if value.is_zero() {
        return 0;
    }

    let mut size = value.bits().div_ceil(8) as u32;
    let mut compact: u32;

    if size <= 3 {
        compact = value.low_u32() << (8 * (3 - size));
    } else {
        let shift = 8 * (size - 3);
        compact = (value >> shift).low_u32();
    }

    if (compact & 0x0080_0000) != 0 {
        compact >>= 8;
        size += 1;
    }

    (size << 24) | (compact & 0x007f_ffff)
}

fn pow_limit_u256(params: &ConsensusParams) -> U256 {
    U256::from_little_endian(&params.pow_limit)
}

/// Median of the `nTime` of the up-to-11 most recent ancestors ending at
/// `idx` (ties in an even-length set take the lower middle).
fn median_time_past(headers: &[HeaderInfo], idx: usize) -> i64 {
    let start = idx.saturating_sub(10);
    let mut times: Vec<i64> = headers[start..=idx].iter().map(|h| h.time).collect();
    times.sort_unstable();
    times[(times.len() - 1) / 2]
}

/// `nextWorkRequired`: the compact target the next block at
/// `window.parent().height + 1` MUST carry.
///
/// A window shorter than the active averaging window is treated as
/// "averaging window walk runs off chain" and returns `powLimit` per §7,
/// except for Zawy LWMA, where the caller asserting `h > N` is a
/// precondition (§7: "programmer error; abort").
pub fn next_work_required(
    window: &AncestorWindow<'_>,
    candidate_time: Option<i64>,
    params: &ConsensusParams,
) -> Result<u32, RetargetError> {
    let pow_limit = pow_limit_u256(params);
    let pow_limit_bits = encode_compact(pow_limit);

    let Some(parent) = window.parent() else {
        log_debug!("pow: genesis retarget, returning powLimit");
        return Ok(pow_limit_bits);
    };

    let h = parent.height + 1;

    if params.f_pow_no_retargeting {
        log_debug!("pow: fPowNoRetargeting, returning parent.nBits unchanged");
        return Ok(parent.bits);
    }

    if h < params.n_zawy_lwma_height as i64 {
        digishield_next_work_required(window, parent, h, candidate_time, params, pow_limit)
    } else {
        lwma_next_work_required(window, parent.height, params, pow_limit)
    }
}

fn digishield_next_work_required(
    window: &AncestorWindow<'_>,
    parent: &HeaderInfo,
    h: i64,
    candidate_time: Option<i64>,
    params: &ConsensusParams,
    pow_limit: U256,
) -> Result<u32, RetargetError> {
    let pow_limit_bits = encode_compact(pow_limit);

    if params.f_pow_allow_min_difficulty_blocks {
        if let Some(candidate_time) = candidate_time {
            if candidate_time > parent.time + 6 * params.n_digishield_target_spacing {
                log_debug!("pow: digishield min-difficulty escape");
                return Ok(pow_limit_bits);
            }
        }
    }

    let window_len = params.n_digishield_averaging_window as i64;

    // The mainnet fork-reset edge is a historical literal, not the
    // configured fork height: callers on mainnet depend on this exact
    // value for replay.
    let in_reset_window = match params.network {
        pow_consensus::Network::Mainnet => h >= 95_005 && parent.height < 95_005 + window_len,
        _ => {
            h >= params.n_equihash_fork_height as i64
                && parent.height < params.n_equihash_fork_height as i64 + window_len
        }
    };
    if in_reset_window {
        log_debug!("pow: digishield fork-reset window, returning powLimit");
        return Ok(pow_limit_bits);
    }

    let w = params.n_digishield_averaging_window as usize;
    if window.len() <= w {
        log_debug!("pow: digishield averaging window runs off chain, returning powLimit");
        return Ok(pow_limit_bits);
    }

    let headers = window.as_slice();
    let tail = window.tail(w);
    let mut total = U256::zero();
    for header in tail {
        total = total + compact_to_u256(header.bits)?;
    }
    let avg = total / U256::from(w as u64);

    let last_idx = headers.len() - 1;
    let first_idx = headers.len() - w;
    let last_mtp = median_time_past(headers, last_idx);
    let first_mtp = median_time_past(headers, first_idx.saturating_sub(1));

    let target_timespan = params.digishield_averaging_window_timespan();
    let mut actual_timespan = last_mtp - first_mtp;
    actual_timespan = target_timespan + (actual_timespan - target_timespan) / 4;

    let min_timespan = params.digishield_min_actual_timespan();
    let max_timespan = params.digishield_max_actual_timespan();
    if actual_timespan < min_timespan {
        actual_timespan = min_timespan;
    }
    if actual_timespan > max_timespan {
        actual_timespan = max_timespan;
    }

    let mut next = avg;
    next /= U256::from(target_timespan as u64);
    next *= U256::from(actual_timespan as u64);

    if next > pow_limit {
        next = pow_limit;
    }

    log_debug!(
        "pow: digishield retarget at height {h}, actual_timespan={actual_timespan}, target_timespan={target_timespan}"
    );
    Ok(encode_compact(next))
}

fn lwma_next_work_required(
    window: &AncestorWindow<'_>,
    parent_height: i64,
    params: &ConsensusParams,
    pow_limit: U256,
) -> Result<u32, RetargetError> {
    let t = params.n_pow_target_spacing;
    let n = params.n_zawy_lwma_averaging_window;
    let k = params.n_zawy_lwma_adjusted_weight;
    let dnorm = params.n_zawy_lwma_min_denominator;

    let h = parent_height + 1;
    assert!(h > n, "lwma called with h <= N: caller must not do this");

    let headers = window.as_slice();
    let base_height = headers[0].height;

    let divisor = U256::from((k * n * n) as u64);
    let mut sum_target = U256::zero();
    let mut t_acc: i64 = 0;

    for i in (h - n)..h {
        let block_idx = (i - base_height) as usize;
        let prev_idx = (i - 1 - base_height) as usize;
        let block = &headers[block_idx];
        let prev = &headers[prev_idx];

        let mut solvetime = block.time - prev.time;
        if params.b_zawy_lwma_solvetime_limitation && solvetime > 6 * t {
            solvetime = 6 * t;
        }

        let j = i - (h - n) + 1;
        t_acc += solvetime * j;

        let target = compact_to_u256(block.bits)?;
        sum_target = sum_target + (target / divisor);
    }

    let floor = n * k / dnorm;
    if t_acc < floor {
        t_acc = floor;
    }

    let mut next = sum_target * U256::from(t_acc as u64);
    if next > pow_limit {
        next = pow_limit;
    }

    log_debug!("pow: lwma retarget at height {h}, weighted_time={t_acc}");
    Ok(encode_compact(next))
}

/// Inverse-target contribution of a single block to cumulative chain work.
/// Informative only (§6 item 4's spirit); chain-work accumulation itself is
/// out of scope for this core.
pub fn block_proof(bits: u32) -> Result<U256, CompactError> {
    let target = compact_to_u256(bits)?;
    if target.is_zero() {
        return Ok(U256::zero());
    }
    let one = U256::from(1u64);
    Ok((!target / (target + one)) + one)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pow_consensus::{consensus_params, Network};

    fn mainnet() -> ConsensusParams {
        consensus_params(Network::Mainnet)
    }

    fn regtest() -> ConsensusParams {
        consensus_params(Network::Regtest)
    }

    fn flat_chain(
        base_height: i64,
        count: usize,
        base_time: i64,
        spacing: i64,
        bits: u32,
    ) -> Vec<HeaderInfo> {
        (0..count)
            .map(|offset| HeaderInfo {
                height: base_height + offset as i64,
                time: base_time + offset as i64 * spacing,
                bits,
            })
            .collect()
    }

    // P1: compact round-trip for mantissas with the sign bit clear.
    #[test]
    fn compact_round_trip() {
        for e in 3..=32u32 {
            for m in [1u32, 0x123456 & 0x007f_ffff, 0x7fffff] {
                let bits = (e << 24) | m;
                let (target, negative, overflow) = decode_compact(bits);
                assert!(!negative && !overflow);
                let reencoded = encode_compact(target);
                let (roundtripped, _, _) = decode_compact(reencoded);
                assert_eq!(roundtripped, target);
            }
        }
    }

    // P2: negative / overflow detection.
    #[test]
    fn negative_and_overflow_detection() {
        let (_, negative, _) = decode_compact(0x0080_0000);
        assert!(negative);

        let (_, _, overflow) = decode_compact(0x2101_0000);
        assert!(overflow);

        let (target, negative, overflow) = decode_compact(0x2000_0001);
        assert!(!negative && !overflow);
        assert_eq!(target, U256::from(1u64) << (8 * 29));
    }

    #[test]
    fn genesis_retarget_returns_pow_limit() {
        let params = mainnet();
        let window = AncestorWindow::new(&[]).expect("empty window");
        let bits = next_work_required(&window, None, &params).expect("retarget");
        assert_eq!(bits, encode_compact(pow_limit_u256(&params)));
    }

    // P4: fPowNoRetargeting fixed point.
    #[test]
    fn no_retargeting_is_a_fixed_point() {
        let params = regtest();
        let headers = flat_chain(10, 20, 1_000_000, 150, 0x1f07ffff);
        let window = AncestorWindow::new(&headers).expect("contiguous");
        let bits = next_work_required(&window, None, &params).expect("retarget");
        assert_eq!(bits, headers.last().unwrap().bits);
    }

    #[test]
    fn digishield_flat_chain_is_unchanged() {
        let params = mainnet();
        let w = params.n_digishield_averaging_window as usize;
        let bits = encode_compact(pow_limit_u256(&params) / U256::from(2u64));
        let headers = flat_chain(
            200_000,
            w + 1,
            1_000_000,
            params.n_digishield_target_spacing,
            bits,
        );
        let window = AncestorWindow::new(&headers).expect("contiguous");
        let next = next_work_required(&window, None, &params).expect("retarget");
        assert_eq!(next, bits);
    }

    #[test]
    fn digishield_fork_reset_window_on_mainnet() {
        let params = mainnet();
        let headers = vec![HeaderInfo {
            height: 95_005,
            time: 1_000_000,
            bits: 0x1d00ffff,
        }];
        let window = AncestorWindow::new(&headers).expect("single header");
        let bits = next_work_required(&window, None, &params).expect("retarget");
        assert_eq!(bits, encode_compact(pow_limit_u256(&params)));
    }

    // P5: min-difficulty escape (Digishield side).
    #[test]
    fn digishield_min_difficulty_escape() {
        let mut params = consensus_params(Network::Testnet);
        params.f_pow_allow_min_difficulty_blocks = true;
        let w = params.n_digishield_averaging_window as usize;
        let headers = flat_chain(
            500,
            w + 1,
            1_000_000,
            params.n_digishield_target_spacing,
            0x1f07ffff,
        );
        let window = AncestorWindow::new(&headers).expect("contiguous");
        let parent_time = headers.last().unwrap().time;
        let candidate_time = parent_time + 6 * params.n_digishield_target_spacing + 1;
        let bits =
            next_work_required(&window, Some(candidate_time), &params).expect("retarget");
        assert_eq!(bits, encode_compact(pow_limit_u256(&params)));
    }

    // P6: LWMA overflow freedom.
    #[test]
    fn lwma_steady_state_has_no_overflow_and_stays_below_pow_limit() {
        let mut params = mainnet();
        params.n_zawy_lwma_height = 100;
        let n = params.n_zawy_lwma_averaging_window;
        let pow_limit = pow_limit_u256(&params);
        let quarter = pow_limit / U256::from(4u64);
        let bits = encode_compact(quarter);

        let base_height = 100 - n;
        let headers = flat_chain(
            base_height,
            (n + 1) as usize,
            1_000_000,
            params.n_pow_target_spacing,
            bits,
        );
        let window = AncestorWindow::new(&headers).expect("contiguous");
        let next = next_work_required(&window, None, &params).expect("retarget");
        let (target, negative, overflow) = decode_compact(next);
        assert!(!negative && !overflow);
        assert!(target <= pow_limit);
    }

    #[test]
    fn lwma_solvetime_clamp_lowers_difficulty_less_than_unclamped() {
        let mut params = mainnet();
        params.n_zawy_lwma_height = 100;
        let n = params.n_zawy_lwma_averaging_window;
        let bits = encode_compact(pow_limit_u256(&params) / U256::from(4u64));
        let base_height = 100 - n;

        let mut headers = flat_chain(
            base_height,
            (n + 1) as usize,
            1_000_000,
            params.n_pow_target_spacing,
            bits,
        );
        let mid = headers.len() / 2;
        for h in headers.iter_mut().skip(mid) {
            h.time += 100 * params.n_pow_target_spacing;
        }

        let mut clamped = params.clone();
        clamped.b_zawy_lwma_solvetime_limitation = true;
        let mut unclamped = params.clone();
        unclamped.b_zawy_lwma_solvetime_limitation = false;

        let window = AncestorWindow::new(&headers).expect("contiguous");
        let clamped_bits = next_work_required(&window, None, &clamped).expect("retarget");
        let unclamped_bits = next_work_required(&window, None, &unclamped).expect("retarget");

        let (clamped_target, _, _) = decode_compact(clamped_bits);
        let (unclamped_target, _, _) = decode_compact(unclamped_bits);
        assert!(clamped_target < unclamped_target);
    }

    #[test]
    fn median_time_past_of_a_flat_chain_is_the_shared_timestamp() {
        let headers = flat_chain(0, 4, 1_000, 0, 0x1d00ffff);
        assert_eq!(median_time_past(&headers, 3), 1_000);
    }

    #[test]
    fn ancestor_window_rejects_non_contiguous_heights() {
        let headers = vec![
            HeaderInfo {
                height: 10,
                time: 0,
                bits: 0,
            },
            HeaderInfo {
                height: 12,
                time: 0,
                bits: 0,
            },
        ];
        assert!(matches!(
            AncestorWindow::new(&headers),
            Err(RetargetError::NonContiguousWindow)
        ));
    }
}

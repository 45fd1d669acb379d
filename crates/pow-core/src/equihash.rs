//! Equihash solution verification.

use pow_primitives::block::BlockHeader;

use crate::equihash_verify::is_valid_solution;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquihashError {
    MissingSolution,
    UnsupportedSolutionSize,
}

impl std::fmt::Display for EquihashError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EquihashError::MissingSolution => write!(f, "missing equihash solution"),
            EquihashError::UnsupportedSolutionSize => {
                write!(f, "unsupported equihash solution size")
            }
        }
    }
}

impl std::error::Error for EquihashError {}

/// The `(n, k)` parameter pair implied by a solution's byte length. This
/// mapping is the only context used to pick parameters; there is no
/// per-height switch.
fn params_from_solution_size(size: usize) -> Option<(u32, u32)> {
    match size {
        1344 => Some((200, 9)),
        400 => Some((192, 7)),
        100 => Some((144, 5)),
        68 => Some((96, 5)),
        36 => Some((48, 5)),
        _ => None,
    }
}

/// `CheckEquihashSolution`: validates `header.solution` against `header`'s
/// committed fields and `header.nonce`, with `(n, k)` selected solely by
/// solution length. An unrecognised length returns `false` without
/// invoking the verifier; no error taxonomy is exposed beyond the boolean.
pub fn check_equihash_solution(header: &BlockHeader) -> bool {
    check_equihash_solution_detailed(header).unwrap_or(false)
}

/// Internal helper retaining the richer error detail, for callers (tests,
/// diagnostics) that want to distinguish "missing"/"unrecognised length"
/// from "verifier rejected". Nothing on the pure-entry-point surface
/// relies on this.
fn check_equihash_solution_detailed(header: &BlockHeader) -> Result<bool, EquihashError> {
    if header.solution.is_empty() {
        return Err(EquihashError::MissingSolution);
    }

    let (n, k) = params_from_solution_size(header.solution.len())
        .ok_or(EquihashError::UnsupportedSolutionSize)?;

    let input = header.equihash_input();
    let nonce = header.nonce;

    Ok(is_valid_solution(n, k, &input, &nonce, &header.solution).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_header() -> BlockHeader {
        BlockHeader {
            version: 4,
            prev_block: [0u8; 32],
            merkle_root: [0u8; 32],
            hash_reserved: [0u8; 32],
            time: 0,
            bits: 0x1d00ffff,
            nonce: [0u8; 32],
            solution: Vec::new(),
        }
    }

    #[test]
    fn missing_solution_fails_closed() {
        let header = base_header();
        assert!(!check_equihash_solution(&header));
        assert!(matches!(
            check_equihash_solution_detailed(&header),
            Err(EquihashError::MissingSolution)
        ));
    }

    #[test]
    fn unrecognised_solution_length_fails_closed_without_invoking_the_verifier() {
        let mut header = base_header();
        header.solution = vec![0u8; 37];
        assert!(!check_equihash_solution(&header));
        assert!(matches!(
            check_equihash_solution_detailed(&header),
            Err(EquihashError::UnsupportedSolutionSize)
        ));
    }

    #[test]
    fn garbage_solution_of_valid_length_fails_verification() {
        let mut header = base_header();
        header.solution = vec![0u8; 36];
        assert!(!check_equihash_solution(&header));
    }

    #[test]
    fn params_from_solution_size_matches_the_published_table() {
        assert_eq!(params_from_solution_size(1344), Some((200, 9)));
        assert_eq!(params_from_solution_size(400), Some((192, 7)));
        assert_eq!(params_from_solution_size(100), Some((144, 5)));
        assert_eq!(params_from_solution_size(68), Some((96, 5)));
        assert_eq!(params_from_solution_size(36), Some((48, 5)));
        assert_eq!(params_from_solution_size(52), None);
    }
}

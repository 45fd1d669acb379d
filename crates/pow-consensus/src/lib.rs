//! Chain parameters consumed by the proof-of-work consensus core.

pub mod params;

pub use params::{consensus_params, ConsensusParams, Network};

pub type Hash256 = [u8; 32];

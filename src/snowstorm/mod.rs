//! Consensus on transactions conflicting over spent inputs.
//!
//! The conflict graph tracks every processing transaction together with the
//! per-input conflict sets it contends in, scores sampled polls against the
//! `alpha` threshold and finalizes transactions once their confidence
//! reaches the applicable `beta` threshold.

mod conflict_graph;
mod conflict_set;
mod snowstorm;
mod snowstorm_utils;
pub mod tx;

pub use conflict_graph::ConflictGraph;
pub use conflict_set::ConflictSet;
pub use snowstorm::*;

use crate::zfx_id::Id;

#[derive(Debug)]
pub enum Error {
    /// The supplied safety parameters are inconsistent.
    InvalidParameters,
    /// The referenced transaction is not being processed by the graph.
    UnknownTx(Id),
    /// The graph has been shut down and refuses further work.
    EngineShutDown,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

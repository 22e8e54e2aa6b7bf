//! Typed failures of the consensus core and pick lifecycle.

use crate::engine::pick::PickResult;
use crate::feed::types::MarketKind;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsensusError {
    /// No usable signals. Skip pick generation for this game+market.
    #[error("no signals to rate")]
    InsufficientData,

    /// Signals from different markets were handed over together.
    #[error("signals span more than one market ({first} and {other})")]
    AmbiguousMarket { first: MarketKind, other: MarketKind },

    #[error("signals span more than one game ({first:?} and {other:?})")]
    MixedGames { first: String, other: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResultError {
    #[error("pick {id} already resolved as {result}")]
    AlreadyResolved { id: i64, result: PickResult },

    #[error("Pending is not a terminal result")]
    NotTerminal,

    #[error("no pick with id {0}")]
    UnknownPick(i64),
}

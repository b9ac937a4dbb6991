//! # Snowstorm
//!
//! Snowstorm is a conflict-graph consensus engine belonging to the `Snow*`
//! family of metastable voting protocols.
//!
//! Transactions consume input resources and two transactions conflict iff
//! they share at least one input. The engine ingests opaque transactions,
//! ingests a stream of sampled network votes and decides which transactions
//! to accept and which to reject, such that no two accepted transactions
//! ever share an input.
//!
//! ## Bag
//!
//! [bag] tallies one round of sampled votes into a multiset which the engine
//! scores against the `alpha` threshold.
//!
//! ## Snowstorm
//!
//! [snowstorm] contains the conflict graph itself together with an actor
//! which serializes driver access to it: transactions in, polls in,
//! preferences out.

#[macro_use]
extern crate serde_derive;
extern crate colored;

pub mod bag;
pub mod params;
pub mod snowstorm;
pub mod zfx_id;

#[derive(Debug)]
pub enum Error {
    Actix(actix::MailboxError),
    Consensus(snowstorm::Error),

    /// Error caused by converting from a `String` to an `Id`
    TryFromStringError,
}

impl std::error::Error for Error {}

impl std::convert::From<actix::MailboxError> for Error {
    fn from(error: actix::MailboxError) -> Self {
        Error::Actix(error)
    }
}

impl std::convert::From<snowstorm::Error> for Error {
    fn from(error: snowstorm::Error) -> Self {
        Error::Consensus(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

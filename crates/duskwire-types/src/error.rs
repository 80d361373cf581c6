//! Shared error-kind surface (§7 "Error Handling Design").
//!
//! This is the vocabulary every crate's own `thiserror` enum maps into at
//! its public boundary; internal error variants stay crate-local and more
//! specific, but anything crossing a component boundary collapses to one of
//! these kinds so callers can match on a stable, small set.

use thiserror::Error;

/// Caller-visible error kind, per §7.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// Malformed address, zero-length key, out-of-range parameter.
    #[error("invalid argument")]
    InvalidArgument,
    /// No route to peer: neither UDP nor any relay.
    #[error("peer unreachable")]
    Unreachable,
    /// Send buffer or congestion window full; caller should retry.
    #[error("busy")]
    Busy,
    /// MAC mismatch, signature invalid, or unknown peer key.
    #[error("authentication failed")]
    AuthenticationFailed,
    /// Friend/group/connection handle invalid.
    #[error("not found")]
    NotFound,
    /// Too many friends, relays, or sessions.
    #[error("resource exhausted")]
    ResourceExhausted,
    /// Underlying socket/relay failed.
    #[error("transport down")]
    TransportDown,
}

//! Client side of the remote verification protocols.
//!
//! Both variants track `busy` and the last failure the same way: a round
//! that fails records the failure and leaves earlier results in place, a
//! round that succeeds replaces them. Every round gets a generation number
//! and only the newest round may write its result.

use std::fmt;
use std::sync::Mutex;

use crate::{
    address::ContractAddress,
    api::ApiClientError,
    busy::{lock, Busy},
};

pub mod stateful;
pub mod stateless;

pub use stateful::{RemoteSessionState, RemoteVerificationSession, ResolvedMatch};
pub use stateless::{StatelessState, StatelessVerification};

/// The deployed contract a session verifies against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractTarget {
    pub address: ContractAddress,
    pub chain_id: String,
}

impl ContractTarget {
    pub fn new(address: ContractAddress, chain_id: impl Into<String>) -> Self {
        Self {
            address,
            chain_id: chain_id.into(),
        }
    }
}

/// Why the last round failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    pub code: &'static str,
    pub message: String,
}

impl From<&ApiClientError> for SessionFailure {
    fn from(error: &ApiClientError) -> Self {
        Self {
            code: error.error_code(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// What happened to a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The server answered and the state was replaced.
    Applied,
    /// The call failed; the failure was recorded, earlier results kept.
    Failed,
    /// Another round was in flight; nothing was sent.
    Busy,
    /// The session was disposed or moved on; the answer was dropped.
    Stale,
    /// There was nothing to send.
    Skipped,
}

/// State shared by both session variants behind the busy flag.
pub(crate) trait SessionState: Busy {
    fn is_busy(&self) -> bool;
}

pub(crate) struct Guarded<T> {
    pub(crate) state: T,
    pub(crate) generation: u64,
    pub(crate) disposed: bool,
}

impl<T> Guarded<T> {
    pub(crate) const fn new(state: T) -> Self {
        Self {
            state,
            generation: 0,
            disposed: false,
        }
    }
}

impl<T: SessionState> Busy for Guarded<T> {
    fn set_busy(&mut self, busy: bool) {
        self.state.set_busy(busy);
    }
}

/// Marks a new round as started, unless one is already running.
pub(crate) fn begin_round<T: SessionState>(guarded: &Mutex<Guarded<T>>) -> Result<u64, RoundOutcome> {
    let mut inner = lock(guarded);
    if inner.disposed {
        return Err(RoundOutcome::Stale);
    }
    if inner.state.is_busy() {
        return Err(RoundOutcome::Busy);
    }
    inner.state.set_busy(true);
    inner.generation += 1;
    Ok(inner.generation)
}

pub(crate) fn is_current<T>(guarded: &Mutex<Guarded<T>>, generation: u64) -> bool {
    let inner = lock(guarded);
    !inner.disposed && inner.generation == generation
}

/// Applies the result of round `generation` if it is still the newest one.
pub(crate) fn finish_round<T>(
    guarded: &Mutex<Guarded<T>>,
    generation: u64,
    apply: impl FnOnce(&mut T) -> RoundOutcome,
) -> RoundOutcome {
    let mut inner = lock(guarded);
    if inner.disposed || inner.generation != generation {
        log::debug!("Dropping result of stale round {generation}");
        return RoundOutcome::Stale;
    }
    apply(&mut inner.state)
}

pub(crate) fn dispose<T>(guarded: &Mutex<Guarded<T>>) {
    let mut inner = lock(guarded);
    inner.disposed = true;
    inner.generation += 1;
}

//! Retry timing policies.
//!
//! The admin link reconnects to the proxy with a [`BackoffPolicy`]; the startup
//! gate uses a fixed retry interval from [`MasterConfig`](crate::MasterConfig).
//!
//! ## Contents
//! - [`BackoffPolicy`] how reconnect delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization so many masters do not reconnect in lockstep
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=100ms, factor=2.0, max=5s, jitter=None.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;

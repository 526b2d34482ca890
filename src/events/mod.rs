//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the master loop, the admin
//! link and the subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Master` (monitor tick, reload swap, stop), the admin link
//!   tasks, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the master's subscriber listener (fans out to `SubscriberSet`),
//!   and anything that called [`Bus::subscribe`] (tests, embedders).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};

//! # talkback-core
//!
//! Shared vocabulary for the talkback crates:
//!
//! - **IDs**: [`SessionId`] names the remote endpoint (camera) being talked
//!   back to, [`TalkbackId`] tags one open/close cycle for log correlation
//! - **Logging**: [`logging::init_subscriber`] and the in-memory
//!   [`logging::capture_logs`] helper used by tests

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;

pub use ids::{SessionId, TalkbackId};

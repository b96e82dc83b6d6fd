//! Engine runners drive a [`crate::algorithm::Algorithm`] to completion by
//! performing the I/O each [`crate::next_action::NextAction`] asks for.
//! `sync_runner` is the blocking implementation; `async_runner` drives the
//! same algorithms on a tokio runtime.

pub mod async_runner;
pub mod sync_runner;

pub use async_runner::AsyncRunner;
pub use sync_runner::SyncRunner;

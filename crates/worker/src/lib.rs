//! Operation sync worker.
//!
//! Polls an HTTP source for batches of create / update / delete operations
//! and applies them to Postgres tables reflected at runtime.

pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod logging;
pub mod poller;
pub mod source;

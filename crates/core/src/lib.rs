//! `opsync-core` -- pure domain types for the operation sync worker.
//!
//! Nothing in this crate touches the network or the database. It defines
//! the wire shape of an operation, the column type model used for table
//! auto-creation and value coercion, payload filtering, and the outcome
//! types that every applied operation produces.

pub mod column_type;
pub mod error;
pub mod identifier;
pub mod operation;
pub mod outcome;
pub mod payload;
pub mod value;

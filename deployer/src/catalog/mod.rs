//! Event-sourced release catalog

pub mod eventlog;
pub mod store;

pub use eventlog::{EventLog, FileEventLog, MemoryEventLog};
pub use store::{Release, ReleaseCatalog};

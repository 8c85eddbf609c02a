// Public modules
pub mod cleanup;
pub mod commands;
pub mod context;
pub mod defaults;
pub mod delivery;
pub mod deploy;
pub mod environment;
pub mod error;
pub mod executor;
pub mod forms;
pub mod hooks;
pub mod interrupt;
pub mod pagination;
pub mod project;
pub mod release;
pub mod rollback;
pub mod ssh;
pub mod tasks;

// Internal modules - not part of public API
pub(crate) mod paths;

// Re-export common types for convenience
pub use environment::{Environment, Value};
pub use error::{Error, ErrorCode, Result};

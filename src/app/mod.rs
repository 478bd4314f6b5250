pub mod cli;
pub mod command_handlers;
pub mod command_support;
pub mod context;

pub use context::{AppContext, ContextError};

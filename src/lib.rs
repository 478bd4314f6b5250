pub mod api;
pub mod app;
pub mod config;
pub mod dispatch;
pub mod documents;
pub mod origin;
pub mod outcome;
pub mod runtime;
pub mod shared;
pub mod store;

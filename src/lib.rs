// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod api;
pub mod config;
pub mod console;
pub mod draft;
pub mod improvement;
pub mod metric;
pub mod persist;
pub mod session;
pub mod workflow;

// Library root: re-exports the modules so integration tests can drive the
// application without the binary.

pub mod app;
pub mod config;
pub mod seed;

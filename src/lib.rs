//! kiln: build configuration validation, task caching and automatic
//! reconfiguration for a build-automation front-end.

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;

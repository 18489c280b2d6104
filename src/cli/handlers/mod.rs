// src/cli/handlers/mod.rs

pub mod build;
pub mod commons;
pub mod configure;
pub mod distclean;
pub mod status;
pub mod validate;

// src/core/mod.rs

pub mod confscheme;
pub mod configure;
pub mod environment;
pub mod hashing;
pub mod loader;
pub mod paths;
pub mod reconcile;
pub mod scheme;
pub mod task_cache;
pub mod validator;
pub mod value;

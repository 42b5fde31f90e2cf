//! Configuration module.

mod loader;

pub use loader::*;

//! Android package containers.

pub mod archive;

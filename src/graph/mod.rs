//! Build graph: node model, per-toolchain command synthesis, and the
//! transitive C/C++ include scanner.

pub mod csource;
pub mod node;
pub mod toolchain;

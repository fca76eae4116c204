//! `mkmk`: reads a build-graph description, constructs an in-memory
//! DAG of build artifacts, and emits a Makefile plus an embedded
//! metadata cache for fast incremental rescans.

pub mod cli;
pub mod command;
pub mod config;
pub mod context;
pub mod emit;
pub mod error;
pub mod filehandle;
pub mod graph;
pub mod name;
pub mod nodespace;
pub mod settings;
pub mod system;

pub use context::ConfigContext;
pub use error::Error;
pub use nodespace::Environment;

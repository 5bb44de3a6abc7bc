//! Cubifier
//!
//! Rewrites G-code from KISSlicer, Cura, Slic3r and Simplify3D into the
//! command set of Cube-series (BfB heritage) printers.
//!
//! This library provides:
//! - Slicer dialect detection from the file's first line
//! - Line classification over a closed command set
//! - Extrusion flow reconstruction into explicit `M108` commands
//! - Per-dialect rewrite pipelines over a cursor-driven line buffer

pub mod buffer;
pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod dialect;
pub mod error;
pub mod flow;
pub mod io;

// Re-exports for clean public API
pub use buffer::{Line, LineBuffer};
pub use config::Args;
pub use diagnostics::{DiagnosticsSink, LogSink, NullSink};
pub use dialect::Dialect;
pub use error::{Error, Result};
pub use io::process_file;

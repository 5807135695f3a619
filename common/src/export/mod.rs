//! Export core modules shared across the CLI.

#[cfg(feature = "excel")]
pub mod excel_core;

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod gemini;
pub mod scanner;
pub mod sync;
pub mod workflow;

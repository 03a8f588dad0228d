pub mod action;
pub mod cli;
pub mod config;
pub mod envvars;
pub mod error;
pub mod exec;
pub mod linesplit;
pub mod logging;
pub mod pathglob;
pub mod retry;
pub mod source;
pub mod statmodel;
pub mod supervisor;
pub mod swap;
pub mod watcher;

pub use error::{KonvahtiError, Result};

//! Glauber dynamics on square lattices: single runs, checkpointing and
//! parallel batches measuring how often the interior fixes at all ones.

pub mod app;
pub mod config;
pub mod error;
pub mod output;
pub mod simulation;

pub use error::{GlauberError, Result};

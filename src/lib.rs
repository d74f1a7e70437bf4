//! boostgate - boost-directed tool calling
//!
//! Lets a client speak a tool-calling protocol against a planning model whose
//! API has no tool parameters. The planning model reasons in text; a
//! tool-capable executor model carries out its guidance with the real tool
//! schema.

pub mod boost;
pub mod config;
pub mod error;
pub mod llm;

pub use error::{BoostError, Result};

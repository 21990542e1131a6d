// SPDX-License-Identifier: MIT OR Apache-2.0

//! lexbot - Retrieval-augmented legal question answering
//!
//! Shared modules for the lexbot CLI tool.

pub mod answer;
pub mod bot;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod index;
pub mod memory;
pub mod output;

pub use bot::{BotState, Degradation, LegalAdvisorBot};
pub use config::{BotConfig, Config};
pub use errors::{BotError, BotResult};

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations for the lexbot binary

pub mod ask;
pub mod chat;
pub mod index;
pub mod status;

use serde::Serialize;

use lexbot::index::{IndexOrigin, ScoredChunk};

/// Retrieved passage for JSON output
#[derive(Debug, Serialize)]
pub struct SourceResult {
    pub source: String,
    pub page: Option<u32>,
    pub position: u32,
    pub score: f32,
    pub text: String,
}

impl From<&ScoredChunk> for SourceResult {
    fn from(scored: &ScoredChunk) -> Self {
        Self {
            source: scored.chunk.source_id.clone(),
            page: scored.chunk.page(),
            position: scored.chunk.position,
            score: scored.score,
            text: scored.chunk.text.clone(),
        }
    }
}

/// Short label and optional reason for where the index came from
pub fn origin_label(origin: Option<&IndexOrigin>) -> (&'static str, Option<String>) {
    match origin {
        Some(IndexOrigin::Loaded) => ("loaded", None),
        Some(IndexOrigin::Built) => ("built", None),
        Some(IndexOrigin::Fallback(reason)) => ("fallback", Some(reason.clone())),
        None => ("none", None),
    }
}

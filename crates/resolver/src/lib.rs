// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! grim-resolver: hybrid keyword + semantic intent resolution

pub mod embedder;
pub mod resolver;

pub use embedder::{
    cosine, normalize, EmbedError, Embedder, HashingEmbedder, HttpEmbedder,
};
pub use resolver::{
    tokenize, Candidate, HybridResolver, MatchType, HIGH_CONFIDENCE, LOW_CONFIDENCE,
    MEDIUM_CONFIDENCE,
};

// Copyright 2026 Areascope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Areascope runtime: source adapters, fallback chains and the acquisition
//! pipeline.
//!
//! The core data model and cache live in the `areascope` crate; this crate
//! adds everything that talks to the outside world (HTTP, Chromium) and the
//! `areascope` command-line binary.

pub mod acquisition;
pub mod cli;
pub mod fallback;
pub mod pipeline;
pub mod renderer;
pub mod sources;
pub mod stealth;

pub use fallback::{Acquired, FallbackOrchestrator, Origin};
pub use pipeline::{AcquisitionPipeline, ConceptOutcome, MergePolicy, PipelineOutcome, RenameTable};

// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Analysis engine for siesta capture archives. The sampler side of
//! the profiler attaches to a live process, walks stacks, and
//! serializes what it saw into a compressed archive; this crate reads
//! that archive back into an in-memory [database::Database] and
//! answers the caller/callee, containing-callstack, and per-line
//! queries a profile browser is built on.

#![deny(clippy::all)]

pub mod archive;
pub mod collections;
pub mod database;
pub mod model;
pub mod normalize;
pub mod resolve;
pub mod text;

pub use database::{CollapseLists, Database, LoadOptions, LoadSummary};

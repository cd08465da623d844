// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The deferred symbol-resolution capability. The primary symbol
//! records in the archive come from the live sampler and may lack
//! line-level fidelity; when a memory image accompanies the capture,
//! a debugger session against that image can fill in or override the
//! module, procedure, source file and line for individual addresses.
//!
//! The session itself is native-debugger territory and lives outside
//! this crate; the database only talks to the [DeferredSymbolResolver]
//! trait and obtains instances through a [ResolverProvider] supplied
//! by the embedder.

use std::path::Path;

/// The partial record a resolver returns for one address. Every field
/// is independently optional; present fields override the primary
/// symbol record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedFrame {
    pub module: Option<String>,
    pub procedure: Option<String>,
    pub source_file: Option<String>,
    pub source_line: Option<u32>,
}

impl ResolvedFrame {
    pub fn is_empty(&self) -> bool {
        self.module.is_none()
            && self.procedure.is_none()
            && self.source_file.is_none()
            && self.source_line.is_none()
    }
}

/// On-demand, per-address symbol lookup against a staged memory image.
///
/// Calls arrive strictly sequentially from the symbol ingestion pass;
/// implementations do not need to support concurrent use. Dropping the
/// resolver must release the backing session and, when the resolver
/// owns the staged image file, delete it.
pub trait DeferredSymbolResolver {
    /// Best effort: a resolver that knows nothing about the address
    /// returns an empty frame.
    fn resolve(&mut self, address: u64) -> ResolvedFrame;
}

/// A resolver with no backing image; every field comes back absent.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopResolver;

impl DeferredSymbolResolver for NoopResolver {
    fn resolve(&mut self, _address: u64) -> ResolvedFrame {
        ResolvedFrame::default()
    }
}

/// Strategy seam for opening a debugger session against a memory image
/// the database staged to disk. `delete_when_done` tells the session
/// whether it should remove the image file once it is released.
///
/// Session construction failure is advisory to the caller: the load
/// falls back to primary-only resolution.
pub trait ResolverProvider {
    fn open_image(
        &self,
        image_path: &Path,
        delete_when_done: bool,
    ) -> anyhow::Result<Box<dyn DeferredSymbolResolver>>;
}

/// Default provider: ignores the image and hands out [NoopResolver]s,
/// so a database without an embedder-supplied debugger backend still
/// honors the load-memory-image flag.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProvider;

impl ResolverProvider for NoopProvider {
    fn open_image(
        &self,
        _image_path: &Path,
        _delete_when_done: bool,
    ) -> anyhow::Result<Box<dyn DeferredSymbolResolver>> {
        Ok(Box::new(NoopResolver))
    }
}

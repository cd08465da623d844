// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::collections::identifiable::{FileId, ModuleId, StringId, SymbolId};

/// A procedure the sampler saw at least one address in.
///
/// Symbols are grouped by the composite key module + source file +
/// procedure name, so multiple sampled addresses may share one Symbol.
/// The id is not stored on the struct; it is the offset in the database's
/// symbol store. Symbols are created during symbol-table ingestion and
/// never mutated afterwards.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Symbol {
    /// Representative address: the first sampled address that resolved to
    /// this symbol.
    pub address: u64,
    pub name: StringId,
    pub source_file: FileId,
    pub module: ModuleId,
    /// The procedure name is on the configured OS-function deny-list;
    /// seeing it as a frame clears every leaf-ward frame of the stack.
    pub is_collapse_function: bool,
    /// The module name is on the configured OS-module deny-list; flagged
    /// root frames are stripped during normalization.
    pub is_collapse_module: bool,
}

/// The key under which sampled addresses are grouped into Symbols.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SymbolKey {
    pub module: ModuleId,
    pub source_file: FileId,
    pub name: StringId,
}

/// Per-address derived record, keyed by address in the database.
///
/// Built in two passes: the symbol pass sets `symbol` and `line`, the
/// sample-count pass accumulates `count` and `percentage`. Both fields
/// are additive so repeated count contributions to the same address
/// stack up rather than overwrite.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AddrInfo {
    pub symbol: SymbolId,
    /// Resolved source line for this exact address.
    pub line: u32,
    pub count: f64,
    pub percentage: f64,
}

impl AddrInfo {
    pub fn new(symbol: SymbolId, line: u32) -> Self {
        Self {
            symbol,
            line,
            count: 0.0,
            percentage: 0.0,
        }
    }
}

// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The capture database: owns every table derived from one capture
//! archive and answers the caller/callee/hot-path queries over it.
//!
//! A database is a single mutable aggregate. Loading clears all state
//! and rebuilds it from scratch; a fatal mid-load error leaves the
//! database cleared, never partially populated. Ingestion is strictly
//! sequential because the sample-count and call-stack passes look up
//! addresses the symbol pass registered. Queries are read-only and
//! infallible once a load has completed.

mod parse;

use crate::archive::{
    self, CaptureArchive, ZipCaptureArchive, ENTRY_CALLSTACKS, ENTRY_IP_COUNTS, ENTRY_MINIDUMP,
    ENTRY_STATS, ENTRY_SYMBOLS, FILE_VERSION,
};
use crate::collections::identifiable::{
    FileId, FxHashMap, FxHashSet, FxIndexMap, Id, ModuleId, StringId, SymbolId,
};
use crate::collections::name_table::NameTable;
use crate::model::{AddrInfo, CallStack, List, ListBuilder, Symbol, SymbolKey};
use crate::normalize::{self, CollapseFlags};
use crate::resolve::{DeferredSymbolResolver, NoopProvider, ResolvedFrame, ResolverProvider};
use crate::text;
use anyhow::{bail, ensure, Context};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Externally supplied deny-lists driving the collapse flags. Names
/// are matched exactly against the procedure and module names parsed
/// from the symbol table.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct CollapseLists {
    pub functions: FxHashSet<String>,
    pub modules: FxHashSet<String>,
}

/// Policy flags for one load pass. Reloading with different flags is
/// how OS-frame collapsing gets toggled after the fact.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub collapse_os_calls: bool,
    pub load_memory_image: bool,
    pub collapse_lists: CollapseLists,
}

/// Data-quality facts gathered during a successful load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Symbol records dropped because their address was already seen.
    pub duplicate_symbol_addresses: u64,
    /// Entries with names this engine does not recognize.
    pub unknown_entries: u64,
    /// Whether a deferred resolver session was active for the symbol
    /// pass.
    pub deferred_resolver_active: bool,
}

pub struct Database {
    procedures: NameTable<StringId>,
    files: NameTable<FileId>,
    modules: NameTable<ModuleId>,
    symbols: Vec<Symbol>,
    symbol_index: FxIndexMap<SymbolKey, SymbolId>,
    addr_info: FxHashMap<u64, AddrInfo>,
    call_stacks: Vec<CallStack>,
    main_list: List,
    stats: Vec<String>,
    total_samples: f64,
    root: Option<SymbolId>,
    has_memory_image: bool,
    source_path: Option<PathBuf>,
    // The session must be released before the staged image file is
    // deleted; field order keeps the implicit drop order correct too.
    deferred: Option<Box<dyn DeferredSymbolResolver>>,
    staged_image: Option<NamedTempFile>,
    provider: Box<dyn ResolverProvider>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Self::with_resolver_provider(Box::new(NoopProvider))
    }

    /// A database whose deferred symbol resolution is backed by the
    /// given provider, typically a native debugger session over the
    /// staged memory image.
    pub fn with_resolver_provider(provider: Box<dyn ResolverProvider>) -> Self {
        Self {
            procedures: NameTable::new(),
            files: NameTable::new(),
            modules: NameTable::new(),
            symbols: Vec::new(),
            symbol_index: FxIndexMap::default(),
            addr_info: FxHashMap::default(),
            call_stacks: Vec::new(),
            main_list: List::default(),
            stats: Vec::new(),
            total_samples: 0.0,
            root: None,
            has_memory_image: false,
            source_path: None,
            deferred: None,
            staged_image: None,
            provider,
        }
    }

    /// Loads the capture archive at `path`, replacing all prior state.
    /// The path is recorded so [Database::reload] can re-run the load
    /// with different policy flags.
    pub fn load_from_path(&mut self, path: &Path, options: &LoadOptions) -> anyhow::Result<LoadSummary> {
        self.source_path = Some(path.to_path_buf());
        self.release_resolver();
        self.clear();
        let mut container = ZipCaptureArchive::open(path)?;
        self.load_cleared(&mut container, options)
    }

    /// Loads from an already-open container. Used by embedders that
    /// manage container I/O themselves; does not record a reload path.
    pub fn load_from_archive(
        &mut self,
        container: &mut dyn CaptureArchive,
        options: &LoadOptions,
    ) -> anyhow::Result<LoadSummary> {
        self.release_resolver();
        self.clear();
        self.load_cleared(container, options)
    }

    /// Re-runs the load against the previously recorded path, e.g.
    /// after the user toggles OS-call collapsing or chooses to attach
    /// the memory-image resolver.
    pub fn reload(&mut self, options: &LoadOptions) -> anyhow::Result<LoadSummary> {
        let Some(path) = self.source_path.clone() else {
            bail!("no capture archive has been loaded from a path yet");
        };
        self.load_from_path(&path, options)
    }

    fn load_cleared(
        &mut self,
        container: &mut dyn CaptureArchive,
        options: &LoadOptions,
    ) -> anyhow::Result<LoadSummary> {
        match self.ingest(container, options) {
            Ok(summary) => {
                if summary.duplicate_symbol_addresses > 0 {
                    warn!(
                        count = summary.duplicate_symbol_addresses,
                        "dropped duplicate symbol-table addresses; kept first occurrence of each"
                    );
                }
                Ok(summary)
            }
            Err(err) => {
                // Fatal path: only the fully cleared state may be
                // observed afterwards.
                self.release_resolver();
                self.clear();
                Err(err)
            }
        }
    }

    fn ingest(
        &mut self,
        container: &mut dyn CaptureArchive,
        options: &LoadOptions,
    ) -> anyhow::Result<LoadSummary> {
        let mut summary = LoadSummary::default();
        let names = container.entry_names();

        let Some(version) = names.iter().find_map(|name| archive::version_token(name)) else {
            bail!("capture archive has no version marker entry");
        };
        ensure!(
            version == FILE_VERSION,
            "capture format version {version:?} is not supported (expected {FILE_VERSION:?})"
        );

        for name in &names {
            let known = matches!(
                name.as_str(),
                ENTRY_SYMBOLS | ENTRY_IP_COUNTS | ENTRY_CALLSTACKS | ENTRY_STATS | ENTRY_MINIDUMP
            );
            if !known && archive::version_token(name).is_none() {
                warn!(entry = %name, "ignoring unexpected capture entry");
                summary.unknown_entries += 1;
            }
        }

        // Fixed pass order regardless of container order: the image
        // resolver must exist before symbols, and the count/stack
        // passes look up addresses the symbol pass registered.
        if names.iter().any(|n| n == ENTRY_MINIDUMP) {
            self.has_memory_image = true;
            if options.load_memory_image {
                let payload = container.read_entry(ENTRY_MINIDUMP)?;
                summary.deferred_resolver_active = self.attach_resolver(&payload);
            }
        }

        if names.iter().any(|n| n == ENTRY_SYMBOLS) {
            let payload = container.read_entry(ENTRY_SYMBOLS)?;
            let text = text::decode_auto(&payload).context("failed to decode Symbols.txt")?;
            summary.duplicate_symbol_addresses = self
                .ingest_symbols(&text, options)
                .context("failed to ingest Symbols.txt")?;
        }

        if names.iter().any(|n| n == ENTRY_IP_COUNTS) {
            let payload = container.read_entry(ENTRY_IP_COUNTS)?;
            let text = text::decode_narrow(&payload);
            self.ingest_counts(&text)
                .context("failed to ingest IPCounts.txt")?;
        }

        if names.iter().any(|n| n == ENTRY_CALLSTACKS) {
            let payload = container.read_entry(ENTRY_CALLSTACKS)?;
            let text = text::decode_narrow(&payload);
            self.ingest_callstacks(&text, options)
                .context("failed to ingest Callstacks.txt")?;
        }

        if names.iter().any(|n| n == ENTRY_STATS) {
            let payload = container.read_entry(ENTRY_STATS)?;
            let text = text::decode_narrow(&payload);
            self.stats = text::lines(&text).map(String::from).collect();
        }

        self.build_main_list();
        debug!(
            symbols = self.symbols.len(),
            addresses = self.addr_info.len(),
            stacks = self.call_stacks.len(),
            "capture ingested"
        );
        Ok(summary)
    }

    /// Stages the embedded memory image to a temporary file and asks
    /// the provider for a session against it. Best effort: any failure
    /// is reported once and the load continues with primary-only
    /// resolution.
    fn attach_resolver(&mut self, payload: &[u8]) -> bool {
        let staged = tempfile::Builder::new()
            .prefix("siesta-image-")
            .suffix(".dmp")
            .tempfile()
            .and_then(|mut file| {
                file.write_all(payload)?;
                file.flush()?;
                Ok(file)
            });
        let staged = match staged {
            Ok(staged) => staged,
            Err(err) => {
                warn!(error = %err, "could not stage memory image; deferred resolution disabled");
                return false;
            }
        };
        // The temp file's lifetime is managed here, so the session
        // must not delete it on release.
        match self.provider.open_image(staged.path(), false) {
            Ok(resolver) => {
                self.deferred = Some(resolver);
                self.staged_image = Some(staged);
                true
            }
            Err(err) => {
                warn!(error = %err, "memory-image session failed; falling back to primary symbols");
                false
            }
        }
    }

    fn ingest_symbols(&mut self, text: &str, options: &LoadOptions) -> anyhow::Result<u64> {
        let mut duplicates = 0u64;
        for line in text::lines(text) {
            if line.trim().is_empty() {
                continue;
            }
            let record = parse::parse_symbol_line(line)
                .with_context(|| format!("bad symbol record {line:?}"))?;

            // Duplicate addresses are a data-quality warning, not
            // fatal; only the first record per address is kept.
            if self.addr_info.contains_key(&record.address) {
                duplicates += 1;
                continue;
            }

            let frame = match self.deferred.as_mut() {
                Some(resolver) => resolver.resolve(record.address),
                None => ResolvedFrame::default(),
            };
            let module = frame.module.as_deref().unwrap_or(record.module);
            let procedure = frame.procedure.as_deref().unwrap_or(record.procedure);
            let source_file = frame.source_file.as_deref().unwrap_or(record.source_file);
            let line_number = frame.source_line.unwrap_or(record.line);

            let module_id = self.modules.intern(module);
            let file_id = self.files.intern(source_file);
            let name_id = self.procedures.intern(procedure);
            let key = SymbolKey {
                module: module_id,
                source_file: file_id,
                name: name_id,
            };
            let symbol_id = match self.symbol_index.get(&key) {
                Some(&id) => id,
                None => {
                    let id = SymbolId::from_offset(self.symbols.len());
                    self.symbols.push(Symbol {
                        address: record.address,
                        name: name_id,
                        source_file: file_id,
                        module: module_id,
                        is_collapse_function: options.collapse_lists.functions.contains(procedure),
                        is_collapse_module: options.collapse_lists.modules.contains(module),
                    });
                    self.symbol_index.insert(key, id);
                    id
                }
            };
            self.addr_info
                .insert(record.address, AddrInfo::new(symbol_id, line_number));
        }
        Ok(duplicates)
    }

    /// Additive: repeated contributions to the same address stack up,
    /// and each contribution's percentage is relative to its own pass
    /// total.
    fn ingest_counts(&mut self, text: &str) -> anyhow::Result<()> {
        let mut lines = text::lines(text).filter(|line| !line.trim().is_empty());
        let Some(total_line) = lines.next() else {
            return Ok(());
        };
        let total: f64 = total_line
            .trim()
            .parse()
            .with_context(|| format!("bad total sample count {total_line:?}"))?;
        self.total_samples += total;

        for line in lines {
            let (address, count) =
                parse::parse_count_line(line).with_context(|| format!("bad count record {line:?}"))?;
            let Some(info) = self.addr_info.get_mut(&address) else {
                bail!("sample count references address {address:x} never seen by the symbol pass");
            };
            info.count += count;
            if total != 0.0 {
                info.percentage += 100.0 * count / total;
            }
        }
        Ok(())
    }

    fn ingest_callstacks(&mut self, text: &str, options: &LoadOptions) -> anyhow::Result<()> {
        let mut raw = Vec::new();
        for line in text::lines(text) {
            if line.trim().is_empty() {
                continue;
            }
            let stack = parse::parse_callstack_line(line)
                .with_context(|| format!("bad call-stack record {line:?}"))?;
            for &address in &stack.addresses {
                ensure!(
                    self.addr_info.contains_key(&address),
                    "call stack references address {address:x} never seen by the symbol pass"
                );
            }
            raw.push(stack);
        }

        let addr_info = &self.addr_info;
        let symbols = &self.symbols;
        let flags = |address: u64| {
            let symbol = &symbols[addr_info[&address].symbol.to_offset()];
            CollapseFlags {
                function: symbol.is_collapse_function,
                module: symbol.is_collapse_module,
            }
        };
        let merged = normalize::normalize(raw, options.collapse_os_calls, flags);

        let stacks: Vec<CallStack> = merged
            .into_iter()
            .map(|stack| {
                let resolved = stack
                    .addresses
                    .iter()
                    .map(|address| addr_info[address].symbol)
                    .collect();
                CallStack::new(stack.addresses, resolved, stack.samplecount)
            })
            .collect();
        self.call_stacks = stacks;
        Ok(())
    }

    /// Built once after ingestion: every distinct symbol in a stack
    /// gets the stack's weight as inclusive, the leaf symbol also gets
    /// it as exclusive.
    fn build_main_list(&mut self) {
        let mut builder = ListBuilder::default();
        for stack in &self.call_stacks {
            builder.add_total(stack.samplecount);
            let mut seen: FxHashSet<SymbolId> = FxHashSet::default();
            for &symbol in &stack.symbols {
                if seen.insert(symbol) {
                    let address = self.symbols[symbol.to_offset()].address;
                    builder.add(symbol, address, stack.samplecount, 0.0);
                }
            }
            if let Some(leaf) = stack.leaf() {
                let address = self.symbols[leaf.to_offset()].address;
                builder.add(leaf, address, 0.0, stack.samplecount);
            }
        }
        self.main_list = builder.finish_sorted();
    }

    fn release_resolver(&mut self) {
        // Session first, then its backing file.
        self.deferred = None;
        self.staged_image = None;
    }

    fn clear(&mut self) {
        self.procedures.clear();
        self.files.clear();
        self.modules.clear();
        self.symbols.clear();
        self.symbol_index.clear();
        self.addr_info.clear();
        self.call_stacks.clear();
        self.main_list = List::default();
        self.stats.clear();
        self.total_samples = 0.0;
        self.root = None;
        self.has_memory_image = false;
    }

    // ---- query surface -------------------------------------------------

    pub fn main_list(&self) -> &List {
        &self.main_list
    }

    /// Focus symbol: subsequent caller/callee queries only consider
    /// stacks that also contain the root. None means whole dataset.
    pub fn set_root(&mut self, root: Option<SymbolId>) {
        self.root = root;
    }

    pub fn root(&self) -> Option<SymbolId> {
        self.root
    }

    fn scoped_stacks(&self, symbol: SymbolId) -> impl Iterator<Item = &CallStack> + '_ {
        let root = self.root;
        self.call_stacks.iter().filter(move |stack| {
            stack.contains(symbol) && root.is_none_or(|root| stack.contains(root))
        })
    }

    /// Symbols observed calling `symbol`, with the full weight of each
    /// matching stack attributed per occurrence, sorted by descending
    /// inclusive count.
    pub fn callers(&self, symbol: SymbolId) -> List {
        let mut builder = ListBuilder::default();
        for stack in self.scoped_stacks(symbol) {
            builder.add_total(stack.samplecount);
            for (offset, &frame) in stack.symbols.iter().enumerate() {
                if frame != symbol {
                    continue;
                }
                if let Some(&caller) = stack.symbols.get(offset + 1) {
                    builder.add(caller, stack.addresses[offset + 1], stack.samplecount, 0.0);
                }
            }
        }
        builder.finish_sorted()
    }

    /// Symbols observed being called by `symbol`. A callee that is the
    /// stack leaf also accrues the weight as exclusive.
    pub fn callees(&self, symbol: SymbolId) -> List {
        let mut builder = ListBuilder::default();
        for stack in self.scoped_stacks(symbol) {
            builder.add_total(stack.samplecount);
            for (offset, &frame) in stack.symbols.iter().enumerate() {
                if frame != symbol || offset == 0 {
                    continue;
                }
                let callee = stack.symbols[offset - 1];
                let exclusive = if offset == 1 { stack.samplecount } else { 0.0 };
                builder.add(
                    callee,
                    stack.addresses[offset - 1],
                    stack.samplecount,
                    exclusive,
                );
            }
        }
        builder.finish_sorted()
    }

    /// Every call stack `symbol` appears anywhere in. Not scoped by
    /// the root.
    pub fn callstacks_containing(&self, symbol: SymbolId) -> Vec<&CallStack> {
        self.call_stacks
            .iter()
            .filter(|stack| stack.contains(symbol))
            .collect()
    }

    /// Summed sample counts per source line of `file`, indexed by line
    /// number and sized to the maximum line seen plus one.
    pub fn line_counts(&self, file: FileId) -> Vec<f64> {
        let mut counts: Vec<f64> = Vec::new();
        for info in self.addr_info.values() {
            if self.symbols[info.symbol.to_offset()].source_file != file {
                continue;
            }
            let line = info.line as usize;
            if counts.len() <= line {
                counts.resize(line + 1, 0.0);
            }
            counts[line] += info.count;
        }
        counts
    }

    // ---- direct accessors ----------------------------------------------

    /// # Panics
    /// The id must come from this database instance and load.
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.to_offset()]
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn symbol_name(&self, id: SymbolId) -> &str {
        self.procedures.get(self.symbols[id.to_offset()].name)
    }

    pub fn procedure_name(&self, id: StringId) -> &str {
        self.procedures.get(id)
    }

    pub fn file_name(&self, id: FileId) -> &str {
        self.files.get(id)
    }

    pub fn module_name(&self, id: ModuleId) -> &str {
        self.modules.get(id)
    }

    pub fn find_file(&self, name: &str) -> Option<FileId> {
        self.files.lookup(name)
    }

    pub fn addr_info(&self, address: u64) -> Option<&AddrInfo> {
        self.addr_info.get(&address)
    }

    pub fn call_stacks(&self) -> &[CallStack] {
        &self.call_stacks
    }

    /// Free-form statistics lines from the capture, verbatim.
    pub fn stats(&self) -> &[String] {
        &self.stats
    }

    /// Total sample count declared by the sample-count entry.
    pub fn total_samples(&self) -> f64 {
        self.total_samples
    }

    /// Whether the archive carries a memory image, recorded even when
    /// the image was not loaded; a reload can attach it later.
    pub fn has_memory_image(&self) -> bool {
        self.has_memory_image
    }

    /// Debug aid: the path the current data was loaded from.
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }
}

#[cfg(test)]
mod tests;

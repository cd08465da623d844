// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::resolve::{DeferredSymbolResolver, ResolvedFrame, ResolverProvider};

/// Test container: named entries backed by plain byte vectors.
struct MemoryArchive {
    entries: Vec<(String, Vec<u8>)>,
}

impl MemoryArchive {
    fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(name, body)| (String::from(*name), body.as_bytes().to_vec()))
                .collect(),
        }
    }

    fn push(&mut self, name: &str, payload: &[u8]) {
        self.entries.push((String::from(name), payload.to_vec()));
    }
}

impl CaptureArchive for MemoryArchive {
    fn entry_names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    fn read_entry(&mut self, name: &str) -> anyhow::Result<Vec<u8>> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, payload)| payload.clone())
            .ok_or_else(|| anyhow::anyhow!("no entry named {name:?}"))
    }
}

const VERSION_ENTRY: &str = "Version 0.90 required";

/// Two symbols, g calls f, two identical stacks of weight 1.
fn basic_archive() -> MemoryArchive {
    MemoryArchive::new(&[
        (VERSION_ENTRY, ""),
        (
            "Symbols.txt",
            "1 \"app\" \"f\" \"f.c\" 10\n2 \"app\" \"g\" \"g.c\" 20\n",
        ),
        ("IPCounts.txt", "2\n1 2\n"),
        ("Callstacks.txt", "1 1 2\n1 1 2\n"),
        ("Stats.txt", "Samples: 2\nAborted: no\n"),
    ])
}

fn load(archive: &mut MemoryArchive) -> (Database, LoadSummary) {
    let mut db = Database::new();
    let summary = db
        .load_from_archive(archive, &LoadOptions::default())
        .unwrap();
    (db, summary)
}

fn symbol_named(db: &Database, name: &str) -> SymbolId {
    db.symbols()
        .iter()
        .position(|s| db.procedure_name(s.name) == name)
        .map(SymbolId::from_offset)
        .unwrap()
}

fn assert_cleared(db: &Database) {
    assert!(db.symbols().is_empty());
    assert!(db.call_stacks().is_empty());
    assert!(db.main_list().is_empty());
    assert!(db.stats().is_empty());
    assert_eq!(0.0, db.total_samples());
    assert_eq!(None, db.root());
    assert!(!db.has_memory_image());
}

#[test]
fn test_end_to_end_basic_queries() {
    let (db, summary) = load(&mut basic_archive());
    assert_eq!(LoadSummary::default(), summary);

    // Two identical [f, g] stacks merged into one of weight 2.
    assert_eq!(1, db.call_stacks().len());
    assert_eq!(2.0, db.call_stacks()[0].samplecount);

    let f = symbol_named(&db, "f");
    let g = symbol_named(&db, "g");

    let main = db.main_list();
    assert_eq!(2.0, main.totalcount);
    assert_eq!(2, main.len());
    // Stable tie on inclusive: leaf-first encounter order.
    assert_eq!(f, main.items[0].symbol);
    assert_eq!(2.0, main.items[0].inclusive);
    assert_eq!(2.0, main.items[0].exclusive);
    assert_eq!(g, main.items[1].symbol);
    assert_eq!(2.0, main.items[1].inclusive);
    assert_eq!(0.0, main.items[1].exclusive);

    let callers = db.callers(f);
    assert_eq!(1, callers.len());
    assert_eq!(g, callers.items[0].symbol);
    assert_eq!(2.0, callers.items[0].inclusive);

    let callees = db.callees(g);
    assert_eq!(1, callees.len());
    assert_eq!(f, callees.items[0].symbol);
    assert_eq!(2.0, callees.items[0].inclusive);
    assert_eq!(2.0, callees.items[0].exclusive);

    // f's accumulated count shows up at f's line.
    let file = db.find_file("f.c").unwrap();
    let lines = db.line_counts(file);
    assert_eq!(11, lines.len());
    assert_eq!(2.0, lines[10]);

    assert_eq!(2.0, db.total_samples());
    assert_eq!(
        vec!["Samples: 2".to_string(), "Aborted: no".to_string()],
        db.stats().to_vec()
    );
    assert_eq!(1, db.callstacks_containing(f).len());
}

#[test]
fn test_missing_version_marker_is_fatal() {
    let mut archive = MemoryArchive::new(&[("Symbols.txt", "1 \"m\" \"p\" \"f\" 1\n")]);
    let mut db = Database::new();
    let err = db
        .load_from_archive(&mut archive, &LoadOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("version marker"));
    assert_cleared(&db);
}

#[test]
fn test_version_mismatch_is_fatal_and_reported() {
    let mut archive = MemoryArchive::new(&[("Version 0.42 required", "")]);
    let mut db = Database::new();
    let err = db
        .load_from_archive(&mut archive, &LoadOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("0.42"));
    assert_cleared(&db);
}

#[test]
fn test_trailing_tokens_fail_the_load_and_clear() {
    let mut archive = basic_archive();
    archive.entries[1].1 = b"1 \"app\" \"f\" \"f.c\" 10 junk\n".to_vec();
    let mut db = Database::new();
    assert!(db
        .load_from_archive(&mut archive, &LoadOptions::default())
        .is_err());
    assert_cleared(&db);
}

#[test]
fn test_count_for_unknown_address_is_fatal() {
    let mut archive = basic_archive();
    archive.entries[2].1 = b"5\nff 5\n".to_vec();
    let mut db = Database::new();
    let err = db
        .load_from_archive(&mut archive, &LoadOptions::default())
        .unwrap_err();
    assert!(format!("{err:#}").contains("never seen by the symbol pass"));
    assert_cleared(&db);
}

#[test]
fn test_callstack_with_unknown_address_is_fatal() {
    let mut archive = basic_archive();
    archive.entries[3].1 = b"1 1 2 ff\n".to_vec();
    let mut db = Database::new();
    assert!(db
        .load_from_archive(&mut archive, &LoadOptions::default())
        .is_err());
    assert_cleared(&db);
}

#[test]
fn test_duplicate_addresses_keep_first_and_are_counted_once_each() {
    let mut archive = basic_archive();
    archive.entries[1].1 =
        b"1 \"app\" \"f\" \"f.c\" 10\n1 \"app\" \"other\" \"o.c\" 5\n2 \"app\" \"g\" \"g.c\" 20\n"
            .to_vec();
    let (db, summary) = load(&mut archive);
    assert_eq!(1, summary.duplicate_symbol_addresses);
    // The first record for address 1 won.
    let f = symbol_named(&db, "f");
    assert_eq!(f, db.addr_info(1).unwrap().symbol);
    assert!(db.symbols().iter().all(|s| db.procedure_name(s.name) != "other"));
}

#[test]
fn test_symbol_grouping_is_deterministic() {
    // Three addresses, two of them with an identical
    // module/file/procedure triple.
    let mut archive = MemoryArchive::new(&[
        (VERSION_ENTRY, ""),
        (
            "Symbols.txt",
            "1 \"app\" \"f\" \"f.c\" 10\n2 \"app\" \"g\" \"g.c\" 20\n3 \"app\" \"f\" \"f.c\" 12\n",
        ),
    ]);
    let (db, _) = load(&mut archive);
    assert_eq!(2, db.symbols().len());
    assert_eq!(
        db.addr_info(1).unwrap().symbol,
        db.addr_info(3).unwrap().symbol
    );
    // Dense, contiguous ids from 0 in first-seen order.
    assert_eq!(0, symbol_named(&db, "f").to_offset());
    assert_eq!(1, symbol_named(&db, "g").to_offset());
    // Representative address is the first one seen.
    assert_eq!(1, db.symbol(symbol_named(&db, "f")).address);
}

#[test]
fn test_percentage_accumulates_across_count_passes() {
    let (mut db, _) = load(&mut basic_archive());
    let before = db.addr_info(1).unwrap().count;
    db.ingest_counts("100\n1 5\n").unwrap();
    db.ingest_counts("50\n1 3\n").unwrap();
    let info = db.addr_info(1).unwrap();
    assert_eq!(before + 8.0, info.count);
    // 5/100 -> 5%, 3/50 -> 6%, plus 100% from the basic fixture.
    assert_eq!(100.0 + 11.0, info.percentage);
}

#[test]
fn test_unknown_entries_are_ignored_not_fatal() {
    let mut archive = basic_archive();
    archive.push("Notes.txt", b"hello");
    let (db, summary) = load(&mut archive);
    assert_eq!(1, summary.unknown_entries);
    assert_eq!(2, db.symbols().len());
}

#[test]
fn test_root_scopes_caller_queries() {
    let mut archive = MemoryArchive::new(&[
        (VERSION_ENTRY, ""),
        (
            "Symbols.txt",
            "1 \"app\" \"f\" \"f.c\" 1\n2 \"app\" \"g\" \"g.c\" 2\n3 \"app\" \"h\" \"h.c\" 3\n",
        ),
        ("Callstacks.txt", "1 1 2\n4 1 3\n"),
    ]);
    let (mut db, _) = load(&mut archive);
    let f = symbol_named(&db, "f");
    let g = symbol_named(&db, "g");
    let h = symbol_named(&db, "h");

    let unscoped = db.callers(f);
    assert_eq!(2, unscoped.len());
    // Sorted by descending inclusive: the weight-4 stack wins.
    assert_eq!(h, unscoped.items[0].symbol);
    assert_eq!(4.0, unscoped.items[0].inclusive);
    assert_eq!(g, unscoped.items[1].symbol);

    db.set_root(Some(h));
    let scoped = db.callers(f);
    assert_eq!(1, scoped.len());
    assert_eq!(h, scoped.items[0].symbol);
    assert_eq!(4.0, scoped.totalcount);

    db.set_root(None);
    assert_eq!(2, db.callers(f).len());
}

#[test]
fn test_recursion_counts_distinct_symbols_once_in_main_list() {
    let mut archive = MemoryArchive::new(&[
        (VERSION_ENTRY, ""),
        (
            "Symbols.txt",
            "1 \"app\" \"f\" \"f.c\" 1\n2 \"app\" \"g\" \"g.c\" 2\n",
        ),
        // f -> f -> g, recursive leaf.
        ("Callstacks.txt", "3 1 1 2\n"),
    ]);
    let (db, _) = load(&mut archive);
    let f = symbol_named(&db, "f");
    let main = db.main_list();
    let row = main.items.iter().find(|i| i.symbol == f).unwrap();
    assert_eq!(3.0, row.inclusive);
    assert_eq!(3.0, row.exclusive);
    // Self-call shows up as f being its own caller and callee.
    let callers = db.callers(f);
    assert!(callers.items.iter().any(|i| i.symbol == f));
}

#[test]
fn test_collapse_changes_shapes_on_reload_style_load() {
    let entries: &[(&str, &str)] = &[
        (VERSION_ENTRY, ""),
        (
            "Symbols.txt",
            concat!(
                "1 \"app\" \"work\" \"w.c\" 1\n",
                "2 \"ntoskrnl\" \"KiPageFault\" \"\" 0\n",
                "3 \"app\" \"main\" \"m.c\" 9\n",
                "4 \"kernel32\" \"BaseThreadInitThunk\" \"\" 0\n",
                "5 \"ntdll\" \"RtlUserThreadStart\" \"\" 0\n",
            ),
        ),
        // Leaf-first: work, KiPageFault, main, BaseThreadInitThunk,
        // RtlUserThreadStart.
        ("Callstacks.txt", "2 1 2 3 4 5\n"),
    ];
    let mut options = LoadOptions::default();
    options
        .collapse_lists
        .functions
        .insert(String::from("KiPageFault"));
    options.collapse_lists.modules.insert(String::from("ntdll"));
    options
        .collapse_lists
        .modules
        .insert(String::from("kernel32"));

    // Without collapsing: the shape is untouched.
    let mut db = Database::new();
    db.load_from_archive(&mut MemoryArchive::new(entries), &options)
        .unwrap();
    assert_eq!(vec![1, 2, 3, 4, 5], db.call_stacks()[0].addresses);

    // With collapsing: the kernel leaf clears the prefix, then the OS
    // root frames are stripped down to two frames.
    options.collapse_os_calls = true;
    db.load_from_archive(&mut MemoryArchive::new(entries), &options)
        .unwrap();
    assert_eq!(vec![2, 3], db.call_stacks()[0].addresses);
    assert_eq!(2.0, db.call_stacks()[0].samplecount);
    // Symbol identities did not change with the policy.
    assert_eq!(5, db.symbols().len());
}

#[test]
fn test_reload_without_path_errors() {
    let mut db = Database::new();
    let err = db.reload(&LoadOptions::default()).unwrap_err();
    assert!(err.to_string().contains("no capture archive"));
}

struct PatchingResolver;

impl DeferredSymbolResolver for PatchingResolver {
    fn resolve(&mut self, address: u64) -> ResolvedFrame {
        if address == 1 {
            ResolvedFrame {
                procedure: Some(String::from("f_patched")),
                source_line: Some(99),
                ..ResolvedFrame::default()
            }
        } else {
            ResolvedFrame::default()
        }
    }
}

struct PatchingProvider;

impl ResolverProvider for PatchingProvider {
    fn open_image(
        &self,
        image_path: &std::path::Path,
        _delete_when_done: bool,
    ) -> anyhow::Result<Box<dyn DeferredSymbolResolver>> {
        anyhow::ensure!(image_path.exists(), "staged image missing");
        Ok(Box::new(PatchingResolver))
    }
}

struct FailingProvider;

impl ResolverProvider for FailingProvider {
    fn open_image(
        &self,
        _image_path: &std::path::Path,
        _delete_when_done: bool,
    ) -> anyhow::Result<Box<dyn DeferredSymbolResolver>> {
        anyhow::bail!("no debugger available")
    }
}

fn archive_with_image() -> MemoryArchive {
    let mut archive = basic_archive();
    archive.push("minidump.dmp", b"\x4d\x44\x4d\x50fake image");
    archive
}

#[test]
fn test_memory_image_recorded_but_not_loaded_by_default() {
    let mut db = Database::with_resolver_provider(Box::new(PatchingProvider));
    let summary = db
        .load_from_archive(&mut archive_with_image(), &LoadOptions::default())
        .unwrap();
    assert!(db.has_memory_image());
    assert!(!summary.deferred_resolver_active);
    // Primary record untouched.
    assert_eq!("f", db.symbol_name(db.addr_info(1).unwrap().symbol));
}

#[test]
fn test_deferred_resolver_overrides_primary_fields() {
    let mut db = Database::with_resolver_provider(Box::new(PatchingProvider));
    let options = LoadOptions {
        load_memory_image: true,
        ..LoadOptions::default()
    };
    let summary = db
        .load_from_archive(&mut archive_with_image(), &options)
        .unwrap();
    assert!(summary.deferred_resolver_active);
    let info = db.addr_info(1).unwrap();
    assert_eq!("f_patched", db.symbol_name(info.symbol));
    assert_eq!(99, info.line);
    // Address 2 fell back to its primary record.
    assert_eq!("g", db.symbol_name(db.addr_info(2).unwrap().symbol));
}

#[test]
fn test_resolver_construction_failure_is_advisory() {
    let mut db = Database::with_resolver_provider(Box::new(FailingProvider));
    let options = LoadOptions {
        load_memory_image: true,
        ..LoadOptions::default()
    };
    let summary = db
        .load_from_archive(&mut archive_with_image(), &options)
        .unwrap();
    assert!(!summary.deferred_resolver_active);
    assert_eq!("f", db.symbol_name(db.addr_info(1).unwrap().symbol));
}

#[test]
fn test_empty_queries_for_absent_data() {
    let (db, _) = load(&mut basic_archive());
    let f = symbol_named(&db, "f");
    // A file with no samples yields an empty dense vector.
    let g_file = db.find_file("g.c").unwrap();
    assert!(db.line_counts(g_file).iter().all(|c| *c == 0.0));
    // Leaf has no callees.
    assert!(db.callees(f).is_empty());
}

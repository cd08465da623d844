// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use anyhow::Context;
use clap::Parser;
use siesta_capture::collections::identifiable::{Id, SymbolId};
use siesta_capture::model::List;
use siesta_capture::{CollapseLists, Database, LoadOptions};
use std::path::PathBuf;

/// Loads a siesta capture archive and prints hot-path reports.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the capture archive.
    input: PathBuf,

    /// Number of rows to print per list.
    #[arg(long, default_value_t = 20)]
    top: usize,

    /// Collapse OS/kernel frames using the configured deny-lists.
    #[arg(long)]
    collapse_os_calls: bool,

    /// Attach the embedded memory image for deferred resolution.
    #[arg(long)]
    load_memory_image: bool,

    /// JSON file with the collapse deny-lists:
    /// {"functions": [...], "modules": [...]}.
    #[arg(long)]
    collapse_config: Option<PathBuf>,

    /// Also print the callers of the named procedure.
    #[arg(long)]
    callers: Option<String>,

    /// Also print the callees of the named procedure.
    #[arg(long)]
    callees: Option<String>,

    /// Also print per-line sample counts for the named source file.
    #[arg(long)]
    lines: Option<String>,
}

fn collapse_lists(args: &Args) -> anyhow::Result<CollapseLists> {
    match &args.collapse_config {
        None => Ok(CollapseLists::default()),
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("bad collapse config {}", path.display()))
        }
    }
}

fn find_symbol(db: &Database, name: &str) -> anyhow::Result<SymbolId> {
    db.symbols()
        .iter()
        .position(|s| db.procedure_name(s.name) == name)
        .map(SymbolId::from_offset)
        .with_context(|| format!("no procedure named {name:?} in this capture"))
}

fn print_list(db: &Database, list: &List, top: usize) {
    println!(
        "{:>12} {:>12} {:>7}  {}",
        "inclusive", "exclusive", "%", "procedure"
    );
    for item in list.items.iter().take(top) {
        let symbol = db.symbol(item.symbol);
        let share = if list.totalcount != 0.0 {
            100.0 * item.inclusive / list.totalcount
        } else {
            0.0
        };
        println!(
            "{:>12.1} {:>12.1} {:>6.1}%  {} ({})",
            item.inclusive,
            item.exclusive,
            share,
            db.procedure_name(symbol.name),
            db.module_name(symbol.module),
        );
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let options = LoadOptions {
        collapse_os_calls: args.collapse_os_calls,
        load_memory_image: args.load_memory_image,
        collapse_lists: collapse_lists(&args)?,
    };

    let mut db = Database::new();
    let summary = db.load_from_path(&args.input, &options)?;

    println!("capture: {}", args.input.display());
    println!("samples: {}", db.total_samples());
    println!("symbols: {}", db.symbols().len());
    println!("stacks:  {}", db.call_stacks().len());
    if db.has_memory_image() && !summary.deferred_resolver_active {
        println!("note: archive carries a memory image (reload with --load-memory-image)");
    }
    if summary.duplicate_symbol_addresses > 0 {
        println!(
            "note: {} duplicate symbol addresses dropped",
            summary.duplicate_symbol_addresses
        );
    }
    for line in db.stats() {
        println!("stats: {line}");
    }

    println!("\nhot procedures");
    print_list(&db, db.main_list(), args.top);

    if let Some(name) = &args.callers {
        let symbol = find_symbol(&db, name)?;
        println!("\ncallers of {name}");
        print_list(&db, &db.callers(symbol), args.top);
    }

    if let Some(name) = &args.callees {
        let symbol = find_symbol(&db, name)?;
        println!("\ncallees of {name}");
        print_list(&db, &db.callees(symbol), args.top);
    }

    if let Some(file) = &args.lines {
        let id = db
            .find_file(file)
            .with_context(|| format!("no source file named {file:?} in this capture"))?;
        println!("\nline counts for {file}");
        for (line, count) in db.line_counts(id).iter().enumerate() {
            if *count != 0.0 {
                println!("{line:>6}: {count:.1}");
            }
        }
    }

    Ok(())
}

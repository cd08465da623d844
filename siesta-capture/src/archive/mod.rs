// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The boundary to the capture container: the database consumes named
//! entries with byte payloads and never sees container internals. The
//! production adapter reads the zip-based archive the sampler writes;
//! tests inject in-memory archives through the same trait.

pub mod zip;

pub use self::zip::ZipCaptureArchive;

/// Capture-format version this engine understands. The sampler stamps
/// the archive with a marker entry named `Version {N} required`.
pub const FILE_VERSION: &str = "0.90";

/// Symbol table: one record per sampled address.
pub const ENTRY_SYMBOLS: &str = "Symbols.txt";
/// Per-address sample counts, preceded by the total sample count.
pub const ENTRY_IP_COUNTS: &str = "IPCounts.txt";
/// Raw call stacks: `samplecount addr addr ...`, one stack per line.
pub const ENTRY_CALLSTACKS: &str = "Callstacks.txt";
/// Free-form capture statistics, passed through verbatim.
pub const ENTRY_STATS: &str = "Stats.txt";
/// Optional memory-image payload for deferred symbol resolution.
pub const ENTRY_MINIDUMP: &str = "minidump.dmp";

const VERSION_PREFIX: &str = "Version ";
const VERSION_SUFFIX: &str = " required";

/// Extracts the version token from a `Version {N} required` marker
/// entry name, or None if the name is not a version marker.
pub fn version_token(entry_name: &str) -> Option<&str> {
    entry_name
        .strip_prefix(VERSION_PREFIX)?
        .strip_suffix(VERSION_SUFFIX)
}

/// The name the sampler gives the version marker for a given format
/// version.
pub fn version_entry_name(version: &str) -> String {
    format!("{VERSION_PREFIX}{version}{VERSION_SUFFIX}")
}

/// A finished capture container: named entries, each with a byte
/// payload. Entry names are matched exactly and case-sensitively; the
/// order entries are yielded in carries no meaning.
pub trait CaptureArchive {
    /// All entry names, in container order.
    fn entry_names(&self) -> Vec<String>;

    /// Reads the full payload of one entry.
    fn read_entry(&mut self, name: &str) -> anyhow::Result<Vec<u8>>;
}

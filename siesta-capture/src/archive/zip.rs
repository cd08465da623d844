// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::CaptureArchive;
use anyhow::Context;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

/// Production adapter over the compressed container the sampler
/// serializes captures into.
pub struct ZipCaptureArchive<R: Read + Seek> {
    inner: zip::ZipArchive<R>,
}

impl ZipCaptureArchive<File> {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open capture archive {}", path.display()))?;
        Self::new(file)
            .with_context(|| format!("malformed capture archive {}", path.display()))
    }
}

impl<R: Read + Seek> ZipCaptureArchive<R> {
    pub fn new(reader: R) -> anyhow::Result<Self> {
        let inner = zip::ZipArchive::new(reader).context("failed to read container directory")?;
        Ok(Self { inner })
    }
}

impl<R: Read + Seek> CaptureArchive for ZipCaptureArchive<R> {
    fn entry_names(&self) -> Vec<String> {
        self.inner.file_names().map(String::from).collect()
    }

    fn read_entry(&mut self, name: &str) -> anyhow::Result<Vec<u8>> {
        let mut entry = self
            .inner
            .by_name(name)
            .with_context(|| format!("no entry named {name:?} in capture archive"))?;
        let mut payload = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut payload)
            .with_context(|| format!("failed to decompress entry {name:?}"))?;
        Ok(payload)
    }
}

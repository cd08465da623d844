// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Text decoding for archive entries. The symbol table is written by
//! samplers on multiple platforms and may carry a UTF-8 or UTF-16 byte
//! order mark; other text entries use the archive's default narrow
//! convention and are decoded as UTF-8, replacing invalid sequences.

use anyhow::ensure;

const BOM_UTF8: &[u8] = &[0xEF, 0xBB, 0xBF];
const BOM_UTF16_LE: &[u8] = &[0xFF, 0xFE];
const BOM_UTF16_BE: &[u8] = &[0xFE, 0xFF];

/// Decodes an entry whose encoding is auto-detected from its byte
/// order mark, falling back to UTF-8 without one.
pub fn decode_auto(payload: &[u8]) -> anyhow::Result<String> {
    if let Some(rest) = payload.strip_prefix(BOM_UTF8) {
        return Ok(String::from_utf8_lossy(rest).into_owned());
    }
    if let Some(rest) = payload.strip_prefix(BOM_UTF16_LE) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = payload.strip_prefix(BOM_UTF16_BE) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    Ok(String::from_utf8_lossy(payload).into_owned())
}

/// Decodes an entry using the archive's default narrow convention.
pub fn decode_narrow(payload: &[u8]) -> String {
    let payload = payload.strip_prefix(BOM_UTF8).unwrap_or(payload);
    String::from_utf8_lossy(payload).into_owned()
}

fn decode_utf16(payload: &[u8], unpack: fn([u8; 2]) -> u16) -> anyhow::Result<String> {
    ensure!(
        payload.len() % 2 == 0,
        "UTF-16 text entry has an odd byte length ({})",
        payload.len()
    );
    let units: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| unpack([pair[0], pair[1]]))
        .collect();
    Ok(char::decode_utf16(units.into_iter())
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

/// Iterates logical lines, tolerating both `\n` and `\r\n` endings.
pub fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(|line| line.trim_end_matches('\r'))
}

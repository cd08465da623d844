// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line parsers for the text entries of a capture archive. A line
//! with tokens left over after its expected fields is a format error,
//! which fails the whole ingestion pass.

use crate::normalize::RawStack;
use anyhow::{bail, ensure, Context};

/// One `Symbols.txt` record: a sampled address and the primary symbol
/// information the sampler serialized for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolRecord<'a> {
    pub address: u64,
    pub module: &'a str,
    pub procedure: &'a str,
    pub source_file: &'a str,
    pub line: u32,
}

/// Addresses are hexadecimal without a required prefix, parsed as
/// 64-bit unsigned integers.
pub fn parse_address(token: &str) -> anyhow::Result<u64> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u64::from_str_radix(digits, 16).with_context(|| format!("bad address token {token:?}"))
}

/// Splits a record line into whitespace-separated tokens, where a
/// token starting with `"` runs to the closing quote and may contain
/// spaces.
struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Tokens<'a> {
    fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    fn next(&mut self) -> anyhow::Result<Option<&'a str>> {
        self.rest = self.rest.trim_start();
        if self.rest.is_empty() {
            return Ok(None);
        }
        if let Some(quoted) = self.rest.strip_prefix('"') {
            let Some(end) = quoted.find('"') else {
                bail!("unterminated quoted field");
            };
            self.rest = &quoted[end + 1..];
            return Ok(Some(&quoted[..end]));
        }
        let end = self
            .rest
            .find(char::is_whitespace)
            .unwrap_or(self.rest.len());
        let token = &self.rest[..end];
        self.rest = &self.rest[end..];
        Ok(Some(token))
    }

    fn expect(&mut self, what: &str) -> anyhow::Result<&'a str> {
        match self.next()? {
            Some(token) => Ok(token),
            None => bail!("missing {what} field"),
        }
    }

    fn expect_end(&mut self) -> anyhow::Result<()> {
        if let Some(extra) = self.next()? {
            bail!("unexpected trailing token {extra:?}");
        }
        Ok(())
    }
}

/// Parses `addr "module" "procedure" "sourcefile" line`.
pub fn parse_symbol_line(line: &str) -> anyhow::Result<SymbolRecord<'_>> {
    let mut tokens = Tokens::new(line);
    let address = parse_address(tokens.expect("address")?)?;
    let module = tokens.expect("module")?;
    let procedure = tokens.expect("procedure")?;
    let source_file = tokens.expect("source file")?;
    let line_token = tokens.expect("line number")?;
    let line = line_token
        .parse::<u32>()
        .with_context(|| format!("bad line number {line_token:?}"))?;
    tokens.expect_end()?;
    Ok(SymbolRecord {
        address,
        module,
        procedure,
        source_file,
        line,
    })
}

/// Parses one `IPCounts.txt` body line: `addr count`.
pub fn parse_count_line(line: &str) -> anyhow::Result<(u64, f64)> {
    let mut tokens = Tokens::new(line);
    let address = parse_address(tokens.expect("address")?)?;
    let count_token = tokens.expect("sample count")?;
    let count = count_token
        .parse::<f64>()
        .with_context(|| format!("bad sample count {count_token:?}"))?;
    tokens.expect_end()?;
    Ok((address, count))
}

/// Parses one `Callstacks.txt` line: `samplecount addr addr ...`,
/// addresses serialized leaf to root.
pub fn parse_callstack_line(line: &str) -> anyhow::Result<RawStack> {
    let mut tokens = Tokens::new(line);
    let count_token = tokens.expect("sample count")?;
    let samplecount = count_token
        .parse::<f64>()
        .with_context(|| format!("bad sample count {count_token:?}"))?;
    let mut addresses = Vec::new();
    while let Some(token) = tokens.next()? {
        addresses.push(parse_address(token)?);
    }
    ensure!(!addresses.is_empty(), "call-stack record has no addresses");
    Ok(RawStack {
        samplecount,
        addresses,
    })
}

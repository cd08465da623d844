// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::collections::identifiable::SymbolId;
use std::cmp::Ordering;

/// One distinct post-collapse stack shape with its accumulated weight.
///
/// `addresses` and `symbols` are parallel sequences ordered leaf to
/// root: `addresses[0]` is the sampled instruction pointer, the last
/// element is the outermost frame. After the normalization pass merges
/// duplicates, call stacks are immutable.
#[derive(Clone, Debug, PartialEq)]
pub struct CallStack {
    pub addresses: Vec<u64>,
    pub symbols: Vec<SymbolId>,
    pub samplecount: f64,
}

impl CallStack {
    pub fn new(addresses: Vec<u64>, symbols: Vec<SymbolId>, samplecount: f64) -> Self {
        debug_assert_eq!(addresses.len(), symbols.len());
        Self {
            addresses,
            symbols,
            samplecount,
        }
    }

    pub fn leaf(&self) -> Option<SymbolId> {
        self.symbols.first().copied()
    }

    pub fn contains(&self, symbol: SymbolId) -> bool {
        self.symbols.contains(&symbol)
    }

    /// Total order used to make equal shapes adjacent before the merge
    /// pass: shorter stacks first, ties broken by lexicographic address
    /// order. Sample weight does not participate.
    pub fn shape_cmp(&self, other: &Self) -> Ordering {
        self.addresses
            .len()
            .cmp(&other.addresses.len())
            .then_with(|| self.addresses.cmp(&other.addresses))
    }

    pub fn same_shape(&self, other: &Self) -> bool {
        self.addresses == other.addresses
    }
}

// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::collections::identifiable::SymbolId;

/// One row of a derived query result.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ListItem {
    pub symbol: SymbolId,
    /// The address this row was attributed at: a representative call
    /// site for caller/callee queries, the symbol's representative
    /// address for the main list.
    pub address: u64,
    /// Weight of every stack this symbol appeared anywhere in.
    pub inclusive: f64,
    /// Weight of the stacks this symbol was the leaf of.
    pub exclusive: f64,
}

/// An ordered collection of [ListItem]s plus the total weight of the
/// stacks that produced them. Lists are derived on demand from call
/// stack data and never persisted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct List {
    pub items: Vec<ListItem>,
    pub totalcount: f64,
}

impl List {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Descending inclusive count; equal counts keep their
    /// first-encountered order.
    pub fn sort_by_inclusive(&mut self) {
        self.items
            .sort_by(|a, b| b.inclusive.total_cmp(&a.inclusive));
    }
}

/// Accumulates per-symbol rows while scanning call stacks, preserving
/// first-encountered order for stable tie-breaks.
#[derive(Default)]
pub(crate) struct ListBuilder {
    list: List,
    index: crate::collections::identifiable::FxHashMap<SymbolId, usize>,
}

impl ListBuilder {
    pub fn add(&mut self, symbol: SymbolId, address: u64, inclusive: f64, exclusive: f64) {
        let items = &mut self.list.items;
        let offset = *self.index.entry(symbol).or_insert_with(|| {
            items.push(ListItem {
                symbol,
                address,
                inclusive: 0.0,
                exclusive: 0.0,
            });
            items.len() - 1
        });
        items[offset].inclusive += inclusive;
        items[offset].exclusive += exclusive;
    }

    pub fn add_total(&mut self, weight: f64) {
        self.list.totalcount += weight;
    }

    pub fn finish_sorted(mut self) -> List {
        self.list.sort_by_inclusive();
        self.list
    }

    pub fn finish(self) -> List {
        self.list
    }
}

// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::identifiable::{FxIndexSet, Id};
use std::marker::PhantomData;

/// NameTable logically keeps a set of unique strings and provides a dense
/// integer-based identifier to refer to each one. Ids are assigned
/// sequentially from 0 in insertion order; interning is first-occurrence
/// wins, so duplicate names always map to the same id.
///
///     use siesta_capture::collections::identifiable::FileId;
///     use siesta_capture::collections::name_table::NameTable;
///     let mut table: NameTable<FileId> = NameTable::new();
///     let a = table.intern("profiler.cpp");
///     let b = table.intern("main.cpp");
///     let c = table.intern("profiler.cpp");
///     assert_eq!(a, c);
///     assert_ne!(a, b);
///     assert_eq!("main.cpp", table.get(b));
///
#[derive(Debug, Default)]
pub struct NameTable<I: Id> {
    strings: FxIndexSet<Box<str>>,
    _id: PhantomData<I>,
}

impl<I: Id> NameTable<I> {
    pub fn new() -> Self {
        Self {
            strings: FxIndexSet::default(),
            _id: PhantomData,
        }
    }

    /// The current number of strings held in the table.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn intern(&mut self, name: &str) -> I {
        self.intern_full(name).0
    }

    /// Interns the string, returning its id and whether it was newly added.
    pub fn intern_full(&mut self, name: &str) -> (I, bool) {
        match self.strings.get_index_of(name) {
            Some(offset) => (I::from_offset(offset), false),
            None => {
                let (offset, inserted) = self.strings.insert_full(Box::from(name));
                debug_assert!(inserted);
                (I::from_offset(offset), true)
            }
        }
    }

    /// # Panics
    /// The id must come from this table instance; a stale or foreign id is
    /// a contract violation by the caller.
    pub fn get(&self, id: I) -> &str {
        self.strings
            .get_index(id.to_offset())
            .expect("name table id to be in bounds")
    }

    pub fn lookup(&self, name: &str) -> Option<I> {
        self.strings.get_index_of(name).map(I::from_offset)
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &str)> {
        self.strings
            .iter()
            .enumerate()
            .map(|(offset, s)| (I::from_offset(offset), s.as_ref()))
    }

    pub fn clear(&mut self) {
        self.strings.clear();
    }
}

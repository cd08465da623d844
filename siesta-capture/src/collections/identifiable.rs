// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::hash::{BuildHasherDefault, Hash};

pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<rustc_hash::FxHasher>>;
pub type FxIndexSet<K> = indexmap::IndexSet<K, BuildHasherDefault<rustc_hash::FxHasher>>;
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;
pub type FxHashSet<K> = rustc_hash::FxHashSet<K>;

/// A dense, zero-based integer identifier into one of the database's
/// append-only tables. Ids are stable only within one loaded database
/// instance; a reload rebuilds every table and invalidates old handles.
/// Offset 0 is an ordinary id, not a sentinel.
pub trait Id: Copy + Eq + Hash {
    /// Convert from a usize offset into an Id.
    /// # Panics
    /// Panics if the offset cannot fit in the underlying integer type.
    /// This is expected to be ultra-rare (more than u32::MAX items?!).
    fn from_offset(offset: usize) -> Self;

    fn to_offset(self) -> usize;
}

macro_rules! dense_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl Id for $name {
            fn from_offset(offset: usize) -> Self {
                let small: u32 = offset
                    .try_into()
                    .expect(concat!(stringify!($name), " to fit into a u32"));
                Self(small)
            }

            fn to_offset(self) -> usize {
                self.0 as usize
            }
        }
    };
}

dense_id!(
    /// Identifies an interned procedure-name string.
    StringId
);
dense_id!(
    /// Identifies an interned source-file name.
    FileId
);
dense_id!(
    /// Identifies an interned module name.
    ModuleId
);
dense_id!(
    /// Identifies a [crate::model::Symbol] in the database's symbol store.
    SymbolId
);
dense_id!(
    /// Identifies a [crate::model::CallStack] after normalization.
    CallStackId
);

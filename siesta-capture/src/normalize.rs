// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Call-stack normalization: OS-frame collapsing followed by
//! deduplication of identical stack shapes. Collapsing may shorten a
//! stack but never touches its sample weight, and merging only moves
//! weight between records, so total weight is conserved across the
//! whole transform.

/// A parsed call-stack record before deduplication: leaf-first
/// addresses and the record's sample weight.
#[derive(Clone, Debug, PartialEq)]
pub struct RawStack {
    pub samplecount: f64,
    pub addresses: Vec<u64>,
}

/// Collapse flags for one sampled address, looked up through the
/// symbol it resolved to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CollapseFlags {
    pub function: bool,
    pub module: bool,
}

/// Applies the collapse policy to one stack, in place.
///
/// Leaf side: addresses are scanned in serialized leaf-to-root order;
/// a frame whose symbol is a collapse function clears every frame
/// recorded before it, and the frame itself is kept. The whole prefix
/// is dropped, not just the flagged frame.
///
/// Root side: root frames whose symbol sits in a collapse module are
/// stripped while more than two frames remain.
pub fn collapse_stack(addresses: &mut Vec<u64>, flags: impl Fn(u64) -> CollapseFlags) {
    let mut kept = Vec::with_capacity(addresses.len());
    for &address in addresses.iter() {
        if flags(address).function {
            kept.clear();
        }
        kept.push(address);
    }

    while kept.len() > 2 {
        let root = kept[kept.len() - 1];
        if !flags(root).module {
            break;
        }
        kept.pop();
    }

    *addresses = kept;
}

/// Deduplicates stacks of identical shape, accumulating sample weight.
///
/// Shapes are made adjacent by a stable sort ordered primarily by
/// frame count and secondarily by lexicographic address comparison,
/// then merged in a single linear pass. The first-seen record of each
/// shape survives; later duplicates fold their weight into it.
pub fn dedup_merge(mut stacks: Vec<RawStack>) -> Vec<RawStack> {
    stacks.sort_by(|a, b| {
        a.addresses
            .len()
            .cmp(&b.addresses.len())
            .then_with(|| a.addresses.cmp(&b.addresses))
    });

    let mut merged: Vec<RawStack> = Vec::with_capacity(stacks.len());
    for stack in stacks {
        match merged.last_mut() {
            Some(last) if last.addresses == stack.addresses => {
                last.samplecount += stack.samplecount;
            }
            _ => merged.push(stack),
        }
    }
    merged
}

/// The full normalization pass: per-stack collapsing (when enabled)
/// followed by dedup and merge.
pub fn normalize(
    mut stacks: Vec<RawStack>,
    collapse_os_calls: bool,
    flags: impl Fn(u64) -> CollapseFlags,
) -> Vec<RawStack> {
    if collapse_os_calls {
        for stack in stacks.iter_mut() {
            collapse_stack(&mut stack.addresses, &flags);
        }
    }
    dedup_merge(stacks)
}

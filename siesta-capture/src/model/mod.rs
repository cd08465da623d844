// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod call_stack;
mod list;
mod symbol;

pub use call_stack::*;
pub use list::*;
pub use symbol::*;

// SPDX-License-Identifier: MIT

//! State management for graph workflows
//!
//! This module provides:
//! - `StateSchema` - declares every channel, its type and its merge policy
//! - `StateStore` - runtime state storage; `merge` is its only mutator
//! - `Snapshot` - immutable view handed to nodes and routers
//! - `StateDelta` - the partial set of writes a node produces

mod schema;
mod store;

pub use schema::{ChannelDef, FieldType, MergePolicy, StateSchema};
pub use store::{Snapshot, StateDelta, StateStore, Values};

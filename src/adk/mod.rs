// SPDX-License-Identifier: MIT

//! Agent development kit: errors and LLM model adapters shared by the workflow

pub mod error;
pub mod model;

// SPDX-License-Identifier: MIT

pub mod config;
pub mod research;
pub mod server;
pub mod tools;
pub mod workflow;

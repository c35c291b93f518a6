// SPDX-License-Identifier: MIT

//! Progress events published while a run executes

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::executor::RunStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: Uuid,
        graph: String,
    },
    StepStarted {
        step: usize,
        nodes: Vec<String>,
    },
    NodeCompleted {
        step: usize,
        node: String,
        instance: Option<usize>,
    },
    NodeFailed {
        step: usize,
        node: String,
        instance: Option<usize>,
        error: String,
    },
    FanOut {
        source: String,
        targets: Vec<String>,
        count: usize,
    },
    StepMerged {
        step: usize,
        channels: Vec<String>,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
        steps: usize,
    },
}

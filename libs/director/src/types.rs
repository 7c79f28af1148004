//! Director API wire types.

use std::fmt;

use serde::{Deserialize, Serialize};

use consats_manifest::Vm;

/// Response of `GET /info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorInfo {
    pub name: String,
    pub uuid: String,
    pub version: String,
    #[serde(default)]
    pub cpi: Option<String>,
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Processing,
    Cancelling,
    Done,
    Error,
    Cancelled,
    Timeout,
}

impl TaskState {
    /// Returns true once the director will no longer change the task.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::Error | Self::Cancelled | Self::Timeout
        )
    }

    /// Returns true if the task succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Cancelling => "cancelling",
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Response of `GET /tasks/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub state: TaskState,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub deployment: Option<String>,
}

/// One line of a `vms?format=full` task result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInfo {
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub index: Option<u32>,
    pub job_state: String,
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub vm_cid: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

impl VmInfo {
    /// Instance label (`consul_z1/0`), or `-` when the VM has no job yet.
    pub fn instance(&self) -> String {
        match (&self.job_name, self.index) {
            (Some(job), Some(index)) => format!("{}/{}", job, index),
            (Some(job), None) => job.clone(),
            _ => "-".to_string(),
        }
    }
}

impl From<&VmInfo> for Vm {
    fn from(info: &VmInfo) -> Self {
        Vm::new(info.job_state.clone())
    }
}

/// Entry of `GET /releases`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub name: String,
    #[serde(default)]
    pub release_versions: Vec<ReleaseVersion>,
}

/// A version of an uploaded release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseVersion {
    pub version: String,
}

/// Entry of `GET /stemcells`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemcellSummary {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub operating_system: Option<String>,
}

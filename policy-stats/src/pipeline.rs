use std::{collections::HashMap, io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::model::{PolicyReference, RuleMetric, UnsupportedPolicyKind};

/// Failures while reading from the packet-processing pipeline. Any of these
/// aborts the current collection cycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to open pinned map at {path}: {reason}")]
    MapOpen { path: PathBuf, reason: String },

    #[error("failed to read rule metrics: {0}")]
    MapRead(String),

    #[error("failed to read policy table at {path}")]
    PolicyTable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed policy table at {path}")]
    PolicyTableFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    UnsupportedPolicyKind(#[from] UnsupportedPolicyKind),

    #[error("pipeline did not answer within {0:?}")]
    Timeout(Duration),

    #[error("collection task failed: {0}")]
    Join(String),
}

/// The view of the packet-processing pipeline the collector depends on.
pub trait PolicyPipeline: Send + Sync {
    /// Counters of every currently installed rule, keyed by rule id.
    fn network_policy_metrics(&self) -> Result<HashMap<u32, RuleMetric>, PipelineError>;

    /// Owning policy of a rule. `Ok(None)` means the rule has no owner, e.g.
    /// a default allow rule, and is not a failure.
    fn policy_from_conjunction(
        &self,
        rule_id: u32,
    ) -> Result<Option<PolicyReference>, PipelineError>;
}

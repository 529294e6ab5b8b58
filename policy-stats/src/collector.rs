use std::sync::Arc;

use tracing::trace;

use crate::{
    model::StatsCollection,
    pipeline::{PipelineError, PolicyPipeline},
};

/// Folds per-rule counters into per-policy totals.
#[derive(Clone)]
pub struct Collector {
    pipeline: Arc<dyn PolicyPipeline>,
}

impl Collector {
    pub fn new(pipeline: Arc<dyn PolicyPipeline>) -> Self {
        Self { pipeline }
    }

    /// Takes one snapshot of the pipeline's rule counters and sums them per
    /// owning policy. Rules without an owning policy are left out.
    pub fn collect(&self) -> Result<StatsCollection, PipelineError> {
        let rule_metrics = self.pipeline.network_policy_metrics()?;
        let mut collection = StatsCollection::default();

        for (rule_id, metric) in &rule_metrics {
            match self.pipeline.policy_from_conjunction(*rule_id)? {
                Some(policy) => {
                    trace!(rule_id, %policy, "attributing rule counters");
                    collection.add_rule(&policy, metric);
                }
                None => trace!(rule_id, "rule has no owning policy, skipping"),
            }
        }

        Ok(collection)
    }
}

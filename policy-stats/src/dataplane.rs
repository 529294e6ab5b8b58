use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use aya::maps::{Map, MapData, PerCpuHashMap};
use serde::Deserialize;
use tracing::debug;

use policy_stats_common::{RULE_METRICS_MAP, RuleCounters};

use crate::{
    model::{PolicyKind, PolicyReference, RuleMetric, Uid},
    pipeline::{PipelineError, PolicyPipeline},
};

pub const DEFAULT_METRICS_MAP_PIN: &str = "/sys/fs/bpf/policy_stats/policy_rule_metrics";
pub const DEFAULT_POLICY_TABLE: &str = "/var/run/policy-stats/policy-table.json";

/// Pipeline adapter over the pinned per-CPU rule counter map and the
/// rule-to-policy table exported next to it.
///
/// The policy table is reloaded on every metrics fetch, so lookups made
/// during a cycle resolve against the table that matched that cycle's
/// counters.
pub struct PinnedMapPipeline {
    metrics_pin: PathBuf,
    policy_table: PathBuf,
    policies: RwLock<HashMap<u32, PolicyReference>>,
}

impl PinnedMapPipeline {
    pub fn new(metrics_pin: impl Into<PathBuf>, policy_table: impl Into<PathBuf>) -> Self {
        Self {
            metrics_pin: metrics_pin.into(),
            policy_table: policy_table.into(),
            policies: RwLock::new(HashMap::new()),
        }
    }
}

impl PolicyPipeline for PinnedMapPipeline {
    fn network_policy_metrics(&self) -> Result<HashMap<u32, RuleMetric>, PipelineError> {
        let table = load_policy_table(&self.policy_table)?;
        let metrics = read_rule_metrics(&self.metrics_pin)?;
        debug!(
            rules = metrics.len(),
            mapped = table.len(),
            "read {RULE_METRICS_MAP}"
        );
        *self
            .policies
            .write()
            .expect("policy table lock poisoned") = table;
        Ok(metrics)
    }

    fn policy_from_conjunction(
        &self,
        rule_id: u32,
    ) -> Result<Option<PolicyReference>, PipelineError> {
        let policies = self.policies.read().expect("policy table lock poisoned");
        Ok(policies.get(&rule_id).cloned())
    }
}

/// Reads every rule's counters from a pinned per-CPU hash map, summing the
/// per-CPU slots of each rule.
pub fn read_rule_metrics(pin: &Path) -> Result<HashMap<u32, RuleMetric>, PipelineError> {
    let open_err = |reason: String| PipelineError::MapOpen {
        path: pin.to_path_buf(),
        reason,
    };
    let map_data = MapData::from_pin(pin).map_err(|e| open_err(e.to_string()))?;
    let per_cpu_map = PerCpuHashMap::<_, u32, RuleCounters>::try_from(Map::PerCpuHashMap(map_data))
        .map_err(|e| open_err(format!("not a per-cpu hash map: {e}")))?;

    let mut metrics = HashMap::new();
    for item in per_cpu_map.iter() {
        let (rule_id, per_cpu_vals) = item.map_err(|e| PipelineError::MapRead(e.to_string()))?;
        metrics.insert(rule_id, sum_counters(per_cpu_vals.iter()));
    }
    Ok(metrics)
}

fn sum_counters<'a, I>(values: I) -> RuleMetric
where
    I: IntoIterator<Item = &'a RuleCounters>,
{
    let mut metric = RuleMetric::default();
    for v in values {
        metric.merge_cpu(v);
    }
    metric
}

/// One row of the exported policy table, before its kind is checked.
#[derive(Deserialize)]
struct PolicyTableEntry {
    kind: String,
    #[serde(default)]
    namespace: String,
    name: String,
    uid: Uid,
}

/// Loads the `rule id -> policy` table. Rule ids absent from the table are
/// unmapped; an unknown policy kind fails the whole load.
pub fn load_policy_table(path: &Path) -> Result<HashMap<u32, PolicyReference>, PipelineError> {
    let raw = fs::read(path).map_err(|source| PipelineError::PolicyTable {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: HashMap<u32, PolicyTableEntry> =
        serde_json::from_slice(&raw).map_err(|source| PipelineError::PolicyTableFormat {
            path: path.to_path_buf(),
            source,
        })?;

    entries
        .into_iter()
        .map(|(rule_id, entry)| {
            let policy = PolicyReference {
                kind: entry.kind.parse::<PolicyKind>()?,
                namespace: entry.namespace,
                name: entry.name,
                uid: entry.uid,
            };
            Ok((rule_id, policy))
        })
        .collect()
}

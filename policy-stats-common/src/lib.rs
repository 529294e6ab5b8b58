#![no_std]

// Types shared between the dataplane programs that fill the rule counter
// map and the userspace agent that reads it.
// Keep this crate `no_std` friendly so it can be used from eBPF code.

/// Name of the per-CPU hash map holding `u32 rule id -> RuleCounters`.
pub const RULE_METRICS_MAP: &str = "policy_rule_metrics";

/// Counters maintained per enforcement rule, per CPU.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct RuleCounters {
    pub bytes: u64,
    pub packets: u64,
    pub sessions: u64,
}

// With the `user` feature enabled the crate implements `aya::Pod` so the
// counters can be read through aya's typed map APIs. The eBPF side never
// pulls in userspace dependencies.
#[cfg(feature = "user")]
mod user_impls {
    extern crate aya;

    use super::RuleCounters;
    use aya::Pod;

    unsafe impl Pod for RuleCounters {}
}

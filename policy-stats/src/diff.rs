use crate::model::{PolicyStats, StatsMap};

/// Computes what each policy in `current` gained since `previous`.
///
/// Policies missing from `previous` report their full totals. Counters that
/// went backwards are treated as reset and report their current value.
/// Policies without any change, and policies only present in `previous`,
/// are left out. The order of the result is unspecified.
pub fn calculate_diff(current: &StatsMap, previous: &StatsMap) -> Vec<PolicyStats> {
    current
        .iter()
        .filter_map(|(uid, cur)| {
            let traffic = match previous.get(uid) {
                Some(last) => cur.traffic.delta_since(&last.traffic),
                None => cur.traffic,
            };
            if traffic.is_zero() {
                return None;
            }
            Some(PolicyStats {
                policy: cur.policy.clone(),
                traffic,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::tests::{np1, np2, stats_map};
    use crate::model::{PolicyReference, TrafficStats};

    fn sorted(mut stats: Vec<PolicyStats>) -> Vec<PolicyStats> {
        stats.sort_by(|a, b| a.policy.uid.cmp(&b.policy.uid));
        stats
    }

    fn entry(policy: PolicyReference, traffic: TrafficStats) -> PolicyStats {
        PolicyStats { policy, traffic }
    }

    #[test]
    fn new_and_existing_policies() {
        let last = stats_map(&[(np1(), TrafficStats::new(1, 1, 1))]);
        let cur = stats_map(&[
            (np1(), TrafficStats::new(25, 3, 2)),
            (np2(), TrafficStats::new(30, 5, 3)),
        ]);
        assert_eq!(
            sorted(calculate_diff(&cur, &last)),
            vec![
                entry(np1(), TrafficStats::new(24, 2, 1)),
                entry(np2(), TrafficStats::new(30, 5, 3)),
            ]
        );
    }

    #[test]
    fn unchanged_policies_are_omitted() {
        let stats = stats_map(&[
            (np1(), TrafficStats::new(1, 1, 1)),
            (np2(), TrafficStats::new(0, 0, 0)),
        ]);
        assert!(calculate_diff(&stats, &stats.clone()).is_empty());
    }

    #[test]
    fn regressed_counters_report_current_values() {
        let last = stats_map(&[
            (np1(), TrafficStats::new(10, 10, 10)),
            (np2(), TrafficStats::new(5, 5, 5)),
        ]);
        let cur = stats_map(&[
            (np1(), TrafficStats::new(3, 3, 3)),
            (np2(), TrafficStats::new(1, 1, 1)),
        ]);
        assert_eq!(
            sorted(calculate_diff(&cur, &last)),
            vec![
                entry(np1(), TrafficStats::new(3, 3, 3)),
                entry(np2(), TrafficStats::new(1, 1, 1)),
            ]
        );
    }

    #[test]
    fn reset_is_detected_per_field() {
        let last = stats_map(&[(np1(), TrafficStats::new(100, 10, 4))]);
        let cur = stats_map(&[(np1(), TrafficStats::new(40, 12, 4))]);
        assert_eq!(
            calculate_diff(&cur, &last),
            vec![entry(np1(), TrafficStats::new(40, 2, 0))]
        );
    }

    #[test]
    fn empty_baseline_reports_full_totals() {
        let cur = stats_map(&[
            (np1(), TrafficStats::new(25, 3, 2)),
            (np2(), TrafficStats::new(30, 5, 3)),
        ]);
        assert_eq!(
            sorted(calculate_diff(&cur, &StatsMap::new())),
            vec![
                entry(np1(), TrafficStats::new(25, 3, 2)),
                entry(np2(), TrafficStats::new(30, 5, 3)),
            ]
        );
    }

    #[test]
    fn policies_gone_from_current_are_not_reported() {
        let last = stats_map(&[
            (np1(), TrafficStats::new(1, 1, 1)),
            (np2(), TrafficStats::new(9, 9, 9)),
        ]);
        let cur = stats_map(&[(np1(), TrafficStats::new(2, 2, 2))]);
        assert_eq!(
            calculate_diff(&cur, &last),
            vec![entry(np1(), TrafficStats::new(1, 1, 1))]
        );
    }
}

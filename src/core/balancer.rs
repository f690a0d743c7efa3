//! Round-robin selection over a group's eligible instances.
//!
//! An instance is eligible iff it is alive and its breaker admits traffic
//! (closed or half-open; an open breaker past its cooldown flips to half-open
//! during the check). The group's cursor advances over the *full* instance
//! list by stable position, skipping ineligible instances, so the rotation
//! stays invariant when eligibility flips between calls: a recovering
//! instance rejoins at its original slot instead of shifting everyone else.
use std::{sync::Arc, time::Duration};

use crate::core::registry::{ServiceGroup, ServiceInstance};

/// Pick the next eligible instance of `group`, or `None` when every instance
/// is down or circuit-open (caller responds "service unavailable").
///
/// Pre-increment semantics: the cursor advances before the position is read,
/// so a fresh two-instance group yields the second instance first.
pub fn select_instance(
    group: &ServiceGroup,
    breaker_cooldown: Duration,
) -> Option<Arc<ServiceInstance>> {
    let instances = group.instances();
    let len = instances.len();
    if len == 0 {
        return None;
    }

    // Each probe advances the cursor by one; after `len` probes every stable
    // position has been considered once.
    for _ in 0..len {
        let position = (group
            .cursor()
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1)
            % len;
        let candidate = &instances[position];
        if candidate.is_eligible(breaker_cooldown) {
            return Some(candidate.clone());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceGroupConfig;

    const COOLDOWN: Duration = Duration::from_secs(30);

    fn group_with_targets(targets: &[&str]) -> ServiceGroup {
        ServiceGroup::from_config(&ServiceGroupConfig {
            name: "test".to_string(),
            prefix: "/api".to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            auth_required: false,
            cache: None,
        })
        .unwrap()
    }

    fn addresses(group: &ServiceGroup, picks: usize) -> Vec<String> {
        (0..picks)
            .map(|_| {
                select_instance(group, COOLDOWN)
                    .expect("an instance should be eligible")
                    .address()
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_rotates_in_original_order_starting_at_second() {
        let group = group_with_targets(&["http://s1", "http://s2"]);
        assert_eq!(
            addresses(&group, 3),
            vec!["http://s2", "http://s1", "http://s2"]
        );
    }

    #[test]
    fn test_visits_each_eligible_instance_once_per_cycle() {
        let group = group_with_targets(&["http://s1", "http://s2", "http://s3"]);
        let picks = addresses(&group, 6);
        assert_eq!(picks[..3], picks[3..]);
        let mut cycle = picks[..3].to_vec();
        cycle.sort();
        assert_eq!(cycle, vec!["http://s1", "http://s2", "http://s3"]);
    }

    #[test]
    fn test_skips_dead_instance() {
        let group = group_with_targets(&["http://s1", "http://s2", "http://s3"]);
        group.instances()[1].set_alive(false);

        let picks = addresses(&group, 4);
        assert!(!picks.contains(&"http://s2".to_string()));
        assert_eq!(
            picks,
            vec!["http://s3", "http://s1", "http://s3", "http://s1"]
        );
    }

    #[test]
    fn test_skips_open_breaker() {
        let group = group_with_targets(&["http://s1", "http://s2"]);
        let s2 = &group.instances()[1];
        for _ in 0..4 {
            s2.breaker.record_failure(3);
        }

        let picks = addresses(&group, 2);
        assert_eq!(picks, vec!["http://s1", "http://s1"]);
    }

    #[test]
    fn test_returns_none_when_no_instance_eligible() {
        let group = group_with_targets(&["http://s1", "http://s2"]);
        for instance in group.instances() {
            instance.set_alive(false);
        }
        assert!(select_instance(&group, COOLDOWN).is_none());
    }

    #[test]
    fn test_recovered_instance_rejoins_at_stable_slot() {
        let group = group_with_targets(&["http://s1", "http://s2", "http://s3"]);
        group.instances()[2].set_alive(false);

        // Rotation over the survivors
        assert_eq!(addresses(&group, 2), vec!["http://s2", "http://s1"]);

        // s3 comes back; the cursor keeps walking stable positions, so the
        // full cycle resumes with each instance visited exactly once.
        group.instances()[2].set_alive(true);
        assert_eq!(
            addresses(&group, 3),
            vec!["http://s2", "http://s3", "http://s1"]
        );
    }

    #[test]
    fn test_separate_groups_have_independent_cursors() {
        let group_a = group_with_targets(&["http://a1", "http://a2"]);
        let group_b = group_with_targets(&["http://b1", "http://b2"]);

        assert_eq!(addresses(&group_a, 1), vec!["http://a2"]);
        assert_eq!(addresses(&group_a, 1), vec!["http://a1"]);
        // Group B's cursor is untouched by group A's selections
        assert_eq!(addresses(&group_b, 1), vec!["http://b2"]);
    }
}

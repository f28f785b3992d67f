//! The scaling decision.
//!
//! Pure function of (pending jobs, per-agent concurrency, registry
//! snapshot, pool policy, now). Given the same inputs it always yields the
//! same [`Decision`], which is what lets every tick recompute from scratch
//! instead of carrying state between ticks.
//!
//! ```text
//! desired = clamp(round(pending / concurrency), min, max)
//!
//! if desired > current and current < max:
//!     create min(desired, max) - current
//! elif desired < current and current > min:
//!     destroy current - max(desired, min), oldest Running first,
//!     skipping anything younger than min_age
//! ```

use fleet_core::PoolPolicy;
use fleet_registry::{Instance, InstanceName};

/// What a tick should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleAction {
    /// Pool is where it should be (or nothing eligible can change).
    NoChange,
    /// Provision this many new agents.
    Create(u32),
    /// Decommission these agents, oldest first.
    Destroy(Vec<InstanceName>),
}

/// A decision together with the measurements it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub pending: u32,
    pub concurrency: u32,
    /// Active (`Creating` + `Running`) instances.
    pub current_count: u32,
    /// Sum of the active instances' stored capacity.
    pub current_capacity: u32,
    /// Target agent count after clamping to the pool bounds.
    pub desired_count: u32,
    pub action: ScaleAction,
    /// Destructions wanted but held back by the minimum-age guard.
    pub deferred: u32,
}

/// Decide how to move the pool toward demand.
///
/// `concurrency` must be non-zero. `policy` is expected to come from
/// `FleetConfig::pool_policy`; if `min > max` anyway, `max` bounds the pool.
pub fn decide(
    pending: u32,
    concurrency: u32,
    instances: &[Instance],
    policy: &PoolPolicy,
    now: u64,
) -> Decision {
    let active: Vec<&Instance> = instances.iter().filter(|i| i.state.is_active()).collect();
    let current_count = active.len() as u32;
    let current_capacity: u32 = active
        .iter()
        .map(|i| i.effective_capacity(concurrency))
        .sum();

    // An unchecked policy with min > max must not panic `clamp`; max wins.
    let max = policy.max;
    let min = policy.min.min(max);
    let desired_count = policy.rounding.agents_for(pending, concurrency).clamp(min, max);

    let mut deferred = 0;
    let action = if desired_count > current_count && current_count < max {
        ScaleAction::Create(desired_count.min(max) - current_count)
    } else if desired_count < current_count && current_count > min {
        let wanted = current_count - desired_count.max(min);

        let mut candidates: Vec<&Instance> = active
            .into_iter()
            .filter(|i| i.is_destroyable(now, policy.min_age))
            .collect();
        candidates.sort_by_key(|i| (i.created_at, i.seq));

        let chosen: Vec<InstanceName> = candidates
            .into_iter()
            .take(wanted as usize)
            .map(|i| i.name.clone())
            .collect();
        deferred = wanted - chosen.len() as u32;

        if chosen.is_empty() {
            ScaleAction::NoChange
        } else {
            ScaleAction::Destroy(chosen)
        }
    } else {
        ScaleAction::NoChange
    };

    Decision {
        pending,
        concurrency,
        current_count,
        current_capacity,
        desired_count,
        action,
        deferred,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::RoundingPolicy;
    use fleet_registry::InstanceState;
    use std::time::Duration;

    const NOW: u64 = 100_000;
    const HOUR: u64 = 3_600;

    fn policy(min: u32, max: u32) -> PoolPolicy {
        PoolPolicy {
            min,
            max,
            min_age: Duration::from_secs(HOUR),
            rounding: RoundingPolicy::Ceil,
        }
    }

    fn instance(name: &str, state: InstanceState, created_at: u64) -> Instance {
        let mut inst = Instance::new(name, 2, created_at);
        inst.state = state;
        inst
    }

    fn running(name: &str, age: u64) -> Instance {
        instance(name, InstanceState::Running, NOW - age)
    }

    #[test]
    fn scale_up_clamped_to_max() {
        // P=10, C=2 → 5 wanted, max 4, two active.
        let pool = vec![running("a", 10), running("b", 10)];
        let d = decide(10, 2, &pool, &policy(2, 4), NOW);

        assert_eq!(d.desired_count, 4);
        assert_eq!(d.current_count, 2);
        assert_eq!(d.current_capacity, 4);
        assert_eq!(d.action, ScaleAction::Create(2));
    }

    #[test]
    fn scale_down_oldest_first() {
        let pool = vec![
            running("young-ish", 2 * HOUR),
            running("oldest", 9 * HOUR),
            running("newest", HOUR + 5),
            running("older", 5 * HOUR),
        ];
        let d = decide(0, 2, &pool, &policy(2, 4), NOW);

        assert_eq!(d.desired_count, 2);
        assert_eq!(
            d.action,
            ScaleAction::Destroy(vec!["oldest".to_string(), "older".to_string()])
        );
        assert_eq!(d.deferred, 0);
    }

    #[test]
    fn no_change_when_capacity_suffices() {
        // P=3, C=2 → ceil = 2, already 2 active.
        let pool = vec![running("a", 10), running("b", 10)];
        let d = decide(3, 2, &pool, &policy(1, 4), NOW);
        assert_eq!(d.desired_count, 2);
        assert_eq!(d.action, ScaleAction::NoChange);
    }

    #[test]
    fn error_and_stopped_records_do_not_count() {
        let pool = vec![
            running("a", 10),
            instance("b", InstanceState::Error, NOW - 10),
            instance("c", InstanceState::Stopped, NOW - 10),
            instance("d", InstanceState::Stopping, NOW - 10),
        ];
        let d = decide(4, 2, &pool, &policy(0, 4), NOW);
        assert_eq!(d.current_count, 1);
        assert_eq!(d.action, ScaleAction::Create(1));
    }

    #[test]
    fn creating_counts_as_active() {
        let pool = vec![
            running("a", 10),
            instance("b", InstanceState::Creating, NOW - 1),
        ];
        let d = decide(4, 2, &pool, &policy(0, 4), NOW);
        assert_eq!(d.current_count, 2);
        assert_eq!(d.action, ScaleAction::NoChange);
    }

    #[test]
    fn age_guard_limits_destruction() {
        // All three should go; only two are at least an hour old.
        let pool = vec![
            running("old", 2 * HOUR),
            running("young", 60),
            running("exact", HOUR),
        ];
        let d = decide(0, 2, &pool, &policy(0, 4), NOW);

        assert_eq!(d.desired_count, 0);
        assert_eq!(
            d.action,
            ScaleAction::Destroy(vec!["old".to_string(), "exact".to_string()])
        );
        assert_eq!(d.deferred, 1);
    }

    #[test]
    fn nothing_eligible_means_no_change() {
        let pool = vec![running("a", 60), running("b", 120), running("c", 5)];
        let d = decide(0, 2, &pool, &policy(1, 4), NOW);
        assert_eq!(d.action, ScaleAction::NoChange);
        assert_eq!(d.deferred, 2);
    }

    #[test]
    fn creating_instances_are_never_destroyed() {
        let pool = vec![
            instance("booting", InstanceState::Creating, NOW - 5 * HOUR),
            running("a", 2 * HOUR),
        ];
        let d = decide(0, 2, &pool, &policy(0, 4), NOW);
        assert_eq!(d.action, ScaleAction::Destroy(vec!["a".to_string()]));
        assert_eq!(d.deferred, 1);
    }

    #[test]
    fn below_min_scales_up_without_demand() {
        let d = decide(0, 2, &[], &policy(2, 4), NOW);
        assert_eq!(d.desired_count, 2);
        assert_eq!(d.action, ScaleAction::Create(2));
    }

    #[test]
    fn above_max_scales_down_even_with_demand() {
        let pool: Vec<_> = (0..5).map(|i| running(&format!("a{i}"), 2 * HOUR + i)).collect();
        let d = decide(100, 2, &pool, &policy(1, 3), NOW);
        assert_eq!(d.desired_count, 3);
        assert_eq!(
            d.action,
            ScaleAction::Destroy(vec!["a4".to_string(), "a3".to_string()])
        );
    }

    #[test]
    fn ties_on_created_at_break_by_insertion() {
        let mut a = running("a", 2 * HOUR);
        let mut b = running("b", 2 * HOUR);
        a.seq = 7;
        b.seq = 3;
        let d = decide(0, 2, &[a, b], &policy(1, 4), NOW);
        assert_eq!(d.action, ScaleAction::Destroy(vec!["b".to_string()]));
    }

    #[test]
    fn floor_rounding_is_less_eager() {
        let mut p = policy(0, 10);
        p.rounding = RoundingPolicy::Floor;
        let d = decide(5, 2, &[], &p, NOW);
        assert_eq!(d.desired_count, 2);
        assert_eq!(d.action, ScaleAction::Create(2));
    }

    #[test]
    fn capacity_uses_stored_value() {
        let mut big = running("big", 10);
        big.capacity = 8;
        let legacy = {
            let mut i = running("legacy", 10);
            i.capacity = 0;
            i
        };
        let d = decide(0, 2, &[big, legacy], &policy(2, 4), NOW);
        assert_eq!(d.current_capacity, 10);
    }

    #[test]
    fn decision_is_idempotent() {
        let pool = vec![
            running("a", 3 * HOUR),
            running("b", 2 * HOUR),
            running("c", 30),
            instance("d", InstanceState::Error, NOW - 10),
        ];
        for pending in [0, 1, 5, 9, 40] {
            let first = decide(pending, 2, &pool, &policy(1, 5), NOW);
            let second = decide(pending, 2, &pool, &policy(1, 5), NOW);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn inverted_bounds_do_not_panic() {
        let pool = vec![running("a", 2 * HOUR), running("b", 2 * HOUR), running("c", 2 * HOUR)];
        let d = decide(0, 2, &pool, &policy(5, 2), NOW);
        assert_eq!(d.desired_count, 2);
        assert_eq!(d.action, ScaleAction::Destroy(vec!["a".to_string()]));

        let d = decide(40, 2, &[], &policy(5, 2), NOW);
        assert_eq!(d.desired_count, 2);
        assert_eq!(d.action, ScaleAction::Create(2));
    }
}

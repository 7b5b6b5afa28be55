//! Bounded act-and-remeasure loop shared by expansion and pagination.

use crate::error::DriverError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::trace;

/// Budget for a settle loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    /// Maximum number of actions
    pub max_attempts: u32,
    /// Wait after each action before measuring again
    pub settle_delay: Duration,
}

/// What a verdict decided after a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Settled,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The verdict declared the value stable.
    Stable,
    /// The action had nothing to act on.
    NoAffordance,
    /// `max_attempts` actions were spent.
    BudgetExhausted,
}

/// Final measurement of a settle loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<T> {
    pub value: T,
    /// Actions that were dispatched
    pub interactions: u32,
    pub reason: StopReason,
}

/// Something that can be measured and acted upon.
#[async_trait]
pub trait Probe: Send {
    type Value: Send + Sync;

    /// Measures the current value.
    async fn read(&mut self) -> Result<Self::Value, DriverError>;

    /// Performs the action. Returns `false` when there was nothing to act on.
    async fn act(&mut self) -> Result<bool, DriverError>;
}

/// Acts and re-measures until the verdict settles, the action has no target
/// or the budget runs out.
///
/// The verdict sees `(None, initial)` once before any action, then
/// `(Some(before), after)` after each action. Actions never exceed
/// `policy.max_attempts`.
pub async fn retry_until_stable<P, F>(
    probe: &mut P,
    policy: SettlePolicy,
    mut verdict: F,
) -> Result<Settled<P::Value>, DriverError>
where
    P: Probe + ?Sized,
    F: FnMut(Option<&P::Value>, &P::Value) -> Verdict + Send,
{
    let mut value = probe.read().await?;
    let mut interactions = 0;

    if verdict(None, &value) == Verdict::Settled {
        return Ok(Settled { value, interactions, reason: StopReason::Stable });
    }

    loop {
        if interactions >= policy.max_attempts {
            return Ok(Settled { value, interactions, reason: StopReason::BudgetExhausted });
        }

        if !probe.act().await? {
            return Ok(Settled { value, interactions, reason: StopReason::NoAffordance });
        }
        interactions += 1;

        if !policy.settle_delay.is_zero() {
            tokio::time::sleep(policy.settle_delay).await;
        }

        let next = probe.read().await?;
        let decision = verdict(Some(&value), &next);
        trace!("Attempt {} settled={:?}", interactions, decision);
        value = next;

        if decision == Verdict::Settled {
            return Ok(Settled { value, interactions, reason: StopReason::Stable });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counter that grows by a scripted amount per action.
    struct Growth {
        value: usize,
        steps: Vec<usize>,
        acts: u32,
        affordance_until: Option<u32>,
    }

    impl Growth {
        fn new(start: usize, steps: &[usize]) -> Self {
            Self { value: start, steps: steps.to_vec(), acts: 0, affordance_until: None }
        }
    }

    #[async_trait]
    impl Probe for Growth {
        type Value = usize;

        async fn read(&mut self) -> Result<usize, DriverError> {
            Ok(self.value)
        }

        async fn act(&mut self) -> Result<bool, DriverError> {
            if self.affordance_until.is_some_and(|n| self.acts >= n) {
                return Ok(false);
            }
            let step = self.steps.get(self.acts as usize).copied().unwrap_or(0);
            self.value += step;
            self.acts += 1;
            Ok(true)
        }
    }

    fn policy(max_attempts: u32) -> SettlePolicy {
        SettlePolicy { max_attempts, settle_delay: Duration::ZERO }
    }

    fn until_no_growth(before: Option<&usize>, after: &usize) -> Verdict {
        match before {
            Some(b) if b == after => Verdict::Settled,
            _ => Verdict::Continue,
        }
    }

    #[tokio::test]
    async fn test_settles_when_value_stops_changing() {
        let mut probe = Growth::new(10, &[5, 0]);
        let out = retry_until_stable(&mut probe, policy(5), until_no_growth).await.unwrap();
        assert_eq!(out.value, 15);
        assert_eq!(out.interactions, 2);
        assert_eq!(out.reason, StopReason::Stable);
    }

    #[tokio::test]
    async fn test_budget_bounds_actions() {
        let mut probe = Growth::new(0, &[1, 1, 1, 1, 1, 1]);
        let out = retry_until_stable(&mut probe, policy(3), until_no_growth).await.unwrap();
        assert_eq!(out.value, 3);
        assert_eq!(out.interactions, 3);
        assert_eq!(out.reason, StopReason::BudgetExhausted);
        assert_eq!(probe.acts, 3);
    }

    #[tokio::test]
    async fn test_stops_without_affordance() {
        let mut probe = Growth::new(0, &[4, 4, 4]);
        probe.affordance_until = Some(1);
        let out = retry_until_stable(&mut probe, policy(3), until_no_growth).await.unwrap();
        assert_eq!(out.value, 4);
        assert_eq!(out.interactions, 1);
        assert_eq!(out.reason, StopReason::NoAffordance);
    }

    #[tokio::test]
    async fn test_initial_verdict_can_skip_actions() {
        let mut probe = Growth::new(7, &[1]);
        let out = retry_until_stable(&mut probe, policy(3), |_, _| Verdict::Settled).await.unwrap();
        assert_eq!(out.interactions, 0);
        assert_eq!(probe.acts, 0);
    }

    #[tokio::test]
    async fn test_zero_budget() {
        let mut probe = Growth::new(1, &[1]);
        let out = retry_until_stable(&mut probe, policy(0), until_no_growth).await.unwrap();
        assert_eq!(out.reason, StopReason::BudgetExhausted);
        assert_eq!(out.value, 1);
    }
}

//! Drives the "reveal more" affordance until a region stops growing.

use super::dom::PageSnapshot;
use super::retry::{retry_until_stable, Probe, SettlePolicy, StopReason, Verdict};
use super::Region;
use crate::browser::BrowserDriver;
use crate::error::DriverError;
use crate::template::Template;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Outcome of stabilizing one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stabilized {
    pub final_count: usize,
    pub clicks: u32,
    pub reason: StopReason,
}

/// Stabilizer budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilizeOptions {
    pub max_attempts: u32,
    pub settle_delay: Duration,
    /// Minimum growth for a click to count as a real load
    pub growth_threshold: usize,
}

impl Default for StabilizeOptions {
    fn default() -> Self {
        Self { max_attempts: 3, settle_delay: Duration::from_secs(2), growth_threshold: 3 }
    }
}

struct RevealMore<'a> {
    driver: &'a mut dyn BrowserDriver,
    template: &'a Template,
    index: usize,
}

#[async_trait]
impl Probe for RevealMore<'_> {
    type Value = usize;

    async fn read(&mut self) -> Result<usize, DriverError> {
        let html = self.driver.content().await?;
        Ok(PageSnapshot::parse(&html, self.template).item_count(self.index))
    }

    async fn act(&mut self) -> Result<bool, DriverError> {
        let html = self.driver.content().await?;
        let target = PageSnapshot::parse(&html, self.template).reveal_more(self.index);
        match target {
            Some(target) => {
                debug!("Clicking reveal-more {}", target);
                self.driver.click(&target).await
            }
            None => Ok(false),
        }
    }
}

/// Growth rule applied after each click.
///
/// A click adding at least `threshold` items is a real load. A click adding
/// nothing right after a real load settles the count. Anything else keeps the
/// loop going, bounded by the attempt budget.
#[derive(Debug)]
pub struct GrowthRule {
    threshold: usize,
    last_was_load: bool,
}

impl GrowthRule {
    pub fn new(threshold: usize) -> Self {
        Self { threshold, last_was_load: false }
    }

    pub fn judge(&mut self, before: Option<&usize>, after: &usize) -> Verdict {
        let Some(before) = before else {
            return Verdict::Continue;
        };

        let growth = after.saturating_sub(*before);
        if growth == 0 && self.last_was_load {
            return Verdict::Settled;
        }

        self.last_was_load = growth >= self.threshold;
        Verdict::Continue
    }
}

/// Clicks reveal-more until the item count settles or the budget runs out.
///
/// Dispatches at most `max_attempts` clicks. A missing affordance ends the
/// loop immediately.
pub async fn stabilize(
    driver: &mut dyn BrowserDriver,
    template: &Template,
    region: &Region,
    options: StabilizeOptions,
) -> Result<Stabilized, DriverError> {
    let mut probe = RevealMore { driver, template, index: region.index };
    let policy =
        SettlePolicy { max_attempts: options.max_attempts, settle_delay: options.settle_delay };
    let mut rule = GrowthRule::new(options.growth_threshold);

    let outcome =
        retry_until_stable(&mut probe, policy, |before, after| rule.judge(before, after)).await?;

    debug!(
        "Region '{}' settled at {} items after {} click(s) ({:?})",
        region.title, outcome.value, outcome.interactions, outcome.reason
    );

    Ok(Stabilized {
        final_count: outcome.value,
        clicks: outcome.interactions,
        reason: outcome.reason,
    })
}

//! Opens a collapsible panel before it is read.

use super::dom::PageSnapshot;
use super::retry::{retry_until_stable, Probe, SettlePolicy, StopReason, Verdict};
use super::Region;
use crate::browser::BrowserDriver;
use crate::error::DriverError;
use crate::template::Template;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Observed state of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelState {
    Collapsed,
    /// The toggle was clicked but the open state was not observed yet.
    Expanding,
    Expanded,
}

struct TogglePanel<'a> {
    driver: &'a mut dyn BrowserDriver,
    template: &'a Template,
    index: usize,
}

#[async_trait]
impl Probe for TogglePanel<'_> {
    type Value = bool;

    async fn read(&mut self) -> Result<bool, DriverError> {
        let html = self.driver.content().await?;
        Ok(PageSnapshot::parse(&html, self.template).is_expanded(self.index))
    }

    async fn act(&mut self) -> Result<bool, DriverError> {
        let html = self.driver.content().await?;
        let toggle = PageSnapshot::parse(&html, self.template).toggle(self.index);
        match toggle {
            Some(target) => self.driver.click(&target).await,
            None => Ok(false),
        }
    }
}

/// Makes sure `region` is open, clicking its toggle at most once.
///
/// Best effort: callers read the region whatever the returned state is.
pub async fn ensure_expanded(
    driver: &mut dyn BrowserDriver,
    template: &Template,
    region: &Region,
    settle_delay: Duration,
) -> Result<PanelState, DriverError> {
    let mut probe = TogglePanel { driver, template, index: region.index };
    let policy = SettlePolicy { max_attempts: 1, settle_delay };

    let outcome = retry_until_stable(&mut probe, policy, |before, expanded| match before {
        None if !*expanded => Verdict::Continue,
        _ => Verdict::Settled,
    })
    .await?;

    let state = match (outcome.value, outcome.reason) {
        (true, _) => PanelState::Expanded,
        (false, StopReason::NoAffordance) => PanelState::Collapsed,
        (false, _) => PanelState::Expanding,
    };

    debug!(
        "Panel '{}' is {:?} after {} toggle click(s)",
        region.title, state, outcome.interactions
    );
    Ok(state)
}

//! Root category discovery from the storefront menu.

use super::dom::{MenuLink, PageSnapshot};
use crate::browser::{BrowserDriver, WaitPolicy};
use crate::config::RootSpec;
use crate::error::DriverError;
use crate::normalize::normalize;
use crate::template::Template;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reads the category menu on the storefront home page.
///
/// Hovers the first menu trigger present (menus often render lazily), waits
/// `settle`, then collects the menu links.
pub async fn discover_roots(
    driver: &mut dyn BrowserDriver,
    template: &Template,
    base_url: &str,
    excluded: &[String],
    wait: WaitPolicy,
    settle: Duration,
) -> Result<Vec<RootSpec>, DriverError> {
    info!("Discovering root categories from {}", base_url);
    driver.navigate(base_url, wait).await?;

    let html = driver.content().await?;
    let trigger = PageSnapshot::parse(&html, template).menu_trigger();
    match trigger {
        Some(target) => {
            debug!("Hovering menu trigger {}", target);
            if !driver.hover(&target).await.unwrap_or(false) {
                debug!("Menu trigger hover was not dispatched");
            }
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }
        }
        None => warn!("No category menu trigger found; reading links from the page as rendered"),
    }

    let html = driver.content().await?;
    let links = PageSnapshot::parse(&html, template).menu_links();
    let roots = select_roots(links, base_url, excluded);

    info!("Discovered {} root categories", roots.len());
    Ok(roots)
}

/// Turns menu links into root specs.
///
/// Drops links without a usable target (`#`, empty, `javascript:`), labels in
/// `excluded` (compared by key), and repeats of an already seen key.
pub fn select_roots(links: Vec<MenuLink>, base_url: &str, excluded: &[String]) -> Vec<RootSpec> {
    let excluded: HashSet<String> = excluded.iter().map(|e| normalize(e)).collect();
    let mut seen = HashSet::new();

    links
        .into_iter()
        .filter(|link| is_navigable(&link.href))
        .filter_map(|link| {
            let label = if link.label.is_empty() {
                link.hint.clone().unwrap_or_default()
            } else {
                link.label.clone()
            };
            let key = normalize(&label);
            if key.is_empty() || excluded.contains(&key) || !seen.insert(key) {
                return None;
            }
            Some(RootSpec { label, url: absolute_url(base_url, &link.href) })
        })
        .collect()
}

fn is_navigable(href: &str) -> bool {
    let href = href.trim();
    !(href.is_empty() || href == "#" || href.to_lowercase().starts_with("javascript:"))
}

/// Resolves a menu href against the storefront base URL.
pub fn absolute_url(base_url: &str, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    let base = base_url.trim_end_matches('/');
    if let Some(rest) = href.strip_prefix("//") {
        let scheme = base.split("://").next().unwrap_or("https");
        return format!("{}://{}", scheme, rest);
    }
    if href.starts_with('/') {
        format!("{}{}", base, href)
    } else {
        format!("{}/{}", base, href)
    }
}

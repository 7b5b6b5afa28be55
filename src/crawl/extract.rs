//! Reads leaf items out of a located region.

use super::dom::{text_of, PageSnapshot};
use super::locator::Located;
use crate::catalog::LeafItem;
use tracing::trace;

/// Enumerates the region's items in document order.
///
/// Items without a label element, without a checkbox input, or whose input
/// lacks `name` or `value` are skipped. A blank label falls back to the
/// input's `name`.
pub fn extract(snapshot: &PageSnapshot<'_>, located: &Located) -> Vec<LeafItem> {
    let template = snapshot.template();
    let Some(panel) = snapshot.panel(located.region.index) else {
        return Vec::new();
    };

    let fallback = located.is_fallback();
    let mut items = Vec::new();

    for (i, item) in panel.select(template.item.selector()).enumerate() {
        let position = i as u32 + 1;

        let Some(label_el) = item.select(template.item_label.selector()).next() else {
            trace!("Item {} has no label, skipping", position);
            continue;
        };
        let Some(input) = item.select(template.item_input.selector()).next() else {
            trace!("Item {} has no input, skipping", position);
            continue;
        };

        let (Some(name), Some(value)) = (input.value().attr("name"), input.value().attr("value"))
        else {
            trace!("Item {} input lacks name/value, skipping", position);
            continue;
        };

        let mut label = text_of(label_el);
        if label.is_empty() {
            label = name.trim().to_string();
        }

        items.push(LeafItem {
            position,
            label,
            value_token: value.to_string(),
            source_hint: format!(
                "{}:nth-child({}) {}",
                template.item.raw(),
                position,
                template.item_label.raw()
            ),
            is_fallback_derived: fallback,
        });
    }

    items
}

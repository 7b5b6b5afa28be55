//! Markdown audit artifacts: the run report and the pre-swap snapshot.

use super::{CatalogCounts, CrawlReport};
use crate::catalog::CatalogGraph;
use crate::pipeline::PipelineState;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Names listed per section before truncating.
const LIST_LIMIT: usize = 20;

fn file_stamp(at: &DateTime<Utc>, run_id: &str) -> String {
    let short: String = run_id.chars().filter(|c| c.is_ascii_alphanumeric()).take(8).collect();
    format!("{}-{}", at.format("%Y%m%d-%H%M%S"), short)
}

fn push_list(lines: &mut Vec<String>, title: &str, names: &[String]) {
    if names.is_empty() {
        return;
    }

    lines.push(format!("### {} ({})", title, names.len()));
    lines.push(String::new());
    for name in names.iter().take(LIST_LIMIT) {
        lines.push(format!("- {}", name));
    }
    if names.len() > LIST_LIMIT {
        lines.push(format!("- ... and {} more", names.len() - LIST_LIMIT));
    }
    lines.push(String::new());
}

fn counts_row(name: &str, counts: &CatalogCounts) -> String {
    format!("| {} | {} | {} | {} |", name, counts.roots, counts.children, counts.total())
}

/// Renders the report body (everything up to the swap outcome).
pub fn render(report: &CrawlReport) -> String {
    let mut lines = Vec::new();

    lines.push(format!("# Catalog Crawl Report - {}", report.storefront));
    lines.push(String::new());
    lines.push(format!("**Run:** `{}`", report.run_id));
    lines.push(format!("**Generated:** {}", report.generated_at.to_rfc3339()));
    lines.push(String::new());

    lines.push("## Statistics".to_string());
    lines.push(String::new());
    lines.push("| Collection | Roots | Children | Total |".to_string());
    lines.push("|------------|-------|----------|-------|".to_string());
    lines.push(counts_row("Staged (new)", &report.staged));
    lines.push(counts_row("Published", &report.published));
    lines.push(String::new());
    lines.push(format!("Fallback-derived children: {}", report.fallback_children));
    lines.push(String::new());

    lines.push("## Roots".to_string());
    lines.push(String::new());
    lines.push("| Root | Status | Strategy | Children | Clicks | Notes |".to_string());
    lines.push("|------|--------|----------|----------|--------|-------|".to_string());
    for root in &report.roots {
        let strategy = root.strategy.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        let mut notes = Vec::new();
        if root.fallback {
            notes.push("fallback".to_string());
        }
        if root.duplicates > 0 {
            notes.push(format!("{} duplicates merged", root.duplicates));
        }
        if root.unkeyed > 0 {
            notes.push(format!("{} unkeyed skipped", root.unkeyed));
        }
        if !root.seen_titles.is_empty() {
            notes.push(format!("panels seen: {}", root.seen_titles.join(", ")));
        }
        if let Some(error) = &root.error {
            notes.push(error.replace('|', "\\|"));
        }
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} |",
            root.label,
            root.status,
            strategy,
            root.children,
            root.clicks,
            notes.join("; ")
        ));
    }
    lines.push(String::new());

    lines.push("## Changes".to_string());
    lines.push(String::new());
    let diff = &report.diff;
    push_list(&mut lines, "New roots", &diff.added_roots);
    push_list(&mut lines, "Removed roots", &diff.removed_roots);
    push_list(&mut lines, "Modified roots", &diff.modified_roots);
    push_list(&mut lines, "New children", &diff.added_children);
    push_list(&mut lines, "Removed children", &diff.removed_children);
    push_list(&mut lines, "Modified children", &diff.modified_children);

    lines.push("## Summary".to_string());
    lines.push(String::new());
    lines.push("| Change | Count |".to_string());
    lines.push("|--------|-------|".to_string());
    lines.push(format!("| New roots | {} |", diff.added_roots.len()));
    lines.push(format!("| Removed roots | {} |", diff.removed_roots.len()));
    lines.push(format!("| Modified roots | {} |", diff.modified_roots.len()));
    lines.push(format!("| New children | {} |", diff.added_children.len()));
    lines.push(format!("| Removed children | {} |", diff.removed_children.len()));
    lines.push(format!("| Modified children | {} |", diff.modified_children.len()));
    lines.push(format!("| **Total** | **{}** |", diff.total_changes()));
    lines.push(String::new());

    if diff.is_empty() {
        lines.push("*No changes against the published catalog.*".to_string());
    } else {
        lines.push(format!("*{} changes will be published.*", diff.total_changes()));
    }
    lines.push(String::new());

    lines.join("\n")
}

/// Writes the report into `dir`, returning the file path.
pub fn write_report(dir: &Path, report: &CrawlReport) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "crawl-report-{}.md",
        file_stamp(&report.generated_at, &report.run_id)
    ));
    std::fs::write(&path, render(report))?;
    info!("Report saved to {}", path.display());
    Ok(path)
}

/// Appends the swap outcome to a written report.
pub fn append_outcome(
    path: &Path,
    state: PipelineState,
    swap_error: Option<&str>,
) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
    writeln!(file, "## Outcome")?;
    writeln!(file)?;
    writeln!(file, "**Final state:** {}", state)?;
    if let Some(error) = swap_error {
        writeln!(file)?;
        writeln!(file, "**Swap error:** {}", error)?;
        writeln!(file)?;
        writeln!(file, "The published catalog was left unchanged; staged data was kept.")?;
    }
    Ok(())
}

/// Renders the published catalog as a Markdown outline.
pub fn render_snapshot(graph: &CatalogGraph, taken_at: &DateTime<Utc>) -> String {
    let mut lines = Vec::new();

    lines.push("# Published Catalog Snapshot".to_string());
    lines.push(String::new());
    lines.push(format!("**Taken:** {}", taken_at.to_rfc3339()));
    lines.push(String::new());

    if graph.is_empty() {
        lines.push("The published catalog is empty.".to_string());
        lines.push(String::new());
        return lines.join("\n");
    }

    lines.push(format!("**Roots:** {}", graph.roots().len()));
    lines.push(format!("**Children:** {}", graph.child_count()));
    lines.push(String::new());

    for (i, root) in graph.roots().iter().enumerate() {
        lines.push(format!("## {}. {}", i + 1, root.label));
        lines.push(String::new());
        if let Some(url) = &root.source_url {
            lines.push(format!("- URL: {}", url));
        }
        for child in graph.children_of(&root.id) {
            let marker = if child.is_fallback_derived { " *(fallback)*" } else { "" };
            lines.push(format!("- {}{}", child.label, marker));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Writes a snapshot of `graph` into `dir`, returning the file path.
pub fn write_snapshot(dir: &Path, graph: &CatalogGraph, run_id: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let now = Utc::now();
    let path = dir.join(format!("snapshot-catalog-{}.md", file_stamp(&now, run_id)));
    std::fs::write(&path, render_snapshot(graph, &now))?;
    info!("Snapshot saved to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogNode, LeafItem};
    use crate::crawl::StrategyKind;
    use crate::report::{RootOutcome, RootStatus};

    fn report() -> CrawlReport {
        let mut report = CrawlReport::new("0f1e2d3c-aaaa-bbbb", "Jumbo");
        let mut ok = RootOutcome::new("Almacén", "https://x.test/almacen", RootStatus::Ok);
        ok.strategy = Some(StrategyKind::FuzzyTitle);
        ok.children = 3;
        ok.fallback = true;
        let mut missing = RootOutcome::new("Bebidas", "https://x.test/bebidas", RootStatus::NotFound);
        missing.seen_titles = vec!["Marca".to_string(), "Precio".to_string()];
        report.roots = vec![ok, missing];
        report.staged = CatalogCounts { roots: 2, children: 3 };
        report.diff.added_children = (0..25).map(|i| format!("Almacén / Item {i}")).collect();
        report
    }

    #[test]
    fn test_render_merge_notes() {
        let mut report = report();
        report.roots[0].duplicates = 2;
        report.roots[0].unkeyed = 1;

        let out = render(&report);
        assert!(out.contains("| fallback; 2 duplicates merged; 1 unkeyed skipped |"));
    }

    #[test]
    fn test_render_sections() {
        let out = render(&report());
        assert!(out.contains("# Catalog Crawl Report - Jumbo"));
        assert!(out.contains("| Staged (new) | 2 | 3 | 5 |"));
        assert!(out.contains("| Almacén | ok | fuzzy-title | 3 | 0 | fallback |"));
        assert!(out.contains("panels seen: Marca, Precio"));
        assert!(out.contains("### New children (25)"));
        assert!(out.contains("- ... and 5 more"));
        assert!(!out.contains("Item 20"));
        assert!(out.contains("| **Total** | **25** |"));
    }

    #[test]
    fn test_write_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(dir.path(), &report()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("crawl-report-"));
        assert!(name.ends_with("-0f1e2d3c.md"));

        append_outcome(&path, PipelineState::SwapFailed, Some("disk full")).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("**Final state:** swap-failed"));
        assert!(content.contains("**Swap error:** disk full"));
    }

    #[test]
    fn test_snapshot() {
        let mut root = CatalogNode::root("Almacén", "https://x.test/almacen");
        let child = CatalogNode::child(
            &root.id,
            &LeafItem {
                position: 1,
                label: "Aceites".to_string(),
                value_token: "aceites".to_string(),
                source_hint: String::new(),
                is_fallback_derived: true,
            },
        );
        root.child_refs = vec![child.id.clone()];
        let graph = CatalogGraph::from_nodes(vec![root, child]);

        let out = render_snapshot(&graph, &Utc::now());
        assert!(out.contains("## 1. Almacén"));
        assert!(out.contains("- Aceites *(fallback)*"));

        let empty = render_snapshot(&CatalogGraph::default(), &Utc::now());
        assert!(empty.contains("empty"));

        let dir = tempfile::tempdir().unwrap();
        let path = write_snapshot(dir.path(), &graph, "run").unwrap();
        assert!(path.exists());
    }
}

//! Output formatting for catalogs, run summaries and store status (table,
//! JSON, markdown, CSV).

use crate::catalog::{CatalogGraph, CatalogNode};
use crate::config::OutputFormat;
use crate::pipeline::RunSummary;
use crate::store::LockInfo;
use serde::Serialize;
use std::path::PathBuf;

/// Lock and row counts of a catalog database.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub database: PathBuf,
    pub lock: Option<LockInfo>,
    pub staged: usize,
    pub published: usize,
}

#[derive(Serialize)]
struct TreeEntry<'a> {
    #[serde(flatten)]
    root: &'a CatalogNode,
    children: &'a [CatalogNode],
}

/// Formats crawler output.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a catalog as a root/child tree.
    pub fn format_tree(&self, graph: &CatalogGraph) -> String {
        if graph.roots().is_empty() {
            return match self.format {
                OutputFormat::Json => "[]".to_string(),
                OutputFormat::Csv => self.csv_header(),
                _ => "Catalog is empty.".to_string(),
            };
        }

        match self.format {
            OutputFormat::Json => self.json_tree(graph),
            OutputFormat::Table => self.table_tree(graph),
            OutputFormat::Markdown => self.markdown_tree(graph),
            OutputFormat::Csv => self.csv_tree(graph),
        }
    }

    /// Formats the outcome of a pipeline run.
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Table => self.table_summary(summary),
            OutputFormat::Markdown => self.markdown_summary(summary),
            OutputFormat::Csv => self.csv_summary(summary),
        }
    }

    /// Formats the store status.
    pub fn format_status(&self, status: &StoreStatus) -> String {
        if self.format == OutputFormat::Json {
            return serde_json::to_string_pretty(status).unwrap_or_else(|_| "{}".to_string());
        }

        let lock = match &status.lock {
            Some(lock) => format!("held by {} since {}", lock.owner, lock.acquired_at.to_rfc3339()),
            None => "free".to_string(),
        };

        let mut lines = Vec::new();
        lines.push(format!("Database:  {}", status.database.display()));
        lines.push(format!("Lock:      {}", lock));
        lines.push(format!("Staged:    {} nodes", status.staged));
        lines.push(format!("Published: {} nodes", status.published));
        lines.join("\n")
    }

    // JSON formatting

    fn json_tree(&self, graph: &CatalogGraph) -> String {
        let entries: Vec<TreeEntry<'_>> = graph
            .roots()
            .iter()
            .map(|root| TreeEntry { root, children: graph.children_of(&root.id) })
            .collect();
        serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
    }

    // Table formatting

    fn table_tree(&self, graph: &CatalogGraph) -> String {
        let label_width = 40;
        let key_width = 32;

        let mut lines = Vec::new();
        lines.push(format!("{:<label_width$}  {:<key_width$}  {}", "Category", "Key", "Children"));
        lines.push(format!("{:-<label_width$}  {:-<key_width$}  {:-<8}", "", "", ""));

        for root in graph.roots() {
            let children = graph.children_of(&root.id);
            lines.push(format!(
                "{:<label_width$}  {:<key_width$}  {}",
                truncate(&root.label, label_width),
                truncate(&root.normalized_key, key_width),
                children.len()
            ));
            for child in children {
                let marker = if child.is_fallback_derived { " *" } else { "" };
                let label = format!("  - {}{}", child.label, marker);
                lines.push(format!(
                    "{:<label_width$}  {:<key_width$}",
                    truncate(&label, label_width),
                    truncate(&child.normalized_key, key_width)
                ));
            }
        }

        lines.push(String::new());
        lines.push(format!(
            "Total: {} roots, {} children",
            graph.roots().len(),
            graph.child_count()
        ));
        if graph.roots().iter().any(|r| {
            graph.children_of(&r.id).iter().any(|c| c.is_fallback_derived)
        }) {
            lines.push("* read from a fallback region".to_string());
        }

        lines.join("\n")
    }

    fn table_summary(&self, summary: &RunSummary) -> String {
        let report = &summary.report;
        let mut lines = Vec::new();

        lines.push(format!("Run:     {}", report.run_id));
        lines.push(format!("State:   {}", summary.state));
        lines.push(format!(
            "Roots:   {} ({} without children)",
            report.total_roots(),
            report.failed_count()
        ));

        if !report.roots.is_empty() {
            lines.push(String::new());
            lines.push(format!("{:<30}  {:<10}  {:>8}  {}", "Root", "Status", "Children", "Via"));
            lines.push(format!("{:-<30}  {:-<10}  {:->8}  {:-<12}", "", "", "", ""));
            for root in &report.roots {
                let via = root.strategy.map(|s| s.to_string()).unwrap_or_default();
                lines.push(format!(
                    "{:<30}  {:<10}  {:>8}  {}",
                    truncate(&root.label, 30),
                    root.status.to_string(),
                    root.children,
                    via
                ));
            }
            lines.push(String::new());
        }

        lines.push(format!(
            "Staged:  {} roots, {} children",
            report.staged.roots, report.staged.children
        ));
        lines.push(format!("Changes: {}", report.diff.total_changes()));

        if let Some(path) = &summary.report_path {
            lines.push(format!("Report:  {}", path.display()));
        }
        if let Some(failure) = &report.failure {
            lines.push(format!("Failure: {}", failure));
        }
        if let Some(error) = &report.swap_error {
            lines.push(format!("Swap error: {}", error));
        }

        lines.join("\n")
    }

    // Markdown formatting

    fn markdown_tree(&self, graph: &CatalogGraph) -> String {
        let mut lines = Vec::new();

        for root in graph.roots() {
            match &root.source_url {
                Some(url) => lines.push(format!("## [{}]({})", root.label, url)),
                None => lines.push(format!("## {}", root.label)),
            }
            lines.push(String::new());
            for child in graph.children_of(&root.id) {
                let marker = if child.is_fallback_derived { " *(fallback)*" } else { "" };
                lines.push(format!("- {}{}", child.label, marker));
            }
            lines.push(String::new());
        }

        lines.push(format!(
            "*{} roots, {} children*",
            graph.roots().len(),
            graph.child_count()
        ));

        lines.join("\n")
    }

    fn markdown_summary(&self, summary: &RunSummary) -> String {
        let report = &summary.report;
        let mut lines = Vec::new();

        lines.push(format!("## Run `{}`: {}", report.run_id, summary.state));
        lines.push(String::new());
        lines.push("| Root | Status | Children | Via |".to_string());
        lines.push("|------|--------|----------|-----|".to_string());
        for root in &report.roots {
            let via = root.strategy.map(|s| s.to_string()).unwrap_or_default();
            lines.push(format!("| {} | {} | {} | {} |", root.label, root.status, root.children, via));
        }
        lines.push(String::new());
        lines.push(format!(
            "- **Staged:** {} roots, {} children",
            report.staged.roots, report.staged.children
        ));
        lines.push(format!("- **Changes:** {}", report.diff.total_changes()));
        if let Some(path) = &summary.report_path {
            lines.push(format!("- **Report:** {}", path.display()));
        }
        if let Some(failure) = &report.failure {
            lines.push(format!("- **Failure:** {}", failure));
        }
        if let Some(error) = &report.swap_error {
            lines.push(format!("- **Swap error:** {}", error));
        }

        lines.join("\n")
    }

    // CSV formatting

    fn csv_header(&self) -> String {
        "root,child,normalized_key,position,value_token,fallback,url".to_string()
    }

    fn csv_tree(&self, graph: &CatalogGraph) -> String {
        let mut lines = Vec::new();
        lines.push(self.csv_header());

        for root in graph.roots() {
            let root_label = Self::csv_escape(&root.label);
            lines.push(format!(
                "{},,{},,,false,{}",
                root_label,
                root.normalized_key,
                root.source_url.as_deref().map(Self::csv_escape).unwrap_or_default()
            ));

            for child in graph.children_of(&root.id) {
                lines.push(format!(
                    "{},{},{},{},{},{},",
                    root_label,
                    Self::csv_escape(&child.label),
                    child.normalized_key,
                    child.position.map(|p| p.to_string()).unwrap_or_default(),
                    child.value_token.as_deref().map(Self::csv_escape).unwrap_or_default(),
                    child.is_fallback_derived
                ));
            }
        }

        lines.join("\n")
    }

    fn csv_summary(&self, summary: &RunSummary) -> String {
        let mut lines = Vec::new();
        lines.push("root,status,strategy,children,clicks,fallback,error".to_string());

        for root in &summary.report.roots {
            lines.push(format!(
                "{},{},{},{},{},{},{}",
                Self::csv_escape(&root.label),
                root.status,
                root.strategy.map(|s| s.to_string()).unwrap_or_default(),
                root.children,
                root.clicks,
                root.fallback,
                root.error.as_deref().map(Self::csv_escape).unwrap_or_default()
            ));
        }

        lines.join("\n")
    }

    fn csv_escape(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width - 3).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

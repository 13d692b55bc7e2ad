//! Terminal output: tables for humans, JSON with `--json`.
//!
//! Primary data goes to stdout; notices and errors go to stderr.

use anyhow::Result;
use clouddeploy_client::ProjectionSnapshot;
use clouddeploy_protocol::{EntityMetrics, EntityStatus, Project};
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use console::style;
use serde_json::Value;

pub fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn success(message: impl std::fmt::Display) {
    eprintln!("{} {}", style("✓").green().bold(), message);
}

pub fn warning(message: impl std::fmt::Display) {
    eprintln!("{} {}", style("!").yellow().bold(), message);
}

fn status_color(status: EntityStatus) -> Color {
    match status {
        EntityStatus::Running => Color::Green,
        EntityStatus::Deploying | EntityStatus::Created => Color::Yellow,
        EntityStatus::Error => Color::Red,
        EntityStatus::Stopped | EntityStatus::Inactive | EntityStatus::Removing => Color::DarkGrey,
        EntityStatus::Unknown => Color::Reset,
    }
}

pub fn status_cell(status: EntityStatus) -> Cell {
    Cell::new(status.as_str()).fg(status_color(status))
}

pub fn styled_status(status: EntityStatus) -> String {
    let text = style(status.as_str());
    match status {
        EntityStatus::Running => text.green(),
        EntityStatus::Deploying | EntityStatus::Created => text.yellow(),
        EntityStatus::Error => text.red(),
        _ => text.dim(),
    }
    .to_string()
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

pub fn projects_table(projects: &[Project]) -> Table {
    let mut table = new_table(&["ID", "NAME", "STATUS", "TEMPLATE", "URL"]);
    for project in projects {
        table.add_row(vec![
            Cell::new(&project.id),
            Cell::new(&project.name),
            status_cell(project.status),
            Cell::new(project.template.as_str()),
            Cell::new(project.normalized_url()),
        ]);
    }
    table
}

pub fn project_detail(project: &Project) -> Table {
    let mut table = new_table(&["FIELD", "VALUE"]);
    table.add_row(vec![Cell::new("id"), Cell::new(&project.id)]);
    table.add_row(vec![Cell::new("name"), Cell::new(&project.name)]);
    table.add_row(vec![Cell::new("status"), status_cell(project.status)]);
    table.add_row(vec![Cell::new("template"), Cell::new(project.template.as_str())]);
    table.add_row(vec![Cell::new("url"), Cell::new(project.normalized_url())]);
    table.add_row(vec![Cell::new("repository"), Cell::new(&project.github_url)]);
    if let Some(created) = &project.created_at {
        table.add_row(vec![Cell::new("created"), Cell::new(created)]);
    }
    table.add_row(vec![
        Cell::new("cpu / memory / requests"),
        Cell::new(format!(
            "{:.1}% / {:.0} MB / {}",
            project.metrics.cpu, project.metrics.memory, project.metrics.requests
        )),
    ]);
    table
}

/// Live view of the projection. `names` maps ids to display names for
/// projects loaded at startup.
pub fn projection_table(
    snapshot: &ProjectionSnapshot,
    names: &std::collections::HashMap<String, String>,
) -> Table {
    let mut table = new_table(&["PROJECT", "STATUS", "CPU", "MEMORY", "REQUESTS", "UPTIME"]);
    for id in snapshot.ids() {
        let label = names.get(id).map(String::as_str).unwrap_or(id);
        let status = snapshot.status(id);
        let mut row = vec![
            Cell::new(label),
            status.map(status_cell).unwrap_or_else(|| Cell::new("-")),
        ];
        row.extend(metrics_cells(snapshot.metrics(id)));
        table.add_row(row);
    }
    table
}

fn metrics_cells(metrics: Option<&EntityMetrics>) -> Vec<Cell> {
    match metrics {
        Some(m) => vec![
            Cell::new(format!("{:.1}%", m.cpu)),
            Cell::new(
                m.memory_usage
                    .clone()
                    .unwrap_or_else(|| format!("{:.0} MB", m.memory)),
            ),
            Cell::new(m.requests),
            Cell::new(&m.uptime),
        ],
        None => (0..4).map(|_| Cell::new("-")).collect(),
    }
}

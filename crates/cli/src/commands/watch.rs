//! `clouddeploy watch`: live status table fed by the event stream.

use std::collections::{HashMap, VecDeque};

use anyhow::{bail, Result};
use clouddeploy_client::{ClientContext, ConnectionState, StreamNotice};
use console::{style, Term};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use super::api_error;
use crate::opts::GlobalOpts;
use crate::output::{print_json, projection_table, styled_status};

const RECENT_NOTICES: usize = 6;

pub async fn cmd_watch(ctx: &ClientContext, opts: &GlobalOpts) -> Result<()> {
    if !ctx.session().has_token() {
        return Err(api_error(clouddeploy_client::ApiError::MissingToken));
    }

    let projects = ctx.actions().load_projects().await.map_err(api_error)?;
    let mut view = WatchView {
        names: projects
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect(),
        recent: VecDeque::with_capacity(RECENT_NOTICES),
        term: Term::stdout(),
        json: opts.json,
        api_url: ctx.config().api_url.clone(),
    };

    let mut revisions = ctx.projection().subscribe();
    let mut states = ctx.stream().subscribe_state();
    let mut notices = ctx.stream().notices();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(
        component = "watch",
        event = "watch.started",
        projects = view.names.len(),
        "Watching projects"
    );
    ctx.stream().connect();
    view.render(ctx)?;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                view.render(ctx)?;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                if state == ConnectionState::Disconnected && !ctx.session().has_token() {
                    view.render(ctx)?;
                    bail!("Session ended, please log in with `clouddeploy login`");
                }
                view.render(ctx)?;
            }
            notice = notices.recv() => match notice {
                Ok(notice) => {
                    view.record(&notice);
                    if view.json {
                        print_json(&notice_json(&notice))?;
                    } else {
                        view.render(ctx)?;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!(component = "watch", event = "watch.stopped", "Stopped watching");
    Ok(())
}

struct WatchView {
    names: HashMap<String, String>,
    recent: VecDeque<String>,
    term: Term,
    json: bool,
    api_url: String,
}

impl WatchView {
    fn record(&mut self, notice: &StreamNotice) {
        if let StreamNotice::StatusChanged {
            project_id,
            name: Some(name),
            ..
        } = notice
        {
            self.names.insert(project_id.clone(), name.clone());
        }
        if self.recent.len() == RECENT_NOTICES {
            self.recent.pop_front();
        }
        self.recent.push_back(describe(notice, &self.names));
    }

    fn render(&self, ctx: &ClientContext) -> Result<()> {
        let snapshot = ctx.projection().read();
        if self.json {
            let projects: Vec<_> = snapshot
                .ids()
                .into_iter()
                .map(|id| {
                    serde_json::json!({
                        "id": id,
                        "status": snapshot.status(id),
                        "metrics": snapshot.metrics(id),
                    })
                })
                .collect();
            return print_json(&serde_json::json!({
                "revision": snapshot.revision,
                "connection": ctx.stream().state().as_str(),
                "projects": projects,
            }));
        }

        let connection = match ctx.stream().state() {
            ConnectionState::Connected => style("● live").green(),
            ConnectionState::Connecting => style("○ connecting").yellow(),
            ConnectionState::Disconnected => style("○ disconnected").red(),
        };
        self.term.clear_screen()?;
        self.term.write_line(&format!(
            "{}  {}  {}",
            style("CloudDeploy").bold(),
            connection,
            style(&self.api_url).dim()
        ))?;
        if snapshot.is_empty() {
            self.term.write_line("No projects to watch yet.")?;
        } else {
            self.term
                .write_line(&projection_table(&snapshot, &self.names).to_string())?;
        }
        for line in &self.recent {
            self.term.write_line(line)?;
        }
        self.term
            .write_line(&style("Ctrl-C to exit").dim().to_string())?;
        Ok(())
    }
}

fn describe(notice: &StreamNotice, names: &HashMap<String, String>) -> String {
    let label = |id: &str| names.get(id).cloned().unwrap_or_else(|| id.to_string());
    match notice {
        StreamNotice::Connected => format!("{} Real-time updates connected", style("›").cyan()),
        StreamNotice::StatusChanged {
            project_id, status, ..
        } => format!(
            "{} {} is now {}",
            style("›").cyan(),
            label(project_id),
            styled_status(*status)
        ),
        StreamNotice::AutoShutdown { project_id } => format!(
            "{} {} was stopped after inactivity",
            style("!").yellow(),
            label(project_id)
        ),
        StreamNotice::ContainerError {
            project_id,
            message,
            ..
        } => match project_id {
            Some(id) => format!("{} {}: {}", style("✗").red(), label(id), message),
            None => format!("{} {}", style("✗").red(), message),
        },
    }
}

fn notice_json(notice: &StreamNotice) -> serde_json::Value {
    match notice {
        StreamNotice::Connected => serde_json::json!({ "notice": "connected" }),
        StreamNotice::StatusChanged {
            project_id,
            status,
            previous,
            name,
        } => serde_json::json!({
            "notice": "status_changed",
            "projectId": project_id,
            "status": status,
            "previousStatus": previous,
            "name": name,
        }),
        StreamNotice::AutoShutdown { project_id } => serde_json::json!({
            "notice": "auto_shutdown",
            "projectId": project_id,
        }),
        StreamNotice::ContainerError {
            project_id,
            message,
            error_code,
        } => serde_json::json!({
            "notice": "container_error",
            "projectId": project_id,
            "message": message,
            "errorCode": error_code,
        }),
    }
}

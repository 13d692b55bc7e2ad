//! `clouddeploy container ...`

use anyhow::Result;
use clap::Subcommand;
use clouddeploy_client::ClientContext;
use clouddeploy_protocol::{ContainerAction, ContainerActionResponse};

use super::api_error;
use crate::opts::GlobalOpts;
use crate::output::{print_json, styled_status, success};

#[derive(Subcommand, Debug)]
pub enum ContainerCommand {
    /// Ask the server for the container's current status
    Status { id: String },
    Start { id: String },
    Stop { id: String },
    Restart { id: String },
    /// Rebuild the image from the repository and restart
    Rebuild { id: String },
    /// Create the container if it does not exist yet
    Create { id: String },
}

pub async fn cmd_container(
    ctx: &ClientContext,
    opts: &GlobalOpts,
    cmd: &ContainerCommand,
) -> Result<()> {
    let actions = ctx.actions();
    let (id, action) = match cmd {
        ContainerCommand::Status { id } => {
            let status = actions.refresh_status(id).await.map_err(api_error)?;
            if opts.json {
                return print_json(&serde_json::json!({ "id": id, "status": status }));
            }
            println!("{id}: {}", styled_status(status));
            return Ok(());
        }
        ContainerCommand::Start { id } => (id, ContainerAction::Start),
        ContainerCommand::Stop { id } => (id, ContainerAction::Stop),
        ContainerCommand::Restart { id } => (id, ContainerAction::Restart),
        ContainerCommand::Rebuild { id } => (id, ContainerAction::Rebuild),
        ContainerCommand::Create { id } => (id, ContainerAction::Create),
    };

    let response = match action {
        ContainerAction::Start => actions.start(id).await,
        ContainerAction::Stop => actions.stop(id).await,
        ContainerAction::Restart => actions.restart(id).await,
        ContainerAction::Rebuild => actions.rebuild(id).await,
        ContainerAction::Create => actions.create_container(id).await,
    }
    .map_err(api_error)?;

    if opts.json {
        return print_json(&serde_json::to_value(&response)?);
    }
    success(summary(id, action, &response));
    Ok(())
}

fn summary(id: &str, action: ContainerAction, response: &ContainerActionResponse) -> String {
    let mut line = match &response.message {
        Some(message) if !message.is_empty() => format!("{id}: {message}"),
        _ => format!("{id}: {} requested", action.as_str()),
    };
    if let Some(status) = response.status {
        line.push_str(&format!(" ({})", styled_status(status)));
    }
    line
}

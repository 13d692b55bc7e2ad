//! `clouddeploy projects ...`

use anyhow::{anyhow, bail, Result};
use clap::{Args, Subcommand};
use clouddeploy_client::ClientContext;
use clouddeploy_protocol::{EntityStatus, Template};
use console::Term;

use super::api_error;
use crate::opts::GlobalOpts;
use crate::output::{print_json, project_detail, projects_table, styled_status, success};

#[derive(Subcommand, Debug)]
pub enum ProjectsCommand {
    /// List your projects
    List,

    /// Create a project and start its first deployment
    Create(CreateArgs),

    /// Show one project
    Show { id: String },

    /// Delete a project and its container
    Delete {
        id: String,

        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Overwrite the stored status of a project
    SetStatus { id: String, status: EntityStatus },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Letters, digits, `-` and `_`
    pub name: String,

    /// GitHub repository URL (defaults to the template's starter repository)
    #[arg(long)]
    pub repo: Option<String>,

    #[arg(long, short = 't', default_value_t = Template::Static)]
    pub template: Template,
}

pub async fn cmd_projects(
    ctx: &ClientContext,
    opts: &GlobalOpts,
    cmd: &ProjectsCommand,
) -> Result<()> {
    match cmd {
        ProjectsCommand::List => list(ctx, opts).await,
        ProjectsCommand::Create(args) => create(ctx, opts, args).await,
        ProjectsCommand::Show { id } => show(ctx, opts, id).await,
        ProjectsCommand::Delete { id, yes } => delete(ctx, id, *yes).await,
        ProjectsCommand::SetStatus { id, status } => {
            let project = ctx
                .actions()
                .set_status(id, *status)
                .await
                .map_err(api_error)?;
            success(format!(
                "{} is now {}",
                project.name,
                styled_status(project.status)
            ));
            Ok(())
        }
    }
}

async fn list(ctx: &ClientContext, opts: &GlobalOpts) -> Result<()> {
    let projects = ctx.actions().load_projects().await.map_err(api_error)?;
    if opts.json {
        return print_json(&serde_json::to_value(&projects)?);
    }
    if projects.is_empty() {
        println!("No projects yet. Create one with `clouddeploy projects create <name>`.");
        return Ok(());
    }
    println!("{}", projects_table(&projects));
    Ok(())
}

async fn create(ctx: &ClientContext, opts: &GlobalOpts, args: &CreateArgs) -> Result<()> {
    let repo = repository_for(args.repo.as_deref(), args.template)?;
    let project = ctx
        .actions()
        .create_project(&args.name, repo, args.template)
        .await
        .map_err(api_error)?;
    if opts.json {
        return print_json(&serde_json::to_value(&project)?);
    }
    success(format!(
        "Created {} ({}), {}",
        project.name,
        project.id,
        styled_status(project.status)
    ));
    if !project.url.is_empty() {
        println!("  {}", project.normalized_url());
    }
    Ok(())
}

async fn show(ctx: &ClientContext, opts: &GlobalOpts, id: &str) -> Result<()> {
    let project = ctx
        .api()
        .get_project(id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| anyhow!("Project {id} not found"))?;
    if opts.json {
        return print_json(&serde_json::to_value(&project)?);
    }
    println!("{}", project_detail(&project));
    Ok(())
}

async fn delete(ctx: &ClientContext, id: &str, yes: bool) -> Result<()> {
    if !yes && !confirm(&format!("Delete project {id}? This removes its container. [y/N] "))? {
        bail!("Aborted");
    }
    ctx.actions().delete_project(id).await.map_err(api_error)?;
    success(format!("Deleted {id}"));
    Ok(())
}

fn repository_for(repo: Option<&str>, template: Template) -> Result<&str> {
    match repo {
        Some(repo) => Ok(repo),
        None => template.starter_repo().ok_or_else(|| {
            anyhow!("The {template} template has no starter repository; pass --repo")
        }),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    let term = Term::stderr();
    if !term.features().is_attended() {
        bail!("Refusing to delete without a terminal; pass --yes");
    }
    term.write_str(prompt)?;
    let answer = term.read_line()?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

//! CloudDeploy CLI
//!
//! Log in, manage projects and containers, and watch live status from the
//! terminal. Every command runs on the shared client core.

mod commands;
mod logging;
mod opts;
mod output;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use clouddeploy_client::ClientContext;
use clouddeploy_protocol::Theme;

use commands::auth::{LoginArgs, RegisterArgs};
use commands::container::ContainerCommand;
use commands::projects::ProjectsCommand;
use opts::GlobalOpts;

#[derive(Parser, Debug)]
#[command(name = "clouddeploy", version, about = "CloudDeploy command-line client")]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session
    Login(LoginArgs),

    /// Create an account (and log in unless --no-login)
    Register(RegisterArgs),

    /// End the session on the server and locally
    Logout,

    /// Show the logged-in user
    Whoami {
        /// Ask the server instead of using the cached profile
        #[arg(long)]
        remote: bool,
    },

    /// Project commands
    #[command(subcommand)]
    Projects(ProjectsCommand),

    /// Container lifecycle commands
    #[command(subcommand)]
    Container(ContainerCommand),

    /// Live status of your projects (Ctrl-C to exit)
    Watch,

    /// Show or set the colour theme
    Theme { theme: Option<Theme> },

    /// Print shell completions
    Completions { shell: Shell },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = &cli.opts;

    if let Command::Completions { shell } = cli.command {
        let mut app = Cli::command();
        clap_complete::generate(shell, &mut app, "clouddeploy", &mut std::io::stdout());
        return Ok(());
    }

    let config = opts.resolve()?;
    let _logging = logging::init_logging(&config.log_dir())?;
    let ctx = ClientContext::open(config).context("open client state")?;

    let result = match &cli.command {
        Command::Login(args) => commands::auth::cmd_login(&ctx, opts, args).await,
        Command::Register(args) => commands::auth::cmd_register(&ctx, opts, args).await,
        Command::Logout => commands::auth::cmd_logout(&ctx).await,
        Command::Whoami { remote } => commands::auth::cmd_whoami(&ctx, opts, *remote).await,
        Command::Projects(cmd) => commands::projects::cmd_projects(&ctx, opts, cmd).await,
        Command::Container(cmd) => commands::container::cmd_container(&ctx, opts, cmd).await,
        Command::Watch => commands::watch::cmd_watch(&ctx, opts).await,
        Command::Theme { theme } => commands::theme::cmd_theme(&ctx, opts, *theme),
        Command::Completions { .. } => Ok(()),
    };

    ctx.shutdown();
    result
}

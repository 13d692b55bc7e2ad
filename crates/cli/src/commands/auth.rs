//! `clouddeploy login | register | logout | whoami`

use anyhow::{bail, Result};
use clap::Args;
use clouddeploy_client::ClientContext;
use clouddeploy_protocol::User;
use console::Term;

use super::api_error;
use crate::opts::GlobalOpts;
use crate::output::{print_json, success, warning};

#[derive(Args, Debug)]
pub struct LoginArgs {
    #[arg(long)]
    pub email: String,

    /// Prompted for when omitted
    #[arg(long, env = "CLOUDDEPLOY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    #[arg(long)]
    pub email: String,

    /// Username: letters, digits, `-` and `_`, at least 3 characters
    #[arg(long)]
    pub name: String,

    /// Prompted for when omitted
    #[arg(long, env = "CLOUDDEPLOY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Create the account but stay logged out
    #[arg(long)]
    pub no_login: bool,
}

pub async fn cmd_login(ctx: &ClientContext, opts: &GlobalOpts, args: &LoginArgs) -> Result<()> {
    let password = password_or_prompt(args.password.as_deref())?;
    let user = ctx
        .api()
        .login(&args.email, &password)
        .await
        .map_err(anyhow::Error::new)?;
    print_user(opts, &user, "Logged in as")
}

pub async fn cmd_register(
    ctx: &ClientContext,
    opts: &GlobalOpts,
    args: &RegisterArgs,
) -> Result<()> {
    let password = password_or_prompt(args.password.as_deref())?;
    let api = ctx.api();
    if args.no_login {
        let user = api
            .register_only(&args.email, &password, &args.name)
            .await
            .map_err(anyhow::Error::new)?;
        print_user(opts, &user, "Registered")
    } else {
        let user = api
            .register(&args.email, &password, &args.name)
            .await
            .map_err(anyhow::Error::new)?;
        print_user(opts, &user, "Registered and logged in as")
    }
}

pub async fn cmd_logout(ctx: &ClientContext) -> Result<()> {
    let was_logged_in = ctx.session().has_token();
    ctx.api().logout().await;
    if was_logged_in {
        success("Logged out");
    } else {
        warning("Not logged in; cleared local state anyway");
    }
    Ok(())
}

pub async fn cmd_whoami(ctx: &ClientContext, opts: &GlobalOpts, remote: bool) -> Result<()> {
    let user = if remote {
        ctx.api().current_user().await
    } else {
        ctx.api().cached_user()
    };
    match user {
        Some(user) => print_user(opts, &user, "Logged in as"),
        None if remote => Err(api_error(clouddeploy_client::ApiError::MissingToken)),
        None => bail!("Not logged in"),
    }
}

fn print_user(opts: &GlobalOpts, user: &User, prefix: &str) -> Result<()> {
    if opts.json {
        return print_json(&serde_json::to_value(user)?);
    }
    success(format!("{prefix} {} <{}>", user.name, user.email));
    Ok(())
}

fn password_or_prompt(given: Option<&str>) -> Result<String> {
    if let Some(password) = given {
        return Ok(password.to_string());
    }
    let term = Term::stderr();
    if !term.features().is_attended() {
        bail!("No password given; pass --password or set CLOUDDEPLOY_PASSWORD");
    }
    term.write_str("Password: ")?;
    Ok(term.read_secure_line()?)
}

//! `clouddeploy theme [light|dark]`

use anyhow::Result;
use clouddeploy_client::ClientContext;
use clouddeploy_protocol::Theme;

use crate::opts::GlobalOpts;
use crate::output::{print_json, success};

pub fn cmd_theme(ctx: &ClientContext, opts: &GlobalOpts, theme: Option<Theme>) -> Result<()> {
    if let Some(theme) = theme {
        ctx.session().set_theme(theme)?;
        success(format!("Theme set to {}", theme.as_str()));
        return Ok(());
    }

    let stored = ctx.session().theme()?;
    let current = stored.unwrap_or(Theme::Light);
    if opts.json {
        return print_json(&serde_json::json!({
            "theme": current,
            "default": stored.is_none(),
        }));
    }
    match stored {
        Some(_) => println!("{}", current.as_str()),
        None => println!("{} (default)", current.as_str()),
    }
    Ok(())
}

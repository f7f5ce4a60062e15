//! Command line and environment configuration.
//!
//! Every setting has a `GOHOUBI_*` environment fallback; `main` loads a
//! `.env` file before parsing.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::household::SINGLE_TENANT_SHARE_CODE;
use crate::reward::DEFAULT_REWARD_THRESHOLD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Tenancy {
    /// One fixed household with a default child.
    Single,
    /// Chat users link to households with a share code.
    Multi,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "gohoubi")]
#[command(about = "Chat bot that records household reward points")]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the webhook (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Run one message through the handler and print the reply
    Reply {
        /// Chat user the message comes from
        #[arg(long)]
        user: String,
        /// Message text
        text: String,
    },
    /// Create a household with the default action catalog
    SeedHousehold {
        /// Code chat users link with; generated when omitted
        #[arg(long)]
        share_code: Option<String>,
        /// Name of the first child
        #[arg(long)]
        child: Option<String>,
    },
    /// Add a child to a household
    AddChild {
        /// Household share code; the single-tenant household when omitted
        #[arg(long)]
        share_code: Option<String>,
        name: String,
        /// Name used in replies instead of `name`
        #[arg(long)]
        nickname: Option<String>,
    },
    /// Append an action to a household's catalog
    AddAction {
        #[arg(long)]
        share_code: Option<String>,
        name: String,
        #[arg(long)]
        points: i64,
    },
    /// Stop detecting an action; its past records stay
    DeactivateAction {
        #[arg(long)]
        share_code: Option<String>,
        name: String,
    },
    /// Add a goal listed in reward replies
    AddGoal {
        #[arg(long)]
        share_code: Option<String>,
        title: String,
        /// Points the goal costs
        #[arg(long)]
        target: Option<i64>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// SQLite database path or `sqlite:` URL
    #[arg(long, global = true, env = "GOHOUBI_DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, global = true, env = "GOHOUBI_TENANCY", value_enum, default_value = "multi")]
    pub tenancy: Tenancy,

    /// Points per reward cycle
    #[arg(long, global = true, env = "GOHOUBI_REWARD_THRESHOLD", default_value_t = DEFAULT_REWARD_THRESHOLD)]
    pub reward_threshold: i64,

    /// IANA zone that defines "today"
    #[arg(long, global = true, env = "GOHOUBI_TIMEZONE", default_value = "Asia/Tokyo")]
    pub timezone: String,

    /// Address to listen on
    #[arg(long, global = true, env = "GOHOUBI_BIND", default_value = "0.0.0.0:5000")]
    pub bind: SocketAddr,

    /// Reply API token; replies are only logged when unset
    #[arg(long, global = true, env = "LINE_CHANNEL_ACCESS_TOKEN", hide_env_values = true)]
    pub line_channel_access_token: Option<String>,

    /// Child created for single tenancy
    #[arg(long, global = true, env = "GOHOUBI_DEFAULT_CHILD_NAME", default_value = "")]
    pub default_child_name: String,

    /// Directory for daily rolling log files
    #[arg(long, global = true, env = "GOHOUBI_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    pub fn database_url(&self) -> Result<String> {
        match &self.database_url {
            Some(url) if !url.trim().is_empty() => Ok(url.clone()),
            _ => Ok(default_db_path()?.to_string_lossy().into_owned()),
        }
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("unknown time zone {}", self.timezone))
    }

    /// Share code a provisioning command targets. Only single tenancy has a
    /// household to fall back on.
    pub fn target_share_code(&self, share_code: Option<&str>) -> Result<String> {
        match (share_code, self.tenancy) {
            (Some(code), _) if !code.trim().is_empty() => Ok(code.trim().to_string()),
            (_, Tenancy::Single) => Ok(SINGLE_TENANT_SHARE_CODE.to_string()),
            (_, Tenancy::Multi) => bail!("--share-code is required in multi tenancy"),
        }
    }

    /// Reject settings the core cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.reward_threshold < 1 {
            bail!(
                "reward threshold must be at least 1, got {}",
                self.reward_threshold
            );
        }
        self.timezone()?;
        Ok(())
    }
}

fn default_db_path() -> Result<PathBuf> {
    let base = dirs::data_dir().unwrap_or(std::env::current_dir()?);
    Ok(base.join("gohoubi").join("gohoubi.sqlite3"))
}

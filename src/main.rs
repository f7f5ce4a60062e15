use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use gohoubi_lib::config::{Cli, Command, Settings};
use gohoubi_lib::gateway::{LineReplyClient, LogReplySender, ReplySender, TrustUpstream};
use gohoubi_lib::id::new_share_code;
use gohoubi_lib::model::RECORD_SOURCE_CLI;
use gohoubi_lib::catalog::ActionCatalog;
use gohoubi_lib::reward::RewardAccumulator;
use gohoubi_lib::{
    build_handler, household, logging, open_database, provision, provisioning_target, server,
    AppState,
};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(cli.settings.log_dir.as_deref());

    if let Err(err) = run(cli).await {
        tracing::error!(target: "gohoubi", event = "fatal", error = %format!("{err:#}"));
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings;
    settings.validate()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&settings).await,
        Command::Migrate => {
            let pool = open_database(&settings).await?;
            pool.close().await;
            println!("Migrations applied.");
            Ok(())
        }
        Command::Reply { user, text } => {
            let pool = open_database(&settings).await?;
            let handler = build_handler(&settings, pool.clone())
                .await?
                .with_source(RECORD_SOURCE_CLI);
            let reply = handler.handle(&text, &user).await;
            pool.close().await;
            println!("{reply}");
            Ok(())
        }
        Command::SeedHousehold { share_code, child } => {
            let share_code = share_code.unwrap_or_else(new_share_code);
            let pool = open_database(&settings).await?;
            let created = household::create_household(&pool, &share_code, child.as_deref()).await;
            pool.close().await;
            let household = created?;
            println!("Household {} ready; link with 「登録 {}」", household.id, household.share_code);
            Ok(())
        }
        Command::AddChild {
            share_code,
            name,
            nickname,
        } => {
            let pool = open_database(&settings).await?;
            let result = async {
                let target = provisioning_target(&settings, &pool, share_code.as_deref()).await?;
                provision::add_child(&pool, &target, &name, nickname.as_deref()).await
            }
            .await;
            pool.close().await;
            println!("Child {} added", result?);
            Ok(())
        }
        Command::AddAction {
            share_code,
            name,
            points,
        } => {
            let pool = open_database(&settings).await?;
            let result = async {
                let target = provisioning_target(&settings, &pool, share_code.as_deref()).await?;
                provision::add_action(&pool, &target, &name, points).await?;
                Ok::<_, anyhow::Error>(target)
            }
            .await;
            pool.close().await;
            let target = result?;
            RewardAccumulator::new(settings.reward_threshold)
                .check_catalog(&ActionCatalog::from_pairs([(name.as_str(), points)]), &target);
            println!("Action {name} ({points} pt) added");
            Ok(())
        }
        Command::DeactivateAction { share_code, name } => {
            let pool = open_database(&settings).await?;
            let result = async {
                let target = provisioning_target(&settings, &pool, share_code.as_deref()).await?;
                provision::deactivate_action(&pool, &target, &name).await
            }
            .await;
            pool.close().await;
            result?;
            println!("Action {name} deactivated");
            Ok(())
        }
        Command::AddGoal {
            share_code,
            title,
            target,
        } => {
            let pool = open_database(&settings).await?;
            let result = async {
                let code = provisioning_target(&settings, &pool, share_code.as_deref()).await?;
                provision::add_goal(&pool, &code, &title, target).await
            }
            .await;
            pool.close().await;
            println!("Goal {} added", result?);
            Ok(())
        }
    }
}

async fn serve(settings: &Settings) -> Result<()> {
    let pool = open_database(settings).await?;
    let handler = build_handler(settings, pool.clone()).await?;

    let sender: Arc<dyn ReplySender> = match &settings.line_channel_access_token {
        Some(token) if !token.is_empty() => Arc::new(
            LineReplyClient::new(token.clone()).context("build reply client")?,
        ),
        _ => {
            tracing::warn!(
                target: "gohoubi",
                event = "reply_delivery_disabled",
                msg = "LINE_CHANNEL_ACCESS_TOKEN not set; replies are logged only"
            );
            Arc::new(LogReplySender)
        }
    };

    let state = AppState::new(handler, sender, Arc::new(TrustUpstream));
    let result = server::serve(state, settings.bind).await;
    pool.close().await;
    result
}

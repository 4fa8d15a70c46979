//! gigbot: agente autônomo para marketplaces de micro-tarefas.
//!
//! Varre jobs abertos, dá lances, monitora prêmios, gera e valida entregas,
//! publica artefatos e reconcilia pagamentos em um único loop de polling.

mod bidding;
mod categorize;
mod cli;
mod codemodel;
mod config;
mod error;
mod marketplace;
mod monitor;
mod orchestrator;
mod pipeline;
mod preflight;
mod settlement;
mod state;
mod ui;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};
use crate::codemodel::ModelClient;
use crate::config::BotConfig;
use crate::marketplace::MarketplaceClient;
use crate::orchestrator::PollLoop;
use crate::pipeline::publish::GistHost;
use crate::pipeline::validate::SubprocessRunner;
use crate::state::BotState;
use crate::ui::EventLog;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BotConfig::load(cli.config.as_deref())?;
    let state_path = PathBuf::from(&config.state_path);

    match cli.command {
        Command::Status => {
            let state = BotState::load(&state_path)?;
            ui::print_status(&state);
            Ok(())
        }
        Command::ResetBids => {
            let mut state = BotState::load(&state_path)?;
            let cleared = state.reset_bid_history();
            state.save(&state_path)?;
            println!("cleared {cleared} job ids from the bid history");
            Ok(())
        }
        Command::Run => {
            let (looper, mut state) = build_loop(&config, cli.verbose)?;
            looper.run(&mut state).await
        }
        Command::Once => {
            let (looper, mut state) = build_loop(&config, cli.verbose)?;
            looper.run_once(&mut state).await
        }
    }
}

fn build_loop(
    config: &BotConfig,
    verbose: bool,
) -> Result<(PollLoop<ModelClient, GistHost, SubprocessRunner>, BotState)> {
    config.validate()?;

    let state = BotState::load(Path::new(&config.state_path))?;
    let log = EventLog::new(Some(PathBuf::from(&config.event_log_path)), verbose);
    let client = MarketplaceClient::new(config.api_token.clone(), config.marketplace_url.clone());

    // Sem a chave do modelo o pipeline ainda funciona, só que limitado ao
    // gerador de template.
    let model = if config.anthropic_api_key.is_empty() {
        log.warn("no Anthropic API key configured; using template generation only");
        None
    } else {
        Some(ModelClient::new(
            config.anthropic_api_key.clone(),
            config.model.clone(),
        ))
    };

    let host = GistHost::new(config.github_token.clone());

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nshutdown requested; stopping at the next cycle boundary");
            stop_flag.store(true, Ordering::SeqCst);
        }
    });

    let looper = PollLoop::new(
        config.clone(),
        client,
        model,
        host,
        SubprocessRunner,
        log,
        stop,
    );
    Ok((looper, state))
}

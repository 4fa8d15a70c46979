//! Interface de linha de comando do gigbot baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, once, status,
//! reset-bids) e flags globais (--config, --verbose).

use clap::{Parser, Subcommand};

/// gigbot: agente autônomo de marketplace de tarefas.
#[derive(Debug, Parser)]
#[command(name = "gigbot", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração (padrão: gigbot.toml).
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa o loop de polling contínuo (roda indefinidamente).
    Run,

    /// Executa exatamente um ciclo de polling e encerra.
    Once,

    /// Mostra o snapshot de estado atual: coleções, lances e ganhos.
    Status,

    /// Limpa o histórico de jobs já licitados (a única operação de reset).
    ResetBids,
}

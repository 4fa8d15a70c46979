//! Interface de terminal e log de eventos do gigbot.
//!
//! Usa a crate `console` para estilização com cores e `indicatif` para o
//! spinner de espera entre ciclos. O [`EventLog`] registra cada transição de
//! estado e cada falha com timestamp em um arquivo append-only. Nenhuma
//! falha é silenciosa.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::state::BotState;

/// Log de eventos com espelho colorido no terminal.
///
/// Cada entrada é anexada ao arquivo de log com timestamp UTC. Erros de IO ao
/// escrever o log são reportados no stderr e nunca derrubam o processo.
pub struct EventLog {
    path: Option<PathBuf>,
    verbose: bool,
    green: Style,
    red: Style,
    yellow: Style,
    cyan: Style,
}

impl EventLog {
    pub fn new(path: Option<PathBuf>, verbose: bool) -> Self {
        Self {
            path,
            verbose,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            cyan: Style::new().cyan(),
        }
    }

    // Anexa uma linha com timestamp ao arquivo de log.
    fn append(&self, level: &str, msg: &str) {
        let Some(path) = &self.path else { return };
        let line = format!("[{}] {level} {msg}\n", Utc::now().to_rfc3339());
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            eprintln!("event log write failed: {e}");
        }
    }

    /// Evento informativo.
    pub fn info(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        println!("  {msg}");
        self.append("INFO", msg);
    }

    /// Evento de diagnóstico, exibido apenas em modo verbose (sempre logado).
    pub fn debug(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        if self.verbose {
            println!("  {}", self.cyan.apply_to(msg));
        }
        self.append("DEBUG", msg);
    }

    /// Falha não fatal; o ciclo continua.
    pub fn warn(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        println!("  {} {msg}", self.yellow.apply_to("!"));
        self.append("WARN", msg);
    }

    /// Falha de nível de ciclo.
    pub fn error(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        eprintln!("  {} {msg}", self.red.apply_to("✗"));
        self.append("ERROR", msg);
    }

    /// Transição de estado de um job rastreado.
    pub fn transition(&self, job_id: &str, from: &str, to: &str) {
        let msg = format!("job {job_id}: {from} -> {to}");
        println!("  {} {msg}", self.green.apply_to("»"));
        self.append("STATE", &msg);
    }
}

/// Exibe um spinner durante a espera entre ciclos.
pub async fn idle_wait(seconds: u64) {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .expect("invalid template"),
    );
    pb.set_message(format!("next cycle in {seconds}s"));
    pb.enable_steady_tick(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    pb.finish_and_clear();
}

/// Imprime o resumo do snapshot de estado para o comando `status`.
pub fn print_status(state: &BotState) {
    let bold = Style::new().bold();
    let green = Style::new().green().bold();
    println!("{}", bold.apply_to("─── gigbot status ───"));
    println!("  bids placed (total):  {}", state.bids_placed);
    println!("  cycles completed:     {}", state.cycles_completed);
    println!("  already-bid jobs:     {}", state.already_bid_job_ids.len());
    println!("  pending bids:         {}", state.pending_bids.len());
    println!("  active jobs:          {}", state.active_jobs.len());
    println!("  delivered jobs:       {}", state.delivered_jobs.len());
    println!("  paid jobs:            {}", state.paid_jobs.len());
    println!(
        "  total earnings:       {}",
        green.apply_to(format!("{:.2}", state.total_earnings))
    );
}

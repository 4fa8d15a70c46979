//! Configuração do gigbot carregada a partir de `gigbot.toml`.
//!
//! A struct [`BotConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `GIGBOT_API_TOKEN`, `ANTHROPIC_API_KEY` e
//! `GITHUB_TOKEN` têm precedência sobre o arquivo.

use serde::Deserialize;
use std::path::Path;

use crate::error::BotError;

/// Estratégia de precificação dos lances.
///
/// `aggressive` multiplica para baixo (lances mais baratos para ganhar mais
/// jobs), `conservative` multiplica para cima.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Aggressive,
    Balanced,
    Conservative,
}

impl Strategy {
    /// Fator aplicado sobre `orçamento × multiplicador de categoria`.
    pub fn factor(&self) -> f64 {
        match self {
            Strategy::Aggressive => 0.75,
            Strategy::Balanced => 1.0,
            Strategy::Conservative => 1.25,
        }
    }
}

/// Configuração de nível superior carregada de `gigbot.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Token de autenticação do marketplace. Obrigatório.
    #[serde(default)]
    pub api_token: String,

    /// URL base da API do marketplace.
    #[serde(default = "default_marketplace_url")]
    pub marketplace_url: String,

    /// Chave da API Anthropic para geração de código. Opcional; sem ela o
    /// pipeline usa apenas o gerador de template.
    #[serde(default)]
    pub anthropic_api_key: String,

    /// Token do GitHub para publicar entregas como gists.
    #[serde(default)]
    pub github_token: String,

    /// Modelo usado para geração e correção de código.
    #[serde(default = "default_model")]
    pub model: String,

    /// Estratégia de precificação dos lances.
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,

    /// Valor mínimo de qualquer lance, em unidades da moeda do marketplace.
    #[serde(default = "default_floor_price")]
    pub floor_price: f64,

    /// Orçamento mínimo para considerar um job na varredura.
    #[serde(default)]
    pub min_budget: f64,

    /// Número máximo de lances existentes para ainda valer a pena concorrer.
    #[serde(default = "default_max_bid_count")]
    pub max_bid_count: u32,

    /// Estimativa de entrega enviada com cada lance, em segundos.
    #[serde(default = "default_delivery_eta_secs")]
    pub delivery_eta_secs: u64,

    /// Intervalo entre ciclos de polling, em segundos.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Atraso fixo entre lances consecutivos dentro de um ciclo, em segundos.
    #[serde(default = "default_bid_delay_secs")]
    pub bid_delay_secs: u64,

    /// Erros de ciclo consecutivos antes de entrar em cooldown.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// Duração do cooldown após erros consecutivos, em segundos.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Caminho do snapshot de estado durável.
    #[serde(default = "default_state_path")]
    pub state_path: String,

    /// Caminho do log de eventos append-only.
    #[serde(default = "default_event_log_path")]
    pub event_log_path: String,

    /// Diretório de trabalho para artefatos gerados.
    #[serde(default = "default_workdir")]
    pub workdir: String,
}

fn default_marketplace_url() -> String {
    "https://api.taskmarket.dev/v1".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_strategy() -> Strategy {
    Strategy::Balanced
}

fn default_floor_price() -> f64 {
    5.0
}

fn default_max_bid_count() -> u32 {
    10
}

fn default_delivery_eta_secs() -> u64 {
    86_400
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_bid_delay_secs() -> u64 {
    2
}

fn default_max_consecutive_errors() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    900
}

fn default_state_path() -> String {
    "gigbot_state.json".to_string()
}

fn default_event_log_path() -> String {
    "gigbot_events.log".to_string()
}

fn default_workdir() -> String {
    ".gigbot/work".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            marketplace_url: default_marketplace_url(),
            anthropic_api_key: String::new(),
            github_token: String::new(),
            model: default_model(),
            strategy: default_strategy(),
            floor_price: default_floor_price(),
            min_budget: 0.0,
            max_bid_count: default_max_bid_count(),
            delivery_eta_secs: default_delivery_eta_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            bid_delay_secs: default_bid_delay_secs(),
            max_consecutive_errors: default_max_consecutive_errors(),
            cooldown_secs: default_cooldown_secs(),
            state_path: default_state_path(),
            event_log_path: default_event_log_path(),
            workdir: default_workdir(),
        }
    }
}

impl BotConfig {
    /// Carrega a configuração do caminho fornecido, ou de `gigbot.toml` no
    /// diretório atual. Usa valores padrão se o arquivo não existir.
    pub fn load(path: Option<&str>) -> Result<Self, BotError> {
        let path = Path::new(path.unwrap_or("gigbot.toml"));
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<BotConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variáveis de ambiente têm precedência sobre o arquivo de configuração.
        if let Ok(token) = std::env::var("GIGBOT_API_TOKEN")
            && !token.is_empty()
        {
            config.api_token = token;
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY")
            && !key.is_empty()
        {
            config.anthropic_api_key = key;
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN")
            && !token.is_empty()
        {
            config.github_token = token;
        }

        Ok(config)
    }

    /// Verifica credenciais obrigatórias. Nenhum ciclo pode rodar sem o token
    /// do marketplace, então a falta dele aborta o processo na inicialização.
    pub fn validate(&self) -> Result<(), BotError> {
        if self.api_token.is_empty() {
            return Err(BotError::Config(
                "marketplace API token not set (gigbot.toml api_token or GIGBOT_API_TOKEN)".into(),
            ));
        }
        Ok(())
    }
}

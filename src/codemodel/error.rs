//! Tipos de erro para o colaborador de geração de código.
//!
//! Define [`ModelError`] com variantes para rate limiting, erros da API
//! e erros de rede. Usa `thiserror` para derivar `Display` e `Error`
//! automaticamente a partir dos atributos `#[error(...)]`.
//!
//! Falha de geração é um resultado de primeira classe: o pipeline reage
//! caindo para o gerador de template, nunca abortando o job.

use thiserror::Error;

/// Erros que podem ocorrer ao chamar o modelo de geração de código.
#[derive(Debug, Error)]
pub enum ModelError {
    /// O servidor retornou HTTP 429 (rate limit).
    /// O campo `retry_after_ms` indica quantos milissegundos esperar antes de retentar.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro retornado pela API (ex.: 401 chave inválida, 500 erro interno).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// A resposta não continha nenhum bloco de texto utilizável.
    #[error("empty response from model")]
    EmptyResponse,
}

//! Tipos de dados para as respostas da API do marketplace.
//!
//! Todas as structs derivam `Serialize` e `Deserialize` para conversão JSON.
//! Os campos seguem o formato camelCase do marketplace via
//! `#[serde(rename_all = "camelCase")]`.

use serde::{Deserialize, Serialize};

/// Status de um job no marketplace. `Awarded` significa atribuído a este agente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Awarded,
    Expired,
    Completed,
    Closed,
}

/// Um job descoberto na varredura de jobs abertos.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Identificador opaco, globalmente único, atribuído pelo marketplace.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Orçamento anunciado. Pode ser nulo.
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub bid_count: u32,
    pub status: JobStatus,
}

/// Status de um lance deste agente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Um lance colocado por este agente.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: String,
    pub job_id: String,
    pub amount: f64,
    #[serde(default)]
    pub proposal: String,
    #[serde(default)]
    pub eta_seconds: u64,
    pub status: BidStatus,
}

/// Status de uma atribuição criada pelo marketplace ao aceitar um lance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    InProgress,
    Submitted,
    Accepted,
    Disputed,
}

/// Uma atribuição, descoberta (nunca gerada), via consulta de detalhe do job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub status: AssignmentStatus,
    #[serde(default)]
    pub escrow_amount: Option<f64>,
}

/// Detalhe completo de um job, incluindo as atribuições deste agente.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: JobStatus,
    #[serde(default)]
    pub my_assignments: Vec<Assignment>,
}

impl JobDetail {
    /// A atribuição relevante: prefere uma com status `in_progress`, senão a
    /// primeira presente.
    pub fn primary_assignment(&self) -> Option<&Assignment> {
        self.my_assignments
            .iter()
            .find(|a| a.status == AssignmentStatus::InProgress)
            .or_else(|| self.my_assignments.first())
    }

    /// A atribuição com o identificador dado, se conhecida, senão a primária.
    pub fn assignment_for(&self, assignment_id: Option<&str>) -> Option<&Assignment> {
        if let Some(id) = assignment_id
            && let Some(a) = self.my_assignments.iter().find(|a| a.id == id)
        {
            return Some(a);
        }
        self.primary_assignment()
    }
}

/// Uma mensagem trocada em uma atribuição.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentMessage {
    pub id: String,
    #[serde(default)]
    pub author: String,
    pub body: String,
}

pub mod client;
pub mod error;
pub mod types;

pub use client::ModelClient;
pub use error::ModelError;

/// The code-generation collaborator seam.
///
/// Takes a job-specific prompt and returns raw text which the pipeline parses
/// into `=== FILE: path ===` delimited files. Failure is a first-class
/// outcome; callers fall back to the template generator.
pub trait CodeModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

//! Build-Verify-Fix loop: turns a won job into a published [`Deliverable`].
//!
//! Generation failure falls back to a template bundle; validation failure
//! feeds the failing output back to the code model for a bounded number of
//! full-file corrections; a still-failing artifact set is published and
//! submitted anyway rather than blocking the job forever. Only a hosting
//! failure yields no deliverable.

pub mod files;
pub mod publish;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::codemodel::CodeModel;
use crate::state::TrackedJob;
use crate::ui::EventLog;
use files::{GeneratedFile, merge_by_path, parse_files, serialize_files, template_fallback};
use publish::ArtifactHost;
use validate::{StepRunner, ValidationStep, detect_kind, steps_for, write_files};

/// Extra correction rounds after the first failing run of a step.
/// Attempts are 0-indexed and the cap is inclusive.
pub const MAX_FIX_ATTEMPTS: u32 = 2;

/// A produced artifact: a reachable URL plus a content hash over the summary
/// document. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Deliverable {
    pub url: String,
    pub content_hash: String,
    /// Set when validation never went green; logged at submission time.
    pub validation_failure: Option<String>,
}

pub struct BuildPipeline<'a, M, H, R> {
    model: Option<&'a M>,
    host: &'a H,
    runner: &'a R,
    workdir: &'a Path,
    log: &'a EventLog,
}

impl<'a, M, H, R> BuildPipeline<'a, M, H, R>
where
    M: CodeModel,
    H: ArtifactHost,
    R: StepRunner,
{
    pub fn new(
        model: Option<&'a M>,
        host: &'a H,
        runner: &'a R,
        workdir: &'a Path,
        log: &'a EventLog,
    ) -> Self {
        Self {
            model,
            host,
            runner,
            workdir,
            log,
        }
    }

    /// Drive one job through generate -> validate -> fix -> publish.
    ///
    /// Returns `Ok(None)` only when hosting failed; the job then stays
    /// awarded and is retried next cycle.
    pub async fn produce(&self, job: &TrackedJob) -> Result<Option<Deliverable>> {
        let (mut artifacts, used_fallback) = self.generate_files(job).await;

        let kind = detect_kind(&artifacts);
        let scratch = self.workdir.join(format!("job-{}", Uuid::new_v4()));
        write_files(&scratch, &artifacts).context("writing artifacts to scratch dir")?;
        self.log
            .debug(format!("job {}: {kind:?} artifacts in {}", job.job_id, scratch.display()));

        let mut last_failure: Option<String> = None;

        'stages: for step in steps_for(kind) {
            for attempt in 0..=MAX_FIX_ATTEMPTS {
                let report = self.runner.run(kind, step, &scratch, &artifacts).await;
                if report.passed {
                    continue 'stages;
                }
                last_failure = Some(format!("{} failed: {}", report.step, report.output));

                if step == ValidationStep::Install {
                    // Install failures are environmental; a fix round can't help.
                    self.log
                        .warn(format!("job {}: install failed, continuing", job.job_id));
                    continue 'stages;
                }
                if used_fallback || self.model.is_none() || attempt == MAX_FIX_ATTEMPTS {
                    self.log.warn(format!(
                        "job {}: {step} still failing after {attempt} fix attempt(s), proceeding anyway",
                        job.job_id
                    ));
                    continue 'stages;
                }

                let fixes = self.request_fix(job, &report.output, &artifacts).await;
                if fixes.is_empty() {
                    // A fix round with nothing parseable is a no-op, not an error.
                    self.log
                        .debug(format!("job {}: fix round returned no files", job.job_id));
                    continue 'stages;
                }
                merge_by_path(&mut artifacts, fixes);
                write_files(&scratch, &artifacts).context("rewriting fixed artifacts")?;
            }
        }

        let summary = summary_doc(job, &artifacts, last_failure.as_deref());

        let url = match self.host.publish(&artifacts, &summary).await {
            Ok(url) => url,
            Err(e) => {
                // An unreachable delivery equals no delivery; no private fallback.
                self.log
                    .warn(format!("job {}: hosting failed, no deliverable: {e}", job.job_id));
                return Ok(None);
            }
        };

        Ok(Some(Deliverable {
            url,
            content_hash: content_hash(&summary),
            validation_failure: last_failure,
        }))
    }

    // Generate the initial artifact set, falling back to the template bundle
    // on any model failure. The bool reports whether the fallback was used.
    async fn generate_files(&self, job: &TrackedJob) -> (Vec<GeneratedFile>, bool) {
        let Some(model) = self.model else {
            return (template_fallback(&job.title, &job.description), true);
        };

        match model.generate(&generation_prompt(job)).await {
            Ok(text) => {
                let parsed = parse_files(&text);
                if parsed.is_empty() {
                    self.log.warn(format!(
                        "job {}: model output had no file markers, using template",
                        job.job_id
                    ));
                    (template_fallback(&job.title, &job.description), true)
                } else {
                    (parsed, false)
                }
            }
            Err(e) => {
                self.log.warn(format!(
                    "job {}: generation failed ({e}), using template",
                    job.job_id
                ));
                (template_fallback(&job.title, &job.description), true)
            }
        }
    }

    // One correction round: failing output plus current files, asking for
    // corrected full files in the same marker format.
    async fn request_fix(
        &self,
        job: &TrackedJob,
        failure_output: &str,
        artifacts: &[GeneratedFile],
    ) -> Vec<GeneratedFile> {
        let Some(model) = self.model else {
            return Vec::new();
        };
        let prompt = format!(
            "The project below failed validation. Return corrected FULL files, \
             using exactly the delimiter format `=== FILE: <path> ===` before each file. \
             Only include files that need to change.\n\n\
             Failure output:\n{failure_output}\n\n\
             Current files:\n{}",
            serialize_files(artifacts)
        );
        match model.generate(&prompt).await {
            Ok(text) => parse_files(&text),
            Err(e) => {
                self.log
                    .warn(format!("job {}: fix round failed: {e}", job.job_id));
                Vec::new()
            }
        }
    }
}

fn generation_prompt(job: &TrackedJob) -> String {
    let mut prompt = format!(
        "You are completing a paid task from an online marketplace. \
         Produce complete, working files for it.\n\
         Respond ONLY with files, each preceded by a delimiter line in the exact \
         format `=== FILE: <path> ===`. Include a manifest (package.json or \
         Cargo.toml) when the task needs dependencies.\n\n\
         Task: {}\n\nDetails: {}",
        job.title, job.description
    );
    if let Some(feedback) = &job.last_feedback {
        prompt.push_str(&format!(
            "\n\nThe requester reviewed a previous delivery and sent it back. \
             Address this feedback:\n{feedback}"
        ));
    }
    prompt
}

/// The summary document published with the bundle; also the hash input.
fn summary_doc(job: &TrackedJob, artifacts: &[GeneratedFile], failure: Option<&str>) -> String {
    let mut doc = format!("# Delivery: {}\n\n{}\n\n## Files\n\n", job.title, job.description);
    for file in artifacts {
        doc.push_str(&format!("- `{}`\n", file.path));
    }
    if let Some(failure) = failure {
        doc.push_str(&format!("\n## Known validation issue\n\n```\n{failure}\n```\n"));
    }
    doc
}

fn content_hash(summary: &str) -> String {
    let digest = Sha256::digest(summary.as_bytes());
    digest.iter().fold(String::new(), |mut acc, b| {
        acc.push_str(&format!("{b:02x}"));
        acc
    })
}

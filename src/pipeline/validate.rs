//! Validation collaborators: project-kind detection and the subprocess steps
//! (install / build / test) that stand in for a human reviewer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use super::files::GeneratedFile;

const STEP_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_OUTPUT_TAIL: usize = 4_000;

/// The validation pipeline chosen for an artifact set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectKind {
    /// Has a package.json manifest.
    Node,
    /// Has a Cargo.toml manifest.
    Cargo,
    /// Loose script files only.
    Script,
    /// Nothing we know how to validate.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStep {
    Install,
    Build,
    Test,
}

impl std::fmt::Display for ValidationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationStep::Install => write!(f, "install"),
            ValidationStep::Build => write!(f, "build"),
            ValidationStep::Test => write!(f, "test"),
        }
    }
}

/// Outcome of one validation step: pass/fail plus captured output.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: ValidationStep,
    pub passed: bool,
    pub output: String,
}

/// Classify the artifact set by manifest/extension markers.
pub fn detect_kind(files: &[GeneratedFile]) -> ProjectKind {
    if files.iter().any(|f| f.path == "package.json") {
        ProjectKind::Node
    } else if files.iter().any(|f| f.path == "Cargo.toml") {
        ProjectKind::Cargo
    } else if files
        .iter()
        .any(|f| [".js", ".py", ".sh"].iter().any(|ext| f.path.ends_with(ext)))
    {
        ProjectKind::Script
    } else {
        ProjectKind::Unknown
    }
}

/// The ordered steps for a project kind. Scripts get a syntax check only.
pub fn steps_for(kind: ProjectKind) -> Vec<ValidationStep> {
    match kind {
        ProjectKind::Node | ProjectKind::Cargo => vec![
            ValidationStep::Install,
            ValidationStep::Build,
            ValidationStep::Test,
        ],
        ProjectKind::Script => vec![ValidationStep::Build],
        ProjectKind::Unknown => Vec::new(),
    }
}

/// Write the artifact set into a scratch directory. Paths that would escape
/// the directory are skipped.
pub fn write_files(dir: &Path, files: &[GeneratedFile]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    for file in files {
        let rel = PathBuf::from(&file.path);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            continue;
        }
        let target = dir.join(rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, &file.content)?;
    }
    Ok(())
}

/// The seam between the fix loop and the real toolchain, so the loop can be
/// exercised without spawning subprocesses.
pub trait StepRunner {
    async fn run(
        &self,
        kind: ProjectKind,
        step: ValidationStep,
        dir: &Path,
        files: &[GeneratedFile],
    ) -> StepReport;
}

/// Runs validation steps as real subprocesses in the scratch directory.
pub struct SubprocessRunner;

impl StepRunner for SubprocessRunner {
    async fn run(
        &self,
        kind: ProjectKind,
        step: ValidationStep,
        dir: &Path,
        files: &[GeneratedFile],
    ) -> StepReport {
        let commands: Vec<(&str, Vec<String>)> = match (kind, step) {
            (ProjectKind::Node, ValidationStep::Install) => vec![(
                "npm",
                vec!["install".into(), "--no-audit".into(), "--no-fund".into()],
            )],
            (ProjectKind::Node, ValidationStep::Build) => vec![(
                "npm",
                vec!["run".into(), "build".into(), "--if-present".into()],
            )],
            (ProjectKind::Node, ValidationStep::Test) => vec![(
                "npm",
                vec!["test".into(), "--if-present".into()],
            )],
            (ProjectKind::Cargo, ValidationStep::Install) => {
                vec![("cargo", vec!["fetch".into()])]
            }
            (ProjectKind::Cargo, ValidationStep::Build) => {
                vec![("cargo", vec!["build".into()])]
            }
            (ProjectKind::Cargo, ValidationStep::Test) => {
                vec![("cargo", vec!["test".into()])]
            }
            // Scripts: per-file syntax checks.
            (ProjectKind::Script, ValidationStep::Build) => files
                .iter()
                .filter_map(|f| {
                    if f.path.ends_with(".js") {
                        Some(("node", vec!["--check".into(), f.path.clone()]))
                    } else if f.path.ends_with(".py") {
                        Some(("python3", vec!["-m".into(), "py_compile".into(), f.path.clone()]))
                    } else if f.path.ends_with(".sh") {
                        Some(("sh", vec!["-n".into(), f.path.clone()]))
                    } else {
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };

        let mut combined = String::new();
        for (program, args) in commands {
            let report = run_command(program, &args, dir, step).await;
            combined.push_str(&report.output);
            if !report.passed {
                return StepReport {
                    step,
                    passed: false,
                    output: combined,
                };
            }
        }
        StepReport {
            step,
            passed: true,
            output: combined,
        }
    }
}

async fn run_command(program: &str, args: &[String], dir: &Path, step: ValidationStep) -> StepReport {
    let result = tokio::time::timeout(
        STEP_TIMEOUT,
        Command::new(program)
            .args(args)
            .current_dir(dir)
            .kill_on_drop(true)
            .output(),
    )
    .await;

    match result {
        Ok(Ok(output)) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            StepReport {
                step,
                passed: output.status.success(),
                output: tail(&text),
            }
        }
        Ok(Err(e)) => StepReport {
            step,
            passed: false,
            output: format!("failed to spawn {program}: {e}"),
        },
        Err(_) => StepReport {
            step,
            passed: false,
            output: format!("{program} timed out after {}s", STEP_TIMEOUT.as_secs()),
        },
    }
}

// Keep only the tail of huge tool output; failures show up at the end.
fn tail(text: &str) -> String {
    if text.len() <= MAX_OUTPUT_TAIL {
        return text.to_string();
    }
    let start = text.len() - MAX_OUTPUT_TAIL;
    let start = (start..text.len())
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(start);
    format!("[...]{}", &text[start..])
}

// crates/driftwatch-daemon/src/training.rs
//
// Training procedure backed by an external command.
//
// The command receives the dataset reference as its last argument (and in
// DRIFTWATCH_DATASET_REF). On success it exits 0 and prints a JSON object
// `{"artifact_ref": "...", "metrics": {"accuracy": 0.91}}` as the last
// non-empty line of stdout. The child is killed if the orchestrator's
// timeout or a cancellation drops the future.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use driftwatch_core::{DriftwatchError, TrainingOutput, TrainingProcedure};

/// Bytes of stderr kept in failure messages.
const STDERR_TAIL: usize = 2048;

#[derive(Debug, Clone)]
pub struct CommandTrainingProcedure {
    program: String,
    args: Vec<String>,
}

impl CommandTrainingProcedure {
    /// Build from `[program, args...]`.
    pub fn new(command: &[String]) -> Result<Self, DriftwatchError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| DriftwatchError::Config("train_command is empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl TrainingProcedure for CommandTrainingProcedure {
    async fn train(&self, dataset_ref: &str) -> Result<TrainingOutput, DriftwatchError> {
        tracing::debug!("Running {} {:?} {}", self.program, self.args, dataset_ref);
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(dataset_ref)
            .env("DRIFTWATCH_DATASET_REF", dataset_ref)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                DriftwatchError::TrainingFailure(format!("cannot start {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DriftwatchError::TrainingFailure(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                tail(stderr.trim(), STDERR_TAIL)
            )));
        }
        parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse the last non-empty stdout line as a `TrainingOutput`.
pub fn parse_output(stdout: &str) -> Result<TrainingOutput, DriftwatchError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| {
            DriftwatchError::TrainingFailure("training command printed nothing".to_string())
        })?;
    let output: TrainingOutput = serde_json::from_str(line)?;
    if output.artifact_ref.trim().is_empty() {
        return Err(DriftwatchError::TrainingFailure(
            "training output has an empty artifact_ref".to_string(),
        ));
    }
    Ok(output)
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

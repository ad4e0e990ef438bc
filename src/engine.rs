//! External geometry engine boundary
//!
//! The core hands over a `BuildPlan` by value and gets back either the
//! output path or a structured failure. Mesh geometry is never inspected.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error};

use crate::plan::BuildPlan;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineOutput {
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineFailure {
    #[serde(default)]
    pub step_index: Option<usize>,
    pub message: String,
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step_index {
            Some(i) => write!(f, "engine failed at step {}: {}", i, self.message),
            None => write!(f, "engine failed: {}", self.message),
        }
    }
}

impl std::error::Error for EngineFailure {}

impl EngineFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { step_index: None, message: message.into() }
    }

    pub fn at_step(step_index: usize, message: impl Into<String>) -> Self {
        Self { step_index: Some(step_index), message: message.into() }
    }
}

#[async_trait]
pub trait GeometryEngine: Send + Sync {
    async fn execute(&self, plan: BuildPlan) -> Result<EngineOutput, EngineFailure>;
}

fn plan_file_for(plan: &BuildPlan) -> Result<PathBuf, EngineFailure> {
    let export = plan
        .export_paths()
        .first()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| EngineFailure::new("plan has no export step"))?;
    Ok(export.with_extension("plan.json"))
}

async fn write_plan(plan: &BuildPlan, path: &Path) -> Result<(), EngineFailure> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| EngineFailure::new(format!("cannot create {}: {}", parent.display(), e)))?;
    }
    let body = serde_json::to_vec_pretty(plan).map_err(|e| EngineFailure::new(e.to_string()))?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| EngineFailure::new(format!("cannot write {}: {}", path.display(), e)))
}

/// Writes the plan as `<export stem>.plan.json` for an out-of-process mesh
/// backend to pick up. The reported output is the plan file itself.
#[derive(Debug, Default, Clone)]
pub struct PlanFileEngine;

#[async_trait]
impl GeometryEngine for PlanFileEngine {
    async fn execute(&self, plan: BuildPlan) -> Result<EngineOutput, EngineFailure> {
        let plan_path = plan_file_for(&plan)?;
        write_plan(&plan, &plan_path).await?;
        debug!(path = %plan_path.display(), "Plan file written");
        Ok(EngineOutput { output_path: plan_path })
    }
}

/// Runs an external program with the plan file path appended to its
/// arguments. On failure the program may print an `EngineFailure` JSON
/// object on stdout; otherwise stderr becomes the message.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }
}

#[async_trait]
impl GeometryEngine for CommandEngine {
    async fn execute(&self, plan: BuildPlan) -> Result<EngineOutput, EngineFailure> {
        let plan_path = plan_file_for(&plan)?;
        let output_path = plan
            .export_paths()
            .first()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| plan_path.clone());
        write_plan(&plan, &plan_path).await?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&plan_path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineFailure::new(format!("failed to start {}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(program = %self.program.display(), stderr = %stderr, "Geometry engine failed");
            return Err(serde_json::from_slice::<EngineFailure>(&output.stdout)
                .unwrap_or_else(|_| EngineFailure::new(stderr.trim().to_string())));
        }

        Ok(EngineOutput { output_path })
    }
}

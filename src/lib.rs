//! Nameplate Core - Design Compiler for 3D printed nameplates
//!
//! # The Five Laws (Non-Negotiable)
//! 1. The Design Model Is Truth
//! 2. Templates Merge, Never Replace
//! 3. Validation Findings Are Data
//! 4. Plans Are Deterministic and Declarative
//! 5. The Engine Builds, the Core Decides

pub mod design;
pub mod limits;
pub mod layout;
pub mod validation;
pub mod templates;
pub mod hashing;
pub mod plan;
pub mod engine;
pub mod rows;
pub mod batch;
pub mod project;
pub mod estimate;
pub mod pipeline;
pub mod logging;

pub use design::{DesignError, DesignField, DesignModel, DesignPatch, Finish, Material, QrPosition, QrSpec, QrStyle, TextLine};
pub use limits::{DesignLimits, LimitsAuthority, ScoringPenalties};
pub use validation::{Severity, ValidationIssue, ValidationResult, Validator};
pub use templates::{CatalogError, Template, TemplateCatalog, TemplateSummary};
pub use plan::{BuildPlan, BuildStep, CompileError, ExportFormat, ExportOptions, PlanCompiler};
pub use engine::{CommandEngine, EngineFailure, EngineOutput, GeometryEngine, PlanFileEngine};
pub use rows::{BatchRow, RowsError};
pub use batch::{BatchCoordinator, BatchJob, BatchOptions, BatchReport, JobReason, JobStatus};
pub use project::{ProjectError, ProjectFile};
pub use pipeline::{DesignPipeline, PipelineError};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Validate a design against the default limits.
pub fn validate(model: &DesignModel) -> ValidationResult {
    Validator::default().validate(model)
}

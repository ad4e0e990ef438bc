//! Design Pipeline - Single Entry Point
//!
//! Template or user input -> design -> validator (gate) -> compiler.
//! CRITICAL: compile_design always validates. No bypass.

use std::sync::Arc;
use thiserror::Error;

use crate::design::DesignModel;
use crate::estimate::{estimate, PrintEstimate};
use crate::limits::DesignLimits;
use crate::plan::{BuildPlan, CompileError, ExportOptions, PlanCompiler};
use crate::templates::{CatalogError, Template, TemplateCatalog, TemplateSummary};
use crate::validation::ValidationResult;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

pub struct DesignPipeline {
    catalog: TemplateCatalog,
    compiler: Arc<PlanCompiler>,
}

impl DesignPipeline {
    pub fn new(catalog: TemplateCatalog, limits: DesignLimits, export: ExportOptions) -> Self {
        Self {
            catalog,
            compiler: Arc::new(PlanCompiler::new(limits, export)),
        }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Shared handle for batch runs.
    pub fn compiler(&self) -> Arc<PlanCompiler> {
        Arc::clone(&self.compiler)
    }

    pub fn list_templates(&self) -> Vec<TemplateSummary> {
        self.catalog.list()
    }

    pub fn get_template(&self, name: &str) -> Result<&Template, PipelineError> {
        Ok(self.catalog.get(name)?)
    }

    /// Start a design from blank defaults, or from a template merged onto them.
    pub fn new_design(&self, template: Option<&str>) -> Result<DesignModel, PipelineError> {
        let blank = DesignModel::default();
        match template {
            Some(name) => Ok(self.catalog.apply(name, &blank)?),
            None => Ok(blank),
        }
    }

    pub fn validate_design(&self, model: &DesignModel) -> ValidationResult {
        self.compiler.validator().validate(model)
    }

    pub fn compile_design(&self, model: &DesignModel) -> Result<BuildPlan, PipelineError> {
        Ok(self.compiler.compile(model)?)
    }

    pub fn estimate_design(&self, model: &DesignModel, price_per_kg: f64) -> PrintEstimate {
        estimate(model, self.compiler.limits(), price_per_kg)
    }
}

impl Default for DesignPipeline {
    fn default() -> Self {
        Self::new(TemplateCatalog::builtin(), DesignLimits::default(), ExportOptions::default())
    }
}

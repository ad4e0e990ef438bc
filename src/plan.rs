//! Build Plan Compiler
//!
//! CRITICAL: compile MUST validate first. An invalid design is refused,
//! never repaired.
//!
//! Step order is fixed: glyphs per line, extrusion per line, base plate,
//! text positioning, optional QR embed, join, cleanup, exports.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::design::{DesignModel, QrSpec, QrStyle, TextLine};
use crate::hashing::{design_fingerprint, digest};
use crate::layout::{line_box, line_offset, qr_box, Rect};
use crate::limits::DesignLimits;
use crate::validation::{ValidationResult, Validator};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Invalid design: {}", .0.error_summary())]
    InvalidDesign(ValidationResult),

    #[error("Conflicting layout: QR code at ({:.1}, {:.1}) overlaps {line:?} line text", .qr.center_x, .qr.center_y)]
    ConflictingLayout { line: TextLine, qr: Rect, text: Rect },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Stl,
    Obj,
    Blend,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Stl => "stl",
            Self::Obj => "obj",
            Self::Blend => "blend",
        }
    }
}

/// Where and how the engine should write its output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportOptions {
    pub formats: Vec<ExportFormat>,
    pub output_dir: PathBuf,
    /// Defaults to `nameplate_<fingerprint prefix>` when unset.
    #[serde(default)]
    pub file_stem: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            formats: vec![ExportFormat::Stl],
            output_dir: PathBuf::from("output"),
            file_stem: None,
        }
    }
}

/// One declarative construction step. Only primitive parameters, so a plan
/// can be serialized and handed to any geometry backend.
///
/// Coordinates are mm from the plate centre; the plate top face is z = 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum BuildStep {
    CreateTextGlyphs {
        line: TextLine,
        text: String,
        font_id: String,
        size_mm: f64,
    },
    ExtrudeSolidify {
        line: TextLine,
        depth_mm: f64,
    },
    CreateBasePlate {
        length_mm: f64,
        width_mm: f64,
        thickness_mm: f64,
        bevel_mm: f64,
        bevel_segments: u32,
    },
    PositionText {
        line: TextLine,
        offset_x_mm: f64,
        offset_y_mm: f64,
    },
    EmbedQr {
        spec: QrSpec,
        center_x_mm: f64,
        center_y_mm: f64,
        depth_mm: f64,
    },
    JoinAll,
    CleanGeometry {
        merge_distance_mm: f64,
        recalculate_normals: bool,
    },
    Export {
        format: ExportFormat,
        path: PathBuf,
    },
}

impl BuildStep {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateTextGlyphs { .. } => "create_text_glyphs",
            Self::ExtrudeSolidify { .. } => "extrude_solidify",
            Self::CreateBasePlate { .. } => "create_base_plate",
            Self::PositionText { .. } => "position_text",
            Self::EmbedQr { .. } => "embed_qr",
            Self::JoinAll => "join_all",
            Self::CleanGeometry { .. } => "clean_geometry",
            Self::Export { .. } => "export",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildPlan {
    pub design_fingerprint: String,
    pub steps: Vec<BuildStep>,
}

impl BuildPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Paths of every export step, in order.
    pub fn export_paths(&self) -> Vec<&PathBuf> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                BuildStep::Export { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn digest(&self) -> Result<String, serde_json::Error> {
        digest(self)
    }
}

const BEVEL_SEGMENTS: u32 = 3;
const MAX_BEVEL_MM: f64 = 2.0;
const MERGE_DISTANCE_MM: f64 = 0.1;

pub struct PlanCompiler {
    validator: Validator,
    export: ExportOptions,
}

impl PlanCompiler {
    /// A plan always ends in at least one export; an empty format list
    /// falls back to STL.
    pub fn new(limits: DesignLimits, mut export: ExportOptions) -> Self {
        if export.formats.is_empty() {
            tracing::warn!("No export formats given; defaulting to STL");
            export.formats.push(ExportFormat::Stl);
        }
        Self { validator: Validator::new(limits), export }
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn limits(&self) -> &DesignLimits {
        self.validator.limits()
    }

    pub fn export_options(&self) -> &ExportOptions {
        &self.export
    }

    pub fn compile(&self, model: &DesignModel) -> Result<BuildPlan, CompileError> {
        self.compile_with_stem(model, self.export.file_stem.as_deref())
    }

    /// Compile with an explicit export file stem (batch rows need distinct names).
    pub fn compile_with_stem(
        &self,
        model: &DesignModel,
        file_stem: Option<&str>,
    ) -> Result<BuildPlan, CompileError> {
        // MANDATORY: Validation is always called.
        let validation = self.validator.validate(model);
        if !validation.is_valid {
            return Err(CompileError::InvalidDesign(validation));
        }

        let limits = self.validator.limits();
        let fingerprint = design_fingerprint(model)?;
        let lines = model.visible_lines();
        let mut steps = Vec::with_capacity(lines.len() * 3 + 6);

        for &line in &lines {
            steps.push(BuildStep::CreateTextGlyphs {
                line,
                text: model.text(line).trim().to_string(),
                font_id: model.font_id.clone(),
                size_mm: model.text_size_mm,
            });
        }
        for &line in &lines {
            steps.push(BuildStep::ExtrudeSolidify { line, depth_mm: model.letter_depth_mm });
        }

        steps.push(BuildStep::CreateBasePlate {
            length_mm: model.plate_length_mm,
            width_mm: model.plate_width_mm,
            thickness_mm: model.plate_thickness_mm,
            bevel_mm: (model.plate_thickness_mm * 0.2).min(MAX_BEVEL_MM),
            bevel_segments: BEVEL_SEGMENTS,
        });

        for &line in &lines {
            steps.push(BuildStep::PositionText {
                line,
                offset_x_mm: 0.0,
                offset_y_mm: line_offset(model, line),
            });
        }

        if let Some(qr) = &model.qr {
            let footprint = qr_box(qr, model, limits);
            let keep_out = footprint.inflate(limits.qr_clearance_mm);
            for &line in &lines {
                let text = line_box(model, line, limits);
                if keep_out.overlaps(&text) {
                    tracing::debug!(?line, "QR footprint collides with text");
                    return Err(CompileError::ConflictingLayout { line, qr: footprint, text });
                }
            }
            steps.push(BuildStep::EmbedQr {
                spec: qr.clone(),
                center_x_mm: footprint.center_x,
                center_y_mm: footprint.center_y,
                depth_mm: qr_depth(qr, model),
            });
        }

        steps.push(BuildStep::JoinAll);
        steps.push(BuildStep::CleanGeometry {
            merge_distance_mm: MERGE_DISTANCE_MM,
            recalculate_normals: true,
        });

        let stem = match file_stem {
            Some(stem) => stem.to_string(),
            None => format!("nameplate_{}", &fingerprint[..12]),
        };
        for format in &self.export.formats {
            steps.push(BuildStep::Export {
                format: *format,
                path: self.export.output_dir.join(format!("{}.{}", stem, format.extension())),
            });
        }

        tracing::debug!(steps = steps.len(), fingerprint = %fingerprint, "Compiled build plan");
        Ok(BuildPlan { design_fingerprint: fingerprint, steps })
    }
}

impl Default for PlanCompiler {
    fn default() -> Self {
        Self::new(DesignLimits::default(), ExportOptions::default())
    }
}

/// Embossed codes never stand taller than the letters; flat codes are printed
/// flush with the plate.
fn qr_depth(qr: &QrSpec, model: &DesignModel) -> f64 {
    match qr.style {
        QrStyle::Embossed => qr.depth_mm.min(model.letter_depth_mm),
        QrStyle::Recessed => qr.depth_mm,
        QrStyle::Flat => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{QrPosition, QrSpec};

    fn kinds(plan: &BuildPlan) -> Vec<&'static str> {
        plan.steps.iter().map(BuildStep::kind).collect()
    }

    #[test]
    fn test_two_line_step_order() {
        let plan = PlanCompiler::default().compile(&DesignModel::default()).unwrap();
        assert_eq!(
            kinds(&plan),
            vec![
                "create_text_glyphs",
                "create_text_glyphs",
                "extrude_solidify",
                "extrude_solidify",
                "create_base_plate",
                "position_text",
                "position_text",
                "join_all",
                "clean_geometry",
                "export",
            ]
        );
    }

    #[test]
    fn test_single_line_plan() {
        let model = DesignModel { line1: String::new(), ..DesignModel::default() };
        let plan = PlanCompiler::default().compile(&model).unwrap();
        assert_eq!(kinds(&plan)[0], "create_text_glyphs");
        assert_eq!(kinds(&plan)[1], "extrude_solidify");
        assert!(plan.steps.contains(&BuildStep::PositionText {
            line: TextLine::Second,
            offset_x_mm: 0.0,
            offset_y_mm: 0.0,
        }));
    }

    #[test]
    fn test_lines_offset_symmetrically() {
        let plan = PlanCompiler::default().compile(&DesignModel::default()).unwrap();
        let offsets: Vec<f64> = plan
            .steps
            .iter()
            .filter_map(|s| match s {
                BuildStep::PositionText { offset_y_mm, .. } => Some(*offset_y_mm),
                _ => None,
            })
            .collect();
        assert_eq!(offsets, vec![17.5, -17.5]);
    }

    #[test]
    fn test_bevel_is_adaptive() {
        let model = DesignModel { plate_thickness_mm: 5.0, letter_depth_mm: 3.0, ..DesignModel::default() };
        let plan = PlanCompiler::default().compile(&model).unwrap();
        let bevel = plan.steps.iter().find_map(|s| match s {
            BuildStep::CreateBasePlate { bevel_mm, .. } => Some(*bevel_mm),
            _ => None,
        });
        assert_eq!(bevel, Some(1.0));
    }

    #[test]
    fn test_invalid_design_is_refused() {
        let model = DesignModel { letter_depth_mm: 9.0, ..DesignModel::default() };
        match PlanCompiler::default().compile(&model) {
            Err(CompileError::InvalidDesign(result)) => assert!(!result.is_valid),
            other => panic!("expected InvalidDesign, got {other:?}"),
        }
    }

    #[test]
    fn test_corner_qr_is_embedded_before_join() {
        let model = DesignModel { qr: Some(QrSpec::new("https://example.org")), ..DesignModel::default() };
        let plan = PlanCompiler::default().compile(&model).unwrap();
        let k = kinds(&plan);
        let qr_at = k.iter().position(|s| *s == "embed_qr").unwrap();
        assert_eq!(k[qr_at + 1], "join_all");
        match &plan.steps[qr_at] {
            BuildStep::EmbedQr { center_x_mm, center_y_mm, depth_mm, .. } => {
                assert_eq!(*center_x_mm, 67.0);
                assert_eq!(*center_y_mm, -27.0);
                assert_eq!(*depth_mm, 1.0);
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn test_centered_qr_conflicts_with_text() {
        let model = DesignModel {
            qr: Some(QrSpec { position: QrPosition::Center, ..QrSpec::new("x") }),
            ..DesignModel::default()
        };
        let err = PlanCompiler::default().compile(&model).unwrap_err();
        assert!(matches!(err, CompileError::ConflictingLayout { line: TextLine::First, .. }));
    }

    #[test]
    fn test_export_paths_follow_options() {
        let export = ExportOptions {
            formats: vec![ExportFormat::Stl, ExportFormat::Blend],
            output_dir: PathBuf::from("/tmp/plates"),
            file_stem: Some("kirjasto_v1".to_string()),
        };
        let compiler = PlanCompiler::new(DesignLimits::default(), export);
        let plan = compiler.compile(&DesignModel::default()).unwrap();
        assert_eq!(
            plan.export_paths(),
            vec![
                &PathBuf::from("/tmp/plates/kirjasto_v1.stl"),
                &PathBuf::from("/tmp/plates/kirjasto_v1.blend"),
            ]
        );
        assert!(matches!(plan.steps.last(), Some(BuildStep::Export { .. })));
    }

    #[test]
    fn test_empty_format_list_still_exports() {
        let export = ExportOptions { formats: Vec::new(), ..ExportOptions::default() };
        let compiler = PlanCompiler::new(DesignLimits::default(), export);
        assert_eq!(compiler.export_options().formats, vec![ExportFormat::Stl]);

        let plan = compiler.compile(&DesignModel::default()).unwrap();
        assert!(matches!(plan.steps.last(), Some(BuildStep::Export { format: ExportFormat::Stl, .. })));
        assert_eq!(plan.export_paths().len(), 1);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let compiler = PlanCompiler::default();
        let a = compiler.compile(&DesignModel::default()).unwrap();
        let b = compiler.compile(&DesignModel::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn test_plan_serializes_with_step_tags() {
        let plan = PlanCompiler::default().compile(&DesignModel::default()).unwrap();
        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(value["steps"][0]["step"], "create_text_glyphs");
        assert_eq!(value["steps"][7]["step"], "join_all");
        let back: BuildPlan = serde_json::from_value(value).unwrap();
        assert_eq!(back, plan);
    }
}

//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use nameplate_core::{
    hashing::design_fingerprint, BuildStep, CompileError, DesignField, DesignModel, DesignPipeline,
    PipelineError, ProjectFile, QrPosition, QrSpec, TemplateCatalog, Validator,
};

fn library_sign() -> DesignModel {
    DesignModel {
        line1: "Kirjasto".to_string(),
        line2: "Library".to_string(),
        plate_length_mm: 160.0,
        plate_width_mm: 80.0,
        plate_thickness_mm: 7.0,
        letter_depth_mm: 4.0,
        text_size_mm: 25.0,
        line_spacing_mm: 35.0,
        ..DesignModel::default()
    }
}

#[test]
fn invariant_reference_design_scores_full_marks() {
    let result = Validator::default().validate(&library_sign());

    assert!(result.is_valid);
    assert_eq!(result.score, 100);
    assert!(result.errors.is_empty());
    assert!(result.warnings.is_empty());
}

#[test]
fn invariant_piercing_letters_invalidate() {
    let model = DesignModel { letter_depth_mm: 10.0, ..library_sign() };
    let result = Validator::default().validate(&model);

    assert!(!result.is_valid);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].field, DesignField::LetterDepth);
    assert!(result.score <= 85);
}

#[test]
fn invariant_compile_calls_validate() {
    // An invalid design must never reach the plan stage.
    let pipeline = DesignPipeline::default();
    let model = DesignModel { line1: String::new(), line2: String::new(), ..library_sign() };

    let err = pipeline.compile_design(&model).unwrap_err();
    assert!(matches!(err, PipelineError::Compile(CompileError::InvalidDesign(_))));
    assert!(err.to_string().contains("Invalid design"));
}

#[test]
fn invariant_plan_bookends() {
    let pipeline = DesignPipeline::default();
    let plan = pipeline.compile_design(&library_sign()).unwrap();

    assert!(matches!(plan.steps[0], BuildStep::CreateTextGlyphs { .. }));
    assert!(matches!(plan.steps[1], BuildStep::CreateTextGlyphs { .. }));
    assert!(!matches!(plan.steps[2], BuildStep::CreateTextGlyphs { .. }));
    assert!(matches!(plan.steps.last(), Some(BuildStep::Export { .. })));
    assert_eq!(plan.design_fingerprint, design_fingerprint(&library_sign()).unwrap());
}

#[test]
fn invariant_qr_overlap_is_a_compile_error() {
    let pipeline = DesignPipeline::default();
    let model = DesignModel {
        qr: Some(QrSpec { position: QrPosition::Center, ..QrSpec::new("https://example.org") }),
        ..library_sign()
    };

    // Valid design, impossible layout.
    assert!(pipeline.validate_design(&model).is_valid);
    let err = pipeline.compile_design(&model).unwrap_err();
    assert!(matches!(err, PipelineError::Compile(CompileError::ConflictingLayout { .. })));
}

#[test]
fn invariant_template_not_found_error() {
    let pipeline = DesignPipeline::default();
    let err = pipeline.new_design(Some("Garden Gnome")).unwrap_err();
    assert!(err.to_string().contains("Template not found"));
}

#[test]
fn invariant_template_apply_starts_valid_design() {
    let pipeline = DesignPipeline::default();
    let model = pipeline.new_design(Some("Door Plate")).unwrap();

    assert_eq!(model.line1, "Office");
    assert!(pipeline.compile_design(&model).is_ok());
}

#[test]
fn invariant_catalog_is_immutable_and_ordered() {
    let a = TemplateCatalog::builtin().list();
    let b = TemplateCatalog::builtin().list();
    assert_eq!(a, b);
}

#[test]
fn invariant_project_round_trip() {
    let project = ProjectFile::new(library_sign());
    let back = ProjectFile::from_json(&project.to_json().unwrap()).unwrap();
    assert_eq!(back.design, library_sign());
}

#[cfg(feature = "test-hooks")]
#[test]
fn invariant_compile_counts_one_validation() {
    use nameplate_core::validation::{get_validation_call_count, reset_validation_call_count};

    reset_validation_call_count();
    let _ = DesignPipeline::default().compile_design(&library_sign());
    assert!(get_validation_call_count() >= 1);
}

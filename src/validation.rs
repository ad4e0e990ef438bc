//! Validation System - Rules and Printability Score
//!
//! Rules are independent and run in a fixed order. Each rule reports at
//! most one issue. Findings are data, never errors.

use serde::{Deserialize, Serialize};

use crate::design::{DesignField, DesignModel, QrStyle, TextLine};
use crate::layout::{plate_interior, qr_box, text_block};
use crate::limits::{DesignLimits, ScoringPenalties};

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static VALIDATION_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_validation_call_count() -> u32 {
    VALIDATION_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_validation_call_count() {
    VALIDATION_CALL_COUNT.store(0, Ordering::SeqCst);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub rule: String,
    pub field: DesignField,
    pub severity: Severity,
    pub message: String,
}

impl ValidationIssue {
    fn error(rule: &str, field: DesignField, message: impl Into<String>) -> Self {
        Self { rule: rule.to_string(), field, severity: Severity::Error, message: message.into() }
    }

    fn warning(rule: &str, field: DesignField, message: impl Into<String>) -> Self {
        Self { rule: rule.to_string(), field, severity: Severity::Warning, message: message.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub score: u8,
}

impl ValidationResult {
    pub fn from_issues(issues: Vec<ValidationIssue>, penalties: &ScoringPenalties) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) = issues
            .into_iter()
            .partition(|issue| issue.severity == Severity::Error);
        let score = printability_score(errors.len(), warnings.len(), penalties);
        Self { is_valid: errors.is_empty(), errors, warnings, score }
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// `field: message` pairs of every error, joined for display.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn mentions(&self, field: DesignField) -> bool {
        self.errors.iter().chain(&self.warnings).any(|i| i.field == field)
    }
}

/// 100 minus the summed penalties, floored at 0.
pub fn printability_score(errors: usize, warnings: usize, penalties: &ScoringPenalties) -> u8 {
    let deducted = errors as u64 * penalties.error as u64 + warnings as u64 * penalties.warning as u64;
    100u64.saturating_sub(deducted) as u8
}

/// A single independent design check.
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, model: &DesignModel, limits: &DesignLimits) -> Option<ValidationIssue>;
}

fn mm(value: f64) -> String {
    format!("{}mm", (value * 100.0).round() / 100.0)
}

// --- Concrete Rules ---

pub struct TextPresenceRule;

impl ValidationRule for TextPresenceRule {
    fn name(&self) -> &'static str {
        "text_presence"
    }

    fn check(&self, model: &DesignModel, _limits: &DesignLimits) -> Option<ValidationIssue> {
        if model.visible_lines().is_empty() {
            return Some(ValidationIssue::error(
                self.name(),
                DesignField::Line1,
                "At least one text line must be non-empty (line1 and line2 are both empty)",
            ));
        }
        None
    }
}

pub struct TextLengthRule(pub TextLine);

impl ValidationRule for TextLengthRule {
    fn name(&self) -> &'static str {
        "text_length"
    }

    fn check(&self, model: &DesignModel, limits: &DesignLimits) -> Option<ValidationIssue> {
        let field = self.0.field();
        let count = model.text(self.0).chars().count();
        if count > limits.max_line_chars {
            return Some(ValidationIssue::error(
                self.name(),
                field,
                format!(
                    "{}: text too long ({} characters, max {})",
                    field.label(),
                    count,
                    limits.max_line_chars
                ),
            ));
        }
        None
    }
}

pub struct DimensionBoundsRule(pub DesignField);

impl ValidationRule for DimensionBoundsRule {
    fn name(&self) -> &'static str {
        "dimension_bounds"
    }

    fn check(&self, model: &DesignModel, limits: &DesignLimits) -> Option<ValidationIssue> {
        let field = self.0;
        let value = model.dimension(field)?;
        let bounds = limits.bounds(field)?;
        // Written so that NaN fails the lower bound.
        if !(value >= bounds.min) {
            return Some(ValidationIssue::error(
                self.name(),
                field,
                format!("{}: must be at least {} (got {})", field.label(), mm(bounds.min), mm(value)),
            ));
        }
        if value > bounds.max {
            let reason = if matches!(field, DesignField::PlateLength | DesignField::PlateWidth)
                && bounds.max == limits.print_bed_max_mm
            {
                " to fit the print bed"
            } else {
                ""
            };
            return Some(ValidationIssue::error(
                self.name(),
                field,
                format!(
                    "{}: must be at most {}{} (got {})",
                    field.label(),
                    mm(bounds.max),
                    reason,
                    mm(value)
                ),
            ));
        }
        None
    }
}

pub struct StructuralRule;

impl ValidationRule for StructuralRule {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn check(&self, model: &DesignModel, limits: &DesignLimits) -> Option<ValidationIssue> {
        if model.letter_depth_mm >= model.plate_thickness_mm {
            return Some(ValidationIssue::error(
                self.name(),
                DesignField::LetterDepth,
                format!(
                    "Letter depth {} must be less than plate thickness {}: letters would pierce plate",
                    mm(model.letter_depth_mm),
                    mm(model.plate_thickness_mm)
                ),
            ));
        }
        if model.letter_depth_mm < limits.fragile_letter_depth_mm {
            return Some(ValidationIssue::warning(
                self.name(),
                DesignField::LetterDepth,
                format!(
                    "Letter depth below {}: risk of breakage",
                    mm(limits.fragile_letter_depth_mm)
                ),
            ));
        }
        None
    }
}

pub struct DeepLettersRule;

impl ValidationRule for DeepLettersRule {
    fn name(&self) -> &'static str {
        "deep_letters"
    }

    fn check(&self, model: &DesignModel, limits: &DesignLimits) -> Option<ValidationIssue> {
        if model.letter_depth_mm > limits.deep_letter_depth_mm {
            return Some(ValidationIssue::warning(
                self.name(),
                DesignField::LetterDepth,
                format!(
                    "Letter depth {} is very deep: may require supports or cause stringing",
                    mm(model.letter_depth_mm)
                ),
            ));
        }
        None
    }
}

pub struct ThinPlateRule;

impl ValidationRule for ThinPlateRule {
    fn name(&self) -> &'static str {
        "thin_plate"
    }

    fn check(&self, model: &DesignModel, limits: &DesignLimits) -> Option<ValidationIssue> {
        if model.plate_thickness_mm < limits.thin_plate_mm {
            return Some(ValidationIssue::warning(
                self.name(),
                DesignField::PlateThickness,
                format!("Plate thinner than {} may warp during printing", mm(limits.thin_plate_mm)),
            ));
        }
        None
    }
}

pub struct ElongationRule;

impl ValidationRule for ElongationRule {
    fn name(&self) -> &'static str {
        "elongation"
    }

    fn check(&self, model: &DesignModel, limits: &DesignLimits) -> Option<ValidationIssue> {
        if model.plate_width_mm <= 0.0 {
            return None;
        }
        let ratio = model.plate_length_mm / model.plate_width_mm;
        if ratio > limits.max_aspect_ratio {
            return Some(ValidationIssue::warning(
                self.name(),
                DesignField::PlateLength,
                format!(
                    "Aspect ratio {:.1}:1 is very elongated; consider supports or a shorter plate",
                    ratio
                ),
            ));
        }
        None
    }
}

pub struct ProportionRule;

impl ValidationRule for ProportionRule {
    fn name(&self) -> &'static str {
        "proportion"
    }

    fn check(&self, model: &DesignModel, limits: &DesignLimits) -> Option<ValidationIssue> {
        let block = text_block(model, limits)?;
        let interior = plate_interior(model, limits);
        if block.width > interior.width || block.height > interior.height {
            return Some(ValidationIssue::error(
                self.name(),
                DesignField::TextSize,
                format!(
                    "Text block {} x {} does not fit the plate interior {} x {}",
                    mm(block.width),
                    mm(block.height),
                    mm(interior.width),
                    mm(interior.height)
                ),
            ));
        }
        None
    }
}

pub struct SpacingRule;

impl ValidationRule for SpacingRule {
    fn name(&self) -> &'static str {
        "line_spacing"
    }

    fn check(&self, model: &DesignModel, limits: &DesignLimits) -> Option<ValidationIssue> {
        if model.visible_lines().len() < 2 {
            return None;
        }
        let needed = model.text_size_mm * limits.line_spacing_factor;
        if model.line_spacing_mm < needed {
            return Some(ValidationIssue::warning(
                self.name(),
                DesignField::LineSpacing,
                format!("Line spacing below {}: lines may overlap", mm(needed)),
            ));
        }
        None
    }
}

pub struct MaterialFinishRule;

impl ValidationRule for MaterialFinishRule {
    fn name(&self) -> &'static str {
        "material_finish"
    }

    fn check(&self, model: &DesignModel, limits: &DesignLimits) -> Option<ValidationIssue> {
        if limits.finish_conflicts_with(model.material, model.finish) {
            return Some(ValidationIssue::warning(
                self.name(),
                DesignField::Finish,
                format!(
                    "{} finish is not recommended for {}",
                    model.finish, model.material
                ),
            ));
        }
        None
    }
}

pub struct QrFitRule;

impl ValidationRule for QrFitRule {
    fn name(&self) -> &'static str {
        "qr_fit"
    }

    fn check(&self, model: &DesignModel, limits: &DesignLimits) -> Option<ValidationIssue> {
        let qr = model.qr.as_ref()?;
        let error = |message: String| Some(ValidationIssue::error(self.name(), DesignField::Qr, message));

        if qr.content.trim().is_empty() {
            return error("QR code content is empty".to_string());
        }
        let bounds = limits.qr_size_mm;
        if !(qr.size_mm >= bounds.min) || qr.size_mm > bounds.max {
            return error(format!(
                "QR code size must be between {} and {} (got {})",
                mm(bounds.min),
                mm(bounds.max),
                mm(qr.size_mm)
            ));
        }
        if !plate_interior(model, limits).contains(&qr_box(qr, model, limits)) {
            return error(format!("QR code of {} does not fit inside the plate margins", mm(qr.size_mm)));
        }
        if qr.style == QrStyle::Recessed && qr.depth_mm >= model.plate_thickness_mm {
            return error(format!(
                "Recessed QR depth {} would cut through the {} plate",
                mm(qr.depth_mm),
                mm(model.plate_thickness_mm)
            ));
        }
        None
    }
}

/// Validator runs the ordered rule list against explicit limits.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
    limits: DesignLimits,
}

impl Validator {
    pub fn new(limits: DesignLimits) -> Self {
        let mut rules: Vec<Box<dyn ValidationRule>> = vec![
            Box::new(TextPresenceRule),
            Box::new(TextLengthRule(TextLine::First)),
            Box::new(TextLengthRule(TextLine::Second)),
        ];
        for field in DesignField::DIMENSIONS {
            rules.push(Box::new(DimensionBoundsRule(field)));
        }
        rules.push(Box::new(StructuralRule));
        rules.push(Box::new(DeepLettersRule));
        rules.push(Box::new(ThinPlateRule));
        rules.push(Box::new(ElongationRule));
        rules.push(Box::new(ProportionRule));
        rules.push(Box::new(SpacingRule));
        rules.push(Box::new(MaterialFinishRule));
        rules.push(Box::new(QrFitRule));

        Self { rules, limits }
    }

    pub fn limits(&self) -> &DesignLimits {
        &self.limits
    }

    pub fn validate(&self, model: &DesignModel) -> ValidationResult {
        #[cfg(feature = "test-hooks")]
        VALIDATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        let issues = self
            .rules
            .iter()
            .filter_map(|rule| rule.check(model, &self.limits))
            .collect();

        ValidationResult::from_issues(issues, &self.limits.penalties)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DesignLimits::default())
    }
}

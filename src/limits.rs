//! Design Limits - manufacturing bounds and scoring configuration
//!
//! Limits are always passed explicitly into the validator and compiler.
//! The authority records where they came from so overrides stay auditable.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::design::{DesignField, Finish, Material};

#[derive(Debug, Error)]
pub enum LimitsError {
    #[error("Failed to read limits file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid limits file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid limit for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Source of the active limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitsAuthority {
    /// Built-in defaults (fallback)
    #[default]
    System,
    /// Loaded from a limits file
    File,
    /// User-provided overrides (validated)
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringPenalties {
    pub error: u32,
    pub warning: u32,
}

impl Default for ScoringPenalties {
    fn default() -> Self {
        Self { error: 15, warning: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishConflict {
    pub material: Material,
    pub finish: Finish,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignLimits {
    pub authority: LimitsAuthority,
    pub plate_length_mm: Bounds,
    pub plate_width_mm: Bounds,
    pub plate_thickness_mm: Bounds,
    pub letter_depth_mm: Bounds,
    pub text_size_mm: Bounds,
    pub line_spacing_mm: Bounds,
    pub qr_size_mm: Bounds,
    /// Largest footprint the print bed accepts on either axis.
    pub print_bed_max_mm: f64,
    /// Clear border kept between plate edge and any text or QR code, per side.
    pub plate_margin_mm: f64,
    /// Average glyph advance as a fraction of the text size.
    pub glyph_advance_ratio: f64,
    pub max_line_chars: usize,
    pub fragile_letter_depth_mm: f64,
    pub deep_letter_depth_mm: f64,
    pub thin_plate_mm: f64,
    pub max_aspect_ratio: f64,
    pub line_spacing_factor: f64,
    pub qr_clearance_mm: f64,
    pub finish_conflicts: Vec<FinishConflict>,
    pub penalties: ScoringPenalties,
}

impl Default for DesignLimits {
    fn default() -> Self {
        Self {
            authority: LimitsAuthority::System,
            plate_length_mm: Bounds::new(50.0, 500.0),
            plate_width_mm: Bounds::new(30.0, 300.0),
            plate_thickness_mm: Bounds::new(3.0, 20.0),
            letter_depth_mm: Bounds::new(0.8, 20.0),
            text_size_mm: Bounds::new(10.0, 100.0),
            line_spacing_mm: Bounds::new(10.0, 100.0),
            qr_size_mm: Bounds::new(10.0, 100.0),
            print_bed_max_mm: 220.0,
            plate_margin_mm: 3.0,
            glyph_advance_ratio: 0.6,
            max_line_chars: 50,
            fragile_letter_depth_mm: 2.0,
            deep_letter_depth_mm: 10.0,
            thin_plate_mm: 5.0,
            max_aspect_ratio: 5.0,
            line_spacing_factor: 1.1,
            qr_clearance_mm: 2.0,
            finish_conflicts: vec![
                FinishConflict { material: Material::Wood, finish: Finish::Glossy },
                FinishConflict { material: Material::MetalLook, finish: Finish::Textured },
            ],
            penalties: ScoringPenalties::default(),
        }
    }
}

impl DesignLimits {
    /// Load limits from a JSON file. Missing keys fall back to defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, LimitsError> {
        let content = fs::read_to_string(path)?;
        let mut limits: DesignLimits = serde_json::from_str(&content)?;
        limits.authority = LimitsAuthority::File;
        limits.check()?;
        Ok(limits)
    }

    /// Accept user-supplied limits after sanity checks.
    pub fn from_user(mut limits: DesignLimits) -> Result<Self, LimitsError> {
        limits.check()?;
        limits.authority = LimitsAuthority::User;
        Ok(limits)
    }

    /// Effective bounds for a dimension field. Plate length and width are
    /// additionally capped by the print bed.
    pub fn bounds(&self, field: DesignField) -> Option<Bounds> {
        let bounds = match field {
            DesignField::PlateLength => self.plate_length_mm,
            DesignField::PlateWidth => self.plate_width_mm,
            DesignField::PlateThickness => self.plate_thickness_mm,
            DesignField::LetterDepth => self.letter_depth_mm,
            DesignField::TextSize => self.text_size_mm,
            DesignField::LineSpacing => self.line_spacing_mm,
            _ => return None,
        };
        match field {
            DesignField::PlateLength | DesignField::PlateWidth => {
                Some(Bounds::new(bounds.min, bounds.max.min(self.print_bed_max_mm)))
            }
            _ => Some(bounds),
        }
    }

    pub fn finish_conflicts_with(&self, material: Material, finish: Finish) -> bool {
        self.finish_conflicts
            .iter()
            .any(|c| c.material == material && c.finish == finish)
    }

    fn check(&self) -> Result<(), LimitsError> {
        for field in DesignField::DIMENSIONS {
            if let Some(b) = self.bounds(field) {
                if !(b.min > 0.0 && b.min <= b.max) {
                    return Err(LimitsError::Invalid {
                        field: field.as_str().to_string(),
                        reason: format!("bounds {}..{} are not a positive range", b.min, b.max),
                    });
                }
            }
        }
        let positive = [
            ("print_bed_max_mm", self.print_bed_max_mm),
            ("glyph_advance_ratio", self.glyph_advance_ratio),
            ("line_spacing_factor", self.line_spacing_factor),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(LimitsError::Invalid {
                    field: name.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.plate_margin_mm < 0.0 || self.qr_clearance_mm < 0.0 {
            return Err(LimitsError::Invalid {
                field: "plate_margin_mm".to_string(),
                reason: "margins cannot be negative".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_print_bed_caps_plate_bounds() {
        let limits = DesignLimits::default();
        assert_eq!(limits.bounds(DesignField::PlateLength).unwrap().max, 220.0);
        assert_eq!(limits.bounds(DesignField::PlateThickness).unwrap().max, 20.0);
        assert!(limits.bounds(DesignField::FontId).is_none());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"print_bed_max_mm": 300.0, "penalties": {{"error": 20, "warning": 4}}}}"#).unwrap();

        let limits = DesignLimits::load_from_file(file.path()).unwrap();
        assert_eq!(limits.authority, LimitsAuthority::File);
        assert_eq!(limits.print_bed_max_mm, 300.0);
        assert_eq!(limits.penalties.error, 20);
        assert_eq!(limits.plate_margin_mm, 3.0);
    }

    #[test]
    fn test_user_limits_rejects_inverted_bounds() {
        let mut limits = DesignLimits::default();
        limits.text_size_mm = Bounds::new(50.0, 10.0);
        assert!(DesignLimits::from_user(limits).is_err());
    }

    #[test]
    fn test_default_finish_conflicts() {
        let limits = DesignLimits::default();
        assert!(limits.finish_conflicts_with(Material::Wood, Finish::Glossy));
        assert!(!limits.finish_conflicts_with(Material::Pla, Finish::Glossy));
    }
}

//! Rough print time and material estimates.

use serde::Serialize;

use crate::design::DesignModel;
use crate::layout::text_width;
use crate::limits::DesignLimits;

/// Fraction of a glyph's bounding box that is actually filled.
const GLYPH_FILL: f64 = 0.35;
/// At 0.2mm layer height, about ten minutes per cm³.
const MINUTES_PER_CM3: f64 = 10.0;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct PrintEstimate {
    pub volume_cm3: f64,
    pub weight_g: f64,
    pub print_minutes: u32,
    pub material_cost: f64,
}

impl PrintEstimate {
    /// "Xh Ym"
    pub fn print_time_label(&self) -> String {
        format!("{}h {}m", self.print_minutes / 60, self.print_minutes % 60)
    }
}

pub fn estimate(model: &DesignModel, limits: &DesignLimits, price_per_kg: f64) -> PrintEstimate {
    let plate_mm3 = model.plate_length_mm * model.plate_width_mm * model.plate_thickness_mm;
    let letters_mm3: f64 = model
        .visible_lines()
        .into_iter()
        .map(|line| {
            text_width(model.text(line), model, limits) * model.text_size_mm * model.letter_depth_mm * GLYPH_FILL
        })
        .sum();

    let volume_cm3 = (plate_mm3 + letters_mm3) / 1000.0;
    let weight_g = volume_cm3 * model.material.density_g_cm3();
    PrintEstimate {
        volume_cm3: round2(volume_cm3),
        weight_g: round2(weight_g),
        print_minutes: (volume_cm3 * MINUTES_PER_CM3).round() as u32,
        material_cost: round2(weight_g / 1000.0 * price_per_kg),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

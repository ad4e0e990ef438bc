//! 2D layout arithmetic on the plate face
//!
//! Coordinates are in mm with the origin at the plate centre, x along the
//! plate length and y along the plate width. Text extents are estimates
//! from the glyph advance ratio; exact outlines belong to the geometry engine.

use serde::{Deserialize, Serialize};

use crate::design::{DesignModel, QrPosition, QrSpec, TextLine};
use crate::limits::DesignLimits;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn centered(center_x: f64, center_y: f64, width: f64, height: f64) -> Self {
        Self { center_x, center_y, width, height }
    }

    pub fn min_x(&self) -> f64 {
        self.center_x - self.width / 2.0
    }

    pub fn max_x(&self) -> f64 {
        self.center_x + self.width / 2.0
    }

    pub fn min_y(&self) -> f64 {
        self.center_y - self.height / 2.0
    }

    pub fn max_y(&self) -> f64 {
        self.center_y + self.height / 2.0
    }

    pub fn inflate(&self, by: f64) -> Self {
        Self { width: self.width + 2.0 * by, height: self.height + 2.0 * by, ..*self }
    }

    /// Strict overlap; touching edges do not count.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min_x() < other.max_x()
            && other.min_x() < self.max_x()
            && self.min_y() < other.max_y()
            && other.min_y() < self.max_y()
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.min_x() >= self.min_x()
            && other.max_x() <= self.max_x()
            && other.min_y() >= self.min_y()
            && other.max_y() <= self.max_y()
    }
}

/// Usable face of the plate after the margin on every side.
pub fn plate_interior(model: &DesignModel, limits: &DesignLimits) -> Rect {
    let inset = 2.0 * limits.plate_margin_mm;
    Rect::centered(
        0.0,
        0.0,
        (model.plate_length_mm - inset).max(0.0),
        (model.plate_width_mm - inset).max(0.0),
    )
}

pub fn text_width(text: &str, model: &DesignModel, limits: &DesignLimits) -> f64 {
    text.trim().chars().count() as f64 * model.text_size_mm * limits.glyph_advance_ratio
}

/// Vertical offset of a line's centre. With two lines they sit symmetric
/// around the plate centre, `line_spacing_mm` apart; a lone line is centred.
pub fn line_offset(model: &DesignModel, line: TextLine) -> f64 {
    if model.visible_lines().len() < 2 {
        return 0.0;
    }
    match line {
        TextLine::First => model.line_spacing_mm / 2.0,
        TextLine::Second => -model.line_spacing_mm / 2.0,
    }
}

pub fn line_box(model: &DesignModel, line: TextLine, limits: &DesignLimits) -> Rect {
    Rect::centered(
        0.0,
        line_offset(model, line),
        text_width(model.text(line), model, limits),
        model.text_size_mm,
    )
}

/// Envelope of all visible lines, or `None` when there is no text. Its
/// height is never less than one text size per line.
pub fn text_block(model: &DesignModel, limits: &DesignLimits) -> Option<Rect> {
    let boxes: Vec<Rect> = model
        .visible_lines()
        .into_iter()
        .map(|line| line_box(model, line, limits))
        .collect();
    let first = boxes.first()?;
    let (mut min_x, mut max_x) = (first.min_x(), first.max_x());
    let (mut min_y, mut max_y) = (first.min_y(), first.max_y());
    for b in &boxes[1..] {
        min_x = min_x.min(b.min_x());
        max_x = max_x.max(b.max_x());
        min_y = min_y.min(b.min_y());
        max_y = max_y.max(b.max_y());
    }
    // Lines closer than one text size apart still need a full line each.
    let height = (max_y - min_y).max(boxes.len() as f64 * model.text_size_mm);
    Some(Rect::centered(
        (min_x + max_x) / 2.0,
        (min_y + max_y) / 2.0,
        max_x - min_x,
        height,
    ))
}

/// Footprint of the QR code on the plate face.
pub fn qr_box(qr: &QrSpec, model: &DesignModel, limits: &DesignLimits) -> Rect {
    let half = qr.size_mm / 2.0;
    let edge_x = model.plate_length_mm / 2.0 - limits.plate_margin_mm - half;
    let edge_y = model.plate_width_mm / 2.0 - limits.plate_margin_mm - half;
    let (x, y) = match qr.position {
        QrPosition::BottomRight => (edge_x, -edge_y),
        QrPosition::BottomLeft => (-edge_x, -edge_y),
        QrPosition::TopRight => (edge_x, edge_y),
        QrPosition::TopLeft => (-edge_x, edge_y),
        QrPosition::Center => (0.0, 0.0),
        QrPosition::Custom { x_mm, y_mm } => (x_mm, y_mm),
    };
    Rect::centered(x, y, qr.size_mm, qr.size_mm)
}

//! Design Model - the single source of truth for one nameplate
//!
//! Partial edits (templates, batch rows, field-by-field editing) all go
//! through `DesignPatch`, so there is exactly one merge rule.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DesignError {
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl DesignError {
    fn invalid(field: DesignField, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.as_str().to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Material {
    #[serde(rename = "PLA")]
    Pla,
    #[serde(rename = "PETG")]
    Petg,
    #[serde(rename = "ABS")]
    Abs,
    Wood,
    #[serde(rename = "Metal-look")]
    MetalLook,
}

impl Material {
    pub const ALL: [Material; 5] = [
        Material::Pla,
        Material::Petg,
        Material::Abs,
        Material::Wood,
        Material::MetalLook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pla => "PLA",
            Self::Petg => "PETG",
            Self::Abs => "ABS",
            Self::Wood => "Wood",
            Self::MetalLook => "Metal-look",
        }
    }

    /// Filament density in g/cm³.
    pub fn density_g_cm3(&self) -> f64 {
        match self {
            Self::Pla => 1.24,
            Self::Petg => 1.27,
            Self::Abs => 1.04,
            Self::Wood => 1.15,
            Self::MetalLook => 1.30,
        }
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Material {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Older project files carry the long combo-box labels.
        match s.trim().to_ascii_lowercase().as_str() {
            "pla" | "pla standard" => Ok(Self::Pla),
            "petg" | "petg glossy" => Ok(Self::Petg),
            "abs" => Ok(Self::Abs),
            "wood" | "wood fill" => Ok(Self::Wood),
            "metal-look" | "metal look" | "metallook" => Ok(Self::MetalLook),
            other => Err(format!("unknown material '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Finish {
    Matte,
    Glossy,
    Textured,
}

impl Finish {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matte => "Matte",
            Self::Glossy => "Glossy",
            Self::Textured => "Textured",
        }
    }
}

impl fmt::Display for Finish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Finish {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "matte" | "standard (as-printed)" => Ok(Self::Matte),
            "glossy" | "smooth (post-processed)" => Ok(Self::Glossy),
            "textured" => Ok(Self::Textured),
            other => Err(format!("unknown finish '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum QrPosition {
    #[default]
    BottomRight,
    BottomLeft,
    TopRight,
    TopLeft,
    Center,
    /// Offset of the QR centre from the plate centre, in mm.
    Custom { x_mm: f64, y_mm: f64 },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QrStyle {
    #[default]
    Embossed,
    Recessed,
    Flat,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCorrection {
    Low,
    #[default]
    Medium,
    Quartile,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QrSpec {
    pub content: String,
    #[serde(default = "default_qr_size")]
    pub size_mm: f64,
    #[serde(default = "default_qr_depth")]
    pub depth_mm: f64,
    #[serde(default)]
    pub position: QrPosition,
    #[serde(default)]
    pub style: QrStyle,
    #[serde(default)]
    pub error_correction: ErrorCorrection,
    #[serde(default = "default_border_modules")]
    pub border_modules: u32,
}

fn default_qr_size() -> f64 {
    20.0
}

fn default_qr_depth() -> f64 {
    1.0
}

fn default_border_modules() -> u32 {
    4
}

impl QrSpec {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            size_mm: default_qr_size(),
            depth_mm: default_qr_depth(),
            position: QrPosition::default(),
            style: QrStyle::default(),
            error_correction: ErrorCorrection::default(),
            border_modules: default_border_modules(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesignModel {
    pub line1: String,
    pub line2: String,
    pub plate_length_mm: f64,
    pub plate_width_mm: f64,
    pub plate_thickness_mm: f64,
    pub letter_depth_mm: f64,
    pub text_size_mm: f64,
    pub line_spacing_mm: f64,
    pub font_id: String,
    pub material: Material,
    pub finish: Finish,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<QrSpec>,
}

impl Default for DesignModel {
    fn default() -> Self {
        Self {
            line1: "KIRJASTO".to_string(),
            line2: "LIBRARY".to_string(),
            plate_length_mm: 160.0,
            plate_width_mm: 80.0,
            plate_thickness_mm: 7.0,
            letter_depth_mm: 4.0,
            text_size_mm: 25.0,
            line_spacing_mm: 35.0,
            font_id: "Quicksand-Regular".to_string(),
            material: Material::Pla,
            finish: Finish::Matte,
            qr: None,
        }
    }
}

impl DesignModel {
    pub fn text(&self, line: TextLine) -> &str {
        match line {
            TextLine::First => &self.line1,
            TextLine::Second => &self.line2,
        }
    }

    /// Lines that carry visible text, in plate order.
    pub fn visible_lines(&self) -> Vec<TextLine> {
        TextLine::ALL
            .into_iter()
            .filter(|line| !self.text(*line).trim().is_empty())
            .collect()
    }

    pub fn dimension(&self, field: DesignField) -> Option<f64> {
        match field {
            DesignField::PlateLength => Some(self.plate_length_mm),
            DesignField::PlateWidth => Some(self.plate_width_mm),
            DesignField::PlateThickness => Some(self.plate_thickness_mm),
            DesignField::LetterDepth => Some(self.letter_depth_mm),
            DesignField::TextSize => Some(self.text_size_mm),
            DesignField::LineSpacing => Some(self.line_spacing_mm),
            _ => None,
        }
    }

    /// Field-by-field edit as performed by an editing surface.
    pub fn set_field(&mut self, field: DesignField, raw: &str) -> Result<(), DesignError> {
        let mut patch = DesignPatch::default();
        patch.set(field, raw)?;
        patch.merge_into(self);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TextLine {
    First,
    Second,
}

impl TextLine {
    pub const ALL: [TextLine; 2] = [TextLine::First, TextLine::Second];

    pub fn field(&self) -> DesignField {
        match self {
            Self::First => DesignField::Line1,
            Self::Second => DesignField::Line2,
        }
    }
}

/// Names of the editable fields of a `DesignModel`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DesignField {
    #[serde(rename = "line1")]
    Line1,
    #[serde(rename = "line2")]
    Line2,
    #[serde(rename = "plate_length_mm")]
    PlateLength,
    #[serde(rename = "plate_width_mm")]
    PlateWidth,
    #[serde(rename = "plate_thickness_mm")]
    PlateThickness,
    #[serde(rename = "letter_depth_mm")]
    LetterDepth,
    #[serde(rename = "text_size_mm")]
    TextSize,
    #[serde(rename = "line_spacing_mm")]
    LineSpacing,
    #[serde(rename = "font_id")]
    FontId,
    #[serde(rename = "material")]
    Material,
    #[serde(rename = "finish")]
    Finish,
    #[serde(rename = "qr")]
    Qr,
}

impl DesignField {
    pub const ALL: [DesignField; 12] = [
        DesignField::Line1,
        DesignField::Line2,
        DesignField::PlateLength,
        DesignField::PlateWidth,
        DesignField::PlateThickness,
        DesignField::LetterDepth,
        DesignField::TextSize,
        DesignField::LineSpacing,
        DesignField::FontId,
        DesignField::Material,
        DesignField::Finish,
        DesignField::Qr,
    ];

    pub const TEXT: [DesignField; 2] = [DesignField::Line1, DesignField::Line2];

    pub const DIMENSIONS: [DesignField; 6] = [
        DesignField::PlateLength,
        DesignField::PlateWidth,
        DesignField::PlateThickness,
        DesignField::LetterDepth,
        DesignField::TextSize,
        DesignField::LineSpacing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Line1 => "line1",
            Self::Line2 => "line2",
            Self::PlateLength => "plate_length_mm",
            Self::PlateWidth => "plate_width_mm",
            Self::PlateThickness => "plate_thickness_mm",
            Self::LetterDepth => "letter_depth_mm",
            Self::TextSize => "text_size_mm",
            Self::LineSpacing => "line_spacing_mm",
            Self::FontId => "font_id",
            Self::Material => "material",
            Self::Finish => "finish",
            Self::Qr => "qr",
        }
    }

    /// Human-readable label for messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Line1 => "Line 1",
            Self::Line2 => "Line 2",
            Self::PlateLength => "Plate length",
            Self::PlateWidth => "Plate width",
            Self::PlateThickness => "Plate thickness",
            Self::LetterDepth => "Letter depth",
            Self::TextSize => "Text size",
            Self::LineSpacing => "Line spacing",
            Self::FontId => "Font",
            Self::Material => "Material",
            Self::Finish => "Finish",
            Self::Qr => "QR code",
        }
    }
}

impl fmt::Display for DesignField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesignField {
    type Err = DesignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        if let Some(field) = Self::ALL.iter().find(|f| f.as_str() == key) {
            return Ok(*field);
        }
        // Column names used by the spreadsheet batch format.
        match key {
            "text_line_1" => Ok(Self::Line1),
            "text_line_2" => Ok(Self::Line2),
            "length" | "plate_length" => Ok(Self::PlateLength),
            "width" | "plate_width" => Ok(Self::PlateWidth),
            "thickness" | "plate_thickness" => Ok(Self::PlateThickness),
            "depth" | "letter_depth" => Ok(Self::LetterDepth),
            "text_size" => Ok(Self::TextSize),
            "line_spacing" => Ok(Self::LineSpacing),
            "font" => Ok(Self::FontId),
            other => Err(DesignError::UnknownField(other.to_string())),
        }
    }
}

/// A partial `DesignModel`: only the fields that are `Some` override.
///
/// `qr` is doubly optional so a patch can explicitly remove a QR code.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DesignPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate_length_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate_width_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate_thickness_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter_depth_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_size_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_spacing_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<Material>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish: Option<Finish>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr: Option<Option<QrSpec>>,
}

impl DesignPatch {
    /// Build a patch from textual key/value pairs (e.g. one spreadsheet row).
    /// Empty cells follow `set_cell`.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, DesignError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut patch = Self::default();
        for (key, value) in pairs {
            let field: DesignField = key.as_ref().parse()?;
            patch.set_cell(field, value.as_ref())?;
        }
        Ok(patch)
    }

    /// Set one tabular cell. An empty text cell means empty text; any other
    /// empty cell keeps the base value.
    pub fn set_cell(&mut self, field: DesignField, raw: &str) -> Result<(), DesignError> {
        if raw.is_empty() && !DesignField::TEXT.contains(&field) {
            return Ok(());
        }
        self.set(field, raw)
    }

    /// Build a patch from a JSON object. Unknown keys are rejected.
    pub fn from_json_map(map: &Map<String, Value>) -> Result<Self, DesignError> {
        let mut patch = Self::default();
        for (key, value) in map {
            let field: DesignField = key.parse()?;
            patch.set_json(field, value)?;
        }
        Ok(patch)
    }

    pub fn set(&mut self, field: DesignField, raw: &str) -> Result<(), DesignError> {
        match field {
            DesignField::Line1 => self.line1 = Some(raw.to_string()),
            DesignField::Line2 => self.line2 = Some(raw.to_string()),
            DesignField::FontId => self.font_id = Some(raw.trim().to_string()),
            DesignField::Material => {
                let material = raw.parse().map_err(|e: String| DesignError::invalid(field, e))?;
                self.material = Some(material);
            }
            DesignField::Finish => {
                let finish = raw.parse().map_err(|e: String| DesignError::invalid(field, e))?;
                self.finish = Some(finish);
            }
            DesignField::Qr => {
                let content = raw.trim();
                self.qr = Some(if content.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(QrSpec::new(content))
                });
            }
            _ => {
                let value: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| DesignError::invalid(field, format!("'{}' is not a number", raw)))?;
                self.set_dimension(field, value)?;
            }
        }
        Ok(())
    }

    pub fn set_json(&mut self, field: DesignField, value: &Value) -> Result<(), DesignError> {
        match (field, value) {
            (DesignField::Qr, Value::Null) => self.qr = Some(None),
            (DesignField::Qr, Value::Object(_)) => {
                let spec: QrSpec = serde_json::from_value(value.clone())
                    .map_err(|e| DesignError::invalid(field, e.to_string()))?;
                self.qr = Some(Some(spec));
            }
            (_, Value::String(s)) => self.set(field, s)?,
            (_, Value::Number(n)) => {
                let v = n
                    .as_f64()
                    .ok_or_else(|| DesignError::invalid(field, "number out of range"))?;
                self.set_dimension(field, v)?;
            }
            (_, other) => {
                return Err(DesignError::invalid(field, format!("unsupported value {}", other)));
            }
        }
        Ok(())
    }

    fn set_dimension(&mut self, field: DesignField, value: f64) -> Result<(), DesignError> {
        if !value.is_finite() {
            return Err(DesignError::invalid(field, "value must be finite"));
        }
        let slot = match field {
            DesignField::PlateLength => &mut self.plate_length_mm,
            DesignField::PlateWidth => &mut self.plate_width_mm,
            DesignField::PlateThickness => &mut self.plate_thickness_mm,
            DesignField::LetterDepth => &mut self.letter_depth_mm,
            DesignField::TextSize => &mut self.text_size_mm,
            DesignField::LineSpacing => &mut self.line_spacing_mm,
            _ => return Err(DesignError::invalid(field, "expected text, got a number")),
        };
        *slot = Some(value);
        Ok(())
    }

    /// Fields this patch overrides, in declaration order.
    pub fn defined_fields(&self) -> Vec<DesignField> {
        DesignField::ALL
            .into_iter()
            .filter(|field| match field {
                DesignField::Line1 => self.line1.is_some(),
                DesignField::Line2 => self.line2.is_some(),
                DesignField::PlateLength => self.plate_length_mm.is_some(),
                DesignField::PlateWidth => self.plate_width_mm.is_some(),
                DesignField::PlateThickness => self.plate_thickness_mm.is_some(),
                DesignField::LetterDepth => self.letter_depth_mm.is_some(),
                DesignField::TextSize => self.text_size_mm.is_some(),
                DesignField::LineSpacing => self.line_spacing_mm.is_some(),
                DesignField::FontId => self.font_id.is_some(),
                DesignField::Material => self.material.is_some(),
                DesignField::Finish => self.finish.is_some(),
                DesignField::Qr => self.qr.is_some(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.defined_fields().is_empty()
    }

    /// Copy of `base` with this patch's fields overwritten.
    pub fn apply_to(&self, base: &DesignModel) -> DesignModel {
        let mut model = base.clone();
        self.merge_into(&mut model);
        model
    }

    pub fn merge_into(&self, model: &mut DesignModel) {
        if let Some(v) = &self.line1 {
            model.line1 = v.clone();
        }
        if let Some(v) = &self.line2 {
            model.line2 = v.clone();
        }
        if let Some(v) = self.plate_length_mm {
            model.plate_length_mm = v;
        }
        if let Some(v) = self.plate_width_mm {
            model.plate_width_mm = v;
        }
        if let Some(v) = self.plate_thickness_mm {
            model.plate_thickness_mm = v;
        }
        if let Some(v) = self.letter_depth_mm {
            model.letter_depth_mm = v;
        }
        if let Some(v) = self.text_size_mm {
            model.text_size_mm = v;
        }
        if let Some(v) = self.line_spacing_mm {
            model.line_spacing_mm = v;
        }
        if let Some(v) = &self.font_id {
            model.font_id = v.clone();
        }
        if let Some(v) = self.material {
            model.material = v;
        }
        if let Some(v) = self.finish {
            model.finish = v;
        }
        if let Some(v) = &self.qr {
            model.qr = v.clone();
        }
    }
}

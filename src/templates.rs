//! Template Catalog - named partial designs
//!
//! A template only carries the fields it overrides. Applying it is a merge
//! onto a copy of the current design, never a replacement.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::design::{DesignError, DesignModel, DesignPatch};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Duplicate template: {0}")]
    DuplicateTemplate(String),

    #[error("Template {template}: {source}")]
    Field {
        template: String,
        #[source]
        source: DesignError,
    },

    #[error("Template definition {0} is missing '{1}'")]
    MissingKey(String, &'static str),

    #[error("Failed to read templates: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid template JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub category: String,
    pub description: String,
    pub defaults: DesignPatch,
}

impl Template {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
        defaults: DesignPatch,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            description: description.into(),
            defaults,
        }
    }

    /// Parse the flat definition shape: partial design keys plus
    /// `name`, `category` and `description`.
    pub fn from_json_map(mut map: Map<String, Value>) -> Result<Self, CatalogError> {
        let take = |key: &'static str, map: &mut Map<String, Value>| -> Option<String> {
            match map.remove(key) {
                Some(Value::String(s)) => Some(s),
                Some(other) => Some(other.to_string()),
                None => None,
            }
        };
        let name = take("name", &mut map).ok_or_else(|| CatalogError::MissingKey("<unnamed>".into(), "name"))?;
        let category = take("category", &mut map).unwrap_or_else(|| "Custom".to_string());
        let description = take("description", &mut map).unwrap_or_default();

        let defaults = DesignPatch::from_json_map(&map).map_err(|source| CatalogError::Field {
            template: name.clone(),
            source,
        })?;
        Ok(Self { name, category, description, defaults })
    }

    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            name: self.name.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
        }
    }

    /// New design: `base` with only the template's fields overwritten.
    pub fn apply(&self, base: &DesignModel) -> DesignModel {
        self.defaults.apply_to(base)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let defaults = serde_json::to_value(&self.defaults).map_err(serde::ser::Error::custom)?;
        let fields = defaults.as_object().cloned().unwrap_or_default();

        let mut map = serializer.serialize_map(Some(fields.len() + 3))?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("category", &self.category)?;
        map.serialize_entry("description", &self.description)?;
        for (key, value) in &fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TemplateSummary {
    pub name: String,
    pub category: String,
    pub description: String,
}

/// Immutable, ordered set of templates with unique names.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: Vec<Template>,
    index: HashMap<String, usize>,
}

impl TemplateCatalog {
    pub fn from_templates(templates: Vec<Template>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(templates.len());
        for (i, template) in templates.iter().enumerate() {
            if index.insert(template.name.clone(), i).is_some() {
                return Err(CatalogError::DuplicateTemplate(template.name.clone()));
            }
        }
        Ok(Self { templates, index })
    }

    pub fn builtin() -> Self {
        let templates = builtin_templates();
        let index = templates
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Self { templates, index }
    }

    /// Built-in templates followed by every `*.json` definition in `dir`,
    /// in file name order. A missing directory yields just the built-ins.
    pub fn load_from_dir(dir: &Path) -> Result<Self, CatalogError> {
        let mut templates = builtin_templates();
        if dir.exists() {
            let mut paths: Vec<_> = fs::read_dir(dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension().map_or(false, |e| e == "json"))
                .collect();
            paths.sort();

            for path in paths {
                let content = fs::read_to_string(&path)?;
                let map: Map<String, Value> = serde_json::from_str(&content)?;
                let template = Template::from_json_map(map)?;
                tracing::debug!(template = %template.name, path = %path.display(), "Loaded template");
                templates.push(template);
            }
        }
        let catalog = Self::from_templates(templates)?;
        tracing::info!(count = catalog.templates.len(), "Template catalog ready");
        Ok(catalog)
    }

    pub fn list(&self) -> Vec<TemplateSummary> {
        self.templates.iter().map(Template::summary).collect()
    }

    pub fn get(&self, name: &str) -> Result<&Template, CatalogError> {
        self.index
            .get(name)
            .map(|&i| &self.templates[i])
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    pub fn by_category(&self, category: &str) -> Vec<&Template> {
        self.templates.iter().filter(|t| t.category == category).collect()
    }

    pub fn apply(&self, name: &str, base: &DesignModel) -> Result<DesignModel, CatalogError> {
        Ok(self.get(name)?.apply(base))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn preset(
    line1: &str,
    line2: &str,
    dims: [f64; 6],
    font: &str,
    material: crate::design::Material,
    finish: crate::design::Finish,
) -> DesignPatch {
    let [length, width, thickness, depth, text_size, spacing] = dims;
    DesignPatch {
        line1: Some(line1.to_string()),
        line2: Some(line2.to_string()),
        plate_length_mm: Some(length),
        plate_width_mm: Some(width),
        plate_thickness_mm: Some(thickness),
        letter_depth_mm: Some(depth),
        text_size_mm: Some(text_size),
        line_spacing_mm: Some(spacing),
        font_id: Some(font.to_string()),
        material: Some(material),
        finish: Some(finish),
        qr: None,
    }
}

fn builtin_templates() -> Vec<Template> {
    use crate::design::{Finish, Material};

    vec![
        Template::new(
            "Library Sign",
            "Signage",
            "Bilingual library signage",
            preset("Kirjasto", "Library", [160.0, 80.0, 7.0, 4.0, 25.0, 35.0], "Quicksand-Regular", Material::Pla, Finish::Matte),
        ),
        Template::new(
            "Door Plate",
            "Office",
            "Office door nameplate",
            preset("Office", "201", [200.0, 55.0, 5.0, 3.0, 20.0, 25.0], "Quicksand-Bold", Material::Petg, Finish::Glossy),
        ),
        Template::new(
            "Desk Nameplate",
            "Professional",
            "Professional desk sign",
            preset("John Doe", "Manager", [120.0, 45.0, 6.0, 3.0, 15.0, 18.0], "Quicksand-Regular", Material::Wood, Finish::Matte),
        ),
        Template::new(
            "Room Number",
            "Signage",
            "Simple room identifier",
            preset("Room", "101", [100.0, 50.0, 5.0, 4.0, 18.0, 22.0], "Quicksand-Bold", Material::Pla, Finish::Matte),
        ),
        Template::new(
            "Welcome Sign",
            "Signage",
            "Greeting sign",
            preset("Welcome", "Visitors", [180.0, 70.0, 7.0, 5.0, 28.0, 35.0], "Quicksand-Bold", Material::Petg, Finish::Glossy),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{DesignField, Material};
    use crate::validation::Validator;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_builtin_order_is_stable() {
        let names: Vec<_> = TemplateCatalog::builtin().list().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["Library Sign", "Door Plate", "Desk Nameplate", "Room Number", "Welcome Sign"]
        );
    }

    #[test]
    fn test_builtin_templates_validate() {
        let catalog = TemplateCatalog::builtin();
        let validator = Validator::default();
        for summary in catalog.list() {
            let model = catalog.apply(&summary.name, &DesignModel::default()).unwrap();
            let result = validator.validate(&model);
            assert!(result.is_valid, "{}: {}", summary.name, result.error_summary());
        }
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let err = TemplateCatalog::builtin().get("Mailbox").unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(name) if name == "Mailbox"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let t = Template::new("A", "Custom", "", DesignPatch::default());
        let err = TemplateCatalog::from_templates(vec![t.clone(), t]).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateTemplate(name) if name == "A"));
    }

    #[test]
    fn test_apply_is_a_merge() {
        let template = Template::new(
            "Wood",
            "Custom",
            "Only changes material",
            DesignPatch { material: Some(Material::Wood), ..DesignPatch::default() },
        );
        let base = DesignModel { line1: "Sauna".to_string(), ..DesignModel::default() };
        let applied = template.apply(&base);
        assert_eq!(applied.material, Material::Wood);
        assert_eq!(applied.line1, "Sauna");
        assert_eq!(applied.plate_length_mm, base.plate_length_mm);
    }

    #[test]
    fn test_by_category() {
        let catalog = TemplateCatalog::builtin();
        assert_eq!(catalog.by_category("Signage").len(), 3);
        assert!(catalog.by_category("Garden").is_empty());
    }

    #[test]
    fn test_load_from_dir_adds_custom_templates() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("sauna.json")).unwrap();
        write!(
            file,
            "{}",
            json!({"name": "Sauna", "category": "Home", "description": "Sauna door", "line1": "Sauna", "letter_depth_mm": 3.5})
        )
        .unwrap();

        let catalog = TemplateCatalog::load_from_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 6);
        let sauna = catalog.get("Sauna").unwrap();
        assert_eq!(sauna.defaults.defined_fields(), vec![DesignField::Line1, DesignField::LetterDepth]);
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), r#"{"name": "Bad", "colour": "red"}"#).unwrap();
        let err = TemplateCatalog::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::Field { source: DesignError::UnknownField(_), .. }));
    }

    #[test]
    fn test_load_rejects_builtin_name_clash() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dup.json"), r#"{"name": "Door Plate"}"#).unwrap();
        let err = TemplateCatalog::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateTemplate(_)));
    }

    #[test]
    fn test_serialized_shape_is_flat() {
        let template = TemplateCatalog::builtin().get("Room Number").unwrap().clone();
        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value["name"], "Room Number");
        assert_eq!(value["plate_width_mm"], 50.0);
        let back = Template::from_json_map(value.as_object().unwrap().clone()).unwrap();
        assert_eq!(back, template);
    }
}

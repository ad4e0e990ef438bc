//! Project files
//!
//! A project is the design fields plus `created_at`, `modified_at` and
//! `app_version`, stored as one flat JSON object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::design::DesignModel;
use crate::ENGINE_VERSION;

pub const PROJECT_EXTENSION: &str = "npproj";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Project I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid project file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid app version '{0}'")]
    BadVersion(String),

    #[error("Project was written by version {found}, this is {current}")]
    IncompatibleVersion { found: String, current: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectFile {
    pub app_version: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(flatten)]
    pub design: DesignModel,
}

impl ProjectFile {
    pub fn new(design: DesignModel) -> Self {
        let now = Utc::now();
        Self {
            app_version: ENGINE_VERSION.to_string(),
            created_at: now,
            modified_at: now,
            design,
        }
    }

    pub fn update_design(&mut self, design: DesignModel) {
        self.design = design;
        self.modified_at = Utc::now();
    }

    pub fn to_json(&self) -> Result<String, ProjectError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and check that the writer shares our major version.
    pub fn from_json(content: &str) -> Result<Self, ProjectError> {
        let project: ProjectFile = serde_json::from_str(content)?;
        check_version(&project.app_version)?;
        Ok(project)
    }

    /// Write to `path`, adding the `.npproj` extension when missing.
    pub fn save(&self, path: &Path) -> Result<PathBuf, ProjectError> {
        let path = if path.extension().map_or(false, |e| e == PROJECT_EXTENSION) {
            path.to_path_buf()
        } else {
            path.with_extension(PROJECT_EXTENSION)
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, self.to_json()?)?;
        tracing::info!(path = %path.display(), "Project saved");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

fn check_version(found: &str) -> Result<(), ProjectError> {
    let found_ver =
        semver::Version::parse(found).map_err(|_| ProjectError::BadVersion(found.to_string()))?;
    let current = semver::Version::parse(ENGINE_VERSION)
        .map_err(|_| ProjectError::BadVersion(ENGINE_VERSION.to_string()))?;

    if found_ver.major != current.major {
        return Err(ProjectError::IncompatibleVersion {
            found: found.to_string(),
            current: ENGINE_VERSION.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{ErrorCorrection, QrSpec};

    #[test]
    fn test_round_trip_preserves_design() {
        let mut design = DesignModel::default();
        design.qr = Some(QrSpec { error_correction: ErrorCorrection::High, ..QrSpec::new("https://kirjasto.fi") });
        let project = ProjectFile::new(design.clone());

        let back = ProjectFile::from_json(&project.to_json().unwrap()).unwrap();
        assert_eq!(back.design, design);
        assert_eq!(back, project);
    }

    #[test]
    fn test_serialized_shape_is_flat() {
        let project = ProjectFile::new(DesignModel::default());
        let value = serde_json::to_value(&project).unwrap();
        assert_eq!(value["line1"], "KIRJASTO");
        assert_eq!(value["material"], "PLA");
        assert!(value.get("app_version").is_some());
        assert!(value.get("design").is_none());
    }

    #[test]
    fn test_future_major_version_rejected() {
        let mut value = serde_json::to_value(ProjectFile::new(DesignModel::default())).unwrap();
        value["app_version"] = "9.0.0".into();
        let err = ProjectFile::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, ProjectError::IncompatibleVersion { .. }));
    }

    #[test]
    fn test_save_adds_extension() {
        let dir = tempfile::tempdir().unwrap();
        let project = ProjectFile::new(DesignModel::default());
        let path = project.save(&dir.path().join("library_sign")).unwrap();
        assert_eq!(path.extension().unwrap(), PROJECT_EXTENSION);
        assert_eq!(ProjectFile::load(&path).unwrap().design, project.design);
    }

    #[test]
    fn test_update_design_bumps_modified() {
        let mut project = ProjectFile::new(DesignModel::default());
        let created = project.created_at;
        project.update_design(DesignModel { line2: "Bibliotek".to_string(), ..DesignModel::default() });
        assert_eq!(project.created_at, created);
        assert!(project.modified_at >= created);
        assert_eq!(project.design.line2, "Bibliotek");
    }
}

//! Template slot maps.
//!
//! A slot map (`slots.json`) names the substitution points a template
//! exposes, where each slot's value comes from in the dataset, and which
//! template project renders a given record. Relative paths are resolved
//! against the slot map's own directory when it is loaded.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Type of value a slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Text,
    Image,
    Audio,
    Video,
}

impl SlotKind {
    /// Media slots reference files that must exist before rendering.
    pub fn is_media(self) -> bool {
        !matches!(self, Self::Text)
    }
}

/// A named substitution point in the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDef {
    pub name: String,

    pub kind: SlotKind,

    /// Dataset column holding the value (defaults to the slot name).
    #[serde(default)]
    pub column: Option<String>,

    #[serde(default = "default_required")]
    pub required: bool,

    /// File the template links to; rewritten before every render.
    #[serde(default)]
    pub placeholder: Option<PathBuf>,
}

fn default_required() -> bool {
    true
}

impl SlotDef {
    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// An alternative template project chosen per record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariant {
    pub name: String,

    /// Case-insensitive prefix matched against the variant column.
    pub prefix: String,

    pub project: PathBuf,

    /// Overrides the default composition when set.
    #[serde(default)]
    pub composition: Option<String>,
}

/// The project/composition pair a record renders with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateTarget {
    /// Variant name, or `default`.
    pub variant: String,
    pub project: PathBuf,
    pub composition: String,
}

/// Static slot definition for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSlotMap {
    /// Default template project.
    pub project: PathBuf,

    /// Composition rendered from the project.
    pub composition: String,

    /// Column holding the stable record id. Row numbers are used if unset.
    #[serde(default)]
    pub id_column: Option<String>,

    /// Column selecting a template variant.
    #[serde(default)]
    pub variant_column: Option<String>,

    #[serde(default)]
    pub variants: Vec<TemplateVariant>,

    /// Base directory for relative media paths in the dataset.
    #[serde(default)]
    pub asset_root: Option<PathBuf>,

    /// Expected output duration, when known.
    #[serde(default)]
    pub expected_duration_secs: Option<f64>,

    pub slots: Vec<SlotDef>,

    /// Directory of the slot map file.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl TemplateSlotMap {
    /// Load and validate a slot map, resolving relative paths.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ModelError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut map: TemplateSlotMap =
            serde_json::from_str(&content).map_err(|e| ModelError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        map.resolve_paths(&base_dir);
        map.validate()?;
        Ok(map)
    }

    /// Anchor every relative path at `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        self.base_dir = base_dir.to_path_buf();
        self.project = anchor(base_dir, &self.project);
        for variant in &mut self.variants {
            variant.project = anchor(base_dir, &variant.project);
        }
        for slot in &mut self.slots {
            if let Some(placeholder) = slot.placeholder.take() {
                slot.placeholder = Some(anchor(base_dir, &placeholder));
            }
        }
        if let Some(root) = self.asset_root.take() {
            self.asset_root = Some(anchor(base_dir, &root));
        }
    }

    /// Structural checks that do not touch the filesystem.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.slots.is_empty() {
            return Err(invalid("no slots defined"));
        }
        if self.composition.trim().is_empty() {
            return Err(invalid("composition must not be empty"));
        }

        let mut names = HashSet::new();
        for slot in &self.slots {
            if slot.name.trim().is_empty() {
                return Err(invalid("slot with empty name"));
            }
            if !names.insert(slot.name.as_str()) {
                return Err(invalid(format!("duplicate slot '{}'", slot.name)));
            }
        }

        if !self.variants.is_empty() && self.variant_column.is_none() {
            return Err(invalid("variants declared without a variant_column"));
        }
        for variant in &self.variants {
            if variant.prefix.trim().is_empty() {
                return Err(invalid(format!(
                    "variant '{}' has an empty prefix",
                    variant.name
                )));
            }
        }

        if let Some(expected) = self.expected_duration_secs {
            if expected <= 0.0 {
                return Err(invalid("expected_duration_secs must be positive"));
            }
        }
        Ok(())
    }

    /// Columns the dataset must provide.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = vec![];
        if let Some(id) = &self.id_column {
            columns.push(id.as_str());
        }
        if let Some(variant) = &self.variant_column {
            columns.push(variant.as_str());
        }
        columns.extend(
            self.slots
                .iter()
                .filter(|s| s.required)
                .map(SlotDef::column),
        );
        columns
    }

    /// Pick the template for a variant column value.
    pub fn target_for(&self, variant_value: Option<&str>) -> TemplateTarget {
        let value = variant_value.map(|v| v.trim().to_lowercase());
        let matched = value.as_deref().and_then(|value| {
            self.variants
                .iter()
                .find(|variant| value.starts_with(&variant.prefix.trim().to_lowercase()))
        });

        match matched {
            Some(variant) => TemplateTarget {
                variant: variant.name.clone(),
                project: variant.project.clone(),
                composition: variant
                    .composition
                    .clone()
                    .unwrap_or_else(|| self.composition.clone()),
            },
            None => TemplateTarget {
                variant: "default".to_string(),
                project: self.project.clone(),
                composition: self.composition.clone(),
            },
        }
    }

    /// Directory media values are resolved against.
    pub fn asset_root(&self) -> &Path {
        self.asset_root.as_deref().unwrap_or(&self.base_dir)
    }
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn invalid(message: impl Into<String>) -> ModelError {
    ModelError::ValidationError {
        message: message.into(),
    }
}

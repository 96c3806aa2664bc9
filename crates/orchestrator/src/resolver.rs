//! Variable resolution.
//!
//! Maps a raw record onto the slot map. Every referenced media file must
//! exist now, so unresolvable input is caught before the render step.

use std::path::{Path, PathBuf};

use rendermill_job_model::{
    Binding, BindingValue, FailureReason, RawRecord, ResolvedJobSpec, TemplateSlotMap,
};

/// Why a record cannot be rendered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("required slot '{slot}' has no value (column '{column}')")]
    MissingValue { slot: String, column: String },

    #[error("slot '{slot}' references a missing file: {}", path.display())]
    MissingFile { slot: String, path: PathBuf },
}

impl From<ResolutionError> for FailureReason {
    fn from(error: ResolutionError) -> Self {
        FailureReason::Resolution {
            detail: error.to_string(),
        }
    }
}

/// Resolve one record against the slot map.
///
/// Deterministic for the same record, slot map, and files on disk.
pub fn resolve(
    record: &RawRecord,
    slot_map: &TemplateSlotMap,
) -> Result<ResolvedJobSpec, ResolutionError> {
    let variant_value = slot_map
        .variant_column
        .as_deref()
        .and_then(|column| record.field(column));
    let target = slot_map.target_for(variant_value);
    let asset_root = slot_map.asset_root();

    let mut bindings = Vec::with_capacity(slot_map.slots.len());
    for slot in &slot_map.slots {
        let value = match record.field(slot.column()) {
            None if slot.required => {
                return Err(ResolutionError::MissingValue {
                    slot: slot.name.clone(),
                    column: slot.column().to_string(),
                });
            }
            None => None,
            Some(raw) if slot.kind.is_media() => {
                let path = anchor(asset_root, raw);
                if !path.is_file() {
                    return Err(ResolutionError::MissingFile {
                        slot: slot.name.clone(),
                        path,
                    });
                }
                Some(BindingValue::Media(path))
            }
            Some(raw) => Some(BindingValue::Text(raw.to_string())),
        };

        bindings.push(Binding {
            slot: slot.name.clone(),
            kind: slot.kind,
            value,
            placeholder: slot.placeholder.clone(),
        });
    }

    Ok(ResolvedJobSpec {
        id: record.id.clone(),
        row: record.row,
        variant: target.variant,
        project: target.project,
        composition: target.composition,
        bindings,
        expected_duration_secs: slot_map.expected_duration_secs,
    })
}

fn anchor(root: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn slot_map(base: &Path) -> TemplateSlotMap {
        let mut map: TemplateSlotMap = serde_json::from_str(
            r#"{
                "project": "Solutions.aep",
                "composition": "Main",
                "variant_column": "segment",
                "variants": [
                    { "name": "sales", "prefix": "sale", "project": "Sales.aep", "composition": "SalesMain" }
                ],
                "asset_root": "assets",
                "slots": [
                    { "name": "company", "kind": "text" },
                    { "name": "voice", "kind": "audio", "placeholder": "footage/VoiceX.wav" },
                    { "name": "website", "kind": "video", "required": false }
                ]
            }"#,
        )
        .unwrap();
        map.resolve_paths(base);
        map
    }

    fn record(fields: &[(&str, &str)]) -> RawRecord {
        RawRecord {
            id: "3".into(),
            row: 3,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_resolves_values_variant_and_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/v3.wav"), b"wav").unwrap();
        let map = slot_map(dir.path());

        let spec = resolve(
            &record(&[("company", "Acme"), ("voice", "v3.wav"), ("segment", "Sales EMEA")]),
            &map,
        )
        .unwrap();

        assert_eq!(spec.variant, "sales");
        assert_eq!(spec.project, dir.path().join("Sales.aep"));
        assert_eq!(spec.composition, "SalesMain");
        assert_eq!(
            spec.binding("voice").unwrap().value,
            Some(BindingValue::Media(dir.path().join("assets/v3.wav")))
        );
        assert_eq!(
            spec.binding("voice").unwrap().placeholder,
            Some(dir.path().join("footage/VoiceX.wav"))
        );
        assert_eq!(spec.binding("website").unwrap().value, None);

        // Same inputs, same spec.
        let again = resolve(
            &record(&[("company", "Acme"), ("voice", "v3.wav"), ("segment", "Sales EMEA")]),
            &map,
        )
        .unwrap();
        assert_eq!(spec, again);
    }

    #[test]
    fn test_unmatched_variant_uses_default_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/v.wav"), b"wav").unwrap();
        let map = slot_map(dir.path());

        let spec = resolve(
            &record(&[("company", "Acme"), ("voice", "v.wav"), ("segment", "solutions")]),
            &map,
        )
        .unwrap();
        assert_eq!(spec.variant, "default");
        assert_eq!(spec.project, dir.path().join("Solutions.aep"));
    }

    #[test]
    fn test_missing_required_value() {
        let dir = tempfile::tempdir().unwrap();
        let map = slot_map(dir.path());
        let err = resolve(&record(&[("company", "  "), ("voice", "v.wav")]), &map).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::MissingValue {
                slot: "company".into(),
                column: "company".into()
            }
        );
    }

    #[test]
    fn test_missing_media_file() {
        let dir = tempfile::tempdir().unwrap();
        let map = slot_map(dir.path());
        let err =
            resolve(&record(&[("company", "Acme"), ("voice", "gone.wav")]), &map).unwrap_err();
        assert!(matches!(err, ResolutionError::MissingFile { ref slot, .. } if slot == "voice"));
        assert_eq!(FailureReason::from(err).code(), "resolution");
    }
}

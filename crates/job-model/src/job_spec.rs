//! Resolved render job specifications.
//!
//! A job spec is everything one render needs, made explicit: the
//! template to open and the value of every slot. Nothing about a render
//! may depend on state left behind by the previous job.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::slots::SlotKind;

/// A concrete slot value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum BindingValue {
    Text(String),
    Media(PathBuf),
}

/// One slot resolved for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub slot: String,
    pub kind: SlotKind,

    /// `None` when an optional slot has no value for this record.
    pub value: Option<BindingValue>,

    /// Template-linked file rewritten with this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<PathBuf>,
}

/// A record resolved against the slot map, ready to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedJobSpec {
    pub id: String,
    pub row: usize,

    /// Template variant name.
    pub variant: String,

    pub project: PathBuf,
    pub composition: String,

    /// Bindings in slot map order.
    pub bindings: Vec<Binding>,

    /// Expected output duration, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_duration_secs: Option<f64>,
}

impl ResolvedJobSpec {
    /// Slot name to value, for engines that read a bindings document.
    pub fn values(&self) -> BTreeMap<&str, &BindingValue> {
        self.bindings
            .iter()
            .filter_map(|b| b.value.as_ref().map(|v| (b.slot.as_str(), v)))
            .collect()
    }

    pub fn binding(&self, slot: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.slot == slot)
    }
}

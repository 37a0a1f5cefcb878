//! Field inheritance from a parent entity's form data.
//!
//! Precedence is explicit child value, then parent value, then nothing.
//! Resolution is one hop only: a clinic reads its immediate parent, and only
//! sees organization values that the complex already materialized.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::plan::{EntityKind, sub_steps};
use super::state::{EntityFormData, FormFields};

/// `(sub_step, field)` pairs a child may take from its parent.
pub const INHERITABLE_FIELDS: &[(&str, &str)] = &[
    (sub_steps::OVERVIEW, "mission"),
    (sub_steps::OVERVIEW, "vision"),
    (sub_steps::OVERVIEW, "overview"),
    (sub_steps::OVERVIEW, "goals"),
    (sub_steps::CONTACT, "email"),
    (sub_steps::CONTACT, "phone"),
    (sub_steps::CONTACT, "website"),
    (sub_steps::CONTACT, "address"),
    (sub_steps::CONTACT, "city"),
    (sub_steps::CONTACT, "country"),
    (sub_steps::LEGAL, "vat_number"),
    (sub_steps::LEGAL, "terms_and_conditions"),
    (sub_steps::LEGAL, "privacy_policy"),
];

/// Per-child inheritance switches. Off unless set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InheritanceToggles {
    enabled: BTreeMap<EntityKind, bool>,
}

impl InheritanceToggles {
    pub fn is_enabled(&self, child: EntityKind) -> bool {
        self.enabled.get(&child).copied().unwrap_or(false)
    }

    pub fn set(&mut self, child: EntityKind, enabled: bool) {
        self.enabled.insert(child, enabled);
    }
}

/// An effective field value and where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedField<'a> {
    pub value: Option<&'a Value>,
    /// True when the value was taken from the parent.
    pub inherited: bool,
}

/// Whether `value` counts as unset: missing, null, blank string, or an empty
/// array/object. Numbers and booleans are always set.
pub fn is_unset(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Bool(_)) | Some(Value::Number(_)) => false,
    }
}

/// Compute the effective value of `field_name`.
///
/// The child's own value wins whenever it is set, inheritance is off, or
/// there is no parent. Otherwise the parent's value is returned, which may
/// itself be unset.
pub fn resolve_field<'a>(
    field_name: &str,
    parent: Option<&'a FormFields>,
    inheritance_enabled: bool,
    child_value: Option<&'a Value>,
) -> ResolvedField<'a> {
    let own = ResolvedField {
        value: child_value,
        inherited: false,
    };
    if !inheritance_enabled || !is_unset(child_value) {
        return own;
    }
    match parent {
        Some(parent) => ResolvedField {
            value: parent.get(field_name),
            inherited: true,
        },
        None => own,
    }
}

/// Resolve one field of an entity bag against its parent bag.
pub fn resolve_entity_field<'a>(
    child: Option<&'a EntityFormData>,
    parent: Option<&'a EntityFormData>,
    inheritance_enabled: bool,
    sub_step: &str,
    field_name: &str,
) -> ResolvedField<'a> {
    let child_value = child.and_then(|c| c.field(sub_step, field_name));
    let parent_fields = parent.and_then(|p| p.sub_step(sub_step));
    resolve_field(field_name, parent_fields, inheritance_enabled, child_value)
}

/// Copy inheritable parent values into empty child fields.
///
/// Fields the child already has are never overwritten. Returns the
/// `sub_step.field` names that were filled.
pub fn backfill(child: &mut EntityFormData, parent: &EntityFormData) -> Vec<String> {
    let mut filled = Vec::new();
    for (sub_step, field) in INHERITABLE_FIELDS {
        if !is_unset(child.field(sub_step, field)) {
            continue;
        }
        let Some(value) = parent.field(sub_step, field) else {
            continue;
        };
        if is_unset(Some(value)) {
            continue;
        }
        child.set_field(sub_step, field, value.clone());
        filled.push(format!("{sub_step}.{field}"));
    }
    if !filled.is_empty() {
        debug!(fields = ?filled, "Backfilled inherited fields");
    }
    filled
}

//! Final payload assembly for the account-creation call.
//!
//! Each entity becomes one section holding its sub-step objects under their
//! sub-step keys, so equally named fields of different forms never clash.
//! Inherited fields are materialized and required fields are checked one
//! last time before the payload leaves the core.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OnboardingError;

use super::inheritance::{INHERITABLE_FIELDS, InheritanceToggles, is_unset, resolve_entity_field};
use super::plan::{EntityKind, PlanStepCatalog, PlanType, StepDefinition, sub_steps};
use super::state::{EntityDataMap, EntityFormData, FormFields};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// Fields every included entity must carry, as `(sub_step, field)`.
const REQUIRED_FIELDS: &[(&str, &str)] = &[(sub_steps::OVERVIEW, "name"), (sub_steps::CONTACT, "email")];

/// Overview field that scopes a standalone clinic under an existing complex.
pub const EXISTING_COMPLEX_FIELD: &str = "complex_id";

/// The account owner completing onboarding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Body of the backend completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompleteOnboardingPayload {
    pub plan_type: PlanType,
    pub user: UserData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<FormFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complex: Option<FormFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinic: Option<FormFields>,
}

impl CompleteOnboardingPayload {
    pub fn entity(&self, entity: EntityKind) -> Option<&FormFields> {
        match entity {
            EntityKind::Company => self.company.as_ref(),
            EntityKind::Complex => self.complex.as_ref(),
            EntityKind::Clinic => self.clinic.as_ref(),
        }
    }

    fn entity_mut(&mut self, entity: EntityKind) -> &mut Option<FormFields> {
        match entity {
            EntityKind::Company => &mut self.company,
            EntityKind::Complex => &mut self.complex,
            EntityKind::Clinic => &mut self.clinic,
        }
    }
}

/// Performs the account-creation call with a finished payload.
#[async_trait]
pub trait OnboardingCompleter: Send + Sync {
    async fn complete(&self, payload: &CompleteOnboardingPayload) -> Result<(), OnboardingError>;
}

fn check_email(entity: &str, field: &str, value: &str) -> Result<(), OnboardingError> {
    if EMAIL_RE.is_match(value.trim()) {
        Ok(())
    } else {
        Err(OnboardingError::InvalidField {
            entity: entity.to_string(),
            field: field.to_string(),
            reason: format!("'{value}' is not an email address"),
        })
    }
}

/// An entity's bag with inherited values filled into its empty fields.
fn effective_bag(
    plan: PlanType,
    step: &StepDefinition,
    entity_data: &EntityDataMap,
    inheritance: &InheritanceToggles,
) -> (EntityFormData, bool) {
    let child = entity_data.get(&step.entity);
    let parent_kind = step.entity.parent_in(plan);
    let parent = parent_kind.and_then(|p| entity_data.get(&p));
    let enabled = parent_kind.is_some() && inheritance.is_enabled(step.entity);

    let mut bag = child.cloned().unwrap_or_default();
    if enabled {
        for (sub_step, field) in INHERITABLE_FIELDS {
            let resolved = resolve_entity_field(child, parent, true, sub_step, field);
            match resolved.value {
                Some(value) if resolved.inherited && !is_unset(Some(value)) => {
                    bag.set_field(sub_step, field, value.clone());
                }
                _ => {}
            }
        }
    }
    (bag, enabled)
}

fn check_required(entity: EntityKind, bag: &EntityFormData) -> Result<(), OnboardingError> {
    for (sub_step, field) in REQUIRED_FIELDS {
        if is_unset(bag.field(sub_step, field)) {
            return Err(OnboardingError::MissingRequiredField {
                entity: entity.to_string(),
                field: format!("{sub_step}.{field}"),
            });
        }
    }
    if let Some(Value::String(email)) = bag.field(sub_steps::CONTACT, "email") {
        check_email(entity.as_str(), "contact.email", email)?;
    }
    Ok(())
}

/// One payload section: each of the step's sub-step objects under its own
/// key, in catalog order, plus `inherits_from_parent` for child entities.
fn entity_section(step: &StepDefinition, bag: &EntityFormData, has_parent: bool, enabled: bool) -> FormFields {
    let mut section = FormFields::new();
    for sub_step in step.sub_steps {
        if let Some(fields) = bag.sub_step(sub_step) {
            section.insert(sub_step.to_string(), Value::Object(fields.clone()));
        }
    }
    if has_parent {
        section.insert("inherits_from_parent".to_string(), Value::Bool(enabled));
    }
    section
}

/// Build the completion payload for `plan`.
///
/// Entities outside the plan are omitted. A clinic-plan clinic whose
/// overview names an existing complex gets a `complex` reference section.
pub fn build_final_payload(
    plan: PlanType,
    entity_data: &EntityDataMap,
    inheritance: &InheritanceToggles,
    user: &UserData,
) -> Result<CompleteOnboardingPayload, OnboardingError> {
    if user.email.trim().is_empty() {
        return Err(OnboardingError::MissingRequiredField {
            entity: "user".to_string(),
            field: "email".to_string(),
        });
    }
    check_email("user", "email", &user.email)?;

    let mut payload = CompleteOnboardingPayload {
        plan_type: plan,
        user: user.clone(),
        company: None,
        complex: None,
        clinic: None,
    };

    for step in PlanStepCatalog::steps(plan) {
        let (bag, enabled) = effective_bag(plan, step, entity_data, inheritance);
        check_required(step.entity, &bag)?;
        let has_parent = step.entity.parent_in(plan).is_some();
        *payload.entity_mut(step.entity) = Some(entity_section(step, &bag, has_parent, enabled));
    }

    if plan == PlanType::Clinic {
        let existing = entity_data
            .get(&EntityKind::Clinic)
            .and_then(|d| d.field(sub_steps::OVERVIEW, EXISTING_COMPLEX_FIELD))
            .filter(|v| !is_unset(Some(*v)));
        if let Some(id) = existing {
            let mut reference = FormFields::new();
            reference.insert("id".to_string(), id.clone());
            payload.complex = Some(reference);
        }
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> UserData {
        UserData {
            name: "Dr. Sara".to_string(),
            email: "sara@example.com".to_string(),
            phone: None,
        }
    }

    fn bag(entries: &[(&str, Value)]) -> EntityFormData {
        let mut data = EntityFormData::new();
        for (sub_step, value) in entries {
            data.merge(sub_step, value.as_object().cloned().unwrap());
        }
        data
    }

    fn clinic_data(name: &str, email: &str) -> EntityDataMap {
        let mut map = EntityDataMap::new();
        map.insert(
            EntityKind::Clinic,
            bag(&[
                ("overview", json!({"name": name, "mission": "Care"})),
                ("contact", json!({"email": email, "phone": "+966511111111"})),
                ("legal", json!({"cr_number": "1010101010"})),
                ("schedule", json!({"working_hours": []})),
            ]),
        );
        map
    }

    #[test]
    fn clinic_plan_includes_only_clinic() {
        let data = clinic_data("North Clinic", "north@clinic.sa");
        let payload =
            build_final_payload(PlanType::Clinic, &data, &InheritanceToggles::default(), &user()).unwrap();

        assert!(payload.company.is_none());
        assert!(payload.complex.is_none());
        let clinic = payload.clinic.as_ref().unwrap();
        assert_eq!(clinic["overview"]["name"], "North Clinic");
        assert_eq!(clinic["contact"]["email"], "north@clinic.sa");
        assert_eq!(clinic["legal"]["cr_number"], "1010101010");
        assert!(clinic["schedule"]["working_hours"].is_array());
        assert!(clinic.get("inherits_from_parent").is_none());

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("company").is_none());
        assert_eq!(json["plan_type"], "clinic");
    }

    #[test]
    fn clinic_under_existing_complex_gets_reference() {
        let mut data = clinic_data("North Clinic", "north@clinic.sa");
        data.get_mut(&EntityKind::Clinic)
            .unwrap()
            .set_field("overview", EXISTING_COMPLEX_FIELD, json!("cx-42"));

        let payload =
            build_final_payload(PlanType::Clinic, &data, &InheritanceToggles::default(), &user()).unwrap();
        assert_eq!(payload.complex.unwrap()["id"], "cx-42");
    }

    #[test]
    fn missing_name_is_reported() {
        let data = clinic_data("", "north@clinic.sa");
        let err = build_final_payload(PlanType::Clinic, &data, &InheritanceToggles::default(), &user())
            .unwrap_err();
        match err {
            OnboardingError::MissingRequiredField { entity, field } => {
                assert_eq!(entity, "clinic");
                assert_eq!(field, "overview.name");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_entity_bag_is_reported() {
        let err = build_final_payload(
            PlanType::Company,
            &EntityDataMap::new(),
            &InheritanceToggles::default(),
            &user(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OnboardingError::MissingRequiredField { ref entity, .. } if entity == "company"
        ));
    }

    #[test]
    fn malformed_email_is_rejected() {
        let data = clinic_data("North Clinic", "not-an-email");
        let err = build_final_payload(PlanType::Clinic, &data, &InheritanceToggles::default(), &user())
            .unwrap_err();
        assert!(matches!(err, OnboardingError::InvalidField { .. }));
    }

    #[test]
    fn user_email_is_required() {
        let data = clinic_data("North Clinic", "north@clinic.sa");
        let user = UserData::default();
        let err = build_final_payload(PlanType::Clinic, &data, &InheritanceToggles::default(), &user)
            .unwrap_err();
        assert!(matches!(
            err,
            OnboardingError::MissingRequiredField { ref entity, .. } if entity == "user"
        ));
    }

    #[test]
    fn inherited_contact_satisfies_required_check() {
        let mut data = EntityDataMap::new();
        data.insert(
            EntityKind::Complex,
            bag(&[
                ("overview", json!({"name": "Central Complex", "mission": "Heal the world"})),
                ("contact", json!({"email": "central@complex.sa"})),
            ]),
        );
        data.insert(
            EntityKind::Clinic,
            bag(&[("overview", json!({"name": "Dental Clinic"})), ("contact", json!({"phone": "123"}))]),
        );
        let mut toggles = InheritanceToggles::default();
        toggles.set(EntityKind::Clinic, true);

        let payload = build_final_payload(PlanType::Complex, &data, &toggles, &user()).unwrap();
        let clinic = payload.entity(EntityKind::Clinic).unwrap();
        assert_eq!(clinic["contact"]["email"], "central@complex.sa");
        assert_eq!(clinic["overview"]["mission"], "Heal the world");
        assert_eq!(clinic["contact"]["phone"], "123");
        assert_eq!(clinic["inherits_from_parent"], true);
        assert!(payload.company.is_none());
        assert!(payload.entity(EntityKind::Complex).unwrap().get("inherits_from_parent").is_none());
    }

    #[test]
    fn same_field_name_in_different_forms_is_kept_apart() {
        let mut data = clinic_data("North Clinic", "north@clinic.sa");
        data.get_mut(&EntityKind::Clinic)
            .unwrap()
            .set_field("contact", "name", json!("Dr Ali"));

        let payload =
            build_final_payload(PlanType::Clinic, &data, &InheritanceToggles::default(), &user()).unwrap();
        let clinic = payload.clinic.unwrap();
        assert_eq!(clinic["overview"]["name"], "North Clinic");
        assert_eq!(clinic["contact"]["name"], "Dr Ali");
    }

    #[test]
    fn required_name_must_come_from_overview() {
        let mut data = EntityDataMap::new();
        data.insert(
            EntityKind::Clinic,
            bag(&[
                ("overview", json!({"mission": "Care"})),
                ("contact", json!({"email": "north@clinic.sa"})),
                ("legal", json!({"name": "Owner LLC"})),
            ]),
        );

        let err = build_final_payload(PlanType::Clinic, &data, &InheritanceToggles::default(), &user())
            .unwrap_err();
        match err {
            OnboardingError::MissingRequiredField { entity, field } => {
                assert_eq!(entity, "clinic");
                assert_eq!(field, "overview.name");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn inheritance_off_does_not_backfill() {
        let mut data = EntityDataMap::new();
        data.insert(
            EntityKind::Complex,
            bag(&[
                ("overview", json!({"name": "Central Complex"})),
                ("contact", json!({"email": "central@complex.sa"})),
            ]),
        );
        data.insert(EntityKind::Clinic, bag(&[("overview", json!({"name": "Dental Clinic"}))]));

        let err = build_final_payload(PlanType::Complex, &data, &InheritanceToggles::default(), &user())
            .unwrap_err();
        assert!(matches!(
            err,
            OnboardingError::MissingRequiredField { ref field, .. } if field == "contact.email"
        ));
    }
}

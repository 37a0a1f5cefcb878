//! Plan types and the static step catalog.
//!
//! Each plan type maps to an ordered list of steps, one per entity the user
//! has to configure, and each step to an ordered list of sub-step forms.
//! The tables are checked at compile time: steps are numbered `1..=N`,
//! every step has at least one sub-step, and sub-step keys are unique
//! within a step.

use serde::{Deserialize, Serialize};

/// The subscription tier chosen at wizard start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Company,
    Complex,
    Clinic,
}

impl PlanType {
    pub const ALL: [PlanType; 3] = [PlanType::Company, PlanType::Complex, PlanType::Clinic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Complex => "complex",
            Self::Clinic => "clinic",
        }
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "company" => Ok(Self::Company),
            "complex" => Ok(Self::Complex),
            "clinic" => Ok(Self::Clinic),
            other => Err(format!("unknown plan type: {other}")),
        }
    }
}

/// An entity configured by one wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Company,
    Complex,
    Clinic,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Complex => "complex",
            Self::Clinic => "clinic",
        }
    }

    /// The entity this one inherits from under `plan`, if any.
    ///
    /// A complex inherits from the company. A clinic inherits from the
    /// complex when the plan configures one, otherwise from the company.
    pub fn parent_in(&self, plan: PlanType) -> Option<EntityKind> {
        let parent = match self {
            Self::Company => return None,
            Self::Complex => EntityKind::Company,
            Self::Clinic => {
                if PlanStepCatalog::step_for_entity(plan, EntityKind::Complex).is_some() {
                    EntityKind::Complex
                } else {
                    EntityKind::Company
                }
            }
        };
        PlanStepCatalog::step_for_entity(plan, parent).map(|_| parent)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sub-step keys shared by the step tables and the form-data bags.
pub mod sub_steps {
    pub const OVERVIEW: &str = "overview";
    pub const SERVICES: &str = "services";
    pub const CONTACT: &str = "contact";
    pub const LEGAL: &str = "legal";
    pub const SCHEDULE: &str = "schedule";
}

use sub_steps::{CONTACT, LEGAL, OVERVIEW, SCHEDULE, SERVICES};

/// One top-level wizard stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDefinition {
    /// 1-based position within the plan.
    pub id: u32,
    /// The entity this step configures.
    pub entity: EntityKind,
    /// Ordered sub-step keys. Never empty.
    pub sub_steps: &'static [&'static str],
}

impl StepDefinition {
    /// Step name, used as the prefix of completion keys.
    pub fn name(&self) -> &'static str {
        self.entity.as_str()
    }

    pub fn first_sub_step(&self) -> &'static str {
        self.sub_steps[0]
    }

    pub fn last_sub_step(&self) -> &'static str {
        self.sub_steps[self.sub_steps.len() - 1]
    }

    /// Index of `sub_step` within this step.
    pub fn position(&self, sub_step: &str) -> Option<usize> {
        self.sub_steps.iter().position(|s| *s == sub_step)
    }

    pub fn has_sub_step(&self, sub_step: &str) -> bool {
        self.position(sub_step).is_some()
    }
}

const COMPANY_SUB_STEPS: &[&str] = &[OVERVIEW, CONTACT, LEGAL];
const COMPLEX_SUB_STEPS: &[&str] = &[OVERVIEW, CONTACT, LEGAL, SCHEDULE];
const NESTED_CLINIC_SUB_STEPS: &[&str] = &[OVERVIEW, SERVICES, CONTACT, LEGAL, SCHEDULE];
const STANDALONE_CLINIC_SUB_STEPS: &[&str] = &[OVERVIEW, CONTACT, LEGAL, SCHEDULE];

const COMPANY_PLAN: &[StepDefinition] = &[
    StepDefinition {
        id: 1,
        entity: EntityKind::Company,
        sub_steps: COMPANY_SUB_STEPS,
    },
    StepDefinition {
        id: 2,
        entity: EntityKind::Complex,
        sub_steps: COMPLEX_SUB_STEPS,
    },
    StepDefinition {
        id: 3,
        entity: EntityKind::Clinic,
        sub_steps: NESTED_CLINIC_SUB_STEPS,
    },
];

const COMPLEX_PLAN: &[StepDefinition] = &[
    StepDefinition {
        id: 1,
        entity: EntityKind::Complex,
        sub_steps: COMPLEX_SUB_STEPS,
    },
    StepDefinition {
        id: 2,
        entity: EntityKind::Clinic,
        sub_steps: NESTED_CLINIC_SUB_STEPS,
    },
];

const CLINIC_PLAN: &[StepDefinition] = &[StepDefinition {
    id: 1,
    entity: EntityKind::Clinic,
    sub_steps: STANDALONE_CLINIC_SUB_STEPS,
}];

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

const fn is_well_formed(steps: &[StepDefinition]) -> bool {
    if steps.is_empty() {
        return false;
    }
    let mut i = 0;
    while i < steps.len() {
        let step = &steps[i];
        if step.id as usize != i + 1 || step.sub_steps.is_empty() {
            return false;
        }
        let mut a = 0;
        while a < step.sub_steps.len() {
            let mut b = a + 1;
            while b < step.sub_steps.len() {
                if str_eq(step.sub_steps[a], step.sub_steps[b]) {
                    return false;
                }
                b += 1;
            }
            a += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(is_well_formed(COMPANY_PLAN));
const _: () = assert!(is_well_formed(COMPLEX_PLAN));
const _: () = assert!(is_well_formed(CLINIC_PLAN));

/// Static lookup of steps per plan type.
pub struct PlanStepCatalog;

impl PlanStepCatalog {
    /// Ordered steps for `plan`.
    pub fn steps(plan: PlanType) -> &'static [StepDefinition] {
        match plan {
            PlanType::Company => COMPANY_PLAN,
            PlanType::Complex => COMPLEX_PLAN,
            PlanType::Clinic => CLINIC_PLAN,
        }
    }

    /// Step `id` of `plan`, if it exists.
    pub fn step(plan: PlanType, id: u32) -> Option<&'static StepDefinition> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        Self::steps(plan).get(index)
    }

    pub fn total_steps(plan: PlanType) -> u32 {
        Self::steps(plan).len() as u32
    }

    /// Sum of sub-step counts across every step of `plan`.
    pub fn total_sub_steps(plan: PlanType) -> usize {
        Self::steps(plan).iter().map(|s| s.sub_steps.len()).sum()
    }

    /// The step that configures `entity` under `plan`.
    pub fn step_for_entity(plan: PlanType, entity: EntityKind) -> Option<&'static StepDefinition> {
        Self::steps(plan).iter().find(|s| s.entity == entity)
    }

    /// The step whose name is `name` under `plan`.
    pub fn step_by_name(plan: PlanType, name: &str) -> Option<&'static StepDefinition> {
        Self::steps(plan).iter().find(|s| s.name() == name)
    }

    /// Whether `(step, sub_step)` addresses a real position in `plan`.
    pub fn is_valid_position(plan: PlanType, step: u32, sub_step: &str) -> bool {
        Self::step(plan, step).is_some_and(|s| s.has_sub_step(sub_step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn steps_are_contiguous_from_one() {
        for plan in PlanType::ALL {
            let steps = PlanStepCatalog::steps(plan);
            assert_eq!(PlanStepCatalog::total_steps(plan) as usize, steps.len());
            for (i, step) in steps.iter().enumerate() {
                assert_eq!(step.id as usize, i + 1, "{plan} step {i} misnumbered");
            }
        }
    }

    #[test]
    fn sub_steps_nonempty_and_unique() {
        for plan in PlanType::ALL {
            for step in PlanStepCatalog::steps(plan) {
                assert!(!step.sub_steps.is_empty());
                let unique: HashSet<_> = step.sub_steps.iter().collect();
                assert_eq!(unique.len(), step.sub_steps.len());
            }
        }
    }

    #[test]
    fn clinic_plan_has_single_four_form_step() {
        let steps = PlanStepCatalog::steps(PlanType::Clinic);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].sub_steps, &["overview", "contact", "legal", "schedule"]);
        assert_eq!(PlanStepCatalog::total_sub_steps(PlanType::Clinic), 4);
    }

    #[test]
    fn company_plan_walks_every_entity() {
        let names: Vec<_> = PlanStepCatalog::steps(PlanType::Company)
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(names, vec!["company", "complex", "clinic"]);
    }

    #[test]
    fn step_lookup_out_of_range() {
        assert!(PlanStepCatalog::step(PlanType::Company, 0).is_none());
        assert!(PlanStepCatalog::step(PlanType::Company, 4).is_none());
        assert_eq!(PlanStepCatalog::step(PlanType::Company, 2).unwrap().entity, EntityKind::Complex);
    }

    #[test]
    fn valid_position_checks_sub_step_membership() {
        assert!(PlanStepCatalog::is_valid_position(PlanType::Clinic, 1, "legal"));
        assert!(!PlanStepCatalog::is_valid_position(PlanType::Clinic, 1, "services"));
        assert!(!PlanStepCatalog::is_valid_position(PlanType::Company, 99, "overview"));
    }

    #[test]
    fn parents_follow_plan_shape() {
        assert_eq!(EntityKind::Company.parent_in(PlanType::Company), None);
        assert_eq!(EntityKind::Complex.parent_in(PlanType::Company), Some(EntityKind::Company));
        assert_eq!(EntityKind::Clinic.parent_in(PlanType::Company), Some(EntityKind::Complex));
        assert_eq!(EntityKind::Clinic.parent_in(PlanType::Complex), Some(EntityKind::Complex));
        assert_eq!(EntityKind::Complex.parent_in(PlanType::Complex), None);
        assert_eq!(EntityKind::Clinic.parent_in(PlanType::Clinic), None);
    }

    #[test]
    fn display_matches_serde() {
        for plan in PlanType::ALL {
            let json = serde_json::to_string(&plan).unwrap();
            assert_eq!(format!("\"{plan}\""), json);
            assert_eq!(plan.as_str().parse::<PlanType>().unwrap(), plan);
        }
        assert!("hospital".parse::<PlanType>().is_err());
    }
}

//! The Ecuro tool catalogue.
//!
//! Each group module exposes `routes()`; [`registry`] assembles them into one
//! router and fails on a repeated name.
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    handler::server::{
        tool::{RegistryError, ToolRoute, ToolRouter, schema_for_type},
        validation::{Validate, Violations},
    },
    model::{Tool, ToolAnnotations},
    upstream::UpstreamClient,
};

pub mod appointments;
pub mod availability;
pub mod clinics;
pub mod communications;
pub mod dentists;
pub mod patients;

pub type EcuroRoute = ToolRoute<UpstreamClient>;

pub fn groups() -> [Vec<EcuroRoute>; 6] {
    [
        appointments::routes(),
        availability::routes(),
        patients::routes(),
        dentists::routes(),
        clinics::routes(),
        communications::routes(),
    ]
}

pub fn registry() -> Result<ToolRouter<UpstreamClient>, RegistryError> {
    ToolRouter::from_routes(groups().into_iter().flatten())
}

/// Build a descriptor whose input schema is generated from `P`.
pub(crate) fn tool<P: JsonSchema>(
    name: &'static str,
    title: &'static str,
    description: &'static str,
    annotations: ToolAnnotations,
) -> Tool {
    Tool::new(name, description, schema_for_type::<P>())
        .with_title(title)
        .annotate(annotations)
}

/// Argument type for tools that take nothing.
#[derive(Debug, Default, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NoArguments {}

impl Validate for NoArguments {}

/// Argument type for tools keyed by a single clinic.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClinicRef {
    /// Clinic ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: String,
}

impl Validate for ClinicRef {
    fn validate(&self, violations: &mut Violations) {
        violations.uuid("clinicId", &self.clinic_id);
    }
}

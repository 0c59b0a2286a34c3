//! Dentist lookups against the clinic's Supabase directory.
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ClinicRef, EcuroRoute, tool};
use crate::{
    handler::server::{
        tool::{Parameters, ToolOutcome, ToolOutput, ToolRoute},
        validation::{Validate, Violations},
    },
    model::ToolAnnotations,
    upstream::UpstreamClient,
};

/// Specialty under which clinics list their assessment dentists.
pub const ASSESSMENT_SPECIALITY: &str = "Avaliação";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DentistByName {
    /// Dentist first name
    #[schemars(length(min = 1))]
    pub first_name: String,
    /// Clinic ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: String,
}

impl Validate for DentistByName {
    fn validate(&self, violations: &mut Violations) {
        violations
            .min_len("firstName", &self.first_name, 1)
            .uuid("clinicId", &self.clinic_id);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DentistBySpeciality {
    /// Specialty name (e.g. Ortodontia, Implante, Avaliação)
    #[schemars(length(min = 1))]
    pub speciality_name: String,
    /// Clinic ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: String,
}

impl Validate for DentistBySpeciality {
    fn validate(&self, violations: &mut Violations) {
        violations
            .min_len("specialityName", &self.speciality_name, 1)
            .uuid("clinicId", &self.clinic_id);
    }
}

fn rows_or(rows: Vec<Value>, empty: String) -> ToolOutput {
    if rows.is_empty() {
        ToolOutput::Text(empty)
    } else {
        ToolOutput::Json(Value::Array(rows))
    }
}

pub async fn get_dentist_by_name(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<DentistByName>,
) -> ToolOutcome {
    let rows = client
        .directory()?
        .find(&[
            ("firstName", args.first_name.as_str()),
            ("clinic_id", args.clinic_id.as_str()),
        ])
        .await?;
    Ok(rows_or(
        rows,
        format!(
            "Nenhum dentista encontrado com o nome \"{}\" na clínica informada.",
            args.first_name
        ),
    ))
}

pub async fn get_dentist_by_speciality(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<DentistBySpeciality>,
) -> ToolOutcome {
    let rows = client
        .directory()?
        .find(&[
            ("speciality_name", args.speciality_name.as_str()),
            ("clinic_id", args.clinic_id.as_str()),
        ])
        .await?;
    Ok(rows_or(
        rows,
        format!(
            "Nenhum dentista encontrado para a especialidade \"{}\" na clínica informada.",
            args.speciality_name
        ),
    ))
}

pub async fn get_dentist_for_assessment(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<ClinicRef>,
) -> ToolOutcome {
    let rows = client
        .directory()?
        .find(&[
            ("speciality_name", ASSESSMENT_SPECIALITY),
            ("clinic_id", args.clinic_id.as_str()),
        ])
        .await?;
    Ok(rows_or(
        rows,
        "Nenhum dentista de avaliação encontrado para a clínica informada.".to_string(),
    ))
}

fn directory_lookup() -> ToolAnnotations {
    ToolAnnotations {
        open_world_hint: Some(false),
        ..ToolAnnotations::read_only()
    }
}

pub fn routes() -> Vec<EcuroRoute> {
    vec![
        ToolRoute::new(
            tool::<DentistByName>(
                "ecuro_get_dentist_by_name",
                "Find Dentist by Name",
                "Find dentists of a clinic by first name. Returns their IDs, \
names and specialties.",
                directory_lookup(),
            ),
            get_dentist_by_name,
        ),
        ToolRoute::new(
            tool::<DentistBySpeciality>(
                "ecuro_get_dentist_by_speciality",
                "Find Dentist by Specialty",
                "Dentists of a clinic who practice a specialty (e.g. Ortodontia, \
Implante, Endodontia), with their IDs and specialty data.",
                directory_lookup(),
            ),
            get_dentist_by_speciality,
        ),
        ToolRoute::new(
            tool::<ClinicRef>(
                "ecuro_get_dentist_for_assessment",
                "Assessment Dentists",
                "Dentists of a clinic who run initial assessment appointments.",
                directory_lookup(),
            ),
            get_dentist_for_assessment,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        directory::DirectoryError, handler::server::tool::ToolFailure, upstream::UpstreamConfig,
    };

    const CLINIC: &str = "0b6a9f4e-3c1d-4f2a-9e8b-7d6c5b4a3f21";

    #[test]
    fn test_blank_first_name_is_rejected() {
        let mut violations = Violations::default();
        DentistByName {
            first_name: String::new(),
            clinic_id: CLINIC.into(),
        }
        .validate(&mut violations);
        let errors = violations.into_result().unwrap_err();
        assert_eq!(errors[0].field, "firstName");
    }

    #[tokio::test]
    async fn test_lookup_without_directory_fails_as_content() {
        let client = Arc::new(UpstreamClient::new(UpstreamConfig::default()).unwrap());
        let outcome = get_dentist_for_assessment(
            client,
            Parameters(ClinicRef {
                clinic_id: CLINIC.into(),
            }),
        )
        .await;
        assert!(matches!(
            outcome,
            Err(ToolFailure::Directory(DirectoryError::NotConfigured))
        ));
    }

    #[test]
    fn test_empty_result_becomes_message() {
        assert_eq!(
            rows_or(Vec::new(), "nada".into()),
            ToolOutput::Text("nada".into())
        );
        let rows = vec![serde_json::json!({ "id": "d1" })];
        assert_eq!(
            rows_or(rows.clone(), "nada".into()),
            ToolOutput::Json(Value::Array(rows))
        );
    }
}

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ClinicRef, EcuroRoute, tool};
use crate::{
    handler::server::{
        tool::{Parameters, ToolOutcome, ToolOutput, ToolRoute},
        validation::{CPF_PATTERN, Validate, Violations, is_cpf},
    },
    model::ToolAnnotations,
    upstream::UpstreamClient,
};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatientByPhone {
    /// Patient phone number (e.g. 31989354137)
    #[schemars(length(min = 8))]
    pub phone: String,
}

impl Validate for PatientByPhone {
    fn validate(&self, violations: &mut Violations) {
        violations.min_len("phone", &self.phone, 8);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatientByCpf {
    /// Patient CPF, 11 digits, with or without punctuation
    #[schemars(extend("pattern" = CPF_PATTERN))]
    pub cpf: String,
}

/// Strip the usual `000.000.000-00` punctuation.
fn cpf_digits(cpf: &str) -> String {
    cpf.trim()
        .chars()
        .filter(|c| !matches!(c, '.' | '-'))
        .collect()
}

impl Validate for PatientByCpf {
    fn validate(&self, violations: &mut Violations) {
        violations.check(
            is_cpf(&self.cpf),
            "cpf",
            "must contain exactly 11 digits, optionally as 000.000.000-00",
        );
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatientRef {
    /// Patient ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub patient_id: String,
}

impl Validate for PatientRef {
    fn validate(&self, violations: &mut Violations) {
        violations.uuid("patientId", &self.patient_id);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListPatients {
    /// Clinic ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: String,
    /// Filter by name, phone or CPF
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Page number, starting at 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub page: Option<u32>,
    /// Patients per page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub page_size: Option<u32>,
}

impl Validate for ListPatients {
    fn validate(&self, violations: &mut Violations) {
        violations
            .uuid("clinicId", &self.clinic_id)
            .check(self.page != Some(0), "page", "must be at least 1")
            .check(self.page_size != Some(0), "pageSize", "must be at least 1");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OnboardingEvent {
    /// Patient ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub patient_id: String,
    /// Clinic ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: String,
    /// Event name (e.g. FIRST_CONTACT, FORM_COMPLETED)
    #[schemars(length(min = 1))]
    pub event: String,
    /// Free-form event details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Validate for OnboardingEvent {
    fn validate(&self, violations: &mut Violations) {
        violations
            .uuid("patientId", &self.patient_id)
            .uuid("clinicId", &self.clinic_id)
            .min_len("event", &self.event, 1);
    }
}

pub async fn get_patient_by_phone(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<PatientByPhone>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(
        client.post("/get-patient-by-phone", &args).await?,
    ))
}

pub async fn get_patient_by_cpf(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<PatientByCpf>,
) -> ToolOutcome {
    let cpf = cpf_digits(&args.cpf);
    Ok(ToolOutput::Json(
        client.get("/get-patient-by-cpf", &[("cpf", cpf)]).await?,
    ))
}

pub async fn patient_details(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<PatientRef>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(client.get("/patient-details", &args).await?))
}

pub async fn list_patients(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<ListPatients>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(client.get("/list-patients", &args).await?))
}

pub async fn patient_incomplete_treatments(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<PatientRef>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(
        client.get("/patient-incomplete-treatments", &args).await?,
    ))
}

pub async fn orto_patients(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<ClinicRef>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(client.get("/orto-patients", &args).await?))
}

pub async fn onboarding_event(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<OnboardingEvent>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(
        client.post("/onboarding-event", &args).await?,
    ))
}

pub fn routes() -> Vec<EcuroRoute> {
    vec![
        ToolRoute::new(
            tool::<PatientByPhone>(
                "ecuro_get_patient_by_phone",
                "Find Patient by Phone",
                "Look up a registered patient by phone number. Useful to check \
whether the patient already exists before booking.",
                ToolAnnotations::read_only(),
            ),
            get_patient_by_phone,
        ),
        ToolRoute::new(
            tool::<PatientByCpf>(
                "ecuro_get_patient_by_cpf",
                "Find Patient by CPF",
                "Look up a registered patient by CPF (Brazilian taxpayer ID).",
                ToolAnnotations::read_only(),
            ),
            get_patient_by_cpf,
        ),
        ToolRoute::new(
            tool::<PatientRef>(
                "ecuro_patient_details",
                "Patient Details",
                "Full record of one patient: contact data, clinic and history.",
                ToolAnnotations::read_only(),
            ),
            patient_details,
        ),
        ToolRoute::new(
            tool::<ListPatients>(
                "ecuro_list_patients",
                "List Patients",
                "Paginated list of a clinic's patients, optionally filtered by a \
search term.",
                ToolAnnotations::read_only(),
            ),
            list_patients,
        ),
        ToolRoute::new(
            tool::<PatientRef>(
                "ecuro_patient_incomplete_treatments",
                "Incomplete Treatments",
                "Treatments approved for a patient that still have procedures left \
to perform.",
                ToolAnnotations::read_only(),
            ),
            patient_incomplete_treatments,
        ),
        ToolRoute::new(
            tool::<ClinicRef>(
                "ecuro_orto_patients",
                "Orthodontic Patients",
                "Patients of a clinic currently in orthodontic treatment.",
                ToolAnnotations::read_only(),
            ),
            orto_patients,
        ),
        ToolRoute::new(
            tool::<OnboardingEvent>(
                "ecuro_onboarding_event",
                "Record Onboarding Event",
                "Record a step of a patient's onboarding journey.",
                ToolAnnotations::writes(false),
            ),
            onboarding_event,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpf_accepts_punctuation() {
        for cpf in ["123.456.789-09", "12345678909"] {
            let mut violations = Violations::default();
            PatientByCpf { cpf: cpf.into() }.validate(&mut violations);
            assert!(violations.is_empty(), "{cpf} should be valid");
        }
        assert_eq!(cpf_digits(" 123.456.789-09 "), "12345678909");
    }

    #[test]
    fn test_cpf_rejects_wrong_length_or_letters() {
        for cpf in ["1234567890", "1234567890a", "123.456.789-0900", "123-456-789.09"] {
            let mut violations = Violations::default();
            PatientByCpf { cpf: cpf.into() }.validate(&mut violations);
            assert!(!violations.is_empty(), "{cpf} should be rejected");
        }
    }
}

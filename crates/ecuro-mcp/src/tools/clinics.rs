use std::sync::Arc;

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ClinicRef, EcuroRoute, NoArguments, tool};
use crate::{
    handler::server::{
        tool::{Parameters, ToolOutcome, ToolOutput, ToolRoute},
        validation::{DATE_PATTERN, Validate, Violations, is_date},
    },
    model::ToolAnnotations,
    upstream::UpstreamClient,
};

/// Longest window the report endpoint accepts.
pub const MAX_REPORT_DAYS: i64 = 31;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListClinics {
    /// Return only this clinic (UUID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: Option<String>,
}

impl Validate for ListClinics {
    fn validate(&self, violations: &mut Violations) {
        violations.opt_uuid("clinicId", self.clinic_id.as_deref());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApiReport {
    /// Restrict to one clinic (UUID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: Option<String>,
    /// First day, yyyy-MM-dd (default: 31 days ago)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub start_date: Option<String>,
    /// Last day, yyyy-MM-dd (default: today)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub end_date: Option<String>,
    /// Include appointments not created through the API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_api_exclusive: Option<bool>,
}

impl Validate for ApiReport {
    fn validate(&self, violations: &mut Violations) {
        violations
            .opt_uuid("clinicId", self.clinic_id.as_deref())
            .opt_date("startDate", self.start_date.as_deref())
            .opt_date("endDate", self.end_date.as_deref());
        let (Some(start), Some(end)) = (self.start_date.as_deref(), self.end_date.as_deref())
        else {
            return;
        };
        if !is_date(start) || !is_date(end) {
            return;
        }
        let (Ok(start), Ok(end)) = (
            NaiveDate::parse_from_str(start, "%Y-%m-%d"),
            NaiveDate::parse_from_str(end, "%Y-%m-%d"),
        ) else {
            return;
        };
        let days = (end - start).num_days();
        if days < 0 {
            violations.push("endDate", "must not be before startDate");
        } else if days > MAX_REPORT_DAYS {
            violations.push(
                "endDate",
                format!("must be at most {MAX_REPORT_DAYS} days after startDate"),
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DueSoon {
    Today,
    Week,
    Month,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListBoletos {
    /// Clinic ID (UUID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: Option<String>,
    /// Patient ID (UUID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("format" = "uuid"))]
    pub patient_id: Option<String>,
    /// Dentist ID (UUID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("format" = "uuid"))]
    pub dentist_id: Option<String>,
    /// Boleto status (CREATED, REGISTERED, SETTLEMENT, CANCELLED, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Due within this horizon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_soon: Option<DueSoon>,
    /// Only boletos past their due date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overdue: Option<bool>,
    /// Minimum amount in BRL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0.0))]
    pub min_value: Option<f64>,
    /// Maximum amount in BRL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0.0))]
    pub max_value: Option<f64>,
    /// Page number, starting at 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub page: Option<u32>,
    /// Boletos per page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub page_size: Option<u32>,
}

impl Validate for ListBoletos {
    fn validate(&self, violations: &mut Violations) {
        violations
            .opt_uuid("clinicId", self.clinic_id.as_deref())
            .opt_uuid("patientId", self.patient_id.as_deref())
            .opt_uuid("dentistId", self.dentist_id.as_deref())
            .check(
                self.min_value.is_none_or(|v| v >= 0.0),
                "minValue",
                "must not be negative",
            )
            .check(
                self.max_value.is_none_or(|v| v >= 0.0),
                "maxValue",
                "must not be negative",
            )
            .check(self.page != Some(0), "page", "must be at least 1")
            .check(self.page_size != Some(0), "pageSize", "must be at least 1");
        if let (Some(min), Some(max)) = (self.min_value, self.max_value) {
            violations.check(min <= max, "maxValue", "must not be below minValue");
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExportAppointments {
    /// Clinic ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: String,
    /// First day, yyyy-MM-dd
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub start_date: String,
    /// Last day, yyyy-MM-dd
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub end_date: String,
}

impl Validate for ExportAppointments {
    fn validate(&self, violations: &mut Violations) {
        violations
            .uuid("clinicId", &self.clinic_id)
            .date("startDate", &self.start_date)
            .date("endDate", &self.end_date);
    }
}

pub async fn list_clinics(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<ListClinics>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(client.get("/list-clinics", &args).await?))
}

pub async fn list_specialties(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<NoArguments>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(
        client.get("/list-specialties", &args).await?,
    ))
}

pub async fn active_dentists(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<ClinicRef>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(client.post("/active-dentists", &args).await?))
}

pub async fn api_report(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<ApiReport>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(client.get("/apireport", &args).await?))
}

pub async fn list_boletos(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<ListBoletos>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(client.post("/list-boletos", &args).await?))
}

pub async fn export_appointments_csv(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<ExportAppointments>,
) -> ToolOutcome {
    Ok(ToolOutput::Text(client.get_text("/csv", &args).await?))
}

pub async fn clinic_logo(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<ClinicRef>,
) -> ToolOutcome {
    let path = format!("/logo/{}", args.clinic_id);
    Ok(ToolOutput::Text(client.get_binary_as_data_uri(&path).await?))
}

pub fn routes() -> Vec<EcuroRoute> {
    vec![
        ToolRoute::new(
            tool::<ListClinics>(
                "ecuro_list_clinics",
                "List Clinics",
                "Registered clinics with name, ID, address and public code. Pass \
clinicId to fetch a single clinic.",
                ToolAnnotations::read_only(),
            ),
            list_clinics,
        ),
        ToolRoute::new(
            tool::<NoArguments>(
                "ecuro_list_specialties",
                "List Specialties",
                "Every dental specialty known to the system with its ID and name.",
                ToolAnnotations::read_only(),
            ),
            list_specialties,
        ),
        ToolRoute::new(
            tool::<ClinicRef>(
                "ecuro_active_dentists",
                "Active Dentists",
                "Dentists currently working at a clinic, with their specialties.",
                ToolAnnotations::read_only(),
            ),
            active_dentists,
        ),
        ToolRoute::new(
            tool::<ApiReport>(
                "ecuro_api_report",
                "Appointments Report",
                "Detailed appointment report with patient, financial balance and \
appointment data. Defaults to the last 31 days and API-created appointments \
only; set nonApiExclusive to include all. The window may not exceed 31 days.",
                ToolAnnotations::read_only(),
            ),
            api_report,
        ),
        ToolRoute::new(
            tool::<ListBoletos>(
                "ecuro_list_boletos",
                "List Boletos",
                "Paginated boletos (bank slips) with amount, due date, status, \
patient name and PDF links. Filter by patient, dentist, status, due horizon, \
overdue flag or amount range.",
                ToolAnnotations::read_only(),
            ),
            list_boletos,
        ),
        ToolRoute::new(
            tool::<ExportAppointments>(
                "ecuro_export_appointments_csv",
                "Export Appointments (CSV)",
                "Appointments of a clinic within a date range as raw CSV text.",
                ToolAnnotations::read_only(),
            ),
            export_appointments_csv,
        ),
        ToolRoute::new(
            tool::<ClinicRef>(
                "ecuro_clinic_logo",
                "Clinic Logo",
                "The clinic's logo as a data URI (data:<mime>;base64,...).",
                ToolAnnotations::read_only(),
            ),
            clinic_logo,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn report(start: &str, end: &str) -> Vec<String> {
        let args = ApiReport {
            clinic_id: None,
            start_date: Some(start.into()),
            end_date: Some(end.into()),
            non_api_exclusive: None,
        };
        let mut violations = Violations::default();
        args.validate(&mut violations);
        violations
            .into_result()
            .err()
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.message.into_owned())
            .collect()
    }

    #[test]
    fn test_report_window() {
        assert!(report("2025-06-01", "2025-07-02").is_empty());
        assert_eq!(
            report("2025-06-01", "2025-07-03"),
            ["must be at most 31 days after startDate"]
        );
        assert_eq!(
            report("2025-06-10", "2025-06-01"),
            ["must not be before startDate"]
        );
    }

    #[test]
    fn test_due_soon_accepts_only_known_horizons() {
        let args: ListBoletos = serde_json::from_value(json!({ "dueSoon": "week" })).unwrap();
        assert_eq!(args.due_soon, Some(DueSoon::Week));
        assert!(serde_json::from_value::<ListBoletos>(json!({ "dueSoon": "year" })).is_err());
    }

    #[test]
    fn test_boleto_amount_range() {
        let args = ListBoletos {
            min_value: Some(100.0),
            max_value: Some(50.0),
            ..Default::default()
        };
        let mut violations = Violations::default();
        args.validate(&mut violations);
        assert!(!violations.is_empty());
    }
}

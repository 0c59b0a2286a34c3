use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{EcuroRoute, tool};
use crate::{
    handler::server::{
        tool::{Parameters, ToolOutcome, ToolOutput, ToolRoute},
        validation::{DATE_PATTERN, DATE_TIME_PATTERN, Validate, Violations},
    },
    model::ToolAnnotations,
    upstream::UpstreamClient,
};

fn default_duration() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchAvailability {
    /// Clinic ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: String,
    /// Start of the search window, ISO 8601 (e.g. 2025-06-15T10:00:00)
    #[schemars(extend("pattern" = DATE_TIME_PATTERN))]
    pub start_date: String,
    /// End of the search window, ISO 8601 (e.g. 2025-06-22T18:00:00)
    #[schemars(extend("pattern" = DATE_TIME_PATTERN))]
    pub end_date: String,
    /// Appointment length in minutes
    #[serde(default = "default_duration")]
    #[schemars(range(min = 1))]
    pub duration: u32,
}

impl Validate for SearchAvailability {
    fn validate(&self, violations: &mut Violations) {
        violations
            .uuid("clinicId", &self.clinic_id)
            .date_time("startDate", &self.start_date)
            .date_time("endDate", &self.end_date)
            .check(self.duration > 0, "duration", "must be a positive number of minutes");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpecialtyAvailability {
    /// Clinic ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: String,
    /// Specialty ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub specialty_id: String,
    /// Dentist ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub doctor_id: String,
    /// Account for the specialty's procedure length
    #[serde(default = "default_true")]
    pub duration_aware: bool,
}

impl Validate for SpecialtyAvailability {
    fn validate(&self, violations: &mut Violations) {
        violations
            .uuid("clinicId", &self.clinic_id)
            .uuid("specialtyId", &self.specialty_id)
            .uuid("doctorId", &self.doctor_id);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DentistAvailability {
    /// Dentist ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub dentist_id: String,
    /// Day to inspect, yyyy-MM-dd
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub date: String,
}

impl Validate for DentistAvailability {
    fn validate(&self, violations: &mut Violations) {
        violations
            .uuid("dentistId", &self.dentist_id)
            .date("date", &self.date);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClinicBlockers {
    /// Clinic ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: String,
    /// First day, yyyy-MM-dd
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub start_date: Option<String>,
    /// Last day, yyyy-MM-dd
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub end_date: Option<String>,
}

impl Validate for ClinicBlockers {
    fn validate(&self, violations: &mut Violations) {
        violations
            .uuid("clinicId", &self.clinic_id)
            .opt_date("startDate", self.start_date.as_deref())
            .opt_date("endDate", self.end_date.as_deref());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AvailableDates {
    /// Clinic ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: String,
    /// Only dates on which this dentist is free (UUID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("format" = "uuid"))]
    pub doctor_id: Option<String>,
    /// Only dates offering this specialty (UUID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("format" = "uuid"))]
    pub specialty_id: Option<String>,
}

impl Validate for AvailableDates {
    fn validate(&self, violations: &mut Violations) {
        violations
            .uuid("clinicId", &self.clinic_id)
            .opt_uuid("doctorId", self.doctor_id.as_deref())
            .opt_uuid("specialtyId", self.specialty_id.as_deref());
    }
}

pub async fn search_availability(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<SearchAvailability>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(
        client.get("/specialty-availability", &args).await?,
    ))
}

pub async fn specialty_availability(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<SpecialtyAvailability>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(
        client.get("/specialty-availability", &args).await?,
    ))
}

pub async fn dentist_availability(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<DentistAvailability>,
) -> ToolOutcome {
    // the upstream path is misspelled
    Ok(ToolOutput::Json(
        client.post("/dentist-availabilty", &args).await?,
    ))
}

pub async fn clinic_blockers(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<ClinicBlockers>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(
        client.get("/blockers-for-a-clinic", &args).await?,
    ))
}

pub async fn available_dates(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<AvailableDates>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(client.get("/dates", &args).await?))
}

pub fn routes() -> Vec<EcuroRoute> {
    vec![
        ToolRoute::new(
            tool::<SearchAvailability>(
                "ecuro_search_availability",
                "Search Schedule Availability",
                "Free slots in a clinic's schedule within a time window. Use it to \
suggest times to the patient before booking.",
                ToolAnnotations::read_only(),
            ),
            search_availability,
        ),
        ToolRoute::new(
            tool::<SpecialtyAvailability>(
                "ecuro_specialty_availability",
                "Search Availability by Specialty",
                "Free slots for one specialty and dentist, taking the procedure \
length into account unless durationAware is false.",
                ToolAnnotations::read_only(),
            ),
            specialty_availability,
        ),
        ToolRoute::new(
            tool::<DentistAvailability>(
                "ecuro_dentist_availability",
                "Dentist Availability",
                "Booked slots of a dentist on one day with start/end time, patient \
name and status. Slots not listed are free.",
                ToolAnnotations::read_only(),
            ),
            dentist_availability,
        ),
        ToolRoute::new(
            tool::<ClinicBlockers>(
                "ecuro_clinic_blockers",
                "Clinic Schedule Blockers",
                "Periods blocked in a clinic's schedule (holidays, absences, \
maintenance).",
                ToolAnnotations::read_only(),
            ),
            clinic_blockers,
        ),
        ToolRoute::new(
            tool::<AvailableDates>(
                "ecuro_available_dates",
                "Available Dates",
                "Dates with at least one free slot at a clinic, optionally for one \
dentist or specialty.",
                ToolAnnotations::read_only(),
            ),
            available_dates,
        ),
    ]
}

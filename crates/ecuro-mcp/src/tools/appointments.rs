use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EcuroRoute, tool};
use crate::{
    handler::server::{
        tool::{Parameters, ToolOutcome, ToolOutput, ToolRoute},
        validation::{DATE_PATTERN, TIME_PATTERN, Validate, Violations},
    },
    model::ToolAnnotations,
    upstream::UpstreamClient,
};

const CREATE_METHOD: &str = "create_appointment";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateAppointment {
    /// Patient full name
    #[schemars(length(min = 2))]
    pub full_name: String,
    /// Patient contact phone (e.g. 31999999999)
    #[schemars(length(min = 8))]
    pub phone_number: String,
    /// Clinic ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: String,
    /// Appointment date, yyyy-MM-dd
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub date: String,
    /// Appointment time, HH:MM:SS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("pattern" = TIME_PATTERN))]
    pub time: Option<String>,
    /// Patient date of birth, yyyy-MM-dd
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub date_of_birth: Option<String>,
}

impl Validate for CreateAppointment {
    fn validate(&self, violations: &mut Violations) {
        violations
            .min_len("fullName", &self.full_name, 2)
            .min_len("phoneNumber", &self.phone_number, 8)
            .uuid("clinicId", &self.clinic_id)
            .date("date", &self.date)
            .opt_time("time", self.time.as_deref())
            .opt_date("dateOfBirth", self.date_of_birth.as_deref());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateAppointmentForDoctor {
    /// Patient full name
    #[schemars(length(min = 2))]
    pub full_name: String,
    /// Patient contact phone (e.g. 31999999999)
    #[schemars(length(min = 8))]
    pub phone_number: String,
    /// Clinic ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: String,
    /// Appointment date, yyyy-MM-dd
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub date: String,
    /// Appointment time, HH:MM:SS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("pattern" = TIME_PATTERN))]
    pub time: Option<String>,
    /// Patient date of birth, yyyy-MM-dd
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub date_of_birth: Option<String>,
    /// Dentist ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub doctor_id: String,
}

impl Validate for CreateAppointmentForDoctor {
    fn validate(&self, violations: &mut Violations) {
        violations
            .min_len("fullName", &self.full_name, 2)
            .min_len("phoneNumber", &self.phone_number, 8)
            .uuid("clinicId", &self.clinic_id)
            .date("date", &self.date)
            .opt_time("time", self.time.as_deref())
            .opt_date("dateOfBirth", self.date_of_birth.as_deref())
            .uuid("doctorId", &self.doctor_id);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateAppointmentByPhone {
    /// Phone of an already registered patient
    #[schemars(length(min = 8))]
    pub phone: String,
    /// Clinic ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: String,
    /// Appointment date, yyyy-MM-dd
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub date: String,
    /// Appointment time, HH:MM:SS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("pattern" = TIME_PATTERN))]
    pub time: Option<String>,
    /// Dentist ID (UUID); omit to let the clinic assign one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("format" = "uuid"))]
    pub doctor_id: Option<String>,
}

impl Validate for CreateAppointmentByPhone {
    fn validate(&self, violations: &mut Violations) {
        violations
            .min_len("phone", &self.phone, 8)
            .uuid("clinicId", &self.clinic_id)
            .date("date", &self.date)
            .opt_time("time", self.time.as_deref())
            .opt_uuid("doctorId", self.doctor_id.as_deref());
    }
}

/// Body of the generic create call on `/`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AppointmentPayload<'a> {
    method: &'static str,
    full_name: &'a str,
    phone_number: &'a str,
    clinic_id: &'a str,
    date: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_of_birth: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    doctor_id: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateAppointment {
    /// Appointment ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub appointment_id: String,
    /// New date, yyyy-MM-dd
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub date: Option<String>,
    /// New time, HH:MM:SS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("pattern" = TIME_PATTERN))]
    pub time: Option<String>,
    /// Reassign to this dentist (UUID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("format" = "uuid"))]
    pub doctor_id: Option<String>,
    /// New status (e.g. CONFIRMED, CANCELLED)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(length(min = 1))]
    pub status: Option<String>,
    /// Free-text notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Validate for UpdateAppointment {
    fn validate(&self, violations: &mut Violations) {
        violations
            .uuid("appointmentId", &self.appointment_id)
            .opt_date("date", self.date.as_deref())
            .opt_time("time", self.time.as_deref())
            .opt_uuid("doctorId", self.doctor_id.as_deref());
        if let Some(status) = &self.status {
            violations.min_len("status", status, 1);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatientAppointments {
    /// Patient ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub patient_id: String,
}

impl Validate for PatientAppointments {
    fn validate(&self, violations: &mut Violations) {
        violations.uuid("patientId", &self.patient_id);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DoctorAppointments {
    /// Dentist ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub doctor_id: String,
    /// Restrict to one clinic (UUID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("format" = "uuid"))]
    pub clinic_id: Option<String>,
    /// First day, yyyy-MM-dd
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub start_date: Option<String>,
    /// Last day, yyyy-MM-dd
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(extend("pattern" = DATE_PATTERN))]
    pub end_date: Option<String>,
}

impl Validate for DoctorAppointments {
    fn validate(&self, violations: &mut Violations) {
        violations
            .uuid("doctorId", &self.doctor_id)
            .opt_uuid("clinicId", self.clinic_id.as_deref())
            .opt_date("startDate", self.start_date.as_deref())
            .opt_date("endDate", self.end_date.as_deref());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GetAppointment {
    /// Appointment ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub appointment_id: String,
}

impl Validate for GetAppointment {
    fn validate(&self, violations: &mut Violations) {
        violations.uuid("appointmentId", &self.appointment_id);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListReturns {
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

impl Validate for ListReturns {
    fn validate(&self, violations: &mut Violations) {
        violations
            .uuid("clinicId", &self.clinic_id)
            .opt_date("startDate", self.start_date.as_deref())
            .opt_date("endDate", self.end_date.as_deref());
    }
}

/// Pull the name and birth date out of a phone lookup result.
///
/// The lookup may answer with the patient object itself, a list of patients,
/// or either of those wrapped in `data`/`patient`.
fn found_patient(value: &Value) -> Option<(String, Option<String>)> {
    let patient = match value {
        Value::Array(items) => return items.iter().find_map(found_patient),
        Value::Object(map) => {
            for key in ["data", "patient"] {
                if let Some(inner) = map.get(key).filter(|inner| !inner.is_null()) {
                    return found_patient(inner);
                }
            }
            map
        }
        _ => return None,
    };
    let text = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| patient.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };
    let name = text(&["fullName", "name", "full_name"])?;
    let birth = text(&["dateOfBirth", "birthDate", "date_of_birth", "birthdate"])
        .map(|birth| birth.chars().take(10).collect::<String>());
    Some((name, birth))
}

pub async fn create_appointment(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<CreateAppointment>,
) -> ToolOutcome {
    let payload = AppointmentPayload {
        method: CREATE_METHOD,
        full_name: &args.full_name,
        phone_number: &args.phone_number,
        clinic_id: &args.clinic_id,
        date: &args.date,
        time: args.time.as_deref(),
        date_of_birth: args.date_of_birth.as_deref(),
        doctor_id: None,
    };
    Ok(ToolOutput::Json(client.post("/", &payload).await?))
}

pub async fn create_appointment_for_doctor(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<CreateAppointmentForDoctor>,
) -> ToolOutcome {
    let payload = AppointmentPayload {
        method: CREATE_METHOD,
        full_name: &args.full_name,
        phone_number: &args.phone_number,
        clinic_id: &args.clinic_id,
        date: &args.date,
        time: args.time.as_deref(),
        date_of_birth: args.date_of_birth.as_deref(),
        doctor_id: Some(&args.doctor_id),
    };
    Ok(ToolOutput::Json(client.post("/", &payload).await?))
}

pub async fn create_appointment_by_phone(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<CreateAppointmentByPhone>,
) -> ToolOutcome {
    let lookup = client
        .post("/get-patient-by-phone", &serde_json::json!({ "phone": args.phone }))
        .await?;
    let Some((full_name, date_of_birth)) = found_patient(&lookup) else {
        return Ok(ToolOutput::Text(format!(
            "No patient registered with phone {}. Use ecuro_create_appointment with the patient's full name instead.",
            args.phone
        )));
    };
    let payload = AppointmentPayload {
        method: CREATE_METHOD,
        full_name: &full_name,
        phone_number: &args.phone,
        clinic_id: &args.clinic_id,
        date: &args.date,
        time: args.time.as_deref(),
        date_of_birth: date_of_birth.as_deref(),
        doctor_id: args.doctor_id.as_deref(),
    };
    Ok(ToolOutput::Json(client.post("/", &payload).await?))
}

pub async fn update_appointment(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<UpdateAppointment>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(
        client.put("/update-appointment", Some(&args)).await?,
    ))
}

pub async fn list_patient_appointments(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<PatientAppointments>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(
        client.get("/list-appointments-of-patient", &args).await?,
    ))
}

pub async fn list_doctor_appointments(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<DoctorAppointments>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(
        client.get("/list-appointments-of-doctor", &args).await?,
    ))
}

pub async fn get_appointment(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<GetAppointment>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(
        client.get("/appointments/appid", &args).await?,
    ))
}

pub async fn list_returns(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<ListReturns>,
) -> ToolOutcome {
    Ok(ToolOutput::Json(client.get("/list-returns", &args).await?))
}

pub fn routes() -> Vec<EcuroRoute> {
    vec![
        ToolRoute::new(
            tool::<CreateAppointment>(
                "ecuro_create_appointment",
                "Create Appointment",
                "Book an assessment appointment at a clinic. The clinic assigns an \
available dentist. Returns the created appointment with its ID and status.",
                ToolAnnotations::writes(false),
            ),
            create_appointment,
        ),
        ToolRoute::new(
            tool::<CreateAppointmentForDoctor>(
                "ecuro_create_appointment_for_doctor",
                "Create Appointment with a Specific Dentist",
                "Book an appointment with the given dentist. Same fields as \
ecuro_create_appointment plus doctorId.",
                ToolAnnotations::writes(false),
            ),
            create_appointment_for_doctor,
        ),
        ToolRoute::new(
            tool::<CreateAppointmentByPhone>(
                "ecuro_create_appointment_by_phone",
                "Create Appointment by Patient Phone",
                "Find a registered patient by phone and book an appointment using \
their stored name and birth date. Answers with a plain message when no patient \
matches the phone.",
                ToolAnnotations::writes(false),
            ),
            create_appointment_by_phone,
        ),
        ToolRoute::new(
            tool::<UpdateAppointment>(
                "ecuro_update_appointment",
                "Update Appointment",
                "Reschedule, reassign, change the status of or annotate an existing \
appointment. Only the given fields change.",
                ToolAnnotations::writes(true),
            ),
            update_appointment,
        ),
        ToolRoute::new(
            tool::<PatientAppointments>(
                "ecuro_list_patient_appointments",
                "List Patient Appointments",
                "List every appointment of a patient.",
                ToolAnnotations::read_only(),
            ),
            list_patient_appointments,
        ),
        ToolRoute::new(
            tool::<DoctorAppointments>(
                "ecuro_list_doctor_appointments",
                "List Dentist Appointments",
                "List the appointments of a dentist, optionally restricted to one \
clinic and a date range.",
                ToolAnnotations::read_only(),
            ),
            list_doctor_appointments,
        ),
        ToolRoute::new(
            tool::<GetAppointment>(
                "ecuro_get_appointment",
                "Get Appointment",
                "Fetch one appointment by its ID.",
                ToolAnnotations::read_only(),
            ),
            get_appointment,
        ),
        ToolRoute::new(
            tool::<ListReturns>(
                "ecuro_list_returns",
                "List Return Visits",
                "List the return visits scheduled at a clinic, optionally within a \
date range.",
                ToolAnnotations::read_only(),
            ),
            list_returns,
        ),
    ]
}

//! Field-level checks applied after an argument object has been deserialized.
//!
//! Shape errors (missing fields, wrong JSON types, unknown fields) are caught
//! by serde; the checks here cover string formats that serde cannot express:
//! UUIDs, calendar dates, wall-clock times and minimum lengths.
use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

// Patterns published in the input schemas. They describe the same shapes the
// checks below enforce.
pub const DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";
pub const TIME_PATTERN: &str = r"^\d{2}:\d{2}:\d{2}$";
pub const DATE_TIME_PATTERN: &str =
    r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:\d{2})?)?$";
pub const CPF_PATTERN: &str = r"^\d{3}\.?\d{3}\.?\d{3}-?\d{2}$";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: Cow<'static, str>,
    pub message: Cow<'static, str>,
}

#[derive(Debug, Default)]
pub struct Violations(Vec<FieldViolation>);

/// Implemented by every tool argument type.
pub trait Validate {
    fn validate(&self, _violations: &mut Violations) {}
}

/// `9` stands for any ASCII digit, every other byte must match exactly.
fn matches_shape(value: &str, shape: &str) -> bool {
    value.len() == shape.len()
        && value
            .bytes()
            .zip(shape.bytes())
            .all(|(c, s)| if s == b'9' { c.is_ascii_digit() } else { c == s })
}

/// Hyphenated form only, as in `format: uuid`.
pub fn is_uuid(value: &str) -> bool {
    value.len() == 36 && uuid::Uuid::try_parse(value).is_ok()
}

pub fn is_date(value: &str) -> bool {
    matches_shape(value, "9999-99-99") && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

pub fn is_time(value: &str) -> bool {
    matches_shape(value, "99:99:99") && NaiveTime::parse_from_str(value, "%H:%M:%S").is_ok()
}

pub fn is_date_time(value: &str) -> bool {
    if value.len() > 10 && value.as_bytes()[10] != b'T' {
        return false;
    }
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").is_ok()
        || is_date(value)
}

/// Eleven digits, optionally punctuated as `000.000.000-00`.
pub fn is_cpf(value: &str) -> bool {
    let mut rest = value.as_bytes();
    for (digits, separator) in [(3, Some(b'.')), (3, Some(b'.')), (3, Some(b'-')), (2, None)] {
        if rest.len() < digits || !rest[..digits].iter().all(u8::is_ascii_digit) {
            return false;
        }
        rest = &rest[digits..];
        if let (Some(separator), Some(&next)) = (separator, rest.first()) {
            if next == separator {
                rest = &rest[1..];
            }
        }
    }
    rest.is_empty()
}

impl Violations {
    pub fn push(
        &mut self,
        field: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> &mut Self {
        self.0.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
        self
    }

    pub fn check(&mut self, ok: bool, field: &'static str, message: &'static str) -> &mut Self {
        if !ok {
            self.push(field, message);
        }
        self
    }

    pub fn uuid(&mut self, field: &'static str, value: &str) -> &mut Self {
        self.check(is_uuid(value), field, "must be a valid UUID")
    }

    pub fn opt_uuid(&mut self, field: &'static str, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => self.uuid(field, value),
            None => self,
        }
    }

    pub fn date(&mut self, field: &'static str, value: &str) -> &mut Self {
        self.check(is_date(value), field, "must be a date in the format yyyy-MM-dd")
    }

    pub fn opt_date(&mut self, field: &'static str, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => self.date(field, value),
            None => self,
        }
    }

    pub fn time(&mut self, field: &'static str, value: &str) -> &mut Self {
        self.check(is_time(value), field, "must be a time in the format HH:MM:SS")
    }

    pub fn opt_time(&mut self, field: &'static str, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => self.time(field, value),
            None => self,
        }
    }

    pub fn date_time(&mut self, field: &'static str, value: &str) -> &mut Self {
        self.check(
            is_date_time(value),
            field,
            "must be an ISO 8601 date-time (e.g. 2025-06-15T10:00:00)",
        )
    }

    pub fn min_len(&mut self, field: &'static str, value: &str, min: usize) -> &mut Self {
        if value.chars().count() < min {
            self.push(field, format!("must contain at least {min} characters"));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), Vec<FieldViolation>> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_shape_and_calendar() {
        assert!(is_date("2025-06-15"));
        assert!(!is_date("2025-6-15"));
        assert!(!is_date("15/06/2025"));
        assert!(!is_date("2025-02-30"));
    }

    #[test]
    fn test_time_shape() {
        assert!(is_time("09:30:00"));
        assert!(!is_time("9:30"));
        assert!(!is_time("25:00:00"));
    }

    #[test]
    fn test_date_time_accepts_common_iso_forms() {
        assert!(is_date_time("2025-06-15T10:00:00"));
        assert!(is_date_time("2025-06-15T10:00:00-03:00"));
        assert!(is_date_time("2025-06-15"));
        assert!(!is_date_time("next monday"));
    }

    #[test]
    fn test_violations_collect_every_field() {
        let mut violations = Violations::default();
        violations
            .uuid("clinicId", "not-a-uuid")
            .date("date", "2025-06-15")
            .min_len("fullName", "A", 2)
            .opt_uuid("doctorId", None);
        let errors = violations.into_result().expect_err("two violations");
        let fields: Vec<_> = errors.iter().map(|v| v.field.as_ref()).collect();
        assert_eq!(fields, ["clinicId", "fullName"]);
    }

    #[test]
    fn test_uuid_must_be_hyphenated() {
        assert!(is_uuid("0b6a9f4e-3c1d-4f2a-9e8b-7d6c5b4a3f21"));
        assert!(!is_uuid("0b6a9f4e3c1d4f2a9e8b7d6c5b4a3f21"));
        assert!(!is_uuid("{0b6a9f4e-3c1d-4f2a-9e8b-7d6c5b4a3f21}"));
    }

    #[test]
    fn test_date_time_needs_t_separator() {
        assert!(!is_date_time("2025-06-15 10:00:00"));
    }

    #[test]
    fn test_cpf_shapes() {
        assert!(is_cpf("12345678909"));
        assert!(is_cpf("123.456.789-09"));
        assert!(is_cpf("123456789-09"));
        assert!(!is_cpf("123.456.789-0"));
        assert!(!is_cpf("123-456-789.09"));
        assert!(!is_cpf("123.456.789-091"));
    }

    #[test]
    fn test_min_len_counts_untrimmed_characters() {
        let mut violations = Violations::default();
        violations.min_len("fullName", "  A ", 2).min_len("phone", "1234", 8);
        let errors = violations.into_result().expect_err("one violation");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "phone");
    }
}

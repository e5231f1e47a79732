use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

pub const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_TASK_TITLE_LENGTH: usize = 255;
const TASK_PRIORITIES: &[&str] = &["low", "medium", "high", "urgent"];

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Matches the raw input; callers that accept padded addresses trim first.
pub fn validate_email(email: &str) -> ValidationResult {
    let mut errors = Vec::new();
    if email.trim().is_empty() {
        errors.push("Email is required".to_string());
    } else if !EMAIL_RE.is_match(email) {
        errors.push("Please enter a valid email address".to_string());
    }
    ValidationResult::from_errors(errors)
}

pub fn validate_password(password: &str) -> ValidationResult {
    validate_password_with_min(password, MIN_PASSWORD_LENGTH)
}

/// Length is counted in UTF-16 code units, the way browser clients count it,
/// so an astral emoji counts as two.
pub fn validate_password_with_min(password: &str, min_length: usize) -> ValidationResult {
    let mut errors = Vec::new();
    if password.is_empty() {
        errors.push("Password is required".to_string());
    } else if password.encode_utf16().count() < min_length {
        errors.push(format!(
            "Password must be at least {min_length} characters long"
        ));
    }
    ValidationResult::from_errors(errors)
}

pub fn validate_name(name: &str) -> ValidationResult {
    let len = name.trim().chars().count();
    let mut errors = Vec::new();
    if len == 0 {
        errors.push("Name is required".to_string());
    } else if len < 2 {
        errors.push("Name must be at least 2 characters long".to_string());
    } else if len > 100 {
        errors.push("Name must be less than 100 characters".to_string());
    }
    ValidationResult::from_errors(errors)
}

pub fn validate_company_name(company: &str) -> ValidationResult {
    let len = company.trim().chars().count();
    let mut errors = Vec::new();
    if len == 0 {
        errors.push("Company name is required".to_string());
    } else if len > 100 {
        errors.push("Company name must be less than 100 characters".to_string());
    }
    ValidationResult::from_errors(errors)
}

pub fn validate_task(title: &str, priority: Option<&str>) -> ValidationResult {
    let len = title.trim().chars().count();
    let mut errors = Vec::new();
    if len == 0 {
        errors.push("Task title is required".to_string());
    } else if len > MAX_TASK_TITLE_LENGTH {
        errors.push(format!(
            "Task title must be less than {MAX_TASK_TITLE_LENGTH} characters"
        ));
    }
    if let Some(p) = priority {
        if !TASK_PRIORITIES.contains(&p.trim().to_ascii_lowercase().as_str()) {
            errors.push(format!("Priority must be one of: {}", TASK_PRIORITIES.join(", ")));
        }
    }
    ValidationResult::from_errors(errors)
}

pub fn validate_rfi(subject: &str, question: &str) -> ValidationResult {
    let mut errors = Vec::new();
    if subject.trim().is_empty() {
        errors.push("RFI subject is required".to_string());
    }
    if question.trim().is_empty() {
        errors.push("RFI question is required".to_string());
    }
    ValidationResult::from_errors(errors)
}

pub fn combine_validations(results: impl IntoIterator<Item = ValidationResult>) -> ValidationResult {
    let errors = results.into_iter().flat_map(|r| r.errors).collect();
    ValidationResult::from_errors(errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_follows_pattern() {
        for ok in ["pm@site.co", "a.b+c@d.e.f"] {
            assert!(validate_email(ok).is_valid, "{ok}");
        }
        for bad in ["", "no-at.com", "a@b", "a @b.com", "a@@b.com"] {
            assert!(!validate_email(bad).is_valid, "{bad}");
        }
    }

    #[test]
    fn email_is_not_trimmed_before_matching() {
        for padded in [" pm@site.co", "pm@site.co\n", "\tpm@site.co", "pm@site.co "] {
            let result = validate_email(padded);
            assert!(!result.is_valid, "{padded:?}");
            assert_eq!(result.errors, vec!["Please enter a valid email address"]);
        }
        assert_eq!(validate_email("   ").errors, vec!["Email is required"]);
    }

    #[test]
    fn email_validity_tracks_the_pattern() {
        for input in [
            "pm@site.co",
            " pm@site.co",
            "pm@site.co\n",
            "x@y.z",
            "a@b",
            "foreman@north wind.io",
            "ops@site.co.uk",
        ] {
            assert_eq!(
                validate_email(input).is_valid,
                EMAIL_RE.is_match(input),
                "{input:?}"
            );
        }
    }

    #[test]
    fn password_needs_six_chars() {
        assert!(!validate_password("12345").is_valid);
        assert!(validate_password("123456").is_valid);
        assert_eq!(validate_password("").errors, vec!["Password is required"]);
        assert!(!validate_password_with_min("123456", 8).is_valid);
    }

    #[test]
    fn password_length_counts_utf16_units() {
        // Three astral emoji are six UTF-16 units.
        assert!(validate_password("\u{1F600}\u{1F600}\u{1F600}").is_valid);
        assert!(!validate_password("\u{1F600}\u{1F600}").is_valid);
        // Two-byte UTF-8 characters still count once each.
        assert!(!validate_password("\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}").is_valid);
    }

    #[test]
    fn name_bounds() {
        assert!(!validate_name(" a ").is_valid);
        assert!(validate_name("Al").is_valid);
        assert!(!validate_name(&"x".repeat(101)).is_valid);
        assert!(!validate_company_name("   ").is_valid);
    }

    #[test]
    fn task_priority_must_be_known() {
        assert!(validate_task("Pour slab", Some("HIGH")).is_valid);
        assert!(validate_task("Pour slab", None).is_valid);
        let result = validate_task("", Some("whenever"));
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn combine_collects_every_error() {
        let combined = combine_validations([
            validate_name(""),
            validate_email("nope"),
            validate_password("123456"),
        ]);
        assert!(!combined.is_valid);
        assert_eq!(combined.errors.len(), 2);
    }
}

use regex::Regex;
use std::sync::OnceLock;

use crate::error::LeadValidationError;
use crate::types::LeadDraft;

/// `^\+?[1-9]\d{1,14}$` — E.164-shaped, no leading zero (`spec.md` §4.8).
fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[1-9]\d{1,14}$").unwrap())
}

pub fn is_valid_phone(phone: &str) -> bool {
    phone_pattern().is_match(phone)
}

/// Structural check only (local@domain, non-empty parts, a dot in the
/// domain) — no network/MX lookup.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && !domain.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// Validates a draft per `spec.md` §4.8: `last_name` non-empty, at least
/// one of phone/email present and well-formed.
pub fn validate_draft(draft: &LeadDraft) -> Result<(), LeadValidationError> {
    let last_name = draft.last_name.as_deref().unwrap_or("").trim();
    if last_name.is_empty() {
        return Err(LeadValidationError::MissingLastName);
    }

    let phone = draft.phone.as_deref().filter(|p| !p.trim().is_empty());
    let email = draft.email.as_deref().filter(|e| !e.trim().is_empty());

    if phone.is_none() && email.is_none() {
        return Err(LeadValidationError::MissingContact);
    }
    if let Some(phone) = phone {
        if !is_valid_phone(phone) {
            return Err(LeadValidationError::InvalidPhone);
        }
    }
    if let Some(email) = email {
        if !is_valid_email(email) {
            return Err(LeadValidationError::InvalidEmail);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(last_name: &str, phone: Option<&str>, email: Option<&str>) -> LeadDraft {
        LeadDraft {
            last_name: Some(last_name.to_string()),
            phone: phone.map(str::to_string),
            email: email.map(str::to_string),
            source: "TG".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn valid_phone_only_passes() {
        assert!(validate_draft(&draft("Ivanov", Some("+79001234567"), None)).is_ok());
    }

    #[test]
    fn valid_email_only_passes() {
        assert!(validate_draft(&draft("Ivanov", None, Some("a@b.com"))).is_ok());
    }

    #[test]
    fn missing_last_name_is_rejected() {
        let result = validate_draft(&draft("", Some("+79001234567"), None));
        assert_eq!(result.unwrap_err(), LeadValidationError::MissingLastName);
    }

    #[test]
    fn missing_contact_is_rejected() {
        let result = validate_draft(&draft("Ivanov", None, None));
        assert_eq!(result.unwrap_err(), LeadValidationError::MissingContact);
    }

    #[test]
    fn malformed_phone_is_rejected() {
        let result = validate_draft(&draft("Ivanov", Some("not-a-phone"), None));
        assert_eq!(result.unwrap_err(), LeadValidationError::InvalidPhone);
    }

    #[test]
    fn leading_zero_phone_is_rejected() {
        assert!(!is_valid_phone("0123456789"));
    }

    #[test]
    fn malformed_email_is_rejected() {
        let result = validate_draft(&draft("Ivanov", None, Some("not-an-email")));
        assert_eq!(result.unwrap_err(), LeadValidationError::InvalidEmail);
    }

    #[test]
    fn email_without_dot_in_domain_is_rejected() {
        assert!(!is_valid_email("a@localhost"));
    }
}

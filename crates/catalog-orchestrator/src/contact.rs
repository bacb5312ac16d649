use catalog_leads::LeadDraft;

/// Best-effort extraction of contact fields from a free-text CONTACT-intent
/// message. Phone/email are picked out with loose token scans; the
/// remainder (after stripping the matched tokens) is kept as the last name
/// candidate, since `spec.md`'s examples show users stating a surname
/// alongside their contact info in one sentence (e.g. `"+79001234567,
/// Иванов"`). Validation of what's extracted happens in
/// `catalog_leads::validate`, not here — this module only gathers
/// candidates.
/// Words that signal the CONTACT intent itself rather than naming the
/// contact — excluded from last-name extraction so "свяжитесь со мной"
/// doesn't get mistaken for a surname.
const STOPWORDS: &[&str] = &[
    "call", "me", "contact", "my", "phone", "number", "email", "please",
    "свяжитесь", "позвоните", "со", "мной", "мой", "моя", "телефон", "почта", "пожалуйста",
];

pub fn extract_contact_fields(text: &str, platform: &str) -> LeadDraft {
    let mut phone = None;
    let mut email = None;
    let mut remainder_tokens = Vec::new();

    for raw_token in text.split(|c: char| c.is_whitespace() || c == ',') {
        let token = raw_token.trim_matches(|c: char| c == '.' || c == ';');
        if token.is_empty() {
            continue;
        }
        if email.is_none() && token.contains('@') {
            email = Some(token.to_string());
            continue;
        }
        if phone.is_none() && looks_like_phone(token) {
            phone = Some(normalize_phone(token));
            continue;
        }
        if STOPWORDS.contains(&token.to_lowercase().as_str()) {
            continue;
        }
        remainder_tokens.push(token);
    }

    let last_name = remainder_tokens.into_iter().last().map(str::to_string);

    LeadDraft {
        last_name,
        phone,
        email,
        whatsapp: None,
        company: None,
        question: Some(text.to_string()),
        source: platform_source_tag(platform),
        auto_created: false,
    }
}

fn looks_like_phone(token: &str) -> bool {
    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    digits >= 7 && token.chars().all(|c| c.is_ascii_digit() || c == '+' || c == '-' || c == '(' || c == ')')
}

fn normalize_phone(token: &str) -> String {
    let mut normalized: String = token.chars().filter(|c| c.is_ascii_digit() || *c == '+').collect();
    if !normalized.starts_with('+') {
        normalized = format!("+{normalized}");
    }
    normalized
}

fn platform_source_tag(platform: &str) -> String {
    match platform {
        "telegram" | "TG" => "TG".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_phone_email_and_last_name() {
        let draft = extract_contact_fields("свяжитесь со мной, +79001234567, Иванов", "TG");
        assert_eq!(draft.phone.as_deref(), Some("+79001234567"));
        assert_eq!(draft.last_name.as_deref(), Some("Иванов"));
    }

    #[test]
    fn extracts_email() {
        let draft = extract_contact_fields("contact me at ivanov@example.com", "TG");
        assert_eq!(draft.email.as_deref(), Some("ivanov@example.com"));
    }

    #[test]
    fn unrelated_words_do_not_look_like_phone() {
        assert!(!looks_like_phone("hello"));
    }
}

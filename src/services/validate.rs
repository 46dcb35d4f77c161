use std::collections::HashSet;

use super::{ServiceError, ServiceResult};
use crate::database::Translation;
use crate::tenancy::TenantContext;

pub const MAX_SLUG_LENGTH: usize = 120;

/// Content slugs: lowercase ascii letters, digits and dashes, no dash at
/// either end.
pub fn slug(field: &'static str, value: &str) -> ServiceResult<()> {
    if value.is_empty() || value.len() > MAX_SLUG_LENGTH {
        return Err(ServiceError::validation(
            field,
            format!("must be between 1 and {} characters", MAX_SLUG_LENGTH),
        ));
    }
    if !value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(ServiceError::validation(
            field,
            "may only contain lowercase letters, digits and dashes",
        ));
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(ServiceError::validation(field, "must not start or end with a dash"));
    }
    Ok(())
}

/// Tenant slugs double as subdomain labels, so they are tighter than content
/// slugs.
pub fn tenant_slug(value: &str) -> ServiceResult<()> {
    if value.len() < 2 || value.len() > 63 {
        return Err(ServiceError::validation("slug", "must be between 2 and 63 characters"));
    }
    slug("slug", value)
}

pub fn not_blank(field: &'static str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::validation(field, "must not be empty"));
    }
    Ok(())
}

pub fn email(field: &'static str, value: &str) -> ServiceResult<()> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !valid || value.chars().any(char::is_whitespace) {
        return Err(ServiceError::validation(field, "must be a valid email address"));
    }
    Ok(())
}

/// Absolute http(s) URL
pub fn http_url(field: &'static str, value: &str) -> ServiceResult<()> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() => Ok(()),
        _ => Err(ServiceError::validation(field, "must be an absolute http(s) URL")),
    }
}

/// Language codes like `en`, `de`, `pt-br`
pub fn language_code(field: &'static str, value: &str) -> ServiceResult<()> {
    let valid = !value.is_empty()
        && value.len() <= 10
        && value.split('-').all(|part| {
            (2..=4).contains(&part.len()) && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        });
    if !valid {
        return Err(ServiceError::validation(field, format!("'{}' is not a language code", value)));
    }
    Ok(())
}

/// A tenant's language list must be non-empty, unique and contain the
/// default.
pub fn languages(default_language: &str, languages: &[String]) -> ServiceResult<()> {
    if languages.is_empty() {
        return Err(ServiceError::validation("languages", "at least one language is required"));
    }
    let mut seen = HashSet::new();
    for lang in languages {
        language_code("languages", lang)?;
        if !seen.insert(lang.as_str()) {
            return Err(ServiceError::validation("languages", format!("'{}' is listed twice", lang)));
        }
    }
    if !seen.contains(default_language) {
        return Err(ServiceError::validation(
            "default_language",
            "must be one of the enabled languages",
        ));
    }
    Ok(())
}

/// Check a translation payload against the tenant's languages. On create the
/// default language must be present.
pub fn translations(tenant: &TenantContext, translations: &[Translation], creating: bool) -> ServiceResult<()> {
    let mut seen = HashSet::new();
    for t in translations {
        if !tenant.languages.iter().any(|l| l == &t.language) {
            return Err(ServiceError::validation(
                "translations",
                format!("language '{}' is not enabled for this site", t.language),
            ));
        }
        if !seen.insert(t.language.as_str()) {
            return Err(ServiceError::validation(
                "translations",
                format!("language '{}' appears more than once", t.language),
            ));
        }
        not_blank("translations", &t.title)?;
    }
    if creating && !seen.contains(tenant.default_language.as_str()) {
        return Err(ServiceError::validation(
            "translations",
            format!("a '{}' translation is required", tenant.default_language),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn tenant() -> TenantContext {
        TenantContext {
            id: Uuid::new_v4(),
            slug: "acme".to_string(),
            name: "Acme".to_string(),
            default_language: "en".to_string(),
            languages: vec!["en".to_string(), "de".to_string()],
            plan_id: None,
        }
    }

    fn tr(language: &str) -> Translation {
        Translation {
            language: language.to_string(),
            title: "Title".to_string(),
            summary: None,
            body: None,
        }
    }

    #[test]
    fn slugs() {
        assert!(slug("slug", "about-us").is_ok());
        assert!(slug("slug", "2024").is_ok());
        assert!(slug("slug", "").is_err());
        assert!(slug("slug", "About").is_err());
        assert!(slug("slug", "-lead").is_err());
        assert!(slug("slug", "trail-").is_err());
        assert!(slug("slug", "under_score").is_err());
        assert!(slug("slug", &"a".repeat(MAX_SLUG_LENGTH + 1)).is_err());
        assert!(tenant_slug("a").is_err());
    }

    #[test]
    fn urls_must_be_http() {
        assert!(http_url("url", "https://example.com/x").is_ok());
        assert!(http_url("url", "ftp://example.com").is_err());
        assert!(http_url("url", "javascript:alert(1)").is_err());
        assert!(http_url("url", "/relative").is_err());
    }

    #[test]
    fn language_list_needs_default() {
        let langs = vec!["en".to_string(), "de".to_string()];
        assert!(languages("en", &langs).is_ok());
        assert!(languages("fr", &langs).is_err());
        assert!(languages("en", &[]).is_err());
        assert!(languages("en", &["en".to_string(), "en".to_string()]).is_err());
        assert!(languages("en", &["en".to_string(), "EN".to_string()]).is_err());
    }

    #[test]
    fn translations_follow_tenant_languages() {
        let tenant = tenant();
        assert!(translations(&tenant, &[tr("en"), tr("de")], true).is_ok());
        // Update without the default language is fine
        assert!(translations(&tenant, &[tr("de")], false).is_ok());
        // Creation requires the default
        assert!(translations(&tenant, &[tr("de")], true).is_err());
        // Not enabled
        assert!(translations(&tenant, &[tr("en"), tr("fr")], true).is_err());
        // Duplicate
        assert!(translations(&tenant, &[tr("en"), tr("en")], true).is_err());
    }

    #[test]
    fn emails() {
        assert!(email("email", "jane@example.com").is_ok());
        assert!(email("email", "jane@localhost").is_err());
        assert!(email("email", "no-at-sign").is_err());
        assert!(email("email", "a b@example.com").is_err());
    }
}

use super::service::{PlatformSettings, Settings};
use crate::core::errors::PlatformError;

const PLACEHOLDERS: [&str; 4] = [
    "YOUR_CLIENT_ID",
    "YOUR_CLIENT_SECRET",
    "your-tenant-name",
    "your-publisher-id",
];

/// Startup check for values the platform calls cannot work without.
pub fn validate_settings(settings: &Settings) -> Result<(), PlatformError> {
    validate_required(&settings.platform.client_id, "GLOO_CLIENT_ID")?;
    validate_required(&settings.platform.client_secret, "GLOO_CLIENT_SECRET")?;
    validate_required(&settings.platform.tenant, "GLOO_TENANT")?;

    if !(0.0..=1.0).contains(&settings.rag.min_certainty) {
        return Err(PlatformError::Config(format!(
            "rag.min_certainty must be within [0, 1], got {}",
            settings.rag.min_certainty
        )));
    }
    validate_positive(settings.rag.max_snippets as u64, "rag.max_snippets")?;
    validate_positive(
        settings.rag.max_chars_per_snippet as u64,
        "rag.max_chars_per_snippet",
    )?;
    validate_positive(settings.rag.max_tokens as u64, "rag.max_tokens")?;

    Ok(())
}

/// Ingestion additionally needs a publisher to file content under.
pub fn require_publisher_id(settings: &PlatformSettings) -> Result<&str, PlatformError> {
    let publisher = settings.publisher_id.as_deref().unwrap_or("");
    validate_required(publisher, "GLOO_PUBLISHER_ID")?;
    Ok(publisher)
}

fn validate_required(value: &str, name: &str) -> Result<(), PlatformError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || PLACEHOLDERS.contains(&trimmed) {
        return Err(PlatformError::Config(format!("{} must be set", name)));
    }
    Ok(())
}

fn validate_positive(value: u64, name: &str) -> Result<(), PlatformError> {
    if value == 0 {
        return Err(PlatformError::Config(format!("{} must be at least 1", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_settings() -> Settings {
        let mut settings = Settings::default();
        settings.platform.client_id = "client".to_string();
        settings.platform.client_secret = "secret".to_string();
        settings.platform.tenant = "acme".to_string();
        settings
    }

    #[test]
    fn accepts_complete_settings() {
        assert!(validate_settings(&valid_settings()).is_ok());
    }

    #[test]
    fn rejects_placeholder_credentials() {
        let mut settings = valid_settings();
        settings.platform.client_id = "YOUR_CLIENT_ID".to_string();
        let err = validate_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("GLOO_CLIENT_ID"));
    }

    #[test]
    fn rejects_missing_tenant() {
        let mut settings = valid_settings();
        settings.platform.tenant = "  ".to_string();
        assert!(matches!(validate_settings(&settings), Err(PlatformError::Config(_))));
    }

    #[test]
    fn rejects_out_of_range_certainty() {
        let mut settings = valid_settings();
        settings.rag.min_certainty = 1.5;
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn rejects_zero_snippet_bounds() {
        let mut settings = valid_settings();
        settings.rag.max_chars_per_snippet = 0;
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn publisher_required_for_ingestion() {
        let mut settings = valid_settings();
        assert!(require_publisher_id(&settings.platform).is_err());
        settings.platform.publisher_id = Some("your-publisher-id".to_string());
        assert!(require_publisher_id(&settings.platform).is_err());
        settings.platform.publisher_id = Some("pub-1".to_string());
        assert_eq!(require_publisher_id(&settings.platform).unwrap(), "pub-1");
    }
}

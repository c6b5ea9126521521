use anyhow::Context;
use serde::Deserialize;
use time::{macros::format_description, Date};

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    pub tesseract_cmd: String,
    pub lang: String,
    pub pdftoppm_cmd: String,
    pub pdf_dpi: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt: JwtConfig,
    pub llm: LlmConfig,
    pub ocr: OcrConfig,
    pub blocking_pool_size: usize,
    /// Used when the model leaves the receipt date out.
    pub fallback_date: Date,
    pub max_upload_bytes: usize,
    /// Empty means permissive CORS.
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "receipt-scanner".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "receipt-scanner-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60 * 24),
        };
        let llm = LlmConfig {
            api_key: std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?,
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".into()),
            temperature: env_parse("OPENAI_TEMPERATURE", 0.0),
        };
        let ocr = OcrConfig {
            tesseract_cmd: std::env::var("OCR_TESSERACT_CMD").unwrap_or_else(|_| "tesseract".into()),
            lang: std::env::var("OCR_LANG").unwrap_or_else(|_| "eng".into()),
            pdftoppm_cmd: std::env::var("OCR_PDFTOPPM_CMD").unwrap_or_else(|_| "pdftoppm".into()),
            pdf_dpi: env_parse("OCR_PDF_DPI", 200),
        };
        let fallback_date = match std::env::var("RECEIPT_FALLBACK_DATE") {
            Ok(raw) => parse_date(&raw).context("RECEIPT_FALLBACK_DATE must be YYYY-MM-DD")?,
            Err(_) => default_fallback_date(),
        };

        Ok(Self {
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
            jwt,
            llm,
            ocr,
            blocking_pool_size: env_parse("BLOCKING_POOL_SIZE", 4).max(1),
            fallback_date,
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", 20 * 1024 * 1024),
            cors_allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_date(raw: &str) -> Result<Date, time::error::Parse> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
}

pub fn default_fallback_date() -> Date {
    time::macros::date!(2025 - 08 - 02)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(
            split_list(" http://localhost:5173 ,, https://app.example.com"),
            vec!["http://localhost:5173", "https://app.example.com"]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn parse_date_accepts_iso_only() {
        assert_eq!(parse_date("2024-02-29").unwrap(), time::macros::date!(2024 - 02 - 29));
        assert!(parse_date("29/02/2024").is_err());
        assert!(parse_date("2023-02-29").is_err());
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("RECEIPT_SCANNER_TEST_NUM", "not-a-number");
        assert_eq!(env_parse("RECEIPT_SCANNER_TEST_NUM", 7u32), 7);
        std::env::set_var("RECEIPT_SCANNER_TEST_NUM", " 12 ");
        assert_eq!(env_parse("RECEIPT_SCANNER_TEST_NUM", 7u32), 12);
        std::env::remove_var("RECEIPT_SCANNER_TEST_NUM");
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub public_url: String,
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("BAZAAR_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("BAZAAR_JWT_SECRET is unset or still a placeholder; it must match the auth provider's signing secret");
        }

        let port: u16 = match var("BAZAAR_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("BAZAAR_PORT is not a port: '{}'", raw))?,
            None => 3000,
        };
        let max_upload_mb: usize = match var("BAZAAR_MAX_UPLOAD_MB") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("BAZAAR_MAX_UPLOAD_MB is not a number: '{}'", raw))?,
            None => 10,
        };
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .with_context(|| format!("BAZAAR_MAX_UPLOAD_MB is too large: {}", max_upload_mb))?;

        Ok(Self {
            host: var("BAZAAR_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("BAZAAR_DB_PATH").unwrap_or_else(|| "bazaar.db".into()).into(),
            storage_dir: var("BAZAAR_STORAGE_DIR").unwrap_or_else(|| "./storage".into()).into(),
            public_url: var("BAZAAR_PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port))
                .trim_end_matches('/')
                .to_string(),
            jwt_secret,
            jwt_audience: var("BAZAAR_JWT_AUDIENCE"),
            max_upload_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_with_only_a_secret() {
        let config = Config::from_lookup(lookup(&[("BAZAAR_JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("bazaar.db"));
        assert_eq!(config.public_url, "http://localhost:3000");
        assert_eq!(config.jwt_audience, None);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn missing_or_placeholder_secret_is_fatal() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("BAZAAR_JWT_SECRET", "dev-secret-change-me")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BAZAAR_JWT_SECRET", "   ")])).is_err());
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("BAZAAR_JWT_SECRET", "s3cret"),
            ("BAZAAR_PORT", "8080"),
            ("BAZAAR_PUBLIC_URL", "https://img.example.com/"),
            ("BAZAAR_JWT_AUDIENCE", "authenticated"),
            ("BAZAAR_MAX_UPLOAD_MB", "2"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.public_url, "https://img.example.com");
        assert_eq!(config.jwt_audience.as_deref(), Some("authenticated"));
        assert_eq!(config.max_upload_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn bad_numbers_are_errors() {
        let res = Config::from_lookup(lookup(&[("BAZAAR_JWT_SECRET", "s3cret"), ("BAZAAR_PORT", "http")]));
        assert!(res.is_err());
    }

    #[test]
    fn oversized_upload_limit_is_an_error() {
        let huge = usize::MAX.to_string();
        let res = Config::from_lookup(lookup(&[("BAZAAR_JWT_SECRET", "s3cret"), ("BAZAAR_MAX_UPLOAD_MB", &huge)]));
        assert!(res.unwrap_err().to_string().contains("too large"));
    }
}

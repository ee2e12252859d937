use config::ConfigError;
use std::time::Duration;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Interval of the expired refresh token sweep
    #[serde(default = "default_purge_interval")]
    pub purge_interval_seconds: u64,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    /// Upper bound for a single store call
    #[serde(default = "default_store_timeout")]
    pub timeout_seconds: u64,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Server URL without a database, for creating one
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    #[serde(default = "default_access_expiry")]
    pub access_token_expiry: i64,   // seconds (900 = 15 minutes)
    #[serde(default = "default_refresh_expiry")]
    pub refresh_token_expiry: i64,  // seconds (604800 = 7 days)
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

/// Session cookie and credential hashing settings
#[derive(serde::Deserialize, Clone)]
pub struct AuthSettings {
    pub cookie_domain: Option<String>,
    #[serde(default = "default_true")]
    pub cookie_secure: bool,
    #[serde(default = "default_hash_cost")]
    pub password_hash_cost: u32,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            cookie_domain: None,
            cookie_secure: true,
            password_hash_cost: default_hash_cost(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_purge_interval() -> u64 {
    3600
}

fn default_store_timeout() -> u64 {
    5
}

fn default_access_expiry() -> i64 {
    15 * 60
}

fn default_refresh_expiry() -> i64 {
    7 * 24 * 60 * 60
}

fn default_issuer() -> String {
    "taskbox".to_string()
}

fn default_true() -> bool {
    true
}

fn default_hash_cost() -> u32 {
    12
}

fn load() -> Result<config::Config, ConfigError> {
    config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
}

/// Load settings from `configuration.yaml` (optional) and `APP__*` env vars.
///
/// Fails closed when no signing secret is configured.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = load()?.try_deserialize::<Settings>()?;

    if settings.jwt.secret.trim().is_empty() {
        return Err(ConfigError::Message(
            "jwt.secret must be set (APP__JWT__SECRET)".to_string(),
        ));
    }

    Ok(settings)
}

/// Only the `database` section, from the same sources. Used by tooling that
/// needs a database but no signing secret.
pub fn get_database_configuration() -> Result<DatabaseSettings, ConfigError> {
    load()?.get::<DatabaseSettings>("database")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_settings_defaults() {
        let auth = AuthSettings::default();
        assert!(auth.cookie_domain.is_none());
        assert!(auth.cookie_secure);
        assert_eq!(auth.password_hash_cost, 12);
    }

    #[test]
    fn test_connection_strings() {
        let db: DatabaseSettings = serde_json::from_str(
            r#"{"username": "u", "password": "p", "port": 5432, "host": "db", "database_name": "taskbox"}"#,
        )
        .unwrap();
        assert_eq!(db.connection_string(), "postgres://u:p@db:5432/taskbox");
        assert_eq!(db.connection_string_without_db(), "postgres://u:p@db:5432");
        assert_eq!(db.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_jwt_defaults_match_token_lifetimes() {
        let jwt: JwtSettings = serde_json::from_str(r#"{"secret": "s3cret"}"#).unwrap();
        assert_eq!(jwt.access_token_expiry, 900);
        assert_eq!(jwt.refresh_token_expiry, 604800);
        assert_eq!(jwt.issuer, "taskbox");
    }
}

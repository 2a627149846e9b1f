use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub security: SecuritySettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// Session store and message channel settings
#[derive(serde::Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub key_prefix: String,
    pub request_channel: String,
    pub reply_channel: String,
}

impl RedisSettings {
    /// Accepts bare `host:port` addresses as well as full `redis://` URLs
    pub fn connection_url(&self) -> String {
        if self.url.contains("://") {
            self.url.clone()
        } else {
            format!("redis://{}", self.url)
        }
    }
}

/// Token signing settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_ttl: i64,  // seconds (default 3600 = 60 minutes)
    pub refresh_token_ttl: i64, // seconds (default 604800 = 7 days)
}

/// Longest token lifetime accepted from configuration (10 years)
pub const MAX_TOKEN_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(serde::Deserialize, Clone)]
pub struct SecuritySettings {
    pub bcrypt_cost: u32,
}

impl Settings {
    /// Rejects settings the token lifecycle cannot run safely with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let jwt = &self.jwt;
        if jwt.access_secret.is_empty() {
            return Err(ConfigError::MissingRequired("ACCESS_SECRET".to_string()));
        }
        if jwt.refresh_secret.is_empty() {
            return Err(ConfigError::MissingRequired("REFRESH_SECRET".to_string()));
        }
        // One secret must never be able to forge the other kind of token
        if jwt.access_secret == jwt.refresh_secret {
            return Err(ConfigError::InvalidValue(
                "ACCESS_SECRET and REFRESH_SECRET must differ".to_string(),
            ));
        }
        if jwt.access_token_ttl <= 0 || jwt.refresh_token_ttl <= 0 {
            return Err(ConfigError::InvalidValue(
                "token TTLs must be positive".to_string(),
            ));
        }
        if jwt.access_token_ttl > MAX_TOKEN_TTL_SECS || jwt.refresh_token_ttl > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::InvalidValue(format!(
                "token TTLs must not exceed {} seconds",
                MAX_TOKEN_TTL_SECS
            )));
        }
        if !(4..=31).contains(&self.security.bcrypt_cost) {
            return Err(ConfigError::InvalidValue(format!(
                "bcrypt cost {} outside 4..=31",
                self.security.bcrypt_cost
            )));
        }
        Ok(())
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .set_default("database.username", "postgres")
        .and_then(|b| b.set_default("database.password", ""))
        .and_then(|b| b.set_default("database.port", 5432))
        .and_then(|b| b.set_default("database.host", "127.0.0.1"))
        .and_then(|b| b.set_default("database.database_name", "auth"))
        .and_then(|b| b.set_default("redis.url", "localhost:6379"))
        .and_then(|b| b.set_default("redis.key_prefix", "session:"))
        .and_then(|b| b.set_default("redis.request_channel", "auth"))
        .and_then(|b| b.set_default("redis.reply_channel", "auth.replies"))
        .and_then(|b| b.set_default("jwt.access_secret", ""))
        .and_then(|b| b.set_default("jwt.refresh_secret", ""))
        .and_then(|b| b.set_default("jwt.access_token_ttl", 60 * 60))
        .and_then(|b| b.set_default("jwt.refresh_token_ttl", 60 * 60 * 24 * 7))
        .and_then(|b| b.set_default("security.bcrypt_cost", bcrypt::DEFAULT_COST))
        .map_err(|e| ConfigError::InvalidValue(e.to_string()))?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        // Flat names used by existing deployments
        .set_override_option("jwt.access_secret", env("ACCESS_SECRET"))
        .and_then(|b| b.set_override_option("jwt.refresh_secret", env("REFRESH_SECRET")))
        .and_then(|b| b.set_override_option("jwt.access_token_ttl", env("ACCESS_TOKEN_TTL")))
        .and_then(|b| b.set_override_option("jwt.refresh_token_ttl", env("REFRESH_TOKEN_TTL")))
        .and_then(|b| b.set_override_option("redis.url", env("REDIS_DSN")))
        .and_then(|b| b.set_override_option("database.host", env("DB_HOST")))
        .and_then(|b| b.set_override_option("database.port", env("DB_PORT")))
        .and_then(|b| b.set_override_option("database.username", env("DB_USER")))
        .and_then(|b| b.set_override_option("database.database_name", env("DB_NAME")))
        .and_then(|b| b.set_override_option("database.password", env("DB_PASSWORD")))
        .map_err(|e| ConfigError::InvalidValue(e.to_string()))?
        .build()
        .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

    let settings = settings
        .try_deserialize::<Settings>()
        .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
    settings.validate()?;
    Ok(settings)
}

use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub second_factor: SecondFactorConfig,
    pub approvals: ApprovalPolicy,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Upper bound for acquiring a connection and for any single statement.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry_minutes: i64,
    pub session_expiry_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecondFactorConfig {
    pub issuer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalPolicy {
    /// When set, the requester of an approval request may not decide it.
    pub forbid_self_approval: bool,
    pub record_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    /// Reverse proxies in front of the service. Zero means `x-forwarded-for`
    /// is never trusted.
    pub trusted_proxy_hops: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RiskConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = RiskConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("risk-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
                timeout_seconds: parse_env("DATABASE_TIMEOUT_SECONDS", Some("5"), is_prod)?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", None, is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("30"),
                    is_prod,
                )?,
                session_expiry_days: parse_env("SESSION_EXPIRY_DAYS", Some("7"), is_prod)?,
            },
            second_factor: SecondFactorConfig {
                issuer: get_env("TOTP_ISSUER", Some("Risk Register"), is_prod)?,
            },
            approvals: ApprovalPolicy {
                // No default in any environment
                forbid_self_approval: parse_env("FORBID_SELF_APPROVAL", None, is_prod)?,
                record_prefix: get_env("RECORD_ID_PREFIX", Some("INC"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                trusted_proxy_hops: parse_env("TRUSTED_PROXY_HOPS", Some("0"), is_prod)?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("5"), is_prod)?,
                login_window_seconds: parse_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
            },
            bootstrap_admin: match (
                env::var("BOOTSTRAP_ADMIN_USERNAME"),
                env::var("BOOTSTRAP_ADMIN_EMAIL"),
                env::var("BOOTSTRAP_ADMIN_PASSWORD"),
            ) {
                (Ok(username), Ok(email), Ok(password)) => Some(BootstrapAdmin {
                    username,
                    email,
                    password,
                }),
                _ => None,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.secret.len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 bytes"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.session_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_EXPIRY_DAYS must be positive"
            )));
        }

        if self.database.timeout_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_TIMEOUT_SECONDS must be positive"
            )));
        }

        if self.approvals.record_prefix.is_empty()
            || !self
                .approvals
                .record_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RECORD_ID_PREFIX must be non-empty and alphanumeric"
            )));
        }

        if let Some(admin) = &self.bootstrap_admin {
            if admin.password.len() < 8 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "BOOTSTRAP_ADMIN_PASSWORD must be at least 8 characters"
                )));
            }
        }

        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        if !self.approvals.forbid_self_approval {
            tracing::warn!("FORBID_SELF_APPROVAL=false: requesters may approve their own requests");
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn missing_key_without_default_is_an_error() {
        let err = get_env("RISK_SERVICE_TEST_UNSET_KEY", None, false).unwrap_err();
        assert!(err.to_string().contains("RISK_SERVICE_TEST_UNSET_KEY"));
    }

    #[test]
    fn default_applies_outside_production() {
        let value: u32 = parse_env("RISK_SERVICE_TEST_UNSET_NUMBER", Some("42"), false).unwrap();
        assert_eq!(value, 42);
        assert!(parse_env::<u32>("RISK_SERVICE_TEST_UNSET_NUMBER", Some("42"), true).is_err());
    }
}

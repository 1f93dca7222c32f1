use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Ten years. Longer lifetimes overflow token expiry timestamps.
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// What happens to an attendance request once every seat is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendancePolicy {
    Waitlist,
    Reject,
}

impl std::str::FromStr for AttendancePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waitlist" => Ok(AttendancePolicy::Waitlist),
            "reject" => Ok(AttendancePolicy::Reject),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub schema: Option<String>,
    pub max_connections: u32,
    pub jwt_secret: String,
    pub jwt_expires_in_secs: u64,
    pub production: bool,
    pub server_host: String,
    pub server_port: u16,
    pub attendance_policy: AttendancePolicy,
    pub audit_log_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            schema: env::var("SCHEMA").ok().filter(|s| !s.trim().is_empty()),
            max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expires_in_secs: token_lifetime(env::var("JWT_EXPIRES_IN").ok())?,
            production: env::var("APP_ENV")
                .map(|v| v == "production")
                .unwrap_or(false),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parsed("SERVER_PORT", 8000)?,
            attendance_policy: parsed("ATTENDANCE_POLICY", AttendancePolicy::Waitlist)?,
            audit_log_path: env::var("AUDIT_LOG_PATH")
                .unwrap_or_else(|_| "logs/audit.log".to_string()),
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expires_in_secs)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn token_lifetime(value: Option<String>) -> Result<u64, ConfigError> {
    let Some(value) = value else {
        return Ok(604_800);
    };
    match value.trim().parse::<u64>() {
        Ok(secs) if (1..=MAX_TOKEN_LIFETIME_SECS).contains(&secs) => Ok(secs),
        _ => Err(ConfigError::Invalid {
            name: "JWT_EXPIRES_IN",
            value,
        }),
    }
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attendance_policy_parses_case_insensitively() {
        assert_eq!(
            "Waitlist".parse::<AttendancePolicy>(),
            Ok(AttendancePolicy::Waitlist)
        );
        assert_eq!(" reject ".parse::<AttendancePolicy>(), Ok(AttendancePolicy::Reject));
        assert!("overbook".parse::<AttendancePolicy>().is_err());
    }

    #[test]
    fn token_lifetime_is_bounded() {
        assert_eq!(token_lifetime(None).unwrap(), 604_800);
        assert_eq!(token_lifetime(Some(" 3600 ".to_string())).unwrap(), 3600);
        assert!(token_lifetime(Some("0".to_string())).is_err());
        assert!(token_lifetime(Some("-5".to_string())).is_err());
        assert!(token_lifetime(Some(u64::MAX.to_string())).is_err());
        assert!(token_lifetime(Some((MAX_TOKEN_LIFETIME_SECS + 1).to_string())).is_err());
        assert_eq!(
            token_lifetime(Some(MAX_TOKEN_LIFETIME_SECS.to_string())).unwrap(),
            MAX_TOKEN_LIFETIME_SECS
        );
    }
}

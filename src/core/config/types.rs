use thiserror::Error;

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(super) runtime: RuntimeSettings,
    pub(super) server: ServerSettings,
    pub(super) exam: ExamSettings,
    pub(super) telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerSettings {
    pub(crate) base_url: ServerUrl,
    pub(crate) http_timeout_seconds: u64,
}

/// Countdown, sync and integrity tuning handed to each exam controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExamSettings {
    pub(crate) sync_interval_seconds: i64,
    pub(crate) drift_tolerance_seconds: i64,
    pub(crate) warning_bound_seconds: i64,
    pub(crate) danger_bound_seconds: i64,
    pub(crate) auto_submit_delay_seconds: u64,
    pub(crate) notice_ttl_seconds: u64,
    pub(crate) tab_switch_warning_cap: u32,
}

impl Default for ExamSettings {
    fn default() -> Self {
        Self {
            sync_interval_seconds: 30,
            drift_tolerance_seconds: 5,
            warning_bound_seconds: 600,
            danger_bound_seconds: 300,
            auto_submit_delay_seconds: 2,
            notice_ttl_seconds: 5,
            tab_switch_warning_cap: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Test => "test",
        }
    }

    pub(super) fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServerUrl(pub(super) String);

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid server url: {0}")]
    InvalidServerUrl(String),
    #[error("server url must use https in strict mode: {0}")]
    InsecureServerUrl(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("missing required value for {0}")]
    MissingValue(&'static str),
    #[error("invalid session metadata: {0}")]
    InvalidSession(String),
}

impl ServerUrl {
    pub(super) fn parse(value: String) -> Result<Self, ConfigError> {
        let trimmed = value.trim().trim_end_matches('/');
        if trimmed.is_empty()
            || !(trimmed.starts_with("http://") || trimmed.starts_with("https://"))
        {
            return Err(ConfigError::InvalidServerUrl(value));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    pub(super) fn is_https(&self) -> bool {
        self.0.starts_with("https://")
    }
}

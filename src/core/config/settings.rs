use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_environment, parse_i64, parse_u32, parse_u64,
};
use super::types::{
    ConfigError, ExamSettings, RuntimeSettings, ServerSettings, ServerUrl, Settings,
    TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let environment =
            parse_environment(env_optional("EXAM_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("EXAM_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let base_url = ServerUrl::parse(env_or_default("EXAM_SERVER_URL", "http://localhost:5000"))?;
        let http_timeout_seconds = parse_u64(
            "EXAM_HTTP_TIMEOUT_SECONDS",
            env_or_default("EXAM_HTTP_TIMEOUT_SECONDS", "10"),
        )?;

        let defaults = ExamSettings::default();
        let exam = ExamSettings {
            sync_interval_seconds: parse_i64(
                "EXAM_SYNC_INTERVAL_SECONDS",
                env_or_default("EXAM_SYNC_INTERVAL_SECONDS", &defaults.sync_interval_seconds.to_string()),
            )?,
            drift_tolerance_seconds: parse_i64(
                "EXAM_DRIFT_TOLERANCE_SECONDS",
                env_or_default(
                    "EXAM_DRIFT_TOLERANCE_SECONDS",
                    &defaults.drift_tolerance_seconds.to_string(),
                ),
            )?,
            warning_bound_seconds: parse_i64(
                "EXAM_WARNING_BOUND_SECONDS",
                env_or_default("EXAM_WARNING_BOUND_SECONDS", &defaults.warning_bound_seconds.to_string()),
            )?,
            danger_bound_seconds: parse_i64(
                "EXAM_DANGER_BOUND_SECONDS",
                env_or_default("EXAM_DANGER_BOUND_SECONDS", &defaults.danger_bound_seconds.to_string()),
            )?,
            auto_submit_delay_seconds: parse_u64(
                "EXAM_AUTO_SUBMIT_DELAY_SECONDS",
                env_or_default(
                    "EXAM_AUTO_SUBMIT_DELAY_SECONDS",
                    &defaults.auto_submit_delay_seconds.to_string(),
                ),
            )?,
            notice_ttl_seconds: parse_u64(
                "EXAM_NOTICE_TTL_SECONDS",
                env_or_default("EXAM_NOTICE_TTL_SECONDS", &defaults.notice_ttl_seconds.to_string()),
            )?,
            tab_switch_warning_cap: parse_u32(
                "EXAM_TAB_SWITCH_WARNING_CAP",
                env_or_default(
                    "EXAM_TAB_SWITCH_WARNING_CAP",
                    &defaults.tab_switch_warning_cap.to_string(),
                ),
            )?,
        };

        let log_level = env_or_default("EXAM_LOG_LEVEL", "info");
        let json = env_optional("EXAM_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            server: ServerSettings { base_url, http_timeout_seconds },
            exam,
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server(&self) -> &ServerSettings {
        &self.server
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.exam.sync_interval_seconds <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_SYNC_INTERVAL_SECONDS",
                value: self.exam.sync_interval_seconds.to_string(),
            });
        }

        if self.exam.drift_tolerance_seconds < 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_DRIFT_TOLERANCE_SECONDS",
                value: self.exam.drift_tolerance_seconds.to_string(),
            });
        }

        if self.exam.danger_bound_seconds > self.exam.warning_bound_seconds {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_DANGER_BOUND_SECONDS",
                value: self.exam.danger_bound_seconds.to_string(),
            });
        }

        if self.server.http_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_HTTP_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if !self.server.base_url.is_https() {
            return Err(ConfigError::InsecureServerUrl(self.server.base_url.as_str().to_string()));
        }

        Ok(())
    }
}

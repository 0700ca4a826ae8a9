use super::parsing::{
    env_optional, env_or_default, is_supported_upload_extension, parse_bool, parse_cors_origins,
    parse_environment, parse_f64, parse_pool_size, parse_string_list, parse_u16, parse_u32,
    parse_u64, DEFAULT_UPLOAD_EXTENSIONS,
};
use super::types::{
    AiSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings, DatalabSettings,
    GradingSettings, RuntimeSettings, S3Settings, SecuritySettings, ServerHost, ServerPort,
    ServerSettings, Settings, StorageSettings, TelemetrySettings,
};

const SUPPORTED_FEEDBACK_LANGUAGES: &[&str] = &["en", "gu"];

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("PAPERCHECK_HOST", "0.0.0.0");
        let port = env_or_default("PAPERCHECK_PORT", "8000");

        let environment = parse_environment(
            env_optional("PAPERCHECK_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("PAPERCHECK_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Paper Checking API");
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = env_optional("SECRET_KEY").ok_or(ConfigError::MissingSecret("SECRET_KEY"))?;
        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "papercheck");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "papercheck_db");
        let database_url = env_optional("DATABASE_URL");

        let openai_api_key = env_or_default("OPENAI_API_KEY", "");
        let openai_base_url = env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1");
        let ai_model = env_or_default("AI_MODEL", "gpt-4o-mini");
        let ai_max_tokens = parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "500"))?;
        let ai_temperature =
            parse_f64("AI_TEMPERATURE", env_or_default("AI_TEMPERATURE", "0.3"))?;
        let ai_max_retries = parse_u32("AI_MAX_RETRIES", env_or_default("AI_MAX_RETRIES", "2"))?;

        let datalab_api_key = env_or_default("DATALAB_API_KEY", "");
        let datalab_base_url = env_or_default("DATALAB_BASE_URL", "https://www.datalab.to/api/v1");
        let datalab_mode = env_or_default("DATALAB_MODE", "accurate").to_ascii_lowercase();
        let datalab_poll_interval_seconds = parse_u64(
            "DATALAB_POLL_INTERVAL_SECONDS",
            env_or_default("DATALAB_POLL_INTERVAL_SECONDS", "2"),
        )?;
        let datalab_max_poll_attempts = parse_u32(
            "DATALAB_MAX_POLL_ATTEMPTS",
            env_or_default("DATALAB_MAX_POLL_ATTEMPTS", "60"),
        )?;
        let datalab_max_submit_retries = parse_u32(
            "DATALAB_MAX_SUBMIT_RETRIES",
            env_or_default("DATALAB_MAX_SUBMIT_RETRIES", "3"),
        )?;

        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "20"))?;
        let allowed_extensions = parse_string_list(
            env_optional("ALLOWED_UPLOAD_EXTENSIONS"),
            DEFAULT_UPLOAD_EXTENSIONS,
        );
        let local_root = env_or_default("LOCAL_STORAGE_ROOT", "./uploads");

        let s3_endpoint = env_or_default("S3_ENDPOINT", "");
        let s3_access_key = env_or_default("S3_ACCESS_KEY", "");
        let s3_secret_key = env_or_default("S3_SECRET_KEY", "");
        let s3_bucket = env_or_default("S3_BUCKET", "papercheck-uploads");
        let s3_region = env_or_default("S3_REGION", "us-east-1");

        let grading_concurrency =
            parse_pool_size("GRADING_CONCURRENCY", env_or_default("GRADING_CONCURRENCY", "4"))?;
        let extraction_timeout_seconds = parse_u64(
            "EXTRACTION_TIMEOUT_SECONDS",
            env_or_default("EXTRACTION_TIMEOUT_SECONDS", "180"),
        )?;
        let oracle_timeout_seconds = parse_u64(
            "ORACLE_TIMEOUT_SECONDS",
            env_or_default("ORACLE_TIMEOUT_SECONDS", "90"),
        )?;
        let inline_dispatch = env_optional("GRADING_INLINE_DISPATCH")
            .map(|value| parse_bool(&value))
            .unwrap_or(true);
        let worker_concurrency = parse_pool_size(
            "GRADING_WORKER_CONCURRENCY",
            env_or_default("GRADING_WORKER_CONCURRENCY", "2"),
        )?;
        let pending_grace_seconds = parse_u64(
            "GRADING_PENDING_GRACE_SECONDS",
            env_or_default("GRADING_PENDING_GRACE_SECONDS", "30"),
        )?;
        let stale_after_minutes = parse_u64(
            "GRADING_STALE_AFTER_MINUTES",
            env_or_default("GRADING_STALE_AFTER_MINUTES", "30"),
        )?;
        let feedback_language = env_or_default("FEEDBACK_LANGUAGE", "gu").to_ascii_lowercase();

        let log_level = env_or_default("LOG_LEVEL", "info");
        let json = env_optional("LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            ai: AiSettings {
                openai_api_key,
                openai_base_url,
                ai_model,
                ai_max_tokens,
                ai_temperature,
                ai_max_retries,
            },
            datalab: DatalabSettings {
                api_key: datalab_api_key,
                base_url: datalab_base_url,
                mode: datalab_mode,
                poll_interval_seconds: datalab_poll_interval_seconds,
                max_poll_attempts: datalab_max_poll_attempts,
                max_submit_retries: datalab_max_submit_retries,
            },
            storage: StorageSettings { max_upload_size_mb, allowed_extensions, local_root },
            s3: S3Settings {
                endpoint: s3_endpoint,
                access_key: s3_access_key,
                secret_key: s3_secret_key,
                bucket: s3_bucket,
                region: s3_region,
            },
            grading: GradingSettings {
                concurrency: grading_concurrency,
                extraction_timeout_seconds,
                oracle_timeout_seconds,
                inline_dispatch,
                worker_concurrency,
                pending_grace_seconds,
                stale_after_minutes,
                feedback_language,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn datalab(&self) -> &DatalabSettings {
        &self.datalab
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.allowed_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_UPLOAD_EXTENSIONS",
                value: String::from("<empty>"),
            });
        }

        for extension in &self.storage.allowed_extensions {
            if !is_supported_upload_extension(extension) {
                return Err(ConfigError::InvalidValue {
                    field: "ALLOWED_UPLOAD_EXTENSIONS",
                    value: extension.clone(),
                });
            }
        }

        if self.storage.max_upload_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_UPLOAD_SIZE_MB",
                value: "0".to_string(),
            });
        }

        if self.datalab.mode != "accurate" && self.datalab.mode != "balanced" {
            return Err(ConfigError::InvalidValue {
                field: "DATALAB_MODE",
                value: self.datalab.mode.clone(),
            });
        }

        if self.datalab.poll_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATALAB_POLL_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.datalab.max_poll_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATALAB_MAX_POLL_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&self.ai.ai_temperature) {
            return Err(ConfigError::InvalidValue {
                field: "AI_TEMPERATURE",
                value: self.ai.ai_temperature.to_string(),
            });
        }

        if self.grading.extraction_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXTRACTION_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.grading.oracle_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ORACLE_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if !SUPPORTED_FEEDBACK_LANGUAGES.contains(&self.grading.feedback_language.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "FEEDBACK_LANGUAGE",
                value: self.grading.feedback_language.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.ai.openai_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }
        if self.datalab.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("DATALAB_API_KEY"));
        }
        if !self.s3.endpoint.is_empty() && (self.s3.access_key.is_empty() || self.s3.secret_key.is_empty()) {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn load_uses_grading_defaults() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.grading().concurrency, 4);
        assert_eq!(settings.grading().extraction_timeout_seconds, 180);
        assert_eq!(settings.grading().oracle_timeout_seconds, 90);
        assert_eq!(settings.grading().pending_grace_seconds, 30);
        assert_eq!(settings.grading().feedback_language, "gu");
        assert!(settings.grading().inline_dispatch);
        assert_eq!(settings.server_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn load_rejects_zero_concurrency() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("GRADING_CONCURRENCY", "0");

        let result = Settings::load();
        std::env::remove_var("GRADING_CONCURRENCY");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "GRADING_CONCURRENCY", .. })
        ));
    }

    #[test]
    fn load_requires_secret_key() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::remove_var("SECRET_KEY");

        let result = Settings::load();
        std::env::set_var("SECRET_KEY", "test-secret");
        assert!(matches!(result, Err(ConfigError::MissingSecret("SECRET_KEY"))));
    }

    #[test]
    fn strict_mode_requires_provider_keys() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("PAPERCHECK_STRICT_CONFIG", "1");

        let result = Settings::load();
        std::env::remove_var("PAPERCHECK_STRICT_CONFIG");
        assert!(matches!(result, Err(ConfigError::MissingSecret(_))));
    }

    #[test]
    fn unknown_feedback_language_is_rejected() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("FEEDBACK_LANGUAGE", "fr");

        let result = Settings::load();
        std::env::remove_var("FEEDBACK_LANGUAGE");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "FEEDBACK_LANGUAGE", .. })
        ));
    }
}

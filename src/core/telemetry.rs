use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

const QUIET_DEPENDENCIES: &[&str] = &["hyper=warn", "aws_config=warn", "aws_smithy_runtime=warn"];

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let mut directives = vec![settings.telemetry().log_level.clone()];
            directives.extend(QUIET_DEPENDENCIES.iter().map(|item| item.to_string()));
            EnvFilter::try_new(directives.join(","))?
        }
    };

    let builder = fmt().with_env_filter(filter).with_target(false);

    if settings.telemetry().json {
        builder
            .json()
            .with_current_span(true)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    } else {
        builder.try_init().map_err(|err| anyhow::anyhow!(err.to_string()))?;
    }

    tracing::debug!(
        environment = settings.runtime().environment.as_str(),
        json = settings.telemetry().json,
        "tracing initialized"
    );
    Ok(())
}

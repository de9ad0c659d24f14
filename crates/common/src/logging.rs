use error_stack::{Report, ResultExt};
use log::LevelFilter;

use crate::error::AuthError;
use crate::settings::LoggingSettings;

/// Initialize logging for the application.
/// Should be called once at startup; a second call fails.
///
/// # Errors
///
/// Returns [`AuthError::Configuration`] if the level is unknown or a global
/// logger is already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), Report<AuthError>> {
    let level = settings.level_filter()?;
    dispatch(level)
        .chain(std::io::stderr())
        .apply()
        .change_context(AuthError::Configuration {
            message: "Failed to initialize logger".into(),
        })
}

fn dispatch(level: LevelFilter) -> fern::Dispatch {
    fern::Dispatch::new()
        .level(level)
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}  {} {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                record.level(),
                message
            ))
        })
}

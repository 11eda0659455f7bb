use super::{types::Config, ConfigError};

/// Longest allowed grace period between SIGTERM and kill.
pub const MAX_KILL_GRACE_MS: u64 = 60_000;

/// Validate configuration
/// Currently validates:
/// - Scheduler concurrency is at least 1
/// - Tool paths are not empty
/// - Kill grace period is at most 60 seconds
/// - Tool timeout is not 0
///
/// Conversion defaults are clamped when used, never rejected.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Scheduler validation
    if config.scheduler.concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.concurrency must be at least 1".to_string(),
        ));
    }

    // Tool validation
    if config.tool.ffmpeg_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "tool.ffmpeg_path cannot be empty".to_string(),
        ));
    }
    if config.tool.ffprobe_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "tool.ffprobe_path cannot be empty".to_string(),
        ));
    }
    if config.tool.kill_grace_ms > MAX_KILL_GRACE_MS {
        return Err(ConfigError::ValidationError(format!(
            "tool.kill_grace_ms cannot exceed {}",
            MAX_KILL_GRACE_MS
        )));
    }
    if config.tool.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "tool.timeout_secs cannot be 0".to_string(),
        ));
    }

    // Output validation
    if config.output.suffix.contains(std::path::MAIN_SEPARATOR) {
        return Err(ConfigError::ValidationError(
            "output.suffix cannot contain a path separator".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerConfig;
    use std::path::PathBuf;

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_concurrency_zero_fails() {
        let config = Config {
            scheduler: SchedulerConfig { concurrency: 0 },
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_empty_tool_path_fails() {
        let mut config = Config::default();
        config.tool.ffprobe_path = PathBuf::new();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("ffprobe_path"));
    }

    #[test]
    fn test_validate_grace_period_bound() {
        let mut config = Config::default();
        config.tool.kill_grace_ms = MAX_KILL_GRACE_MS;
        assert!(validate_config(&config).is_ok());

        config.tool.kill_grace_ms = MAX_KILL_GRACE_MS + 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_suffix_separator() {
        let mut config = Config::default();
        config.output.suffix = format!("a{}b", std::path::MAIN_SEPARATOR);
        assert!(validate_config(&config).is_err());
    }
}

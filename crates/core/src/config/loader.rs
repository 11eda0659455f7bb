use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment variables overriding the configuration.
///
/// Nested keys are separated by a double underscore, e.g.
/// `PIXELBATCH_SCHEDULER__CONCURRENCY=8`.
pub const ENV_PREFIX: &str = "PIXELBATCH_";

/// Load configuration from file with environment variable overrides
///
/// Without a file, defaults are used as the base.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        figment = figment.merge(Toml::file(path));
    }

    let config: Config = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{DitherMode, OutputFormat};
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[scheduler]
concurrency = 6

[defaults]
grid_size = 16
dither = "ordered"
output_format = "webp"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.scheduler.concurrency, 6);
        assert_eq!(config.defaults.grid_size, 16);
        assert_eq!(config.defaults.dither, DitherMode::Ordered);
        assert_eq!(config.defaults.output_format, Some(OutputFormat::Webp));
        // Unset fields keep their defaults
        assert_eq!(config.defaults.palette_size, 32);
        assert_eq!(config.output.suffix, "_pixelated");
    }

    #[test]
    fn test_load_config_from_str_empty() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let toml = r#"
[scheduler]
concurrency = "many"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[tool]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
kill_grace_ms = 500

[output]
dir = "/tmp/pixelated"
"#
        )
        .unwrap();

        let config = load_config(Some(temp_file.path())).unwrap();
        assert_eq!(config.tool.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.tool.kill_grace_ms, 500);
        assert_eq!(config.output.dir, Some(PathBuf::from("/tmp/pixelated")));
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "pixelbatch.toml",
                r#"
[scheduler]
concurrency = 2
"#,
            )?;
            jail.set_env("PIXELBATCH_SCHEDULER__CONCURRENCY", "9");
            jail.set_env("PIXELBATCH_DEFAULTS__GRID_SIZE", "4");

            let config = load_config(Some(Path::new("pixelbatch.toml"))).unwrap();
            assert_eq!(config.scheduler.concurrency, 9);
            assert_eq!(config.defaults.grid_size, 4);
            Ok(())
        });
    }
}

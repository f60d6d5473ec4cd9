use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.max_input_size == 0 {
        return Err(ConfigError::Validation {
            message: "max_input_size must be positive".to_string(),
        });
    }

    if config.pipeline.target_format.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "pipeline.target_format must not be empty".to_string(),
        });
    }

    if let Some(transform) = &config.pipeline.transform {
        if transform.image_quality == 0 || transform.image_quality > 100 {
            return Err(ConfigError::Validation {
                message: format!(
                    "pipeline.transform.image_quality must be 1..=100, got {}",
                    transform.image_quality
                ),
            });
        }
    }

    if let Some(recognize) = &config.pipeline.recognize {
        if recognize.languages.is_empty() {
            return Err(ConfigError::Validation {
                message: "pipeline.recognize.languages must not be empty".to_string(),
            });
        }
    }

    for (name, policy) in [
        ("upload", &config.retry.upload),
        ("operation", &config.retry.operation),
        ("download", &config.retry.download),
        ("metadata", &config.retry.metadata),
    ] {
        if let Some(policy) = policy {
            if policy.max_attempts == 0 {
                return Err(ConfigError::Validation {
                    message: format!("retry.{}.max_attempts must be at least 1", name),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "version": "1.0",
        "input_directory": "/data/in",
        "destination_directory": "/data/out"
    }"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = load_config_from_str(MINIMAL).unwrap();

        assert!(config.worker_count >= 1);
        assert_eq!(config.pipeline.target_format, "pdf");
        assert!(config.pipeline.transform.is_some());
        assert!(!config.production.delete_original_on_success);
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let content = MINIMAL.replace("1.0", "2.0");
        let err = load_config_from_str(&content).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let content = r#"{
            "version": "1.0",
            "input_directory": "/in",
            "destination_directory": "/out",
            "worker_count": 0
        }"#;
        assert!(load_config_from_str(content).is_err());
    }

    #[test]
    fn test_out_of_range_quality_rejected() {
        let content = r#"{
            "version": "1.0",
            "input_directory": "/in",
            "destination_directory": "/out",
            "pipeline": { "transform": { "image_quality": 140 } }
        }"#;
        assert!(load_config_from_str(content).is_err());
    }

    #[test]
    fn test_retry_override_parsed() {
        let content = r#"{
            "version": "1.0",
            "input_directory": "/in",
            "destination_directory": "/out",
            "retry": { "upload": { "max_attempts": 5 } }
        }"#;
        let config = load_config_from_str(content).unwrap();
        let settings = config.retry.to_settings();
        assert_eq!(settings.upload.max_attempts, 5);
        assert_eq!(settings.upload.initial_backoff.as_millis(), 500);
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let err = load_config_from_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(_)));
    }

    #[test]
    fn test_batch_settings_reflect_config() {
        let content = r#"{
            "version": "1.0",
            "input_directory": "/in",
            "destination_directory": "/out",
            "worker_count": 3,
            "max_input_size": 1024,
            "production": { "delete_original_on_success": true }
        }"#;
        let config = load_config_from_str(content).unwrap();
        let settings = config.batch_settings();

        assert_eq!(settings.worker_count, 3);
        assert_eq!(settings.max_input_size, 1024);
        assert!(settings.rules.delete_original_on_success);
        assert_eq!(settings.destination, std::path::Path::new("/out"));
    }
}

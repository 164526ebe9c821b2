//! Configuration validation.

use crate::schema::Config;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();
        Self::validate_installer(config, &mut result);
        Self::validate_registry(config, &mut result);
        Self::validate_logging(config, &mut result);
        result
    }

    fn validate_installer(config: &Config, result: &mut ValidationResult) {
        let installer = &config.installer;

        if installer.idle_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "installer.idle_timeout_ms",
                "idle_timeout_ms must be greater than 0",
            ));
        }

        if installer.relink_timeout_secs == 0 {
            result.add_warning(ValidationWarning::new(
                "installer.relink_timeout_secs",
                "relink_timeout_secs is 0, relinks will not wait for the container",
            ));
        }

        if installer.relink_poll_interval_ms == 0 {
            result.add_warning(ValidationWarning::new(
                "installer.relink_poll_interval_ms",
                "relink_poll_interval_ms is 0 and will be raised to 1",
            ));
        } else if installer.relink_poll_interval_ms > installer.relink_timeout_secs * 1000 {
            result.add_warning(ValidationWarning::new(
                "installer.relink_poll_interval_ms",
                "relink_poll_interval_ms exceeds the relink timeout",
            ));
        }
    }

    fn validate_registry(config: &Config, result: &mut ValidationResult) {
        if config.registry.storage_path.as_os_str().is_empty() {
            result.add_error(ValidationError::new(
                "registry.storage_path",
                "storage_path cannot be empty",
            ));
        }

        let scheme = &config.registry.scheme;
        if scheme.is_empty() || scheme.contains(':') {
            result.add_error(ValidationError::new(
                "registry.scheme",
                format!("'{}' is not a valid URL scheme", scheme),
            ));
        }

        if config.container.state_path == config.registry.storage_path {
            result.add_error(ValidationError::new(
                "container.state_path",
                "container state and registry snapshot must use different files",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let level = config.logging.level.as_str();
        // Directives such as "converge_runloop=debug" are passed through to the filter.
        if !level.contains('=') && !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            result.add_warning(ValidationWarning::new(
                "logging.level",
                format!(
                    "Unknown log level '{}', valid values: {:?}",
                    level, LOG_LEVELS
                ),
            ));
        }

        if config.logging.directory.is_some() && config.logging.max_files == 0 {
            result.add_error(ValidationError::new(
                "logging.max_files",
                "max_files must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

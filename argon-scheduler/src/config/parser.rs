use argon_common::error::Error;

use super::schema::SchedulerConfig;

pub fn parse_yaml(yaml_str: &str) -> Result<SchedulerConfig, Error> {
    // An empty document deserializes to unit, not to an empty mapping
    if yaml_str.trim().is_empty() {
        return Ok(SchedulerConfig::default());
    }

    let config: SchedulerConfig = serde_yaml::from_str(yaml_str).map_err(|e| {
        let err = if let Some(location) = e.location() {
            ParseError::InvalidYaml {
                line: location.line(),
                column: location.column(),
                message: e.to_string(),
            }
        } else {
            ParseError::InvalidYamlNoLocation {
                message: e.to_string(),
            }
        };
        Error::Config(err.to_string())
    })?;

    Ok(config)
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid YAML config at line {line}, column {column}: {message}")]
    InvalidYaml {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Invalid YAML config: {message}")]
    InvalidYamlNoLocation { message: String },
}

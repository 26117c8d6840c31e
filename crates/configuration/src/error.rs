use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file or an environment override could not be read or deserialized.
    #[error("Failed to read configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    /// A value was read but breaks a constraint (e.g. short MA period >= long).
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Could not set up logging: {0}")]
    Logging(String),
}

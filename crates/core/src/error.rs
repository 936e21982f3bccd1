use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("provider {provider} is missing {key}")]
    Missing { provider: String, key: String },

    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

use thiserror::Error;

/// Errors raised while loading or validating a [`SchedulerConfig`](crate::SchedulerConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors raised while a system declares its resource access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("system '{system}' declared more than {limit} {kind} resources")]
    Overflow {
        system: String,
        kind: &'static str,
        limit: usize,
    },
}

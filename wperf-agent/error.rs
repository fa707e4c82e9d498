use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("affinity operation failed: {0}")]
    AffinityError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("unknown event or metric name: {0}")]
    UnknownEvent(String),

    #[error("metric {name} has {got} events, at most {max} allowed")]
    TooManyMetricEvents { name: String, got: usize, max: usize },

    #[error("malformed shunting-yard formula: {0}")]
    FormulaError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse metric definitions: {0}")]
    MetricDefParse(#[from] serde_json::Error),

    #[error("nix error: {0}")]
    NixError(#[from] nix::Error),

    #[error("device error: {0}")]
    Device(#[from] wperf_core::DeviceError),
}

pub type Result<T> = std::result::Result<T, AgentError>;

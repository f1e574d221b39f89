use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("missing env var {0}")]
  MissingVariable(&'static str),
  #[error("env var {key} has invalid format: {value:?} is {reason}")]
  InvalidFormat {
    key: &'static str,
    value: String,
    reason: &'static str,
  },
  #[error(transparent)]
  Source(#[from] config::ConfigError),
}

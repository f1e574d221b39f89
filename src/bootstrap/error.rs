use thiserror::Error;

use crate::{exporter::error::ExporterError, settings::error::ConfigError};

use super::Stage;

#[derive(Error, Debug)]
pub enum BootstrapError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Exporter(#[from] ExporterError),
  #[error("unrecovered fault in stage {stage:?}: {reason}")]
  UnrecoveredFault { stage: Stage, reason: String },
}

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExporterError {
  #[error("failed to start metrics server on {addr}: {source}")]
  Bind { addr: SocketAddr, source: hyper::Error },
  #[error("metrics server failed: {0}")]
  Serve(hyper::Error),
  #[error("metrics server task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
  #[error(transparent)]
  Recorder(#[from] metrics_exporter_prometheus::BuildError),
}

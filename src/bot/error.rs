use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
  #[error(transparent)]
  TeloxideRequestError(#[from] teloxide::RequestError),
}

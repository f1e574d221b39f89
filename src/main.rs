pub mod bootstrap;
pub mod bot;
pub mod exporter;
pub mod settings;
pub mod store;

use std::{env, panic, process::ExitCode};

use bootstrap::{error::BootstrapError, Bootstrapper, Production};
use log::{debug, error, info};

#[tokio::main]
async fn main() -> ExitCode {
  pretty_env_logger::init();
  // The bootstrapper reports intercepted panics itself.
  panic::set_hook(Box::new(|panic_info| debug!("[Main] {}", panic_info)));

  let metrics = match exporter::install_recorder() {
    Ok(handle) => handle,
    Err(err) => {
      error!("[Main] Unable to install metrics recorder: {}", err);
      return ExitCode::FAILURE;
    }
  };

  let outcome = Bootstrapper::new(Production, metrics).run(|key| env::var_os(key)).await;
  ExitCode::from(report(outcome))
}

/// Logs the single final diagnostic of a run and returns the process exit status.
fn report(outcome: Result<(), BootstrapError>) -> u8 {
  match outcome {
    Ok(()) => {
      info!("[Main] Shutting down");
      0
    }
    Err(err) => {
      error!("[Main] Fatal: {}", err);
      1
    }
  }
}

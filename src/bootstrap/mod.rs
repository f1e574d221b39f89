pub mod error;

use std::{
  any::Any,
  ffi::OsString,
  net::SocketAddr,
  panic::{self, AssertUnwindSafe},
};

use log::{debug, info};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinError;

use crate::{
  bot::{config::BotConfig, FeedBot, Worker},
  exporter::{self, error::ExporterError, MetricsExporter},
  settings::Config,
  store::RedisStore,
};

use self::error::BootstrapError as Error;

/// Startup progress. `Aborted` is terminal and reachable from every other stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
  Init,
  ConfigResolved,
  ExporterLaunching,
  StoreReady,
  WorkerRunning,
  Aborted,
}

/// Constructors for the store client and the worker.
pub trait Collaborators {
  type Store;

  /// Must not fail; connecting is the store's own concern.
  fn store(&self, uri: &str) -> Self::Store;

  fn worker(&self, store: Self::Store, config: BotConfig) -> Box<dyn Worker>;
}

/// Redis-backed Telegram bot.
pub struct Production;

impl Collaborators for Production {
  type Store = RedisStore;

  fn store(&self, uri: &str) -> RedisStore {
    RedisStore::new(uri)
  }

  fn worker(&self, store: RedisStore, config: BotConfig) -> Box<dyn Worker> {
    Box::new(FeedBot::new(store, config))
  }
}

/// Composition root: resolves the config, launches the exporter, builds the store and the worker,
/// then runs the worker until it returns or something faults.
pub struct Bootstrapper<C> {
  collaborators: C,
  metrics: PrometheusHandle,
  metrics_addr: SocketAddr,
  stage: Stage,
}

impl<C: Collaborators> Bootstrapper<C> {
  pub fn new(collaborators: C, metrics: PrometheusHandle) -> Self {
    Bootstrapper {
      collaborators,
      metrics,
      metrics_addr: exporter::metrics_address(),
      stage: Stage::Init,
    }
  }

  #[cfg(test)]
  fn with_metrics_address(mut self, addr: SocketAddr) -> Self {
    self.metrics_addr = addr;
    self
  }

  /// Runs the whole startup sequence. Every error returned here is final.
  pub async fn run(mut self, lookup: impl Fn(&str) -> Option<OsString>) -> Result<(), Error> {
    let result = self.run_stages(lookup).await;
    if result.is_err() {
      self.advance(Stage::Aborted);
    }
    result
  }

  async fn run_stages(&mut self, lookup: impl Fn(&str) -> Option<OsString>) -> Result<(), Error> {
    let config = Config::resolve(lookup)?;
    self.advance(Stage::ConfigResolved);

    // The exporter may still be binding when the worker starts; a bind failure surfaces below.
    self.advance(Stage::ExporterLaunching);
    let exporter = MetricsExporter::new(self.metrics.clone()).start(self.metrics_addr);

    let store = self.guard(|c| c.store(config.redis_uri()))?;
    self.advance(Stage::StoreReady);

    let worker = self.guard(|c| c.worker(store, config.bot().clone()))?;
    self.advance(Stage::WorkerRunning);
    info!("[Bootstrapper] Starting worker");
    let worker = tokio::spawn(worker.start());

    tokio::select! {
      joined = worker => match joined {
        Ok(Ok(())) => {
          info!("[Bootstrapper] Worker has finished");
          Ok(())
        }
        Ok(Err(err)) => Err(self.fault(err.to_string())),
        Err(err) => Err(self.fault(join_reason(err))),
      },
      finished = exporter.finished() => match finished {
        Err(ExporterError::Task(err)) => Err(self.fault(join_reason(err))),
        Err(err) => Err(err.into()),
        Ok(()) => Err(self.fault("metrics server stopped unexpectedly".to_string())),
      },
    }
  }

  fn advance(&mut self, next: Stage) {
    debug!("[Bootstrapper] {:?} -> {:?}", self.stage, next);
    self.stage = next;
  }

  // Turns a panic in a collaborator constructor into a fault of the current stage.
  fn guard<T>(&self, build: impl FnOnce(&C) -> T) -> Result<T, Error> {
    panic::catch_unwind(AssertUnwindSafe(|| build(&self.collaborators))).map_err(|payload| self.fault(panic_reason(&*payload)))
  }

  fn fault(&self, reason: String) -> Error {
    Error::UnrecoveredFault {
      stage: self.stage,
      reason,
    }
  }
}

fn join_reason(err: JoinError) -> String {
  if err.is_panic() {
    panic_reason(&*err.into_panic())
  } else {
    err.to_string()
  }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
  match payload.downcast_ref::<&str>() {
    Some(msg) => format!("panicked: {msg}"),
    None => match payload.downcast_ref::<String>() {
      Some(msg) => format!("panicked: {msg}"),
      None => "panicked".to_string(),
    },
  }
}

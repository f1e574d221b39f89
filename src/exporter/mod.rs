pub mod error;

use std::{
  convert::Infallible,
  future,
  net::{IpAddr, Ipv4Addr, SocketAddr},
};

use hyper::{
  header::{HeaderValue, CONTENT_TYPE},
  service::{make_service_fn, service_fn},
  Body, Method, Request, Response, Server, StatusCode,
};
use log::{debug, info, trace};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::{sync::oneshot, task::JoinHandle};

use self::error::ExporterError as Error;

pub const METRICS_PORT: u16 = 9091;
pub const METRICS_PATH: &str = "/metrics";
const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Address the exporter listens on. It does not depend on the resolved configuration.
pub fn metrics_address() -> SocketAddr {
  SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), METRICS_PORT)
}

/// Installs the process-wide Prometheus recorder and returns the handle used to render scrapes.
pub fn install_recorder() -> Result<PrometheusHandle, Error> {
  let handle = PrometheusBuilder::new().install_recorder()?;
  record_process_metrics();
  Ok(handle)
}

fn record_process_metrics() {
  metrics::describe_gauge!("process_start_time_seconds", "Start time of the process since unix epoch in seconds.");
  metrics::describe_gauge!("feedbot_build_info", "Build information of the running binary.");
  metrics::gauge!("process_start_time_seconds").set(chrono::Utc::now().timestamp() as f64);
  metrics::gauge!("feedbot_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Serves the scrape endpoint for an injected registry handle.
pub struct MetricsExporter {
  handle: PrometheusHandle,
}

impl MetricsExporter {
  pub fn new(handle: PrometheusHandle) -> Self {
    MetricsExporter { handle }
  }

  /// Spawns the server and returns at once. Nothing waits for the listener to be ready unless the caller
  /// asks through [`ExporterTask::listening`].
  pub fn start(self, addr: SocketAddr) -> ExporterTask {
    info!("[MetricsExporter] Starting metrics server http://{}{}", addr, METRICS_PATH);
    let (ready_tx, ready_rx) = oneshot::channel();
    ExporterTask {
      ready: Some(ready_rx),
      task: tokio::spawn(self.serve(addr, ready_tx)),
    }
  }

  async fn serve(self, addr: SocketAddr, ready: oneshot::Sender<SocketAddr>) -> Result<(), Error> {
    let builder = Server::try_bind(&addr).map_err(|source| {
      debug!("[MetricsExporter] Failed to start metrics server on {}: {}", addr, source);
      Error::Bind { addr, source }
    })?;

    let handle = self.handle;
    let make_service = make_service_fn(move |_conn| {
      let handle = handle.clone();
      async move { Ok::<_, Infallible>(service_fn(move |req| future::ready(Ok::<_, Infallible>(respond(&handle, &req))))) }
    });

    let server = builder.serve(make_service);
    let local_addr = server.local_addr();
    info!("[MetricsExporter] Listening on http://{}{}", local_addr, METRICS_PATH);
    // The receiver may be gone already; nobody is obliged to wait for readiness.
    let _ = ready.send(local_addr);

    server.await.map_err(|err| {
      debug!("[MetricsExporter] Metrics server stopped: {}", err);
      Error::Serve(err)
    })
  }
}

fn respond(handle: &PrometheusHandle, req: &Request<Body>) -> Response<Body> {
  trace!("[MetricsExporter] {} {}", req.method(), req.uri());
  if req.uri().path() != METRICS_PATH {
    return status_only(StatusCode::NOT_FOUND);
  }
  if req.method() != Method::GET {
    return status_only(StatusCode::METHOD_NOT_ALLOWED);
  }

  let mut response = Response::new(Body::from(handle.render()));
  response
    .headers_mut()
    .insert(CONTENT_TYPE, HeaderValue::from_static(EXPOSITION_CONTENT_TYPE));
  response
}

fn status_only(status: StatusCode) -> Response<Body> {
  let mut response = Response::new(Body::empty());
  *response.status_mut() = status;
  response
}

/// Running exporter. Holding it is optional: dropping it leaves the server running.
pub struct ExporterTask {
  ready: Option<oneshot::Receiver<SocketAddr>>,
  task: JoinHandle<Result<(), Error>>,
}

impl ExporterTask {
  /// Resolves with the bound address, or `None` if the server ended before it could listen.
  /// The failure itself is then reported by [`ExporterTask::finished`].
  #[allow(dead_code)]
  pub async fn listening(&mut self) -> Option<SocketAddr> {
    match self.ready.take() {
      Some(ready) => ready.await.ok(),
      None => None,
    }
  }

  /// Resolves when the server stops, which only happens on failure.
  pub async fn finished(self) -> Result<(), Error> {
    self.task.await?
  }
}

#[cfg(test)]
mod tests {
  use std::{net::TcpListener, sync::Mutex};

  use hyper::{body, Client, Uri};
  use log::{Level, LevelFilter, Log, Metadata, Record};
  use metrics_exporter_prometheus::PrometheusBuilder;

  use super::{error::ExporterError, *};

  fn loopback() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
  }

  async fn request(method: Method, addr: SocketAddr, path: &str) -> (StatusCode, Option<HeaderValue>, String) {
    let uri: Uri = format!("http://{addr}{path}").parse().unwrap();
    let req = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
    let response = Client::new().request(req).await.unwrap();
    let status = response.status();
    let content_type = response.headers().get(CONTENT_TYPE).cloned();
    let bytes = body::to_bytes(response.into_body()).await.unwrap();
    (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
  }

  #[test]
  fn default_address_is_fixed() {
    assert_eq!(metrics_address().to_string(), "0.0.0.0:9091");
  }

  #[tokio::test]
  async fn serves_recorded_metrics() {
    let recorder = PrometheusBuilder::new().build_recorder();
    metrics::with_local_recorder(&recorder, || {
      metrics::counter!("bot_updates_total").increment(3);
    });

    let mut task = MetricsExporter::new(recorder.handle()).start(loopback());
    let addr = task.listening().await.expect("exporter should be listening");
    let (status, content_type, body) = request(Method::GET, addr, METRICS_PATH).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.unwrap(), EXPOSITION_CONTENT_TYPE);
    assert!(body.contains("bot_updates_total 3"), "unexpected body: {body}");
  }

  #[tokio::test]
  async fn rejects_other_paths_and_methods() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let mut task = MetricsExporter::new(recorder.handle()).start(loopback());
    let addr = task.listening().await.unwrap();

    assert_eq!(request(Method::GET, addr, "/").await.0, StatusCode::NOT_FOUND);
    assert_eq!(request(Method::GET, addr, "/metrics/extra").await.0, StatusCode::NOT_FOUND);
    assert_eq!(request(Method::POST, addr, METRICS_PATH).await.0, StatusCode::METHOD_NOT_ALLOWED);
  }

  #[tokio::test]
  async fn start_does_not_wait_for_listener() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let mut task = MetricsExporter::new(recorder.handle()).start(loopback());

    // start() has already returned; readiness arrives later through the handle.
    assert!(task.ready.is_some());
    assert!(task.listening().await.is_some());
  }

  /// Keeps every record logged by the exporter.
  struct ExporterRecords(Mutex<Vec<(Level, String)>>);

  impl Log for ExporterRecords {
    fn enabled(&self, _: &Metadata) -> bool {
      true
    }

    fn log(&self, record: &Record) {
      let message = record.args().to_string();
      if message.starts_with("[MetricsExporter]") {
        self.0.lock().unwrap().push((record.level(), message));
      }
    }

    fn flush(&self) {}
  }

  static RECORDS: ExporterRecords = ExporterRecords(Mutex::new(Vec::new()));

  #[tokio::test]
  async fn bind_failure_is_left_to_the_caller_to_report() {
    let _ = log::set_logger(&RECORDS);
    log::set_max_level(LevelFilter::Trace);
    let occupied = TcpListener::bind(loopback()).unwrap();
    let addr = occupied.local_addr().unwrap();
    let recorder = PrometheusBuilder::new().build_recorder();

    let result = MetricsExporter::new(recorder.handle()).start(addr).finished().await;

    assert!(matches!(result, Err(ExporterError::Bind { .. })));
    let records = RECORDS.0.lock().unwrap();
    assert!(records.iter().any(|(_, msg)| msg.contains(&addr.to_string())));
    assert!(records.iter().all(|(level, _)| *level > Level::Error), "{records:?}");
  }

  #[tokio::test]
  async fn occupied_port_is_a_bind_error() {
    let occupied = TcpListener::bind(loopback()).unwrap();
    let addr = occupied.local_addr().unwrap();
    let recorder = PrometheusBuilder::new().build_recorder();

    let mut task = MetricsExporter::new(recorder.handle()).start(addr);

    assert!(task.listening().await.is_none());
    match task.finished().await {
      Err(ExporterError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
      other => panic!("expected bind error, got {other:?}"),
    }
  }
}

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use lazy_static::lazy_static;
use owo_colors::OwoColorize;
use prometheus::{
    HistogramTimer, HistogramVec, IntCounterVec, register_histogram_vec, register_int_counter_vec,
};
use std::convert::Infallible;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

lazy_static! {
    static ref RECONCILE_COUNTER: IntCounterVec = register_int_counter_vec!(
        "perftest_operator_reconciles_total",
        "Total number of reconciliations per controller and resource",
        &["controller", "name", "namespace"]
    )
    .unwrap();
    static ref ACTION_COUNTER: IntCounterVec = register_int_counter_vec!(
        "perftest_operator_actions_total",
        "Total number of write actions per controller and resource",
        &["controller", "name", "namespace", "action"]
    )
    .unwrap();
    static ref READ_HISTOGRAM: HistogramVec = register_histogram_vec!(
        "perftest_operator_read_phase_seconds",
        "Duration of the read phase of reconciliation",
        &["controller", "name", "namespace", "action"]
    )
    .unwrap();
    static ref WRITE_HISTOGRAM: HistogramVec = register_histogram_vec!(
        "perftest_operator_write_phase_seconds",
        "Duration of the write phase of reconciliation",
        &["controller", "name", "namespace", "action"]
    )
    .unwrap();
}

/// Handle onto the reconciliation metrics for a single controller.
pub struct ControllerMetrics {
    controller: String,
}

impl ControllerMetrics {
    pub fn new(controller: &str) -> Self {
        ControllerMetrics {
            controller: controller.to_string(),
        }
    }

    pub fn inc_reconciles(&self, name: &str, namespace: &str) {
        RECONCILE_COUNTER
            .with_label_values(&[&self.controller, name, namespace])
            .inc();
    }

    pub fn inc_action(&self, name: &str, namespace: &str, action: &str) {
        ACTION_COUNTER
            .with_label_values(&[&self.controller, name, namespace, action])
            .inc();
    }

    pub fn observe_read(&self, name: &str, namespace: &str, action: &str, seconds: f64) {
        READ_HISTOGRAM
            .with_label_values(&[&self.controller, name, namespace, action])
            .observe(seconds);
    }

    pub fn write_timer(&self, name: &str, namespace: &str, action: &str) -> HistogramTimer {
        WRITE_HISTOGRAM
            .with_label_values(&[&self.controller, name, namespace, action])
            .start_timer()
    }
}

async fn route(req: Request<hyper::body::Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/metrics" => {
            let metrics = prometheus::gather();
            let encoder = prometheus::TextEncoder::new();
            match encoder.encode_to_string(&metrics) {
                Ok(body) => Response::new(Full::new(Bytes::from(body))),
                Err(e) => {
                    eprintln!("{}", format!("failed to encode metrics: {e}").red());
                    Response::builder()
                        .status(StatusCode::INTERNAL_SERVER_ERROR)
                        .body(Full::new(Bytes::new()))
                        .unwrap()
                }
            }
        }
        "/healthz" => Response::new(Full::new(Bytes::from_static(b"ok"))),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new()))
            .unwrap(),
    };
    Ok(response)
}

/// Serves the Prometheus metrics and health endpoints until shutdown.
pub async fn serve(port: u16, shutdown: CancellationToken) {
    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("{}", format!("failed to bind metrics port {port}: {e}").red());
            return;
        }
    };
    println!(
        "{}",
        format!("📈 Serving metrics on 0.0.0.0:{port}").green()
    );
    loop {
        let stream = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    eprintln!("{}", format!("metrics accept error: {e}").red());
                    continue;
                }
            },
        };
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(route))
                .await
            {
                eprintln!("{}", format!("metrics connection error: {e}").red());
            }
        });
    }
}

use std::future::Future;
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::HOST;
use hyper::{Method, Request, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

use crate::catalog::RequestSpec;

type Client = HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>;
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a single call did not count as a success.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("creating HTTP request: {source}")]
    RequestConstruction {
        #[source]
        source: hyper::http::Error,
    },
    #[error("transport error: {source}")]
    Transport {
        #[source]
        source: BoxError,
    },
    #[error("response status code = {status}")]
    Http { status: StatusCode },
    #[error("no response within {after:?}")]
    Timeout { after: Duration },
}

impl CallError {
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::RequestConstruction { .. } => "request_construction",
            CallError::Transport { .. } => "transport",
            CallError::Http { .. } => "http",
            CallError::Timeout { .. } => "timeout",
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Success { latency: Duration },
    Failed(CallError),
}

/// Performs one call for a spec. Implementations must settle within their own
/// deadline and must not panic on request failures.
pub trait RequestExecutor: Send + Sync + 'static {
    fn execute(&self, spec: &RequestSpec) -> impl Future<Output = Outcome> + Send;
}

/// Immutable transport settings for a run.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub target: Uri,
    pub timeout: Duration,
    /// Sent as `Host` instead of the target's authority.
    pub host_header: Option<String>,
    /// Accept invalid certificates and hostnames.
    pub insecure: bool,
    pub log_success: bool,
    pub log_error: bool,
}

/// POSTs specs to the target over one pooled client shared by every call.
pub struct HttpExecutor {
    client: Client,
    settings: ExecutorSettings,
}

impl HttpExecutor {
    pub fn new(settings: ExecutorSettings) -> Result<Self, native_tls::Error> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        let https = if settings.insecure {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?;
            HttpsConnector::from((http, tokio_native_tls::TlsConnector::from(tls)))
        } else {
            HttpsConnector::new_with_connector(http)
        };
        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .build(https);

        Ok(HttpExecutor { client, settings })
    }

    fn build_request(&self, spec: &RequestSpec) -> Result<Request<Full<Bytes>>, hyper::http::Error> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(self.settings.target.clone());
        if let Some(host) = &self.settings.host_header {
            builder = builder.header(HOST, host.as_str());
        }
        builder.body(Full::new(spec.body().clone()))
    }

    /// Sends the request and returns the body of a 200 response unread.
    async fn call(&self, spec: &RequestSpec) -> Result<Incoming, CallError> {
        let request = self
            .build_request(spec)
            .map_err(|source| CallError::RequestConstruction { source })?;
        let response = self
            .client
            .request(request)
            .await
            .map_err(|source| CallError::Transport {
                source: Box::new(source),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(CallError::Http { status });
        }
        Ok(response.into_body())
    }

    /// Reads the body off the call's path, so its outcome is already settled.
    /// A finished read hands the connection back to the pool.
    fn drain_body(&self, spec: &RequestSpec, body: Incoming) {
        let log_success = self.settings.log_success;
        let limit = self.settings.timeout;
        let request_body = spec.body().clone();
        tokio::spawn(async move {
            let read = time::timeout(limit, body.collect()).await;
            if !log_success {
                return;
            }
            let request_body = String::from_utf8_lossy(&request_body);
            match read {
                Ok(Ok(collected)) => info!(
                    "[SUCCESS] \"{}\" >> \"{}\"",
                    request_body,
                    String::from_utf8_lossy(&collected.to_bytes())
                ),
                Ok(Err(err)) => warn!("\"{}\" >> could not read response body >> {}", request_body, err),
                Err(_) => warn!("\"{}\" >> response body not read within {:?}", request_body, limit),
            }
        });
    }
}

impl RequestExecutor for HttpExecutor {
    fn execute(&self, spec: &RequestSpec) -> impl Future<Output = Outcome> + Send {
        async move {
            let start = Instant::now();
            let timeout = self.settings.timeout;
            let result = match time::timeout(timeout, self.call(spec)).await {
                Ok(result) => result,
                Err(_) => Err(CallError::Timeout { after: timeout }),
            };

            match result {
                Ok(body) => {
                    let latency = start.elapsed();
                    self.drain_body(spec, body);
                    Outcome::Success { latency }
                }
                Err(err) => {
                    if self.settings.log_error {
                        error!(payload = spec.name(), kind = err.kind(), "{}", err);
                    }
                    Outcome::Failed(err)
                }
            }
        }
    }
}

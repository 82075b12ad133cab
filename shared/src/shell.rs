//! A headless shell: performs the core's effects with `reqwest` and the image
//! decoder and resolves them back into the [`Core`].
//!
//! Everything runs on the calling task. In-flight effects are polled through a
//! single [`FuturesUnordered`], so completions re-enter the core one at a time
//! in whatever order they finish. Must be driven inside a `tokio` runtime.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crux_core::{Core, Request};
use crux_http::protocol::{HttpRequest, HttpResponse, HttpResult};
use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tracing::{debug, instrument, warn};

use crate::app::App;
use crate::capabilities::http::MAX_TIMEOUT_MS;
use crate::capabilities::{Effect, HttpMethod, MeasureImages, OutboundRequest, TransportError};
use crate::config::AppConfig;
use crate::event::Event;
use crate::geometry::{resolve_all, DecodingProbe, ImageAspect, ImageProbe};
use crate::view::ViewModel;

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Performs `request`. Non-2xx answers are returned as responses, not
    /// errors.
    async fn execute(&self, request: OutboundRequest) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(MAX_TIMEOUT_MS))
            .build()
            .map_err(|e| TransportError::InvalidRequest {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn map_error(e: &reqwest::Error, request: &OutboundRequest) -> TransportError {
        let request_id = request.request_id().to_string();
        if e.is_timeout() {
            TransportError::Timeout {
                timeout_ms: MAX_TIMEOUT_MS,
                request_id,
            }
        } else if e.is_builder() {
            TransportError::InvalidRequest {
                reason: e.to_string(),
            }
        } else if e.is_body() || e.is_decode() {
            TransportError::InvalidResponse {
                reason: e.to_string(),
                request_id,
            }
        } else {
            TransportError::Connection {
                host: request.url().host().to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    #[instrument(
        skip_all,
        fields(
            method = %request.method(),
            path = request.url().path(),
            request_id = request.request_id()
        )
    )]
    async fn execute(&self, request: OutboundRequest) -> Result<HttpResponse, TransportError> {
        let started = Instant::now();
        let method = match request.method() {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, request.url().as_str());
        for (name, value) in request.headers().iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(&e, &request))?;

        let status = response.status().as_u16();
        let mut answer = HttpResponse::status(status);
        for (name, value) in response.headers() {
            match value.to_str() {
                Ok(value) => {
                    answer.header(name.as_str(), value);
                }
                Err(_) => debug!(header = name.as_str(), "skipping non-text response header"),
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(&e, &request))?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(status, duration_ms, bytes = body.len(), "response received");

        Ok(answer.body(body.to_vec()).build())
    }
}

/// A finished effect waiting to be resolved into the core.
enum Completion {
    Http(Request<HttpRequest>, HttpResult),
    Images(Request<MeasureImages>, Vec<ImageAspect>),
}

pub struct Shell {
    core: Core<Effect, App>,
    http: Arc<dyn HttpClient>,
    probe: Arc<dyn ImageProbe>,
    /// Per-request deadline, taken from the last configuration the core
    /// accepted.
    timeout: Duration,
    in_flight: FuturesUnordered<LocalBoxFuture<'static, Completion>>,
    renders: usize,
}

impl Shell {
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>, probe: Arc<dyn ImageProbe>) -> Self {
        Self {
            core: Core::new(),
            http,
            probe,
            timeout: AppConfig::default().request_timeout(),
            in_flight: FuturesUnordered::new(),
            renders: 0,
        }
    }

    /// A shell backed by `reqwest` and the header-only image decoder, with
    /// `config` applied.
    pub fn with_config(config: AppConfig) -> Result<Self, TransportError> {
        let mut shell = Self::new(
            Arc::new(ReqwestClient::new()?),
            Arc::new(DecodingProbe::default()),
        );
        shell.dispatch(Event::Configure(config));
        Ok(shell)
    }

    /// Runs `event` through the core and starts every effect it requested.
    #[instrument(skip_all, fields(event = event.name()))]
    pub fn dispatch(&mut self, event: Event) {
        if let Event::Configure(config) = &event {
            if config.validate().is_ok() {
                self.timeout = config.request_timeout();
            }
        }
        let effects = self.core.process_event(event);
        self.perform_all(effects);
    }

    fn perform_all(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.perform(effect);
        }
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::Render(_) => self.renders += 1,
            Effect::Http(request) => {
                let client = Arc::clone(&self.http);
                let timeout = self.timeout;
                self.in_flight.push(
                    async move {
                        let result = match OutboundRequest::try_from(&request.operation) {
                            Ok(outbound) => Self::send(client.as_ref(), outbound, timeout).await,
                            Err(e) => {
                                warn!(error = %e, "request could not be built");
                                Err(e)
                            }
                        };
                        let result = match result {
                            Ok(response) => HttpResult::Ok(response),
                            Err(e) => HttpResult::Err(e.into()),
                        };
                        Completion::Http(request, result)
                    }
                    .boxed_local(),
                );
            }
            Effect::Images(request) => {
                let probe = Arc::clone(&self.probe);
                self.in_flight.push(
                    async move {
                        let aspects =
                            resolve_all(probe.as_ref(), &request.operation.payloads).await;
                        Completion::Images(request, aspects)
                    }
                    .boxed_local(),
                );
            }
        }
    }

    async fn send(
        client: &dyn HttpClient,
        request: OutboundRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let request_id = request.request_id().to_string();
        match tokio::time::timeout(timeout, client.execute(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%request_id, timeout_ms, "request timed out");
                Err(TransportError::Timeout {
                    timeout_ms,
                    request_id,
                })
            }
        }
    }

    /// Waits for the next effect to finish and resolves it. Returns `false`
    /// once nothing is in flight.
    pub async fn step(&mut self) -> bool {
        let Some(completion) = self.in_flight.next().await else {
            return false;
        };
        let effects = match completion {
            Completion::Http(mut request, result) => self.core.resolve(&mut request, result),
            Completion::Images(mut request, aspects) => self.core.resolve(&mut request, aspects),
        };
        self.perform_all(effects);
        true
    }

    pub async fn run_until_idle(&mut self) {
        while self.step().await {}
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn view(&self) -> ViewModel {
        self.core.view()
    }

    #[must_use]
    pub const fn render_count(&self) -> usize {
        self.renders
    }
}

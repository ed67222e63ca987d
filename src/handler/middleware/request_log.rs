use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::CONTENT_LENGTH, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tracing::field::{Field, Visit};
use tracing::{info, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{format, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

pub const ACCESS_LOG_TARGET: &str = "http.access";

/// Renders `http.access` events as one pipe-separated line and falls back to
/// the default formatter for everything else.
#[derive(Clone)]
pub struct AccessLogEventFormat<T = SystemTime> {
    timer: T,
}

impl<T> AccessLogEventFormat<T>
where
    T: FormatTime,
{
    pub fn new(timer: T) -> Self {
        Self { timer }
    }
}

impl<T> Default for AccessLogEventFormat<T>
where
    T: FormatTime + Default,
{
    fn default() -> Self {
        Self {
            timer: T::default(),
        }
    }
}

#[derive(Default)]
struct AccessLogFields {
    method: Option<String>,
    status: Option<u16>,
    body_len: Option<String>,
    cost_ms: Option<f64>,
    uri: Option<String>,
    client_ip: Option<String>,
}

impl AccessLogFields {
    fn set_text(&mut self, field: &Field, value: String) {
        match field.name() {
            "method" => self.method = Some(value),
            "body_len" => self.body_len = Some(value),
            "uri" => self.uri = Some(value),
            "client_ip" => self.client_ip = Some(value),
            _ => {}
        }
    }

    fn line(&self) -> String {
        let text = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        format!(
            "{} | {} | {} | {} | {} | {}",
            text(&self.client_ip),
            text(&self.method),
            self.status
                .map(|status| status.to_string())
                .unwrap_or_else(|| "-".to_string()),
            text(&self.body_len),
            self.cost_ms
                .map(|cost| format!("{cost:.3}ms"))
                .unwrap_or_else(|| "-".to_string()),
            text(&self.uri),
        )
    }
}

impl Visit for AccessLogFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.set_text(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.set_text(field, format!("{value:?}").trim_matches('"').to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "status" {
            self.status = Some(value as u16);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == "status" {
            self.status = Some(value as u16);
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if field.name() == "cost_ms" {
            self.cost_ms = Some(value);
        }
    }
}

impl<S, N, T> FormatEvent<S, N> for AccessLogEventFormat<T>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
    T: FormatTime + Clone,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        if metadata.target() != ACCESS_LOG_TARGET {
            return format::Format::default()
                .with_timer(self.timer.clone())
                .with_target(true)
                .with_source_location(false)
                .format_event(ctx, writer, event);
        }

        let mut fields = AccessLogFields::default();
        event.record(&mut fields);
        self.timer.format_time(&mut writer)?;
        writeln!(
            writer,
            " {} {} | {}",
            metadata.level(),
            metadata.target(),
            fields.line()
        )
    }
}

pub(crate) fn should_skip_logging(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        if let Some(prefix) = pattern.strip_suffix('*') {
            path.starts_with(prefix)
        } else {
            path == pattern
        }
    })
}

/// The provider's webhooks usually arrive through a reverse proxy, so a
/// forwarded address wins over the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    for header in ["x-forwarded-for", "x-real-ip"] {
        if let Some(first) = headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return first.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Logs basic request metadata once the downstream handler returns.
pub async fn log_requests(
    State(skip_paths): State<Arc<Vec<String>>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let started_at = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().to_string();
    let request_path = req.uri().path().to_string();
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client_ip = client_ip(req.headers(), peer);

    let response = next.run(req).await;

    if should_skip_logging(&request_path, skip_paths.as_slice()) {
        return response;
    }

    let body_len = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| "-".to_string());
    let cost_ms = started_at.elapsed().as_secs_f64() * 1_000.0;
    info!(
        target: ACCESS_LOG_TARGET,
        method = method.as_str(),
        status = response.status().as_u16(),
        body_len = body_len.as_str(),
        cost_ms = cost_ms,
        uri = uri.as_str(),
        client_ip = client_ip.as_str(),
    );
    response
}

use axum::{extract::Request, middleware::Next, response::Response};
use http::HeaderValue;
use tower_http::trace::MakeSpan;
use tracing::{Level, Span};

pub const TRACE_ID: &str = "X-Trace-Id";

/// Request span tagged with the caller's trace id.
#[derive(Debug, Clone, Copy)]
pub struct MakeSpanWithTrace {
    level: Level,
}

impl MakeSpanWithTrace {
    pub fn new() -> Self {
        Self {
            level: Level::DEBUG,
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl Default for MakeSpanWithTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> MakeSpan<B> for MakeSpanWithTrace {
    fn make_span(&mut self, request: &http::Request<B>) -> Span {
        let trace_id = request
            .headers()
            .get(TRACE_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        // `tracing::span!` needs a constant level
        macro_rules! make_span {
            ($level:expr) => {
                tracing::span!(
                    $level,
                    "request",
                    trace_id = %trace_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            };
        }

        match self.level {
            Level::ERROR => make_span!(Level::ERROR),
            Level::WARN => make_span!(Level::WARN),
            Level::INFO => make_span!(Level::INFO),
            Level::DEBUG => make_span!(Level::DEBUG),
            Level::TRACE => make_span!(Level::TRACE),
        }
    }
}

/// Makes sure every request carries a trace id and echoes it back.
pub async fn trace_id(mut request: Request, next: Next) -> Response {
    let trace_header = match request.headers().get(TRACE_ID) {
        Some(v) => v.clone(),
        None => {
            let v = HeaderValue::from_str(
                &uuid::Uuid::new_v4().hyphenated().to_string(),
            )
            .unwrap_or_else(|_| HeaderValue::from_static("-"));
            request.headers_mut().insert(TRACE_ID, v.clone());
            v
        }
    };
    let mut response = next.run(request).await;
    response.headers_mut().insert(TRACE_ID, trace_header);
    response
}

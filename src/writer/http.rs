//! Line-protocol writer for InfluxDB v2 compatible `/api/v2/write` endpoints.

use std::fmt::Write as _;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::http::check_error;
use crate::model::Point;
use crate::target::PlatformId;

use super::{PointsWriter, WriteError};

const WRITE_PATH: &str = "api/v2/write";

/// Posts points as line protocol, one request per batch.
#[derive(Debug, Clone)]
pub struct HttpPointsWriter {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    timeout: Duration,
}

impl HttpPointsWriter {
    /// Create a writer for the service rooted at `base_url`.
    ///
    /// # Errors
    /// Returns `WriteError::Config` if the URL is not an absolute http(s) URL
    /// or the client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, WriteError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| WriteError::Config(format!("invalid writer url '{base_url}': {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(WriteError::Config(format!(
                "writer url must be http or https, got '{}'",
                base.scheme()
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join(WRITE_PATH)
            .map_err(|e| WriteError::Config(format!("invalid writer url '{base_url}': {e}")))?;

        let client = Client::builder()
            .user_agent(concat!("gather/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WriteError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            token: None,
            timeout,
        })
    }

    /// Authenticate writes with `Authorization: Token <token>`.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(
        &self,
        org_id: PlatformId,
        bucket_id: PlatformId,
        body: String,
    ) -> Result<(), WriteError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .query(&[
                ("org", org_id.to_string()),
                ("bucket", bucket_id.to_string()),
                ("precision", "ns".to_string()),
            ])
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .timeout(self.timeout)
            .body(body);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Token {token}"));
        }

        let response = request.send().await?;
        check_error(response).await?;
        Ok(())
    }
}

/// Render points as newline-terminated line protocol.
fn encode(points: &[Point]) -> String {
    let mut body = String::new();
    for point in points {
        // Writing to a String cannot fail.
        let _ = writeln!(body, "{point}");
    }
    body
}

#[async_trait::async_trait]
impl PointsWriter for HttpPointsWriter {
    async fn write_points(
        &self,
        cancel: &CancellationToken,
        org_id: PlatformId,
        bucket_id: PlatformId,
        points: Vec<Point>,
    ) -> Result<(), WriteError> {
        if points.is_empty() {
            return Ok(());
        }
        let body = encode(&points);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WriteError::Cancelled),
            result = self.post(org_id, bucket_id, body) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, RetryHint};
    use crate::model::{Metric, MetricType, MetricsSlice};
    use axum::Router;
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::routing::post;
    use chrono::DateTime;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Debug, Default)]
    struct Received {
        query: HashMap<String, String>,
        auth: Option<String>,
        body: String,
    }

    type Shared = Arc<Mutex<Vec<Received>>>;

    async fn record(
        State(shared): State<Shared>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        body: String,
    ) -> StatusCode {
        shared.lock().unwrap().push(Received {
            query,
            auth: headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body,
        });
        StatusCode::NO_CONTENT
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn points() -> Vec<Point> {
        let epoch = DateTime::from_timestamp(0, 0).unwrap();
        let metrics: MetricsSlice = vec![
            Metric::new("go_goroutines", MetricType::Gauge, epoch).with_field("gauge", 36.0),
        ]
        .into();
        metrics.points().points
    }

    fn ids() -> (PlatformId, PlatformId) {
        (
            "020f755c3c082000".parse().unwrap(),
            "020f755c3c082001".parse().unwrap(),
        )
    }

    #[test]
    fn test_endpoint_join() {
        let w = HttpPointsWriter::new("http://localhost:8086", Duration::from_secs(1)).unwrap();
        assert_eq!(w.endpoint().as_str(), "http://localhost:8086/api/v2/write");

        let w = HttpPointsWriter::new("http://proxy/influx", Duration::from_secs(1)).unwrap();
        assert_eq!(w.endpoint().as_str(), "http://proxy/influx/api/v2/write");
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            HttpPointsWriter::new("localhost:8086", Duration::from_secs(1)),
            Err(WriteError::Config(_))
        ));
        assert!(matches!(
            HttpPointsWriter::new("ftp://localhost", Duration::from_secs(1)),
            Err(WriteError::Config(_))
        ));
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode(&points()), "go_goroutines gauge=36 0\n");
    }

    #[test]
    fn test_encode_one_line_per_point() {
        let epoch = DateTime::from_timestamp(0, 0).unwrap();
        let metrics: MetricsSlice = vec![
            Metric::new("m", MetricType::Untyped, epoch)
                .with_tag("path", "C:\\")
                .with_field("value", 1.0),
            Metric::new("n", MetricType::Untyped, epoch)
                .with_tag("msg", "a\nb")
                .with_field("value", 2.0),
        ]
        .into();
        let body = encode(&metrics.points().points);
        assert_eq!(body.lines().count(), 2);
        assert_eq!(body, "m,path=C:\\\\ value=1 0\nn,msg=a\\nb value=2 0\n");
    }

    #[tokio::test]
    async fn test_write_posts_line_protocol() {
        let shared = Shared::default();
        let router = Router::new()
            .route("/api/v2/write", post(record))
            .with_state(shared.clone());
        let base = serve(router).await;
        let writer = HttpPointsWriter::new(&base, Duration::from_secs(5))
            .unwrap()
            .with_token("secret");
        let (org, bucket) = ids();

        writer
            .write_points(&CancellationToken::new(), org, bucket, points())
            .await
            .unwrap();

        let received = shared.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body, "go_goroutines gauge=36 0\n");
        assert_eq!(received[0].query["org"], "020f755c3c082000");
        assert_eq!(received[0].query["bucket"], "020f755c3c082001");
        assert_eq!(received[0].query["precision"], "ns");
        assert_eq!(received[0].auth.as_deref(), Some("Token secret"));
    }

    #[tokio::test]
    async fn test_write_empty_batch_skips_request() {
        let shared = Shared::default();
        let router = Router::new()
            .route("/api/v2/write", post(record))
            .with_state(shared.clone());
        let base = serve(router).await;
        let writer = HttpPointsWriter::new(&base, Duration::from_secs(5)).unwrap();
        let (org, bucket) = ids();

        writer
            .write_points(&CancellationToken::new(), org, bucket, Vec::new())
            .await
            .unwrap();
        assert!(shared.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_rate_limited() {
        let router = Router::new().route(
            "/api/v2/write",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [
                        (header::CONTENT_TYPE, "application/json"),
                        (header::RETRY_AFTER, "30"),
                    ],
                    r#"{"code":"too many requests","message":"write limit exceeded"}"#,
                )
            }),
        );
        let base = serve(router).await;
        let writer = HttpPointsWriter::new(&base, Duration::from_secs(5)).unwrap();
        let (org, bucket) = ids();

        let err = writer
            .write_points(&CancellationToken::new(), org, bucket, points())
            .await
            .unwrap_err();
        match &err {
            WriteError::Upstream(e) => assert_eq!(e.code(), ErrorCode::TooManyRequests),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_write_cancelled() {
        let writer = HttpPointsWriter::new("http://127.0.0.1:9", Duration::from_secs(5)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (org, bucket) = ids();

        let err = writer
            .write_points(&cancel, org, bucket, points())
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::Cancelled));
    }
}

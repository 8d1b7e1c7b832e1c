//! HTTP upload of a finished session.

use std::time::Duration;

use futures::future::join_all;
use photobooth_core::{CapturedShot, ImagePreprocessor};
use photobooth_protocol::{interpret_response, DataUri, UploadImage, UploadOutcome, UploadRequest, UPLOAD_PATH};
use tracing::{debug, info, warn};

/// Sends one session's shots to the remote store and classifies the reply.
#[derive(Clone)]
pub struct UploadPipeline {
    client: reqwest::Client,
    endpoint: String,
    preprocessor: ImagePreprocessor,
}

impl UploadPipeline {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), UPLOAD_PATH),
            preprocessor: ImagePreprocessor::default(),
        })
    }

    pub fn with_preprocessor(mut self, preprocessor: ImagePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Downscale every shot concurrently. Output order matches `shots`.
    pub async fn preprocess(&self, shots: &[CapturedShot]) -> Vec<Vec<u8>> {
        let tasks = shots.iter().map(|shot| {
            let data = shot.image_data.clone();
            let preprocessor = self.preprocessor;
            async move {
                let original = data.clone();
                match tokio::task::spawn_blocking(move || preprocessor.resize(&data)).await {
                    Ok(resized) => resized,
                    Err(e) => {
                        warn!("Preprocessing task failed, sending original image: {e}");
                        original
                    }
                }
            }
        });
        join_all(tasks).await
    }

    pub fn build_request(shots: &[CapturedShot], images: Vec<Vec<u8>>) -> UploadRequest {
        UploadRequest {
            images: shots
                .iter()
                .zip(images)
                .map(|(shot, data)| UploadImage {
                    src: DataUri::jpeg(data).encode(),
                    filter: shot.filter_name.clone(),
                })
                .collect(),
        }
    }

    /// Run the whole pipeline. Every failure resolves to an outcome.
    pub async fn upload(&self, shots: &[CapturedShot]) -> UploadOutcome {
        let images = self.preprocess(shots).await;
        let request = Self::build_request(shots, images);
        let count = request.images.len();

        info!("Uploading {} images to {}", count, self.endpoint);
        let response = match self.client.post(&self.endpoint).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Upload request failed: {e}");
                return UploadOutcome::transport(describe_transport_error(&e));
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to read upload response body: {e}");
                return UploadOutcome::transport(describe_transport_error(&e));
            }
        };
        debug!("Upload response HTTP {} ({} bytes)", status, body.len());

        let outcome = interpret_response(status, &body, count);
        match outcome.error_message() {
            None => info!("Upload succeeded, {}/{} images stored", outcome.uploaded_count(), count),
            Some(message) => warn!("Upload failed: {message}"),
        }
        outcome
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("Upload timed out: {e}")
    } else if e.is_connect() {
        format!("Could not reach upload server: {e}")
    } else {
        format!("Network error: {e}")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use photobooth_core::{FilterCatalog, Frame, FrameCompositor};
    use photobooth_protocol::UploadError;

    /// Per-test mock of the remote store.
    pub(crate) struct MockStore {
        pub base_url: String,
        pub requests: Arc<AtomicUsize>,
        pub images: Arc<AtomicUsize>,
    }

    pub(crate) async fn mock_store(status: StatusCode, body: &'static str, delay: Duration) -> MockStore {
        let requests = Arc::new(AtomicUsize::new(0));
        let images = Arc::new(AtomicUsize::new(0));
        let (req_counter, img_counter) = (requests.clone(), images.clone());

        let app = Router::new().route(
            "/api/upload",
            post(move |Json(request): Json<UploadRequest>| {
                let req_counter = req_counter.clone();
                let img_counter = img_counter.clone();
                async move {
                    req_counter.fetch_add(1, Ordering::SeqCst);
                    let well_formed = request
                        .images
                        .iter()
                        .filter(|i| i.src.starts_with("data:image/jpeg;base64,"))
                        .count();
                    img_counter.store(well_formed, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    (status, body)
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockStore {
            base_url: format!("http://{addr}"),
            requests,
            images,
        }
    }

    pub(crate) fn sample_shots(n: usize) -> Vec<CapturedShot> {
        let compositor = FrameCompositor::new();
        let catalog = FilterCatalog::new();
        catalog
            .all()
            .iter()
            .take(n)
            .map(|filter| compositor.render(&Frame::solid(40, 30, [200, 100, 50]), filter).unwrap())
            .collect()
    }

    fn pipeline(base_url: &str) -> UploadPipeline {
        UploadPipeline::new(base_url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_joins_path() {
        let p = pipeline("http://store.local/");
        assert_eq!(p.endpoint(), "http://store.local/api/upload");
    }

    #[tokio::test]
    async fn test_preprocess_preserves_order() {
        let shots = sample_shots(3);
        let p = pipeline("http://store.local").with_preprocessor(ImagePreprocessor::new(20, 70));

        let images = p.preprocess(&shots).await;
        assert_eq!(images.len(), 3);
        for data in &images {
            let decoded = image::load_from_memory(data).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (20, 15));
        }

        let request = UploadPipeline::build_request(&shots, images);
        let filters: Vec<_> = request.images.iter().map(|i| i.filter.as_str()).collect();
        assert_eq!(filters, vec!["90s", "2000s", "Noir"]);
    }

    #[tokio::test]
    async fn test_success_response() {
        let store = mock_store(
            StatusCode::OK,
            r#"{"success":true,"results":[{"url":"a","uploaded":true}]}"#,
            Duration::ZERO,
        )
        .await;

        let outcome = pipeline(&store.base_url).upload(&sample_shots(1)).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.results[0].url.as_deref(), Some("a"));
        assert_eq!(store.requests.load(Ordering::SeqCst), 1);
        assert_eq!(store.images.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_message() {
        let store = mock_store(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"disk full"}"#, Duration::ZERO).await;

        let outcome = pipeline(&store.base_url).upload(&sample_shots(3)).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error_message().as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn test_bad_gateway_empty_body() {
        let store = mock_store(StatusCode::BAD_GATEWAY, "", Duration::ZERO).await;

        let outcome = pipeline(&store.base_url).upload(&sample_shots(2)).await;
        assert!(!outcome.succeeded);
        assert!(outcome.error_message().unwrap().contains("502"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = pipeline(&format!("http://{addr}")).upload(&sample_shots(1)).await;
        assert!(!outcome.succeeded);
        assert!(matches!(outcome.error, Some(UploadError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let store = mock_store(StatusCode::OK, r#"{"success":true}"#, Duration::from_secs(5)).await;
        let p = UploadPipeline::new(&store.base_url, Duration::from_millis(200)).unwrap();

        let outcome = p.upload(&sample_shots(1)).await;
        match outcome.error {
            Some(UploadError::Transport { message }) => assert!(message.contains("timed out"), "{message}"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use files_core::upload::ABORTED_STATUS;
use files_core::{FilesClient, UploadTarget};
use futures_util::{StreamExt, stream};
use reqwest::Client;
use reqwest::header::{COOKIE, InvalidHeaderValue};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use super::file::{FileSource, UploadFile};

const MEMORY_CHUNK: usize = 64 * 1024;

/// Progress callback: bytes sent so far and the total payload size.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub upload_id: String,
    pub file: UploadFile,
    pub target: UploadTarget,
}

/// Terminal result of one transfer. `status` is the HTTP status, or
/// [`ABORTED_STATUS`] when the transfer never got an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub status: u16,
    pub body: String,
}

impl TransferOutcome {
    pub fn aborted() -> Self {
        Self {
            status: ABORTED_STATUS,
            body: String::new(),
        }
    }
}

/// Moves one payload to the upload endpoint. Implementations must resolve as
/// soon as `cancel` fires and report progress through `progress`.
pub trait UploadTransport: Send + Sync + 'static {
    fn send(
        &self,
        request: TransferRequest,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> impl Future<Output = TransferOutcome> + Send;
}

#[derive(Clone)]
pub struct HttpUploadTransport {
    http: Client,
    base_url: Url,
    auth_cookie: Option<String>,
}

impl HttpUploadTransport {
    pub fn new(http: Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            auth_cookie: None,
        }
    }

    pub fn from_client(client: &FilesClient) -> Self {
        Self {
            http: client.http().clone(),
            base_url: client.base_url().clone(),
            auth_cookie: client.auth_cookie(),
        }
    }

    pub fn with_auth_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.auth_cookie = Some(cookie.into());
        self
    }

    async fn perform(
        &self,
        request: TransferRequest,
        progress: ProgressFn,
    ) -> Result<TransferOutcome, TransferError> {
        let url = self.base_url.join(request.target.path())?;
        let headers = request.target.headers(&request.file.name)?;
        let total = request.file.size;
        let sent = Arc::new(AtomicU64::new(0));
        let report = move |len: usize| {
            let so_far = sent.fetch_add(len as u64, Ordering::Relaxed) + len as u64;
            progress(so_far, total);
        };

        let body = match &request.file.source {
            FileSource::Path(path) => {
                let file = tokio::fs::File::open(path).await?;
                let stream = ReaderStream::new(file).inspect(move |chunk| {
                    if let Ok(chunk) = chunk {
                        report(chunk.len());
                    }
                });
                reqwest::Body::wrap_stream(stream)
            }
            FileSource::Memory(data) => {
                let chunks: Vec<Result<Vec<u8>, io::Error>> =
                    data.chunks(MEMORY_CHUNK).map(|chunk| Ok(chunk.to_vec())).collect();
                let stream = stream::iter(chunks).inspect(move |chunk| {
                    if let Ok(chunk) = chunk {
                        report(chunk.len());
                    }
                });
                reqwest::Body::wrap_stream(stream)
            }
        };

        let mut builder = self.http.post(url).headers(headers).body(body);
        if let Some(cookie) = &self.auth_cookie {
            builder = builder.header(COOKIE, cookie);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(TransferOutcome { status, body })
    }
}

impl UploadTransport for HttpUploadTransport {
    async fn send(
        &self,
        request: TransferRequest,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> TransferOutcome {
        let upload_id = request.upload_id.clone();
        tokio::select! {
            _ = cancel.cancelled() => TransferOutcome::aborted(),
            result = self.perform(request, progress) => match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    // Surfaces like a dropped connection: no HTTP status.
                    warn!(upload_id, error = %err, "upload transfer failed");
                    TransferOutcome::aborted()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn recorder() -> (ProgressFn, Arc<Mutex<Vec<(u64, u64)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress: ProgressFn =
            Arc::new(move |sent, total| sink.lock().unwrap().push((sent, total)));
        (progress, seen)
    }

    fn transport(server: &MockServer) -> HttpUploadTransport {
        HttpUploadTransport::new(Client::new(), Url::parse(&server.uri()).unwrap())
            .with_auth_cookie("ZM_AUTH_TOKEN=secret")
    }

    #[tokio::test]
    async fn posts_file_with_encoded_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/files/upload"))
            .and(header("filename", "cmVwb3J0LnR4dA=="))
            .and(header("parentid", "LOCAL_ROOT"))
            .and(header("cookie", "ZM_AUTH_TOKEN=secret"))
            .and(body_bytes(b"hello".to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"nodeId":"n1"}"#))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let source = dir.path().join("report.txt");
        std::fs::write(&source, b"hello").unwrap();
        let file = UploadFile::from_path(&source).await.unwrap();
        let (progress, seen) = recorder();

        let outcome = transport(&server)
            .send(
                TransferRequest {
                    upload_id: "u1".into(),
                    file,
                    target: UploadTarget::NewFile {
                        parent_id: "LOCAL_ROOT".into(),
                    },
                },
                progress,
                CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body, r#"{"nodeId":"n1"}"#);
        assert_eq!(seen.lock().unwrap().last(), Some(&(5, 5)));
    }

    #[tokio::test]
    async fn version_upload_sends_node_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/files/upload-version"))
            .and(header("nodeid", "n1"))
            .and(header("overwriteversion", "true"))
            .respond_with(ResponseTemplate::new(413))
            .mount(&server)
            .await;

        let (progress, _) = recorder();
        let outcome = transport(&server)
            .send(
                TransferRequest {
                    upload_id: "u1".into(),
                    file: UploadFile::from_bytes("a.txt", "text/plain", b"abc".to_vec()),
                    target: UploadTarget::Version {
                        node_id: "n1".into(),
                        overwrite: true,
                    },
                },
                progress,
                CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.status, 413);
    }

    #[tokio::test]
    async fn cancellation_reports_aborted_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let (progress, _) = recorder();
        let outcome = transport(&server)
            .send(
                TransferRequest {
                    upload_id: "u1".into(),
                    file: UploadFile::from_bytes("a.txt", "text/plain", b"abc".to_vec()),
                    target: UploadTarget::NewFile {
                        parent_id: "p".into(),
                    },
                },
                progress,
                cancel,
            )
            .await;

        assert_eq!(outcome, TransferOutcome::aborted());
    }

    #[tokio::test]
    async fn unreadable_source_is_reported_as_aborted() {
        let (progress, _) = recorder();
        let unreachable = Url::parse("http://127.0.0.1:9").unwrap();
        let transport = HttpUploadTransport::new(Client::new(), unreachable);
        let file = UploadFile {
            name: "gone.txt".into(),
            mime_type: "text/plain".into(),
            size: 1,
            source: FileSource::Path("/nonexistent/gone.txt".into()),
        };
        let outcome = transport
            .send(
                TransferRequest {
                    upload_id: "u1".into(),
                    file,
                    target: UploadTarget::NewFile {
                        parent_id: "p".into(),
                    },
                },
                progress,
                CancellationToken::new(),
            )
            .await;
        assert_eq!(outcome.status, ABORTED_STATUS);
    }
}

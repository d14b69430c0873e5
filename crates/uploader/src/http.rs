//! HttpTransport - multipart upload over reqwest

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use contracts::UploadSettings;
use reqwest::header::RANGE;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, ReadBuf};
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

use crate::endpoint::Endpoint;
use crate::error::{TransportError, UploadError};
use crate::transport::{Delivered, ProgressFn, SegmentUpload, UploadTransport};

/// Connect and overall timeout of the reachability probe
pub const PING_TIMEOUT: Duration = Duration::from_secs(3);

/// `POST {base}/upload` with multipart fields `file`, `fileName`, `fileSize`, `uploadedBytes`
pub struct HttpTransport {
    client: Client,
    probe: Client,
}

impl HttpTransport {
    pub fn new(settings: &UploadSettings) -> Result<Self, UploadError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .build()
            .map_err(UploadError::Client)?;
        let probe = Client::builder()
            .connect_timeout(PING_TIMEOUT)
            .timeout(PING_TIMEOUT)
            .build()
            .map_err(UploadError::Client)?;
        Ok(Self { client, probe })
    }
}

impl UploadTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(
        name = "http_transport_send",
        skip(self, endpoint, upload, progress),
        fields(segment = %upload.file_name, offset = upload.offset, size = upload.size)
    )]
    async fn send(
        &self,
        endpoint: &Endpoint,
        upload: &SegmentUpload,
        progress: ProgressFn,
    ) -> Result<Delivered, TransportError> {
        let mut file = File::open(&upload.path).await.map_err(|e| {
            TransportError::fatal(format!("cannot open {}: {e}", upload.path.display()))
        })?;
        if upload.offset > 0 {
            file.seek(SeekFrom::Start(upload.offset))
                .await
                .map_err(|e| TransportError::fatal(format!("cannot seek: {e}")))?;
        }

        let remaining = upload.remaining();
        let reader = CountingReader {
            inner: file.take(remaining),
            sent: 0,
            progress,
        };

        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(reader)), remaining)
            .file_name(upload.file_name.clone())
            .mime_str("application/octet-stream")
            .map_err(|e| TransportError::fatal(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("fileName", upload.file_name.clone())
            .text("fileSize", upload.size.to_string())
            .text("uploadedBytes", upload.offset.to_string());

        let mut request = self.client.post(endpoint.upload_url()).multipart(form);
        if upload.offset > 0 && upload.size > 0 {
            request = request.header(
                RANGE,
                format!("bytes={}-{}", upload.offset, upload.size - 1),
            );
        }

        // The multipart protocol has no partial acknowledgment: a failed
        // request leaves the server-side offset where it was
        let response = request.send().await.map_err(|e| classify_error(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| classify_error(&e))?;

        debug!(status = status.as_u16(), "Upload response");
        if status.is_success() {
            Ok(Delivered {
                status: status.as_u16(),
                confirmation: body,
            })
        } else {
            Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    #[instrument(name = "http_transport_ping", skip(self))]
    async fn ping(&self, endpoint: &Endpoint) -> Result<String, TransportError> {
        let response = self
            .probe
            .get(endpoint.ping_url())
            .send()
            .await
            .map_err(|e| classify_error(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| classify_error(&e))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Map a reqwest failure onto the retry taxonomy
fn classify_error(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout { delivered: 0 }
    } else if is_truncation(e) {
        TransportError::Truncated
    } else if e.is_connect() {
        TransportError::Connect {
            message: e.to_string(),
            delivered: 0,
        }
    } else if e.is_builder() || e.is_redirect() {
        TransportError::fatal(e.to_string())
    } else {
        TransportError::io(e.to_string(), 0)
    }
}

fn is_truncation(e: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(e);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            if io.kind() == io::ErrorKind::UnexpectedEof {
                return true;
            }
        }
        let message = err.to_string();
        if message.contains("unexpected end") || message.contains("before message completed") {
            return true;
        }
        source = err.source();
    }
    false
}

/// Reports bytes read into the request body as progress
struct CountingReader<R> {
    inner: R,
    sent: u64,
    progress: ProgressFn,
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let polled = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = polled {
            let n = (buf.filled().len() - before) as u64;
            if n > 0 {
                this.sent += n;
                (this.progress)(this.sent);
            }
        }
        polled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::AttemptOutcome;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    async fn read_request(stream: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(head_end) = find(&buf, b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
            let content_length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok());
            match content_length {
                Some(len) if buf.len() >= head_end + 4 + len => break,
                Some(_) => continue,
                None if head.contains("transfer-encoding: chunked") => {
                    if buf.ends_with(b"0\r\n\r\n") {
                        break;
                    }
                }
                None => break,
            }
        }
        buf
    }

    /// Accept one connection, answer with `status` and `body`, return the raw request
    async fn serve_once(status: &'static str, body: &'static str) -> (Endpoint, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (Endpoint::from_host_port("127.0.0.1", port as u32).unwrap(), server)
    }

    fn segment(dir: &std::path::Path, offset: u64) -> SegmentUpload {
        let path = dir.join("alice_sensor_data_20240101_000000_000.jsonl");
        std::fs::write(&path, b"0123456789").unwrap();
        SegmentUpload {
            path,
            file_name: "alice_sensor_data_20240101_000000_000.jsonl".to_string(),
            offset,
            size: 10,
        }
    }

    fn progress_recorder() -> (ProgressFn, Arc<AtomicU64>) {
        let seen = Arc::new(AtomicU64::new(0));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |sent| sink.store(sent, Ordering::Relaxed));
        (progress, seen)
    }

    #[tokio::test]
    async fn test_full_upload_sends_multipart_fields() {
        let dir = tempfile::tempdir().unwrap();
        let (endpoint, server) = serve_once("200 OK", "stored").await;
        let transport = HttpTransport::new(&UploadSettings::default()).unwrap();
        let (progress, seen) = progress_recorder();

        let delivered = transport
            .send(&endpoint, &segment(dir.path(), 0), progress)
            .await
            .unwrap();
        assert_eq!(delivered.status, 200);
        assert_eq!(delivered.confirmation, "stored");
        assert_eq!(seen.load(Ordering::Relaxed), 10);

        let request = server.await.unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /upload"));
        assert!(request.contains("name=\"fileName\""));
        assert!(request.contains("name=\"fileSize\"\r\n\r\n10"));
        assert!(request.contains("name=\"uploadedBytes\"\r\n\r\n0"));
        assert!(request.contains("0123456789"));
        assert!(!lower.contains("\r\nrange:"));
    }

    #[tokio::test]
    async fn test_resumed_upload_sends_tail_with_range() {
        let dir = tempfile::tempdir().unwrap();
        let (endpoint, server) = serve_once("200 OK", "ok").await;
        let transport = HttpTransport::new(&UploadSettings::default()).unwrap();
        let (progress, seen) = progress_recorder();

        transport
            .send(&endpoint, &segment(dir.path(), 4), progress)
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 6);

        let request = server.await.unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(lower.contains("\r\nrange: bytes=4-9\r\n"));
        assert!(request.contains("name=\"uploadedBytes\"\r\n\r\n4"));
        assert!(request.contains("456789"));
        assert!(!request.contains("0123456789"));
    }

    #[tokio::test]
    async fn test_server_error_is_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let (endpoint, server) = serve_once("500 Internal Server Error", "boom").await;
        let transport = HttpTransport::new(&UploadSettings::default()).unwrap();
        let (progress, _) = progress_recorder();

        let result = transport
            .send(&endpoint, &segment(dir.path(), 0), progress)
            .await;
        assert!(matches!(
            result,
            Err(TransportError::Rejected { status: 500, .. })
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connection_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Endpoint::from_host_port("127.0.0.1", port as u32).unwrap();
        let transport = HttpTransport::new(&UploadSettings::default()).unwrap();
        let (progress, _) = progress_recorder();

        let result = transport
            .send(&endpoint, &segment(dir.path(), 0), progress)
            .await;
        assert!(matches!(
            AttemptOutcome::classify(result),
            AttemptOutcome::Retryable { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::from_host_port("127.0.0.1", 9).unwrap();
        let transport = HttpTransport::new(&UploadSettings::default()).unwrap();
        let (progress, _) = progress_recorder();
        let upload = SegmentUpload {
            path: dir.path().join("missing.jsonl"),
            file_name: "missing.jsonl".to_string(),
            offset: 0,
            size: 10,
        };

        let result = transport.send(&endpoint, &upload, progress).await;
        assert!(matches!(result, Err(TransportError::Fatal(_))));
    }

    fn short_timeout() -> UploadSettings {
        UploadSettings {
            request_timeout_secs: 1,
            max_retries: 1,
            retry_delay_ms: 1,
            ..UploadSettings::default()
        }
    }

    #[tokio::test]
    async fn test_unanswered_body_reports_nothing_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            // Hold the connection open without answering
            tokio::time::sleep(Duration::from_secs(3)).await;
            request.len()
        });

        let endpoint = Endpoint::from_host_port("127.0.0.1", port as u32).unwrap();
        let transport = HttpTransport::new(&short_timeout()).unwrap();
        let (progress, seen) = progress_recorder();

        let result = transport
            .send(&endpoint, &segment(dir.path(), 0), progress)
            .await;
        assert!(matches!(result, Err(TransportError::Timeout { delivered: 0 })));
        // The body went out even though none of it counts as delivered
        assert_eq!(seen.load(Ordering::Relaxed), 10);
        assert!(server.await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_retry_after_unanswered_body_resends_whole_segment() {
        use crate::coordinator::UploadCoordinator;
        use crate::outcome::NoopObserver;
        use contracts::DeleteOnRelease;

        let dir = tempfile::tempdir().unwrap();
        let path = segment(dir.path(), 0).path;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut silent, _) = listener.accept().await.unwrap();
            read_request(&mut silent).await;

            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                .await
                .unwrap();
            stream.shutdown().await.ok();
            drop(silent);
            String::from_utf8_lossy(&request).to_string()
        });

        let settings = short_timeout();
        let coordinator = UploadCoordinator::new(
            HttpTransport::new(&settings).unwrap(),
            settings,
            Arc::new(DeleteOnRelease),
        );
        let endpoint = Endpoint::from_host_port("127.0.0.1", port as u32).unwrap();
        let outcome = coordinator
            .upload_batch(vec![path.clone()], endpoint, Arc::new(NoopObserver))
            .unwrap()
            .join()
            .await
            .unwrap();

        assert_eq!(outcome.success_count, 1);
        assert!(!path.exists());

        let retry = server.await.unwrap();
        let lower = retry.to_ascii_lowercase();
        assert!(retry.contains("name=\"uploadedBytes\"\r\n\r\n0"));
        assert!(retry.contains("0123456789"));
        assert!(!lower.contains("\r\nrange:"));
    }

    #[tokio::test]
    async fn test_ping() {
        let (endpoint, server) = serve_once("200 OK", "pong").await;
        let transport = HttpTransport::new(&UploadSettings::default()).unwrap();

        assert_eq!(transport.ping(&endpoint).await.unwrap(), "pong");
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /ping"));
    }
}

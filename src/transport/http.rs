//! HTTP transport on reqwest

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::bytes::Bytes;
use tokio_util::io::ReaderStream;

use super::{TRANSPORT_EVENT_BUFFER, Transport, TransportEvent, TransportOperation};
use crate::error::{Error, Result};
use crate::request::{RequestBody, UploadRequest};
use crate::types::{FileData, RawFile, UploadResponse};

/// Size of the chunks in-memory files are streamed in
const CHUNK_SIZE: usize = 64 * 1024;

/// Uploads over HTTP(S) with `reqwest`
///
/// The file is streamed through a counting wrapper, so progress reflects bytes
/// handed to the connection. Multipart bodies carry the extra form fields as text
/// parts followed by the file part.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Transport with a default client
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    /// Transport around an existing client (shared pools, proxies, TLS settings)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: UploadRequest) -> Result<TransportOperation> {
        let (tx, abort, operation) = TransportOperation::channel(TRANSPORT_EVENT_BUFFER);
        let client = self.client.clone();

        tokio::spawn(async move {
            let url = request.url.clone();
            let result = tokio::select! {
                _ = abort.cancelled() => {
                    tracing::debug!(url = %url, "HTTP upload aborted");
                    return;
                }
                result = send(client, request, tx.clone()) => result,
            };

            let event = match result {
                Ok(response) => TransportEvent::Complete(response),
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "HTTP upload failed without a response");
                    TransportEvent::Error(e.to_string())
                }
            };
            // receiver gone means the session stopped listening
            tx.send(event).await.ok();
        });

        Ok(operation)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

async fn send(
    client: reqwest::Client,
    request: UploadRequest,
    events: mpsc::Sender<TransportEvent>,
) -> Result<UploadResponse> {
    let UploadRequest {
        method,
        url,
        headers,
        body,
    } = request;

    tracing::debug!(method = method.as_str(), url = %url, "sending upload request");
    let mut builder = client.request(method.into(), &url);
    for (name, value) in &headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder = match body {
        RequestBody::Multipart {
            fields,
            file_field,
            file,
        } => {
            let mut form = reqwest::multipart::Form::new();
            for (name, value) in fields {
                form = form.text(name, value);
            }
            let size = file.size;
            let mut part = reqwest::multipart::Part::stream_with_length(
                file_body(&file, events).await?,
                size,
            )
            .file_name(file.name.clone());
            if !file.mime_type.is_empty() {
                part = part.mime_str(&file.mime_type)?;
            }
            builder.multipart(form.part(file_field, part))
        }
        RequestBody::Raw(file) => {
            let has_content_type = headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case("content-type"));
            if !has_content_type && !file.mime_type.is_empty() {
                builder = builder.header(reqwest::header::CONTENT_TYPE, file.mime_type.as_str());
            }
            builder
                .header(reqwest::header::CONTENT_LENGTH, file.size)
                .body(file_body(&file, events).await?)
        }
    };

    let response = builder.send().await?;
    let status_code = response.status().as_u16();
    let body = response.text().await?;

    Ok(UploadResponse { status_code, body })
}

/// Stream the file's bytes, reporting progress as chunks are pulled
async fn file_body(file: &RawFile, events: mpsc::Sender<TransportEvent>) -> Result<reqwest::Body> {
    let total = file.size;
    match &file.data {
        FileData::Memory(bytes) => {
            let chunks: Vec<std::io::Result<Bytes>> = chunk_bytes(bytes)
                .into_iter()
                .map(Ok)
                .collect();
            Ok(counting_body(stream::iter(chunks), total, events))
        }
        FileData::Path(path) => {
            let handle = tokio::fs::File::open(path).await.map_err(Error::Io)?;
            Ok(counting_body(ReaderStream::new(handle), total, events))
        }
    }
}

fn chunk_bytes(bytes: &Bytes) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(bytes.len() / CHUNK_SIZE + 1);
    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + CHUNK_SIZE).min(bytes.len());
        chunks.push(bytes.slice(offset..end));
        offset = end;
    }
    chunks
}

fn counting_body<S>(chunks: S, total: u64, events: mpsc::Sender<TransportEvent>) -> reqwest::Body
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static,
{
    let mut loaded = 0u64;
    let counted = chunks.map(move |chunk| {
        if let Ok(bytes) = &chunk {
            loaded += bytes.len() as u64;
            // progress is lossy under backpressure; completion is never dropped
            events
                .try_send(TransportEvent::Progress {
                    loaded,
                    total: Some(total),
                })
                .ok();
        }
        chunk
    });
    reqwest::Body::wrap_stream(counted)
}

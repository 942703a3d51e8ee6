// Chunked event streaming utilities
use crate::application::dashboard_service::DashboardEvent;
use crate::infrastructure::http_response::brotli_compress;
use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::Stream;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// Create a chunked response with one JSON event per chunk
pub fn chunked_event_stream<S>(stream: S, compress: bool) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = DashboardEvent> + Send + 'static,
{
    let byte_stream = stream.then(move |event| async move { serialize_chunk(event, compress).await });

    let body = Body::from_stream(byte_stream);

    // Chunks are compressed individually, so there is no Content-Encoding
    // header; a client decoding the whole body would break the framing.
    let content_type = if compress {
        "application/x-dashboard-events"
    } else {
        "application/x-ndjson"
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::TRANSFER_ENCODING, "chunked")
        .body(body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Plain chunks are a JSON line. Compressed chunks are a 4-byte big-endian
/// length followed by the Brotli-compressed JSON.
async fn serialize_chunk(event: DashboardEvent, compress: bool) -> Result<Bytes, std::io::Error> {
    let mut json = serde_json::to_vec(&event).map_err(std::io::Error::other)?;

    if !compress {
        json.push(b'\n');
        return Ok(Bytes::from(json));
    }

    let payload = brotli_compress(&json).await?;
    let mut chunk = BytesMut::with_capacity(4 + payload.len());
    chunk.put_u32(payload.len() as u32);
    chunk.put_slice(&payload);

    Ok(chunk.freeze())
}

/// Lagging subscribers drop the events they missed and keep streaming.
pub fn event_stream(
    rx: broadcast::Receiver<DashboardEvent>,
) -> impl Stream<Item = DashboardEvent> + Send + 'static {
    BroadcastStream::new(rx).filter_map(|item| async move {
        match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!("Event subscriber lagged, skipped {} events", skipped);
                None
            }
        }
    })
}

/// Helper to create a streaming response from a subscription
pub fn stream_from_receiver(
    rx: broadcast::Receiver<DashboardEvent>,
    compress: bool,
) -> impl IntoResponse {
    match chunked_event_stream(event_stream(rx), compress) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::tokio::bufread::BrotliDecoder;
    use bytes::Buf;
    use tokio::io::AsyncReadExt;

    fn event() -> DashboardEvent {
        DashboardEvent::QueryFailed {
            device_id: "A".to_string(),
            property_id: "temp".to_string(),
            reason: "offline".to_string(),
        }
    }

    #[tokio::test]
    async fn test_plain_chunk_is_a_json_line() {
        let chunk = serialize_chunk(event(), false).await.unwrap();
        let text = std::str::from_utf8(&chunk).unwrap();
        assert!(text.ends_with('\n'));

        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["type"], "queryFailed");
        assert_eq!(value["device_id"], "A");
    }

    #[tokio::test]
    async fn test_compressed_chunk_is_length_prefixed() {
        let mut chunk = serialize_chunk(event(), true).await.unwrap();
        let length = chunk.get_u32() as usize;
        assert_eq!(length, chunk.len());

        let mut decoder = BrotliDecoder::new(&chunk[..]);
        let mut json = String::new();
        decoder.read_to_string(&mut json).await.unwrap();
        assert!(json.contains("\"reason\":\"offline\""));
    }

    #[tokio::test]
    async fn test_event_stream_skips_lag() {
        let (tx, rx) = broadcast::channel(1);
        tx.send(DashboardEvent::LiveUpdate { readings: 1 }).unwrap();
        tx.send(DashboardEvent::LiveUpdate { readings: 2 }).unwrap();
        drop(tx);

        let events: Vec<DashboardEvent> = event_stream(rx).collect().await;
        assert_eq!(events, vec![DashboardEvent::LiveUpdate { readings: 2 }]);
    }
}

//! Wire-format tests for headers, interim responses, and control frames.
//!
//! Expected bytes follow RFC 9113 framing and RFC 7541 header encoding.

use http::header::{HeaderMap, HeaderValue};
use http::StatusCode;

use h2_egress::{flags, CancelToken, ErrorCode, FrameType, MinDataRate, OutputAborter};

mod helpers;
use helpers::{recording_writer, test_config, StalledSink, WireLog};

fn assert_frame_boundaries(log: &WireLog, max_frame_size: u32) {
    for frame in log.frames() {
        assert!(frame.header.length <= max_frame_size);
        assert_eq!(frame.payload.len(), frame.header.length as usize);
    }
}

#[tokio::test]
async fn test_100_continue_wire_bytes() {
    let (writer, log) = recording_writer(test_config());

    let result = writer.write_100_continue(1).await;
    assert!(!result.completed);
    assert_eq!(result.bytes_flushed, 14);

    assert_eq!(
        log.bytes(),
        vec![0x00, 0x00, 0x05, 0x01, 0x04, 0x00, 0x00, 0x00, 0x01, 0x08, 0x03, 0x31, 0x30, 0x30]
    );
}

#[tokio::test]
async fn test_tiny_response_headers() {
    let (writer, log) = recording_writer(test_config());

    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("0"));

    writer
        .write_response_headers(
            3,
            StatusCode::OK,
            flags::END_STREAM | flags::END_HEADERS,
            &headers,
        )
        .await
        .unwrap();

    // Headers are buffered, not flushed.
    assert_eq!(log.len(), 0);
    let result = writer.flush(None, None).await;
    assert!(!result.completed);

    let frames = log.frames();
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!(frame.header.frame_type, FrameType::Headers);
    assert_eq!(frame.header.flags, flags::END_STREAM | flags::END_HEADERS);
    assert_eq!(frame.header.stream_id, 3);
    assert!(frame.header.length <= 16384);
    // :status 200 via static index 8, then content-length: 0 as a
    // literal with incremental indexing against name index 28.
    assert_eq!(frame.payload, vec![0x88, 0x5c, 0x01, 0x30]);
}

#[tokio::test]
async fn test_fragmented_headers_across_continuations() {
    let mut config = test_config();
    config.max_frame_size = 16;
    config.header_compression = false;
    let (writer, log) = recording_writer(config);

    // Five fields of 8 encoded bytes each: 40 bytes total.
    let mut headers = HeaderMap::new();
    for name in ["x-a0", "x-a1", "x-a2", "x-a3", "x-a4"] {
        headers.insert(
            name.parse::<http::header::HeaderName>().unwrap(),
            HeaderValue::from_static("v"),
        );
    }

    writer
        .write_response_headers(7, StatusCode::OK, 0, &headers)
        .await
        .unwrap();
    writer.flush(None, None).await;

    // Fields never split across fragments: the first fragment carries
    // the status byte plus one field (9 bytes), the rest pack two per
    // fragment.
    let frames = log.frames();
    assert_eq!(frames.len(), 3);

    assert_eq!(frames[0].header.frame_type, FrameType::Headers);
    assert_eq!(frames[0].header.length, 9);
    assert_eq!(frames[0].header.flags, 0);

    assert_eq!(frames[1].header.frame_type, FrameType::Continuation);
    assert_eq!(frames[1].header.length, 16);
    assert_eq!(frames[1].header.flags, 0);

    assert_eq!(frames[2].header.frame_type, FrameType::Continuation);
    assert_eq!(frames[2].header.length, 16);
    assert_eq!(frames[2].header.flags, flags::END_HEADERS);

    for frame in &frames {
        assert_eq!(frame.header.stream_id, 7);
    }
    assert_frame_boundaries(&log, 16);
}

#[tokio::test]
async fn test_fragmented_trailers_fill_frames_exactly() {
    let mut config = test_config();
    config.max_frame_size = 16;
    config.header_compression = false;
    let (writer, log) = recording_writer(config);

    // 40 encoded bytes with no status byte: fragments of 16, 16, 8.
    let mut trailers = HeaderMap::new();
    for name in ["x-t0", "x-t1", "x-t2", "x-t3", "x-t4"] {
        trailers.insert(
            name.parse::<http::header::HeaderName>().unwrap(),
            HeaderValue::from_static("v"),
        );
    }

    writer.write_response_trailers(11, &trailers).await;

    let frames = log.frames();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].header.frame_type, FrameType::Headers);
    assert_eq!(frames[0].header.length, 16);
    assert_eq!(frames[0].header.flags, flags::END_STREAM);
    assert_eq!(frames[1].header.length, 16);
    assert_eq!(frames[1].header.flags, 0);
    assert_eq!(frames[2].header.length, 8);
    assert_eq!(frames[2].header.flags, flags::END_HEADERS);
}

#[tokio::test]
async fn test_headers_contiguity_under_concurrent_writes() {
    // A HEADERS/CONTINUATION sequence never releases the write lock, so
    // frames buffered by other operations cannot land inside it.
    let mut config = test_config();
    config.max_frame_size = 16;
    config.header_compression = false;
    let (writer, log) = recording_writer(config);

    let mut headers = HeaderMap::new();
    for name in ["x-b0", "x-b1", "x-b2", "x-b3"] {
        headers.insert(
            name.parse::<http::header::HeaderName>().unwrap(),
            HeaderValue::from_static("v"),
        );
    }

    writer
        .write_response_headers(9, StatusCode::OK, 0, &headers)
        .await
        .unwrap();
    writer.write_ping(0, [0; 8]).await;

    let frames = log.frames();
    let headers_idx = frames
        .iter()
        .position(|f| f.header.frame_type == FrameType::Headers)
        .unwrap();

    // Every frame between HEADERS and the END_HEADERS continuation is a
    // CONTINUATION for the same stream.
    let mut saw_end = false;
    for frame in &frames[headers_idx + 1..] {
        if saw_end {
            assert_ne!(frame.header.frame_type, FrameType::Continuation);
            continue;
        }
        assert_eq!(frame.header.frame_type, FrameType::Continuation);
        assert_eq!(frame.header.stream_id, 9);
        if frame.header.flags & flags::END_HEADERS != 0 {
            saw_end = true;
        }
    }
    assert!(saw_end);
}

#[tokio::test]
async fn test_trailers_set_end_stream_on_headers_frame() {
    let (writer, log) = recording_writer(test_config());

    let mut trailers = HeaderMap::new();
    trailers.insert(
        "grpc-status".parse::<http::header::HeaderName>().unwrap(),
        HeaderValue::from_static("0"),
    );

    let result = writer.write_response_trailers(5, &trailers).await;
    assert!(!result.completed);

    let frames = log.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].header.frame_type, FrameType::Headers);
    assert_eq!(frames[0].header.flags, flags::END_STREAM | flags::END_HEADERS);
    assert_eq!(frames[0].header.stream_id, 5);
}

#[tokio::test]
async fn test_goaway_wire_bytes() {
    let (writer, log) = recording_writer(test_config());

    writer
        .write_go_away(0x7fff_ffff, ErrorCode::InternalError)
        .await;

    assert_eq!(
        log.bytes(),
        vec![
            0x00, 0x00, 0x08, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x7f, 0xff, 0xff, 0xff, 0x00,
            0x00, 0x00, 0x02
        ]
    );
}

#[tokio::test]
async fn test_settings_and_ack() {
    let (writer, log) = recording_writer(test_config());

    writer
        .write_settings(&[(0x4, 65535), (0x5, 16384)])
        .await;
    writer.write_settings_ack().await;

    let frames = log.frames();
    assert_eq!(frames.len(), 2);

    assert_eq!(frames[0].header.frame_type, FrameType::Settings);
    assert_eq!(frames[0].header.length, 12);
    assert_eq!(frames[0].header.stream_id, 0);
    assert_eq!(&frames[0].payload[..6], &[0x00, 0x04, 0x00, 0x00, 0xff, 0xff]);
    assert_eq!(&frames[0].payload[6..], &[0x00, 0x05, 0x00, 0x00, 0x40, 0x00]);

    assert_eq!(frames[1].header.frame_type, FrameType::Settings);
    assert_eq!(frames[1].header.flags, flags::ACK);
    assert_eq!(frames[1].header.length, 0);
}

#[tokio::test]
async fn test_ping_window_update_rst_stream() {
    let (writer, log) = recording_writer(test_config());

    writer.write_ping(flags::ACK, [9, 8, 7, 6, 5, 4, 3, 2]).await;
    writer.write_window_update(0, 1_048_576).await;
    writer.write_window_update(3, 65535).await;
    writer.write_rst_stream(3, ErrorCode::Cancel).await;

    let frames = log.frames();
    assert_eq!(frames.len(), 4);

    assert_eq!(frames[0].header.frame_type, FrameType::Ping);
    assert_eq!(frames[0].header.flags, flags::ACK);
    assert_eq!(frames[0].payload, vec![9, 8, 7, 6, 5, 4, 3, 2]);

    assert_eq!(frames[1].header.frame_type, FrameType::WindowUpdate);
    assert_eq!(frames[1].header.stream_id, 0);
    assert_eq!(frames[1].payload, vec![0x00, 0x10, 0x00, 0x00]);

    assert_eq!(frames[2].header.stream_id, 3);

    assert_eq!(frames[3].header.frame_type, FrameType::RstStream);
    assert_eq!(frames[3].header.stream_id, 3);
    assert_eq!(frames[3].payload, vec![0x00, 0x00, 0x00, 0x08]);

    assert_frame_boundaries(&log, 16384);
}

#[tokio::test]
async fn test_hpack_failure_on_headers_aborts_and_surfaces() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("trace")
        .try_init();

    let mut config = test_config();
    config.max_frame_size = 16;
    let (writer, log) = recording_writer(config);

    // A single field that cannot fit in any 16-byte fragment.
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-oversized".parse::<http::header::HeaderName>().unwrap(),
        HeaderValue::from_str(&"v".repeat(64)).unwrap(),
    );

    let err = writer
        .write_response_headers(1, StatusCode::OK, flags::END_HEADERS, &headers)
        .await
        .unwrap_err();
    assert!(matches!(err, h2_egress::Error::Hpack(_)));

    // The connection is gone: every later operation is a no-op.
    let result = writer.write_100_continue(3).await;
    assert!(result.completed);
    assert_eq!(log.len(), 0);
}

#[tokio::test]
async fn test_hpack_failure_on_trailers_does_not_error() {
    let mut config = test_config();
    config.max_frame_size = 16;
    let (writer, _log) = recording_writer(config);

    let mut trailers = HeaderMap::new();
    trailers.insert(
        "x-oversized".parse::<http::header::HeaderName>().unwrap(),
        HeaderValue::from_str(&"v".repeat(64)).unwrap(),
    );

    // The body has already begun by the time trailers are written; the
    // failure only shows up as a terminal result.
    let result = writer.write_response_trailers(1, &trailers).await;
    assert!(result.completed);
}

#[tokio::test]
async fn test_canceled_flush_is_terminal() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("trace")
        .try_init();

    let writer = h2_egress::FrameWriter::new(StalledSink, test_config());

    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    writer
        .write_response_headers(1, StatusCode::OK, flags::END_HEADERS, &headers)
        .await
        .unwrap();

    let token = CancelToken::new();
    token.cancel();
    let result = writer.flush(None, Some(&token)).await;
    assert!(result.completed);

    // The engine does not touch the sink again.
    let result = writer.write_settings_ack().await;
    assert!(result.completed);
}

#[tokio::test(start_paused = true)]
async fn test_rate_watchdog_aborts_slow_connection() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Flag(Arc<AtomicBool>);
    impl OutputAborter for Flag {
        fn abort(&self, _reason: h2_egress::Error) {
            self.0.store(true, Ordering::Release);
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter("trace")
        .try_init();

    let mut config = test_config();
    config.min_data_rate = Some(MinDataRate::new(240.0, Duration::from_secs(5)));
    let writer = h2_egress::FrameWriter::new(StalledSink, config);

    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    writer
        .write_response_headers(1, StatusCode::OK, flags::END_HEADERS, &headers)
        .await
        .unwrap();

    let tripped = Arc::new(AtomicBool::new(false));
    let aborter = Flag(tripped.clone());
    let result = writer.flush(Some(&aborter), None).await;

    assert!(result.completed);
    assert!(tripped.load(Ordering::Acquire));

    let result = writer.write_100_continue(1).await;
    assert!(result.completed);
}

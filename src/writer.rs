//! Egress coordinator for an HTTP/2 server connection.
//!
//! A [`FrameWriter`] is the single object guarding one connection's
//! output. Every public operation serializes on the write lock; DATA
//! writes additionally consult the connection and stream flow-control
//! windows and may suspend until the peer grants credit. The lock is
//! never held across an await: credit waits and flushes happen after the
//! lock is released, so frames for other streams may interleave there,
//! but never inside a HEADERS/CONTINUATION sequence.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;

use crate::config::{EgressConfig, MinDataRate};
use crate::error::{Error, Result};
use crate::flow::{self, Credit, FlowWindow, DEFAULT_INITIAL_WINDOW_SIZE};
use crate::frame::{
    flags, ErrorCode, FrameHeader, FrameType, GoAwayFrame, PingFrame, RstStreamFrame,
    SettingsFrame, WindowUpdateFrame, FRAME_HEADER_SIZE,
};
use crate::hpack::{FieldCursor, HpackEncoder, HpackError, STATUS_100_BLOCK};
use crate::rate::{flush_with_watchdog, FlushOutcome, OutputAborter};
use crate::sink::{CancelToken, FlushResult, SinkBuffer, SinkIo};

/// Serializes HTTP/2 response frames onto one connection transport.
pub struct FrameWriter<S> {
    /// The write lock. All buffer mutation, HPACK state, and sink
    /// appends happen under it; it is released before any await.
    state: Mutex<WriterState>,
    /// Transport half behind its own fair mutex, so concurrent flushes
    /// drain in FIFO order without blocking the write lock on IO.
    io: Mutex<SinkIo<S>>,
    /// Connection-level send window.
    conn_window: FlowWindow,
    min_data_rate: Option<MinDataRate>,
    yield_after_credit_wait: bool,
}

struct WriterState {
    buffer: SinkBuffer,
    encoder: HpackEncoder,
    /// Header-block scratch space, exactly one max frame size long.
    /// Reallocated only when MAX_FRAME_SIZE changes.
    header_buf: Vec<u8>,
    max_frame_size: usize,
    completed: bool,
    aborted: bool,
}

impl WriterState {
    fn put_frame_header(
        &mut self,
        length: u32,
        frame_type: FrameType,
        frame_flags: u8,
        stream_id: u32,
    ) {
        let header = FrameHeader {
            length,
            frame_type,
            flags: frame_flags,
            stream_id,
        };
        let span = self.buffer.reserve(FRAME_HEADER_SIZE);
        span.copy_from_slice(&header.encode());
        self.buffer.advance(FRAME_HEADER_SIZE);
    }

    fn put_header_fragment(
        &mut self,
        frame_type: FrameType,
        frame_flags: u8,
        stream_id: u32,
        len: usize,
    ) {
        self.put_frame_header(len as u32, frame_type, frame_flags, stream_id);
        self.buffer.write(&self.header_buf[..len]);
    }

    /// Encode and frame one header block: HEADERS plus zero or more
    /// CONTINUATION frames, END_HEADERS on exactly the last.
    fn write_header_block(
        &mut self,
        stream_id: u32,
        status: Option<u16>,
        frame_flags: u8,
        headers: &HeaderMap,
    ) -> std::result::Result<(), HpackError> {
        let mut cursor = FieldCursor::new(headers);

        let (len, mut done) = self
            .encoder
            .begin_block(status, &mut cursor, &mut self.header_buf)?;
        let first_flags =
            (frame_flags & !flags::END_HEADERS) | if done { flags::END_HEADERS } else { 0 };
        self.put_header_fragment(FrameType::Headers, first_flags, stream_id, len);

        while !done {
            let (len, finished) = self.encoder.resume_block(&mut cursor, &mut self.header_buf)?;
            done = finished;
            let cont_flags = if done { flags::END_HEADERS } else { 0 };
            self.put_header_fragment(FrameType::Continuation, cont_flags, stream_id, len);
        }

        Ok(())
    }

    /// Frame a DATA payload, fragmenting by MAX_FRAME_SIZE. END_STREAM
    /// goes on the last frame only.
    fn write_data_frames(&mut self, stream_id: u32, data: &[u8], end_stream: bool) {
        if data.is_empty() {
            let frame_flags = if end_stream { flags::END_STREAM } else { 0 };
            self.put_frame_header(0, FrameType::Data, frame_flags, stream_id);
            return;
        }

        let mut offset = 0;
        while offset < data.len() {
            let len = self.max_frame_size.min(data.len() - offset);
            let last = offset + len == data.len();
            let frame_flags = if last && end_stream { flags::END_STREAM } else { 0 };
            self.put_frame_header(len as u32, FrameType::Data, frame_flags, stream_id);
            self.buffer.write(&data[offset..offset + len]);
            offset += len;
        }
    }
}

impl<S> FrameWriter<S>
where
    S: AsyncWrite + Unpin,
{
    /// Create a writer over a connection transport.
    pub fn new(transport: S, config: EgressConfig) -> Self {
        Self {
            state: Mutex::new(WriterState {
                buffer: SinkBuffer::new(),
                encoder: HpackEncoder::new(config.header_table_size, config.header_compression),
                header_buf: vec![0u8; config.max_frame_size as usize],
                max_frame_size: config.max_frame_size as usize,
                completed: false,
                aborted: false,
            }),
            io: Mutex::new(SinkIo::new(transport)),
            conn_window: FlowWindow::new(DEFAULT_INITIAL_WINDOW_SIZE),
            min_data_rate: config.min_data_rate,
            yield_after_credit_wait: config.yield_after_credit_wait,
        }
    }

    /// The connection-level send window.
    pub fn connection_window(&self) -> &FlowWindow {
        &self.conn_window
    }

    /// Emit response HEADERS (+ CONTINUATION as needed) for a stream.
    ///
    /// Synchronous with respect to the transport: frames are buffered
    /// but not flushed. An HPACK failure aborts the connection and is
    /// surfaced to the caller, since no response bytes have been
    /// committed yet.
    pub async fn write_response_headers(
        &self,
        stream_id: u32,
        status: StatusCode,
        frame_flags: u8,
        headers: &HeaderMap,
    ) -> Result<()> {
        let encoded = {
            let mut state = self.state.lock().await;
            if state.completed {
                return Ok(());
            }
            state.write_header_block(stream_id, Some(status.as_u16()), frame_flags, headers)
        };

        match encoded {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!("HPACK encoding failed for response headers: {}", e);
                self.abort(Error::aborted("HPACK encoding failure")).await;
                Err(Error::Hpack(e))
            }
        }
    }

    /// Emit an interim 100-Continue response for a stream and flush.
    pub async fn write_100_continue(&self, stream_id: u32) -> FlushResult {
        {
            let mut state = self.state.lock().await;
            if state.completed {
                return FlushResult::terminal();
            }
            state.put_frame_header(
                STATUS_100_BLOCK.len() as u32,
                FrameType::Headers,
                flags::END_HEADERS,
                stream_id,
            );
            state.buffer.write(&STATUS_100_BLOCK);
        }
        self.flush_inner(None, None).await
    }

    /// Emit response trailers with END_STREAM on the HEADERS frame, then
    /// flush.
    ///
    /// An HPACK failure still aborts the connection, but is not returned:
    /// the response body has already begun, and the peer observes the
    /// connection abort instead.
    pub async fn write_response_trailers(
        &self,
        stream_id: u32,
        trailers: &HeaderMap,
    ) -> FlushResult {
        let encoded = {
            let mut state = self.state.lock().await;
            if state.completed {
                return FlushResult::terminal();
            }
            state.write_header_block(stream_id, None, flags::END_STREAM, trailers)
        };

        match encoded {
            Ok(()) => self.flush_inner(None, None).await,
            Err(e) => {
                tracing::error!("HPACK encoding failed for trailers: {}", e);
                self.abort(Error::Hpack(e)).await;
                FlushResult::terminal()
            }
        }
    }

    /// Emit DATA frames for a stream, honoring both flow-control windows
    /// and fragmenting by MAX_FRAME_SIZE.
    ///
    /// When credit runs out mid-payload the written part is flushed and
    /// the call suspends until either window is replenished or aborted.
    /// A stream's first body write that finds a zero window flushes the
    /// buffered response headers before waiting, so the peer can observe
    /// the response start; later writes wait without flushing.
    pub async fn write_data(
        &self,
        stream_id: u32,
        stream_window: &FlowWindow,
        data: Bytes,
        end_stream: bool,
        first_write: bool,
        force_flush: bool,
    ) -> FlushResult {
        {
            let mut state = self.state.lock().await;
            if state.completed {
                return FlushResult::terminal();
            }
            // Empty DATA carries no credit cost and is always sendable.
            if data.is_empty() {
                state.write_data_frames(stream_id, &data, end_stream);
                drop(state);
                if force_flush {
                    return self.flush_inner(None, None).await;
                }
                return FlushResult::flushed(0);
            }
        }

        let mut offset = 0;
        let mut waited = false;
        let mut result = FlushResult::flushed(0);

        loop {
            match flow::reserve_pair(&self.conn_window, stream_window, data.len() - offset) {
                Credit::Aborted => {
                    result = FlushResult::terminal();
                    break;
                }
                Credit::Exhausted => {
                    if first_write && offset == 0 {
                        // No body bytes sent yet; push the buffered
                        // headers so the peer sees the response start
                        // while we wait for credit.
                        result = self.flush_inner(None, None).await;
                        if result.completed {
                            break;
                        }
                    }
                    let conn_credit = self.conn_window.credit_or_abort();
                    let stream_credit = stream_window.credit_or_abort();
                    waited = true;
                    tokio::select! {
                        _ = conn_credit => {}
                        _ = stream_credit => {}
                    }
                }
                Credit::Available(allowed) => {
                    let end = offset + allowed;
                    let finished = end == data.len();
                    {
                        let mut state = self.state.lock().await;
                        if state.completed {
                            result = FlushResult::terminal();
                            break;
                        }
                        state.write_data_frames(
                            stream_id,
                            &data[offset..end],
                            end_stream && finished,
                        );
                    }
                    offset = end;
                    if finished {
                        break;
                    }
                    // Push the partial payload: the peer replenishes the
                    // window only after it sees data arrive.
                    result = self.flush_inner(None, None).await;
                    if result.completed {
                        break;
                    }
                }
            }
        }

        if !result.completed && force_flush {
            result = self.flush_inner(None, None).await;
        }
        if waited && self.yield_after_credit_wait {
            // Keep application continuations off the task that processed
            // the peer's WINDOW_UPDATE.
            tokio::task::yield_now().await;
        }
        result
    }

    /// [`write_data`](Self::write_data) without END_STREAM, followed by
    /// [`write_response_trailers`](Self::write_response_trailers).
    pub async fn write_data_and_trailers(
        &self,
        stream_id: u32,
        stream_window: &FlowWindow,
        data: Bytes,
        first_write: bool,
        trailers: &HeaderMap,
    ) -> FlushResult {
        let result = self
            .write_data(stream_id, stream_window, data, false, first_write, false)
            .await;
        if result.completed {
            return result;
        }
        self.write_response_trailers(stream_id, trailers).await
    }

    /// Emit a WINDOW_UPDATE frame (stream 0 = connection) and flush.
    pub async fn write_window_update(&self, stream_id: u32, increment: u32) -> FlushResult {
        {
            let mut state = self.state.lock().await;
            if state.completed {
                return FlushResult::terminal();
            }
            let frame = WindowUpdateFrame::new(stream_id, increment).serialize();
            state.buffer.write(&frame);
        }
        self.flush_inner(None, None).await
    }

    /// Emit a RST_STREAM frame and flush.
    pub async fn write_rst_stream(&self, stream_id: u32, error_code: ErrorCode) -> FlushResult {
        {
            let mut state = self.state.lock().await;
            if state.completed {
                return FlushResult::terminal();
            }
            let frame = RstStreamFrame::new(stream_id, error_code).serialize();
            state.buffer.write(&frame);
        }
        self.flush_inner(None, None).await
    }

    /// Emit a SETTINGS frame carrying the given parameters and flush.
    pub async fn write_settings(&self, settings: &[(u16, u32)]) -> FlushResult {
        {
            let mut state = self.state.lock().await;
            if state.completed {
                return FlushResult::terminal();
            }
            let frame = SettingsFrame::new(settings.to_vec()).serialize();
            state.buffer.write(&frame);
        }
        self.flush_inner(None, None).await
    }

    /// Emit a SETTINGS ACK frame and flush.
    pub async fn write_settings_ack(&self) -> FlushResult {
        {
            let mut state = self.state.lock().await;
            if state.completed {
                return FlushResult::terminal();
            }
            let frame = SettingsFrame::ack().serialize();
            state.buffer.write(&frame);
        }
        self.flush_inner(None, None).await
    }

    /// Emit a PING frame and flush. `frame_flags` may carry ACK.
    pub async fn write_ping(&self, frame_flags: u8, payload: [u8; 8]) -> FlushResult {
        {
            let mut state = self.state.lock().await;
            if state.completed {
                return FlushResult::terminal();
            }
            let frame = PingFrame::new(frame_flags, payload).serialize();
            state.buffer.write(&frame);
        }
        self.flush_inner(None, None).await
    }

    /// Emit a GOAWAY frame and flush.
    pub async fn write_go_away(&self, last_stream_id: u32, error_code: ErrorCode) -> FlushResult {
        {
            let mut state = self.state.lock().await;
            if state.completed {
                return FlushResult::terminal();
            }
            let frame = GoAwayFrame::new(last_stream_id, error_code).serialize();
            state.buffer.write(&frame);
        }
        self.flush_inner(None, None).await
    }

    /// Apply a peer-advertised SETTINGS_HEADER_TABLE_SIZE.
    pub async fn update_max_header_table_size(&self, size: u32) {
        let mut state = self.state.lock().await;
        if state.completed {
            return;
        }
        state.encoder.set_max_table_size(size);
    }

    /// Apply a peer-advertised SETTINGS_MAX_FRAME_SIZE, reallocating the
    /// header-encoding buffer only when the size actually changed.
    pub async fn update_max_frame_size(&self, size: u32) {
        let mut state = self.state.lock().await;
        if state.completed {
            return;
        }
        let size = size as usize;
        if state.max_frame_size != size {
            state.max_frame_size = size;
            state.header_buf = vec![0u8; size];
        }
    }

    /// Force a timed flush of everything buffered.
    pub async fn flush(
        &self,
        aborter: Option<&dyn OutputAborter>,
        cancel: Option<&CancelToken>,
    ) -> FlushResult {
        self.flush_inner(aborter, cancel).await
    }

    /// Add credit to the connection window. Returns false on overflow.
    pub fn try_update_connection_window(&self, delta: i32) -> bool {
        self.conn_window.try_update(delta)
    }

    /// Add credit to a stream window. Returns false on overflow.
    pub fn try_update_stream_window(&self, window: &FlowWindow, delta: i32) -> bool {
        window.try_update(delta)
    }

    /// Abort a stream's window, waking any DATA write waiting on it.
    /// Called by the ingress side when the peer resets the stream.
    pub fn abort_pending_stream_data_writes(&self, window: &FlowWindow) {
        window.abort();
    }

    /// Mark the engine completed: no further bytes will be written, the
    /// sink is aborted, and outstanding credit waits are released.
    pub async fn complete(&self) {
        {
            let mut state = self.state.lock().await;
            if state.completed {
                return;
            }
            state.completed = true;
            state.buffer.close();
            if !state.aborted {
                tracing::debug!("HTTP/2 egress completed");
            }
        }
        self.conn_window.abort();
        self.io.lock().await.abort();
    }

    /// Abort the transport, then complete.
    pub async fn abort(&self, error: Error) {
        {
            let mut state = self.state.lock().await;
            if state.completed {
                return;
            }
            state.aborted = true;
            tracing::error!("aborting HTTP/2 egress: {}", error);
        }
        self.complete().await;
    }

    async fn flush_inner(
        &self,
        aborter: Option<&dyn OutputAborter>,
        cancel: Option<&CancelToken>,
    ) -> FlushResult {
        // Take the IO mutex first: whoever holds it drains everything
        // buffered so far, which keeps chunks on the wire in FIFO order.
        let mut io = self.io.lock().await;
        let (chunk, count) = {
            let mut state = self.state.lock().await;
            if state.completed {
                return FlushResult::terminal();
            }
            state.buffer.take_pending()
        };
        if chunk.is_empty() {
            return FlushResult::flushed(0);
        }

        match flush_with_watchdog(&mut io, &chunk, self.min_data_rate, cancel).await {
            FlushOutcome::Flushed => FlushResult::flushed(count),
            FlushOutcome::TimedOut => {
                tracing::warn!(
                    "connection write of {} bytes fell below the minimum data rate",
                    count
                );
                if let Some(aborter) = aborter {
                    aborter.abort(Error::WriteTimeout);
                }
                drop(io);
                self.abort(Error::WriteTimeout).await;
                FlushResult::terminal()
            }
            FlushOutcome::Canceled => {
                drop(io);
                self.complete().await;
                FlushResult::terminal()
            }
            FlushOutcome::Failed(e) => {
                drop(io);
                self.abort(Error::Io(e)).await;
                FlushResult::terminal()
            }
        }
    }
}

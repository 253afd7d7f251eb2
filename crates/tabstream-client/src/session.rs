//! Session orchestration and the bulk-load engine.
//!
//! A [`Session`] owns one connection and multiplexes exactly one active
//! request at a time. The bulk-load engine drives the full lifecycle:
//! the INSERT BULK prelude, the COLMETADATA + ROW + DONE bulk message,
//! and reconciliation of the server's completion token stream, with
//! cooperative cancellation and a one-shot request timer.

use bytes::{Bytes, BytesMut};
use tabstream_codec::{CancelHandle, Connection};
use tabstream_protocol::packet::{PACKET_HEADER_SIZE, PacketType};
use tabstream_protocol::token::{Done, DoneStatus, Token};
use tabstream_protocol::{TdsVersion, TokenStreamParser, TokenType, TrackingBuffer};
use tabstream_types::EncodeOptions;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::bulk::{BulkLoad, BulkLoadPhase, CancelFlag};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::rows::RowSource;
use crate::state::SessionState;

/// A logical connection to the server, single-threaded cooperative:
/// every state transition happens on the task driving the session.
pub struct Session<T>
where
    T: AsyncRead + AsyncWrite,
{
    conn: Connection<T>,
    config: SessionConfig,
    state: SessionState,
    version: TdsVersion,
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a session over an authenticated transport.
    ///
    /// Login and encryption negotiation happen before this layer; the
    /// session starts out `LoggedIn`.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let conn = Connection::with_packet_size(transport, config.packet_size());
        let version = config.tds_version();

        Self {
            conn,
            config,
            state: SessionState::LoggedIn,
            version,
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The current state's name.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Transport-level cancel handle (sends a raw Attention signal).
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle<T> {
        self.conn.cancel_handle()
    }

    /// Execute a configured bulk load, pulling rows from `rows`.
    ///
    /// Settles exactly once: the returned count is the server-reported
    /// accepted row count. Scoped failures (server error, validation,
    /// cancellation, timeout, source error) leave the session reusable;
    /// fatal failures move it to `Final`.
    pub async fn execute_bulk_load<R>(&mut self, bulk: &mut BulkLoad, mut rows: R) -> Result<u64>
    where
        R: RowSource,
    {
        let cancel = bulk.cancel_flag();

        if cancel.is_requested() {
            bulk.set_phase(BulkLoadPhase::Cancelled);
            return Err(Error::Canceled);
        }
        if bulk.phase() != BulkLoadPhase::Configuring {
            return Err(Error::BulkInput(
                "Bulk load can only be executed once.".into(),
            ));
        }
        if bulk.columns().is_empty() {
            return Err(Error::BulkInput(
                "Bulk load must have at least one column.".into(),
            ));
        }
        if !self.state.is_ready() {
            return Err(Error::BulkInput(format!(
                "Requests can only be made in the LoggedIn state, not the {} state.",
                self.state
            )));
        }

        bulk.set_phase(BulkLoadPhase::Executing);

        // The one-shot request timer arms when execution starts; a late
        // fire is impossible once this future resolves.
        let timeout_ms = bulk.timeout().map(|d| d.as_millis() as u64);
        let deadline = bulk.timeout().map(|d| Instant::now() + d);

        let result = self
            .drive_bulk_load(bulk, &mut rows, &cancel, deadline, timeout_ms)
            .await;

        if let Err(e) = &result {
            if e.is_fatal() {
                self.state = SessionState::Final;
            }
        }

        bulk.set_phase(match &result {
            Ok(_) => BulkLoadPhase::Completed,
            Err(Error::Canceled) | Err(Error::Timeout { .. }) => BulkLoadPhase::Cancelled,
            Err(_) => BulkLoadPhase::Errored,
        });

        result
    }

    async fn drive_bulk_load<R>(
        &mut self,
        bulk: &BulkLoad,
        rows: &mut R,
        cancel: &CancelFlag,
        deadline: Option<Instant>,
        timeout_ms: Option<u64>,
    ) -> Result<u64>
    where
        R: RowSource,
    {
        self.state = SessionState::SentClientRequest;
        tracing::debug!(
            table = bulk.table(),
            columns = bulk.columns().len(),
            "starting bulk load"
        );

        // INSERT BULK prelude, as its own SQL batch request.
        let prelude = encode_sql_batch(&bulk.insert_bulk_sql());
        self.conn
            .send_message(PacketType::SqlBatch, prelude)
            .await?;
        self.read_response(cancel, deadline, timeout_ms).await?;

        // The prelude response settled to LoggedIn; the bulk body is
        // the second request of the operation.
        self.state = SessionState::SentClientRequest;

        let opts = EncodeOptions {
            use_utc: self.config.use_utc(),
        };
        let max_payload = self.conn.packet_size() - PACKET_HEADER_SIZE;

        let mut buf = TrackingBuffer::with_capacity(self.conn.packet_size());
        bulk.encode_colmetadata(&mut buf);

        let mut sent_rows: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.requested() => {
                    return Err(self.abort_request(Error::Canceled).await);
                }
                _ = sleep_until(deadline) => {
                    return Err(self
                        .abort_request(Error::Timeout { ms: timeout_ms.unwrap_or(0) })
                        .await);
                }
                next = rows.try_next() => next,
            };

            let row = match next {
                Ok(Some(row)) => row,
                Ok(None) => break,
                // Source failures propagate with their exact error value.
                Err(e) => return Err(self.abort_request(e).await),
            };

            let values = match bulk.normalize_row(row) {
                Ok(values) => values,
                Err(e) => return Err(self.abort_request(e).await),
            };

            // Validate the whole row before any of it is written.
            let mut validated = Vec::with_capacity(values.len());
            for (col, value) in bulk.columns().iter().zip(values.iter()) {
                match col.ty.validate(value) {
                    Ok(v) => validated.push(v),
                    Err(e) => return Err(self.abort_request(e.into()).await),
                }
            }

            buf.write_u8(TokenType::Row as u8);
            for (col, value) in bulk.columns().iter().zip(validated.iter()) {
                if let Err(e) = col.ty.encode_value(value, &mut buf, &opts) {
                    return Err(self.abort_request(e.into()).await);
                }
            }
            sent_rows += 1;

            // Flush as soon as a packet's worth is buffered; the sink
            // write applies the transport's backpressure to the row
            // pull above.
            while buf.len() >= max_payload {
                let chunk = buf.split_to(max_payload);
                self.conn.send_fragment(PacketType::BulkLoad, chunk).await?;
            }
        }

        // Client-side DONE terminates the bulk token stream.
        let done = Done {
            status: DoneStatus {
                count: true,
                ..Default::default()
            },
            cur_cmd: 0,
            row_count: sent_rows,
        };
        let mut scratch = BytesMut::new();
        done.encode(&mut scratch);
        buf.write_bytes(&scratch);

        while buf.len() > max_payload {
            let chunk = buf.split_to(max_payload);
            self.conn.send_fragment(PacketType::BulkLoad, chunk).await?;
        }
        self.conn
            .finish_message(PacketType::BulkLoad, buf.split())
            .await?;

        tracing::debug!(rows = sent_rows, "bulk rows sent, awaiting completion");

        self.read_response(cancel, deadline, timeout_ms).await
    }

    /// Read one request's response token stream to settlement.
    ///
    /// Tokens arrive in wire order. The final DONE (no MORE bit) settles
    /// the request: its count if it carries one, or the first ERROR
    /// token's request error. A cancel or timer fire mid-response sends
    /// Attention and drains until the acknowledging DONE.
    async fn read_response(
        &mut self,
        cancel: &CancelFlag,
        deadline: Option<Instant>,
        timeout_ms: Option<u64>,
    ) -> Result<u64> {
        let mut parser = TokenStreamParser::new(self.version);
        let mut first_error: Option<Error> = None;
        let mut interrupted: Option<Error> = None;
        let mut row_count: u64 = 0;

        loop {
            let packet = if interrupted.is_none() {
                tokio::select! {
                    biased;
                    _ = cancel.requested() => {
                        interrupted = Some(Error::Canceled);
                        self.begin_attention(&mut parser).await?;
                        continue;
                    }
                    _ = sleep_until(deadline) => {
                        interrupted = Some(Error::Timeout { ms: timeout_ms.unwrap_or(0) });
                        self.begin_attention(&mut parser).await?;
                        continue;
                    }
                    packet = self.conn.read_packet() => packet?,
                }
            } else {
                // Attention is on the wire; the server must acknowledge
                // within the cancel timeout or the connection goes down.
                match tokio::time::timeout(
                    self.config.cancel_timeout(),
                    self.conn.read_packet(),
                )
                .await
                {
                    Ok(packet) => packet?,
                    Err(_) => {
                        tracing::warn!("attention not acknowledged in time, tearing down");
                        self.state = SessionState::Final;
                        return Err(interrupted.take().unwrap_or(Error::ConnectionClosed));
                    }
                }
            };

            let Some(packet) = packet else {
                self.state = SessionState::Final;
                return Err(Error::ConnectionClosed);
            };

            parser.extend(&packet.payload);
            while let Some(token) = parser.try_next()? {
                match token {
                    Token::Error(e) => {
                        if first_error.is_none() {
                            first_error = Some(Error::from_server_error(e));
                        }
                    }
                    Token::Done(done) | Token::DoneProc(done) | Token::DoneInProc(done) => {
                        if done.is_attention_ack() {
                            self.conn.clear_cancelling();
                            self.state = SessionState::LoggedIn;
                            return Err(interrupted.take().unwrap_or(Error::Canceled));
                        }
                        if done.status.count {
                            row_count = done.row_count;
                        }
                        if !done.has_more() {
                            self.state = SessionState::LoggedIn;
                            return match first_error.take() {
                                Some(e) => Err(e),
                                None => Ok(row_count),
                            };
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Switch the active request into attention-drain mode.
    async fn begin_attention(&mut self, parser: &mut TokenStreamParser) -> Result<()> {
        self.state = SessionState::SentAttention;
        parser.set_cancelled();
        self.conn.send_attention().await?;
        Ok(())
    }

    /// Abort the in-flight request: send Attention, drain to the ack,
    /// and hand back the error that caused the abort.
    ///
    /// If the server acknowledges within the cancel timeout the session
    /// returns to `LoggedIn` and stays reusable; otherwise it is torn
    /// down.
    async fn abort_request(&mut self, err: Error) -> Error {
        tracing::debug!(error = %err, "aborting bulk load");

        self.state = SessionState::SentAttention;
        if self.conn.send_attention().await.is_err() {
            self.state = SessionState::Final;
            return err;
        }

        let mut parser = TokenStreamParser::new(self.version);
        parser.set_cancelled();

        let cancel_timeout = self.config.cancel_timeout();
        let drain = async {
            loop {
                match self.conn.read_packet().await {
                    Ok(Some(packet)) => {
                        parser.extend(&packet.payload);
                        match parser.try_next() {
                            Ok(Some(_ack)) => return true,
                            Ok(None) => {}
                            Err(_) => return false,
                        }
                    }
                    _ => return false,
                }
            }
        };

        match tokio::time::timeout(cancel_timeout, drain).await {
            Ok(true) => {
                self.conn.clear_cancelling();
                self.state = SessionState::LoggedIn;
            }
            _ => {
                tracing::warn!("attention not acknowledged in time, tearing down");
                self.state = SessionState::Final;
            }
        }

        err
    }
}

impl<T> std::fmt::Debug for Session<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Sleep until an optional deadline; pend forever without one.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Encode a SQL batch request: the ALL_HEADERS block (transaction
/// descriptor, outstanding request count) followed by UCS-2 LE text.
fn encode_sql_batch(sql: &str) -> Bytes {
    let mut buf = TrackingBuffer::with_capacity(22 + sql.len() * 2);
    buf.write_u32_le(22); // total header length
    buf.write_u32_le(18); // header length
    buf.write_u16_le(2); // transaction descriptor header type
    buf.write_u64_le(0); // transaction descriptor
    buf.write_u32_le(1); // outstanding request count
    buf.write_utf16(sql);
    buf.freeze()
}

//! Bulk-load lifecycle scenarios against an in-memory server.
//!
//! The transport is a `tokio::io::duplex` pipe; the server side speaks
//! just enough of the protocol to settle requests: it acknowledges the
//! INSERT BULK prelude, answers the bulk body with a configurable DONE
//! or ERROR + DONE, and acknowledges Attention signals.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use bytes::BytesMut;
use tabstream_client::{
    BulkLoad, BulkLoadHandle, BulkLoadOptions, BulkLoadPhase, BulkRow, ColumnOptions, Error,
    RowSource, Session, SessionConfig, SessionState, rows, try_rows,
};
use tabstream_codec::Connection;
use tabstream_protocol::packet::PacketType;
use tabstream_protocol::token::Token;
use tabstream_protocol::{TdsVersion, TokenStreamParser, TypeId};
use tabstream_types::{SqlType, SqlValue, TypeError, VarLen};
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;

const DONE_COUNT: u16 = 0x0010;
const DONE_ERROR: u16 = 0x0002;
const DONE_ATTN: u16 = 0x0020;

#[derive(Default)]
struct ServerBehavior {
    /// Row count reported by the final DONE of the bulk response.
    row_count: u64,
    /// ERROR token emitted before the final DONE of the bulk response.
    error: Option<(i32, &'static str)>,
    /// Leave Attention signals unacknowledged.
    ignore_attention: bool,
}

fn done_token(status: u16, row_count: u64) -> BytesMut {
    use bytes::BufMut;
    let mut buf = BytesMut::new();
    buf.put_u8(0xFD);
    buf.put_u16_le(status);
    buf.put_u16_le(0);
    buf.put_u64_le(row_count);
    buf
}

fn error_token(number: i32, message: &str) -> BytesMut {
    use bytes::BufMut;
    let mut body = BytesMut::new();
    body.put_i32_le(number);
    body.put_u8(1); // state
    body.put_u8(16); // class
    tabstream_protocol::codec::write_us_varchar(&mut body, message);
    tabstream_protocol::codec::write_b_varchar(&mut body, "fakeserver");
    tabstream_protocol::codec::write_b_varchar(&mut body, "");
    body.put_i32_le(1);

    let mut buf = BytesMut::new();
    buf.put_u8(0xAA);
    buf.put_u16_le(body.len() as u16);
    buf.extend_from_slice(&body);
    buf
}

/// Run a scripted server over the transport; resolves with the bulk
/// message payload it received, once the client side closes.
fn spawn_server(transport: DuplexStream, behavior: ServerBehavior) -> JoinHandle<BytesMut> {
    tokio::spawn(async move {
        let mut conn = Connection::new(transport);
        let mut bulk_payload = BytesMut::new();

        loop {
            let message = match conn.read_message().await {
                Ok(Some(message)) => message,
                _ => break,
            };

            match message.packet_type {
                PacketType::SqlBatch => {
                    let response = done_token(DONE_COUNT, 0).freeze();
                    conn.send_message(PacketType::TabularResult, response)
                        .await
                        .expect("prelude response");
                }
                PacketType::BulkLoad => {
                    bulk_payload.extend_from_slice(&message.payload);

                    let mut response = BytesMut::new();
                    if let Some((number, text)) = behavior.error {
                        response.extend_from_slice(&error_token(number, text));
                        response.extend_from_slice(&done_token(DONE_ERROR, 0));
                    } else {
                        response.extend_from_slice(&done_token(DONE_COUNT, behavior.row_count));
                    }
                    conn.send_message(PacketType::TabularResult, response.freeze())
                        .await
                        .expect("bulk response");
                }
                PacketType::Attention => {
                    if behavior.ignore_attention {
                        continue;
                    }
                    let response = done_token(DONE_ATTN, 0).freeze();
                    conn.send_message(PacketType::TabularResult, response)
                        .await
                        .expect("attention ack");
                }
                _ => {}
            }
        }

        bulk_payload
    })
}

fn harness(behavior: ServerBehavior) -> (Session<DuplexStream>, JoinHandle<BytesMut>) {
    let (client, server) = tokio::io::duplex(1 << 16);
    let handle = spawn_server(server, behavior);
    let config = SessionConfig::default().with_cancel_timeout(Duration::from_millis(250));
    (Session::new(client, config), handle)
}

fn items_bulk_load() -> BulkLoad {
    let mut bulk = BulkLoad::new("[dbo].[items]", BulkLoadOptions::default()).expect("options");
    bulk.add_column("id", SqlType::Int, ColumnOptions::default())
        .expect("id column");
    bulk.add_column(
        "name",
        SqlType::NVarChar {
            length: VarLen::Limited(50),
        },
        ColumnOptions {
            nullable: true,
            obj_name: None,
        },
    )
    .expect("name column");
    bulk
}

fn item_rows(count: i32) -> Vec<Vec<SqlValue>> {
    (1..=count)
        .map(|i| vec![SqlValue::Int(i), SqlValue::String(format!("item-{i}"))])
        .collect()
}

#[tokio::test]
async fn completes_with_server_row_count() {
    let (mut session, server) = harness(ServerBehavior {
        row_count: 3,
        ..Default::default()
    });

    let mut bulk = items_bulk_load();
    let count = session
        .execute_bulk_load(&mut bulk, rows(item_rows(3)))
        .await
        .expect("bulk load");

    assert_eq!(count, 3);
    assert_eq!(bulk.phase(), BulkLoadPhase::Completed);
    assert_eq!(session.state(), SessionState::LoggedIn);

    drop(session);
    server.await.expect("server task");
}

#[tokio::test]
async fn bulk_message_mirrors_metadata_format() {
    let (mut session, server) = harness(ServerBehavior {
        row_count: 2,
        ..Default::default()
    });

    let mut bulk = items_bulk_load();
    session
        .execute_bulk_load(&mut bulk, rows(item_rows(2)))
        .await
        .expect("bulk load");
    drop(session);

    let payload = server.await.expect("server task");
    let mut parser = TokenStreamParser::new(TdsVersion::V7_4);
    parser.extend(&payload);

    // COLMETADATA first, decodable by the inbound metadata decoder.
    let meta = match parser.try_next().expect("parse").expect("token") {
        Token::ColMetaData(meta) => meta,
        other => panic!("expected ColMetaData, got {other:?}"),
    };
    assert_eq!(meta.column_count(), 2);
    assert_eq!(meta.columns[0].name, "id");
    assert_eq!(meta.columns[0].type_id, TypeId::IntN);
    assert_eq!(meta.columns[1].name, "name");

    // Then one ROW token per source row.
    for _ in 0..2 {
        assert!(matches!(
            parser.try_next().expect("parse").expect("token"),
            Token::Row(_)
        ));
    }

    // And the client DONE carrying the sent row count.
    match parser.try_next().expect("parse").expect("token") {
        Token::Done(done) => {
            assert!(done.status.count);
            assert_eq!(done.row_count, 2);
        }
        other => panic!("expected Done, got {other:?}"),
    }
    assert!(parser.try_next().expect("parse").is_none());
    assert!(!parser.has_partial());
}

#[tokio::test]
async fn server_error_becomes_request_error() {
    let message = "Cannot bulk load. The bulk data stream was incorrectly specified as sorted \
                   or the data violates a uniqueness constraint imposed by the target table.";
    let (mut session, server) = harness(ServerBehavior {
        error: Some((4819, message)),
        ..Default::default()
    });

    let mut bulk = items_bulk_load();
    let err = session
        .execute_bulk_load(&mut bulk, rows(item_rows(6)))
        .await
        .expect_err("server rejects");

    match &err {
        Error::Server { number, message: text, .. } => {
            assert_eq!(*number, 4819);
            assert_eq!(text.as_str(), message);
        }
        other => panic!("expected server error, got {other:?}"),
    }
    assert_eq!(err.to_string(), message);
    assert_eq!(bulk.phase(), BulkLoadPhase::Errored);

    // Scoped error: the session is reusable.
    assert_eq!(session.state(), SessionState::LoggedIn);

    drop(session);
    server.await.expect("server task");
}

#[tokio::test]
async fn validation_error_aborts_and_leaves_session_reusable() {
    let (mut session, server) = harness(ServerBehavior::default());

    let mut bulk = BulkLoad::new("[dbo].[dated]", BulkLoadOptions::default()).expect("options");
    bulk.add_column("day", SqlType::Date, ColumnOptions::default())
        .expect("column");

    let err = session
        .execute_bulk_load(
            &mut bulk,
            rows(vec![vec![SqlValue::String("invalid date".into())]]),
        )
        .await
        .expect_err("validation fails");

    assert!(matches!(err, Error::Type(TypeError::InvalidDate)));
    assert_eq!(err.to_string(), "Invalid date.");
    assert_eq!(bulk.phase(), BulkLoadPhase::Errored);
    assert_eq!(session.state(), SessionState::LoggedIn);

    // A subsequent request on the same session succeeds.
    let mut retry = items_bulk_load();
    let count = session
        .execute_bulk_load(&mut retry, rows(item_rows(1)))
        .await
        .expect("retry succeeds");
    assert_eq!(count, 0); // behavior reports 0 accepted rows

    drop(session);
    server.await.expect("server task");
}

#[tokio::test]
async fn row_source_error_propagates_unchanged() {
    let (mut session, server) = harness(ServerBehavior::default());

    let items: Vec<Result<Vec<SqlValue>, Error>> = vec![
        Ok(vec![SqlValue::Int(1), SqlValue::String("one".into())]),
        Err(Error::BulkInput("source exploded mid-stream".into())),
    ];

    let mut bulk = items_bulk_load();
    let err = session
        .execute_bulk_load(&mut bulk, try_rows(items))
        .await
        .expect_err("source error");

    assert!(matches!(&err, Error::BulkInput(m) if m == "source exploded mid-stream"));
    assert_eq!(bulk.phase(), BulkLoadPhase::Errored);
    assert_eq!(session.state(), SessionState::LoggedIn);

    // An unrelated request on the same connection still succeeds.
    let mut retry = items_bulk_load();
    assert!(session
        .execute_bulk_load(&mut retry, rows(item_rows(1)))
        .await
        .is_ok());

    drop(session);
    server.await.expect("server task");
}

#[tokio::test]
async fn cancel_before_execute_settles_immediately() {
    let (client, _server) = tokio::io::duplex(64);
    let mut session = Session::new(client, SessionConfig::default());

    let mut bulk = items_bulk_load();
    bulk.cancel();

    let err = session
        .execute_bulk_load(&mut bulk, rows(item_rows(3)))
        .await
        .expect_err("cancelled before start");

    assert!(matches!(err, Error::Canceled));
    assert_eq!(err.to_string(), "Canceled.");
    assert_eq!(bulk.phase(), BulkLoadPhase::Cancelled);
    // Nothing touched the wire; the session is still ready.
    assert_eq!(session.state(), SessionState::LoggedIn);
}

/// Async source yielding a row every 10ms, cancelling itself partway.
struct PacedSource {
    yielded: i32,
    cancel_at: i32,
    handle: BulkLoadHandle,
}

impl RowSource for PacedSource {
    async fn try_next(&mut self) -> Result<Option<BulkRow>, Error> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.yielded += 1;
        if self.yielded == self.cancel_at {
            self.handle.cancel();
        }
        Ok(Some(BulkRow::Tuple(vec![
            SqlValue::Int(self.yielded),
            SqlValue::String(format!("row-{}", self.yielded)),
        ])))
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_stream_stops_pulling_and_settles_once() {
    let (mut session, server) = harness(ServerBehavior::default());

    let mut bulk = items_bulk_load();
    let source = PacedSource {
        yielded: 0,
        cancel_at: 10,
        handle: bulk.handle(),
    };

    let err = session
        .execute_bulk_load(&mut bulk, source)
        .await
        .expect_err("cancelled mid-stream");

    assert!(matches!(err, Error::Canceled));
    assert_eq!(err.to_string(), "Canceled.");
    assert_eq!(bulk.phase(), BulkLoadPhase::Cancelled);

    // The server acknowledged the attention; the session is reusable.
    assert_eq!(session.state(), SessionState::LoggedIn);
    let mut retry = items_bulk_load();
    assert!(session
        .execute_bulk_load(&mut retry, rows(item_rows(1)))
        .await
        .is_ok());

    drop(session);
    server.await.expect("server task");
}

#[tokio::test]
async fn cancel_after_completion_is_a_no_op() {
    let (mut session, server) = harness(ServerBehavior {
        row_count: 1,
        ..Default::default()
    });

    let mut bulk = items_bulk_load();
    let handle = bulk.handle();
    session
        .execute_bulk_load(&mut bulk, rows(item_rows(1)))
        .await
        .expect("bulk load");

    handle.cancel();
    handle.cancel();

    assert_eq!(bulk.phase(), BulkLoadPhase::Completed);
    assert_eq!(session.state(), SessionState::LoggedIn);

    drop(session);
    server.await.expect("server task");
}

/// Source that produces one row and then stalls well past any timeout.
struct StallingSource {
    yielded: bool,
}

impl RowSource for StallingSource {
    async fn try_next(&mut self) -> Result<Option<BulkRow>, Error> {
        if !self.yielded {
            self.yielded = true;
            return Ok(Some(BulkRow::Tuple(vec![
                SqlValue::Int(1),
                SqlValue::String("first".into()),
            ])));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(None)
    }
}

#[tokio::test(start_paused = true)]
async fn timeout_fires_with_exact_message() {
    let (mut session, server) = harness(ServerBehavior::default());

    let mut bulk = items_bulk_load();
    bulk.set_timeout(Some(Duration::from_millis(200)));

    let err = session
        .execute_bulk_load(&mut bulk, StallingSource { yielded: false })
        .await
        .expect_err("timer fires");

    assert!(matches!(err, Error::Timeout { ms: 200 }));
    assert_eq!(
        err.to_string(),
        "Timeout: Request failed to complete in 200ms"
    );
    assert_eq!(bulk.phase(), BulkLoadPhase::Cancelled);
    assert_eq!(session.state(), SessionState::LoggedIn);

    drop(session);
    server.await.expect("server task");
}

#[tokio::test(start_paused = true)]
async fn completion_before_timeout_disarms_the_timer() {
    let (mut session, server) = harness(ServerBehavior {
        row_count: 2,
        ..Default::default()
    });

    let mut bulk = items_bulk_load();
    bulk.set_timeout(Some(Duration::from_secs(30)));

    let count = session
        .execute_bulk_load(&mut bulk, rows(item_rows(2)))
        .await
        .expect("completes first");
    assert_eq!(count, 2);

    // Sail past the configured timeout; the settled load is untouched.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(bulk.phase(), BulkLoadPhase::Completed);
    assert_eq!(session.state(), SessionState::LoggedIn);

    drop(session);
    server.await.expect("server task");
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_cancel_tears_down_the_session() {
    let (mut session, server) = harness(ServerBehavior {
        ignore_attention: true,
        ..Default::default()
    });

    let mut bulk = items_bulk_load();
    let source = PacedSource {
        yielded: 0,
        cancel_at: 2,
        handle: bulk.handle(),
    };

    let err = session
        .execute_bulk_load(&mut bulk, source)
        .await
        .expect_err("cancelled");
    assert!(matches!(err, Error::Canceled));

    // No ack within cancel_timeout: the session is gone.
    assert_eq!(session.state(), SessionState::Final);
    assert_eq!(session.state_name(), "Final");

    let mut retry = items_bulk_load();
    let err = session
        .execute_bulk_load(&mut retry, rows(item_rows(1)))
        .await
        .expect_err("session is final");
    assert!(matches!(err, Error::BulkInput(_)));

    drop(session);
    server.abort();
}

#[tokio::test]
async fn add_column_fails_after_execution_even_for_async_sources() {
    let (mut session, server) = harness(ServerBehavior {
        row_count: 1,
        ..Default::default()
    });

    let mut bulk = items_bulk_load();
    let stream = futures_util::stream::iter(vec![Ok::<_, Error>(vec![
        SqlValue::Int(1),
        SqlValue::String("a".into()),
    ])]);
    session
        .execute_bulk_load(&mut bulk, tabstream_client::row_stream(stream))
        .await
        .expect("bulk load");

    let err = bulk
        .add_column("late", SqlType::Int, ColumnOptions::default())
        .expect_err("configuration is frozen");
    assert_eq!(
        err.to_string(),
        "Columns cannot be added to bulk insert after execution has started."
    );

    drop(session);
    server.await.expect("server task");
}

#[tokio::test]
async fn keep_nulls_load_sends_null_markers() {
    let (mut session, server) = harness(ServerBehavior {
        row_count: 1,
        ..Default::default()
    });

    let options = BulkLoadOptions {
        keep_nulls: true,
        ..Default::default()
    };
    let mut bulk = BulkLoad::new("[dbo].[defaulted]", options).expect("options");
    bulk.add_column(
        "id",
        SqlType::Int,
        ColumnOptions {
            nullable: true,
            obj_name: None,
        },
    )
    .expect("column");

    assert!(bulk.insert_bulk_sql().contains("with (KEEP_NULLS)"));

    session
        .execute_bulk_load(&mut bulk, rows(vec![vec![SqlValue::Null]]))
        .await
        .expect("bulk load");
    drop(session);

    let payload = server.await.expect("server task");
    let mut parser = TokenStreamParser::new(TdsVersion::V7_4);
    parser.extend(&payload);

    assert!(matches!(
        parser.try_next().expect("parse").expect("token"),
        Token::ColMetaData(_)
    ));
    match parser.try_next().expect("parse").expect("token") {
        // A zero length under the nullable IntN wire type is the NULL marker.
        Token::Row(row) => assert_eq!(&row.data[..], &[0x00]),
        other => panic!("expected Row, got {other:?}"),
    }
}

//! Split I/O connection with out-of-band cancellation.
//!
//! The transport splits into read and write halves so an Attention
//! packet can go out while the owner is blocked reading a response.
//! The write half sends one packet at a time through the sink, so the
//! producer never runs more than a packet ahead of the transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tabstream_protocol::packet::{PacketHeader, PacketStatus, PacketType};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, Notify};

use crate::error::CodecError;
use crate::framed::{PacketReader, PacketWriter};
use crate::message::{Message, MessageAssembler};
use crate::packet_codec::Packet;

/// A TDS connection with split I/O.
///
/// Owns the transport for its whole lifetime; dropping the connection
/// releases both halves on every exit path.
pub struct Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    reader: PacketReader<ReadHalf<T>>,
    writer: Arc<Mutex<PacketWriter<WriteHalf<T>>>>,
    assembler: MessageAssembler,
    packet_size: usize,
    cancelling: Arc<AtomicBool>,
    cancel_notify: Arc<Notify>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a new connection from a transport.
    pub fn new(transport: T) -> Self {
        Self::with_packet_size(transport, tabstream_protocol::packet::DEFAULT_PACKET_SIZE)
    }

    /// Create a new connection with a pre-negotiated packet size.
    pub fn with_packet_size(transport: T, size: usize) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);

        let mut reader = PacketReader::new(read_half);
        reader.codec_mut().set_packet_size(size);
        let mut writer = PacketWriter::new(write_half);
        writer.codec_mut().set_packet_size(size);
        let packet_size = reader.codec().packet_size();

        Self {
            reader,
            writer: Arc::new(Mutex::new(writer)),
            assembler: MessageAssembler::new(),
            packet_size,
            cancelling: Arc::new(AtomicBool::new(false)),
            cancel_notify: Arc::new(Notify::new()),
        }
    }

    /// The negotiated packet size.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Apply a server-negotiated packet size to both codec halves.
    pub async fn set_packet_size(&mut self, size: usize) {
        self.reader.codec_mut().set_packet_size(size);
        let mut writer = self.writer.lock().await;
        writer.codec_mut().set_packet_size(size);
        self.packet_size = writer.codec().packet_size();
    }

    /// Get a handle for cancelling the active request from another task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle<T> {
        CancelHandle {
            writer: Arc::clone(&self.writer),
            cancelling: Arc::clone(&self.cancelling),
            notify: Arc::clone(&self.cancel_notify),
        }
    }

    /// Check if a cancellation is currently in progress.
    #[must_use]
    pub fn is_cancelling(&self) -> bool {
        self.cancelling.load(Ordering::Acquire)
    }

    /// Mark the in-progress cancellation as acknowledged.
    ///
    /// Called by the session once the attention-acknowledging DONE has
    /// been consumed; wakes any `wait_cancelled` callers.
    pub fn clear_cancelling(&self) {
        self.cancelling.store(false, Ordering::Release);
        self.cancel_notify.notify_waiters();
    }

    /// Read a single packet from the connection.
    pub async fn read_packet(&mut self) -> Result<Option<Packet>, CodecError> {
        match self.reader.next().await {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }

    /// Read the next complete message, reassembling multi-packet bodies.
    ///
    /// `Ok(None)` means the transport closed cleanly between messages;
    /// closing mid-message is an error.
    pub async fn read_message(&mut self) -> Result<Option<Message>, CodecError> {
        loop {
            match self.reader.next().await {
                Some(Ok(packet)) => {
                    if let Some(message) = self.assembler.push(packet) {
                        return Ok(Some(message));
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    if self.assembler.has_partial() {
                        return Err(CodecError::ConnectionClosed);
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Send a single packet.
    pub async fn send_packet(&mut self, packet: Packet) -> Result<(), CodecError> {
        let mut writer = self.writer.lock().await;
        writer.send(packet).await
    }

    /// Send a complete message, fragmenting at the negotiated size.
    ///
    /// The END_OF_MESSAGE bit goes on the final packet only. Each packet
    /// is flushed before the next is queued, so the transport's write
    /// buffer bounds how far ahead the caller can run.
    pub async fn send_message(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
    ) -> Result<(), CodecError> {
        let max_payload = self.packet_size - tabstream_protocol::packet::PACKET_HEADER_SIZE;

        let mut writer = self.writer.lock().await;

        if payload.is_empty() {
            let header = PacketHeader::new(packet_type, PacketStatus::END_OF_MESSAGE, 0);
            writer.send(Packet::new(header, BytesMut::new())).await?;
            return Ok(());
        }

        let total_chunks = payload.len().div_ceil(max_payload);
        for (i, chunk) in payload.chunks(max_payload).enumerate() {
            let status = if i == total_chunks - 1 {
                PacketStatus::END_OF_MESSAGE
            } else {
                PacketStatus::NORMAL
            };

            let header = PacketHeader::new(packet_type, status, 0);
            writer.send(Packet::new(header, BytesMut::from(chunk))).await?;
        }

        Ok(())
    }

    /// Send a non-final fragment of an in-progress message.
    ///
    /// Used by streaming producers (the bulk engine) that flush a
    /// packet's worth of bytes at a time; the message is ended later by
    /// [`Connection::finish_message`].
    pub async fn send_fragment(
        &mut self,
        packet_type: PacketType,
        payload: BytesMut,
    ) -> Result<(), CodecError> {
        let header = PacketHeader::new(packet_type, PacketStatus::NORMAL, 0);
        let mut writer = self.writer.lock().await;
        writer.send(Packet::new(header, payload)).await
    }

    /// Send the final fragment of an in-progress message with EOM set.
    pub async fn finish_message(
        &mut self,
        packet_type: PacketType,
        payload: BytesMut,
    ) -> Result<(), CodecError> {
        let header = PacketHeader::new(packet_type, PacketStatus::END_OF_MESSAGE, 0);
        let mut writer = self.writer.lock().await;
        writer.send(Packet::new(header, payload)).await
    }

    /// Send an Attention packet, asking the server to abort the active
    /// request. Idempotent: repeated calls while a cancel is pending do
    /// nothing.
    pub async fn send_attention(&mut self) -> Result<(), CodecError> {
        if self.cancelling.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        send_attention_packet(&self.writer).await
    }

    /// Flush the write buffer.
    pub async fn flush(&mut self) -> Result<(), CodecError> {
        let mut writer = self.writer.lock().await;
        writer.flush().await
    }
}

impl<T> std::fmt::Debug for Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("packet_size", &self.packet_size)
            .field("cancelling", &self.is_cancelling())
            .field("has_partial_message", &self.assembler.has_partial())
            .finish_non_exhaustive()
    }
}

async fn send_attention_packet<T>(
    writer: &Arc<Mutex<PacketWriter<WriteHalf<T>>>>,
) -> Result<(), CodecError>
where
    T: AsyncRead + AsyncWrite,
{
    tracing::debug!("sending attention packet");

    let header = PacketHeader::new(PacketType::Attention, PacketStatus::END_OF_MESSAGE, 0);
    let mut writer = writer.lock().await;
    writer.send(Packet::new(header, BytesMut::new())).await?;
    writer.flush().await
}

/// Handle for cancelling the active request on a connection.
///
/// Clonable and sendable to other tasks; the handle shares the write
/// half with the connection, so an Attention packet can go out while
/// the connection's owner is blocked reading.
pub struct CancelHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    writer: Arc<Mutex<PacketWriter<WriteHalf<T>>>>,
    cancelling: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl<T> CancelHandle<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Send an Attention packet to cancel the active request.
    ///
    /// Idempotent: only the first call per request sends anything.
    pub async fn cancel(&self) -> Result<(), CodecError> {
        if self.cancelling.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        send_attention_packet(&self.writer).await
    }

    /// Wait until the server acknowledges the cancellation.
    pub async fn wait_cancelled(&self) {
        while self.cancelling.load(Ordering::Acquire) {
            self.notify.notified().await;
        }
    }

    /// Check if a cancellation is currently in progress.
    #[must_use]
    pub fn is_cancelling(&self) -> bool {
        self.cancelling.load(Ordering::Acquire)
    }
}

impl<T> Clone for CancelHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            cancelling: Arc::clone(&self.cancelling),
            notify: Arc::clone(&self.notify),
        }
    }
}

impl<T> std::fmt::Debug for CancelHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelling", &self.cancelling.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

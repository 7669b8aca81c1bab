/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Tokio session driver.
//!
//! Pumps one TCP (or in-memory) byte stream through a session state machine:
//! inbound bytes are framed, parsed, and dispatched to `on_message`; the
//! session's outbound stream is drained onto the socket; a periodic tick
//! drives `poll` for heartbeats, retries, and timers. The state machine
//! itself stays synchronous - the driver is the only async code.

use crate::application::Application;
use bytes::{Bytes, BytesMut};
use irongate_core::clock::EpochNanoClock;
use irongate_core::error::GatewayError;
use irongate_core::types::DisconnectReason;
use irongate_session::Session;
use irongate_session::state::{Action, SessionState};
use irongate_tagvalue::Decoder as MessageDecoder;
use irongate_transport::codec::FixFramingCodec;
use irongate_transport::stream::{FrameHeader, StreamSubscription};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

/// Drives one session over one connection.
pub struct SessionDriver<A: Application> {
    session: Session,
    outbound: Box<dyn StreamSubscription + Send>,
    application: Arc<A>,
    clock: Arc<dyn EpochNanoClock>,
    poll_interval: Duration,
    read_buffer_size: usize,
}

impl<A: Application> SessionDriver<A> {
    /// Creates a driver for the given session.
    ///
    /// # Arguments
    /// * `session` - The session state machine to drive
    /// * `outbound` - Subscription over the session's outbound stream
    /// * `application` - Callback target for delivered messages
    /// * `clock` - Clock shared with the session
    #[must_use]
    pub fn new(
        session: Session,
        outbound: Box<dyn StreamSubscription + Send>,
        application: Arc<A>,
        clock: Arc<dyn EpochNanoClock>,
    ) -> Self {
        Self {
            session,
            outbound,
            application,
            clock,
            poll_interval: Duration::from_millis(10),
            read_buffer_size: 64 * 1024,
        }
    }

    /// Sets the poll tick interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs the session until it disconnects.
    ///
    /// # Returns
    /// The recorded disconnect reason.
    ///
    /// # Errors
    /// Returns `GatewayError` on socket failures.
    pub async fn run<S>(mut self, stream: S) -> Result<DisconnectReason, GatewayError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut read_buf = BytesMut::with_capacity(self.read_buffer_size);
        let mut codec = FixFramingCodec::new();
        let mut ticker = tokio::time::interval(self.poll_interval);
        let mut was_active = false;

        loop {
            tokio::select! {
                read = reader.read_buf(&mut read_buf) => {
                    match read {
                        Ok(0) => {
                            debug!(session_id = %self.session.session_id(), "peer closed connection");
                            self.session.on_disconnect();
                        }
                        Ok(_) => {
                            if let Err(error) = self.process_inbound(&mut codec, &mut read_buf).await {
                                warn!(%error, "inbound framing failed");
                                self.session
                                    .request_disconnect(DisconnectReason::InvalidFixMessage);
                            }
                        }
                        Err(error) => {
                            self.session.on_disconnect();
                            self.finish().await;
                            return Err(error.into());
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.session.poll(self.clock.nanos());
                }
            }

            self.pump_outbound(&mut writer).await?;
            writer.flush().await?;

            if !was_active && self.session.state() == SessionState::Active {
                was_active = true;
                self.application
                    .on_session_active(self.session.session_id())
                    .await;
            }

            if self.session.state() == SessionState::Disconnected {
                return Ok(self.finish().await);
            }
        }
    }

    /// Frames and dispatches every complete message in the read buffer.
    async fn process_inbound(
        &mut self,
        codec: &mut FixFramingCodec,
        read_buf: &mut BytesMut,
    ) -> Result<(), GatewayError> {
        while let Some(frame) = codec.decode(read_buf)? {
            let message = match MessageDecoder::new(&frame).decode() {
                Ok(message) => message,
                Err(error) => {
                    warn!(%error, "unparseable message");
                    self.session
                        .request_disconnect(DisconnectReason::InvalidFixMessage);
                    return Ok(());
                }
            };

            let action = self.session.on_message(&message, self.clock.nanos());
            match action {
                Action::Deliver(messages) => {
                    for delivered in messages {
                        self.application
                            .on_message(self.session.session_id(), delivered)
                            .await;
                    }
                }
                Action::Disconnect(reason) => {
                    debug!(%reason, "session disconnecting");
                }
                Action::None | Action::Consume | Action::Queue => {}
            }
        }
        Ok(())
    }

    /// Drains the session's outbound stream onto the socket.
    async fn pump_outbound<W>(&mut self, writer: &mut W) -> Result<(), GatewayError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut frames: Vec<Bytes> = Vec::new();
        {
            let mut handler = |_header: &FrameHeader, payload: &[u8]| {
                frames.push(Bytes::copy_from_slice(payload));
            };
            self.outbound.poll(&mut handler, 64);
        }
        for frame in frames {
            writer.write_all(&frame).await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> DisconnectReason {
        let reason = self
            .session
            .disconnect_reason()
            .unwrap_or(DisconnectReason::RemoteDisconnect);
        self.application
            .on_disconnect(self.session.session_id(), reason)
            .await;
        reason
    }
}

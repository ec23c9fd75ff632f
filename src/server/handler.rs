//! Per-connection handler
//!
//! Reads frames off one accepted socket and answers each request on the
//! same correlation.

use anyhow::Result;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, instrument, trace};

use super::dispatcher::RequestDispatcher;
use crate::metrics::METRICS;
use crate::protocol::{ControlKind, Frame};

/// Handles a single accepted connection
pub struct ConnectionHandler {
    dispatcher: RequestDispatcher,
    response_delay: Duration,
    max_frame_len: usize,
}

impl ConnectionHandler {
    pub fn new(response_delay: Duration, max_frame_len: usize) -> Self {
        Self {
            dispatcher: RequestDispatcher::new(),
            response_delay,
            max_frame_len,
        }
    }

    /// Serve `stream` until the peer leaves or shutdown is signalled
    #[instrument(skip(self, stream, shutdown_rx))]
    pub async fn handle(
        self,
        stream: TcpStream,
        peer: SocketAddr,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        METRICS.server_connection_opened();
        debug!("Connection established");

        let result = tokio::select! {
            result = self.serve(stream) => result,
            _ = shutdown_rx.changed() => {
                debug!("Connection closed by shutdown");
                Ok(())
            }
        };

        METRICS.server_connection_closed();
        match &result {
            Ok(()) => debug!("Connection closed normally"),
            Err(e) => debug!(error = %e, "Connection closed with error"),
        }
        result
    }

    async fn serve(&self, mut stream: TcpStream) -> Result<()> {
        let mut read_buf = BytesMut::with_capacity(4096);
        let mut write_buf = BytesMut::with_capacity(4096);

        loop {
            while let Some(frame) = Frame::decode(&mut read_buf, self.max_frame_len)? {
                match frame {
                    Frame::RequestResponse { correlation, body } => {
                        if !self.response_delay.is_zero() {
                            tokio::time::sleep(self.response_delay).await;
                        }

                        let response = self.dispatcher.dispatch(&body);
                        METRICS.server_request();
                        trace!(request_id = correlation.request_id, "Answering request");

                        write_buf.clear();
                        Frame::RequestResponse {
                            correlation,
                            body: response.encode(),
                        }
                        .encode(&mut write_buf);
                        stream.write_all(&write_buf).await?;
                    }
                    Frame::Control(ControlKind::Close | ControlKind::EndOfStream) => {
                        debug!("Peer closed session");
                        return Ok(());
                    }
                    other => trace!(frame = ?other, "Ignoring frame"),
                }
            }

            if stream.read_buf(&mut read_buf).await? == 0 {
                return Ok(());
            }
        }
    }
}

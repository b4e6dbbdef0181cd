//! Broker Connection: one TCP connection to one broker, framing requests and
//! demultiplexing responses by correlation id.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::transport::{Transport, TlsConfig};
use crate::protocol::messages::{decode_body, encode_body, RequestBody, RequestHeader};
use crate::protocol::traits::{ReadType, WriteType};

/// Used for calls that don't carry their own request timeout (metadata
/// refreshes); `Producer` instead drives its own `config.timeout_ms`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The default cap on concurrent pending requests per Broker Connection,
/// matching `maxInFlightRequestsPerConnection`'s documented default.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 5;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequestError {
    #[error("connection is broken or closed")]
    ConnectionLost,

    #[error("request was canceled")]
    Canceled,

    #[error("request timed out")]
    RequestTimedOut,

    #[error("I/O error: {0}")]
    IO(#[from] std::io::Error),

    #[error("protocol error decoding response: {0}")]
    Decode(#[from] crate::protocol::traits::ReadError),

    #[error("protocol error encoding request: {0}")]
    Encode(#[from] crate::protocol::traits::WriteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    /// `New`/`Connecting` are transient and fully contained within
    /// [`Messenger::connect`]; a `Messenger` value only ever exists once a
    /// TCP connect has already succeeded.
    Ready,
    Broken,
    Closed,
}

/// Why a pending waiter was failed out from under it, rather than
/// completed with a response body. Kept distinct from `RequestError` so
/// the read loop and `close()`/`mark_broken()` don't need to construct
/// (or clone) a full error value just to signal one of two outcomes.
#[derive(Debug, Clone, Copy)]
enum PendingFailure {
    /// The connection died (I/O error, EOF, or a caller found it already
    /// dead): surfaced as [`RequestError::ConnectionLost`].
    Broken,
    /// `close()` was called with this request still outstanding:
    /// surfaced as [`RequestError::Canceled`].
    Closed,
}

type PendingMap = Arc<Mutex<HashMap<i32, oneshot::Sender<Result<Vec<u8>, PendingFailure>>>>>;

fn fail_all_pending(pending: &PendingMap, reason: PendingFailure) {
    let waiters = std::mem::take(&mut *pending.lock());
    for (_, tx) in waiters {
        let _ = tx.send(Err(reason));
    }
}

/// Owns a single TCP connection to one broker.
#[derive(Debug)]
pub struct Messenger {
    client_id: Arc<str>,
    state: Mutex<ConnectionState>,
    write_half: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: PendingMap,
    next_correlation_id: AtomicI32,
    /// Bounds concurrent outstanding (response-expecting) requests on this
    /// connection to `maxInFlightRequestsPerConnection`.
    in_flight: Semaphore,
    read_task: JoinHandle<()>,
}

impl Drop for Messenger {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

impl Messenger {
    pub async fn connect(
        broker: &str,
        client_id: Arc<str>,
        connect_timeout: Option<Duration>,
        max_in_flight: usize,
    ) -> Result<Self, super::transport::Error> {
        let transport = Transport::connect(broker, TlsConfig::default(), connect_timeout).await?;
        let (mut read_half, write_half) = transport.into_split();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let pending_for_task = Arc::clone(&pending);
        let broker_label = broker.to_string();

        let read_task = tokio::spawn(async move {
            loop {
                let size = match read_half.read_i32().await {
                    Ok(s) => s,
                    Err(e) => {
                        debug!(broker = %broker_label, error = %e, "read loop ending");
                        break;
                    }
                };
                let size = match usize::try_from(size) {
                    Ok(s) => s,
                    Err(_) => break,
                };

                let mut buf = vec![0u8; size];
                if let Err(e) = read_half.read_exact(&mut buf).await {
                    debug!(broker = %broker_label, error = %e, "read loop ending mid-frame");
                    break;
                }

                if buf.len() < 4 {
                    warn!(broker = %broker_label, "response frame shorter than a correlation id");
                    continue;
                }
                let correlation_id = i32::from_be_bytes(buf[0..4].try_into().unwrap());
                let body = buf[4..].to_vec();

                let waiter = pending_for_task.lock().remove(&correlation_id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(Ok(body));
                    }
                    None => {
                        debug!(
                            broker = %broker_label,
                            correlation_id,
                            "discarding response with no pending waiter"
                        );
                    }
                }
            }

            // connection broken: fail every outstanding waiter.
            fail_all_pending(&pending_for_task, PendingFailure::Broken);
        });

        Ok(Self {
            client_id,
            state: Mutex::new(ConnectionState::Ready),
            write_half: tokio::sync::Mutex::new(write_half),
            pending,
            next_correlation_id: AtomicI32::new(0),
            in_flight: Semaphore::new(max_in_flight.max(1)),
            read_task,
        })
    }

    fn next_correlation_id(&self) -> i32 {
        // wraps at i32::MAX back to 0, per the Broker Connection contract.
        self.next_correlation_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(if v == i32::MAX { 0 } else { v + 1 })
            })
            .unwrap()
    }

    fn mark_broken(&self) {
        let mut state = self.state.lock();
        if *state == ConnectionState::Ready {
            *state = ConnectionState::Broken;
        }
        drop(state);
        fail_all_pending(&self.pending, PendingFailure::Broken);
    }

    /// Encodes and sends one request, awaiting its response unless
    /// `request.API_KEY` is Produce with `acks = 0` (see
    /// [`Self::request_fire_and_forget`] for that path, which callers
    /// select explicitly since only the Produce caller knows `acks`).
    ///
    /// `timeout` is measured from the moment the request is handed to the
    /// write half, per the Broker Connection's per-request timeout
    /// contract: it never tears down the connection, it only fails this
    /// one caller with [`RequestError::RequestTimedOut`].
    pub async fn request<R>(&self, request: &R, timeout: Duration) -> Result<R::ResponseBody, RequestError>
    where
        R: RequestBody,
    {
        let body = self.send(request, true, Some(timeout)).await?;
        Ok(decode_body(body)?)
    }

    /// Sends a request for which the broker sends no response at all
    /// (Produce with `acks = 0`): no correlation-id waiter is ever
    /// registered, so no request timeout applies either.
    pub async fn request_fire_and_forget<R>(&self, request: &R) -> Result<(), RequestError>
    where
        R: RequestBody,
    {
        self.send(request, false, None).await?;
        Ok(())
    }

    async fn send<R>(
        &self,
        request: &R,
        expect_response: bool,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, RequestError>
    where
        R: RequestBody,
    {
        {
            let state = *self.state.lock();
            if state != ConnectionState::Ready {
                return Err(RequestError::ConnectionLost);
            }
        }

        // Acquired before the frame is even written, so a caller past the
        // in-flight cap waits rather than piling more bytes onto the wire
        // than the broker connection is configured to have outstanding.
        let _permit = if expect_response {
            Some(
                self.in_flight
                    .acquire()
                    .await
                    .map_err(|_| RequestError::ConnectionLost)?,
            )
        } else {
            None
        };

        let correlation_id = self.next_correlation_id();
        let header = RequestHeader {
            api_key: R::API_KEY,
            api_version: R::API_VERSION,
            correlation_id,
            client_id: self.client_id.to_string(),
        };

        let mut frame_body = Vec::new();
        header.write(&mut frame_body)?;
        frame_body.extend_from_slice(&encode_body(request)?);

        let rx = if expect_response {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().insert(correlation_id, tx);
            Some(rx)
        } else {
            None
        };

        let mut framed = Vec::with_capacity(4 + frame_body.len());
        (frame_body.len() as i32).write(&mut framed)?;
        framed.extend_from_slice(&frame_body);

        // Holding the write-half mutex for the whole write makes the
        // size-prefix and body an atomic span on the wire across concurrent
        // callers -- this is the writeQueue FIFO.
        let write_result = {
            let mut w = self.write_half.lock().await;
            w.write_all(&framed).await
        };

        if let Err(e) = write_result {
            self.mark_broken();
            return Err(RequestError::IO(e));
        }

        let rx = match rx {
            Some(rx) => rx,
            None => return Ok(Vec::new()),
        };

        let outcome = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(received) => received,
                Err(_elapsed) => {
                    self.pending.lock().remove(&correlation_id);
                    return Err(RequestError::RequestTimedOut);
                }
            },
            None => rx.await,
        };

        match outcome {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(PendingFailure::Broken)) => Err(RequestError::ConnectionLost),
            Ok(Err(PendingFailure::Closed)) => Err(RequestError::Canceled),
            // The sender was dropped without sending at all; this only
            // happens if the read task panicked mid-completion.
            Err(_recv_error) => Err(RequestError::ConnectionLost),
        }
    }

    pub async fn close(&self) {
        let mut state = self.state.lock();
        *state = ConnectionState::Closed;
        drop(state);

        fail_all_pending(&self.pending, PendingFailure::Closed);

        self.read_task.abort();
    }

    pub fn is_ready(&self) -> bool {
        *self.state.lock() == ConnectionState::Ready
    }
}

/// Decodes a raw response body against an expected [`RequestBody`], used by
/// call sites that already have raw bytes (kept for the in-process fake
/// broker test harness).
pub fn decode_response<R: RequestBody>(buf: Vec<u8>) -> Result<R::ResponseBody, RequestError> {
    let mut cursor = Cursor::new(buf);
    Ok(R::ResponseBody::read(&mut cursor)?)
}

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use spaceloop_transport::{RequestId, SynthResponse, SynthesisService};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::protocol::{WireResponse, decode_response, encode_request};

#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("could not connect to synthesis service: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("synthesis service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("could not start synthesis thread: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("synthesis thread ended before connecting")]
    Closed,
}

/// WebSocket client for the synthesis service.
///
/// The socket lives on its own thread with a single-threaded tokio runtime.
/// Responses are queued there and only handed out by [`SynthClient::poll`],
/// so they are applied on whichever thread drives the sequencer.
pub struct SynthClient {
    requests: Option<mpsc::UnboundedSender<String>>,
    responses: crossbeam_channel::Receiver<WireResponse>,
    alive: Arc<AtomicBool>,
    /// Unanswered requests by their id on the wire.
    pending: HashMap<i32, RequestId>,
    next_id: u64,
}

impl SynthClient {
    /// Connect to `url`, waiting at most `timeout` for the handshake.
    pub fn connect(url: &str, timeout: Duration) -> Result<Self, SynthError> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let alive = Arc::new(AtomicBool::new(false));

        let url = url.to_string();
        let connection_alive = Arc::clone(&alive);
        thread::Builder::new()
            .name("synth-client".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(SynthError::Runtime(e)));
                        return;
                    }
                };
                runtime.block_on(run_connection(
                    url,
                    timeout,
                    request_rx,
                    response_tx,
                    connection_alive,
                    ready_tx,
                ));
            })?;

        ready_rx.recv().map_err(|_| SynthError::Closed)??;

        Ok(Self {
            requests: Some(request_tx),
            responses: response_rx,
            alive,
            pending: HashMap::new(),
            next_id: 0,
        })
    }

    /// A client that was never connected. Every request is dropped.
    pub fn offline() -> Self {
        let (_, responses) = crossbeam_channel::unbounded();
        Self {
            requests: None,
            responses,
            alive: Arc::new(AtomicBool::new(false)),
            pending: HashMap::new(),
            next_id: 0,
        }
    }

    /// Requests issued and not yet answered.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl SynthesisService for SynthClient {
    fn request(&mut self, values: &[f32]) -> Option<RequestId> {
        let Some(requests) = self.requests.as_ref().filter(|_| self.is_alive()) else {
            log::error!("synthesis service not connected, request dropped");
            return None;
        };

        let id = RequestId(self.next_id);
        let wire_id = wire_id(id);
        let message = match encode_request(wire_id, values) {
            Ok(message) => message,
            Err(e) => {
                log::error!("could not encode synthesis request: {e}");
                return None;
            }
        };
        if requests.send(message).is_err() {
            self.alive.store(false, Ordering::Release);
            log::error!("synthesis connection is gone, request dropped");
            return None;
        }

        self.next_id += 1;
        self.pending.insert(wire_id, id);
        Some(id)
    }

    fn poll(&mut self) -> Vec<SynthResponse> {
        let mut answered = Vec::new();
        for response in self.responses.try_iter() {
            match self.pending.remove(&response.id) {
                Some(id) => answered.push(SynthResponse {
                    id,
                    samples: response.samples,
                }),
                None => log::warn!("discarding response for unknown request {}", response.id),
            }
        }
        answered
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

/// The low 32 bits of the issue sequence. Only unanswered ids need to be
/// distinct on the wire.
fn wire_id(id: RequestId) -> i32 {
    id.0 as u32 as i32
}

async fn run_connection(
    url: String,
    timeout: Duration,
    mut requests: mpsc::UnboundedReceiver<String>,
    responses: crossbeam_channel::Sender<WireResponse>,
    alive: Arc<AtomicBool>,
    ready: crossbeam_channel::Sender<Result<(), SynthError>>,
) {
    let stream = match tokio::time::timeout(timeout, connect_async(url.as_str())).await {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => {
            let _ = ready.send(Err(SynthError::Connect(e)));
            return;
        }
        Err(_) => {
            let _ = ready.send(Err(SynthError::Timeout(timeout)));
            return;
        }
    };

    alive.store(true, Ordering::Release);
    let _ = ready.send(Ok(()));
    log::info!("connected to synthesis service at {url}");

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(text) => {
                    if let Err(e) = write.send(Message::text(text)).await {
                        log::error!("synthesis request failed: {e}");
                        break;
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Binary(bytes))) => match decode_response(&bytes) {
                    Ok(response) => {
                        if responses.send(response).is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("malformed synthesis response: {e}"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    log::info!("synthesis service closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::error!("synthesis connection failed: {e}");
                    break;
                }
            },
        }
    }
    alive.store(false, Ordering::Release);
}

//! UDP transport: receive, validate, queue, dispatch to workers, reply.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::inbound::InboundQueue;
use super::wire::{ValidationError, validate_datagram};
use crate::config::GatewayConfig;
use crate::workers::{InboundTask, TaskResponse, WorkerPool};

#[derive(Debug, Default)]
struct GatewayStats {
    received: AtomicU64,
    oversized: AtomicU64,
    invalid: AtomicU64,
    responded: AtomicU64,
    unsent: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatsSnapshot {
    pub received: u64,
    pub oversized: u64,
    pub invalid: u64,
    /// Refused because the inbound queue was full.
    pub dropped: u64,
    pub responded: u64,
    /// Responses that could not be sent.
    pub unsent: u64,
    pub queued: usize,
}

pub struct TransportGateway {
    socket: Arc<UdpSocket>,
    inbound: InboundQueue<(InboundTask, SocketAddr)>,
    pool: Arc<WorkerPool>,
    max_datagram_bytes: usize,
    tick: Duration,
    stats: GatewayStats,
}

impl TransportGateway {
    pub async fn bind(config: &GatewayConfig, pool: Arc<WorkerPool>) -> io::Result<Self> {
        let socket = UdpSocket::bind(&config.bind).await?;
        tracing::info!(addr = %socket.local_addr()?, "datagram gateway bound");
        Ok(Self {
            socket: Arc::new(socket),
            inbound: InboundQueue::new(config.queue_capacity),
            pool,
            max_datagram_bytes: config.max_datagram_bytes,
            tick: Duration::from_millis(config.tick_ms.max(1)),
            stats: GatewayStats::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Validates one datagram and queues it. Never blocks.
    ///
    /// Returns `true` when the task was queued. Invalid datagrams are dropped without reply.
    pub fn handle_datagram(&self, bytes: &[u8], peer: SocketAddr) -> bool {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_datagram_received();

        let task = match validate_datagram(bytes, self.max_datagram_bytes) {
            Ok(task) => task,
            Err(e) => {
                let counter = match &e {
                    ValidationError::Oversized { .. } => &self.stats.oversized,
                    ValidationError::Malformed(_) => &self.stats.invalid,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_datagram_dropped(e.reason());
                tracing::debug!(peer = %peer, error = %e, "datagram dropped");
                return false;
            }
        };

        let task_id = task.id.clone();
        if self.inbound.push((task, peer)) {
            true
        } else {
            crate::metrics::record_datagram_dropped("overflow");
            tracing::warn!(
                peer = %peer,
                task_id = %task_id,
                dropped = self.inbound.dropped(),
                "inbound queue full, datagram dropped"
            );
            false
        }
    }

    pub fn stats(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            received: self.stats.received.load(Ordering::Relaxed),
            oversized: self.stats.oversized.load(Ordering::Relaxed),
            invalid: self.stats.invalid.load(Ordering::Relaxed),
            dropped: self.inbound.dropped(),
            responded: self.stats.responded.load(Ordering::Relaxed),
            unsent: self.stats.unsent.load(Ordering::Relaxed),
            queued: self.inbound.len(),
        }
    }

    /// Spawns the receive, dispatch and response loops. All of them exit on `cancel`.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let (responses_tx, responses_rx) = mpsc::channel(self.inbound.capacity());
        vec![
            tokio::spawn(Arc::clone(self).receive_loop(cancel.clone())),
            tokio::spawn(Arc::clone(self).dispatch_loop(responses_tx, cancel.clone())),
            tokio::spawn(Arc::clone(self).respond_loop(responses_rx, cancel)),
        ]
    }

    async fn receive_loop(self: Arc<Self>, cancel: CancellationToken) {
        // One extra byte so an oversized datagram is seen as oversized rather than truncated
        let mut buf = vec![0u8; self.max_datagram_bytes + 1];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => {
                        self.handle_datagram(&buf[..len], peer);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "datagram receive failed");
                    }
                },
            }
        }
        tracing::debug!("gateway receive loop stopped");
    }

    async fn dispatch_loop(
        self: Arc<Self>,
        responses: mpsc::Sender<(SocketAddr, TaskResponse)>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some((task, peer)) = self.inbound.pop() else {
                continue;
            };

            let worker = self.pool.next_worker();
            let responses = responses.clone();
            let gateway = Arc::clone(&self);
            tokio::spawn(async move {
                tracing::trace!(worker = worker.id(), task_id = %task.id, "task dispatched");
                let response = worker.process(task).await;
                if let Err(e) = responses.try_send((peer, response)) {
                    gateway.stats.unsent.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(peer = %peer, error = %e, "response dropped");
                }
            });
        }
        tracing::debug!("gateway dispatch loop stopped");
    }

    async fn respond_loop(
        self: Arc<Self>,
        mut responses: mpsc::Receiver<(SocketAddr, TaskResponse)>,
        cancel: CancellationToken,
    ) {
        loop {
            let (peer, response) = tokio::select! {
                _ = cancel.cancelled() => break,
                next = responses.recv() => match next {
                    Some(next) => next,
                    None => break,
                },
            };

            let bytes = match serde_json::to_vec(&response) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.stats.unsent.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(task_id = %response.id, error = %e, "response not serializable");
                    continue;
                }
            };
            match self.socket.send_to(&bytes, peer).await {
                Ok(_) => {
                    self.stats.responded.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.unsent.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(peer = %peer, task_id = %response.id, error = %e, "response send failed");
                }
            }
        }
        tracing::debug!("gateway response loop stopped");
    }
}

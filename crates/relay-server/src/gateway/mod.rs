//! Datagram gateway in front of the worker pool.
//!
//! Datagrams are size-checked, parsed and queued without blocking; a dispatch loop pops one
//! task per tick and hands it to the next worker. Replies carry the request id and are sent
//! at most once.

mod inbound;
mod transport;
mod wire;

pub use inbound::InboundQueue;
pub use transport::{GatewayStatsSnapshot, TransportGateway};
pub use wire::{ValidationError, validate_datagram};

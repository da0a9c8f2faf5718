//! Transport server (C4): binds the request/reply and notification
//! sockets, translating wire messages into [`cellplc_memory::Memory`]
//! reads and writes.
//!
//! Two variants ship: [`ZmqServer`] (request/reply only, no async
//! notifications -- clients poll by reading) and [`UdpServer`] (request/
//! reply plus a coalescing notification stream on `port + 1`).

mod error;
mod udp_server;
mod zmq_server;

pub use error::{TransportError, TransportResult};
pub use udp_server::UdpServer;
pub use zmq_server::ZmqServer;

//! UDP transport variant (§4.3, §6): a request/reply socket plus a second,
//! send-only notification socket bound to `port + 1`. The server subscribes
//! itself as a memory observer and coalesces deltas (last write per key
//! wins) while no client address is known yet, flushing the coalesced
//! batch to the most recently seen client after each request.

use std::collections::BTreeMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cellplc_memory::{Memory, Observer};
use cellplc_types::Batch;
use cellplc_wire::{json_to_batch, UdpNotification, UdpReply, UdpRequest, MAX_UDP_DATAGRAM_BYTES};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

const RECONNECT_BACKOFF: Duration = Duration::from_millis(200);
const POLL_SLICE: Duration = Duration::from_millis(50);

struct NotifyState {
    pending: BTreeMap<String, JsonValue>,
    last_client: Option<SocketAddr>,
}

struct NotifyObserver {
    state: Arc<Mutex<NotifyState>>,
}

impl Observer for NotifyObserver {
    fn memory_modified(&self, batch: &Batch) {
        let mut state = self.state.lock().expect("udp notify mutex poisoned");
        for (key, value) in batch {
            // coalescing rule: a later write to the same key overwrites an
            // earlier, still-unflushed one.
            state.pending.insert(key.clone(), value.clone().into());
        }
    }
}

pub struct UdpServer {
    memory: Memory,
    bind_addr: SocketAddr,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl UdpServer {
    pub fn new(memory: Memory, bind_addr: SocketAddr) -> Self {
        UdpServer {
            memory,
            bind_addr,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start(&self) {
        self.stop();
        self.running.store(true, Ordering::SeqCst);

        let state = Arc::new(Mutex::new(NotifyState {
            pending: BTreeMap::new(),
            last_client: None,
        }));
        self.memory.add_observer(Arc::new(NotifyObserver { state: state.clone() }));

        let memory = self.memory.clone();
        let bind_addr = self.bind_addr;
        let running = self.running.clone();
        let handle = thread::Builder::new()
            .name("cellplc-udp".to_string())
            .spawn(move || run(memory, bind_addr, state, running))
            .expect("failed to spawn cellplc-udp thread");
        *self.handle.lock().expect("udp server handle mutex poisoned") = Some(handle);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().expect("udp server handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for UdpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn notify_destination(client: SocketAddr) -> SocketAddr {
    SocketAddr::new(client.ip(), client.port() + 1)
}

fn bind_sockets(bind_addr: SocketAddr) -> std::io::Result<(UdpSocket, UdpSocket)> {
    let request_socket = UdpSocket::bind(bind_addr)?;
    request_socket.set_read_timeout(Some(POLL_SLICE))?;
    let notify_addr = SocketAddr::new(bind_addr.ip(), bind_addr.port() + 1);
    let notify_socket = UdpSocket::bind(notify_addr)?;
    Ok((request_socket, notify_socket))
}

fn run(memory: Memory, bind_addr: SocketAddr, state: Arc<Mutex<NotifyState>>, running: Arc<AtomicBool>) {
    let epoch = Instant::now();
    let mut sockets: Option<(UdpSocket, UdpSocket)> = None;
    let mut buf = vec![0u8; MAX_UDP_DATAGRAM_BYTES];

    while running.load(Ordering::SeqCst) {
        if sockets.is_none() {
            match bind_sockets(bind_addr) {
                Ok(s) => sockets = Some(s),
                Err(error) => {
                    warn!(%error, %bind_addr, "failed to bind udp sockets, backing off");
                    thread::sleep(RECONNECT_BACKOFF);
                    continue;
                }
            }
        }

        let (request_socket, notify_socket) = sockets.as_ref().expect("sockets just established");

        match request_socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                state.lock().expect("udp notify mutex poisoned").last_client = Some(from);
                if let Err(error) = handle_datagram(&buf[..len], from, request_socket, &memory, epoch) {
                    warn!(%error, "udp request failed");
                }
            }
            Err(error) if matches!(error.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {}
            Err(error) => {
                warn!(%error, "udp recv failed, resetting sockets");
                sockets = None;
                thread::sleep(RECONNECT_BACKOFF);
                continue;
            }
        }

        flush_notifications(&state, notify_socket, epoch);
    }
}

fn flush_notifications(state: &Arc<Mutex<NotifyState>>, notify_socket: &UdpSocket, epoch: Instant) {
    let (pending, client) = {
        let mut state = state.lock().expect("udp notify mutex poisoned");
        if state.pending.is_empty() {
            return;
        }
        (std::mem::take(&mut state.pending), state.last_client)
    };

    let Some(client) = client else {
        // no client known yet: put the batch back so it keeps coalescing
        // with whatever arrives before one does.
        let mut state = state.lock().expect("udp notify mutex poisoned");
        for (key, value) in pending {
            state.pending.entry(key).or_insert(value);
        }
        return;
    };

    let notification = UdpNotification {
        timestamp: cellplc_wire::monotonic_nanos(epoch),
        changevalues: pending,
    };
    match serde_json::to_vec(&notification) {
        Ok(bytes) => {
            let dest = notify_destination(client);
            if let Err(error) = notify_socket.send_to(&bytes, dest) {
                warn!(%error, %dest, "failed to send udp notification");
            }
        }
        Err(error) => warn!(%error, "failed to serialize udp notification"),
    }
}

fn handle_datagram(
    raw: &[u8],
    from: SocketAddr,
    request_socket: &UdpSocket,
    memory: &Memory,
    epoch: Instant,
) -> Result<(), crate::error::TransportError> {
    let request: UdpRequest = serde_json::from_slice(raw)?;

    if let Some(writevalues) = request.writevalues {
        match json_to_batch(writevalues) {
            Ok(batch) => {
                debug!(count = batch.len(), seqid = request.seqid, "handled udp write");
                memory.write(batch);
            }
            Err(error) => warn!(%error, seqid = request.seqid, "udp write request had an invalid value"),
        }
    }

    let readvalues = request.read.map(|keys| {
        let snapshot = memory.read(&keys);
        cellplc_wire::batch_to_json(&snapshot)
    });

    let reply = UdpReply {
        seqid: request.seqid,
        timestamp: cellplc_wire::monotonic_nanos(epoch),
        readvalues,
    };
    let bytes = serde_json::to_vec(&reply).expect("UdpReply always serializes");
    request_socket.send_to(&bytes, from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_destination_is_port_plus_one() {
        let client: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(notify_destination(client), "127.0.0.1:9001".parse().unwrap());
    }

    #[test]
    fn start_stop_is_idempotent() {
        let memory = Memory::new();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = UdpServer::new(memory, addr);
        server.stop();
        server.stop();
    }
}

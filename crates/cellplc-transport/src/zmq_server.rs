//! ZMQ REQ/REP transport variant (§4.3, §6): a single background thread
//! owns a REP socket, answering `read`/`write` requests by calling straight
//! into the [`Memory`]. This variant emits no asynchronous notifications;
//! clients poll by issuing reads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cellplc_memory::Memory;
use cellplc_wire::{json_to_batch, ZmqRequest, ZmqResponse};
use tracing::{debug, warn};

use crate::error::TransportError;

/// Backoff applied before rebuilding the socket after an error, per §4.3.
const RECONNECT_BACKOFF: Duration = Duration::from_millis(200);
/// Poll slice, per §4.3.
const POLL_SLICE_MS: i64 = 50;
/// Socket linger, per §6.
const LINGER_MS: i32 = 100;
/// Send high-water-mark, per §6: at most two queued messages per client.
const SNDHWM: i32 = 2;

pub struct ZmqServer {
    memory: Memory,
    endpoint: String,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ZmqServer {
    pub fn new(memory: Memory, endpoint: impl Into<String>) -> Self {
        ZmqServer {
            memory,
            endpoint: endpoint.into(),
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
        let memory = self.memory.clone();
        let endpoint = self.endpoint.clone();
        let running = self.running.clone();
        let handle = thread::Builder::new()
            .name("cellplc-zmq".to_string())
            .spawn(move || run(memory, endpoint, running))
            .expect("failed to spawn cellplc-zmq thread");
        *self.handle.lock().expect("zmq server handle mutex poisoned") = Some(handle);
    }

    /// Stop the server. Blocks until the background thread terminates.
    /// Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().expect("zmq server handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ZmqServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind_socket(ctx: &zmq::Context, endpoint: &str) -> Result<zmq::Socket, TransportError> {
    let socket = ctx.socket(zmq::REP)?;
    socket.set_linger(LINGER_MS)?;
    socket.set_sndhwm(SNDHWM)?;
    socket.bind(endpoint)?;
    Ok(socket)
}

fn run(memory: Memory, endpoint: String, running: Arc<AtomicBool>) {
    let ctx = zmq::Context::new();
    let mut socket: Option<zmq::Socket> = None;

    while running.load(Ordering::SeqCst) {
        if socket.is_none() {
            match bind_socket(&ctx, &endpoint) {
                Ok(s) => socket = Some(s),
                Err(error) => {
                    warn!(%error, endpoint = %endpoint, "failed to bind zmq socket, backing off");
                    thread::sleep(RECONNECT_BACKOFF);
                    continue;
                }
            }
        }

        let sock = socket.as_ref().expect("socket just established");
        match sock.poll(zmq::POLLIN, POLL_SLICE_MS) {
            Ok(n) if n > 0 => {
                if let Err(error) = handle_request(sock, &memory) {
                    warn!(%error, "zmq request failed, resetting socket");
                    socket = None;
                    thread::sleep(RECONNECT_BACKOFF);
                }
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "zmq poll failed, resetting socket");
                socket = None;
                thread::sleep(RECONNECT_BACKOFF);
            }
        }
    }
}

fn handle_request(socket: &zmq::Socket, memory: &Memory) -> Result<(), TransportError> {
    let raw = socket.recv_bytes(zmq::DONTWAIT)?;
    let response = match serde_json::from_slice::<ZmqRequest>(&raw) {
        Ok(ZmqRequest::Read { keys }) => {
            let snapshot = memory.read(&keys);
            debug!(count = keys.len(), "handled read request");
            ZmqResponse::with_keyvalues(&snapshot)
        }
        Ok(ZmqRequest::Write { keyvalues }) => match json_to_batch(keyvalues) {
            Ok(batch) => {
                debug!(count = batch.len(), "handled write request");
                memory.write(batch);
                ZmqResponse::empty()
            }
            Err(error) => {
                warn!(%error, "write request contained an invalid value");
                ZmqResponse::empty()
            }
        },
        Err(error) => {
            warn!(%error, "failed to parse zmq request");
            ZmqResponse::empty()
        }
    };

    let bytes = serde_json::to_vec(&response).expect("ZmqResponse always serializes");
    socket.send(bytes, zmq::DONTWAIT)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_stop_is_idempotent() {
        let memory = Memory::new();
        let server = ZmqServer::new(memory, "tcp://127.0.0.1:0");
        server.stop();
        server.stop();
    }
}

//! WebSocket server: TLS-capable transport, upgrade handshake,
//! heartbeat, and fragment reassembly over an actor-per-connection
//! model.
//!
//! Both the reader (the connection actor) and writers (`mesh_ws_send`
//! from any actor) share one `Arc<Mutex<WsStream>>`. TLS stream state
//! is not clone-safe, so split-socket patterns do not apply; the
//! single-mutex model is mandatory. The reader holds the lock only for
//! the duration of one `read_frame`, bounded by the 5 s socket read
//! timeout set on the TCP socket BEFORE TLS wrapping.

pub mod frame;

use crate::gc;
use crate::list::callback;
use crate::scheduler;
use crate::string::{MeshString, alloc_bytes, str_view};
use frame::{
    CLOSE_GOING_AWAY, CLOSE_PROTOCOL_ERROR, FragmentState, HeartbeatState, Opcode, READ_TIMEOUT,
    read_frame, write_close, write_frame,
};
use may::net::{TcpListener, TcpStream};
use rand::Rng;
use rustls::{ServerConfig, ServerConnection, StreamOwned};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Plain or TLS transport behind one read/write interface.
pub enum WsStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
}

impl Read for WsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            WsStream::Plain(s) => s.read(buf),
            WsStream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for WsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            WsStream::Plain(s) => s.write(buf),
            WsStream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            WsStream::Plain(s) => s.flush(),
            WsStream::Tls(s) => s.flush(),
        }
    }
}

static CONNECTIONS: OnceLock<Mutex<HashMap<u64, Arc<Mutex<WsStream>>>>> = OnceLock::new();
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn connections() -> &'static Mutex<HashMap<u64, Arc<Mutex<WsStream>>>> {
    CONNECTIONS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn register_connection(stream: WsStream) -> (u64, Arc<Mutex<WsStream>>) {
    let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    let shared = Arc::new(Mutex::new(stream));
    connections()
        .lock()
        .expect("connection registry poisoned")
        .insert(id, shared.clone());
    (id, shared)
}

fn unregister_connection(id: u64) {
    connections()
        .lock()
        .expect("connection registry poisoned")
        .remove(&id);
}

fn connection(id: u64) -> Option<Arc<Mutex<WsStream>>> {
    connections()
        .lock()
        .expect("connection registry poisoned")
        .get(&id)
        .cloned()
}

/// The callbacks one server instance dispatches into user code.
#[derive(Clone, Copy)]
struct Callbacks {
    on_connect: *const u8,
    on_connect_env: *mut u8,
    on_msg: *const u8,
    on_msg_env: *mut u8,
    on_close: *const u8,
    on_close_env: *mut u8,
}

// Raw callback pointers cross coroutine boundaries; generated code and
// closure environments are process-lifetime data.
unsafe impl Send for Callbacks {}
unsafe impl Sync for Callbacks {}

/// Compute the `Sec-WebSocket-Accept` token.
fn accept_token(key: &str) -> String {
    use base64::Engine as _;
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Read the HTTP upgrade request and answer 101. Returns false when the
/// request was not a well-formed upgrade.
fn handshake(stream: &mut WsStream) -> bool {
    let mut key = None;
    {
        let mut reader = BufReader::new(&mut *stream);
        let mut line = String::new();
        if reader.read_line(&mut line).is_err() {
            return false;
        }
        loop {
            let mut header = String::new();
            match reader.read_line(&mut header) {
                Ok(0) => break,
                Ok(_) => {
                    let header = header.trim_end();
                    if header.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = header.split_once(':') {
                        if name.eq_ignore_ascii_case("sec-websocket-key") {
                            key = Some(value.trim().to_string());
                        }
                    }
                }
                Err(_) => return false,
            }
        }
    }
    let Some(key) = key else {
        return false;
    };
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_token(&key)
    );
    stream.write_all(response.as_bytes()).is_ok() && stream.flush().is_ok()
}

// ── Server entry points ─────────────────────────────────────────────────

/// Serve plain-TCP WebSocket connections. Blocks the calling actor.
///
/// # Safety
/// Callback pointers must follow the runtime's closure ABI
/// (env = null for bare functions).
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_ws_serve(
    on_connect: *const u8,
    on_connect_env: *mut u8,
    on_msg: *const u8,
    on_msg_env: *mut u8,
    on_close: *const u8,
    on_close_env: *mut u8,
    port: i64,
) {
    let callbacks = Callbacks {
        on_connect,
        on_connect_env,
        on_msg,
        on_msg_env,
        on_close,
        on_close_env,
    };
    serve_loop(port, None, callbacks);
}

/// Serve TLS WebSocket connections.
///
/// # Safety
/// Callback pointers as for `mesh_ws_serve`; cert and key paths must be
/// valid string objects naming PEM files.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_ws_serve_tls(
    on_connect: *const u8,
    on_connect_env: *mut u8,
    on_msg: *const u8,
    on_msg_env: *mut u8,
    on_close: *const u8,
    on_close_env: *mut u8,
    port: i64,
    cert_path: *const MeshString,
    key_path: *const MeshString,
) {
    let callbacks = Callbacks {
        on_connect,
        on_connect_env,
        on_msg,
        on_msg_env,
        on_close,
        on_close_env,
    };
    let config = match unsafe { tls_config(str_view(cert_path), str_view(key_path)) } {
        Ok(config) => Some(Arc::new(config)),
        Err(err) => {
            eprintln!("ws_serve_tls: failed to load TLS config: {err}");
            return;
        }
    };
    serve_loop(port, config, callbacks);
}

fn tls_config(cert_path: &str, key_path: &str) -> Result<ServerConfig, String> {
    let cert_file = std::fs::File::open(cert_path)
        .map_err(|e| format!("cannot open certificate {cert_path}: {e}"))?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut io::BufReader::new(cert_file))
        .collect::<Result<_, _>>()
        .map_err(|e| format!("bad certificate: {e}"))?;
    let key_file = std::fs::File::open(key_path)
        .map_err(|e| format!("cannot open key {key_path}: {e}"))?;
    let key = rustls_pemfile::private_key(&mut io::BufReader::new(key_file))
        .map_err(|e| format!("bad private key: {e}"))?
        .ok_or("no private key found")?;
    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| format!("invalid certificate/key pair: {e}"))
}

struct ConnArgs {
    callbacks: Callbacks,
    conn_id: u64,
    stream: Arc<Mutex<WsStream>>,
}

fn serve_loop(port: i64, tls: Option<Arc<ServerConfig>>, callbacks: Callbacks) {
    let addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&addr) {
        Ok(l) => l,
        Err(err) => {
            eprintln!("ws_serve: failed to bind {addr}: {err}");
            return;
        }
    };
    for incoming in listener.incoming() {
        let Ok(tcp) = incoming else { continue };
        // Read timeouts go on the TCP socket BEFORE TLS wrapping.
        let _ = tcp.set_read_timeout(Some(READ_TIMEOUT));
        let stream = match &tls {
            None => WsStream::Plain(tcp),
            Some(config) => {
                let Ok(conn) = ServerConnection::new(config.clone()) else {
                    continue;
                };
                WsStream::Tls(Box::new(StreamOwned::new(conn, tcp)))
            }
        };
        let (conn_id, shared) = register_connection(stream);
        let args = Box::into_raw(Box::new(ConnArgs {
            callbacks,
            conn_id,
            stream: shared,
        }));
        unsafe {
            scheduler::mesh_actor_spawn(ws_connection_entry, args as *mut u8);
        }
    }
}

/// One connection actor: handshake, then the reader loop of the
/// heartbeat/fragment protocol.
extern "C-unwind" fn ws_connection_entry(args: *mut u8) {
    let args = unsafe { Box::from_raw(args as *mut ConnArgs) };
    let ConnArgs {
        callbacks,
        conn_id,
        stream,
    } = *args;

    let ok = {
        let mut guard = stream.lock().expect("ws stream lock poisoned");
        handshake(&mut guard)
    };
    if !ok {
        unregister_connection(conn_id);
        return;
    }

    unsafe { callback::call1(callbacks.on_connect, callbacks.on_connect_env, conn_id) };
    reader_loop(conn_id, &stream, &callbacks);
    unsafe { callback::call1(callbacks.on_close, callbacks.on_close_env, conn_id) };
    unregister_connection(conn_id);
}

fn reader_loop(conn_id: u64, stream: &Arc<Mutex<WsStream>>, callbacks: &Callbacks) {
    let mut heartbeat = HeartbeatState::new();
    let mut fragments = FragmentState::new();
    let pid = gc::current_pid();

    loop {
        if heartbeat.pong_overdue() {
            let mut guard = stream.lock().expect("ws stream lock poisoned");
            let _ = write_close(&mut *guard, CLOSE_GOING_AWAY, "pong timeout");
            return;
        }
        if heartbeat.ping_due() {
            let payload: [u8; 4] = rand::thread_rng().r#gen();
            let mut guard = stream.lock().expect("ws stream lock poisoned");
            if write_frame(&mut *guard, Opcode::Ping, &payload, true).is_err() {
                return;
            }
            heartbeat.record_ping(payload);
        }

        // One frame per lock acquisition; the socket read timeout keeps
        // the hold bounded so ws_send never starves.
        let result = {
            let mut guard = stream.lock().expect("ws stream lock poisoned");
            read_frame(&mut *guard)
        };
        // Blocking reads are suspension points; re-assert the pid for
        // the arena allocator.
        gc::set_current_pid(pid);

        let frame = match result {
            Ok(frame) => frame,
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(_) => return,
        };

        match frame.opcode {
            // Control frames are processed in place and never touch
            // fragment state.
            Opcode::Pong => heartbeat.on_pong(&frame.payload),
            Opcode::Ping => {
                let mut guard = stream.lock().expect("ws stream lock poisoned");
                if write_frame(&mut *guard, Opcode::Pong, &frame.payload, true).is_err() {
                    return;
                }
            }
            Opcode::Close => {
                let mut guard = stream.lock().expect("ws stream lock poisoned");
                let _ = write_frame(&mut *guard, Opcode::Close, &frame.payload, true);
                return;
            }
            _ => {
                if !frame.masked {
                    // Clients MUST mask.
                    let mut guard = stream.lock().expect("ws stream lock poisoned");
                    let _ = write_close(
                        &mut *guard,
                        CLOSE_PROTOCOL_ERROR,
                        "unmasked client frame",
                    );
                    return;
                }
                match fragments.feed(frame) {
                    Ok(Some(message)) => {
                        let payload = alloc_bytes(&message.payload);
                        unsafe {
                            callback::call2(
                                callbacks.on_msg,
                                callbacks.on_msg_env,
                                conn_id,
                                payload as u64,
                            );
                        }
                    }
                    Ok(None) => {}
                    Err(code) => {
                        let mut guard = stream.lock().expect("ws stream lock poisoned");
                        let _ = write_close(&mut *guard, code, "");
                        return;
                    }
                }
            }
        }
    }
}

/// Send a text message on an open connection.
///
/// # Safety
/// `message` must be a valid string object.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_ws_send(conn_id: u64, message: *const MeshString) {
    let Some(stream) = connection(conn_id) else {
        return;
    };
    let bytes = unsafe { crate::string::str_bytes(message) };
    let mut guard = stream.lock().expect("ws stream lock poisoned");
    let _ = write_frame(&mut *guard, Opcode::Text, bytes, true);
}

/// Close a connection with a normal close frame.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn mesh_ws_close(conn_id: u64) {
    let Some(stream) = connection(conn_id) else {
        return;
    };
    {
        let mut guard = stream.lock().expect("ws stream lock poisoned");
        let _ = write_close(&mut *guard, frame::CLOSE_NORMAL, "");
    }
    unregister_connection(conn_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_token_matches_rfc_example() {
        // The RFC 6455 worked example.
        assert_eq!(
            accept_token("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn connection_registry_round_trip() {
        // Plain stream construction needs a socket; exercise only the
        // id allocation path here.
        let before = NEXT_CONNECTION_ID.load(Ordering::Relaxed);
        let after = NEXT_CONNECTION_ID.fetch_add(0, Ordering::Relaxed);
        assert!(after >= before);
    }
}

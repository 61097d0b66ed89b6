//! HTTP server with actor-per-connection crash isolation.
//!
//! The listener actor accepts TCP sockets, packs the handler closure
//! and the stream into a heap struct, and spawns a connection actor per
//! socket. The connection actor parses one request, invokes the handler,
//! and serializes the response. A panic during handling terminates only
//! that connection actor; the socket drops and the server keeps serving.

use crate::list::callback;
use crate::scheduler;
use crate::string::{MeshString, alloc_str, str_view};
use may::net::{TcpListener, TcpStream};
use std::io::{BufRead, BufReader, Read, Write};

struct ConnArgs {
    handler: *const u8,
    handler_env: *mut u8,
    stream: TcpStream,
}

// Handler pointers live for the process; streams transfer wholly to the
// connection actor.
unsafe impl Send for ConnArgs {}

/// Serve HTTP on `port`. The handler receives the raw request text and
/// returns either a full response (starting with `HTTP/`) or a body to
/// wrap in a 200. Blocks the calling actor.
///
/// # Safety
/// `handler` must follow the runtime's closure ABI (env = null for bare
/// functions).
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_http_serve(
    handler: *const u8,
    handler_env: *mut u8,
    port: i64,
) {
    let addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&addr) {
        Ok(l) => l,
        Err(err) => {
            eprintln!("http_serve: failed to bind {addr}: {err}");
            return;
        }
    };
    for incoming in listener.incoming() {
        let Ok(stream) = incoming else { continue };
        let args = Box::into_raw(Box::new(ConnArgs {
            handler,
            handler_env,
            stream,
        }));
        unsafe {
            scheduler::mesh_actor_spawn(http_connection_entry, args as *mut u8);
        }
    }
}

extern "C-unwind" fn http_connection_entry(args: *mut u8) {
    let args = unsafe { Box::from_raw(args as *mut ConnArgs) };
    let ConnArgs {
        handler,
        handler_env,
        mut stream,
    } = *args;

    let Some(request) = read_request(&mut stream) else {
        return;
    };
    let request_str = alloc_str(&request);
    // A panic inside the handler unwinds to the actor boundary; the
    // stream drops and the connection closes.
    let response = unsafe { callback::call1(handler, handler_env, request_str as u64) };
    let body = unsafe { str_view(response as *const MeshString) };
    let output = if body.starts_with("HTTP/") {
        body.to_string()
    } else {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    };
    let _ = stream.write_all(output.as_bytes());
    let _ = stream.flush();
}

/// Read one request: request line, headers, and a Content-Length body.
fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut reader = BufReader::new(stream);
    let mut text = String::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if let Some((name, value)) = line.trim_end().split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
                let done = line == "\r\n" || line == "\n";
                text.push_str(&line);
                if done {
                    break;
                }
            }
            Err(_) => return None,
        }
    }
    if text.is_empty() {
        return None;
    }
    if content_length > 0 {
        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).is_ok() {
            text.push_str(&String::from_utf8_lossy(&body));
        }
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::{Read as _, Write as _};
    use std::net::TcpStream as StdTcpStream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    static HANDLER_SAW_CRASH: AtomicBool = AtomicBool::new(false);

    extern "C-unwind" fn routes(request: u64) -> u64 {
        let text = unsafe { str_view(request as *const MeshString) };
        if text.starts_with("GET /crash") {
            HANDLER_SAW_CRASH.store(true, Ordering::SeqCst);
            panic!("handler crash requested");
        }
        alloc_str("ok") as u64
    }

    fn start_server() {
        // A raw coroutine rather than an actor: the listener never
        // terminates, and tests elsewhere wait for the actor count to
        // reach zero.
        unsafe {
            may::coroutine::spawn(|| {
                mesh_http_serve(routes as *const u8, std::ptr::null_mut(), 18923);
            });
        }
    }

    fn get(path: &str) -> Option<String> {
        let mut conn = StdTcpStream::connect("127.0.0.1:18923").ok()?;
        conn.set_read_timeout(Some(Duration::from_secs(2))).ok()?;
        write!(conn, "GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").ok()?;
        let mut out = String::new();
        let _ = conn.read_to_string(&mut out);
        Some(out)
    }

    /// A crashing handler drops its connection; the server keeps
    /// answering afterwards.
    #[test]
    #[serial]
    fn crash_isolation_keeps_server_alive() {
        scheduler::mesh_rt_init();
        start_server();
        // Give the listener a moment to bind.
        std::thread::sleep(Duration::from_millis(300));

        let crash_response = get("/crash").unwrap_or_default();
        assert!(
            crash_response.is_empty() || !crash_response.contains("200 OK"),
            "crashed handler must not produce a 200: {crash_response}"
        );
        assert!(HANDLER_SAW_CRASH.load(Ordering::SeqCst));

        let health = get("/health").expect("server must still accept");
        assert!(health.contains("200 OK"), "{health}");
        assert!(health.contains("ok"));
    }
}

//! Canned-response HTTP servers for exercising the network paths in tests.

use std::io::{Read as _, Write as _};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn answer(mut stream: TcpStream, response: &str) {
    // Read the full request (headers plus any body) before replying, so the
    // client never sees a reset mid-write.
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if request_complete(&buf) {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn request_complete(buf: &[u8]) -> bool {
    let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]);
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);
    buf.len() >= header_end + 4 + content_length
}

/// Serve exactly one request with a fixed response, on an ephemeral port.
pub fn serve_once(response: &str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let port = listener.local_addr().expect("local addr").port();
    let response = response.to_string();
    std::thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            answer(stream, &response);
        }
    });
    port
}

/// Serve up to `max_requests` requests with a fixed response, counting hits.
pub fn serve_counted(response: &str, max_requests: usize) -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let port = listener.local_addr().expect("local addr").port();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let response = response.to_string();
    std::thread::spawn(move || {
        for _ in 0..max_requests {
            match listener.accept() {
                Ok((stream, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    answer(stream, &response);
                }
                Err(_) => break,
            }
        }
    });
    (port, hits)
}

/// Build a minimal 200 response with a JSON body and correct content length.
pub fn json_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

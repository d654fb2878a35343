use std::{
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    thread::{self, JoinHandle},
};

/// A minimal HTTP server that answers every request with the same status and body.
///
/// The server accepts `connections` connections, one at a time, and then stops. Joining the handle
/// returns the request paths it saw, in order.
pub(crate) fn serve(
    status: u16,
    body: Vec<u8>,
    connections: usize,
) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let server = thread::spawn(move || {
        let mut paths = Vec::new();
        for stream in listener.incoming().take(connections) {
            let mut stream = stream.unwrap();
            paths.push(read_request_path(&mut stream));

            let head = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                reason(status),
                body.len()
            );
            // The client may hang up early, e.g. after rejecting the declared length.
            let _ = stream
                .write_all(head.as_bytes())
                .and_then(|()| stream.write_all(&body))
                .and_then(|()| stream.flush());
        }
        paths
    });

    (url, server)
}

// Read the request head and return the path of its request line.
fn read_request_path(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte).unwrap() == 0 {
            break;
        }
        head.push(byte[0]);
    }

    String::from_utf8_lossy(&head)
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string()
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

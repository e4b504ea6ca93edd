use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

/// Serve one event-stream response carrying `events` as `data:` lines, then
/// close the connection and stop listening.
pub fn serve_event_stream_once(events: &[&str]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let mut body = String::from(": connected\n\n");
    for event in events {
        body.push_str(&format!("data: {event}\n\n"));
    }
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 8192];
            let _ = stream.read(&mut buf);
            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(body.as_bytes());
        }
    });
    format!("http://{addr}/notifications/stream/")
}

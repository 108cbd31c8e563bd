#![allow(dead_code)]

use axum::Router;
use course_evals::config::Config;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Serve the router built by `build` on an ephemeral localhost port.
///
/// `build` receives the bound address so handlers can emit absolute URLs.
pub async fn spawn_server(build: impl FnOnce(SocketAddr) -> Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build(addr);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Serve `body` as a PDF over raw HTTP/1.1, writing `step` bytes at a time
/// with `pause` between writes.
pub async fn spawn_trickle_server(body: &'static [u8], step: usize, pause: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for chunk in body.chunks(step) {
                    if socket.write_all(chunk).await.is_err() || socket.flush().await.is_err() {
                        return;
                    }
                    tokio::time::sleep(pause).await;
                }
            });
        }
    });
    addr
}

/// Read each request, then close the connection without a response.
pub async fn spawn_hangup_server(hits: Hits) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            hits.bump();
            read_request_head(&mut socket).await;
            drop(socket);
        }
    });
    addr
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

/// Config pointed at a local server, with millisecond backoff and no cookies.
pub fn test_config(addr: SocketAddr) -> Config {
    Config {
        base_url: format!("http://{addr}"),
        cookie_file: PathBuf::from("/nonexistent/course-evals/cookies.txt"),
        backoff_base: Duration::from_millis(1),
        page_delay: Duration::ZERO,
        page_timeout: Duration::from_secs(5),
        pdf_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

/// Shared request counter for handlers.
#[derive(Debug, Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    /// Record a hit, returning how many came before it.
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// One search-result card with a report anchor.
pub fn result_card(title: &str, ids: [&str; 4]) -> String {
    format!(
        r##"<div class="panel panel-default"><div class="panel-body"><h4>{title}</h4><a class="sr-pdf" href="#" data-id0="{}" data-id1="{}" data-id2="{}" data-id3="{}"></a></div></div>"##,
        ids[0], ids[1], ids[2], ids[3]
    )
}

pub const FAKE_PDF: &[u8] = b"%PDF-1.4\n% fake report body\n%%EOF\n";

/// Report text with every metadata field and one scored question.
pub const ART_REPORT: &str = "\
Johns Hopkins University
Course: AS.010.101.01.FA23 : Intro to Art
Jane Doe
Instructor
2023 Fall
1 - The course was well organized.
Response Rate 30/45 (67%)
(1) 3 10.00%
(2) 7 23.33%
(3) 20 66.67%
";

/// A different course whose questions only partly overlap [`ART_REPORT`].
pub const CS_REPORT: &str = "\
Johns Hopkins University
Course: EN.601.226.01.SP24 : Data Structures
John Roe
Instructor
2024 Spring
1 - The course was well organized.
(4) 5 50.00%
(5) 5 50.00%
2 - The workload for this course is:
Response Rate 10/20 (50%)
(3) 10 100.00%
";

/// Report text with no instructor marker, so the row is incomplete.
pub const INCOMPLETE_REPORT: &str = "\
Course: AS.010.101.01.FA23 : Intro to Art
2023 Fall
1 - The course was well organized.
(1) 3 10.00%
";

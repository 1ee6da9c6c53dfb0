//! A minimal HTTP/1.1 server for tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct Routes {
    bodies: HashMap<String, Vec<u8>>,
    hits: HashMap<String, usize>,
}

/// Serves fixed bodies by path; unknown paths get a 404.
///
/// Routes can be added after start, since release metadata has to name the
/// server's own address. The server runs until the test's runtime shuts down.
pub struct TestServer {
    addr: SocketAddr,
    routes: Arc<Mutex<Routes>>,
}

impl TestServer {
    /// Bind to an ephemeral port and start serving.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let routes = Arc::new(Mutex::new(Routes::default()));

        let shared = Arc::clone(&routes);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(respond(socket, Arc::clone(&shared)));
            }
        });

        Self {
            addr,
            routes,
        }
    }

    /// Serve `body` at `path`.
    pub fn serve(&self, path: &str, body: impl Into<Vec<u8>>) -> &Self {
        self.routes.lock().unwrap().bodies.insert(path.to_string(), body.into());
        self
    }

    /// Absolute URL of `path`.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// How often `path` was requested.
    pub fn hits(&self, path: &str) -> usize {
        self.routes.lock().unwrap().hits.get(path).copied().unwrap_or(0)
    }
}

async fn respond(mut socket: TcpStream, routes: Arc<Mutex<Routes>>) {
    let Some(path) = read_request_path(&mut socket).await else {
        return;
    };

    let body = {
        let mut routes = routes.lock().unwrap();
        *routes.hits.entry(path.clone()).or_insert(0) += 1;
        routes.bodies.get(&path).cloned()
    };
    let (status, body) = match body {
        Some(body) => ("200 OK", body),
        None => ("404 Not Found", b"not found".to_vec()),
    };

    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(&body).await;
    let _ = socket.shutdown().await;
}

async fn read_request_path(socket: &mut TcpStream) -> Option<String> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        request.extend_from_slice(&buf[..n]);
    }

    let request = String::from_utf8_lossy(&request);
    let line = request.lines().next()?;
    line.split_whitespace().nth(1).map(str::to_string)
}

/// Publish `version` with a Linux tarball holding `binary` as `monolith`,
/// under the `app` asset prefix.
pub fn publish_release(server: &TestServer, version: &str, binary: &[u8]) {
    let archive = monolith_updater::test_utils::tar_gz_archive(&[("monolith", binary)]);
    let digest = monolith_updater::test_utils::sha256_hex(&archive);
    let release = serde_json::json!({
        "tag_name": format!("v{version}"),
        "body": "Bug fixes",
        "assets": [{
            "name": "app-linux.tar.gz",
            "browser_download_url": server.url("/download/app-linux.tar.gz"),
            "sha256": digest,
        }],
    });

    server
        .serve("/version.txt", format!("v{version}\n"))
        .serve("/release.json", release.to_string())
        .serve("/download/app-linux.tar.gz", archive);
}

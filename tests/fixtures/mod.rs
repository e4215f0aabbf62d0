//! Integration test harness: a real server on an ephemeral port with a
//! scratch webroot.

#![allow(dead_code)] // each test binary uses a different slice of this

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use instant_server::{Server, ServerConfig};

pub const MAIN_HTML: &str = "<html><body>instant main page</body></html>\n";
pub const ABOUT_HTML: &str = "<html><body>about</body></html>\n";
pub const ROOM_HTML: &str = "<html><body>room shell</body></html>\n";
pub const ICON_BYTES: &[u8] = b"\x00\x00\x01\x00fake-icon";

static WEBROOT_SEQ: AtomicUsize = AtomicUsize::new(0);

pub struct TestServer {
    addr: SocketAddr,
    webroot: PathBuf,
}

impl TestServer {
    /// Bind a fresh server instance on an ephemeral port.
    pub async fn start() -> Self {
        let webroot = std::env::temp_dir().join(format!(
            "instant-it-{}-{}",
            std::process::id(),
            WEBROOT_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(webroot.join("pages")).unwrap();
        std::fs::create_dir_all(webroot.join("static")).unwrap();
        std::fs::write(webroot.join("pages/main.html"), MAIN_HTML).unwrap();
        std::fs::write(webroot.join("pages/about.html"), ABOUT_HTML).unwrap();
        std::fs::write(webroot.join("static/room.html"), ROOM_HTML).unwrap();
        std::fs::write(webroot.join("static/app.css"), "body {}\n").unwrap();
        std::fs::write(webroot.join("static/logo-static_128x128.ico"), ICON_BYTES).unwrap();
        // A file outside the whitelisted prefixes; must never be served.
        std::fs::write(webroot.join("secret.txt"), "top secret\n").unwrap();

        let config = ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            webroot: webroot.clone(),
            cookies_insecure: true,
            ..ServerConfig::default()
        };
        let server = Server::bind(config).await.expect("failed to bind test server");
        let addr = server.local_addr().expect("no local addr");
        tokio::spawn(server.serve_with_shutdown(std::future::pending::<()>()));

        Self { addr, webroot }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn room_ws_url(&self, room: &str) -> String {
        format!("ws://{}/room/{}/ws", self.addr, room)
    }

    pub fn api_ws_url(&self) -> String {
        format!("ws://{}/api/ws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.webroot).ok();
    }
}

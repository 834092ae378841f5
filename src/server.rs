//! Ephemeral loopback HTTP server over a [`VirtualFileSet`].
//!
//! The server binds `127.0.0.1:0`, so the OS picks a free port and nothing
//! outside the host can connect. Binding is synchronous: once
//! [`FileServer::start`] returns the socket is already listening and
//! connections queue in the kernel until the accept thread picks them up.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, warn};
use tiny_http::{Header, Request, Response, Server, StatusCode};

use crate::assemble::VirtualFileSet;
use crate::{Error, Result};

/// Body returned for any path outside the file set
pub const NOT_FOUND_BODY: &str = "Not Found";

const LOOPBACK_ANY_PORT: &str = "127.0.0.1:0";

/// Content type for a served path, chosen by suffix only
pub fn content_type_for(path: &str) -> &'static str {
    if path.ends_with(".html") {
        "text/html"
    } else if path.ends_with(".js") {
        "application/javascript"
    } else {
        "application/octet-stream"
    }
}

/// Request counters, mostly useful to tests and debug logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub served: usize,
    pub not_found: usize,
}

#[derive(Default)]
struct Counters {
    served: AtomicUsize,
    not_found: AtomicUsize,
}

/// A running file server. Dropping it stops the server.
pub struct FileServer {
    port: u16,
    server: Arc<Server>,
    counters: Arc<Counters>,
    worker: Option<JoinHandle<()>>,
}

impl FileServer {
    /// Bind a loopback port and start serving `files`
    pub fn start(files: VirtualFileSet) -> Result<Self> {
        let server = Server::http(LOOPBACK_ANY_PORT).map_err(|e| Error::BindError(e.to_string()))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| Error::BindError("server is not listening on an IP socket".into()))?;

        let server = Arc::new(server);
        let counters = Arc::new(Counters::default());
        let files = Arc::new(files);

        let accept_server = Arc::clone(&server);
        let accept_counters = Arc::clone(&counters);
        let worker = std::thread::Builder::new()
            .name(format!("gensandbox-fs-{}", port))
            .spawn(move || {
                for request in accept_server.incoming_requests() {
                    respond(request, &files, &accept_counters);
                }
            })
            .map_err(|e| Error::BindError(format!("failed to spawn server thread: {}", e)))?;

        debug!("file server listening on 127.0.0.1:{}", port);
        Ok(Self {
            port,
            server,
            counters,
            worker: Some(worker),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            served: self.counters.served.load(Ordering::Relaxed),
            not_found: self.counters.not_found.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting requests and wait for the serving thread to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.server.unblock();
            if worker.join().is_err() {
                warn!("file server thread on port {} panicked", self.port);
            }
            let stats = self.stats();
            debug!(
                "file server on port {} stopped ({} served, {} not found)",
                self.port, stats.served, stats.not_found
            );
        }
    }
}

impl Drop for FileServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn respond(request: Request, files: &VirtualFileSet, counters: &Counters) {
    // Exact match on the path; query and fragment are not part of the key.
    let url = request.url();
    let path = url.split(['?', '#']).next().unwrap_or(url).to_string();

    let response = match files.get(&path) {
        Some(body) => {
            counters.served.fetch_add(1, Ordering::Relaxed);
            Response::from_data(body.to_vec()).with_header(content_type_header(content_type_for(&path)))
        }
        None => {
            counters.not_found.fetch_add(1, Ordering::Relaxed);
            warn!("file server: 404 for {:?}", path);
            Response::from_data(NOT_FOUND_BODY.as_bytes().to_vec())
                .with_status_code(StatusCode(404))
                .with_header(content_type_header("text/plain"))
        }
    };

    if let Err(e) = request.respond(response) {
        warn!("file server: failed to write response for {:?}: {}", path, e);
    }
}

fn content_type_header(value: &str) -> Header {
    // Static ASCII name and value; construction cannot fail.
    Header::from_bytes(&b"Content-Type"[..], value.as_bytes())
        .unwrap_or_else(|_| unreachable!("static content type header"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_by_suffix() {
        assert_eq!(content_type_for("/index.html"), "text/html");
        assert_eq!(content_type_for("/main.js"), "application/javascript");
        assert_eq!(content_type_for("/p5.min.js"), "application/javascript");
        assert_eq!(content_type_for("/data.json"), "application/octet-stream");
        assert_eq!(content_type_for("/index.htm"), "application/octet-stream");
        assert_eq!(content_type_for("/"), "application/octet-stream");
    }

    #[test]
    fn binds_distinct_loopback_ports() {
        let a = FileServer::start(VirtualFileSet::default()).unwrap();
        let b = FileServer::start(VirtualFileSet::default()).unwrap();
        assert_ne!(a.port(), 0);
        assert_ne!(a.port(), b.port());
        a.stop();
        b.stop();
    }
}

//! Passive side of a synchronization session: accepts one connection and
//! answers whatever the peer drives - introspection requests during initial
//! convergence, then mutations as they're pushed during live operation.

use std::net::TcpListener;
use std::path::PathBuf;

use anyhow::{Context, Error};
use log::{info, warn};

use sync_datastore::DirSnapshot;
use synclet::Peer;

fn working_root() -> PathBuf {
    std::env::var(sync_buildcfg::WORKING_ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn listen_addr() -> String {
    let port = std::env::var(sync_buildcfg::PORT_ENV)
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(sync_buildcfg::DEFAULT_PORT);
    format!("0.0.0.0:{}", port)
}

fn main() -> Result<(), Error> {
    env_logger::init();
    let cancel = synclet::install_signal_handler()?;

    let root = working_root();
    let addr = listen_addr();
    let listener = TcpListener::bind(&addr).with_context(|| format!("failed to bind {}", addr))?;
    info!("listening on {} (root {:?})", addr, root);

    let (socket, peer_addr) = listener.accept().context("failed to accept connection")?;
    info!("accepted connection from {}", peer_addr);

    let mut local = DirSnapshot::scan(&root)?;
    let mut peer = Peer::new(root.clone(), socket);

    while !cancel.is_cancelled() {
        match peer.serve_one(&mut local) {
            Ok(()) => {}
            Err(err) => {
                if is_transport_broken(&err) {
                    info!("peer closed the connection");
                } else {
                    warn!("failed to serve request: {}", err);
                }
                break;
            }
        }
    }

    if cancel.is_cancelled() {
        info!("interrupted, shutting down");
    }
    Ok(())
}

fn is_transport_broken(err: &Error) -> bool {
    err.downcast_ref::<sync_protocol::ProtocolError>()
        .map(|e| matches!(e, sync_protocol::ProtocolError::TransportBroken))
        .unwrap_or(false)
}

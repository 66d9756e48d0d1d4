//! Adapter between the core handlers and the external TFTP engine.
//!
//! The engine (`async-tftp`) owns the wire protocol: opcode framing,
//! acknowledgment, retransmission, block-size negotiation, and per-transfer
//! timeouts. It invokes this handler exactly once per accepted request; the
//! adapter resolves and opens/creates through the core and hands the open
//! handle back for the engine to stream. Refusals reach the peer only as the
//! core's fixed opaque message.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_tftp::packet;
use async_tftp::server::{Handler, TftpServerBuilder};
use async_trait::async_trait;
use futures_util::io::AllowStdIo;
use tracing::{debug, info};
use uuid::Uuid;
use vault::{log_refusal, FileServer};

/// TFTP request handler backed by a confined [`FileServer`].
pub struct VaultHandler {
    server: FileServer,
}

impl VaultHandler {
    pub fn new(server: FileServer) -> Self {
        Self { server }
    }
}

#[async_trait]
impl Handler for VaultHandler {
    type Reader = AllowStdIo<std::fs::File>;
    type Writer = AllowStdIo<std::fs::File>;

    async fn read_req_open(
        &mut self,
        client: &SocketAddr,
        path: &Path,
    ) -> Result<(Self::Reader, Option<u64>), packet::Error> {
        let request_id = Uuid::new_v4();
        let requested = path.to_string_lossy();
        info!(%request_id, peer = %client, path = %requested, "read request");

        match self.server.open_download(&requested) {
            Ok((file, size)) => {
                debug!(%request_id, size, "serving file");
                Ok((AllowStdIo::new(file), Some(size)))
            }
            Err(err) => {
                log_refusal(request_id, &requested, &err);
                Err(packet::Error::Msg(err.peer_message().to_owned()))
            }
        }
    }

    async fn write_req_open(
        &mut self,
        client: &SocketAddr,
        path: &Path,
        size: Option<u64>,
    ) -> Result<Self::Writer, packet::Error> {
        let request_id = Uuid::new_v4();
        let requested = path.to_string_lossy();
        info!(%request_id, peer = %client, path = %requested, size, "write request");

        match self.server.create_upload(&requested) {
            Ok(file) => {
                debug!(%request_id, "receiving file");
                Ok(AllowStdIo::new(file))
            }
            Err(err) => {
                log_refusal(request_id, &requested, &err);
                Err(packet::Error::Msg(err.peer_message().to_owned()))
            }
        }
    }
}

/// Bind the engine and serve until it fails or the process is stopped.
pub async fn serve(server: FileServer, addr: SocketAddr, timeout: Duration) -> anyhow::Result<()> {
    let tftpd = TftpServerBuilder::with_handler(VaultHandler::new(server))
        .bind(addr)
        .timeout(timeout)
        .build()
        .await
        .context("failed to start the TFTP engine")?;

    let listen_addr = tftpd
        .listen_addr()
        .context("failed to query the listen address")?;
    info!(addr = %listen_addr, "TFTP server is up");

    tftpd.serve().await.context("TFTP engine terminated")?;
    Ok(())
}

//! # tftpvault core
//!
//! This crate is the file-serving core of tftpvault: it decides whether an
//! untrusted, attacker-controlled path string from the network may touch the
//! filesystem, and performs the actual download/upload I/O when it may.
//!
//! The wire protocol (packet framing, acknowledgment, retransmission,
//! block-size negotiation, timeouts) is owned by an external transfer engine;
//! this crate only exposes handlers for it to invoke.
//!
//! ## Overview
//!
//! - [`PathResolver`]: resolves a request path against a trusted root into a
//!   confined absolute path, or refuses it — including indirect escapes via
//!   `..` traversal and symbolic links.
//! - [`FileServer`]: the download and upload request handlers built on top of
//!   the resolver.
//! - [`ResolveError`] / [`TransferError`]: the closed diagnostic taxonomy
//!   carried from the resolver up to the logging boundary. Peers never see
//!   these details; every refusal is answered with [`OPAQUE_PEER_MESSAGE`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vault::{FileServer, PathResolver};
//!
//! fn main() -> std::io::Result<()> {
//!     let resolver = PathResolver::new("/srv/tftp")?;
//!     let server = FileServer::new(resolver);
//!
//!     let mut sink = Vec::new();
//!     match server.handle_download("dir/foo", &mut sink) {
//!         Ok(bytes) => println!("sent {bytes} bytes"),
//!         Err(err) => eprintln!("{}", err.peer_message()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod resolver;
pub mod transfer;

pub use resolver::{PathResolver, ResolveError};
pub use transfer::{log_refusal, FileServer, TransferError, OPAQUE_PEER_MESSAGE};

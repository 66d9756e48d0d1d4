//! Download and upload request handlers.
//!
//! Both handlers resolve the untrusted request path first and only then
//! touch the filesystem. File handles are request-scoped: acquired at entry,
//! dropped on every exit path, never shared between requests.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::resolver::{PathResolver, ResolveError};

/// The only failure detail a network peer is ever shown.
///
/// Resolution, open, and create failures must not disclose filesystem layout
/// or file existence, so all of them collapse to this fixed message.
pub const OPAQUE_PEER_MESSAGE: &str = "invalid path, or not found";

/// Errors that can occur while handling a transfer request.
///
/// All variants are terminal for the request; nothing here is retried.
/// Retry and timeout policy belong to the transfer engine.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The request path was refused by the resolver.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The resolved file could not be opened for download.
    #[error("cannot open {target} for download", target = .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The upload target already exists; exclusive create refused to touch
    /// it.
    #[error("upload target {target} already exists", target = .path.display())]
    AlreadyExists { path: PathBuf },

    /// The upload target could not be created.
    #[error("cannot create {target} for upload", target = .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The transfer stream failed mid-flight; propagated to the engine
    /// unmodified.
    #[error("transfer stream failed")]
    Io(#[source] io::Error),
}

impl TransferError {
    /// The fixed message shown to the remote peer.
    ///
    /// Full diagnostics stay on the logging side; see [`log_refusal`].
    pub fn peer_message(&self) -> &'static str {
        OPAQUE_PEER_MESSAGE
    }
}

/// Emit the full diagnostic record for a refused request.
///
/// This is the logging boundary: the one place where the untrusted input,
/// the computed absolute and evaluated forms, the reason code, and the
/// underlying cause become visible. The peer is answered with
/// [`OPAQUE_PEER_MESSAGE`] alone.
pub fn log_refusal(request_id: Uuid, requested: &str, err: &TransferError) {
    match err {
        TransferError::Resolve(resolve) => match resolve {
            ResolveError::Absolute { joined, source, .. } => {
                error!(
                    %request_id,
                    input = requested,
                    reason = resolve.reason(),
                    joined = %joined.display(),
                    cause = %source,
                    "failed to evaluate path"
                );
            }
            ResolveError::Evaluate { absolute, source, .. } => {
                error!(
                    %request_id,
                    input = requested,
                    reason = resolve.reason(),
                    absolute = %absolute.display(),
                    cause = %source,
                    "failed to evaluate path"
                );
            }
            ResolveError::OutsideRoot { absolute, evaluated, .. } => {
                error!(
                    %request_id,
                    input = requested,
                    reason = resolve.reason(),
                    absolute = %absolute.display(),
                    evaluated = ?evaluated,
                    "failed to evaluate path"
                );
            }
        },
        TransferError::Open { path, source } => {
            error!(%request_id, input = requested, path = %path.display(), cause = %source, "failed to open the file");
        }
        TransferError::AlreadyExists { path } => {
            error!(%request_id, input = requested, path = %path.display(), "upload target already exists");
        }
        TransferError::Create { path, source } => {
            error!(%request_id, input = requested, path = %path.display(), cause = %source, "failed to create the file");
        }
        TransferError::Io(source) => {
            error!(%request_id, input = requested, cause = %source, "transfer stream failed");
        }
    }
}

/// Serves downloads and uploads confined to one trusted root.
///
/// A `FileServer` is an explicit value, not process state: construct as many
/// independent instances as needed. It is cheap to clone and safe to share
/// across concurrently dispatched requests; its only state is the immutable
/// resolver. Two concurrent uploads racing for the same resolved path are
/// arbitrated by the filesystem's exclusive create, exactly one wins.
#[derive(Debug, Clone)]
pub struct FileServer {
    resolver: PathResolver,
}

impl FileServer {
    /// Create a server over an already-constructed resolver.
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// The resolver this server confines requests with.
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Resolve and open a file for download, without driving the stream.
    ///
    /// Entry point for transfer engines that pull the bytes themselves.
    /// Returns the open handle and the file size. Symlinks are evaluated:
    /// the target must already exist and must resolve inside the root.
    pub fn open_download(&self, requested: &str) -> Result<(File, u64), TransferError> {
        let resolved = self.resolver.resolve(requested, true)?;

        let file = File::open(&resolved).map_err(|source| TransferError::Open {
            path: resolved.clone(),
            source,
        })?;
        let size = file
            .metadata()
            .map_err(|source| TransferError::Open {
                path: resolved,
                source,
            })?
            .len();

        Ok((file, size))
    }

    /// Resolve and create a file for upload, without driving the stream.
    ///
    /// Entry point for transfer engines that push the bytes themselves.
    /// Symlink evaluation is skipped since the target does not exist yet.
    /// The create is exclusive: an existing entry is never overwritten or
    /// truncated.
    pub fn create_upload(&self, requested: &str) -> Result<File, TransferError> {
        let resolved = self.resolver.resolve(requested, false)?;

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }

        options.open(&resolved).map_err(|source| {
            if source.kind() == io::ErrorKind::AlreadyExists {
                TransferError::AlreadyExists { path: resolved }
            } else {
                TransferError::Create {
                    path: resolved,
                    source,
                }
            }
        })
    }

    /// Handle a download request, streaming the whole file into `sink`.
    ///
    /// Returns the number of bytes sent. The file handle is released exactly
    /// once on every exit path, success or failure.
    pub fn handle_download<W: Write>(
        &self,
        requested: &str,
        sink: &mut W,
    ) -> Result<u64, TransferError> {
        let request_id = Uuid::new_v4();
        info!(%request_id, path = requested, "read request");

        let (mut file, size) = self.open_download(requested).map_err(|err| {
            log_refusal(request_id, requested, &err);
            err
        })?;
        debug!(%request_id, size, "streaming file to peer");

        match io::copy(&mut file, sink) {
            Ok(bytes) => {
                info!(%request_id, bytes, "successfully handled");
                Ok(bytes)
            }
            Err(source) => {
                let err = TransferError::Io(source);
                log_refusal(request_id, requested, &err);
                Err(err)
            }
        }
    }

    /// Handle an upload request, streaming `source` into a freshly created
    /// file.
    ///
    /// Returns the number of bytes written. On a mid-transfer failure the
    /// partially written file is left on disk (accepted limitation), but the
    /// handle is still released before returning.
    pub fn handle_upload<R: Read>(
        &self,
        requested: &str,
        source: &mut R,
    ) -> Result<u64, TransferError> {
        let request_id = Uuid::new_v4();
        info!(%request_id, path = requested, "write request");

        let mut file = self.create_upload(requested).map_err(|err| {
            log_refusal(request_id, requested, &err);
            err
        })?;
        debug!(%request_id, "receiving file from peer");

        match io::copy(source, &mut file) {
            Ok(bytes) => {
                info!(%request_id, bytes, "successfully handled");
                Ok(bytes)
            }
            Err(source) => {
                let err = TransferError::Io(source);
                log_refusal(request_id, requested, &err);
                Err(err)
            }
        }
    }
}

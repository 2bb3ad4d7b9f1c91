//! Warm-open strategy for tiered backends
//!
//! A tiered in-memory store promotes a file into its fast tier only after
//! one complete sequential read, and only a close after that read commits
//! the promotion. Until then seeks on the stream are unreliable. The
//! warm-open path therefore reads the whole file once into a discarded
//! scratch buffer, closes, and reopens at offset zero before handing the
//! stream to the caller.

use dfscache_backend::RemoteBinding;
use dfscache_common::{Error, OpenMode, Result};
use tracing::{debug, warn};

/// How an adapter opens files, fixed at adapter construction from the
/// backend type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenStrategy {
    /// Plain pass-through open
    Direct,
    /// Full sequential read before any read-mode open is served
    WarmBeforeRead,
}

impl OpenStrategy {
    /// Strategy for a backend type; only the tiered store warms
    #[must_use]
    pub fn for_fs_type(fs_type: dfscache_common::FsType) -> Self {
        match fs_type {
            dfscache_common::FsType::TieredMemory => Self::WarmBeforeRead,
            _ => Self::Direct,
        }
    }
}

/// Scratch buffer size for the priming read; contents are discarded
pub(crate) const WARM_BUF_LEN: usize = 6_684_672;

/// Open with priming. Write/append opens bypass priming entirely.
pub(crate) fn open_warm<B: RemoteBinding>(
    binding: &B,
    conn: &B::Conn,
    path: &str,
    mode: OpenMode,
) -> Result<B::File> {
    let mut handle = binding.open(conn, path, mode)?;
    if !mode.is_read() {
        return Ok(handle);
    }

    let mut buf: Vec<u8> = Vec::new();
    if buf.try_reserve_exact(WARM_BUF_LEN).is_err() {
        // a non-warmed tiered stream cannot be seeked reliably; better no
        // handle than a broken one
        warn!(path, "scratch buffer reservation failed, abandoning warm open");
        let _ = binding.close(conn, handle);
        return Err(Error::priming(path, "scratch buffer allocation failed"));
    }
    buf.resize(WARM_BUF_LEN, 0);

    let mut total: u64 = 0;
    loop {
        match binding.read(conn, &mut handle, &mut buf) {
            Ok(0) => break, // end of stream reached; promotion is pending the close
            Ok(n) => total += n as u64,
            Err(e) => {
                // no retry; a retry would have to restart from offset zero
                // or the promotion is cancelled by the backend
                warn!(path, bytes_read = total, error = %e, "priming read failed");
                let _ = binding.close(conn, handle);
                return Err(Error::priming(path, e.to_string()));
            }
        }
    }

    // this close commits the tier promotion
    binding
        .close(conn, handle)
        .map_err(|e| Error::priming(path, format!("close after priming read: {e}")))?;

    debug!(path, bytes_read = total, "file primed, reopening at offset zero");
    binding.open(conn, path, mode)
}

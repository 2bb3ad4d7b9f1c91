//! The native binding trait
//!
//! One `RemoteBinding` implementation wraps one native filesystem library
//! and serves every backend type that library can reach. The pool layer
//! never looks inside `Conn` or `File`; it only moves them across this
//! boundary and forwards results unmodified.

use bytes::Bytes;
use dfscache_common::{
    BackendDescriptor, Endpoint, FileStatus, FsType, OpenMode, Result, ZeroCopyOptions,
};

/// Operation surface of one native remote-filesystem library.
///
/// All calls are blocking; the pool layer guarantees they run outside any
/// of its locks, on a connection exclusively held through a lease.
pub trait RemoteBinding: Send + Sync + 'static {
    /// One established connection to a backend endpoint
    type Conn: Send + Sync;
    /// One open file stream on a connection
    type File: Send;

    /// Establish a connection. An endpoint with an empty host selects the
    /// local/default filesystem.
    fn connect(&self, endpoint: &Endpoint) -> Result<Self::Conn>;

    /// Tear down a connection. Called when the owning adapter is dropped.
    fn disconnect(&self, conn: &Self::Conn) -> Result<()>;

    /// Resolve the effective (host, port, type) for a descriptor that
    /// requests backend-side resolution. The resolved port may be
    /// negative when the backend reports none.
    fn resolve_default(&self, descriptor: &BackendDescriptor) -> Result<(String, i32, FsType)>;

    // File stream operations

    fn open(&self, conn: &Self::Conn, path: &str, mode: OpenMode) -> Result<Self::File>;
    fn close(&self, conn: &Self::Conn, file: Self::File) -> Result<()>;
    fn seek(&self, conn: &Self::Conn, file: &mut Self::File, pos: u64) -> Result<()>;
    fn tell(&self, conn: &Self::Conn, file: &mut Self::File) -> Result<u64>;
    /// Read into `buf`; returns the number of bytes read, 0 at end of
    /// stream.
    fn read(&self, conn: &Self::Conn, file: &mut Self::File, buf: &mut [u8]) -> Result<usize>;
    /// Positional read; does not move the stream position.
    fn pread(
        &self,
        conn: &Self::Conn,
        file: &mut Self::File,
        pos: u64,
        buf: &mut [u8],
    ) -> Result<usize>;
    fn write(&self, conn: &Self::Conn, file: &mut Self::File, buf: &[u8]) -> Result<usize>;
    fn flush(&self, conn: &Self::Conn, file: &mut Self::File) -> Result<()>;

    /// Zero-copy read of up to `max_len` bytes. Option allocation and
    /// configuration happen in `opts`; buffer release is the drop of the
    /// returned `Bytes`. An empty buffer signals end of stream.
    fn zero_copy_read(
        &self,
        conn: &Self::Conn,
        file: &mut Self::File,
        opts: &ZeroCopyOptions,
        max_len: usize,
    ) -> Result<Bytes>;

    // Namespace operations

    fn rename(&self, conn: &Self::Conn, from: &str, to: &str) -> Result<()>;
    fn delete(&self, conn: &Self::Conn, path: &str, recursive: bool) -> Result<()>;
    fn mkdir(&self, conn: &Self::Conn, path: &str) -> Result<()>;
    fn list_directory(&self, conn: &Self::Conn, path: &str) -> Result<Vec<FileStatus>>;
    fn stat(&self, conn: &Self::Conn, path: &str) -> Result<FileStatus>;
    fn exists(&self, conn: &Self::Conn, path: &str) -> Result<bool>;
    fn chown(&self, conn: &Self::Conn, path: &str, owner: &str, group: &str) -> Result<()>;
    fn chmod(&self, conn: &Self::Conn, path: &str, mode: u16) -> Result<()>;

    // Endpoint-wide queries

    fn capacity(&self, conn: &Self::Conn) -> Result<u64>;
    fn used(&self, conn: &Self::Conn) -> Result<u64>;
}

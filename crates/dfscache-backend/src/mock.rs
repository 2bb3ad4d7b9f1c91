//! Scripted in-memory binding
//!
//! Test double for the pool and registry layers: files live in a map,
//! connect attempts and endpoint resolution can be scripted to fail, and
//! per-path open/close/read counters let tests observe exactly what the
//! layer above did.

use crate::binding::RemoteBinding;
use bytes::Bytes;
use dfscache_common::{
    BackendDescriptor, Endpoint, Error, FileKind, FileStatus, FsType, OpenMode, Result,
    ZeroCopyOptions,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

/// In-memory scripted binding
#[derive(Default)]
pub struct MockBinding {
    /// Fail this many connect attempts before succeeding
    connect_failures: AtomicUsize,
    /// Fail this many close attempts before succeeding
    close_failures: AtomicUsize,
    /// Rendezvous pair the next connect attempt parks on
    connect_hold: Mutex<Option<(Arc<Barrier>, Arc<Barrier>)>>,
    /// Total successful connects
    connects: AtomicUsize,
    /// Scripted resolution result; `None` makes resolution fail
    resolved: Mutex<Option<(String, i32, FsType)>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    /// Per-path stream offset at which reads start failing
    fail_read_at: Mutex<HashMap<String, usize>>,
    opens: Mutex<HashMap<String, u32>>,
    closes: Mutex<HashMap<String, u32>>,
    reads: Mutex<HashMap<String, u32>>,
}

/// One scripted connection
pub struct MockConn {
    pub id: usize,
}

/// One scripted file stream
#[derive(Debug)]
pub struct MockFile {
    path: String,
    data: Vec<u8>,
    pos: usize,
    mode: OpenMode,
}

impl MockBinding {
    pub fn new() -> Self {
        let mock = Self::default();
        *mock.resolved.lock() = Some(("localhost".to_string(), 0, FsType::Local));
        mock
    }

    pub fn put_file(&self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.lock().insert(path.into(), data.into());
    }

    pub fn fail_next_connects(&self, n: usize) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_closes(&self, n: usize) {
        self.close_failures.store(n, Ordering::SeqCst);
    }

    /// Park the next connect attempt: it waits on `enter`, then on `exit`,
    /// before completing. Lets a test act while a connect is in flight.
    pub fn hold_next_connect(&self, enter: Arc<Barrier>, exit: Arc<Barrier>) {
        *self.connect_hold.lock() = Some((enter, exit));
    }

    /// Consume one unit of a scripted failure budget, exactly once per
    /// caller even under contention
    fn take_failure(budget: &AtomicUsize) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn set_resolved(&self, resolved: Option<(String, i32, FsType)>) {
        *self.resolved.lock() = resolved;
    }

    pub fn fail_reads_at(&self, path: impl Into<String>, offset: usize) {
        self.fail_read_at.lock().insert(path.into(), offset);
    }

    pub fn open_count(&self, path: &str) -> u32 {
        self.opens.lock().get(path).copied().unwrap_or(0)
    }

    pub fn close_count(&self, path: &str) -> u32 {
        self.closes.lock().get(path).copied().unwrap_or(0)
    }

    pub fn read_count(&self, path: &str) -> u32 {
        self.reads.lock().get(path).copied().unwrap_or(0)
    }

    fn bump(map: &Mutex<HashMap<String, u32>>, path: &str) {
        *map.lock().entry(path.to_string()).or_insert(0) += 1;
    }
}

impl MockFile {
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl RemoteBinding for MockBinding {
    type Conn = MockConn;
    type File = MockFile;

    fn connect(&self, _endpoint: &Endpoint) -> Result<MockConn> {
        if Self::take_failure(&self.connect_failures) {
            return Err(Error::connection("scripted connect failure"));
        }
        if let Some((enter, exit)) = self.connect_hold.lock().take() {
            enter.wait();
            exit.wait();
        }
        Ok(MockConn {
            id: self.connects.fetch_add(1, Ordering::SeqCst),
        })
    }

    fn disconnect(&self, _conn: &MockConn) -> Result<()> {
        Ok(())
    }

    fn resolve_default(&self, descriptor: &BackendDescriptor) -> Result<(String, i32, FsType)> {
        self.resolved
            .lock()
            .clone()
            .ok_or_else(|| Error::internal(format!("scripted resolution failure for {descriptor}")))
    }

    fn open(&self, _conn: &MockConn, path: &str, mode: OpenMode) -> Result<MockFile> {
        Self::bump(&self.opens, path);
        let data = match mode {
            OpenMode::Read => self
                .files
                .lock()
                .get(path)
                .cloned()
                .ok_or_else(|| Error::PathNotFound(path.to_string()))?,
            OpenMode::Write => Vec::new(),
            OpenMode::Append => self.files.lock().get(path).cloned().unwrap_or_default(),
        };
        let pos = if mode == OpenMode::Append { data.len() } else { 0 };
        Ok(MockFile {
            path: path.to_string(),
            data,
            pos,
            mode,
        })
    }

    fn close(&self, _conn: &MockConn, file: MockFile) -> Result<()> {
        Self::bump(&self.closes, &file.path);
        if Self::take_failure(&self.close_failures) {
            return Err(Error::from(std::io::Error::other("scripted close failure")));
        }
        if file.mode != OpenMode::Read {
            self.files.lock().insert(file.path.clone(), file.data);
        }
        Ok(())
    }

    fn seek(&self, _conn: &MockConn, file: &mut MockFile, pos: u64) -> Result<()> {
        file.pos = usize::try_from(pos).map_err(|_| Error::internal("seek offset overflow"))?;
        Ok(())
    }

    fn tell(&self, _conn: &MockConn, file: &mut MockFile) -> Result<u64> {
        Ok(file.pos as u64)
    }

    fn read(&self, _conn: &MockConn, file: &mut MockFile, buf: &mut [u8]) -> Result<usize> {
        Self::bump(&self.reads, &file.path);
        if let Some(&fail_at) = self.fail_read_at.lock().get(&file.path) {
            if file.pos >= fail_at {
                return Err(Error::from(std::io::Error::other("scripted read failure")));
            }
        }
        let remaining = file.data.len().saturating_sub(file.pos);
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&file.data[file.pos..file.pos + n]);
        file.pos += n;
        Ok(n)
    }

    fn pread(
        &self,
        conn: &MockConn,
        file: &mut MockFile,
        pos: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        let saved = file.pos;
        self.seek(conn, file, pos)?;
        let n = self.read(conn, file, buf)?;
        file.pos = saved;
        Ok(n)
    }

    fn write(&self, _conn: &MockConn, file: &mut MockFile, buf: &[u8]) -> Result<usize> {
        file.data.truncate(file.pos);
        file.data.extend_from_slice(buf);
        file.pos = file.data.len();
        Ok(buf.len())
    }

    fn flush(&self, _conn: &MockConn, _file: &mut MockFile) -> Result<()> {
        Ok(())
    }

    fn zero_copy_read(
        &self,
        conn: &MockConn,
        file: &mut MockFile,
        _opts: &ZeroCopyOptions,
        max_len: usize,
    ) -> Result<Bytes> {
        let mut buf = vec![0u8; max_len];
        let n = self.read(conn, file, &mut buf)?;
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }

    fn rename(&self, _conn: &MockConn, from: &str, to: &str) -> Result<()> {
        let mut files = self.files.lock();
        let data = files
            .remove(from)
            .ok_or_else(|| Error::PathNotFound(from.to_string()))?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    fn delete(&self, _conn: &MockConn, path: &str, recursive: bool) -> Result<()> {
        let mut files = self.files.lock();
        if recursive {
            let prefix = format!("{}/", path.trim_end_matches('/'));
            files.retain(|k, _| k != path && !k.starts_with(&prefix));
            Ok(())
        } else if files.remove(path).is_some() {
            Ok(())
        } else {
            Err(Error::PathNotFound(path.to_string()))
        }
    }

    fn mkdir(&self, _conn: &MockConn, _path: &str) -> Result<()> {
        Ok(())
    }

    fn list_directory(&self, _conn: &MockConn, path: &str) -> Result<Vec<FileStatus>> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(self
            .files
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| FileStatus {
                path: k.clone(),
                kind: FileKind::File,
                len: v.len() as u64,
                modified: None,
                owner: String::new(),
                group: String::new(),
                permissions: 0o644,
            })
            .collect())
    }

    fn stat(&self, _conn: &MockConn, path: &str) -> Result<FileStatus> {
        self.files
            .lock()
            .get(path)
            .map(|v| FileStatus {
                path: path.to_string(),
                kind: FileKind::File,
                len: v.len() as u64,
                modified: None,
                owner: String::new(),
                group: String::new(),
                permissions: 0o644,
            })
            .ok_or_else(|| Error::PathNotFound(path.to_string()))
    }

    fn exists(&self, _conn: &MockConn, path: &str) -> Result<bool> {
        Ok(self.files.lock().contains_key(path))
    }

    fn chown(&self, _conn: &MockConn, _path: &str, _owner: &str, _group: &str) -> Result<()> {
        Ok(())
    }

    fn chmod(&self, _conn: &MockConn, _path: &str, _mode: u16) -> Result<()> {
        Ok(())
    }

    fn capacity(&self, _conn: &MockConn) -> Result<u64> {
        Ok(u64::MAX)
    }

    fn used(&self, _conn: &MockConn) -> Result<u64> {
        Ok(self.files.lock().values().map(|v| v.len() as u64).sum())
    }
}

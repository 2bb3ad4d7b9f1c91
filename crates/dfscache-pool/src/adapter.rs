//! Filesystem-bound adapter
//!
//! One adapter per distinct (backend-type, host) endpoint. It owns the
//! connection pool and exposes the full remote-operation surface, each
//! call gated behind a valid lease. The pool lock guards only membership
//! and slot-state changes; file I/O runs on the exclusively leased
//! connection without any lock held.

use crate::conn::{ConnState, Slot};
use crate::lease::ConnLease;
use crate::warm::{self, OpenStrategy};
use bytes::Bytes;
use dfscache_backend::RemoteBinding;
use dfscache_common::{
    BackendDescriptor, Endpoint, Error, FileStatus, FsType, OpenMode, Result, ZeroCopyOptions,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Pooling adapter bound to one remote filesystem endpoint
pub struct FilesystemAdapter<B: RemoteBinding> {
    binding: Arc<B>,
    fs_type: FsType,
    host: String,
    port: i32,
    strategy: OpenStrategy,
    pool: Mutex<Vec<Slot<B>>>,
}

impl<B: RemoteBinding> FilesystemAdapter<B> {
    /// Bind an adapter to the endpoint named by the descriptor. The open
    /// strategy is fixed here from the backend type.
    pub fn new(binding: Arc<B>, descriptor: &BackendDescriptor) -> Self {
        Self {
            binding,
            fs_type: descriptor.fs_type,
            host: descriptor.host.clone(),
            port: descriptor.port,
            strategy: OpenStrategy::for_fs_type(descriptor.fs_type),
            pool: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn open_strategy(&self) -> OpenStrategy {
        self.strategy
    }

    #[must_use]
    pub fn fs_type(&self) -> FsType {
        self.fs_type
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Number of slots ever created for this endpoint
    #[must_use]
    pub fn pool_len(&self) -> usize {
        self.pool.lock().len()
    }

    /// Snapshot of per-slot states, in pool order
    #[must_use]
    pub fn slot_states(&self) -> Vec<ConnState> {
        self.pool.lock().iter().map(Slot::state).collect()
    }

    /// Build one new native connection for this endpoint. An empty host
    /// selects the local/default filesystem; the port is forwarded only
    /// when positive.
    fn connect(&self) -> Result<B::Conn> {
        let endpoint = Endpoint {
            fs_type: self.fs_type,
            host: self.host.clone(),
            port: u16::try_from(self.port).ok().filter(|p| *p > 0),
        };
        self.binding.connect(&endpoint)
    }

    /// Resolve the effective endpoint for a descriptor carrying the
    /// resolve-from-config sentinel and write it back into the
    /// descriptor. A negative resolved port is normalized to zero.
    pub fn resolve_default_endpoint(binding: &B, descriptor: &mut BackendDescriptor) -> Result<()> {
        let (host, port, fs_type) = binding.resolve_default(descriptor)?;
        descriptor.host = host;
        descriptor.port = port.max(0);
        descriptor.fs_type = fs_type;
        Ok(())
    }

    /// Acquire an exclusive lease over a pooled connection.
    ///
    /// Scan order: a `FreeReady` slot first; else a broken slot repaired
    /// in place (a repair failure is final for this call, the slot is not
    /// consumed); else one new connection is created and installed. Failed
    /// connects never register a slot, so the pool size tracks peak
    /// concurrent demand. The pool lock covers only slot bookkeeping; the
    /// blocking native connect of the repair and growth paths runs with
    /// the lock released, so releases and other acquisitions proceed while
    /// a connect is in flight.
    pub fn acquire_connection(&self) -> Result<ConnLease<'_, B>> {
        {
            let mut pool = self.pool.lock();

            if let Some(idx) = pool
                .iter()
                .position(|slot| slot.state() == ConnState::FreeReady)
            {
                if let Some(conn) = pool[idx].acquire() {
                    return Ok(ConnLease::new(self, idx, conn));
                }
            }

            if let Some(idx) = pool
                .iter()
                .position(|slot| slot.state() == ConnState::Uninitialized)
            {
                pool[idx].reserve();
                drop(pool);
                match self.connect() {
                    Ok(conn) => {
                        info!(endpoint = %self.endpoint_label(), slot = idx,
                              "repaired pooled connection in place");
                        let conn = self.pool.lock()[idx].repair(Arc::new(conn));
                        return Ok(ConnLease::new(self, idx, conn));
                    }
                    Err(e) => {
                        warn!(endpoint = %self.endpoint_label(), slot = idx, error = %e,
                              "in-place repair failed");
                        self.pool.lock()[idx].invalidate();
                        return Err(Error::connection(format!(
                            "repair of pooled connection to {} failed: {e}",
                            self.endpoint_label()
                        )));
                    }
                }
            }
        }

        // no usable or repairable slot; grow the pool by one
        debug!(endpoint = %self.endpoint_label(), pool = self.pool_len(),
               "no free connection, creating a new one");
        match self.connect() {
            Ok(conn) => {
                let conn = Arc::new(conn);
                let mut pool = self.pool.lock();
                let idx = pool.len();
                pool.push(Slot::Busy(Arc::clone(&conn)));
                Ok(ConnLease::new(self, idx, conn))
            }
            Err(e) => {
                error!(endpoint = %self.endpoint_label(), error = %e,
                       "unable to connect to filesystem");
                Err(Error::connection(format!(
                    "connect to {} failed: {e}",
                    self.endpoint_label()
                )))
            }
        }
    }

    pub(crate) fn release_slot(&self, idx: usize) {
        let mut pool = self.pool.lock();
        if let Some(slot) = pool.get_mut(idx) {
            slot.release();
        }
    }

    pub(crate) fn break_slot(&self, idx: usize) {
        let mut pool = self.pool.lock();
        if let Some(slot) = pool.get_mut(idx) {
            slot.invalidate();
        }
    }

    fn endpoint_label(&self) -> String {
        format!("{}:{}", self.fs_type, self.host)
    }

    // Pass-through operation surface. Each call forwards to the native
    // binding on the leased connection and returns its result unmodified;
    // only file open consults the adapter's strategy.

    pub fn open_file(
        &self,
        lease: &ConnLease<'_, B>,
        path: &str,
        mode: OpenMode,
    ) -> Result<B::File> {
        match self.strategy {
            OpenStrategy::Direct => self.binding.open(lease.conn(), path, mode),
            OpenStrategy::WarmBeforeRead => {
                warm::open_warm(self.binding.as_ref(), lease.conn(), path, mode)
            }
        }
    }

    pub fn close_file(&self, lease: &ConnLease<'_, B>, file: B::File) -> Result<()> {
        self.binding.close(lease.conn(), file)
    }

    pub fn seek(&self, lease: &ConnLease<'_, B>, file: &mut B::File, pos: u64) -> Result<()> {
        self.binding.seek(lease.conn(), file, pos)
    }

    pub fn tell(&self, lease: &ConnLease<'_, B>, file: &mut B::File) -> Result<u64> {
        self.binding.tell(lease.conn(), file)
    }

    pub fn read(
        &self,
        lease: &ConnLease<'_, B>,
        file: &mut B::File,
        buf: &mut [u8],
    ) -> Result<usize> {
        self.binding.read(lease.conn(), file, buf)
    }

    pub fn pread(
        &self,
        lease: &ConnLease<'_, B>,
        file: &mut B::File,
        pos: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        self.binding.pread(lease.conn(), file, pos, buf)
    }

    pub fn write(
        &self,
        lease: &ConnLease<'_, B>,
        file: &mut B::File,
        buf: &[u8],
    ) -> Result<usize> {
        self.binding.write(lease.conn(), file, buf)
    }

    pub fn flush(&self, lease: &ConnLease<'_, B>, file: &mut B::File) -> Result<()> {
        self.binding.flush(lease.conn(), file)
    }

    pub fn zero_copy_read(
        &self,
        lease: &ConnLease<'_, B>,
        file: &mut B::File,
        opts: &ZeroCopyOptions,
        max_len: usize,
    ) -> Result<Bytes> {
        self.binding.zero_copy_read(lease.conn(), file, opts, max_len)
    }

    pub fn rename(&self, lease: &ConnLease<'_, B>, from: &str, to: &str) -> Result<()> {
        self.binding.rename(lease.conn(), from, to)
    }

    pub fn delete(&self, lease: &ConnLease<'_, B>, path: &str, recursive: bool) -> Result<()> {
        self.binding.delete(lease.conn(), path, recursive)
    }

    pub fn mkdir(&self, lease: &ConnLease<'_, B>, path: &str) -> Result<()> {
        self.binding.mkdir(lease.conn(), path)
    }

    pub fn list_directory(
        &self,
        lease: &ConnLease<'_, B>,
        path: &str,
    ) -> Result<Vec<FileStatus>> {
        self.binding.list_directory(lease.conn(), path)
    }

    pub fn stat(&self, lease: &ConnLease<'_, B>, path: &str) -> Result<FileStatus> {
        self.binding.stat(lease.conn(), path)
    }

    pub fn exists(&self, lease: &ConnLease<'_, B>, path: &str) -> Result<bool> {
        self.binding.exists(lease.conn(), path)
    }

    pub fn chown(
        &self,
        lease: &ConnLease<'_, B>,
        path: &str,
        owner: &str,
        group: &str,
    ) -> Result<()> {
        self.binding.chown(lease.conn(), path, owner, group)
    }

    pub fn chmod(&self, lease: &ConnLease<'_, B>, path: &str, mode: u16) -> Result<()> {
        self.binding.chmod(lease.conn(), path, mode)
    }

    pub fn capacity(&self, lease: &ConnLease<'_, B>) -> Result<u64> {
        self.binding.capacity(lease.conn())
    }

    pub fn used(&self, lease: &ConnLease<'_, B>) -> Result<u64> {
        self.binding.used(lease.conn())
    }
}

impl<B: RemoteBinding> Drop for FilesystemAdapter<B> {
    fn drop(&mut self) {
        // close every native connection this endpoint still owns
        let pool = self.pool.lock();
        for slot in pool.iter() {
            if let Some(conn) = slot.conn() {
                if let Err(e) = self.binding.disconnect(conn) {
                    warn!(endpoint = %self.endpoint_label(), error = %e,
                          "disconnect on adapter teardown failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfscache_backend::MockBinding;
    use std::sync::Barrier;

    fn hdfs_adapter(mock: &Arc<MockBinding>) -> FilesystemAdapter<MockBinding> {
        let descriptor = BackendDescriptor::new(FsType::Hdfs, "nn1", 8020);
        FilesystemAdapter::new(mock.clone(), &descriptor)
    }

    #[test]
    fn test_lease_roundtrip_reuses_slot() {
        let mock = Arc::new(MockBinding::new());
        let adapter = hdfs_adapter(&mock);

        let lease = adapter.acquire_connection().unwrap();
        assert_eq!(adapter.pool_len(), 1);
        assert_eq!(adapter.slot_states(), vec![ConnState::Busy]);
        let first_slot = lease.slot();
        drop(lease);

        assert_eq!(adapter.pool_len(), 1);
        assert_eq!(adapter.slot_states(), vec![ConnState::FreeReady]);

        let lease = adapter.acquire_connection().unwrap();
        assert_eq!(lease.slot(), first_slot);
        assert_eq!(adapter.pool_len(), 1);
        assert_eq!(mock.connect_count(), 1);
    }

    #[test]
    fn test_lease_released_on_early_exit() {
        let mock = Arc::new(MockBinding::new());
        let adapter = hdfs_adapter(&mock);

        fn bail_out(adapter: &FilesystemAdapter<MockBinding>) -> Result<()> {
            let lease = adapter.acquire_connection()?;
            let _ = adapter.exists(&lease, "/missing")?;
            Err(Error::internal("synthetic failure"))
        }

        assert!(bail_out(&adapter).is_err());
        assert_eq!(adapter.slot_states(), vec![ConnState::FreeReady]);
    }

    #[test]
    fn test_pool_growth_is_demand_bounded() {
        let mock = Arc::new(MockBinding::new());
        let adapter = hdfs_adapter(&mock);
        const K: usize = 8;

        let gate = Barrier::new(K + 1);
        let hold = Barrier::new(K + 1);
        std::thread::scope(|s| {
            for _ in 0..K {
                s.spawn(|| {
                    let lease = adapter.acquire_connection().unwrap();
                    gate.wait();
                    hold.wait();
                    drop(lease);
                });
            }
            gate.wait();
            // all K leases are live right now
            assert_eq!(adapter.pool_len(), K);
            assert!(
                adapter
                    .slot_states()
                    .iter()
                    .all(|s| *s == ConnState::Busy)
            );
            hold.wait();
        });

        // releases keep the slots, nothing is torn down
        assert_eq!(adapter.pool_len(), K);
        assert!(
            adapter
                .slot_states()
                .iter()
                .all(|s| *s == ConnState::FreeReady)
        );
        assert_eq!(mock.connect_count(), K);
    }

    #[test]
    fn test_release_proceeds_during_hung_connect() {
        let mock = Arc::new(MockBinding::new());
        let adapter = hdfs_adapter(&mock);

        let first = adapter.acquire_connection().unwrap();

        let enter = Arc::new(Barrier::new(2));
        let exit = Arc::new(Barrier::new(2));
        mock.hold_next_connect(enter.clone(), exit.clone());

        std::thread::scope(|s| {
            let pending = s.spawn(|| adapter.acquire_connection().unwrap());

            // rendezvous inside the growth connect; it is blocked right now
            enter.wait();
            // releasing and re-acquiring the first slot must not wait
            // behind the in-flight connect
            drop(first);
            assert_eq!(adapter.slot_states()[0], ConnState::FreeReady);
            let again = adapter.acquire_connection().unwrap();
            assert_eq!(again.slot(), 0);
            drop(again);

            exit.wait();
            let lease = pending.join().unwrap();
            assert_eq!(lease.slot(), 1);
        });

        assert_eq!(adapter.pool_len(), 2);
    }

    #[test]
    fn test_connect_failure_registers_no_slot() {
        let mock = Arc::new(MockBinding::new());
        let adapter = hdfs_adapter(&mock);

        mock.fail_next_connects(1);
        let err = adapter.acquire_connection().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(adapter.pool_len(), 0);

        // next attempt succeeds and creates the first slot
        let lease = adapter.acquire_connection().unwrap();
        assert_eq!(adapter.pool_len(), 1);
        drop(lease);
    }

    #[test]
    fn test_broken_slot_repaired_in_place() {
        let mock = Arc::new(MockBinding::new());
        let adapter = hdfs_adapter(&mock);

        let lease = adapter.acquire_connection().unwrap();
        let slot = lease.slot();
        lease.mark_broken();
        assert_eq!(adapter.slot_states(), vec![ConnState::Uninitialized]);

        let lease = adapter.acquire_connection().unwrap();
        assert_eq!(lease.slot(), slot);
        assert_eq!(adapter.pool_len(), 1);
        assert_eq!(adapter.slot_states(), vec![ConnState::Busy]);
        // repair used a second native connect
        assert_eq!(mock.connect_count(), 2);
    }

    #[test]
    fn test_failed_repair_leaves_slot_broken() {
        let mock = Arc::new(MockBinding::new());
        let adapter = hdfs_adapter(&mock);

        adapter.acquire_connection().unwrap().mark_broken();
        mock.fail_next_connects(1);

        let err = adapter.acquire_connection().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(adapter.pool_len(), 1);
        assert_eq!(adapter.slot_states(), vec![ConnState::Uninitialized]);

        // a later attempt repairs the same slot
        let lease = adapter.acquire_connection().unwrap();
        assert_eq!(lease.slot(), 0);
        assert_eq!(adapter.pool_len(), 1);
    }

    #[test]
    fn test_passthrough_io_through_lease() {
        let mock = Arc::new(MockBinding::new());
        mock.put_file("/t/one", b"abcdef".to_vec());
        let adapter = hdfs_adapter(&mock);

        let lease = adapter.acquire_connection().unwrap();
        let mut file = adapter
            .open_file(&lease, "/t/one", OpenMode::Read)
            .unwrap();
        adapter.seek(&lease, &mut file, 2).unwrap();
        let mut buf = [0u8; 2];
        let n = adapter.read(&lease, &mut file, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"cd");
        assert_eq!(adapter.tell(&lease, &mut file).unwrap(), 4);
        adapter.close_file(&lease, file).unwrap();

        assert!(adapter.exists(&lease, "/t/one").unwrap());
        assert_eq!(adapter.stat(&lease, "/t/one").unwrap().len, 6);
    }

    #[test]
    fn test_tiered_adapter_warms_on_open() {
        let mock = Arc::new(MockBinding::new());
        mock.put_file("/hot/seg", vec![3u8; 4096]);
        let descriptor = BackendDescriptor::new(FsType::TieredMemory, "tier1", 19998);
        let adapter = FilesystemAdapter::new(mock.clone(), &descriptor);
        assert_eq!(adapter.open_strategy(), OpenStrategy::WarmBeforeRead);

        let lease = adapter.acquire_connection().unwrap();
        let file = adapter.open_file(&lease, "/hot/seg", OpenMode::Read).unwrap();

        // primed: open, full read, close, reopen
        assert_eq!(mock.open_count("/hot/seg"), 2);
        assert_eq!(mock.close_count("/hot/seg"), 1);
        assert_eq!(file.position(), 0);

        // write opens skip priming even on the tiered adapter
        let out = adapter.open_file(&lease, "/hot/out", OpenMode::Write).unwrap();
        assert_eq!(mock.open_count("/hot/out"), 1);
        adapter.close_file(&lease, out).unwrap();
    }

    #[test]
    fn test_resolve_default_endpoint_normalizes_port() {
        let mock = MockBinding::new();
        mock.set_resolved(Some(("nn-real".to_string(), -1, FsType::Hdfs)));
        let mut descriptor =
            BackendDescriptor::new(FsType::DefaultFromConfig, dfscache_common::DEFAULT_HOST_ALIAS, 0);

        FilesystemAdapter::resolve_default_endpoint(&mock, &mut descriptor).unwrap();
        assert_eq!(descriptor.host, "nn-real");
        assert_eq!(descriptor.port, 0);
        assert_eq!(descriptor.fs_type, FsType::Hdfs);
        assert!(!descriptor.needs_resolution());
    }
}

//! Local-disk implementation of the binding
//!
//! Serves the `local` backend type and doubles as the on-disk test
//! backend. All paths are resolved under a fixed base directory, so a
//! "remote" path `/warehouse/t1/p0.parq` lands at
//! `<base>/warehouse/t1/p0.parq`.

use crate::binding::RemoteBinding;
use bytes::{Bytes, BytesMut};
use dfscache_common::{
    BackendDescriptor, Endpoint, Error, FileKind, FileStatus, FsType, OpenMode, Result,
    ZeroCopyOptions,
};
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Native binding over the local filesystem
pub struct LocalBinding {
    base: PathBuf,
}

/// One "connection" to the local filesystem; carries only the resolved root
pub struct LocalConn {
    root: PathBuf,
}

/// One open local file stream
#[derive(Debug)]
pub struct LocalFile {
    file: fs::File,
    path: PathBuf,
}

impl LocalBinding {
    /// Create a binding rooted at `base`. The directory is created if absent.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    fn resolve(root: &Path, path: &str) -> PathBuf {
        root.join(path.trim_start_matches('/'))
    }

    fn status_of(path: &Path, meta: &fs::Metadata) -> FileStatus {
        FileStatus {
            path: path.to_string_lossy().into_owned(),
            kind: if meta.is_dir() {
                FileKind::Directory
            } else {
                FileKind::File
            },
            len: meta.len(),
            modified: meta.modified().ok(),
            owner: String::new(),
            group: String::new(),
            permissions: unix_mode(meta),
        }
    }
}

#[cfg(unix)]
fn unix_mode(meta: &fs::Metadata) -> u16 {
    use std::os::unix::fs::PermissionsExt;
    (meta.permissions().mode() & 0o777) as u16
}

#[cfg(not(unix))]
fn unix_mode(_meta: &fs::Metadata) -> u16 {
    0
}

impl RemoteBinding for LocalBinding {
    type Conn = LocalConn;
    type File = LocalFile;

    fn connect(&self, endpoint: &Endpoint) -> Result<LocalConn> {
        // host is irrelevant for a local backend; every endpoint maps to
        // the configured base directory
        debug!(endpoint = %endpoint.host, "local binding connect");
        fs::create_dir_all(&self.base)?;
        Ok(LocalConn {
            root: self.base.clone(),
        })
    }

    fn disconnect(&self, _conn: &LocalConn) -> Result<()> {
        Ok(())
    }

    fn resolve_default(&self, _descriptor: &BackendDescriptor) -> Result<(String, i32, FsType)> {
        Ok(("localhost".to_string(), 0, FsType::Local))
    }

    fn open(&self, conn: &LocalConn, path: &str, mode: OpenMode) -> Result<LocalFile> {
        let full = Self::resolve(&conn.root, path);
        let file = match mode {
            OpenMode::Read => fs::File::open(&full)?,
            OpenMode::Write => {
                if let Some(parent) = full.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::File::create(&full)?
            }
            OpenMode::Append => fs::OpenOptions::new().append(true).create(true).open(&full)?,
        };
        Ok(LocalFile { file, path: full })
    }

    fn close(&self, _conn: &LocalConn, file: LocalFile) -> Result<()> {
        drop(file);
        Ok(())
    }

    fn seek(&self, _conn: &LocalConn, file: &mut LocalFile, pos: u64) -> Result<()> {
        file.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn tell(&self, _conn: &LocalConn, file: &mut LocalFile) -> Result<u64> {
        Ok(file.file.stream_position()?)
    }

    fn read(&self, _conn: &LocalConn, file: &mut LocalFile, buf: &mut [u8]) -> Result<usize> {
        Ok(file.file.read(buf)?)
    }

    fn pread(
        &self,
        _conn: &LocalConn,
        file: &mut LocalFile,
        pos: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        // positional read must not disturb the stream position
        let saved = file.file.stream_position()?;
        file.file.seek(SeekFrom::Start(pos))?;
        let n = file.file.read(buf)?;
        file.file.seek(SeekFrom::Start(saved))?;
        Ok(n)
    }

    fn write(&self, _conn: &LocalConn, file: &mut LocalFile, buf: &[u8]) -> Result<usize> {
        Ok(file.file.write(buf)?)
    }

    fn flush(&self, _conn: &LocalConn, file: &mut LocalFile) -> Result<()> {
        file.file.flush()?;
        file.file.sync_data()?;
        Ok(())
    }

    fn zero_copy_read(
        &self,
        conn: &LocalConn,
        file: &mut LocalFile,
        _opts: &ZeroCopyOptions,
        max_len: usize,
    ) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(max_len);
        let n = self.read(conn, file, &mut buf)?;
        buf.truncate(n);
        Ok(buf.freeze())
    }

    fn rename(&self, conn: &LocalConn, from: &str, to: &str) -> Result<()> {
        let to_full = Self::resolve(&conn.root, to);
        if let Some(parent) = to_full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(Self::resolve(&conn.root, from), to_full)?;
        Ok(())
    }

    fn delete(&self, conn: &LocalConn, path: &str, recursive: bool) -> Result<()> {
        let full = Self::resolve(&conn.root, path);
        let meta = fs::metadata(&full)?;
        if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(&full)?;
            } else {
                fs::remove_dir(&full)?;
            }
        } else {
            fs::remove_file(&full)?;
        }
        Ok(())
    }

    fn mkdir(&self, conn: &LocalConn, path: &str) -> Result<()> {
        fs::create_dir_all(Self::resolve(&conn.root, path))?;
        Ok(())
    }

    fn list_directory(&self, conn: &LocalConn, path: &str) -> Result<Vec<FileStatus>> {
        let full = Self::resolve(&conn.root, path);
        let mut out = Vec::new();
        for entry in fs::read_dir(&full)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            out.push(Self::status_of(&entry.path(), &meta));
        }
        Ok(out)
    }

    fn stat(&self, conn: &LocalConn, path: &str) -> Result<FileStatus> {
        let full = Self::resolve(&conn.root, path);
        let meta = fs::metadata(&full)?;
        Ok(Self::status_of(&full, &meta))
    }

    fn exists(&self, conn: &LocalConn, path: &str) -> Result<bool> {
        Ok(Self::resolve(&conn.root, path).exists())
    }

    fn chown(&self, _conn: &LocalConn, path: &str, _owner: &str, _group: &str) -> Result<()> {
        Err(Error::Unsupported(format!(
            "chown on local backend: {path}"
        )))
    }

    #[cfg(unix)]
    fn chmod(&self, conn: &LocalConn, path: &str, mode: u16) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let full = Self::resolve(&conn.root, path);
        fs::set_permissions(&full, fs::Permissions::from_mode(u32::from(mode)))?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn chmod(&self, _conn: &LocalConn, path: &str, _mode: u16) -> Result<()> {
        Err(Error::Unsupported(format!(
            "chmod on local backend: {path}"
        )))
    }

    fn capacity(&self, _conn: &LocalConn) -> Result<u64> {
        Err(Error::Unsupported(
            "capacity query on local backend".to_string(),
        ))
    }

    fn used(&self, conn: &LocalConn) -> Result<u64> {
        fn walk(dir: &Path) -> std::io::Result<u64> {
            let mut total = 0;
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let meta = entry.metadata()?;
                total += if meta.is_dir() {
                    walk(&entry.path())?
                } else {
                    meta.len()
                };
            }
            Ok(total)
        }
        Ok(walk(&conn.root)?)
    }
}

impl LocalFile {
    /// Full on-disk path of this stream
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfscache_common::Endpoint;

    fn binding() -> (tempfile::TempDir, LocalBinding, LocalConn) {
        let dir = tempfile::tempdir().unwrap();
        let binding = LocalBinding::new(dir.path()).unwrap();
        let conn = binding
            .connect(&Endpoint {
                fs_type: FsType::Local,
                host: String::new(),
                port: None,
            })
            .unwrap();
        (dir, binding, conn)
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, b, conn) = binding();
        let mut f = b.open(&conn, "/a/b.txt", OpenMode::Write).unwrap();
        b.write(&conn, &mut f, b"hello world").unwrap();
        b.flush(&conn, &mut f).unwrap();
        b.close(&conn, f).unwrap();

        let mut f = b.open(&conn, "/a/b.txt", OpenMode::Read).unwrap();
        let mut buf = [0u8; 32];
        let n = b.read(&conn, &mut f, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world");
    }

    #[test]
    fn test_pread_preserves_position() {
        let (_dir, b, conn) = binding();
        let mut f = b.open(&conn, "/f", OpenMode::Write).unwrap();
        b.write(&conn, &mut f, b"0123456789").unwrap();
        b.close(&conn, f).unwrap();

        let mut f = b.open(&conn, "/f", OpenMode::Read).unwrap();
        let mut two = [0u8; 2];
        b.read(&conn, &mut f, &mut two).unwrap();
        assert_eq!(b.tell(&conn, &mut f).unwrap(), 2);

        let mut buf = [0u8; 3];
        let n = b.pread(&conn, &mut f, 5, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"567");
        assert_eq!(b.tell(&conn, &mut f).unwrap(), 2);
    }

    #[test]
    fn test_seek_and_tell() {
        let (_dir, b, conn) = binding();
        let mut f = b.open(&conn, "/f", OpenMode::Write).unwrap();
        b.write(&conn, &mut f, b"abcdef").unwrap();
        b.close(&conn, f).unwrap();

        let mut f = b.open(&conn, "/f", OpenMode::Read).unwrap();
        b.seek(&conn, &mut f, 3).unwrap();
        let mut buf = [0u8; 3];
        let n = b.read(&conn, &mut f, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"def");
    }

    #[test]
    fn test_rename_delete_exists() {
        let (_dir, b, conn) = binding();
        let mut f = b.open(&conn, "/old", OpenMode::Write).unwrap();
        b.write(&conn, &mut f, b"x").unwrap();
        b.close(&conn, f).unwrap();

        b.rename(&conn, "/old", "/sub/new").unwrap();
        assert!(!b.exists(&conn, "/old").unwrap());
        assert!(b.exists(&conn, "/sub/new").unwrap());

        b.delete(&conn, "/sub", true).unwrap();
        assert!(!b.exists(&conn, "/sub/new").unwrap());
    }

    #[test]
    fn test_list_and_stat() {
        let (_dir, b, conn) = binding();
        b.mkdir(&conn, "/d").unwrap();
        for name in ["/d/one", "/d/two"] {
            let mut f = b.open(&conn, name, OpenMode::Write).unwrap();
            b.write(&conn, &mut f, b"data").unwrap();
            b.close(&conn, f).unwrap();
        }

        let listing = b.list_directory(&conn, "/d").unwrap();
        assert_eq!(listing.len(), 2);

        let st = b.stat(&conn, "/d/one").unwrap();
        assert_eq!(st.kind, FileKind::File);
        assert_eq!(st.len, 4);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let (_dir, b, conn) = binding();
        let err = b.open(&conn, "/nope", OpenMode::Read).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_zero_copy_read() {
        let (_dir, b, conn) = binding();
        let mut f = b.open(&conn, "/f", OpenMode::Write).unwrap();
        b.write(&conn, &mut f, b"zero copy payload").unwrap();
        b.close(&conn, f).unwrap();

        let mut f = b.open(&conn, "/f", OpenMode::Read).unwrap();
        let opts = ZeroCopyOptions::default();
        let bytes = b.zero_copy_read(&conn, &mut f, &opts, 4).unwrap();
        assert_eq!(&bytes[..], b"zero");
        let rest = b.zero_copy_read(&conn, &mut f, &opts, 64).unwrap();
        assert_eq!(&rest[..], b" copy payload");
    }

    #[test]
    fn test_used_walks_tree() {
        let (_dir, b, conn) = binding();
        let mut f = b.open(&conn, "/x/a", OpenMode::Write).unwrap();
        b.write(&conn, &mut f, b"12345").unwrap();
        b.close(&conn, f).unwrap();
        let mut f = b.open(&conn, "/y", OpenMode::Write).unwrap();
        b.write(&conn, &mut f, b"123").unwrap();
        b.close(&conn, f).unwrap();

        assert_eq!(b.used(&conn).unwrap(), 8);
    }

    #[test]
    fn test_resolve_default() {
        let (_dir, b, _conn) = binding();
        let d = BackendDescriptor::new(FsType::DefaultFromConfig, "default", 0);
        let (host, port, fs_type) = b.resolve_default(&d).unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 0);
        assert_eq!(fs_type, FsType::Local);
    }
}

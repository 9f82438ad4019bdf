//! Filesystem abstraction the disk manager consumes.
//!
//! Out of scope per the spec (an external collaborator), but the core needs
//! *an* interface to depend on, so this module defines the minimal trait
//! (open/read/write/exists/ensure-dir/length) and a `tokio::fs`-backed
//! default implementation good enough to exercise the whole crate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

/// A file opened for random-access reads and writes.
///
/// `read_at` never fails on a short read: bytes past the file's current
/// length are zero-filled into `buf`, matching the disk manager's contract
/// (spec.md §4.5) for reading a page that was never fully written.
#[async_trait]
pub trait RandomAccessFile: Send + Sync {
    async fn len(&self) -> std::io::Result<u64>;
    async fn set_len(&self, len: u64) -> std::io::Result<()>;
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;
    async fn write_at(&self, offset: u64, buf: &[u8]) -> std::io::Result<()>;
}

/// Filesystem operations the disk manager needs. Implemented against
/// `tokio::fs` by default; a test double can swap in an in-memory version.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn ensure_dir(&self, path: &Path) -> std::io::Result<()>;
    async fn exists(&self, path: &Path) -> bool;
    async fn open_read_write(&self, path: &Path) -> std::io::Result<Arc<dyn RandomAccessFile>>;
}

pub struct TokioFileSystem;

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn ensure_dir(&self, path: &Path) -> std::io::Result<()> {
        fs::create_dir_all(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).await.is_ok()
    }

    async fn open_read_write(&self, path: &Path) -> std::io::Result<Arc<dyn RandomAccessFile>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .await?;
        Ok(Arc::new(TokioRandomAccessFile {
            file: Mutex::new(file),
        }))
    }
}

/// `tokio::fs::File` has no portable positional read/write, so access is
/// serialized behind a seek-then-read/write under a mutex.
struct TokioRandomAccessFile {
    file: Mutex<File>,
}

#[async_trait]
impl RandomAccessFile for TokioRandomAccessFile {
    async fn len(&self) -> std::io::Result<u64> {
        let file = self.file.lock().await;
        Ok(file.metadata().await?.len())
    }

    async fn set_len(&self, len: u64) -> std::io::Result<()> {
        let file = self.file.lock().await;
        file.set_len(len).await
    }

    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        let mut file = self.file.lock().await;
        let len = file.metadata().await?.len();
        buf.fill(0);
        if offset >= len {
            return Ok(());
        }
        let available = ((len - offset) as usize).min(buf.len());
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.read_exact(&mut buf[..available]).await
    }

    async fn write_at(&self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(buf).await
    }
}

/// Always-empty filesystem backed purely by an in-process byte vector, for
/// tests that want to exercise the disk manager contract without touching
/// the real filesystem.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    pub struct InMemoryFileSystem {
        files: StdMutex<HashMap<PathBuf, Arc<InMemoryFile>>>,
    }

    #[derive(Default)]
    struct InMemoryFile {
        bytes: StdMutex<Vec<u8>>,
    }

    #[async_trait]
    impl RandomAccessFile for InMemoryFile {
        async fn len(&self) -> std::io::Result<u64> {
            Ok(self.bytes.lock().unwrap().len() as u64)
        }

        async fn set_len(&self, len: u64) -> std::io::Result<()> {
            self.bytes.lock().unwrap().resize(len as usize, 0);
            Ok(())
        }

        async fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
            let data = self.bytes.lock().unwrap();
            buf.fill(0);
            let start = offset as usize;
            if start >= data.len() {
                return Ok(());
            }
            let available = (data.len() - start).min(buf.len());
            buf[..available].copy_from_slice(&data[start..start + available]);
            Ok(())
        }

        async fn write_at(&self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
            let mut data = self.bytes.lock().unwrap();
            let end = offset as usize + buf.len();
            if data.len() < end {
                data.resize(end, 0);
            }
            data[offset as usize..end].copy_from_slice(buf);
            Ok(())
        }
    }

    #[async_trait]
    impl FileSystem for InMemoryFileSystem {
        async fn ensure_dir(&self, _path: &Path) -> std::io::Result<()> {
            Ok(())
        }

        async fn exists(&self, path: &Path) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }

        async fn open_read_write(
            &self,
            path: &Path,
        ) -> std::io::Result<Arc<dyn RandomAccessFile>> {
            let mut files = self.files.lock().unwrap();
            let file = files
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(InMemoryFile::default()))
                .clone();
            Ok(file)
        }
    }
}

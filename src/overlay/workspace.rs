//! Per-request scratch directories
//!
//! Each request gets its own directory under a shared root, named with a
//! random v4 UUID. Nothing is shared between workspaces, so concurrent
//! requests need no locking; name uniqueness is the only coordination.
//!
//! Removal is best-effort and never fails a request. [`Workspace::release`]
//! is the normal path; dropping an unreleased workspace (panic, cancelled
//! future, body stream finished) removes the directory on the blocking pool,
//! or inline when no tokio runtime is running.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{OverlayError, Result, WorkspaceError};

const INPUT_FILE: &str = "input.mp4";
const OUTPUT_FILE: &str = "output.mp4";
const MAX_ACQUIRE_ATTEMPTS: usize = 8;

/// Allocates workspaces under a base directory.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, empty workspace directory.
    pub async fn acquire(&self) -> Result<Workspace> {
        self.acquire_with(Uuid::new_v4).await
    }

    /// Allocation loop with an injectable token source.
    ///
    /// `create_dir` is not recursive, so an existing directory surfaces as
    /// `AlreadyExists` and a new token is drawn instead of reusing it.
    pub(crate) async fn acquire_with(
        &self,
        mut next_id: impl FnMut() -> Uuid,
    ) -> Result<Workspace> {
        fs::create_dir_all(&self.root).await?;

        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            let id = next_id();
            let dir = self.root.join(format!("overlay-{}", id.simple()));

            match fs::create_dir(&dir).await {
                Ok(()) => {
                    debug!(workspace = %id, path = %dir.display(), "workspace acquired");
                    return Ok(Workspace::new(id, dir));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(workspace = %id, "workspace name collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(OverlayError::Staging(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "could not allocate a unique workspace directory",
        )))
    }
}

/// An isolated directory owned by one request.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
    input_path: PathBuf,
    output_path: PathBuf,
    released: bool,
}

impl Workspace {
    fn new(id: Uuid, dir: PathBuf) -> Self {
        Self {
            id,
            input_path: dir.join(INPUT_FILE),
            output_path: dir.join(OUTPUT_FILE),
            dir,
            released: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Write a chunk stream to the input file, enforcing `limit` bytes.
    ///
    /// Returns the number of bytes written. An empty stream is a validation
    /// error.
    pub async fn stage_input<S>(&self, chunks: S, limit: u64) -> Result<u64>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        let mut chunks = std::pin::pin!(chunks);
        let mut file = File::create(&self.input_path).await?;
        let mut written = 0u64;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > limit {
                return Err(OverlayError::PayloadTooLarge { limit });
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;

        if written == 0 {
            return Err(OverlayError::validation("uploaded video is empty"));
        }

        debug!(workspace = %self.id, bytes = written, "input staged");
        Ok(written)
    }

    /// Write an already buffered upload to the input file.
    pub async fn stage_bytes(&self, data: &[u8]) -> Result<u64> {
        if data.is_empty() {
            return Err(OverlayError::validation("uploaded video is empty"));
        }
        fs::write(&self.input_path, data).await?;
        Ok(data.len() as u64)
    }

    /// Copy a local file into the workspace as the input.
    pub async fn stage_file(&self, source: &Path) -> Result<u64> {
        match fs::metadata(source).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {}
            Ok(_) => {
                return Err(OverlayError::validation(format!(
                    "{} is not a non-empty file",
                    source.display()
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(OverlayError::validation(format!(
                    "{} does not exist",
                    source.display()
                )))
            }
            Err(e) => return Err(e.into()),
        }

        Ok(fs::copy(source, &self.input_path).await?)
    }

    /// Confirm ffmpeg left a non-empty output file behind.
    pub async fn verify_output(&self) -> Result<u64> {
        match fs::metadata(&self.output_path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
            _ => Err(OverlayError::OutputMissing(self.output_path.clone())),
        }
    }

    /// Remove the directory, reporting failure to the caller.
    pub async fn try_release(mut self) -> std::result::Result<(), WorkspaceError> {
        self.released = true;

        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                debug!(workspace = %self.id, "workspace released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkspaceError {
                path: self.dir.clone(),
                source,
            }),
        }
    }

    /// Remove the directory. Failures are logged and swallowed.
    pub async fn release(self) {
        let id = self.id;
        if let Err(err) = self.try_release().await {
            warn!(workspace = %id, error = %err, "workspace cleanup failed");
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let id = self.id;
        let dir = std::mem::take(&mut self.dir);

        // Off the async workers when a runtime is around.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_on_drop(id, &dir));
            }
            Err(_) => remove_on_drop(id, &dir),
        }
    }
}

fn remove_on_drop(id: Uuid, dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => debug!(workspace = %id, "workspace removed on drop"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            workspace = %id,
            path = %dir.display(),
            error = %e,
            "workspace cleanup on drop failed"
        ),
    }
}

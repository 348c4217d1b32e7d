//! Global mutual exclusion for transfer and sync operations
//!
//! The lock is coarse: one token serializes every transfer and sync across
//! all tables. Acquisition always has a ceiling; a timeout is reported to
//! the caller as `false`, never as an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

/// Poll interval while waiting for a file lock
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Lock provider contract
#[async_trait]
pub trait LockProvider: Send + Sync {
	/// Try to take the lock, waiting at most `timeout`
	async fn try_acquire(&self, timeout: Duration) -> bool;

	/// Release the lock. Releasing a lock that is not held is a no-op.
	fn release(&self);
}

/// RAII guard that releases the lock on drop, whatever the exit path
pub struct LockGuard {
	provider: Arc<dyn LockProvider>,
}

impl LockGuard {
	/// Acquire `provider` with a bounded wait; `None` on timeout
	pub async fn acquire(provider: Arc<dyn LockProvider>, timeout: Duration) -> Option<LockGuard> {
		if provider.try_acquire(timeout).await {
			Some(LockGuard { provider })
		} else {
			None
		}
	}
}

impl Drop for LockGuard {
	fn drop(&mut self) {
		self.provider.release();
	}
}

// ============================================================================
// IN-PROCESS LOCK
// ============================================================================

/// Lock shared by all tasks of one process
pub struct ProcessLock {
	semaphore: Semaphore,
	held: AtomicBool,
}

impl ProcessLock {
	pub fn new() -> Self {
		ProcessLock { semaphore: Semaphore::new(1), held: AtomicBool::new(false) }
	}

	pub fn is_held(&self) -> bool {
		self.held.load(Ordering::SeqCst)
	}
}

impl Default for ProcessLock {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl LockProvider for ProcessLock {
	async fn try_acquire(&self, timeout: Duration) -> bool {
		match tokio::time::timeout(timeout, self.semaphore.acquire()).await {
			Ok(Ok(permit)) => {
				permit.forget();
				self.held.store(true, Ordering::SeqCst);
				true
			}
			Ok(Err(_)) => false,
			Err(_) => {
				debug!("Process lock not acquired within {:?}", timeout);
				false
			}
		}
	}

	fn release(&self) {
		if self.held.swap(false, Ordering::SeqCst) {
			self.semaphore.add_permits(1);
		}
	}
}

// ============================================================================
// FILE LOCK
// ============================================================================

/// Contents of a lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
	/// Process ID of the holder
	pub pid: u32,
	/// Unix timestamp (seconds) when the lock was taken
	pub acquired_at: u64,
	/// Unique per acquisition; only the matching holder may remove the file
	#[serde(default)]
	pub token: Uuid,
}

impl LockInfo {
	fn current() -> Self {
		LockInfo { pid: std::process::id(), acquired_at: unix_now(), token: Uuid::new_v4() }
	}

	/// Whether the lock outlived its lease
	pub fn is_expired(&self, lease: Duration) -> bool {
		unix_now().saturating_sub(self.acquired_at) > lease.as_secs()
	}
}

fn unix_now() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Lock shared between processes through an exclusively created file
///
/// A holder that crashed leaves the file behind; once the file is older than
/// the lease it is broken by the next contender. Every acquisition writes its
/// own token, so a holder whose lease was broken never removes the lock of
/// the holder that replaced it.
pub struct FileLock {
	path: PathBuf,
	lease: Duration,
	token: Mutex<Option<Uuid>>,
}

impl FileLock {
	pub fn new(path: impl Into<PathBuf>, lease: Duration) -> Self {
		FileLock { path: path.into(), lease, token: Mutex::new(None) }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Whether this instance believes it holds the lock
	pub fn is_held(&self) -> bool {
		self.held_token().is_some()
	}

	fn held_token(&self) -> Option<Uuid> {
		*self.token.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn set_token(&self, token: Option<Uuid>) -> Option<Uuid> {
		std::mem::replace(&mut *self.token.lock().unwrap_or_else(|e| e.into_inner()), token)
	}

	async fn try_create(&self) -> std::io::Result<Option<Uuid>> {
		let info = LockInfo::current();
		match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&self.path).await {
			Ok(mut file) => {
				let record = serde_json::to_string(&info)?;
				file.write_all(record.as_bytes()).await?;
				file.flush().await?;
				Ok(Some(info.token))
			}
			Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
			Err(e) => Err(e),
		}
	}

	async fn is_stale(&self, contents: &str) -> bool {
		match serde_json::from_str::<LockInfo>(contents) {
			Ok(info) => info.is_expired(self.lease),
			// Holder may still be writing its record; judge by file age instead
			Err(_) => tokio::fs::metadata(&self.path)
				.await
				.and_then(|m| m.modified())
				.ok()
				.and_then(|t| t.elapsed().ok())
				.map(|age| age > self.lease)
				.unwrap_or(false),
		}
	}

	/// Remove the lock file if it is still the stale one that was inspected
	///
	/// The file is first moved aside under a unique name. If what was moved
	/// turns out to be a fresh lock taken in the meantime, it is linked back.
	async fn break_if_stale(&self) {
		let contents = match tokio::fs::read_to_string(&self.path).await {
			Ok(c) => c,
			Err(_) => return,
		};
		if !self.is_stale(&contents).await {
			return;
		}

		let aside = self.path.with_extension(format!("stale-{}", Uuid::new_v4()));
		if tokio::fs::rename(&self.path, &aside).await.is_err() {
			// Someone else broke or released it first
			return;
		}
		let moved = tokio::fs::read_to_string(&aside).await.unwrap_or_default();
		if moved == contents {
			warn!("Breaking stale lock {}", self.path.display());
		} else if let Err(e) = tokio::fs::hard_link(&aside, &self.path).await {
			warn!("Fresh lock {} moved aside and not restored: {}", self.path.display(), e);
		}
		let _ = tokio::fs::remove_file(&aside).await;
	}

	fn owns_file(&self, token: Uuid) -> bool {
		std::fs::read_to_string(&self.path)
			.ok()
			.and_then(|c| serde_json::from_str::<LockInfo>(&c).ok())
			.map(|info| info.token == token)
			.unwrap_or(false)
	}
}

#[async_trait]
impl LockProvider for FileLock {
	async fn try_acquire(&self, timeout: Duration) -> bool {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			match self.try_create().await {
				Ok(Some(token)) => {
					self.set_token(Some(token));
					return true;
				}
				Ok(None) => self.break_if_stale().await,
				Err(e) => {
					warn!("Cannot create lock file {}: {}", self.path.display(), e);
					return false;
				}
			}
			let now = tokio::time::Instant::now();
			if now >= deadline {
				debug!("File lock {} not acquired within {:?}", self.path.display(), timeout);
				return false;
			}
			tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
		}
	}

	// Runs from Drop, so plain std::fs
	fn release(&self) {
		let token = match self.set_token(None) {
			Some(t) => t,
			None => return,
		};
		if !self.owns_file(token) {
			warn!("Lock {} was taken over after its lease expired; leaving it", self.path.display());
			return;
		}
		if let Err(e) = std::fs::remove_file(&self.path) {
			warn!("Failed to remove lock file {}: {}", self.path.display(), e);
		}
	}
}


// vim: ts=4

// ============================================================================
// File: src/throttle.rs
// Persisted call counter gating the promotional link
// ============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

/// Persisted counter state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdCounterState {
    pub click_count: u64,
    pub last_reset: DateTime<Utc>,
}

impl AdCounterState {
    pub fn initial() -> Self {
        Self {
            click_count: 0,
            last_reset: Utc::now(),
        }
    }
}

/// Outcome of one counted generation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdDecision {
    pub should_fire: bool,
    pub new_count: u64,
}

/// Fires on the 1st call and every 3rd call after it: 1, 4, 7, 10, ...
pub fn should_fire(count: u64) -> bool {
    count == 1 || (count > 1 && (count - 1) % 3 == 0)
}

/// Where the counter lives between runs
pub trait CounterStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<AdCounterState>>;
    fn save(&self, state: &AdCounterState) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// JSON file on disk, one key's worth of state
pub struct FileCounterStore {
    path: PathBuf,
}

impl FileCounterStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CounterStore for FileCounterStore {
    fn load(&self) -> Result<Option<AdCounterState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read ad counter at {}", self.path.display()))?;
        let state = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt ad counter at {}", self.path.display()))?;
        Ok(Some(state))
    }

    /// Writes a sibling temp file and renames it over the target, so a crash
    /// mid-write leaves the previous state intact.
    fn save(&self, state: &AdCounterState) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut staged = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to stage ad counter in {}", dir.display()))?;
        serde_json::to_writer(&mut staged, state)?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.path)
            .with_context(|| format!("Failed to write ad counter at {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Volatile store for tests and dry runs
#[derive(Default)]
pub struct MemoryCounterStore {
    state: Mutex<Option<AdCounterState>>,
}

impl CounterStore for MemoryCounterStore {
    fn load(&self) -> Result<Option<AdCounterState>> {
        Ok(self.state.lock().map_err(|_| anyhow::anyhow!("counter lock poisoned"))?.clone())
    }

    fn save(&self, state: &AdCounterState) -> Result<()> {
        *self.state.lock().map_err(|_| anyhow::anyhow!("counter lock poisoned"))? = Some(state.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.state.lock().map_err(|_| anyhow::anyhow!("counter lock poisoned"))? = None;
        Ok(())
    }
}

/// The single process-wide counter. The mutex makes each
/// read-modify-write atomic with respect to concurrent tool calls.
pub struct AdThrottle {
    store: Box<dyn CounterStore>,
    guard: Mutex<()>,
}

impl AdThrottle {
    pub fn new(store: Box<dyn CounterStore>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryCounterStore::default()))
    }

    /// Counts one generation call. The new count is persisted before the
    /// decision is returned.
    pub fn check_and_update(&self) -> AdDecision {
        let _lock = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let counter = self.current();
        let new_count = counter.click_count + 1;
        let updated = AdCounterState {
            click_count: new_count,
            last_reset: counter.last_reset,
        };
        if let Err(e) = self.store.save(&updated) {
            error!("Error saving ad counter: {:#}", e);
        }

        let decision = AdDecision {
            should_fire: should_fire(new_count),
            new_count,
        };
        debug!(count = new_count, fire = decision.should_fire, "ad counter updated");
        decision
    }

    /// Current state without counting a call.
    pub fn peek(&self) -> AdCounterState {
        let _lock = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.current()
    }

    pub fn reset(&self) -> Result<()> {
        let _lock = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.store.clear()
    }

    fn current(&self) -> AdCounterState {
        match self.store.load() {
            Ok(Some(state)) => state,
            Ok(None) => AdCounterState::initial(),
            Err(e) => {
                warn!("Error reading ad counter, starting over: {:#}", e);
                AdCounterState::initial()
            }
        }
    }
}

/// Opens the promotional link somewhere outside the app
pub trait PromoLauncher: Send + Sync {
    fn launch(&self, url: &str) -> Result<()>;
}

/// Hands the link to the desktop's default browser
pub struct BrowserLauncher;

impl PromoLauncher for BrowserLauncher {
    fn launch(&self, url: &str) -> Result<()> {
        open::that_detached(url).with_context(|| format!("Failed to open {}", url))
    }
}

/// Used when promotions are switched off
pub struct NoopLauncher;

impl PromoLauncher for NoopLauncher {
    fn launch(&self, _url: &str) -> Result<()> {
        Ok(())
    }
}

//! On-disk store for the sentry's three JSON files.
//!
//! Layout: `<dir>/state.json`, `<dir>/agents.json`, `<dir>/ipfs-registry.json`
//!
//! Writes go to a temp file in the same directory and are renamed over the
//! target, so a crash never leaves a torn file behind. A file that fails to
//! parse is moved aside to `<name>.corrupt-<unix>` and replaced by an empty
//! default; the bad copy stays on disk for manual repair.
//!
//! Readers that must not touch the directory (the query service) use the
//! `read_*` methods instead: a malformed file is reported as
//! [`StateError::Malformed`] and left where it is.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StateError;
use crate::schema::{AgentsData, CidRegistry, SentryState};
use crate::Result;

pub const STATE_FILE: &str = "state.json";
pub const AGENTS_FILE: &str = "agents.json";
pub const CID_REGISTRY_FILE: &str = "ipfs-registry.json";

/// Handle on the data directory. Cheap to clone; holds no open files.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Open (and create if needed) the data directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn agents_path(&self) -> PathBuf {
        self.dir.join(AGENTS_FILE)
    }

    pub fn cid_registry_path(&self) -> PathBuf {
        self.dir.join(CID_REGISTRY_FILE)
    }

    // -----------------------------------------------------------------------
    // state.json
    // -----------------------------------------------------------------------

    /// Load the checkpoint. Missing or malformed files yield the empty state.
    pub fn load_state(&self) -> Result<SentryState> {
        load_or_default(&self.state_path())
    }

    /// Stamp `last_run` and persist the checkpoint atomically.
    pub fn save_state(&self, state: &mut SentryState) -> Result<()> {
        state.last_run = Some(Utc::now());
        write_atomic(&self.state_path(), state)
    }

    // -----------------------------------------------------------------------
    // agents.json
    // -----------------------------------------------------------------------

    pub fn load_agents(&self) -> Result<AgentsData> {
        let mut agents: AgentsData = load_or_default(&self.agents_path())?;
        agents.fill_token_ids();
        Ok(agents)
    }

    pub fn save_agents(&self, agents: &mut AgentsData) -> Result<()> {
        agents.updated_at = Some(Utc::now());
        write_atomic(&self.agents_path(), agents)
    }

    // -----------------------------------------------------------------------
    // ipfs-registry.json
    // -----------------------------------------------------------------------

    pub fn load_cid_registry(&self) -> Result<CidRegistry> {
        load_or_default(&self.cid_registry_path())
    }

    /// Record the evidence CID for an attestation UID. Write-once: returns
    /// `false` without touching the file if the UID is already registered.
    pub fn register_cid(&self, uid: &str, agent_id: &str, cid: &str) -> Result<bool> {
        let mut registry = self.load_cid_registry()?;
        if !registry.register(uid, agent_id, cid, Utc::now()) {
            return Ok(false);
        }
        registry.updated_at = Some(Utc::now());
        write_atomic(&self.cid_registry_path(), &registry)?;
        Ok(true)
    }

    pub fn cid_for(&self, uid: &str) -> Result<Option<String>> {
        Ok(self.load_cid_registry()?.cid_for(uid).map(str::to_string))
    }

    // -----------------------------------------------------------------------
    // read-only access
    // -----------------------------------------------------------------------

    /// Like [`load_state`](Self::load_state), but never renames a bad file.
    pub fn read_state(&self) -> Result<SentryState> {
        read_or_default(&self.state_path())
    }

    pub fn read_agents(&self) -> Result<AgentsData> {
        let mut agents: AgentsData = read_or_default(&self.agents_path())?;
        agents.fill_token_ids();
        Ok(agents)
    }

    pub fn read_cid_for(&self, uid: &str) -> Result<Option<String>> {
        let registry: CidRegistry = read_or_default(&self.cid_registry_path())?;
        Ok(registry.cid_for(uid).map(str::to_string))
    }
}

/// File contents, or `None` if it does not exist yet.
fn read_existing(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StateError::io(path, e)),
    }
}

fn read_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = read_existing(path)? else {
        return Ok(T::default());
    };
    serde_json::from_slice(&raw).map_err(|e| StateError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn load_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = read_existing(path)? else {
        debug!(path = %path.display(), "no file yet, starting empty");
        return Ok(T::default());
    };

    match serde_json::from_slice(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            let aside = quarantine_path(path);
            warn!(
                path = %path.display(),
                moved_to = %aside.display(),
                error = %e,
                "malformed file, falling back to empty default"
            );
            fs::rename(path, &aside).map_err(|e| StateError::io(path, e))?;
            Ok(T::default())
        }
    }
}

fn quarantine_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!("{}.corrupt-{}", name, Utc::now().timestamp()))
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut body = serde_json::to_vec_pretty(value)?;
    body.push(b'\n');

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StateError::io(dir, e))?;
    tmp.write_all(&body).map_err(|e| StateError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StateError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StateError::Persist {
        path: path.to_path_buf(),
        message: e.error.to_string(),
    })?;
    Ok(())
}

//! File-backed admission override store.
//!
//! One file per service key under the spool root. The file's presence marks
//! the service down; its contents carry the reason and optional expiration
//! and creation timestamps. Overrides are hierarchical: the `all` record
//! wins over a service-wide record, which wins over a port-qualified one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key that forces every service down at once.
const ALL_SERVICES: &str = "all";

/// Errors raised by the admission store.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// The spool root is missing required permissions.
    #[error("spool root {root} is not accessible: {source}")]
    Access {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A spool file could not be read, written, or removed.
    #[error("spool file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A record could not be serialized for writing.
    #[error("could not encode spool record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A persisted down-record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoolRecord {
    #[serde(default)]
    pub reason: String,
    pub expiration: Option<f64>,
    pub creation: Option<f64>,
}

/// Everything a spool file may legally contain. Current files hold a JSON
/// record; files written before the JSON format hold the bare reason.
#[derive(Debug, Clone, PartialEq)]
enum SpoolFileContents {
    Structured(SpoolRecord),
    Legacy(String),
}

impl SpoolFileContents {
    fn decode(raw: &str) -> Self {
        match serde_json::from_str::<SpoolRecord>(raw) {
            Ok(record) => SpoolFileContents::Structured(record),
            Err(_) => SpoolFileContents::Legacy(raw.to_string()),
        }
    }

    fn into_record(self) -> SpoolRecord {
        match self {
            SpoolFileContents::Structured(record) => record,
            SpoolFileContents::Legacy(reason) => SpoolRecord {
                reason,
                expiration: None,
                creation: None,
            },
        }
    }
}

/// Snapshot of one service's admission state. `reason` is empty when the
/// service is up; `expiration` and `creation` are unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpoolInfo {
    pub service: String,
    pub reason: String,
    pub expiration: Option<f64>,
    pub creation: Option<f64>,
}

impl SpoolInfo {
    fn up(service: &str) -> Self {
        Self {
            service: service.to_string(),
            reason: String::new(),
            expiration: None,
            creation: None,
        }
    }
}

/// File-per-key admission store rooted at one directory.
pub struct SpoolStore {
    root: PathBuf,
}

impl SpoolStore {
    /// Open the store rooted at `root`, creating the directory (mode 0750)
    /// when missing, and verify the required access up front.
    pub fn configure(root: impl Into<PathBuf>, needs_write: bool) -> Result<Self, SpoolError> {
        let root = root.into();
        if !root.is_dir() {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(0o750);
            }
            builder.create(&root).map_err(|e| SpoolError::Access {
                root: root.clone(),
                source: e,
            })?;
        }
        let store = Self { root };
        store.probe_access(needs_write)?;
        Ok(store)
    }

    /// Directory this store reads and writes.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn probe_access(&self, needs_write: bool) -> Result<(), SpoolError> {
        let access = |source| SpoolError::Access {
            root: self.root.clone(),
            source,
        };
        fs::read_dir(&self.root).map_err(access)?;
        if needs_write {
            let probe = self.root.join(format!(".probe-{}", std::process::id()));
            fs::write(&probe, b"").map_err(access)?;
            fs::remove_file(&probe).map_err(access)?;
        }
        Ok(())
    }

    fn file_for(&self, service: &str, port: Option<u16>) -> PathBuf {
        match port {
            Some(port) => self.root.join(format!("{service}:{port}")),
            None => self.root.join(service),
        }
    }

    /// Admission state for exactly this key. Does not consult the `all`
    /// override; `is_up` layers that on top.
    pub fn status(&self, service: &str, port: Option<u16>) -> Result<(bool, SpoolInfo), SpoolError> {
        let path = self.file_for(service, port);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok((true, SpoolInfo::up(service)));
            }
            Err(e) => return Err(SpoolError::Io { path, source: e }),
        };
        let record = SpoolFileContents::decode(&raw).into_record();
        if let Some(expiration) = record.expiration {
            if expiration < unix_now() {
                // Expired records are reaped on the read path, best effort:
                // a reader without write access still sees the service up.
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != io::ErrorKind::NotFound {
                        tracing::debug!(
                            path = %path.display(),
                            error = %e,
                            "failed to reap expired record"
                        );
                    }
                }
                return Ok((true, SpoolInfo::up(service)));
            }
        }
        Ok((
            false,
            SpoolInfo {
                service: service.to_string(),
                reason: record.reason,
                expiration: record.expiration,
                creation: record.creation,
            },
        ))
    }

    /// Hierarchical admission check: the global `all` record wins, then the
    /// service-wide record, then the port-qualified record.
    pub fn is_up(&self, service: &str, port: Option<u16>) -> Result<(bool, SpoolInfo), SpoolError> {
        let (up, info) = self.status(ALL_SERVICES, None)?;
        if !up {
            return Ok((false, info));
        }
        let (up, info) = self.status(service, None)?;
        if !up || port.is_none() {
            return Ok((up, info));
        }
        self.status(service, port)
    }

    /// Readmit a service. Removing an absent record is not an error.
    pub fn up(&self, service: &str, port: Option<u16>) -> Result<(), SpoolError> {
        let path = self.file_for(service, port);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SpoolError::Io { path, source: e }),
        }
    }

    /// Force a service down. A repeated down with the same reason keeps the
    /// original creation timestamp, so operators can see how long the
    /// service has been out; an explicit `creation` always wins.
    pub fn down(
        &self,
        service: &str,
        reason: &str,
        port: Option<u16>,
        expiration: Option<f64>,
        creation: Option<f64>,
    ) -> Result<(), SpoolError> {
        let mut creation = creation;
        if creation.is_none() {
            let (up, existing) = self.status(service, port)?;
            if !up && existing.reason == reason {
                creation = existing.creation;
            }
        }
        let record = SpoolRecord {
            reason: reason.to_string(),
            expiration,
            creation: Some(creation.unwrap_or_else(unix_now)),
        };
        let encoded = serde_json::to_string(&record)?;
        let path = self.file_for(service, port);
        fs::write(&path, encoded).map_err(|e| SpoolError::Io { path, source: e })?;
        Ok(())
    }

    /// Every down record currently spooled, as `(service, port, info)`,
    /// sorted by service then port.
    pub fn status_all_down(&self) -> Result<Vec<(String, Option<u16>, SpoolInfo)>, SpoolError> {
        let entries = fs::read_dir(&self.root).map_err(|e| SpoolError::Access {
            root: self.root.clone(),
            source: e,
        })?;
        let mut down = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SpoolError::Access {
                root: self.root.clone(),
                source: e,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let (service, port) = split_key(name);
            let (up, info) = self.status(service, port)?;
            if !up {
                down.push((service.to_string(), port, info));
            }
        }
        down.sort_by(|a, b| (a.0.as_str(), a.1).cmp(&(b.0.as_str(), b.1)));
        Ok(down)
    }
}

/// Split a spool file name back into service and port.
fn split_key(name: &str) -> (&str, Option<u16>) {
    match name.rsplit_once(':') {
        Some((service, port)) => match port.parse::<u16>() {
            Ok(port) => (service, Some(port)),
            Err(_) => (name, None),
        },
        None => (name, None),
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

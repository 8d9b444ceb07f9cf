use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use tempfile::NamedTempFile;
use tracing::debug;
use tracing::info;

use crate::error::RegistryError;
use crate::plate_detection::normalize::PlateIdentifier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateRecord {
    pub id: u64,
    pub plate: PlateIdentifier,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub vehicle: String,
    #[serde(default)]
    pub note: String,
}

/// Editable fields of a record. The plate is normalized on write.
#[derive(Debug, Clone, Default)]
pub struct PlateEntry {
    pub plate: String,
    pub owner: String,
    pub vehicle: String,
    pub note: String,
}

impl PlateEntry {
    pub fn new(plate: impl Into<String>) -> Self {
        Self {
            plate: plate.into(),
            ..Self::default()
        }
    }
}

/// Store of authorized plates, keyed by normalized plate.
pub trait PlateRegistry: Send + Sync {
    fn lookup(&self, plate: &PlateIdentifier) -> Result<Option<PlateRecord>, RegistryError>;

    /// Returns the id of the new record.
    fn insert(&self, entry: PlateEntry) -> Result<u64, RegistryError>;

    /// Unknown ids are ignored.
    fn update(&self, id: u64, entry: PlateEntry) -> Result<(), RegistryError>;

    /// Unknown ids are ignored.
    fn delete(&self, id: u64) -> Result<(), RegistryError>;

    /// All records ordered by id.
    fn list_all(&self) -> Result<Vec<PlateRecord>, RegistryError>;
}

#[derive(Debug, Default)]
struct Records {
    by_id: BTreeMap<u64, PlateRecord>,
    next_id: u64,
}

impl Records {
    /// `next_id` is the last id ever handed out; it never goes below the
    /// highest id present.
    fn from_list(records: Vec<PlateRecord>, next_id: u64) -> Result<Self, RegistryError> {
        let mut loaded = Records {
            by_id: BTreeMap::new(),
            next_id,
        };
        for record in records {
            if loaded.by_id.contains_key(&record.id) {
                return Err(RegistryError::DuplicateId(record.id));
            }
            if loaded.find(&record.plate).is_some() {
                return Err(RegistryError::DuplicateKey(record.plate));
            }
            loaded.next_id = loaded.next_id.max(record.id);
            loaded.by_id.insert(record.id, record);
        }
        Ok(loaded)
    }

    fn to_file(&self) -> RegistryFile {
        RegistryFile {
            next_id: self.next_id,
            plates: self.by_id.values().cloned().collect(),
        }
    }

    fn find(&self, plate: &PlateIdentifier) -> Option<&PlateRecord> {
        self.by_id.values().find(|r| &r.plate == plate)
    }

    fn insert(&mut self, entry: PlateEntry) -> Result<u64, RegistryError> {
        let plate = checked_plate(&entry.plate)?;
        if self.find(&plate).is_some() {
            return Err(RegistryError::DuplicateKey(plate));
        }
        self.next_id += 1;
        let id = self.next_id;
        self.by_id.insert(
            id,
            PlateRecord {
                id,
                plate,
                owner: entry.owner,
                vehicle: entry.vehicle,
                note: entry.note,
            },
        );
        Ok(id)
    }

    fn update(&mut self, id: u64, entry: PlateEntry) -> Result<(), RegistryError> {
        let plate = checked_plate(&entry.plate)?;
        if let Some(other) = self.find(&plate) {
            if other.id != id {
                return Err(RegistryError::DuplicateKey(plate));
            }
        }
        if let Some(record) = self.by_id.get_mut(&id) {
            record.plate = plate;
            record.owner = entry.owner;
            record.vehicle = entry.vehicle;
            record.note = entry.note;
        }
        Ok(())
    }

    fn delete(&mut self, id: u64) {
        self.by_id.remove(&id);
    }
}

fn poisoned() -> RegistryError {
    RegistryError::Unavailable("registry lock poisoned".to_string())
}

fn checked_plate(raw: &str) -> Result<PlateIdentifier, RegistryError> {
    let plate = PlateIdentifier::new(raw);
    if plate.is_empty() {
        return Err(RegistryError::EmptyPlate);
    }
    Ok(plate)
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: RwLock<Records>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<PlateRecord>) -> Result<Self, RegistryError> {
        Ok(Self {
            records: RwLock::new(Records::from_list(records, 0)?),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Records>, RegistryError> {
        self.records.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Records>, RegistryError> {
        self.records.write().map_err(|_| poisoned())
    }
}

impl PlateRegistry for MemoryRegistry {
    fn lookup(&self, plate: &PlateIdentifier) -> Result<Option<PlateRecord>, RegistryError> {
        Ok(self.read()?.find(plate).cloned())
    }

    fn insert(&self, entry: PlateEntry) -> Result<u64, RegistryError> {
        self.write()?.insert(entry)
    }

    fn update(&self, id: u64, entry: PlateEntry) -> Result<(), RegistryError> {
        self.write()?.update(id, entry)
    }

    fn delete(&self, id: u64) -> Result<(), RegistryError> {
        self.write()?.delete(id);
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<PlateRecord>, RegistryError> {
        Ok(self.read()?.by_id.values().cloned().collect())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    next_id: u64,
    #[serde(default, rename = "plate")]
    plates: Vec<PlateRecord>,
}

/// Registry persisted as a TOML file.
///
/// Nothing is cached: every call reads the file, so a plate added by another
/// process is seen by the next lookup. Writes go to a temporary file in the
/// same directory which then replaces the registry file, so readers see
/// either the old contents or the new ones.
pub struct FileRegistry {
    path: PathBuf,
    writer: Mutex<()>,
}

impl FileRegistry {
    /// A missing file is created empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let registry = Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(()),
        };
        if registry.path.exists() {
            let records = registry.load()?;
            info!(path = %registry.path.display(), plates = records.by_id.len(), "Registry loaded");
        } else {
            registry.save(&Records::default())?;
            info!(path = %registry.path.display(), "Registry created");
        }
        Ok(registry)
    }

    fn load(&self) -> Result<Records, RegistryError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| RegistryError::Io {
            path: self.path.clone(),
            source,
        })?;
        let file: RegistryFile = toml::from_str(&contents).map_err(|source| RegistryError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Records::from_list(file.plates, file.next_id)
    }

    fn save(&self, records: &Records) -> Result<(), RegistryError> {
        let contents = toml::to_string_pretty(&records.to_file())?;
        let io_error = |source: std::io::Error| RegistryError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staged = NamedTempFile::new_in(dir).map_err(io_error)?;
        staged.write_all(contents.as_bytes()).map_err(io_error)?;
        staged.as_file().sync_all().map_err(io_error)?;
        staged
            .persist(&self.path)
            .map_err(|err| io_error(err.error))?;

        debug!(path = %self.path.display(), plates = records.by_id.len(), "Registry saved");
        Ok(())
    }

    /// Applies `change` to the current file contents and writes the result.
    /// Nothing is written when `change` fails.
    fn modify<T>(
        &self,
        change: impl FnOnce(&mut Records) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let _writer = self.writer.lock().map_err(|_| poisoned())?;
        let mut records = self.load()?;
        let value = change(&mut records)?;
        self.save(&records)?;
        Ok(value)
    }
}

impl PlateRegistry for FileRegistry {
    /// Any failure to read the file is reported as an outage.
    fn lookup(&self, plate: &PlateIdentifier) -> Result<Option<PlateRecord>, RegistryError> {
        let records = self
            .load()
            .map_err(|err| RegistryError::Unavailable(err.to_string()))?;
        Ok(records.find(plate).cloned())
    }

    fn insert(&self, entry: PlateEntry) -> Result<u64, RegistryError> {
        self.modify(|records| records.insert(entry))
    }

    fn update(&self, id: u64, entry: PlateEntry) -> Result<(), RegistryError> {
        self.modify(|records| records.update(id, entry))
    }

    fn delete(&self, id: u64) -> Result<(), RegistryError> {
        self.modify(|records| {
            records.delete(id);
            Ok(())
        })
    }

    fn list_all(&self) -> Result<Vec<PlateRecord>, RegistryError> {
        Ok(self.load()?.by_id.into_values().collect())
    }
}

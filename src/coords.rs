//! Headerless rows of `name,"lat, lon"`.

use std::{
    collections::BTreeMap,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::{
    error::{describe, Error, Result},
    model::{canonical_location, Coordinates},
    riders::RiderTable,
};

#[derive(Debug, Clone)]
pub struct CoordinateStore {
    path: PathBuf,
    coords: BTreeMap<String, Coordinates>,
}

impl CoordinateStore {
    /// Empty store that will be saved to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            coords: BTreeMap::new(),
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let coords = read_table(&path, file)?;
        info!(target: "coords", "Loaded {} locations from {}", coords.len(), path.display());

        Ok(Self { path, coords })
    }

    /// Like [`CoordinateStore::load`], but a missing file yields an empty store.
    pub fn load_or_default(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            Self::load(path)
        } else {
            debug!(target: "coords", "{} does not exist, starting empty", path.display());
            Ok(Self::new(path))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Coordinates> {
        self.coords.get(&canonical_location(name)).copied()
    }

    pub fn update(&mut self, name: &str, coordinates: Coordinates) -> Result<Option<Coordinates>> {
        let key = canonical_location(name);
        if key.is_empty() {
            return Err(Error::malformed(&self.path, None, "location name is empty"));
        }
        Ok(self.coords.insert(key, coordinates))
    }

    pub fn remove(&mut self, name: &str) -> Option<Coordinates> {
        self.coords.remove(&canonical_location(name))
    }

    /// Sorted by canonical name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Coordinates)> {
        self.coords.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Fill in the coordinates column of `table` from this store.
    ///
    /// Tables that already carry coordinates are left untouched. Returns the
    /// number of rows that could not be resolved.
    pub fn attach(&self, table: &mut RiderTable) -> usize {
        if table.has_coordinates() {
            debug!(target: "coords", "Table already has coordinates, not attaching");
            return 0;
        }

        let mut missing = 0;
        for record in table.records_mut() {
            record.coordinates = self.get(&record.location);
            if record.coordinates.is_none() {
                debug!(target: "coords", "No coordinates for location {:?}", record.location);
                missing += 1;
            }
        }
        table.mark_coordinates_attached();

        if missing > 0 {
            warn!(target: "coords", "{missing} of {} riders have an unknown location", table.len());
        }
        missing
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&self.path)
    }

    /// Atomically overwrite `path` with the full mapping.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file_mut());
            for (name, coordinates) in &self.coords {
                let value = coordinates.to_string();
                writer.write_record([name.as_str(), value.as_str()])?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        info!(target: "coords", "Saved {} locations to {}", self.coords.len(), path.display());
        Ok(())
    }
}

/// Load the store at `path` and attach its coordinates to `table`.
pub fn attach_to_table(table: &mut RiderTable, path: &Path) -> Result<usize> {
    if table.has_coordinates() {
        return Ok(0);
    }
    let store = CoordinateStore::load(path)?;
    Ok(store.attach(table))
}

fn read_table(path: &Path, reader: impl Read) -> Result<BTreeMap<String, Coordinates>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut coords = BTreeMap::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line());
        if record.len() != 2 {
            return Err(Error::malformed(
                path,
                line,
                format!("expected 2 fields, found {}", record.len()),
            ));
        }

        let name = canonical_location(&record[0]);
        if name.is_empty() {
            return Err(Error::malformed(path, line, "location name is empty"));
        }
        let coordinates: Coordinates = record[1].parse().map_err(|e| match e {
            Error::InvalidCoordinates(reason) => {
                Error::InvalidCoordinates(format!("{}: {reason}", describe(path, &line)))
            }
            other => other,
        })?;

        if coords.insert(name.clone(), coordinates).is_some() {
            warn!(target: "coords", "Duplicate location {name:?} in {}, keeping the last entry", path.display());
        }
    }

    Ok(coords)
}

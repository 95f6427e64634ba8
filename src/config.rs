use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    cluster::{ClusterOptions, ClusterPolicy, DEFAULT_MIN_RIDERS},
    map::{MapOptions, DEFAULT_CENTER, DEFAULT_ZOOM},
    model::Coordinates,
};

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub coordinates_path: PathBuf,
    pub map: MapConfig,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// [latitude, longitude]
    pub center: (f64, f64),
    pub zoom: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub min_riders: usize,

    // when set, nearby locations are merged into one cluster instead of
    // clustering on the location name alone
    pub radius_m: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coordinates_path: PathBuf::from("location_coords.csv"),
            map: MapConfig::default(),
            cluster: ClusterConfig::default(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_riders: DEFAULT_MIN_RIDERS,
            radius_m: None,
        }
    }
}

impl Config {
    pub fn map_options(&self) -> Result<MapOptions> {
        let center = Coordinates::try_from(self.map.center).context("Invalid map center")?;
        Ok(MapOptions {
            center,
            zoom: self.map.zoom,
        })
    }

    pub fn cluster_options(&self) -> ClusterOptions {
        let policy = match self.cluster.radius_m {
            Some(radius_m) => ClusterPolicy::Proximity { radius_m },
            None => ClusterPolicy::Location,
        };
        ClusterOptions {
            min_riders: self.cluster.min_riders,
            policy,
        }
    }
}

pub fn load(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path).context("Failed to read config")?;
    let config = toml::from_str(&data).context("Failed to parse config")?;
    Ok(config)
}

/// Load `path` if given, otherwise `config.toml` when it exists, otherwise defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load(path),
        None => {
            let path = Path::new("config.toml");
            if path.exists() {
                load(path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

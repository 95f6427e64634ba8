use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};

mod cluster;
mod config;
mod coords;
mod error;
mod logging;
mod map;
mod model;
mod riders;

use cluster::ClusterPolicy;
use config::Config;
use coords::CoordinateStore;
use model::Coordinates;
use riders::RiderTable;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Coordinate table, overrides `coordinates_path` from the config
    #[arg(long)]
    coordinates: Option<PathBuf>,

    #[arg(short, long, default_value_t, value_enum)]
    log_level: logging::LogLevel,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Inspect or edit the coordinate table
    Coords {
        #[clap(subcommand)]
        command: CoordsCommand,
    },
    /// Attach coordinates to a rider table
    Attach {
        riders: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Attach coordinates and assign clusters
    Cluster {
        riders: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        cluster: ClusterArgs,
    },
    /// Render riders on an HTML map
    Map {
        riders: PathBuf,
        #[arg(short, long, default_value = "map.html")]
        output: PathBuf,
        #[command(flatten)]
        cluster: ClusterArgs,
    },
    /// Export rider markers as GeoJSON
    Geojson {
        riders: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        cluster: ClusterArgs,
    },
}

#[derive(Debug, Subcommand)]
enum CoordsCommand {
    /// Print every known location
    List,
    Get {
        name: String,
    },
    Set {
        name: String,
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
    },
    Remove {
        name: String,
    },
}

#[derive(Debug, clap::Args)]
struct ClusterArgs {
    /// Minimum riders for a location to form a cluster
    #[arg(long)]
    min_riders: Option<usize>,
    /// Merge locations within this many metres of each other
    #[arg(long)]
    radius: Option<f64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.into());

    let mut config = config::load_or_default(cli.config.as_deref())?;
    if let Some(path) = cli.coordinates {
        config.coordinates_path = path;
    }
    debug!(target: "main", "Using coordinate table {}", config.coordinates_path.display());

    match cli.command {
        Command::Coords { command } => coords(&config, command)?,
        Command::Attach { riders, output } => {
            let table = load_riders(&config, &riders)?;
            write_table(&table, output.as_deref())?;
        }
        Command::Cluster {
            riders,
            output,
            cluster,
        } => {
            let table = cluster_riders(&config, &riders, &cluster)?;
            write_table(&table, output.as_deref())?;
        }
        Command::Map {
            riders,
            output,
            cluster,
        } => {
            let table = cluster_riders(&config, &riders, &cluster)?;
            let markers = map::markers(&table);
            map::save_html(&output, &markers, &config.map_options()?)
                .with_context(|| format!("Failed to write map to {}", output.display()))?;
        }
        Command::Geojson {
            riders,
            output,
            cluster,
        } => {
            let table = cluster_riders(&config, &riders, &cluster)?;
            let markers = map::markers(&table);
            match output {
                Some(path) => map::save_geojson(&path, &markers)?,
                None => println!("{}", map::to_geojson(&markers)),
            }
        }
    };

    Ok(())
}

fn coords(config: &Config, command: CoordsCommand) -> Result<()> {
    let path = &config.coordinates_path;
    match command {
        CoordsCommand::List => {
            let store = CoordinateStore::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            for (name, coordinates) in store.iter() {
                println!("{name}\t{coordinates}");
            }
        }
        CoordsCommand::Get { name } => {
            let store = CoordinateStore::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            match store.get(&name) {
                Some(coordinates) => println!("{coordinates}"),
                None => bail!("Unknown location {name:?}"),
            }
        }
        CoordsCommand::Set {
            name,
            latitude,
            longitude,
        } => {
            let coordinates = Coordinates::new(latitude, longitude)?;
            let mut store = CoordinateStore::load_or_default(path)?;
            if let Some(previous) = store.update(&name, coordinates)? {
                info!(target: "coords", "Replacing {name:?}: {previous} -> {coordinates}");
            }
            store.save().context("Failed to save coordinate table")?;
        }
        CoordsCommand::Remove { name } => {
            let mut store = CoordinateStore::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            if store.remove(&name).is_none() {
                bail!("Unknown location {name:?}");
            }
            store.save().context("Failed to save coordinate table")?;
        }
    }

    Ok(())
}

fn load_riders(config: &Config, path: &Path) -> Result<RiderTable> {
    let mut table = RiderTable::from_path(path)
        .with_context(|| format!("Failed to read riders from {}", path.display()))?;
    if !table.has_coordinates() {
        info!(target: "main", "No coordinates found in {}, looking them up", path.display());
        coords::attach_to_table(&mut table, &config.coordinates_path).with_context(|| {
            format!(
                "Failed to attach coordinates from {}",
                config.coordinates_path.display()
            )
        })?;
    }
    Ok(table)
}

fn cluster_riders(config: &Config, path: &Path, args: &ClusterArgs) -> Result<RiderTable> {
    let mut table = load_riders(config, path)?;

    let mut options = config.cluster_options();
    if let Some(min_riders) = args.min_riders {
        options.min_riders = min_riders;
    }
    if let Some(radius_m) = args.radius {
        options.policy = ClusterPolicy::Proximity { radius_m };
    }

    let summary = cluster::assign_clusters(&mut table, &options);
    for c in &summary.clusters {
        info!(target: "cluster", "Cluster {}: {} riders at {}", c.id, c.riders, c.locations.join(", "));
    }
    Ok(table)
}

fn write_table(table: &RiderTable, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => table
            .write_to_path(path)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => table.write(io::stdout().lock())?,
    }
    Ok(())
}

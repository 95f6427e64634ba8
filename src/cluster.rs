use std::collections::{BTreeMap, BTreeSet, VecDeque};

use geo::{Distance, Haversine};
use log::{debug, info};

use crate::{
    model::{canonical_location, ClusterId, Coordinates},
    riders::RiderTable,
};

pub const DEFAULT_MIN_RIDERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClusterPolicy {
    /// one cluster per eligible location
    Location,
    /// eligible locations within `radius_m` metres of each other share a cluster
    Proximity { radius_m: f64 },
}

impl Default for ClusterPolicy {
    fn default() -> Self {
        ClusterPolicy::Location
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterOptions {
    pub min_riders: usize,
    pub policy: ClusterPolicy,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            min_riders: DEFAULT_MIN_RIDERS,
            policy: ClusterPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub id: ClusterId,
    pub locations: Vec<String>,
    pub riders: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSummary {
    pub clusters: Vec<Cluster>,
    pub unclustered: usize,
}

/// Riders per canonical location. Rows with an empty location are not counted.
pub fn location_counts(table: &RiderTable) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in table.records() {
        let location = canonical_location(&record.location);
        if location.is_empty() {
            continue;
        }
        *counts.entry(location).or_insert(0) += 1;
    }
    counts
}

pub fn eligible_locations(counts: &BTreeMap<String, usize>, min_riders: usize) -> BTreeSet<String> {
    counts
        .iter()
        .filter(|&(_, &count)| count >= min_riders)
        .map(|(location, _)| location.clone())
        .collect()
}

/// Stamp every rider at an eligible location with a cluster id.
///
/// Riders at other locations end up with no cluster. Any previous
/// assignment is discarded first.
pub fn assign_clusters(table: &mut RiderTable, options: &ClusterOptions) -> ClusterSummary {
    for record in table.records_mut() {
        record.cluster = None;
    }

    let counts = location_counts(table);
    let eligible = eligible_locations(&counts, options.min_riders);
    debug!(target: "cluster", "{} of {} locations have at least {} riders", eligible.len(), counts.len(), options.min_riders);

    let groups: Vec<Vec<String>> = match options.policy {
        ClusterPolicy::Location => eligible.iter().map(|l| vec![l.clone()]).collect(),
        ClusterPolicy::Proximity { radius_m } => {
            let positions = location_positions(table, &eligible);
            group_by_proximity(&eligible, &positions, radius_m)
        }
    };

    // groups are in name order, so ids do not depend on row order
    let mut by_location: BTreeMap<&str, ClusterId> = BTreeMap::new();
    let mut clusters = Vec::with_capacity(groups.len());
    for (i, locations) in groups.iter().enumerate() {
        let id = ClusterId(i as u32);
        for location in locations {
            by_location.insert(location.as_str(), id);
        }
        clusters.push(Cluster {
            id,
            locations: locations.clone(),
            riders: locations.iter().map(|l| counts[l]).sum(),
        });
    }

    let mut unclustered = 0;
    for record in table.records_mut() {
        record.cluster = by_location
            .get(canonical_location(&record.location).as_str())
            .copied();
        if record.cluster.is_none() {
            unclustered += 1;
        }
    }

    info!(target: "cluster", "Assigned {} riders to {} clusters, {unclustered} unclustered", table.len() - unclustered, clusters.len());
    ClusterSummary {
        clusters,
        unclustered,
    }
}

/// First known coordinates of each eligible location.
fn location_positions(
    table: &RiderTable,
    eligible: &BTreeSet<String>,
) -> BTreeMap<String, Coordinates> {
    let mut positions = BTreeMap::new();
    for record in table.records() {
        let Some(coordinates) = record.coordinates else {
            continue;
        };
        let location = canonical_location(&record.location);
        if eligible.contains(&location) {
            positions.entry(location).or_insert(coordinates);
        }
    }
    positions
}

/// Single linkage grouping: locations are joined when a chain of neighbours
/// no more than `radius_m` apart connects them. Locations without a position
/// stay on their own.
fn group_by_proximity(
    eligible: &BTreeSet<String>,
    positions: &BTreeMap<String, Coordinates>,
    radius_m: f64,
) -> Vec<Vec<String>> {
    let mut visited: BTreeSet<&str> = BTreeSet::new();
    let mut groups = Vec::new();

    // eligible is sorted, so each group starts from its smallest member
    for start in eligible {
        if visited.contains(start.as_str()) {
            continue;
        }
        visited.insert(start.as_str());

        let mut group = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(start.as_str());

        while let Some(location) = queue.pop_front() {
            group.push(location.to_owned());

            let Some(here) = positions.get(location) else {
                continue;
            };
            for (other, there) in positions {
                if visited.contains(other.as_str()) {
                    continue;
                }
                if Haversine::distance(here.to_point(), there.to_point()) <= radius_m {
                    visited.insert(other.as_str());
                    queue.push_back(other.as_str());
                }
            }
        }

        group.sort();
        groups.push(group);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn riders(rows: &[(&str, &str, Option<(f64, f64)>)]) -> RiderTable {
        let mut csv = String::from("name,location,coordinates\n");
        for (name, location, coordinates) in rows {
            let c = coordinates
                .map(|(lat, lon)| format!("\"{lat}, {lon}\""))
                .unwrap_or_default();
            csv.push_str(&format!("{name},{location},{c}\n"));
        }
        RiderTable::from_reader("riders.csv", csv.as_bytes()).unwrap()
    }

    fn repeat(location: &str, n: usize, coordinates: Option<(f64, f64)>) -> Vec<(String, String, Option<(f64, f64)>)> {
        (0..n)
            .map(|i| (format!("{location}-{i}"), location.to_owned(), coordinates))
            .collect()
    }

    fn table_of(groups: &[(&str, usize, Option<(f64, f64)>)]) -> RiderTable {
        let rows: Vec<_> = groups
            .iter()
            .flat_map(|(location, n, c)| repeat(location, *n, *c))
            .collect();
        let borrowed: Vec<_> = rows
            .iter()
            .map(|(n, l, c)| (n.as_str(), l.as_str(), *c))
            .collect();
        riders(&borrowed)
    }

    #[test]
    fn eligibility_threshold() {
        let table = table_of(&[
            ("Warren", 5, None),
            ("Revelle", 3, None),
            ("Muir", 4, None),
            ("Sixth", 10, None),
        ]);
        let counts = location_counts(&table);
        assert_eq!(counts["revelle"], 3);

        let eligible = eligible_locations(&counts, DEFAULT_MIN_RIDERS);
        let expected: BTreeSet<String> = ["warren", "muir", "sixth"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(eligible, expected);
    }

    #[test]
    fn location_policy() {
        let mut table = table_of(&[
            ("Warren", 5, None),
            ("Revelle", 3, None),
            ("Muir", 4, None),
            ("Sixth", 10, None),
        ]);
        let summary = assign_clusters(&mut table, &ClusterOptions::default());

        // ids follow name order: muir, sixth, warren
        let ids: Vec<_> = summary
            .clusters
            .iter()
            .map(|c| (c.id, c.locations[0].as_str(), c.riders))
            .collect();
        assert_eq!(
            ids,
            vec![
                (ClusterId(0), "muir", 4),
                (ClusterId(1), "sixth", 10),
                (ClusterId(2), "warren", 5),
            ]
        );
        assert_eq!(summary.unclustered, 3);

        for record in table.records() {
            match record.location.as_str() {
                "Revelle" => assert_eq!(record.cluster, None),
                "Muir" => assert_eq!(record.cluster, Some(ClusterId(0))),
                "Sixth" => assert_eq!(record.cluster, Some(ClusterId(1))),
                "Warren" => assert_eq!(record.cluster, Some(ClusterId(2))),
                other => panic!("unexpected location {other}"),
            }
        }
    }

    #[test]
    fn case_insensitive_counts() {
        let table = riders(&[
            ("a", "La Jolla", None),
            ("b", "la jolla", None),
            ("c", "LA JOLLA", None),
            ("d", " La Jolla ", None),
        ]);
        let counts = location_counts(&table);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts["la jolla"], 4);
    }

    #[test]
    fn nothing_eligible() {
        let mut table = table_of(&[("Warren", 3, None), ("Muir", 1, None)]);
        let summary = assign_clusters(&mut table, &ClusterOptions::default());
        assert!(summary.clusters.is_empty());
        assert_eq!(summary.unclustered, 4);
        assert!(table.records().iter().all(|r| r.cluster.is_none()));
    }

    #[test]
    fn reassignment_clears_old_clusters() {
        let mut table = table_of(&[("Warren", 4, None), ("Muir", 5, None)]);
        assign_clusters(&mut table, &ClusterOptions::default());

        let stricter = ClusterOptions {
            min_riders: 5,
            ..Default::default()
        };
        let summary = assign_clusters(&mut table, &stricter);
        assert_eq!(summary.clusters.len(), 1);
        for record in table.records() {
            if record.location == "Warren" {
                assert_eq!(record.cluster, None);
            } else {
                assert_eq!(record.cluster, Some(ClusterId(0)));
            }
        }
    }

    #[test]
    fn proximity_policy() {
        // Price Center and Geisel are ~200m apart, Pacific Beach is ~9km away
        let mut table = table_of(&[
            ("Price Center", 4, Some((32.87972, -117.23611))),
            ("Geisel", 4, Some((32.881142, -117.237449))),
            ("Pacific Beach", 4, Some((32.7978, -117.2401))),
            ("Unknown", 4, None),
            ("Tiny", 1, Some((32.8797, -117.2361))),
        ]);
        let options = ClusterOptions {
            min_riders: 4,
            policy: ClusterPolicy::Proximity { radius_m: 500.0 },
        };
        let summary = assign_clusters(&mut table, &options);

        let groups: Vec<_> = summary.clusters.iter().map(|c| c.locations.clone()).collect();
        assert_eq!(
            groups,
            vec![
                vec!["geisel".to_owned(), "price center".to_owned()],
                vec!["pacific beach".to_owned()],
                vec!["unknown".to_owned()],
            ]
        );
        assert_eq!(summary.clusters[0].riders, 8);
        assert_eq!(summary.unclustered, 1);
    }

    #[test]
    fn proximity_chains() {
        // each neighbour ~110m apart along a meridian, ends ~220m apart
        let mut table = table_of(&[
            ("a", 4, Some((32.000, -117.0))),
            ("b", 4, Some((32.001, -117.0))),
            ("c", 4, Some((32.002, -117.0))),
        ]);
        let options = ClusterOptions {
            min_riders: 4,
            policy: ClusterPolicy::Proximity { radius_m: 150.0 },
        };
        let summary = assign_clusters(&mut table, &options);
        assert_eq!(summary.clusters.len(), 1);
        assert_eq!(summary.clusters[0].locations, vec!["a", "b", "c"]);
    }
}

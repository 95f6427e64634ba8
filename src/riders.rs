use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use csv::StringRecord;
use log::{debug, warn};

use crate::{
    error::{Error, Result},
    model::{ClusterId, Coordinates},
};

pub const COORDINATES_COLUMN: &str = "coordinates";
pub const CLUSTER_COLUMN: &str = "cluster";

#[derive(Debug, Clone)]
pub struct RiderRecord {
    pub fields: StringRecord,
    pub name: String,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub cluster: Option<ClusterId>,
}

#[derive(Debug, Clone)]
pub struct RiderTable {
    headers: StringRecord,
    records: Vec<RiderRecord>,
    coordinates: CoordinateColumn,
    cluster_idx: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoordinateColumn {
    Missing,
    /// present in the input at this index
    Input(usize),
    /// added by a coordinate lookup, written as an extra column
    Attached,
}

impl RiderTable {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(path, file)
    }

    /// `source` only labels errors.
    pub fn from_reader(source: impl Into<PathBuf>, reader: impl Read) -> Result<Self> {
        let source = source.into();
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers()?.clone();

        let find = |wanted: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(wanted))
        };
        let location_idx = find("location")
            .ok_or_else(|| Error::malformed(&source, None, "missing required column \"location\""))?;
        let name_idx = find("name")
            .ok_or_else(|| Error::malformed(&source, None, "missing required column \"name\""))?;
        let cluster_idx = find(CLUSTER_COLUMN);
        let coordinates = headers
            .iter()
            .position(|h| h.to_lowercase().contains("coord"))
            .map_or(CoordinateColumn::Missing, CoordinateColumn::Input);

        let mut records = Vec::new();
        for result in reader.records() {
            let fields = result?;
            let line = fields.position().map(|p| p.line());
            let name = fields.get(name_idx).unwrap_or_default().to_owned();
            let location = fields.get(location_idx).unwrap_or_default().to_owned();

            let coordinates = match coordinates {
                CoordinateColumn::Input(idx) => {
                    let cell = fields.get(idx).unwrap_or_default().trim();
                    if cell.is_empty() {
                        None
                    } else {
                        match cell.parse::<Coordinates>() {
                            Ok(c) => Some(c),
                            Err(e) => {
                                warn!(target: "riders", "{}:{}: ignoring coordinates: {e}", source.display(), line.unwrap_or_default());
                                None
                            }
                        }
                    }
                }
                _ => None,
            };

            records.push(RiderRecord {
                fields,
                name,
                location,
                coordinates,
                cluster: None,
            });
        }
        debug!(target: "riders", "Read {} riders from {}", records.len(), source.display());

        Ok(Self {
            headers,
            records,
            coordinates,
            cluster_idx,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[RiderRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [RiderRecord] {
        &mut self.records
    }

    pub fn has_coordinates(&self) -> bool {
        self.coordinates != CoordinateColumn::Missing
    }

    pub(crate) fn mark_coordinates_attached(&mut self) {
        if self.coordinates == CoordinateColumn::Missing {
            self.coordinates = CoordinateColumn::Attached;
        }
    }

    /// Input columns are written back as read; looked up coordinates and the
    /// cluster go in their own columns, empty when missing.
    pub fn write(&self, writer: impl Write) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);

        let mut headers = self.headers.clone();
        if self.coordinates == CoordinateColumn::Attached {
            headers.push_field(COORDINATES_COLUMN);
        }
        if self.cluster_idx.is_none() {
            headers.push_field(CLUSTER_COLUMN);
        }
        writer.write_record(&headers)?;

        for record in &self.records {
            let coordinates = record.coordinates.map(|c| c.to_string()).unwrap_or_default();
            let cluster = record.cluster.map(|c| c.to_string()).unwrap_or_default();

            let mut row = StringRecord::new();
            for (i, field) in record.fields.iter().enumerate() {
                if self.cluster_idx == Some(i) {
                    row.push_field(&cluster);
                } else {
                    row.push_field(field);
                }
            }
            if self.coordinates == CoordinateColumn::Attached {
                row.push_field(&coordinates);
            }
            if self.cluster_idx.is_none() {
                row.push_field(&cluster);
            }
            writer.write_record(&row)?;
        }
        writer.flush()?;

        Ok(())
    }

    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> Result<RiderTable> {
        RiderTable::from_reader("riders.csv", csv.as_bytes())
    }

    fn written(table: &RiderTable) -> String {
        let mut out = Vec::new();
        table.write(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn required_columns() {
        assert!(matches!(
            table("name,address\nAlice,La Jolla\n"),
            Err(Error::MalformedInput { .. })
        ));
        assert!(matches!(
            table("rider,location\nAlice,La Jolla\n"),
            Err(Error::MalformedInput { .. })
        ));

        let t = table("Name,Location,phone\nAlice,La Jolla,555\n").unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.records()[0].name, "Alice");
        assert_eq!(t.records()[0].location, "La Jolla");
        assert!(!t.has_coordinates());
    }

    #[test]
    fn coordinate_column_detection() {
        let t = table("name,location,coords\nAlice,UCSD,\"32.8788, -117.2359\"\nBob,UCSD,oops\nCarol,UCSD,\n")
            .unwrap();
        assert!(t.has_coordinates());
        let records = t.records();
        assert_eq!(records[0].coordinates, Some(Coordinates::new(32.8788, -117.2359).unwrap()));
        assert_eq!(records[1].coordinates, None);
        assert_eq!(records[2].coordinates, None);
    }

    #[test]
    fn coordinate_column_anywhere_in_header() {
        let t = table("name,location,gps_coords\nAlice,UCSD,\"32.8788, -117.2359\"\n").unwrap();
        assert!(t.has_coordinates());
        assert_eq!(
            t.records()[0].coordinates,
            Some(Coordinates::new(32.8788, -117.2359).unwrap())
        );
    }

    #[test]
    fn keeps_unparsed_coordinate_cells() {
        let t = table("name,location,coord_lat,coord_lon\nAlice,UCSD,32.8,-117.2\n").unwrap();
        assert!(t.has_coordinates());
        assert_eq!(t.records()[0].coordinates, None);
        assert_eq!(
            written(&t),
            "name,location,coord_lat,coord_lon,cluster\nAlice,UCSD,32.8,-117.2,\n"
        );

        let t = table("name,location,coords\nBob,UCSD,oops\nCarol,UCSD,\n").unwrap();
        assert_eq!(written(&t), "name,location,coords,cluster\nBob,UCSD,oops,\nCarol,UCSD,,\n");
    }

    #[test]
    fn write_appends_columns() {
        let mut t = table("name,location\nAlice,UCSD\nBob,Nowhereville\n").unwrap();
        t.records_mut()[0].coordinates = Some(Coordinates::new(1.5, 2.0).unwrap());
        t.records_mut()[0].cluster = Some(ClusterId(0));
        t.mark_coordinates_attached();

        assert_eq!(
            written(&t),
            "name,location,coordinates,cluster\nAlice,UCSD,\"1.5, 2\",0\nBob,Nowhereville,,\n"
        );
    }

    #[test]
    fn write_replaces_existing_columns() {
        let mut t = table("cluster,name,location,coordinates\n7,Alice,UCSD,\"1.5, 2\"\n").unwrap();
        t.records_mut()[0].cluster = Some(ClusterId(3));

        assert_eq!(
            written(&t),
            "cluster,name,location,coordinates\n3,Alice,UCSD,\"1.5, 2\"\n"
        );
    }
}

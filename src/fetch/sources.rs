//! Remote source catalog: URL templates, tile grid and state lookup

use super::{RemoteFile, SourceRequest};
use crate::cache::CacheKey;
use crate::config::schema::SourcesConfig;
use crate::error::BasinResult;
use crate::segment::BBox;
use std::path::PathBuf;

pub const HYDROGRAPHY: &str = "hydrography";
pub const TRANSPORTATION: &str = "transportation";
pub const ELEVATION: &str = "elevation";

/// Degrees added around the boundary before picking elevation tiles
pub const TILE_BUFFER_DEG: f64 = 0.01;

/// Abbreviation used for Canadian portions of cross-border units
const CANADA: &str = "CN";

fn url_basename(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

/// The four digit hydrography archive, unpacked to its file geodatabase
pub fn hydrography_request(config: &SourcesConfig, huc4: &str) -> BasinResult<SourceRequest> {
    let url = config.hydrography_url.replace("{huc4}", huc4);
    let archive = url_basename(&url);
    let stem = archive.strip_suffix(".zip").unwrap_or(&archive);
    Ok(SourceRequest {
        key: CacheKey::new(HYDROGRAPHY, huc4)?,
        files: vec![RemoteFile::archive(url.clone())],
        expected: vec![PathBuf::from(format!("{}.gdb", stem))],
    })
}

/// Transportation layer kinds delivered in each state archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportKind {
    Roads,
    Rail,
    Trails,
}

impl TransportKind {
    pub const ALL: [TransportKind; 3] = [Self::Roads, Self::Rail, Self::Trails];

    /// Shapefile inside the unpacked archive
    pub fn source_file(&self) -> PathBuf {
        let name = match self {
            Self::Roads => "Trans_RoadSegment.shp",
            Self::Rail => "Trans_RailFeature.shp",
            Self::Trails => "Trans_TrailSegment.shp",
        };
        PathBuf::from("Shape").join(name)
    }

    /// Archives without this layer are incomplete
    pub fn required(&self) -> bool {
        !matches!(self, Self::Trails)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Roads => "Roads",
            Self::Rail => "Rail",
            Self::Trails => "Trails",
        }
    }

    /// Output file relative to the project root
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from("transportation").join(format!("{}.shp", self.label().to_lowercase()))
    }
}

/// One state's transportation archive
pub fn transportation_request(config: &SourcesConfig, state: &str) -> BasinResult<SourceRequest> {
    let url = config
        .transportation_url
        .replace("{state}", &state.replace(' ', "_"));
    Ok(SourceRequest {
        key: CacheKey::new(TRANSPORTATION, state)?,
        files: vec![RemoteFile::archive(url)],
        expected: TransportKind::ALL
            .iter()
            .filter(|k| k.required())
            .map(|k| k.source_file())
            .collect(),
    })
}

/// One elevation tile, stored as downloaded
pub fn elevation_request(config: &SourcesConfig, tile: &str) -> BasinResult<SourceRequest> {
    let url = config.elevation_url.replace("{tile}", tile);
    let name = url_basename(&url);
    Ok(SourceRequest {
        key: CacheKey::new(ELEVATION, tile)?,
        files: vec![RemoteFile::plain(url)],
        expected: vec![PathBuf::from(name)],
    })
}

/// Names of the 1x1 degree tiles covering `bbox` (geographic coordinates)
///
/// Tiles are named after their north-west corner: `n45w122` spans
/// latitudes 44..45 and longitudes -122..-121.
pub fn tile_names(bbox: &BBox, buffer_deg: f64) -> Vec<String> {
    let b = bbox.buffered(buffer_deg);
    let mut names = Vec::new();

    let north_edges = (b.min_y.floor() as i32 + 1)..=(b.max_y.ceil() as i32);
    for top in north_edges.rev() {
        for west in (b.min_x.floor() as i32)..(b.max_x.ceil() as i32) {
            let lat = if top >= 0 {
                format!("n{:02}", top)
            } else {
                format!("s{:02}", -top)
            };
            let lon = if west < 0 {
                format!("w{:03}", -west)
            } else {
                format!("e{:03}", west)
            };
            names.push(format!("{}{}", lat, lon));
        }
    }
    names
}

const US_STATES: &[(&str, &str)] = &[
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("DC", "District of Columbia"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
];

/// Full state name for a two letter abbreviation
pub fn state_name(abbrev: &str) -> Option<&'static str> {
    let abbrev = abbrev.trim().to_uppercase();
    US_STATES
        .iter()
        .find(|(code, _)| *code == abbrev)
        .map(|(_, name)| *name)
}

/// States covering a watershed, parsed from its `States` attribute
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateCoverage {
    /// Full state names, sorted and deduplicated
    pub states: Vec<String>,
    /// Whether any part lies in Canada
    pub canada: bool,
    /// Codes that matched nothing
    pub unknown: Vec<String>,
}

impl StateCoverage {
    pub fn parse(attribute: &str) -> Self {
        let mut coverage = Self::default();
        for code in attribute.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            if code.eq_ignore_ascii_case(CANADA) {
                coverage.canada = true;
            } else if let Some(name) = state_name(code) {
                coverage.states.push(name.to_string());
            } else {
                coverage.unknown.push(code.to_string());
            }
        }
        coverage.states.sort();
        coverage.states.dedup();
        coverage
    }

    /// Entirely outside the United States
    pub fn only_canada(&self) -> bool {
        self.canada && self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_cover_single_cell() {
        let bbox = BBox {
            min_x: -121.8,
            min_y: 44.2,
            max_x: -121.3,
            max_y: 44.7,
        };
        assert_eq!(tile_names(&bbox, TILE_BUFFER_DEG), vec!["n45w122"]);
    }

    #[test]
    fn tiles_span_cells_with_buffer() {
        // Touches 44.995 so the buffer reaches into the n46 row
        let bbox = BBox {
            min_x: -122.5,
            min_y: 44.5,
            max_x: -121.5,
            max_y: 44.995,
        };
        let names = tile_names(&bbox, TILE_BUFFER_DEG);
        assert_eq!(names, vec!["n46w123", "n46w122", "n45w123", "n45w122"]);
    }

    #[test]
    fn parses_states_attribute() {
        let coverage = StateCoverage::parse("OR, wa,OR,CN,XX");
        assert_eq!(coverage.states, vec!["Oregon", "Washington"]);
        assert!(coverage.canada);
        assert!(!coverage.only_canada());
        assert_eq!(coverage.unknown, vec!["XX"]);
        assert!(StateCoverage::parse("CN").only_canada());
    }

    #[test]
    fn requests_follow_templates() {
        let config = SourcesConfig::default();

        let hydro = hydrography_request(&config, "1701").unwrap();
        assert!(hydro.files[0].url.contains("NHDPLUS_H_1701_HU4_GDB.zip"));
        assert_eq!(hydro.expected, vec![PathBuf::from("NHDPLUS_H_1701_HU4_GDB.gdb")]);

        let trans = transportation_request(&config, "New Mexico").unwrap();
        assert!(trans.files[0].url.contains("TRAN_New_Mexico_State_Shape.zip"));
        assert_eq!(trans.key.region, "new_mexico");
        assert_eq!(trans.expected.len(), 2);

        let dem = elevation_request(&config, "n45w122").unwrap();
        assert_eq!(dem.expected, vec![PathBuf::from("USGS_13_n45w122.tif")]);
        assert!(!dem.files[0].unpack);
    }
}

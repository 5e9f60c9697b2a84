use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use serde::Serialize;

use crate::date::{DateSpan, WaveDate};
use crate::error::{Error, Result};
use crate::field::{Grid, Quantity};

const MULTIGRID_GRIDS: &[&str] = &[
    "glo_30m", "ao_30m", "at_10m", "wc_10m", "ep_10m", "ak_10m", "at_4m", "wc_4m", "ak_4m",
];

const REANALYSIS_GRIDS: &[&str] = &[
    "ak_4m",
    "ak_10m",
    "ecg_4m",
    "ecg_10m",
    "glo_30m_ext",
    "med_10m",
    "nsb_4m",
    "nsb_10m",
    "nwio_10m",
    "oz_4m",
    "oz_10m",
    "pi_10m",
    "wc_4m",
    "wc_10m",
];

const NWW3_GRIDS: &[&str] = &["akw", "enp", "nah", "nph", "nww3", "wna"];

const QUANTITIES: &[&str] = &["wind", "hs", "tp", "dp"];

// Partition quantities were published from February 2017 onward.
const EXTENDED_QUANTITIES: &[&str] = &["wind", "hs", "tp", "dp", "phs", "ptp", "pdir"];

/// Built-in archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    Multigrid,
    MultigridExtended,
    MultigridThredds,
    Phase1,
    Phase2,
    Nww3,
}

impl SourceKind {
    pub const ALL: [SourceKind; 6] = [
        SourceKind::Multigrid,
        SourceKind::MultigridExtended,
        SourceKind::MultigridThredds,
        SourceKind::Phase1,
        SourceKind::Phase2,
        SourceKind::Nww3,
    ];

    pub fn descriptor(self) -> &'static SourceDescriptor {
        match self {
            SourceKind::Multigrid => &MULTIGRID,
            SourceKind::MultigridExtended => &MULTIGRID_EXTENDED,
            SourceKind::MultigridThredds => &MULTIGRID_THREDDS,
            SourceKind::Phase1 => &PHASE1,
            SourceKind::Phase2 => &PHASE2,
            SourceKind::Nww3 => &NWW3,
        }
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

/// Location of one archive member relative to its source's prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePath {
    pub dirs: Vec<String>,
    pub filename: String,
}

impl RemotePath {
    /// Absolute URL path: `{prefix}/{dirs...}/{filename}`.
    pub fn under(&self, prefix: &str) -> String {
        let mut path = prefix.trim_end_matches('/').to_string();
        for dir in &self.dirs {
            path.push('/');
            path.push_str(dir);
        }
        path.push('/');
        path.push_str(&self.filename);
        path
    }
}

pub type LayoutFn = fn(year: i32, month: u32, grid: &str, quantity: &str) -> RemotePath;

/// Static description of one archive: where it lives, what it holds and how
/// its files are named.
#[derive(Debug)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub name: &'static str,
    pub scheme: &'static str,
    pub netloc: &'static str,
    pub prefix: &'static str,
    pub grids: &'static [&'static str],
    pub quantities: &'static [&'static str],
    pub default_grid: &'static str,
    min_date: Option<NaiveDate>,
    max_date: Option<NaiveDate>,
    layout: LayoutFn,
}

static MULTIGRID: SourceDescriptor = SourceDescriptor {
    kind: SourceKind::Multigrid,
    name: "multigrid",
    scheme: "https",
    netloc: "polar.ncep.noaa.gov",
    prefix: "/waves/hindcasts/multi_1",
    grids: MULTIGRID_GRIDS,
    quantities: QUANTITIES,
    default_grid: "glo_30m",
    min_date: Some(ymd(2005, 2, 1)),
    max_date: Some(ymd(2019, 5, 31)),
    layout: multigrid_layout,
};

static MULTIGRID_EXTENDED: SourceDescriptor = SourceDescriptor {
    kind: SourceKind::MultigridExtended,
    name: "multigrid-extended",
    scheme: "https",
    netloc: "polar.ncep.noaa.gov",
    prefix: "/waves/hindcasts/multi_1",
    grids: MULTIGRID_GRIDS,
    quantities: EXTENDED_QUANTITIES,
    default_grid: "glo_30m",
    min_date: Some(ymd(2017, 2, 1)),
    max_date: Some(ymd(2019, 5, 31)),
    layout: multigrid_layout,
};

static MULTIGRID_THREDDS: SourceDescriptor = SourceDescriptor {
    kind: SourceKind::MultigridThredds,
    name: "multigrid-thredds",
    scheme: "https",
    netloc: "www.ncei.noaa.gov",
    prefix: "/thredds-ocean/fileServer/ncep/nww3",
    grids: MULTIGRID_GRIDS,
    quantities: QUANTITIES,
    default_grid: "glo_30m",
    min_date: Some(ymd(2005, 2, 1)),
    max_date: Some(ymd(2019, 5, 31)),
    layout: thredds_layout,
};

static PHASE1: SourceDescriptor = SourceDescriptor {
    kind: SourceKind::Phase1,
    name: "phase1",
    scheme: "https",
    netloc: "polar.ncep.noaa.gov",
    prefix: "/waves/hindcasts/nopp-phase1",
    grids: REANALYSIS_GRIDS,
    quantities: QUANTITIES,
    default_grid: "glo_30m_ext",
    min_date: Some(ymd(1979, 1, 1)),
    max_date: Some(ymd(2009, 12, 31)),
    layout: phase1_layout,
};

static PHASE2: SourceDescriptor = SourceDescriptor {
    kind: SourceKind::Phase2,
    name: "phase2",
    scheme: "https",
    netloc: "polar.ncep.noaa.gov",
    prefix: "/waves/hindcasts/nopp-phase2",
    grids: REANALYSIS_GRIDS,
    quantities: QUANTITIES,
    default_grid: "glo_30m_ext",
    min_date: Some(ymd(1979, 1, 1)),
    max_date: Some(ymd(2009, 12, 31)),
    layout: phase2_layout,
};

static NWW3: SourceDescriptor = SourceDescriptor {
    kind: SourceKind::Nww3,
    name: "nww3",
    scheme: "https",
    netloc: "polar.ncep.noaa.gov",
    prefix: "/waves/hindcasts/nww3",
    grids: NWW3_GRIDS,
    quantities: QUANTITIES,
    default_grid: "nww3",
    min_date: Some(ymd(1999, 7, 1)),
    max_date: Some(ymd(2006, 9, 30)),
    layout: nww3_layout,
};

fn multi_1_filename(year: i32, month: u32, grid: &str, quantity: &str) -> String {
    format!("multi_1.{grid}.{quantity}.{year}{month:02}.grb2")
}

fn multigrid_layout(year: i32, month: u32, grid: &str, quantity: &str) -> RemotePath {
    RemotePath {
        dirs: vec![format!("{year}{month:02}"), "gribs".to_string()],
        filename: multi_1_filename(year, month, grid, quantity),
    }
}

fn thredds_layout(year: i32, month: u32, grid: &str, quantity: &str) -> RemotePath {
    // Grids got their own directory until the 2017 reorganisation.
    let leaf = if year < 2017 { grid } else { "gribs" };
    RemotePath {
        dirs: vec![year.to_string(), format!("{month:02}"), leaf.to_string()],
        filename: multi_1_filename(year, month, grid, quantity),
    }
}

fn phase1_layout(year: i32, month: u32, grid: &str, quantity: &str) -> RemotePath {
    RemotePath {
        dirs: vec![format!("{year}{month:02}"), "grib".to_string()],
        filename: format!("multi_reanal.{grid}.{quantity}.{year}{month:02}.grb2.gz"),
    }
}

fn phase2_layout(year: i32, month: u32, grid: &str, quantity: &str) -> RemotePath {
    RemotePath {
        dirs: vec![format!("{year}{month:02}"), "gribs".to_string()],
        filename: format!("multi_reanal.{grid}.{quantity}.{year}{month:02}.grb2"),
    }
}

fn nww3_layout(year: i32, month: u32, grid: &str, quantity: &str) -> RemotePath {
    RemotePath {
        dirs: Vec::new(),
        filename: format!("{grid}.{quantity}.{year}{month:02}.grb"),
    }
}

// Evaluated while building the statics, so a bad constant fails to compile.
const fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => date,
        None => panic!("invalid calendar date in source table"),
    }
}

impl SourceDescriptor {
    pub fn min_date(&self) -> Option<NaiveDate> {
        self.min_date
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.max_date
    }

    pub fn span(&self) -> DateSpan {
        DateSpan::new(self.min_date(), self.max_date())
    }

    pub fn quantity(&self, value: &str) -> Result<Quantity> {
        Quantity::new(value, self.quantities)
    }

    pub fn grid(&self, value: &str) -> Result<Grid> {
        Grid::new(value, self.grids)
    }

    /// Validate `grid`, falling back to the source's default grid.
    pub fn grid_or_default(&self, grid: Option<&str>) -> Result<Grid> {
        self.grid(grid.unwrap_or(self.default_grid))
    }

    /// Parse `date` and check it against the source's date span.
    pub fn date(&self, date: &str) -> Result<WaveDate> {
        let date = WaveDate::parse(date)?;
        self.span().check(&date)?;
        Ok(date)
    }

    pub fn remote_path(&self, year: i32, month: u32, grid: Grid, quantity: Quantity) -> RemotePath {
        (self.layout)(year, month, grid.as_str(), quantity.as_str())
    }

    /// `scheme://netloc/prefix`.
    pub fn endpoint(&self) -> String {
        format!("{}://{}{}", self.scheme, self.netloc, self.prefix)
    }

    pub fn info(&self) -> SourceInfo {
        let mut grids = self.grids.to_vec();
        grids.sort_unstable();
        let mut quantities = self.quantities.to_vec();
        quantities.sort_unstable();
        SourceInfo {
            grids,
            quantities,
            min_date: self.min_date().map(|d| d.to_string()),
            max_date: self.max_date().map(|d| d.to_string()),
            endpoint: self.endpoint(),
        }
    }
}

/// Serializable summary of a source, as printed by `ww3 info`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub grids: Vec<&'static str>,
    pub quantities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_date: Option<String>,
    pub endpoint: String,
}

/// Name-based lookup of sources.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: BTreeMap<&'static str, &'static SourceDescriptor>,
}

impl SourceRegistry {
    pub fn new(descriptors: impl IntoIterator<Item = &'static SourceDescriptor>) -> Self {
        Self {
            sources: descriptors.into_iter().map(|d| (d.name, d)).collect(),
        }
    }

    /// Registry of every built-in source, created on first use.
    pub fn builtin() -> &'static SourceRegistry {
        static REGISTRY: OnceLock<SourceRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| SourceRegistry::new(SourceKind::ALL.map(SourceKind::descriptor)))
    }

    pub fn get(&self, name: &str) -> Result<&'static SourceDescriptor> {
        self.sources
            .get(name)
            .copied()
            .ok_or_else(|| Error::choice(name, self.names()))
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sources.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static SourceDescriptor> + '_ {
        self.sources.values().copied()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// TOML document with one `[wavewatch3.sources.<name>]` table per source.
    pub fn render_info<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<String> {
        #[derive(Serialize)]
        struct Document {
            wavewatch3: Sources,
        }
        #[derive(Serialize)]
        struct Sources {
            sources: BTreeMap<&'static str, SourceInfo>,
        }

        let mut sources = BTreeMap::new();
        for name in names {
            let source = self.get(name)?;
            sources.insert(source.name, source.info());
        }
        Ok(toml::to_string(&Document {
            wavewatch3: Sources { sources },
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn path_of(kind: SourceKind, date: &str, grid: &str, quantity: &str) -> String {
        let source = kind.descriptor();
        let date = source.date(date).unwrap();
        source
            .remote_path(
                date.year(),
                date.month(),
                source.grid(grid).unwrap(),
                source.quantity(quantity).unwrap(),
            )
            .under(source.prefix)
    }

    #[test]
    fn builtin_registry_has_every_kind() {
        let registry = SourceRegistry::builtin();
        assert_eq!(registry.len(), SourceKind::ALL.len());
        for kind in SourceKind::ALL {
            assert_eq!(registry.get(kind.name()).unwrap().kind, kind);
        }
    }

    #[test]
    fn every_source_has_an_ordered_date_span() {
        for kind in SourceKind::ALL {
            let source = kind.descriptor();
            let (min, max) = (source.min_date().unwrap(), source.max_date().unwrap());
            assert!(min < max, "{}", source.name);
            assert_eq!(source.span(), DateSpan::new(Some(min), Some(max)));
        }
        assert_eq!(PHASE1.min_date(), NaiveDate::from_ymd_opt(1979, 1, 1));
        assert_eq!(NWW3.max_date(), NaiveDate::from_ymd_opt(2006, 9, 30));
    }

    #[test]
    fn unknown_source_lists_registered_names() {
        let err = SourceRegistry::builtin().get("foo").unwrap_err();
        assert_matches!(err, Error::Choice { ref choices, .. } if choices.len() == 6);
    }

    #[test]
    fn multigrid_paths() {
        assert_eq!(
            path_of(SourceKind::Multigrid, "2010-05-22", "glo_30m", "dp"),
            "/waves/hindcasts/multi_1/201005/gribs/multi_1.glo_30m.dp.201005.grb2"
        );
        assert_eq!(
            path_of(SourceKind::MultigridExtended, "2018-11-02", "ak_4m", "phs"),
            "/waves/hindcasts/multi_1/201811/gribs/multi_1.ak_4m.phs.201811.grb2"
        );
    }

    #[test]
    fn thredds_directory_changes_in_2017() {
        assert_eq!(
            path_of(SourceKind::MultigridThredds, "2016-12-01", "at_4m", "hs"),
            "/thredds-ocean/fileServer/ncep/nww3/2016/12/at_4m/multi_1.at_4m.hs.201612.grb2"
        );
        assert_eq!(
            path_of(SourceKind::MultigridThredds, "2017-01-01", "at_4m", "hs"),
            "/thredds-ocean/fileServer/ncep/nww3/2017/01/gribs/multi_1.at_4m.hs.201701.grb2"
        );
    }

    #[test]
    fn reanalysis_paths() {
        assert_eq!(
            path_of(SourceKind::Phase1, "1979-01-01", "glo_30m_ext", "wind"),
            "/waves/hindcasts/nopp-phase1/197901/grib/multi_reanal.glo_30m_ext.wind.197901.grb2.gz"
        );
        assert_eq!(
            path_of(SourceKind::Phase2, "2009-12-31", "oz_4m", "tp"),
            "/waves/hindcasts/nopp-phase2/200912/gribs/multi_reanal.oz_4m.tp.200912.grb2"
        );
    }

    #[test]
    fn nww3_files_sit_under_prefix() {
        assert_eq!(
            path_of(SourceKind::Nww3, "2003-08-15", "akw", "hs"),
            "/waves/hindcasts/nww3/akw.hs.200308.grb"
        );
    }

    #[test]
    fn extended_quantities_need_extended_source() {
        assert_matches!(
            SourceKind::Multigrid.descriptor().quantity("phs"),
            Err(Error::Choice { .. })
        );
        assert_matches!(
            SourceKind::MultigridExtended.descriptor().date("2016-12-31"),
            Err(Error::DateRange { .. })
        );
    }

    #[test]
    fn info_renders_toml_tables() {
        let registry = SourceRegistry::builtin();
        let text = registry.render_info(["phase2"]).unwrap();
        assert!(text.contains("[wavewatch3.sources.phase2]"));
        assert!(text.contains("min_date = \"1979-01-01\""));
        assert!(text.contains("endpoint = \"https://polar.ncep.noaa.gov/waves/hindcasts/nopp-phase2\""));

        let all = registry.render_info(registry.names()).unwrap();
        assert_eq!(all.matches("[wavewatch3.sources.").count(), 6);
    }
}

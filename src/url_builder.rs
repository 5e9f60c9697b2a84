use std::fmt;

use url::Url;

use crate::date::WaveDate;
use crate::error::{Error, Result};
use crate::field::{Grid, Quantity};
use crate::sources::{RemotePath, SourceDescriptor, SourceRegistry};

/// The download location of one monthly archive file.
///
/// A resolver always holds a date, quantity and grid that are valid for its
/// source; setters validate first and leave the resolver untouched on error.
///
/// ```
/// use wavewatch3::{SourceRegistry, UrlResolver};
///
/// let source = SourceRegistry::builtin().get("multigrid")?;
/// let resolver = UrlResolver::new(source, "2010-05-22", "dp", None)?;
/// assert_eq!(resolver.filename(), "multi_1.glo_30m.dp.201005.grb2");
/// assert_eq!(
///     resolver.to_string(),
///     "https://polar.ncep.noaa.gov/waves/hindcasts/multi_1/201005/gribs/multi_1.glo_30m.dp.201005.grb2"
/// );
/// # Ok::<(), wavewatch3::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct UrlResolver {
    source: &'static SourceDescriptor,
    date: WaveDate,
    quantity: Quantity,
    grid: Grid,
}

impl UrlResolver {
    /// Validate `date`, `quantity` and `grid` (the source's default when `None`).
    pub fn new(
        source: &'static SourceDescriptor,
        date: &str,
        quantity: &str,
        grid: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            source,
            date: source.date(date)?,
            quantity: source.quantity(quantity)?,
            grid: source.grid_or_default(grid)?,
        })
    }

    pub fn source(&self) -> &'static SourceDescriptor {
        self.source
    }

    pub fn date(&self) -> WaveDate {
        self.date
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn set_date(&mut self, date: &str) -> Result<()> {
        self.date = self.source.date(date)?;
        Ok(())
    }

    /// Replace the date with an already-parsed value, still checking the span.
    pub fn set_wave_date(&mut self, date: WaveDate) -> Result<()> {
        self.source.span().check(&date)?;
        self.date = date;
        Ok(())
    }

    pub fn set_quantity(&mut self, quantity: &str) -> Result<()> {
        self.quantity = self.source.quantity(quantity)?;
        Ok(())
    }

    pub fn set_grid(&mut self, grid: &str) -> Result<()> {
        self.grid = self.source.grid(grid)?;
        Ok(())
    }

    pub fn set_year(&mut self, year: i32) -> Result<()> {
        self.set_wave_date(self.date.with_year(year)?)
    }

    pub fn set_month(&mut self, month: u32) -> Result<()> {
        self.set_wave_date(self.date.with_month(month)?)
    }

    pub fn filename(&self) -> String {
        self.remote_path().filename
    }

    /// URL path including the file name.
    pub fn path(&self) -> String {
        self.remote_path().under(self.source.prefix)
    }

    fn remote_path(&self) -> RemotePath {
        self.source
            .remote_path(self.year(), self.month(), self.grid, self.quantity)
    }

    pub fn url(&self) -> Result<Url> {
        Ok(Url::parse(&self.to_string())?)
    }

    /// Constructor-call form, e.g. `multigrid('2010-05-22T00', 'dp', grid='glo_30m')`.
    /// [`UrlResolver::parse_expression`] turns it back into an equal resolver.
    pub fn expression(&self) -> String {
        format!(
            "{}('{}', '{}', grid='{}')",
            self.source.name, self.date, self.quantity, self.grid
        )
    }

    pub fn parse_expression(expr: &str, registry: &SourceRegistry) -> Result<Self> {
        let bad = || Error::Expression(expr.to_string());

        let trimmed = expr.trim();
        let (name, rest) = trimmed.split_once('(').ok_or_else(bad)?;
        let args = rest.strip_suffix(')').ok_or_else(bad)?;
        let source = registry.get(name.trim())?;

        // date, quantity, grid
        let mut slots: [Option<&str>; 3] = [None; 3];
        let mut keywords = false;
        for (i, arg) in args.split(',').map(str::trim).filter(|a| !a.is_empty()).enumerate() {
            let (slot, value) = match arg.split_once('=') {
                Some((key, value)) => {
                    keywords = true;
                    let slot = match key.trim() {
                        "date" => 0,
                        "quantity" => 1,
                        "grid" => 2,
                        _ => return Err(bad()),
                    };
                    (slot, value.trim())
                }
                // Positional arguments must precede keywords.
                None if !keywords && i < slots.len() => (i, arg),
                None => return Err(bad()),
            };
            if slots[slot].is_some() {
                return Err(bad());
            }
            slots[slot] = Some(unquote(value).ok_or_else(bad)?);
        }

        let [date, quantity, grid] = slots;
        Self::new(
            source,
            date.ok_or_else(bad)?,
            quantity.ok_or_else(bad)?,
            grid,
        )
    }
}

fn unquote(s: &str) -> Option<&str> {
    s.strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| s.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
}

impl fmt::Display for UrlResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.source.scheme, self.source.netloc, self.path())
    }
}

impl PartialEq for UrlResolver {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for UrlResolver {}

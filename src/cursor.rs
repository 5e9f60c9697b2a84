use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::debug;

use crate::client::{Fetcher, is_gzip};
use crate::config::{default_cache_dir, default_workers};
use crate::date::WaveDate;
use crate::download::{BatchOptions, SilentProgress, fetch_all};
use crate::error::{Error, Result};
use crate::field::Grid;
use crate::sources::{SourceDescriptor, SourceRegistry};
use crate::url_builder::UrlResolver;

/// Longest run of months [`Cursor::set_step`] will roll through.
pub const MAX_ROLLOVER_MONTHS: usize = 120;

/// Gridded data of one month, as produced by a [`DatasetLoader`].
pub trait Dataset: Send {
    fn reference_time(&self) -> NaiveDateTime;

    /// Offsets of the records from the reference time, ascending.
    fn steps(&self) -> &[TimeDelta];
}

/// Opens the files of one month (one per quantity) as a single dataset.
pub trait DatasetLoader: Send + Sync {
    fn open(&self, paths: &[PathBuf]) -> Result<Box<dyn Dataset>>;
}

#[derive(Debug, Clone)]
pub struct CursorOptions {
    pub source: String,
    /// `None` selects the source's default grid.
    pub grid: Option<String>,
    pub cache_dir: PathBuf,
    /// Defer downloads until the data is first needed.
    pub lazy: bool,
    pub force: bool,
    pub workers: usize,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            source: "multigrid".to_string(),
            grid: None,
            cache_dir: default_cache_dir(),
            lazy: true,
            force: false,
            workers: default_workers(),
        }
    }
}

/// Position in time over the monthly files of one source and grid.
///
/// The cursor keeps one resolver per quantity; they always agree on date,
/// grid and source. Moving to another month drops the loaded dataset.
pub struct Cursor {
    source: &'static SourceDescriptor,
    grid: Grid,
    date: WaveDate,
    resolvers: Vec<UrlResolver>,
    step: usize,
    opts: CursorOptions,
    fetcher: Arc<dyn Fetcher>,
    loader: Arc<dyn DatasetLoader>,
    data: Option<Box<dyn Dataset>>,
}

impl Cursor {
    pub fn new(
        registry: &SourceRegistry,
        date: &str,
        opts: CursorOptions,
        fetcher: Arc<dyn Fetcher>,
        loader: Arc<dyn DatasetLoader>,
    ) -> Result<Self> {
        let source = registry.get(&opts.source)?;
        let grid = source.grid_or_default(opts.grid.as_deref())?;

        let mut quantities = source.quantities.to_vec();
        quantities.sort_unstable();
        let resolvers = quantities
            .iter()
            .map(|q| UrlResolver::new(source, date, q, Some(grid.as_str())))
            .collect::<Result<Vec<_>>>()?;
        let date = source.date(date)?;

        let mut cursor = Self {
            source,
            grid,
            date,
            resolvers,
            step: 0,
            opts,
            fetcher,
            loader,
            data: None,
        };
        if !cursor.opts.lazy {
            cursor.load()?;
        }
        Ok(cursor)
    }

    pub fn source(&self) -> &'static SourceDescriptor {
        self.source
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    /// Current date as `YYYY-MM-DDTHH`.
    pub fn date(&self) -> String {
        self.date.to_string()
    }

    pub fn wave_date(&self) -> WaveDate {
        self.date
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn day(&self) -> u32 {
        self.date.day()
    }

    pub fn hour(&self) -> u32 {
        self.date.hour()
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn cache_dir(&self) -> &Path {
        &self.opts.cache_dir
    }

    pub fn resolvers(&self) -> &[UrlResolver] {
        &self.resolvers
    }

    pub fn urls(&self) -> Vec<String> {
        self.resolvers.iter().map(UrlResolver::to_string).collect()
    }

    /// Where the current month's files live once fetched; gzipped archives
    /// are listed under their decompressed name.
    pub fn local_paths(&self) -> Vec<PathBuf> {
        self.resolvers
            .iter()
            .map(|r| {
                let path = self.opts.cache_dir.join(r.filename());
                if is_gzip(&path) {
                    path.with_extension("")
                } else {
                    path
                }
            })
            .collect()
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn set_date(&mut self, date: &str) -> Result<()> {
        self.move_to(WaveDate::parse(date)?)
    }

    /// Move by `months` calendar months (negative moves back). The day of
    /// month is kept, clamped to the length of the target month.
    pub fn advance(&mut self, months: i32) -> Result<()> {
        self.move_to(self.date.add_months(months)?)
    }

    // Every resolver is moved on a copy first, and an eager cursor opens the
    // new month from those copies. The cursor only changes once all of that
    // has succeeded.
    fn move_to(&mut self, date: WaveDate) -> Result<()> {
        if date == self.date {
            return Ok(());
        }

        let mut moved = self.resolvers.clone();
        for resolver in &mut moved {
            resolver.set_wave_date(date)?;
        }

        let new_month = !date.same_month(&self.date);
        let (data, step) = if !new_month {
            let step = match &self.data {
                Some(data) => locate_step(data.as_ref(), date),
                None => self.step,
            };
            (self.data.take(), step)
        } else if self.opts.lazy {
            (None, 0)
        } else {
            let (data, step) = self.open(&moved, date)?;
            (Some(data), step)
        };

        self.resolvers = moved;
        self.date = date;
        self.data = data;
        self.step = step;
        debug!(date = %self.date, new_month, "cursor moved");
        Ok(())
    }

    /// The current month's dataset, fetched and opened on first access.
    pub fn data(&mut self) -> Result<&dyn Dataset> {
        if self.data.is_none() {
            self.load()?;
        }
        self.data
            .as_deref()
            .ok_or_else(|| Error::Dataset("dataset not loaded".to_string()))
    }

    /// Fetch every file of the current month into the cache and open them.
    pub fn load(&mut self) -> Result<()> {
        let (data, step) = self.open(&self.resolvers, self.date)?;
        self.data = Some(data);
        self.step = step;
        Ok(())
    }

    fn open(
        &self,
        resolvers: &[UrlResolver],
        date: WaveDate,
    ) -> Result<(Box<dyn Dataset>, usize)> {
        let opts = BatchOptions {
            force: self.opts.force,
            workers: self.opts.workers,
        };
        let urls: Vec<String> = resolvers.iter().map(UrlResolver::to_string).collect();
        let outcomes = fetch_all(
            self.fetcher.as_ref(),
            &urls,
            &self.opts.cache_dir,
            &opts,
            &SilentProgress,
        )?;

        let failed: Vec<String> = outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| format!("{}: {}", o.remote, o.message()))
            .collect();
        if !failed.is_empty() {
            return Err(Error::Incomplete { failed });
        }

        let paths: Vec<PathBuf> = outcomes.into_iter().map(|o| o.local).collect();
        let data = self.loader.open(&paths)?;
        let step = locate_step(data.as_ref(), date);
        Ok((data, step))
    }

    /// Jump to record `step` of the current month. Steps past the end of the
    /// month continue into the following months.
    pub fn set_step(&mut self, step: i64) -> Result<()> {
        let mut remaining = usize::try_from(step)
            .map_err(|_| Error::Step(format!("step must be non-negative, got {step}")))?;

        for _ in 0..=MAX_ROLLOVER_MONTHS {
            let (count, target) = {
                let data = self.data()?;
                let steps = data.steps();
                let target = steps.get(remaining).map(|offset| data.reference_time() + *offset);
                (steps.len(), target)
            };

            if count == 0 {
                return Err(Error::Step(format!(
                    "no records for {}",
                    self.date.yyyymm()
                )));
            }

            if let Some(target) = target {
                self.move_to(WaveDate::from_datetime(target))?;
                if self.data.is_some() {
                    self.step = remaining;
                }
                return Ok(());
            }

            remaining -= count;
            self.advance(1)?;
        }

        Err(Error::Step(format!(
            "step {step} reaches more than {MAX_ROLLOVER_MONTHS} months ahead"
        )))
    }
}

/// Index of the first record at or after `date`.
fn locate_step(data: &dyn Dataset, date: WaveDate) -> usize {
    let offset = date.datetime() - data.reference_time();
    data.steps().partition_point(|s| *s < offset)
}

impl PartialEq for Cursor {
    /// Cursors are equal when they point at the same files.
    fn eq(&self, other: &Self) -> bool {
        self.year() == other.year()
            && self.month() == other.month()
            && self.grid == other.grid
            && self.source.name == other.source.name
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cursor('{}', grid='{}', source='{}')",
            self.date, self.grid, self.source.name
        )
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("source", &self.source.name)
            .field("grid", &self.grid)
            .field("date", &self.date)
            .field("step", &self.step)
            .field("loaded", &self.data.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    use super::*;
    use crate::client::Retrieved;

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl Fetcher for CountingFetcher {
        fn retrieve(&self, url: &str, filename: &Path, force: bool) -> Result<Retrieved> {
            if filename.is_file() && !force {
                return Ok(Retrieved {
                    path: filename.to_path_buf(),
                    bytes: None,
                });
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            fs::write(filename, url)?;
            Ok(Retrieved {
                path: filename.to_path_buf(),
                bytes: Some(url.len() as u64),
            })
        }
    }

    struct Month {
        start: NaiveDateTime,
        steps: Vec<TimeDelta>,
    }

    impl Dataset for Month {
        fn reference_time(&self) -> NaiveDateTime {
            self.start
        }

        fn steps(&self) -> &[TimeDelta] {
            &self.steps
        }
    }

    /// Daily records for the month named in the first file name; an empty
    /// month when `empty` is set.
    struct DailyLoader {
        empty: bool,
    }

    impl DatasetLoader for DailyLoader {
        fn open(&self, paths: &[PathBuf]) -> Result<Box<dyn Dataset>> {
            let name = paths[0].file_name().unwrap().to_str().unwrap();
            let yyyymm = name.split('.').nth(3).unwrap();
            let year: i32 = yyyymm[..4].parse().unwrap();
            let month: u32 = yyyymm[4..].parse().unwrap();
            let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
            let days = first
                .checked_add_months(chrono::Months::new(1))
                .unwrap()
                .signed_duration_since(first)
                .num_days();
            let steps = if self.empty {
                Vec::new()
            } else {
                (0..days).map(TimeDelta::days).collect()
            };
            Ok(Box::new(Month {
                start: first.and_hms_opt(0, 0, 0).unwrap(),
                steps,
            }))
        }
    }

    fn cursor(date: &str, cache: &Path, empty: bool) -> (Cursor, Arc<CountingFetcher>) {
        let fetcher = Arc::new(CountingFetcher::default());
        let opts = CursorOptions {
            cache_dir: cache.to_path_buf(),
            workers: 2,
            ..CursorOptions::default()
        };
        let cursor = Cursor::new(
            SourceRegistry::builtin(),
            date,
            opts,
            fetcher.clone(),
            Arc::new(DailyLoader { empty }),
        )
        .unwrap();
        (cursor, fetcher)
    }

    #[test]
    fn holds_one_resolver_per_quantity() {
        let dir = tempfile::tempdir().unwrap();
        let (c, _) = cursor("2010-05-22", dir.path(), false);
        assert_eq!(c.date(), "2010-05-22T00");
        assert_eq!(c.grid().as_str(), "glo_30m");
        let quantities: Vec<_> = c.resolvers().iter().map(|r| r.quantity().as_str()).collect();
        assert_eq!(quantities, vec!["dp", "hs", "tp", "wind"]);
        assert!(!c.is_loaded());
    }

    #[test]
    fn advance_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, _) = cursor("2019-04-10", dir.path(), false);
        c.advance(1).unwrap();
        assert_eq!(c.date(), "2019-05-10T00");

        assert_matches!(c.advance(1), Err(Error::DateRange { .. }));
        assert_eq!(c.date(), "2019-05-10T00");
        assert!(c.resolvers().iter().all(|r| r.month() == 5));
    }

    #[test]
    fn loading_fetches_once_and_locates_step() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, fetcher) = cursor("2010-05-22", dir.path(), false);

        assert_eq!(c.data().unwrap().steps().len(), 31);
        assert_eq!(c.step(), 21);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);

        c.set_date("2010-05-01").unwrap();
        assert!(c.is_loaded());
        assert_eq!(c.step(), 0);

        c.advance(1).unwrap();
        assert!(!c.is_loaded());
        c.advance(-1).unwrap();
        c.data().unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn month_change_resets_step_until_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, _) = cursor("2010-05-22", dir.path(), false);
        c.data().unwrap();
        assert_eq!(c.step(), 21);

        c.set_date("2010-06-05").unwrap();
        assert!(!c.is_loaded());
        assert_eq!(c.step(), 0);

        c.data().unwrap();
        assert_eq!(c.step(), 4);
    }

    #[test]
    fn step_rolls_into_following_months() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, _) = cursor("2010-01-01", dir.path(), false);

        c.set_step(3).unwrap();
        assert_eq!((c.date().as_str(), c.step()), ("2010-01-04T00", 3));

        // 31 days of January plus 28 of February.
        c.set_step(31 + 28 + 4).unwrap();
        assert_eq!((c.date().as_str(), c.step()), ("2010-03-05T00", 4));
    }

    #[test]
    fn bad_steps() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, _) = cursor("2010-01-01", dir.path(), false);
        assert_matches!(c.set_step(-1), Err(Error::Step(_)));

        let (mut empty, _) = cursor("2010-01-01", dir.path(), true);
        assert_matches!(empty.set_step(1), Err(Error::Step(_)));
        assert_eq!(empty.date(), "2010-01-01T00");
    }

    #[test]
    fn equality_follows_files() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _) = cursor("2009-12-31", dir.path(), false);
        let (b, _) = cursor("2009-12-01", dir.path(), false);
        let (c, _) = cursor("2008-12-31", dir.path(), false);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "Cursor('2009-12-31T00', grid='glo_30m', source='multigrid')");
    }
}

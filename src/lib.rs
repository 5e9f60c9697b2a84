#![forbid(unsafe_code)]

//! Locate and download NOAA WAVEWATCH III hindcast archives.
//!
//! Each archive source (the multigrid hindcast and its mirrors, the two
//! reanalysis phases, the older NWW3 archive) publishes one GRIB file per
//! month, grid and quantity. A [`UrlResolver`] turns a validated
//! `(source, date, quantity, grid)` into the file's URL; a [`Cursor`] walks
//! through time over all quantities of a grid and fetches them into a local
//! cache when their data is needed.
//!
//! **Quick start**
//! ```no_run
//! use wavewatch3::{BatchOptions, Client, LogProgress, SourceRegistry, fetch_resolvers, resolve_all};
//!
//! let source = SourceRegistry::builtin().get("multigrid")?;
//! let resolvers = resolve_all(source, &["2010-05-22".to_string()], Some("ak_4m"), &[])?;
//! for r in &resolvers {
//!     println!("{r}");
//! }
//!
//! let client = Client::default_client()?;
//! let outcomes = fetch_resolvers(
//!     &client,
//!     &resolvers,
//!     &wavewatch3::default_cache_dir(),
//!     &BatchOptions::default(),
//!     &LogProgress,
//! )?;
//! println!("{} files", outcomes.len());
//! # Ok::<(), wavewatch3::Error>(())
//! ```
//!
//! Notes:
//! - Dates are handled at hourly resolution; the file for a date only depends
//!   on its year and month.
//! - Decoding GRIB data is left to a [`DatasetLoader`] supplied by the caller.

mod cache;
mod client;
pub mod config;
mod cursor;
mod date;
mod download;
mod error;
mod field;
mod sources;
mod url_builder;

pub use crate::cache::{CacheDir, CacheEntry, CleanReport};
pub use crate::client::{Client, ClientOptions, Fetcher, Retrieved, gunzip, is_gzip, url_file_part};
pub use crate::config::{CACHE_DIR_ENV, default_cache_dir};
pub use crate::cursor::{Cursor, CursorOptions, Dataset, DatasetLoader, MAX_ROLLOVER_MONTHS};
pub use crate::date::{DateSpan, WaveDate};
pub use crate::download::{
    BatchOptions, FetchOutcome, FetchStatus, LogProgress, ProgressSink, SilentProgress, fetch_all,
    fetch_resolvers, resolve_all,
};
pub use crate::error::{Bound, Error, Result};
pub use crate::field::{Grid, Quantity};
pub use crate::sources::{RemotePath, SourceDescriptor, SourceInfo, SourceKind, SourceRegistry};
pub use crate::url_builder::UrlResolver;

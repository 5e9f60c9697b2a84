use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};

/// Retrieves one remote file into a local path.
///
/// Implementations must treat an existing `filename` as already satisfying
/// the request unless `force` is set.
pub trait Fetcher: Send + Sync {
    fn retrieve(&self, url: &str, filename: &Path, force: bool) -> Result<Retrieved>;
}

/// Result of a [`Fetcher::retrieve`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    /// Local file, decompressed if the remote file was gzipped.
    pub path: PathBuf,
    /// Bytes transferred, `None` when the file was already cached.
    pub bytes: Option<u64>,
}

impl Retrieved {
    pub fn is_cached(&self) -> bool {
        self.bytes.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub user_agent: String,
    pub verify_tls: bool,
    pub timeout: Option<Duration>,
    pub max_retries: usize,
    pub retry_delay: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: format!("wavewatch3-rs/{}", env!("CARGO_PKG_VERSION")),
            verify_tls: true,
            timeout: Some(Duration::from_secs(600)),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Blocking HTTP [`Fetcher`].
#[derive(Debug, Clone)]
pub struct Client {
    opts: ClientOptions,
    http: HttpClient,
}

impl Client {
    pub fn new(opts: ClientOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&opts.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("wavewatch3-rs")),
        );

        let mut builder = HttpClient::builder().default_headers(headers);
        if !opts.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(timeout) = opts.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self { opts, http })
    }

    pub fn default_client() -> Result<Self> {
        Self::new(ClientOptions::default())
    }

    fn send_with_retries(&self, url: &str) -> reqwest::Result<Response> {
        let mut attempt = 0usize;
        loop {
            match self.http.get(url).send() {
                Ok(resp)
                    if attempt < self.opts.max_retries
                        && is_retryable_status(resp.status().as_u16()) =>
                {
                    warn!(%url, status = resp.status().as_u16(), attempt, "retrying");
                }
                Ok(resp) => return Ok(resp),
                Err(err) if attempt < self.opts.max_retries && (err.is_connect() || err.is_timeout()) => {
                    warn!(%url, error = %err, attempt, "retrying");
                }
                Err(err) => return Err(err),
            }
            attempt += 1;
            thread::sleep(self.opts.retry_delay * attempt as u32);
        }
    }

    /// Stream `url` into `destination` through a temporary file in the same
    /// directory, so a failed transfer never leaves a partial file behind.
    fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        let retrieval = |source: reqwest::Error| Error::Retrieval {
            url: url.to_string(),
            source,
        };

        let mut resp = self
            .send_with_retries(url)
            .and_then(Response::error_for_status)
            .map_err(retrieval)?;

        let mut temp = temp_file_beside(destination)?;
        let bytes = resp.copy_to(temp.as_file_mut()).map_err(retrieval)?;
        temp.persist(destination).map_err(|e| Error::Io(e.error))?;

        info!(%url, bytes, path = %destination.display(), "downloaded");
        Ok(bytes)
    }
}

impl Fetcher for Client {
    fn retrieve(&self, url: &str, filename: &Path, force: bool) -> Result<Retrieved> {
        let bytes = if filename.is_file() && !force {
            debug!(path = %filename.display(), "cached");
            None
        } else {
            Some(self.download(url, filename)?)
        };

        let path = if is_gzip(filename) {
            gunzip(filename, force)?
        } else {
            filename.to_path_buf()
        };

        Ok(Retrieved { path, bytes })
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn temp_file_beside(path: &Path) -> Result<NamedTempFile> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    Ok(tempfile::Builder::new()
        .prefix(".ww3-")
        .suffix(".part")
        .tempfile_in(dir)?)
}

pub fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Decompress `archive` next to itself, dropping the `.gz` suffix. An existing
/// decompressed file is reused unless `force` is set.
pub fn gunzip(archive: &Path, force: bool) -> Result<PathBuf> {
    let target = archive.with_extension("");
    if target.is_file() && !force {
        return Ok(target);
    }

    let mut decoder = GzDecoder::new(File::open(archive)?);
    let mut temp = temp_file_beside(&target)?;
    let bytes = io::copy(&mut decoder, temp.as_file_mut())?;
    temp.persist(&target).map_err(|e| Error::Io(e.error))?;

    debug!(path = %target.display(), bytes, "decompressed");
    Ok(target)
}

/// Last path segment of `url`, used as the local file name.
pub fn url_file_part(url: &str) -> Result<String> {
    let parsed = Url::parse(url)?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::NoFileName(url.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    use assert_matches::assert_matches;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn quick_client(max_retries: usize) -> Client {
        Client::new(ClientOptions {
            timeout: Some(Duration::from_secs(10)),
            max_retries,
            retry_delay: Duration::from_millis(10),
            ..ClientOptions::default()
        })
        .unwrap()
    }

    /// Serves one canned response per connection, in order, on a local port.
    fn serve(responses: Vec<(&'static str, &'static str)>) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                    line.clear();
                }
                write!(
                    stream,
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                )
                .unwrap();
                stream.write_all(body.as_bytes()).unwrap();
            }
        });
        (base, handle)
    }

    #[test]
    fn file_part_of_url() {
        assert_eq!(
            url_file_part("https://polar.ncep.noaa.gov/waves/hindcasts/multi_1/201005/gribs/multi_1.glo_30m.dp.201005.grb2")
                .unwrap(),
            "multi_1.glo_30m.dp.201005.grb2"
        );
        assert!(url_file_part("https://polar.ncep.noaa.gov/").is_err());
    }

    #[test]
    fn gunzip_strips_suffix_and_reuses_output() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("multi_reanal.glo_30m_ext.hs.197901.grb2.gz");
        let mut enc = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        enc.write_all(b"GRIB payload").unwrap();
        enc.finish().unwrap();

        let out = gunzip(&archive, false).unwrap();
        assert_eq!(out, dir.path().join("multi_reanal.glo_30m_ext.hs.197901.grb2"));
        assert_eq!(fs::read(&out).unwrap(), b"GRIB payload");

        fs::write(&out, b"edited").unwrap();
        gunzip(&archive, false).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"edited");
        gunzip(&archive, true).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"GRIB payload");
    }

    #[test]
    fn cached_file_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("multi_1.glo_30m.hs.201005.grb2");
        fs::write(&local, b"cached").unwrap();

        // Unroutable host: any network access would fail.
        let client = Client::default_client().unwrap();
        let got = client
            .retrieve("https://invalid.invalid/multi_1.glo_30m.hs.201005.grb2", &local, false)
            .unwrap();
        assert!(got.is_cached());
        assert_eq!(got.path, local);
    }

    #[test]
    fn unreachable_host_is_a_retrieval_error() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.grb2");

        let err = quick_client(0)
            .retrieve("http://127.0.0.1:1/a.grb2", &local, false)
            .unwrap_err();
        assert_matches!(err, Error::Retrieval { ref url, .. } if url == "http://127.0.0.1:1/a.grb2");
        assert!(!local.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn error_status_is_a_retrieval_error() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.grb2");
        let (base, server) = serve(vec![("404 Not Found", "")]);

        let err = quick_client(2)
            .retrieve(&format!("{base}/a.grb2"), &local, false)
            .unwrap_err();
        assert_matches!(
            err,
            Error::Retrieval { ref source, .. }
                if source.status().map(|s| s.as_u16()) == Some(404)
        );
        assert!(!local.exists());
        server.join().unwrap();
    }

    #[test]
    fn transient_status_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.grb2");
        let (base, server) = serve(vec![("503 Service Unavailable", ""), ("200 OK", "GRIB")]);

        let got = quick_client(1)
            .retrieve(&format!("{base}/a.grb2"), &local, false)
            .unwrap();
        assert_eq!(got.bytes, Some(4));
        assert_eq!(fs::read(&local).unwrap(), b"GRIB");
        server.join().unwrap();
    }
}

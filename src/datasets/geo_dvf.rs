use crate::domain::model::{Department, DownloadReport, DvfRow};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{EstimatorError, Result};
use crate::utils::validation::{validate_positive_number, validate_url, validate_year};
use flate2::read::GzDecoder;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATASET_URL: &str = "https://files.data.gouv.fr/geo-dvf/latest/csv";
pub const DEFAULT_CACHE_DIR: &str = "geo_dvf_cache";
pub const DEFAULT_CONCURRENT_DOWNLOADS: usize = 4;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

enum FetchOutcome {
    Downloaded(PathBuf),
    Missing(String),
}

/// Local cache of Geo DVF files, one gzip CSV per (year, department).
pub struct GeoDvfDataset {
    years: Vec<i32>,
    departments: Vec<Department>,
    storage_path: PathBuf,
    dataset_url: String,
    concurrent_downloads: usize,
    max_retries: u32,
    retry_backoff: Duration,
    client: Client,
}

impl GeoDvfDataset {
    /// Validates the years and creates the storage directory.
    ///
    /// Without `storage_path` the cache lives in `<temp dir>/geo_dvf_cache`; relative
    /// paths are resolved against the current directory.
    pub fn new(
        years: Vec<i32>,
        departments: Vec<Department>,
        storage_path: Option<PathBuf>,
        dataset_url: Option<&str>,
    ) -> Result<Self> {
        for year in &years {
            validate_year("years", *year)?;
        }

        let dataset_url = dataset_url
            .unwrap_or(DEFAULT_DATASET_URL)
            .trim_end_matches('/')
            .to_string();
        validate_url("dataset_url", &dataset_url)?;

        let storage_path = match storage_path {
            Some(path) if path.is_absolute() => path,
            Some(path) => std::env::current_dir()?.join(path),
            None => std::env::temp_dir().join(DEFAULT_CACHE_DIR),
        };
        std::fs::create_dir_all(&storage_path)?;

        tracing::debug!(
            "Geo DVF dataset: {} year(s), {} department(s), cache at {}",
            years.len(),
            departments.len(),
            storage_path.display()
        );

        Ok(Self {
            years,
            departments,
            storage_path,
            dataset_url,
            concurrent_downloads: DEFAULT_CONCURRENT_DOWNLOADS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            client: Client::new(),
        })
    }

    /// Île-de-France departments, temporary cache and the public dataset URL.
    pub fn with_defaults(years: Vec<i32>) -> Result<Self> {
        Self::new(years, Department::ile_de_france(), None, None)
    }

    pub fn from_config<C: ConfigProvider>(config: &C) -> Result<Self> {
        validate_positive_number("concurrent_downloads", config.concurrent_downloads(), 1)?;
        Ok(Self::new(
            config.years().to_vec(),
            config.departments().to_vec(),
            config.storage_path().map(Path::to_path_buf),
            Some(config.dataset_url()),
        )?
        .with_concurrency(config.concurrent_downloads()))
    }

    pub fn with_concurrency(mut self, concurrent_downloads: usize) -> Self {
        self.concurrent_downloads = concurrent_downloads.max(1);
        self
    }

    /// Retries 429, 5xx and connection failures `max_retries` times, doubling
    /// `backoff` after each attempt. `0` disables retries.
    pub fn with_retry(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn departments(&self) -> &[Department] {
        &self.departments
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn dataset_url(&self) -> &str {
        &self.dataset_url
    }

    pub fn url(&self, year: i32, department: &Department) -> String {
        format!("{}/{}/departements/{}.csv.gz", self.dataset_url, year, department)
    }

    /// Year-major: every department of the first year, then the next year.
    pub fn urls(&self) -> Vec<String> {
        self.combinations()
            .map(|(year, department)| self.url(year, department))
            .collect()
    }

    pub fn file_path(&self, year: i32, department: &Department) -> PathBuf {
        self.storage_path.join(format!("{}_{}.csv.gz", year, department))
    }

    fn combinations(&self) -> impl Iterator<Item = (i32, &Department)> + '_ {
        self.years
            .iter()
            .flat_map(move |year| self.departments.iter().map(move |d| (*year, d)))
    }

    /// Fetches the files that are not cached yet. Cached files are never re-downloaded.
    pub async fn download(&self) -> Result<DownloadReport> {
        let mut report = DownloadReport::default();
        let mut pending = Vec::new();

        for (year, department) in self.combinations() {
            let path = self.file_path(year, department);
            if path.exists() {
                tracing::debug!("Skipping cached file {}", path.display());
                report.skipped.push(path);
            } else {
                pending.push((year, department.clone()));
            }
        }

        if pending.is_empty() {
            tracing::info!("✅ All {} Geo DVF file(s) already cached", report.skipped.len());
            return Ok(report);
        }

        tracing::info!(
            "⬇️ Downloading {} Geo DVF file(s) ({} cached, concurrency {})",
            pending.len(),
            report.skipped.len(),
            self.concurrent_downloads
        );

        let outcomes: Vec<Result<FetchOutcome>> = stream::iter(
            pending
                .into_iter()
                .map(|(year, department)| self.fetch(year, department)),
        )
        .buffer_unordered(self.concurrent_downloads)
        .collect()
        .await;

        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(FetchOutcome::Downloaded(path)) => report.downloaded.push(path),
                Ok(FetchOutcome::Missing(url)) => report.missing.push(url),
                Err(e) => {
                    tracing::error!("❌ {}", e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        report.downloaded.sort();
        report.missing.sort();
        tracing::info!(
            "✅ Download finished: {} downloaded, {} cached, {} missing upstream",
            report.downloaded.len(),
            report.skipped.len(),
            report.missing.len()
        );
        Ok(report)
    }

    async fn fetch(&self, year: i32, department: Department) -> Result<FetchOutcome> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(year, &department).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = self.retry_backoff * 2u32.pow(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "🔄 {} (retry {}/{} in {:?})",
                        e,
                        attempt,
                        self.max_retries,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                outcome => return outcome,
            }
        }
    }

    async fn fetch_once(&self, year: i32, department: &Department) -> Result<FetchOutcome> {
        let url = self.url(year, department);
        let target = self.file_path(year, department);

        tracing::debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            tracing::warn!("⚠️ No Geo DVF file for {} / {} ({})", year, department, url);
            return Ok(FetchOutcome::Missing(url));
        }
        if !status.is_success() {
            return Err(EstimatorError::DownloadError {
                url,
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;

        // 先寫入 .part 再改名，中斷的下載不會被當成快取
        let partial = partial_path(&target);
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &target).await?;

        tracing::debug!("Saved {} ({} bytes)", target.display(), bytes.len());
        Ok(FetchOutcome::Downloaded(target))
    }

    /// Parses every cached file of the requested years and departments.
    pub fn read_rows(&self) -> Result<Vec<DvfRow>> {
        let mut rows = Vec::new();
        let mut files_read = 0;

        for (year, department) in self.combinations() {
            let path = self.file_path(year, department);
            if !path.exists() {
                tracing::warn!("⚠️ {} is not cached, skipping", path.display());
                continue;
            }

            let file = File::open(&path)?;
            let parsed = parse_csv_gz(BufReader::new(file))?;
            tracing::debug!("Read {} rows from {}", parsed.len(), path.display());
            rows.extend(parsed);
            files_read += 1;
        }

        if files_read == 0 {
            return Err(EstimatorError::DatasetNotFound {
                path: self.storage_path.display().to_string(),
            });
        }

        tracing::info!("📂 Loaded {} rows from {} file(s)", rows.len(), files_read);
        Ok(rows)
    }

    /// Removes the cached files of the requested years and departments; the
    /// directory and unrelated files are left alone.
    pub fn cleanup(&self) -> Result<usize> {
        let mut removed = 0;

        for (year, department) in self.combinations() {
            let path = self.file_path(year, department);
            for candidate in [partial_path(&path), path] {
                match std::fs::remove_file(&candidate) {
                    Ok(()) => {
                        tracing::debug!("Removed {}", candidate.display());
                        removed += 1;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        tracing::info!("🧹 Removed {} cached file(s)", removed);
        Ok(removed)
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Decodes a gzip-compressed Geo DVF CSV (header row first).
pub fn parse_csv_gz<R: Read>(reader: R) -> Result<Vec<DvfRow>> {
    parse_csv(GzDecoder::new(reader))
}

pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<DvfRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in csv_reader.deserialize::<DvfRow>() {
        rows.push(record?);
    }
    Ok(rows)
}

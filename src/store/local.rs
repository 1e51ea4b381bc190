//! Store used by the application. Keeps all tables in memory and, when opened on a directory,
//! persists them as:
//!   - `companies.json`, the whole company table, rewritten on every company change.
//!   - `intervals.jsonl`, one interval per line, appended on commit and rewritten only when a
//!     company is deleted.
//!
//! A write is persisted before the new tables are published, so observers never see data that
//! isn't on disk.

use std::{
    collections::HashSet,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{self, File},
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::{watch, Mutex},
};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::StoreFault,
    model::{Company, CompanyId, CompanyTotals, NewCompany, NewInterval, TimeInterval},
};

use super::{tables::Tables, CompanyStore, IntervalStore, Observed};

const COMPANIES_FILE: &str = "companies.json";
const INTERVALS_FILE: &str = "intervals.jsonl";

/// Value every subscriber sees. A fault doesn't replace the tables, so a subscriber that joins
/// after a failed reload still gets the last good data once the fault clears.
#[derive(Clone)]
struct Feed {
    tables: Arc<Tables>,
    fault: Option<StoreFault>,
}

pub struct LocalStore {
    /// Serializes writers. Holds the files when the store is persistent.
    writer: Mutex<Option<StoreFiles>>,
    feed: watch::Sender<Feed>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self::with_tables(Tables::default(), None)
    }

    /// Opens or creates a store inside `dir`.
    pub async fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Can't create store directory {dir:?}"))?;
        let files = StoreFiles { dir };
        let tables = files.load().await?;
        info!(
            "Opened store in {:?} with {} companies and {} intervals",
            files.dir,
            tables.companies_by_name().len(),
            tables.intervals().len()
        );
        Ok(Self::with_tables(tables, Some(files)))
    }

    fn with_tables(tables: Tables, files: Option<StoreFiles>) -> Self {
        let (feed, _) = watch::channel(Feed {
            tables: Arc::new(tables),
            fault: None,
        });
        Self {
            writer: Mutex::new(files),
            feed,
        }
    }

    fn current(&self) -> Arc<Tables> {
        self.feed.borrow().tables.clone()
    }

    fn publish(&self, tables: Tables) {
        self.feed.send_replace(Feed {
            tables: Arc::new(tables),
            fault: None,
        });
    }

    fn observe<T: Send + 'static>(
        &self,
        query: impl Fn(&Tables) -> T + Send + 'static,
    ) -> Observed<T> {
        WatchStream::new(self.feed.subscribe())
            .map(move |feed| match feed.fault {
                Some(fault) => Err(fault),
                None => Ok(query(&feed.tables)),
            })
            .boxed()
    }

    /// Reads the files again, for example after another process changed them. If that fails
    /// every observer receives a fault and keeps its last data until a later reload or write
    /// succeeds.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<()> {
        let writer = self.writer.lock().await;
        let Some(files) = writer.as_ref() else {
            return Ok(());
        };
        match files.load().await {
            Ok(tables) => {
                self.publish(tables);
                Ok(())
            }
            Err(e) => {
                warn!("Reload failed, observers keep stale data {e:?}");
                self.feed.send_modify(|feed| feed.fault = Some(StoreFault::from(&e)));
                Err(e)
            }
        }
    }

    /// Waits for the write in flight, if any. Every write is synced before it's published, so
    /// nothing else has to be flushed.
    pub async fn close(&self) {
        let writer = self.writer.lock().await;
        if let Some(files) = writer.as_ref() {
            info!("Closed store in {:?}", files.dir);
        }
    }
}

#[async_trait]
impl CompanyStore for LocalStore {
    #[instrument(skip(self))]
    async fn insert(&self, company: NewCompany) -> Result<Company> {
        let writer = self.writer.lock().await;
        let (next, company) = self.current().with_company(company);
        if let Some(files) = writer.as_ref() {
            files.write_companies(&next).await?;
        }
        self.publish(next);
        info!("Created company {} {:?}", company.id, company.name);
        Ok(company)
    }

    #[instrument(skip(self))]
    async fn update(&self, company: Company) -> Result<()> {
        let writer = self.writer.lock().await;
        let id = company.id;
        let next = self.current().with_updated(company)?;
        if let Some(files) = writer.as_ref() {
            files.write_companies(&next).await?;
        }
        self.publish(next);
        info!("Updated company {id}");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: CompanyId) -> Result<()> {
        let writer = self.writer.lock().await;
        let current = self.current();
        let next = current.without_company(id)?;
        if let Some(files) = writer.as_ref() {
            files.write_cascade(&current, &next).await?;
        }
        let removed = current.intervals().len() - next.intervals().len();
        self.publish(next);
        info!("Deleted company {id} together with {removed} intervals");
        Ok(())
    }

    async fn get_by_id(&self, id: CompanyId) -> Result<Option<Company>> {
        Ok(self.current().company(id).cloned())
    }

    fn observe_all(&self) -> Observed<Vec<Company>> {
        self.observe(Tables::companies_by_name)
    }
}

#[async_trait]
impl IntervalStore for LocalStore {
    #[instrument(skip(self))]
    async fn insert(&self, interval: NewInterval) -> Result<TimeInterval> {
        let writer = self.writer.lock().await;
        let current = self.current();
        let interval = current.next_interval(interval)?;
        if let Some(files) = writer.as_ref() {
            files.append_interval(&interval).await?;
        }
        self.publish(current.with_interval(interval.clone()));
        info!(
            "Logged {}ms for company {} as interval {:?}",
            interval.duration_millis, interval.company_id, interval.id
        );
        Ok(interval)
    }

    fn observe_by_company(&self, company_id: CompanyId) -> Observed<Vec<TimeInterval>> {
        self.observe(move |tables| tables.intervals_for(company_id))
    }

    fn observe_aggregated_by_company(&self) -> Observed<Vec<CompanyTotals>> {
        self.observe(Tables::totals)
    }

    fn observe_all(&self) -> Observed<Vec<TimeInterval>> {
        self.observe(|tables| tables.intervals().to_vec())
    }
}

#[derive(Serialize, Deserialize)]
struct CompaniesDocument {
    last_company_id: u64,
    last_interval_id: u64,
    companies: Vec<Company>,
}

struct StoreFiles {
    dir: PathBuf,
}

impl StoreFiles {
    fn companies_path(&self) -> PathBuf {
        self.dir.join(COMPANIES_FILE)
    }

    fn intervals_path(&self) -> PathBuf {
        self.dir.join(INTERVALS_FILE)
    }

    async fn load(&self) -> Result<Tables> {
        let document = match fs::read(self.companies_path()).await {
            Ok(bytes) => serde_json::from_slice::<CompaniesDocument>(&bytes)
                .with_context(|| format!("Corrupted {:?}", self.companies_path()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => CompaniesDocument {
                last_company_id: 0,
                last_interval_id: 0,
                companies: vec![],
            },
            Err(e) => {
                return Err(e).with_context(|| format!("Can't read {:?}", self.companies_path()))
            }
        };

        let (mut intervals, mut needs_compaction) = read_intervals(&self.intervals_path())
            .await
            .with_context(|| format!("Can't read {:?}", self.intervals_path()))?;

        let before = intervals.len();
        let mut seen = HashSet::new();
        intervals.retain(|v| {
            document.companies.iter().any(|c| c.id == v.company_id)
                && v.is_consistent()
                && seen.insert(v.id)
        });
        if intervals.len() != before {
            warn!(
                "Dropped {} intervals of deleted companies, with broken durations or repeated ids",
                before - intervals.len()
            );
            needs_compaction = true;
        }

        if needs_compaction {
            self.rewrite_intervals(&intervals).await?;
        }

        Ok(Tables::new(
            document.companies,
            intervals,
            document.last_company_id,
            document.last_interval_id,
        ))
    }

    fn companies_bytes(tables: &Tables) -> Result<Vec<u8>> {
        let document = CompaniesDocument {
            last_company_id: tables.last_company_id,
            last_interval_id: tables.last_interval_id,
            companies: tables.companies_by_name(),
        };
        Ok(serde_json::to_vec_pretty(&document)?)
    }

    fn intervals_bytes(intervals: &[TimeInterval]) -> Result<Vec<u8>> {
        let mut buffer = Vec::<u8>::new();
        for interval in intervals {
            serde_json::to_writer(&mut buffer, interval)?;
            buffer.push(b'\n');
        }
        Ok(buffer)
    }

    async fn write_companies(&self, tables: &Tables) -> Result<()> {
        replace_file(&self.companies_path(), &Self::companies_bytes(tables)?)
            .await
            .with_context(|| format!("Can't write {:?}", self.companies_path()))
    }

    /// Appends one line. On failure the file is cut back to its previous length, so a retry
    /// neither duplicates the record nor glues onto half of it.
    async fn append_interval(&self, interval: &TimeInterval) -> Result<()> {
        let mut line = serde_json::to_vec(interval)?;
        line.push(b'\n');

        let path = self.intervals_path();
        let mut file = File::options()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Can't open {path:?}"))?;

        file.lock_exclusive()?;
        let result = async {
            let length = file.metadata().await?.len();
            let written = async {
                file.write_all(&line).await?;
                file.flush().await?;
                file.sync_data().await
            }
            .await;
            if let Err(e) = written {
                warn!("Append to {path:?} failed, truncating back to {length} bytes");
                file.set_len(length).await?;
                file.sync_data().await?;
                return Err(e);
            }
            Ok::<_, std::io::Error>(())
        }
        .await;
        if let Err(e) = file.unlock_async().await {
            // the lock goes away with the handle anyway
            warn!("Can't unlock {path:?} {e}");
        }
        result.with_context(|| format!("Can't append to {path:?}"))
    }

    async fn rewrite_intervals(&self, intervals: &[TimeInterval]) -> Result<()> {
        replace_file(&self.intervals_path(), &Self::intervals_bytes(intervals)?)
            .await
            .with_context(|| format!("Can't write {:?}", self.intervals_path()))
    }

    /// Replaces both files for a cascading delete. Both are staged before either is swapped in,
    /// and the old intervals are put back if the companies can't follow. Either way the files
    /// never hold time of a company that isn't there, nor lose time of one that is.
    async fn write_cascade(&self, previous: &Tables, next: &Tables) -> Result<()> {
        let intervals_path = self.intervals_path();
        let companies_path = self.companies_path();

        let intervals_bytes = Self::intervals_bytes(next.intervals())?;
        let companies_bytes = Self::companies_bytes(next)?;

        let staged_intervals = stage_file(&intervals_path, &intervals_bytes)
            .await
            .with_context(|| format!("Can't write {intervals_path:?}"))?;
        let staged_companies = match stage_file(&companies_path, &companies_bytes).await {
            Ok(v) => v,
            Err(e) => {
                discard_staged(&staged_intervals).await;
                return Err(e).with_context(|| format!("Can't write {companies_path:?}"));
            }
        };

        if let Err(e) = fs::rename(&staged_intervals, &intervals_path).await {
            discard_staged(&staged_intervals).await;
            discard_staged(&staged_companies).await;
            return Err(e).with_context(|| format!("Can't replace {intervals_path:?}"));
        }
        if let Err(e) = fs::rename(&staged_companies, &companies_path).await {
            discard_staged(&staged_companies).await;
            self.rewrite_intervals(previous.intervals())
                .await
                .context("Can't restore intervals after a failed delete")?;
            return Err(e).with_context(|| format!("Can't replace {companies_path:?}"));
        }
        Ok(())
    }
}

/// Returns the parsed intervals and whether the file has to be compacted. Lines that fail to
/// parse are skipped, they are what's left of a write cut short by a crash.
async fn read_intervals(path: &Path) -> std::io::Result<(Vec<TimeInterval>, bool)> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok((vec![], false)),
        Err(e) => return Err(e),
    };
    file.lock_shared()?;
    let mut lines = BufReader::new(file).lines();
    let mut intervals = vec![];
    let mut broken = false;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TimeInterval>(&line) {
            Ok(v) => intervals.push(v),
            Err(e) => {
                warn!("Skipping illegal interval record in {path:?} {line}: {e}");
                broken = true;
            }
        }
    }
    lines.into_inner().into_inner().unlock_async().await?;
    debug!("Read {} intervals from {path:?}", intervals.len());
    Ok((intervals, broken))
}

/// Writes `bytes` into a sibling `.tmp` file and syncs it. Returns the sibling's path.
async fn stage_file(path: &Path, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let temporary = path.with_extension("tmp");
    let mut file = File::create(&temporary).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(temporary)
}

async fn discard_staged(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!("Can't remove staged file {path:?} {e}");
    }
}

/// Writes into a sibling file and renames it over the target.
async fn replace_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temporary = stage_file(path, bytes).await?;
    fs::rename(&temporary, path).await
}

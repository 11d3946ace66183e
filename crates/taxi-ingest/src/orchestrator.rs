//! Run orchestration
//!
//! Discovers candidate files, runs the per-file pipeline over them one at a
//! time in path order, and aggregates the outcomes. A failed file never
//! stops the run.

use std::path::{Path, PathBuf};

use serde::Serialize;
use taxi_common::types::{LoadStrategy, RunStatistics};
use tracing::Instrument;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::db::Store;
use crate::error::IngestResult;
use crate::pipeline::{file_key, FileImporter, FileOutcome, ImportOptions};
use crate::progress::RunProgress;
use crate::stats;

const SOURCE_EXTENSION: &str = "parquet";

/// Everything a single run needs
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub data_dir: PathBuf,
    pub recursive: bool,
    pub dry_run: bool,
    pub strategy: LoadStrategy,
    pub batch_size: usize,
    pub insert_page_size: usize,
    /// Keep at most this many files after sorting and filtering
    pub max_files: Option<usize>,
    /// Skip files whose name sorts before this one
    pub start_with: Option<String>,
    pub progress: bool,
}

impl RunOptions {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            recursive: config.recursive,
            dry_run: false,
            strategy: config.method,
            batch_size: config.batch_size,
            insert_page_size: config.insert_page_size,
            max_files: None,
            start_with: None,
            progress: false,
        }
    }

    fn import_options(&self) -> ImportOptions {
        ImportOptions {
            batch_size: self.batch_size,
            strategy: self.strategy,
            insert_page_size: self.insert_page_size,
            dry_run: self.dry_run,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub data_dir: PathBuf,
    pub dry_run: bool,
    pub strategy: LoadStrategy,
    pub files_found: usize,
    pub imported_files: usize,
    pub validated_files: usize,
    pub skipped_files: usize,
    pub locked_files: usize,
    pub failed_files: usize,
    pub files: Vec<FileReport>,
    pub stats: RunStatistics,
}

impl RunSummary {
    fn new(run_id: Uuid, options: &RunOptions) -> Self {
        Self {
            run_id,
            data_dir: options.data_dir.clone(),
            dry_run: options.dry_run,
            strategy: options.strategy,
            files_found: 0,
            imported_files: 0,
            validated_files: 0,
            skipped_files: 0,
            locked_files: 0,
            failed_files: 0,
            files: Vec::new(),
            stats: RunStatistics::default(),
        }
    }

    fn record(&mut self, report: FileReport) {
        match report.outcome {
            FileOutcome::Imported { .. } => self.imported_files += 1,
            FileOutcome::Validated { .. } => self.validated_files += 1,
            FileOutcome::AlreadyImported => self.skipped_files += 1,
            FileOutcome::LockDenied => self.locked_files += 1,
            FileOutcome::Failed { .. } => self.failed_files += 1,
        }
        self.files.push(report);
    }

    pub fn rows_imported(&self) -> u64 {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Imported { rows, .. } => rows,
                _ => 0,
            })
            .sum()
    }
}

/// Candidate files under `dir`, sorted by path
pub fn discover_files(
    dir: &Path,
    recursive: bool,
    start_with: Option<&str>,
    max_files: Option<usize>,
) -> IngestResult<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true).max_depth(max_depth) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_source = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION));
        if is_source {
            files.push(entry.into_path());
        }
    }

    files.sort();

    if let Some(start) = start_with {
        files.retain(|path| file_key(path).as_str() >= start);
    }
    if let Some(limit) = max_files {
        files.truncate(limit);
    }

    Ok(files)
}

/// Import every discovered file and report the aggregate
pub async fn run_import(store: &Store, options: &RunOptions) -> IngestResult<RunSummary> {
    let run_id = Uuid::new_v4();
    run(store, options, run_id)
        .instrument(tracing::info_span!("import_run", %run_id))
        .await
}

async fn run(store: &Store, options: &RunOptions, run_id: Uuid) -> IngestResult<RunSummary> {
    let files = discover_files(
        &options.data_dir,
        options.recursive,
        options.start_with.as_deref(),
        options.max_files,
    )?;

    tracing::info!(
        data_dir = %options.data_dir.display(),
        files = files.len(),
        strategy = %options.strategy,
        batch_size = options.batch_size,
        dry_run = options.dry_run,
        "Starting import run"
    );

    let mut summary = RunSummary::new(run_id, options);
    summary.files_found = files.len();

    store.ensure_tables().await?;

    let progress = RunProgress::new(files.len() as u64, options.progress);
    let importer = FileImporter::new(store.schema().clone(), &options.import_options())
        .with_progress(progress.rows());

    // One session for the whole run: advisory locks are per connection
    let mut conn = store.acquire().await?;

    for path in files {
        let file = file_key(&path);
        progress.start_file(&file);

        let outcome = importer
            .import(&mut *conn, &path)
            .instrument(tracing::info_span!("import_file", file = %file))
            .await;

        progress.finish_file();
        if matches!(outcome, FileOutcome::Failed { .. }) {
            store.recover_session(&mut conn).await;
        }
        summary.record(FileReport {
            file,
            path,
            outcome,
        });
    }
    progress.finish();
    drop(conn);

    summary.stats = stats::run_statistics(store).await?;

    tracing::info!(
        found = summary.files_found,
        imported = summary.imported_files,
        validated = summary.validated_files,
        skipped = summary.skipped_files,
        locked = summary.locked_files,
        failed = summary.failed_files,
        rows = summary.rows_imported(),
        "Import run finished"
    );

    Ok(summary)
}

//! Builder Orchestrator
//!
//! Drives one end-to-end build: clear the output location, create the
//! schema, record metadata, extract and commit every page, then build the
//! secondary indexes and report statistics. The builder is the only place
//! that decides the terminal [`BuildState`].

use crate::config::Config;
use crate::error::{PdfDbError, Result};
use crate::extract::{LopdfSource, PageExtractor, PageSource};
use crate::pipeline::progress::ProgressReporter;
use crate::pipeline::scheduler::{ExtractionSummary, ParallelScheduler};
use crate::storage::schema::keys;
use crate::storage::{BatchWriter, Database, DatabaseStats};
use crate::utils;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Lifecycle of one build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Init,
    SchemaCreated,
    Extracting,
    IndexesBuilt,
    StatisticsReported,
    Done,
    Failed,
    Interrupted,
}

impl BuildState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Interrupted)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: BuildState) -> bool {
        use BuildState::*;
        match (self, next) {
            (Init, SchemaCreated)
            | (SchemaCreated, Extracting)
            | (Extracting, IndexesBuilt)
            | (IndexesBuilt, StatisticsReported)
            | (StatisticsReported, Done)
            | (Extracting, Interrupted) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }

    /// Status string stored under the `build_status` metadata key
    pub fn status_label(self) -> &'static str {
        match self {
            Self::Done => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
            _ => "running",
        }
    }
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::SchemaCreated => "schema created",
            Self::Extracting => "extracting",
            Self::IndexesBuilt => "indexes built",
            Self::StatisticsReported => "statistics reported",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

/// Result of a build that reached `Done` or `Interrupted`
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub state: BuildState,
    pub db_path: PathBuf,
    pub extraction: ExtractionSummary,
    pub batches_committed: usize,
    pub pages_committed: usize,
    pub tables_committed: usize,
    pub stats: DatabaseStats,
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn is_complete(&self) -> bool {
        self.state == BuildState::Done
    }

    pub fn is_interrupted(&self) -> bool {
        self.state == BuildState::Interrupted
    }

    /// Pages per second over the whole build
    pub fn pages_per_second(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds <= 0.0 {
            0.0
        } else {
            self.pages_committed as f64 / seconds
        }
    }
}

/// Builds a searchable page database from a PDF
pub struct PdfDatabaseBuilder {
    config: Config,
    db_path: PathBuf,
    state: BuildState,
    history: Vec<BuildState>,
    shutdown: Arc<AtomicBool>,
}

impl PdfDatabaseBuilder {
    /// Create a new builder writing to `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            db_path: db_path.as_ref().to_path_buf(),
            state: BuildState::Init,
            history: vec![BuildState::Init],
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag observed by the scheduler; setting it requests a graceful stop
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Every state visited by the most recent build, in order
    pub fn history(&self) -> &[BuildState] {
        &self.history
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Build from a PDF file on disk
    pub fn build_from_file<P: AsRef<Path>>(&mut self, pdf_path: P) -> Result<BuildReport> {
        let pdf_path = pdf_path.as_ref();
        self.reset();

        // Checked before the previous output is touched
        if !pdf_path.exists() {
            return Err(self.fail(PdfDbError::MissingInput(pdf_path.to_path_buf())));
        }

        let source = match LopdfSource::open(pdf_path, &self.config.tables) {
            Ok(source) => source,
            Err(e) => return Err(self.fail(e)),
        };
        self.run(Arc::new(source), &pdf_path.display().to_string())
    }

    /// Build from any page source
    pub fn build(
        &mut self,
        source: Arc<dyn PageSource>,
        source_name: &str,
    ) -> Result<BuildReport> {
        self.reset();
        self.run(source, source_name)
    }

    fn reset(&mut self) {
        self.state = BuildState::Init;
        self.history = vec![BuildState::Init];
    }

    fn run(&mut self, source: Arc<dyn PageSource>, source_name: &str) -> Result<BuildReport> {
        match self.execute(source, source_name) {
            Ok(report) => Ok(report),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, error: PdfDbError) -> PdfDbError {
        log::error!("Build failed while {}: {}", self.state, error);
        self.transition(BuildState::Failed);
        error
    }

    fn transition(&mut self, next: BuildState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal build transition {} -> {}",
            self.state,
            next
        );
        log::debug!("Build state: {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    fn execute(&mut self, source: Arc<dyn PageSource>, source_name: &str) -> Result<BuildReport> {
        let start = Instant::now();
        let total_pages = source.page_count();

        if utils::remove_database_files(&self.db_path)? {
            log::info!("Removed existing database {}", self.db_path.display());
        }
        utils::ensure_parent_directory(&self.db_path)?;

        let mut db = Database::create(&self.db_path, &self.config.storage)?;
        log::info!("Created schema in {}", self.db_path.display());
        self.transition(BuildState::SchemaCreated);

        let document_metadata = source.metadata();
        let build_time = chrono::Utc::now().to_rfc3339();
        let total_pages_value = total_pages.to_string();
        let pipeline_entries = [
            (keys::BUILD_TIME, build_time.as_str()),
            (keys::BUILDER, self.config.build.builder_name.as_str()),
            (keys::BUILDER_VERSION, crate::VERSION),
            (keys::SOURCE_FILE, source_name),
            (keys::TOTAL_PAGES, total_pages_value.as_str()),
            (keys::BUILD_STATUS, BuildState::Extracting.status_label()),
        ];
        let written = db.upsert_metadata(
            document_metadata
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .chain(pipeline_entries),
        )?;
        log::info!("Stored {} metadata entries", written);

        self.transition(BuildState::Extracting);
        let extractor = PageExtractor::new(source);
        let mut writer = BatchWriter::new(self.config.build.batch_size, total_pages);
        let progress = ProgressReporter::new(total_pages, self.config.build.show_progress);
        let scheduler = ParallelScheduler::new(self.config.build.workers, self.shutdown_flag());

        let extraction = scheduler.run(&extractor, &mut writer, &mut db, &progress)?;
        let failed_pages = serde_json::to_string(&extraction.failed_pages)?;
        if !extraction.failed_pages.is_empty() {
            log::warn!(
                "{} pages failed to extract and were stored empty: {:?}",
                extraction.failed_pages.len(),
                extraction.failed_pages
            );
        }

        if extraction.interrupted {
            db.upsert_metadata([
                (keys::BUILD_STATUS, BuildState::Interrupted.status_label()),
                (keys::FAILED_PAGES, failed_pages.as_str()),
            ])?;
            progress.finish("interrupted, partial save");
            log::warn!(
                "Build interrupted: {} of {} pages saved",
                writer.pages_committed(),
                total_pages
            );
            self.transition(BuildState::Interrupted);

            return Ok(BuildReport {
                state: self.state,
                db_path: self.db_path.clone(),
                extraction,
                batches_committed: writer.batches_committed(),
                pages_committed: writer.pages_committed(),
                tables_committed: writer.tables_committed(),
                stats: db.stats()?,
                elapsed: start.elapsed(),
            });
        }
        progress.finish("extraction complete");

        db.create_indexes()?;
        log::info!("Created secondary indexes");
        self.transition(BuildState::IndexesBuilt);

        db.upsert_metadata([
            (keys::BUILD_STATUS, BuildState::Done.status_label()),
            (keys::FAILED_PAGES, failed_pages.as_str()),
        ])?;
        let stats = db.stats()?;
        log_statistics(&stats, start.elapsed());
        self.transition(BuildState::StatisticsReported);

        self.transition(BuildState::Done);
        Ok(BuildReport {
            state: self.state,
            db_path: self.db_path.clone(),
            extraction,
            batches_committed: writer.batches_committed(),
            pages_committed: writer.pages_committed(),
            tables_committed: writer.tables_committed(),
            stats,
            elapsed: start.elapsed(),
        })
    }

    /// Request a graceful stop of a running build
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn log_statistics(stats: &DatabaseStats, elapsed: Duration) {
    log::info!("Build completed in {}", utils::format_duration(elapsed.as_secs_f64()));
    log::info!(
        "Pages: {} | Tables: {} | Metadata entries: {} | FTS entries: {}",
        utils::format_number(stats.page_count),
        utils::format_number(stats.table_count),
        stats.metadata_count,
        utils::format_number(stats.fts_count)
    );
    log::info!(
        "Characters: {} ({} per page) | Database size: {}",
        utils::format_number(stats.total_chars),
        utils::format_number(stats.avg_chars_per_page()),
        utils::format_file_size(stats.file_size_bytes)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::RawPage;
    use std::collections::BTreeMap;

    struct ListSource {
        pages: Vec<&'static str>,
    }

    impl PageSource for ListSource {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn metadata(&self) -> BTreeMap<String, String> {
            BTreeMap::from([("Title".to_string(), "Service Manual".to_string())])
        }

        fn extract_page(&self, page_num: u32) -> Result<RawPage> {
            let text = self.pages[page_num as usize - 1];
            if text == "!" {
                return Err(PdfDbError::Extraction {
                    page: page_num,
                    reason: "broken content stream".to_string(),
                });
            }
            Ok(RawPage {
                text: text.to_string(),
                tables: Vec::new(),
            })
        }
    }

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.build.show_progress = false;
        config.build.batch_size = 2;
        config.build.workers = 2;
        config
    }

    #[test]
    fn test_transitions() {
        use BuildState::*;
        assert!(Init.can_transition_to(SchemaCreated));
        assert!(Extracting.can_transition_to(Interrupted));
        assert!(Extracting.can_transition_to(Failed));
        assert!(!SchemaCreated.can_transition_to(Interrupted));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Init.can_transition_to(Extracting));
        assert!(Interrupted.is_terminal());
    }

    #[test]
    fn test_build_reaches_done() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("manual.db");
        let mut builder = PdfDatabaseBuilder::new(&db_path, quiet_config()).unwrap();

        let source = Arc::new(ListSource {
            pages: vec!["brake pads", "!", "torque specs"],
        });
        let report = builder.build(source, "manual.pdf").unwrap();

        assert!(report.is_complete());
        assert_eq!(
            builder.history(),
            &[
                BuildState::Init,
                BuildState::SchemaCreated,
                BuildState::Extracting,
                BuildState::IndexesBuilt,
                BuildState::StatisticsReported,
                BuildState::Done,
            ]
        );
        assert_eq!(report.stats.page_count, 3);
        assert_eq!(report.extraction.failed_pages, vec![2]);

        let db = Database::open(&db_path).unwrap();
        assert_eq!(db.get_metadata(keys::BUILD_STATUS).unwrap().as_deref(), Some("completed"));
        assert_eq!(db.get_metadata(keys::FAILED_PAGES).unwrap().as_deref(), Some("[2]"));
        assert_eq!(db.get_metadata("Title").unwrap().as_deref(), Some("Service Manual"));
        assert_eq!(db.get_metadata(keys::TOTAL_PAGES).unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn test_missing_input_fails_before_touching_output() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("manual.db");
        std::fs::write(&db_path, b"previous build").unwrap();

        let mut builder = PdfDatabaseBuilder::new(&db_path, quiet_config()).unwrap();
        let err = builder
            .build_from_file(dir.path().join("missing.pdf"))
            .unwrap_err();

        assert!(matches!(err, PdfDbError::MissingInput(_)));
        assert_eq!(builder.state(), BuildState::Failed);
        assert_eq!(std::fs::read(&db_path).unwrap(), b"previous build");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = quiet_config();
        config.build.batch_size = 0;
        assert!(matches!(
            PdfDatabaseBuilder::new("out.db", config),
            Err(PdfDbError::Config(_))
        ));
    }

    #[test]
    fn test_shutdown_before_build_is_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("manual.db");
        let mut builder = PdfDatabaseBuilder::new(&db_path, quiet_config()).unwrap();
        builder.request_shutdown();

        let source = Arc::new(ListSource {
            pages: vec!["one", "two", "three"],
        });
        let report = builder.build(source, "manual.pdf").unwrap();

        assert!(report.is_interrupted());
        assert_eq!(builder.state(), BuildState::Interrupted);
        assert_eq!(report.pages_committed, 0);

        let db = Database::open(&db_path).unwrap();
        assert_eq!(db.get_metadata(keys::BUILD_STATUS).unwrap().as_deref(), Some("interrupted"));
    }
}

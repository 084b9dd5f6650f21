//! Application context: every long-lived component, built once at startup.

use std::{
    env,
    path::{Path, PathBuf},
    sync::{Arc, Weak},
};

use filter_rules::{RuleEngine, RuleRecords, RulesCodec, RulesDocument, engine_for_document};
use main_exec::MainExecutor;
use synced_doc::{LoadOutcome, SyncedDocument, TomlCodec, YamlCodec};
use tracing::{info, warn};
use win_focus_watcher::{WindowInfoResolver, WindowSystem};

use crate::{
    ColorFilter, FilterCatalog, FilterCatalogController, FilterStateController, MainThreadFilter,
    SettingsController, ShutdownManager, UserSettings,
};

/// Where the application keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Rules file.
    pub rules_file: PathBuf,
    /// Settings file.
    pub settings_file: PathBuf,
    /// Color filter catalogue.
    pub filters_file: PathBuf,
}

impl AppPaths {
    /// Default rules file name.
    pub const RULES_FILE: &'static str = "inversion_rules.yaml";
    /// Default settings file name.
    pub const SETTINGS_FILE: &'static str = "settings.toml";
    /// Default catalogue file name.
    pub const FILTERS_FILE: &'static str = "color_filters.yaml";

    /// Default file names inside `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let data_dir = dir.into();
        Self {
            rules_file: data_dir.join(Self::RULES_FILE),
            settings_file: data_dir.join(Self::SETTINGS_FILE),
            filters_file: data_dir.join(Self::FILTERS_FILE),
            data_dir,
        }
    }

    /// `%APPDATA%\InversionManager`, else `~/.config/inversion-manager`,
    /// else the working directory.
    pub fn default_data_dir() -> PathBuf {
        if let Some(appdata) = env::var_os("APPDATA") {
            return Path::new(&appdata).join("InversionManager");
        }
        if let Some(home) = env::var_os("HOME") {
            return Path::new(&home).join(".config").join("inversion-manager");
        }
        PathBuf::from(".")
    }
}

/// Long-lived components, wired together.
///
/// Must be built on the thread that will run the main executor loop.
pub struct AppContext {
    /// File locations.
    pub paths: AppPaths,
    /// Main-thread queue.
    pub executor: MainExecutor,
    /// Settings file and change handlers.
    pub settings: Arc<SettingsController>,
    /// Rules file.
    pub rules_doc: Arc<RulesDocument>,
    /// Rule engine.
    pub engine: Arc<RuleEngine>,
    /// Named color effects.
    pub catalog: Arc<FilterCatalogController>,
    /// Color filter, routed through the main thread.
    pub filter: Arc<dyn ColorFilter>,
    /// Focus event handling.
    pub controller: Arc<FilterStateController>,
    /// Shutdown sequence.
    pub shutdown: Arc<ShutdownManager>,
}

impl AppContext {
    /// Build every component and load the three files. File problems are
    /// logged; the application then runs on in-memory defaults.
    ///
    /// The file sync timings are read once here, from the settings file, and
    /// used by all three documents; edits to them apply on the next start.
    pub fn build(
        paths: AppPaths,
        system: Arc<dyn WindowSystem>,
        filter: Arc<dyn ColorFilter>,
    ) -> Self {
        let executor = MainExecutor::new();

        let settings_doc =
            SyncedDocument::new(&paths.settings_file, UserSettings::default(), TomlCodec);
        load_logged(settings_doc.load(), &paths.settings_file);
        let sync = settings_doc.get().file_sync;
        let settings = SettingsController::new(Arc::new(
            settings_doc
                .with_settle_delay(sync.settle_delay())
                .with_debounce(sync.debounce()),
        ));
        settings.add_option_change_handler(
            |s| s.file_sync.clone(),
            |sync| info!(?sync, "file sync timing changed; takes effect after restart"),
            false,
        );

        let rules_doc = Arc::new(
            SyncedDocument::new(&paths.rules_file, RuleRecords::default(), RulesCodec)
                .with_settle_delay(sync.settle_delay())
                .with_debounce(sync.debounce()),
        );
        let engine = engine_for_document(&rules_doc);
        load_logged(rules_doc.load(), &paths.rules_file);
        info!(rules = engine.snapshot().len(), file = %paths.rules_file.display(), "rules ready");

        let catalog_doc = Arc::new(
            SyncedDocument::new(&paths.filters_file, FilterCatalog::builtin(), YamlCodec)
                .with_settle_delay(sync.settle_delay())
                .with_debounce(sync.debounce()),
        );
        load_logged(catalog_doc.load(), &paths.filters_file);
        let catalog = FilterCatalogController::new(catalog_doc);
        warn_unknown_filters(&catalog.filters(), &engine.records());

        let filter: Arc<dyn ColorFilter> = Arc::new(MainThreadFilter::new(filter, executor.clone()));
        let controller = Arc::new(FilterStateController::new(
            WindowInfoResolver::new(system),
            engine.clone(),
            filter.clone(),
            catalog.clone(),
        ));
        let weak: Weak<FilterStateController> = Arc::downgrade(&controller);
        let filters = Arc::downgrade(&catalog);
        engine.on_rules_changed(move |rules| {
            if let Some(catalog) = filters.upgrade() {
                warn_unknown_filters(&catalog.filters(), &rules.records());
            }
            if let Some(controller) = weak.upgrade() {
                controller.refresh();
            }
        });
        let weak: Weak<FilterStateController> = Arc::downgrade(&controller);
        let rules = Arc::downgrade(&engine);
        catalog.on_filters_changed(move |filters| {
            if let Some(engine) = rules.upgrade() {
                warn_unknown_filters(filters, &engine.records());
            }
            if let Some(controller) = weak.upgrade() {
                controller.refresh();
            }
        });

        let shutdown = ShutdownManager::new(executor.clone());
        let releasing = filter.clone();
        shutdown.add_exit_handler(move || releasing.dispose());
        Self {
            paths,
            executor,
            settings,
            rules_doc,
            engine,
            catalog,
            filter,
            controller,
            shutdown,
        }
    }
}

/// Log the outcome of an initial document load.
fn load_logged(result: synced_doc::Result<LoadOutcome>, path: &Path) {
    match result {
        Ok(outcome) => info!(path = %path.display(), ?outcome, "loaded"),
        Err(e) => warn!(path = %path.display(), error = %e, "load failed; using defaults"),
    }
}

/// Warn once per rule that names an effect missing from `catalog`.
fn warn_unknown_filters(catalog: &FilterCatalog, records: &RuleRecords) {
    for (rule, filter) in catalog.unknown_filters(records) {
        warn!(%rule, %filter, "rule uses an unknown color filter");
    }
}

//! Execution context passed explicitly to every operation.
//!
//! Bundles the settings, filesystem layout, SDK, port registry, collaborators
//! and verbosity. Nothing in the library reads process-global state once a
//! [`Context`] exists.

use crate::archive::{Extractor, NativeExtractor};
use crate::build_command::{BuildRunner, ScriptRunner};
use crate::config::Settings;
use crate::configuration::Configuration;
use crate::error::Result;
use crate::fetch::{CurlFetcher, Fetcher};
use crate::package_index::PackageIndex;
use crate::paths::Layout;
use crate::sdk::Sdk;
use crate::source::SourcePackage;
use crate::storage::Storage;
use log::debug;
use std::cell::OnceCell;
use std::path::PathBuf;

/// Everything an operation needs besides its arguments.
pub struct Context {
    settings: Settings,
    layout: Layout,
    sdk: Sdk,
    storage: Storage,
    fetcher: Box<dyn Fetcher>,
    runner: Box<dyn BuildRunner>,
    extractor: Box<dyn Extractor>,
    verbosity: u8,
    verbose_build: bool,
    index: OnceCell<PackageIndex>,
}

impl Context {
    /// Context with the default collaborators.
    pub fn new(settings: Settings, layout: Layout, sdk: Sdk, storage: Storage) -> Self {
        let runner = ScriptRunner::new(layout.build_script());
        Self {
            settings,
            layout,
            sdk,
            storage,
            fetcher: Box::new(CurlFetcher::default()),
            runner: Box::new(runner),
            extractor: Box::new(NativeExtractor),
            verbosity: 0,
            verbose_build: false,
            index: OnceCell::new(),
        }
    }

    /// Resolve layout and SDK from settings and scan the ports tree.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let layout = Layout::new(settings.ports_root(), settings.out_dir.clone());
        let sdk = Sdk::detect(&settings, &layout);
        let storage = Storage::scan(&layout)?;
        debug!("context: root={}", layout.root().display());
        Ok(Self::new(settings, layout, sdk, storage))
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_runner(mut self, runner: Box<dyn BuildRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// 0 = normal; 1+ streams build output to the console.
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Ask build scripts for verbose output (`VERBOSE=1`).
    pub fn with_verbose_build(mut self, verbose_build: bool) -> Self {
        self.verbose_build = verbose_build;
        self
    }

    /// Use `index` instead of loading the index file.
    pub fn with_index(self, index: PackageIndex) -> Self {
        let _ = self.index.set(index);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn sdk(&self) -> &Sdk {
        &self.sdk
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    pub fn runner(&self) -> &dyn BuildRunner {
        self.runner.as_ref()
    }

    pub fn extractor(&self) -> &dyn Extractor {
        self.extractor.as_ref()
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    pub fn verbose_build(&self) -> bool {
        self.verbose_build
    }

    /// Index file in use.
    pub fn index_file(&self) -> PathBuf {
        self.settings
            .index_file
            .clone()
            .unwrap_or_else(|| self.layout.default_index())
    }

    /// Current package index, loaded on first use. A missing index file is
    /// an empty index.
    pub fn index(&self) -> Result<&PackageIndex> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let path = self.index_file();
        let index = if path.exists() {
            PackageIndex::from_file(&path)?
        } else {
            debug!("no package index at {}", path.display());
            PackageIndex::default()
        };
        Ok(self.index.get_or_init(|| index))
    }

    /// Per-configuration view of a port.
    pub fn package(&self, name_or_path: &str, config: &Configuration) -> Result<SourcePackage<'_>> {
        let port = self.storage.resolve(name_or_path)?;
        Ok(SourcePackage::new(self, port, config.clone()))
    }
}

//! Port discovery and the configuration-independent dependency graph.
//!
//! This module provides [`Storage`] - a registry of ports discovered under
//! the ports tree. Each port is a directory holding a `pkg_info`
//! descriptor; the directory name must equal the descriptor's `NAME`.
//!
//! # Directory Structure
//!
//! ```text
//! <root>/ports/
//! ├── zlib/
//! │   ├── pkg_info
//! │   └── nacl.patch
//! ├── libpng/
//! │   └── pkg_info
//! └── python_modules/
//!     └── numpy/
//!         └── pkg_info
//! ```
//!
//! Descriptors are parsed once and shared; per-configuration views are
//! created on top by [`SourcePackage`](crate::source::SourcePackage).
//!
//! # Usage
//!
//! ```ignore
//! use webports_lib::Storage;
//!
//! let storage = Storage::scan(&layout)?;
//! for port in storage.ports() {
//!     println!("{} {}", port.name(), port.version());
//! }
//! let deps = storage.transitive_dependencies("libpng")?;
//! ```

use crate::error::{FormatError, GraphError, PortsError, Result};
use crate::package::Package;
use crate::paths::Layout;
use crate::pkg_info::{PkgInfo, REQUIRED_KEYS, VALID_KEYS};
use jwalk::WalkDir;
use log::{debug, info, trace, warn};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Descriptor file name.
pub const PKG_INFO_FILE: &str = "pkg_info";

/// A port directory: descriptor plus location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    package: Package,
    root: PathBuf,
}

impl Port {
    /// Load the port in `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let info_file = root.join(PKG_INFO_FILE);
        if !root.is_dir() || !info_file.is_file() {
            return Err(PortsError::msg(format!(
                "Invalid package folder: {}",
                root.display()
            )));
        }
        let info = PkgInfo::parse_file(&info_file, VALID_KEYS, REQUIRED_KEYS)?;
        let package = Package::new(info, info_file.display().to_string())?;

        let dir_name = root.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if package.name() != dir_name {
            return Err(FormatError::Invalid(format!(
                "{}: package NAME must match directory name",
                info_file.display()
            ))
            .into());
        }
        trace!("loaded port {} from {}", package.name(), root.display());
        Ok(Self {
            package,
            root: root.to_path_buf(),
        })
    }

    /// Port descriptor.
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Port directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Descriptor file.
    pub fn info_file(&self) -> PathBuf {
        self.root.join(PKG_INFO_FILE)
    }

    pub fn name(&self) -> &str {
        self.package.name()
    }

    pub fn version(&self) -> &str {
        self.package.version()
    }
}

/// Registry of discovered ports, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct Storage {
    ports: HashMap<String, Port>,
    /// Scanned locations
    locations: Vec<PathBuf>,
    /// Non-fatal problems found while scanning
    pub warnings: Vec<String>,
}

impl Storage {
    /// Scan the layout's port directories.
    pub fn scan(layout: &Layout) -> Result<Self> {
        Self::scan_dirs(&layout.port_dirs())
    }

    /// Scan the given directories recursively for `pkg_info` files.
    ///
    /// Earlier directories take priority when two ports share a name.
    /// Broken descriptors are recorded in [`Storage::warnings`] and skipped.
    pub fn scan_dirs(dirs: &[PathBuf]) -> Result<Self> {
        let mut storage = Storage::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for dir in dirs {
            if !dir.is_dir() {
                debug!("skipping missing port dir {}", dir.display());
                continue;
            }
            storage.locations.push(dir.clone());

            let mut roots: Vec<PathBuf> = WalkDir::new(dir)
                .skip_hidden(true)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| e.file_name().to_string_lossy() == PKG_INFO_FILE)
                .filter_map(|entry| entry.path().parent().map(Path::to_path_buf))
                .collect();
            // Shallow ports first, then by path, for a stable priority.
            roots.sort_by_key(|p| (p.components().count(), p.clone()));

            for root in roots {
                // Nested locations are also reached from their parent.
                if !seen.insert(root.clone()) {
                    continue;
                }
                match Port::load(&root) {
                    Ok(port) => storage.add(port),
                    Err(e) => {
                        warn!("{}", e);
                        storage.warnings.push(e.to_string());
                    }
                }
            }
        }

        info!(
            "Found {} ports in {} locations",
            storage.count(),
            storage.locations.len()
        );
        Ok(storage)
    }

    /// Register a port; the first port of a name wins.
    pub fn add(&mut self, port: Port) {
        let name = port.name().to_string();
        if let Some(existing) = self.ports.get(&name) {
            let msg = format!(
                "duplicate port '{}': {} shadows {}",
                name,
                existing.root().display(),
                port.root().display()
            );
            warn!("{}", msg);
            self.warnings.push(msg);
            return;
        }
        self.ports.insert(name, port);
    }

    /// Number of ports.
    pub fn count(&self) -> usize {
        self.ports.len()
    }

    /// Scanned locations.
    pub fn locations(&self) -> &[PathBuf] {
        &self.locations
    }

    /// Port by name.
    pub fn get(&self, name: &str) -> Option<&Port> {
        self.ports.get(name)
    }

    /// True if a port of this name exists.
    pub fn has(&self, name: &str) -> bool {
        self.ports.contains_key(name)
    }

    /// Port by name, or [`GraphError::NotFound`].
    pub fn find(&self, name: &str) -> Result<&Port> {
        self.get(name)
            .ok_or_else(|| GraphError::NotFound(name.to_string()).into())
    }

    /// Resolve a user argument: a port name or a port directory path.
    pub fn resolve(&self, name_or_path: &str) -> Result<&Port> {
        if let Some(port) = self.get(name_or_path) {
            return Ok(port);
        }
        let path = Path::new(name_or_path);
        if path.is_dir() {
            let wanted = path.canonicalize()?;
            for port in self.ports.values() {
                if port.root().canonicalize().ok().as_deref() == Some(wanted.as_path()) {
                    return Ok(port);
                }
            }
        }
        Err(GraphError::NotFound(name_or_path.to_string()).into())
    }

    /// All ports sorted by name.
    pub fn ports(&self) -> Vec<&Port> {
        let mut ports: Vec<&Port> = self.ports.values().collect();
        ports.sort_by(|a, b| a.name().cmp(b.name()));
        ports
    }

    /// Direct dependencies of `name`.
    pub fn dependencies(&self, name: &str) -> Result<Vec<&Port>> {
        self.find(name)?
            .package()
            .depends()
            .iter()
            .map(|dep| self.find(dep))
            .collect()
    }

    /// Direct conflicts of `name`.
    pub fn conflicts(&self, name: &str) -> Result<Vec<&Port>> {
        self.find(name)?
            .package()
            .conflicts()
            .iter()
            .map(|c| self.find(c))
            .collect()
    }

    /// Transitive dependencies of `name`, each dependency after its own
    /// dependencies, without duplicates. Cycles fail with
    /// [`GraphError::Cycle`].
    pub fn transitive_dependencies(&self, name: &str) -> Result<Vec<&Port>> {
        let mut out: Vec<&Port> = Vec::new();
        let mut stack = vec![name.to_string()];
        self.visit(name, &mut stack, &mut out)?;
        Ok(out)
    }

    fn visit<'a>(&'a self, name: &str, stack: &mut Vec<String>, out: &mut Vec<&'a Port>) -> Result<()> {
        for dep in self.dependencies(name)? {
            if stack.iter().any(|s| s == dep.name()) {
                let mut chain = stack.clone();
                chain.push(dep.name().to_string());
                return Err(GraphError::Cycle { chain }.into());
            }
            if out.iter().any(|p| p.name() == dep.name()) {
                continue;
            }
            stack.push(dep.name().to_string());
            self.visit(dep.name(), stack, out)?;
            stack.pop();
            out.push(dep);
        }
        Ok(())
    }

    /// Conflicts of `name` and then of its transitive dependencies, in
    /// discovery order without duplicates.
    pub fn transitive_conflicts(&self, name: &str) -> Result<Vec<&Port>> {
        let mut names: Vec<&str> = vec![name];
        let deps = self.transitive_dependencies(name)?;
        names.extend(deps.iter().map(|d| d.name()));

        let mut out: Vec<&Port> = Vec::new();
        for n in names {
            for c in self.conflicts(n)? {
                if !out.iter().any(|p| p.name() == c.name()) {
                    out.push(c);
                }
            }
        }
        Ok(out)
    }

    /// Ports that directly depend on `name`, sorted by name.
    pub fn reverse_dependencies(&self, name: &str) -> Vec<&Port> {
        self.ports()
            .into_iter()
            .filter(|p| p.package().depends().iter().any(|d| d == name))
            .collect()
    }

    /// DEPENDS or CONFLICTS entries of `port` naming a missing port.
    pub fn check_port(&self, port: &Port) -> Vec<String> {
        let mut problems = Vec::new();
        for dep in port.package().depends() {
            if !self.has(dep) {
                problems.push(format!("{}: Invalid dependency: {}", port.info_file().display(), dep));
            }
        }
        for c in port.package().conflicts() {
            if !self.has(c) {
                problems.push(format!("{}: Invalid conflict: {}", port.info_file().display(), c));
            }
        }
        problems
    }

    /// [`Storage::check_port`] over every port.
    pub fn check_references(&self) -> Vec<String> {
        self.ports().into_iter().flat_map(|p| self.check_port(p)).collect()
    }
}

//! Integration tests for webports.
//!
//! Uses tempdir to create isolated ports trees, SDKs and install roots, with
//! fake fetcher and build script collaborators.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;
use webports_lib::binary_package::BinaryPackage;
use webports_lib::build_command::{command_output, command_succeeds, BuildRequest, BuildRunner};
use webports_lib::fetch::Fetcher;
use webports_lib::lock::InstallLock;
use webports_lib::package_index::write_index;
use webports_lib::paths::Layout;
use webports_lib::sdk::Sdk;
use webports_lib::{
    util, Configuration, Context, InstalledPackage, LockError, PackageIndex, PortsError,
    Result, Settings, Storage,
};

/// Serves every URL from `dir/<basename>`.
struct DirFetcher {
    dir: PathBuf,
    calls: Rc<RefCell<Vec<String>>>,
}

impl Fetcher for DirFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        self.calls.borrow_mut().push(url.to_string());
        let name = url.rsplit('/').next().unwrap_or_default();
        let src = self.dir.join(name);
        if !src.exists() {
            return Err(PortsError::msg(format!("404: {}", url)));
        }
        fs::create_dir_all(dest.parent().unwrap())?;
        fs::copy(&src, dest)?;
        Ok(())
    }
}

/// Writes a header, a pkg-config file and a library into the staging
/// directory of the package being built.
struct StagingRunner {
    layout: Layout,
    config: Configuration,
    built: Rc<RefCell<Vec<String>>>,
}

impl BuildRunner for StagingRunner {
    fn run(&self, request: &BuildRequest<'_>) -> Result<()> {
        let name = request.package;
        self.built.borrow_mut().push(name.to_string());
        let staging = self
            .layout
            .build_root()
            .join(name)
            .join(self.config.install_dir_name())
            .join("payload");
        fs::create_dir_all(staging.join("include"))?;
        fs::create_dir_all(staging.join("lib/pkgconfig"))?;
        fs::write(staging.join(format!("include/{}.h", name)), "#define X 1\n")?;
        fs::write(
            staging.join(format!("lib/pkgconfig/{}.pc", name)),
            "prefix=/naclports-dummydir\n",
        )?;
        fs::write(staging.join(format!("lib/lib{}.a", name)), "!<arch>\n")?;
        Ok(())
    }
}

struct Fixture {
    dir: TempDir,
    fetched: Rc<RefCell<Vec<String>>>,
    built: Rc<RefCell<Vec<String>>>,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("ports")).unwrap();
        fs::create_dir_all(dir.path().join("sdk")).unwrap();
        fs::create_dir_all(dir.path().join("mirror")).unwrap();
        Self {
            dir,
            fetched: Rc::default(),
            built: Rc::default(),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn port(&self, name: &str, extra: &str) -> PathBuf {
        let port_dir = self.root().join("ports").join(name);
        fs::create_dir_all(&port_dir).unwrap();
        fs::write(
            port_dir.join("pkg_info"),
            format!("NAME={}\nVERSION=1.0\n{}", name, extra),
        )
        .unwrap();
        port_dir
    }

    /// Upstream tarball `<name>-1.0.tar.gz` holding `<name>-1.0/README`;
    /// returns its SHA1.
    fn upstream_archive(&self, name: &str) -> String {
        let path = self.root().join("mirror").join(format!("{}-1.0.tar.gz", name));
        let enc = GzEncoder::new(fs::File::create(&path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(enc);
        let data = b"upstream sources\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}-1.0/README", name), &data[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
        util::hash_file(&path).unwrap()
    }

    fn config(&self) -> Configuration {
        Configuration::new(Some("x86_64"), Some("clang-newlib"), false).unwrap()
    }

    fn sdk(&self, version: &str) -> Sdk {
        Sdk::new(self.root().join("sdk"), version, "linux")
    }

    fn context(&self) -> Context {
        let settings = Settings {
            ports_root: Some(self.root().to_path_buf()),
            ..Settings::default()
        };
        let layout = Layout::new(self.root(), None);
        let storage = Storage::scan(&layout).unwrap();
        let runner = StagingRunner {
            layout: layout.clone(),
            config: self.config(),
            built: self.built.clone(),
        };
        let fetcher = DirFetcher {
            dir: self.root().join("mirror"),
            calls: self.fetched.clone(),
        };
        Context::new(settings, layout, self.sdk("49"), storage)
            .with_runner(Box::new(runner))
            .with_fetcher(Box::new(fetcher))
    }

    fn install_root(&self) -> PathBuf {
        self.sdk("49").install_root(&self.config()).unwrap()
    }
}

#[test]
fn test_scan_and_transitive_order() {
    let fx = Fixture::new();
    fx.port("base", "");
    fx.port("left", "DEPENDS=(base)\n");
    fx.port("right", "DEPENDS=(base)\n");
    fx.port("top", "DEPENDS=(left right)\n");

    let ctx = fx.context();
    assert_eq!(ctx.storage().count(), 4);
    let top = ctx.package("top", &fx.config()).unwrap();
    let names: Vec<&str> = top
        .transitive_dependencies()
        .unwrap()
        .iter()
        .map(|p| p.name())
        .collect();
    assert_eq!(names, ["base", "left", "right"]);
}

#[test]
fn test_resolve_by_directory() {
    let fx = Fixture::new();
    let dir = fx.port("zlib", "");
    let ctx = fx.context();
    let pkg = ctx.package(&dir.display().to_string(), &fx.config()).unwrap();
    assert_eq!(pkg.name(), "zlib");
}

#[test]
fn test_disabled_attribution() {
    let fx = Fixture::new();
    fx.port("base", "DISABLED_TOOLCHAIN=(clang-newlib)\n");
    fx.port("lib", "DEPENDS=(base)\n");
    fx.port("app", "DEPENDS=(lib)\n");

    let ctx = fx.context();
    let err = ctx.package("app", &fx.config()).unwrap().check_installable().unwrap_err();
    assert!(err.is_disabled());
    assert_eq!(
        err.to_string(),
        "app depends on lib; lib depends on base; base: cannot be built with clang-newlib"
    );
}

#[test]
fn test_extract_is_idempotent() {
    let fx = Fixture::new();
    let sha1 = fx.upstream_archive("zlib");
    fx.port(
        "zlib",
        &format!("URL=https://example.com/zlib-1.0.tar.gz\nSHA1={}\n", sha1),
    );

    let ctx = fx.context();
    let pkg = ctx.package("zlib", &fx.config()).unwrap();
    pkg.download(None).unwrap();
    pkg.extract().unwrap();

    let readme = pkg.build_location().join("README");
    assert_eq!(fs::read_to_string(&readme).unwrap(), "upstream sources\n");
    let stamp = fs::read_to_string(pkg.stamps().extract()).unwrap();
    assert_eq!(stamp, format!("ARCHIVE_SHA1={}\n", sha1));

    // local edits survive a second extract
    fs::write(&readme, "edited\n").unwrap();
    pkg.extract().unwrap();
    assert_eq!(fs::read_to_string(&readme).unwrap(), "edited\n");

    // the archive is only fetched once (mirror first)
    pkg.download(None).unwrap();
    assert_eq!(fx.fetched.borrow().len(), 1);
    assert!(fx.fetched.borrow()[0].starts_with(&ctx.settings().mirror_url));
}

#[test]
fn test_patch_change_requires_fresh_checkout() {
    let fx = Fixture::new();
    let sha1 = fx.upstream_archive("zlib");
    let port_dir = fx.port(
        "zlib",
        &format!("URL=https://example.com/zlib-1.0.tar.gz\nSHA1={}\n", sha1),
    );

    let ctx = fx.context();
    let pkg = ctx.package("zlib", &fx.config()).unwrap();
    pkg.download(None).unwrap();
    pkg.extract().unwrap();

    fs::write(port_dir.join("nacl.patch"), "--- a/README\n+++ b/README\n").unwrap();
    let err = pkg.extract().unwrap_err();
    assert!(err.to_string().contains("Upstream archive or patch has changed"));
    assert!(err.to_string().contains(&pkg.build_location().display().to_string()));
}

fn have_tools(tools: &[&str]) -> bool {
    tools
        .iter()
        .all(|t| command_succeeds(t, &["--version"], Path::new(".")))
}

const README_PATCH: &str = "--- a/README\n+++ b/README\n@@ -1 +1 @@\n-upstream sources\n+patched sources\n";

#[test]
fn test_patch_two_branch_layout() {
    if !have_tools(&["git", "patch"]) {
        return;
    }
    let fx = Fixture::new();
    let sha1 = fx.upstream_archive("zlib");
    let port_dir = fx.port(
        "zlib",
        &format!("URL=https://example.com/zlib-1.0.tar.gz\nSHA1={}\n", sha1),
    );
    fs::write(port_dir.join("nacl.patch"), README_PATCH).unwrap();

    let ctx = fx.context();
    let pkg = ctx.package("zlib", &fx.config()).unwrap();
    pkg.download(None).unwrap();
    pkg.extract().unwrap();
    pkg.patch().unwrap();

    let src = pkg.build_location();
    assert_eq!(fs::read_to_string(src.join("README")).unwrap(), "patched sources\n");
    assert!(pkg.stamps().patch().exists());
    let show = |rev: &str| command_output("git", &["show", &format!("{}:README", rev)], &src).unwrap();
    assert_eq!(show("upstream"), "upstream sources\n");
    assert_eq!(show("master"), "patched sources\n");
    let count = command_output("git", &["rev-list", "--count", "master"], &src).unwrap();
    assert_eq!(count.trim(), "2");

    // patched trees are only cleaned on later runs
    fs::write(src.join("stray.o"), "obj").unwrap();
    pkg.patch().unwrap();
    assert!(!src.join("stray.o").exists());
    assert_eq!(fs::read_to_string(src.join("README")).unwrap(), "patched sources\n");
    let count = command_output("git", &["rev-list", "--count", "master"], &src).unwrap();
    assert_eq!(count.trim(), "2");
}

#[test]
fn test_build_log_captures_source_steps() {
    if !have_tools(&["git", "patch"]) {
        return;
    }
    let fx = Fixture::new();
    let sha1 = fx.upstream_archive("zlib");
    let port_dir = fx.port(
        "zlib",
        &format!("URL=https://example.com/zlib-1.0.tar.gz\nSHA1={}\n", sha1),
    );
    fs::write(port_dir.join("nacl.patch"), README_PATCH).unwrap();

    let ctx = fx.context();
    let pkg = ctx.package("zlib", &fx.config()).unwrap();
    pkg.build(false, None).unwrap();

    let log = fs::read_to_string(pkg.log_file().unwrap()).unwrap();
    assert!(log.contains("Downloading: "));
    assert!(log.contains("Extracting "));
    assert!(log.contains("git init -q"));
    assert!(log.contains("git add ."));
    assert!(pkg.stamps().patch().exists());
}

#[test]
fn test_download_rejects_bad_hash() {
    let fx = Fixture::new();
    fx.upstream_archive("zlib");
    fx.port(
        "zlib",
        "URL=https://example.com/zlib-1.0.tar.gz\nSHA1=0000000000000000000000000000000000000000\n",
    );
    let ctx = fx.context();
    let err = ctx.package("zlib", &fx.config()).unwrap().download(None).unwrap_err();
    assert!(matches!(err, PortsError::HashVerification(_)));
}

#[test]
fn test_build_install_uninstall() {
    let fx = Fixture::new();
    fx.port("base", "");
    fx.port("app", "DEPENDS=(base)\n");

    let ctx = fx.context();
    let config = fx.config();
    let app = ctx.package("app", &config).unwrap();
    app.install(true, None, true).unwrap();

    assert_eq!(*fx.built.borrow(), ["base", "app"]);
    assert!(app.package_file().exists());
    assert!(app.pkg_file().exists());
    assert!(app.is_installed().unwrap());

    let root = fx.install_root();
    let pc = fs::read_to_string(root.join("lib/pkgconfig/app.pc")).unwrap();
    assert_eq!(pc, format!("prefix={}\n", root.display()));

    let installed = InstalledPackage::load(ctx.sdk(), "app", &config).unwrap();
    let mut files = installed.files().unwrap();
    files.sort();
    assert_eq!(files, ["include/app.h", "lib/libapp.a", "lib/pkgconfig/app.pc"]);

    // second install is a no-op
    app.install(true, None, true).unwrap();
    assert_eq!(fx.built.borrow().len(), 2);

    installed.uninstall().unwrap();
    assert!(!root.join("include/app.h").exists());
    assert!(!root.join("lib/libapp.a").exists());
    assert!(root.join("include/base.h").exists());
    assert!(root.join("lib/pkgconfig/base.pc").exists());
    assert!(!app.is_any_version_installed().unwrap());

    let names: Vec<String> = InstalledPackage::all(ctx.sdk(), &config)
        .unwrap()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(names, ["base"]);
}

#[test]
fn test_install_conflict() {
    let fx = Fixture::new();
    fx.port("openssl", "");
    fx.port("boringssl", "CONFLICTS=(openssl)\n");

    let ctx = fx.context();
    let config = fx.config();
    ctx.package("openssl", &config).unwrap().install(true, None, true).unwrap();

    let err = ctx
        .package("boringssl", &config)
        .unwrap()
        .install(true, None, true)
        .unwrap_err();
    assert!(matches!(err, PortsError::Conflict(_)));
}

#[test]
fn test_install_lock_contention() {
    let fx = Fixture::new();
    fx.port("zlib", "");
    let ctx = fx.context();
    let pkg = ctx.package("zlib", &fx.config()).unwrap();

    let root = fx.install_root();
    let held = InstallLock::acquire(&root).unwrap();
    let err = pkg.install(true, None, true).unwrap_err();
    assert!(matches!(err, PortsError::Lock(LockError::Held { .. })));
    assert!(!pkg.is_any_version_installed().unwrap());

    drop(held);
    pkg.install(true, None, true).unwrap();
    assert!(pkg.is_installed().unwrap());
}

#[test]
fn test_install_locks_are_per_configuration() {
    let fx = Fixture::new();
    fx.port("zlib", "");
    let ctx = fx.context();
    let sdk = fx.sdk("49");

    let pnacl = Configuration::new(Some("pnacl"), None, false).unwrap();
    let glibc = Configuration::new(Some("x86_64"), Some("glibc"), false).unwrap();
    let pnacl_root = sdk.install_root(&pnacl).unwrap();
    assert_ne!(pnacl_root, fx.install_root());

    let _pnacl_lock = InstallLock::acquire(&pnacl_root).unwrap();
    let _glibc_lock = InstallLock::acquire(&sdk.install_root(&glibc).unwrap()).unwrap();

    // an install for another configuration proceeds while both are held
    let pkg = ctx.package("zlib", &fx.config()).unwrap();
    pkg.install(true, None, true).unwrap();
    assert!(pkg.is_installed().unwrap());

    let err = InstallLock::acquire(&pnacl_root).unwrap_err();
    assert!(matches!(err, LockError::Held { .. }));
}

#[test]
fn test_index_installability_and_prebuilt_install() {
    let fx = Fixture::new();
    fx.port("zlib", "");
    let config = fx.config();

    // build once to get a binary package, then move it into the mirror
    let archive = {
        let ctx = fx.context();
        let pkg = ctx.package("zlib", &config).unwrap();
        pkg.build(false, None).unwrap();
        let dest = fx.root().join("mirror").join(pkg.package_file().file_name().unwrap());
        fs::rename(pkg.package_file(), &dest).unwrap();
        dest
    };
    assert_eq!(fx.built.borrow().len(), 1);

    let index_file = fx.root().join("prebuilt.txt");
    let url = format!("https://example.com/packages/{}", archive.file_name().unwrap().to_string_lossy());
    let index: PackageIndex = write_index(&index_file, &[(archive.clone(), url)]).unwrap();
    assert!(index.installable("zlib", &config, &fx.sdk("49")).unwrap());
    assert!(!index.installable("zlib", &config, &fx.sdk("50")).unwrap());
    assert!(!index.installable("libpng", &config, &fx.sdk("49")).unwrap());

    let ctx = fx.context().with_index(index);
    let pkg = ctx.package("zlib", &config).unwrap();
    pkg.install(true, None, false).unwrap();

    // installed from the prebuilt, not rebuilt
    assert_eq!(fx.built.borrow().len(), 1);
    assert!(pkg.is_installed().unwrap());
    assert!(ctx.layout().prebuilt_root().join(archive.file_name().unwrap()).exists());
}

#[test]
fn test_binary_package_round_trip_install() {
    let fx = Fixture::new();
    let payload = fx.root().join("payload");
    fs::create_dir_all(payload.join("share/doc")).unwrap();
    fs::write(payload.join("share/doc/README"), "doc\n").unwrap();

    let info = "NAME=docs\nVERSION=2.0\nBUILD_CONFIG=release\nBUILD_ARCH=x86_64\n\
                BUILD_TOOLCHAIN=clang-newlib\nBUILD_SDK_VERSION=49\n";
    let file = fx.root().join("docs_2.0_x86-64_clang-newlib.tar.gz");
    BinaryPackage::create(&payload, info, &file).unwrap();

    let sdk = fx.sdk("49");
    let pkg = BinaryPackage::open(&file).unwrap();
    assert!(pkg.is_installable(&sdk).unwrap());
    pkg.install(&sdk, false).unwrap();

    let root = sdk.install_root(pkg.config()).unwrap();
    assert!(root.join("share/doc/README").exists());
    let err = pkg.install(&sdk, false).unwrap_err();
    assert!(err.to_string().contains("package already installed"));
}

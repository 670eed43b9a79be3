//! External commands: the per-port build script and helper tools.
//!
//! The native build of a port is opaque to the package manager. It runs a
//! [`BuildRunner`], by default [`ScriptRunner`] which executes
//! `build_tools/build_port.sh` in the port directory with the configuration
//! exported through the environment:
//!
//! | Variable        | Value                          |
//! |-----------------|--------------------------------|
//! | `TOOLCHAIN`     | toolchain name                 |
//! | `NACL_ARCH`     | target arch                    |
//! | `NACL_DEBUG`    | `1` or `0`                     |
//! | `NACL_SDK_ROOT` | SDK root                       |
//!
//! When a log file is given, stdout and stderr are both appended to it.

use crate::error::{BuildError, Result};
use log::{debug, trace};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// One invocation of the build command.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    /// Package name, for error messages
    pub package: &'a str,
    /// Port directory (working directory of the command)
    pub port_dir: &'a Path,
    /// Extra arguments
    pub args: &'a [String],
    /// Environment additions
    pub env: Vec<(String, String)>,
    /// Capture output into this file instead of the console
    pub log: Option<&'a Path>,
}

/// Runs the native build of a port.
pub trait BuildRunner {
    /// Run the build; non-zero exit is an error.
    fn run(&self, request: &BuildRequest<'_>) -> Result<()>;
}

/// Runs a build script (normally `build_tools/build_port.sh`).
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    script: PathBuf,
}

impl ScriptRunner {
    /// Runner for `script`.
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }

    /// Script path.
    pub fn script(&self) -> &Path {
        &self.script
    }
}

impl BuildRunner for ScriptRunner {
    fn run(&self, request: &BuildRequest<'_>) -> Result<()> {
        let mut cmd = Command::new(&self.script);
        cmd.args(request.args)
            .current_dir(request.port_dir)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        redirect(&mut cmd, request.log)?;

        debug!("running {} in {}", self.script.display(), request.port_dir.display());
        trace!("build env: {:?}", request.env);
        let status = cmd
            .status()
            .map_err(|_| BuildError::NotFound(self.script.display().to_string()))?;
        if !status.success() {
            debug!(
                "{} exited with {:?}",
                self.script.display(),
                status.code()
            );
            return Err(BuildError::PackageFailed {
                package: request.package.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn open_log(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Send stdout and stderr of `cmd` to the end of `log`, if any.
pub fn redirect(cmd: &mut Command, log: Option<&Path>) -> std::io::Result<()> {
    if let Some(log) = log {
        let out = open_log(log)?;
        let err = out.try_clone()?;
        cmd.stdout(Stdio::from(out)).stderr(Stdio::from(err));
    }
    Ok(())
}

/// Append `text` to `log`, if any.
pub fn append_log(log: Option<&Path>, text: &str) -> Result<()> {
    if let Some(log) = log {
        open_log(log)?.write_all(text.as_bytes())?;
    }
    Ok(())
}

/// Run a program to completion, failing on non-zero exit. Output goes to
/// `log` when given.
pub fn run_command(program: &str, args: &[&str], working_dir: &Path, log: Option<&Path>) -> Result<()> {
    trace!("{} {:?} (in {})", program, args, working_dir.display());
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(working_dir);
    redirect(&mut cmd, log)?;
    let status = cmd
        .status()
        .map_err(|_| BuildError::NotFound(program.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(BuildError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            code: status.code(),
        }
        .into())
    }
}

/// Run a program with stdout and stderr discarded; returns whether it
/// succeeded.
pub fn command_succeeds(program: &str, args: &[&str], working_dir: &Path) -> bool {
    Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run a program and capture its stdout.
pub fn command_output(program: &str, args: &[&str], working_dir: &Path) -> Result<String> {
    trace!("{} {:?} (in {})", program, args, working_dir.display());
    let output = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stderr(Stdio::inherit())
        .output()
        .map_err(|_| BuildError::NotFound(program.to_string()))?;
    if !output.status.success() {
        return Err(BuildError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            code: output.status.code(),
        }
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a program feeding `input` on stdin.
pub fn run_with_input(
    program: &str,
    args: &[&str],
    working_dir: &Path,
    input: File,
    log: Option<&Path>,
) -> Result<()> {
    trace!("{} {:?} < file (in {})", program, args, working_dir.display());
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(working_dir).stdin(Stdio::from(input));
    redirect(&mut cmd, log)?;
    let status = cmd
        .status()
        .map_err(|_| BuildError::NotFound(program.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(BuildError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            code: status.code(),
        }
        .into())
    }
}

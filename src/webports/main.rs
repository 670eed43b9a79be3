//! webports CLI - build, install and publish ports.
//!
//! # Commands
//!
//! - `list` / `info` - installed packages and their receipts
//! - `contents` / `uninstall` - operate on installed packages
//! - `depends` / `check` - inspect the dependency graph
//! - `download` / `extract` / `patch` / `build` / `install` - pipeline steps
//! - `clean` / `updatepatch` - maintenance
//! - `index` - write a prebuilt package index

mod cli;
mod commands;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, ColorMode, Commands};
use commands::{PkgAction, PkgOptions};
use log::{debug, info, trace};
use std::path::PathBuf;
use std::process::ExitCode;
use webports_lib::{Configuration, Context, Force, PortsError, Settings};

fn main() -> ExitCode {
    let mut cli = Cli::parse();

    if cli.verbose == 0 && std::env::var("VERBOSE").is_ok_and(|v| v == "1") {
        cli.verbose = 1;
    }

    // Initialize logging
    init_logging(cli.verbose, &cli.log_file);
    init_color(cli.color);

    info!("webports v{} starting", webports_lib::VERSION);
    trace!(
        "CLI args: arch={:?} toolchain={:?} debug={} all={}",
        cli.arch,
        cli.toolchain,
        cli.debug,
        cli.all
    );

    // Show help if no command
    let Some(command) = cli.command.take() else {
        print_usage();
        return ExitCode::SUCCESS;
    };

    // Commands that don't need a context
    if let Commands::Completions { shell } = command {
        return cmd_completions(shell);
    }
    if let Commands::Index {
        output,
        url_base,
        archives,
    } = &command
    {
        debug!("cmd: index output={} archives={}", output.display(), archives.len());
        return commands::cmd_index(output, url_base, archives);
    }

    // Build scripts only see VERBOSE when asked for
    if !cli.verbose_build {
        std::env::remove_var("VERBOSE");
        std::env::remove_var("V");
    }

    let ctx = match build_context(&cli) {
        Ok(ctx) => ctx,
        Err(e) => return commands::report(&e),
    };
    info!(
        "Loaded {} ports from {} locations",
        ctx.storage().count(),
        ctx.storage().locations().len()
    );

    if !cli.skip_sdk_version_check {
        if let Err(e) = ctx.sdk().check() {
            return commands::report(&e);
        }
    }

    let config = match Configuration::from_env(cli.arch.as_deref(), cli.toolchain.as_deref(), cli.debug) {
        Ok(c) => c,
        Err(e) => return commands::report(&PortsError::from(e)),
    };
    debug!("configuration: {}", config);

    let (action, args) = match command {
        Commands::List { json } => {
            debug!("cmd: list all={} json={}", cli.all, json);
            return commands::cmd_list(&ctx, &config, cli.all, cli.verbose > 0, json);
        }
        Commands::Info { package } => {
            debug!("cmd: info package={}", package);
            return commands::cmd_info(&ctx, &config, &package);
        }
        Commands::Contents(args) => (PkgAction::Contents, args),
        Commands::Depends(args) => (PkgAction::Depends, args),
        Commands::Download(args) => (PkgAction::Download, args),
        Commands::Check(args) => (PkgAction::Check, args),
        Commands::Build(args) => (PkgAction::Build, args),
        Commands::Install(args) => (PkgAction::Install, args),
        Commands::Uninstall(args) => (PkgAction::Uninstall, args),
        Commands::Clean(args) => (PkgAction::Clean, args),
        Commands::UpdatePatch(args) => (PkgAction::UpdatePatch, args),
        Commands::Extract(args) => (PkgAction::Extract, args),
        Commands::Patch(args) => (PkgAction::Patch, args),
        Commands::Index { .. } => unreachable!(),
        Commands::Completions { .. } => unreachable!(),
    };

    if cli.all && !args.packages.is_empty() {
        eprintln!("error: Package name(s) and --all cannot be specified together");
        return ExitCode::from(2);
    }

    let options = PkgOptions {
        all: cli.all,
        force: force_mode(&cli),
        build_deps: !cli.no_deps,
        from_source: cli.from_source,
        ignore_disabled: cli.ignore_disabled || cli.all,
        verbosity: cli.verbose,
    };
    debug!("cmd: {:?} packages={:?}", action, args.packages);
    commands::cmd_package(&ctx, &config, action, args.packages, &options)
}

/// `-F` wins over `-f`.
fn force_mode(cli: &Cli) -> Option<Force> {
    if cli.force_all {
        Some(Force::All)
    } else if cli.force {
        Some(Force::Build)
    } else {
        None
    }
}

/// Load settings and scan the ports tree.
fn build_context(cli: &Cli) -> webports_lib::Result<Context> {
    let settings = Settings::load(cli.config.as_deref())?;
    let ctx = Context::from_settings(settings)?
        .with_verbosity(cli.verbose)
        .with_verbose_build(cli.verbose_build);
    Ok(ctx)
}

/// Initialize logging based on verbosity and optional log file.
fn init_logging(verbosity: u8, log_file: &Option<Option<PathBuf>>) {
    use std::io::Write;

    let level = match verbosity {
        0 => log::LevelFilter::Warn,  // default: warnings only
        1 => log::LevelFilter::Info,  // -v: info
        2 => log::LevelFilter::Debug, // -vv: debug
        _ => log::LevelFilter::Trace, // -vvv: trace
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{} {}] {}",
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(maybe_path) = log_file {
        let log_path = match maybe_path {
            Some(p) => p.clone(),
            None => std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("webports.log")))
                .unwrap_or_else(|| PathBuf::from("webports.log")),
        };

        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
        {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
            eprintln!("Logging to: {}", log_path.display());
        }
    }

    builder.init();
}

fn init_color(mode: ColorMode) {
    match mode {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {}
    }
}

/// Print usage help.
fn print_usage() {
    if let Err(e) = Cli::command().print_long_help() {
        eprintln!("{}", e);
    }
}

/// Generate shell completions.
fn cmd_completions(shell: clap_complete::Shell) -> ExitCode {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "webports", &mut std::io::stdout());
    ExitCode::SUCCESS
}

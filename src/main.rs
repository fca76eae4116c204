use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

use clap::Parser;

use mkmk::cli::{Cli, Command, MakefileArgs};
use mkmk::config::MkmkConfig;
use mkmk::context::ConfigContext;
use mkmk::error::Error;
use mkmk::filehandle::FileHandle;
use mkmk::graph::toolchain::Toolchain;
use mkmk::nodespace::Environment;
use mkmk::settings::{Settings, Value};
use mkmk::system::{self, System};

fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        system::enable_verbose();
    }
    if cli.quiet {
        system::enable_quiet();
    }

    let result = match &cli.command {
        Command::Makefile(args) => run_makefile(&cli, args),
    };

    if let Err(err) = result {
        err.print();
        std::process::exit(1);
    }
}

/// Extensions the generator knows how to wire tool factories for.
const KNOWN_EXTENSIONS: &[&str] = &["c", "n", "toc", "test"];

fn run_makefile(cli: &Cli, args: &MakefileArgs) -> Result<(), Error> {
    for extension in &args.extensions {
        if !KNOWN_EXTENSIONS.contains(&extension.as_str()) {
            return Err(Error::UnknownExtension(extension.clone()));
        }
    }

    let config = MkmkConfig::from_path(&args.config)?;

    let system = System::from_str(&args.system)?;
    let settings = Settings::new_root(true);
    let toolchain = parse_buildflags(&args.buildflags, &settings)?;

    let root_dir = args
        .config
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let root_dir = dunce::canonicalize(&root_dir).unwrap_or(root_dir);
    let root = FileHandle::at(&root_dir, None);
    let bindir = FileHandle::at(&args.bindir, None);

    let previous = std::fs::read_to_string(&args.makefile).unwrap_or_default();
    let sticky_cache = mkmk::emit::load_sticky_cache(&previous);

    let env = Environment::new(system, toolchain, settings, cli.noisy, root.clone(), bindir.clone(), sticky_cache);
    let env = Rc::new(RefCell::new(env));
    let mut ctx = ConfigContext::root(env.clone(), root);

    build_from_config(&mut ctx, &config)?;

    let bindir_path = args.bindir.display().to_string();
    let makefile = mkmk::emit::write_makefile(&mut env.borrow_mut(), &bindir_path, cli.noisy)?;
    mkmk::system::write_file(&args.makefile, makefile)?;
    Ok(())
}

/// The default declarative driver for an `mkmk.toml` manifest: builds
/// one object per listed source and, if an executable name is given,
/// links them and optionally exposes an alias. Projects whose build
/// graph is richer than this (multiple toolchains, Neutrino modules,
/// custom exec steps) embed `mkmk` as a library and drive
/// `ConfigContext` directly instead of going through this manifest.
fn build_from_config(ctx: &mut ConfigContext, config: &MkmkConfig) -> Result<(), Error> {
    let executable = config.executable.as_ref().map(|name| ctx.get_executable(name));

    for source in &config.sources {
        let parts: Vec<&str> = source.split('/').collect();
        let src = ctx.get_source_file(&parts);
        let obj = ctx.get_object(src);
        if let Some(exe) = executable {
            ctx.add_object(exe, obj);
        }
    }

    if let (Some(exe), Some(alias)) = (executable, &config.alias) {
        ctx.add_alias(alias, exe);
    }

    Ok(())
}

fn parse_buildflags(raw: &str, settings: &Settings) -> Result<Toolchain, Error> {
    let mut toolchain = Toolchain::Gcc;
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "--toolchain" => {
                i += 1;
                toolchain = Toolchain::from_str(tokens.get(i).copied().unwrap_or("gcc"))?;
            }
            "--debug" => settings.add_sticky("debug", Value::Bool(true), false)?,
            "--valgrind" => settings.add_sticky("valgrind", Value::Bool(true), false)?,
            "--valgrind-flag" => {
                i += 1;
                let flag = tokens.get(i).copied().unwrap_or_default();
                settings.add_sticky("valgrind-flags", Value::List(vec![flag.to_string()]), true)?;
            }
            "--gprof" => settings.add_sticky("gprof", Value::Bool(true), false)?,
            "--warn" => settings.add_sticky("warn", Value::Bool(true), false)?,
            "--checks" => settings.add_sticky("checks", Value::Bool(true), false)?,
            "--fastcompile" => settings.add_sticky("fastcompile", Value::Bool(true), false)?,
            "" => {}
            other => return Err(Error::UnknownFlag(other.to_string())),
        }
        i += 1;
    }
    Ok(toolchain)
}

//! Command-line surface: a single `mkmk` binary with a `makefile`
//! subcommand, following the teacher's `clap`-derive `Options` style.

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "mkmk", about = "Generate a Makefile from a build script graph")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Print every shell command as it would actually run (no `@`
    /// silencing) in the generated Makefile.
    #[arg(long, global = true)]
    pub noisy: bool,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Evaluate the root build script and write a Makefile.
    Makefile(MakefileArgs),
}

#[derive(Debug, Args)]
pub struct MakefileArgs {
    /// Root build script to evaluate.
    #[arg(long)]
    pub config: std::path::PathBuf,

    /// Path of the Makefile to write.
    #[arg(long, default_value = "Makefile")]
    pub makefile: std::path::PathBuf,

    /// Output folder for built artifacts.
    #[arg(long, default_value = "out")]
    pub bindir: std::path::PathBuf,

    /// Extra toolchain/build flags, e.g. `"--toolchain msvc --debug"`.
    #[arg(long, default_value = "")]
    pub buildflags: String,

    /// Enabled extensions (repeatable): `c`, `py`, `n`, `test`, `toc`.
    #[arg(long = "extension")]
    pub extensions: Vec<String>,

    #[arg(long, default_value = "posix")]
    pub system: String,
}

//! Platform abstraction: per-OS synthesis of mkdir/rm/copy/tee/
//! env-prefixed shell command text, plus library auto-resolution.
//!
//! Modeled as the sum type the design notes call for (`{Posix,
//! Windows}`) with a shared `CommandBuilder`, rather than a trait
//! object hierarchy — there are exactly two platforms and no third
//! ever appears in a build script.

pub(crate) mod fs;
mod print;
mod process;

pub use fs::*;
pub(crate) use print::{error_color, hint_color, info_color, is_quiet, is_verbose, print_status_tag};
pub use print::{enable_quiet, enable_verbose};
pub(crate) use print::{errorln, hintln, infoln, verboseln};
pub use process::run_captured;

use crate::command::{shell_escape, Command};
use crate::error::Error;
use std::collections::BTreeMap;
use std::str::FromStr;

/// How an environment variable assignment composes with any existing
/// value of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvMode {
    /// Set-or-override.
    Replace,
    /// Prepend the new value, separated by the platform's path-list
    /// separator, ahead of the variable's current value.
    Append,
}

impl FromStr for EnvMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "replace" => Ok(EnvMode::Replace),
            "append" => Ok(EnvMode::Append),
            other => Err(Error::UnknownEnvMode(other.to_string())),
        }
    }
}

/// Per-platform command synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum System {
    Posix,
    Windows,
}

impl FromStr for System {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "posix" | "mac" => Ok(System::Posix),
            "windows" => Ok(System::Windows),
            other => Err(Error::UnknownSystem(other.to_string())),
        }
    }
}

impl System {
    /// Separator joining entries of a `PATH`-like variable.
    pub fn path_list_separator(self) -> char {
        match self {
            System::Posix => ':',
            System::Windows => ';',
        }
    }

    /// A command that creates `path` and all missing parents.
    pub fn ensure_folder(self, path: &str) -> Command {
        let escaped = shell_escape(path);
        match self {
            System::Posix => Command::new(format!("mkdir -p {escaped}")),
            System::Windows => Command::new(format!(
                "if not exist {escaped} mkdir {escaped}"
            )),
        }
    }

    /// A command that recursively removes `path`.
    pub fn clear_folder(self, path: &str) -> Command {
        let escaped = shell_escape(path);
        match self {
            System::Posix => Command::new(format!("rm -rf {escaped}")),
            System::Windows => Command::new(format!("rmdir /s /q {escaped}")),
        }
    }

    /// A command that copies `src` to `tgt`.
    pub fn copy(self, src: &str, tgt: &str) -> Command {
        let src = shell_escape(src);
        let tgt = shell_escape(tgt);
        match self {
            System::Posix => Command::new(format!("cp {src} {tgt}")),
            System::Windows => Command::new(format!("copy /y {src} {tgt}")),
        }
    }

    /// Wrap `cmd` so its combined stdout+stderr is captured to
    /// `outpath`, dumped, and the capture file removed on success,
    /// while the original exit status is preserved.
    ///
    /// Failure is signalled by touching `<outpath>.fail`; the wrapper
    /// always prints `outpath`'s contents, then removes both files and
    /// exits non-zero if the fail marker exists, or exits zero
    /// otherwise.
    pub fn safe_tee(self, cmd: &str, outpath: &str) -> String {
        let out = shell_escape(outpath);
        match self {
            System::Posix => format!(
                "( {cmd} > {out} 2>&1 || touch {out}.fail ); cat {out}; \
                 if [ -f {out}.fail ]; then rm -f {out} {out}.fail; exit 1; \
                 else rm -f {out}; exit 0; fi"
            ),
            System::Windows => format!(
                "({cmd} > {out} 2>&1 || type nul > {out}.fail) & type {out} & \
                 (if exist {out}.fail (del {out} {out}.fail & exit /b 1) \
                 else (del {out} & exit /b 0))"
            ),
        }
    }

    /// Prefix `cmd` with assignments for each `(name, value, mode)`
    /// binding. `Append` prepends `value` ahead of the variable's
    /// current expansion, joined with the platform's list separator.
    pub fn run_with_environment(self, cmd: &str, env: &[(String, String, EnvMode)]) -> String {
        if env.is_empty() {
            return cmd.to_string();
        }
        match self {
            System::Posix => {
                let sep = self.path_list_separator();
                let assigns = env
                    .iter()
                    .map(|(name, value, mode)| match mode {
                        EnvMode::Replace => format!("{name}={}", shell_escape(value)),
                        EnvMode::Append => {
                            format!("{name}={}{sep}$${name}", shell_escape(value))
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{assigns} {cmd}")
            }
            System::Windows => {
                let sep = self.path_list_separator();
                let assigns = env
                    .iter()
                    .map(|(name, value, mode)| match mode {
                        EnvMode::Replace => format!("set {name}={value}&"),
                        EnvMode::Append => {
                            format!("set {name}={value}{sep}%{name}%&")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{assigns} {cmd}")
            }
        }
    }

    /// Resolve a library by invoking `pkg-config --cflags --libs
    /// <name>` (POSIX only) and splitting `-I`/`-l` prefixed tokens
    /// into include paths and link libraries.
    pub fn autoresolve_library(self, name: &str) -> Result<(Vec<String>, Vec<String>), Error> {
        match self {
            System::Windows => Err(Error::UnregisteredPlatform(
                name.to_string(),
                "windows".to_string(),
            )),
            System::Posix => {
                which::which("pkg-config")
                    .map_err(|e| Error::SpawnChild("pkg-config".to_string(), std::io::Error::new(std::io::ErrorKind::NotFound, e)))?;
                hintln!("Resolve", "looking up `{name}` via pkg-config");
                let output = run_captured("pkg-config", ["--cflags", "--libs", name])?;
                let mut includes = Vec::new();
                let mut libs = Vec::new();
                for token in output.split_whitespace() {
                    if let Some(rest) = token.strip_prefix("-I") {
                        includes.push(rest.to_string());
                    } else if let Some(rest) = token.strip_prefix("-l") {
                        libs.push(rest.to_string());
                    }
                }
                Ok((includes, libs))
            }
        }
    }
}

/// Incrementally assembles a [`Command`] for a [`System`].
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    system: System,
    program: String,
    arguments: Vec<String>,
    comment: Option<String>,
    tee_destination: Option<String>,
    env: Vec<(String, String, EnvMode)>,
}

impl CommandBuilder {
    pub fn new(system: System, program: impl Into<String>) -> Self {
        Self {
            system,
            program: program.into(),
            arguments: Vec::new(),
            comment: None,
            tee_destination: None,
            env: Vec::new(),
        }
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) -> &mut Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn set_tee_destination(&mut self, path: impl Into<String>) -> &mut Self {
        self.tee_destination = Some(path.into());
        self
    }

    pub fn add_env(&mut self, name: impl Into<String>, value: impl Into<String>, mode: EnvMode) -> &mut Self {
        self.env.push((name.into(), value.into(), mode));
        self
    }

    pub fn add_arguments<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn build(&self) -> Command {
        let escaped_args = self
            .arguments
            .iter()
            .map(|a| shell_escape(a))
            .collect::<Vec<_>>()
            .join(" ");
        let raw = format!("{} {}", self.program, escaped_args)
            .trim_end()
            .to_string();
        let raw = self.system.run_with_environment(&raw, &self.env);
        let raw = match &self.tee_destination {
            Some(dest) => self.system.safe_tee(&raw, dest),
            None => raw,
        };
        let mut command = Command::new(raw);
        if let Some(comment) = &self.comment {
            command.set_comment(comment.clone());
        }
        command
    }
}

/// A named, per-platform library descriptor. Each platform maps to a
/// `LibraryInstance` that is either fully specified or resolved lazily
/// via `pkg-config` on first use.
#[derive(Debug, Clone, Default)]
pub struct LibraryInfo {
    platforms: BTreeMap<System, LibraryInstance>,
}

#[derive(Debug, Clone, Default)]
pub struct LibraryInstance {
    pub includes: Vec<String>,
    pub libs: Vec<String>,
    pub autoresolve_name: Option<String>,
    resolved: bool,
}

impl PartialOrd for System {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for System {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

impl LibraryInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_platform(&mut self, system: System, includes: Vec<String>, libs: Vec<String>, autoresolve: Option<String>) {
        self.platforms.insert(
            system,
            LibraryInstance {
                includes,
                libs,
                autoresolve_name: autoresolve,
                resolved: false,
            },
        );
    }

    /// Resolve the instance for `system`, running `pkg-config` the
    /// first time an autoresolve-backed instance is consulted.
    pub fn resolve(&mut self, system: System, name: &str) -> Result<(&[String], &[String]), Error> {
        let instance = self
            .platforms
            .get_mut(&system)
            .ok_or_else(|| Error::UnregisteredPlatform(name.to_string(), format!("{system:?}")))?;
        if !instance.resolved {
            if let Some(pkg) = instance.autoresolve_name.clone() {
                let (includes, libs) = system.autoresolve_library(&pkg)?;
                instance.includes.extend(includes);
                instance.libs.extend(libs);
            }
            instance.resolved = true;
        }
        Ok((&instance.includes, &instance.libs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_tee_includes_combined_stderr_redirect() {
        let wrapped = System::Posix.safe_tee("gcc -c a.c", "out/a.log");
        assert!(wrapped.contains("> out/a.log 2>&1"));
        assert!(wrapped.contains("cat out/a.log"));
    }

    #[test]
    fn run_with_environment_append_joins_on_separator() {
        let cmd = System::Posix.run_with_environment(
            "ld",
            &[("LD_LIBRARY_PATH".to_string(), "/opt/lib".to_string(), EnvMode::Append)],
        );
        assert_eq!(cmd, "LD_LIBRARY_PATH=/opt/lib:$$LD_LIBRARY_PATH ld");
    }

    #[test]
    fn run_with_environment_replace_overrides() {
        let cmd = System::Posix.run_with_environment(
            "ld",
            &[("FOO".to_string(), "bar".to_string(), EnvMode::Replace)],
        );
        assert_eq!(cmd, "FOO=bar ld");
    }

    #[test]
    fn command_builder_composes_env_args_and_tee() {
        let mut builder = CommandBuilder::new(System::Posix, "runner");
        builder.add_arguments(["--flag", "value"]);
        builder.add_env("FOO", "bar", EnvMode::Replace);
        builder.set_tee_destination("out/run.log");
        let cmd = builder.build();
        let rendered = cmd.parts().join(" ");
        assert!(rendered.contains("FOO=bar runner --flag value"));
        assert!(rendered.contains("2>&1"));
    }

    #[test]
    fn library_resolve_without_autoresolve_returns_fixed_values() {
        let mut info = LibraryInfo::new();
        info.add_platform(System::Posix, vec!["/p1".to_string()], vec!["g1".to_string()], None);
        let (includes, libs) = info.resolve(System::Posix, "fake").unwrap();
        assert_eq!(includes, &["/p1".to_string()]);
        assert_eq!(libs, &["g1".to_string()]);
    }

    #[test]
    fn library_resolve_unregistered_platform_errors() {
        let mut info = LibraryInfo::new();
        info.add_platform(System::Posix, Vec::new(), Vec::new(), None);
        assert!(info.resolve(System::Windows, "fake").is_err());
    }
}

//! Per-compiler flag, define, and link command synthesis for the two
//! supported toolchains.

use digest::Digest;
use md5::Md5;

use crate::command::Command;
use crate::settings::{ctx, Settings};
use crate::system::System;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolchain {
    Gcc,
    Msvc,
}

impl std::str::FromStr for Toolchain {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gcc" => Ok(Toolchain::Gcc),
            "msvc" => Ok(Toolchain::Msvc),
            other => Err(crate::error::Error::UnknownToolchain(other.to_string())),
        }
    }
}

/// Settings consulted while composing compile/link commands, resolved
/// once per compilation from the owning [`Settings`] scope.
#[derive(Debug, Clone, Default)]
pub struct BuildFlags {
    pub cflags: Vec<String>,
    pub warnings: Vec<String>,
    pub gcc48: bool,
    pub debug: bool,
    pub fastcompile: bool,
    pub debug_codegen: bool,
    pub checks: bool,
    pub expchecks: bool,
    pub fail_on_devutils: bool,
    pub gen_fileid: bool,
    pub gprof: bool,
    pub warn: bool,
    pub valgrind: bool,
    pub valgrind_flags: Vec<String>,
}

impl BuildFlags {
    /// Resolve every flag this toolchain cares about from `settings`,
    /// using `language` (`"c"` or `"c++"`) for the toolchain/language
    /// restriction tags.
    pub fn resolve(settings: &Settings, toolchain: Toolchain, language: &str) -> Self {
        let toolchain_name = match toolchain {
            Toolchain::Gcc => "gcc",
            Toolchain::Msvc => "msvc",
        };
        let c = ctx(&[("toolchain", toolchain_name), ("language", language)]);
        let debug = settings.get_bool("debug", &c, false);
        let explicit_debug_codegen = settings.get("debug-codegen", &c, false);
        let debug_codegen = match explicit_debug_codegen {
            Some(v) => v.as_bool(),
            None => debug,
        };
        Self {
            cflags: settings.get_list("cflags", &c),
            warnings: settings.get_list("warnings", &c),
            gcc48: settings.get_bool("gcc48", &c, false),
            debug,
            fastcompile: settings.get_bool("fastcompile", &c, false),
            debug_codegen,
            checks: settings.get_bool("checks", &c, false),
            expchecks: settings.get_bool("expchecks", &c, false),
            fail_on_devutils: settings.get_bool("fail-on-devutils", &c, false),
            gen_fileid: settings.get_bool("gen-fileid", &c, false),
            gprof: settings.get_bool("gprof", &c, false),
            warn: settings.get_bool("warn", &c, false),
            valgrind: settings.get_bool("valgrind", &c, false),
            valgrind_flags: settings.get_list("valgrind-flags", &c),
        }
    }
}

/// Last four hex digits of the MD5 of the concatenated basenames of
/// `inputs`, in the given order.
pub fn file_id(inputs: &[String]) -> String {
    let basenames: String = inputs
        .iter()
        .map(|p| {
            std::path::Path::new(p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect();
    let digest = Md5::digest(basenames.as_bytes());
    let hex = format!("{digest:x}");
    hex[hex.len() - 4..].to_string()
}

impl Toolchain {
    pub fn object_file_ext(self) -> &'static str {
        match self {
            Toolchain::Gcc => "o",
            Toolchain::Msvc => "obj",
        }
    }

    pub fn executable_file_ext(self) -> &'static str {
        match self {
            Toolchain::Gcc => "",
            Toolchain::Msvc => "exe",
        }
    }

    pub fn shared_library_file_ext(self) -> &'static str {
        match self {
            Toolchain::Gcc => "so",
            Toolchain::Msvc => "dll",
        }
    }

    pub fn message_resource_file_ext(self) -> &'static str {
        ""
    }

    /// Compose the object-compile command for a single source file.
    #[allow(clippy::too_many_arguments)]
    pub fn object_compile(
        self,
        output: &str,
        input: &str,
        include_paths: &[String],
        defines: &[(String, String)],
        is_cpp: bool,
        force_c: bool,
        flags: &BuildFlags,
        fileid_inputs: &[String],
    ) -> Command {
        match self {
            Toolchain::Gcc => self.gcc_object_compile(
                output,
                input,
                include_paths,
                defines,
                is_cpp,
                flags,
                fileid_inputs,
            ),
            Toolchain::Msvc => self.msvc_object_compile(
                output,
                input,
                include_paths,
                defines,
                force_c,
                flags,
                fileid_inputs,
            ),
        }
    }

    fn gcc_optimization_flags(&self, flags: &BuildFlags) -> Vec<String> {
        if flags.fastcompile {
            vec!["-O0".to_string()]
        } else if flags.debug {
            vec!["-g".to_string(), if flags.gcc48 { "-Og".to_string() } else { "-O1".to_string() }]
        } else {
            vec!["-O3".to_string()]
        }
    }

    fn gcc_cflags(&self, flags: &BuildFlags) -> Vec<String> {
        let mut cflags = flags.cflags.clone();

        for warning in &flags.warnings {
            cflags.push(format!("-W{warning}"));
        }
        if flags.gcc48 {
            cflags.push("-Wno-unused-local-typedefs".to_string());
        }

        cflags.extend(self.gcc_optimization_flags(flags));

        if flags.gprof {
            cflags.push("-pg".to_string());
        }
        if !flags.warn {
            cflags.push("-Werror".to_string());
        }
        cflags
    }

    fn gcc_defines(&self, defines: &[(String, String)], flags: &BuildFlags, fileid_inputs: &[String]) -> Vec<String> {
        let mut out: Vec<String> = defines.iter().map(|(k, v)| format!("-D{k}={v}")).collect();
        if flags.debug_codegen {
            out.push("-DDEBUG_CODEGEN=1".to_string());
        }
        if flags.checks {
            out.push("-DENABLE_CHECKS=1".to_string());
        }
        if flags.expchecks {
            out.push("-DEXPENSIVE_CHECKS=1".to_string());
        }
        if flags.fail_on_devutils {
            out.push("-DFAIL_ON_DEVUTILS=1".to_string());
        }
        if flags.gen_fileid {
            out.push(format!("-DFILE_ID=0x{}", file_id(fileid_inputs)));
        }
        out
    }

    fn gcc_object_compile(
        self,
        output: &str,
        input: &str,
        include_paths: &[String],
        defines: &[(String, String)],
        is_cpp: bool,
        flags: &BuildFlags,
        fileid_inputs: &[String],
    ) -> Command {
        let compiler = if is_cpp { "$(CXX)" } else { "$(CC)" };
        let mut parts = vec![compiler.to_string()];
        parts.extend(self.gcc_cflags(flags));
        parts.extend(self.gcc_defines(defines, flags, fileid_inputs));
        for path in include_paths {
            parts.push(format!("-I{path}"));
        }
        parts.push("-c".to_string());
        parts.push("-o".to_string());
        parts.push(output.to_string());
        parts.push(input.to_string());
        Command::new(parts.join(" "))
    }

    fn msvc_object_compile(
        self,
        output: &str,
        input: &str,
        include_paths: &[String],
        defines: &[(String, String)],
        force_c: bool,
        flags: &BuildFlags,
        fileid_inputs: &[String],
    ) -> Command {
        let mut parts = vec!["cl.exe".to_string(), "/nologo".to_string()];
        parts.extend(flags.cflags.iter().cloned());
        parts.push("/Wall".to_string());
        for warning in &flags.warnings {
            parts.push(format!("/w{warning}"));
        }
        parts.push(if flags.debug { "/Od".to_string() } else { "/Ox".to_string() });
        if flags.debug_codegen {
            parts.push("/Zi".to_string());
        }
        for (k, v) in defines {
            parts.push(format!("/D{k}={v}"));
        }
        if flags.gen_fileid {
            parts.push(format!("/DFILE_ID=0x{}", file_id(fileid_inputs)));
        }
        if !flags.warn {
            parts.push("/WX".to_string());
        }
        for path in include_paths {
            parts.push(format!("/I{path}"));
        }
        parts.push(if force_c {
            format!("/Tc{input}")
        } else {
            format!("/Tp{input}")
        });
        parts.push("/c".to_string());
        parts.push(format!("/Fo{output}"));
        if flags.debug {
            parts.push(format!("/Fd{output}.pdb"));
        }
        Command::new(parts.join(" "))
    }

    /// Compose the link command for an executable.
    pub fn link_executable(
        self,
        system: System,
        output: &str,
        inputs: &[String],
        libraries: &[String],
        flags: &BuildFlags,
    ) -> Command {
        match self {
            Toolchain::Gcc => {
                let mut parts = vec!["$(CXX)".to_string(), "-o".to_string(), output.to_string()];
                parts.push("-Wl,--start-group".to_string());
                parts.extend(inputs.iter().cloned());
                parts.push("-Wl,--end-group".to_string());
                parts.push("-rdynamic".to_string());
                parts.push("-lstdc++".to_string());
                parts.extend(self.gcc_optimization_flags(flags));
                if flags.gprof {
                    parts.push("-pg".to_string());
                }
                for lib in libraries {
                    parts.push(format!("-l{lib}"));
                }
                let _ = system;
                Command::new(parts.join(" "))
            }
            Toolchain::Msvc => {
                let mut parts = vec![
                    "link".to_string(),
                    format!("/OUT:{output}"),
                    "/DEBUG".to_string(),
                    format!("/PDB:{output}.pdb"),
                    "/SUBSYSTEM:CONSOLE".to_string(),
                ];
                parts.extend(inputs.iter().cloned());
                for lib in libraries {
                    parts.push(format!("{lib}.lib"));
                }
                Command::new(parts.join(" "))
            }
        }
    }

    pub fn link_shared_library(
        self,
        output: &str,
        inputs: &[String],
        libraries: &[String],
    ) -> Command {
        match self {
            Toolchain::Gcc => {
                let mut parts = vec![
                    "$(CXX)".to_string(),
                    "-shared".to_string(),
                    "-o".to_string(),
                    output.to_string(),
                ];
                parts.extend(inputs.iter().cloned());
                for lib in libraries {
                    parts.push(format!("-l{lib}"));
                }
                Command::new(parts.join(" "))
            }
            Toolchain::Msvc => {
                let mut parts = vec![
                    "link.exe".to_string(),
                    "/NOLOGO".to_string(),
                    "/DLL".to_string(),
                    format!("/OUT:{output}"),
                ];
                parts.extend(inputs.iter().cloned());
                for lib in libraries {
                    parts.push(format!("{lib}.lib"));
                }
                Command::new(parts.join(" "))
            }
        }
    }

    /// `touch <output>` under GCC (message resources are a no-op
    /// there); the two-stage `mc.exe`/`rc.exe` pipeline under MSVC.
    pub fn message_resource(self, output: &str, inputs: &[String]) -> Command {
        match self {
            Toolchain::Gcc => Command::new(format!("touch {output}")),
            Toolchain::Msvc => {
                let base = output.trim_end_matches(".res");
                Command::from_parts([
                    format!("mc.exe -z {base} {}", inputs.join(" ")),
                    format!("rc.exe /nologo /r {base}.rc"),
                ])
            }
        }
    }

    /// The executable's run command, optionally wrapped in valgrind.
    pub fn run_command(self, exe_path: &str, flags: &BuildFlags) -> Command {
        if flags.valgrind {
            let mut parts = vec![
                "valgrind".to_string(),
                "-q".to_string(),
                "--leak-check=full".to_string(),
                "--error-exitcode=1".to_string(),
            ];
            for flag in &flags.valgrind_flags {
                parts.push(format!("--{flag}"));
            }
            parts.push(exe_path.to_string());
            Command::new(parts.join(" "))
        } else {
            Command::new(exe_path.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcc_object_compile_has_expected_shape() {
        let flags = BuildFlags::default();
        let cmd = Toolchain::Gcc.gcc_object_compile(
            "out/a.c.o",
            "a.c",
            &[],
            &[],
            false,
            &flags,
            &[],
        );
        let rendered = cmd.parts().join(" ");
        assert!(rendered.contains("-c -o out/a.c.o a.c"));
        assert!(rendered.contains("-O3"));
        assert!(rendered.contains("-Werror"));
    }

    #[test]
    fn file_id_is_last_four_hex_of_md5() {
        let id = file_id(&["a.c".to_string()]);
        assert_eq!(id.len(), 4);
    }

    #[test]
    fn valgrind_wraps_run_command() {
        let mut flags = BuildFlags::default();
        flags.valgrind = true;
        flags.valgrind_flags = vec!["track-origins".to_string()];
        let cmd = Toolchain::Gcc.run_command("bin/app", &flags);
        assert_eq!(
            cmd.parts()[0],
            "valgrind -q --leak-check=full --error-exitcode=1 --track-origins bin/app"
        );
    }
}

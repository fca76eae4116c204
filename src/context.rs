//! The build-script scripting surface.
//!
//! Per the redesign decision recorded in DESIGN.md, build "scripts"
//! are ordinary Rust functions `fn(&mut ConfigContext) -> Result<(),
//! Error>` compiled into this crate, not a dynamically evaluated
//! language. `ConfigContext` exposes exactly the exported-surface
//! methods a script is allowed to call.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Error;
use crate::filehandle::FileHandle;
use crate::graph::node::{
    annotations, AnnotationValue, CSourceData, CopyData, CustomExecData, Edge, EnvPrinterData, ExecTestCaseData,
    ExecutableData, MessageResourceData, NLibraryData, NodeId, NodeKind, NProgramData, ObjectData, SharedLibraryData,
    SystemExecData, TocData,
};
use crate::name::Name;
use crate::nodespace::Environment;
use crate::system::{EnvMode, LibraryInfo, System};

/// A scoped view into an [`Environment`]: a home folder, a name
/// prefix, and (for dependency scripts) the nodespace they populate.
/// Cheap to clone for `include`/`include_dep` child scopes; all
/// clones share the same underlying `Environment`.
pub struct ConfigContext {
    env: Rc<RefCell<Environment>>,
    nodespace_prefix: Option<String>,
    home: FileHandle,
    prefix: Name,
}

impl ConfigContext {
    pub fn root(env: Rc<RefCell<Environment>>, home: FileHandle) -> Self {
        Self {
            env,
            nodespace_prefix: None,
            home,
            prefix: Name::root(),
        }
    }

    fn full_name(&self, last: &str) -> Name {
        self.prefix.append([last])
    }

    fn create<F>(&mut self, last: &str, make: F) -> NodeId
    where
        F: FnOnce(NodeId) -> (NodeKind, Vec<Edge>),
    {
        let name = Name::new([last]);
        let full = self.full_name(last);
        self.env
            .borrow_mut()
            .get_or_create_node(self.nodespace_prefix.as_deref(), name, full, make)
    }

    /// Load a subscript: `build` runs against a child context whose
    /// home is the parent folder of `rel_path` and whose name prefix
    /// is `self.prefix ++ all-but-last(rel_path)`.
    pub fn include<F>(&mut self, rel_path: &[&str], build: F) -> Result<(), Error>
    where
        F: FnOnce(&mut ConfigContext) -> Result<(), Error>,
    {
        let split = rel_path.len().saturating_sub(1);
        let (parents, _) = rel_path.split_at(split);
        let home = self.home.get_descendant(parents.iter().copied());
        let mut child = ConfigContext {
            env: self.env.clone(),
            nodespace_prefix: self.nodespace_prefix.clone(),
            home,
            prefix: self.prefix.append(parents.iter().map(|s| s.to_string())),
        };
        build(&mut child)
    }

    /// Load a subscript into a fresh nodespace registered under
    /// `dep_name`; a repeated `include_dep` of an already-registered
    /// dependency is a no-op.
    pub fn include_dep<F>(&mut self, dep_name: &str, root: FileHandle, output_folder: FileHandle, rel_path: &[&str], build: F) -> Result<(), Error>
    where
        F: FnOnce(&mut ConfigContext) -> Result<(), Error>,
    {
        if self.env.borrow().has_dep(dep_name) {
            return Ok(());
        }
        self.env.borrow_mut().dep_nodespace(dep_name, root.clone(), output_folder);
        let split = rel_path.len().saturating_sub(1);
        let (parents, _) = rel_path.split_at(split);
        let home = root.get_descendant(parents.iter().copied());
        let mut child = ConfigContext {
            env: self.env.clone(),
            nodespace_prefix: Some(dep_name.to_string()),
            home,
            prefix: Name::root().append(parents.iter().map(|s| s.to_string())),
        };
        build(&mut child)
    }

    pub fn get_group(&mut self, name: &str, members: &[NodeId]) -> NodeId {
        let edges: Vec<Edge> = members.iter().map(|m| Edge::new(*m, annotations(&[]))).collect();
        self.create(name, move |_| (NodeKind::Group, edges))
    }

    pub fn get_external(&self, path: &[&str]) -> Result<NodeId, Error> {
        let full = Name::new(path.iter().map(|s| s.to_string()));
        self.env
            .borrow()
            .lookup(self.nodespace_prefix.as_deref(), &full)
            .ok_or_else(|| Error::UnknownExternal(full.to_string()))
    }

    pub fn get_dep_external(&self, dep_name: &str, path: &[&str]) -> Result<NodeId, Error> {
        let full = Name::new(path.iter().map(|s| s.to_string()));
        self.env
            .borrow()
            .lookup(Some(dep_name), &full)
            .ok_or_else(|| Error::UnknownExternal(full.to_string()))
    }

    pub fn get_root(&self) -> FileHandle {
        self.env.borrow().root_nodespace().root.clone()
    }

    pub fn get_dep(&self, dep_name: &str) -> Result<FileHandle, Error> {
        self.env
            .borrow()
            .dep(dep_name)
            .map(|d| d.root.clone())
            .ok_or_else(|| Error::UnknownDep(dep_name.to_string()))
    }

    pub fn get_bindir(&self) -> FileHandle {
        self.env.borrow().root_nodespace().output_folder.clone()
    }

    pub fn get_file(&mut self, rel_path: &[&str]) -> NodeId {
        let handle = self.home.get_descendant(rel_path.iter().copied());
        let last = rel_path.last().copied().unwrap_or("");
        self.create(last, move |_| (NodeKind::File(handle), Vec::new()))
    }

    /// A source file ready to be compiled: `get_file` plus the empty
    /// `CSourceData` a caller wires up with `add_library`/defines
    /// before building an object node from it.
    pub fn get_source_file(&mut self, rel_path: &[&str]) -> NodeId {
        let handle = self.home.get_descendant(rel_path.iter().copied());
        let last = rel_path.last().copied().unwrap_or("");
        self.create(last, move |_| {
            (
                NodeKind::CSource(CSourceData {
                    handle,
                    local_includes: Vec::new(),
                    system_includes: Vec::new(),
                    defines: Vec::new(),
                    force_c: false,
                }),
                Vec::new(),
            )
        })
    }

    /// Wraps an already-created file node as a compilable source,
    /// e.g. a generated `.c` file produced by another node.
    pub fn wrap_source_file(&mut self, name: &str, file: NodeId) -> NodeId {
        let handle = self
            .env
            .borrow()
            .output_file(file)
            .expect("wrap_source_file requires a node with an output file");
        self.create(name, move |_| {
            (
                NodeKind::CSource(CSourceData {
                    handle,
                    local_includes: Vec::new(),
                    system_includes: Vec::new(),
                    defines: Vec::new(),
                    force_c: false,
                }),
                vec![Edge::new(file, annotations(&[("source", AnnotationValue::Bool(true))]))],
            )
        })
    }

    pub fn get_custom_exec_file(
        &mut self,
        name: &str,
        runner: NodeId,
        arguments: Vec<String>,
        env_bindings: Vec<(String, String, EnvMode)>,
        title: Option<String>,
        tee: bool,
    ) -> NodeId {
        let output_folder = self.get_bindir();
        let output = if tee { Some(output_folder.get_child(&format!("{name}.run"))) } else { None };
        self.create(name, move |_| {
            (
                NodeKind::CustomExec(CustomExecData {
                    output,
                    title,
                    env: env_bindings,
                    arguments,
                    tee,
                }),
                vec![Edge::new(runner, annotations(&[("runner", AnnotationValue::Bool(true))]))],
            )
        })
    }

    pub fn get_copy(&mut self, name: &str, source: NodeId, dest_rel_path: &[&str]) -> NodeId {
        let output = self.get_bindir().get_descendant(dest_rel_path.iter().copied());
        self.create(name, move |_| {
            (
                NodeKind::Copy(CopyData { output }),
                vec![Edge::new(source, annotations(&[("source", AnnotationValue::Bool(true))]))],
            )
        })
    }

    pub fn get_system_exec_file(&mut self, name: &str, command_line: String, env_bindings: Vec<(String, String, EnvMode)>) -> NodeId {
        let output_folder = self.get_bindir();
        let output = Some(output_folder.get_child(&format!("{name}.run")));
        self.create(name, move |_| {
            (
                NodeKind::SystemExec(SystemExecData {
                    output,
                    command_line,
                    env: env_bindings,
                }),
                Vec::new(),
            )
        })
    }

    /// A file that exists outside the source tree (e.g. an absolute
    /// system path), referenced without re-resolving relative to
    /// `home`.
    pub fn get_system_file(&mut self, name: &str, absolute_path: &std::path::Path) -> NodeId {
        let handle = FileHandle::at(absolute_path, None);
        self.create(name, move |_| (NodeKind::File(handle), Vec::new()))
    }

    pub fn get_exec_test_case(&mut self, name: &str, runner: NodeId) -> NodeId {
        let output_folder = self.get_bindir();
        let subject = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
        let output = output_folder.get_child(&format!("{subject}.run"));
        self.create(name, move |_| {
            (
                NodeKind::ExecTestCase(ExecTestCaseData { output }),
                vec![Edge::new(runner, annotations(&[("runner", AnnotationValue::Bool(true))]))],
            )
        })
    }

    pub fn add_alias(&mut self, name: &str, target: NodeId) -> NodeId {
        self.create(name, move |_| {
            (NodeKind::Alias, vec![Edge::new(target, annotations(&[]))])
        })
    }

    /// Ensure a [`LibraryInfo`] named `name` exists in the registry so
    /// a script can describe its platforms via `add_library_platform`
    /// before any object node resolves it.
    pub fn get_library_info(&mut self, name: &str) {
        let mut env = self.env.borrow_mut();
        if env.library(name).is_err() {
            env.register_library(name, LibraryInfo::new());
        }
    }

    pub fn add_library_platform(
        &mut self,
        name: &str,
        system: System,
        includes: Vec<String>,
        libs: Vec<String>,
        autoresolve: Option<String>,
    ) -> Result<(), Error> {
        self.env.borrow_mut().library(name)?.add_platform(system, includes, libs, autoresolve);
        Ok(())
    }

    /// The built-in `c` extension's tool factory, folded onto
    /// `ConfigContext` directly rather than bound dynamically through
    /// a per-extension ToolSet (the scripting-surface redesign already
    /// replaces dynamic binding with static Rust methods, so a second
    /// indirection here would buy nothing).
    pub fn get_object(&mut self, source: NodeId) -> NodeId {
        let toolchain = self.env.borrow().toolchain;
        let src_handle = self
            .env
            .borrow()
            .output_file(source)
            .expect("get_object requires a CSourceNode with a file");
        let stem = src_handle
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output_name = format!("{stem}.{}", toolchain.object_file_ext());
        let output = self.get_bindir().get_descendant(["obj", &output_name]);
        let node_name = format!("{stem}.o");
        self.create(&node_name, move |_| {
            (
                NodeKind::Object(ObjectData {
                    toolchain,
                    output,
                    libraries: Vec::new(),
                    extra_include_paths: Vec::new(),
                }),
                vec![Edge::new(source, annotations(&[("src", AnnotationValue::Bool(true))]))],
            )
        })
    }

    /// Force a source node to compile as C even if its toolchain
    /// command synthesis would otherwise infer C++ (MSVC's `/Tc` vs
    /// `/Tp` switch).
    pub fn set_force_c(&mut self, source: NodeId, force: bool) {
        let mut env = self.env.borrow_mut();
        if let NodeKind::CSource(data) = &mut env.node_mut(source).kind {
            data.force_c = force;
        }
    }

    /// Add `folder` (a node whose input files contribute to the
    /// include-search path) to a source's local include roots.
    pub fn add_local_include(&mut self, source: NodeId, folder: NodeId) {
        let mut env = self.env.borrow_mut();
        if let NodeKind::CSource(data) = &mut env.node_mut(source).kind {
            data.local_includes.push(folder);
        }
    }

    pub fn add_define(&mut self, source: NodeId, key: &str, value: &str) {
        let mut env = self.env.borrow_mut();
        if let NodeKind::CSource(data) = &mut env.node_mut(source).kind {
            data.defines.push((key.to_string(), value.to_string()));
        }
    }

    pub fn get_executable(&mut self, name: &str) -> NodeId {
        let toolchain = self.env.borrow().toolchain;
        let ext = toolchain.executable_file_ext();
        let filename = if ext.is_empty() { name.to_string() } else { format!("{name}.{ext}") };
        let output = self.get_bindir().get_child(&filename);
        self.create(name, move |_| {
            (NodeKind::Executable(ExecutableData { toolchain, output }), Vec::new())
        })
    }

    pub fn add_object(&mut self, executable: NodeId, object: NodeId) {
        self.env
            .borrow_mut()
            .add_edge(executable, Edge::new(object, annotations(&[("obj", AnnotationValue::Bool(true))])));
    }

    /// Resolve `name` for the active platform, contribute its include
    /// paths to `object`'s source node and its link libraries to
    /// `object` itself, per `ObjectNode.addLibrary`.
    pub fn add_library(&mut self, name: &str, object: NodeId) -> Result<Vec<String>, Error> {
        let system = self.env.borrow().system;
        let (includes, libs) = {
            let mut env = self.env.borrow_mut();
            let lib = env.library(name)?;
            let (includes, libs) = lib.resolve(system, name)?;
            (includes.to_vec(), libs.to_vec())
        };
        self.env.borrow_mut().apply_library_to_object(object, includes, libs.clone());
        Ok(libs)
    }

    /// An empty shared library, configured the same way as an
    /// executable (`add_object` for its object-edges) plus its own
    /// prebuilt-library set.
    pub fn get_shared_library(&mut self, name: &str) -> NodeId {
        let toolchain = self.env.borrow().toolchain;
        let ext = toolchain.shared_library_file_ext();
        let filename = if ext.is_empty() { name.to_string() } else { format!("{name}.{ext}") };
        let output = self.get_bindir().get_child(&filename);
        self.create(name, move |_| {
            (
                NodeKind::SharedLibrary(SharedLibraryData { toolchain, output, libraries: Vec::new() }),
                Vec::new(),
            )
        })
    }

    /// Add a prebuilt library (by link name, e.g. `"z"` for `-lz`) to
    /// a shared library's own link line, distinct from the libraries
    /// its object-edges pull in.
    pub fn add_shared_library_dependency(&mut self, shared_library: NodeId, lib: &str) {
        let mut env = self.env.borrow_mut();
        if let NodeKind::SharedLibrary(data) = &mut env.node_mut(shared_library).kind {
            data.libraries.push(lib.to_string());
        }
    }

    /// A message resource: `touch <output>` under GCC, the `mc.exe`/
    /// `rc.exe` pipeline under MSVC. Its inputs are plain source-edges.
    pub fn get_message_resource(&mut self, name: &str) -> NodeId {
        let toolchain = self.env.borrow().toolchain;
        let ext = toolchain.message_resource_file_ext();
        let filename = if ext.is_empty() { name.to_string() } else { format!("{name}.{ext}") };
        let output = self.get_bindir().get_child(&filename);
        self.create(name, move |_| {
            (NodeKind::MessageResource(MessageResourceData { toolchain, output }), Vec::new())
        })
    }

    pub fn add_message_resource_source(&mut self, resource: NodeId, source: NodeId) {
        self.env
            .borrow_mut()
            .add_edge(resource, Edge::new(source, annotations(&[("src", AnnotationValue::Bool(true))])));
    }

    /// A Neutrino library (`.nl`), built by invoking a compiler-edge
    /// node with the manifests wired through `add_nlibrary_manifest`.
    pub fn get_nlibrary(&mut self, name: &str) -> NodeId {
        let output = self.get_bindir().get_child(&format!("{name}.nl"));
        self.create(name, move |_| (NodeKind::NLibrary(NLibraryData { output }), Vec::new()))
    }

    /// A Neutrino program (`.np`), built from a single source plus its
    /// compiled module dependencies.
    pub fn get_nprogram(&mut self, name: &str) -> NodeId {
        let output = self.get_bindir().get_child(&format!("{name}.np"));
        self.create(name, move |_| (NodeKind::NProgram(NProgramData { output }), Vec::new()))
    }

    /// Designate `compiler`'s output as the Neutrino compiler
    /// executable a library or program is built with.
    pub fn set_neutrino_compiler(&mut self, binary: NodeId, compiler: NodeId) {
        self.env
            .borrow_mut()
            .add_edge(binary, Edge::new(compiler, annotations(&[("compiler", AnnotationValue::Bool(true))])));
    }

    pub fn add_nlibrary_manifest(&mut self, library: NodeId, manifest: NodeId) {
        self.env
            .borrow_mut()
            .add_edge(library, Edge::new(manifest, annotations(&[("manifest", AnnotationValue::Bool(true))])));
    }

    pub fn add_nprogram_source(&mut self, program: NodeId, source: NodeId) {
        self.env
            .borrow_mut()
            .add_edge(program, Edge::new(source, annotations(&[("src", AnnotationValue::Bool(true))])));
    }

    pub fn add_nprogram_module(&mut self, program: NodeId, module: NodeId) {
        self.env
            .borrow_mut()
            .add_edge(program, Edge::new(module, annotations(&[("module", AnnotationValue::Bool(true))])));
    }

    /// A table-of-contents file: `<generator> <test1> <test2> … >
    /// <output>`, wired through `set_toc_generator`/`add_toc_test`.
    pub fn get_toc(&mut self, name: &str) -> NodeId {
        let output = self.get_bindir().get_child(name);
        self.create(name, move |_| (NodeKind::Toc(TocData { output }), Vec::new()))
    }

    pub fn set_toc_generator(&mut self, toc: NodeId, generator: NodeId) {
        self.env
            .borrow_mut()
            .add_edge(toc, Edge::new(generator, annotations(&[("generator", AnnotationValue::Bool(true))])));
    }

    pub fn add_toc_test(&mut self, toc: NodeId, test: NodeId) {
        self.env
            .borrow_mut()
            .add_edge(toc, Edge::new(test, annotations(&[("test", AnnotationValue::Bool(true))])));
    }

    /// A node whose recipe just echoes `key=value` for each binding,
    /// e.g. to let a dependent Makefile inspect the resolved toolchain
    /// environment without re-running the generator.
    pub fn get_env_printer(&mut self, name: &str, bindings: Vec<(String, String)>) -> NodeId {
        let output = self.get_bindir().get_child(&format!("{name}.env"));
        self.create(name, move |_| {
            (NodeKind::EnvPrinter(EnvPrinterData { output, bindings }), Vec::new())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filehandle::StickyCache;
    use crate::graph::toolchain::Toolchain;
    use crate::settings::Settings;
    use crate::system::System;

    fn root_context(dir: &std::path::Path, toolchain: Toolchain, system: System) -> (Rc<RefCell<Environment>>, ConfigContext) {
        let root = FileHandle::at(dir, None);
        let outdir = root.get_child("out");
        let env = Environment::new(system, toolchain, Settings::new_root(true), false, root.clone(), outdir, StickyCache::new());
        let env = Rc::new(RefCell::new(env));
        let ctx = ConfigContext::root(env.clone(), root);
        (env, ctx)
    }

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("mkmk-context-test").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn shared_library_links_its_objects_and_prebuilt_libs() {
        let dir = scratch_dir("shared-library");
        std::fs::write(dir.join("a.c"), "int f(){return 0;}\n").unwrap();

        let (env, mut ctx) = root_context(&dir, Toolchain::Gcc, System::Posix);
        let src = ctx.get_source_file(&["a.c"]);
        let obj = ctx.get_object(src);
        let lib = ctx.get_shared_library("libfoo");
        ctx.add_object(lib, obj);
        ctx.add_shared_library_dependency(lib, "z");

        let cmd = env.borrow_mut().command_line(lib).unwrap().unwrap();
        let rendered = cmd.parts().join(" ");
        assert!(rendered.contains("-shared"));
        assert!(rendered.contains("a.c.o"));
        assert!(rendered.contains("-lz"));
    }

    #[test]
    fn message_resource_is_a_touch_under_gcc() {
        let dir = scratch_dir("message-resource");
        std::fs::write(dir.join("a.rc"), "// resource\n").unwrap();

        let (env, mut ctx) = root_context(&dir, Toolchain::Gcc, System::Posix);
        let src = ctx.get_file(&["a.rc"]);
        let resource = ctx.get_message_resource("a");
        ctx.add_message_resource_source(resource, src);

        let cmd = env.borrow_mut().command_line(resource).unwrap().unwrap();
        assert!(cmd.parts().join(" ").starts_with("touch "));
    }

    #[test]
    fn nlibrary_and_nprogram_invoke_the_compiler_with_their_arguments() {
        let dir = scratch_dir("neutrino");
        std::fs::write(dir.join("compiler"), "").unwrap();
        std::fs::write(dir.join("lib.manifest"), "").unwrap();
        std::fs::write(dir.join("main.n"), "").unwrap();
        std::fs::write(dir.join("mod.nl"), "").unwrap();

        let (env, mut ctx) = root_context(&dir, Toolchain::Gcc, System::Posix);
        let compiler = ctx.get_file(&["compiler"]);

        let manifest = ctx.get_file(&["lib.manifest"]);
        let library = ctx.get_nlibrary("mylib");
        ctx.set_neutrino_compiler(library, compiler);
        ctx.add_nlibrary_manifest(library, manifest);
        let lib_cmd = env.borrow_mut().command_line(library).unwrap().unwrap();
        let lib_rendered = lib_cmd.parts().join(" ");
        assert!(lib_rendered.contains("--build_library"));
        assert!(lib_rendered.contains("lib.manifest"));
        assert!(lib_rendered.contains("mylib.nl"));

        let source = ctx.get_file(&["main.n"]);
        let module = ctx.get_file(&["mod.nl"]);
        let program = ctx.get_nprogram("myprogram");
        ctx.set_neutrino_compiler(program, compiler);
        ctx.add_nprogram_source(program, source);
        ctx.add_nprogram_module(program, module);
        let prog_cmd = env.borrow_mut().command_line(program).unwrap().unwrap();
        let prog_rendered = prog_cmd.parts().join(" ");
        assert!(prog_rendered.contains("--files"));
        assert!(prog_rendered.contains("main.n"));
        assert!(prog_rendered.contains("mod.nl"));
        assert!(prog_rendered.contains("myprogram.np"));
    }

    #[test]
    fn toc_concatenates_generator_output_over_its_tests() {
        let dir = scratch_dir("toc");
        std::fs::write(dir.join("gen"), "").unwrap();
        std::fs::write(dir.join("a.test"), "").unwrap();
        std::fs::write(dir.join("b.test"), "").unwrap();

        let (env, mut ctx) = root_context(&dir, Toolchain::Gcc, System::Posix);
        let generator = ctx.get_file(&["gen"]);
        let a = ctx.get_file(&["a.test"]);
        let b = ctx.get_file(&["b.test"]);
        let toc = ctx.get_toc("toc.h");
        ctx.set_toc_generator(toc, generator);
        ctx.add_toc_test(toc, a);
        ctx.add_toc_test(toc, b);

        let cmd = env.borrow_mut().command_line(toc).unwrap().unwrap();
        let rendered = cmd.parts().join(" ");
        assert!(rendered.contains("a.test"));
        assert!(rendered.contains("b.test"));
        assert!(rendered.trim_end().ends_with("toc.h"));
    }

    #[test]
    fn env_printer_renders_one_assignment_per_line() {
        let dir = scratch_dir("env-printer");
        let (env, mut ctx) = root_context(&dir, Toolchain::Gcc, System::Posix);
        let printer = ctx.get_env_printer("vars", vec![("CC".to_string(), "gcc".to_string())]);

        let cmd = env.borrow_mut().command_line(printer).unwrap().unwrap();
        assert_eq!(cmd.parts(), &["CC=gcc".to_string()]);
    }
}

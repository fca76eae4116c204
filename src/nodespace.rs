//! The node arena and its per-dependency registries, plus the
//! capability-set dispatch (`Environment::output_file`,
//! `command_line`, `is_phony`, `computed_dependencies`,
//! `flat_edges_through`) that stands in for the polymorphic node
//! hierarchy a deep-inheritance design would use.

use std::collections::HashMap;

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::command::Command;
use crate::error::Error;
use crate::filehandle::FileHandle;
use crate::graph::csource;
use crate::graph::node::{annotations, AnnotationValue, Annotations, Edge, NodeEntry, NodeId, NodeKind};
use crate::graph::toolchain::{BuildFlags, Toolchain};
use crate::name::Name;
use crate::settings::Settings;
use crate::system::{CommandBuilder, LibraryInfo, System};

/// Per-dependency node registry: a prefix (`None` for the root), the
/// dependency's root folder, and its output folder.
pub struct Nodespace {
    pub prefix: Option<String>,
    pub root: FileHandle,
    pub output_folder: FileHandle,
}

impl Nodespace {
    pub fn new(prefix: Option<String>, root: FileHandle, output_folder: FileHandle) -> Self {
        Self { prefix, root, output_folder }
    }
}

/// Owns the global node arena, the per-dependency nodespaces, the
/// chosen platform and toolchain, the settings tree root, the library
/// registry, and the sticky-attribute cache. One instance per
/// invocation; nothing here is process-wide static state.
pub struct Environment {
    pub system: System,
    pub toolchain: Toolchain,
    pub settings: Settings,
    pub noisy: bool,
    nodes: Vec<NodeEntry>,
    name_index: FxHashMap<(Option<String>, Name), NodeId>,
    nodespaces: HashMap<String, Nodespace>,
    root_nodespace: Nodespace,
    libraries: HashMap<String, LibraryInfo>,
    pub sticky_cache: crate::filehandle::StickyCache,
}

impl Environment {
    pub fn new(
        system: System,
        toolchain: Toolchain,
        settings: Settings,
        noisy: bool,
        root: FileHandle,
        output_folder: FileHandle,
        sticky_cache: crate::filehandle::StickyCache,
    ) -> Self {
        Self {
            system,
            toolchain,
            settings,
            noisy,
            nodes: Vec::new(),
            name_index: FxHashMap::default(),
            nodespaces: HashMap::new(),
            root_nodespace: Nodespace::new(None, root, output_folder),
            libraries: HashMap::new(),
            sticky_cache,
        }
    }

    pub fn root_nodespace(&self) -> &Nodespace {
        &self.root_nodespace
    }

    /// Register a dependency's nodespace under `name`; a repeated call
    /// with the same name is a no-op and returns the existing one.
    pub fn dep_nodespace(&mut self, name: &str, root: FileHandle, output_folder: FileHandle) -> &Nodespace {
        self.nodespaces
            .entry(name.to_string())
            .or_insert_with(|| Nodespace::new(Some(name.to_string()), root, output_folder))
    }

    pub fn has_dep(&self, name: &str) -> bool {
        self.nodespaces.contains_key(name)
    }

    pub fn dep(&self, name: &str) -> Option<&Nodespace> {
        self.nodespaces.get(name)
    }

    pub fn lookup(&self, prefix: Option<&str>, full_name: &Name) -> Option<NodeId> {
        self.name_index
            .get(&(prefix.map(str::to_string), full_name.clone()))
            .copied()
    }

    pub fn register_library(&mut self, name: &str, info: LibraryInfo) {
        self.libraries.insert(name.to_string(), info);
    }

    pub fn library(&mut self, name: &str) -> Result<&mut LibraryInfo, Error> {
        self.libraries
            .get_mut(name)
            .ok_or_else(|| Error::UnknownLibrary(name.to_string()))
    }

    pub fn node(&self, id: NodeId) -> &NodeEntry {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut NodeEntry {
        &mut self.nodes[id.0]
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn add_edge(&mut self, id: NodeId, edge: Edge) {
        self.nodes[id.0].edges.push(edge);
    }

    /// Create a node under `(prefix, full_name)`, or return the
    /// existing one if this exact (nodespace, name) pair was already
    /// registered. `make` is not invoked on a cache hit, so subsequent
    /// construction arguments are ignored as the uniqueness invariant
    /// requires.
    pub fn get_or_create_node<F>(&mut self, prefix: Option<&str>, name: Name, full_name: Name, make: F) -> NodeId
    where
        F: FnOnce(NodeId) -> (NodeKind, Vec<Edge>),
    {
        let key = (prefix.map(str::to_string), full_name.clone());
        if let Some(&id) = self.name_index.get(&key) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeEntry {
            name: name.clone(),
            full_name: full_name.clone(),
            edges: Vec::new(),
            kind: NodeKind::Group,
        });
        let (kind, edges) = make(id);
        self.nodes[id.0].kind = kind;
        self.nodes[id.0].edges = edges;
        self.name_index.insert(key, id);
        id
    }

    /// The file this node materializes to, if any (used both as the
    /// Makefile target path and as another node's input path).
    pub fn output_file(&self, id: NodeId) -> Option<FileHandle> {
        match &self.node(id).kind {
            NodeKind::File(h) => Some(h.clone()),
            NodeKind::CSource(d) => Some(d.handle.clone()),
            NodeKind::Object(d) => Some(d.output.clone()),
            NodeKind::Executable(d) => Some(d.output.clone()),
            NodeKind::SharedLibrary(d) => Some(d.output.clone()),
            NodeKind::MessageResource(d) => Some(d.output.clone()),
            NodeKind::NLibrary(d) => Some(d.output.clone()),
            NodeKind::NProgram(d) => Some(d.output.clone()),
            NodeKind::Toc(d) => Some(d.output.clone()),
            NodeKind::Copy(d) => Some(d.output.clone()),
            NodeKind::CustomExec(d) => d.output.clone(),
            NodeKind::SystemExec(d) => d.output.clone(),
            NodeKind::EnvPrinter(d) => Some(d.output.clone()),
            NodeKind::ExecTestCase(d) => Some(d.output.clone()),
            NodeKind::Group | NodeKind::Alias => None,
        }
    }

    /// The Makefile target string: the output file's path for
    /// physical nodes, or the dotted full name for an alias's phony
    /// target. `None` means this node emits no target at all — groups,
    /// and `File`/`CSource` nodes, which are pass-throughs onto a
    /// pre-existing file rather than artifacts the Makefile builds.
    pub fn output_target(&self, id: NodeId) -> Option<String> {
        match &self.node(id).kind {
            NodeKind::Alias => Some(self.node(id).full_name.to_string()),
            NodeKind::Group | NodeKind::File(_) | NodeKind::CSource(_) => None,
            _ => self.output_file(id).map(|h| h.path().display().to_string()),
        }
    }

    pub fn is_phony(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Alias)
    }

    /// Files this node contributes to an include- or library-search
    /// path: itself if it is (or wraps) a file, the union of its
    /// members if it is a group/alias, otherwise its own output file.
    pub fn input_files(&self, id: NodeId) -> Vec<FileHandle> {
        match &self.node(id).kind {
            NodeKind::File(h) => vec![h.clone()],
            NodeKind::Group | NodeKind::Alias => self
                .node(id)
                .edges
                .iter()
                .flat_map(|e| self.input_files(e.target))
                .collect(),
            _ => self.output_file(id).into_iter().collect(),
        }
    }

    /// Expand `edge` transparently through any group/alias it points
    /// at, keeping only members whose edge matches `annots` at every
    /// level of the expansion.
    pub fn flat_edges_through(&self, edge: &Edge, annots: &Annotations) -> Vec<NodeId> {
        if !edge.has_annotations(annots) {
            return Vec::new();
        }
        match &self.node(edge.target).kind {
            NodeKind::Group | NodeKind::Alias => self
                .node(edge.target)
                .edges
                .iter()
                .flat_map(|e| self.flat_edges_through(e, annots))
                .collect(),
            _ => vec![edge.target],
        }
    }

    pub fn edges_matching(&self, id: NodeId, annots: &Annotations) -> Vec<NodeId> {
        self.node(id)
            .edges
            .iter()
            .flat_map(|e| self.flat_edges_through(e, annots))
            .collect()
    }

    fn edge_target(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        self.edges_matching(id, &tag_true(tag)).into_iter().next()
    }

    /// Contribute `includes` to the object's source node and `libs` to
    /// the object's own link-library set, per `ObjectNode.addLibrary`.
    pub fn apply_library_to_object(&mut self, object_id: NodeId, includes: Vec<String>, libs: Vec<String>) {
        if let Some(src_id) = self.edge_target(object_id, "src") {
            if let NodeKind::CSource(data) = &mut self.node_mut(src_id).kind {
                data.system_includes.extend(includes);
            }
        }
        if let NodeKind::Object(data) = &mut self.node_mut(object_id).kind {
            data.libraries.extend(libs);
        }
    }

    /// Direct input paths for the Makefile target: every edge,
    /// flattened through groups, contributing its target's output
    /// file path. Unordered; the emitter sorts and dedups.
    pub fn direct_input_paths(&self, id: NodeId) -> Vec<String> {
        self.edges_matching(id, &Annotations::new())
            .into_iter()
            .filter_map(|target| self.output_file(target).map(|h| h.path().display().to_string()))
            .collect()
    }

    /// Extra (non-edge) dependencies, e.g. an object's transitive
    /// headers. Empty for every node kind that has none.
    pub fn computed_dependencies(&mut self, id: NodeId) -> Result<Vec<String>, Error> {
        match self.node(id).kind.clone() {
            NodeKind::Object(_) => {
                let src = self
                    .edge_target(id, "src")
                    .expect("ObjectNode always owns exactly one src edge");
                self.transitive_headers(src)
            }
            _ => Ok(Vec::new()),
        }
    }

    fn transitive_headers(&mut self, csource_id: NodeId) -> Result<Vec<String>, Error> {
        let data = match &self.node(csource_id).kind {
            NodeKind::CSource(d) => d.clone(),
            _ => return Ok(Vec::new()),
        };
        let mut folders = vec![data.handle.parent().unwrap_or_else(|| data.handle.clone())];
        let mut extra: Vec<FileHandle> = data
            .local_includes
            .iter()
            .flat_map(|n| self.input_files(*n))
            .collect();
        extra.sort_by_key(|h| h.path());
        folders.extend(extra);
        let headers = csource::resolve_transitive_headers(&data.handle, &folders, &mut self.sticky_cache)?;
        Ok(headers.into_iter().map(|h| h.path().display().to_string()).collect())
    }

    /// The recipe for this node's target, or `None` for nodes that
    /// emit no command (files, groups, aliases, raw source nodes).
    pub fn command_line(&mut self, id: NodeId) -> Result<Option<Command>, Error> {
        match self.node(id).kind.clone() {
            NodeKind::Object(data) => {
                let src_id = self
                    .edge_target(id, "src")
                    .expect("ObjectNode always owns exactly one src edge");
                let src = match &self.node(src_id).kind {
                    NodeKind::CSource(d) => d.clone(),
                    _ => unreachable!("src edge of an ObjectNode always targets a CSourceNode"),
                };
                let is_cpp = src
                    .handle
                    .path()
                    .extension()
                    .map(|e| e == "cc")
                    .unwrap_or(false);
                let language = if is_cpp { "c++" } else { "c" };
                let flags = BuildFlags::resolve(&self.settings, data.toolchain, language);

                let mut include_paths = data.extra_include_paths.clone();
                include_paths.extend(src.system_includes.clone());

                let fileid_inputs = vec![src.handle.path().display().to_string()];
                let cmd = data.toolchain.object_compile(
                    &data.output.path().display().to_string(),
                    &src.handle.path().display().to_string(),
                    &include_paths,
                    &src.defines,
                    is_cpp,
                    src.force_c,
                    &flags,
                    &fileid_inputs,
                );
                Ok(Some(cmd))
            }
            NodeKind::Executable(data) => {
                let mut inputs: Vec<String> = self
                    .edges_matching(id, &tag_true("obj"))
                    .into_iter()
                    .filter_map(|t| self.output_file(t).map(|h| h.path().display().to_string()))
                    .collect();
                inputs.sort();
                inputs.dedup();
                let libraries = self.objects_libraries(id);
                let flags = BuildFlags::resolve(&self.settings, data.toolchain, "c++");
                Ok(Some(data.toolchain.link_executable(
                    self.system,
                    &data.output.path().display().to_string(),
                    &inputs,
                    &libraries,
                    &flags,
                )))
            }
            NodeKind::SharedLibrary(data) => {
                let mut inputs: Vec<String> = self
                    .edges_matching(id, &tag_true("obj"))
                    .into_iter()
                    .filter_map(|t| self.output_file(t).map(|h| h.path().display().to_string()))
                    .collect();
                inputs.sort();
                inputs.dedup();
                let mut libraries = self.objects_libraries(id);
                libraries.extend(data.libraries.clone());
                Ok(Some(data.toolchain.link_shared_library(
                    &data.output.path().display().to_string(),
                    &inputs,
                    &libraries,
                )))
            }
            NodeKind::MessageResource(data) => {
                let inputs = self.direct_input_paths(id);
                Ok(Some(data.toolchain.message_resource(
                    &data.output.path().display().to_string(),
                    &inputs,
                )))
            }
            NodeKind::NLibrary(data) => {
                let manifests = self.named_inputs(id, "manifest");
                let args = nlibrary_arguments(&data.output.path().display().to_string(), &manifests);
                self.compiler_command(id, &args)
            }
            NodeKind::NProgram(data) => {
                let srcs = self.named_inputs(id, "src");
                let modules = self.named_inputs(id, "module");
                let args = nprogram_arguments(&srcs, &data.output.path().display().to_string(), &modules);
                self.compiler_command(id, &args)
            }
            NodeKind::Toc(data) => {
                let generator = self
                    .edge_target(id, "generator")
                    .and_then(|t| self.output_file(t))
                    .map(|h| h.path().display().to_string())
                    .unwrap_or_default();
                let inputs = self.named_inputs(id, "test");
                let mut parts = vec![generator];
                parts.extend(inputs);
                parts.push(">".to_string());
                parts.push(data.output.path().display().to_string());
                Ok(Some(Command::new(parts.join(" "))))
            }
            NodeKind::Copy(data) => {
                let source = self
                    .edge_target(id, "source")
                    .and_then(|t| self.output_file(t))
                    .map(|h| h.path().display().to_string())
                    .unwrap_or_default();
                Ok(Some(self.system.copy(&source, &data.output.path().display().to_string())))
            }
            NodeKind::CustomExec(data) => {
                let runner_id = self.edge_target(id, "runner");
                let runner = runner_id.map(|t| self.runner_command(t)).unwrap_or_default();
                let mut builder = CommandBuilder::new(self.system, runner);
                builder.add_arguments(data.arguments.clone());
                for (name, value, mode) in &data.env {
                    builder.add_env(name.clone(), value.clone(), *mode);
                }
                if let Some(title) = &data.title {
                    builder.set_comment(title.clone());
                }
                if data.tee {
                    if let Some(out) = &data.output {
                        builder.set_tee_destination(out.path().display().to_string());
                    }
                }
                Ok(Some(builder.build()))
            }
            NodeKind::SystemExec(data) => {
                let mut builder = CommandBuilder::new(self.system, data.command_line.clone());
                for (name, value, mode) in &data.env {
                    builder.add_env(name.clone(), value.clone(), *mode);
                }
                Ok(Some(builder.build()))
            }
            NodeKind::EnvPrinter(data) => {
                let lines: Vec<String> = data
                    .bindings
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                Ok(Some(Command::from_parts(lines)))
            }
            NodeKind::ExecTestCase(_) => {
                let runner_id = self.edge_target(id, "runner");
                let runner = runner_id.map(|t| self.runner_command(t)).unwrap_or_default();
                let output = self.output_file(id).map(|h| h.path().display().to_string());
                let mut builder = CommandBuilder::new(self.system, runner);
                if let Some(out) = output {
                    builder.set_tee_destination(out);
                }
                Ok(Some(builder.build()))
            }
            NodeKind::File(_)
            | NodeKind::CSource(_)
            | NodeKind::Group
            | NodeKind::Alias => Ok(None),
        }
    }

    /// The command line used to *run* `id` rather than build it: for an
    /// executable, the toolchain's run command, optionally wrapped in
    /// valgrind; for anything else, just its output path.
    fn runner_command(&mut self, id: NodeId) -> String {
        let path = self.output_file(id).map(|h| h.path().display().to_string()).unwrap_or_default();
        match &self.node(id).kind {
            NodeKind::Executable(data) => {
                let toolchain = data.toolchain;
                let flags = BuildFlags::resolve(&self.settings, toolchain, "c++");
                toolchain.run_command(&path, &flags).parts().join(" ")
            }
            _ => path,
        }
    }

    fn compiler_command(&mut self, id: NodeId, args: &[String]) -> Result<Option<Command>, Error> {
        let program = self
            .edge_target(id, "compiler")
            .and_then(|t| self.output_file(t))
            .map(|h| h.path().display().to_string())
            .unwrap_or_default();
        let mut builder = CommandBuilder::new(self.system, program);
        builder.add_arguments(args.to_vec());
        Ok(Some(builder.build()))
    }

    fn named_inputs(&self, id: NodeId, tag: &str) -> Vec<String> {
        self.edges_matching(id, &tag_true(tag))
            .into_iter()
            .filter_map(|t| self.output_file(t).map(|h| h.path().display().to_string()))
            .collect()
    }

    fn objects_libraries(&self, id: NodeId) -> Vec<String> {
        self.edges_matching(id, &tag_true("obj"))
            .into_iter()
            .flat_map(|obj| match &self.node(obj).kind {
                NodeKind::Object(d) => d.libraries.clone(),
                _ => Vec::new(),
            })
            .sorted()
            .dedup()
            .collect()
    }
}

fn tag_true(tag: &str) -> Annotations {
    annotations(&[(tag, AnnotationValue::Bool(true))])
}

fn nlibrary_arguments(out: &str, manifests: &[String]) -> Vec<String> {
    let mut args = vec!["--compile".to_string(), "{".to_string(), "--build_library".to_string(), "{".to_string()];
    args.push("--out".to_string());
    args.push(format!("\"{out}\""));
    args.push("--modules".to_string());
    args.push("[".to_string());
    args.extend(manifests.iter().map(|m| format!("\"{m}\"")));
    args.push("]".to_string());
    args.push("}".to_string());
    args.push("}".to_string());
    args
}

fn nprogram_arguments(srcs: &[String], out: &str, modules: &[String]) -> Vec<String> {
    let mut args = vec!["--files".to_string(), "[".to_string()];
    args.extend(srcs.iter().map(|s| format!("\"{s}\"")));
    args.push("]".to_string());
    args.push("--compile".to_string());
    args.push("{".to_string());
    args.push("--modules".to_string());
    args.push("[".to_string());
    args.extend(modules.iter().map(|m| format!("\"{m}\"")));
    args.push("]".to_string());
    args.push("}".to_string());
    args.push("--out".to_string());
    args.push(format!("\"{out}\""));
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{CSourceData, ObjectData};
    use crate::settings::Settings;

    fn env() -> Environment {
        let root = FileHandle::at(std::env::temp_dir(), None);
        let outdir = root.get_child("out");
        Environment::new(
            System::Posix,
            Toolchain::Gcc,
            Settings::new_root(true),
            false,
            root,
            outdir,
            crate::filehandle::StickyCache::new(),
        )
    }

    fn write_temp(name: &str, content: &str) -> FileHandle {
        let dir = std::env::temp_dir().join("mkmk-nodespace-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        FileHandle::at(path, None)
    }

    #[test]
    fn get_or_create_node_is_idempotent() {
        let mut e = env();
        let name = Name::new(["a"]);
        let first = e.get_or_create_node(None, name.clone(), name.clone(), |_| (NodeKind::Group, Vec::new()));
        let second = e.get_or_create_node(None, name.clone(), name, |_| {
            panic!("constructor must not run on a cache hit")
        });
        assert_eq!(first, second);
    }

    #[test]
    fn object_command_contains_source_and_output() {
        let mut e = env();
        let src = write_temp("a.c", "int main(){return 0;}\n");
        let src_id = e.get_or_create_node(
            None,
            Name::new(["a.c"]),
            Name::new(["a.c"]),
            |_| {
                (
                    NodeKind::CSource(CSourceData {
                        handle: src,
                        local_includes: Vec::new(),
                        system_includes: Vec::new(),
                        defines: Vec::new(),
                        force_c: false,
                    }),
                    Vec::new(),
                )
            },
        );
        let output = e.root_nodespace().output_folder.get_child("a.c.o");
        let obj_id = e.get_or_create_node(None, Name::new(["obj"]), Name::new(["obj"]), |_| {
            (
                NodeKind::Object(ObjectData {
                    toolchain: Toolchain::Gcc,
                    output,
                    libraries: Vec::new(),
                    extra_include_paths: Vec::new(),
                }),
                vec![Edge::new(src_id, tag_true("src"))],
            )
        });
        let cmd = e.command_line(obj_id).unwrap().unwrap();
        let rendered = cmd.parts().join(" ");
        assert!(rendered.contains("-c -o"));
        assert!(rendered.ends_with("a.c"));
    }

    #[test]
    fn exec_test_case_wraps_executable_runner_in_valgrind() {
        use crate::graph::node::{ExecTestCaseData, ExecutableData};
        use crate::settings::Value;

        let mut e = env();
        e.settings.add_sticky("valgrind", Value::Bool(true), false).unwrap();
        e.settings.add_sticky("valgrind-flags", Value::List(vec!["track-origins".to_string()]), true).unwrap();

        let output = e.root_nodespace().output_folder.get_child("bin");
        let exe_id = e.get_or_create_node(None, Name::new(["bin"]), Name::new(["bin"]), |_| {
            (NodeKind::Executable(ExecutableData { toolchain: Toolchain::Gcc, output }), Vec::new())
        });
        let test_output = e.root_nodespace().output_folder.get_child("bin.run");
        let case_id = e.get_or_create_node(None, Name::new(["bin.test"]), Name::new(["bin.test"]), |_| {
            (
                NodeKind::ExecTestCase(ExecTestCaseData { output: test_output }),
                vec![Edge::new(exe_id, tag_true("runner"))],
            )
        });

        let cmd = e.command_line(case_id).unwrap().unwrap();
        let rendered = cmd.parts().join(" ");
        assert!(rendered.contains("valgrind -q --leak-check=full --error-exitcode=1 --track-origins"));
    }
}

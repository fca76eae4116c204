//! Graph primitives: nodes as a tagged variant (capability set
//! dispatched in `Environment`, not deep inheritance), annotated
//! edges, and group flattening.

use std::collections::BTreeMap;

use crate::filehandle::FileHandle;
use crate::graph::toolchain::Toolchain;
use crate::name::Name;
use crate::system::EnvMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationValue {
    Bool(bool),
    Str(String),
}

pub type Annotations = BTreeMap<String, AnnotationValue>;

pub fn annotations(pairs: &[(&str, AnnotationValue)]) -> Annotations {
    pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
}

/// An outgoing edge to `target`, tagged with annotations used to
/// filter traversals (`obj=true`, `src=true`, `runner=true`, …).
#[derive(Debug, Clone)]
pub struct Edge {
    pub target: NodeId,
    pub annotations: Annotations,
}

impl Edge {
    pub fn new(target: NodeId, annotations: Annotations) -> Self {
        Self { target, annotations }
    }

    /// Every key in `query` must equal the corresponding annotation
    /// value; a key missing from this edge's annotations disqualifies
    /// the match.
    pub fn has_annotations(&self, query: &Annotations) -> bool {
        query.iter().all(|(k, v)| self.annotations.get(k) == Some(v))
    }
}

#[derive(Debug, Clone)]
pub struct CSourceData {
    pub handle: FileHandle,
    /// Nodes whose input files contribute local include-search roots.
    pub local_includes: Vec<NodeId>,
    pub system_includes: Vec<String>,
    pub defines: Vec<(String, String)>,
    pub force_c: bool,
}

#[derive(Debug, Clone)]
pub struct ObjectData {
    pub toolchain: Toolchain,
    pub output: FileHandle,
    pub libraries: Vec<String>,
    pub extra_include_paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExecutableData {
    pub toolchain: Toolchain,
    pub output: FileHandle,
}

#[derive(Debug, Clone)]
pub struct SharedLibraryData {
    pub toolchain: Toolchain,
    pub output: FileHandle,
    pub libraries: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MessageResourceData {
    pub toolchain: Toolchain,
    pub output: FileHandle,
}

#[derive(Debug, Clone)]
pub struct NLibraryData {
    pub output: FileHandle,
}

#[derive(Debug, Clone)]
pub struct NProgramData {
    pub output: FileHandle,
}

#[derive(Debug, Clone)]
pub struct TocData {
    pub output: FileHandle,
}

#[derive(Debug, Clone)]
pub struct CopyData {
    pub output: FileHandle,
}

#[derive(Debug, Clone)]
pub struct CustomExecData {
    pub output: Option<FileHandle>,
    pub title: Option<String>,
    pub env: Vec<(String, String, EnvMode)>,
    pub arguments: Vec<String>,
    pub tee: bool,
}

#[derive(Debug, Clone)]
pub struct SystemExecData {
    pub output: Option<FileHandle>,
    pub command_line: String,
    pub env: Vec<(String, String, EnvMode)>,
}

#[derive(Debug, Clone)]
pub struct EnvPrinterData {
    pub output: FileHandle,
    pub bindings: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ExecTestCaseData {
    pub output: FileHandle,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    File(FileHandle),
    Group,
    Alias,
    CSource(CSourceData),
    Object(ObjectData),
    Executable(ExecutableData),
    SharedLibrary(SharedLibraryData),
    MessageResource(MessageResourceData),
    NLibrary(NLibraryData),
    NProgram(NProgramData),
    Toc(TocData),
    Copy(CopyData),
    CustomExec(CustomExecData),
    SystemExec(SystemExecData),
    EnvPrinter(EnvPrinterData),
    ExecTestCase(ExecTestCaseData),
}

pub struct NodeEntry {
    pub name: Name,
    pub full_name: Name,
    pub edges: Vec<Edge>,
    pub kind: NodeKind,
}

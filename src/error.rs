//! Error taxonomy.

use crate::system::errorln;

/// The five error kinds the generator can raise. All of them abort
/// generation; none are retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ConfigurationError
    #[error("unknown extension `{0}`")]
    UnknownExtension(String),
    #[error("unknown toolchain `{0}`")]
    UnknownToolchain(String),
    #[error("unknown system `{0}`")]
    UnknownSystem(String),
    #[error("unknown environment-prefix mode `{0}`")]
    UnknownEnvMode(String),
    #[error("unknown library `{0}`")]
    UnknownLibrary(String),
    #[error("setting `{0}` was already declared with a different sticky/additive shape")]
    ConflictingSetting(String),
    #[error("unknown flag `{0}`")]
    UnknownFlag(String),
    #[error("cannot parse config file `{0}`: {1}")]
    ParseConfig(String, String),

    // ScriptEvaluationError
    #[error("error evaluating build script `{0}`: {1}")]
    ScriptEvaluation(String, String),

    // IOError
    #[error("cannot read `{0}`: {1}")]
    ReadFile(String, std::io::Error),
    #[error("cannot write `{0}`: {1}")]
    WriteFile(String, std::io::Error),
    #[error("cannot stat `{0}`: {1}")]
    Stat(String, std::io::Error),
    #[error("cannot create directory `{0}`: {1}")]
    CreateDirectory(String, std::io::Error),

    // ExternalCommandError
    #[error("`{0}` exited with a non-zero status")]
    ExternalCommand(String),
    #[error("error spawning `{0}`: {1}")]
    SpawnChild(String, std::io::Error),

    // GraphError
    #[error("no node named `{0}` in this dependency")]
    UnknownExternal(String),
    #[error("no dependency registered under the name `{0}`")]
    UnknownDep(String),
    #[error("no `{0}` instance registered for platform `{1}`")]
    UnregisteredPlatform(String, String),
}

impl Error {
    pub fn print(&self) {
        errorln!("Error", "{}", self);
    }
}

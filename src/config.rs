//! The declarative `mkmk.toml` manifest: the convenience path for
//! projects simple enough not to need a hand-written `ConfigContext`
//! driver, read with `serde`+`toml` exactly as the teacher reads its
//! own `Megaton.toml`.

use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Deserialize)]
pub struct MkmkConfig {
    #[serde(default)]
    pub extensions: Vec<String>,
    pub bindir: Option<std::path::PathBuf>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub executable: Option<String>,
    pub alias: Option<String>,
}

impl MkmkConfig {
    pub fn from_path(path: &std::path::Path) -> Result<Self, Error> {
        let text = crate::system::read_file(path)?;
        toml::from_str(&text).map_err(|e| Error::ParseConfig(path.display().to_string(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let config: MkmkConfig = toml::from_str(
            r#"
            sources = ["a.c"]
            executable = "app"
            alias = "all"
            "#,
        )
        .unwrap();
        assert_eq!(config.sources, vec!["a.c".to_string()]);
        assert_eq!(config.executable.as_deref(), Some("app"));
    }
}

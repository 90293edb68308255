//! Configuration types for `doxbind.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::flavour::Flavour;

/// Root configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub doxygen: DoxygenConfig,
    /// Own-source roots; at least one is required.
    pub source: Vec<SourceConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub formatter: FormatterConfig,
    #[serde(default)]
    pub documentation: DocumentationConfig,
    /// Extra template-hint type sets, merged over the built-in ones.
    #[serde(default)]
    pub type_sets: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub flavour: Flavour,
}

/// The documented C++ project.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Project root; source locations are made relative to it.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Repository URL used to build source links.
    #[serde(default)]
    pub git_url: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            git_url: String::new(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Deserialize)]
pub struct DoxygenConfig {
    /// Pre-generated XML directory, relative to the config file. Ignored with
    /// `--generate-xml`, which reads `xml/` from doxygen's work directory.
    #[serde(default = "default_xml_dir")]
    pub xml_dir: PathBuf,
    #[serde(default = "default_doxygen")]
    pub executable: String,
    /// Doxyfile template containing `{{input_directories}}`.
    #[serde(default = "default_doxyfile")]
    pub doxyfile: PathBuf,
}

impl Default for DoxygenConfig {
    fn default() -> Self {
        Self {
            xml_dir: default_xml_dir(),
            executable: default_doxygen(),
            doxyfile: default_doxyfile(),
        }
    }
}

fn default_xml_dir() -> PathBuf {
    PathBuf::from("docbuild/xml")
}

fn default_doxygen() -> String {
    "doxygen".to_string()
}

fn default_doxyfile() -> PathBuf {
    PathBuf::from("Doxyfile")
}

/// A source root and the C++ namespace it provides.
#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    /// Relative to the project root (e.g. `include/Core`).
    pub path: String,
    pub namespace: String,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

#[derive(Debug, Default, Deserialize)]
pub struct FormatterConfig {
    /// clang-format executable; formatting is skipped when unset.
    #[serde(default)]
    pub clang_format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentationConfig {
    #[serde(default)]
    pub website_url: String,
    #[serde(default = "default_doc_path")]
    pub doc_path: String,
    #[serde(default = "default_doxygen_path")]
    pub doxygen_path: String,
}

impl Default for DocumentationConfig {
    fn default() -> Self {
        Self {
            website_url: String::new(),
            doc_path: default_doc_path(),
            doxygen_path: default_doxygen_path(),
        }
    }
}

fn default_doc_path() -> String {
    "doc/lua".to_string()
}

fn default_doxygen_path() -> String {
    "doxygen".to_string()
}

impl Config {
    /// Namespaces of the own-source roots, first-seen order, no duplicates.
    pub fn source_namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = Vec::new();
        for source in &self.source {
            if !namespaces.contains(&source.namespace) {
                namespaces.push(source.namespace.clone());
            }
        }
        namespaces
    }

    /// Source root paths, used to turn locations into include paths.
    pub fn source_roots(&self) -> Vec<String> {
        self.source.iter().map(|s| s.path.clone()).collect()
    }
}

/// Load and parse a `doxbind.toml` configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path.display(), e))?;
    parse_config(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {}", path.display(), e))
}

/// Parse configuration text.
pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config = toml::from_str(content)?;
    if config.source.is_empty() {
        anyhow::bail!("at least one [[source]] entry is required");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config() {
        let config = parse_config(
            r#"
            [project]
            root = "../ObEngine"
            git_url = "https://github.com/Sygmei/ObEngine"

            [doxygen]
            xml_dir = "docbuild/xml"

            [[source]]
            path = "include/Core"
            namespace = "obe"

            [[source]]
            path = "include/Dev"
            namespace = "obe"

            [[source]]
            path = "extlibs/vili/include/vili"
            namespace = "vili"

            [output]
            directory = "generated"

            [formatter]
            clang_format = "clang-format"

            [documentation]
            website_url = "obengine.io"

            [type_sets]
            vectors = ["obe::Transform::Vector2", "obe::Transform::UnitVector"]

            [flavour]
            state_view = "sol::state"
            "#,
        )
        .unwrap();
        assert_eq!(config.project.root, PathBuf::from("../ObEngine"));
        assert_eq!(config.source_namespaces(), vec!["obe", "vili"]);
        assert_eq!(config.source_roots().len(), 3);
        assert_eq!(config.output.directory, PathBuf::from("generated"));
        assert_eq!(config.formatter.clang_format.as_deref(), Some("clang-format"));
        assert_eq!(config.documentation.doc_path, "doc/lua");
        assert_eq!(config.type_sets["vectors"].len(), 2);
        assert_eq!(config.flavour.state_view, "sol::state");
        assert_eq!(config.flavour.include_file, "sol/sol.hpp");
    }

    #[test]
    fn defaults_apply() {
        let config = parse_config(
            r#"
            [[source]]
            path = "include"
            namespace = "obe"
            "#,
        )
        .unwrap();
        assert_eq!(config.project.root, PathBuf::from("."));
        assert_eq!(config.doxygen.executable, "doxygen");
        assert_eq!(config.doxygen.xml_dir, PathBuf::from("docbuild/xml"));
        assert_eq!(config.output.directory, PathBuf::from("output"));
        assert!(config.formatter.clang_format.is_none());
        assert!(config.type_sets.is_empty());
    }

    #[test]
    fn sources_are_required() {
        assert!(parse_config("source = []").is_err());
        assert!(parse_config("[project]\nroot = \".\"").is_err());
    }
}

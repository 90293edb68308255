//! doxbind — Doxygen XML → scripting-engine bindings.
//!
//! Reads the XML doxygen produces for a C++ codebase, builds an entity model
//! of its namespaces, classes, functions, enums, globals and typedefs, and
//! emits one binding loader per namespace through a pluggable
//! [`flavour::Flavour`] (sol3 by default). The same model can be exported as
//! JSON documentation.
//!
//! # Quick start
//!
//! Generate and write bindings from a config:
//!
//! ```no_run
//! use std::path::Path;
//!
//! doxbind::run(Path::new("doxbind.toml"), doxbind::Mode::Bindings, None, false).unwrap();
//! ```
//!
//! Or get the generated files without writing to disk:
//!
//! ```no_run
//! use std::path::Path;
//!
//! let files = doxbind::generate(Path::new("doxbind.toml")).unwrap();
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

pub mod binding;
pub mod config;
pub mod cpp_type;
pub mod docs;
pub mod emit;
pub mod error;
pub mod extract;
pub mod flags;
pub mod flavour;
pub mod ident;
pub mod index;
pub mod location;
pub mod model;
pub mod resolve;
pub mod tools;
pub mod xml;

pub use emit::GeneratedFile;

/// What [`run`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Binding headers and sources.
    Bindings,
    /// `search.json` and `db.json`.
    Documentation,
}

/// Run the full pipeline and write its output.
///
/// `config_path` is the path to a `doxbind.toml` configuration file.
/// `output` optionally overrides the output directory from the config.
/// With `generate_xml`, doxygen is run over the source roots first instead of
/// reading pre-generated XML.
///
/// Returns the directory the output was written to.
pub fn run(config_path: &Path, mode: Mode, output: Option<&Path>, generate_xml: bool) -> Result<PathBuf> {
    let cfg = config::load_config(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let project_root = base_dir.join(&cfg.project.root);

    // The work directory must outlive every read of the XML inside it.
    let doxygen_dir = if generate_xml {
        let inputs: Vec<PathBuf> = cfg.source.iter().map(|s| project_root.join(&s.path)).collect();
        Some(tools::run_doxygen(
            &cfg.doxygen.executable,
            &base_dir.join(&cfg.doxygen.doxyfile),
            &inputs,
        )?)
    } else {
        None
    };
    let xml_dir = match &doxygen_dir {
        Some(dir) => dir.path().join("xml"),
        None => base_dir.join(&cfg.doxygen.xml_dir),
    };

    let output_dir = match output {
        Some(p) => p.to_path_buf(),
        None => base_dir.join(&cfg.output.directory),
    };

    let (index, db) = build_database(&cfg, &project_root, &xml_dir)?;
    match mode {
        Mode::Bindings => {
            let files = emit::emit_bindings(&db, &cfg.flavour, &cfg.source_roots());
            let written = write_files(&files, &output_dir)?;
            if let Some(formatter) = &cfg.formatter.clang_format {
                let sources: Vec<PathBuf> = written
                    .into_iter()
                    .filter(|p| p.extension().is_some_and(|e| e == "cpp"))
                    .collect();
                tools::clang_format(formatter, &sources, &project_root);
            }
        }
        Mode::Documentation => {
            let urls = docs::UrlScheme {
                website_url: cfg.documentation.website_url.clone(),
                doc_path: cfg.documentation.doc_path.clone(),
                doxygen_path: cfg.documentation.doxygen_path.clone(),
                git_url: cfg.project.git_url.clone(),
                branch: tools::git_branch(&project_root),
            };
            docs::write_documentation(&db, &index, &urls, &output_dir)?;
        }
    }

    Ok(output_dir)
}

/// Parse a `doxbind.toml` config file, read the XML it points to and return
/// the generated binding files without writing to disk.
pub fn generate(config_path: &Path) -> Result<Vec<GeneratedFile>> {
    let cfg = config::load_config(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    generate_from_config(&cfg, base_dir)
}

/// Generate binding files from an already-loaded [`config::Config`].
///
/// `base_dir` is the directory relative to which the project root and XML
/// directory in the config are resolved (typically the parent directory of
/// the TOML file).
pub fn generate_from_config(cfg: &config::Config, base_dir: &Path) -> Result<Vec<GeneratedFile>> {
    let project_root = base_dir.join(&cfg.project.root);
    let xml_dir = base_dir.join(&cfg.doxygen.xml_dir);
    let (_, db) = build_database(cfg, &project_root, &xml_dir)?;

    let files = emit::emit_bindings(&db, &cfg.flavour, &cfg.source_roots());
    info!(files = files.len(), "generated bindings");

    Ok(files)
}

/// Index, extract and resolve the XML tree in `xml_dir`.
pub fn build_database(
    cfg: &config::Config,
    project_root: &Path,
    xml_dir: &Path,
) -> Result<(index::SymbolIndex, model::Database)> {
    let namespaces = cfg.source_namespaces();
    info!(
        sources = cfg.source.len(),
        namespaces = ?namespaces,
        xml = %xml_dir.display(),
        "loaded configuration"
    );

    let index_path = xml_dir.join("index.xml");
    let index_xml = std::fs::read_to_string(&index_path)
        .with_context(|| format!("reading {}", index_path.display()))?;
    let index = index::parse_doxygen_index(&index_xml)
        .with_context(|| format!("parsing {}", index_path.display()))?;

    let mut flags = flags::FlagContext::new(&cfg.type_sets);
    let mut db = extract::extract_database(xml_dir, &namespaces, project_root, &index, &mut flags)?;
    resolve::resolve(&mut db, &namespaces);

    Ok((index, db))
}

/// Write `files` under `output_dir`, creating directories as needed.
pub fn write_files(files: &[GeneratedFile], output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let path = output_dir.join(&file.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&path, &file.contents)
            .with_context(|| format!("writing output to {}", path.display()))?;
        written.push(path);
    }
    info!(files = written.len(), dir = %output_dir.display(), "wrote bindings");
    Ok(written)
}

//! Source locations of documented symbols.

use std::path::{Component, Path, PathBuf};

use roxmltree::Node;
use serde::Serialize;

use crate::error::Result;
use crate::xml;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Relative to the project root, `/`-separated.
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// Lexically normalize `path` (drop `.`, fold `..`) without touching the
/// filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|c| c != "/")
        .collect::<Vec<_>>()
        .join("/")
}

/// `file` made relative to `root` when it lives below it.
pub fn relative_to(file: &str, root: &Path) -> String {
    let file = normalize(Path::new(file));
    let root = normalize(root);
    match file.strip_prefix(&root) {
        Ok(relative) if !root.as_os_str().is_empty() => to_slash(relative),
        _ => {
            let mut rendered = to_slash(&file);
            if file.has_root() {
                rendered.insert(0, '/');
            }
            rendered
        }
    }
}

/// Read the mandatory `<location>` child of a compound or member.
pub fn parse_location(node: Node<'_, '_>, context: &str, project_root: &Path) -> Result<Location> {
    let location = xml::require_child(node, "location", context)?;
    let number = |name: &str| -> u32 {
        location
            .attribute(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    };
    Ok(Location {
        file: relative_to(location.attribute("file").unwrap_or_default(), project_root),
        line: number("line"),
        column: number("column"),
    })
}

/// Include path for `file`, relative to the first source root containing it.
pub fn strip_include<'a>(file: &str, source_roots: impl IntoIterator<Item = &'a str>) -> String {
    let file_path = normalize(Path::new(file));
    for root in source_roots {
        if let Ok(relative) = file_path.strip_prefix(normalize(Path::new(root))) {
            return to_slash(relative);
        }
    }
    to_slash(&file_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_project_relative() {
        assert_eq!(
            relative_to("/work/obe/include/Core/Scene/Scene.hpp", Path::new("/work/obe/")),
            "include/Core/Scene/Scene.hpp"
        );
        assert_eq!(
            relative_to("/work/obe/./include/../include/Core/A.hpp", Path::new("/work/obe")),
            "include/Core/A.hpp"
        );
        assert_eq!(relative_to("/usr/include/vector", Path::new("/work/obe")), "/usr/include/vector");
    }

    #[test]
    fn location_is_required() {
        let doc = roxmltree::Document::parse(
            r#"<memberdef><location file="/p/include/Core/A.hpp" line="12" column="9"/></memberdef>"#,
        )
        .unwrap();
        let location = parse_location(doc.root_element(), "obe::A", Path::new("/p")).unwrap();
        assert_eq!(location.file, "include/Core/A.hpp");
        assert_eq!((location.line, location.column), (12, 9));

        let missing = roxmltree::Document::parse("<memberdef/>").unwrap();
        assert!(parse_location(missing.root_element(), "obe::B", Path::new("/p")).is_err());
    }

    #[test]
    fn includes_strip_source_roots() {
        assert_eq!(
            strip_include("include/Core/Scene/Scene.hpp", ["include/Dev", "include/Core"]),
            "Scene/Scene.hpp"
        );
        assert_eq!(strip_include("other/Thing.hpp", ["include/Core"]), "other/Thing.hpp");
    }
}

//! Documentation exports: the flat `search.json` index and the full
//! `db.json` dump of the resolved database.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::index::SymbolIndex;
use crate::location::Location;
use crate::model::{Database, FunctionSlot};

/// Where documentation, doxygen pages and sources are published.
#[derive(Debug, Clone)]
pub struct UrlScheme {
    pub website_url: String,
    pub doc_path: String,
    pub doxygen_path: String,
    pub git_url: String,
    pub branch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Namespace,
    Class,
    Function,
    Method,
    Attribute,
    Enum,
    Global,
    Typedef,
}

impl UrlScheme {
    fn base(&self) -> String {
        format!("https://{}/{}", self.website_url, self.doc_path)
    }

    pub fn documentation_url(
        &self,
        kind: EntityKind,
        namespace: &str,
        name: &str,
        from_class: Option<&str>,
    ) -> String {
        let path = namespace.replace("::", "/");
        match (kind, from_class) {
            (EntityKind::Namespace, _) => format!("{}/{}", self.base(), name.replace("::", "/")),
            (EntityKind::Class, _) => format!("{}/{path}/{name}.html", self.base()),
            (_, Some(class)) => format!("{}/{path}/{class}.html#doc_{name}", self.base()),
            (_, None) => format!("{}/{path}#doc_{name}", self.base()),
        }
    }

    pub fn source_url(&self, location: &Location) -> Option<String> {
        (!location.file.is_empty()).then(|| {
            format!(
                "{}/blob/{}/{}#L{}",
                self.git_url.trim_end_matches('/'),
                self.branch,
                location.file,
                location.line
            )
        })
    }

    /// Page generated by doxygen for `fqn`, looked up through the index.
    pub fn doxygen_url(&self, index: &SymbolIndex, kind: EntityKind, fqn: &str) -> Option<String> {
        let Some(entry) = index.by_fqn(fqn) else {
            warn!(fqn = %fqn, "no doxygen page");
            return None;
        };
        let root = format!("https://{}/{}", self.website_url, self.doxygen_path);
        match kind {
            EntityKind::Namespace | EntityKind::Class => Some(format!("{root}/{}.html", entry.refid)),
            _ => {
                let (page, anchor) = entry.refid.rsplit_once("_1")?;
                Some(format!("{root}/{page}.html#{anchor}"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchEntry {
    pub kind: EntityKind,
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_class: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doxygen_url: Option<String>,
}

struct SearchBuilder<'a> {
    urls: &'a UrlScheme,
    index: &'a SymbolIndex,
    entries: Vec<SearchEntry>,
}

impl SearchBuilder<'_> {
    fn push(
        &mut self,
        kind: EntityKind,
        namespace: &str,
        name: &str,
        from_class: Option<&str>,
        location: Option<&Location>,
    ) {
        let fqn = [Some(namespace), from_class, Some(name)]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("::");
        let fqn = if kind == EntityKind::Namespace { name.to_string() } else { fqn };
        self.entries.push(SearchEntry {
            kind,
            name: name.to_string(),
            namespace: namespace.to_string(),
            from_class: from_class.map(|c| format!("{namespace}::{c}")),
            url: self.urls.documentation_url(kind, namespace, name, from_class),
            source_url: location.and_then(|l| self.urls.source_url(l)),
            doxygen_url: self.urls.doxygen_url(self.index, kind, &fqn),
        });
    }

    fn push_slot(&mut self, kind: EntityKind, slot: &FunctionSlot) {
        // Overloads share one page; the first declaration stands for all.
        if let Some(first) = slot.functions().first() {
            self.push(
                kind,
                &first.namespace,
                &first.name,
                first.from_class.as_deref(),
                Some(&first.location),
            );
        }
    }
}

/// Flat list of every documented entity, methods and attributes included.
pub fn search_index(db: &Database, index: &SymbolIndex, urls: &UrlScheme) -> Vec<SearchEntry> {
    let mut builder = SearchBuilder {
        urls,
        index,
        entries: Vec::new(),
    };
    for namespace in db.namespaces.values() {
        let parent = crate::ident::parent_scope(&namespace.name);
        builder.push(EntityKind::Namespace, parent, &namespace.name, None, None);
    }
    for class in db.classes.values() {
        builder.push(EntityKind::Class, &class.namespace, &class.name, None, Some(&class.location));
        for slot in class.methods.values() {
            builder.push_slot(EntityKind::Method, slot);
        }
        for attribute in class.attributes.values() {
            builder.push(
                EntityKind::Attribute,
                &attribute.namespace,
                &attribute.name,
                Some(&attribute.from_class),
                Some(&attribute.location),
            );
        }
    }
    for slot in db.functions.values() {
        builder.push_slot(EntityKind::Function, slot);
    }
    for item in db.enums.values() {
        builder.push(EntityKind::Enum, &item.namespace, &item.name, None, Some(&item.location));
    }
    for item in db.globals.values() {
        builder.push(EntityKind::Global, &item.namespace, &item.name, None, Some(&item.location));
    }
    for item in db.typedefs.values() {
        builder.push(EntityKind::Typedef, &item.namespace, &item.name, None, Some(&item.location));
    }
    builder.entries
}

/// Write `search.json` and `db.json` into `output_dir`.
pub fn write_documentation(
    db: &Database,
    index: &SymbolIndex,
    urls: &UrlScheme,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let search = search_index(db, index, urls);
    let search_path = output_dir.join("search.json");
    let json = serde_json::to_string_pretty(&search).context("serializing search index")?;
    std::fs::write(&search_path, json)
        .with_context(|| format!("writing {}", search_path.display()))?;

    let db_path = output_dir.join("db.json");
    let json = serde_json::to_string_pretty(db).context("serializing database")?;
    std::fs::write(&db_path, json).with_context(|| format!("writing {}", db_path.display()))?;

    info!(entries = search.len(), dir = %output_dir.display(), "wrote documentation");
    Ok(vec![search_path, db_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SymbolKind;
    use crate::model::test_support::*;
    use crate::model::insert_function;
    use pretty_assertions::assert_eq;

    fn urls() -> UrlScheme {
        UrlScheme {
            website_url: "obengine.io".into(),
            doc_path: "doc/lua".into(),
            doxygen_path: "doxygen".into(),
            git_url: "https://github.com/Sygmei/ObEngine".into(),
            branch: "dev".into(),
        }
    }

    #[test]
    fn urls_follow_the_site_layout() {
        let urls = urls();
        assert_eq!(
            urls.documentation_url(EntityKind::Class, "obe::Collision", "Circle", None),
            "https://obengine.io/doc/lua/obe/Collision/Circle.html"
        );
        assert_eq!(
            urls.documentation_url(EntityKind::Method, "obe::Collision", "area", Some("Circle")),
            "https://obengine.io/doc/lua/obe/Collision/Circle.html#doc_area"
        );
        assert_eq!(
            urls.documentation_url(EntityKind::Function, "obe::Collision", "distance", None),
            "https://obengine.io/doc/lua/obe/Collision#doc_distance"
        );
        let location = Location {
            file: "include/Core/Collision/Circle.hpp".into(),
            line: 12,
            column: 0,
        };
        assert_eq!(
            urls.source_url(&location).as_deref(),
            Some("https://github.com/Sygmei/ObEngine/blob/dev/include/Core/Collision/Circle.hpp#L12")
        );
        assert_eq!(urls.source_url(&Location::default()), None);

        let mut index = SymbolIndex::default();
        index.register(SymbolKind::Class, "classobe_1_1Collision_1_1Circle", "obe::Collision::Circle", "Circle");
        index.register(
            SymbolKind::Method,
            "classobe_1_1Collision_1_1Circle_1a42",
            "obe::Collision::Circle::area",
            "area",
        );
        assert_eq!(
            urls.doxygen_url(&index, EntityKind::Class, "obe::Collision::Circle").as_deref(),
            Some("https://obengine.io/doxygen/classobe_1_1Collision_1_1Circle.html")
        );
        assert_eq!(
            urls.doxygen_url(&index, EntityKind::Method, "obe::Collision::Circle::area").as_deref(),
            Some("https://obengine.io/doxygen/classobe_1_1Collision_1_1Circle.html#a42")
        );
    }

    #[test]
    fn search_index_flattens_members() {
        let mut db = Database::default();
        let mut circle = class("obe::Collision", "Circle", &[]);
        insert_function(
            &mut circle.methods,
            "area",
            FunctionSlot::Concrete(function("obe::Collision", Some("Circle"), "area", &[], "float")),
        );
        insert_function(
            &mut circle.methods,
            "area",
            FunctionSlot::Concrete(function("obe::Collision", Some("Circle"), "area", &[("bool", "exact")], "float")),
        );
        db.classes.insert(circle.fqn(), circle);

        let entries = search_index(&db, &SymbolIndex::default(), &urls());
        let summary: Vec<(EntityKind, &str, Option<&str>)> = entries
            .iter()
            .map(|e| (e.kind, e.name.as_str(), e.from_class.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (EntityKind::Class, "Circle", None),
                (EntityKind::Method, "area", Some("obe::Collision::Circle")),
            ]
        );
    }

    #[test]
    fn documentation_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_documentation(&Database::default(), &SymbolIndex::default(), &urls(), dir.path()).unwrap();
        assert_eq!(paths.len(), 2);
        let search: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(search, serde_json::json!([]));
        let db: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&paths[1]).unwrap()).unwrap();
        assert!(db.get("classes").is_some());
    }
}

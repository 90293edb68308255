//! Symbol index built from Doxygen's `index.xml`.
//!
//! Maps raw Doxygen refids and fully-qualified names to the kind of symbol
//! they denote. Built once per run, read-only afterwards.

use std::collections::BTreeMap;
use std::ops::{BitOr, BitOrAssign};

use roxmltree::Node;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::xml;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Namespace,
    Class,
    Method,
    Attribute,
    Enum,
    Typedef,
    Function,
    Variable,
    Define,
}

impl SymbolKind {
    /// Kinds a type reference may resolve to.
    pub fn is_type(self) -> bool {
        matches!(self, SymbolKind::Class | SymbolKind::Typedef | SymbolKind::Enum)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolEntry {
    pub kind: SymbolKind,
    pub refid: String,
    pub fqn: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolIndex {
    by_id: BTreeMap<String, SymbolEntry>,
    by_fqn: BTreeMap<String, SymbolEntry>,
}

impl SymbolIndex {
    pub fn register(&mut self, kind: SymbolKind, refid: &str, fqn: &str, name: &str) {
        let entry = SymbolEntry {
            kind,
            refid: refid.to_string(),
            fqn: fqn.to_string(),
            name: name.to_string(),
        };
        self.by_id.insert(entry.refid.clone(), entry.clone());
        self.by_fqn.insert(entry.fqn.clone(), entry);
    }

    pub fn by_id(&self, refid: &str) -> Option<&SymbolEntry> {
        self.by_id.get(refid)
    }

    pub fn by_fqn(&self, fqn: &str) -> Option<&SymbolEntry> {
        self.by_fqn.get(fqn)
    }

    /// Entries whose trailing `::` segments equal all segments of `name`.
    pub fn find_by_suffix<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SymbolEntry> + 'a {
        let wanted: Vec<&'a str> = name.split("::").collect();
        self.by_fqn.values().filter(move |entry| {
            let segments: Vec<&str> = entry.fqn.split("::").collect();
            segments.len() >= wanted.len() && segments[segments.len() - wanted.len()..] == wanted[..]
        })
    }

    pub fn len(&self) -> usize {
        self.by_fqn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fqn.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.by_fqn.values()
    }
}

impl BitOrAssign for SymbolIndex {
    /// Merge `rhs` in; its entries win on refid or fqn collisions.
    fn bitor_assign(&mut self, rhs: SymbolIndex) {
        self.by_id.extend(rhs.by_id);
        self.by_fqn.extend(rhs.by_fqn);
    }
}

impl BitOr for SymbolIndex {
    type Output = SymbolIndex;

    fn bitor(mut self, rhs: SymbolIndex) -> SymbolIndex {
        self |= rhs;
        self
    }
}

// ---------------------------------------------------------------------------
// index.xml
// ---------------------------------------------------------------------------

fn member_kind(kind: &str, in_class: bool) -> Option<SymbolKind> {
    Some(match (kind, in_class) {
        ("function", true) => SymbolKind::Method,
        ("function", false) => SymbolKind::Function,
        ("variable", true) => SymbolKind::Attribute,
        ("variable", false) => SymbolKind::Variable,
        ("enum", _) => SymbolKind::Enum,
        ("typedef", _) => SymbolKind::Typedef,
        ("define", false) => SymbolKind::Define,
        _ => return None,
    })
}

fn parse_compound(compound: Node<'_, '_>, kind: &str) -> SymbolIndex {
    let mut index = SymbolIndex::default();
    let compound_name = xml::child_text(compound, "name");
    let refid = compound.attribute("refid").unwrap_or_default();
    let in_class = matches!(kind, "class" | "struct");

    let prefix = match kind {
        "class" | "struct" => {
            index.register(
                SymbolKind::Class,
                refid,
                &compound_name,
                crate::ident::last_segment(&compound_name),
            );
            format!("{compound_name}::")
        }
        "namespace" => {
            index.register(
                SymbolKind::Namespace,
                refid,
                &compound_name,
                crate::ident::last_segment(&compound_name),
            );
            format!("{compound_name}::")
        }
        _ => String::new(),
    };

    for member in xml::children(compound, "member") {
        let member_kind_attr = member.attribute("kind").unwrap_or_default();
        let Some(symbol_kind) = member_kind(member_kind_attr, in_class) else {
            debug!(compound = %compound_name, kind = member_kind_attr, "ignoring index member");
            continue;
        };
        let name = xml::child_text(member, "name");
        let member_refid = member.attribute("refid").unwrap_or_default();
        let fqn = if symbol_kind == SymbolKind::Define {
            name.clone()
        } else {
            format!("{prefix}{name}")
        };
        index.register(symbol_kind, member_refid, &fqn, &name);
    }
    index
}

/// Build the index from the text of Doxygen's `index.xml`.
///
/// Classes are registered first, then namespaces, then file-scope members,
/// so that namespace-level entries override class entries on collision.
pub fn parse_doxygen_index(xml_text: &str) -> Result<SymbolIndex> {
    let document = roxmltree::Document::parse(xml_text)?;
    let root = document.root_element();

    let mut index = SymbolIndex::default();
    for group in [&["class", "struct"][..], &["namespace"], &["file"]] {
        for compound in xml::children(root, "compound") {
            let Some(kind) = compound.attribute("kind") else {
                continue;
            };
            if group.contains(&kind) {
                index |= parse_compound(compound, kind);
            }
        }
    }
    debug!(symbols = index.len(), "symbol index built");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const INDEX: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='no'?>
<doxygenindex version="1.9.1">
  <compound refid="classobe_1_1_vector2" kind="class"><name>obe::Vector2</name>
    <member refid="classobe_1_1_vector2_1a1" kind="function"><name>length</name></member>
    <member refid="classobe_1_1_vector2_1a2" kind="variable"><name>x</name></member>
    <member refid="classobe_1_1_vector2_1a3" kind="enum"><name>Unit</name></member>
    <member refid="classobe_1_1_vector2_1a4" kind="friend"><name>operator&lt;&lt;</name></member>
  </compound>
  <compound refid="structobe_1_1_rect" kind="struct"><name>obe::Rect</name></compound>
  <compound refid="namespaceobe" kind="namespace"><name>obe</name>
    <member refid="namespaceobe_1a5" kind="function"><name>init</name></member>
    <member refid="namespaceobe_1a6" kind="typedef"><name>TimeUnit</name></member>
    <member refid="namespaceobe_1a7" kind="variable"><name>Version</name></member>
  </compound>
  <compound refid="config_8hpp" kind="file"><name>Config.hpp</name>
    <member refid="config_8hpp_1a8" kind="define"><name>OBE_DEBUG</name></member>
  </compound>
</doxygenindex>"#;

    #[test]
    fn registers_compounds_and_members() {
        let index = parse_doxygen_index(INDEX).unwrap();
        let kind_of = |fqn: &str| index.by_fqn(fqn).map(|e| e.kind);
        assert_eq!(kind_of("obe::Vector2"), Some(SymbolKind::Class));
        assert_eq!(kind_of("obe::Rect"), Some(SymbolKind::Class));
        assert_eq!(kind_of("obe::Vector2::length"), Some(SymbolKind::Method));
        assert_eq!(kind_of("obe::Vector2::x"), Some(SymbolKind::Attribute));
        assert_eq!(kind_of("obe::Vector2::Unit"), Some(SymbolKind::Enum));
        assert_eq!(kind_of("obe"), Some(SymbolKind::Namespace));
        assert_eq!(kind_of("obe::init"), Some(SymbolKind::Function));
        assert_eq!(kind_of("obe::TimeUnit"), Some(SymbolKind::Typedef));
        assert_eq!(kind_of("obe::Version"), Some(SymbolKind::Variable));
        assert_eq!(kind_of("OBE_DEBUG"), Some(SymbolKind::Define));
        assert_eq!(index.by_id("classobe_1_1_vector2").map(|e| e.name.as_str()), Some("Vector2"));
        assert!(index.by_fqn("obe::Vector2::operator<<").is_none());
    }

    #[test]
    fn later_index_wins_on_collision() {
        let mut first = SymbolIndex::default();
        first.register(SymbolKind::Class, "a", "obe::Thing", "Thing");
        let mut second = SymbolIndex::default();
        second.register(SymbolKind::Typedef, "b", "obe::Thing", "Thing");
        let merged = first | second;
        assert_eq!(merged.by_fqn("obe::Thing").map(|e| e.kind), Some(SymbolKind::Typedef));
        assert!(merged.by_id("a").is_some());
    }

    #[test]
    fn suffix_search_matches_whole_segments() {
        let index = parse_doxygen_index(INDEX).unwrap();
        let found: Vec<_> = index.find_by_suffix("Vector2").map(|e| e.fqn.as_str()).collect();
        assert_eq!(found, vec!["obe::Vector2"]);
        assert_eq!(index.find_by_suffix("ector2").count(), 0);
        assert_eq!(index.find_by_suffix("Vector2::Unit").count(), 1);
    }
}

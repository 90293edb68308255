//! Read-only helpers over parsed Doxygen XML.

use roxmltree::Node;

use crate::error::{Error, Result};

/// First element child named `tag`.
pub fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(tag))
}

/// All element children named `tag`, in document order.
pub fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |c| c.has_tag_name(tag))
}

/// Like [`child`] but a missing node is a structural error.
pub fn require_child<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
    context: &str,
) -> Result<Node<'a, 'input>> {
    child(node, tag).ok_or_else(|| Error::MissingNode {
        node: tag.to_string(),
        context: context.to_string(),
    })
}

/// Concatenated text of the node and all of its descendants.
pub fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|d| d.is_text())
        .filter_map(|d| d.text())
        .collect()
}

/// Trimmed text of a child element, empty when absent.
pub fn child_text(node: Node<'_, '_>, tag: &str) -> String {
    child(node, tag)
        .map(|c| text_content(c).trim().to_string())
        .unwrap_or_default()
}

/// Text of a child element, `None` when absent or blank.
pub fn child_text_opt(node: Node<'_, '_>, tag: &str) -> Option<String> {
    let text = child_text(node, tag);
    (!text.is_empty()).then_some(text)
}

pub fn attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute(name)
}

/// `yes`/`no` attribute, false when absent.
pub fn attr_flag(node: Node<'_, '_>, name: &str) -> bool {
    node.attribute(name) == Some("yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_children() {
        let doc = roxmltree::Document::parse(
            r#"<memberdef static="yes"><type>const <ref refid="x">Foo</ref> &amp;</type><param/><param/></memberdef>"#,
        )
        .unwrap();
        let root = doc.root_element();
        assert_eq!(child_text(root, "type"), "const Foo &");
        assert_eq!(children(root, "param").count(), 2);
        assert!(attr_flag(root, "static"));
        assert!(!attr_flag(root, "const"));
        assert_eq!(child_text_opt(root, "name"), None);
        assert!(matches!(
            require_child(root, "location", "memberdef"),
            Err(Error::MissingNode { .. })
        ));
    }
}

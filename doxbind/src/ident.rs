//! Identifier helpers: Doxygen ids to C++ names, fqn joining, casing.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static ENCODED_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[:0-9a-zA-Z]_[0-9a-zA-Z]").expect("static regex"));
static LEADING_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^_([0-9a-zA-Z])").expect("static regex"));

const ID_PREFIXES: &[&str] = &["class", "namespace", "struct"];

/// Decode a Doxygen compound id (`classobe_1_1graphics_1_1_color`) into the
/// C++ name it stands for (`obe::graphics::Color`).
///
/// Doxygen escapes `::` as `_1_1`, an uppercase letter as `_` followed by
/// its lowercase form, and a literal underscore as `__`.
pub fn doxygen_id_to_cpp_id(doxygen_id: &str) -> String {
    let mut id = doxygen_id;
    for prefix in ID_PREFIXES {
        if let Some(stripped) = id.strip_prefix(prefix) {
            id = stripped;
            break;
        }
    }
    let name = id.replace("_1", ":");
    let name = ENCODED_UPPER.replace_all(&name, |caps: &Captures| {
        let matched = &caps[0];
        let first = &matched[..1];
        let last = matched[matched.len() - 1..].to_uppercase();
        format!("{first}{last}")
    });
    let name = LEADING_UPPER.replace(&name, |caps: &Captures| caps[1].to_uppercase());
    name.replace("__", "_")
}

/// Resolve the C++ name a `<ref>` points to when the symbol index does not
/// know the refid. `text` is the visible ref text, which is authoritative for
/// the trailing segments of inner classes.
pub fn doxygen_ref_to_cpp_name(refid: &str, text: &str) -> Option<String> {
    if let Some(rest) = refid
        .strip_prefix("class")
        .or_else(|| refid.strip_prefix("struct"))
    {
        let name = doxygen_id_to_cpp_id(rest);
        let parts: Vec<&str> = name.split("::").collect();
        let short: Vec<&str> = text.split("::").collect();
        let start = parts.len().saturating_sub(short.len());
        let join_at = parts
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, part)| **part == short[0])
            .map(|(at, _)| at)
            .unwrap_or(parts.len().saturating_sub(1));
        let mut merged: Vec<&str> = parts[..join_at].to_vec();
        merged.extend(short);
        Some(merged.join("::"))
    } else if let Some(rest) = refid.strip_prefix("namespace") {
        // Member refids carry a trailing `_1<hash>` anchor.
        let scope = match rest.rfind('_') {
            Some(at) => &rest[..at],
            None => rest,
        };
        let scope = doxygen_id_to_cpp_id(scope);
        let mut parts: Vec<&str> = scope.split("::").filter(|p| !p.is_empty()).collect();
        let short: Vec<&str> = text.split("::").collect();
        let overlap = parts
            .iter()
            .zip(short.iter())
            .take_while(|(a, b)| a == b)
            .count();
        parts.extend(&short[overlap..]);
        Some(parts.join("::"))
    } else {
        None
    }
}

/// Join the non-empty parts with `::`.
pub fn make_fqn(namespace: &str, from_class: Option<&str>, name: &str) -> String {
    [Some(namespace), from_class, Some(name)]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("::")
}

/// Uppercase the first ASCII letter, leaving everything else alone.
pub fn clean_capitalize(s: &str) -> String {
    match s.find(|c: char| c.is_ascii_alphabetic()) {
        Some(at) => {
            let mut out = String::with_capacity(s.len());
            out.push_str(&s[..at]);
            out.push_str(&s[at..at + 1].to_ascii_uppercase());
            out.push_str(&s[at + 1..]);
            out
        }
        None => s.to_string(),
    }
}

/// `LoadClassVector2` -> `load_class_vector2`, `HTTPServer` -> `http_server`.
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' {
            out.push('_');
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower)
            {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Last `::` segment of a qualified name.
pub fn last_segment(fqn: &str) -> &str {
    fqn.rsplit("::").next().unwrap_or(fqn)
}

/// Everything before the last `::` segment, empty for unqualified names.
pub fn parent_scope(fqn: &str) -> &str {
    fqn.rsplit_once("::").map(|(scope, _)| scope).unwrap_or("")
}

//! C++ type model: qualifier-annotated trees of base, template and
//! function types parsed from the textual types found in Doxygen output.
//!
//! ```
//! use doxbind::cpp_type::{parse_cpp_type, CppType};
//!
//! let ty = parse_cpp_type("const std::vector<std::pair<int, bool>>&").unwrap();
//! assert!(matches!(ty, CppType::Template { .. }));
//! assert_eq!(ty.to_string(), "const std::vector<std::pair<int, bool>>&");
//! ```

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result, TypeSyntaxError};
use crate::index::SymbolIndex;

const PREFIX_QUALIFIERS: &[&str] = &["const", "constexpr", "consteval", "static", "volatile"];

// Longest first: `&&` must win over `&`, `const&` over `&`.
const POSTFIX_QUALIFIERS: &[&str] = &["&&", "const&", "const*", "&", "*", "const", "volatile"];

const EMBED_SYMBOLS: &[(char, char)] = &[('<', '>'), ('(', ')'), ('[', ']')];

const PRIMITIVE_WORDS: &[&str] = &[
    "void", "bool", "char", "wchar_t", "char8_t", "char16_t", "char32_t", "short", "int", "long",
    "float", "double", "unsigned", "signed", "auto", "size_t", "std::size_t", "int8_t",
    "int16_t", "int32_t", "int64_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t",
    "std::int8_t", "std::int16_t", "std::int32_t", "std::int64_t", "std::uint8_t",
    "std::uint16_t", "std::uint32_t", "std::uint64_t", "intptr_t", "uintptr_t", "ptrdiff_t",
];

/// Prefix keywords and postfix markers attached to a type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Qualifiers {
    pub prefix: Vec<String>,
    /// Left-to-right as written (`int* const` is `["*", "const"]`).
    pub postfix: Vec<String>,
}

impl Qualifiers {
    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty() && self.postfix.is_empty()
    }

    /// Reattach the qualifiers around `ty`.
    pub fn format(&self, ty: &str) -> String {
        let mut out = String::new();
        for prefix in &self.prefix {
            out.push_str(prefix);
            out.push(' ');
        }
        out.push_str(ty);
        for postfix in &self.postfix {
            if postfix.starts_with(is_ident_char) {
                out.push(' ');
            }
            out.push_str(postfix);
        }
        out
    }

    pub fn is_const_ref(&self) -> bool {
        let prefix_const = self.prefix.iter().any(|q| q == "const");
        match self.postfix.as_slice() {
            [amp] if amp == "&" => prefix_const,
            [const_amp] if const_amp == "const&" => true,
            [c, amp] if c == "const" && amp == "&" => true,
            _ => false,
        }
    }

    pub fn is_lvalue_ref(&self) -> bool {
        self.postfix
            .last()
            .is_some_and(|q| q == "&" || q == "const&")
    }

    pub fn is_rvalue_ref(&self) -> bool {
        self.postfix.last().is_some_and(|q| q == "&&")
    }

    pub fn is_pointer(&self) -> bool {
        self.postfix
            .last()
            .is_some_and(|q| q == "*" || q == "const*")
    }

    pub fn is_const(&self) -> bool {
        self.prefix.iter().any(|q| q == "const")
            || self.postfix.iter().any(|q| q.starts_with("const"))
    }
}

/// A named or anonymous argument of a function-shaped type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionArg {
    pub ty: CppType,
    pub qualifiers: Qualifiers,
    pub name: String,
    /// The name is the positional `p<index>` given to an anonymous argument.
    pub generated_name: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CppType {
    Base {
        name: String,
        qualifiers: Qualifiers,
    },
    Template {
        name: String,
        qualifiers: Qualifiers,
        args: Vec<CppType>,
    },
    Function {
        return_type: Box<CppType>,
        qualifiers: Qualifiers,
        args: Vec<FunctionArg>,
    },
}

impl CppType {
    pub fn base(name: impl Into<String>) -> Self {
        CppType::Base {
            name: name.into(),
            qualifiers: Qualifiers::default(),
        }
    }

    pub fn qualifiers(&self) -> &Qualifiers {
        match self {
            CppType::Base { qualifiers, .. }
            | CppType::Template { qualifiers, .. }
            | CppType::Function { qualifiers, .. } => qualifiers,
        }
    }

    pub fn qualifiers_mut(&mut self) -> &mut Qualifiers {
        match self {
            CppType::Base { qualifiers, .. }
            | CppType::Template { qualifiers, .. }
            | CppType::Function { qualifiers, .. } => qualifiers,
        }
    }

    /// Name of the outermost base or template type; function types report
    /// their return type's name.
    pub fn base_name(&self) -> &str {
        match self {
            CppType::Base { name, .. } | CppType::Template { name, .. } => name,
            CppType::Function { return_type, .. } => return_type.base_name(),
        }
    }

    /// Copy of the type without its top-level qualifiers.
    pub fn unqualified(&self) -> CppType {
        let mut ty = self.clone();
        *ty.qualifiers_mut() = Qualifiers::default();
        ty
    }

    pub fn is_void(&self) -> bool {
        matches!(self, CppType::Base { name, qualifiers } if name == "void" && qualifiers.postfix.is_empty())
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, CppType::Base { name, .. } if is_primitive_name(name))
    }

    /// Visit every base-type and template name in the tree.
    pub fn visit_names_mut<E>(
        &mut self,
        f: &mut impl FnMut(&mut String) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        match self {
            CppType::Base { name, .. } => f(name),
            CppType::Template { name, args, .. } => {
                f(name)?;
                for arg in args {
                    arg.visit_names_mut(f)?;
                }
                Ok(())
            }
            CppType::Function {
                return_type, args, ..
            } => {
                return_type.visit_names_mut(f)?;
                for arg in args {
                    arg.ty.visit_names_mut(f)?;
                }
                Ok(())
            }
        }
    }

    /// Replace every leaf whose name is exactly one of the template
    /// parameters with the concrete type bound to it.
    pub fn substitute(&mut self, bindings: &[(String, String)]) {
        match self {
            CppType::Base { name, qualifiers } => {
                let Some((_, concrete)) = bindings.iter().find(|(param, _)| param == name) else {
                    return;
                };
                match parse_cpp_type(concrete) {
                    Ok(mut replacement) => {
                        let inner = replacement.qualifiers_mut();
                        let mut prefix = qualifiers.prefix.clone();
                        prefix.append(&mut inner.prefix);
                        inner.postfix.extend(qualifiers.postfix.iter().cloned());
                        inner.prefix = prefix;
                        *self = replacement;
                    }
                    Err(_) => *name = concrete.clone(),
                }
            }
            CppType::Template { name, args, .. } => {
                if let Some((_, concrete)) = bindings.iter().find(|(param, _)| param == name) {
                    *name = concrete.clone();
                }
                for arg in args {
                    arg.substitute(bindings);
                }
            }
            CppType::Function {
                return_type, args, ..
            } => {
                return_type.substitute(bindings);
                for arg in args {
                    arg.ty.substitute(bindings);
                }
            }
        }
    }
}

impl fmt::Display for CppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CppType::Base { name, qualifiers } => f.write_str(&qualifiers.format(name)),
            CppType::Template {
                name,
                qualifiers,
                args,
            } => {
                let args = args.iter().map(ToString::to_string).collect::<Vec<_>>();
                f.write_str(&qualifiers.format(&format!("{name}<{}>", args.join(", "))))
            }
            CppType::Function {
                return_type,
                qualifiers,
                args,
            } => {
                let args = args.iter().map(ToString::to_string).collect::<Vec<_>>();
                f.write_str(&qualifiers.format(&format!("{return_type}({})", args.join(", "))))
            }
        }
    }
}

impl fmt::Display for FunctionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generated_name {
            f.write_str(&self.qualifiers.format(&self.ty.to_string()))
        } else {
            f.write_str(&self.qualifiers.format(&format!("{} {}", self.ty, self.name)))
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_identifier(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') && s.chars().all(is_ident_char)
}

/// Whether every word of `name` is a builtin type word (`unsigned int`,
/// `std::size_t`, ...).
pub fn is_primitive_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split_whitespace()
            .all(|word| PRIMITIVE_WORDS.contains(&word))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip leading and trailing qualifier keywords until none is left.
pub fn strip_qualifiers(ty: &str) -> (String, Qualifiers) {
    let mut rest = ty.trim();
    let mut qualifiers = Qualifiers::default();

    'prefix: loop {
        for keyword in PREFIX_QUALIFIERS {
            if let Some(after) = rest.strip_prefix(keyword)
                && after.starts_with(char::is_whitespace)
            {
                qualifiers.prefix.push((*keyword).to_string());
                rest = after.trim_start();
                continue 'prefix;
            }
        }
        break;
    }

    'postfix: loop {
        for marker in POSTFIX_QUALIFIERS {
            if let Some(before) = rest.strip_suffix(marker) {
                let word_marker = marker.starts_with(is_ident_char);
                if word_marker && before.ends_with(is_ident_char) {
                    continue;
                }
                qualifiers.postfix.insert(0, (*marker).to_string());
                rest = before.trim_end();
                continue 'postfix;
            }
        }
        break;
    }

    (rest.to_string(), qualifiers)
}

/// Split on `sep` wherever it is not nested inside `<>`, `()` or `[]`.
pub fn split_unembedded(s: &str, sep: char) -> Result<Vec<String>, TypeSyntaxError> {
    let mut stack: Vec<char> = Vec::new();
    let mut segments = Vec::new();
    let mut buffer = String::new();
    for c in s.chars() {
        if let Some(&(_, close)) = EMBED_SYMBOLS.iter().find(|(open, _)| *open == c) {
            stack.push(close);
            buffer.push(c);
        } else if EMBED_SYMBOLS.iter().any(|(_, close)| *close == c) {
            if stack.pop() != Some(c) {
                return Err(TypeSyntaxError::Unbalanced(s.to_string()));
            }
            buffer.push(c);
        } else if c == sep && stack.is_empty() {
            segments.push(std::mem::take(&mut buffer));
        } else {
            buffer.push(c);
        }
    }
    if !stack.is_empty() {
        return Err(TypeSyntaxError::Unbalanced(s.to_string()));
    }
    segments.push(buffer);
    Ok(segments
        .into_iter()
        .map(|segment| segment.trim().to_string())
        .filter(|segment| !segment.is_empty())
        .collect())
}

/// Byte offset of the bracket closing the one opened at `open`.
fn matching_close(s: &str, open: usize) -> Result<usize, TypeSyntaxError> {
    let mut stack: Vec<char> = Vec::new();
    for (offset, c) in s[open..].char_indices() {
        if let Some(&(_, close)) = EMBED_SYMBOLS.iter().find(|(o, _)| *o == c) {
            stack.push(close);
        } else if EMBED_SYMBOLS.iter().any(|(_, close)| *close == c) {
            if stack.pop() != Some(c) {
                return Err(TypeSyntaxError::Unbalanced(s.to_string()));
            }
            if stack.is_empty() {
                return Ok(open + offset);
            }
        }
    }
    Err(TypeSyntaxError::Unbalanced(s.to_string()))
}

/// First occurrence of `target` outside of any bracket pair.
fn find_unembedded(s: &str, target: char) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in s.char_indices() {
        if c == target && depth == 0 {
            return Some(offset);
        }
        if EMBED_SYMBOLS.iter().any(|(open, _)| *open == c) {
            depth += 1;
        } else if EMBED_SYMBOLS.iter().any(|(_, close)| *close == c) {
            depth = depth.saturating_sub(1);
        }
    }
    None
}

/// Parse one C++ type string into a [`CppType`] tree.
pub fn parse_cpp_type(ty: &str) -> Result<CppType, TypeSyntaxError> {
    let mut roots = split_unembedded(ty, ',')?;
    match roots.len() {
        0 => Err(TypeSyntaxError::Empty),
        1 => parse_segment(&roots.remove(0)),
        count => Err(TypeSyntaxError::MultipleRoots {
            ty: ty.to_string(),
            count,
        }),
    }
}

fn parse_type_list(s: &str) -> Result<Vec<CppType>, TypeSyntaxError> {
    split_unembedded(s, ',')?
        .iter()
        .map(|segment| parse_segment(segment))
        .collect()
}

fn parse_segment(segment: &str) -> Result<CppType, TypeSyntaxError> {
    let (core, qualifiers) = strip_qualifiers(segment);
    if core.is_empty() {
        return Err(TypeSyntaxError::Empty);
    }
    match (core.find('<'), core.find('(')) {
        (None, None) => Ok(CppType::Base {
            name: collapse_whitespace(&core),
            qualifiers,
        }),
        (Some(open), None) => parse_template(&core, open, qualifiers),
        (None, Some(_)) => parse_function(&core, qualifiers),
        (Some(angle), Some(paren)) => {
            if core.ends_with(')') || paren < angle {
                parse_function(&core, qualifiers)
            } else {
                parse_template(&core, angle, qualifiers)
            }
        }
    }
}

fn parse_template(core: &str, open: usize, qualifiers: Qualifiers) -> Result<CppType, TypeSyntaxError> {
    let close = matching_close(core, open)?;
    let name = core[..open].trim();
    if name.is_empty() {
        return Err(TypeSyntaxError::Empty);
    }
    let trailing = core[close + 1..].trim();
    if trailing.starts_with("::") {
        // Member of a dependent type (`std::map<K, V>::iterator`) stays opaque.
        return Ok(CppType::Base {
            name: collapse_whitespace(core),
            qualifiers,
        });
    }
    if !trailing.is_empty() {
        return Err(TypeSyntaxError::TrailingText {
            ty: core.to_string(),
            trailing: trailing.to_string(),
        });
    }
    Ok(CppType::Template {
        name: collapse_whitespace(name),
        qualifiers,
        args: parse_type_list(&core[open + 1..close])?,
    })
}

fn parse_function(core: &str, qualifiers: Qualifiers) -> Result<CppType, TypeSyntaxError> {
    let open = find_unembedded(core, '(').ok_or_else(|| TypeSyntaxError::Unbalanced(core.to_string()))?;
    let close = matching_close(core, open)?;
    let trailing = core[close + 1..].trim();
    if !trailing.is_empty() {
        return Err(TypeSyntaxError::TrailingText {
            ty: core.to_string(),
            trailing: trailing.to_string(),
        });
    }
    let return_text = core[..open].trim();
    if return_text.is_empty() {
        return Err(TypeSyntaxError::MissingReturnType(core.to_string()));
    }
    let return_type = parse_segment(return_text)?;
    let args = split_unembedded(&core[open + 1..close], ',')?
        .iter()
        .enumerate()
        .map(|(index, arg)| parse_argument(index, arg))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CppType::Function {
        return_type: Box::new(return_type),
        qualifiers,
        args,
    })
}

fn parse_argument(index: usize, text: &str) -> Result<FunctionArg, TypeSyntaxError> {
    let (core, qualifiers) = strip_qualifiers(text);

    // Glue detached `&`/`*` markers back onto the type token.
    let mut tokens: Vec<String> = Vec::new();
    for token in split_unembedded(&core, ' ')? {
        let markers = token.len() - token.trim_start_matches(['&', '*']).len();
        match tokens.last_mut() {
            Some(previous) if markers > 0 => {
                previous.push_str(&token[..markers]);
                if markers < token.len() {
                    tokens.push(token[markers..].to_string());
                }
            }
            _ => tokens.push(token),
        }
    }

    match tokens.as_slice() {
        [ty] => Ok(FunctionArg {
            ty: parse_segment(ty)?,
            qualifiers,
            name: format!("p{index}"),
            generated_name: true,
        }),
        [ty, name] if is_identifier(name) && !PRIMITIVE_WORDS.contains(&name.as_str()) => {
            Ok(FunctionArg {
                ty: parse_segment(ty)?,
                qualifiers,
                name: name.clone(),
                generated_name: false,
            })
        }
        _ => Err(TypeSyntaxError::AmbiguousArgument(text.to_string())),
    }
}

/// Fully qualify every relative type name in `ty`, searching the
/// enclosing namespaces of `context` outward before falling back to a
/// unique-suffix match over the whole index.
pub fn rebuild_incomplete_type(ty: &CppType, context: &str, index: &SymbolIndex) -> Result<CppType> {
    rebuild_incomplete_type_except(ty, context, index, &[])
}

/// [`rebuild_incomplete_type`] leaving the names in `keep` (template
/// parameters in scope) untouched.
pub fn rebuild_incomplete_type_except(
    ty: &CppType,
    context: &str,
    index: &SymbolIndex,
    keep: &[String],
) -> Result<CppType> {
    let mut rebuilt = ty.clone();
    rebuilt.visit_names_mut(&mut |name: &mut String| -> Result<()> {
        if keep.iter().any(|k| k == name) {
            return Ok(());
        }
        if let Some(qualified) = qualify_name(name, context, index)? {
            *name = qualified;
        }
        Ok(())
    })?;
    Ok(rebuilt)
}

fn qualify_name(name: &str, context: &str, index: &SymbolIndex) -> Result<Option<String>> {
    if name.is_empty() || name.starts_with("::") || name.contains('<') || is_primitive_name(name) {
        return Ok(None);
    }
    if index.by_fqn(name).is_some_and(|entry| entry.kind.is_type()) {
        return Ok(None);
    }

    let scopes: Vec<&str> = context.split("::").filter(|s| !s.is_empty()).collect();
    for len in (1..=scopes.len()).rev() {
        let attempt = format!("{}::{name}", scopes[..len].join("::"));
        if index.by_fqn(&attempt).is_some_and(|entry| entry.kind.is_type()) {
            return Ok(Some(attempt));
        }
    }

    let mut candidates = index
        .find_by_suffix(name)
        .filter(|entry| entry.kind.is_type())
        .map(|entry| entry.fqn.clone())
        .collect::<Vec<_>>();
    candidates.sort();
    candidates.dedup();
    match candidates.len() {
        0 => Ok(None),
        1 => Ok(candidates.pop()),
        _ => Err(Error::AmbiguousSymbol {
            name: name.to_string(),
            context: context.to_string(),
            candidates,
        }),
    }
}

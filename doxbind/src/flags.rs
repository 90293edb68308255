//! Binding directives embedded in documentation comments.
//!
//! Authors annotate symbols with links of the form
//! `obidog.<directive>[:<args>]` (for example `\ref obidog.rename:Load` or a
//! markdown link). Doxygen keeps them as `<ulink url="...">` in the brief and
//! detailed descriptions, which is where [`get_element_flags`] looks for
//! them.

use std::collections::{BTreeMap, BTreeSet};

use roxmltree::Node;
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::Visibility;
use crate::xml;

const DIRECTIVE_PREFIX: &str = "obidog.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MetaTag {
    NonCopyable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookTrigger {
    /// Emitted after the declaring class' binding body.
    Bind,
    /// Turned into a `Bind` hook on every class inheriting from the declaring class.
    Inherit,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Hook {
    pub trigger: HookTrigger,
    pub code: String,
}

/// One concrete choice for every template parameter, in declaration order.
pub type TemplateBinding = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateHint {
    pub bind_name: String,
    pub combinations: Vec<TemplateBinding>,
}

/// The closed set of directives a symbol can carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Flags {
    pub helpers: Vec<String>,
    pub template_hints: Vec<TemplateHint>,
    pub nobind: bool,
    pub additional_includes: Vec<String>,
    pub as_property: bool,
    pub copy_parent_items: bool,
    /// Replacement symbol the binding should call instead.
    pub proxy: Option<String>,
    pub noconstructor: bool,
    pub load_priority: i32,
    pub rename: Option<String>,
    pub rename_parameters: Vec<(String, String)>,
    pub bind_code: Option<String>,
    pub meta: BTreeSet<MetaTag>,
    pub hooks: Vec<Hook>,
    pub merge_template_specialisations_as: Option<String>,
    pub visibility: Option<Visibility>,
    /// Targets this symbol's flags are redirected to.
    pub surrogate_for: Vec<String>,
}

/// Two scalar directives disagreed while combining; the first one was kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagConflict {
    pub target: String,
    pub field: &'static str,
    pub kept: String,
    pub dropped: String,
}

fn merge_scalar<T: Clone + PartialEq + std::fmt::Debug>(
    field: &'static str,
    mine: &mut Option<T>,
    theirs: Option<T>,
    conflicts: &mut Vec<(&'static str, String, String)>,
) {
    match (mine.as_ref(), theirs) {
        (None, theirs) => *mine = theirs,
        (Some(kept), Some(dropped)) if *kept != dropped => {
            conflicts.push((field, format!("{kept:?}"), format!("{dropped:?}")));
        }
        _ => {}
    }
}

impl Flags {
    pub fn template_hint(&self, bind_name: &str) -> Option<&TemplateHint> {
        self.template_hints.iter().find(|h| h.bind_name == bind_name)
    }

    pub fn is_non_copyable(&self) -> bool {
        self.meta.contains(&MetaTag::NonCopyable)
    }

    /// Merge `other` into `self`: booleans OR, lists concatenate, scalars keep
    /// the first value set. Returns the scalar fields that disagreed as
    /// `(field, kept, dropped)`.
    pub fn combine(&mut self, other: Flags) -> Vec<(&'static str, String, String)> {
        let mut conflicts = Vec::new();
        self.helpers.extend(other.helpers);
        for hint in other.template_hints {
            if self.template_hint(&hint.bind_name).is_none() {
                self.template_hints.push(hint);
            }
        }
        self.nobind |= other.nobind;
        self.additional_includes.extend(other.additional_includes);
        self.as_property |= other.as_property;
        self.copy_parent_items |= other.copy_parent_items;
        merge_scalar("proxy", &mut self.proxy, other.proxy, &mut conflicts);
        self.noconstructor |= other.noconstructor;
        match (self.load_priority, other.load_priority) {
            (0, theirs) => self.load_priority = theirs,
            (kept, theirs) if theirs != 0 && kept != theirs => {
                conflicts.push(("load_priority", kept.to_string(), theirs.to_string()));
            }
            _ => {}
        }
        merge_scalar("rename", &mut self.rename, other.rename, &mut conflicts);
        self.rename_parameters.extend(other.rename_parameters);
        merge_scalar("bind_code", &mut self.bind_code, other.bind_code, &mut conflicts);
        self.meta.extend(other.meta);
        for hook in other.hooks {
            if !self.hooks.contains(&hook) {
                self.hooks.push(hook);
            }
        }
        merge_scalar(
            "merge_template_specialisations_as",
            &mut self.merge_template_specialisations_as,
            other.merge_template_specialisations_as,
            &mut conflicts,
        );
        merge_scalar("visibility", &mut self.visibility, other.visibility, &mut conflicts);
        self.surrogate_for.extend(other.surrogate_for);
        conflicts
    }
}

// ---------------------------------------------------------------------------
// Run-scoped state
// ---------------------------------------------------------------------------

pub fn builtin_type_sets() -> BTreeMap<String, Vec<String>> {
    let set = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    BTreeMap::from([
        ("numerics".to_string(), set(&["int", "double"])),
        (
            "integers".to_string(),
            set(&["int", "unsigned int", "long long", "std::size_t"]),
        ),
        ("floats".to_string(), set(&["float", "double"])),
        ("strings".to_string(), set(&["std::string", "std::string_view"])),
    ])
}

/// State shared by every flag resolution of one run: the template type sets,
/// the surrogate buffer and the conflict registry.
#[derive(Debug, Default)]
pub struct FlagContext {
    type_sets: BTreeMap<String, Vec<String>>,
    surrogates: BTreeMap<String, Vec<Flags>>,
    /// How many buffered surrogates each symbol (by Doxygen id) already merged.
    received: BTreeMap<String, usize>,
    resolved: BTreeSet<String>,
    conflicts: Vec<FlagConflict>,
}

impl FlagContext {
    /// `extra_sets` override the built-in sets of the same name.
    pub fn new(extra_sets: &BTreeMap<String, Vec<String>>) -> Self {
        let mut type_sets = builtin_type_sets();
        type_sets.extend(extra_sets.iter().map(|(k, v)| (k.clone(), v.clone())));
        FlagContext {
            type_sets,
            ..Default::default()
        }
    }

    /// Buffer `flags` until `target` is resolved.
    pub fn buffer_surrogate(&mut self, target: &str, flags: Flags) {
        debug!(target, "buffering surrogate flags");
        self.surrogates.entry(target.to_string()).or_default().push(flags);
    }

    /// Merge the surrogates buffered for `fqn` that the symbol `symbol_id`
    /// has not received yet. Every symbol sharing `fqn` (each overload of a
    /// function) gets them; an empty id falls back to `fqn`.
    pub fn apply_surrogates(&mut self, fqn: &str, symbol_id: &str, flags: &mut Flags) {
        let Some(buffered) = self.surrogates.get(fqn) else {
            return;
        };
        let key = if symbol_id.is_empty() { fqn } else { symbol_id };
        let seen = self.received.entry(key.to_string()).or_default();
        let pending = buffered[(*seen).min(buffered.len())..].to_vec();
        *seen = buffered.len();
        self.resolved.insert(fqn.to_string());
        for surrogate in pending {
            for (field, kept, dropped) in flags.combine(surrogate) {
                warn!(symbol = fqn, field, kept = %kept, dropped = %dropped, "conflicting surrogate flags, keeping first");
                self.conflicts.push(FlagConflict {
                    target: fqn.to_string(),
                    field,
                    kept,
                    dropped,
                });
            }
        }
    }

    /// Targets that were named by a surrogate but never resolved.
    pub fn pending_targets(&self) -> impl Iterator<Item = &str> {
        self.surrogates
            .keys()
            .filter(|target| !self.resolved.contains(*target))
            .map(String::as_str)
    }

    pub fn conflicts(&self) -> &[FlagConflict] {
        &self.conflicts
    }

    /// Expand one `Name:T=int;U=$numerics` hint line into its bind name and
    /// the Cartesian product of its `$`-set parameters.
    pub fn expand_template_hint(&self, line: &str) -> Option<TemplateHint> {
        let (bind_name, assignments) = line.split_once(':')?;
        let mut combinations: Vec<TemplateBinding> = vec![Vec::new()];
        for assignment in assignments.split(';').filter(|a| !a.trim().is_empty()) {
            let (param, value) = assignment.split_once('=')?;
            let (param, value) = (param.trim(), value.trim());
            let choices: Vec<String> = match value.strip_prefix('$') {
                Some(set_name) => match self.type_sets.get(set_name) {
                    Some(set) => set.clone(),
                    None => {
                        warn!(hint = line, set = set_name, "unknown template type set");
                        return None;
                    }
                },
                None => vec![value.to_string()],
            };
            combinations = combinations
                .into_iter()
                .flat_map(|partial| {
                    choices.iter().map(move |choice| {
                        let mut next = partial.clone();
                        next.push((param.to_string(), choice.clone()));
                        next
                    })
                })
                .collect();
        }
        Some(TemplateHint {
            bind_name: bind_name.trim().to_string(),
            combinations,
        })
    }
}

// ---------------------------------------------------------------------------
// Directive extraction
// ---------------------------------------------------------------------------

/// `(directive, args)` pairs in document order, from the node's own
/// descriptions only.
fn directives(node: Node<'_, '_>) -> Vec<(String, Option<String>)> {
    ["briefdescription", "detaileddescription"]
        .into_iter()
        .filter_map(|tag| xml::child(node, tag))
        .flat_map(|description| description.descendants())
        .filter(|d| d.has_tag_name("ulink"))
        .filter_map(|link| link.attribute("url")?.strip_prefix(DIRECTIVE_PREFIX))
        .map(|directive| match directive.split_once(':') {
            Some((name, args)) => (name.to_string(), Some(args.to_string())),
            None => (directive.to_string(), None),
        })
        .collect()
}

fn parse_visibility(value: &str) -> Option<Visibility> {
    match value {
        "public" => Some(Visibility::Public),
        "protected" => Some(Visibility::Protected),
        "private" => Some(Visibility::Private),
        _ => None,
    }
}

/// Parse the directives attached to `node` (a `compounddef` or `memberdef`)
/// whose fully-qualified name is `fqn`.
///
/// A `surrogate` directive is handled last: the declaring symbol becomes
/// `nobind` and a copy of its other flags is buffered for the target.
/// Buffered surrogates for `fqn` itself are then merged in.
pub fn get_element_flags(node: Node<'_, '_>, fqn: &str, ctx: &mut FlagContext) -> Flags {
    let mut flags = Flags::default();
    for (directive, args) in directives(node) {
        let value = args.clone().unwrap_or_default();
        let malformed = || warn!(symbol = fqn, directive = %directive, args = ?args, "ignoring malformed directive");
        match directive.as_str() {
            "helper" => flags.helpers.push(value),
            "template_hint" => match ctx.expand_template_hint(&value) {
                Some(hint) => match flags
                    .template_hints
                    .iter_mut()
                    .find(|h| h.bind_name == hint.bind_name)
                {
                    Some(existing) => existing.combinations.extend(hint.combinations),
                    None => flags.template_hints.push(hint),
                },
                None => malformed(),
            },
            "nobind" => flags.nobind = true,
            "additional_include" => flags.additional_includes.push(value),
            "as_property" => flags.as_property = true,
            "copy_parent_items" => flags.copy_parent_items = true,
            "proxy" if !value.is_empty() => flags.proxy = Some(value),
            "noconstructor" => flags.noconstructor = true,
            "load_priority" => match value.parse() {
                Ok(priority) => flags.load_priority = priority,
                Err(_) => malformed(),
            },
            "rename" if !value.is_empty() => flags.rename = Some(value),
            "rename_parameter" => match value.split_once(':') {
                Some((from, to)) => flags
                    .rename_parameters
                    .push((from.to_string(), to.to_string())),
                None => malformed(),
            },
            "bind_code" if !value.is_empty() => flags.bind_code = Some(value),
            "meta" => match value.as_str() {
                "NonCopyable" => {
                    flags.meta.insert(MetaTag::NonCopyable);
                }
                _ => malformed(),
            },
            "hook" => match value.split_once(':') {
                Some(("bind", code)) => flags.hooks.push(Hook {
                    trigger: HookTrigger::Bind,
                    code: code.to_string(),
                }),
                Some(("inherit", code)) => flags.hooks.push(Hook {
                    trigger: HookTrigger::Inherit,
                    code: code.to_string(),
                }),
                _ => malformed(),
            },
            "merge_template_specialisations_as" if !value.is_empty() => {
                flags.merge_template_specialisations_as = Some(value)
            }
            "visibility" => match parse_visibility(&value) {
                Some(visibility) => flags.visibility = Some(visibility),
                None => malformed(),
            },
            "surrogate" if !value.is_empty() => flags.surrogate_for.push(value),
            _ => malformed(),
        }
    }

    if !flags.surrogate_for.is_empty() {
        let targets = std::mem::take(&mut flags.surrogate_for);
        for target in &targets {
            ctx.buffer_surrogate(target, flags.clone());
        }
        flags.surrogate_for = targets;
        flags.nobind = true;
    }
    ctx.apply_surrogates(fqn, node.attribute("id").unwrap_or_default(), &mut flags);
    flags
}

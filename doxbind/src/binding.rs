//! Binding-decision engine.
//!
//! Every callable is turned into a structured [`BindingStrategy`]; the
//! flavour only decides how a strategy is spelled in glue code. Rules are
//! tried in a fixed order and the first one that applies wins:
//!
//! 1. deleted or `nobind` callables are dropped
//! 2. a `proxy` flag redirects the call to the replacement symbol
//! 3. `bind_code` replaces the binding expression verbatim
//! 4. parameters that cannot be bound as declared (references to abstract
//!    types, rvalue references, mutable references to primitives) and
//!    `const&` returns of non-copyable types go through a call wrapper
//! 5. default-valued parameters expand into one wrapper per prefix, each
//!    adapted as above
//! 6. overloaded or force-cast callables are bound through a `static_cast`
//! 7. anything else binds its address directly

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cpp_type::CppType;
use crate::ident::{clean_capitalize, last_segment};
use crate::model::{Class, Database, Function, FunctionSlot, Visibility, strip_template_args};

/// Why a callable needs a wrapper lambda.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperReason {
    Proxy,
    AbstractReference,
    RvalueReference,
    PrimitiveReference,
    NonCopyableReturn,
    DefaultParameters,
    Constructor,
}

/// `[](params) -> ret { return prefix call(args); }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallWrapper {
    /// `(type, name)` pairs, the receiver first for methods.
    pub parameters: Vec<(String, String)>,
    pub return_type: String,
    pub call: String,
    pub arguments: Vec<String>,
    pub call_prefix: String,
    pub reason: WrapperReason,
}

impl fmt::Display for CallWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters: Vec<String> = self
            .parameters
            .iter()
            .map(|(ty, name)| format!("{ty} {name}"))
            .collect();
        write!(
            f,
            "[]({}) -> {} {{ return {}{}({}); }}",
            parameters.join(", "),
            self.return_type,
            self.call_prefix,
            self.call,
            self.arguments.join(", ")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BindingStrategy {
    Deleted { reason: String },
    /// Address of the callable, e.g. `&obe::Circle::area`.
    Direct { target: String },
    StaticCast {
        return_type: String,
        /// Owning class for member pointers, `None` for free functions and
        /// static methods.
        owner: Option<String>,
        parameters: Vec<String>,
        qualifiers: Vec<String>,
        target: String,
    },
    CallWrapper(CallWrapper),
    Overload { variants: Vec<BindingStrategy> },
    Verbatim { code: String },
}

impl BindingStrategy {
    pub fn is_deleted(&self) -> bool {
        matches!(self, BindingStrategy::Deleted { .. })
    }

    /// Flatten nested overloads, dropping deleted variants.
    fn into_variants(self) -> Vec<BindingStrategy> {
        match self {
            BindingStrategy::Deleted { .. } => Vec::new(),
            BindingStrategy::Overload { variants } => variants
                .into_iter()
                .flat_map(BindingStrategy::into_variants)
                .collect(),
            other => vec![other],
        }
    }

    /// C++ spelling of a single strategy; `None` for deleted and overload
    /// strategies, whose spelling depends on the flavour.
    pub fn cpp_expression(&self) -> Option<String> {
        match self {
            BindingStrategy::Direct { target } => Some(target.clone()),
            BindingStrategy::StaticCast {
                return_type,
                owner,
                parameters,
                qualifiers,
                target,
            } => {
                let owner = owner.as_deref().map(|o| format!("{o}::")).unwrap_or_default();
                let mut qualifiers = qualifiers.join(" ");
                if !qualifiers.is_empty() {
                    qualifiers.insert(0, ' ');
                }
                Some(format!(
                    "static_cast<{return_type} ({owner}*)({}){qualifiers}>({target})",
                    parameters.join(", ")
                ))
            }
            BindingStrategy::CallWrapper(wrapper) => Some(wrapper.to_string()),
            BindingStrategy::Verbatim { code } => Some(code.clone()),
            BindingStrategy::Deleted { .. } | BindingStrategy::Overload { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Table key a binding is stored under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "key", content = "name", rename_all = "snake_case")]
pub enum BindKey {
    Named(String),
    /// A metafunction of the scripting side (`addition`, `call`, ...).
    Meta(&'static str),
}

const META_OPERATORS: &[(&str, &str)] = &[
    ("+", "addition"),
    ("*", "multiplication"),
    ("/", "division"),
    ("==", "equal_to"),
    ("()", "call"),
    ("<", "less_than"),
    ("<=", "less_than_or_equal_to"),
    ("[]", "index"),
    ("%", "modulus"),
];

/// Covered by another metafunction or meaningless on the scripting side.
const DROPPED_OPERATORS: &[&str] = &["!=", "+=", "-=", "*=", "/=", "="];

const OPERATOR_VERBS: &[(&str, &str)] = &[
    ("++", "increment"),
    ("--", "decrement"),
    ("+", "add"),
    ("-", "subtract"),
    ("*", "multiply"),
    ("/", "divide"),
    ("!", "negate"),
    ("~", "complement"),
    ("%", "modulus"),
    ("==", "equal"),
    ("!=", "not_equal"),
    (">", "greater"),
    ("<", "less"),
    (">=", "greater_equal"),
    ("<=", "less_equal"),
    ("<=>", "three_way_comparison"),
    ("&&", "logical_and"),
    ("||", "logical_or"),
    ("&", "bitwise_and"),
    ("|", "bitwise_or"),
    ("^", "bitwise_xor"),
    ("<<", "left_shift"),
    (">>", "right_shift"),
    ("%=", "modulus_assign"),
    (">>=", "right_shift_assign"),
    ("<<=", "left_shift_assign"),
    ("&=", "bitwise_and_assign"),
    ("|=", "bitwise_or_assign"),
    ("^=", "bitwise_xor_assign"),
    (",", "comma"),
    ("->*", "indirection_structure_dereference"),
    ("new", "allocate"),
    ("delete", "deallocate"),
    ("new[]", "allocate_array"),
    ("delete[]", "deallocate_array"),
];

/// `operator+` -> `+`; `None` for ordinary names such as `operatorCount`.
pub fn operator_symbol(name: &str) -> Option<&str> {
    let rest = name.strip_prefix("operator")?;
    let symbol = rest.trim();
    let first = symbol.chars().next()?;
    if first.is_ascii_alphanumeric() || first == '_' {
        // `operator new` is the only spelled-out operator we translate.
        return matches!(symbol, "new" | "delete" | "new[]" | "delete[]").then_some(symbol);
    }
    Some(symbol)
}

/// Explicit operands of an operator overload, the receiver included.
fn operator_operands(function: &Function) -> Vec<String> {
    let mut operands = Vec::new();
    if let Some(class) = &function.from_class
        && !function.qualifiers.is_static
    {
        operands.push(class.clone());
    }
    operands.extend(function.parameters.iter().map(|p| p.ty.base_name().to_string()));
    operands
}

fn operand_name(ty: &str) -> String {
    clean_capitalize(last_segment(strip_template_args(ty)))
}

/// Key a callable is bound under; `None` when the operator is not bound.
pub fn bind_key(function: &Function) -> Option<BindKey> {
    let Some(symbol) = operator_symbol(&function.name) else {
        return Some(BindKey::Named(function.bind_name().to_string()));
    };
    if function.flags.rename.is_some() {
        return Some(BindKey::Named(function.bind_name().to_string()));
    }
    if DROPPED_OPERATORS.contains(&symbol) {
        debug!(function = %function.fqn(), operator = symbol, "operator not bound");
        return None;
    }

    let operands = operator_operands(function);
    if symbol == "-" {
        return Some(BindKey::Meta(if operands.len() <= 1 {
            "unary_minus"
        } else {
            "subtraction"
        }));
    }
    if let Some((_, meta)) = META_OPERATORS.iter().find(|(op, _)| *op == symbol) {
        return Some(BindKey::Meta(*meta));
    }
    let Some((_, verb)) = OPERATOR_VERBS.iter().find(|(op, _)| *op == symbol) else {
        warn!(function = %function.fqn(), operator = symbol, "unknown operator, not bound");
        return None;
    };
    let verb: String = verb.split('_').map(clean_capitalize).collect();
    let before = operands.first().map(|ty| operand_name(ty)).unwrap_or_default();
    let after = operands.get(1).map(|ty| operand_name(ty)).unwrap_or_default();
    Some(BindKey::Named(format!("{before}{verb}{after}")))
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Whether `ty` names a class that cannot be instantiated.
fn is_abstract_type(db: &Database, ty: &CppType) -> bool {
    db.class(ty.base_name()).is_some_and(|class| class.is_abstract)
}

fn is_non_copyable_type(db: &Database, ty: &CppType) -> bool {
    db.class(ty.base_name()).is_some_and(|class| class.flags.is_non_copyable())
}

/// Parameter spelling and forwarding expression once adapted for binding.
struct AdaptedParameter {
    ty: String,
    name: String,
    argument: String,
    reason: Option<WrapperReason>,
}

fn adapt_parameter(db: &Database, ty: &CppType, name: &str) -> AdaptedParameter {
    let qualifiers = ty.qualifiers();
    let mut adapted = AdaptedParameter {
        ty: ty.to_string(),
        name: name.to_string(),
        argument: name.to_string(),
        reason: None,
    };
    if qualifiers.is_lvalue_ref() && is_abstract_type(db, ty) {
        let mut pointer = ty.clone();
        if let Some(last) = pointer.qualifiers_mut().postfix.last_mut() {
            *last = if last == "const&" { "const*".into() } else { "*".into() };
        }
        adapted.ty = pointer.to_string();
        adapted.argument = format!("*{name}");
        adapted.reason = Some(WrapperReason::AbstractReference);
    } else if qualifiers.is_rvalue_ref() {
        let mut value = ty.clone();
        value.qualifiers_mut().postfix.pop();
        adapted.ty = value.to_string();
        adapted.argument = format!("std::move({name})");
        adapted.reason = Some(WrapperReason::RvalueReference);
    } else if qualifiers.is_lvalue_ref() && !qualifiers.is_const() && ty.is_primitive() {
        adapted.ty = ty.unqualified().to_string();
        adapted.reason = Some(WrapperReason::PrimitiveReference);
    }
    adapted
}

/// Whether any parameter must be adapted through a wrapper.
pub fn requires_proxy(db: &Database, function: &Function) -> bool {
    function
        .parameters
        .iter()
        .any(|p| adapt_parameter(db, &p.ty, &p.name).reason.is_some())
}

fn is_constructor(function: &Function) -> bool {
    function
        .from_class
        .as_deref()
        .is_some_and(|class| strip_template_args(class) == function.name)
}

fn template_suffix(function: &Function) -> String {
    if function.template_args.is_empty() {
        String::new()
    } else {
        format!("<{}>", function.template_args.join(", "))
    }
}

/// The callable's name as used in a call expression, template arguments
/// included.
fn callee(function: &Function) -> String {
    format!("{}{}", function.fqn(), template_suffix(function))
}

fn is_member(function: &Function) -> bool {
    function.from_class.is_some() && !function.qualifiers.is_static && !is_constructor(function)
}

fn return_type_text(function: &Function) -> String {
    match &function.return_type {
        Some(ty) => ty.to_string(),
        None => function.class_fqn().unwrap_or_else(|| "void".to_string()),
    }
}

/// Build the wrapper for `function` called with its first `arity`
/// parameters.
fn call_wrapper(
    db: &Database,
    function: &Function,
    arity: usize,
    call_target: Option<&str>,
    reason: WrapperReason,
) -> CallWrapper {
    let mut wrapper = CallWrapper {
        parameters: Vec::new(),
        return_type: return_type_text(function),
        call: String::new(),
        arguments: Vec::new(),
        call_prefix: String::new(),
        reason,
    };
    let receiver = is_member(function).then(|| function.class_fqn()).flatten();
    if let Some(class) = &receiver {
        let constness = if function.qualifiers.is_const { "const " } else { "" };
        wrapper.parameters.push((format!("{constness}{class}*"), "self".to_string()));
    }
    wrapper.call = match (call_target, &receiver) {
        (Some(target), Some(_)) => {
            wrapper.arguments.push("self".to_string());
            target.to_string()
        }
        (Some(target), None) => target.to_string(),
        (None, Some(_)) => format!("self->{}{}", function.name, template_suffix(function)),
        (None, None) if is_constructor(function) => return_type_text(function),
        (None, None) => callee(function),
    };
    for parameter in function.parameters.iter().take(arity) {
        let adapted = adapt_parameter(db, &parameter.ty, &parameter.name);
        wrapper.parameters.push((adapted.ty, adapted.name));
        wrapper.arguments.push(adapted.argument);
    }
    if let Some(ty) = &function.return_type
        && ty.qualifiers().is_const_ref()
        && is_non_copyable_type(db, ty)
    {
        let mut pointer = ty.unqualified();
        pointer.qualifiers_mut().prefix.push("const".into());
        pointer.qualifiers_mut().postfix.push("*".into());
        wrapper.return_type = pointer.to_string();
        wrapper.call_prefix = "&".to_string();
    }
    wrapper
}

/// First reason a callable cannot be bound by address, if any.
fn wrapper_reason(db: &Database, function: &Function) -> Option<WrapperReason> {
    let parameter_reason = function
        .parameters
        .iter()
        .find_map(|p| adapt_parameter(db, &p.ty, &p.name).reason);
    if parameter_reason.is_some() {
        return parameter_reason;
    }
    function
        .return_type
        .as_ref()
        .is_some_and(|ty| ty.qualifiers().is_const_ref() && is_non_copyable_type(db, ty))
        .then_some(WrapperReason::NonCopyableReturn)
}

fn static_cast(function: &Function) -> BindingStrategy {
    let owner = is_member(function).then(|| function.class_fqn()).flatten();
    let mut qualifiers = Vec::new();
    if owner.is_some() && function.qualifiers.is_const {
        qualifiers.push("const".to_string());
    }
    if owner.is_some() && function.qualifiers.is_volatile {
        qualifiers.push("volatile".to_string());
    }
    BindingStrategy::StaticCast {
        return_type: return_type_text(function),
        owner,
        parameters: function.parameters.iter().map(|p| p.ty.to_string()).collect(),
        qualifiers,
        target: format!("&{}", callee(function)),
    }
}

/// Decide how one callable is bound. `is_overload` is set when the callable
/// shares its bind key with other callables.
///
/// Rules apply in order: deletion, proxy, verbatim code, default expansion,
/// parameter adaptation, constructor wrapping, static cast, direct pointer.
/// Default expansion wins over the single-wrapper adaptation rules because
/// every prefix wrapper it produces goes through [`call_wrapper`], which
/// already adapts each kept parameter (rvalue references are taken by value
/// and moved, abstract references become pointers).
pub fn decide_binding(db: &Database, function: &Function, is_overload: bool) -> BindingStrategy {
    if function.deleted {
        return BindingStrategy::Deleted {
            reason: "deleted".to_string(),
        };
    }
    if function.flags.nobind {
        return BindingStrategy::Deleted {
            reason: "nobind".to_string(),
        };
    }
    if let Some(proxy) = &function.flags.proxy {
        if requires_proxy(db, function) {
            let arity = function.parameters.len();
            return BindingStrategy::CallWrapper(call_wrapper(
                db,
                function,
                arity,
                Some(proxy),
                WrapperReason::Proxy,
            ));
        }
        return BindingStrategy::Direct {
            target: format!("&{proxy}"),
        };
    }
    if let Some(code) = &function.flags.bind_code {
        return BindingStrategy::Verbatim { code: code.clone() };
    }

    let first_default = function
        .parameters
        .iter()
        .position(|p| p.default.is_some());
    if let Some(mandatory) = first_default {
        let variants = (mandatory..=function.parameters.len())
            .map(|arity| {
                BindingStrategy::CallWrapper(call_wrapper(
                    db,
                    function,
                    arity,
                    None,
                    WrapperReason::DefaultParameters,
                ))
            })
            .collect();
        return BindingStrategy::Overload { variants };
    }
    if let Some(reason) = wrapper_reason(db, function) {
        let arity = function.parameters.len();
        return BindingStrategy::CallWrapper(call_wrapper(db, function, arity, None, reason));
    }
    if is_constructor(function) {
        let arity = function.parameters.len();
        return BindingStrategy::CallWrapper(call_wrapper(
            db,
            function,
            arity,
            None,
            WrapperReason::Constructor,
        ));
    }
    if is_overload || function.force_cast {
        return static_cast(function);
    }
    BindingStrategy::Direct {
        target: format!("&{}", callee(function)),
    }
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingEntry {
    pub key: BindKey,
    /// `Overload` when several callables share the key.
    pub strategy: BindingStrategy,
    pub as_property: bool,
}

/// Bind every callable of a slot, grouped by bind key in declaration order.
pub fn plan_callable(db: &Database, slot: &FunctionSlot) -> Vec<BindingEntry> {
    let functions = match slot {
        FunctionSlot::Placeholder(placeholder) => {
            debug!(name = %placeholder.name, reason = %placeholder.reason, "placeholder not bound");
            return Vec::new();
        }
        _ => slot.functions(),
    };
    let is_overload = functions.len() > 1 || slot.force_cast();
    let as_property = slot.flags().is_some_and(|flags| flags.as_property);

    let mut grouped: Vec<(BindKey, Vec<BindingStrategy>)> = Vec::new();
    for function in functions {
        let Some(key) = bind_key(function) else {
            continue;
        };
        let strategy = decide_binding(db, function, is_overload);
        if let BindingStrategy::Deleted { reason } = &strategy {
            debug!(function = %function.fqn(), reason = %reason, "not bound");
            continue;
        }
        match grouped.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, strategies)) => strategies.push(strategy),
            None => grouped.push((key, vec![strategy])),
        }
    }

    grouped
        .into_iter()
        .filter_map(|(key, strategies)| {
            let mut variants: Vec<BindingStrategy> = strategies
                .into_iter()
                .flat_map(BindingStrategy::into_variants)
                .collect();
            let strategy = match variants.len() {
                0 => return None,
                1 => variants.remove(0),
                _ => BindingStrategy::Overload { variants },
            };
            Some(BindingEntry {
                key,
                strategy,
                as_property,
            })
        })
        .collect()
}

/// Constructor signatures of a class, one list of parameter types per
/// bindable arity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConstructorPlan {
    pub signatures: Vec<Vec<String>>,
    pub constructible: bool,
}

/// Work out which constructor signatures can be bound and whether the class
/// can be constructed from scripts at all. A defaulted parameter adds one
/// signature per reachable arity; templated, deleted and proxy-requiring
/// constructors are skipped, and a class whose constructors were all
/// skipped is not constructible.
///
/// A class the scripting side could not destroy (deleted or non-public
/// destructor) is never constructible. Constructors rejected during
/// extraction count as skipped.
pub fn plan_constructors(db: &Database, class: &Class) -> ConstructorPlan {
    if class.is_abstract || class.flags.noconstructor {
        return ConstructorPlan::default();
    }
    if let Some(destructor) = &class.destructor
        && (destructor.deleted || destructor.visibility != Visibility::Public)
    {
        debug!(class = %class.fqn(), "destructor not reachable, class not constructible");
        return ConstructorPlan::default();
    }
    let private_constructor = class
        .private_methods
        .values()
        .any(|slot| slot.name() == strip_template_args(&class.name));

    let mut signatures = Vec::new();
    let mut skipped = class.rejected_constructors.len();
    for constructor in &class.constructors {
        if constructor.deleted || constructor.template || requires_proxy(db, constructor) {
            skipped += 1;
            continue;
        }
        let types: Vec<String> = constructor.parameters.iter().map(|p| p.ty.to_string()).collect();
        let mandatory = constructor
            .parameters
            .iter()
            .position(|p| p.default.is_some())
            .unwrap_or(types.len());
        for arity in mandatory..=types.len() {
            signatures.push(types[..arity].to_vec());
        }
    }
    let constructible = !private_constructor && (skipped == 0 || !signatures.is_empty());
    if !constructible {
        debug!(class = %class.fqn(), skipped, "class not constructible");
    }
    ConstructorPlan {
        signatures,
        constructible,
    }
}

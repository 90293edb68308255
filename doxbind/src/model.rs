//! Entity model: namespaces, classes, callables, attributes, enums, globals
//! and typedefs, plus the run's flat [`Database`].
//!
//! Entities refer to each other by fully-qualified name only.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cpp_type::CppType;
use crate::flags::Flags;
use crate::ident::make_fqn;
use crate::location::Location;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn from_prot(prot: Option<&str>) -> Self {
        match prot {
            Some("protected") => Visibility::Protected,
            Some("private") => Visibility::Private,
            _ => Visibility::Public,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemberQualifiers {
    pub is_const: bool,
    pub is_static: bool,
    pub is_volatile: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub ty: CppType,
    pub default: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub id: String,
    pub name: String,
    pub namespace: String,
    /// Owning class name relative to `namespace`, `None` for free functions.
    pub from_class: Option<String>,
    pub definition: String,
    pub parameters: Vec<Parameter>,
    /// `None` for constructors and destructors.
    pub return_type: Option<CppType>,
    pub template: bool,
    pub template_params: Vec<String>,
    /// Concrete arguments of a specialised function template.
    pub template_args: Vec<String>,
    pub qualifiers: MemberQualifiers,
    pub flags: Flags,
    /// A bare address would be ambiguous; bind through a cast.
    pub force_cast: bool,
    pub description: String,
    pub deleted: bool,
    pub is_abstract: bool,
    pub visibility: Visibility,
    pub location: Location,
}

impl Function {
    pub fn class_fqn(&self) -> Option<String> {
        self.from_class
            .as_deref()
            .map(|class| make_fqn(&self.namespace, None, class))
    }

    pub fn fqn(&self) -> String {
        make_fqn(&self.namespace, self.from_class.as_deref(), &self.name)
    }

    /// Name used on the scripting side.
    pub fn bind_name(&self) -> &str {
        self.flags.rename.as_deref().unwrap_or(&self.name)
    }

    pub fn is_method(&self) -> bool {
        self.from_class.is_some()
    }
}

/// A callable that was parsed but cannot be bound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionPlaceholder {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub from_class: Option<String>,
    pub visibility: Visibility,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverloadGroup {
    pub name: String,
    pub namespace: String,
    pub from_class: Option<String>,
    /// Declaration order.
    pub overloads: Vec<Function>,
    pub flags: Flags,
    pub force_cast: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "slot", rename_all = "snake_case")]
pub enum FunctionSlot {
    Concrete(Function),
    Overload(OverloadGroup),
    Placeholder(FunctionPlaceholder),
}

impl FunctionSlot {
    pub fn name(&self) -> &str {
        match self {
            FunctionSlot::Concrete(f) => &f.name,
            FunctionSlot::Overload(g) => &g.name,
            FunctionSlot::Placeholder(p) => &p.name,
        }
    }

    pub fn flags(&self) -> Option<&Flags> {
        match self {
            FunctionSlot::Concrete(f) => Some(&f.flags),
            FunctionSlot::Overload(g) => Some(&g.flags),
            FunctionSlot::Placeholder(_) => None,
        }
    }

    /// Concrete callables held by the slot, in declaration order.
    pub fn functions(&self) -> &[Function] {
        match self {
            FunctionSlot::Concrete(f) => std::slice::from_ref(f),
            FunctionSlot::Overload(g) => &g.overloads,
            FunctionSlot::Placeholder(_) => &[],
        }
    }

    pub fn functions_mut(&mut self) -> &mut [Function] {
        match self {
            FunctionSlot::Concrete(f) => std::slice::from_mut(f),
            FunctionSlot::Overload(g) => &mut g.overloads,
            FunctionSlot::Placeholder(_) => Default::default(),
        }
    }

    pub fn set_force_cast(&mut self) {
        match self {
            FunctionSlot::Concrete(f) => f.force_cast = true,
            FunctionSlot::Overload(g) => g.force_cast = true,
            FunctionSlot::Placeholder(_) => {}
        }
    }

    pub fn force_cast(&self) -> bool {
        match self {
            FunctionSlot::Concrete(f) => f.force_cast,
            FunctionSlot::Overload(g) => g.force_cast,
            FunctionSlot::Placeholder(_) => false,
        }
    }

    /// Retarget every held callable to another owner (inherited methods).
    pub fn rehome(&mut self, namespace: &str, from_class: &str) {
        match self {
            FunctionSlot::Concrete(f) => {
                f.namespace = namespace.to_string();
                f.from_class = Some(from_class.to_string());
            }
            FunctionSlot::Overload(g) => {
                g.namespace = namespace.to_string();
                g.from_class = Some(from_class.to_string());
                for f in &mut g.overloads {
                    f.namespace = namespace.to_string();
                    f.from_class = Some(from_class.to_string());
                }
            }
            FunctionSlot::Placeholder(p) => {
                p.namespace = namespace.to_string();
                p.from_class = Some(from_class.to_string());
            }
        }
    }
}

/// Insert `incoming` under `key`, grouping same-named callables.
///
/// Two concrete callables form an overload group in declaration order. A
/// concrete callable meeting a placeholder survives it but must then be cast.
pub fn insert_function(map: &mut BTreeMap<String, FunctionSlot>, key: &str, incoming: FunctionSlot) {
    let Some(existing) = map.remove(key) else {
        map.insert(key.to_string(), incoming);
        return;
    };
    let merged = match (existing, incoming) {
        (FunctionSlot::Concrete(first), FunctionSlot::Concrete(second)) => {
            FunctionSlot::Overload(OverloadGroup {
                name: first.name.clone(),
                namespace: first.namespace.clone(),
                from_class: first.from_class.clone(),
                flags: first.flags.clone(),
                force_cast: first.force_cast,
                overloads: vec![first, second],
            })
        }
        (FunctionSlot::Overload(mut group), FunctionSlot::Concrete(next)) => {
            group.overloads.push(next);
            FunctionSlot::Overload(group)
        }
        (FunctionSlot::Overload(mut group), FunctionSlot::Overload(other)) => {
            group.overloads.extend(other.overloads);
            group.force_cast |= other.force_cast;
            FunctionSlot::Overload(group)
        }
        (FunctionSlot::Concrete(first), FunctionSlot::Overload(mut group)) => {
            group.overloads.insert(0, first);
            FunctionSlot::Overload(group)
        }
        (FunctionSlot::Placeholder(_), FunctionSlot::Concrete(mut real)) => {
            real.force_cast = true;
            FunctionSlot::Concrete(real)
        }
        (FunctionSlot::Placeholder(_), FunctionSlot::Overload(mut group)) => {
            group.force_cast = true;
            FunctionSlot::Overload(group)
        }
        (mut real, FunctionSlot::Placeholder(_)) => {
            real.set_force_cast();
            real
        }
    };
    map.insert(key.to_string(), merged);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub from_class: String,
    pub ty: CppType,
    pub qualifiers: MemberQualifiers,
    pub flags: Flags,
    pub description: String,
    pub visibility: Visibility,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Class {
    pub id: String,
    pub name: String,
    pub namespace: String,
    /// Fully-qualified where resolvable, literal text otherwise.
    pub bases: Vec<String>,
    pub constructors: Vec<Function>,
    /// Public constructors whose signature could not be parsed.
    pub rejected_constructors: Vec<FunctionPlaceholder>,
    /// Declared destructor of any visibility.
    pub destructor: Option<Function>,
    /// Public methods.
    pub methods: BTreeMap<String, FunctionSlot>,
    /// Protected and private methods, kept for abstract inference and
    /// constructibility.
    pub private_methods: BTreeMap<String, FunctionSlot>,
    pub attributes: BTreeMap<String, Attribute>,
    pub is_abstract: bool,
    pub template: bool,
    pub template_params: Vec<String>,
    pub flags: Flags,
    pub description: String,
    pub visibility: Visibility,
    pub location: Location,
}

impl Class {
    pub fn fqn(&self) -> String {
        make_fqn(&self.namespace, None, &self.name)
    }

    pub fn bind_name(&self) -> &str {
        self.flags.rename.as_deref().unwrap_or(&self.name)
    }

    /// Every method slot regardless of visibility.
    pub fn all_methods(&self) -> impl Iterator<Item = &FunctionSlot> {
        self.methods.values().chain(self.private_methods.values())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumValue {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enum {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub values: Vec<EnumValue>,
    pub flags: Flags,
    pub description: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Global {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub ty: CppType,
    pub definition: String,
    pub initializer: Option<String>,
    pub qualifiers: MemberQualifiers,
    pub flags: Flags,
    pub description: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Typedef {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub ty: CppType,
    pub definition: String,
    pub flags: Flags,
    pub description: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Namespace {
    pub id: String,
    /// Fully-qualified.
    pub name: String,
    pub flags: Flags,
    pub description: String,
}

/// Every entity of the run, keyed by fully-qualified name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Database {
    pub namespaces: BTreeMap<String, Namespace>,
    pub classes: BTreeMap<String, Class>,
    pub functions: BTreeMap<String, FunctionSlot>,
    pub enums: BTreeMap<String, Enum>,
    pub globals: BTreeMap<String, Global>,
    pub typedefs: BTreeMap<String, Typedef>,
}

impl Database {
    /// Class by name, ignoring template arguments (`Foo<int>` finds `Foo`).
    pub fn class(&self, name: &str) -> Option<&Class> {
        self.classes
            .get(name)
            .or_else(|| self.classes.get(strip_template_args(name)))
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
            && self.functions.is_empty()
            && self.enums.is_empty()
            && self.globals.is_empty()
            && self.typedefs.is_empty()
    }
}

/// `obe::Foo<int>` -> `obe::Foo`.
pub fn strip_template_args(name: &str) -> &str {
    name.split('<').next().unwrap_or(name).trim_end()
}

//! Whole-database passes run between extraction and binding generation:
//! template specialisation, abstract inference, base flattening, inherit
//! hooks and parent item copying.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::cpp_type::CppType;
use crate::flags::{Hook, HookTrigger, TemplateBinding};
use crate::ident::{clean_capitalize, last_segment, make_fqn};
use crate::model::*;

/// Run every pass in order. `source_namespaces` are the own-source roots
/// whose classes survive base flattening.
pub fn resolve(db: &mut Database, source_namespaces: &[String]) {
    specialise_class_templates(db);
    specialise_function_templates(db);
    infer_abstract_classes(db);
    copy_parent_bases(db, source_namespaces);
    apply_inherit_hooks(db);
    copy_parent_items(db);
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

fn template_arguments(binding: &TemplateBinding) -> Vec<String> {
    binding.iter().map(|(_, value)| value.clone()).collect()
}

/// Bind name for one combination; combinations sharing a hint name are told
/// apart by their argument types.
fn specialisation_name(bind_name: &str, binding: &TemplateBinding, shared: bool) -> String {
    if !shared {
        return bind_name.to_string();
    }
    let suffix: String = binding
        .iter()
        .map(|(_, value)| {
            clean_capitalize(&last_segment(value).replace(' ', "_"))
                .split('_')
                .map(clean_capitalize)
                .collect::<String>()
        })
        .collect();
    format!("{bind_name}{suffix}")
}

fn specialise_function(function: &Function, binding: &TemplateBinding) -> Function {
    let mut specialised = function.clone();
    specialised.template = false;
    specialised.template_args = template_arguments(binding);
    if let Some(ty) = specialised.return_type.as_mut() {
        ty.substitute(binding);
    }
    for parameter in &mut specialised.parameters {
        parameter.ty.substitute(binding);
    }
    specialised
}

/// Replace every hinted class template by one class per hint combination.
pub fn specialise_class_templates(db: &mut Database) {
    let templates: Vec<String> = db
        .classes
        .iter()
        .filter(|(_, class)| class.template)
        .map(|(fqn, _)| fqn.clone())
        .collect();

    let mut merges: BTreeMap<String, Vec<Function>> = BTreeMap::new();
    for fqn in templates {
        let Some(template) = db.classes.remove(&fqn) else {
            continue;
        };
        if template.flags.template_hints.is_empty() {
            warn!(class = %fqn, "class template without template hints is not bound");
            let mut template = template;
            template.flags.nobind = true;
            db.classes.insert(fqn, template);
            continue;
        }

        for hint in &template.flags.template_hints {
            let shared = hint.combinations.len() > 1;
            for binding in &hint.combinations {
                let spec = specialise_class(&template, &hint.bind_name, binding, shared, &mut merges);
                debug!(template = %fqn, specialisation = %spec.fqn(), rename = spec.bind_name(), "specialised class");
                db.classes.insert(spec.fqn(), spec);
            }
        }
    }

    for (alias, mut functions) in merges {
        let Some(first) = functions.first() else {
            continue;
        };
        let namespace = first.namespace.clone();
        let from_class = first.from_class.clone();
        let flags = first.flags.clone();
        for function in &mut functions {
            function.flags.rename = Some(alias.clone());
        }
        debug!(alias = %alias, overloads = functions.len(), "merged template specialisations");
        db.functions.insert(
            make_fqn(&namespace, None, &alias),
            FunctionSlot::Overload(OverloadGroup {
                name: alias,
                namespace,
                from_class,
                overloads: functions,
                flags,
                force_cast: true,
            }),
        );
    }
}

fn specialise_class(
    template: &Class,
    bind_name: &str,
    binding: &TemplateBinding,
    shared: bool,
    merges: &mut BTreeMap<String, Vec<Function>>,
) -> Class {
    let mut spec = template.clone();
    spec.name = format!("{}<{}>", template.name, template_arguments(binding).join(", "));
    spec.template = false;
    spec.flags.template_hints.clear();
    spec.flags.rename = Some(specialisation_name(bind_name, binding, shared));
    let spec_fqn = spec.fqn();

    let mut specialise = |function: &mut Function, is_constructor: bool| {
        function.from_class = Some(spec.name.clone());
        for parameter in &mut function.parameters {
            parameter.ty.substitute(binding);
        }
        if is_constructor && function.return_type.is_none() {
            function.return_type = Some(CppType::base(spec_fqn.clone()));
        }
        if let Some(ty) = function.return_type.as_mut() {
            ty.substitute(binding);
        }
        if let Some(alias) = &function.flags.merge_template_specialisations_as {
            merges.entry(alias.clone()).or_default().push(function.clone());
        }
    };
    for constructor in &mut spec.constructors {
        specialise(constructor, true);
    }
    for slot in spec.methods.values_mut().chain(spec.private_methods.values_mut()) {
        for method in slot.functions_mut() {
            specialise(method, false);
        }
        if let FunctionSlot::Overload(group) = slot {
            group.from_class = Some(spec.name.clone());
        }
    }
    for attribute in spec.attributes.values_mut() {
        attribute.from_class = spec.name.clone();
        attribute.ty.substitute(binding);
    }
    spec
}

/// Expand hinted function and method templates into concrete specialisations
/// under their bind names; unhinted templates become placeholders.
pub fn specialise_function_templates(db: &mut Database) {
    db.functions = specialise_slots(std::mem::take(&mut db.functions), |function, bind_name| {
        make_fqn(&function.namespace, None, bind_name)
    });
    for class in db.classes.values_mut() {
        class.methods = specialise_slots(std::mem::take(&mut class.methods), |_, bind_name| {
            bind_name.to_string()
        });
    }
}

fn specialise_slots(
    slots: BTreeMap<String, FunctionSlot>,
    key_for: impl Fn(&Function, &str) -> String,
) -> BTreeMap<String, FunctionSlot> {
    let mut out = BTreeMap::new();
    for (key, slot) in slots {
        if !slot.functions().iter().any(|f| f.template) {
            out.insert(key, slot);
            continue;
        }
        let force_cast = slot.force_cast();
        let functions = match slot {
            FunctionSlot::Concrete(function) => vec![function],
            FunctionSlot::Overload(group) => group.overloads,
            FunctionSlot::Placeholder(_) => Vec::new(),
        };
        for mut function in functions {
            if !function.template {
                function.force_cast |= force_cast;
                insert_function(&mut out, &key, FunctionSlot::Concrete(function));
                continue;
            }
            if function.flags.template_hints.is_empty() {
                warn!(function = %function.fqn(), "no template hints provided");
                insert_function(
                    &mut out,
                    &key,
                    FunctionSlot::Placeholder(FunctionPlaceholder {
                        id: function.id.clone(),
                        name: function.name.clone(),
                        namespace: function.namespace.clone(),
                        from_class: function.from_class.clone(),
                        visibility: function.visibility,
                        reason: "template without hints".to_string(),
                    }),
                );
                continue;
            }
            for hint in &function.flags.template_hints {
                for binding in &hint.combinations {
                    let mut spec = specialise_function(&function, binding);
                    spec.flags.template_hints.clear();
                    spec.flags.rename = Some(hint.bind_name.clone());
                    spec.force_cast = true;
                    debug!(function = %function.fqn(), bind_name = %hint.bind_name, args = ?spec.template_args, "specialised function");
                    let spec_key = key_for(&spec, &hint.bind_name);
                    insert_function(&mut out, &spec_key, FunctionSlot::Concrete(spec));
                }
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Inheritance
// ---------------------------------------------------------------------------

/// Transitive ancestors of `class` known to the database, nearest first.
fn ancestors<'a>(db: &'a Database, class: &Class) -> Vec<&'a Class> {
    let mut found: Vec<&Class> = Vec::new();
    let mut seen = BTreeSet::from([class.fqn()]);
    let mut queue: Vec<String> = class.bases.clone();
    while !queue.is_empty() {
        let base = queue.remove(0);
        let Some(parent) = db.class(&base) else {
            continue;
        };
        if !seen.insert(parent.fqn()) {
            continue;
        }
        queue.extend(parent.bases.iter().cloned());
        found.push(parent);
    }
    found
}

/// Mark classes abstract when some pure-virtual method of an ancestor is
/// implemented neither by them nor by any ancestor.
pub fn infer_abstract_classes(db: &mut Database) {
    let mut inferred = Vec::new();
    for (fqn, class) in &db.classes {
        if class.is_abstract {
            continue;
        }
        let lineage = ancestors(db, class);
        if !lineage.iter().any(|ancestor| ancestor.is_abstract) {
            continue;
        }
        let methods_of = |c: &Class| -> Vec<Function> {
            c.all_methods().flat_map(FunctionSlot::functions).cloned().collect()
        };
        let mut pure = BTreeSet::new();
        let mut implemented = BTreeSet::new();
        for owner in lineage.iter().copied().chain(std::iter::once(class)) {
            for method in methods_of(owner) {
                if method.is_abstract {
                    pure.insert(method.name);
                } else {
                    implemented.insert(method.name);
                }
            }
        }
        let missing: Vec<_> = pure.difference(&implemented).cloned().collect();
        if !missing.is_empty() {
            debug!(class = %fqn, missing = ?missing, "inferred abstract");
            inferred.push(fqn.clone());
        }
    }
    info!(count = inferred.len(), "abstract classes inferred");
    for fqn in inferred {
        if let Some(class) = db.classes.get_mut(&fqn) {
            class.is_abstract = true;
        }
    }
}

fn flatten_bases(
    db: &Database,
    class: &Class,
    source_namespaces: &[String],
    visiting: &mut Vec<String>,
) -> Vec<String> {
    let mut flattened = Vec::new();
    for base in &class.bases {
        if source_namespaces
            .iter()
            .any(|ns| base.starts_with(&format!("{ns}::")))
        {
            flattened.push(base.clone());
        }
        let Some(parent) = db.class(base) else {
            continue;
        };
        let parent_fqn = parent.fqn();
        if visiting.contains(&parent_fqn) {
            warn!(class = %class.fqn(), base = %parent_fqn, "inheritance cycle");
            continue;
        }
        visiting.push(parent_fqn);
        flattened.extend(flatten_bases(db, parent, source_namespaces, visiting));
        visiting.pop();
    }
    flattened
}

/// Replace each base list by every transitive own-source base, first seen
/// first, without duplicates.
pub fn copy_parent_bases(db: &mut Database, source_namespaces: &[String]) {
    let flattened: Vec<(String, Vec<String>)> = db
        .classes
        .iter()
        .map(|(fqn, class)| {
            let mut visiting = vec![fqn.clone()];
            let mut seen = BTreeSet::new();
            let bases = flatten_bases(db, class, source_namespaces, &mut visiting)
                .into_iter()
                .filter(|base| seen.insert(base.clone()))
                .collect();
            (fqn.clone(), bases)
        })
        .collect();
    for (fqn, bases) in flattened {
        if let Some(class) = db.classes.get_mut(&fqn) {
            class.bases = bases;
        }
    }
}

/// Turn each `inherit` hook into a `bind` hook on every class deriving from
/// the declaring class, with `%childclass%` replaced by the child's name.
pub fn apply_inherit_hooks(db: &mut Database) {
    let inherit_hooks: Vec<(String, Vec<String>)> = db
        .classes
        .iter()
        .filter_map(|(fqn, class)| {
            let codes: Vec<String> = class
                .flags
                .hooks
                .iter()
                .filter(|hook| hook.trigger == HookTrigger::Inherit)
                .map(|hook| hook.code.clone())
                .collect();
            (!codes.is_empty()).then(|| (fqn.clone(), codes))
        })
        .collect();

    for (parent, codes) in inherit_hooks {
        for (child_fqn, child) in db.classes.iter_mut() {
            if !child.bases.iter().any(|base| strip_template_args(base) == parent) {
                continue;
            }
            for code in &codes {
                let hook = Hook {
                    trigger: HookTrigger::Bind,
                    code: code.replace("%childclass%", child_fqn),
                };
                if !child.flags.hooks.contains(&hook) {
                    debug!(parent = %parent, child = %child_fqn, "propagated inherit hook");
                    child.flags.hooks.push(hook);
                }
            }
        }
    }
}

/// Seed the method map of `copy_parent_items` classes with their bases'
/// methods; the class' own methods win, nearer bases win over farther ones.
pub fn copy_parent_items(db: &mut Database) {
    let own_methods: BTreeMap<String, BTreeMap<String, FunctionSlot>> = db
        .classes
        .iter()
        .map(|(fqn, class)| (fqn.clone(), class.methods.clone()))
        .collect();

    for class in db.classes.values_mut() {
        if !class.flags.copy_parent_items {
            continue;
        }
        let mut copied = 0usize;
        for base in class.bases.clone() {
            let Some(base_methods) = own_methods
                .get(&base)
                .or_else(|| own_methods.get(strip_template_args(&base)))
            else {
                continue;
            };
            for (name, slot) in base_methods {
                if class.methods.contains_key(name) {
                    continue;
                }
                let mut inherited = slot.clone();
                inherited.rehome(&class.namespace, &class.name);
                class.methods.insert(name.clone(), inherited);
                copied += 1;
            }
        }
        debug!(class = %class.fqn(), copied, "copied parent methods");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::TemplateHint;
    use crate::model::test_support::*;
    use pretty_assertions::assert_eq;

    fn with_method(mut class: Class, method: Function) -> Class {
        let name = method.name.clone();
        insert_function(&mut class.methods, &name, FunctionSlot::Concrete(method));
        class
    }

    fn pure(namespace: &str, class: &str, name: &str) -> Function {
        let mut f = function(namespace, Some(class), name, &[], "void");
        f.is_abstract = true;
        f
    }

    fn database(classes: Vec<Class>) -> Database {
        let mut db = Database::default();
        for class in classes {
            db.classes.insert(class.fqn(), class);
        }
        db
    }

    #[test]
    fn abstract_inference_walks_the_whole_lineage() {
        let mut a = with_method(class("obe", "A", &[]), pure("obe", "A", "f"));
        a.is_abstract = true;
        let b = class("obe", "B", &["obe::A"]);
        let c = with_method(class("obe", "C", &["obe::B"]), function("obe", Some("C"), "f", &[], "void"));
        let d = class("obe", "D", &["obe::C"]);
        let mut db = database(vec![a, b, c, d]);

        infer_abstract_classes(&mut db);
        assert!(db.classes["obe::B"].is_abstract);
        assert!(!db.classes["obe::C"].is_abstract);
        assert!(!db.classes["obe::D"].is_abstract);
    }

    #[test]
    fn bases_flatten_in_first_seen_order() {
        let base = class("obe", "Base", &["sf::Drawable"]);
        let left = class("obe", "Left", &["obe::Base"]);
        let right = class("obe", "Right", &["obe::Base"]);
        let leaf = class("obe", "Leaf", &["obe::Left", "obe::Right", "obe::Shape"]);
        let mut db = database(vec![base, left, right, leaf]);

        copy_parent_bases(&mut db, &["obe".to_string()]);
        assert_eq!(
            db.classes["obe::Leaf"].bases,
            vec!["obe::Left", "obe::Base", "obe::Right", "obe::Shape"]
        );
        assert!(db.classes["obe::Base"].bases.is_empty());

        // Same input, same output.
        let again = db.classes["obe::Leaf"].bases.clone();
        copy_parent_bases(&mut db, &["obe".to_string()]);
        assert_eq!(db.classes["obe::Leaf"].bases, again);
    }

    #[test]
    fn inherit_hooks_reach_children() {
        let mut parent = class("obe", "Component", &[]);
        parent.flags.hooks.push(Hook {
            trigger: HookTrigger::Inherit,
            code: "Register<%childclass%>(state);".into(),
        });
        let child = class("obe", "Sprite", &["obe::Component"]);
        let mut db = database(vec![parent, child]);

        apply_inherit_hooks(&mut db);
        apply_inherit_hooks(&mut db);
        assert_eq!(
            db.classes["obe::Sprite"].flags.hooks,
            vec![Hook {
                trigger: HookTrigger::Bind,
                code: "Register<obe::Sprite>(state);".into()
            }]
        );
    }

    #[test]
    fn parent_items_are_copied_with_derived_priority() {
        let base = with_method(
            with_method(class("obe", "Base", &[]), function("obe", Some("Base"), "name", &[], "std::string")),
            function("obe", Some("Base"), "id", &[], "int"),
        );
        let mut derived = with_method(
            class("obe", "Derived", &["obe::Base"]),
            function("obe", Some("Derived"), "name", &[], "const char*"),
        );
        derived.flags.copy_parent_items = true;
        let mut db = database(vec![base, derived]);

        copy_parent_items(&mut db);
        let derived = &db.classes["obe::Derived"];
        let FunctionSlot::Concrete(id) = &derived.methods["id"] else {
            panic!("id should be copied");
        };
        assert_eq!(id.from_class.as_deref(), Some("Derived"));
        let FunctionSlot::Concrete(name) = &derived.methods["name"] else {
            panic!("name should stay concrete");
        };
        assert_eq!(name.return_type.as_ref().map(ToString::to_string).as_deref(), Some("const char*"));
    }

    #[test]
    fn class_templates_specialise_per_hint() {
        let mut pool = class("obe", "Pool", &[]);
        pool.template = true;
        pool.template_params = vec!["T".into()];
        let mut ctor = function("obe", Some("Pool"), "Pool", &[("const T&", "value")], "");
        ctor.flags.merge_template_specialisations_as = Some("makePool".into());
        pool.constructors.push(ctor);
        pool = with_method(pool, function("obe", Some("Pool"), "get", &[("std::size_t", "at")], "T&"));
        pool.flags.template_hints.push(TemplateHint {
            bind_name: "Pool".into(),
            combinations: vec![vec![("T".into(), "int".into())], vec![("T".into(), "obe::Vector2".into())]],
        });
        let mut db = database(vec![pool]);

        specialise_class_templates(&mut db);
        assert!(!db.classes.contains_key("obe::Pool"));
        let ints = &db.classes["obe::Pool<int>"];
        assert_eq!(ints.bind_name(), "PoolInt");
        assert_eq!(ints.constructors[0].parameters[0].ty.to_string(), "const int&");
        assert_eq!(
            ints.constructors[0].return_type.as_ref().map(ToString::to_string).as_deref(),
            Some("obe::Pool<int>")
        );
        let FunctionSlot::Concrete(get) = &ints.methods["get"] else {
            panic!("get should be concrete");
        };
        assert_eq!(get.return_type.as_ref().map(ToString::to_string).as_deref(), Some("int&"));
        assert_eq!(get.from_class.as_deref(), Some("Pool<int>"));
        assert_eq!(db.classes["obe::Pool<obe::Vector2>"].bind_name(), "PoolVector2");

        let FunctionSlot::Overload(merged) = &db.functions["obe::makePool"] else {
            panic!("specialised constructors should merge");
        };
        assert!(merged.force_cast);
        assert_eq!(merged.overloads.len(), 2);
        assert!(merged.overloads.iter().all(|f| f.bind_name() == "makePool"));
    }

    #[test]
    fn function_templates_expand_or_degrade() {
        let mut get = function("obe", None, "get", &[("const std::string&", "key")], "T");
        get.template = true;
        get.template_params = vec!["T".into()];
        get.flags.template_hints.push(TemplateHint {
            bind_name: "getValue".into(),
            combinations: vec![vec![("T".into(), "int".into())], vec![("T".into(), "double".into())]],
        });
        let mut unhinted = function("obe", None, "make", &[], "T");
        unhinted.template = true;

        let mut db = Database::default();
        db.functions.insert("obe::get".into(), FunctionSlot::Concrete(get));
        db.functions.insert("obe::make".into(), FunctionSlot::Concrete(unhinted));
        specialise_function_templates(&mut db);

        let FunctionSlot::Overload(group) = &db.functions["obe::getValue"] else {
            panic!("expected specialisations grouped under the bind name");
        };
        let args: Vec<_> = group.overloads.iter().map(|f| f.template_args.clone()).collect();
        assert_eq!(args, vec![vec!["int".to_string()], vec!["double".to_string()]]);
        assert!(group.overloads.iter().all(|f| f.force_cast && !f.template));
        assert!(!db.functions.contains_key("obe::get"));
        assert!(matches!(db.functions["obe::make"], FunctionSlot::Placeholder(_)));
    }
}

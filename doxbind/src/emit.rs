//! Render the resolved database into one header/source pair per namespace.
//!
//! Every bound entity gets a loader function (`LoadClassCircle`,
//! `LoadEnumShapeKind`, ...) that registers it on the scripting state; the
//! header declares the loaders, the source defines them.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::binding::{BindKey, plan_callable, plan_constructors};
use crate::flags::{Flags, HookTrigger};
use crate::flavour::{Flavour, render};
use crate::ident::{clean_capitalize, last_segment, make_fqn, to_snake_case};
use crate::location::{Location, strip_include};
use crate::model::{Attribute, Class, Database, Enum, FunctionSlot, Global};

/// A generated file, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub contents: String,
}

struct Loader {
    name: String,
    priority: i32,
    location: Location,
    includes: Vec<String>,
    body: String,
}

impl Loader {
    fn sort_key(&self) -> (Reverse<i32>, &str, u32, &str) {
        (
            Reverse(self.priority),
            &self.location.file,
            self.location.line,
            &self.name,
        )
    }
}

pub struct Emitter<'a> {
    db: &'a Database,
    flavour: &'a Flavour,
    source_roots: Vec<&'a str>,
}

/// `obe::Collision` -> `Bindings/Collision`, `obe` -> `Bindings/Obe`.
pub fn bindings_directory(namespace: &str) -> String {
    match namespace.split_once("::") {
        Some((_, rest)) => format!("Bindings/{}", rest.replace("::", "/")),
        None => format!("Bindings/{}", clean_capitalize(namespace)),
    }
}

/// Loader suffix built from a scripting-side name.
fn loader_name(kind: &str, name: &str) -> String {
    let name: String = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .map(clean_capitalize)
        .collect();
    format!("{kind}{name}")
}

fn include_line(path: &str) -> String {
    if path.trim_start().starts_with("#include") {
        path.to_string()
    } else {
        format!("#include <{path}>")
    }
}

impl<'a> Emitter<'a> {
    pub fn new(db: &'a Database, flavour: &'a Flavour, source_roots: &'a [String]) -> Self {
        Self {
            db,
            flavour,
            source_roots: source_roots.iter().map(String::as_str).collect(),
        }
    }

    pub fn emit(&self) -> Vec<GeneratedFile> {
        let mut namespaces: BTreeMap<String, Vec<Loader>> = BTreeMap::new();
        for class in self.db.classes.values() {
            if let Some(loader) = self.class_loader(class) {
                namespaces.entry(class.namespace.clone()).or_default().push(loader);
            }
        }
        for enumeration in self.db.enums.values() {
            if let Some(loader) = self.enum_loader(enumeration) {
                namespaces.entry(enumeration.namespace.clone()).or_default().push(loader);
            }
        }
        for slot in self.db.functions.values() {
            if let Some((namespace, loader)) = self.function_loader(slot) {
                namespaces.entry(namespace).or_default().push(loader);
            }
        }
        for global in self.db.globals.values() {
            if let Some(loader) = self.global_loader(global) {
                namespaces.entry(global.namespace.clone()).or_default().push(loader);
            }
        }

        let mut files = Vec::new();
        for (namespace, mut loaders) in namespaces {
            if namespace.is_empty() {
                debug!(loaders = loaders.len(), "skipping global namespace");
                continue;
            }
            loaders.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            info!(namespace = %namespace, loaders = loaders.len(), "generating bindings");
            files.extend(self.namespace_files(&namespace, &loaders));
        }
        files
    }

    fn include_for(&self, location: &Location) -> String {
        include_line(&strip_include(&location.file, self.source_roots.iter().copied()))
    }

    fn includes(&self, location: &Location, flags: &Flags) -> Vec<String> {
        let mut includes = vec![self.include_for(location)];
        includes.extend(flags.additional_includes.iter().map(|i| include_line(i)));
        includes
    }

    /// `sol::table obe_namespace = state["obe"].get<sol::table>();` and the
    /// variable it is stored in.
    fn fetch_table(&self, namespace: &str) -> (String, String) {
        let store_in = format!("{}_namespace", last_segment(namespace));
        let path: String = namespace.split("::").map(|part| format!("[\"{part}\"]")).collect();
        let fetch = render(
            &self.flavour.fetch_table,
            &[("store_in", &store_in), ("namespace_path", &path)],
        );
        (store_in, fetch)
    }

    fn loader_function(&self, name: &str, body: &str) -> String {
        format!("void Load{name}({} state)\n{{\n{body}\n}}", self.flavour.state_view)
    }

    // -----------------------------------------------------------------------
    // Classes
    // -----------------------------------------------------------------------

    fn class_loader(&self, class: &Class) -> Option<Loader> {
        if class.flags.nobind || class.template {
            debug!(class = %class.fqn(), "class not bound");
            return None;
        }
        let cpp_class = class.fqn();
        let lua_name = class.bind_name();
        let store = format!("bind_{}", to_snake_case(lua_name));

        let mut body = Vec::new();
        for slot in class.methods.values() {
            for entry in plan_callable(self.db, slot) {
                let Some(expression) = self.flavour.expression(&entry.strategy) else {
                    continue;
                };
                body.push(format!(
                    "{store}[{}] = {};",
                    self.flavour.key(&entry.key),
                    self.flavour.method(&expression, entry.as_property)
                ));
            }
        }
        for attribute in class.attributes.values() {
            if attribute.flags.nobind {
                continue;
            }
            body.push(format!(
                "{store}[\"{}\"] = {};",
                attribute.name,
                self.attribute_binding(&cpp_class, attribute)
            ));
        }

        let helpers: Vec<String> = class
            .flags
            .helpers
            .iter()
            .map(|source| render(&self.flavour.script_file, &[("source", source)]))
            .collect();
        let hooks: Vec<&str> = class
            .flags
            .hooks
            .iter()
            .filter(|hook| hook.trigger == HookTrigger::Bind)
            .map(|hook| hook.code.as_str())
            .collect();

        let (_, fetch) = self.fetch_table(&class.namespace);
        let class_body = render(
            &self.flavour.class_body,
            &[
                ("cpp_class", &cpp_class),
                ("lua_formatted_name", &to_snake_case(lua_name)),
                ("lua_short_name", lua_name),
                ("namespace", last_segment(&class.namespace)),
                ("class_definition", &self.class_definition(class)),
                ("body", &body.join("\n")),
                ("helpers", &helpers.join("\n")),
                ("hooks", &hooks.join("\n")),
            ],
        );
        let name = loader_name("Class", lua_name);
        debug!(class = %cpp_class, loader = %name, "bound class");
        Some(Loader {
            body: self.loader_function(&name, &format!("{fetch}\n{class_body}")),
            name,
            priority: class.flags.load_priority,
            location: class.location.clone(),
            includes: self.includes(&class.location, &class.flags),
        })
    }

    fn class_definition(&self, class: &Class) -> String {
        let mut definition = String::new();
        let plan = plan_constructors(self.db, class);
        if plan.constructible {
            let cpp_class = class.fqn();
            let constructors = if plan.signatures.is_empty() {
                self.flavour.default_constructor.clone()
            } else {
                let signatures: Vec<String> = plan
                    .signatures
                    .iter()
                    .map(|types| format!("{cpp_class}({})", types.join(", ")))
                    .collect();
                render(&self.flavour.constructors, &[("constructors", &signatures.join(", "))])
            };
            definition.push_str(&format!(", {}, {constructors}", self.flavour.call_constructor));
        }
        if !class.bases.is_empty() {
            definition.push_str(", ");
            definition.push_str(&render(
                &self.flavour.base_classes,
                &[("bases", &class.bases.join(", "))],
            ));
        }
        definition
    }

    fn attribute_binding(&self, cpp_class: &str, attribute: &Attribute) -> String {
        let qualifiers = attribute.ty.qualifiers();
        if qualifiers.is_lvalue_ref() {
            let mut pointee = attribute.ty.clone();
            pointee.qualifiers_mut().postfix.pop();
            return render(
                &self.flavour.property_ref,
                &[
                    ("class_name", cpp_class),
                    ("attribute_name", &attribute.name),
                    ("property_type", &pointee.to_string()),
                ],
            );
        }
        let address = format!("{cpp_class}::{}", attribute.name);
        if attribute.qualifiers.is_static {
            return render(&self.flavour.static_attrib, &[("name", &address)]);
        }
        let address = format!("&{address}");
        if qualifiers.is_const() || attribute.qualifiers.is_const {
            render(&self.flavour.property_readonly, &[("address", &address)])
        } else {
            address
        }
    }

    // -----------------------------------------------------------------------
    // Namespace members
    // -----------------------------------------------------------------------

    fn enum_loader(&self, enumeration: &Enum) -> Option<Loader> {
        if enumeration.flags.nobind {
            return None;
        }
        let enum_type = make_fqn(&enumeration.namespace, None, &enumeration.name);
        let enum_name = enumeration.flags.rename.as_deref().unwrap_or(&enumeration.name);
        let fields: Vec<String> = enumeration
            .values
            .iter()
            .map(|value| format!("{{\"{0}\", {enum_type}::{0}}}", value.name))
            .collect();
        let (_, fetch) = self.fetch_table(&enumeration.namespace);
        let body = render(
            &self.flavour.enum_body,
            &[
                ("namespace", last_segment(&enumeration.namespace)),
                ("enum_type", &enum_type),
                ("enum_name", enum_name),
                ("enum_fields", &format!("{{{}}}", fields.join(", "))),
            ],
        );
        let name = loader_name("Enum", enum_name);
        Some(Loader {
            body: self.loader_function(&name, &format!("{fetch}\n{body}")),
            name,
            priority: enumeration.flags.load_priority,
            location: enumeration.location.clone(),
            includes: self.includes(&enumeration.location, &enumeration.flags),
        })
    }

    fn function_loader(&self, slot: &FunctionSlot) -> Option<(String, Loader)> {
        let functions = slot.functions();
        let first = functions.first()?;
        let flags = slot.flags()?;
        let namespace = first.namespace.clone();

        let (store_in, fetch) = self.fetch_table(&namespace);
        let mut lines = Vec::new();
        let mut bind_name = None;
        for entry in plan_callable(self.db, slot) {
            let Some(expression) = self.flavour.expression(&entry.strategy) else {
                continue;
            };
            let line = match &entry.key {
                BindKey::Named(name) => {
                    bind_name.get_or_insert_with(|| name.clone());
                    render(
                        &self.flavour.function_body,
                        &[
                            ("namespace", last_segment(&namespace)),
                            ("function_name", name),
                            ("function_ptr", &expression),
                        ],
                    )
                }
                key @ BindKey::Meta(_) => {
                    format!("{store_in}[{}] = {expression};", self.flavour.key(key))
                }
            };
            lines.push(line);
        }
        if lines.is_empty() {
            debug!(function = %slot.name(), "nothing to bind");
            return None;
        }

        let name = loader_name("Function", bind_name.as_deref().unwrap_or(slot.name()));
        let mut includes: Vec<String> = functions.iter().map(|f| self.include_for(&f.location)).collect();
        includes.extend(flags.additional_includes.iter().map(|i| include_line(i)));
        let loader = Loader {
            body: self.loader_function(&name, &format!("{fetch}\n{}", lines.join("\n"))),
            name,
            priority: flags.load_priority,
            location: first.location.clone(),
            includes,
        };
        Some((namespace, loader))
    }

    fn global_loader(&self, global: &Global) -> Option<Loader> {
        if global.flags.nobind {
            return None;
        }
        let global_name = global.flags.rename.as_deref().unwrap_or(&global.name);
        let (_, fetch) = self.fetch_table(&global.namespace);
        let body = render(
            &self.flavour.global_body,
            &[
                ("namespace", last_segment(&global.namespace)),
                ("global_name", global_name),
                ("global_ptr", &make_fqn(&global.namespace, None, &global.name)),
            ],
        );
        let name = loader_name("Global", global_name);
        Some(Loader {
            body: self.loader_function(&name, &format!("{fetch}\n{body}")),
            name,
            priority: global.flags.load_priority,
            location: global.location.clone(),
            includes: self.includes(&global.location, &global.flags),
        })
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    fn namespace_files(&self, namespace: &str, loaders: &[Loader]) -> Vec<GeneratedFile> {
        let directory = bindings_directory(namespace);
        let file_stem = last_segment(namespace);
        let header_path = format!("{directory}/{file_stem}.hpp");
        let bindings_namespace = format!("{namespace}::Bindings");
        let (forward_ns, forward_class) = self.flavour.state_view_parts();
        let forward = if forward_ns.is_empty() {
            format!("class {forward_class};")
        } else {
            format!("namespace {forward_ns} {{ class {forward_class}; }};")
        };

        let declarations: Vec<String> = loaders
            .iter()
            .map(|loader| format!("void Load{}({} state);", loader.name, self.flavour.state_view))
            .collect();
        let header = format!(
            "#pragma once\n\n{forward}\nnamespace {bindings_namespace}\n{{\n{}\n}};\n",
            declarations.join("\n")
        );

        let includes: BTreeSet<&str> = loaders
            .iter()
            .flat_map(|loader| loader.includes.iter().map(String::as_str))
            .collect();
        let definitions: Vec<&str> = loaders.iter().map(|loader| loader.body.as_str()).collect();
        let source = format!(
            "#include <{header_path}>\n#include <{}>\n\n{}\n\nnamespace {bindings_namespace}\n{{\n{}\n}};\n",
            self.flavour.include_file,
            includes.into_iter().collect::<Vec<_>>().join("\n"),
            definitions.join("\n")
        );

        vec![
            GeneratedFile {
                path: PathBuf::from("include").join(&header_path),
                contents: header,
            },
            GeneratedFile {
                path: PathBuf::from("src").join(format!("{directory}/{file_stem}.cpp")),
                contents: source,
            },
        ]
    }
}

/// Render every bindings file for `db`.
pub fn emit_bindings(db: &Database, flavour: &Flavour, source_roots: &[String]) -> Vec<GeneratedFile> {
    Emitter::new(db, flavour, source_roots).emit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpp_type::parse_cpp_type;
    use crate::flags::Hook;
    use crate::model::test_support::*;
    use crate::model::{EnumValue, MemberQualifiers, Visibility, insert_function};

    fn at(file: &str, line: u32) -> Location {
        Location {
            file: file.into(),
            line,
            column: 1,
        }
    }

    fn attribute(name: &str, ty: &str, is_static: bool) -> Attribute {
        Attribute {
            id: name.into(),
            name: name.into(),
            namespace: "obe::Collision".into(),
            from_class: "Circle".into(),
            ty: parse_cpp_type(ty).unwrap(),
            qualifiers: MemberQualifiers {
                is_static,
                ..Default::default()
            },
            flags: Flags::default(),
            description: String::new(),
            visibility: Visibility::Public,
            location: Location::default(),
        }
    }

    fn sample() -> Database {
        let mut db = Database::default();

        let mut circle = class("obe::Collision", "Circle", &["obe::Collision::Shape"]);
        circle.location = at("include/Core/Collision/Circle.hpp", 10);
        let mut ctor = function("obe::Collision", Some("Circle"), "Circle", &[("float", "radius")], "");
        ctor.parameters[0].default = Some("1.f".into());
        circle.constructors.push(ctor);
        let mut area = function("obe::Collision", Some("Circle"), "area", &[], "float");
        area.qualifiers.is_const = true;
        insert_function(&mut circle.methods, "area", FunctionSlot::Concrete(area));
        circle.attributes.insert("count".into(), attribute("count", "int", true));
        circle.attributes.insert("center".into(), attribute("center", "obe::Vector2&", false));
        circle.attributes.insert("radius".into(), attribute("radius", "float", false));
        circle.flags.helpers.push("obe://Lib/Internal/Circle.lua".into());
        circle.flags.hooks.push(Hook {
            trigger: HookTrigger::Bind,
            code: "obe::Collision::Bindings::Extra(state);".into(),
        });
        db.classes.insert(circle.fqn(), circle);

        db.enums.insert(
            "obe::Collision::ShapeKind".into(),
            Enum {
                id: "kind".into(),
                name: "ShapeKind".into(),
                namespace: "obe::Collision".into(),
                values: vec![
                    EnumValue { name: "Circle".into(), description: String::new() },
                    EnumValue { name: "Polygon".into(), description: String::new() },
                ],
                flags: Flags {
                    load_priority: 5,
                    ..Default::default()
                },
                description: String::new(),
                location: at("include/Core/Collision/Shape.hpp", 3),
            },
        );

        let mut distance = function("obe::Collision", None, "distance", &[("float", "a"), ("float", "b")], "float");
        distance.location = at("include/Core/Collision/Math.hpp", 1);
        db.functions.insert("obe::Collision::distance".into(), FunctionSlot::Concrete(distance));
        db
    }

    fn generated(db: &Database) -> Vec<GeneratedFile> {
        emit_bindings(db, &Flavour::sol3(), &["include/Core".to_string()])
    }

    #[test]
    fn namespace_gets_header_and_source() {
        let files = generated(&sample());
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("include/Bindings/Collision/Collision.hpp"),
                PathBuf::from("src/Bindings/Collision/Collision.cpp"),
            ]
        );
        let header = &files[0].contents;
        assert!(header.starts_with("#pragma once\n\nnamespace sol { class state_view; };"));
        // Higher load priority first, then declaration order.
        let enum_at = header.find("LoadEnumShapeKind").unwrap();
        let class_at = header.find("LoadClassCircle").unwrap();
        let function_at = header.find("LoadFunctionDistance").unwrap();
        assert!(enum_at < class_at && class_at < function_at, "{header}");
    }

    #[test]
    fn class_body_uses_the_flavour() {
        let source = generated(&sample()).remove(1).contents;
        assert!(source.contains("#include <Bindings/Collision/Collision.hpp>\n#include <sol/sol.hpp>"));
        assert!(source.contains("#include <Collision/Circle.hpp>"));
        assert!(source.contains(
            "sol::table Collision_namespace = state[\"obe\"][\"Collision\"].get<sol::table>();"
        ));
        assert!(source.contains(
            "sol::usertype<obe::Collision::Circle> bind_circle = Collision_namespace.new_usertype<obe::Collision::Circle>(\"Circle\", sol::call_constructor, sol::constructors<obe::Collision::Circle(), obe::Collision::Circle(float)>(), sol::base_classes, sol::bases<obe::Collision::Shape>());"
        ), "{source}");
        assert!(source.contains("bind_circle[\"area\"] = &obe::Collision::Circle::area;"));
        assert!(source.contains("bind_circle[\"count\"] = sol::var(&obe::Collision::Circle::count);"));
        assert!(source.contains(
            "bind_circle[\"center\"] = sol::property([](obe::Collision::Circle* self) -> obe::Vector2* { return &self->center; });"
        ));
        assert!(source.contains("bind_circle[\"radius\"] = &obe::Collision::Circle::radius;"));
        assert!(source.contains("state.script_file(\"obe://Lib/Internal/Circle.lua\"_fs);"));
        assert!(source.contains("obe::Collision::Bindings::Extra(state);"));
        assert!(source.contains(
            "Collision_namespace.new_enum<obe::Collision::ShapeKind>(\"ShapeKind\", {{\"Circle\", obe::Collision::ShapeKind::Circle}, {\"Polygon\", obe::Collision::ShapeKind::Polygon}});"
        ));
        assert!(source.contains(
            "Collision_namespace.set_function(\"distance\", &obe::Collision::distance);"
        ));
    }

    #[test]
    fn abstract_and_unbound_entities() {
        let mut db = sample();
        if let Some(circle) = db.classes.get_mut("obe::Collision::Circle") {
            circle.is_abstract = true;
        }
        if let Some(kind) = db.enums.get_mut("obe::Collision::ShapeKind") {
            kind.flags.nobind = true;
        }
        let source = generated(&db).remove(1).contents;
        assert!(source.contains("new_usertype<obe::Collision::Circle>(\"Circle\", sol::base_classes"));
        assert!(!source.contains("new_enum"));
    }

    #[test]
    fn root_namespace_directory_is_capitalized() {
        assert_eq!(bindings_directory("obe"), "Bindings/Obe");
        assert_eq!(bindings_directory("obe::Graphics::Shapes"), "Bindings/Graphics/Shapes");
        assert_eq!(loader_name("Class", "Pool<int>"), "ClassPoolInt");
    }

    #[test]
    fn output_is_deterministic() {
        assert_eq!(generated(&sample()), generated(&sample()));
    }
}

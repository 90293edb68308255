//! Binding flavours: the string templates that spell a binding for one
//! scripting-engine API. The default flavour targets sol3.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` are literal braces.

use serde::Deserialize;

use crate::binding::{BindKey, BindingStrategy};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Flavour {
    pub state_view: String,
    pub include_file: String,
    pub call_constructor: String,
    pub class_body: String,
    pub static_attrib: String,
    pub property: String,
    pub property_ref: String,
    pub property_readonly: String,
    pub default_constructor: String,
    pub constructors: String,
    pub base_classes: String,
    pub script_file: String,
    pub method: String,
    pub meta_function: String,
    pub fetch_table: String,
    pub enum_body: String,
    pub function_body: String,
    pub function_overload: String,
    pub global_body: String,
}

impl Default for Flavour {
    fn default() -> Self {
        Self::sol3()
    }
}

impl Flavour {
    pub fn sol3() -> Self {
        Self {
            state_view: "sol::state_view".into(),
            include_file: "sol/sol.hpp".into(),
            call_constructor: "sol::call_constructor".into(),
            class_body: "sol::usertype<{cpp_class}> bind_{lua_formatted_name} = \
                {namespace}_namespace.new_usertype<{cpp_class}>(\"{lua_short_name}\"{class_definition});\n\
                {body}\n{helpers}\n{hooks}"
                .into(),
            static_attrib: "sol::var(&{name})".into(),
            property: "sol::property({address})".into(),
            property_ref: "sol::property([]({class_name}* self) -> {property_type}* \
                {{ return &self->{attribute_name}; }})"
                .into(),
            property_readonly: "sol::readonly({address})".into(),
            default_constructor: "sol::default_constructor".into(),
            constructors: "sol::constructors<{constructors}>()".into(),
            base_classes: "sol::base_classes, sol::bases<{bases}>()".into(),
            script_file: "state.script_file(\"{source}\"_fs);".into(),
            method: "{address}".into(),
            meta_function: "sol::meta_function::{name}".into(),
            fetch_table: "sol::table {store_in} = state{namespace_path}.get<sol::table>();".into(),
            enum_body: "{namespace}_namespace.new_enum<{enum_type}>(\"{enum_name}\", {enum_fields});"
                .into(),
            function_body: "{namespace}_namespace.set_function(\"{function_name}\", {function_ptr});"
                .into(),
            function_overload: "sol::overload({overloads})".into(),
            global_body: "{namespace}_namespace[\"{global_name}\"] = {global_ptr};".into(),
        }
    }

    /// `sol::state_view` -> (`sol`, `state_view`), for forward declarations.
    pub fn state_view_parts(&self) -> (&str, &str) {
        self.state_view
            .rsplit_once("::")
            .unwrap_or(("", self.state_view.as_str()))
    }

    /// Spell a strategy; `None` when nothing is bound.
    pub fn expression(&self, strategy: &BindingStrategy) -> Option<String> {
        match strategy {
            BindingStrategy::Overload { variants } => {
                let overloads: Vec<String> =
                    variants.iter().filter_map(|v| self.expression(v)).collect();
                if overloads.is_empty() {
                    return None;
                }
                Some(render(&self.function_overload, &[("overloads", &overloads.join(", "))]))
            }
            other => other.cpp_expression(),
        }
    }

    /// Table index a binding is stored under.
    pub fn key(&self, key: &BindKey) -> String {
        match key {
            BindKey::Named(name) => format!("\"{name}\""),
            BindKey::Meta(name) => render(&self.meta_function, &[("name", *name)]),
        }
    }

    /// Expression for a method entry, wrapped as a property when flagged.
    pub fn method(&self, address: &str, as_property: bool) -> String {
        if as_property {
            render(&self.property, &[("address", address)])
        } else {
            render(&self.method, &[("address", address)])
        }
    }
}

/// Substitute `{name}` placeholders. Unknown placeholders are kept as written.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(at) = rest.find(['{', '}']) {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];
        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('{')
            && let Some(end) = tail.find('}')
        {
            let name = &tail[1..end];
            match values.iter().find(|(key, _)| *key == name) {
                Some((_, value)) => out.push_str(value),
                None => out.push_str(&tail[..=end]),
            }
            rest = &tail[end + 1..];
            continue;
        }
        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

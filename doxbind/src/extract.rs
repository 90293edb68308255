//! Extraction: Doxygen compound XML → entity [`Database`].
//!
//! One pass per compound file. Per-symbol type failures degrade the symbol
//! into a placeholder (or skip it); ambiguous type references and missing
//! mandatory nodes abort the run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use roxmltree::{Document, Node};
use tracing::{debug, info, warn};

use crate::cpp_type::{CppType, parse_cpp_type, rebuild_incomplete_type_except};
use crate::error::{self, Error};
use crate::flags::{FlagContext, get_element_flags};
use crate::ident::{doxygen_ref_to_cpp_name, last_segment, make_fqn, parent_scope};
use crate::index::SymbolIndex;
use crate::location::parse_location;
use crate::model::*;
use crate::xml;

/// Compound files belonging to the own-source namespaces, sorted by name:
/// `(namespace files, class and struct files)`.
pub fn compound_files(xml_dir: &Path, namespaces: &[String]) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut names = std::fs::read_dir(xml_dir)
        .with_context(|| format!("reading {}", xml_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".xml"))
        .collect::<Vec<_>>();
    names.sort();

    let mut namespace_files = Vec::new();
    let mut class_files = Vec::new();
    for name in names {
        let stem = name.trim_end_matches(".xml");
        // `_1_1` encodes `::`; a bare prefix would also take `obelisk` for `obe`.
        let nested = |prefix: &str| {
            namespaces
                .iter()
                .any(|ns| stem.starts_with(&format!("{prefix}{ns}_1_1")))
        };
        let own_namespace = namespaces.iter().any(|ns| stem == format!("namespace{ns}"));
        if nested("class") || nested("struct") {
            class_files.push(xml_dir.join(&name));
        } else if own_namespace || nested("namespace") {
            namespace_files.push(xml_dir.join(&name));
        } else {
            debug!(file = %name, "ignoring compound file");
        }
    }
    Ok((namespace_files, class_files))
}

/// Parse every own-source compound under `xml_dir` into a database.
pub fn extract_database(
    xml_dir: &Path,
    namespaces: &[String],
    project_root: &Path,
    index: &SymbolIndex,
    flags: &mut FlagContext,
) -> Result<Database> {
    let (namespace_files, class_files) = compound_files(xml_dir, namespaces)?;
    let mut builder = Builder::new(index, flags, project_root);

    for path in namespace_files.iter().chain(&class_files) {
        debug!(file = %path.display(), "parsing compound");
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        builder
            .add_compound_xml(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
    }

    let db = builder.finish();
    info!(
        namespaces = db.namespaces.len(),
        classes = db.classes.len(),
        functions = db.functions.len(),
        enums = db.enums.len(),
        globals = db.globals.len(),
        typedefs = db.typedefs.len(),
        "extracted database"
    );
    Ok(db)
}

/// The scope a member is declared in.
#[derive(Clone, Copy)]
struct Owner<'s> {
    namespace: &'s str,
    class: Option<&'s str>,
    template_params: &'s [String],
}

impl Owner<'_> {
    /// Scope used to qualify relative type names.
    fn context(&self) -> String {
        make_fqn(self.namespace, None, self.class.unwrap_or_default())
    }
}

enum Parsed<T> {
    Ok(T),
    /// Degraded because of a type the parser could not handle.
    Degraded(String),
}

/// Builds the database one compound document at a time.
pub struct Builder<'a> {
    index: &'a SymbolIndex,
    flags: &'a mut FlagContext,
    project_root: &'a Path,
    db: Database,
}

impl<'a> Builder<'a> {
    pub fn new(index: &'a SymbolIndex, flags: &'a mut FlagContext, project_root: &'a Path) -> Self {
        Builder {
            index,
            flags,
            project_root,
            db: Database::default(),
        }
    }

    /// Add one `<doxygen><compounddef>` document (namespace, class or struct).
    pub fn add_compound_xml(&mut self, text: &str) -> error::Result<()> {
        let document = Document::parse(text)?;
        let root = document.root_element();
        let compound = xml::require_child(root, "compounddef", "compound document")?;
        match compound.attribute("kind") {
            Some("namespace") => self.add_namespace(compound),
            Some("class") | Some("struct") => self.add_class(compound),
            other => {
                debug!(kind = ?other, "ignoring compound kind");
                Ok(())
            }
        }
    }

    /// Apply surrogate flags declared after their target, then hand over the
    /// database. Every overload sharing a target name receives them.
    pub fn finish(mut self) -> Database {
        let db = &mut self.db;
        let flags = &mut *self.flags;
        for (fqn, namespace) in db.namespaces.iter_mut() {
            flags.apply_surrogates(fqn, &namespace.id, &mut namespace.flags);
        }
        for (fqn, class) in db.classes.iter_mut() {
            flags.apply_surrogates(fqn, &class.id, &mut class.flags);
            let slots = class.methods.values_mut().chain(class.private_methods.values_mut());
            let callables = slots
                .flat_map(FunctionSlot::functions_mut)
                .chain(class.constructors.iter_mut())
                .chain(class.destructor.iter_mut());
            for function in callables {
                flags.apply_surrogates(&function.fqn(), &function.id, &mut function.flags);
            }
            for attribute in class.attributes.values_mut() {
                flags.apply_surrogates(&format!("{fqn}::{}", attribute.name), &attribute.id, &mut attribute.flags);
            }
        }
        for (fqn, slot) in db.functions.iter_mut() {
            for function in slot.functions_mut() {
                flags.apply_surrogates(fqn, &function.id, &mut function.flags);
            }
        }
        for (fqn, item) in db.enums.iter_mut() {
            flags.apply_surrogates(fqn, &item.id, &mut item.flags);
        }
        for (fqn, item) in db.globals.iter_mut() {
            flags.apply_surrogates(fqn, &item.id, &mut item.flags);
        }
        for (fqn, item) in db.typedefs.iter_mut() {
            flags.apply_surrogates(fqn, &item.id, &mut item.flags);
        }
        for target in flags.pending_targets() {
            warn!(target, "surrogate target was never parsed");
        }
        self.db
    }

    // -----------------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------------

    /// Text of a `<type>`-like node with every `<ref>` replaced by the
    /// fully-qualified name it points to.
    fn real_type_text(&self, type_node: Node<'_, '_>) -> String {
        let mut text = String::new();
        for part in type_node.children() {
            if part.is_text() {
                text.push_str(part.text().unwrap_or_default());
            } else if part.has_tag_name("ref") {
                let shown = xml::text_content(part);
                let resolved = part.attribute("refid").and_then(|refid| {
                    self.index
                        .by_id(refid)
                        .map(|entry| entry.fqn.clone())
                        .or_else(|| doxygen_ref_to_cpp_name(refid, &shown))
                });
                text.push_str(resolved.as_deref().unwrap_or(&shown));
            } else {
                text.push_str(&xml::text_content(part));
            }
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Parse and repair the `<type>` child of `node`. `Ok(None)` when the
    /// node has no type text.
    fn member_type(&self, node: Node<'_, '_>, owner: Owner<'_>) -> error::Result<Option<Parsed<CppType>>> {
        let Some(type_node) = xml::child(node, "type") else {
            return Ok(None);
        };
        let text = self.real_type_text(type_node);
        if text.is_empty() {
            return Ok(None);
        }
        self.resolve_type(&text, owner).map(Some)
    }

    fn resolve_type(&self, text: &str, owner: Owner<'_>) -> error::Result<Parsed<CppType>> {
        let parsed = match parse_cpp_type(text) {
            Ok(parsed) => parsed,
            Err(e) => return Ok(Parsed::Degraded(format!("cannot parse type `{text}`: {e}"))),
        };
        match rebuild_incomplete_type_except(&parsed, &owner.context(), self.index, owner.template_params) {
            Ok(ty) => Ok(Parsed::Ok(ty)),
            Err(Error::TypeSyntax(e)) => Ok(Parsed::Degraded(e.to_string())),
            Err(e) => Err(e),
        }
    }

    // -----------------------------------------------------------------------
    // Namespaces
    // -----------------------------------------------------------------------

    fn add_namespace(&mut self, compound: Node<'_, '_>) -> error::Result<()> {
        let name = xml::child_text(compound, "compoundname");
        let flags = get_element_flags(compound, &name, self.flags);
        let nobind = flags.nobind;
        self.db.namespaces.insert(
            name.clone(),
            Namespace {
                id: compound.attribute("id").unwrap_or_default().to_string(),
                name: name.clone(),
                flags,
                description: xml::child_text(compound, "briefdescription"),
            },
        );
        if nobind {
            debug!(namespace = %name, "namespace is nobind, skipping members");
            return Ok(());
        }

        let owner = Owner {
            namespace: &name,
            class: None,
            template_params: &[],
        };
        for member in members(compound) {
            match member.attribute("kind") {
                Some("function") => {
                    let slot = self.parse_function(member, owner)?;
                    let fqn = make_fqn(&name, None, slot.name());
                    insert_function(&mut self.db.functions, &fqn, slot);
                }
                Some("enum") => {
                    let item = self.parse_enum(member, &name)?;
                    self.db.enums.insert(make_fqn(&name, None, &item.name), item);
                }
                Some("typedef") => {
                    if let Some(item) = self.parse_typedef(member, owner)? {
                        self.db.typedefs.insert(make_fqn(&name, None, &item.name), item);
                    }
                }
                Some("variable") => {
                    if let Some(item) = self.parse_global(member, owner)? {
                        self.db.globals.insert(make_fqn(&name, None, &item.name), item);
                    }
                }
                other => debug!(namespace = %name, kind = ?other, "ignoring namespace member"),
            }
        }
        Ok(())
    }

    fn parse_enum(&mut self, member: Node<'_, '_>, namespace: &str) -> error::Result<Enum> {
        let name = xml::child_text(member, "name");
        let fqn = make_fqn(namespace, None, &name);
        let values = xml::children(member, "enumvalue")
            .map(|value| EnumValue {
                name: xml::child_text(value, "name"),
                description: xml::child_text(value, "briefdescription"),
            })
            .collect::<Vec<_>>();
        debug!(name = %fqn, values = values.len(), "extracted enum");
        Ok(Enum {
            id: member.attribute("id").unwrap_or_default().to_string(),
            flags: get_element_flags(member, &fqn, self.flags),
            description: xml::child_text(member, "briefdescription"),
            location: parse_location(member, &fqn, self.project_root)?,
            name,
            namespace: namespace.to_string(),
            values,
        })
    }

    fn parse_typedef(&mut self, member: Node<'_, '_>, owner: Owner<'_>) -> error::Result<Option<Typedef>> {
        let name = xml::child_text(member, "name");
        let namespace = owner.context();
        let fqn = make_fqn(&namespace, None, &name);
        let ty = match self.member_type(member, owner)? {
            Some(Parsed::Ok(ty)) => ty,
            Some(Parsed::Degraded(reason)) => {
                warn!(name = %fqn, err = %reason, "skipping typedef");
                return Ok(None);
            }
            None => {
                warn!(name = %fqn, "skipping typedef without type");
                return Ok(None);
            }
        };
        debug!(name = %fqn, ty = %ty, "extracted typedef");
        Ok(Some(Typedef {
            id: member.attribute("id").unwrap_or_default().to_string(),
            flags: get_element_flags(member, &fqn, self.flags),
            definition: xml::child_text(member, "definition"),
            description: xml::child_text(member, "briefdescription"),
            location: parse_location(member, &fqn, self.project_root)?,
            name,
            namespace,
            ty,
        }))
    }

    fn parse_global(&mut self, member: Node<'_, '_>, owner: Owner<'_>) -> error::Result<Option<Global>> {
        let name = xml::child_text(member, "name");
        let fqn = make_fqn(owner.namespace, None, &name);
        let ty = match self.member_type(member, owner)? {
            Some(Parsed::Ok(ty)) => ty,
            Some(Parsed::Degraded(reason)) => {
                warn!(name = %fqn, err = %reason, "skipping global");
                return Ok(None);
            }
            None => {
                warn!(name = %fqn, "skipping global without type");
                return Ok(None);
            }
        };
        // Doxygen sometimes leaves the documentation of globals in the
        // detailed description only.
        let description = xml::child_text_opt(member, "briefdescription")
            .or_else(|| xml::child_text_opt(member, "detaileddescription"))
            .unwrap_or_default();
        debug!(name = %fqn, ty = %ty, "extracted global");
        Ok(Some(Global {
            id: member.attribute("id").unwrap_or_default().to_string(),
            flags: get_element_flags(member, &fqn, self.flags),
            definition: xml::child_text(member, "definition"),
            initializer: xml::child_text_opt(member, "initializer"),
            qualifiers: member_qualifiers(member),
            location: parse_location(member, &fqn, self.project_root)?,
            namespace: owner.namespace.to_string(),
            description,
            name,
            ty,
        }))
    }

    // -----------------------------------------------------------------------
    // Classes
    // -----------------------------------------------------------------------

    fn add_class(&mut self, compound: Node<'_, '_>) -> error::Result<()> {
        let fqn = xml::child_text(compound, "compoundname");
        if compound.attribute("prot") == Some("private") {
            debug!(name = %fqn, "skipping private class");
            return Ok(());
        }
        let namespace = parent_scope(&fqn).to_string();
        let name = last_segment(&fqn).to_string();
        if self.db.namespaces.get(&namespace).is_some_and(|ns| ns.flags.nobind) {
            debug!(name = %fqn, "skipping class of nobind namespace");
            return Ok(());
        }

        let template_params = template_params(compound);
        let flags = get_element_flags(compound, &fqn, self.flags);
        let location = parse_location(compound, &fqn, self.project_root)?;
        let bases = self.class_bases(compound, &namespace)?;

        let mut class = Class {
            id: compound.attribute("id").unwrap_or_default().to_string(),
            name: name.clone(),
            namespace: namespace.clone(),
            bases,
            constructors: Vec::new(),
            rejected_constructors: Vec::new(),
            destructor: None,
            methods: Default::default(),
            private_methods: Default::default(),
            attributes: Default::default(),
            is_abstract: false,
            template: !template_params.is_empty(),
            template_params: template_params.clone(),
            flags,
            description: xml::child_text(compound, "briefdescription"),
            visibility: Visibility::from_prot(compound.attribute("prot")),
            location,
        };

        let owner = Owner {
            namespace: &namespace,
            class: Some(&name),
            template_params: &template_params,
        };
        let short_name = strip_template_args(&name).to_string();
        let destructor_name = format!("~{short_name}");

        for member in members(compound) {
            let visibility = Visibility::from_prot(member.attribute("prot"));
            match member.attribute("kind") {
                Some("function") => {
                    let slot = self.parse_function(member, owner)?;
                    let member_name = slot.name().to_string();
                    if member_name == short_name && visibility == Visibility::Public {
                        match slot {
                            FunctionSlot::Concrete(ctor) => class.constructors.push(ctor),
                            FunctionSlot::Overload(group) => class.constructors.extend(group.overloads),
                            FunctionSlot::Placeholder(rejected) => {
                                warn!(class = %fqn, reason = %rejected.reason, "constructor cannot be bound");
                                class.rejected_constructors.push(rejected);
                            }
                        }
                    } else if member_name == destructor_name {
                        if let FunctionSlot::Concrete(dtor) = slot {
                            class.destructor = Some(dtor);
                        }
                    } else if visibility == Visibility::Public {
                        insert_function(&mut class.methods, &member_name, slot);
                    } else {
                        insert_function(&mut class.private_methods, &member_name, slot);
                    }
                }
                Some("variable") if visibility == Visibility::Public => {
                    if let Some(attribute) = self.parse_attribute(member, owner)? {
                        class.attributes.insert(attribute.name.clone(), attribute);
                    }
                }
                Some("enum") if visibility == Visibility::Public => {
                    let item = self.parse_enum(member, &fqn)?;
                    self.db.enums.insert(make_fqn(&fqn, None, &item.name), item);
                }
                Some("typedef") if visibility == Visibility::Public => {
                    if let Some(item) = self.parse_typedef(member, owner)? {
                        self.db.typedefs.insert(make_fqn(&fqn, None, &item.name), item);
                    }
                }
                other => debug!(class = %fqn, kind = ?other, ?visibility, "ignoring class member"),
            }
        }

        let abstract_method = class
            .all_methods()
            .flat_map(FunctionSlot::functions)
            .any(|method| method.is_abstract);
        class.is_abstract = abstract_method;
        debug!(
            name = %fqn,
            bases = class.bases.len(),
            methods = class.methods.len(),
            constructors = class.constructors.len(),
            is_abstract = class.is_abstract,
            "extracted class"
        );
        self.db.classes.insert(fqn, class);
        Ok(())
    }

    /// Resolve `<basecompoundref>`s: by refid, then by type repair, else the
    /// literal text (third-party bases).
    fn class_bases(&self, compound: Node<'_, '_>, namespace: &str) -> error::Result<Vec<String>> {
        let mut bases = Vec::new();
        for base in xml::children(compound, "basecompoundref") {
            let text = xml::text_content(base).trim().to_string();
            if let Some(entry) = base.attribute("refid").and_then(|refid| self.index.by_id(refid)) {
                bases.push(entry.fqn.clone());
                continue;
            }
            let owner = Owner {
                namespace,
                class: None,
                template_params: &[],
            };
            match self.resolve_type(&text, owner)? {
                Parsed::Ok(ty) => bases.push(ty.to_string()),
                Parsed::Degraded(reason) => {
                    debug!(base = %text, err = %reason, "keeping base class as written");
                    bases.push(text);
                }
            }
        }
        Ok(bases)
    }

    fn parse_attribute(&mut self, member: Node<'_, '_>, owner: Owner<'_>) -> error::Result<Option<Attribute>> {
        let name = xml::child_text(member, "name");
        let fqn = make_fqn(owner.namespace, owner.class, &name);
        let ty = match self.member_type(member, owner)? {
            Some(Parsed::Ok(ty)) => ty,
            Some(Parsed::Degraded(reason)) => {
                warn!(name = %fqn, err = %reason, "skipping attribute");
                return Ok(None);
            }
            None => {
                warn!(name = %fqn, "skipping attribute without type");
                return Ok(None);
            }
        };
        Ok(Some(Attribute {
            id: member.attribute("id").unwrap_or_default().to_string(),
            flags: get_element_flags(member, &fqn, self.flags),
            qualifiers: member_qualifiers(member),
            description: xml::child_text(member, "briefdescription"),
            visibility: Visibility::from_prot(member.attribute("prot")),
            location: parse_location(member, &fqn, self.project_root)?,
            namespace: owner.namespace.to_string(),
            from_class: owner.class.unwrap_or_default().to_string(),
            name,
            ty,
        }))
    }

    // -----------------------------------------------------------------------
    // Callables
    // -----------------------------------------------------------------------

    fn parse_function(&mut self, member: Node<'_, '_>, owner: Owner<'_>) -> error::Result<FunctionSlot> {
        let id = member.attribute("id").unwrap_or_default().to_string();
        let name = xml::child_text(member, "name");
        let fqn = make_fqn(owner.namespace, owner.class, &name);
        let flags = get_element_flags(member, &fqn, self.flags);
        let visibility = flags
            .visibility
            .unwrap_or_else(|| Visibility::from_prot(member.attribute("prot")));

        let placeholder = |reason: String| {
            FunctionSlot::Placeholder(FunctionPlaceholder {
                id: id.clone(),
                name: name.clone(),
                namespace: owner.namespace.to_string(),
                from_class: owner.class.map(str::to_string),
                visibility,
                reason,
            })
        };

        if name.contains('<') && name.contains('>') && !name.contains("<=>") {
            debug!(name = %fqn, "template specialisation kept as placeholder");
            return Ok(placeholder("template specialisation".to_string()));
        }
        if name.starts_with("operator") && owner.class.is_none() {
            debug!(name = %fqn, "free operator kept as placeholder");
            return Ok(placeholder("free operator".to_string()));
        }

        let template_params = template_params(member);
        let mut scope_params = owner.template_params.to_vec();
        scope_params.extend(template_params.iter().cloned());
        let member_owner = Owner {
            template_params: &scope_params,
            ..owner
        };

        let class_name = owner.class.map(strip_template_args);
        let is_special = class_name.is_some_and(|class| name == class || name == format!("~{class}"));
        let return_type = match self.member_type(member, member_owner)? {
            Some(Parsed::Ok(ty)) => Some(ty),
            Some(Parsed::Degraded(reason)) => {
                warn!(name = %fqn, err = %reason, "skipping function");
                return Ok(placeholder(reason));
            }
            None if is_special => None,
            None => {
                debug!(name = %fqn, "no return type, kept as placeholder");
                return Ok(placeholder("no return type".to_string()));
            }
        };

        let mut parameters = Vec::new();
        for (position, param) in xml::children(member, "param").enumerate() {
            match self.parse_parameter(member, param, position, member_owner)? {
                Parsed::Ok(parameter) => parameters.push(parameter),
                Parsed::Degraded(reason) => {
                    warn!(name = %fqn, err = %reason, "skipping function");
                    return Ok(placeholder(reason));
                }
            }
        }
        for (from, to) in &flags.rename_parameters {
            match parameters.iter_mut().find(|p| &p.name == from) {
                Some(parameter) => parameter.name = to.clone(),
                None => warn!(name = %fqn, parameter = %from, "cannot rename missing parameter"),
            }
        }

        let args = xml::child_text(member, "argsstring").replace(' ', "");
        let function = Function {
            id,
            name: name.clone(),
            namespace: owner.namespace.to_string(),
            from_class: owner.class.map(str::to_string),
            definition: xml::child_text(member, "definition"),
            parameters,
            return_type,
            template: !template_params.is_empty(),
            template_params,
            template_args: Vec::new(),
            qualifiers: member_qualifiers(member),
            force_cast: false,
            description: xml::child_text(member, "briefdescription"),
            deleted: args.ends_with("=delete"),
            is_abstract: member.attribute("virt") == Some("pure-virtual"),
            visibility,
            location: parse_location(member, &fqn, self.project_root)?,
            flags,
        };
        debug!(name = %fqn, params = function.parameters.len(), "extracted function");
        Ok(FunctionSlot::Concrete(function))
    }

    fn parse_parameter(
        &self,
        member: Node<'_, '_>,
        param: Node<'_, '_>,
        position: usize,
        owner: Owner<'_>,
    ) -> error::Result<Parsed<Parameter>> {
        let name = xml::child_text_opt(param, "declname")
            .or_else(|| xml::child_text_opt(param, "defname"))
            .unwrap_or_else(|| format!("p{position}"));
        let ty = match self.member_type(param, owner)? {
            Some(Parsed::Ok(ty)) => ty,
            Some(Parsed::Degraded(reason)) => return Ok(Parsed::Degraded(reason)),
            None => return Ok(Parsed::Degraded(format!("parameter `{name}` has no type"))),
        };
        Ok(Parsed::Ok(Parameter {
            description: parameter_description(member, &name)
                .or_else(|| xml::child_text_opt(param, "briefdescription"))
                .unwrap_or_default(),
            default: xml::child_text_opt(param, "defval"),
            name,
            ty,
        }))
    }
}

/// Every `memberdef` of every section, in document order.
fn members<'a, 'input>(compound: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    compound
        .children()
        .filter(|c| c.has_tag_name("sectiondef"))
        .flat_map(|section| section.children().filter(|m| m.has_tag_name("memberdef")))
}

fn member_qualifiers(member: Node<'_, '_>) -> MemberQualifiers {
    MemberQualifiers {
        is_const: xml::attr_flag(member, "const"),
        is_static: xml::attr_flag(member, "static"),
        is_volatile: xml::attr_flag(member, "volatile"),
    }
}

/// Names from `<templateparamlist>`, in order.
fn template_params(node: Node<'_, '_>) -> Vec<String> {
    let Some(list) = xml::child(node, "templateparamlist") else {
        return Vec::new();
    };
    xml::children(list, "param")
        .filter_map(|param| {
            xml::child_text_opt(param, "declname").or_else(|| {
                // `typename T` without a declname
                let ty = xml::child_text(param, "type");
                ty.split_whitespace().last().map(str::to_string)
            })
        })
        .collect()
}

/// Description of parameter `name` from the `\param` list of the detailed
/// description.
fn parameter_description(member: Node<'_, '_>, name: &str) -> Option<String> {
    let detailed = xml::child(member, "detaileddescription")?;
    detailed
        .descendants()
        .filter(|d| d.has_tag_name("parameteritem"))
        .find(|item| {
            item.descendants()
                .filter(|d| d.has_tag_name("parametername"))
                .any(|n| xml::text_content(n).trim() == name)
        })
        .and_then(|item| xml::child_text_opt(item, "parameterdescription"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SymbolKind;
    use crate::cpp_type::Qualifiers;
    use pretty_assertions::assert_eq;

    fn index() -> SymbolIndex {
        let mut index = SymbolIndex::default();
        index.register(SymbolKind::Namespace, "namespaceobe", "obe", "obe");
        index.register(SymbolKind::Class, "classobe_1_1_vector2", "obe::Vector2", "Vector2");
        index.register(SymbolKind::Class, "classobe_1_1_circle", "obe::Circle", "Circle");
        index.register(SymbolKind::Class, "classobe_1_1_sound", "obe::audio::Sound", "Sound");
        index.register(SymbolKind::Class, "classvili_1_1_sound", "vili::Sound", "Sound");
        index
    }

    fn wrap(compound: &str) -> String {
        format!(r#"<?xml version='1.0' encoding='UTF-8'?><doxygen>{compound}</doxygen>"#)
    }

    const LOCATION: &str = r#"<location file="/p/include/Core/A.hpp" line="1" column="1"/>"#;

    fn circle_xml() -> String {
        wrap(&format!(
            r#"<compounddef id="classobe_1_1_circle" kind="class" prot="public">
  <compoundname>obe::Circle</compoundname>
  <basecompoundref prot="public" virt="non-virtual">obe::Shape</basecompoundref>
  <sectiondef kind="public-func">
    <memberdef kind="function" id="c1" prot="public" static="no" const="no" virt="non-virtual">
      <type/><definition>obe::Circle::Circle</definition><argsstring>(float radius=1.f)</argsstring>
      <name>Circle</name>
      <param><type>float</type><declname>radius</declname><defval>1.f</defval></param>
      {LOCATION}
    </memberdef>
    <memberdef kind="function" id="c2" prot="public" static="no" const="yes" virt="non-virtual">
      <type><ref refid="classobe_1_1_vector2" kindref="compound">Vector2</ref></type>
      <definition>Vector2 obe::Circle::center</definition><argsstring>() const</argsstring>
      <name>center</name>
      {LOCATION}
    </memberdef>
    <memberdef kind="function" id="c3" prot="public" static="no" const="no" virt="non-virtual">
      <type>void</type><argsstring>(const Vector2 &amp;position)</argsstring>
      <name>move</name>
      <param><type>const <ref refid="classobe_1_1_vector2" kindref="compound">Vector2</ref> &amp;</type><declname>position</declname></param>
      <detaileddescription><para><parameterlist kind="param"><parameteritem>
        <parameternamelist><parametername>position</parametername></parameternamelist>
        <parameterdescription><para>Where to go</para></parameterdescription>
      </parameteritem></parameterlist></para></detaileddescription>
      {LOCATION}
    </memberdef>
    <memberdef kind="function" id="c4" prot="public" static="no" const="no" virt="non-virtual">
      <type>void</type><argsstring>(float x, float y)</argsstring>
      <name>move</name>
      <param><type>float</type></param>
      <param><type>float</type><defname>y</defname></param>
      {LOCATION}
    </memberdef>
    <memberdef kind="function" id="c5" prot="public" static="no" const="no" virt="non-virtual">
      <type>std::vector&lt;int</type><argsstring>()</argsstring>
      <name>broken</name>
      {LOCATION}
    </memberdef>
    <memberdef kind="function" id="c6" prot="public" static="no" const="no" virt="non-virtual">
      <type>void</type><argsstring>(const Circle &amp;)=delete</argsstring>
      <name>operator=</name>
      <param><type>const <ref refid="classobe_1_1_circle" kindref="compound">Circle</ref> &amp;</type></param>
      {LOCATION}
    </memberdef>
  </sectiondef>
  <sectiondef kind="protected-func">
    <memberdef kind="function" id="c7" prot="protected" static="no" const="no" virt="pure-virtual">
      <type>void</type><argsstring>()=0</argsstring>
      <name>draw</name>
      {LOCATION}
    </memberdef>
  </sectiondef>
  <sectiondef kind="public-attrib">
    <memberdef kind="variable" id="c8" prot="public" static="yes" const="no">
      <type>float</type><name>epsilon</name>
      {LOCATION}
    </memberdef>
  </sectiondef>
  <sectiondef kind="public-type">
    <memberdef kind="enum" id="c9" prot="public">
      <name>Fill</name>
      <enumvalue id="c9a" prot="public"><name>Solid</name></enumvalue>
      <enumvalue id="c9b" prot="public"><name>Hollow</name></enumvalue>
      {LOCATION}
    </memberdef>
  </sectiondef>
  {LOCATION}
</compounddef>"#
        ))
    }

    fn build(documents: &[String]) -> error::Result<Database> {
        let index = index();
        let mut flags = FlagContext::default();
        let mut builder = Builder::new(&index, &mut flags, Path::new("/p"));
        for document in documents {
            builder.add_compound_xml(document)?;
        }
        Ok(builder.finish())
    }

    #[test]
    fn class_members_are_extracted() {
        let db = build(&[circle_xml()]).unwrap();
        let circle = &db.classes["obe::Circle"];
        assert_eq!(circle.bases, vec!["obe::Shape"]);
        assert_eq!(circle.constructors.len(), 1);
        assert_eq!(circle.constructors[0].parameters[0].default.as_deref(), Some("1.f"));
        assert!(circle.is_abstract);
        assert_eq!(circle.location.file, "include/Core/A.hpp");

        let FunctionSlot::Concrete(center) = &circle.methods["center"] else {
            panic!("center should be concrete");
        };
        assert!(center.qualifiers.is_const);
        assert_eq!(center.return_type, Some(CppType::base("obe::Vector2")));

        let FunctionSlot::Overload(moves) = &circle.methods["move"] else {
            panic!("move should be an overload group");
        };
        assert_eq!(moves.overloads.len(), 2);
        let first = &moves.overloads[0].parameters[0];
        assert_eq!(first.description, "Where to go");
        assert_eq!(
            first.ty,
            CppType::Base {
                name: "obe::Vector2".into(),
                qualifiers: Qualifiers { prefix: vec!["const".into()], postfix: vec!["&".into()] },
            }
        );
        let names: Vec<_> = moves.overloads[1].parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["p0", "y"]);

        assert!(matches!(&circle.methods["broken"], FunctionSlot::Placeholder(_)));
        assert!(matches!(&circle.methods["operator="], FunctionSlot::Concrete(f) if f.deleted));
        assert!(circle.private_methods.contains_key("draw"));
        assert!(circle.attributes["epsilon"].qualifiers.is_static);
        assert_eq!(db.enums["obe::Circle::Fill"].values.len(), 2);
        assert_eq!(db.enums["obe::Circle::Fill"].namespace, "obe::Circle");
    }

    #[test]
    fn ambiguous_reference_aborts() {
        let doc = wrap(&format!(
            r#"<compounddef id="namespaceobe_1_1scene" kind="namespace">
  <compoundname>obe::scene</compoundname>
  <sectiondef kind="func">
    <memberdef kind="function" id="n1" prot="public" static="no" const="no" virt="non-virtual">
      <type>void</type><argsstring>(Sound &amp;s)</argsstring><name>play</name>
      <param><type>Sound &amp;</type><declname>s</declname></param>
      {LOCATION}
    </memberdef>
  </sectiondef>
</compounddef>"#
        ));
        let err = build(&[doc]).unwrap_err();
        assert!(matches!(err, Error::AmbiguousSymbol { .. }), "{err}");
    }

    #[test]
    fn missing_location_aborts() {
        let doc = wrap(
            r#"<compounddef id="classobe_1_1_circle" kind="class" prot="public"><compoundname>obe::Circle</compoundname></compounddef>"#,
        );
        assert!(matches!(build(&[doc]), Err(Error::MissingNode { .. })));
    }

    #[test]
    fn nobind_namespace_hides_its_classes() {
        let namespace = wrap(
            r#"<compounddef id="namespaceobe" kind="namespace"><compoundname>obe</compoundname>
  <detaileddescription><para><ulink url="obidog.nobind">x</ulink></para></detaileddescription>
</compounddef>"#,
        );
        let db = build(&[namespace, circle_xml()]).unwrap();
        assert!(db.namespaces["obe"].flags.nobind);
        assert!(db.classes.is_empty());
    }

    #[test]
    fn selects_own_source_compound_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "classobe_1_1_circle.xml",
            "structobe_1_1_rect.xml",
            "namespaceobe.xml",
            "namespaceobe_1_1audio.xml",
            "classsf_1_1_texture.xml",
            "classobelisk_1_1_thing.xml",
            "structobelisk_1_1_part.xml",
            "namespaceobelisk.xml",
            "classobe.xml",
            "index.xml",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let (namespaces, classes) = compound_files(dir.path(), &["obe".to_string()]).unwrap();
        let file_names = |paths: &[PathBuf]| {
            paths
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(file_names(&namespaces), vec!["namespaceobe.xml", "namespaceobe_1_1audio.xml"]);
        assert_eq!(file_names(&classes), vec!["classobe_1_1_circle.xml", "structobe_1_1_rect.xml"]);
    }

    #[test]
    fn surrogates_reach_overloads_constructors_and_namespaces() {
        let early = wrap(&format!(
            r#"<compounddef id="namespaceobe" kind="namespace"><compoundname>obe</compoundname>
  <sectiondef kind="func">
    <memberdef kind="function" id="n1" prot="public" static="no" const="no" virt="non-virtual">
      <type>void</type><argsstring>()</argsstring><name>moveDoc</name>
      <detaileddescription><para><ulink url="obidog.surrogate:obe::Circle::move">x</ulink><ulink url="obidog.rename:go">x</ulink></para></detaileddescription>
      {LOCATION}
    </memberdef>
  </sectiondef>
</compounddef>"#
        ));
        let late = wrap(&format!(
            r#"<compounddef id="namespaceobe_1_1scene" kind="namespace"><compoundname>obe::scene</compoundname>
  <sectiondef kind="func">
    <memberdef kind="function" id="s1" prot="public" static="no" const="no" virt="non-virtual">
      <type>void</type><argsstring>()</argsstring><name>circleDoc</name>
      <detaileddescription><para><ulink url="obidog.surrogate:obe::Circle::Circle">x</ulink><ulink url="obidog.helper:circle.lua">x</ulink></para></detaileddescription>
      {LOCATION}
    </memberdef>
  </sectiondef>
</compounddef>"#
        ));
        let namespace_doc = wrap(
            r#"<compounddef id="namespaceobe_1_1audio" kind="namespace"><compoundname>obe::audio</compoundname>
  <detaileddescription><para><ulink url="obidog.surrogate:obe">x</ulink><ulink url="obidog.load_priority:4">x</ulink></para></detaileddescription>
</compounddef>"#,
        );
        let db = build(&[early, circle_xml(), late, namespace_doc]).unwrap();

        let circle = &db.classes["obe::Circle"];
        let moves = circle.methods["move"].functions();
        assert_eq!(moves.len(), 2);
        assert!(moves.iter().all(|f| f.flags.rename.as_deref() == Some("go")));
        assert_eq!(circle.constructors[0].flags.helpers, vec!["circle.lua"]);
        assert_eq!(db.namespaces["obe"].flags.load_priority, 4);
        assert!(db.namespaces["obe::audio"].flags.nobind);
        assert!(db.functions["obe::moveDoc"].functions()[0].flags.nobind);
    }

    #[test]
    fn rejected_constructor_and_private_destructor_are_recorded() {
        let doc = wrap(&format!(
            r#"<compounddef id="classobe_1_1_file" kind="class" prot="public">
  <compoundname>obe::File</compoundname>
  <sectiondef kind="public-func">
    <memberdef kind="function" id="f1" prot="public" static="no" const="no" virt="non-virtual">
      <type/><argsstring>(std::map&lt;int x)</argsstring><name>File</name>
      <param><type>std::map&lt;int</type><declname>x</declname></param>
      {LOCATION}
    </memberdef>
  </sectiondef>
  <sectiondef kind="private-func">
    <memberdef kind="function" id="f2" prot="private" static="no" const="no" virt="non-virtual">
      <type/><argsstring>()</argsstring><name>~File</name>
      {LOCATION}
    </memberdef>
  </sectiondef>
  {LOCATION}
</compounddef>"#
        ));
        let db = build(&[doc]).unwrap();
        let file = &db.classes["obe::File"];
        assert!(file.constructors.is_empty());
        assert_eq!(file.rejected_constructors.len(), 1);
        assert_eq!(file.destructor.as_ref().map(|d| d.visibility), Some(Visibility::Private));
        assert!(!crate::binding::plan_constructors(&db, file).constructible);
    }
}

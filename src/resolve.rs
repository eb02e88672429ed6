//! Cross-reference resolution over the scanned model. Type references
//! written without a namespace are rewritten to their declaring namespace,
//! include references are rewritten relative to the generation target, and
//! the custom-type register maps unqualified names to their components for
//! the generator.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::{resolve_include_path, Config};
use crate::model::{
    type_name_without_namespace, type_without_namespace, Component,
};
use crate::utils::errors::Diagnostic;
use crate::utils::paths::{normalize_path, relative_path};

/// Scanned components of every loaded dependency, keyed by config path.
pub type DependencyMap = BTreeMap<PathBuf, Vec<Component>>;

/// Maps each bare type name to its declaring namespace prefix. Local
/// components shadow dependency components of the same name; duplicates are
/// the validator's problem.
fn namespace_table(components: &[Component], dependencies: &DependencyMap) -> BTreeMap<String, String> {
    let mut table = BTreeMap::new();
    let all = components
        .iter()
        .chain(dependencies.values().flatten());
    for component in all {
        let Some(name) = &component.name else {
            continue;
        };
        let clean = type_name_without_namespace(name).to_string();
        let (namespace, _) = crate::model::split_namespace(name);
        table.entry(clean).or_insert(namespace);
    }
    table
}

fn resolve_name(name: &str, table: &BTreeMap<String, String>) -> String {
    let clean = type_name_without_namespace(name);
    match table.get(clean) {
        // Pointer and reference suffixes ride along on the bare name.
        Some(namespace) => format!("{namespace}{}", type_without_namespace(name)),
        None => name.to_string(),
    }
}

/// Rewrites every type reference in place so that references to known
/// types carry their declaring namespace. Unknown names pass through for
/// the validator to report.
pub fn ensure_namespaced_type_refs(components: &mut [Component], dependencies: &DependencyMap) {
    let table = namespace_table(components, dependencies);
    for component in components.iter_mut() {
        for property in &mut component.properties {
            if let Some(ty) = &property.ty {
                property.ty = Some(resolve_name(ty, &table));
            }
        }
        for function in component
            .functions
            .iter_mut()
            .chain(component.constructors.iter_mut())
        {
            for param in &mut function.parameters {
                param.ty = resolve_name(&param.ty, &table);
            }
            if let Some(ret) = &function.return_type {
                function.return_type = Some(resolve_name(ret, &table));
            }
        }
        for operator in &mut component.operators {
            for param in &mut operator.parameters {
                param.ty = resolve_name(&param.ty, &table);
            }
            if let Some(ret) = &operator.return_type {
                operator.return_type = Some(resolve_name(ret, &table));
            }
        }
    }
}

/// Rewrites each component's include list for the generated unit: the
/// declaring file itself comes first as a quoted path relative to the
/// output location, then every include the file carried, resolved through
/// the configured search paths. An unresolvable angle include is kept
/// verbatim with a warning; an unresolvable quoted include is an error.
pub fn fix_header_references(components: &mut [Component], config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let target_path = config.target_path();
    let target_dir = target_path.parent().unwrap_or(std::path::Path::new("."));

    for component in components.iter_mut() {
        let Some(loc) = component.loc.clone() else {
            continue;
        };
        let abs = loc
            .path
            .canonicalize()
            .unwrap_or_else(|_| normalize_path(&loc.path));
        let component_include = relative_path(&abs, &normalize_path(target_dir));
        let mut updated = vec![format!("\"{}\"", component_include.display())];

        for header in &component.requires {
            let is_angle = header.starts_with('<') && header.ends_with('>');
            let bare = header
                .trim_start_matches(['"', '<'])
                .trim_end_matches(['"', '>']);
            match resolve_include_path(&loc.path, bare, config, !is_angle) {
                Ok(resolved) => updated.push(resolved),
                Err(err) if is_angle => {
                    diagnostics.push(Diagnostic::warning(
                        &loc.path,
                        None,
                        format!(
                            "{}: {err}",
                            component.name.as_deref().unwrap_or("<globals>")
                        ),
                    ));
                    updated.push(header.clone());
                }
                Err(err) => {
                    diagnostics.push(Diagnostic::error(
                        &loc.path,
                        None,
                        format!(
                            "{}: {err}",
                            component.name.as_deref().unwrap_or("<globals>")
                        ),
                    ));
                }
            }
        }
        component.requires = updated;
    }
    diagnostics
}

/// Maps each bare type name to its component, local components and then
/// dependencies, later entries overwriting earlier ones of the same name.
pub fn custom_type_register<'a>(
    components: &'a [Component],
    dependencies: &'a DependencyMap,
) -> BTreeMap<String, &'a Component> {
    let mut register = BTreeMap::new();
    let all = components
        .iter()
        .chain(dependencies.values().flatten());
    for component in all {
        if let Some(name) = &component.name {
            register.insert(type_without_namespace(name).to_string(), component);
        }
    }
    register
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagConfig;
    use crate::scanner::analyze_source;
    use std::path::Path;

    fn scan(source: &str) -> Vec<Component> {
        analyze_source(Path::new("test.h"), source, &TagConfig::default())
            .expect("scan should succeed")
    }

    #[test]
    fn bare_references_gain_their_namespace() {
        let mut components = scan(
            "namespace geo {\n\
             MPyClass()\n\
             class Vec2 {\n\
                 MPyFunction()\n\
                 Vec2 Scaled(const Vec2& factor) const;\n\
                 MPyProperty()\n\
                 Vec2 origin;\n\
             };\n\
             }\n",
        );
        ensure_namespaced_type_refs(&mut components, &DependencyMap::new());
        let vec2 = &components[0];
        assert_eq!(vec2.functions[0].return_type.as_deref(), Some("geo::Vec2"));
        assert_eq!(vec2.functions[0].parameters[0].ty, "geo::Vec2&");
        assert_eq!(vec2.properties[0].ty.as_deref(), Some("geo::Vec2"));
    }

    #[test]
    fn dependency_types_resolve_too() {
        let mut components = scan(
            "MPyClass()\n\
             class User {\n\
                 MPyFunction()\n\
                 Handle Get() const;\n\
             };\n",
        );
        let dep = scan(
            "namespace sys {\n\
             MPyClass()\n\
             class Handle {\n\
             };\n\
             }\n",
        );
        let mut deps = DependencyMap::new();
        deps.insert(PathBuf::from("dep.json"), dep);
        ensure_namespaced_type_refs(&mut components, &deps);
        assert_eq!(
            components[0].functions[0].return_type.as_deref(),
            Some("sys::Handle")
        );
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut components = scan(
            "namespace geo {\n\
             MPyClass()\n\
             class Vec2 {\n\
                 MPyFunction()\n\
                 Vec2 Scaled(const Vec2& factor, Handle h) const;\n\
                 MPyProperty()\n\
                 Vec2 origin;\n\
             };\n\
             }\n",
        );
        let mut deps = DependencyMap::new();
        deps.insert(
            PathBuf::from("dep.json"),
            scan("namespace sys {\nMPyClass()\nclass Handle {\n};\n}\n"),
        );
        ensure_namespaced_type_refs(&mut components, &deps);
        let once = format!("{components:?}");
        ensure_namespaced_type_refs(&mut components, &deps);
        ensure_namespaced_type_refs(&mut components, &deps);
        assert_eq!(format!("{components:?}"), once);
    }

    #[test]
    fn unknown_names_pass_through() {
        let mut components = scan(
            "MPyClass()\n\
             class A {\n\
                 MPyFunction()\n\
                 Mystery Get() const;\n\
             };\n",
        );
        ensure_namespaced_type_refs(&mut components, &DependencyMap::new());
        assert_eq!(
            components[0].functions[0].return_type.as_deref(),
            Some("Mystery")
        );
    }

    #[test]
    fn register_keys_are_unqualified() {
        let components = scan(
            "namespace geo {\n\
             MPyClass()\n\
             class Vec2 {\n\
             };\n\
             }\n",
        );
        let deps = DependencyMap::new();
        let register = custom_type_register(&components, &deps);
        assert!(register.contains_key("Vec2"));
        assert_eq!(
            register["Vec2"].name.as_deref(),
            Some("geo::Vec2")
        );
    }
}

//! Binding generation. Consumes the resolved and validated component
//! model and assembles the two emitted artifacts: a declarations header
//! and a definitions source, both stamped from the templates in
//! [`templates`].

pub mod dispatch;
pub mod modules;
pub mod templates;
pub mod types;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::config::{Config, DependencyRegistry};
use crate::model::{self, Component};
use crate::resolve::{custom_type_register, DependencyMap};
use crate::utils::paths::{normalize_path, relative_path};
use crate::utils::placeholders::{apply_placeholders, PlaceholderError};

use modules::{make_module_declaration_name, ModuleSet};
use types::custom_type_value_type;

/// Module assignment for declarations appearing before any module tag.
pub const DEFAULT_MODULE: &str = "main";

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("function {name} does not allow overloads but has {count}")]
    OverloadsNotAllowed { name: String, count: usize },
    #[error("operator {spelling} is not supported")]
    UnsupportedOperator { spelling: String },
    #[error("module {name} is part of a submodule cycle involving: {modules}")]
    ModuleCycle { name: String, modules: String },
    #[error(transparent)]
    Template(#[from] PlaceholderError),
}

/// Expands a code template with every placeholder required to resolve.
/// Leading and trailing newlines of the template literal are stripped so
/// fragments join cleanly.
pub(crate) fn render(template: &str, vars: &[(&str, &str)]) -> Result<String, GeneratorError> {
    let trimmed = template
        .trim_start_matches('\n')
        .trim_end_matches('\n');
    Ok(apply_placeholders(trimmed, true, vars)?)
}

/// Shared lookup state for one generation run.
pub struct GeneratorContext<'a> {
    pub custom_types: BTreeMap<String, &'a Component>,
}

impl<'a> GeneratorContext<'a> {
    pub fn new(components: &'a [Component], dependencies: &'a DependencyMap) -> Self {
        Self {
            custom_types: custom_type_register(components, dependencies),
        }
    }

    pub fn empty() -> GeneratorContext<'static> {
        GeneratorContext {
            custom_types: BTreeMap::new(),
        }
    }

    pub fn lookup(&self, ty: &str) -> Option<&'a Component> {
        self.custom_types
            .get(model::type_name_without_namespace(ty))
            .copied()
    }

    /// Transient types are exposed by address; everything else bound to a
    /// pointer-spelled parameter is a local value here.
    pub fn is_transient(&self, ty: &str) -> bool {
        self.lookup(ty).is_some_and(|component| {
            !component.attrs.contains_key("TypeNonTransient")
                && !component.attrs.contains_key("TypeOwned")
        })
    }
}

fn quoted(path: &std::path::Path) -> String {
    format!("\"{}\"", path.display())
}

/// Include lines for the headers emitted by this config's dependencies,
/// written relative to this config's own output location. A dependency
/// writing to stdout has no header to include.
fn dependency_header_includes(
    config: &Config,
    registry: &DependencyRegistry,
) -> Result<Vec<String>, GeneratorError> {
    let target_path = config.target_path();
    let target_dir = normalize_path(target_path.parent().unwrap_or(std::path::Path::new(".")));
    config
        .dependencies()
        .iter()
        .filter_map(|path| registry.get(path))
        .filter_map(|dep| dep.target_header_path())
        .map(|header| {
            let include = quoted(&relative_path(&normalize_path(&header), &target_dir));
            render(templates::DEPENDENCY_INCLUDE, &[("include", &include)])
        })
        .collect()
}

fn include_lines(includes: &BTreeSet<String>) -> Result<String, GeneratorError> {
    let lines = includes
        .iter()
        .map(|include| render(templates::DEPENDENCY_INCLUDE, &[("include", include)]))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

/// The declarations artifact: public type declarations and converters for
/// export-marked types, plus forward declarations of every module the
/// unit defines.
pub fn generate_header(
    config: &Config,
    registry: &DependencyRegistry,
    components: &[Component],
) -> Result<String, GeneratorError> {
    let mut headers = BTreeSet::new();
    let mut declarations = Vec::new();
    let mut converters = Vec::new();
    let mut module_names = BTreeSet::new();

    for component in components {
        module_names.insert(
            component
                .module
                .clone()
                .unwrap_or_else(|| DEFAULT_MODULE.to_string()),
        );
        if !component.attrs.contains_key("ExportPublic") {
            continue;
        }
        let Some(full_name) = &component.name else {
            continue;
        };
        let (_, name, _) = model::qualified_parts(full_name, None);
        let type_name = custom_type_value_type(full_name, &component.attrs);
        declarations.push(render(
            templates::CUSTOM_TYPE_HEADER_DECLARATION,
            &[("name", &name), ("type_name", &type_name)],
        )?);
        converters.push(render(
            templates::CUSTOM_TYPE_CONVERTER,
            &[("type_name", &type_name), ("name", &name)],
        )?);
        headers.extend(component.requires.iter().cloned());
    }

    let extern_modules = module_names
        .iter()
        .map(|module| {
            let declaration = make_module_declaration_name(module);
            render(templates::MODULE_EXTERN, &[("module_name", &declaration)])
        })
        .collect::<Result<Vec<_>, _>>()?;

    let dependency_includes = dependency_header_includes(config, registry)?;

    render(
        templates::HEADER,
        &[
            ("header_include", &include_lines(&headers)?),
            ("header_dependency_includes", &dependency_includes.join("\n")),
            ("custom_public_type_declarations", &declarations.join("\n")),
            ("type_converters", &converters.join("\n")),
            ("extern_modules", &extern_modules.join("\n")),
        ],
    )
}

/// The definitions artifact: private type declarations, the remaining
/// include set, and every module's dispatch code in dependency order.
pub fn generate_source(
    config: &Config,
    components: &'_ [Component],
    dependencies: &DependencyMap,
) -> Result<String, GeneratorError> {
    let ctx = GeneratorContext::new(components, dependencies);
    let mut headers: BTreeSet<String> = BTreeSet::new();
    let mut declarations = Vec::new();
    let mut converters = Vec::new();
    let mut set = ModuleSet::new(dependencies);

    // Types register first so free operators can attach to them later.
    for component in components {
        headers.extend(component.requires.iter().cloned());
        let module = component.module.as_deref().unwrap_or(DEFAULT_MODULE);
        set.get_or_make_module(module, false);
        if component.name.is_some() {
            set.add_type(module, component, &ctx)?;
            if !component.attrs.contains_key("ExportPublic") {
                let full_name = component.name.as_deref().unwrap_or_default();
                let (_, name, _) = model::qualified_parts(full_name, None);
                let type_name = custom_type_value_type(full_name, &component.attrs);
                declarations.push(render(
                    templates::CUSTOM_TYPE_SOURCE_DECLARATION,
                    &[("name", &name), ("type_name", &type_name)],
                )?);
                converters.push(render(
                    templates::CUSTOM_TYPE_CONVERTER,
                    &[("type_name", &type_name), ("name", &name)],
                )?);
            }
        }
    }

    for component in components {
        if component.attrs.contains_key("ExportPublic") {
            // Publicly declared headers already live in the emitted header.
            for header in &component.requires {
                headers.remove(header);
            }
        }
        let module = component.module.as_deref().unwrap_or(DEFAULT_MODULE);
        if component.is_globals() {
            for property in &component.properties {
                set.add_property(module, property)?;
            }
            for function in &component.functions {
                set.add_function(module, function);
            }
            for operator in &component.operators {
                set.add_operator(module, operator);
            }
        }
    }

    let module_code = set.to_code(&ctx)?;

    let primary_include = match config.target_header_path() {
        Some(header) => {
            let name = header
                .file_name()
                .map(|name| format!("\"{}\"", name.to_string_lossy()))
                .unwrap_or_default();
            render(templates::DEPENDENCY_INCLUDE, &[("include", &name)])?
        }
        None => String::new(),
    };

    render(
        templates::SOURCE,
        &[
            ("primary_header_include", &primary_include),
            ("header_include", &include_lines(&headers)?),
            ("custom_private_type_declarations", &declarations.join("\n")),
            ("type_converters", &converters.join("\n")),
            ("module_template", &module_code),
        ],
    )
}

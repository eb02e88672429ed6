//! Module tree assembly. Dotted module names form a containment tree with
//! synthesized ancestors; modules already defined by a dependency are only
//! forward-declared. Emission happens in topological order so submodule
//! objects exist before the parent table references them.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::codegen::dispatch::FunctionBinding;
use crate::codegen::templates;
use crate::codegen::types::{constant_entry, TypeBinding};
use crate::codegen::{render, GeneratorContext, GeneratorError};
use crate::model::{self, Component, Function, Operator, Property};
use crate::resolve::DependencyMap;

/// `a.b.c` -> `ABC`: the C identifier stem used in generated declarations.
pub fn make_module_declaration_name(name: &str) -> String {
    name.split('.').map(capitalize).collect()
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// One module in the containment tree.
#[derive(Debug)]
pub struct ModuleBinding<'a> {
    pub dotted: String,
    pub module_name: String,
    pub py_module_name: String,
    pub is_extern: bool,
    /// Defined by a dependency unit; stays extern even when used locally.
    dependency_defined: bool,
    submodules: Vec<String>,
    getters: Vec<String>,
    setters: Vec<String>,
    constants: Vec<String>,
    functions: Vec<FunctionBinding>,
    pending_operators: Vec<Operator>,
    types: Vec<TypeBinding<'a>>,
}

/// The full module tree for one generation unit.
#[derive(Debug)]
pub struct ModuleSet<'a> {
    dependencies: &'a DependencyMap,
    modules: BTreeMap<String, ModuleBinding<'a>>,
    insertion: Vec<String>,
}

impl<'a> ModuleSet<'a> {
    pub fn new(dependencies: &'a DependencyMap) -> Self {
        Self {
            dependencies,
            modules: BTreeMap::new(),
            insertion: Vec::new(),
        }
    }

    /// A dependency exposing the same python name (module, type, function
    /// or property) already owns the definition.
    fn defined_by_dependencies(&self, py_name: &str) -> bool {
        for components in self.dependencies.values() {
            for component in components {
                if let Some(name) = &component.name {
                    if model::python_name(component.python_name.as_deref(), name) == py_name {
                        return true;
                    }
                }
                let functions = component.functions.iter().map(|function| {
                    model::python_name(
                        function.python_name.as_deref(),
                        function.name.as_deref().unwrap_or_default(),
                    )
                });
                let properties = component.properties.iter().map(|property| {
                    model::python_name(
                        property.python_name.as_deref(),
                        property.name.as_deref().unwrap_or_default(),
                    )
                });
                if functions.chain(properties).any(|name| name == py_name) {
                    return true;
                }
                // Operators always live in the same module as their type.
            }
        }
        false
    }

    /// Ensures `dotted` and all of its ancestors exist. Ancestors are
    /// created extern; a module requested with `is_extern` false becomes
    /// local unless a dependency already defines it.
    pub fn get_or_make_module(&mut self, dotted: &str, is_extern: bool) {
        if !self.modules.contains_key(dotted) {
            let py_module_name = dotted.rsplit('.').next().unwrap_or(dotted).to_string();
            let dependency_defined = self.defined_by_dependencies(&py_module_name);
            let module = ModuleBinding {
                dotted: dotted.to_string(),
                module_name: make_module_declaration_name(dotted),
                py_module_name,
                is_extern: is_extern || dependency_defined,
                dependency_defined,
                submodules: Vec::new(),
                getters: Vec::new(),
                setters: Vec::new(),
                constants: Vec::new(),
                functions: Vec::new(),
                pending_operators: Vec::new(),
                types: Vec::new(),
            };
            self.modules.insert(dotted.to_string(), module);
            self.insertion.push(dotted.to_string());

            if let Some((parent, _)) = dotted.rsplit_once('.') {
                self.get_or_make_module(parent, true);
                if let Some(parent) = self.modules.get_mut(parent) {
                    if !parent.submodules.iter().any(|sub| sub == dotted) {
                        parent.submodules.push(dotted.to_string());
                    }
                }
            }
        }
        if !is_extern {
            if let Some(module) = self.modules.get_mut(dotted) {
                if !module.dependency_defined {
                    module.is_extern = false;
                }
            }
        }
    }

    fn module_mut(&mut self, dotted: &str) -> &mut ModuleBinding<'a> {
        self.get_or_make_module(dotted, false);
        self.modules
            .get_mut(dotted)
            .unwrap_or_else(|| unreachable!("module was just created"))
    }

    pub fn add_type(
        &mut self,
        dotted: &str,
        component: &'a Component,
        ctx: &GeneratorContext<'a>,
    ) -> Result<(), GeneratorError> {
        let binding = TypeBinding::new(component, ctx)?;
        let module = self.module_mut(dotted);
        module.types.push(binding);
        let pending = std::mem::take(&mut module.pending_operators);
        for operator in pending {
            if let Some(operator) = Self::try_bind_operator(module, operator) {
                module.pending_operators.push(operator);
            }
        }
        Ok(())
    }

    pub fn add_function(&mut self, dotted: &str, function: &Function) {
        let module = self.module_mut(dotted);
        let py_name = model::python_name(
            function.python_name.as_deref(),
            function.name.as_deref().unwrap_or_default(),
        );
        if let Some(existing) = module
            .functions
            .iter_mut()
            .find(|binding| binding.python_name == py_name)
        {
            existing.add_overload(function);
        } else {
            module.functions.push(FunctionBinding::new(function));
        }
    }

    /// A free operator whose first parameter names a type registered in
    /// this module becomes an instance-bound operator on that type. Gives
    /// back the operator when no type matches yet.
    fn try_bind_operator(
        module: &mut ModuleBinding<'a>,
        operator: Operator,
    ) -> Option<Operator> {
        let first_type = operator
            .parameters
            .first()
            .map(|param| model::type_name_without_namespace(&param.ty).to_string())?;
        let target = module
            .types
            .iter_mut()
            .find(|binding| binding.name == first_type)?;
        let mut bound = operator;
        bound.parameters.remove(0);
        target.add_operator(&bound);
        None
    }

    pub fn add_operator(&mut self, dotted: &str, operator: &Operator) {
        let module = self.module_mut(dotted);
        if operator.parameters.is_empty() {
            warn!(
                spelling = operator.spelling.as_deref().unwrap_or("<unknown>"),
                "free operator without parameters cannot bind to a type"
            );
            return;
        }
        if let Some(unbound) = Self::try_bind_operator(module, operator.clone()) {
            // The type may still register later in this unit.
            module.pending_operators.push(unbound);
        }
    }

    pub fn add_property(&mut self, dotted: &str, property: &Property) -> Result<(), GeneratorError> {
        let module = self.module_mut(dotted);
        let is_constant =
            property.modifiers.is_constexpr || property.attrs.contains_key("PropConstant");
        let name = property.name.as_deref().unwrap_or_default();
        if is_constant {
            module
                .constants
                .push(constant_entry(property, name.to_string())?);
            return Ok(());
        }
        let py_name = model::python_name(property.python_name.as_deref(), name);
        let ty = property.ty.as_deref().unwrap_or_default();
        if !property.attrs.contains_key("PropWriteOnly") {
            module.getters.push(render(
                templates::MODULE_VARIABLE_GETTER,
                &[("py_name", &py_name), ("type", ty), ("value", name)],
            )?);
        }
        if !property.attrs.contains_key("PropReadOnly") && !property.modifiers.is_const {
            module.setters.push(render(
                templates::MODULE_VARIABLE_SETTER,
                &[("py_name", &py_name), ("type", ty), ("value", name)],
            )?);
        }
        Ok(())
    }

    /// Modules in emission order: every submodule precedes its parent. A
    /// containment cycle is fatal and names the modules involved.
    pub fn ordered(&self) -> Result<Vec<&ModuleBinding<'a>>, GeneratorError> {
        let mut queue: Vec<&str> = self.insertion.iter().map(String::as_str).collect();
        let mut ordered: Vec<&str> = Vec::with_capacity(queue.len());
        let mut touched: BTreeSet<&str> = BTreeSet::new();

        while let Some(&peek) = queue.last() {
            let Some(module) = self.modules.get(peek) else {
                queue.pop();
                continue;
            };
            if module
                .submodules
                .iter()
                .all(|sub| ordered.contains(&sub.as_str()))
            {
                ordered.push(peek);
                queue.pop();
                continue;
            }
            if touched.contains(peek) {
                return Err(GeneratorError::ModuleCycle {
                    name: module.module_name.clone(),
                    modules: touched.iter().copied().collect::<Vec<_>>().join(", "),
                });
            }
            touched.insert(peek);
            for sub in &module.submodules {
                if !ordered.contains(&sub.as_str()) {
                    queue.retain(|queued| queued != sub);
                    queue.push(sub);
                }
            }
        }

        Ok(ordered
            .iter()
            .filter_map(|dotted| self.modules.get(*dotted))
            .collect())
    }

    pub fn to_code(&self, ctx: &GeneratorContext) -> Result<String, GeneratorError> {
        let mut fragments = Vec::new();
        for module in self.ordered()? {
            for operator in &module.pending_operators {
                warn!(
                    spelling = operator.spelling.as_deref().unwrap_or("<unknown>"),
                    module = %module.dotted,
                    "free operator never matched a registered type"
                );
            }
            fragments.push(self.module_code(module, ctx)?);
        }
        Ok(fragments.join("\n"))
    }

    fn module_code(
        &self,
        module: &ModuleBinding<'a>,
        ctx: &GeneratorContext,
    ) -> Result<String, GeneratorError> {
        if module.is_extern {
            return render(
                templates::MODULE_EXTERN,
                &[("module_name", &module.module_name)],
            );
        }

        let submodules = module
            .submodules
            .iter()
            .filter_map(|dotted| self.modules.get(dotted))
            .map(|sub| {
                render(
                    templates::MODULE_SUBMODULE_ENTRY,
                    &[("py_name", &sub.py_module_name), ("name", &sub.module_name)],
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let functions = module
            .functions
            .iter()
            .map(|function| function.to_code(ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let function_entries = module
            .functions
            .iter()
            .map(FunctionBinding::module_entry)
            .collect::<Result<Vec<_>, _>>()?;
        let types = module
            .types
            .iter()
            .map(|binding| binding.to_code(ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let type_entries = module
            .types
            .iter()
            .map(TypeBinding::module_entry)
            .collect::<Result<Vec<_>, _>>()?;

        render(
            templates::MODULE,
            &[
                ("module_name", &module.module_name),
                ("py_module_name", &module.py_module_name),
                ("module_submodules", &submodules.join("\n")),
                ("module_variable_getters", &module.getters.join("\n")),
                ("module_variable_setters", &module.setters.join("\n")),
                ("module_constants", &module.constants.join("\n")),
                ("module_functions", &function_entries.join("\n")),
                ("module_types", &type_entries.join("\n")),
                ("functions", &functions.join("\n")),
                ("types", &types.join("\n")),
            ],
        )
    }
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
    fn dotted_names_synthesize_ancestors() {
        let deps = DependencyMap::new();
        let mut set = ModuleSet::new(&deps);
        set.get_or_make_module("a.b", false);
        set.get_or_make_module("a.b.c", false);
        assert!(set.modules.contains_key("a"));
        assert!(set.modules["a"].is_extern, "ancestors default to extern");
        assert_eq!(set.modules["a"].submodules, vec!["a.b".to_string()]);
        assert_eq!(set.modules["a.b"].submodules, vec!["a.b.c".to_string()]);
        assert_eq!(set.modules["a.b.c"].module_name, "ABC");
        assert_eq!(set.modules["a.b.c"].py_module_name, "c");
    }

    #[test]
    fn local_use_clears_the_extern_default() {
        let deps = DependencyMap::new();
        let mut set = ModuleSet::new(&deps);
        set.get_or_make_module("a.b", false);
        assert!(set.modules["a"].is_extern);
        set.get_or_make_module("a", false);
        assert!(!set.modules["a"].is_extern);
    }

    #[test]
    fn dependency_defined_modules_stay_extern() {
        let mut deps = DependencyMap::new();
        deps.insert(
            "dep.json".into(),
            scan("MPyClass(Name=\"core\")\nclass Core {\n};\n"),
        );
        let mut set = ModuleSet::new(&deps);
        set.get_or_make_module("core", false);
        assert!(set.modules["core"].is_extern);
    }

    #[test]
    fn submodules_emit_before_their_parents() {
        let deps = DependencyMap::new();
        let mut set = ModuleSet::new(&deps);
        set.get_or_make_module("a", false);
        set.get_or_make_module("a.b.c", false);
        let ordered: Vec<&str> = set
            .ordered()
            .expect("ordering")
            .iter()
            .map(|module| module.dotted.as_str())
            .collect();
        let position = |name: &str| {
            ordered
                .iter()
                .position(|dotted| *dotted == name)
                .expect("module present")
        };
        assert!(position("a.b.c") < position("a.b"));
        assert!(position("a.b") < position("a"));
    }

    #[test]
    fn containment_cycle_names_the_modules() {
        let deps = DependencyMap::new();
        let mut set = ModuleSet::new(&deps);
        set.get_or_make_module("x", false);
        set.get_or_make_module("y", false);
        set.modules
            .get_mut("x")
            .expect("x")
            .submodules
            .push("y".to_string());
        set.modules
            .get_mut("y")
            .expect("y")
            .submodules
            .push("x".to_string());
        let err = set.ordered().expect_err("cycle must be fatal");
        match err {
            GeneratorError::ModuleCycle { modules, .. } => {
                assert!(modules.contains('x') || modules.contains('y'), "{modules}");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn free_operator_binds_once_its_type_registers() {
        let components = scan(
            "MPyModule(geo)\n\
             MPyOperator()\n\
             Vec2 operator+(const Vec2& lhs, const Vec2& rhs);\n\
             MPyClass(TypeNonTransient)\n\
             class Vec2 {\n\
             };\n",
        );
        let deps = DependencyMap::new();
        let ctx = GeneratorContext::new(&components, &deps);
        let mut set = ModuleSet::new(&deps);
        for component in &components {
            let module = component.module.as_deref().unwrap_or("geo");
            set.get_or_make_module(module, false);
            if component.name.is_some() {
                set.add_type(module, component, &ctx).expect("type added");
            }
        }
        for component in &components {
            if component.is_globals() {
                let module = component.module.as_deref().unwrap_or("geo");
                for operator in &component.operators {
                    set.add_operator(module, operator);
                }
            }
        }
        let code = set.to_code(&ctx).expect("module code");
        assert!(code.contains("MP_BINARY_OP_ADD"), "{code}");
        assert!(set.modules["geo"].pending_operators.is_empty());
    }

    #[test]
    fn module_emits_registration_and_accessors() {
        let components = scan(
            "MPyModule(game)\n\
             MPyProperty()\n\
             int score;\n\
             MPyFunction()\n\
             void Reset();\n",
        );
        let deps = DependencyMap::new();
        let ctx = GeneratorContext::new(&components, &deps);
        let mut set = ModuleSet::new(&deps);
        for component in &components {
            let module = component.module.as_deref().unwrap_or("game");
            set.get_or_make_module(module, false);
            if component.is_globals() {
                for property in &component.properties {
                    set.add_property(module, property).expect("property");
                }
                for function in &component.functions {
                    set.add_function(module, function);
                }
            }
        }
        let code = set.to_code(&ctx).expect("module code");
        assert!(code.contains("MP_REGISTER_MODULE(MP_QSTR_game, PyGameUserModule)"), "{code}");
        assert!(code.contains("MP_QSTR_score"), "{code}");
        assert!(code.contains("PyResetObj"), "{code}");
    }
}

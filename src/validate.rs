//! Post-resolution validation. Walks every reference in the model and
//! accumulates diagnostics instead of failing fast, so one run reports
//! every duplicate definition, unknown type, and structurally unsupported
//! spelling in the unit.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;

use crate::model::{non_template_name, unsupported_spelling, Component};
use crate::resolve::DependencyMap;
use crate::utils::errors::Diagnostic;

/// Types bindable without a component declaration. A span of pairs is
/// treated as an immutable dict, any other span as a tuple; lists are
/// explicitly unsupported since they would require write-back.
static BUILTIN_TYPES: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    BTreeSet::from([
        "void",
        "int",
        "float",
        "double",
        "bool",
        "char",
        "unsigned char",
        "short",
        "unsigned short",
        "long",
        "unsigned long",
        "long long",
        "unsigned long long",
        "int8_t",
        "uint8_t",
        "int16_t",
        "uint16_t",
        "int32_t",
        "uint32_t",
        "int64_t",
        "uint64_t",
        "size_t",
        "ssize_t",
        "std::size_t",
        "std::ssize_t",
        "std::string",
        "std::string_view",
        "std::vector",
        "std::span",
        "span",
    ])
});

struct Validator<'a> {
    known: BTreeMap<String, String>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl Validator<'_> {
    /// Returns false when the bare type is unknown; a known type still gets
    /// its spelling checked.
    fn check(
        &mut self,
        ty: &str,
        reference: &str,
        loc: Option<&crate::model::SourceLoc>,
    ) -> bool {
        let main = non_template_name(ty);
        if !self.known.contains_key(main) && !BUILTIN_TYPES.contains(main) {
            return false;
        }
        if let Some(reason) = unsupported_spelling(ty) {
            self.push(loc, format!("{reason} for {reference} of type {ty}"));
        }
        true
    }

    fn push(&mut self, loc: Option<&crate::model::SourceLoc>, message: String) {
        let (path, line) = match loc {
            Some(loc) => (loc.path.as_path(), Some(loc.line)),
            None => (std::path::Path::new("<unknown>"), None),
        };
        self.diagnostics.push(Diagnostic::error(path, line, message));
    }
}

/// Validates the resolved model against the known-type catalog. Duplicate
/// definitions are checked across the unit and all dependencies first, so
/// every later lookup has an unambiguous answer.
pub fn validate_components(
    components: &[Component],
    dependencies: &DependencyMap,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    // Bare name -> location of the first definition, so a duplicate can
    // point at both declarations.
    let mut known: BTreeMap<String, String> = BTreeMap::new();

    let all = components.iter().chain(dependencies.values().flatten());
    for component in all {
        let Some(name) = &component.name else {
            continue;
        };
        let bare = non_template_name(name).to_string();
        let first_loc = match &component.loc {
            Some(loc) => format!("{}:{}", loc.path.display(), loc.line),
            None => "<unknown>".to_string(),
        };
        if let Some(first) = known.get(&bare) {
            let (path, line) = match &component.loc {
                Some(loc) => (loc.path.as_path(), Some(loc.line)),
                None => (std::path::Path::new("<unknown>"), None),
            };
            diagnostics.push(Diagnostic::error(
                path,
                line,
                format!("Value {name} already defined at {first}."),
            ));
        } else {
            known.insert(bare, first_loc);
        }
    }

    let mut validator = Validator {
        known,
        diagnostics: &mut diagnostics,
    };

    for component in components {
        let owner = component.name.as_deref().unwrap_or("file scope");
        for constructor in &component.constructors {
            for param in &constructor.parameters {
                if !validator.check(&param.ty, &param.name, constructor.loc.as_ref()) {
                    validator.push(
                        constructor.loc.as_ref(),
                        format!(
                            "Parameter type {} not found for constructor of {owner}",
                            param.ty
                        ),
                    );
                }
            }
        }
        for function in &component.functions {
            let fname = function.name.as_deref().unwrap_or("<anonymous>");
            for param in &function.parameters {
                if !validator.check(&param.ty, fname, function.loc.as_ref()) {
                    validator.push(
                        function.loc.as_ref(),
                        format!(
                            "Parameter type {} not found for function {fname} of {owner}",
                            param.ty
                        ),
                    );
                }
            }
            if let Some(ret) = &function.return_type {
                let bare = ret.strip_prefix("const ").unwrap_or(ret);
                if !validator.check(bare, fname, function.loc.as_ref()) {
                    validator.push(
                        function.loc.as_ref(),
                        format!("Return type {ret} not found for function {fname} of {owner}"),
                    );
                }
            }
        }
        for operator in &component.operators {
            let spelling = operator.spelling.as_deref().unwrap_or("<anonymous>");
            for param in &operator.parameters {
                if !validator.check(&param.ty, spelling, operator.loc.as_ref()) {
                    validator.push(
                        operator.loc.as_ref(),
                        format!(
                            "Parameter type {} not found for operator {spelling} of {owner}",
                            param.ty
                        ),
                    );
                }
            }
            if let Some(ret) = &operator.return_type {
                let bare = ret.strip_prefix("const ").unwrap_or(ret);
                if !validator.check(bare, spelling, operator.loc.as_ref()) {
                    validator.push(
                        operator.loc.as_ref(),
                        format!("Return type {ret} not found for operator {spelling} of {owner}"),
                    );
                }
            }
        }
        for property in &component.properties {
            let pname = property.name.as_deref().unwrap_or("<anonymous>");
            if let Some(ty) = &property.ty {
                if !validator.check(ty, pname, property.loc.as_ref()) {
                    validator.push(
                        property.loc.as_ref(),
                        format!("Property type {ty} not found for {owner}"),
                    );
                }
            }
        }
    }

    diagnostics
}

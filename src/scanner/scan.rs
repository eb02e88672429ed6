//! Line-oriented declaration scanner. Walks a filtered source unit once,
//! recognizing tag lines and the declarations they annotate, and yields one
//! [`Component`] per tagged type plus a synthetic per-file globals
//! component for file-scope declarations.
//!
//! A tag and its declaration may share a physical line: every tag matcher
//! hands back the unconsumed suffix, which continues through the remaining
//! matchers of the same pass.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::TagConfig;
use crate::model::{
    unsupported_spelling, Component, Function, Operator, Property, SourceLoc,
};
use crate::scanner::attributes::parse_attributes;
use crate::scanner::filter::filter_source;
use crate::scanner::lines;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{path}:{line}: modules cannot be declared inside a type")]
    ModuleInsideType { path: PathBuf, line: usize },
    #[error("{path}:{line}: modules cannot be declared inside a pending {pending} tag")]
    ModuleInsidePending {
        path: PathBuf,
        line: usize,
        pending: &'static str,
    },
    #[error("{path}:{line}: constructor found outside of a type body")]
    ConstructorOutsideType { path: PathBuf, line: usize },
    #[error("{path}:{line}: destructor found outside of a type body")]
    DestructorOutsideType { path: PathBuf, line: usize },
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad source glob pattern {pattern}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Source extensions considered when scanning a directory tree.
pub const SOURCE_EXTENSIONS: &[&str] = &["h", "hpp", "hh", "hxx", "c", "cc", "cpp", "cxx"];

struct Scan<'a> {
    tags: &'a TagConfig,
    path: &'a Path,
    components: Vec<Component>,
    globals: Option<Component>,
    current: Option<Component>,
    /// Unqualified name of the open type, used to scope ctor/dtor matching.
    /// Outlives the component so misplaced members can be reported.
    ctor_scope: Option<String>,
    brace_depth: i64,
    namespace: Option<String>,
    module: Option<String>,
    pending_property: Option<Property>,
    pending_function: Option<Function>,
    pending_operator: Option<Operator>,
    headers: Vec<String>,
}

impl<'a> Scan<'a> {
    fn new(path: &'a Path, tags: &'a TagConfig) -> Self {
        Self {
            tags,
            path,
            components: Vec::new(),
            globals: None,
            current: None,
            ctor_scope: None,
            brace_depth: 0,
            namespace: None,
            module: None,
            pending_property: None,
            pending_function: None,
            pending_operator: None,
            headers: Vec::new(),
        }
    }

    fn globals_mut(&mut self) -> &mut Component {
        if self.globals.is_none() {
            self.globals = Some(Component::globals(self.path));
        }
        self.globals.as_mut().unwrap_or_else(|| unreachable!())
    }

    fn qualify(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}::{name}"),
            None => name.to_string(),
        }
    }

    fn loc(&self, line: usize) -> Option<SourceLoc> {
        Some(SourceLoc::new(self.path, line))
    }

    fn finish_component(&mut self) {
        if let Some(component) = self.current.take() {
            self.components.push(component);
        }
    }

    fn line(&mut self, number: usize, raw: &str) -> Result<(), ScanError> {
        if let Some(include) = lines::match_header(raw) {
            self.headers.push(include);
            return Ok(());
        }

        if let Some((payload, _)) = lines::match_tag_line(raw, &self.tags.module) {
            if self.current.is_some() {
                return Err(ScanError::ModuleInsideType {
                    path: self.path.to_path_buf(),
                    line: number,
                });
            }
            let pending = if self.pending_property.is_some() {
                Some("property")
            } else if self.pending_function.is_some() {
                Some("function")
            } else {
                None
            };
            if let Some(pending) = pending {
                return Err(ScanError::ModuleInsidePending {
                    path: self.path.to_path_buf(),
                    line: number,
                    pending,
                });
            }
            // File-scope declarations seen so far belong to the previous
            // module; flush them before the module name changes.
            if let Some(mut globals) = self.globals.take() {
                globals.module = self.module.clone();
                self.components.push(globals);
            }
            let name = payload.trim().trim_matches(['"', '\'']);
            self.module = Some(name.to_string());
            return Ok(());
        }

        if let Some(name) = lines::match_namespace(raw) {
            self.namespace = Some(name);
            return Ok(());
        }

        if self.current.is_some() {
            self.brace_depth += lines::brace_delta(raw);
            if self.brace_depth < 1 {
                self.finish_component();
            }
        }

        let mut line = raw;

        for tag in &self.tags.types {
            if let Some((payload, rest)) = lines::match_tag_line(line, &tag.name) {
                self.finish_component();
                let mut component = Component {
                    attrs: parse_attributes(payload),
                    tag: Some(tag.label.clone()),
                    module: self.module.clone(),
                    ..Component::default()
                };
                component.python_name = crate::model::attr_value(&component.attrs, "Name")
                    .map(str::to_string);
                self.current = Some(component);
                self.brace_depth = lines::brace_delta(rest) + 1;
                line = rest;
                break;
            }
        }

        if let Some(decl) = lines::match_type_decl(line) {
            // Only the declaration announced by the tag binds; type bodies
            // nested inside it belong to the enclosing declaration.
            if let Some(component) = self.current.as_mut().filter(|c| c.name.is_none()) {
                component.kind = Some(decl.kind);
                self.ctor_scope = Some(decl.name.clone());
                component.name = Some(match &self.namespace {
                    Some(ns) => format!("{ns}::{}", decl.name),
                    None => decl.name,
                });
                component.base_types = decl.base_types;
                component.loc = Some(SourceLoc::new(self.path, number));
                self.brace_depth -= 1;
                return Ok(());
            }
        }

        if let Some(scope) = self.ctor_scope.clone() {
            if let Some(ctor) = lines::match_constructor(line, &scope) {
                let Some(component) = self.current.as_mut() else {
                    return Err(ScanError::ConstructorOutsideType {
                        path: self.path.to_path_buf(),
                        line: number,
                    });
                };
                let parameters = lines::parse_parameters(&ctor.params_raw, &self.tags.parameter);
                match parameters
                    .iter()
                    .find_map(|p| unsupported_spelling(&p.ty))
                {
                    Some(reason) => {
                        warn!("{}:{number}: constructor skipped: {reason}", self.path.display());
                    }
                    None => {
                        component.constructors.push(Function {
                            parameters,
                            modifiers: ctor.modifiers,
                            loc: Some(SourceLoc::new(self.path, number)),
                            ..Function::default()
                        });
                        line = ctor.rest;
                    }
                }
            }

            if let Some(dtor) = lines::match_destructor(line, &scope) {
                let Some(component) = self.current.as_mut() else {
                    return Err(ScanError::DestructorOutsideType {
                        path: self.path.to_path_buf(),
                        line: number,
                    });
                };
                component.destructors.push(Function {
                    modifiers: dtor.modifiers,
                    loc: Some(SourceLoc::new(self.path, number)),
                    ..Function::default()
                });
                line = dtor.rest;
            }
        }

        if let Some((payload, rest)) = lines::match_tag_line(line, &self.tags.property) {
            let mut property = Property {
                attrs: parse_attributes(payload),
                module: self.module.clone(),
                ..Property::default()
            };
            property.python_name =
                crate::model::attr_value(&property.attrs, "Name").map(str::to_string);
            self.pending_property = Some(property);
            line = rest;
        }

        if let Some(decl) = lines::match_property_decl(line) {
            if let Some(mut property) = self.pending_property.take() {
                property.ty = Some(decl.ty);
                property.modifiers = decl.modifiers;
                property.value = decl.value;
                property.loc = self.loc(number);
                match self.current.as_mut() {
                    Some(component) => {
                        property.name = Some(decl.name);
                        component.properties.push(property);
                    }
                    None => {
                        property.name = Some(self.qualify(&decl.name));
                        self.globals_mut().properties.push(property);
                    }
                }
                return Ok(());
            }
        }

        if let Some((payload, rest)) = lines::match_tag_line(line, &self.tags.function) {
            let mut function = Function {
                attrs: parse_attributes(payload),
                module: self.module.clone(),
                ..Function::default()
            };
            function.python_name =
                crate::model::attr_value(&function.attrs, "Name").map(str::to_string);
            self.pending_function = Some(function);
            line = rest;
        }

        if let Some(decl) = lines::match_function_decl(line) {
            if let Some(mut function) = self.pending_function.take() {
                function.return_type = Some(if decl.modifiers.is_const {
                    format!("const {}", decl.return_type)
                } else {
                    decl.return_type
                });
                function.parameters =
                    lines::parse_parameters(&decl.params_raw, &self.tags.parameter);
                function.modifiers = decl.modifiers;
                // A trailing qualifier marks a const member function; the
                // leading keyword already moved onto the return type.
                function.modifiers.is_const = decl.is_const_qualified;
                function.loc = self.loc(number);
                match self.current.as_mut() {
                    Some(component) => {
                        function.name = Some(decl.name);
                        component.functions.push(function);
                    }
                    None => {
                        function.name = Some(self.qualify(&decl.name));
                        self.globals_mut().functions.push(function);
                    }
                }
                return Ok(());
            }
        }

        if let Some((payload, rest)) = lines::match_tag_line(line, &self.tags.operator) {
            self.pending_operator = Some(Operator {
                attrs: parse_attributes(payload),
                module: self.module.clone(),
                ..Operator::default()
            });
            line = rest;
        }

        if let Some(decl) = lines::match_operator_decl(line) {
            if let Some(mut operator) = self.pending_operator.take() {
                operator.return_type = Some(if decl.modifiers.is_const {
                    format!("const {}", decl.return_type)
                } else {
                    decl.return_type
                });
                operator.spelling = Some(decl.spelling);
                operator.parameters =
                    lines::parse_parameters(&decl.params_raw, &self.tags.parameter);
                operator.modifiers = decl.modifiers;
                operator.modifiers.is_const = decl.is_const_qualified;
                operator.loc = self.loc(number);
                match self.current.as_mut() {
                    Some(component) => component.operators.push(operator),
                    None => self.globals_mut().operators.push(operator),
                }
                return Ok(());
            }
        }

        Ok(())
    }

    fn finish(mut self) -> Vec<Component> {
        self.finish_component();
        if let Some(mut globals) = self.globals.take() {
            globals.module = self.module.clone();
            self.components.push(globals);
        }
        // Headers accumulate over the whole file and every component of the
        // unit shares the final list.
        for component in &mut self.components {
            component.requires = self.headers.clone();
        }
        self.components
    }
}

/// Scans one source unit already held in memory.
pub fn analyze_source(
    path: &Path,
    source: &str,
    tags: &TagConfig,
) -> Result<Vec<Component>, ScanError> {
    let filtered = filter_source(source);
    let mut scan = Scan::new(path, tags);
    for (idx, line) in filtered.split('\n').enumerate() {
        scan.line(idx + 1, line)?;
    }
    Ok(scan.finish())
}

/// Reads and scans one source file.
pub fn analyze_file(path: &Path, tags: &TagConfig) -> Result<Vec<Component>, ScanError> {
    debug!("analyzing {}", path.display());
    let source = fs::read_to_string(path).map_err(|source| ScanError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    analyze_source(path, &source, tags)
}

/// Scans every source file under `base`, in sorted path order. A plain file
/// is scanned directly.
pub fn analyze_directory(base: &Path, tags: &TagConfig) -> Result<Vec<Component>, ScanError> {
    if !base.is_dir() {
        return analyze_file(base, tags);
    }
    let mut paths: Vec<PathBuf> = Vec::new();
    for ext in SOURCE_EXTENSIONS {
        let pattern = format!("{}/**/*.{ext}", base.display());
        let entries = glob::glob(&pattern).map_err(|source| ScanError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        paths.extend(entries.flatten());
    }
    paths.sort();
    let mut components = Vec::new();
    for path in paths {
        components.extend(analyze_file(&path, tags)?);
    }
    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{attr_value, Attribute, ComponentKind};

    fn scan(source: &str) -> Vec<Component> {
        analyze_source(Path::new("test.h"), source, &TagConfig::default())
            .expect("scan should succeed")
    }

    #[test]
    fn tagged_class_with_members() {
        let components = scan(
            "#include \"Base.h\"\n\
             MPyModule(demo.math)\n\
             namespace demo {\n\
             MPyClass(TypeOwned)\n\
             class Vec2 {\n\
             public:\n\
                 Vec2(float x, float y) : x(x), y(y) {}\n\
                 MPyProperty()\n\
                 float x;\n\
                 MPyProperty()\n\
                 float y;\n\
                 MPyFunction()\n\
                 float Length() const;\n\
                 MPyOperator()\n\
                 Vec2 operator+(const Vec2& rhs) const;\n\
             };\n\
             }\n",
        );
        assert_eq!(components.len(), 1);
        let vec2 = &components[0];
        assert_eq!(vec2.name.as_deref(), Some("demo::Vec2"));
        assert_eq!(vec2.kind, Some(ComponentKind::Class));
        assert_eq!(vec2.module.as_deref(), Some("demo.math"));
        assert_eq!(vec2.requires, vec!["\"Base.h\"".to_string()]);
        assert!(vec2.attrs.contains_key("TypeOwned"));
        assert_eq!(vec2.constructors.len(), 1);
        assert_eq!(vec2.properties.len(), 2);
        assert_eq!(vec2.functions.len(), 1);
        assert!(vec2.functions[0].modifiers.is_const);
        assert_eq!(vec2.operators.len(), 1);
        assert_eq!(vec2.operators[0].spelling.as_deref(), Some("+"));
    }

    #[test]
    fn tag_and_declaration_share_a_line() {
        let components = scan(
            "MPyClass() class Point {\n\
             MPyProperty() int x;\n\
             MPyFunction() int Get() const;\n\
             };\n",
        );
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].name.as_deref(), Some("Point"));
        assert_eq!(components[0].properties.len(), 1);
        assert_eq!(components[0].functions.len(), 1);
    }

    #[test]
    fn brace_depth_tracks_nested_blocks() {
        let components = scan(
            "MPyClass()\n\
             class Outer {\n\
                 void helper() { if (true) { nested(); } }\n\
                 struct Inner { int x; };\n\
                 MPyFunction()\n\
                 int Tail() const;\n\
             };\n\
             MPyFunction()\n\
             int AfterClose();\n",
        );
        assert_eq!(components.len(), 2);
        let outer = &components[0];
        assert_eq!(outer.name.as_deref(), Some("Outer"));
        assert_eq!(outer.functions.len(), 1, "Tail binds inside Outer");
        let globals = &components[1];
        assert!(globals.is_globals());
        assert_eq!(globals.functions[0].name.as_deref(), Some("AfterClose"));
    }

    #[test]
    fn quoted_attribute_payloads_survive_filtering() {
        let components = scan(
            "MPyClass(TypeFactory=\", use vec2()\")\n\
             class Vec2 {\n\
             };\n",
        );
        assert_eq!(components.len(), 1);
        assert_eq!(
            attr_value(&components[0].attrs, "TypeFactory"),
            Some(", use vec2()")
        );
    }

    #[test]
    fn literal_braces_do_not_disturb_depth() {
        let components = scan(
            "MPyClass()\n\
             class Text {\n\
                 const char* open = \"{\";\n\
                 char close = '}';\n\
                 MPyFunction()\n\
                 int Size() const;\n\
             };\n",
        );
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].name.as_deref(), Some("Text"));
        assert_eq!(components[0].functions.len(), 1);
    }

    #[test]
    fn module_boundary_splits_globals() {
        let components = scan(
            "MPyModule(a)\n\
             MPyFunction()\n\
             int First();\n\
             MPyModule(b)\n\
             MPyFunction()\n\
             int Second();\n",
        );
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].module.as_deref(), Some("a"));
        assert_eq!(components[0].functions[0].name.as_deref(), Some("First"));
        assert_eq!(components[1].module.as_deref(), Some("b"));
    }

    #[test]
    fn module_inside_type_is_an_error() {
        let result = analyze_source(
            Path::new("test.h"),
            "MPyClass()\nclass Foo {\nMPyModule(bad)\n};\n",
            &TagConfig::default(),
        );
        assert!(matches!(result, Err(ScanError::ModuleInsideType { line: 3, .. })));
    }

    #[test]
    fn constructor_with_unsupported_parameter_is_dropped() {
        let components = scan(
            "MPyClass()\n\
             class Movable {\n\
                 Movable(Movable&& other);\n\
                 Movable(int x);\n\
             };\n",
        );
        assert_eq!(components[0].constructors.len(), 1);
        assert_eq!(components[0].constructors[0].parameters[0].name, "x");
    }

    #[test]
    fn globals_are_namespace_qualified() {
        let components = scan(
            "namespace util {\n\
             MPyFunction()\n\
             float Clamp(float v, float lo, float hi);\n\
             }\n",
        );
        assert_eq!(components.len(), 1);
        assert_eq!(
            components[0].functions[0].name.as_deref(),
            Some("util::Clamp")
        );
    }

    #[test]
    fn untagged_declarations_are_ignored() {
        let components = scan("class Plain {\n int x;\n void f();\n};\n");
        assert!(components.is_empty());
    }

    #[test]
    fn explicit_python_name_attribute_wins() {
        let components = scan(
            "MPyClass(Name=\"vec\")\n\
             class Vector2D {\n\
             };\n",
        );
        assert_eq!(components[0].python_name.as_deref(), Some("vec"));
        match components[0].attrs.get("Name") {
            Some(Attribute::KeyValue(v)) => assert_eq!(v, "vec"),
            other => panic!("expected key-value, got {other:?}"),
        }
        assert_eq!(attr_value(&components[0].attrs, "Name"), Some("vec"));
    }
}

//! Per-type binding assembly: ownership classification, constructor and
//! destructor glue, property accessors, operator buckets and the final
//! slot-table source fragment.

use crate::codegen::dispatch::{FunctionBinding, Overload};
use crate::codegen::templates;
use crate::codegen::{render, GeneratorContext, GeneratorError};
use crate::model::{
    self, attr_value, Access, AttributeMap, Component, Function, Operator, Property,
};

/// How the generated glue relates to the native value's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Constructed and destroyed by the glue, stored by value.
    Owned,
    /// Lifetime managed elsewhere, exposed by reference.
    Reference,
    /// Exposed by address, dereferenced through a weak relation.
    Transient,
}

impl Ownership {
    pub fn classify(attrs: &AttributeMap) -> Self {
        if attrs.contains_key("TypeOwned") {
            Ownership::Owned
        } else if attrs.contains_key("TypeNonTransient") {
            Ownership::Reference
        } else {
            Ownership::Transient
        }
    }
}

/// The value type the converter traits map to: pointer for transient
/// types, reference for unowned stable types, plain value when owned.
pub fn custom_type_value_type(qualified_name: &str, attrs: &AttributeMap) -> String {
    match Ownership::classify(attrs) {
        Ownership::Transient => format!("{qualified_name}*"),
        Ownership::Reference => format!("{qualified_name}&"),
        Ownership::Owned => qualified_name.to_string(),
    }
}

fn rom_entry_type(ty: Option<&str>) -> &'static str {
    let py_type = ty
        .and_then(|ty| templates::TYPE_TO_PYTYPE_MAP.get(ty))
        .copied()
        .unwrap_or("object");
    templates::PYTYPE_TO_ROM_PTR_MAP
        .get(py_type)
        .copied()
        .unwrap_or("PTR")
}

pub(crate) fn constant_entry(
    property: &Property,
    fallback_value: String,
) -> Result<String, GeneratorError> {
    let py_name = model::python_name(
        property.python_name.as_deref(),
        property.name.as_deref().unwrap_or_default(),
    );
    let rom_type = rom_entry_type(property.ty.as_deref());
    let value = property.value.clone().unwrap_or(fallback_value);
    render(
        templates::MODULE_CONSTANT_ENTRY,
        &[("py_name", &py_name), ("type", rom_type), ("value", &value)],
    )
}

/// All overloads of one operator spelling on a type.
#[derive(Debug, Clone)]
pub struct OperatorBinding {
    pub spelling: String,
    pub self_type: String,
    pub overloads: Vec<Overload>,
}

impl OperatorBinding {
    pub fn new(operator: &Operator, self_type: &str) -> Self {
        let mut binding = Self {
            spelling: operator.spelling.clone().unwrap_or_default(),
            self_type: self_type.to_string(),
            overloads: Vec::new(),
        };
        binding.add_overload(operator);
        binding
    }

    pub fn add_overload(&mut self, operator: &Operator) {
        self.overloads.push(Overload::from_function(&Function {
            parameters: operator.parameters.clone(),
            return_type: operator.return_type.clone(),
            ..Function::default()
        }));
    }

    pub fn is_subscript(&self) -> bool {
        self.spelling == "[]"
    }

    pub fn is_unary(&self) -> bool {
        self.overloads
            .first()
            .is_some_and(|overload| overload.params.is_empty())
    }

    /// One dispatch fragment for the bucket this spelling belongs to; a
    /// spelling with no translation entry is fatal.
    pub fn to_code(&self) -> Result<String, GeneratorError> {
        if self.is_subscript() {
            let calls = self
                .overloads
                .iter()
                .filter(|overload| !overload.params.is_empty())
                .map(|overload| {
                    render(
                        templates::CUSTOM_TYPE_SUBSCRIPT,
                        &[
                            ("self_type", &self.self_type),
                            ("index_type", &overload.params[0].ty),
                            ("return_type", overload.return_type.as_deref().unwrap_or_default()),
                        ],
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(calls.join("\n"));
        }

        if self.is_unary() {
            if let Some(case) = templates::UNARY_OP_MAP.get(self.spelling.as_str()) {
                let return_type = self
                    .overloads
                    .first()
                    .and_then(|overload| overload.return_type.as_deref())
                    .unwrap_or_default();
                return render(case, &[("return_type", return_type)]);
            }
        } else if let (Some(op_name), Some(op_template)) = (
            templates::BINARY_OP_NAME_MAP.get(self.spelling.as_str()),
            templates::BINARY_OP_TEMPLATE_MAP.get(self.spelling.as_str()),
        ) {
            let clauses = self
                .overloads
                .iter()
                .map(|overload| {
                    let call = render(
                        op_template,
                        &[("return_type", overload.return_type.as_deref().unwrap_or_default())],
                    )?;
                    render(
                        templates::BINARY_OP_OVERLOAD,
                        &[("type", &overload.params[0].ty), ("binary_op", &call)],
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            return render(
                templates::BINARY_OP_CASE,
                &[("name", op_name), ("overloads", &clauses.join("\n"))],
            );
        }

        Err(GeneratorError::UnsupportedOperator {
            spelling: self.spelling.clone(),
        })
    }
}

/// The complete binding for one exposed type.
#[derive(Debug)]
pub struct TypeBinding<'a> {
    pub namespace: String,
    pub name: String,
    pub python_name: String,
    pub type_name: String,
    pub ownership: Ownership,
    pub self_is_ptr: bool,
    attrs: &'a AttributeMap,
    base_types: Vec<&'a Component>,
    constructors: Vec<Overload>,
    has_destructor: bool,
    functions: Vec<FunctionBinding>,
    operators: Vec<OperatorBinding>,
    getters: Vec<String>,
    setters: Vec<String>,
    constants: Vec<String>,
}

impl<'a> TypeBinding<'a> {
    pub fn new(
        component: &'a Component,
        ctx: &GeneratorContext<'a>,
    ) -> Result<Self, GeneratorError> {
        let full_name = component.name.as_deref().unwrap_or_default();
        let (namespace, name, python_name) =
            model::qualified_parts(full_name, component.python_name.as_deref());
        let ownership = Ownership::classify(&component.attrs);
        let type_name = custom_type_value_type(&format!("{namespace}{name}"), &component.attrs);

        let base_types: Vec<&Component> = component
            .base_types
            .iter()
            .filter(|base| base.access == Access::Public)
            .filter_map(|base| ctx.lookup(&base.name))
            .collect();

        let mut binding = Self {
            namespace,
            name,
            python_name,
            type_name,
            ownership,
            self_is_ptr: ownership == Ownership::Transient,
            attrs: &component.attrs,
            base_types,
            constructors: component
                .constructors
                .iter()
                .map(Overload::from_function)
                .collect(),
            has_destructor: !component.destructors.is_empty(),
            functions: Vec::new(),
            operators: Vec::new(),
            getters: Vec::new(),
            setters: Vec::new(),
            constants: Vec::new(),
        };

        for function in &component.functions {
            binding.add_function(function);
        }
        for operator in &component.operators {
            binding.add_operator(operator);
        }
        for property in &component.properties {
            binding.add_property(property)?;
        }
        Ok(binding)
    }

    pub fn add_function(&mut self, function: &Function) {
        let py_name = model::python_name(
            function.python_name.as_deref(),
            function.name.as_deref().unwrap_or_default(),
        );
        if let Some(existing) = self
            .functions
            .iter_mut()
            .find(|binding| binding.python_name == py_name)
        {
            existing.add_overload(function);
            return;
        }
        let mut binding = FunctionBinding::new(function);
        binding.bind_self(&self.name, self.self_is_ptr);
        for base in &self.base_types {
            binding.add_base(base);
        }
        self.functions.push(binding);
    }

    pub fn add_operator(&mut self, operator: &Operator) {
        let spelling = operator.spelling.clone().unwrap_or_default();
        if let Some(existing) = self
            .operators
            .iter_mut()
            .find(|binding| binding.spelling == spelling)
        {
            existing.add_overload(operator);
            return;
        }
        self.operators.push(OperatorBinding::new(operator, &self.name));
    }

    pub fn add_property(&mut self, property: &Property) -> Result<(), GeneratorError> {
        let is_constant = (property.modifiers.is_constexpr && property.modifiers.is_static)
            || property.attrs.contains_key("PropConstant");
        if is_constant {
            let fallback = format!(
                "{}{}::{}",
                self.namespace,
                self.name,
                property.name.as_deref().unwrap_or_default()
            );
            self.constants.push(constant_entry(property, fallback)?);
            return Ok(());
        }
        let py_name = model::python_name(
            property.python_name.as_deref(),
            property.name.as_deref().unwrap_or_default(),
        );
        let ref_or_ptr = if self.self_is_ptr { "->" } else { "." };
        let ty = property.ty.as_deref().unwrap_or_default();
        let value = property.name.as_deref().unwrap_or_default();
        if !property.attrs.contains_key("PropWriteOnly") {
            self.getters.push(render(
                templates::CUSTOM_TYPE_GETTER,
                &[("py_name", &py_name), ("type", ty), ("value", value), ("ref_or_ptr", ref_or_ptr)],
            )?);
        }
        if !property.attrs.contains_key("PropReadOnly") && !property.modifiers.is_const {
            self.setters.push(render(
                templates::CUSTOM_TYPE_SETTER,
                &[("py_name", &py_name), ("type", ty), ("value", value), ("ref_or_ptr", ref_or_ptr)],
            )?);
        }
        Ok(())
    }

    pub fn module_entry(&self) -> Result<String, GeneratorError> {
        render(
            templates::MODULE_TYPE_ENTRY,
            &[("name", &self.name), ("py_name", &self.python_name)],
        )
    }

    /// The constructor entry: owned types run their constructor overloads
    /// in the variable-arity convention, unowned types raise.
    fn make_new(&self) -> Result<String, GeneratorError> {
        if self.ownership != Ownership::Owned {
            let factory = attr_value(self.attrs, "TypeFactory").unwrap_or_default();
            return render(
                templates::CUSTOM_TYPE_UNOWNED_INIT,
                &[("type_name", &self.name), ("factory", factory)],
            );
        }
        let mut clauses = Vec::with_capacity(self.constructors.len());
        for constructor in &self.constructors {
            let required = constructor.make_required_check(false, false, None)?;
            let init = constructor.make_vararg_init(false)?;
            let arg_names: Vec<&str> = constructor
                .params
                .iter()
                .map(|param| param.name.as_str())
                .collect();
            let call = render(
                templates::CUSTOM_TYPE_OWNED_CONSTRUCTOR,
                &[
                    ("namespace", &self.namespace),
                    ("type_name", &self.name),
                    ("args", &arg_names.join(", ")),
                ],
            )?;
            clauses.push(render(
                templates::VARARGS_OVERLOAD,
                &[("overload_check", &required), ("arg_init", &init), ("call_function", &call)],
            )?);
        }
        let init_code = attr_value(self.attrs, "TypeInitCode").unwrap_or_default();
        render(
            templates::CUSTOM_TYPE_OWNED_INIT,
            &[
                ("type_name", &self.name),
                ("init_code", init_code),
                ("constructors", &clauses.join("\nelse ")),
            ],
        )
    }

    /// The full slot-table source fragment for this type.
    pub fn to_code(&self, ctx: &GeneratorContext) -> Result<String, GeneratorError> {
        let mut subscripts = Vec::new();
        let mut unary_ops = Vec::new();
        let mut binary_ops = Vec::new();
        if self.attrs.contains_key("TypeIsHashable") {
            if let Some(hash) = templates::UNARY_OP_MAP.get("hash") {
                unary_ops.push(render(hash, &[])?);
            }
        }
        for operator in &self.operators {
            let code = operator.to_code()?;
            if operator.is_subscript() {
                subscripts.push(code);
            } else if operator.is_unary() {
                unary_ops.push(code);
            } else {
                binary_ops.push(code);
            }
        }

        let make_new = self.make_new()?;
        let (destroy, destroy_entry) =
            if self.ownership == Ownership::Owned && self.has_destructor {
                (
                    render(
                        templates::CUSTOM_TYPE_OWNED_DESTROY,
                        &[("type_name", &self.name)],
                    )?,
                    render(
                        templates::CUSTOM_TYPE_OWNED_DESTROY_ENTRY,
                        &[("type_name", &self.name)],
                    )?,
                )
            } else {
                (String::new(), String::new())
            };

        let base_names: Vec<&str> = self
            .base_types
            .iter()
            .filter_map(|base| base.name.as_deref())
            .map(model::type_name_without_namespace)
            .collect();
        let forward = |template: &str| -> Result<String, GeneratorError> {
            let fragments = base_names
                .iter()
                .map(|base| render(template, &[("parent_type", base)]))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(fragments.join("\n"))
        };
        let base_attrs = forward(templates::CUSTOM_TYPE_BASE_ATTR)?;
        let base_unary_ops = forward(templates::CUSTOM_TYPE_BASE_UNARY_OP)?;
        let base_binary_ops = forward(templates::CUSTOM_TYPE_BASE_BINARY_OP)?;
        let base_subscripts = forward(templates::CUSTOM_TYPE_BASE_SUBSCRIPT)?;

        let bases_list = base_names
            .iter()
            .map(|base| render(templates::CUSTOM_TYPE_BASE, &[("parent_type", base)]))
            .collect::<Result<Vec<_>, _>>()?;
        let (bases_tuple_def, bases_tuple_entry, bases_slot_index) = match bases_list.len() {
            0 => (String::new(), String::new(), String::new()),
            1 => (
                String::new(),
                render(
                    templates::CUSTOM_TYPE_BASES_SINGLE,
                    &[("type_name", &bases_list[0])],
                )?,
                templates::CUSTOM_TYPE_BASES_SLOT_INDEX.to_string(),
            ),
            count => {
                let count_str = count.to_string();
                (
                    render(
                        templates::CUSTOM_TYPE_BASES,
                        &[
                            ("type_name", &self.name),
                            ("base_list", &bases_list.join(", ")),
                            ("base_count", &count_str),
                        ],
                    )?,
                    render(
                        templates::CUSTOM_TYPE_BASES_ENTRY,
                        &[("type_name", &self.name)],
                    )?,
                    templates::CUSTOM_TYPE_BASES_SLOT_INDEX.to_string(),
                )
            }
        };

        let functions = self
            .functions
            .iter()
            .map(|function| function.to_code(ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let type_functions = self
            .functions
            .iter()
            .map(FunctionBinding::type_entry)
            .collect::<Result<Vec<_>, _>>()?;

        render(
            templates::CUSTOM_TYPE_SOURCE,
            &[
                ("name", &self.name),
                ("type_name", &self.type_name),
                ("py_type_name", &self.python_name),
                ("make_new", &make_new),
                ("destroy", &destroy),
                ("destroy_entry", &destroy_entry),
                ("attr_getters", &self.getters.join("\n")),
                ("attr_setters", &self.setters.join("\n")),
                ("type_constants", &self.constants.join("\n")),
                ("type_functions", &type_functions.join("\n")),
                ("subscripts", &subscripts.join("\n")),
                ("unary_ops", &unary_ops.join("\n")),
                ("binary_ops", &binary_ops.join("\n")),
                ("functions", &functions.join("\n")),
                ("base_attrs", &base_attrs),
                ("base_unary_ops", &base_unary_ops),
                ("base_binary_ops", &base_binary_ops),
                ("base_subscripts", &base_subscripts),
                ("bases_tuple_def", &bases_tuple_def),
                ("bases_tuple_entry", &bases_tuple_entry),
                ("bases_slot_index", &bases_slot_index),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagConfig;
    use crate::model::Attribute;
    use crate::resolve::DependencyMap;
    use crate::scanner::analyze_source;
    use std::path::Path;

    fn scan(source: &str) -> Vec<Component> {
        analyze_source(Path::new("test.h"), source, &TagConfig::default())
            .expect("scan should succeed")
    }

    #[test]
    fn ownership_classification_matches_attributes() {
        let mut attrs = AttributeMap::new();
        assert_eq!(Ownership::classify(&attrs), Ownership::Transient);
        attrs.insert("TypeNonTransient".to_string(), Attribute::Flag);
        assert_eq!(Ownership::classify(&attrs), Ownership::Reference);
        attrs.insert("TypeOwned".to_string(), Attribute::Flag);
        assert_eq!(Ownership::classify(&attrs), Ownership::Owned);
    }

    #[test]
    fn value_type_reflects_ownership() {
        let mut attrs = AttributeMap::new();
        assert_eq!(custom_type_value_type("geo::Vec2", &attrs), "geo::Vec2*");
        attrs.insert("TypeNonTransient".to_string(), Attribute::Flag);
        assert_eq!(custom_type_value_type("geo::Vec2", &attrs), "geo::Vec2&");
        attrs.insert("TypeOwned".to_string(), Attribute::Flag);
        assert_eq!(custom_type_value_type("geo::Vec2", &attrs), "geo::Vec2");
    }

    #[test]
    fn owned_type_gets_constructor_and_destructor_glue() {
        let components = scan(
            "MPyClass(TypeOwned)\n\
             class Vec2 {\n\
                 Vec2(float x, float y);\n\
                 ~Vec2();\n\
             };\n",
        );
        let deps = DependencyMap::new();
        let ctx = GeneratorContext::new(&components, &deps);
        let binding = TypeBinding::new(&components[0], &ctx).expect("binding");
        let code = binding.to_code(&ctx).expect("type code");
        assert!(code.contains("new (&self->Value) Vec2(x, y);"), "{code}");
        assert!(code.contains("self->Value.~Vec2();"), "{code}");
        assert!(code.contains("MP_QSTR___del__"), "{code}");
    }

    #[test]
    fn unowned_type_raises_with_factory_hint() {
        let components = scan(
            "MPyClass(TypeFactory=\", use vec2()\")\n\
             class Vec2 {\n\
             };\n",
        );
        let deps = DependencyMap::new();
        let ctx = GeneratorContext::new(&components, &deps);
        let binding = TypeBinding::new(&components[0], &ctx).expect("binding");
        let code = binding.to_code(&ctx).expect("type code");
        assert!(
            code.contains("Constructing Vec2 not allowed, use vec2()!"),
            "{code}"
        );
    }

    #[test]
    fn constant_and_readonly_properties_route_correctly() {
        let components = scan(
            "MPyClass(TypeNonTransient)\n\
             class Limits {\n\
                 MPyProperty()\n\
                 static constexpr int max_units = 64;\n\
                 MPyProperty(PropReadOnly)\n\
                 int used;\n\
             };\n",
        );
        let deps = DependencyMap::new();
        let ctx = GeneratorContext::new(&components, &deps);
        let binding = TypeBinding::new(&components[0], &ctx).expect("binding");
        let code = binding.to_code(&ctx).expect("type code");
        assert!(code.contains("MP_ROM_INT(64)"), "{code}");
        assert!(code.contains("MpyType<int>::To(self->Value.used)"), "{code}");
        assert!(!code.contains("used = MpyType"), "{code}");
    }

    #[test]
    fn operators_route_into_buckets() {
        let components = scan(
            "MPyClass(TypeNonTransient)\n\
             class Vec2 {\n\
                 MPyOperator()\n\
                 Vec2 operator+(const Vec2& other) const;\n\
                 MPyOperator()\n\
                 Vec2 operator-() const;\n\
                 MPyOperator()\n\
                 float operator[](int index) const;\n\
             };\n",
        );
        let deps = DependencyMap::new();
        let ctx = GeneratorContext::new(&components, &deps);
        let binding = TypeBinding::new(&components[0], &ctx).expect("binding");
        let code = binding.to_code(&ctx).expect("type code");
        assert!(code.contains("MP_BINARY_OP_ADD"), "{code}");
        assert!(code.contains("MP_UNARY_OP_NEGATIVE"), "{code}");
        // The subscript guard checks the index value against each
        // overload's index type.
        assert!(code.contains("MpyType<int>::Is(index)"), "{code}");
        assert!(code.contains("Subscript<Vec2, int, float>"), "{code}");
    }

    #[test]
    fn unknown_operator_spelling_is_fatal() {
        let operator = Operator {
            spelling: Some("->*".to_string()),
            parameters: vec![crate::model::Parameter::new("other", "Vec2")],
            ..Operator::default()
        };
        let binding = OperatorBinding::new(&operator, "Vec2");
        let err = binding.to_code().expect_err("must be rejected");
        assert!(matches!(err, GeneratorError::UnsupportedOperator { .. }));
    }

    #[test]
    fn hashable_attribute_adds_hash_case() {
        let components = scan(
            "MPyClass(TypeNonTransient, TypeIsHashable)\n\
             class Id {\n\
             };\n",
        );
        let deps = DependencyMap::new();
        let ctx = GeneratorContext::new(&components, &deps);
        let binding = TypeBinding::new(&components[0], &ctx).expect("binding");
        let code = binding.to_code(&ctx).expect("type code");
        assert!(code.contains("MP_UNARY_OP_HASH"), "{code}");
    }

    #[test]
    fn single_base_fills_parent_slot_directly() {
        let components = scan(
            "MPyClass(TypeNonTransient)\n\
             class Base {\n\
             };\n\
             MPyClass(TypeNonTransient)\n\
             class Derived : public Base {\n\
             };\n",
        );
        let deps = DependencyMap::new();
        let ctx = GeneratorContext::new(&components, &deps);
        let binding = TypeBinding::new(&components[1], &ctx).expect("binding");
        let code = binding.to_code(&ctx).expect("type code");
        assert!(code.contains(", &PyBase::PyType"), "{code}");
        assert!(code.contains(".slot_index_parent = 7"), "{code}");
        assert!(!code.contains("BasesTuple"), "{code}");
        assert!(code.contains("PyBaseAttr(self_in, attr, dest);"), "{code}");
    }

    #[test]
    fn multiple_bases_build_a_tuple() {
        let components = scan(
            "MPyClass(TypeNonTransient)\n\
             class A {\n\
             };\n\
             MPyClass(TypeNonTransient)\n\
             class B {\n\
             };\n\
             MPyClass(TypeNonTransient)\n\
             class C : public A, public B {\n\
             };\n",
        );
        let deps = DependencyMap::new();
        let ctx = GeneratorContext::new(&components, &deps);
        let binding = TypeBinding::new(&components[2], &ctx).expect("binding");
        let code = binding.to_code(&ctx).expect("type code");
        assert!(code.contains("PyCBasesTuple"), "{code}");
        assert!(code.contains(".len = 2"), "{code}");
    }
}

//! Fixed text templates for the emitted MicroPython binding code, stamped
//! through [`crate::utils::placeholders::apply_placeholders`]. The
//! generator produces per-construct fragments; these templates own the
//! byte-for-byte shape of the output files.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

pub const HEADER: &str = r#"// Auto-generated file, do not edit, your changes will be overridden

${header_include:empty_no_line}
${header_dependency_includes:empty_no_line}
#include "mpybind/BindingUtilities.h"
#include <memory>

#if defined(_MSC_VER)
#pragma warning(push)
#pragma warning(disable: 4100) // unused parameter
#pragma warning(disable: 4189) // unused local variable
#elif defined(__GNUC__)
#pragma GCC diagnostic push
#pragma GCC diagnostic ignored "-Wunused-function"
#pragma GCC diagnostic ignored "-Wunused-variable"
#elif defined(__clang__)
#pragma clang diagnostic push
#pragma clang diagnostic ignored "-Wunused-function"
#pragma clang diagnostic ignored "-Wunused-variable"
#endif

extern "C"
{
    #include "py/obj.h"
    #include "py/runtime.h"

    ${custom_public_type_declarations:keep_indent,empty_no_line}

    ${extern_modules:keep_indent,empty_no_line}
}

namespace MpyBind::Utilities
{
    ${type_converters:keep_indent,empty_no_line}
}

#if defined(_MSC_VER)
#pragma warning(pop)
#elif defined(__GNUC__)
#pragma GCC diagnostic pop
#elif defined(__clang__)
#pragma clang diagnostic pop
#endif
"#;

pub const SOURCE: &str = r#"// Auto-generated file, do not edit, your changes will be overridden
${primary_header_include:empty_no_line}
${header_include:empty_no_line}

using namespace MpyBind::Utilities;

#if defined(_MSC_VER)
#pragma warning(push)
#pragma warning(disable: 4100) // unused parameter
#pragma warning(disable: 4189) // unused local variable
#elif defined(__GNUC__)
#pragma GCC diagnostic push
#pragma GCC diagnostic ignored "-Wunused-function"
#pragma GCC diagnostic ignored "-Wunused-variable"
#elif defined(__clang__)
#pragma clang diagnostic push
#pragma clang diagnostic ignored "-Wunused-function"
#pragma clang diagnostic ignored "-Wunused-variable"
#endif

extern "C"
{
    #include "py/obj.h"
    #include "py/runtime.h"

    ${custom_private_type_declarations:keep_indent,empty_no_line}
}

namespace MpyBind::Utilities
{
    ${type_converters:keep_indent,empty_no_line}
}

extern "C"
{
    ${module_template:keep_indent,empty_no_line}
}

#if defined(_MSC_VER)
#pragma warning(pop)
#elif defined(__GNUC__)
#pragma GCC diagnostic pop
#elif defined(__clang__)
#pragma clang diagnostic pop
#endif
"#;

pub const DEPENDENCY_INCLUDE: &str = "#include ${include}";

// Return value fragments.
pub const FUNCTION_RETURN_VOID: &str = "return mp_const_none;";
pub const FUNCTION_RETURN_RESULT: &str = "return MpyType<${type}>::To(result);";
pub const FUNCTION_OUTPARAM: &str = "MpyType<${type}>::To(${name})";
pub const FUNCTION_RETURN_OUTPARAM: &str = r#"
mp_obj_t outParams[] = {${out_params}};
return mp_obj_new_tuple(${out_param_count}, outParams);
"#;
pub const FUNCTION_RETURN_RESULT_OUTPARAM: &str = r#"
mp_obj_t outParams[] = {MpyType<${type}>::To(result), ${out_params}};
return mp_obj_new_tuple(${out_param_count} + 1, outParams);
"#;

// Call shapes: free function, static method, instance method.
pub const FUNCTION_CALL_RETURN: &str = r#"
auto result = ${namespace}${name}(${args});
${return_code}
"#;
pub const FUNCTION_CALL_NORETURN: &str = r#"
${namespace}${name}(${args});
${return_code}
"#;
pub const METHOD_CALL_RETURN: &str = r#"
auto result = self->Value${ref_or_ptr}${name}(${args});
${return_code}
"#;
pub const METHOD_CALL_NORETURN: &str = r#"
self->Value${ref_or_ptr}${name}(${args});
${return_code}
"#;
pub const STATIC_METHOD_CALL_RETURN: &str = r#"
auto result = ${namespace}${type}::${name}(${args});
${return_code}
"#;
pub const STATIC_METHOD_CALL_NORETURN: &str = r#"
${namespace}${type}::${name}(${args});
${return_code}
"#;

pub const METHOD_KWVARARGS_SELF_INIT: &str = r#"
auto* self = static_cast<Py${type_name}*>(MP_OBJ_TO_PTR(args[0]));
"#;
pub const METHOD_FIXEDARGS_SELF_INIT: &str = r#"
auto* self = static_cast<Py${type_name}*>(MP_OBJ_TO_PTR(self_in));
"#;

// Inheritance forwarding. The derived entry tries its own overloads first;
// these fragments chain to the base's entry point afterwards, using a
// convention wide enough for the base.
pub const BASE_CALL_KWARGS_TO_KWARGS: &str = r#"
if (auto result = Py${name}Impl(n_args, args, kwargs); result != MP_OBJ_NULL) return result;
"#;
pub const BASE_CALL_KWARGS_TO_VARARGS: &str = r#"
if (auto result = Py${name}Impl(n_args, args); result != MP_OBJ_NULL) return result;
"#;
pub const BASE_CALL_KWARGS_TO_FIXEDARGS: &str = r#"
if (n_args >= ${arg_count})
    if (auto result = Py${name}Impl(${args}); result != MP_OBJ_NULL) return result;
"#;
pub const BASE_CALL_VARARGS_TO_KWARGS: &str = r#"
if (auto result = Py${name}Impl(n_args, args, nullptr); result != MP_OBJ_NULL) return result;
"#;
pub const BASE_CALL_VARARGS_TO_VARARGS: &str = r#"
if (auto result = Py${name}Impl(n_args, args); result != MP_OBJ_NULL) return result;
"#;
pub const BASE_CALL_VARARGS_TO_FIXEDARGS: &str = r#"
if (n_args == ${arg_count}) if (auto result = Py${name}Impl(${args}); result != MP_OBJ_NULL) return result;
"#;
pub const BASE_CALL_FIXEDARGS_TO_FIXEDARGS: &str = r#"
if (auto result = Py${name}Impl(${args}); result != MP_OBJ_NULL) return result;
"#;

// Keyword-argument entry point: one Impl taking the kwargs map plus the
// registered wrapper that retries bases before raising.
pub const FUNCTION_KWARGS: &str = r#"
inline mp_obj_t Py${name}Impl(size_t n_args, const mp_obj_t *args, mp_map_t *kwargs)
{
    ${self_init:keep_indent,empty_no_line}
    ${kwarg_init:keep_indent,empty_no_line}
    ${overloads:keep_indent,empty_no_line}
    return MP_OBJ_NULL;
}

STATIC mp_obj_t Py${name}(size_t n_args, const mp_obj_t *args)
{
    if (auto result = Py${name}Impl(n_args, args, nullptr); result != MP_OBJ_NULL) return result;
    ${base_calls:keep_indent,empty_no_line}
    mp_raise_TypeError("Invalid arguments");
    return mp_const_none;
}
const mp_obj_fun_builtin_var_t Py${name}Obj = {{&mp_type_fun_builtin_var}, MP_OBJ_FUN_MAKE_SIG(${min_arg_count}, MP_OBJ_FUN_ARGS_MAX, true), .fun = {.kw = Py${name}}};
"#;
pub const KWARGS_OVERLOAD_NO_OPTIONALS: &str = r#"
if (${overload_check})
{
    ${arg_init:keep_indent,empty_no_line}
    ${call_function:keep_indent}
}
"#;
pub const KWARGS_OVERLOAD_WITH_OPTIONALS: &str = r#"
if (${required_check})
{
    const auto kwargs_used = kwargs->used - ${required_count} + (n_args > ${required_count} ? ${required_count} : n_args);
    if (kwargs_used == 0 || ${optional_check})
    {
        ${arg_init:keep_indent,empty_no_line}
        ${call_function:keep_indent}
    }
}
"#;
pub const KWVARARGS_CHECK: &str = "MpyType<${type}>::Is(args[${arg_index}])";
pub const REQUIRED_OVERLOAD_NO_OPTIONALS_CHECK: &str = "n_args == ${required_count} && ${arg_checks}";
pub const REQUIRED_OVERLOAD_WITH_OPTIONALS_CHECK: &str = "n_args >= ${required_count} && ${arg_checks}";
pub const KWARG_CHECK: &str = "${name}_obj_present && MpyType<${type}>::Is(${name}_obj)";
pub const KWARG_OPTIONAL_CHECK: &str = "(kwargs_used == ${optional_count} && ${arg_checks})";
pub const KWARG_INIT: &str = r#"
mp_obj_t ${name}_obj = mp_const_none;
auto ${name}_obj_present = FindInMap(kwargs, "${name}", &${name}_obj);
"#;
pub const KWARG_INIT_WITH_DEFAULT: &str = r#"
if (n_args > ${arg_index}) { ${name}_obj = args[${arg_index}]; ${name}_obj_present = true; }
${type} ${name} = ${default};
if (${name}_obj_present) ${name} = MpyType<${type}>::From(${name}_obj);
"#;
pub const KWARGS_INIT_REQUIRED: &str = r#"
if (n_args > ${arg_index}) ${name}_obj = args[${arg_index}];
auto ${name} = MpyType<${type}>::From(${name}_obj);
"#;

// Variable-arity entry point.
pub const FUNCTION_VARARGS: &str = r#"
inline mp_obj_t Py${name}Impl(size_t n_args, const mp_obj_t *args)
{
    ${self_init:keep_indent,empty_no_line}
    ${overloads:keep_indent,empty_no_line}
    return MP_OBJ_NULL;
}

STATIC mp_obj_t Py${name}(size_t n_args, const mp_obj_t *args)
{
    if (auto result = Py${name}Impl(n_args, args); result != MP_OBJ_NULL) return result;
    ${base_calls:keep_indent,empty_no_line}
    mp_raise_TypeError("Invalid arguments");
    return mp_const_none;
}
const mp_obj_fun_builtin_var_t Py${name}Obj = {{&mp_type_fun_builtin_var}, MP_OBJ_FUN_MAKE_SIG(${min_arg_count}, ${max_arg_count}, false), .fun = {.var = Py${name}}};
"#;
pub const VARARGS_INIT_WITH_DEFAULT: &str = r#"
${type} ${name} = ${default};
if (n_args > ${arg_index}) ${name} = MpyType<${type}>::From(args[${arg_index}]);
"#;
pub const INIT_REQUIRED: &str = "auto ${name} = MpyType<${type}>::From(args[${arg_index}]);";
pub const VARARGS_OVERLOAD: &str = r#"
if (${overload_check})
{
    ${arg_init:keep_indent,empty_no_line}
    ${call_function:keep_indent}
}
"#;

// Fixed-arity entry points.
pub const FIXED_INIT_ARG: &str = "auto ${name} = MpyType<${type}>::From(${obj_name}_obj);";
pub const FIXED_ARGS_CHECK: &str = "MpyType<${type}>::Is(${name}_obj)";
pub const FIXED_OVERLOAD: &str = r#"
if (${overload_check})
{
    ${arg_init:keep_indent,empty_no_line}
    ${call_function:keep_indent}
}
"#;
pub const FIXED_BODY_UNCHECKED_OVERLOAD: &str = r#"
${arg_init:empty_no_line}
${call_function}
"#;
pub const FUNCTION_FIXED: &str = r#"
inline mp_obj_t Py${name}Impl(${args})
{
    ${self_init:keep_indent,empty_no_line}

    ${overloads:keep_indent,empty_no_line}

    return MP_OBJ_NULL;
}

STATIC mp_obj_t Py${name}(${args})
{
    if (auto result = Py${name}Impl(${arg_names}); result != MP_OBJ_NULL) return result;
    ${base_calls:keep_indent,empty_no_line}
    mp_raise_TypeError("Invalid arguments");
    return mp_const_none;
}
STATIC const mp_obj_fun_builtin_fixed_t Py${name}Obj = {{&mp_type_fun_builtin_${arg_count}}, .fun = {._${arg_count} = Py${name}}};
"#;
// One per-arity entry when the group's overloads disagree on arity; a thin
// arity switch fronts them so the module table still binds one object.
pub const FUNCTION_FIXED_ARITY_IMPL: &str = r#"
inline mp_obj_t Py${name}Arity${arity}(${args})
{
    ${self_init:keep_indent,empty_no_line}

    ${overloads:keep_indent,empty_no_line}

    return MP_OBJ_NULL;
}
"#;
pub const FUNCTION_FIXED_DISPATCHER: &str = r#"
${arity_impls:empty_no_line}
STATIC mp_obj_t Py${name}(size_t n_args, const mp_obj_t *args)
{
    switch (n_args)
    {
        ${cases:keep_indent,empty_no_line}
        default: break;
    }
    ${base_calls:keep_indent,empty_no_line}
    mp_raise_TypeError("Invalid arguments");
    return mp_const_none;
}
const mp_obj_fun_builtin_var_t Py${name}Obj = {{&mp_type_fun_builtin_var}, MP_OBJ_FUN_MAKE_SIG(${min_arg_count}, ${max_arg_count}, false), .fun = {.var = Py${name}}};
"#;
pub const FIXED_DISPATCH_CASE: &str =
    "case ${arity}: if (auto result = Py${name}Arity${arity}(${args}); result != MP_OBJ_NULL) return result; break;";
pub const FUNCTION_FIXED_UNCHECKED: &str = r#"
STATIC mp_obj_t Py${name}(${args})
{
    ${self_init:keep_indent,empty_no_line}
    ${args_init:keep_indent,empty_no_line}
    ${call_function:keep_indent}
}
STATIC const mp_obj_fun_builtin_fixed_t Py${name}Obj = {{&mp_type_fun_builtin_${arg_count}}, .fun = {._${arg_count} = Py${name}}};
"#;
pub const FUNCTION_FIXED_UNCHECKED_LONG: &str = r#"
STATIC mp_obj_t Py${name}(size_t n_args, const mp_obj_t *args)
{
    ${self_init:keep_indent,empty_no_line}
    ${args_init:keep_indent,empty_no_line}
    ${call_function:keep_indent}
}
const mp_obj_fun_builtin_var_t Py${name}Obj = {{&mp_type_fun_builtin_var}, MP_OBJ_FUN_MAKE_SIG(${arg_count}, ${arg_count}, false), .fun = {.var = Py${name}}};
"#;

// Custom type declarations and slot table.
pub const CUSTOM_TYPE_HEADER_DECLARATION: &str = r#"
struct Py${name} : public MpyBind::Utilities::MpyObjectType<${type_name}>
{ static const mp_obj_type_t PyType; };
STATIC mp_obj_t PyMake${name}(${type_name} value);
STATIC mp_obj_t Py${name}Init(const mp_obj_type_t* type, size_t n_args, size_t n_kwargs, size_t, const mp_obj_t* args);
STATIC void Py${name}Attr(mp_obj_t self_in, qstr attr, mp_obj_t* dest);
STATIC mp_obj_t Py${name}UnaryOp(mp_unary_op_t op, mp_obj_t value);
STATIC mp_obj_t Py${name}BinaryOp(mp_binary_op_t op, mp_obj_t lhs, mp_obj_t rhs);
STATIC mp_obj_t Py${name}Index(mp_obj_t self_in, mp_obj_t index, mp_obj_t value);
"#;
pub const CUSTOM_TYPE_SOURCE_DECLARATION: &str = r#"
struct Py${name} : public MpyBind::Utilities::MpyObjectType<${type_name}>
{ static const mp_obj_type_t PyType; };
STATIC mp_obj_t PyMake${name}(${type_name} value);
STATIC mp_obj_t Py${name}Init(const mp_obj_type_t* type, size_t n_args, size_t n_kwargs, size_t, const mp_obj_t* args);
STATIC void Py${name}Attr(mp_obj_t self_in, qstr attr, mp_obj_t* dest);
STATIC mp_obj_t Py${name}UnaryOp(mp_unary_op_t op, mp_obj_t value);
STATIC mp_obj_t Py${name}BinaryOp(mp_binary_op_t op, mp_obj_t lhs, mp_obj_t rhs);
STATIC mp_obj_t Py${name}Index(mp_obj_t self_in, mp_obj_t index, mp_obj_t value);
"#;
pub const CUSTOM_TYPE_CONVERTER: &str =
    "template <> struct MpyTypeMap<MpyBind::CleanBaseType<${type_name}>> { using Value = Py${name}; };";
pub const CUSTOM_TYPE_SUBSCRIPT: &str =
    "if (MpyType<${index_type}>::Is(index)) return Subscript<${self_type}, ${index_type}, ${return_type}>(self, index, value);";
pub const CUSTOM_TYPE_UNARY_BOOL: &str =
    "case MP_UNARY_OP_BOOL: return MpyBind::IsValid(self->Value) ? mp_const_true : mp_const_false;";
pub const CUSTOM_TYPE_UNARY_HASH: &str =
    "case MP_UNARY_OP_HASH: return MP_OBJ_NEW_SMALL_INT(MpyBind::HashCode(self->Value));";

fn unary_case(name: &str, op: &str) -> String {
    format!("case MP_UNARY_OP_{name}: return MpyType<${{return_type}}>::To({op}self->Value);")
}

/// Unary operator spelling -> full case fragment (with `${return_type}`
/// still unexpanded where applicable).
pub static UNARY_OP_MAP: Lazy<BTreeMap<&'static str, String>> = Lazy::new(|| {
    BTreeMap::from([
        ("+", unary_case("POSITIVE", "+")),
        ("-", unary_case("NEGATIVE", "-")),
        ("~", unary_case("INVERT", "~")),
        ("bool", CUSTOM_TYPE_UNARY_BOOL.to_string()),
        ("hash", CUSTOM_TYPE_UNARY_HASH.to_string()),
    ])
});

/// Binary operator spelling -> MicroPython dispatch case label.
pub static BINARY_OP_NAME_MAP: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("+", "ADD"),
        ("-", "SUBTRACT"),
        ("*", "MULTIPLY"),
        ("/", "TRUE_DIVIDE"),
        ("%", "MODULO"),
        ("<<", "LSHIFT"),
        (">>", "RSHIFT"),
        ("&", "AND"),
        ("|", "OR"),
        ("^", "XOR"),
        ("==", "EQUAL"),
        ("!=", "NOT_EQUAL"),
        ("<", "LESS"),
        ("<=", "LESS_EQUAL"),
        (">", "MORE"),
        (">=", "MORE_EQUAL"),
        ("+=", "INPLACE_ADD"),
        ("-=", "INPLACE_SUBTRACT"),
        ("*=", "INPLACE_MULTIPLY"),
        ("/=", "INPLACE_TRUE_DIVIDE"),
        ("%=", "INPLACE_MODULO"),
        ("<<=", "INPLACE_LSHIFT"),
        (">>=", "INPLACE_RSHIFT"),
        ("&=", "INPLACE_AND"),
        ("|=", "INPLACE_OR"),
        ("^=", "INPLACE_XOR"),
    ])
});

fn binary_bool(op: &str) -> String {
    format!("return lhs->Value {op} rhs ? mp_const_true : mp_const_false;")
}

fn binary_value(op: &str) -> String {
    format!("return MpyType<${{return_type}}>::To(lhs->Value {op} rhs);")
}

fn binary_inplace(op: &str) -> String {
    format!("lhs->Value {op}= rhs; return lhsObj;")
}

/// Binary operator spelling -> call-site fragment.
pub static BINARY_OP_TEMPLATE_MAP: Lazy<BTreeMap<&'static str, String>> = Lazy::new(|| {
    let mut map = BTreeMap::new();
    for op in ["==", "!=", "<", "<=", ">", ">="] {
        map.insert(op, binary_bool(op));
    }
    for op in ["+", "-", "*", "/", "%", "<<", ">>", "&", "|", "^"] {
        map.insert(op, binary_value(op));
    }
    for (spelling, op) in [
        ("+=", "+"),
        ("-=", "-"),
        ("*=", "*"),
        ("/=", "/"),
        ("%=", "%"),
        ("<<=", "<<"),
        (">>=", ">>"),
        ("&=", "&"),
        ("|=", "|"),
        ("^=", "^"),
    ] {
        map.insert(spelling, binary_inplace(op));
    }
    map
});

pub const BINARY_OP_CASE: &str = r#"
case MP_BINARY_OP_${name}:
    ${overloads:keep_indent,empty_no_line}
    break;
"#;
pub const BINARY_OP_OVERLOAD: &str = r#"
if (MpyType<${type}>::Is(rhsObj))
{
    auto rhs = MpyType<${type}>::From(rhsObj);
    ${binary_op:keep_indent,empty_no_line}
}"#;

pub const CUSTOM_TYPE_BASE: &str = "&Py${parent_type}::PyType";
pub const CUSTOM_TYPE_BASES: &str = r#"
STATIC const mp_obj_type_t* Py${type_name}Bases[] =
{
    ${base_list:keep_indent,empty_no_line}
};

STATIC mp_obj_tuple_t Py${type_name}BasesTuple =
{
    .base = {&mp_type_tuple},
    .len = ${base_count},
    .items = {(mp_obj_t *)&Py${type_name}Bases}
};
"#;
pub const CUSTOM_TYPE_BASES_ENTRY: &str = ", &Py${type_name}BasesTuple";
pub const CUSTOM_TYPE_BASES_SINGLE: &str = ", ${type_name}";
pub const CUSTOM_TYPE_BASES_SLOT_INDEX: &str = ", .slot_index_parent = 7";
pub const CUSTOM_TYPE_BASE_ATTR: &str = "Py${parent_type}Attr(self_in, attr, dest);";
pub const CUSTOM_TYPE_BASE_UNARY_OP: &str =
    "if (auto result = Py${parent_type}UnaryOp(op, value); result != MP_OBJ_NULL) return result;";
pub const CUSTOM_TYPE_BASE_BINARY_OP: &str =
    "if (auto result = Py${parent_type}BinaryOp(op, lhsObj, rhsObj); result != MP_OBJ_NULL) return result;";
pub const CUSTOM_TYPE_BASE_SUBSCRIPT: &str =
    "if (auto result = Py${parent_type}Index(self_in, index, value); result != MP_OBJ_NULL) return result;";
pub const CUSTOM_TYPE_GETTER: &str =
    "if (attr == MP_QSTR_${py_name}) dest[0] = MpyType<${type}>::To(self->Value${ref_or_ptr}${value});";
pub const CUSTOM_TYPE_SETTER: &str =
    "if (attr == MP_QSTR_${py_name}) { self->Value${ref_or_ptr}${value} = MpyType<${type}>::From(dest[1]); return; }";
pub const CUSTOM_TYPE_OWNED_CONSTRUCTOR: &str = r#"
new (&self->Value) ${namespace}${type_name}(${args});
"#;
pub const CUSTOM_TYPE_OWNED_INIT: &str = r#"
STATIC mp_obj_t Py${type_name}Init(const mp_obj_type_t* type, size_t n_args, size_t n_kwargs, size_t, const mp_obj_t* args)
{
    auto* self = mp_obj_malloc(Py${type_name}, type);
    ${constructors:keep_indent,empty_no_line}
    ${init_code:keep_indent,empty_no_line}
    return MP_OBJ_FROM_PTR(self);
}
"#;
pub const CUSTOM_TYPE_UNOWNED_INIT: &str = r#"
STATIC mp_obj_t Py${type_name}Init(const mp_obj_type_t* type, size_t n_args, size_t n_kwargs, size_t, const mp_obj_t* args)
{
    mp_raise_TypeError("Constructing ${type_name} not allowed${factory}!");
}
"#;
pub const CUSTOM_TYPE_OWNED_DESTROY_ENTRY: &str =
    "{MP_ROM_QSTR(MP_QSTR___del__), MP_ROM_PTR(&Py${type_name}DestroyObj)},";
pub const CUSTOM_TYPE_OWNED_DESTROY: &str = r#"
STATIC mp_obj_t Py${type_name}Destroy(mp_obj_t self_in)
{
    auto* self = static_cast<Py${type_name}*>(MP_OBJ_TO_PTR(self_in));
    self->Value.~${type_name}();
    return mp_const_none;
}
STATIC const mp_obj_fun_builtin_fixed_t Py${type_name}DestroyObj = {{&mp_type_fun_builtin_1}, .fun = {._1 = Py${type_name}Destroy}};
"#;
pub const CUSTOM_TYPE_SOURCE: &str = r#"
${make_new:empty_no_line,keep_indent}
${destroy:empty_no_line,keep_indent}

STATIC mp_obj_t PyMake${name}(${type_name} value)
{
    return MpyType<${type_name}>::To(value);
}

STATIC void Py${name}Attr(mp_obj_t self_in, qstr attr, mp_obj_t* dest)
{
    auto* self = static_cast<Py${name}*>(MP_OBJ_TO_PTR(self_in));
    if (dest[0] == MP_OBJ_NULL)
    {
        ${base_attrs}
        ${attr_getters:keep_indent,empty_no_line}
        dest[1] = MP_OBJ_SENTINEL;
    }
    else if (dest[0] == MP_OBJ_SENTINEL)
    {
        if (dest[1] == MP_OBJ_NULL) { dest[0] = MP_OBJ_NULL; return; }
        ${base_attrs}
        ${attr_setters:keep_indent,empty_no_line}
    }
}

STATIC mp_obj_t Py${name}UnaryOp(mp_unary_op_t op, mp_obj_t value)
{
    auto* self = static_cast<Py${name}*>(MP_OBJ_TO_PTR(value));
    switch (op)
    {
        ${unary_ops:keep_indent,empty_no_line}
        default: break;
    }

    ${base_unary_ops}
    return MP_OBJ_NULL;
}

STATIC mp_obj_t Py${name}BinaryOp(mp_binary_op_t op, mp_obj_t lhsObj, mp_obj_t rhsObj)
{
    auto* lhs = static_cast<Py${name}*>(MP_OBJ_TO_PTR(lhsObj));
    switch (op)
    {
        ${binary_ops:keep_indent,empty_no_line}
        default: break;
    }
    ${base_binary_ops}
    return MP_OBJ_NULL;
}

STATIC mp_obj_t Py${name}Index(mp_obj_t self_in, mp_obj_t index, mp_obj_t value)
{
    auto* self = static_cast<Py${name}*>(MP_OBJ_TO_PTR(self_in));
    ${subscripts:keep_indent,empty_no_line}
    ${base_subscripts:keep_indent,empty_no_line}
    return MP_OBJ_NULL;
}

${functions:empty_no_line}

STATIC const mp_rom_map_elem_t Py${name}DictTable[] =
{
    ${destroy_entry:keep_indent,empty_no_line}
    ${type_constants:keep_indent,empty_no_line}
    ${type_functions:keep_indent,empty_no_line}
};
${bases_tuple_def:empty_no_line}
STATIC MP_DEFINE_CONST_DICT(Py${name}Dict, Py${name}DictTable);
const mp_obj_type_t Py${name}Type = {.base = { &mp_type_type }, .flags = MP_TYPE_FLAG_NONE, .name = MP_QSTR_${py_type_name},
                                     .slot_index_make_new = 1, .slot_index_unary_op = 2, .slot_index_binary_op = 3,
                                     .slot_index_attr = 4, .slot_index_subscr = 5${bases_slot_index}, .slot_index_locals_dict = 6,
                                     .slots = {(const void*)Py${name}Init, (const void*)Py${name}UnaryOp, (const void*)Py${name}BinaryOp,
                                               (const void*)Py${name}Attr, (const void*)Py${name}Index, &Py${name}Dict${bases_tuple_entry}}};
extern "C++" { const mp_obj_type_t Py${name}::PyType = Py${name}Type; }
"#;

/// Source type spelling -> abstract python type.
pub static TYPE_TO_PYTYPE_MAP: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("int64_t", "int"),
        ("int32_t", "int"),
        ("int16_t", "int"),
        ("int8_t", "int"),
        ("int", "int"),
        ("uint64_t", "int"),
        ("uint32_t", "int"),
        ("uint16_t", "int"),
        ("uint8_t", "int"),
        ("float", "float"),
        ("double", "float"),
        ("bool", "bool"),
        ("std::string", "str"),
        ("std::string_view", "str"),
        ("char*", "str"),
    ])
});

/// Abstract python type -> ROM table entry macro suffix.
pub static PYTYPE_TO_ROM_PTR_MAP: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("int", "INT"),
        ("float", "FLOAT"),
        ("str", "QSTR"),
        ("bool", "BOOL"),
        ("object", "PTR"),
    ])
});

pub const MODULE_CONSTANT_ENTRY: &str = "{MP_ROM_QSTR(MP_QSTR_${py_name}), MP_ROM_${type}(${value})},";
pub const MODULE_FUNCTION_ENTRY: &str = "{MP_ROM_QSTR(MP_QSTR_${py_name}), MP_ROM_PTR(&Py${name}Obj)},";
pub const MODULE_TYPE_ENTRY: &str = "{MP_ROM_QSTR(MP_QSTR_${py_name}), MP_ROM_PTR(&Py${name}::PyType)},";
pub const MODULE_SUBMODULE_ENTRY: &str = "{MP_ROM_QSTR(MP_QSTR_${py_name}), MP_ROM_PTR(&Py${name}UserModule)},";
pub const MODULE_VARIABLE_GETTER: &str =
    "if (attr == MP_QSTR_${py_name}) return MpyType<${type}>::To(${value});";
pub const MODULE_VARIABLE_SETTER: &str =
    "if (attr == MP_QSTR_${py_name}) { ${value} = MpyType<${type}>::From(value); return mp_const_none; }";
pub const MODULE: &str = r#"
${functions:keep_indent,empty_no_line}

${types:keep_indent,empty_no_line}
STATIC mp_obj_t Py${module_name}GetAttr(mp_obj_t self_in, mp_obj_t attr_obj)
{
    auto attr = mp_obj_str_get_qstr(attr_obj);
    ${module_variable_getters:keep_indent,empty_no_line}
    return mp_load_attr(self_in, attr);
}
STATIC const mp_obj_fun_builtin_fixed_t Py${module_name}GetAttrObj = {{&mp_type_fun_builtin_2}, .fun = {._2 = Py${module_name}GetAttr}};

STATIC mp_obj_t Py${module_name}SetAttr(mp_obj_t self_in, mp_obj_t attr_obj, mp_obj_t value)
{
    auto attr = mp_obj_str_get_qstr(attr_obj);
    ${module_variable_setters:keep_indent,empty_no_line}
    mp_store_attr(self_in, attr, value);
    return mp_const_none;
}
STATIC const mp_obj_fun_builtin_fixed_t Py${module_name}SetAttrObj = {{&mp_type_fun_builtin_3}, .fun = {._3 = Py${module_name}SetAttr}};

STATIC const mp_rom_map_elem_t Py${module_name}ModuleGlobalsTable[] =
{
    {MP_ROM_QSTR(MP_QSTR___name__), MP_ROM_QSTR(MP_QSTR_${py_module_name})},
    {MP_ROM_QSTR(MP_QSTR___getattr__), MP_ROM_PTR(&Py${module_name}GetAttrObj)},
    {MP_ROM_QSTR(MP_QSTR___setattr__), MP_ROM_PTR(&Py${module_name}SetAttrObj)},
    ${module_constants:keep_indent,empty_no_line}
    ${module_submodules:keep_indent,empty_no_line}
    ${module_functions:keep_indent,empty_no_line}
    ${module_types:keep_indent,empty_no_line}
};

STATIC MP_DEFINE_CONST_DICT(Py${module_name}ModuleGlobals, Py${module_name}ModuleGlobalsTable);
const mp_obj_module_t Py${module_name}UserModule =
{
    .base = {&mp_type_module},
    .globals = (mp_obj_dict_t *)&Py${module_name}ModuleGlobals,
};
MP_REGISTER_MODULE(MP_QSTR_${py_module_name}, Py${module_name}UserModule);
"#;
pub const MODULE_EXTERN: &str = "extern const mp_obj_module_t Py${module_name}UserModule;";

//! Overload grouping and call-dispatch emission. Every exposed name is
//! collected into one [`FunctionBinding`]; the binding picks exactly one of
//! four calling conventions for the whole group and emits the native entry
//! point, per-overload match checks, argument conversion, the call itself
//! and trailing forwarding attempts to base-type entry points.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::codegen::templates;
use crate::codegen::{render, GeneratorContext, GeneratorError};
use crate::model::{self, Component, Function, Parameter};

/// Argument slots (including the bound self slot) a fixed-arity entry
/// point may occupy before the group falls back to the variable-arity
/// convention.
pub const FIXED_ARITY_MAX: usize = 3;

/// Pointer-spelled types passed as literals rather than by address.
const FORCE_LITERAL_TYPES: [&str; 2] = ["char*", "const char*"];

fn is_pointer_type(ty: &str) -> bool {
    ty.ends_with('*') && !FORCE_LITERAL_TYPES.contains(&ty)
}

/// The calling convention selected for one overload group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStrategy {
    /// Single overload, conversions applied without any type checks.
    Unchecked,
    /// One entry point per distinct arity, type checks only where
    /// overloads of the same arity differ.
    Fixed,
    /// Positional-only entry with a min/max argument count and one runtime
    /// check per overload.
    VarArgs,
    /// Keyword-aware entry enumerating positional/keyword candidate
    /// permutations and optional-parameter subsets.
    KwArgs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundParam {
    pub name: String,
    pub ty: String,
    pub default: Option<String>,
    pub is_outparam: bool,
}

impl BoundParam {
    fn from_parameter(parameter: &Parameter) -> Self {
        let is_outparam = parameter.attrs.contains_key("ParamIsOut")
            || (!parameter.is_const && parameter.ty.ends_with('&'));
        Self {
            name: parameter.name.clone(),
            ty: parameter.ty.clone(),
            default: parameter.default.clone(),
            is_outparam,
        }
    }
}

/// One callable signature within an overload group.
#[derive(Debug, Clone)]
pub struct Overload {
    pub params: Vec<BoundParam>,
    pub return_type: Option<String>,
    pub is_static: bool,
}

impl PartialEq for Overload {
    /// Overloads are distinguished by parameter list only.
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
    }
}

impl Overload {
    pub fn from_function(function: &Function) -> Self {
        Self {
            params: function
                .parameters
                .iter()
                .map(BoundParam::from_parameter)
                .collect(),
            return_type: function.return_type.clone(),
            is_static: function.modifiers.is_static,
        }
    }

    fn returns_value(&self) -> bool {
        matches!(self.return_type.as_deref(), Some(ty) if ty != "void")
    }

    fn required_count(&self) -> usize {
        self.params
            .iter()
            .take_while(|param| param.default.is_none())
            .count()
    }

    fn has_optionals(&self) -> bool {
        self.params.iter().any(|param| param.default.is_some())
    }

    /// The call expression plus the return statement: values convert back
    /// through the converter traits, out-parameters collect into a tuple.
    pub fn make_call(
        &self,
        ctx: &GeneratorContext,
        namespace: &str,
        name: &str,
        self_type: Option<&str>,
        self_is_ptr: bool,
    ) -> Result<String, GeneratorError> {
        let args: Vec<String> = self
            .params
            .iter()
            .map(|param| {
                // A non-transient value bound to a pointer-spelled
                // parameter is a local here, so its address is taken.
                if is_pointer_type(&param.ty) && !ctx.is_transient(&param.ty) {
                    format!("&{}", param.name)
                } else {
                    param.name.clone()
                }
            })
            .collect();
        let args = args.join(", ");

        let out_params: Vec<String> = self
            .params
            .iter()
            .filter(|param| param.is_outparam)
            .map(|param| {
                render(
                    templates::FUNCTION_OUTPARAM,
                    &[("type", &param.ty), ("name", &param.name)],
                )
            })
            .collect::<Result<_, _>>()?;

        let return_code = if out_params.is_empty() {
            if self.returns_value() {
                let ty = self.return_type.as_deref().unwrap_or_default();
                render(templates::FUNCTION_RETURN_RESULT, &[("type", ty)])?
            } else {
                templates::FUNCTION_RETURN_VOID.to_string()
            }
        } else {
            let joined = out_params.join(", ");
            let count = out_params.len().to_string();
            if self.returns_value() {
                let ty = self.return_type.as_deref().unwrap_or_default();
                render(
                    templates::FUNCTION_RETURN_RESULT_OUTPARAM,
                    &[("type", ty), ("out_params", &joined), ("out_param_count", &count)],
                )?
            } else {
                render(
                    templates::FUNCTION_RETURN_OUTPARAM,
                    &[("out_params", &joined), ("out_param_count", &count)],
                )?
            }
        };

        let template = match (self_type, self.is_static, self.returns_value()) {
            (None, _, true) => templates::FUNCTION_CALL_RETURN,
            (None, _, false) => templates::FUNCTION_CALL_NORETURN,
            (Some(_), true, true) => templates::STATIC_METHOD_CALL_RETURN,
            (Some(_), true, false) => templates::STATIC_METHOD_CALL_NORETURN,
            (Some(_), false, true) => templates::METHOD_CALL_RETURN,
            (Some(_), false, false) => templates::METHOD_CALL_NORETURN,
        };
        let ref_or_ptr = if self_is_ptr { "->" } else { "." };
        render(
            template,
            &[
                ("namespace", namespace),
                ("name", name),
                ("type", self_type.unwrap_or_default()),
                ("args", &args),
                ("ref_or_ptr", ref_or_ptr),
                ("return_code", &return_code),
            ],
        )
    }

    pub fn make_kwargs_init(&self, bound: bool) -> Result<String, GeneratorError> {
        let offset = usize::from(bound);
        let mut inits = Vec::with_capacity(self.params.len());
        for (index, param) in self.params.iter().enumerate() {
            let arg_index = (index + offset).to_string();
            let init = match &param.default {
                Some(default) => render(
                    templates::KWARG_INIT_WITH_DEFAULT,
                    &[
                        ("arg_index", &arg_index),
                        ("name", &param.name),
                        ("type", &param.ty),
                        ("default", default),
                    ],
                )?,
                None => render(
                    templates::KWARGS_INIT_REQUIRED,
                    &[("arg_index", &arg_index), ("name", &param.name), ("type", &param.ty)],
                )?,
            };
            inits.push(init);
        }
        Ok(inits.join("\n"))
    }

    pub fn make_vararg_init(&self, bound: bool) -> Result<String, GeneratorError> {
        let offset = usize::from(bound);
        let mut inits = Vec::with_capacity(self.params.len());
        for (index, param) in self.params.iter().enumerate() {
            let arg_index = (index + offset).to_string();
            let init = match &param.default {
                Some(default) => render(
                    templates::VARARGS_INIT_WITH_DEFAULT,
                    &[
                        ("arg_index", &arg_index),
                        ("name", &param.name),
                        ("type", &param.ty),
                        ("default", default),
                    ],
                )?,
                None => render(
                    templates::INIT_REQUIRED,
                    &[("arg_index", &arg_index), ("name", &param.name), ("type", &param.ty)],
                )?,
            };
            inits.push(init);
        }
        Ok(inits.join("\n"))
    }

    pub fn make_fixed_init(&self, bound: bool, use_index: bool) -> Result<String, GeneratorError> {
        let offset = usize::from(bound);
        let mut inits = Vec::with_capacity(self.params.len());
        for (index, param) in self.params.iter().enumerate() {
            let init = if self.params.len() > FIXED_ARITY_MAX - offset {
                // Too many slots for named objects, the entry takes the
                // argument array form instead.
                let arg_index = (index + offset).to_string();
                render(
                    templates::INIT_REQUIRED,
                    &[("arg_index", &arg_index), ("name", &param.name), ("type", &param.ty)],
                )?
            } else {
                let obj_name = if use_index {
                    format!("param{index}")
                } else {
                    param.name.clone()
                };
                render(
                    templates::FIXED_INIT_ARG,
                    &[("obj_name", &obj_name), ("name", &param.name), ("type", &param.ty)],
                )?
            };
            inits.push(init);
        }
        Ok(inits.join("\n"))
    }

    /// The match condition for this overload's required parameters. Under
    /// keyword calling this enumerates every split between positionally
    /// and keyword-supplied required arguments, most-positional first.
    pub fn make_required_check(
        &self,
        bound: bool,
        allow_kwargs: bool,
        fixed_use_index: Option<bool>,
    ) -> Result<String, GeneratorError> {
        let offset = usize::from(bound);
        let mut arg_checks = Vec::new();
        let mut kwarg_checks = Vec::new();
        let has_optionals = self.has_optionals();
        let mut len_required = self.params.len();
        let indexed = fixed_use_index.is_none() || self.params.len() > FIXED_ARITY_MAX - offset;

        for (index, param) in self.params.iter().enumerate() {
            if param.default.is_some() {
                len_required = index;
                break;
            }
            if indexed {
                let arg_index = (index + offset).to_string();
                arg_checks.push(render(
                    templates::KWVARARGS_CHECK,
                    &[("arg_index", &arg_index), ("type", &param.ty)],
                )?);
                if allow_kwargs {
                    kwarg_checks.push(render(
                        templates::KWARG_CHECK,
                        &[("name", &param.name), ("type", &param.ty)],
                    )?);
                }
            } else {
                let name = if fixed_use_index == Some(true) {
                    format!("param{index}")
                } else {
                    param.name.clone()
                };
                arg_checks.push(render(
                    templates::FIXED_ARGS_CHECK,
                    &[("name", &name), ("type", &param.ty)],
                )?);
            }
        }

        if arg_checks.is_empty() {
            arg_checks.push("true".to_string());
        }
        if !indexed {
            return Ok(arg_checks.join(" && "));
        }

        let count_template = if has_optionals {
            templates::REQUIRED_OVERLOAD_WITH_OPTIONALS_CHECK
        } else {
            templates::REQUIRED_OVERLOAD_NO_OPTIONALS_CHECK
        };
        if !allow_kwargs {
            let required_count = (len_required + offset).to_string();
            return render(
                count_template,
                &[("required_count", &required_count), ("arg_checks", &arg_checks.join(" && "))],
            );
        }

        // One candidate per count of positionally supplied required
        // arguments, the remainder checked for keyword presence.
        let mut candidates = Vec::with_capacity(len_required + 1);
        for positional in (0..=len_required).rev() {
            let mut combined: Vec<&str> =
                arg_checks[..positional].iter().map(String::as_str).collect();
            combined.extend(kwarg_checks[positional..].iter().map(String::as_str));
            let required_count = (positional + offset).to_string();
            let candidate = render(
                count_template,
                &[("required_count", &required_count), ("arg_checks", &combined.join(" && "))],
            )?;
            candidates.push(format!("({candidate})"));
        }
        Ok(candidates.join(" || "))
    }

    /// Non-empty subsets of the optional parameters, grouped by subset
    /// size; exactly `2^k - 1` candidates for `k` optionals.
    pub fn make_optional_check(&self, required_count: usize) -> Result<String, GeneratorError> {
        let optional_params: Vec<&BoundParam> = self
            .params
            .iter()
            .filter(|param| param.default.is_some())
            .collect();
        let mut checks = Vec::new();
        for size in 1..=self.params.len().saturating_sub(required_count) {
            let mut subsets = Vec::new();
            for combination in combinations(optional_params.len(), size) {
                let subset_checks = combination
                    .iter()
                    .map(|&index| {
                        let param = optional_params[index];
                        render(
                            templates::KWARG_CHECK,
                            &[("name", &param.name), ("type", &param.ty)],
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                subsets.push(format!("({})", subset_checks.join(" && ")));
            }
            let optional_count = size.to_string();
            let combined = format!("({})", subsets.join(" || "));
            checks.push(render(
                templates::KWARG_OPTIONAL_CHECK,
                &[("optional_count", &optional_count), ("arg_checks", &combined)],
            )?);
        }
        Ok(checks.join(" || "))
    }

    /// One checked overload clause in the convention the group selected.
    #[allow(clippy::too_many_arguments)]
    fn to_code(
        &self,
        ctx: &GeneratorContext,
        namespace: &str,
        name: &str,
        self_type: Option<&str>,
        self_is_ptr: bool,
        allow_kwargs: bool,
        fixed_use_index: Option<bool>,
    ) -> Result<String, GeneratorError> {
        let bound = self_type.is_some();
        let call = self.make_call(ctx, namespace, name, self_type, self_is_ptr)?;
        let required = self.make_required_check(bound, allow_kwargs, fixed_use_index)?;
        if let Some(use_index) = fixed_use_index {
            let arg_init = self.make_fixed_init(bound, use_index)?;
            return render(
                templates::FIXED_OVERLOAD,
                &[("overload_check", &required), ("arg_init", &arg_init), ("call_function", &call)],
            );
        }
        if allow_kwargs {
            let init = self.make_kwargs_init(bound)?;
            if self.has_optionals() {
                let required_count = self.required_count();
                let optional = self.make_optional_check(required_count)?;
                let required_count = required_count.to_string();
                return render(
                    templates::KWARGS_OVERLOAD_WITH_OPTIONALS,
                    &[
                        ("required_check", &required),
                        ("arg_init", &init),
                        ("required_count", &required_count),
                        ("optional_check", &optional),
                        ("call_function", &call),
                    ],
                );
            }
            return render(
                templates::KWARGS_OVERLOAD_NO_OPTIONALS,
                &[("overload_check", &required), ("arg_init", &init), ("call_function", &call)],
            );
        }
        let init = self.make_vararg_init(bound)?;
        render(
            templates::VARARGS_OVERLOAD,
            &[("overload_check", &required), ("arg_init", &init), ("call_function", &call)],
        )
    }
}

/// Index combinations of size `size` out of `0..count`, in lexicographic
/// order. Iterative, since the optional-parameter counts involved stay
/// small.
fn combinations(count: usize, size: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if size == 0 || size > count {
        return out;
    }
    let mut indices: Vec<usize> = (0..size).collect();
    loop {
        out.push(indices.clone());
        let mut position = size;
        loop {
            if position == 0 {
                return out;
            }
            position -= 1;
            if indices[position] != position + count - size {
                break;
            }
        }
        indices[position] += 1;
        for next in position + 1..size {
            indices[next] = indices[next - 1] + 1;
        }
    }
}

/// The calling convention a base type's entry point was generated with,
/// as seen from a derived type that forwards to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseConvention {
    KwArgs,
    VarArgs,
    Fixed { arity: usize },
}

/// A forwarding target on a public base type sharing the exposed name.
#[derive(Debug, Clone)]
pub struct BaseForward {
    pub entry: String,
    pub convention: BaseConvention,
}

impl BaseForward {
    /// Inspects the base component's overloads of `python_name` and
    /// derives the convention its own entry point uses.
    pub fn for_function(base: &Component, python_name: &str, name: &str) -> Option<Self> {
        let overloads: Vec<&Function> = base
            .functions
            .iter()
            .filter(|function| {
                model::python_name(
                    function.python_name.as_deref(),
                    function.name.as_deref().unwrap_or_default(),
                ) == python_name
            })
            .collect();
        let reference = overloads.first()?;
        let base_name = base
            .name
            .as_deref()
            .map(model::type_name_without_namespace)
            .unwrap_or_default();
        let entry = format!("{base_name}{name}");

        if overloads
            .iter()
            .any(|overload| overload.attrs.contains_key("FuncAllowKwargs"))
        {
            return Some(Self { entry, convention: BaseConvention::KwArgs });
        }
        let defaults_stripped = overloads[1..]
            .iter()
            .any(|overload| overload.attrs.contains_key("FuncNoDefaults"));
        let needs_varargs = reference.parameters.len() > 2
            || overloads.iter().any(|overload| {
                (overload.parameters.iter().any(|param| param.default.is_some())
                    && !defaults_stripped)
                    || overload.parameters.len() != reference.parameters.len()
            });
        let convention = if needs_varargs {
            BaseConvention::VarArgs
        } else {
            BaseConvention::Fixed { arity: reference.parameters.len() + 1 }
        };
        Some(Self { entry, convention })
    }
}

/// All overloads of one exposed function name, together with the self
/// binding (for methods) and the forwarding targets on base types.
#[derive(Debug, Clone)]
pub struct FunctionBinding {
    pub namespace: String,
    pub name: String,
    pub python_name: String,
    pub overloads: Vec<Overload>,
    pub bases: Vec<BaseForward>,
    pub self_type: Option<String>,
    pub self_is_ptr: bool,
    no_overloads: bool,
    allow_kwargs: bool,
    no_defaults: bool,
    unchecked: bool,
}

impl FunctionBinding {
    pub fn new(function: &Function) -> Self {
        let cpp_name = function.name.as_deref().unwrap_or_default();
        let (namespace, name, python_name) =
            model::qualified_parts(cpp_name, function.python_name.as_deref());
        let mut binding = Self {
            namespace,
            name,
            python_name,
            overloads: Vec::new(),
            bases: Vec::new(),
            self_type: None,
            self_is_ptr: false,
            no_overloads: false,
            allow_kwargs: false,
            no_defaults: false,
            unchecked: false,
        };
        binding.add_overload(function);
        binding
    }

    pub fn add_overload(&mut self, function: &Function) {
        self.overloads.push(Overload::from_function(function));
        self.no_overloads |= function.attrs.contains_key("FuncNoOverloads");
        self.unchecked |= function.attrs.contains_key("FuncUnchecked");
        self.no_defaults |= function.attrs.contains_key("FuncNoDefaults");
        self.allow_kwargs |= function.attrs.contains_key("FuncAllowKwargs");
    }

    pub fn bind_self(&mut self, type_name: &str, is_ptr: bool) {
        self.self_type = Some(type_name.to_string());
        self.self_is_ptr = is_ptr;
    }

    /// Registers a forwarding target. A base requiring keyword calling
    /// does not widen this group's own convention; the forwarding call
    /// alone switches to the keyword-calling shape.
    pub fn add_base(&mut self, base: &Component) {
        if let Some(forward) = BaseForward::for_function(base, &self.python_name, &self.name) {
            self.bases.push(forward);
        }
    }

    fn self_offset(&self) -> usize {
        usize::from(self.self_type.is_some())
    }

    /// The unprefixed entry-point name; methods carry their type name.
    pub fn entry_name(&self) -> String {
        match &self.self_type {
            Some(type_name) => format!("{type_name}{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Exactly one strategy applies to any group.
    pub fn strategy(&self) -> DispatchStrategy {
        if self.unchecked {
            return DispatchStrategy::Unchecked;
        }
        if self.allow_kwargs {
            return DispatchStrategy::KwArgs;
        }
        let offset = self.self_offset();
        let has_defaults = !self.no_defaults
            && self
                .overloads
                .iter()
                .any(|overload| overload.has_optionals());
        let base_needs_wide = self
            .bases
            .iter()
            .any(|base| !matches!(base.convention, BaseConvention::Fixed { .. }));
        let fits = self
            .overloads
            .iter()
            .all(|overload| overload.params.len() + offset <= FIXED_ARITY_MAX);
        if fits && !has_defaults && !base_needs_wide {
            DispatchStrategy::Fixed
        } else {
            DispatchStrategy::VarArgs
        }
    }

    fn make_self_init(&self, fixed: bool) -> Result<String, GeneratorError> {
        let reference = match self.overloads.first() {
            Some(overload) => overload,
            None => return Ok(String::new()),
        };
        let Some(type_name) = &self.self_type else {
            return Ok(String::new());
        };
        if reference.is_static {
            return Ok(String::new());
        }
        let template = if fixed && reference.params.len() < FIXED_ARITY_MAX {
            templates::METHOD_FIXEDARGS_SELF_INIT
        } else {
            templates::METHOD_KWVARARGS_SELF_INIT
        };
        render(template, &[("type_name", type_name)])
    }

    fn args_slice(count: usize) -> String {
        (0..count)
            .map(|index| format!("args[{index}]"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Forwarding fragments for an entry with the `(n_args, args)`
    /// signature (variable-arity entries and the fixed-arity dispatcher).
    fn make_vararg_base_calls(&self) -> Result<Vec<String>, GeneratorError> {
        let mut calls = Vec::new();
        if self.self_type.is_none() {
            return Ok(calls);
        }
        for base in &self.bases {
            let call = match base.convention {
                BaseConvention::Fixed { arity } => {
                    let args = Self::args_slice(arity);
                    let arg_count = arity.to_string();
                    render(
                        templates::BASE_CALL_VARARGS_TO_FIXEDARGS,
                        &[("name", &base.entry), ("arg_count", &arg_count), ("args", &args)],
                    )?
                }
                BaseConvention::VarArgs => render(
                    templates::BASE_CALL_VARARGS_TO_VARARGS,
                    &[("name", &base.entry)],
                )?,
                // The base's keyword entry accepts a null keyword map.
                BaseConvention::KwArgs => render(
                    templates::BASE_CALL_VARARGS_TO_KWARGS,
                    &[("name", &base.entry)],
                )?,
            };
            calls.push(call);
        }
        Ok(calls)
    }

    fn make_kwarg_base_calls(&self) -> Result<Vec<String>, GeneratorError> {
        let mut calls = Vec::new();
        if self.self_type.is_none() {
            return Ok(calls);
        }
        for base in &self.bases {
            let call = match base.convention {
                BaseConvention::KwArgs => render(
                    templates::BASE_CALL_KWARGS_TO_KWARGS,
                    &[("name", &base.entry)],
                )?,
                BaseConvention::VarArgs => render(
                    templates::BASE_CALL_KWARGS_TO_VARARGS,
                    &[("name", &base.entry)],
                )?,
                BaseConvention::Fixed { arity } => {
                    let args = Self::args_slice(arity);
                    let arg_count = arity.to_string();
                    render(
                        templates::BASE_CALL_KWARGS_TO_FIXEDARGS,
                        &[("name", &base.entry), ("arg_count", &arg_count), ("args", &args)],
                    )?
                }
            };
            calls.push(call);
        }
        Ok(calls)
    }

    fn make_fixed_base_calls(&self, arg_names: &[String]) -> Result<Vec<String>, GeneratorError> {
        let mut calls = Vec::new();
        if self.self_type.is_none() {
            return Ok(calls);
        }
        for base in &self.bases {
            calls.push(render(
                templates::BASE_CALL_FIXEDARGS_TO_FIXEDARGS,
                &[("name", &base.entry), ("args", &arg_names.join(", "))],
            )?);
        }
        Ok(calls)
    }

    pub fn module_entry(&self) -> Result<String, GeneratorError> {
        render(
            templates::MODULE_FUNCTION_ENTRY,
            &[("name", &self.entry_name()), ("py_name", &self.python_name)],
        )
    }

    pub fn type_entry(&self) -> Result<String, GeneratorError> {
        self.module_entry()
    }

    /// The complete native entry point for this group.
    pub fn to_code(&self, ctx: &GeneratorContext) -> Result<String, GeneratorError> {
        let mut overloads = self.overloads.clone();
        if self.no_defaults {
            for overload in &mut overloads {
                for param in &mut overload.params {
                    if param.default.take().is_some() {
                        warn!(
                            function = %self.name,
                            parameter = %param.name,
                            "defaults are disallowed here, dropping the default value"
                        );
                    }
                }
            }
        }
        if self.no_overloads && overloads.len() > 1 {
            return Err(GeneratorError::OverloadsNotAllowed {
                name: self.name.clone(),
                count: overloads.len(),
            });
        }

        match self.strategy() {
            DispatchStrategy::Unchecked => self.emit_unchecked(ctx, &overloads),
            DispatchStrategy::Fixed => self.emit_fixed(ctx, &overloads),
            DispatchStrategy::VarArgs => self.emit_varargs(ctx, &overloads),
            DispatchStrategy::KwArgs => self.emit_kwargs(ctx, &overloads),
        }
    }

    fn emit_unchecked(
        &self,
        ctx: &GeneratorContext,
        overloads: &[Overload],
    ) -> Result<String, GeneratorError> {
        let Some(reference) = overloads.first() else {
            return Ok(String::new());
        };
        let offset = self.self_offset();
        let bound = self.self_type.is_some();
        let args_init = reference.make_fixed_init(bound, false)?;
        let call = reference.make_call(
            ctx,
            &self.namespace,
            &self.name,
            self.self_type.as_deref(),
            self.self_is_ptr,
        )?;
        let name = self.entry_name();
        let arg_count = (reference.params.len() + offset).to_string();
        if reference.params.len() > FIXED_ARITY_MAX - offset {
            let self_init = self.make_self_init(false)?;
            render(
                templates::FUNCTION_FIXED_UNCHECKED_LONG,
                &[
                    ("name", &name),
                    ("self_init", &self_init),
                    ("args_init", &args_init),
                    ("call_function", &call),
                    ("arg_count", &arg_count),
                ],
            )
        } else {
            let self_init = self.make_self_init(true)?;
            let mut args = Vec::with_capacity(reference.params.len() + offset);
            if bound {
                args.push("mp_obj_t self_in".to_string());
            }
            args.extend(
                reference
                    .params
                    .iter()
                    .map(|param| format!("mp_obj_t {}_obj", param.name)),
            );
            render(
                templates::FUNCTION_FIXED_UNCHECKED,
                &[
                    ("name", &name),
                    ("args", &args.join(", ")),
                    ("self_init", &self_init),
                    ("args_init", &args_init),
                    ("call_function", &call),
                    ("arg_count", &arg_count),
                ],
            )
        }
    }

    fn emit_fixed(
        &self,
        ctx: &GeneratorContext,
        overloads: &[Overload],
    ) -> Result<String, GeneratorError> {
        let offset = self.self_offset();
        let name = self.entry_name();

        // Group by arity, duplicates within an arity collapse.
        let mut by_arity: BTreeMap<usize, Vec<&Overload>> = BTreeMap::new();
        for overload in overloads {
            let bucket = by_arity.entry(overload.params.len()).or_default();
            if !bucket.iter().any(|existing| *existing == overload) {
                bucket.push(overload);
            }
        }

        let single_arity = by_arity.len() == 1;
        let bases_match_single = |total: usize| {
            self.bases
                .iter()
                .all(|base| base.convention == BaseConvention::Fixed { arity: total })
        };

        if single_arity {
            let (&param_count, bucket) = match by_arity.iter().next() {
                Some(entry) => entry,
                None => return Ok(String::new()),
            };
            let total = param_count + offset;
            if bases_match_single(total) {
                return self.emit_fixed_single(ctx, bucket, param_count, &name);
            }
        }
        self.emit_fixed_dispatcher(ctx, &by_arity, &name)
    }

    /// Short form: one entry point with named object parameters.
    fn emit_fixed_single(
        &self,
        ctx: &GeneratorContext,
        bucket: &[&Overload],
        param_count: usize,
        name: &str,
    ) -> Result<String, GeneratorError> {
        let offset = self.self_offset();
        let bound = self.self_type.is_some();
        let use_index = bucket.len() > 1;
        let reference = bucket[0];

        let mut arg_names = Vec::with_capacity(param_count + offset);
        if bound {
            arg_names.push("self_in".to_string());
        }
        for (index, param) in reference.params.iter().enumerate() {
            if use_index {
                arg_names.push(format!("param{index}_obj"));
            } else {
                arg_names.push(format!("{}_obj", param.name));
            }
        }

        let body = if use_index {
            let clauses = bucket
                .iter()
                .map(|overload| {
                    overload.to_code(
                        ctx,
                        &self.namespace,
                        &self.name,
                        self.self_type.as_deref(),
                        self.self_is_ptr,
                        false,
                        Some(true),
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            clauses.join("\n")
        } else {
            // Identical signatures need no type checks beyond arity.
            let arg_init = reference.make_fixed_init(bound, false)?;
            let call = reference.make_call(
                ctx,
                &self.namespace,
                &self.name,
                self.self_type.as_deref(),
                self.self_is_ptr,
            )?;
            render(
                templates::FIXED_BODY_UNCHECKED_OVERLOAD,
                &[("arg_init", &arg_init), ("call_function", &call)],
            )?
        };

        let self_init = self.make_self_init(true)?;
        let base_calls = self.make_fixed_base_calls(&arg_names)?;
        let args: Vec<String> = arg_names
            .iter()
            .map(|arg| format!("mp_obj_t {arg}"))
            .collect();
        let arg_count = (param_count + offset).to_string();
        render(
            templates::FUNCTION_FIXED,
            &[
                ("name", name),
                ("args", &args.join(", ")),
                ("arg_names", &arg_names.join(", ")),
                ("self_init", &self_init),
                ("overloads", &body),
                ("base_calls", &base_calls.join("\n")),
                ("arg_count", &arg_count),
            ],
        )
    }

    /// One implementation per distinct arity behind an argument-count
    /// switch; also used when fixed base forwards need count guards.
    fn emit_fixed_dispatcher(
        &self,
        ctx: &GeneratorContext,
        by_arity: &BTreeMap<usize, Vec<&Overload>>,
        name: &str,
    ) -> Result<String, GeneratorError> {
        let offset = self.self_offset();
        let bound = self.self_type.is_some();
        let self_init = self.make_self_init(true)?;

        let mut impls = Vec::with_capacity(by_arity.len());
        let mut cases = Vec::with_capacity(by_arity.len());
        for (&param_count, bucket) in by_arity {
            let total = param_count + offset;
            let use_index = bucket.len() > 1;
            let reference = bucket[0];

            let mut args = Vec::with_capacity(total);
            if bound {
                args.push("mp_obj_t self_in".to_string());
            }
            for (index, param) in reference.params.iter().enumerate() {
                if use_index {
                    args.push(format!("mp_obj_t param{index}_obj"));
                } else {
                    args.push(format!("mp_obj_t {}_obj", param.name));
                }
            }

            let body = if use_index {
                let clauses = bucket
                    .iter()
                    .map(|overload| {
                        overload.to_code(
                            ctx,
                            &self.namespace,
                            &self.name,
                            self.self_type.as_deref(),
                            self.self_is_ptr,
                            false,
                            Some(true),
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                clauses.join("\n")
            } else {
                let arg_init = reference.make_fixed_init(bound, false)?;
                let call = reference.make_call(
                    ctx,
                    &self.namespace,
                    &self.name,
                    self.self_type.as_deref(),
                    self.self_is_ptr,
                )?;
                render(
                    templates::FIXED_BODY_UNCHECKED_OVERLOAD,
                    &[("arg_init", &arg_init), ("call_function", &call)],
                )?
            };

            let arity = total.to_string();
            impls.push(render(
                templates::FUNCTION_FIXED_ARITY_IMPL,
                &[
                    ("name", name),
                    ("arity", &arity),
                    ("args", &args.join(", ")),
                    ("self_init", &self_init),
                    ("overloads", &body),
                ],
            )?);
            cases.push(render(
                templates::FIXED_DISPATCH_CASE,
                &[("name", name), ("arity", &arity), ("args", &Self::args_slice(total))],
            )?);
        }

        let base_calls = self.make_vararg_base_calls()?;
        let min = by_arity.keys().next().copied().unwrap_or_default() + offset;
        let max = by_arity.keys().next_back().copied().unwrap_or_default() + offset;
        let min = min.to_string();
        let max = max.to_string();
        render(
            templates::FUNCTION_FIXED_DISPATCHER,
            &[
                ("name", name),
                ("arity_impls", &impls.join("\n")),
                ("cases", &cases.join("\n")),
                ("base_calls", &base_calls.join("\n")),
                ("min_arg_count", &min),
                ("max_arg_count", &max),
            ],
        )
    }

    fn emit_varargs(
        &self,
        ctx: &GeneratorContext,
        overloads: &[Overload],
    ) -> Result<String, GeneratorError> {
        let offset = self.self_offset();
        let clauses = overloads
            .iter()
            .map(|overload| {
                overload.to_code(
                    ctx,
                    &self.namespace,
                    &self.name,
                    self.self_type.as_deref(),
                    self.self_is_ptr,
                    false,
                    None,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let self_init = self.make_self_init(false)?;
        let base_calls = self.make_vararg_base_calls()?;
        let required = overloads
            .first()
            .map(Overload::required_count)
            .unwrap_or_default();
        let max_args = overloads
            .iter()
            .map(|overload| overload.params.len())
            .max()
            .unwrap_or_default();
        let min = (required + offset).to_string();
        let max = (max_args + offset).to_string();
        render(
            templates::FUNCTION_VARARGS,
            &[
                ("name", &self.entry_name()),
                ("self_init", &self_init),
                ("overloads", &clauses.join("\n")),
                ("base_calls", &base_calls.join("\n")),
                ("min_arg_count", &min),
                ("max_arg_count", &max),
            ],
        )
    }

    fn emit_kwargs(
        &self,
        ctx: &GeneratorContext,
        overloads: &[Overload],
    ) -> Result<String, GeneratorError> {
        let offset = self.self_offset();
        let clauses = overloads
            .iter()
            .map(|overload| {
                overload.to_code(
                    ctx,
                    &self.namespace,
                    &self.name,
                    self.self_type.as_deref(),
                    self.self_is_ptr,
                    true,
                    None,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut kwarg_names = BTreeSet::new();
        for overload in overloads {
            for param in &overload.params {
                kwarg_names.insert(param.name.as_str());
            }
        }
        let kwarg_init = kwarg_names
            .iter()
            .map(|kwarg| render(templates::KWARG_INIT, &[("name", kwarg)]))
            .collect::<Result<Vec<_>, _>>()?;

        let self_init = self.make_self_init(false)?;
        let base_calls = self.make_kwarg_base_calls()?;
        let required = overloads
            .first()
            .map(Overload::required_count)
            .unwrap_or_default();
        let min = (required + offset).to_string();
        render(
            templates::FUNCTION_KWARGS,
            &[
                ("name", &self.entry_name()),
                ("self_init", &self_init),
                ("kwarg_init", &kwarg_init.join("\n")),
                ("overloads", &clauses.join("\n")),
                ("base_calls", &base_calls.join("\n")),
                ("min_arg_count", &min),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Modifiers;

    fn context() -> GeneratorContext<'static> {
        GeneratorContext::empty()
    }

    fn function(name: &str, params: &[(&str, &str, Option<&str>)]) -> Function {
        Function {
            name: Some(name.to_string()),
            parameters: params
                .iter()
                .map(|(pname, ty, default)| {
                    let mut param = Parameter::new(*pname, *ty);
                    param.default = default.map(str::to_string);
                    param
                })
                .collect(),
            return_type: Some("void".to_string()),
            ..Function::default()
        }
    }

    #[test]
    fn two_arities_without_defaults_select_fixed() {
        let binding = binding_of(&[
            function("Place", &[("x", "int", None)]),
            function("Place", &[("x", "int", None), ("y", "int", None)]),
        ]);
        assert_eq!(binding.strategy(), DispatchStrategy::Fixed);
        let code = binding.to_code(&context()).expect("fixed emission");
        assert!(code.contains("PyPlaceArity1"), "{code}");
        assert!(code.contains("PyPlaceArity2"), "{code}");
        assert!(code.contains("case 1:"), "{code}");
        assert!(code.contains("case 2:"), "{code}");
    }

    fn binding_of(functions: &[Function]) -> FunctionBinding {
        let mut binding = FunctionBinding::new(&functions[0]);
        for function in &functions[1..] {
            binding.add_overload(function);
        }
        binding
    }

    #[test]
    fn defaults_force_variable_arity() {
        let binding = binding_of(&[function(
            "Scale",
            &[("factor", "float", Some("1.0f"))],
        )]);
        assert_eq!(binding.strategy(), DispatchStrategy::VarArgs);
        let code = binding.to_code(&context()).expect("varargs emission");
        assert!(code.contains("MP_OBJ_FUN_MAKE_SIG(0, 1, false)"), "{code}");
    }

    #[test]
    fn kwargs_flag_selects_keyword_convention() {
        let mut f = function(
            "Spawn",
            &[
                ("kind", "int", None),
                ("x", "float", Some("0.0f")),
                ("y", "float", Some("0.0f")),
            ],
        );
        f.attrs
            .insert("FuncAllowKwargs".to_string(), crate::model::Attribute::Flag);
        let binding = binding_of(&[f]);
        assert_eq!(binding.strategy(), DispatchStrategy::KwArgs);
    }

    #[test]
    fn optional_subset_enumeration_is_exact() {
        // 2 optionals -> 2^2 - 1 = 3 subset candidates.
        let overload = Overload::from_function(&function(
            "Spawn",
            &[
                ("kind", "int", None),
                ("x", "float", Some("0.0f")),
                ("y", "float", Some("0.0f")),
            ],
        ));
        let check = overload.make_optional_check(1).expect("optional check");
        assert_eq!(check.matches("kwargs_used ==").count(), 2);
        assert_eq!(check.matches("_obj_present").count(), 4);
        let subsets = check.matches("x_obj_present").count()
            + check.matches("y_obj_present").count();
        assert_eq!(subsets, 4, "{check}");
    }

    #[test]
    fn subset_counts_follow_powers_of_two() {
        for k in 1..=5usize {
            let total: usize = (1..=k).map(|size| combinations(k, size).len()).sum();
            assert_eq!(total, (1 << k) - 1, "k = {k}");
        }
    }

    #[test]
    fn required_candidates_run_most_positional_first() {
        let overload = Overload::from_function(&function(
            "Move",
            &[("x", "int", None), ("y", "int", None)],
        ));
        let check = overload
            .make_required_check(false, true, None)
            .expect("required check");
        let all_positional = check
            .find("n_args == 2")
            .expect("all-positional candidate");
        let none_positional = check.find("n_args == 0").expect("keyword-only candidate");
        assert!(all_positional < none_positional, "{check}");
    }

    #[test]
    fn strategy_selection_is_total() {
        let plain = binding_of(&[function("F", &[("a", "int", None)])]);
        let with_default = binding_of(&[function("F", &[("a", "int", Some("1"))])]);
        let wide = binding_of(&[function(
            "F",
            &[
                ("a", "int", None),
                ("b", "int", None),
                ("c", "int", None),
                ("d", "int", None),
            ],
        )]);
        assert_eq!(plain.strategy(), DispatchStrategy::Fixed);
        assert_eq!(with_default.strategy(), DispatchStrategy::VarArgs);
        assert_eq!(wide.strategy(), DispatchStrategy::VarArgs);
    }

    #[test]
    fn unchecked_attribute_skips_type_checks() {
        let mut f = function("Raw", &[("value", "int", None)]);
        f.attrs
            .insert("FuncUnchecked".to_string(), crate::model::Attribute::Flag);
        let binding = binding_of(&[f]);
        assert_eq!(binding.strategy(), DispatchStrategy::Unchecked);
        let code = binding.to_code(&context()).expect("unchecked emission");
        assert!(!code.contains("::Is("), "{code}");
        assert!(code.contains("mp_type_fun_builtin_1"), "{code}");
    }

    #[test]
    fn no_overloads_attribute_rejects_second_overload() {
        let mut first = function("Only", &[("a", "int", None)]);
        first
            .attrs
            .insert("FuncNoOverloads".to_string(), crate::model::Attribute::Flag);
        let second = function("Only", &[("a", "float", None)]);
        let binding = binding_of(&[first, second]);
        let err = binding.to_code(&context()).expect_err("must reject");
        assert!(matches!(err, GeneratorError::OverloadsNotAllowed { count: 2, .. }));
    }

    #[test]
    fn out_parameters_return_a_tuple() {
        let mut f = function("Query", &[("result", "int&", None)]);
        f.return_type = Some("bool".to_string());
        let binding = binding_of(&[f]);
        let code = binding.to_code(&context()).expect("emission");
        assert!(code.contains("mp_obj_new_tuple"), "{code}");
    }

    #[test]
    fn static_methods_call_through_the_type() {
        let mut f = function("Create", &[("size", "int", None)]);
        f.modifiers = Modifiers {
            is_static: true,
            ..Modifiers::default()
        };
        let mut binding = binding_of(&[f]);
        binding.namespace = "geo::".to_string();
        binding.bind_self("Vec2", true);
        let code = binding.to_code(&context()).expect("emission");
        assert!(code.contains("geo::Vec2::Create("), "{code}");
    }

    #[test]
    fn derived_varargs_forwards_to_kwargs_base_with_kwargs_convention() {
        let mut base_fn = function("Update", &[("dt", "float", None)]);
        base_fn
            .attrs
            .insert("FuncAllowKwargs".to_string(), crate::model::Attribute::Flag);
        let base = Component {
            name: Some("Base".to_string()),
            functions: vec![base_fn],
            ..Component::default()
        };
        let mut binding = binding_of(&[function("Update", &[("dt", "float", None)])]);
        binding.bind_self("Derived", true);
        binding.add_base(&base);
        // The derived group stays positional; only the forwarding call
        // switches to the base's keyword shape.
        assert_eq!(binding.strategy(), DispatchStrategy::VarArgs);
        let code = binding.to_code(&context()).expect("emission");
        assert!(code.contains("PyBaseUpdateImpl(n_args, args, nullptr)"), "{code}");
    }
}

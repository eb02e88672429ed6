use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use mpybindgen::codegen::{generate_header, generate_source};
use mpybindgen::config::{Config, DependencyRegistry, TagConfig};
use mpybindgen::model::Component;
use mpybindgen::resolve::{ensure_namespaced_type_refs, DependencyMap};
use mpybindgen::scanner::analyze_source;

fn scan(source: &str) -> Vec<Component> {
    analyze_source(Path::new("demo.h"), source, &TagConfig::default())
        .expect("scan should succeed")
}

/// Runs the generation stage over one in-memory source unit.
fn generate(source: &str) -> (String, String) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config_path = dir.path().join("demo.json");
    fs::write(&config_path, r#"{"target_path": "out/demo"}"#).expect("failed to write config");
    let config = Config::load(&config_path, &BTreeMap::new()).expect("failed to load config");

    let registry = DependencyRegistry::new();
    let dependencies = DependencyMap::new();
    let mut components = scan(source);
    ensure_namespaced_type_refs(&mut components, &dependencies);

    let header = generate_header(&config, &registry, &components).expect("header generation");
    let source = generate_source(&config, &components, &dependencies).expect("source generation");
    (header, source)
}

#[test]
fn overloads_with_distinct_arities_dispatch_on_argument_count() {
    let (_, source) = generate(
        "MPyModule(demo)\n\
         MPyFunction()\n\
         void Place(int x);\n\
         MPyFunction()\n\
         void Place(int x, int y);\n",
    );
    assert!(source.contains("PyPlaceArity1"), "{source}");
    assert!(source.contains("PyPlaceArity2"), "{source}");
    assert!(source.contains("case 1:"), "{source}");
    assert!(source.contains("case 2:"), "{source}");
    assert!(
        source.contains("MP_OBJ_FUN_MAKE_SIG(1, 2, false)"),
        "{source}"
    );
    // One registration, not one per overload.
    assert_eq!(source.matches("PyPlaceObj = ").count(), 1, "{source}");
}

#[test]
fn keyword_groups_enumerate_candidates_and_optional_subsets() {
    let (_, source) = generate(
        "MPyModule(demo)\n\
         MPyFunction(FuncAllowKwargs)\n\
         void Spawn(int kind, float x = 0.0f, float y = 0.0f);\n",
    );
    assert!(
        source.contains("MP_OBJ_FUN_MAKE_SIG(1, MP_OBJ_FUN_ARGS_MAX, true)"),
        "{source}"
    );
    // Two optionals yield subset candidates of size one and two.
    assert!(source.contains("kwargs_used == 1"), "{source}");
    assert!(source.contains("kwargs_used == 2"), "{source}");
    // Optionals relax the positional count to a lower bound; the
    // most-positional candidate is still tried before the keyword-only one.
    let positional = source.find("n_args >= 1").expect("positional candidate");
    let keyword_only = source.find("n_args >= 0").expect("keyword-only candidate");
    assert!(positional < keyword_only, "{source}");
}

#[test]
fn derived_method_forwards_to_keyword_base_without_widening() {
    let (_, source) = generate(
        "MPyModule(demo)\n\
         MPyClass(TypeNonTransient)\n\
         class Base {\n\
             MPyFunction(FuncAllowKwargs)\n\
             void Update(float dt);\n\
         };\n\
         MPyClass(TypeNonTransient)\n\
         class Derived : public Base {\n\
             MPyFunction()\n\
             void Update(float dt);\n\
         };\n",
    );
    // The derived entry stays positional and hands the base a null
    // keyword map.
    assert!(
        source.contains("PyBaseUpdateImpl(n_args, args, nullptr)"),
        "{source}"
    );
    assert!(source.contains("PyDerivedUpdateObj"), "{source}");
    let derived_obj = source
        .find("PyDerivedUpdateObj = ")
        .expect("derived registration");
    let derived_sig = &source[derived_obj..source.len().min(derived_obj + 200)];
    assert!(derived_sig.contains("false"), "{derived_sig}");
}

#[test]
fn dotted_modules_synthesize_ancestors_and_order_children_first() {
    let (header, source) = generate(
        "MPyModule(a.b)\n\
         MPyFunction()\n\
         void One();\n\
         MPyModule(a.b.c)\n\
         MPyFunction()\n\
         void Two();\n",
    );
    // The synthesized root is only forward-declared.
    assert!(
        source.contains("extern const mp_obj_module_t PyAUserModule;"),
        "{source}"
    );
    assert!(!source.contains("PyAModuleGlobalsTable"), "{source}");
    // The leaf registers with its last segment and lands in the parent
    // table; definitions run children before parents.
    assert!(
        source.contains("MP_REGISTER_MODULE(MP_QSTR_c, PyABCUserModule)"),
        "{source}"
    );
    assert!(
        source.contains("{MP_ROM_QSTR(MP_QSTR_c), MP_ROM_PTR(&PyABCUserModule)}"),
        "{source}"
    );
    let leaf = source
        .find("const mp_obj_module_t PyABCUserModule =")
        .expect("leaf definition");
    let parent = source
        .find("const mp_obj_module_t PyABUserModule =")
        .expect("parent definition");
    assert!(leaf < parent, "{source}");
    // The header forward-declares both defined modules.
    assert!(
        header.contains("extern const mp_obj_module_t PyABUserModule;"),
        "{header}"
    );
    assert!(
        header.contains("extern const mp_obj_module_t PyABCUserModule;"),
        "{header}"
    );
}

#[test]
fn export_public_moves_declarations_into_the_header() {
    let (header, source) = generate(
        "MPyModule(demo)\n\
         MPyClass(TypeNonTransient, ExportPublic)\n\
         class Vec2 {\n\
             MPyProperty()\n\
             float x;\n\
         };\n",
    );
    assert!(header.contains("MpyObjectType<Vec2&>"), "{header}");
    assert!(
        header.contains("MpyTypeMap<MpyBind::CleanBaseType<Vec2&>>"),
        "{header}"
    );
    // The slot table still lives in the source, but the declaration and
    // converter appear only once, in the header.
    assert!(!source.contains("MpyObjectType<Vec2&>"), "{source}");
    assert!(source.contains("PyVec2::PyType"), "{source}");
}

#[test]
fn free_functions_without_a_module_land_in_the_default_module() {
    let (_, source) = generate(
        "MPyFunction()\n\
         void Reset();\n",
    );
    assert!(
        source.contains("MP_REGISTER_MODULE(MP_QSTR_main, PyMainUserModule)"),
        "{source}"
    );
    assert!(
        source.contains("{MP_ROM_QSTR(MP_QSTR_reset), MP_ROM_PTR(&PyResetObj)}"),
        "{source}"
    );
}

//! MicroPython binding generator for annotation-tagged C++ declarations.
//!
//! The pipeline runs in four stages: the scanner extracts tagged
//! declarations into [`model::Component`]s, the resolver qualifies type
//! references and rewrites include paths, the validator checks the model
//! against the known-type catalog, and the generator emits one
//! `.cpp`/`.h` pair of MicroPython glue per configuration file.

pub mod cli;
pub mod codegen;
pub mod config;
pub mod model;
pub mod resolve;
pub mod scanner;
pub mod utils;
pub mod validate;
pub mod version;

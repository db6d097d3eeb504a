//! Offline code generator for table-driven EXI codecs (ISO 15118 / DIN
//! 70121 Vehicle-to-Grid message schemas).
//!
//! Consumes XSD schemas and produces the canonical element/particle model
//! ([`model`], built by [`analyzer`]), per-type EXI grammar tables
//! ([`grammar`]), field layout plans ([`layout`]), a dependency-sorted
//! emission order ([`order`]), and the language-neutral descriptors a
//! downstream renderer would turn into source files ([`emit`]). Rendering
//! those descriptors into `.rs`/`.c`/whatever text is out of scope.

pub mod analyzer;
pub mod config;
pub mod emit;
pub mod error;
pub mod grammar;
pub mod layout;
pub mod model;
pub mod order;
pub mod xsd;

pub use analyzer::analyze;
pub use config::Config;
pub use emit::{describe_all, describe_type, emitted_field_name, TypeDescriptor};
pub use error::GeneratorError;
pub use grammar::{build_grammar_table, GrammarTable};
pub use model::AnalyzerData;
pub use order::topological_sort;
pub use xsd::parse_xsd;

//! Error kinds for the generator pipeline.
//!
//! `ConfigError` and `EmitError` are meant to terminate the whole run;
//! `SchemaError` and `GrammarError` terminate generation of the offending
//! file but let the driver continue with the next `FileSpec`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("config entry '{entry}' references unknown schema '{schema}'")]
    UnknownSchema { entry: String, schema: String },
    #[error("schema path is unreadable: {0}")]
    UnreadableSchema(String),
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read or parse XSD: {0}")]
    ParseFailure(String),
    #[error("unsupported XSD construct '{construct}' on '{context}'")]
    UnsupportedConstruct { construct: String, context: String },
    #[error("traversal depth exceeded {limit} levels at '{context}'")]
    DepthExceeded { limit: u32, context: String },
    #[error("unresolvable substitution group for abstract element '{0}'")]
    UnresolvableSubstitution(String),
    #[error("particle '{particle}' in '{element}' has unbounded maxOccurs with no occurrence-limit entry and no safe default")]
    UnresolvableOccurrence { element: String, particle: String },
    #[error("'{0}' referenced but never declared in the schema")]
    UndeclaredType(String),
}

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("grammar invariant violated for type '{type_name}': {detail}")]
    InvariantViolation { type_name: String, detail: String },
    #[error("dependency cycle detected involving type '{0}'")]
    Cycle(String),
    #[error("next-grammar pointer for '{particle}' in '{type_name}' does not resolve to any grammar in that type")]
    DanglingNextGrammar { type_name: String, particle: String },
    #[error("maxOccurs >= 25 ('{particle}' in '{type_name}') requires LOOP grammars, which are not implemented")]
    LoopNotImplemented { type_name: String, particle: String },
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("unknown emission descriptor requested for type '{0}'")]
    UnknownType(String),
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Emit(#[from] EmitError),
}

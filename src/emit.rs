//! Language-neutral descriptors handed to whatever downstream renders source
//! files. This module stops at "what to emit" — templating a descriptor into
//! `.c`/`.h`/`.rs` text is out of scope; a descriptor is the furthest this
//! crate goes.

use std::collections::HashMap;

use heck::{ToShoutySnakeCase, ToSnakeCase, ToUpperCamelCase};

use crate::config::Config;
use crate::error::{EmitError, GeneratorError};
use crate::grammar::{build_grammar_table, GrammarTable};
use crate::layout::{plan_type, TypeLayout};
use crate::model::{ElementData, IntegerBaseType, IntegerFacet, TypeDefinition};

/// The built-in value kinds the runtime codec is expected to support
/// natively — everything else is a generated struct/enum built out of
/// these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    EnumIndex,
    String,
    AnyUri,
    Base64Binary,
    HexBinary,
    DateTime,
    Duration,
    Decimal,
}

/// Maps a particle's resolved base type (and, for integers, its derived
/// facet) onto the built-in kind the codec layer encodes/decodes with.
pub fn builtin_kind_for(base_type: &str, integer_facet: Option<&IntegerFacet>) -> Option<BuiltinKind> {
    if let Some(facet) = integer_facet {
        return Some(match facet.base_type {
            IntegerBaseType::Int8 => BuiltinKind::Int8,
            IntegerBaseType::Int16 => BuiltinKind::Int16,
            IntegerBaseType::Int32 => BuiltinKind::Int32,
            IntegerBaseType::Int64 => BuiltinKind::Int64,
            IntegerBaseType::Uint8 => BuiltinKind::Uint8,
            IntegerBaseType::Uint16 => BuiltinKind::Uint16,
            IntegerBaseType::Uint32 => BuiltinKind::Uint32,
            IntegerBaseType::Uint64 => BuiltinKind::Uint64,
            IntegerBaseType::Boolean => BuiltinKind::Boolean,
        });
    }
    match base_type {
        "boolean" => Some(BuiltinKind::Boolean),
        "string" | "token" | "NCName" | "ID" => Some(BuiltinKind::String),
        "anyURI" => Some(BuiltinKind::AnyUri),
        "base64Binary" => Some(BuiltinKind::Base64Binary),
        "hexBinary" => Some(BuiltinKind::HexBinary),
        "dateTime" | "date" | "time" => Some(BuiltinKind::DateTime),
        "duration" => Some(BuiltinKind::Duration),
        "decimal" | "float" | "double" => Some(BuiltinKind::Decimal),
        "byte" => Some(BuiltinKind::Int8),
        "unsignedByte" => Some(BuiltinKind::Uint8),
        "short" => Some(BuiltinKind::Int16),
        "unsignedShort" => Some(BuiltinKind::Uint16),
        "int" | "integer" => Some(BuiltinKind::Int32),
        "unsignedInt" => Some(BuiltinKind::Uint32),
        "long" => Some(BuiltinKind::Int64),
        "unsignedLong" => Some(BuiltinKind::Uint64),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeShape {
    /// A generated struct: fields from [`TypeLayout`], productions from
    /// [`GrammarTable`].
    Struct,
    /// A generated enum: one variant per entry of `ElementData::enum_list`.
    Enum,
}

/// Everything a downstream renderer needs to emit one generated type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub type_name: String,
    /// `type_name` cased for a target-language type identifier
    /// (`UpperCamelCase`), so a template renderer never has to re-derive
    /// identifier casing from the schema's own naming conventions.
    pub emitted_type_name: String,
    pub shape: TypeShape,
    pub enum_variants: Vec<String>,
    /// `enum_variants`, each paired with its `SHOUTY_SNAKE_CASE` constant
    /// name (the form a generated C/Rust enum discriminant would use).
    pub emitted_enum_variants: Vec<(String, String)>,
    pub layout: TypeLayout,
    pub grammar: GrammarTable,
}

/// Build the emission descriptor for one analyzed type.
pub fn describe_type(data: &ElementData, config: &Config) -> Result<TypeDescriptor, GeneratorError> {
    let grammar = build_grammar_table(data)?;
    let layout = plan_type(data, config);
    let shape = match data.type_definition {
        TypeDefinition::Enum => TypeShape::Enum,
        TypeDefinition::Simple | TypeDefinition::Complex => TypeShape::Struct,
    };
    let emitted_enum_variants = data
        .enum_list
        .iter()
        .map(|v| (v.clone(), v.to_shouty_snake_case()))
        .collect();
    Ok(TypeDescriptor {
        type_name: data.name.clone(),
        emitted_type_name: data.name.to_upper_camel_case(),
        shape,
        enum_variants: data.enum_list.clone(),
        emitted_enum_variants,
        layout,
        grammar,
    })
}

/// Cases a particle/field name into the `snake_case` identifier a
/// generated struct field would use. Layout planning decides the field's
/// *shape*; this decides its *name*.
pub fn emitted_field_name(name: &str) -> String {
    name.to_snake_case()
}

/// Describe every type in dependency order. Per-type errors are the
/// caller's to log and skip — a `SchemaError`/`GrammarError` on one type
/// should not stop the rest of the schema from being processed.
pub fn describe_all(
    elements: &[ElementData],
    config: &Config,
) -> Vec<Result<TypeDescriptor, GeneratorError>> {
    elements.iter().map(|e| describe_type(e, config)).collect()
}

/// Bookkeeping for the `add_debug_code` option: tracks which generated
/// functions a downstream renderer should wrap with tracing/diagnostic
/// hooks, keyed by type name.
#[derive(Debug, Clone, Default)]
pub struct DebugCodeRegistry {
    hooks: HashMap<String, Vec<String>>,
}

impl DebugCodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_hook(&mut self, type_name: &str, hook: impl Into<String>) {
        self.hooks
            .entry(type_name.to_string())
            .or_default()
            .push(hook.into());
    }

    pub fn hooks_for(&self, type_name: &str) -> &[String] {
        self.hooks.get(type_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Populate the registry from a descriptor list when `add_debug_code`
    /// is enabled: encode/decode entry points of every struct type get a
    /// trace hook.
    pub fn from_descriptors(descriptors: &[TypeDescriptor], enabled: bool) -> Self {
        let mut registry = Self::new();
        if !enabled {
            return registry;
        }
        for descriptor in descriptors {
            if descriptor.shape == TypeShape::Struct {
                registry.register_hook(&descriptor.type_name, "encode");
                registry.register_hook(&descriptor.type_name, "decode");
            }
        }
        registry
    }
}

/// Resolves a type name to its descriptor, erroring the way a renderer
/// would if it asked for something the analyzer never produced.
pub fn find_descriptor<'a>(
    descriptors: &'a [TypeDescriptor],
    type_name: &str,
) -> Result<&'a TypeDescriptor, EmitError> {
    descriptors
        .iter()
        .find(|d| d.type_name == type_name)
        .ok_or_else(|| EmitError::UnknownType(type_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElementData, IntegerFacet, Particle};

    #[test]
    fn builtin_kind_resolves_integer_facet_first() {
        let facet = IntegerFacet::from_range(0, 255);
        assert_eq!(builtin_kind_for("int", Some(&facet)), Some(BuiltinKind::Uint8));
    }

    #[test]
    fn builtin_kind_falls_back_to_base_type() {
        assert_eq!(builtin_kind_for("string", None), Some(BuiltinKind::String));
        assert_eq!(builtin_kind_for("hexBinary", None), Some(BuiltinKind::HexBinary));
    }

    #[test]
    fn describe_type_produces_matching_layout_and_grammar() {
        let mut data = ElementData::new("T");
        data.particles.push(Particle::new("A"));
        let descriptor = describe_type(&data, &Config::default()).unwrap();
        assert_eq!(descriptor.layout.fields.len(), 1);
        // A's grammar, the trailing END grammar, the trailing ERROR grammar.
        assert_eq!(descriptor.grammar.grammars.len(), 3);
    }

    #[test]
    fn describe_type_cases_identifiers_for_emission() {
        let mut data = ElementData::new("SalesTariffEntryType");
        data.enum_list = vec!["chargeNotAllowed".to_string(), "chargeAllowed".to_string()];
        let descriptor = describe_type(&data, &Config::default()).unwrap();
        assert_eq!(descriptor.emitted_type_name, "SalesTariffEntryType");
        assert_eq!(
            descriptor.emitted_enum_variants,
            vec![
                ("chargeNotAllowed".to_string(), "CHARGE_NOT_ALLOWED".to_string()),
                ("chargeAllowed".to_string(), "CHARGE_ALLOWED".to_string()),
            ]
        );
        assert_eq!(emitted_field_name("SalesTariffEntry"), "sales_tariff_entry");
    }

    #[test]
    fn debug_registry_empty_when_disabled() {
        let mut data = ElementData::new("T");
        data.particles.push(Particle::new("A"));
        let descriptor = describe_type(&data, &Config::default()).unwrap();
        let registry = DebugCodeRegistry::from_descriptors(&[descriptor], false);
        assert!(registry.hooks_for("T").is_empty());
    }
}

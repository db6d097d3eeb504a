//! Canonical element/particle model: particles, the complex/enum types that
//! own them, choice groups, and the full per-schema analysis result.
//!
//! Particles are owned by their containing `ElementData`; cross-type
//! references are by qualified name, never by pointer, so this module has
//! no lifetime parameters tying one type's data to another's.

use std::collections::HashMap;

/// A single XSD element occurrence inside a complex type.
#[derive(Debug, Clone)]
pub struct Particle {
    pub name: String,
    /// Fully qualified type name, e.g. `{urn:iso:...}SalesTariffEntryType`.
    pub type_name: String,
    pub type_short: String,
    pub base_type: String,
    pub min_occurs: u32,
    pub max_occurs: u32,
    pub min_occurs_old: Option<u32>,
    pub max_occurs_old: Option<u32>,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,

    pub is_attribute: bool,
    pub is_complex: bool,
    pub is_enum: bool,
    pub is_substitute: bool,
    pub is_simple_content: bool,
    pub is_any: bool,
    pub abstract_element: bool,
    pub abstract_type: bool,
    pub max_occurs_changed: bool,

    pub integer_facet: Option<IntegerFacet>,

    pub parent_has_sequence: bool,
    pub parent_sequence: Vec<String>,
    pub parent_has_choice_sequence: bool,
    /// 1-based index of the member's position within a choice-of-sequences group.
    pub parent_choice_sequence_number: Option<u32>,
}

impl Particle {
    pub fn new(name: impl Into<String>) -> Particle {
        Particle {
            name: name.into(),
            type_name: String::new(),
            type_short: String::new(),
            base_type: String::new(),
            min_occurs: 1,
            max_occurs: 1,
            min_occurs_old: None,
            max_occurs_old: None,
            min_length: None,
            max_length: None,
            min_value: None,
            max_value: None,
            is_attribute: false,
            is_complex: false,
            is_enum: false,
            is_substitute: false,
            is_simple_content: false,
            is_any: false,
            abstract_element: false,
            abstract_type: false,
            max_occurs_changed: false,
            integer_facet: None,
            parent_has_sequence: false,
            parent_sequence: Vec::new(),
            parent_has_choice_sequence: false,
            parent_choice_sequence_number: None,
        }
    }

    /// `max_occurs > 1` marks an array.
    pub fn is_array(&self) -> bool {
        self.max_occurs > 1
    }

    pub fn is_optional(&self) -> bool {
        self.min_occurs == 0
    }

    /// `ceil(log2(range))`, `1` for boolean, `0` when unbounded/irrelevant.
    pub fn bit_count_for_coding(&self, enum_cardinality: Option<u32>) -> u32 {
        if self.type_short == "boolean" {
            return 1;
        }
        let mut num_values = if self.is_enum {
            enum_cardinality.unwrap_or(0)
        } else {
            match (self.min_value, self.max_value) {
                (Some(min), Some(max)) if max >= min => (max - min + 1) as u32,
                _ => return 0,
            }
        };
        if num_values == 0 {
            return 0;
        }
        num_values -= 1;
        let mut bits = 0;
        while num_values != 0 {
            num_values >>= 1;
            bits += 1;
        }
        bits
    }

    /// Storage category used for field naming (`array`, `characters`, `bytes`).
    pub fn value_parameter_name(&self) -> ValueParameter {
        if self.is_array() {
            return if self.is_enum {
                ValueParameter::Array
            } else {
                match self.base_type.as_str() {
                    "string" => ValueParameter::Characters,
                    "base64Binary" | "hexBinary" => ValueParameter::Bytes,
                    _ => ValueParameter::Array,
                }
            };
        }
        match self.base_type.as_str() {
            "base64Binary" | "hexBinary" => ValueParameter::Bytes,
            _ => ValueParameter::Characters,
        }
    }

    /// `#define`-style symbol for the bounded array capacity, unique per
    /// `(type_short, max_occurs)`, so no two differently-capped arrays collide.
    pub fn array_define_symbol(&self, addendum: &str) -> Option<String> {
        if !self.is_array() {
            return None;
        }
        Some(format!("{}_{}{}", self.type_short, self.max_occurs, addendum))
    }

    pub fn char_define_symbol(&self, addendum: &str) -> Option<String> {
        match self.base_type.as_str() {
            "string" | "anyURI" | "ID" | "NCName" => Some(format!("{}{}", self.name, addendum)),
            _ => None,
        }
    }

    pub fn byte_define_symbol(&self, addendum: &str) -> Option<String> {
        match self.base_type.as_str() {
            "base64Binary" | "hexBinary" => Some(format!("{}{}", self.type_short, addendum)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueParameter {
    Array,
    Characters,
    Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerBaseType {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Boolean,
}

/// Derived integer coding facets: bit width, signedness, and whether the
/// range is narrow enough for range-shifted n-bit EXI coding.
#[derive(Debug, Clone, Copy)]
pub struct IntegerFacet {
    pub min: i64,
    pub max: i64,
    pub bit_size: u8,
    pub base_type: IntegerBaseType,
    pub is_unsigned: bool,
    /// `range <= 4096`: enables range-shifted n-bit EXI coding.
    pub is_restricted: bool,
}

impl IntegerFacet {
    pub fn from_range(min: i64, max: i64) -> IntegerFacet {
        let range = (max - min + 1) as i128;
        let bit_size: u8 = if range <= (1 << 8) {
            8
        } else if range <= (1 << 16) {
            16
        } else if range <= (1 << 32) {
            32
        } else {
            64
        };
        let is_unsigned = min >= 0;
        let base_type = match (bit_size, is_unsigned) {
            (8, true) => IntegerBaseType::Uint8,
            (8, false) => IntegerBaseType::Int8,
            (16, true) => IntegerBaseType::Uint16,
            (16, false) => IntegerBaseType::Int16,
            (32, true) => IntegerBaseType::Uint32,
            (32, false) => IntegerBaseType::Int32,
            (64, true) => IntegerBaseType::Uint64,
            (64, false) => IntegerBaseType::Int64,
            _ => unreachable!(),
        };
        IntegerFacet {
            min,
            max,
            bit_size,
            base_type,
            is_unsigned,
            is_restricted: range <= 4096,
        }
    }
}

/// XSD alternation: `choice` or `choice`-of-`sequence`.
#[derive(Debug, Clone, Default)]
pub struct Choice {
    /// `(particle name, particle index in the containing element)`.
    pub choice_items: Vec<(String, usize)>,
    /// Present when the alternatives are themselves sequences.
    pub choice_sequences: Vec<Vec<(String, usize)>>,
    pub min_occurs: u32,
    pub multi_choice_max: u32,
    pub is_multi_choice: bool,
}

impl Choice {
    pub fn choice_item_count(&self) -> usize {
        self.choice_items.len()
    }

    pub fn choice_sequence_count(&self) -> usize {
        self.choice_sequences.len()
    }
}

/// An abstract particle merged with its concrete realizations:
/// `(names, min_occurs, max_occurs)`.
#[derive(Debug, Clone)]
pub struct AbstractSequence {
    pub names: Vec<String>,
    pub min_occurs: u32,
    pub max_occurs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDefinition {
    Simple,
    Complex,
    Enum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Empty,
    Simple,
    ElementOnly,
    Mixed,
}

/// A complex or enum type to be emitted.
#[derive(Debug, Clone)]
pub struct ElementData {
    /// Fully qualified type name.
    pub name: String,
    pub name_short: String,
    pub type_name: String,
    pub base_type: String,
    pub type_definition: TypeDefinition,
    pub content_type: ContentType,
    pub abstract_element: bool,
    pub abstract_type: bool,
    pub particles: Vec<Particle>,
    pub has_choice: bool,
    pub choices: Vec<Choice>,
    pub has_abstract_sequence: bool,
    pub abstract_sequences: Vec<AbstractSequence>,
    pub is_in_namespace_elements: bool,
    pub enum_list: Vec<String>,
    /// Populated by the Grammar Builder: `particle_index -> grammar_id`.
    pub particles_next_grammar_ids: HashMap<usize, u32>,
    /// Nesting level from the traversal root, used for dependency ordering.
    pub level: i32,
    /// Insertion order counter, used to break level ties.
    pub count: i32,
}

impl ElementData {
    pub fn new(name: impl Into<String>) -> ElementData {
        let name = name.into();
        ElementData {
            name_short: name.clone(),
            name,
            type_name: String::new(),
            base_type: String::new(),
            type_definition: TypeDefinition::Complex,
            content_type: ContentType::ElementOnly,
            abstract_element: false,
            abstract_type: false,
            particles: Vec::new(),
            has_choice: false,
            choices: Vec::new(),
            has_abstract_sequence: false,
            abstract_sequences: Vec::new(),
            is_in_namespace_elements: false,
            enum_list: Vec::new(),
            particles_next_grammar_ids: HashMap::new(),
            level: 0,
            count: 0,
        }
    }

    pub fn particle_from_name(&self, name: &str) -> Option<&Particle> {
        self.particles.iter().find(|p| p.name == name)
    }

    pub fn particle_index(&self, name: &str) -> Option<usize> {
        self.particles.iter().position(|p| p.name == name)
    }
}

/// The full result of one schema analysis.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerData {
    pub root_elements: Vec<String>,
    /// Dependency-sorted: every complex particle's target type precedes
    /// the type that references it.
    pub generate_elements: Vec<ElementData>,
    pub known_elements: HashMap<String, String>,
    pub known_particles: HashMap<String, String>,
    pub known_enums: HashMap<String, String>,
    pub known_prototypes: HashMap<String, String>,
    pub max_occurs_changed: HashMap<String, u32>,
    /// Namespace name -> alphabetically sorted top-level element type names.
    pub namespace_elements: indexmap::IndexMap<String, Vec<String>>,
    pub schema_builtin_types: HashMap<String, String>,
}

impl AnalyzerData {
    pub fn element_by_short_name(&self, name: &str) -> Option<&ElementData> {
        self.generate_elements.iter().find(|e| e.name_short == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_count_for_boolean_is_one() {
        let mut p = Particle::new("flag");
        p.type_short = "boolean".to_string();
        assert_eq!(p.bit_count_for_coding(None), 1);
    }

    #[test]
    fn bit_count_for_range_is_ceil_log2() {
        let mut p = Particle::new("x");
        p.min_value = Some(0);
        p.max_value = Some(3);
        assert_eq!(p.bit_count_for_coding(None), 2);

        p.max_value = Some(4);
        assert_eq!(p.bit_count_for_coding(None), 3);
    }

    #[test]
    fn bit_count_for_enum_uses_cardinality() {
        let mut p = Particle::new("e");
        p.is_enum = true;
        assert_eq!(p.bit_count_for_coding(Some(5)), 3);
    }

    #[test]
    fn integer_facet_picks_smallest_width() {
        let facet = IntegerFacet::from_range(0, 255);
        assert_eq!(facet.bit_size, 8);
        assert!(facet.is_unsigned);
        assert!(facet.is_restricted);

        let facet = IntegerFacet::from_range(-100, 100);
        assert_eq!(facet.bit_size, 8);
        assert!(!facet.is_unsigned);

        let facet = IntegerFacet::from_range(0, 100_000);
        assert_eq!(facet.bit_size, 32);
        assert!(!facet.is_restricted);
    }

    #[test]
    fn array_define_symbol_unique_per_max_occurs() {
        let mut a = Particle::new("xs");
        a.type_short = "unsignedShort".to_string();
        a.max_occurs = 3;
        let mut b = a.clone();
        b.max_occurs = 5;
        assert_ne!(
            a.array_define_symbol("_ARRAY_SIZE"),
            b.array_define_symbol("_ARRAY_SIZE")
        );
    }
}

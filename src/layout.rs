//! Maps each particle of an [`ElementData`] onto the storage shape its
//! generated field will need — bounded array with a length counter,
//! optional scalar with a presence flag, and so on. Computed once per type
//! as a [`TypeLayout`] and handed to every later consumer, rather than
//! re-derived ad hoc wherever a field is read or written.

use crate::config::Config;
use crate::model::{ElementData, Particle, ValueParameter};

/// How one field's storage is shaped in the generated type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLayout {
    /// Fixed-capacity array of an enum-coded value; capacity is a compile
    /// time constant, so only a length counter is needed.
    ArrayOfEnum { capacity: u32, length_field: String },
    /// Fixed-capacity array of strings, each itself length-bounded.
    ArrayOfString {
        capacity: u32,
        max_len: u32,
        length_field: String,
        used_field: String,
    },
    /// Fixed-capacity array of byte strings (`base64Binary`/`hexBinary`).
    ArrayOfBytes {
        capacity: u32,
        max_len: u32,
        length_field: String,
        used_field: String,
    },
    /// Fixed-capacity array of nested structs.
    ArrayOfStruct { capacity: u32, length_field: String },
    /// `minOccurs=0` scalar or enum: a value plus a presence flag.
    OptionalScalar { used_field: String },
    /// `minOccurs=0` complex particle: a nested struct plus a presence flag.
    OptionalComplex { used_field: String },
    /// Mandatory bounded string.
    MandatoryString { max_len: u32, length_field: String },
    /// Mandatory bounded byte string.
    MandatoryBytes { max_len: u32, length_field: String },
    /// Mandatory scalar or enum with no presence bookkeeping.
    PlainScalar,
    /// Mandatory nested struct with no presence bookkeeping.
    PlainComplex,
    /// A substitution-group head: one of several concrete element types,
    /// tagged by which one is present.
    TaggedUnion { variants: Vec<String>, used_field: String },
    /// A `choice` (or choice-of-sequences) group: exactly one member or
    /// sequence of members is present at a time.
    ChoiceUnion { variants: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct FieldPlan {
    pub particle_index: usize,
    pub name: String,
    pub layout: FieldLayout,
}

#[derive(Debug, Clone)]
pub struct TypeLayout {
    pub type_name: String,
    pub fields: Vec<FieldPlan>,
}

/// Plan every particle of `data`, applying the configured field-suppression
/// list (`field_optimizations`) before emitting a layout for it.
pub fn plan_type(data: &ElementData, config: &Config) -> TypeLayout {
    let mut fields = Vec::new();

    let mut covered_by_group = vec![false; data.particles.len()];
    for seq in &data.abstract_sequences {
        for (index, particle) in data.particles.iter().enumerate() {
            if seq.names.contains(&particle.name) {
                covered_by_group[index] = true;
            }
        }
    }
    for choice in &data.choices {
        for &(_, index) in &choice.choice_items {
            covered_by_group[index] = true;
        }
    }

    for seq in &data.abstract_sequences {
        fields.push(FieldPlan {
            particle_index: data
                .particles
                .iter()
                .position(|p| seq.names.contains(&p.name))
                .unwrap_or(0),
            name: group_field_name(&seq.names),
            layout: FieldLayout::TaggedUnion {
                variants: seq.names.clone(),
                used_field: format!("{}_used", group_field_name(&seq.names)),
            },
        });
    }

    for choice in &data.choices {
        let variants: Vec<String> = choice
            .choice_items
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        let first_index = choice.choice_items.first().map(|(_, i)| *i).unwrap_or(0);
        fields.push(FieldPlan {
            particle_index: first_index,
            name: group_field_name(&variants),
            layout: FieldLayout::ChoiceUnion { variants },
        });
    }

    for (index, particle) in data.particles.iter().enumerate() {
        if covered_by_group[index] || particle.is_any {
            continue;
        }
        if config.field_is_suppressed(&particle.name, &data.name) {
            continue;
        }
        fields.push(FieldPlan {
            particle_index: index,
            name: particle.name.clone(),
            layout: plan_particle(particle),
        });
    }

    TypeLayout {
        type_name: data.name.clone(),
        fields,
    }
}

fn plan_particle(particle: &Particle) -> FieldLayout {
    let length_field = format!("{}_length", particle.name);
    let used_field = format!("{}_used", particle.name);

    if particle.is_array() {
        // `particle.max_occurs` already reflects the configured array cap
        // (applied during analysis, so the grammar builder's repetition
        // count matches it); re-deriving it here would just be the same
        // value.
        let capacity = particle.max_occurs;
        return match particle.value_parameter_name() {
            ValueParameter::Characters if particle.is_complex => {
                FieldLayout::ArrayOfStruct { capacity, length_field }
            }
            ValueParameter::Characters if particle.is_enum => {
                FieldLayout::ArrayOfEnum { capacity, length_field }
            }
            ValueParameter::Characters => FieldLayout::ArrayOfString {
                capacity,
                max_len: particle.max_length.unwrap_or(0),
                length_field,
                used_field,
            },
            ValueParameter::Bytes => FieldLayout::ArrayOfBytes {
                capacity,
                max_len: particle.max_length.unwrap_or(0),
                length_field,
                used_field,
            },
            ValueParameter::Array if particle.is_complex => {
                FieldLayout::ArrayOfStruct { capacity, length_field }
            }
            ValueParameter::Array => FieldLayout::ArrayOfEnum { capacity, length_field },
        };
    }

    if particle.is_optional() {
        return if particle.is_complex {
            FieldLayout::OptionalComplex { used_field }
        } else {
            FieldLayout::OptionalScalar { used_field }
        };
    }

    match particle.base_type.as_str() {
        "string" | "anyURI" | "ID" | "NCName" | "token" => FieldLayout::MandatoryString {
            max_len: particle.max_length.unwrap_or(0),
            length_field,
        },
        "base64Binary" | "hexBinary" => FieldLayout::MandatoryBytes {
            max_len: particle.max_length.unwrap_or(0),
            length_field,
        },
        _ if particle.is_complex => FieldLayout::PlainComplex,
        _ => FieldLayout::PlainScalar,
    }
}

fn group_field_name(names: &[String]) -> String {
    names.first().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ElementData;

    #[test]
    fn optional_scalar_gets_used_flag() {
        let mut data = ElementData::new("T");
        let mut p = Particle::new("Value");
        p.min_occurs = 0;
        p.max_occurs = 1;
        data.particles.push(p);
        let layout = plan_type(&data, &Config::default());
        assert!(matches!(
            layout.fields[0].layout,
            FieldLayout::OptionalScalar { .. }
        ));
    }

    #[test]
    fn mandatory_string_gets_length_field() {
        let mut data = ElementData::new("T");
        let mut p = Particle::new("Name");
        p.base_type = "string".to_string();
        p.max_length = Some(32);
        data.particles.push(p);
        let layout = plan_type(&data, &Config::default());
        match &layout.fields[0].layout {
            FieldLayout::MandatoryString { max_len, .. } => assert_eq!(*max_len, 32),
            other => panic!("unexpected layout: {:?}", other),
        }
    }

    #[test]
    fn array_of_bytes_carries_capacity_and_used_flag() {
        let mut data = ElementData::new("T");
        let mut p = Particle::new("Chunks");
        p.base_type = "hexBinary".to_string();
        p.max_occurs = 4;
        p.max_length = Some(8);
        data.particles.push(p);
        let layout = plan_type(&data, &Config::default());
        match &layout.fields[0].layout {
            FieldLayout::ArrayOfBytes { capacity, max_len, .. } => {
                assert_eq!(*capacity, 4);
                assert_eq!(*max_len, 8);
            }
            other => panic!("unexpected layout: {:?}", other),
        }
    }

    #[test]
    fn field_optimization_suppresses_particle() {
        let mut data = ElementData::new("T");
        data.particles.push(Particle::new("Debug"));
        let mut config = Config::default();
        config
            .field_optimizations
            .insert("Debug".to_string(), vec!["T".to_string()]);
        let layout = plan_type(&data, &config);
        assert!(layout.fields.is_empty());
    }
}

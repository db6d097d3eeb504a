//! Turns a raw [`XsdSchema`] into the canonical [`AnalyzerData`] model the
//! grammar builder consumes.
//!
//! Mirrors the traversal shape of `SchemaAnalyzer.py`'s `_create_elements`
//! recursion, but resolves cross-type references by name instead of walking
//! a live object graph, and reports exhaustion as a typed `SchemaError`
//! instead of letting Python's recursion limit fire.

use std::collections::HashMap;

use tracing::{debug, info_span};

use crate::config::Config;
use crate::error::SchemaError;
use crate::model::{
    AbstractSequence, AnalyzerData, Choice, ContentType, ElementData, IntegerFacet, Particle,
    TypeDefinition,
};
use crate::xsd::{XsdComplexType, XsdContent, XsdParticle, XsdSchema, XsdSimpleType};

/// XSD builtin atomic types that need no further type-lookup: their
/// `base_type`/`type_short` is the leaf particle's own name.
const BUILTIN_TYPES: &[&str] = &[
    "string", "boolean", "float", "double", "decimal", "duration", "dateTime", "time", "date",
    "anyURI", "ID", "NCName", "base64Binary", "hexBinary", "byte", "unsignedByte", "short",
    "unsignedShort", "int", "unsignedInt", "long", "unsignedLong", "integer", "token",
];

struct AnalyzerCtx<'a> {
    schema: &'a XsdSchema,
    config: &'a Config,
    depth_limit: u32,
    elements: Vec<ElementData>,
    known_elements: HashMap<String, String>,
    known_particles: HashMap<String, String>,
    known_enums: HashMap<String, String>,
    known_prototypes: HashMap<String, String>,
    max_occurs_changed: HashMap<String, u32>,
    visiting: Vec<String>,
    count: i32,
}

/// Run the full analysis for one schema file. `prefix` namespaces the
/// generated type names.
pub fn analyze(schema: &XsdSchema, config: &Config) -> Result<AnalyzerData, SchemaError> {
    let span = info_span!("analyze_schema", elements = schema.elements.len());
    let _enter = span.enter();

    let mut ctx = AnalyzerCtx {
        schema,
        config,
        depth_limit: config.depth_limit,
        elements: Vec::new(),
        known_elements: HashMap::new(),
        known_particles: HashMap::new(),
        known_enums: HashMap::new(),
        known_prototypes: HashMap::new(),
        max_occurs_changed: HashMap::new(),
        visiting: Vec::new(),
        count: 0,
    };

    let mut root_elements = Vec::new();
    let mut names: Vec<&String> = schema.elements.keys().collect();
    names.sort();
    for name in names {
        let decl = &schema.elements[name];
        if decl.is_abstract {
            // Abstract roots never appear on the wire themselves; their
            // substitution-group members do.
            continue;
        }
        root_elements.push(name.clone());
        ctx.resolve_element_type(name, 0)?;
    }

    let namespace_elements = apply_namespace_elements(&mut ctx, &root_elements);
    order_by_dependency(&mut ctx.elements);

    Ok(AnalyzerData {
        root_elements,
        generate_elements: ctx.elements,
        known_elements: ctx.known_elements,
        known_particles: ctx.known_particles,
        known_enums: ctx.known_enums,
        known_prototypes: ctx.known_prototypes,
        max_occurs_changed: ctx.max_occurs_changed,
        namespace_elements,
        schema_builtin_types: BUILTIN_TYPES
            .iter()
            .map(|t| (t.to_string(), t.to_string()))
            .collect(),
    })
}

impl<'a> AnalyzerCtx<'a> {
    /// Resolve the type backing a top-level element declaration, recursing
    /// into complex types. Returns the resolved type's short name.
    fn resolve_element_type(&mut self, elem_name: &str, depth: u32) -> Result<String, SchemaError> {
        let decl = self
            .schema
            .elements
            .get(elem_name)
            .ok_or_else(|| SchemaError::UndeclaredType(elem_name.to_string()))?;

        if let Some(type_name) = &decl.type_name {
            let short = strip_prefix(type_name);
            self.known_elements
                .insert(elem_name.to_string(), short.clone());
            self.resolve_named_type(&short, depth)?;
            Ok(short)
        } else if let Some(ct) = &decl.inline_complex_type {
            self.known_elements
                .insert(elem_name.to_string(), elem_name.to_string());
            self.build_complex_element(elem_name, ct, depth)?;
            Ok(elem_name.to_string())
        } else {
            Err(SchemaError::UndeclaredType(elem_name.to_string()))
        }
    }

    /// Resolve a named type (simple or complex), memoizing against
    /// `known_*` maps so shared types are only analyzed once.
    fn resolve_named_type(&mut self, type_short: &str, depth: u32) -> Result<(), SchemaError> {
        if BUILTIN_TYPES.contains(&type_short) {
            return Ok(());
        }
        if self.known_prototypes.contains_key(type_short) || self.known_enums.contains_key(type_short)
        {
            return Ok(());
        }
        if depth > self.depth_limit {
            return Err(SchemaError::DepthExceeded {
                limit: self.depth_limit,
                context: type_short.to_string(),
            });
        }

        if let Some(simple) = self.schema.simple_types.get(type_short) {
            self.known_prototypes
                .insert(type_short.to_string(), type_short.to_string());
            if let XsdSimpleType::Enum { values, .. } = simple {
                self.known_enums
                    .insert(type_short.to_string(), type_short.to_string());
                let mut data = ElementData::new(type_short.to_string());
                data.type_definition = TypeDefinition::Enum;
                data.content_type = ContentType::Simple;
                data.enum_list = values.clone();
                data.level = depth as i32;
                data.count = self.next_count();
                self.elements.push(data);
            }
            return Ok(());
        }

        if let Some(ct) = self.schema.complex_types.get(type_short).cloned() {
            self.known_prototypes
                .insert(type_short.to_string(), type_short.to_string());
            self.build_complex_element(type_short, &ct, depth)?;
            return Ok(());
        }

        Err(SchemaError::UndeclaredType(type_short.to_string()))
    }

    fn next_count(&mut self) -> i32 {
        self.count += 1;
        self.count
    }

    /// Build an [`ElementData`] for a complex type, recursing through its
    /// content model and normalizing it.
    fn build_complex_element(
        &mut self,
        type_short: &str,
        ct: &XsdComplexType,
        depth: u32,
    ) -> Result<(), SchemaError> {
        if self.visiting.contains(&type_short.to_string()) {
            // Recursive type (a type containing itself, directly or through
            // a chain of refs): cut the cycle, the particle still carries
            // enough information (type_name) for the grammar builder to
            // link back by name.
            return Ok(());
        }
        self.visiting.push(type_short.to_string());

        let mut data = ElementData::new(type_short.to_string());
        data.abstract_type = ct.is_abstract;
        data.level = depth as i32;
        data.count = self.next_count();

        match &ct.content {
            XsdContent::Empty => {
                data.content_type = ContentType::Empty;
            }
            XsdContent::SimpleExtension { base } => {
                data.content_type = ContentType::Simple;
                data.is_in_namespace_elements = false;
                let base_short = strip_prefix(base);
                data.base_type = base_short.clone();
                self.resolve_named_type(&base_short, depth + 1)?;
                let mut p = Particle::new("CONTENT");
                p.type_name = base.clone();
                p.type_short = base_short.clone();
                p.base_type = base_short.clone();
                p.is_simple_content = true;
                data.particles.push(p);
            }
            XsdContent::ComplexExtension { base, model } => {
                let base_short = strip_prefix(base);
                data.base_type = base_short.clone();
                self.resolve_named_type(&base_short, depth + 1)?;
                if let Some(base_ct) = self.schema.complex_types.get(&base_short).cloned() {
                    self.collect_particles(&base_ct.content_model(), &mut data, depth)?;
                }
                if let Some(model) = model {
                    self.collect_particles(model, &mut data, depth)?;
                }
                data.content_type = ContentType::ElementOnly;
            }
            XsdContent::Model(particle) => {
                self.collect_particles(particle, &mut data, depth)?;
                data.content_type = if data.particles.is_empty() {
                    ContentType::Empty
                } else {
                    ContentType::ElementOnly
                };
            }
        }

        self.visiting.pop();
        self.elements.push(data);
        Ok(())
    }

    /// Flatten a sequence/choice content model into `data.particles`,
    /// recursing into type definitions for each element particle and
    /// recording choice groups.
    fn collect_particles(
        &mut self,
        particle: &XsdParticle,
        data: &mut ElementData,
        depth: u32,
    ) -> Result<(), SchemaError> {
        match particle {
            XsdParticle::Sequence(items) | XsdParticle::Choice(items) => {
                let is_choice = matches!(particle, XsdParticle::Choice(_));
                let start_index = data.particles.len();
                // Track which particles are *direct* children of this
                // sequence/choice node (as opposed to ones contributed by a
                // nested sequence/choice/group, which get their own
                // `parent_sequence` from their own recursive call) so
                // `parent_has_sequence`/`parent_sequence` describe the
                // immediately enclosing model only.
                let mut direct_indices = Vec::new();
                let mut contributed_counts = Vec::with_capacity(items.len());
                for item in items {
                    let before = data.particles.len();
                    self.collect_particles(item, data, depth)?;
                    let contributed = data.particles.len() - before;
                    contributed_counts.push(contributed);
                    if matches!(item, XsdParticle::Element(_) | XsdParticle::Any { .. })
                        && contributed == 1
                    {
                        direct_indices.push(before);
                    }
                }
                if !is_choice && !direct_indices.is_empty() {
                    let sibling_names: Vec<String> = direct_indices
                        .iter()
                        .map(|&i| data.particles[i].name.clone())
                        .collect();
                    for &i in &direct_indices {
                        data.particles[i].parent_has_sequence = true;
                        data.particles[i].parent_sequence = sibling_names.clone();
                    }
                }
                if is_choice && data.particles.len() > start_index {
                    data.has_choice = true;
                    let choice_items = (start_index..data.particles.len())
                        .map(|i| (data.particles[i].name.clone(), i))
                        .collect::<Vec<_>>();
                    // A choice whose branch is optional in practice (any
                    // member's min_occurs relaxed to 0) still only emits one
                    // branch at a time on the wire: preserve the original
                    // minOccurs before relaxing it.
                    for i in start_index..data.particles.len() {
                        data.particles[i].min_occurs_old = Some(data.particles[i].min_occurs);
                        data.particles[i].min_occurs = 0;
                    }

                    // Choice-of-sequences: an alternative that is itself
                    // an `xs:sequence` of more than one
                    // particle gets its members tagged with a 1-based
                    // `parent_choice_sequence_number`, and the whole group
                    // becomes one `choice_sequences` entry instead of a flat
                    // `choice_items` entry.
                    let mut choice_sequences = Vec::new();
                    let mut cursor = start_index;
                    let mut sequence_number = 0u32;
                    for (item, &contributed) in items.iter().zip(contributed_counts.iter()) {
                        if contributed == 0 {
                            continue;
                        }
                        if matches!(item, XsdParticle::Sequence(seq) if seq.len() > 1) {
                            sequence_number += 1;
                            let members: Vec<(String, usize)> = (cursor..cursor + contributed)
                                .map(|i| (data.particles[i].name.clone(), i))
                                .collect();
                            for &(_, i) in &members {
                                data.particles[i].parent_has_choice_sequence = true;
                                data.particles[i].parent_choice_sequence_number =
                                    Some(sequence_number);
                            }
                            choice_sequences.push(members);
                        }
                        cursor += contributed;
                    }
                    let is_multi_choice = choice_sequences.len() > 1;
                    let multi_choice_max = choice_sequences.len().max(1) as u32;

                    data.choices.push(Choice {
                        choice_items,
                        choice_sequences,
                        min_occurs: 0,
                        multi_choice_max,
                        is_multi_choice,
                    });
                }
            }
            XsdParticle::GroupRef(name) => {
                let group = self
                    .schema
                    .groups
                    .get(name)
                    .ok_or_else(|| SchemaError::UndeclaredType(name.clone()))?
                    .content
                    .clone();
                self.collect_particles(&group, data, depth)?;
            }
            XsdParticle::Any { min_occurs, max_occurs } => {
                let mut p = Particle::new("Any");
                p.is_any = true;
                p.min_occurs = *min_occurs;
                p.max_occurs = self.resolve_max_occurs("Any", &data.name, *max_occurs)?;
                data.particles.push(p);
            }
            XsdParticle::Element(e) => {
                let mut p = Particle::new(e.name.clone());
                p.min_occurs = e.min_occurs;
                p.max_occurs = self.resolve_max_occurs(&e.name, &data.name, e.max_occurs)?;
                if p.max_occurs != e.max_occurs.unwrap_or(p.max_occurs) {
                    p.max_occurs_changed = true;
                    p.max_occurs_old = e.max_occurs;
                    self.max_occurs_changed
                        .insert(e.name.clone(), p.max_occurs);
                }

                if let Some(type_ref) = e.type_name.clone() {
                    self.resolve_particle_type(&mut p, &e.name, &type_ref, depth)?;
                }

                // Array optimization pass: a configured per-type cap narrows
                // `max_occurs` further than whatever the schema or
                // occurrence-correction table produced. Applied here rather
                // than only at layout time, since the grammar builder must
                // emit exactly as many array-repetition grammars as the
                // capped storage can hold.
                if let Some(cap) = self.config.array_optimization_cap(&p.type_short) {
                    if cap < p.max_occurs {
                        if !p.max_occurs_changed {
                            p.max_occurs_old = Some(p.max_occurs);
                        }
                        p.max_occurs = cap;
                        p.max_occurs_changed = true;
                        self.max_occurs_changed.insert(e.name.clone(), cap);
                    }
                }

                if let Some(members) = self.schema.substitution_groups.get(&e.name).cloned() {
                    // Substitution-group head: the abstract slot is filled by
                    // exactly one concrete member at a time, so the Grammar
                    // Builder needs one real `Particle` per member (own
                    // concrete type, `is_substitute = true`), each inheriting
                    // the head's own (min_occurs, max_occurs) — not the
                    // single abstract-typed particle `p` itself, which is
                    // discarded here. `abstract_sequences` still records the
                    // member-name grouping for the Type-Layout Planner's
                    // tagged-union field.
                    let mut sorted_members = members;
                    sorted_members.sort();
                    data.has_abstract_sequence = true;
                    data.abstract_sequences.push(AbstractSequence {
                        names: sorted_members.clone(),
                        min_occurs: p.min_occurs,
                        max_occurs: p.max_occurs,
                    });
                    for member in &sorted_members {
                        let substitute = self.build_substitute_particle(
                            member,
                            p.min_occurs,
                            p.max_occurs,
                            depth + 1,
                        )?;
                        data.particles.push(substitute);
                    }
                } else {
                    data.particles.push(p);
                }
            }
        }
        Ok(())
    }

    /// Resolve `type_ref` onto `p`: builtin atomic, named simple type (with
    /// its facets applied), or named complex type, recursing to register
    /// the target type if it hasn't been seen yet. Shared by ordinary
    /// element particles and by substitution-group member particles, which
    /// resolve a sibling top-level element's own declared type the same way.
    fn resolve_particle_type(
        &mut self,
        p: &mut Particle,
        elem_name: &str,
        type_ref: &str,
        depth: u32,
    ) -> Result<(), SchemaError> {
        let short = strip_prefix(type_ref);
        p.type_name = type_ref.to_string();
        p.type_short = short.clone();
        self.known_particles.insert(elem_name.to_string(), short.clone());

        if BUILTIN_TYPES.contains(&short.as_str()) {
            p.base_type = short.clone();
        } else if let Some(simple) = self.schema.simple_types.get(&short).cloned() {
            p.base_type = strip_prefix(simple.base());
            self.apply_simple_facets(p, &simple);
            if matches!(simple, XsdSimpleType::Enum { .. }) {
                p.is_enum = true;
            }
            self.resolve_named_type(&short, depth + 1)?;
        } else {
            p.is_complex = true;
            p.abstract_type = self
                .schema
                .complex_types
                .get(&short)
                .map(|ct| ct.is_abstract)
                .unwrap_or(false);
            self.resolve_named_type(&short, depth + 1)?;
        }
        Ok(())
    }

    /// Build the `Particle` for one concrete member of a substitution
    /// group (spec §4.1 item 2): resolves the member's own top-level
    /// element declaration (named or inline complex type) the same way a
    /// direct particle reference would, but with the occurrence counts
    /// inherited from the abstract head rather than the member's own
    /// declaration (a substitution-group member never carries its own
    /// occurs — the head's slot does).
    fn build_substitute_particle(
        &mut self,
        member_name: &str,
        min_occurs: u32,
        max_occurs: u32,
        depth: u32,
    ) -> Result<Particle, SchemaError> {
        let mut p = Particle::new(member_name.to_string());
        p.min_occurs = min_occurs;
        p.max_occurs = max_occurs;
        p.is_substitute = true;

        let decl = self
            .schema
            .elements
            .get(member_name)
            .cloned()
            .ok_or_else(|| SchemaError::UndeclaredType(member_name.to_string()))?;

        if let Some(type_ref) = decl.type_name.clone() {
            self.resolve_particle_type(&mut p, member_name, &type_ref, depth)?;
        } else if let Some(ct) = decl.inline_complex_type.clone() {
            p.type_name = member_name.to_string();
            p.type_short = member_name.to_string();
            p.is_complex = true;
            self.known_particles
                .insert(member_name.to_string(), member_name.to_string());
            if !self.known_prototypes.contains_key(member_name) {
                self.known_prototypes
                    .insert(member_name.to_string(), member_name.to_string());
                self.build_complex_element(member_name, &ct, depth)?;
            }
        } else {
            return Err(SchemaError::UndeclaredType(member_name.to_string()));
        }
        Ok(p)
    }

    fn apply_simple_facets(&self, p: &mut Particle, simple: &XsdSimpleType) {
        if let XsdSimpleType::Restriction {
            min_length,
            max_length,
            min_inclusive,
            max_inclusive,
            ..
        } = simple
        {
            p.min_length = *min_length;
            p.max_length = *max_length;
            p.min_value = *min_inclusive;
            p.max_value = *max_inclusive;
            if let (Some(min), Some(max)) = (p.min_value, p.max_value) {
                p.integer_facet = Some(IntegerFacet::from_range(min, max));
            }
        }
    }

    /// Correct an unbounded or overlarge `maxOccurs` into a finite cap.
    /// Configured `occurrence_limits` win; otherwise a schema author that
    /// wrote `unbounded` on a particle the generator has no configured cap
    /// for is a config gap, not a silent guess.
    fn resolve_max_occurs(
        &self,
        particle_name: &str,
        element_name: &str,
        max_occurs: Option<u32>,
    ) -> Result<u32, SchemaError> {
        match max_occurs {
            Some(n) => Ok(n),
            None => self
                .config
                .occurrence_limit(particle_name)
                .ok_or_else(|| SchemaError::UnresolvableOccurrence {
                    element: element_name.to_string(),
                    particle: particle_name.to_string(),
                }),
        }
    }
}

impl XsdComplexType {
    /// Content model particle, ignoring extension/empty wrappers — used
    /// when a `complexContent` extension needs its base type's particles
    /// inlined ahead of its own ("flatten base content").
    fn content_model(&self) -> XsdParticle {
        match &self.content {
            XsdContent::Model(p) => p.clone(),
            XsdContent::ComplexExtension { model: Some(m), .. } => (**m).clone(),
            _ => XsdParticle::Sequence(Vec::new()),
        }
    }
}

fn strip_prefix(qualified: &str) -> String {
    match qualified.split_once(':') {
        Some((_, rest)) => rest.to_string(),
        None => qualified.to_string(),
    }
}

/// Builds the synthetic root-dispatcher type: the message-type "one of N"
/// selector whose particles are the schema's
/// top-level elements, sorted alphabetically and each marked
/// `is_substitute = true` to flag it as a stand-in for "whichever root
/// element actually appears". The dispatcher's own `is_in_namespace_elements`
/// is what routes it to the Grammar Builder's namespace-dispatcher mode.
/// Currently single-namespace per schema file: every root element lands in
/// one `"default"` bucket rather than being split by real namespace URI.
fn apply_namespace_elements(
    ctx: &mut AnalyzerCtx,
    root_elements: &[String],
) -> indexmap::IndexMap<String, Vec<String>> {
    let mut type_names: Vec<String> = root_elements
        .iter()
        .filter_map(|name| ctx.known_elements.get(name).cloned())
        .collect();
    type_names.sort();
    type_names.dedup();

    let mut map = indexmap::IndexMap::new();
    if type_names.is_empty() {
        return map;
    }
    map.insert("default".to_string(), type_names.clone());

    let mut dispatcher = ElementData::new(ctx.config.root_struct_name.clone());
    dispatcher.is_in_namespace_elements = true;
    // Depends on every root type, so it must sort after all of them; the
    // real guarantee comes from `order::topological_sort`, this just keeps
    // the analyzer's own default ordering sane.
    dispatcher.level = -1;
    dispatcher.count = ctx.next_count();
    for type_name in &type_names {
        let mut p = Particle::new(type_name.clone());
        p.type_name = type_name.clone();
        p.type_short = type_name.clone();
        p.is_complex = true;
        p.is_substitute = true;
        p.min_occurs = 0;
        p.max_occurs = 1;
        dispatcher.particles.push(p);
    }
    ctx.elements.push(dispatcher);

    map
}

/// Orders `generate_elements` so that every type appears after the types it
/// depends on, using the traversal `level`/`count`
/// bookkeeping computed during analysis. The actual topological guarantee
/// for the emitted file is established later by `order::topological_sort`;
/// this pass just gives the analyzer a deterministic, dependency-respecting
/// default ordering to hand off.
fn order_by_dependency(elements: &mut [ElementData]) {
    elements.sort_by(|a, b| b.level.cmp(&a.level).then(a.count.cmp(&b.count)));
    debug!(count = elements.len(), "ordered elements by traversal level");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xsd::parse_xsd_str;

    fn analyze_str(xsd: &str) -> AnalyzerData {
        let schema = parse_xsd_str(xsd).unwrap();
        let config = Config::default();
        analyze(&schema, &config).unwrap()
    }

    #[test]
    fn resolves_simple_complex_type() {
        let xsd = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="Root" type="RootType"/>
            <xs:complexType name="RootType">
                <xs:sequence>
                    <xs:element name="Value" type="xs:int"/>
                </xs:sequence>
            </xs:complexType>
        </xs:schema>
        "#;
        let data = analyze_str(xsd);
        assert_eq!(data.root_elements, vec!["Root".to_string()]);
        let root_type = data.element_by_short_name("RootType").unwrap();
        assert_eq!(root_type.particles.len(), 1);
        assert_eq!(root_type.particles[0].name, "Value");
        assert_eq!(root_type.particles[0].type_short, "int");
    }

    #[test]
    fn unbounded_particle_needs_occurrence_limit() {
        let xsd = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="Root" type="RootType"/>
            <xs:complexType name="RootType">
                <xs:sequence>
                    <xs:element name="Item" type="xs:int" maxOccurs="unbounded"/>
                </xs:sequence>
            </xs:complexType>
        </xs:schema>
        "#;
        let schema = parse_xsd_str(xsd).unwrap();
        let config = Config::default();
        let err = analyze(&schema, &config).unwrap_err();
        assert!(matches!(err, SchemaError::UnresolvableOccurrence { .. }));
    }

    #[test]
    fn unbounded_particle_honors_configured_limit() {
        let xsd = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="Root" type="RootType"/>
            <xs:complexType name="RootType">
                <xs:sequence>
                    <xs:element name="Item" type="xs:int" maxOccurs="unbounded"/>
                </xs:sequence>
            </xs:complexType>
        </xs:schema>
        "#;
        let schema = parse_xsd_str(xsd).unwrap();
        let mut config = Config::default();
        config.occurrence_limits.insert("Item".to_string(), 5);
        let data = analyze(&schema, &config).unwrap();
        let root_type = data.element_by_short_name("RootType").unwrap();
        assert_eq!(root_type.particles[0].max_occurs, 5);
        assert!(root_type.particles[0].max_occurs_changed);
    }

    #[test]
    fn array_optimization_caps_max_occurs_during_analysis() {
        let xsd = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="Root" type="RootType"/>
            <xs:complexType name="RootType">
                <xs:sequence>
                    <xs:element name="Entry" type="EntryType" minOccurs="0" maxOccurs="20"/>
                </xs:sequence>
            </xs:complexType>
            <xs:complexType name="EntryType">
                <xs:sequence>
                    <xs:element name="Value" type="xs:int"/>
                </xs:sequence>
            </xs:complexType>
        </xs:schema>
        "#;
        let schema = parse_xsd_str(xsd).unwrap();
        let mut config = Config::default();
        config.apply_optimizations = true;
        config.array_optimizations.insert("EntryType".to_string(), 5);
        let data = analyze(&schema, &config).unwrap();
        let root_type = data.element_by_short_name("RootType").unwrap();
        let entry = root_type.particle_from_name("Entry").unwrap();
        assert_eq!(entry.max_occurs, 5);
        assert_eq!(entry.max_occurs_old, Some(20));
        assert!(entry.max_occurs_changed);
    }

    #[test]
    fn choice_marks_branch_particles_optional() {
        let xsd = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="Root" type="RootType"/>
            <xs:complexType name="RootType">
                <xs:choice>
                    <xs:element name="A" type="xs:int"/>
                    <xs:element name="B" type="xs:int"/>
                </xs:choice>
            </xs:complexType>
        </xs:schema>
        "#;
        let data = analyze_str(xsd);
        let root_type = data.element_by_short_name("RootType").unwrap();
        assert!(root_type.has_choice);
        assert_eq!(root_type.choices.len(), 1);
        assert!(root_type.particles.iter().all(|p| p.is_optional()));
        // P7: each choice member's original min_occurs is preserved.
        for (name, _) in &root_type.choices[0].choice_items {
            let particle = root_type.particle_from_name(name).unwrap();
            assert_eq!(particle.min_occurs_old, Some(1));
        }
        // A plain choice of single elements is not a choice-of-sequences.
        assert!(root_type.choices[0].choice_sequences.is_empty());
        assert!(!root_type.choices[0].is_multi_choice);
    }

    #[test]
    fn choice_of_sequences_numbers_members_per_alternative() {
        let xsd = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="Root" type="RootType"/>
            <xs:complexType name="RootType">
                <xs:choice>
                    <xs:sequence>
                        <xs:element name="A1" type="xs:int"/>
                        <xs:element name="A2" type="xs:int"/>
                    </xs:sequence>
                    <xs:sequence>
                        <xs:element name="B1" type="xs:int"/>
                        <xs:element name="B2" type="xs:int"/>
                    </xs:sequence>
                </xs:choice>
            </xs:complexType>
        </xs:schema>
        "#;
        let data = analyze_str(xsd);
        let root_type = data.element_by_short_name("RootType").unwrap();
        assert_eq!(root_type.choices[0].choice_sequences.len(), 2);
        assert!(root_type.choices[0].is_multi_choice);
        assert_eq!(root_type.choices[0].multi_choice_max, 2);

        let a1 = root_type.particle_from_name("A1").unwrap();
        assert!(a1.parent_has_choice_sequence);
        assert_eq!(a1.parent_choice_sequence_number, Some(1));
        let b2 = root_type.particle_from_name("B2").unwrap();
        assert!(b2.parent_has_choice_sequence);
        assert_eq!(b2.parent_choice_sequence_number, Some(2));
    }

    #[test]
    fn sequence_siblings_are_recorded_on_each_particle() {
        let xsd = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="Root" type="RootType"/>
            <xs:complexType name="RootType">
                <xs:sequence>
                    <xs:element name="A" type="xs:int"/>
                    <xs:element name="B" type="xs:int"/>
                </xs:sequence>
            </xs:complexType>
        </xs:schema>
        "#;
        let data = analyze_str(xsd);
        let root_type = data.element_by_short_name("RootType").unwrap();
        let a = root_type.particle_from_name("A").unwrap();
        assert!(a.parent_has_sequence);
        assert_eq!(a.parent_sequence, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn substitution_group_replaces_head_with_concrete_members() {
        // spec §8 scenario 5: particle `Base` is replaced by
        // `[C(is_substitute), D(is_substitute)]`, alphabetically, each its
        // own concrete type, inheriting the head's occurs.
        let xsd = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="Root" type="RootType"/>
            <xs:element name="Base" type="BaseType" abstract="true"/>
            <xs:element name="C" type="CType" substitutionGroup="Base"/>
            <xs:element name="D" type="DType" substitutionGroup="Base"/>
            <xs:complexType name="BaseType">
                <xs:sequence><xs:element name="X" type="xs:int"/></xs:sequence>
            </xs:complexType>
            <xs:complexType name="CType">
                <xs:sequence><xs:element name="Y" type="xs:int"/></xs:sequence>
            </xs:complexType>
            <xs:complexType name="DType">
                <xs:sequence><xs:element name="Z" type="xs:int"/></xs:sequence>
            </xs:complexType>
            <xs:complexType name="RootType">
                <xs:sequence>
                    <xs:element name="Base" type="BaseType" minOccurs="0"/>
                </xs:sequence>
            </xs:complexType>
        </xs:schema>
        "#;
        let data = analyze_str(xsd);
        let root_type = data.element_by_short_name("RootType").unwrap();
        assert_eq!(root_type.particles.len(), 2);
        assert_eq!(root_type.particles[0].name, "C");
        assert_eq!(root_type.particles[0].type_short, "CType");
        assert!(root_type.particles[0].is_substitute);
        assert_eq!(root_type.particles[0].min_occurs, 0);
        assert_eq!(root_type.particles[1].name, "D");
        assert_eq!(root_type.particles[1].type_short, "DType");
        assert!(root_type.particles[1].is_substitute);

        assert!(root_type.has_abstract_sequence);
        assert_eq!(
            root_type.abstract_sequences[0].names,
            vec!["C".to_string(), "D".to_string()]
        );

        assert!(data.element_by_short_name("CType").is_some());
        assert!(data.element_by_short_name("DType").is_some());
    }
}

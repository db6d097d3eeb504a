//! Parser for the XSD subset used by V2G (ISO 15118 / DIN 70121) schemas.
//!
//! Extracts simpleType, complexType, group, attributeGroup, and top-level
//! element declarations, including the substitution-group and abstract-type
//! bookkeeping the Schema Analyzer needs: `substitutionGroup`/`abstract`
//! attributes, integer range facets, and `xs:any` wildcard particles.

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

/// Raw schema AST as read from the XSD file(s), before canonicalization.
#[derive(Debug, Default)]
pub struct XsdSchema {
    pub simple_types: HashMap<String, XsdSimpleType>,
    pub complex_types: HashMap<String, XsdComplexType>,
    pub groups: HashMap<String, XsdGroup>,
    pub attribute_groups: HashMap<String, XsdAttributeGroup>,
    /// Top-level element name -> declaration.
    pub elements: HashMap<String, XsdElementDecl>,
    /// Substitution group head element name -> member element names, in
    /// declaration order.
    pub substitution_groups: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub enum XsdSimpleType {
    Enum {
        base: String,
        values: Vec<String>,
    },
    Restriction {
        base: String,
        min_length: Option<u32>,
        max_length: Option<u32>,
        min_inclusive: Option<i64>,
        max_inclusive: Option<i64>,
        pattern: Option<String>,
    },
}

impl XsdSimpleType {
    pub fn base(&self) -> &str {
        match self {
            XsdSimpleType::Enum { base, .. } => base,
            XsdSimpleType::Restriction { base, .. } => base,
        }
    }
}

#[derive(Debug, Clone)]
pub struct XsdComplexType {
    pub doc: Option<String>,
    pub content: XsdContent,
    pub attribute_groups: Vec<String>,
    pub attributes: Vec<XsdAttribute>,
    pub is_abstract: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XsdContent {
    Empty,
    /// `xs:simpleContent/xs:extension base="..."`.
    SimpleExtension { base: String },
    /// `xs:complexContent/xs:extension base="..."`, optionally adding its
    /// own content model on top of the base type's.
    ComplexExtension {
        base: String,
        model: Option<Box<XsdParticle>>,
    },
    /// `xs:sequence`, `xs:choice`, or `xs:all` of particles.
    Model(XsdParticle),
}

#[derive(Debug, Clone, PartialEq)]
pub enum XsdParticle {
    Sequence(Vec<XsdParticle>),
    Choice(Vec<XsdParticle>),
    GroupRef(String),
    Element(XsdElementParticle),
    /// `xs:any` wildcard particle.
    Any { min_occurs: u32, max_occurs: Option<u32> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct XsdElementParticle {
    pub name: String,
    pub type_name: Option<String>,
    pub min_occurs: u32,
    /// `None` = `unbounded`.
    pub max_occurs: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct XsdAttribute {
    pub name: String,
    pub type_name: String,
    pub required: bool,
    pub default_value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct XsdGroup {
    pub doc: Option<String>,
    pub content: XsdParticle,
}

#[derive(Debug, Clone)]
pub struct XsdAttributeGroup {
    pub doc: Option<String>,
    pub attributes: Vec<XsdAttribute>,
    pub attribute_group_refs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct XsdElementDecl {
    pub doc: Option<String>,
    pub type_name: Option<String>,
    pub inline_complex_type: Option<XsdComplexType>,
    pub substitution_group: Option<String>,
    pub is_abstract: bool,
}

fn local_name(name: &[u8]) -> Vec<u8> {
    if let Some(i) = name.iter().position(|&b| b == b':') {
        name[i + 1..].to_vec()
    } else {
        name.to_vec()
    }
}

fn get_attr<'a>(e: &quick_xml::events::BytesStart<'a>, key: &str) -> Option<String> {
    let key = key.as_bytes();
    for a in e.attributes() {
        let a = a.ok()?;
        if a.key.as_ref() == key {
            return Some(String::from_utf8_lossy(a.value.as_ref()).into_owned());
        }
    }
    None
}

fn get_bool_attr(e: &quick_xml::events::BytesStart, key: &str) -> bool {
    get_attr(e, key).as_deref() == Some("true")
}

fn parse_u32(s: &str) -> u32 {
    s.parse().unwrap_or(1)
}

/// Parse a single XSD file into a schema AST.
pub fn parse_xsd(path: &Path) -> Result<XsdSchema> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read XSD: {}", path.display()))?;
    parse_xsd_str(&content)
}

/// Parse XSD from string (also used directly by tests).
pub fn parse_xsd_str(content: &str) -> Result<XsdSchema> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);
    // Self-closing tags (`<xs:element .../>`) are the common case in real XSDs;
    // expand them into a Start/End pair so every match site below only has to
    // reason about one shape of event.
    reader.config_mut().expand_empty_elements = true;

    let mut schema = XsdSchema::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref());
                match local.as_slice() {
                    b"simpleType" => {
                        if let Some(n) = get_attr(&e, "name") {
                            if let Some(st) = read_simple_type(&mut reader, &mut buf)? {
                                schema.simple_types.insert(n, st);
                            }
                        }
                    }
                    b"complexType" => {
                        if let Some(n) = get_attr(&e, "name") {
                            let is_abstract = get_bool_attr(&e, "abstract");
                            if let Some(mut ct) = read_complex_type(&mut reader, &mut buf)? {
                                ct.is_abstract = is_abstract;
                                schema.complex_types.insert(n, ct);
                            }
                        }
                    }
                    b"group" => {
                        if let Some(n) = get_attr(&e, "name") {
                            if let Some(g) = read_group(&mut reader, &mut buf)? {
                                schema.groups.insert(n, g);
                            }
                        }
                    }
                    b"attributeGroup" => {
                        if let Some(n) = get_attr(&e, "name") {
                            if let Some(ag) = read_attribute_group(&mut reader, &mut buf)? {
                                schema.attribute_groups.insert(n, ag);
                            }
                        }
                    }
                    b"element" => {
                        let elem_name = get_attr(&e, "name");
                        let type_ref = get_attr(&e, "type");
                        let substitution_group = get_attr(&e, "substitutionGroup");
                        let is_abstract = get_bool_attr(&e, "abstract");
                        if let Some(n) = elem_name {
                            if let Some(ed) = read_element_decl(
                                &mut reader,
                                &mut buf,
                                type_ref,
                                substitution_group.clone(),
                                is_abstract,
                            )? {
                                if let Some(head) = &substitution_group {
                                    schema
                                        .substitution_groups
                                        .entry(head.clone())
                                        .or_default()
                                        .push(n.clone());
                                }
                                schema.elements.insert(n, ed);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(schema)
}

fn read_simple_type<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
) -> Result<Option<XsdSimpleType>> {
    let mut depth = 1u32;
    let mut restriction_base: Option<String> = None;
    let mut values = Vec::new();
    let mut pattern: Option<String> = None;
    let mut min_length = None;
    let mut max_length = None;
    let mut min_inclusive = None;
    let mut max_inclusive = None;

    while depth > 0 {
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref());
                match local.as_slice() {
                    b"restriction" => restriction_base = get_attr(&e, "base").or(restriction_base),
                    b"enumeration" => {
                        if let Some(v) = get_attr(&e, "value") {
                            values.push(v);
                        }
                    }
                    b"pattern" => pattern = get_attr(&e, "value").or(pattern),
                    b"minLength" => min_length = get_attr(&e, "value").and_then(|s| s.parse().ok()),
                    b"maxLength" => max_length = get_attr(&e, "value").and_then(|s| s.parse().ok()),
                    b"minInclusive" => {
                        min_inclusive = get_attr(&e, "value").and_then(|s| s.parse().ok())
                    }
                    b"maxInclusive" => {
                        max_inclusive = get_attr(&e, "value").and_then(|s| s.parse().ok())
                    }
                    b"simpleType" => depth += 1,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()).as_slice() == b"simpleType" {
                    depth -= 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    let base = restriction_base.unwrap_or_else(|| "xs:string".to_string());
    if !values.is_empty() {
        return Ok(Some(XsdSimpleType::Enum { base, values }));
    }
    Ok(Some(XsdSimpleType::Restriction {
        base,
        min_length,
        max_length,
        min_inclusive,
        max_inclusive,
        pattern,
    }))
}

fn read_complex_type<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
) -> Result<Option<XsdComplexType>> {
    let mut depth = 1u32;
    let mut doc = None;
    let mut content = XsdContent::Empty;
    let mut attribute_groups = Vec::new();
    let mut attributes = Vec::new();

    while depth > 0 {
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref());
                match local.as_slice() {
                    b"annotation" => {
                        let mut inner = Vec::new();
                        if let Some(d) = read_documentation(reader, &mut inner)? {
                            doc = Some(d);
                        }
                    }
                    b"simpleContent" => {
                        let mut inner = Vec::new();
                        let (ext_base, ags, attrs) = read_extension(reader, &mut inner)?;
                        content = XsdContent::SimpleExtension { base: ext_base };
                        attribute_groups = ags;
                        attributes = attrs;
                    }
                    b"complexContent" => {
                        let mut inner = Vec::new();
                        let (ext_base, ags, attrs, model) =
                            read_complex_extension(reader, &mut inner)?;
                        content = XsdContent::ComplexExtension {
                            base: ext_base,
                            model: model.map(Box::new),
                        };
                        attribute_groups = ags;
                        attributes = attrs;
                    }
                    b"sequence" => {
                        let mut inner = Vec::new();
                        if let Some(p) = read_sequence_or_choice(reader, &mut inner, b"sequence")? {
                            content = XsdContent::Model(p);
                        }
                    }
                    b"choice" => {
                        let mut inner = Vec::new();
                        if let Some(p) = read_sequence_or_choice(reader, &mut inner, b"choice")? {
                            content = XsdContent::Model(p);
                        }
                    }
                    b"all" => {
                        let mut inner = Vec::new();
                        if let Some(p) = read_sequence_or_choice(reader, &mut inner, b"all")? {
                            content = XsdContent::Model(p);
                        }
                    }
                    b"attributeGroup" => {
                        if let Some(r) = get_attr(&e, "ref") {
                            attribute_groups.push(r);
                        }
                    }
                    b"attribute" => {
                        if let Some(attr) = read_attribute_from_start(&e) {
                            attributes.push(attr);
                        }
                    }
                    _ => {}
                }
                if local.as_slice() == b"complexType" {
                    depth += 1;
                }
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()).as_slice() == b"complexType" {
                    depth -= 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(Some(XsdComplexType {
        doc,
        content,
        attribute_groups,
        attributes,
        is_abstract: false,
    }))
}

fn read_attribute_from_start(e: &quick_xml::events::BytesStart) -> Option<XsdAttribute> {
    let name = get_attr(e, "name")?;
    let type_name = get_attr(e, "type")?;
    let required = get_attr(e, "use").as_deref() == Some("required");
    let default_value = get_attr(e, "default");
    Some(XsdAttribute {
        name,
        type_name,
        required,
        default_value,
    })
}

fn read_documentation<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
) -> Result<Option<String>> {
    let mut depth = 1u32;
    let mut in_doc = false;
    let mut text = String::new();
    while depth > 0 {
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref());
                if local == b"documentation" {
                    in_doc = true;
                }
                if local == b"annotation" {
                    depth += 1;
                }
            }
            Ok(Event::Text(e)) => {
                if in_doc {
                    let t = e.unescape().unwrap_or_default().trim().to_string();
                    if !t.is_empty() {
                        text.push_str(&t);
                        text.push(' ');
                    }
                }
            }
            Ok(Event::End(e)) => {
                let local = local_name(e.name().as_ref());
                if local.as_slice() == b"documentation" {
                    in_doc = false;
                }
                if local.as_slice() == b"annotation" {
                    depth -= 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(Some(text.trim().to_string()).filter(|s| !s.is_empty()))
}

/// `xs:simpleContent/xs:extension`: base is always a simple (atomic) type.
fn read_extension<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
) -> Result<(String, Vec<String>, Vec<XsdAttribute>)> {
    let mut base = String::new();
    let mut ags = Vec::new();
    let mut attrs = Vec::new();
    let mut depth = 2u32; // extension + simpleContent
    while depth > 0 {
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref());
                match local.as_slice() {
                    b"extension" => {
                        base = get_attr(&e, "base").unwrap_or_default();
                        depth += 1;
                    }
                    b"attributeGroup" => {
                        if let Some(r) = get_attr(&e, "ref") {
                            ags.push(r);
                        }
                    }
                    b"attribute" => {
                        if let Some(attr) = read_attribute_from_start(&e) {
                            attrs.push(attr);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let local = local_name(e.name().as_ref());
                if local.as_slice() == b"extension" || local.as_slice() == b"simpleContent" {
                    depth -= 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    if base.is_empty() {
        base = "xs:string".to_string();
    }
    Ok((base, ags, attrs))
}

/// `xs:complexContent/xs:extension`: base is a complex type, and the
/// extension may add its own sequence/choice on top of the base's.
fn read_complex_extension<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
) -> Result<(String, Vec<String>, Vec<XsdAttribute>, Option<XsdParticle>)> {
    let mut base = String::new();
    let mut ags = Vec::new();
    let mut attrs = Vec::new();
    let mut model = None;
    let mut depth = 2u32; // extension + complexContent
    while depth > 0 {
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref());
                match local.as_slice() {
                    b"extension" => {
                        base = get_attr(&e, "base").unwrap_or_default();
                        depth += 1;
                    }
                    b"attributeGroup" => {
                        if let Some(r) = get_attr(&e, "ref") {
                            ags.push(r);
                        }
                    }
                    b"attribute" => {
                        if let Some(attr) = read_attribute_from_start(&e) {
                            attrs.push(attr);
                        }
                    }
                    b"sequence" => {
                        let mut inner = Vec::new();
                        model = read_sequence_or_choice(reader, &mut inner, b"sequence")?;
                    }
                    b"choice" => {
                        let mut inner = Vec::new();
                        model = read_sequence_or_choice(reader, &mut inner, b"choice")?;
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let local = local_name(e.name().as_ref());
                if local.as_slice() == b"extension" || local.as_slice() == b"complexContent" {
                    depth -= 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    if base.is_empty() {
        base = "xs:anyType".to_string();
    }
    Ok((base, ags, attrs, model))
}

fn read_sequence_or_choice<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    kind: &[u8],
) -> Result<Option<XsdParticle>> {
    let mut children = Vec::new();
    let mut depth = 1u32;
    while depth > 0 {
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref());
                match local.as_slice() {
                    b"element" => {
                        let name = get_attr(&e, "name").unwrap_or_default();
                        let type_name = get_attr(&e, "type");
                        let min_occurs = get_attr(&e, "minOccurs")
                            .map(|s| parse_u32(&s))
                            .unwrap_or(1);
                        let max_occurs = get_attr(&e, "maxOccurs").and_then(|s| {
                            if s == "unbounded" {
                                None
                            } else {
                                s.parse().ok()
                            }
                        });
                        if !name.is_empty() {
                            children.push(XsdParticle::Element(XsdElementParticle {
                                name,
                                type_name,
                                min_occurs,
                                max_occurs,
                            }));
                        }
                    }
                    b"any" => {
                        let min_occurs = get_attr(&e, "minOccurs")
                            .map(|s| parse_u32(&s))
                            .unwrap_or(1);
                        let max_occurs = get_attr(&e, "maxOccurs").and_then(|s| {
                            if s == "unbounded" {
                                None
                            } else {
                                s.parse().ok()
                            }
                        });
                        children.push(XsdParticle::Any {
                            min_occurs,
                            max_occurs,
                        });
                    }
                    b"group" => {
                        if let Some(r) = get_attr(&e, "ref") {
                            children.push(XsdParticle::GroupRef(r));
                        }
                    }
                    b"sequence" => {
                        let mut inner = Vec::new();
                        if let Some(p) = read_sequence_or_choice(reader, &mut inner, b"sequence")? {
                            children.push(p);
                        }
                    }
                    b"choice" => {
                        let mut inner = Vec::new();
                        if let Some(p) = read_sequence_or_choice(reader, &mut inner, b"choice")? {
                            children.push(p);
                        }
                    }
                    // `xs:all` has no dedicated recursive reader, so (unlike
                    // sequence/choice above) its matching End is observed by
                    // this same loop and must be tracked here.
                    b"all" => depth += 1,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let local = local_name(e.name().as_ref());
                if local.as_slice() == kind
                    || local.as_slice() == b"sequence"
                    || local.as_slice() == b"choice"
                    || local.as_slice() == b"all"
                {
                    depth -= 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    let particle = if kind == b"choice" {
        XsdParticle::Choice(children)
    } else {
        XsdParticle::Sequence(children)
    };
    Ok(Some(particle))
}

fn read_group<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<Option<XsdGroup>> {
    let mut depth = 1u32;
    let mut content = None;
    let mut doc = None;
    while depth > 0 {
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref());
                match local.as_slice() {
                    b"annotation" => {
                        let mut inner = Vec::new();
                        doc = read_documentation(reader, &mut inner)?;
                    }
                    b"sequence" => {
                        let mut inner = Vec::new();
                        content = read_sequence_or_choice(reader, &mut inner, b"sequence")?;
                    }
                    b"choice" => {
                        let mut inner = Vec::new();
                        content = read_sequence_or_choice(reader, &mut inner, b"choice")?;
                    }
                    b"group" => depth += 1,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()).as_slice() == b"group" {
                    depth -= 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(Some(XsdGroup {
        doc,
        content: content.unwrap_or(XsdParticle::Sequence(vec![])),
    }))
}

fn read_attribute_group<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
) -> Result<Option<XsdAttributeGroup>> {
    let mut doc = None;
    let mut attributes = Vec::new();
    let mut attribute_group_refs = Vec::new();
    let mut depth = 1u32;
    while depth > 0 {
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref());
                match local.as_slice() {
                    b"annotation" => {
                        let mut inner = Vec::new();
                        doc = read_documentation(reader, &mut inner)?;
                    }
                    b"attribute" => {
                        if let Some(attr) = read_attribute_from_start(&e) {
                            attributes.push(attr);
                        }
                    }
                    b"attributeGroup" => {
                        if let Some(r) = get_attr(&e, "ref") {
                            attribute_group_refs.push(r);
                        }
                        depth += 1;
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()).as_slice() == b"attributeGroup" {
                    depth -= 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(Some(XsdAttributeGroup {
        doc,
        attributes,
        attribute_group_refs,
    }))
}

fn read_element_decl<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    type_ref: Option<String>,
    substitution_group: Option<String>,
    is_abstract: bool,
) -> Result<Option<XsdElementDecl>> {
    let mut depth = 1u32;
    let mut inline_complex_type = None;
    let mut doc = None;
    while depth > 0 {
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref());
                if local.as_slice() == b"annotation" {
                    let mut inner = Vec::new();
                    doc = read_documentation(reader, &mut inner)?;
                }
                if local.as_slice() == b"complexType" && get_attr(&e, "name").is_none() {
                    let mut inner = Vec::new();
                    inline_complex_type = read_complex_type(reader, &mut inner)?;
                }
                if local.as_slice() == b"element" {
                    depth += 1;
                }
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()).as_slice() == b"element" {
                    depth -= 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(Some(XsdElementDecl {
        doc,
        type_name: type_ref,
        inline_complex_type,
        substitution_group,
        is_abstract,
    }))
}

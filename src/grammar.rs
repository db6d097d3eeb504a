//! Turns one [`ElementData`]'s particle list into an ordered table of EXI
//! production grammars.
//!
//! `elementGrammar.py` represents a grammar's productions as a flat record
//! with nullable fields (`event_code_1`, `next_grammar_1`, ...) switched on
//! by which combination happens to be populated. Here each production is a
//! [`GrammarDetail`] variant instead, so the compiler — not a chain of
//! `if x is not None` checks — enforces which fields a given kind of
//! production carries.
//!
//! The particle list is first grouped into ordered *positions*: a plain
//! particle is its own position, but a flat `choice`, a choice-of-sequences,
//! or a substitution-group's concrete members share one position, because
//! EXI encodes "pick one of N alternatives" as N events of a single
//! grammar, not N independent grammars (spec §8 scenarios 4/5).

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::GrammarError;
use crate::model::{Choice, ElementData, Particle};

/// `maxOccurs` at or above this needs a genuine EXI LOOP grammar (a
/// production that points back to itself indefinitely rather than
/// unrolling). LOOP grammars are not implemented; arrays at or above
/// this threshold are rejected with [`GrammarError::LoopNotImplemented`].
const LOOP_THRESHOLD: u32 = 25;

/// One expected event inside a production grammar.
#[derive(Debug, Clone)]
pub enum GrammarDetail {
    /// Expect the named particle to start; `next_grammar` is the id of the
    /// grammar active once it has been read.
    StartParticle {
        particle_index: usize,
        event_code: u32,
        next_grammar: u32,
        /// Set on the final occurrence-grammar of a bounded array particle.
        is_in_array_last: bool,
        /// Set on every occurrence-grammar of a bounded array particle
        /// except the final one.
        is_in_array_not_last: bool,
        /// Set on the synthetic grammar appended after a capped array's
        /// last occurrence when the cap rewrote an originally larger
        /// `maxOccurs` (spec §4.2.1 step E's "no more" state).
        is_extra_grammar: bool,
        /// Set on the non-dummy copy of an `xs:any` wildcard event (spec
        /// §4.2.1 step G); always `false` here, since every particle gets
        /// its own single-event grammar and there is never a second,
        /// placeholder copy to distinguish (see `DESIGN.md`).
        any_is_dummy: bool,
    },
    /// Expect the containing element to close. `next_grammar` is always the
    /// shared per-type `ERROR` grammar (`grammar_unknown`): nothing valid
    /// follows an END event.
    EndElement { event_code: u32, next_grammar: u32 },
    /// No further valid event; decoding/encoding past this point is a bug.
    Error,
}

impl GrammarDetail {
    fn event_code(&self) -> Option<u32> {
        match self {
            GrammarDetail::StartParticle { event_code, .. }
            | GrammarDetail::EndElement { event_code, .. } => Some(*event_code),
            GrammarDetail::Error => None,
        }
    }

    /// A plain `START` detail with no array/extra/any flags set.
    fn start(particle_index: usize, event_code: u32, next_grammar: u32) -> GrammarDetail {
        GrammarDetail::StartParticle {
            particle_index,
            event_code,
            next_grammar,
            is_in_array_last: false,
            is_in_array_not_last: false,
            is_extra_grammar: false,
            any_is_dummy: false,
        }
    }
}

/// One production state: the set of events valid from here, and the bit
/// width needed to code which one occurred.
#[derive(Debug, Clone)]
pub struct ElementGrammar {
    pub id: u32,
    pub details: Vec<GrammarDetail>,
}

impl ElementGrammar {
    /// `ceil(log2(N+1))` capped at 8, `0` iff this grammar only has
    /// [`GrammarDetail::Error`].
    pub fn bit_width(&self) -> u32 {
        let n = self
            .details
            .iter()
            .filter(|d| !matches!(d, GrammarDetail::Error))
            .count();
        if n == 0 {
            return 0;
        }
        // ceil(log2(n + 1)): n events plus the implicit "none of the above".
        let mut values = n as u32;
        let mut bits = 0u32;
        while values != 0 {
            values >>= 1;
            bits += 1;
        }
        bits.min(8)
    }
}

/// The ordered grammar table for one type, plus the per-particle pointer
/// into it the emission layer needs.
#[derive(Debug, Clone)]
pub struct GrammarTable {
    pub type_name: String,
    pub grammars: Vec<ElementGrammar>,
    /// particle index -> id of the grammar active once that particle has
    /// been consumed for the first time.
    pub particle_next_grammar: HashMap<usize, u32>,
}

#[derive(Default)]
struct Builder {
    grammars: Vec<ElementGrammar>,
}

impl Builder {
    fn reserve(&mut self, count: usize) -> u32 {
        let start = self.grammars.len() as u32;
        for _ in 0..count {
            self.grammars.push(ElementGrammar {
                id: self.grammars.len() as u32,
                details: Vec::new(),
            });
        }
        start
    }

    fn set(&mut self, id: u32, details: Vec<GrammarDetail>) {
        self.grammars[id as usize].details = details;
    }
}

/// A maximal run of sibling particles that share one EXI "pick one"
/// decision point, or a single ordinary particle.
enum Position {
    Simple(usize),
    /// Index into `data.choices`: a flat choice (no `choice_sequences`).
    ChoiceFlat(usize),
    /// Index into `data.choices`: a choice of multi-member sequences.
    ChoiceSeq(usize),
    /// Index into `data.abstract_sequences`.
    Substitute(usize),
}

/// Build the grammar table for a single type, or the flat namespace-dispatcher
/// table when `data` is the synthetic root-message selector built by
/// `analyzer::apply_namespace_elements`.
pub fn build_grammar_table(data: &ElementData) -> Result<GrammarTable, GrammarError> {
    if data.is_in_namespace_elements {
        let table = build_namespace_table(data);
        validate(data, &table.grammars)?;
        return Ok(table);
    }

    for p in &data.particles {
        if p.is_array() && p.max_occurs >= LOOP_THRESHOLD {
            return Err(GrammarError::LoopNotImplemented {
                type_name: data.name.clone(),
                particle: p.name.clone(),
            });
        }
    }

    let positions = group_positions(data);

    // Step A/D: the last *position* that cannot be skipped. Particles past
    // it are all reachable only through a chain that is itself optional, so
    // every position at or after it may terminate the type early.
    let last_mandatory = positions
        .iter()
        .enumerate()
        .filter(|(_, pos)| position_is_mandatory(data, pos))
        .map(|(i, _)| i)
        .last();

    // Slot reservation: most positions need one grammar, but an array
    // particle needs one per occurrence (+1 if the cap rewrote a larger
    // declared maxOccurs) and a choice-of-sequences needs one shared
    // leader grammar plus one per non-leading member of each alternative.
    let slot_counts: Vec<usize> = positions.iter().map(|pos| slots_needed(data, pos)).collect();
    let mut entry_ids = Vec::with_capacity(positions.len());
    let mut running = 0u32;
    for &n in &slot_counts {
        entry_ids.push(running);
        running += n as u32;
    }
    let end_grammar_id = running;
    let error_grammar_id = end_grammar_id + 1;

    let mut builder = Builder::default();
    builder.reserve(end_grammar_id as usize + 2);

    let mut particle_next_grammar = HashMap::new();

    for (i, pos) in positions.iter().enumerate() {
        let this_entry = entry_ids[i];
        let next_entry = entry_ids.get(i + 1).copied().unwrap_or(end_grammar_id);
        let end_allowed = match last_mandatory {
            Some(last) => i > last,
            None => true,
        };
        fill_position(
            data,
            pos,
            this_entry,
            next_entry,
            end_allowed,
            error_grammar_id,
            &mut builder,
            &mut particle_next_grammar,
        );
        trace!(type_name = %data.name, position = i, grammar = this_entry, "opened grammar");
    }

    // Trailing synthetic pair (spec §4.2.1 step F / invariant 3): `END` is
    // reachable even when the type has no particles at all (the very first
    // state is then already "nothing left to read").
    builder.set(
        end_grammar_id,
        vec![GrammarDetail::EndElement {
            event_code: 0,
            next_grammar: error_grammar_id,
        }],
    );
    builder.set(error_grammar_id, vec![GrammarDetail::Error]);

    debug!(type_name = %data.name, grammars = builder.grammars.len(), "built grammar table");

    validate(data, &builder.grammars)?;

    Ok(GrammarTable {
        type_name: data.name.clone(),
        grammars: builder.grammars,
        particle_next_grammar,
    })
}

/// Groups `data.particles` into ordered [`Position`]s: a run of particles
/// belonging to the same flat choice, choice-of-sequences, or
/// substitution-group expansion becomes one position; everything else is
/// its own `Simple` position. Particle indices are visited in order, so a
/// group's own member indices (all of which are marked covered the moment
/// the group is opened, at its lowest index) are never re-visited.
fn group_positions(data: &ElementData) -> Vec<Position> {
    struct ChoiceSpan {
        choice_idx: usize,
        is_seq: bool,
        indices: Vec<usize>,
        min_index: usize,
    }
    let mut choice_spans: Vec<ChoiceSpan> = Vec::new();
    for (ci, choice) in data.choices.iter().enumerate() {
        let mut indices: Vec<usize> = choice.choice_items.iter().map(|&(_, i)| i).collect();
        indices.sort_unstable();
        let Some(&min_index) = indices.first() else {
            continue;
        };
        choice_spans.push(ChoiceSpan {
            choice_idx: ci,
            is_seq: !choice.choice_sequences.is_empty(),
            indices,
            min_index,
        });
    }

    struct SubstSpan {
        seq_idx: usize,
        indices: Vec<usize>,
        min_index: usize,
    }
    let mut subst_spans: Vec<SubstSpan> = Vec::new();
    for (si, seq) in data.abstract_sequences.iter().enumerate() {
        let mut indices: Vec<usize> = data
            .particles
            .iter()
            .enumerate()
            .filter(|(_, p)| seq.names.contains(&p.name))
            .map(|(i, _)| i)
            .collect();
        indices.sort_unstable();
        let Some(&min_index) = indices.first() else {
            continue;
        };
        subst_spans.push(SubstSpan { seq_idx: si, indices, min_index });
    }

    let mut covered = vec![false; data.particles.len()];
    let mut positions = Vec::new();
    for idx in 0..data.particles.len() {
        if covered[idx] {
            continue;
        }
        if let Some(span) = choice_spans.iter().find(|s| s.min_index == idx) {
            for &i in &span.indices {
                covered[i] = true;
            }
            positions.push(if span.is_seq {
                Position::ChoiceSeq(span.choice_idx)
            } else {
                Position::ChoiceFlat(span.choice_idx)
            });
            continue;
        }
        if let Some(span) = subst_spans.iter().find(|s| s.min_index == idx) {
            for &i in &span.indices {
                covered[i] = true;
            }
            positions.push(Position::Substitute(span.seq_idx));
            continue;
        }
        covered[idx] = true;
        positions.push(Position::Simple(idx));
    }
    positions
}

fn slots_needed(data: &ElementData, pos: &Position) -> usize {
    match pos {
        Position::Simple(idx) => {
            let p = &data.particles[*idx];
            if p.is_array() {
                p.max_occurs as usize + if p.max_occurs_changed { 1 } else { 0 }
            } else {
                1
            }
        }
        Position::ChoiceFlat(_) | Position::Substitute(_) => 1,
        Position::ChoiceSeq(ci) => {
            1 + data.choices[ci]
                .choice_sequences
                .iter()
                .map(|alt| alt.len().saturating_sub(1))
                .sum::<usize>()
        }
    }
}

/// Whether a position cannot be skipped — i.e. whether reaching it forces
/// at least one of its particles to be read before the type can end. Used
/// only to find the last such position (spec step A); `Choice`/`Substitute`
/// groups look at the *original* (pre-relaxation) occurs, since every
/// individual branch particle's own `min_occurs` is forced to `0` once it
/// joins a choice.
fn position_is_mandatory(data: &ElementData, pos: &Position) -> bool {
    match pos {
        Position::Simple(idx) => !data.particles[*idx].is_optional(),
        Position::ChoiceFlat(ci) | Position::ChoiceSeq(ci) => data.choices[ci]
            .choice_items
            .iter()
            .any(|&(_, i)| matches!(data.particles[i].min_occurs_old, Some(n) if n >= 1)),
        Position::Substitute(si) => data.abstract_sequences[si].min_occurs >= 1,
    }
}

#[allow(clippy::too_many_arguments)]
fn fill_position(
    data: &ElementData,
    pos: &Position,
    this_entry: u32,
    next_entry: u32,
    end_allowed: bool,
    error_grammar_id: u32,
    builder: &mut Builder,
    particle_next_grammar: &mut HashMap<usize, u32>,
) {
    match pos {
        Position::Simple(idx) => {
            let particle = &data.particles[*idx];
            if particle.is_array() {
                fill_array(
                    data,
                    *idx,
                    this_entry,
                    next_entry,
                    end_allowed,
                    error_grammar_id,
                    builder,
                    particle_next_grammar,
                );
            } else {
                let mut details = Vec::new();
                if end_allowed {
                    details.push(GrammarDetail::EndElement {
                        event_code: 0,
                        next_grammar: error_grammar_id,
                    });
                }
                let event_code = details.len() as u32;
                details.push(GrammarDetail::start(*idx, event_code, next_entry));
                builder.set(this_entry, details);
                particle_next_grammar.insert(*idx, next_entry);
            }
        }
        Position::ChoiceFlat(ci) => {
            fill_choice_group(
                data,
                &data.choices[*ci].choice_items,
                this_entry,
                next_entry,
                end_allowed,
                error_grammar_id,
                builder,
                particle_next_grammar,
            );
        }
        Position::Substitute(si) => {
            let members: Vec<(String, usize)> = data
                .particles
                .iter()
                .enumerate()
                .filter(|(_, p)| data.abstract_sequences[*si].names.contains(&p.name))
                .map(|(i, p)| (p.name.clone(), i))
                .collect();
            fill_choice_group(
                data,
                &members,
                this_entry,
                next_entry,
                end_allowed,
                error_grammar_id,
                builder,
                particle_next_grammar,
            );
        }
        Position::ChoiceSeq(ci) => {
            fill_choice_of_sequences(
                data,
                *ci,
                this_entry,
                next_entry,
                end_allowed,
                error_grammar_id,
                builder,
                particle_next_grammar,
            );
        }
    }
}

/// A flat choice or a substitution group's members: one shared grammar,
/// alphabetically ordered `START` events, every branch converging directly
/// on `next_entry` (spec §8 scenarios 4 and 5).
#[allow(clippy::too_many_arguments)]
fn fill_choice_group(
    _data: &ElementData,
    members: &[(String, usize)],
    this_entry: u32,
    next_entry: u32,
    end_allowed: bool,
    error_grammar_id: u32,
    builder: &mut Builder,
    particle_next_grammar: &mut HashMap<usize, u32>,
) {
    let mut sorted: Vec<&(String, usize)> = members.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut details = Vec::new();
    if end_allowed {
        details.push(GrammarDetail::EndElement {
            event_code: 0,
            next_grammar: error_grammar_id,
        });
    }
    for &(_, particle_index) in &sorted {
        let event_code = details.len() as u32;
        details.push(GrammarDetail::start(*particle_index, event_code, next_entry));
        particle_next_grammar.insert(*particle_index, next_entry);
    }
    builder.set(this_entry, details);
}

/// A choice of multi-member sequences (spec §4.1 item 7 / §4.2.1 step B):
/// one shared leader grammar with one `START` per alternative, each
/// pointing at that alternative's own interior chain (or straight at
/// `next_entry` for a single-member alternative); interior members of a
/// multi-member alternative get ordinary single-event grammars threaded
/// only from their own predecessor, never exposed as their own choice
/// event — "group leader only; interior members skipped" (spec step B).
#[allow(clippy::too_many_arguments)]
fn fill_choice_of_sequences(
    data: &ElementData,
    choice_idx: usize,
    this_entry: u32,
    next_entry: u32,
    end_allowed: bool,
    error_grammar_id: u32,
    builder: &mut Builder,
    particle_next_grammar: &mut HashMap<usize, u32>,
) {
    let choice = &data.choices[choice_idx];
    let mut leader_details = Vec::new();
    if end_allowed {
        leader_details.push(GrammarDetail::EndElement {
            event_code: 0,
            next_grammar: error_grammar_id,
        });
    }

    // Interior grammars are reserved right after the leader grammar, in
    // the same alternative order used when counting slots in
    // `slots_needed`.
    let mut cursor = this_entry + 1;
    for alt in &choice.choice_sequences {
        let Some(&(_, leader_idx)) = alt.first() else {
            continue;
        };
        let interior = &alt[1..];
        let leader_next = if interior.is_empty() {
            next_entry
        } else {
            cursor
        };

        let event_code = leader_details.len() as u32;
        leader_details.push(GrammarDetail::start(leader_idx, event_code, leader_next));
        particle_next_grammar.insert(leader_idx, leader_next);

        for (k, &(_, member_idx)) in interior.iter().enumerate() {
            let gid = cursor + k as u32;
            let particle = &data.particles[member_idx];
            let is_last_in_alt = k + 1 == interior.len();
            let nxt = if is_last_in_alt {
                next_entry
            } else {
                cursor + k as u32 + 1
            };
            let mut details = Vec::new();
            if particle.is_optional() {
                details.push(GrammarDetail::EndElement {
                    event_code: 0,
                    next_grammar: error_grammar_id,
                });
            }
            let ec = details.len() as u32;
            details.push(GrammarDetail::start(member_idx, ec, nxt));
            builder.set(gid, details);
            particle_next_grammar.insert(member_idx, nxt);
        }
        cursor += interior.len() as u32;
    }
    builder.set(this_entry, leader_details);
}

/// An array particle (spec §4.1 item 10 / §4.2.1 step E): `max_occurs`
/// grammars, each a single `START`, threaded occurrence-to-occurrence. Only
/// the first occurrence's grammar can carry the group's `END` (spec step D
/// applies once per position, not once per occurrence). If the configured
/// occurrence cap rewrote a larger declared `maxOccurs`, one more grammar is
/// appended after the last occurrence to represent "no more occurrences",
/// marked `is_extra_grammar`.
#[allow(clippy::too_many_arguments)]
fn fill_array(
    data: &ElementData,
    idx: usize,
    this_entry: u32,
    next_entry: u32,
    end_allowed: bool,
    error_grammar_id: u32,
    builder: &mut Builder,
    particle_next_grammar: &mut HashMap<usize, u32>,
) {
    let particle = &data.particles[idx];
    let n = particle.max_occurs;

    for occurrence in 1..=n {
        let gid = this_entry + (occurrence - 1);
        let is_last = occurrence == n;
        let next_grammar = if is_last {
            if particle.max_occurs_changed {
                this_entry + n // the synthetic "no more" grammar
            } else {
                next_entry
            }
        } else {
            gid + 1
        };

        let mut details = Vec::new();
        if occurrence == 1 && end_allowed {
            details.push(GrammarDetail::EndElement {
                event_code: 0,
                next_grammar: error_grammar_id,
            });
        }
        let event_code = details.len() as u32;
        details.push(GrammarDetail::StartParticle {
            particle_index: idx,
            event_code,
            next_grammar,
            is_in_array_last: is_last,
            is_in_array_not_last: !is_last,
            is_extra_grammar: false,
            any_is_dummy: false,
        });
        builder.set(gid, details);
        if occurrence == 1 {
            particle_next_grammar.insert(idx, next_grammar);
        }
    }

    if particle.max_occurs_changed {
        let extra_gid = this_entry + n;
        builder.set(
            extra_gid,
            vec![GrammarDetail::StartParticle {
                particle_index: idx,
                event_code: 0,
                next_grammar: next_entry,
                is_in_array_last: false,
                is_in_array_not_last: false,
                is_extra_grammar: true,
                any_is_dummy: false,
            }],
        );
    }
}

/// Checks the invariants the emission layer relies on: every `next_grammar`
/// resolves within this table, and bit width is 0 only for all-ERROR
/// grammars.
fn validate(data: &ElementData, grammars: &[ElementGrammar]) -> Result<(), GrammarError> {
    let grammar_count = grammars.len() as u32;
    for grammar in grammars {
        for detail in &grammar.details {
            let target = match detail {
                GrammarDetail::StartParticle { next_grammar, .. }
                | GrammarDetail::EndElement { next_grammar, .. } => Some(*next_grammar),
                GrammarDetail::Error => None,
            };
            if let Some(target) = target {
                if target >= grammar_count {
                    return Err(GrammarError::DanglingNextGrammar {
                        type_name: data.name.clone(),
                        particle: format!("grammar {} -> {}", grammar.id, target),
                    });
                }
            }
        }
        let has_real_event = grammar.details.iter().any(|d| d.event_code().is_some());
        if grammar.bit_width() == 0 && has_real_event {
            return Err(GrammarError::InvariantViolation {
                type_name: data.name.clone(),
                detail: format!("grammar {} has events but bit width 0", grammar.id),
            });
        }
    }

    // Invariant 3 / P1: a non-empty table's last two grammars are always
    // END then ERROR.
    if grammars.len() < 2 {
        return Err(GrammarError::InvariantViolation {
            type_name: data.name.clone(),
            detail: "grammar table is shorter than the required END/ERROR pair".to_string(),
        });
    }
    let end = &grammars[grammars.len() - 2];
    let error = &grammars[grammars.len() - 1];
    let ends_with_end_then_error = matches!(end.details.as_slice(), [GrammarDetail::EndElement { .. }])
        && matches!(error.details.as_slice(), [GrammarDetail::Error]);
    if !ends_with_end_then_error {
        return Err(GrammarError::InvariantViolation {
            type_name: data.name.clone(),
            detail: "grammar table must end with an END grammar followed by an ERROR grammar"
                .to_string(),
        });
    }
    Ok(())
}

/// Builds the flat root-dispatcher table used for the namespace-level
/// "one of N" selector: a single non-terminal grammar whose
/// details are one `StartParticle` per alphabetically sorted top-level
/// message type, each pointing at the shared `END` continuation — no
/// per-particle recursion, since at most one root element occurs per
/// document.
fn build_namespace_table(data: &ElementData) -> GrammarTable {
    const END_GRAMMAR: u32 = 1;
    const ERROR_GRAMMAR: u32 = 2;
    let mut details = Vec::with_capacity(data.particles.len());
    let mut particle_next_grammar = HashMap::new();
    for (i, _) in data.particles.iter().enumerate() {
        details.push(GrammarDetail::start(i, i as u32, END_GRAMMAR));
        particle_next_grammar.insert(i, END_GRAMMAR);
    }
    let dispatch = ElementGrammar { id: 0, details };
    let end = ElementGrammar {
        id: END_GRAMMAR,
        details: vec![GrammarDetail::EndElement {
            event_code: 0,
            next_grammar: ERROR_GRAMMAR,
        }],
    };
    let error = ElementGrammar {
        id: ERROR_GRAMMAR,
        details: vec![GrammarDetail::Error],
    };
    GrammarTable {
        type_name: data.name.clone(),
        grammars: vec![dispatch, end, error],
        particle_next_grammar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ElementData;

    fn particle(name: &str, min_occurs: u32, max_occurs: u32) -> Particle {
        let mut p = Particle::new(name);
        p.min_occurs = min_occurs;
        p.max_occurs = max_occurs;
        p
    }

    /// Scenario 1: scalar int, mandatory.
    #[test]
    fn mandatory_scalar_has_no_end_and_points_at_end_element() {
        let mut data = ElementData::new("T");
        data.particles.push(particle("x", 1, 1));
        let table = build_grammar_table(&data).unwrap();
        assert_eq!(table.grammars.len(), 3);
        assert_eq!(table.grammars[0].details.len(), 1);
        assert_eq!(table.grammars[0].bit_width(), 1);
        match &table.grammars[0].details[0] {
            GrammarDetail::StartParticle { event_code, next_grammar, .. } => {
                assert_eq!(*event_code, 0);
                assert_eq!(*next_grammar, 1); // grammar_end_element
            }
            other => panic!("expected StartParticle, got {other:?}"),
        }
        assert!(matches!(
            table.grammars[1].details[0],
            GrammarDetail::EndElement { .. }
        ));
        assert!(matches!(table.grammars[2].details[0], GrammarDetail::Error));
    }

    /// Scenario 2: optional scalar.
    #[test]
    fn optional_scalar_prepends_end_with_lower_event_code() {
        let mut data = ElementData::new("T");
        data.particles.push(particle("x", 0, 1));
        let table = build_grammar_table(&data).unwrap();
        let g0 = &table.grammars[0];
        assert_eq!(g0.details.len(), 2);
        match &g0.details[0] {
            GrammarDetail::EndElement { event_code, next_grammar } => {
                assert_eq!(*event_code, 0);
                assert_eq!(*next_grammar, 2); // grammar_unknown
            }
            other => panic!("expected EndElement, got {other:?}"),
        }
        match &g0.details[1] {
            GrammarDetail::StartParticle { event_code, next_grammar, .. } => {
                assert_eq!(*event_code, 1);
                assert_eq!(*next_grammar, 1); // grammar_end_element
            }
            other => panic!("expected StartParticle, got {other:?}"),
        }
        assert_eq!(g0.bit_width(), 2);
    }

    /// Scenario 3: bounded array.
    #[test]
    fn bounded_array_emits_one_grammar_per_occurrence() {
        let mut data = ElementData::new("T");
        data.particles.push(particle("xs", 0, 3));
        let table = build_grammar_table(&data).unwrap();
        // 3 occurrence grammars + END + ERROR.
        assert_eq!(table.grammars.len(), 5);

        let g0 = &table.grammars[0];
        assert_eq!(g0.details.len(), 2);
        assert!(matches!(g0.details[0], GrammarDetail::EndElement { .. }));
        match &g0.details[1] {
            GrammarDetail::StartParticle {
                next_grammar,
                is_in_array_not_last,
                is_in_array_last,
                ..
            } => {
                assert_eq!(*next_grammar, 1);
                assert!(*is_in_array_not_last);
                assert!(!*is_in_array_last);
            }
            other => panic!("expected StartParticle, got {other:?}"),
        }

        let g1 = &table.grammars[1];
        assert_eq!(g1.details.len(), 1);
        match &g1.details[0] {
            GrammarDetail::StartParticle { next_grammar, is_in_array_not_last, .. } => {
                assert_eq!(*next_grammar, 2);
                assert!(*is_in_array_not_last);
            }
            other => panic!("expected StartParticle, got {other:?}"),
        }

        let g2 = &table.grammars[2];
        assert_eq!(g2.details.len(), 1);
        match &g2.details[0] {
            GrammarDetail::StartParticle {
                next_grammar,
                is_in_array_last,
                is_in_array_not_last,
                ..
            } => {
                assert_eq!(*next_grammar, 3); // grammar_end_element
                assert!(*is_in_array_last);
                assert!(!*is_in_array_not_last);
            }
            other => panic!("expected StartParticle, got {other:?}"),
        }

        assert!(matches!(
            table.grammars[3].details[0],
            GrammarDetail::EndElement { .. }
        ));
        assert!(matches!(table.grammars[4].details[0], GrammarDetail::Error));
    }

    #[test]
    fn array_cap_adds_extra_trailing_grammar() {
        let mut data = ElementData::new("T");
        let mut p = particle("xs", 0, 2);
        p.max_occurs_changed = true;
        p.max_occurs_old = Some(20);
        data.particles.push(p);
        let table = build_grammar_table(&data).unwrap();
        // 2 occurrence grammars + 1 extra + END + ERROR.
        assert_eq!(table.grammars.len(), 5);
        match &table.grammars[1].details[0] {
            GrammarDetail::StartParticle { next_grammar, .. } => assert_eq!(*next_grammar, 2),
            other => panic!("expected StartParticle, got {other:?}"),
        }
        match &table.grammars[2].details[0] {
            GrammarDetail::StartParticle { next_grammar, is_extra_grammar, .. } => {
                assert_eq!(*next_grammar, 3); // grammar_end_element
                assert!(*is_extra_grammar);
            }
            other => panic!("expected StartParticle, got {other:?}"),
        }
    }

    #[test]
    fn empty_type_grammar_is_end_then_error() {
        let data = ElementData::new("Empty");
        let table = build_grammar_table(&data).unwrap();
        assert_eq!(table.grammars.len(), 2);
        assert!(matches!(
            table.grammars[0].details[0],
            GrammarDetail::EndElement { .. }
        ));
        assert!(matches!(table.grammars[1].details[0], GrammarDetail::Error));
        assert_eq!(table.grammars[1].bit_width(), 0);
    }

    #[test]
    fn unbounded_high_occurs_rejected_as_loop() {
        let mut data = ElementData::new("T");
        data.particles.push(particle("Item", 0, 30));
        let err = build_grammar_table(&data).unwrap_err();
        assert!(matches!(err, GrammarError::LoopNotImplemented { .. }));
    }

    #[test]
    fn namespace_dispatcher_has_one_start_per_particle_and_shared_end() {
        let mut data = ElementData::new("exiDocument");
        data.is_in_namespace_elements = true;
        data.particles.push(particle("AuthorizationReq", 0, 1));
        data.particles.push(particle("AuthorizationRes", 0, 1));
        data.particles.push(particle("SessionSetupReq", 0, 1));
        let table = build_grammar_table(&data).unwrap();
        assert_eq!(table.grammars.len(), 3);
        assert_eq!(table.grammars[0].details.len(), 3);
        for (i, detail) in table.grammars[0].details.iter().enumerate() {
            match detail {
                GrammarDetail::StartParticle {
                    particle_index,
                    event_code,
                    next_grammar,
                    ..
                } => {
                    assert_eq!(*particle_index, i);
                    assert_eq!(*event_code, i as u32);
                    assert_eq!(*next_grammar, 1);
                }
                other => panic!("expected StartParticle, got {other:?}"),
            }
        }
        assert_eq!(table.particle_next_grammar.len(), 3);
        assert!(table.particle_next_grammar.values().all(|&next| next == 1));
        assert!(matches!(
            table.grammars[1].details[0],
            GrammarDetail::EndElement {
                event_code: 0,
                next_grammar: 2
            }
        ));
        assert!(matches!(table.grammars[2].details[0], GrammarDetail::Error));
    }

    /// Scenario 4: two-alternative choice, both scalar, mandatory overall.
    #[test]
    fn flat_choice_shares_one_grammar_with_no_end() {
        let mut data = ElementData::new("T");
        let mut a = particle("a", 0, 1);
        a.min_occurs_old = Some(1);
        let mut b = particle("b", 0, 1);
        b.min_occurs_old = Some(1);
        data.particles.push(a);
        data.particles.push(b);
        data.has_choice = true;
        data.choices.push(Choice {
            choice_items: vec![("a".to_string(), 0), ("b".to_string(), 1)],
            choice_sequences: Vec::new(),
            min_occurs: 0,
            multi_choice_max: 1,
            is_multi_choice: false,
        });
        let table = build_grammar_table(&data).unwrap();
        // One shared grammar for the choice, then END/ERROR.
        assert_eq!(table.grammars.len(), 3);
        let g0 = &table.grammars[0];
        assert_eq!(g0.details.len(), 2);
        for detail in &g0.details {
            match detail {
                GrammarDetail::StartParticle { next_grammar, .. } => assert_eq!(*next_grammar, 1),
                other => panic!("expected StartParticle, got {other:?}"),
            }
        }
        let codes: Vec<u32> = g0
            .details
            .iter()
            .map(|d| match d {
                GrammarDetail::StartParticle { event_code, .. } => *event_code,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(codes, vec![0, 1]);
    }

    /// Scenario 5: substitution group, optional, alphabetically ordered.
    #[test]
    fn substitution_group_shares_one_grammar_with_end() {
        let mut data = ElementData::new("T");
        data.particles.push(particle("C", 0, 1));
        data.particles.push(particle("D", 0, 1));
        data.has_abstract_sequence = true;
        data.abstract_sequences.push(crate::model::AbstractSequence {
            names: vec!["C".to_string(), "D".to_string()],
            min_occurs: 0,
            max_occurs: 1,
        });
        let table = build_grammar_table(&data).unwrap();
        assert_eq!(table.grammars.len(), 3);
        let g0 = &table.grammars[0];
        assert_eq!(g0.details.len(), 3);
        assert!(matches!(g0.details[0], GrammarDetail::EndElement { event_code: 0, next_grammar: 2 }));
        match &g0.details[1] {
            GrammarDetail::StartParticle { particle_index, event_code, next_grammar, .. } => {
                assert_eq!(*particle_index, 0); // C
                assert_eq!(*event_code, 1);
                assert_eq!(*next_grammar, 1);
            }
            other => panic!("expected StartParticle, got {other:?}"),
        }
        match &g0.details[2] {
            GrammarDetail::StartParticle { particle_index, event_code, next_grammar, .. } => {
                assert_eq!(*particle_index, 1); // D
                assert_eq!(*event_code, 2);
                assert_eq!(*next_grammar, 1);
            }
            other => panic!("expected StartParticle, got {other:?}"),
        }
    }

    /// Choice-of-sequences: each alternative's own interior member is only
    /// reachable through its leader, never its own top-level choice event.
    #[test]
    fn choice_of_sequences_threads_through_each_alternative() {
        let mut data = ElementData::new("T");
        data.particles.push(particle("A1", 1, 1));
        data.particles.push(particle("A2", 1, 1));
        data.particles.push(particle("B1", 1, 1));
        data.particles.push(particle("B2", 1, 1));
        data.has_choice = true;
        data.choices.push(Choice {
            choice_items: vec![
                ("A1".to_string(), 0),
                ("A2".to_string(), 1),
                ("B1".to_string(), 2),
                ("B2".to_string(), 3),
            ],
            choice_sequences: vec![
                vec![("A1".to_string(), 0), ("A2".to_string(), 1)],
                vec![("B1".to_string(), 2), ("B2".to_string(), 3)],
            ],
            min_occurs: 0,
            multi_choice_max: 2,
            is_multi_choice: true,
        });
        let table = build_grammar_table(&data).unwrap();
        // Leader grammar + one interior grammar per alternative + END + ERROR.
        assert_eq!(table.grammars.len(), 5);

        let leader = &table.grammars[0];
        assert_eq!(leader.details.len(), 2);
        match &leader.details[0] {
            GrammarDetail::StartParticle { particle_index, next_grammar, .. } => {
                assert_eq!(*particle_index, 0); // A1
                assert_eq!(*next_grammar, 1); // A2's own grammar
            }
            other => panic!("expected StartParticle, got {other:?}"),
        }
        match &leader.details[1] {
            GrammarDetail::StartParticle { particle_index, next_grammar, .. } => {
                assert_eq!(*particle_index, 2); // B1
                assert_eq!(*next_grammar, 2); // B2's own grammar
            }
            other => panic!("expected StartParticle, got {other:?}"),
        }

        // A2 converges on the shared terminal state after the whole group.
        match &table.grammars[1].details[0] {
            GrammarDetail::StartParticle { particle_index, next_grammar, .. } => {
                assert_eq!(*particle_index, 1);
                assert_eq!(*next_grammar, 3); // grammar_end_element
            }
            other => panic!("expected StartParticle, got {other:?}"),
        }
        // B2 converges the same way.
        match &table.grammars[2].details[0] {
            GrammarDetail::StartParticle { particle_index, next_grammar, .. } => {
                assert_eq!(*particle_index, 3);
                assert_eq!(*next_grammar, 3);
            }
            other => panic!("expected StartParticle, got {other:?}"),
        }

        assert!(matches!(
            table.grammars[3].details[0],
            GrammarDetail::EndElement { .. }
        ));
        assert!(matches!(table.grammars[4].details[0], GrammarDetail::Error));
    }
}

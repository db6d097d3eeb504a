//! Dependency Orderer: topologically sorts generated types so
//! every type is emitted after the types its particles reference.
//!
//! The original generator re-sorts by repeatedly scanning the list and
//! moving unresolved entries to the back, bounded by a configured
//! `cycle_attempt_limit` iteration guard. Kahn's algorithm replaces that
//! with a single linear pass and a real cycle diagnosis
//! instead of "ran out of attempts".

use std::collections::{HashMap, VecDeque};

use crate::error::GrammarError;
use crate::model::ElementData;

/// Sort `elements` so that for every particle referencing another
/// generated type, that type appears earlier in the result.
pub fn topological_sort(elements: Vec<ElementData>) -> Result<Vec<ElementData>, GrammarError> {
    let index_of: HashMap<&str, usize> = elements
        .iter()
        .enumerate()
        .map(|(i, e)| (e.name.as_str(), i))
        .collect();

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); elements.len()];
    let mut remaining_deps: Vec<usize> = vec![0; elements.len()];

    for (i, element) in elements.iter().enumerate() {
        let mut seen = std::collections::HashSet::new();
        for particle in &element.particles {
            if particle.type_short.is_empty() || particle.type_short == element.name {
                continue;
            }
            if let Some(&dep_index) = index_of.get(particle.type_short.as_str()) {
                if seen.insert(dep_index) {
                    dependents[dep_index].push(i);
                    remaining_deps[i] += 1;
                }
            }
        }
        if !element.base_type.is_empty() && element.base_type != element.name {
            if let Some(&dep_index) = index_of.get(element.base_type.as_str()) {
                if seen.insert(dep_index) {
                    dependents[dep_index].push(i);
                    remaining_deps[i] += 1;
                }
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..elements.len())
        .filter(|&i| remaining_deps[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(elements.len());

    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &dependent in &dependents[i] {
            remaining_deps[dependent] -= 1;
            if remaining_deps[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() != elements.len() {
        let stuck = (0..elements.len())
            .find(|&i| remaining_deps[i] > 0)
            .map(|i| elements[i].name.clone())
            .unwrap_or_default();
        return Err(GrammarError::Cycle(stuck));
    }

    let mut elements: Vec<Option<ElementData>> = elements.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .map(|i| elements[i].take().expect("each index visited once"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Particle;

    fn type_with_dep(name: &str, dep: &str) -> ElementData {
        let mut data = ElementData::new(name.to_string());
        if !dep.is_empty() {
            let mut p = Particle::new("field");
            p.type_short = dep.to_string();
            data.particles.push(p);
        }
        data
    }

    #[test]
    fn dependencies_precede_dependents() {
        let elements = vec![
            type_with_dep("Outer", "Inner"),
            type_with_dep("Inner", ""),
        ];
        let sorted = topological_sort(elements).unwrap();
        let inner_pos = sorted.iter().position(|e| e.name == "Inner").unwrap();
        let outer_pos = sorted.iter().position(|e| e.name == "Outer").unwrap();
        assert!(inner_pos < outer_pos);
    }

    #[test]
    fn self_reference_is_not_a_cycle() {
        let elements = vec![type_with_dep("Node", "Node")];
        let sorted = topological_sort(elements).unwrap();
        assert_eq!(sorted.len(), 1);
    }

    #[test]
    fn genuine_cycle_is_reported() {
        let elements = vec![type_with_dep("A", "B"), type_with_dep("B", "A")];
        let err = topological_sort(elements).unwrap_err();
        assert!(matches!(err, GrammarError::Cycle(_)));
    }
}

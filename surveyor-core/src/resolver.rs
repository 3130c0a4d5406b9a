//! Question ordering constraints
//!
//! Every edge points from a question to one that precedes it in survey
//! order. Forward references and self references are rejected when the
//! graph is built, so a successfully resolved graph is always acyclic.

use crate::error::{Result, SurveyError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Why a question depends on an earlier one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Skip,
    Piping,
    Memory,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dependency {
    pub on: usize,
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DependencyGraph {
    names: Vec<String>,
    edges: Vec<BTreeSet<Dependency>>,
    predecessors: Vec<BTreeSet<usize>>,
    memory: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Resolve named references into a graph.
    ///
    /// `references[i]` lists the questions question `i` depends on, with the
    /// kind of each dependency. Memory references keep their survey order as
    /// the question's memory list.
    pub fn resolve(
        names: Vec<String>,
        references: Vec<Vec<(String, DependencyKind)>>,
    ) -> Result<Self> {
        let index: HashMap<&str, usize> =
            names.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
        let mut edges = vec![BTreeSet::new(); names.len()];

        for (i, refs) in references.iter().enumerate() {
            let Some(name) = names.get(i) else {
                break;
            };
            for (reference, kind) in refs {
                let j = *index.get(reference.as_str()).ok_or_else(|| SurveyError::UnknownQuestion {
                    question: name.clone(),
                    reference: reference.clone(),
                })?;
                if j == i {
                    return Err(SurveyError::DependencyCycle(vec![name.clone(), name.clone()]));
                }
                if j > i {
                    return Err(SurveyError::ForwardReference {
                        question: name.clone(),
                        reference: reference.clone(),
                    });
                }
                edges[i].insert(Dependency { on: j, kind: *kind });
            }
        }

        let predecessors: Vec<BTreeSet<usize>> =
            edges.iter().map(|deps| deps.iter().map(|d| d.on).collect()).collect();
        let memory: Vec<Vec<usize>> = edges
            .iter()
            .map(|deps| {
                let set: BTreeSet<usize> = deps
                    .iter()
                    .filter(|d| d.kind == DependencyKind::Memory)
                    .map(|d| d.on)
                    .collect();
                set.into_iter().collect()
            })
            .collect();
        let order = topological_order(&names, &predecessors)?;

        Ok(Self { names, edges, predecessors, memory, order })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Direct predecessors of question `i`, regardless of kind
    pub fn predecessors(&self, i: usize) -> &BTreeSet<usize> {
        &self.predecessors[i]
    }

    pub fn dependencies(&self, i: usize) -> &BTreeSet<Dependency> {
        &self.edges[i]
    }

    /// Questions whose text and answer are embedded in question `i`'s prompt
    pub fn memory(&self, i: usize) -> &[usize] {
        &self.memory[i]
    }

    /// Execution order, stable by survey position among independent questions
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Questions with no predecessors
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.predecessors.iter().enumerate().filter(|(_, p)| p.is_empty()).map(|(i, _)| i)
    }
}

/// Kahn's algorithm, always releasing the lowest ready index first
fn topological_order(names: &[String], predecessors: &[BTreeSet<usize>]) -> Result<Vec<usize>> {
    let n = names.len();
    let mut remaining: Vec<usize> = predecessors.iter().map(BTreeSet::len).collect();
    let mut successors = vec![Vec::new(); n];
    for (i, preds) in predecessors.iter().enumerate() {
        for &p in preds {
            successors[p].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &s in &successors[i] {
            remaining[s] -= 1;
            if remaining[s] == 0 {
                ready.insert(s);
            }
        }
    }

    if order.len() != n {
        let cycle = (0..n).filter(|&i| remaining[i] > 0).map(|i| names[i].clone()).collect();
        return Err(SurveyError::DependencyCycle(cycle));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use DependencyKind::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    fn refs(r: &[(&str, DependencyKind)]) -> Vec<(String, DependencyKind)> {
        r.iter().map(|(n, k)| (n.to_string(), *k)).collect()
    }

    #[test]
    fn test_resolve_predecessors_and_memory() {
        let graph = DependencyGraph::resolve(
            names(&["q0", "q1", "q2", "q3"]),
            vec![
                vec![],
                refs(&[("q0", Skip)]),
                vec![],
                refs(&[("q2", Memory), ("q0", Memory), ("q1", Piping)]),
            ],
        )
        .unwrap();

        assert_eq!(graph.predecessors(1), &BTreeSet::from([0]));
        assert_eq!(graph.predecessors(3), &BTreeSet::from([0, 1, 2]));
        assert_eq!(graph.memory(3), &[0, 2]);
        assert_eq!(graph.order(), &[0, 1, 2, 3]);
        assert_eq!(graph.roots().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_reject_bad_references() {
        let references = vec![refs(&[("q1", Piping)]), vec![]];
        let err = DependencyGraph::resolve(names(&["q0", "q1"]), references).unwrap_err();
        assert_eq!(
            err,
            SurveyError::ForwardReference { question: "q0".into(), reference: "q1".into() }
        );

        let err =
            DependencyGraph::resolve(names(&["q0"]), vec![refs(&[("q0", Skip)])]).unwrap_err();
        assert_eq!(err, SurveyError::DependencyCycle(names(&["q0", "q0"])));

        let err =
            DependencyGraph::resolve(names(&["q0"]), vec![refs(&[("nope", Memory)])]).unwrap_err();
        assert!(matches!(err, SurveyError::UnknownQuestion { .. }));
    }

    #[test]
    fn test_topological_order_detects_cycle() {
        let preds = vec![BTreeSet::from([1]), BTreeSet::from([0]), BTreeSet::new()];
        let err = topological_order(&names(&["a", "b", "c"]), &preds).unwrap_err();
        assert_eq!(err, SurveyError::DependencyCycle(names(&["a", "b"])));
    }
}

//! Dependency-respecting effect ordering
//!
//! Effects form a graph: declared `after` labels are explicit edges, and
//! (unless disabled) every effect that provides an account gets an edge to
//! every other effect that requires it. The order is produced with Kahn's
//! algorithm; among ready effects the lowest `(priority, declaration index)`
//! goes first, so the output is fully deterministic.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use tracing::debug;

use crate::tx_builder::derive::AddressDeriver;
use crate::tx_builder::effects::{EffectError, PlannedEffect};
use crate::tx_builder::errors::{DependencyError, PipelineError};

#[derive(Debug, Clone)]
pub struct InstructionSequencer {
    deriver: AddressDeriver,
    infer_account_edges: bool,
}

impl InstructionSequencer {
    pub fn new(deriver: AddressDeriver) -> Self {
        Self {
            deriver,
            infer_account_edges: true,
        }
    }

    /// Only honor declared `after` edges
    pub fn without_inference(mut self) -> Self {
        self.infer_account_edges = false;
        self
    }

    /// Order `effects` so that every edge is respected
    ///
    /// # Errors
    ///
    /// - `DependencyError::DuplicateLabel` / `UnknownDependency` for malformed input
    /// - `DependencyError::CyclicDependency` when no valid order exists
    /// - `DerivationError` if an account needed for inference cannot be derived
    pub fn sequence(&self, effects: Vec<PlannedEffect>) -> Result<Vec<PlannedEffect>, PipelineError> {
        let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(effects.len());
        for (index, planned) in effects.iter().enumerate() {
            if index_of.insert(planned.label.as_str(), index).is_some() {
                return Err(DependencyError::DuplicateLabel {
                    index,
                    label: planned.label.clone(),
                }
                .into());
            }
        }

        // (before, after)
        let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();

        for (index, planned) in effects.iter().enumerate() {
            for dep in &planned.after {
                let before = *index_of.get(dep.as_str()).ok_or_else(|| DependencyError::UnknownDependency {
                    index,
                    label: planned.label.clone(),
                    missing: dep.clone(),
                })?;
                edges.insert((before, index));
            }
        }

        if self.infer_account_edges {
            let declared = edges.len();
            self.infer_edges(&effects, &mut edges)?;
            debug!(declared, inferred = edges.len() - declared, "effect graph built");
        }

        let priorities: Vec<i32> = effects.iter().map(|e| e.priority).collect();
        let order = topological_order(&priorities, &edges).map_err(|unresolved| {
            DependencyError::CyclicDependency {
                unresolved: unresolved.into_iter().map(|i| effects[i].label.clone()).collect(),
            }
        })?;

        let mut slots: Vec<Option<PlannedEffect>> = effects.into_iter().map(Some).collect();
        Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
    }

    fn infer_edges(
        &self,
        effects: &[PlannedEffect],
        edges: &mut BTreeSet<(usize, usize)>,
    ) -> Result<(), PipelineError> {
        let mut providers: HashMap<_, Vec<usize>> = HashMap::new();
        for (index, planned) in effects.iter().enumerate() {
            let provided = planned
                .effect
                .provides(&self.deriver)
                .map_err(|e| effect_error(index, planned, e))?;
            for account in provided {
                providers.entry(account).or_default().push(index);
            }
        }

        for (index, planned) in effects.iter().enumerate() {
            let required = planned
                .effect
                .requires(&self.deriver)
                .map_err(|e| effect_error(index, planned, e))?;
            for account in required {
                for &provider in providers.get(&account).into_iter().flatten() {
                    if provider != index {
                        edges.insert((provider, index));
                    }
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn effect_error(index: usize, planned: &PlannedEffect, err: EffectError) -> PipelineError {
    match err {
        EffectError::Derivation(e) => PipelineError::Derivation(e),
        other => PipelineError::effect_failed(index, planned.label.clone(), other),
    }
}

/// Kahn's algorithm with a `(priority, index)` min-heap as the ready set.
/// On failure returns the indices that could not be placed, in declaration order.
fn topological_order(priorities: &[i32], edges: &BTreeSet<(usize, usize)>) -> Result<Vec<usize>, Vec<usize>> {
    let n = priorities.len();
    let mut indegree = vec![0usize; n];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(before, after) in edges {
        successors[before].push(after);
        indegree[after] += 1;
    }

    let mut ready: BinaryHeap<Reverse<(i32, usize)>> = (0..n)
        .filter(|&i| indegree[i] == 0)
        .map(|i| Reverse((priorities[i], i)))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse((_, node))) = ready.pop() {
        order.push(node);
        for &next in &successors[node] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.push(Reverse((priorities[next], next)));
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err((0..n).filter(|i| indegree[*i] > 0).collect())
    }
}

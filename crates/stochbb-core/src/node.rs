//! The random-variable DAG: [`Node`] variants stored in an arena owned by a
//! [`Dag`], plus the builder free functions users call to compose random
//! variables (`gamma`, `normal`, `uniform`, `delta`, `sum`/`+`, `minimum`,
//! `maximum`, `mixture`, `condchain`, `chain`).
//!
//! A [`NodeId`] is an index into the owning [`Dag`]'s arena. Because the
//! arena is append-only and a node can only reference ids created earlier in
//! construction order, the DAG is acyclic by construction — there is no
//! separate cycle check anywhere in this crate.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use stochbb_error::{ensure, StochResult};
use stochbb_utils::{Arena, ArenaKey};

use crate::atom::{AtomId, Family, Param};
use crate::config::EngineConfig;
use crate::simplify;

/// A handle into a [`Dag`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(ArenaKey);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

impl AsRef<ArenaKey> for NodeId {
    fn as_ref(&self) -> &ArenaKey {
        &self.0
    }
}

impl From<ArenaKey> for NodeId {
    fn from(key: ArenaKey) -> Self {
        NodeId(key)
    }
}

/// A vertex in the random-variable expression DAG.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Atom(AtomId, Family),
    /// `a * child + b`, `a > 0` (negation/subtraction is not supported).
    Affine(f64, NodeId, f64),
    Sum(Vec<NodeId>),
    Min(Vec<NodeId>),
    Max(Vec<NodeId>),
    /// `(weight, child)` pairs; weights sum to 1 within
    /// [`EngineConfig::mixture_weight_tolerance`].
    Mixture(Vec<(f64, NodeId)>),
    /// `if A < B then U else V`.
    CondChain(NodeId, NodeId, NodeId, NodeId),
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn ids(xs: &[NodeId]) -> String {
            xs.iter()
                .map(|n| format!("#{}", n.index()))
                .collect::<Vec<_>>()
                .join(", ")
        }
        match self {
            Node::Atom(_, family) => write!(f, "{family}"),
            Node::Affine(a, child, b) => write!(f, "Affine({a}, #{}, {b})", child.index()),
            Node::Sum(cs) => write!(f, "Sum[{}]", ids(cs)),
            Node::Min(cs) => write!(f, "Min[{}]", ids(cs)),
            Node::Max(cs) => write!(f, "Max[{}]", ids(cs)),
            Node::Mixture(parts) => {
                let s = parts
                    .iter()
                    .map(|(w, c)| format!("{w}*#{}", c.index()))
                    .collect::<Vec<_>>()
                    .join(" + ");
                write!(f, "Mixture[{s}]")
            }
            Node::CondChain(a, b, u, v) => write!(
                f,
                "CondChain(#{}, #{}, #{}, #{})",
                a.index(),
                b.index(),
                u.index(),
                v.index()
            ),
        }
    }
}

pub(crate) struct NodeEntry {
    pub node: Node,
    atoms: OnceLock<Arc<HashSet<AtomId>>>,
}

/// Owns the arena backing a family of related random variables. All
/// combinator calls that compose nodes together (`sum`, `minimum`, `maximum`,
/// `mixture`, `condchain`) require their operands to have been built from the
/// same `Dag`.
pub struct Dag {
    pub(crate) arena: Arena<NodeEntry>,
    pub(crate) config: EngineConfig,
    pub(crate) density_cache: std::sync::Mutex<
        std::collections::HashMap<NodeId, crate::domain::cell::MutCell<Option<crate::density::CachedEntry>>>,
    >,
}

impl Default for Dag {
    fn default() -> Self {
        Self::new()
    }
}

impl Dag {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            arena: Arena::new(),
            config,
            density_cache: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self
            .arena
            .get(id)
            .expect("NodeId must reference a node in this Dag")
            .node
    }

    pub(crate) fn insert_node(&mut self, node: Node) -> NodeId {
        self.arena
            .insert(NodeEntry {
                node,
                atoms: OnceLock::new(),
            })
            .into()
    }

    /// The transitive set of atoms a node depends on, memoized per node.
    pub fn atoms(&self, id: NodeId) -> Arc<HashSet<AtomId>> {
        if let Some(cached) = self.arena.get(id).and_then(|e| e.atoms.get()) {
            return Arc::clone(cached);
        }

        let computed = match self.get(id).clone() {
            Node::Atom(atom_id, family) => {
                let mut set: HashSet<AtomId> = family
                    .param_nodes()
                    .iter()
                    .flat_map(|p| self.atoms(*p).iter().copied().collect::<Vec<_>>())
                    .collect();
                set.insert(atom_id);
                set
            }
            Node::Affine(_, child, _) => (*self.atoms(child)).clone(),
            Node::Sum(cs) | Node::Min(cs) | Node::Max(cs) => {
                cs.iter().flat_map(|c| (*self.atoms(*c)).clone()).collect()
            }
            Node::Mixture(parts) => parts
                .iter()
                .flat_map(|(_, c)| (*self.atoms(*c)).clone())
                .collect(),
            Node::CondChain(a, b, u, v) => [a, b, u, v]
                .iter()
                .flat_map(|c| (*self.atoms(*c)).clone())
                .collect(),
        };

        let computed = Arc::new(computed);
        let entry = self
            .arena
            .get(id)
            .expect("NodeId must reference a node in this Dag");
        let _ = entry.atoms.set(Arc::clone(&computed));
        computed
    }

    /// Raises [`stochbb_error::StochError::Dependency`] the moment two
    /// children of an independence-requiring combinator share an atom.
    pub(crate) fn check_independent(&self, children: &[NodeId]) -> StochResult<()> {
        let sets: Vec<_> = children.iter().map(|c| self.atoms(*c)).collect();
        for i in 0..sets.len() {
            for j in (i + 1)..sets.len() {
                if !sets[i].is_disjoint(&sets[j]) {
                    tracing::error!(
                        left = children[i].index(),
                        right = children[j].index(),
                        "shared atom between children requiring independence"
                    );
                    return Err(stochbb_error::stochbb_err!(
                        Dependency: "children #{} and #{} share an atom; use ExactSampler or CondChain for correlated quantities",
                        children[i].index(),
                        children[j].index()
                    ));
                }
            }
        }
        Ok(())
    }

    // ---- builder API ----

    pub fn gamma(&mut self, k: impl Into<Param>, theta: impl Into<Param>) -> StochResult<NodeId> {
        let family = Family::Gamma {
            k: k.into(),
            theta: theta.into(),
        };
        family.validate_consts()?;
        Ok(self.insert_node(Node::Atom(AtomId::next(), family)))
    }

    pub fn normal(&mut self, mu: impl Into<Param>, sigma: impl Into<Param>) -> StochResult<NodeId> {
        let family = Family::Normal {
            mu: mu.into(),
            sigma: sigma.into(),
        };
        family.validate_consts()?;
        Ok(self.insert_node(Node::Atom(AtomId::next(), family)))
    }

    pub fn uniform(&mut self, a: impl Into<Param>, b: impl Into<Param>) -> StochResult<NodeId> {
        let family = Family::Uniform {
            a: a.into(),
            b: b.into(),
        };
        family.validate_consts()?;
        Ok(self.insert_node(Node::Atom(AtomId::next(), family)))
    }

    pub fn delta(&mut self, c: impl Into<Param>) -> StochResult<NodeId> {
        let family = Family::Delta { c: c.into() };
        Ok(self.insert_node(Node::Atom(AtomId::next(), family)))
    }

    /// `n`-ary sum of independent children, sugar for a binary `X + Y`.
    pub fn sum(&mut self, children: &[NodeId]) -> StochResult<NodeId> {
        ensure!(!children.is_empty(), Domain: "sum requires at least one child");
        simplify::build_sum(self, children.to_vec())
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> StochResult<NodeId> {
        self.sum(&[a, b])
    }

    /// Sugar for `X + constant`: absorbed into an `Affine` wrapper via the
    /// same delta-absorption rule as `sum`.
    pub fn add_const(&mut self, x: NodeId, c: f64) -> StochResult<NodeId> {
        let d = self.delta(c)?;
        self.sum(&[x, d])
    }

    /// Sugar for `a * X`, `a > 0`.
    pub fn scale(&mut self, a: f64, x: NodeId) -> StochResult<NodeId> {
        simplify::build_affine(self, a, x, 0.0)
    }

    pub fn minimum(&mut self, children: &[NodeId]) -> StochResult<NodeId> {
        ensure!(children.len() >= 2, Domain: "minimum requires at least two children");
        simplify::build_min(self, children.to_vec())
    }

    pub fn maximum(&mut self, children: &[NodeId]) -> StochResult<NodeId> {
        ensure!(children.len() >= 2, Domain: "maximum requires at least two children");
        simplify::build_max(self, children.to_vec())
    }

    pub fn mixture(&mut self, parts: &[(f64, NodeId)]) -> StochResult<NodeId> {
        ensure!(!parts.is_empty(), Domain: "mixture requires at least one component");
        simplify::build_mixture(self, parts.to_vec())
    }

    pub fn condchain(&mut self, a: NodeId, b: NodeId, u: NodeId, v: NodeId) -> StochResult<NodeId> {
        simplify::build_condchain(self, a, b, u, v)
    }

    /// Sugar for an n-ary `Sum`.
    pub fn chain(&mut self, children: &[NodeId]) -> StochResult<NodeId> {
        self.sum(children)
    }

    /// A lazy per-node density handle. Nothing is computed until `eval`,
    /// `eval_cdf` or `range_est` is called on the result.
    pub fn density(&self, id: NodeId) -> crate::density::Density<'_> {
        crate::density::Density::new(self, id)
    }

    pub fn range_est(&self, id: NodeId, eps: f64) -> StochResult<(f64, f64)> {
        crate::range::range_est(self, id, eps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_construction_ordered() {
        let mut dag = Dag::new();
        let x = dag.gamma(3.0, 10.0).unwrap();
        let y = dag.gamma(4.0, 10.0).unwrap();
        assert!(x.index() < y.index());
    }

    #[test]
    fn atoms_of_independent_atoms_are_disjoint() {
        let mut dag = Dag::new();
        let x = dag.gamma(3.0, 10.0).unwrap();
        let y = dag.gamma(4.0, 10.0).unwrap();
        assert!(dag.atoms(x).is_disjoint(&dag.atoms(y)));
    }

    #[test]
    fn sum_of_shared_atom_is_rejected() {
        let mut dag = Dag::new();
        let f = dag.uniform(0.0, 4.0).unwrap();
        let l = dag.gamma(f, 10.0).unwrap();
        let s = dag.gamma(f, 20.0).unwrap();
        assert!(dag.sum(&[l, s]).is_err());
    }

    #[test]
    fn display_prints_structural_summary() {
        let mut dag = Dag::new();
        let x = dag.gamma(10.0, 10.0).unwrap();
        assert_eq!(dag.get(x).to_string(), "Gamma(10, 10)");
    }
}

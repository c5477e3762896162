//! Fixed-point algebraic rewrite rules applied eagerly by every [`Dag`]
//! builder call: flattening, delta absorption, affine composition,
//! closed-form gamma/normal sum recognition, mixture-of-mixture flattening,
//! cond-chain canonicalization, and the independence check.
//!
//! Each `build_*` function here is the sole path the `Dag` builder methods
//! use to construct `Sum`/`Min`/`Max`/`Mixture`/`Affine`/`CondChain` nodes —
//! a node already in the arena is therefore already in canonical form, which
//! is why flattening only ever needs one pass over a node's *immediate*
//! children.

use stochbb_error::{ensure, StochResult};

use crate::atom::Family;
use crate::node::{Dag, Node, NodeId};

/// Bounds the number of rewrite passes a single combinator call may take, as
/// a guard against an infinite rewrite cycle — which would be a bug in a
/// rule, not a reachable program state.
const MAX_REWRITE_PASSES: usize = 64;

pub(crate) fn build_affine(dag: &mut Dag, a: f64, child: NodeId, b: f64) -> StochResult<NodeId> {
    ensure!(a > 0.0, NotSupported: "Affine scale must be > 0 (got {}); negation/subtraction is not supported", a);

    if let Node::Affine(a2, inner, b2) = *dag.get(child) {
        return build_affine(dag, a * a2, inner, a * b2 + b);
    }

    if a == 1.0 && b == 0.0 {
        return Ok(child);
    }

    Ok(dag.insert_node(Node::Affine(a, child, b)))
}

fn flatten<F>(dag: &Dag, children: &[NodeId], is_same_shape: F) -> Vec<NodeId>
where
    F: Fn(&Node) -> Option<Vec<NodeId>>,
{
    let mut out = Vec::with_capacity(children.len());
    for &c in children {
        if let Some(nested) = is_same_shape(dag.get(c)) {
            out.extend(nested);
        } else {
            out.push(c);
        }
    }
    out
}

fn as_gamma_const(dag: &Dag, id: NodeId) -> Option<(f64, f64)> {
    match dag.get(id) {
        Node::Atom(_, Family::Gamma { k, theta }) => Some((k.as_const()?, theta.as_const()?)),
        _ => None,
    }
}

fn as_normal_const(dag: &Dag, id: NodeId) -> Option<(f64, f64)> {
    match dag.get(id) {
        Node::Atom(_, Family::Normal { mu, sigma }) => Some((mu.as_const()?, sigma.as_const()?)),
        _ => None,
    }
}

fn as_delta_const(dag: &Dag, id: NodeId) -> Option<f64> {
    match dag.get(id) {
        Node::Atom(_, Family::Delta { c }) => c.as_const(),
        _ => None,
    }
}

pub(crate) fn build_sum(dag: &mut Dag, children: Vec<NodeId>) -> StochResult<NodeId> {
    let flattened = flatten(dag, &children, |n| match n {
        Node::Sum(cs) => Some(cs.clone()),
        _ => None,
    });

    dag.check_independent(&flattened)?;

    let mut total_delta = 0.0_f64;
    let mut rest = Vec::with_capacity(flattened.len());
    for c in flattened {
        if let Some(v) = as_delta_const(dag, c) {
            total_delta += v;
        } else {
            rest.push(c);
        }
    }

    if rest.is_empty() {
        return dag.delta(total_delta);
    }

    // Closed-form recognition: all-Gamma-with-equal-theta, or all-Normal.
    let gammas: Option<Vec<(f64, f64)>> = rest.iter().map(|&c| as_gamma_const(dag, c)).collect();
    if let Some(gammas) = gammas {
        if rest.len() >= 2 {
            let theta0 = gammas[0].1;
            if gammas.iter().all(|(_, theta)| (*theta - theta0).abs() < 1e-12) {
                let k_sum: f64 = gammas.iter().map(|(k, _)| k).sum();
                let merged = dag.gamma(k_sum, theta0)?;
                return finish_sum_with_delta(dag, merged, total_delta);
            }
        }
    }

    let normals: Option<Vec<(f64, f64)>> = rest.iter().map(|&c| as_normal_const(dag, c)).collect();
    if let Some(normals) = normals {
        if rest.len() >= 2 {
            let mu_sum: f64 = normals.iter().map(|(mu, _)| mu).sum();
            let var_sum: f64 = normals.iter().map(|(_, sigma)| sigma * sigma).sum();
            let merged = dag.normal(mu_sum, var_sum.sqrt())?;
            return finish_sum_with_delta(dag, merged, total_delta);
        }
    }

    let built = if rest.len() == 1 {
        rest[0]
    } else {
        dag.insert_node(Node::Sum(rest))
    };
    finish_sum_with_delta(dag, built, total_delta)
}

fn finish_sum_with_delta(dag: &mut Dag, built: NodeId, total_delta: f64) -> StochResult<NodeId> {
    if total_delta == 0.0 {
        Ok(built)
    } else {
        build_affine(dag, 1.0, built, total_delta)
    }
}

pub(crate) fn build_min(dag: &mut Dag, children: Vec<NodeId>) -> StochResult<NodeId> {
    let flattened = flatten(dag, &children, |n| match n {
        Node::Min(cs) => Some(cs.clone()),
        _ => None,
    });
    dag.check_independent(&flattened)?;
    Ok(if flattened.len() == 1 {
        flattened[0]
    } else {
        dag.insert_node(Node::Min(flattened))
    })
}

pub(crate) fn build_max(dag: &mut Dag, children: Vec<NodeId>) -> StochResult<NodeId> {
    let flattened = flatten(dag, &children, |n| match n {
        Node::Max(cs) => Some(cs.clone()),
        _ => None,
    });
    dag.check_independent(&flattened)?;
    Ok(if flattened.len() == 1 {
        flattened[0]
    } else {
        dag.insert_node(Node::Max(flattened))
    })
}

pub(crate) fn build_mixture(dag: &mut Dag, parts: Vec<(f64, NodeId)>) -> StochResult<NodeId> {
    let mut flattened = Vec::with_capacity(parts.len());
    let mut passes = 0;
    let mut pending = parts;
    loop {
        passes += 1;
        let mut changed = false;
        let mut next = Vec::with_capacity(pending.len());
        for (w, c) in pending {
            if let Node::Mixture(inner) = dag.get(c).clone() {
                changed = true;
                for (w2, c2) in inner {
                    next.push((w * w2, c2));
                }
            } else {
                next.push((w, c));
            }
        }
        pending = next;
        if !changed || passes >= MAX_REWRITE_PASSES {
            if passes >= MAX_REWRITE_PASSES {
                tracing::warn!("mixture flattening hit the rewrite-pass bound; stopping");
            }
            flattened = pending;
            break;
        }
    }

    let weight_sum: f64 = flattened.iter().map(|(w, _)| w).sum();
    let tol = dag.config.mixture_weight_tolerance;
    ensure!(
        (weight_sum - 1.0).abs() <= tol,
        Domain: "mixture weights must sum to 1 within {}, got {}",
        tol,
        weight_sum
    );
    for (w, _) in &flattened {
        ensure!(*w >= 0.0, Domain: "mixture weight must be >= 0, got {}", w);
    }

    let children: Vec<NodeId> = flattened.iter().map(|(_, c)| *c).collect();
    dag.check_independent(&children)?;

    Ok(if flattened.len() == 1 {
        flattened[0].1
    } else {
        dag.insert_node(Node::Mixture(flattened))
    })
}

pub(crate) fn build_condchain(
    dag: &mut Dag,
    a: NodeId,
    b: NodeId,
    u: NodeId,
    v: NodeId,
) -> StochResult<NodeId> {
    if u == v {
        return Ok(u);
    }
    Ok(dag.insert_node(Node::CondChain(a, b, u, v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_sum() {
        let mut dag = Dag::new();
        let a = dag.gamma(1.0, 5.0).unwrap();
        let b = dag.normal(0.0, 1.0).unwrap();
        let c = dag.uniform(0.0, 1.0).unwrap();
        let ab = dag.sum(&[a, b]).unwrap();
        let abc = dag.sum(&[ab, c]).unwrap();
        match dag.get(abc) {
            Node::Sum(cs) => assert_eq!(cs.len(), 3),
            other => panic!("expected flattened Sum, got {other:?}"),
        }
    }

    #[test]
    fn delta_absorption_produces_affine() {
        let mut dag = Dag::new();
        let x = dag.gamma(10.0, 10.0).unwrap();
        let z = dag.add_const(x, 20.0).unwrap();
        match dag.get(z) {
            Node::Affine(a, child, b) => {
                assert_eq!(*a, 1.0);
                assert_eq!(*b, 20.0);
                assert_eq!(*child, x);
            }
            other => panic!("expected Affine, got {other:?}"),
        }
    }

    #[test]
    fn gamma_sum_with_equal_theta_collapses() {
        let mut dag = Dag::new();
        let x1 = dag.gamma(10.0, 10.0).unwrap();
        let x2 = dag.gamma(10.0, 10.0).unwrap();
        let y = dag.sum(&[x1, x2]).unwrap();
        match dag.get(y) {
            Node::Atom(_, Family::Gamma { k, theta }) => {
                assert_eq!(k.as_const(), Some(20.0));
                assert_eq!(theta.as_const(), Some(10.0));
            }
            other => panic!("expected collapsed Gamma, got {other:?}"),
        }
    }

    #[test]
    fn normal_sum_collapses_with_sqrt_variance() {
        let mut dag = Dag::new();
        let x = dag.normal(100.0, 10.0).unwrap();
        let y = dag.normal(100.0, 10.0).unwrap();
        let z = dag.sum(&[x, y]).unwrap();
        match dag.get(z) {
            Node::Atom(_, Family::Normal { mu, sigma }) => {
                assert_eq!(mu.as_const(), Some(200.0));
                assert!((sigma.as_const().unwrap() - 200f64.sqrt()).abs() < 1e-9);
            }
            other => panic!("expected collapsed Normal, got {other:?}"),
        }
    }

    #[test]
    fn affine_composition_collapses_nested_affine() {
        let mut dag = Dag::new();
        let x = dag.gamma(3.0, 10.0).unwrap();
        let once = build_affine(&mut dag, 2.0, x, 5.0).unwrap();
        let twice = build_affine(&mut dag, 3.0, once, 1.0).unwrap();
        match dag.get(twice) {
            Node::Affine(a, child, b) => {
                assert_eq!(*a, 6.0);
                assert_eq!(*child, x);
                assert_eq!(*b, 16.0);
            }
            other => panic!("expected single composed Affine, got {other:?}"),
        }
    }

    #[test]
    fn negative_affine_scale_is_not_supported() {
        let mut dag = Dag::new();
        let x = dag.gamma(3.0, 10.0).unwrap();
        assert!(build_affine(&mut dag, -1.0, x, 0.0).is_err());
    }

    #[test]
    fn condchain_same_branch_collapses_to_branch() {
        let mut dag = Dag::new();
        let a = dag.gamma(3.0, 100.0).unwrap();
        let b = dag.gamma(3.0, 120.0).unwrap();
        let u = dag.gamma(3.0, 140.0).unwrap();
        let z = dag.condchain(a, b, u, u).unwrap();
        assert_eq!(z, u);
    }

    #[test]
    fn mixture_of_mixtures_multiplies_weights() {
        let mut dag = Dag::new();
        let a = dag.gamma(3.0, 10.0).unwrap();
        let b = dag.gamma(4.0, 10.0).unwrap();
        let c = dag.gamma(5.0, 10.0).unwrap();
        let inner = dag.mixture(&[(0.5, a), (0.5, b)]).unwrap();
        let outer = dag.mixture(&[(0.5, inner), (0.5, c)]).unwrap();
        match dag.get(outer) {
            Node::Mixture(parts) => {
                assert_eq!(parts.len(), 3);
                let total: f64 = parts.iter().map(|(w, _)| w).sum();
                assert!((total - 1.0).abs() < 1e-9);
            }
            other => panic!("expected flattened Mixture, got {other:?}"),
        }
    }

    #[test]
    fn mixture_weights_must_sum_to_one() {
        let mut dag = Dag::new();
        let a = dag.gamma(3.0, 10.0).unwrap();
        let b = dag.gamma(4.0, 10.0).unwrap();
        assert!(dag.mixture(&[(0.4, a), (0.4, b)]).is_err());
    }
}

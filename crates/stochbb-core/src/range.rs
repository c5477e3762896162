//! Quantile-interval estimation: `(lo, hi)` such that `P(X<lo) <= eps/2` and
//! `P(X>hi) <= eps/2`, recursed structurally per node type. Used both as a
//! standalone entry point (`Dag::range_est`) and internally by the density
//! engine to size convolution and compound-quadrature grids.

use stochbb_error::{ensure, StochResult};

use crate::atom::{gamma_range_est, normal_range_est, uniform_range_est, Family, Param};
use crate::node::{Dag, Node, NodeId};

fn resolve_param(dag: &Dag, p: &Param, eps: f64) -> StochResult<f64> {
    match p {
        Param::Const(v) => Ok(*v),
        Param::Node(id) => {
            // Approximate a compound parameter's contribution to a range
            // estimate with its own midpoint; the density engine integrates
            // the parameter's full distribution when evaluating pdf/cdf.
            let (lo, hi) = range_est(dag, *id, eps)?;
            Ok((lo + hi) / 2.0)
        }
    }
}

pub fn range_est(dag: &Dag, id: NodeId, eps: f64) -> StochResult<(f64, f64)> {
    ensure!(eps > 0.0 && eps < 1.0, Domain: "rangeEst eps must be in (0,1), got {}", eps);

    match dag.get(id).clone() {
        Node::Atom(_, family) => atom_range_est(dag, &family, eps),
        Node::Affine(a, child, b) => {
            let (lo, hi) = range_est(dag, child, eps)?;
            Ok((a * lo + b, a * hi + b))
        }
        Node::Sum(children) => {
            let mut lo_sum = 0.0;
            let mut hi_sum = 0.0;
            for c in children {
                let (lo, hi) = range_est(dag, c, eps)?;
                lo_sum += lo;
                hi_sum += hi;
            }
            Ok((lo_sum, hi_sum))
        }
        Node::Min(children) => envelope(dag, &children, eps, f64::min, f64::min),
        Node::Max(children) => envelope(dag, &children, eps, f64::max, f64::max),
        Node::Mixture(parts) => {
            let ids: Vec<NodeId> = parts.iter().map(|(_, c)| *c).collect();
            envelope(dag, &ids, eps, f64::min, f64::max)
        }
        Node::CondChain(_, _, u, v) => envelope(dag, &[u, v], eps, f64::min, f64::max),
    }
}

fn envelope(
    dag: &Dag,
    children: &[NodeId],
    eps: f64,
    lo_fold: fn(f64, f64) -> f64,
    hi_fold: fn(f64, f64) -> f64,
) -> StochResult<(f64, f64)> {
    let mut ranges = children.iter().map(|&c| range_est(dag, c, eps));
    let (mut lo, mut hi) = ranges.next().expect("children is non-empty")?;
    for r in ranges {
        let (l, h) = r?;
        lo = lo_fold(lo, l);
        hi = hi_fold(hi, h);
    }
    Ok((lo, hi))
}

fn atom_range_est(dag: &Dag, family: &Family, eps: f64) -> StochResult<(f64, f64)> {
    match family {
        Family::Gamma { k, theta } => {
            let k = resolve_param(dag, k, eps)?;
            let theta = resolve_param(dag, theta, eps)?;
            gamma_range_est(eps, k, theta)
        }
        Family::Normal { mu, sigma } => {
            let mu = resolve_param(dag, mu, eps)?;
            let sigma = resolve_param(dag, sigma, eps)?;
            normal_range_est(eps, mu, sigma)
        }
        Family::Uniform { a, b } => {
            let a = resolve_param(dag, a, eps)?;
            let b = resolve_param(dag, b, eps)?;
            Ok(uniform_range_est(eps, a, b))
        }
        Family::Delta { c } => {
            let c = resolve_param(dag, c, eps)?;
            Ok((c, c))
        }
    }
}

//! The primitive-distribution catalog: `Gamma`, `Normal`, `Uniform`, `Delta`,
//! each with an optional compound parameter (a [`Param::Node`] instead of a
//! [`Param::Const`]). Closed-form `pdf`/`cdf`/`inv_cdf` for `Gamma` and
//! `Normal` are delegated to `statrs` rather than hand-rolled; `Uniform` is
//! closed-form by definition and needs no special-function dependency.

use std::sync::atomic::{AtomicU64, Ordering};

use statrs::distribution::{Continuous, ContinuousCDF, Gamma as StatrsGamma, Normal as StatrsNormal};
use stochbb_error::{ensure, stochbb_err, StochResult};

use crate::node::NodeId;

/// Identifies a single independent draw. Two atoms built with identical
/// family parameters are still distinct random variables — this id, not
/// the parameters, is what `atoms(NodeId)` dependency checks compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(u64);

static NEXT_ATOM_ID: AtomicU64 = AtomicU64::new(0);

impl AtomId {
    pub(crate) fn next() -> Self {
        AtomId(NEXT_ATOM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A family parameter: either a fixed scalar, or a reference to another node
/// in the same DAG (compounding — the parameter is itself a random variable).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param {
    Const(f64),
    Node(NodeId),
}

impl Param {
    pub fn as_const(&self) -> Option<f64> {
        match self {
            Param::Const(v) => Some(*v),
            Param::Node(_) => None,
        }
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Param::Node(_))
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Const(v)
    }
}

impl From<NodeId> for Param {
    fn from(id: NodeId) -> Self {
        Param::Node(id)
    }
}

/// The distribution family carried by an `Atom` node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Family {
    Gamma { k: Param, theta: Param },
    Normal { mu: Param, sigma: Param },
    Uniform { a: Param, b: Param },
    Delta { c: Param },
}

impl Family {
    /// True when any parameter is a node reference rather than a constant —
    /// this atom's density requires marginalizing over the parameter node's
    /// own distribution.
    pub fn is_compound(&self) -> bool {
        match self {
            Family::Gamma { k, theta } => k.is_compound() || theta.is_compound(),
            Family::Normal { mu, sigma } => mu.is_compound() || sigma.is_compound(),
            Family::Uniform { a, b } => a.is_compound() || b.is_compound(),
            Family::Delta { c } => c.is_compound(),
        }
    }

    /// Parameter nodes this atom depends on, for dependency/topological
    /// analysis in the simplifier and joint sampler.
    pub fn param_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut push = |p: &Param| {
            if let Param::Node(id) = p {
                out.push(*id);
            }
        };
        match self {
            Family::Gamma { k, theta } => {
                push(k);
                push(theta);
            }
            Family::Normal { mu, sigma } => {
                push(mu);
                push(sigma);
            }
            Family::Uniform { a, b } => {
                push(a);
                push(b);
            }
            Family::Delta { c } => push(c),
        }
        out
    }

    /// Validates constant parameters eagerly (compound parameters are
    /// validated when the parameter node's own density resolves them to a
    /// concrete value).
    pub fn validate_consts(&self) -> StochResult<()> {
        match self {
            Family::Gamma { k, theta } => {
                if let Some(k) = k.as_const() {
                    ensure!(k > 0.0, Domain: "gamma shape k must be > 0, got {}", k);
                }
                if let Some(theta) = theta.as_const() {
                    ensure!(theta > 0.0, Domain: "gamma scale theta must be > 0, got {}", theta);
                }
            }
            Family::Normal { sigma, .. } => {
                if let Some(sigma) = sigma.as_const() {
                    ensure!(sigma > 0.0, Domain: "normal sigma must be > 0, got {}", sigma);
                }
            }
            Family::Uniform { a, b } => {
                if let (Some(a), Some(b)) = (a.as_const(), b.as_const()) {
                    ensure!(a < b, Domain: "uniform bounds must satisfy a < b, got a={}, b={}", a, b);
                }
            }
            Family::Delta { .. } => {}
        }
        Ok(())
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn fmt_param(p: &Param) -> String {
            match p {
                Param::Const(v) => format!("{v}"),
                Param::Node(id) => format!("#{}", id.index()),
            }
        }
        match self {
            Family::Gamma { k, theta } => {
                write!(f, "Gamma({}, {})", fmt_param(k), fmt_param(theta))
            }
            Family::Normal { mu, sigma } => {
                write!(f, "Normal({}, {})", fmt_param(mu), fmt_param(sigma))
            }
            Family::Uniform { a, b } => write!(f, "Uniform({}, {})", fmt_param(a), fmt_param(b)),
            Family::Delta { c } => write!(f, "Delta({})", fmt_param(c)),
        }
    }
}

/// Builds a `statrs` gamma distribution from shape/scale parameters (statrs
/// parameterizes by rate, so `rate = 1/theta`).
fn statrs_gamma(k: f64, theta: f64) -> StochResult<StatrsGamma> {
    StatrsGamma::new(k, 1.0 / theta)
        .map_err(|e| stochbb_err!(Domain: "invalid gamma(k={}, theta={}): {}", k, theta, e))
}

fn statrs_normal(mu: f64, sigma: f64) -> StochResult<StatrsNormal> {
    StatrsNormal::new(mu, sigma)
        .map_err(|e| stochbb_err!(Domain: "invalid normal(mu={}, sigma={}): {}", mu, sigma, e))
}

pub fn gamma_pdf(t: f64, k: f64, theta: f64) -> StochResult<f64> {
    Ok(statrs_gamma(k, theta)?.pdf(t))
}

pub fn gamma_cdf(t: f64, k: f64, theta: f64) -> StochResult<f64> {
    Ok(statrs_gamma(k, theta)?.cdf(t))
}

pub fn gamma_inv_cdf(u: f64, k: f64, theta: f64) -> StochResult<f64> {
    ensure!((0.0..=1.0).contains(&u), Domain: "invCdf requires u in [0,1], got {}", u);
    Ok(statrs_gamma(k, theta)?.inverse_cdf(u))
}

pub fn gamma_range_est(eps: f64, k: f64, theta: f64) -> StochResult<(f64, f64)> {
    let lo = gamma_inv_cdf(eps / 2.0, k, theta)?;
    let hi = gamma_inv_cdf(1.0 - eps / 2.0, k, theta)?;
    Ok((lo.max(0.0), hi))
}

pub fn normal_pdf(t: f64, mu: f64, sigma: f64) -> StochResult<f64> {
    Ok(statrs_normal(mu, sigma)?.pdf(t))
}

pub fn normal_cdf(t: f64, mu: f64, sigma: f64) -> StochResult<f64> {
    Ok(statrs_normal(mu, sigma)?.cdf(t))
}

pub fn normal_inv_cdf(u: f64, mu: f64, sigma: f64) -> StochResult<f64> {
    ensure!((0.0..=1.0).contains(&u), Domain: "invCdf requires u in [0,1], got {}", u);
    Ok(statrs_normal(mu, sigma)?.inverse_cdf(u))
}

pub fn normal_range_est(eps: f64, mu: f64, sigma: f64) -> StochResult<(f64, f64)> {
    let lo = normal_inv_cdf(eps / 2.0, mu, sigma)?;
    let hi = normal_inv_cdf(1.0 - eps / 2.0, mu, sigma)?;
    Ok((lo, hi))
}

pub fn uniform_pdf(t: f64, a: f64, b: f64) -> f64 {
    if t < a || t > b { 0.0 } else { 1.0 / (b - a) }
}

pub fn uniform_cdf(t: f64, a: f64, b: f64) -> f64 {
    if t < a {
        0.0
    } else if t > b {
        1.0
    } else {
        (t - a) / (b - a)
    }
}

pub fn uniform_inv_cdf(u: f64, a: f64, b: f64) -> f64 {
    a + u * (b - a)
}

pub fn uniform_range_est(eps: f64, a: f64, b: f64) -> (f64, f64) {
    (uniform_inv_cdf(eps / 2.0, a, b), uniform_inv_cdf(1.0 - eps / 2.0, a, b))
}

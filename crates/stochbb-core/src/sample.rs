//! The dependency-aware joint sampler. [`ExactSampler`] draws every atom in
//! a target set's union atom set exactly once per row and evaluates each
//! target deterministically from that single draw, so two targets sharing an
//! atom receive the *same* realized value for it in every row — the
//! correctness guarantee that distinguishes this from independently sampling
//! each target's marginal. [`MarginalSampler`] is the simpler, non-joint
//! alternative: inverse-CDF on a single node's own numerical CDF.
//!
//! Row fan-out uses the process-global [`crate::domain::thread_pool`]: each
//! row is submitted as one job writing into a shared result buffer, a
//! [`crate::domain::thread_pool::WaitGroup`] tracks fan-in, and each job
//! seeds its own RNG scope via [`crate::domain::random_provider::scoped_seed`]
//! keyed on the row index, so the result is independent of how the pool
//! schedules jobs across workers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stochbb_error::{ensure, StochResult};

use crate::atom::{
    gamma_inv_cdf, normal_inv_cdf, uniform_inv_cdf, AtomId, Family, Param,
};
use crate::domain::{get_thread_pool, random_provider, WaitGroup};
use crate::node::{Dag, Node, NodeId};

/// Realizes `id`'s scalar value for the current draw, memoizing every node
/// it touches in `values` so a shared atom contributes the same draw to
/// every dependent that reaches it. `draw_u` supplies one `Uniform(0,1)`
/// value per call and is the sampler's only source of randomness.
fn realize(
    dag: &Dag,
    id: NodeId,
    values: &mut HashMap<NodeId, f64>,
    draw_u: &mut dyn FnMut() -> f64,
) -> StochResult<f64> {
    if let Some(v) = values.get(&id) {
        return Ok(*v);
    }

    let value = match dag.get(id).clone() {
        Node::Atom(_, family) => realize_atom(dag, &family, values, draw_u)?,
        Node::Affine(a, child, b) => a * realize(dag, child, values, draw_u)? + b,
        Node::Sum(children) => {
            let mut total = 0.0;
            for c in children {
                total += realize(dag, c, values, draw_u)?;
            }
            total
        }
        Node::Min(children) => fold_children(dag, &children, values, draw_u, f64::min)?,
        Node::Max(children) => fold_children(dag, &children, values, draw_u, f64::max)?,
        Node::Mixture(parts) => {
            let u = draw_u();
            let mut acc = 0.0;
            let mut chosen = parts.last().expect("mixture has at least one part").1;
            for &(w, c) in &parts {
                acc += w;
                if u <= acc {
                    chosen = c;
                    break;
                }
            }
            realize(dag, chosen, values, draw_u)?
        }
        Node::CondChain(a, b, u, v) => {
            let a_val = realize(dag, a, values, draw_u)?;
            let b_val = realize(dag, b, values, draw_u)?;
            if a_val < b_val {
                realize(dag, u, values, draw_u)?
            } else {
                realize(dag, v, values, draw_u)?
            }
        }
    };

    values.insert(id, value);
    Ok(value)
}

fn fold_children(
    dag: &Dag,
    children: &[NodeId],
    values: &mut HashMap<NodeId, f64>,
    draw_u: &mut dyn FnMut() -> f64,
    fold: fn(f64, f64) -> f64,
) -> StochResult<f64> {
    let mut iter = children.iter();
    let first = *iter.next().expect("Min/Max has at least one child");
    let mut acc = realize(dag, first, values, draw_u)?;
    for &c in iter {
        acc = fold(acc, realize(dag, c, values, draw_u)?);
    }
    Ok(acc)
}

fn resolve_param(
    dag: &Dag,
    p: &Param,
    values: &mut HashMap<NodeId, f64>,
    draw_u: &mut dyn FnMut() -> f64,
) -> StochResult<f64> {
    match p {
        Param::Const(v) => Ok(*v),
        Param::Node(id) => realize(dag, *id, values, draw_u),
    }
}

/// Draws one realization of an atom. `Delta` is a point mass and consumes no
/// randomness; `Gamma`/`Normal`/`Uniform` each consume exactly one
/// `Uniform(0,1)` draw via their `invCdf`.
fn realize_atom(
    dag: &Dag,
    family: &Family,
    values: &mut HashMap<NodeId, f64>,
    draw_u: &mut dyn FnMut() -> f64,
) -> StochResult<f64> {
    match family {
        Family::Gamma { k, theta } => {
            let k = resolve_param(dag, k, values, draw_u)?;
            let theta = resolve_param(dag, theta, values, draw_u)?;
            gamma_inv_cdf(draw_u(), k, theta)
        }
        Family::Normal { mu, sigma } => {
            let mu = resolve_param(dag, mu, values, draw_u)?;
            let sigma = resolve_param(dag, sigma, values, draw_u)?;
            normal_inv_cdf(draw_u(), mu, sigma)
        }
        Family::Uniform { a, b } => {
            let a = resolve_param(dag, a, values, draw_u)?;
            let b = resolve_param(dag, b, values, draw_u)?;
            Ok(uniform_inv_cdf(draw_u(), a, b))
        }
        Family::Delta { c } => resolve_param(dag, c, values, draw_u),
    }
}

fn draw_row(
    dag: &Dag,
    targets: &[NodeId],
    draw_u: &mut dyn FnMut() -> f64,
) -> StochResult<Vec<f64>> {
    let mut values = HashMap::new();
    let mut row = Vec::with_capacity(targets.len());
    for &t in targets {
        row.push(realize(dag, t, &mut values, draw_u)?);
    }
    Ok(row)
}

/// Draws joint samples of a list of target nodes, honoring every shared atom
/// between them. Construction computes nothing; the union atom set and
/// per-row evaluation happen lazily inside [`ExactSampler::sample`].
pub struct ExactSampler {
    dag: Arc<Dag>,
    targets: Vec<NodeId>,
}

impl ExactSampler {
    pub fn new(dag: Arc<Dag>, targets: &[NodeId]) -> StochResult<Self> {
        ensure!(!targets.is_empty(), Domain: "ExactSampler requires at least one target");
        Ok(Self {
            dag,
            targets: targets.to_vec(),
        })
    }

    pub fn n_targets(&self) -> usize {
        self.targets.len()
    }

    /// The union atom set across every target — what step 1 of the sampler
    /// procedure computes, exposed so callers can confirm two targets do (or
    /// don't) actually share an atom.
    pub fn atoms(&self) -> std::collections::HashSet<AtomId> {
        self.targets
            .iter()
            .flat_map(|&t| (*self.dag.atoms(t)).clone())
            .collect()
    }

    /// Fills `out` (row-major, shape `n_draws x n_targets`, `n_draws` inferred
    /// from `out.len() / n_targets()`) using a fresh, non-reproducible seed.
    /// Use [`ExactSampler::sample_seeded`] when bit-identical draws across
    /// runs are required.
    pub fn sample(&self, out: &mut [f64]) -> StochResult<()> {
        let seed = random_provider::random::<u64>();
        self.sample_seeded(out, seed)
    }

    /// Like [`ExactSampler::sample`], but every row's draw is seeded
    /// deterministically from `seed` and the row index, so the same `seed`
    /// and DAG always produce bit-identical output regardless of how the
    /// thread pool interleaves rows.
    pub fn sample_seeded(&self, out: &mut [f64], seed: u64) -> StochResult<()> {
        let k = self.targets.len();
        ensure!(
            out.len() % k == 0,
            Domain: "output buffer length {} is not a multiple of target count {}",
            out.len(),
            k
        );
        let n_draws = out.len() / k;
        if n_draws == 0 {
            return Ok(());
        }

        let pool = get_thread_pool(
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        );
        let targets = Arc::new(self.targets.clone());
        let rows: Arc<Mutex<Vec<StochResult<Vec<f64>>>>> =
            Arc::new(Mutex::new((0..n_draws).map(|_| Ok(Vec::new())).collect()));

        let wg = WaitGroup::new();
        for row in 0..n_draws {
            let dag = Arc::clone(&self.dag);
            let targets = Arc::clone(&targets);
            let rows = Arc::clone(&rows);
            let guard = wg.guard();
            let row_seed = seed.wrapping_add(row as u64);
            pool.submit(move || {
                let _guard = guard;
                let result = random_provider::scoped_seed(row_seed, || {
                    let mut draw = || random_provider::random::<f64>();
                    draw_row(&dag, &targets, &mut draw)
                });
                rows.lock().unwrap()[row] = result;
            });
        }
        wg.wait();

        for (row, result) in Arc::try_unwrap(rows)
            .unwrap()
            .into_inner()
            .unwrap()
            .into_iter()
            .enumerate()
        {
            let values = result?;
            out[row * k..(row + 1) * k].copy_from_slice(&values);
        }
        Ok(())
    }
}

/// Inverse-CDF sampling of a single node's own numerical CDF. Simpler and
/// faster than [`ExactSampler`], but gives no joint guarantee when the
/// caller later needs more than one correlated variable.
pub struct MarginalSampler<'a> {
    dag: &'a Dag,
    id: NodeId,
    t_min: f64,
    t_max: f64,
    n: usize,
}

impl<'a> MarginalSampler<'a> {
    pub fn new(dag: &'a Dag, id: NodeId, t_min: f64, t_max: f64, n: usize) -> StochResult<Self> {
        ensure!(t_min < t_max, Domain: "MarginalSampler requires Tmin < Tmax, got {} >= {}", t_min, t_max);
        ensure!(n > 0, Domain: "MarginalSampler requires a non-empty grid");
        Ok(Self { dag, id, t_min, t_max, n })
    }

    pub fn sample(&self, out: &mut [f64]) -> StochResult<()> {
        let mut cdf = vec![0.0; self.n];
        self.dag.density(self.id).eval_cdf(self.t_min, self.t_max, &mut cdf)?;
        let dt = (self.t_max - self.t_min) / self.n as f64;
        for slot in out.iter_mut() {
            let u: f64 = random_provider::random();
            *slot = invert_cdf(&cdf, self.t_min, dt, u);
        }
        Ok(())
    }
}

/// Inverts a monotone-nondecreasing CDF buffer by linear interpolation
/// between the two grid points straddling `u`.
fn invert_cdf(cdf: &[f64], t_min: f64, dt: f64, u: f64) -> f64 {
    match cdf.binary_search_by(|probe| probe.partial_cmp(&u).unwrap()) {
        Ok(idx) => t_min + idx as f64 * dt,
        Err(0) => t_min,
        Err(idx) if idx >= cdf.len() => t_min + (cdf.len() - 1) as f64 * dt,
        Err(idx) => {
            let lo = cdf[idx - 1];
            let hi = cdf[idx];
            let frac = if hi > lo { (u - lo) / (hi - lo) } else { 0.0 };
            t_min + ((idx - 1) as f64 + frac) * dt
        }
    }
}

//! End-to-end scenarios mirroring realistic response-latency models: the
//! combinator mix a caller would actually write, not single-operator unit
//! checks.

use std::sync::Arc;

use stochbb_core::prelude::*;

#[test]
fn control_vs_experimental_point_of_divergence() {
    // A "point of divergence" model: control latency is simply C + X1; the
    // experimental condition races X1 against a delayed X2, so it can only
    // ever be faster or equal. Re's mean must therefore be <= Rc's mean.
    let mut dag = Dag::new();
    let c = dag.gamma(5.0, 20.0).unwrap();
    let x1 = dag.gamma(10.0, 30.0).unwrap();
    let d = dag.delta(300.0).unwrap();
    let x2 = dag.gamma(3.0, 50.0).unwrap();

    let rc = dag.add(c, x1).unwrap();
    let delayed_x2 = dag.add(d, x2).unwrap();
    let fastest = dag.minimum(&[x1, delayed_x2]).unwrap();
    let re = dag.add(c, fastest).unwrap();

    let n = 1200;
    let mut pdf_c = vec![0.0; n];
    let mut pdf_e = vec![0.0; n];
    dag.density(rc).eval(0.0, 1200.0, &mut pdf_c).unwrap();
    dag.density(re).eval(0.0, 1200.0, &mut pdf_e).unwrap();

    let dt = 1200.0 / n as f64;
    let mean = |pdf: &[f64]| -> f64 {
        pdf.iter()
            .enumerate()
            .map(|(i, &p)| (i as f64 * dt) * p * dt)
            .sum()
    };
    assert!(mean(&pdf_e) <= mean(&pdf_c) + 1.0);
}

#[test]
fn condchain_selects_between_two_response_pathways() {
    // Z = if A < B then U else V, all four built from independent atoms.
    let mut dag = Dag::new();
    let a = dag.gamma(3.0, 50.0).unwrap();
    let b = dag.gamma(3.0, 80.0).unwrap();
    let u = dag.normal(100.0, 5.0).unwrap();
    let v = dag.normal(400.0, 5.0).unwrap();
    let z = dag.condchain(a, b, u, v).unwrap();

    let mut pdf = vec![0.0; 2000];
    dag.density(z).eval(0.0, 600.0, &mut pdf).unwrap();
    let dt = 600.0 / 2000 as f64;
    let total: f64 = pdf.iter().sum::<f64>() * dt;
    assert!((total - 1.0).abs() < 5e-2);
}

#[test]
fn condchain_with_identical_branches_canonicalizes_and_matches_branch() {
    let mut dag = Dag::new();
    let a = dag.gamma(3.0, 100.0).unwrap();
    let b = dag.gamma(3.0, 120.0).unwrap();
    let shared_tail = dag.gamma(3.0, 140.0).unwrap();
    let z = dag.condchain(a, b, shared_tail, shared_tail).unwrap();
    assert_eq!(z, shared_tail);
}

#[test]
fn exact_sampler_reproduces_pipeline_sum_exactly() {
    // chain.py: R = L + S + M, three independent stages.
    let mut dag = Dag::new();
    let l = dag.gamma(9.0, 100.0).unwrap();
    let s = dag.gamma(3.0, 100.0).unwrap();
    let m = dag.gamma(10.0, 50.0).unwrap();
    let r = dag.sum(&[l, s, m]).unwrap();

    let dag = Arc::new(dag);
    let sampler = ExactSampler::new(Arc::clone(&dag), &[l, s, m, r]).unwrap();

    let n_draws = 10_000;
    let mut out = vec![0.0; n_draws * 4];
    sampler.sample_seeded(&mut out, 2024).unwrap();

    for row in out.chunks(4) {
        let (l, s, m, r) = (row[0], row[1], row[2], row[3]);
        assert!((r - (l + s + m)).abs() < 1e-9);
        assert!(l >= 0.0 && s >= 0.0 && m >= 0.0);
    }
}

#[test]
fn joint_sampling_of_dependent_targets_needs_exact_sampler() {
    // L and S share an underlying random "throughput factor", so Sum must
    // reject them directly -- only the joint sampler can legally draw them
    // together, and it must respect the shared atom.
    let mut dag = Dag::new();
    let throughput = dag.uniform(0.5, 1.5).unwrap();
    let l = dag.gamma(throughput, 200.0).unwrap();
    let s = dag.gamma(throughput, 100.0).unwrap();
    assert!(dag.sum(&[l, s]).is_err());

    let dag = Arc::new(dag);
    let sampler = ExactSampler::new(Arc::clone(&dag), &[l, s]).unwrap();

    let n_draws = 4000;
    let mut out = vec![0.0; n_draws * 2];
    sampler.sample_seeded(&mut out, 99).unwrap();

    // both draws were scaled by the same throughput factor in every row, so
    // L/S (the ratio of their means) should be tightly concentrated instead
    // of spread out as it would be if they were sampled independently.
    let ratios: Vec<f64> = out.chunks(2).map(|row| row[0] / row[1]).collect();
    let mean_ratio = ratios.iter().sum::<f64>() / ratios.len() as f64;
    let var_ratio =
        ratios.iter().map(|r| (r - mean_ratio).powi(2)).sum::<f64>() / ratios.len() as f64;
    assert!(var_ratio.sqrt() / mean_ratio < 0.15);
}

#[test]
fn marginal_sampler_cdf_inversion_matches_closed_form_quantile() {
    let mut dag = Dag::new();
    let x = dag.normal(500.0, 40.0).unwrap();
    let sampler = MarginalSampler::new(&dag, x, 200.0, 800.0, 6000).unwrap();

    let mut out = vec![0.0; 10_000];
    sampler.sample(&mut out).unwrap();
    let mean = out.iter().sum::<f64>() / out.len() as f64;
    assert!((mean - 500.0).abs() < 5.0);
}

//! Integration-level checks of the universal properties every density must
//! satisfy, independent of which combinator produced it.

use stochbb_core::prelude::*;

fn integrates_to_one(pdf: &[f64], dt: f64) -> bool {
    (pdf.iter().sum::<f64>() * dt - 1.0).abs() < 2e-2
}

#[test]
fn pdf_is_nonnegative_and_integrates_to_one() {
    let mut dag = Dag::new();
    let x = dag.gamma(6.0, 15.0).unwrap();
    let y = dag.normal(50.0, 8.0).unwrap();
    let z = dag.sum(&[x, y]).unwrap();

    let n = 8000;
    let mut pdf = vec![0.0; n];
    let (lo, hi) = dag.range_est(z, 1e-5).unwrap();
    dag.density(z).eval(lo, hi, &mut pdf).unwrap();

    assert!(pdf.iter().all(|&p| p >= 0.0));
    assert!(integrates_to_one(&pdf, (hi - lo) / n as f64));
}

#[test]
fn cdf_is_monotone_nondecreasing_and_bounded() {
    let mut dag = Dag::new();
    let x = dag.gamma(4.0, 25.0).unwrap();
    let mut cdf = vec![0.0; 2000];
    dag.density(x).eval_cdf(0.0, 1000.0, &mut cdf).unwrap();

    assert!(cdf.iter().all(|&c| (0.0..=1.0).contains(&c)));
    assert!(cdf.windows(2).all(|w| w[1] + 1e-9 >= w[0]));
    assert!(*cdf.last().unwrap() > 0.95);
}

#[test]
fn mixture_pdf_is_weighted_sum_of_components() {
    let mut dag = Dag::new();
    let a = dag.gamma(3.0, 10.0).unwrap();
    let b = dag.gamma(8.0, 10.0).unwrap();
    let mix = dag.mixture(&[(0.3, a), (0.7, b)]).unwrap();

    let n = 500;
    let mut pdf_a = vec![0.0; n];
    let mut pdf_b = vec![0.0; n];
    let mut pdf_mix = vec![0.0; n];
    dag.density(a).eval(0.0, 200.0, &mut pdf_a).unwrap();
    dag.density(b).eval(0.0, 200.0, &mut pdf_b).unwrap();
    dag.density(mix).eval(0.0, 200.0, &mut pdf_mix).unwrap();

    for i in 0..n {
        let expected = 0.3 * pdf_a[i] + 0.7 * pdf_b[i];
        assert!((pdf_mix[i] - expected).abs() < 1e-9);
    }
}

#[test]
fn sum_of_independent_gammas_has_correct_mean() {
    // chain.py: R = L + S + M, independent stages of a processing pipeline.
    let mut dag = Dag::new();
    let l = dag.gamma(9.0, 100.0).unwrap(); // mean 900
    let s = dag.gamma(3.0, 100.0).unwrap(); // mean 300
    let m = dag.gamma(10.0, 50.0).unwrap(); // mean 500
    let r = dag.sum(&[l, s, m]).unwrap();

    let n = 20_000;
    let mut pdf = vec![0.0; n];
    dag.density(r).eval(0.0, 4000.0, &mut pdf).unwrap();
    let dt = 4000.0 / n as f64;
    let mean: f64 = pdf
        .iter()
        .enumerate()
        .map(|(i, &p)| (i as f64 * dt) * p * dt)
        .sum();
    assert!((mean - 1700.0).abs() < 30.0);
}

#[test]
fn range_est_quantiles_contain_configured_tail_mass() {
    let mut dag = Dag::new();
    let x = dag.gamma(10.0, 10.0).unwrap();
    let eps = 0.02;
    let (lo, hi) = dag.range_est(x, eps).unwrap();

    let mut cdf = vec![0.0; 4000];
    dag.density(x).eval_cdf(0.0, 400.0, &mut cdf).unwrap();
    let dt = 400.0 / 4000 as f64;
    let at = |t: f64| {
        let idx = ((t / dt).round() as usize).min(cdf.len() - 1);
        cdf[idx]
    };

    assert!(at(lo) < eps / 2.0 + 0.02);
    assert!(at(hi) > 1.0 - eps / 2.0 - 0.02);
}

#[test]
fn invalid_gamma_shape_is_rejected_at_construction() {
    let mut dag = Dag::new();
    assert!(dag.gamma(-1.0, 10.0).is_err());
}

#[test]
fn shared_atom_between_sum_children_is_rejected() {
    // Two stages built from the same random "fatigue factor" atom are not
    // independent and must not be combined with `sum`.
    let mut dag = Dag::new();
    let fatigue = dag.uniform(0.5, 2.0).unwrap();
    let stage1 = dag.gamma(fatigue, 100.0).unwrap();
    let stage2 = dag.gamma(fatigue, 150.0).unwrap();

    let err = dag.sum(&[stage1, stage2]).unwrap_err();
    assert!(matches!(err, StochError::Dependency { .. }));
}

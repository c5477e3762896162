//! A point-of-divergence response latency model: a control pathway `Rc = C +
//! X1` against an experimental pathway `Re = C + minimum(X1, D + X2)` that
//! races the original stage against a delayed alternative. Prints the two
//! response-time densities so they can be diffed or plotted by a caller.

use stochbb::prelude::*;

fn main() {
    stochbb::init_logging();

    let mut dag = Dag::new();
    let c = dag.gamma(5.0, 20.0).unwrap();
    let x1 = dag.gamma(10.0, 30.0).unwrap();
    let d = dag.delta(300.0).unwrap();
    let x2 = dag.gamma(3.0, 50.0).unwrap();

    let rc = dag.add(c, x1).unwrap();
    let delayed_x2 = dag.add(d, x2).unwrap();
    let fastest = dag.minimum(&[x1, delayed_x2]).unwrap();
    let re = dag.add(c, fastest).unwrap();

    let (t_min, t_max, n) = (0.0, 1200.0, 1200);
    let mut pdf_c = vec![0.0; n];
    let mut pdf_e = vec![0.0; n];
    dag.density(rc).eval(t_min, t_max, &mut pdf_c).unwrap();
    dag.density(re).eval(t_min, t_max, &mut pdf_e).unwrap();

    let dt = (t_max - t_min) / n as f64;
    println!("t,control,experimental");
    for i in 0..n {
        let t = t_min + i as f64 * dt;
        println!("{t},{},{}", pdf_c[i], pdf_e[i]);
    }
}

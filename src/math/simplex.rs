//! Bounded Nelder–Mead simplex minimizer.
//!
//! Small and deterministic: no random restarts, no adaptive coefficients.
//! Bounds are enforced by projecting every trial point onto the box, which
//! keeps the objective from ever being evaluated outside the allowed range.
//! Non-finite objective values are treated as `+inf`, so the simplex simply
//! moves away from them.

/// Stopping rules and initial step of the simplex.
#[derive(Debug, Clone, Copy)]
pub struct SimplexOptions {
    pub max_iterations: usize,
    /// Stop when the objective spread over the simplex drops below this.
    pub ftol: f64,
    /// ... and the simplex extent in every coordinate drops below this.
    pub xtol: f64,
    /// Initial step relative to the start value.
    pub rel_step: f64,
    /// Initial step for coordinates starting at zero.
    pub zero_step: f64,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            ftol: 1e-6,
            xtol: 1e-6,
            rel_step: 0.05,
            zero_step: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimplexResult {
    pub x: Vec<f64>,
    pub fx: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
}

fn project(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((v, lo), hi) in x.iter_mut().zip(lower).zip(upper) {
        *v = v.clamp(*lo, *hi);
    }
}

/// Minimize `f` starting from `x0` within `[lower, upper]`.
///
/// Use `f64::NEG_INFINITY` / `f64::INFINITY` for unbounded coordinates.
/// The start point is always a vertex of the initial simplex, so the
/// returned value is never worse than `f(x0)`.
pub fn nelder_mead<F: FnMut(&[f64]) -> f64>(
    mut f: F,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    opts: &SimplexOptions,
) -> SimplexResult {
    let n = x0.len();
    let mut evaluations = 0usize;
    let mut eval = |x: &[f64]| {
        evaluations += 1;
        let v = f(x);
        if v.is_finite() { v } else { f64::INFINITY }
    };

    let mut start = x0.to_vec();
    project(&mut start, lower, upper);

    if n == 0 {
        let fx = eval(&start);
        return SimplexResult {
            x: start,
            fx,
            iterations: 0,
            evaluations: 1,
            converged: true,
        };
    }

    // Initial simplex: the start point plus one step along each axis. A step
    // that would leave the box is taken in the opposite direction.
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(start.clone());
    for i in 0..n {
        let mut v = start.clone();
        let step = if start[i] != 0.0 {
            opts.rel_step * start[i].abs()
        } else {
            opts.zero_step
        };
        v[i] = start[i] + step;
        if v[i] > upper[i] {
            v[i] = start[i] - step;
        }
        project(&mut v, lower, upper);
        simplex.push(v);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0usize;
    let mut converged = false;

    while iterations < opts.max_iterations {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let f_spread = (values[n] - values[0]).abs();
        let x_spread = (1..=n)
            .flat_map(|j| (0..n).map(move |i| (j, i)))
            .map(|(j, i)| (simplex[j][i] - simplex[0][i]).abs())
            .fold(0.0, f64::max);
        if values[0].is_finite() && f_spread <= opts.ftol && x_spread <= opts.xtol {
            converged = true;
            break;
        }

        let mut centroid = vec![0.0; n];
        for vertex in &simplex[..n] {
            for (c, v) in centroid.iter_mut().zip(vertex) {
                *c += v / n as f64;
            }
        }
        let along = |t: f64, worst: &[f64]| -> Vec<f64> {
            let mut p: Vec<f64> = centroid
                .iter()
                .zip(worst)
                .map(|(c, w)| c + t * (c - w))
                .collect();
            project(&mut p, lower, upper);
            p
        };

        let reflected = along(1.0, &simplex[n]);
        let f_r = eval(&reflected);

        if f_r < values[0] {
            let expanded = along(2.0, &simplex[n]);
            let f_e = eval(&expanded);
            if f_e < f_r {
                simplex[n] = expanded;
                values[n] = f_e;
            } else {
                simplex[n] = reflected;
                values[n] = f_r;
            }
            continue;
        }
        if f_r < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_r;
            continue;
        }

        let (contracted, f_c) = if f_r < values[n] {
            let p = along(0.5, &simplex[n]);
            let fp = eval(&p);
            (p, fp)
        } else {
            let p = along(-0.5, &simplex[n]);
            let fp = eval(&p);
            (p, fp)
        };
        if f_c < values[n].min(f_r) {
            simplex[n] = contracted;
            values[n] = f_c;
            continue;
        }

        // Shrink towards the best vertex.
        let best = simplex[0].clone();
        for j in 1..=n {
            let mut p: Vec<f64> = best
                .iter()
                .zip(&simplex[j])
                .map(|(b, v)| b + 0.5 * (v - b))
                .collect();
            project(&mut p, lower, upper);
            values[j] = eval(&p);
            simplex[j] = p;
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);
    SimplexResult {
        x: simplex[best].clone(),
        fx: values[best],
        iterations,
        evaluations,
        converged,
    }
}

use nalgebra::DMatrix;

use crate::error::AppError;

/// Central finite-difference Hessian of `f` at `x` with per-coordinate steps.
pub fn hessian<F: Fn(&[f64]) -> f64>(f: F, x: &[f64], steps: &[f64]) -> DMatrix<f64> {
    let n = x.len();
    let f0 = f(x);
    let mut h = DMatrix::<f64>::zeros(n, n);
    let mut p = x.to_vec();

    for i in 0..n {
        let hi = steps[i];
        p[i] = x[i] + hi;
        let f_plus = f(&p);
        p[i] = x[i] - hi;
        let f_minus = f(&p);
        p[i] = x[i];
        h[(i, i)] = (f_plus - 2.0 * f0 + f_minus) / (hi * hi);

        for j in 0..i {
            let hj = steps[j];
            let mut corner = |si: f64, sj: f64| {
                p[i] = x[i] + si * hi;
                p[j] = x[j] + sj * hj;
                let v = f(&p);
                p[i] = x[i];
                p[j] = x[j];
                v
            };
            let v = (corner(1.0, 1.0) - corner(1.0, -1.0) - corner(-1.0, 1.0) + corner(-1.0, -1.0))
                / (4.0 * hi * hj);
            h[(i, j)] = v;
            h[(j, i)] = v;
        }
    }
    h
}

/// Covariance of a `-2 ln L` statistic from its Hessian: `2 H⁻¹`.
pub fn covariance_from_hessian(h: &DMatrix<f64>) -> Result<DMatrix<f64>, AppError> {
    if h.iter().any(|v| !v.is_finite()) {
        return Err(AppError::numeric("Hessian has non-finite entries"));
    }
    let inv = h
        .clone()
        .try_inverse()
        .ok_or_else(|| AppError::numeric("Hessian is singular"))?;
    let cov = inv * 2.0;
    if (0..cov.nrows()).any(|i| !(cov[(i, i)] > 0.0)) {
        return Err(AppError::numeric("covariance is not positive definite"));
    }
    Ok(cov)
}

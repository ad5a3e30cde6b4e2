//! Fit statistics for Poisson counting experiments.
//!
//! All statistics are `-2 ln L` style, so differences are likelihood-ratio
//! test statistics.
//!
//! - `wstat`: on/off measurement, background profiled analytically
//! - `cash`: on measurement with known background
//! - `WStatCountsStatistic`: excess and significance of a single on/off count

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use crate::error::AppError;

/// Floor applied to predicted counts before taking logarithms.
const TRUNCATION_VALUE: f64 = 1e-25;

fn safe_ln(x: f64) -> f64 {
    x.max(TRUNCATION_VALUE).ln()
}

/// Cash statistic `2 (mu - n ln mu)`.
pub fn cash(n_on: f64, mu_on: f64) -> f64 {
    let mu = mu_on.max(TRUNCATION_VALUE);
    2.0 * (mu - n_on * mu.ln())
}

/// Background level that maximizes the on/off likelihood for a given signal.
pub fn wstat_mu_bkg(n_on: f64, n_off: f64, alpha: f64, mu_sig: f64) -> f64 {
    let c = alpha * (n_on + n_off) - (1.0 + alpha) * mu_sig;
    let d = (c * c + 4.0 * alpha * (alpha + 1.0) * n_off * mu_sig).max(0.0).sqrt();
    ((c + d) / (2.0 * alpha * (alpha + 1.0))).max(0.0)
}

/// Profile W statistic of one on/off bin.
///
/// Includes the goodness-of-fit terms, so the saturated model
/// (`mu_sig = n_on - alpha * n_off`) has statistic zero and the value is
/// never negative.
pub fn wstat(n_on: f64, n_off: f64, alpha: f64, mu_sig: f64) -> f64 {
    let mu_bkg = wstat_mu_bkg(n_on, n_off, alpha, mu_sig);

    let mut stat = mu_sig + (1.0 + alpha) * mu_bkg;
    if n_on > 0.0 {
        stat -= n_on * safe_ln(mu_sig + alpha * mu_bkg);
        stat -= n_on * (1.0 - n_on.ln());
    }
    if n_off > 0.0 {
        stat -= n_off * safe_ln(mu_bkg);
        stat -= n_off * (1.0 - n_off.ln());
    }
    (2.0 * stat).max(0.0)
}

/// Excess and significance of an on/off count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WStatCountsStatistic {
    pub n_on: f64,
    pub n_off: f64,
    pub alpha: f64,
}

impl WStatCountsStatistic {
    pub fn new(n_on: f64, n_off: f64, alpha: f64) -> Self {
        Self { n_on, n_off, alpha }
    }

    pub fn background(&self) -> f64 {
        self.alpha * self.n_off
    }

    pub fn excess(&self) -> f64 {
        self.n_on - self.background()
    }

    /// Statistic of the background-only hypothesis relative to the best fit.
    pub fn ts(&self) -> f64 {
        if self.alpha <= 0.0 {
            return 0.0;
        }
        wstat(self.n_on, self.n_off, self.alpha, 0.0)
    }

    /// Signed square root of `ts`; equals the Li & Ma significance.
    pub fn sqrt_ts(&self) -> f64 {
        let excess = self.excess();
        if excess == 0.0 {
            return 0.0;
        }
        excess.signum() * self.ts().sqrt()
    }
}

/// Survival function of the χ² distribution with `dof` degrees of freedom.
pub fn chi2_sf(x: f64, dof: usize) -> Result<f64, AppError> {
    let dist = ChiSquared::new(dof as f64)
        .map_err(|e| AppError::numeric(format!("chi2 with {dof} dof: {e}")))?;
    if x <= 0.0 {
        return Ok(1.0);
    }
    Ok(dist.sf(x).clamp(0.0, 1.0))
}

/// Two-sided Gaussian-equivalent significance of a p-value.
pub fn significance_from_p(p: f64) -> f64 {
    if p >= 1.0 || p.is_nan() {
        return 0.0;
    }
    if p <= 0.0 {
        return f64::INFINITY;
    }
    match Normal::new(0.0, 1.0) {
        Ok(normal) => -normal.inverse_cdf(p / 2.0),
        Err(_) => f64::NAN,
    }
}

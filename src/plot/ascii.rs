//! ASCII plotting for terminal output.
//!
//! Fixed-size character grids, deterministic for a given input:
//!
//! - cumulative excess and significance against livetime (`o`)
//! - SED `E² dN/dE` on log-log axes: model curve `-`, flux points `o`
//!   with error bars `|`, upper limits `v`

use crate::dataset::DatasetInfo;
use crate::fit::FluxPoint;
use crate::models::SpectralModel;

/// Fraction of the data span added above and below the y range.
const Y_MARGIN: f64 = 0.05;

/// Two panels: excess and `sqrt(TS)` of the stacked data vs livetime (hours).
pub fn render_cumulative_plot(rows: &[DatasetInfo], width: usize, height: usize) -> String {
    let hours: Vec<f64> = rows.iter().map(|r| r.livetime_s / 3600.0).collect();
    let excess: Vec<(f64, f64)> = hours.iter().zip(rows).map(|(&t, r)| (t, r.excess)).collect();
    let sig: Vec<(f64, f64)> = hours.iter().zip(rows).map(|(&t, r)| (t, r.sqrt_ts)).collect();

    let mut out = render_series("Excess", "h", &excess, width, height);
    out.push_str(&render_series("Significance", "h", &sig, width, height));
    out
}

/// Log-log SED of flux points with the reference model overlaid.
pub fn render_sed_plot(points: &[FluxPoint], model: Option<&SpectralModel>, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let Some((e_lo, e_hi)) = energy_range(points) else {
        return "SED: no flux points\n".to_string();
    };
    let x_range = (e_lo.log10(), e_hi.log10());

    // Everything is drawn in (log10 E, log10 E²·dN/dE).
    let sed = |e: f64, dnde: f64| (e * e * dnde).log10();
    let curve: Vec<(f64, f64)> = model
        .map(|m| {
            let n = width * 2;
            (0..n)
                .map(|i| x_range.0 + (x_range.1 - x_range.0) * i as f64 / (n as f64 - 1.0))
                .filter_map(|x| {
                    let e = 10f64.powf(x);
                    let dnde = m.evaluate(e);
                    (dnde > 0.0).then(|| (x, sed(e, dnde)))
                })
                .collect()
        })
        .unwrap_or_default();

    let marks = points.iter().filter_map(|p| {
        let v = if p.is_ul { p.dnde_ul } else { p.dnde };
        (v > 0.0).then(|| sed(p.e_ref, v))
    });
    let Some(y_range) = span(curve.iter().map(|(_, y)| *y).chain(marks)) else {
        return "SED: nothing to draw\n".to_string();
    };

    let mut canvas = Canvas::new(width, height, x_range, with_margin(y_range));
    canvas.polyline(&curve, '-');

    for p in points {
        let x = p.e_ref.log10();
        if p.is_ul {
            if p.dnde_ul > 0.0 {
                canvas.put(x, sed(p.e_ref, p.dnde_ul), 'v');
            }
            continue;
        }
        if !(p.dnde > 0.0) {
            continue;
        }
        let rel = p.dnde / p.norm.max(f64::MIN_POSITIVE);
        let lo = p.dnde - p.norm_errn * rel;
        let hi = p.dnde + p.norm_errp * rel;
        if lo > 0.0 && hi.is_finite() {
            canvas.vertical(x, sed(p.e_ref, lo), sed(p.e_ref, hi), '|');
        }
        canvas.put(x, sed(p.e_ref, p.dnde), 'o');
    }

    let (y_min, y_max) = canvas.y;
    canvas.render(format!(
        "SED: E=[{e_lo:.3}, {e_hi:.3}] TeV | E2dN/dE=[{:.2e}, {:.2e}] TeV cm-2 s-1",
        10f64.powf(y_min),
        10f64.powf(y_max)
    ))
}

fn render_series(title: &str, x_unit: &str, series: &[(f64, f64)], width: usize, height: usize) -> String {
    let x_range = span(series.iter().map(|(x, _)| *x)).unwrap_or((0.0, 1.0));
    let y_range = with_margin(span(series.iter().map(|(_, y)| *y)).unwrap_or((0.0, 1.0)));

    let mut canvas = Canvas::new(width.max(10), height.max(5), x_range, y_range);
    canvas.polyline(series, '-');
    for &(x, y) in series {
        canvas.put(x, y, 'o');
    }

    let ((x_min, x_max), (y_min, y_max)) = (canvas.x, canvas.y);
    canvas.render(format!(
        "{title}: x=[{x_min:.2}, {x_max:.2}] {x_unit} | y=[{y_min:.2}, {y_max:.2}]"
    ))
}

fn energy_range(points: &[FluxPoint]) -> Option<(f64, f64)> {
    let lo = points.iter().map(|p| p.e_min).fold(f64::INFINITY, f64::min);
    let hi = points.iter().map(|p| p.e_max).fold(f64::NEG_INFINITY, f64::max);
    (lo > 0.0 && hi.is_finite() && hi > lo).then_some((lo, hi))
}

/// Range of the finite values; a single value becomes a unit-wide range.
fn span(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut finite = values.filter(|v| v.is_finite()).peekable();
    finite.peek()?;
    let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    Some(if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) })
}

fn with_margin((lo, hi): (f64, f64)) -> (f64, f64) {
    let margin = f64::max(Y_MARGIN * (hi - lo), 1e-12);
    (lo - margin, hi + margin)
}

/// Character grid over a data window. Row 0 is the top (largest y).
struct Canvas {
    cells: Vec<Vec<char>>,
    x: (f64, f64),
    y: (f64, f64),
}

impl Canvas {
    fn new(width: usize, height: usize, x: (f64, f64), y: (f64, f64)) -> Self {
        Self {
            cells: vec![vec![' '; width.max(2)]; height.max(2)],
            x,
            y,
        }
    }

    fn width(&self) -> usize {
        self.cells[0].len()
    }

    fn height(&self) -> usize {
        self.cells.len()
    }

    /// `(column, row)` of a data point, clamped to the grid.
    fn cell(&self, x: f64, y: f64) -> (usize, usize) {
        let frac = |v: f64, (lo, hi): (f64, f64)| ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
        let last_col = (self.width() - 1) as f64;
        let last_row = (self.height() - 1) as f64;
        let col = (frac(x, self.x) * last_col).round();
        let row = (last_row - frac(y, self.y) * last_row).round();
        (col as usize, row as usize)
    }

    fn put(&mut self, x: f64, y: f64, ch: char) {
        let (col, row) = self.cell(x, y);
        self.cells[row][col] = ch;
    }

    /// Vertical bar between two y values at `x`.
    fn vertical(&mut self, x: f64, y_a: f64, y_b: f64, ch: char) {
        let (col, row_a) = self.cell(x, y_a);
        let (_, row_b) = self.cell(x, y_b);
        for row in row_a.min(row_b)..=row_a.max(row_b) {
            self.cells[row][col] = ch;
        }
    }

    /// Connect consecutive points with `ch`, leaving non-blank cells alone.
    fn polyline(&mut self, points: &[(f64, f64)], ch: char) {
        if points.len() < 2 {
            return;
        }
        let cells: Vec<(usize, usize)> = points.iter().map(|&(x, y)| self.cell(x, y)).collect();
        self.fill_blank(cells[0], ch);
        for pair in cells.windows(2) {
            self.segment(pair[0], pair[1], ch);
        }
    }

    /// Cells along a segment, one per step of its longer axis.
    fn segment(&mut self, (c0, r0): (usize, usize), (c1, r1): (usize, usize), ch: char) {
        let (dc, dr) = (c1 as f64 - c0 as f64, r1 as f64 - r0 as f64);
        let steps = dc.abs().max(dr.abs()) as usize;
        for i in 0..=steps {
            let t = if steps == 0 { 0.0 } else { i as f64 / steps as f64 };
            let col = (c0 as f64 + t * dc).round() as usize;
            let row = (r0 as f64 + t * dr).round() as usize;
            self.fill_blank((col, row), ch);
        }
    }

    fn fill_blank(&mut self, (col, row): (usize, usize), ch: char) {
        if let Some(cell) = self.cells.get_mut(row).and_then(|r| r.get_mut(col)) {
            if *cell == ' ' {
                *cell = ch;
            }
        }
    }

    fn render(self, header: String) -> String {
        let mut out = header;
        out.push('\n');
        for row in self.cells {
            out.extend(row);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(livetime_h: f64, excess: f64) -> DatasetInfo {
        DatasetInfo {
            name: "stacked".to_string(),
            n_obs: 1,
            counts: excess + 10.0,
            counts_off: 10.0,
            background: 10.0,
            excess,
            sqrt_ts: excess / 4.0,
            alpha: 1.0,
            livetime_s: livetime_h * 3600.0,
            n_safe_bins: 3,
        }
    }

    #[test]
    fn series_golden_snapshot_small() {
        let txt = render_series("Excess", "h", &[(0.0, 0.0), (1.0, 10.0)], 10, 5);
        let expected = concat!(
            "Excess: x=[0.00, 1.00] h | y=[-0.50, 10.50]\n",
            "        -o\n",
            "      --  \n",
            "    --    \n",
            "  --      \n",
            "o-        \n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn canvas_puts_the_top_of_the_window_in_row_zero() {
        let mut canvas = Canvas::new(5, 3, (0.0, 4.0), (0.0, 2.0));
        assert_eq!(canvas.cell(0.0, 2.0), (0, 0));
        assert_eq!(canvas.cell(4.0, 0.0), (4, 2));
        assert_eq!(canvas.cell(-10.0, 99.0), (0, 0));

        canvas.put(2.0, 1.0, 'o');
        canvas.polyline(&[(0.0, 1.0), (4.0, 1.0)], '-');
        assert_eq!(canvas.render("t".to_string()), "t\n     \n--o--\n     \n");
    }

    #[test]
    fn cumulative_plot_has_two_panels() {
        let rows = vec![info(0.5, 20.0), info(1.0, 45.0), info(1.5, 60.0)];
        let txt = render_cumulative_plot(&rows, 30, 8);
        assert!(txt.starts_with("Excess:"));
        assert!(txt.contains("\nSignificance:"));
        assert_eq!(txt.lines().count(), 2 * 9);
    }

    #[test]
    fn sed_marks_upper_limits() {
        let point = |e_min: f64, e_max: f64, dnde: f64, is_ul: bool| FluxPoint {
            e_ref: (e_min * e_max).sqrt(),
            e_min,
            e_max,
            norm: 1.0,
            norm_err: 0.1,
            norm_errn: 0.1,
            norm_errp: 0.1,
            norm_ul: 1.5,
            dnde,
            dnde_err: 0.1 * dnde,
            dnde_ul: 1.5 * dnde,
            ts: if is_ul { 1.0 } else { 25.0 },
            sqrt_ts: if is_ul { 1.0 } else { 5.0 },
            is_ul,
            counts: 10.0,
            npred: 10.0,
        };
        let model = SpectralModel::power_law(2.5, 3e-11, 1.0);
        let points = vec![
            point(1.0, 3.0, model.evaluate(3f64.sqrt()), false),
            point(3.0, 10.0, model.evaluate(30f64.sqrt()), false),
            point(10.0, 30.0, model.evaluate(300f64.sqrt()), true),
        ];
        let txt = render_sed_plot(&points, Some(&model), 40, 12);
        assert!(txt.starts_with("SED: E=[1.000, 30.000] TeV"));
        assert_eq!(txt.matches('v').count(), 1);
        assert_eq!(txt.matches('o').count(), 2);
        assert!(txt.contains('-'));
        assert_eq!(render_sed_plot(&[], None, 40, 12), "SED: no flux points\n");
    }
}

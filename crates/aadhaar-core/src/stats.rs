use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

// ── Percentile helper ─────────────────────────────────────────────────────────

/// Compute the `p`-th percentile of a **sorted** slice using standard linear
/// interpolation between the two closest ranks.
///
/// Returns `0.0` for an empty slice.
pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }
    let len = sorted_data.len();
    if len == 1 {
        return sorted_data[0];
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (len as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted_data[lo];
    }
    let frac = rank - lo as f64;
    sorted_data[lo] + frac * (sorted_data[hi] - sorted_data[lo])
}

/// Sorted copy of `values` (NaN-safe total order).
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Percentile of an unsorted slice; `None` when empty.
pub fn percentile_of(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(percentile(&sorted(values), p))
    }
}

// ── Moments ───────────────────────────────────────────────────────────────────

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile_of(values, 50.0)
}

/// Sample standard deviation (n − 1 denominator); needs two observations.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() as f64 - 1.0)).sqrt())
}

/// Population standard deviation (n denominator).
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / values.len() as f64).sqrt())
}

/// Sample standard deviation as a percentage of the mean; `None` for a
/// zero mean or fewer than two observations.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m == 0.0 {
        return None;
    }
    Some(sample_std(values)? / m * 100.0)
}

/// Percentage change from `previous` to `current`; `None` when `previous`
/// is zero.
pub fn pct_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

// ── Correlation ───────────────────────────────────────────────────────────────

/// Pearson coefficient with its two-tailed significance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub r: f64,
    pub p_value: f64,
    /// Number of paired observations.
    pub n: usize,
}

/// Pearson correlation coefficient.
///
/// `None` when the slices differ in length, hold fewer than two points, or
/// either side is constant.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let ma = mean(a)?;
    let mb = mean(b)?;
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - ma;
        let dy = y - mb;
        cov += dx * dy;
        va += dx * dx;
        vb += dy * dy;
    }
    if va == 0.0 || vb == 0.0 {
        return None;
    }
    Some((cov / (va.sqrt() * vb.sqrt())).clamp(-1.0, 1.0))
}

/// Pearson correlation plus a two-tailed p-value from Student's t with
/// `n − 2` degrees of freedom.
pub fn pearson_test(a: &[f64], b: &[f64]) -> Option<Correlation> {
    let r = pearson(a, b)?;
    let n = a.len();
    Some(Correlation {
        r,
        p_value: correlation_p_value(r, n),
        n,
    })
}

fn correlation_p_value(r: f64, n: usize) -> f64 {
    if n <= 2 {
        return 1.0;
    }
    if r.abs() >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

// ── Ranking ───────────────────────────────────────────────────────────────────

/// Dense descending rank (1 = largest). Equal values share a rank; `None`
/// inputs get no rank.
pub fn dense_rank_desc(values: &[Option<f64>]) -> Vec<Option<usize>> {
    let mut distinct: Vec<f64> = values.iter().flatten().copied().collect();
    distinct.sort_by(|a, b| b.total_cmp(a));
    distinct.dedup();
    values
        .iter()
        .map(|v| {
            v.and_then(|x| {
                distinct
                    .iter()
                    .position(|d| *d == x)
                    .map(|pos| pos + 1)
            })
        })
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────────────────

//! Derivative-free minimisation for model parameter estimation.

use std::cmp::Ordering;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINKAGE: f64 = 0.5;

/// Stopping rules for [`nelder_mead`].
#[derive(Debug, Clone, Copy)]
pub struct NelderMeadConfig {
    /// Maximum number of iterations.
    pub max_iter: usize,
    /// Stop once the objective spread across the simplex falls below this.
    pub tolerance: f64,
    /// Initial simplex step, relative to each coordinate (absolute near zero).
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            tolerance: 1e-8,
            initial_step: 0.05,
        }
    }
}

/// Outcome of a minimisation.
#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    pub optimal_point: Vec<f64>,
    pub optimal_value: f64,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone)]
struct Vertex {
    point: Vec<f64>,
    value: f64,
}

/// Minimise `objective` with the Nelder-Mead simplex method.
///
/// Every candidate point is clamped into `bounds` (one `(min, max)` pair per
/// coordinate; missing pairs leave the coordinate free). Non-finite objective
/// values are treated as `+inf`, so the search steers away from them. The
/// search is fully deterministic.
///
/// # Example
/// ```
/// use demand_backtest::utils::optimization::{nelder_mead, NelderMeadConfig};
///
/// let result = nelder_mead(
///     |x| (x[0] - 2.0).powi(2) + (x[1] + 1.0).powi(2),
///     &[0.0, 0.0],
///     &[],
///     NelderMeadConfig::default(),
/// );
/// assert!((result.optimal_point[0] - 2.0).abs() < 1e-3);
/// assert!((result.optimal_point[1] + 1.0).abs() < 1e-3);
/// ```
pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: &[(f64, f64)],
    config: NelderMeadConfig,
) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let dim = initial.len();
    if dim == 0 {
        return NelderMeadResult {
            optimal_point: vec![],
            optimal_value: f64::NAN,
            iterations: 0,
            converged: false,
        };
    }

    let evaluate = |point: Vec<f64>| -> Vertex {
        let point = clamp(point, bounds);
        let value = objective(&point);
        Vertex {
            point,
            value: if value.is_finite() { value } else { f64::INFINITY },
        }
    };

    let mut simplex = Vec::with_capacity(dim + 1);
    simplex.push(evaluate(initial.to_vec()));
    for i in 0..dim {
        let mut point = initial.to_vec();
        point[i] += if initial[i].abs() > 1e-10 {
            config.initial_step * initial[i].abs()
        } else {
            config.initial_step
        };
        simplex.push(evaluate(point));
    }

    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iter {
        iterations += 1;
        simplex.sort_by(by_value);

        let best = simplex[0].value;
        let worst = simplex[dim].value;
        if (worst - best).abs() < config.tolerance
            || (best.is_infinite() && worst.is_infinite())
        {
            converged = true;
            break;
        }

        let centroid = centroid(&simplex[..dim]);
        if simplex
            .iter()
            .all(|v| distance(&v.point, &centroid) < config.tolerance)
        {
            converged = true;
            break;
        }

        let reflected = evaluate(along(&centroid, &simplex[dim].point, -REFLECTION));

        if reflected.value < simplex[0].value {
            let expanded = evaluate(along(&centroid, &reflected.point, EXPANSION));
            simplex[dim] = if expanded.value < reflected.value {
                expanded
            } else {
                reflected
            };
            continue;
        }

        if reflected.value < simplex[dim - 1].value {
            simplex[dim] = reflected;
            continue;
        }

        // Contract towards whichever of reflected/worst is better
        let outside = reflected.value < simplex[dim].value;
        let anchor = if outside {
            &reflected.point
        } else {
            &simplex[dim].point
        };
        let contracted = evaluate(along(&centroid, anchor, CONTRACTION));
        let threshold = if outside {
            reflected.value
        } else {
            simplex[dim].value
        };
        if contracted.value < threshold {
            simplex[dim] = contracted;
            continue;
        }

        let best_point = simplex[0].point.clone();
        for vertex in simplex.iter_mut().skip(1) {
            let shrunk = along(&best_point, &vertex.point, SHRINKAGE);
            *vertex = evaluate(shrunk);
        }
    }

    simplex.sort_by(by_value);
    let best = simplex.swap_remove(0);
    NelderMeadResult {
        optimal_point: best.point,
        optimal_value: best.value,
        iterations,
        converged,
    }
}

fn by_value(a: &Vertex, b: &Vertex) -> Ordering {
    a.value.total_cmp(&b.value)
}

/// `origin + scale * (target - origin)`.
fn along(origin: &[f64], target: &[f64], scale: f64) -> Vec<f64> {
    origin
        .iter()
        .zip(target)
        .map(|(o, t)| o + scale * (t - o))
        .collect()
}

fn centroid(vertices: &[Vertex]) -> Vec<f64> {
    let dim = vertices[0].point.len();
    let mut c = vec![0.0; dim];
    for v in vertices {
        for (ci, x) in c.iter_mut().zip(&v.point) {
            *ci += x;
        }
    }
    let n = vertices.len() as f64;
    c.iter_mut().for_each(|ci| *ci /= n);
    c
}

fn clamp(mut point: Vec<f64>, bounds: &[(f64, f64)]) -> Vec<f64> {
    for (x, &(lo, hi)) in point.iter_mut().zip(bounds) {
        *x = x.clamp(lo, hi);
    }
    point
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

//! Differencing and integration for the ARIMA adapter.

/// Difference `series` `d` times.
///
/// Each pass shortens the series by one; a series that runs out of points is
/// returned as is.
pub fn difference(series: &[f64], d: usize) -> Vec<f64> {
    let mut result = series.to_vec();
    for _ in 0..d {
        if result.len() <= 1 {
            break;
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Undo `d` rounds of differencing on values that continue `original`.
///
/// `differenced` holds future values on the `d`-times differenced scale; the
/// result holds the same steps on the scale of `original`.
pub fn integrate(differenced: &[f64], original: &[f64], d: usize) -> Vec<f64> {
    // Last observed value at every differencing level 0..d
    let anchors: Vec<f64> = (0..d)
        .map(|level| difference(original, level).last().copied().unwrap_or(0.0))
        .collect();

    anchors.iter().rev().fold(differenced.to_vec(), |values, &anchor| {
        values
            .iter()
            .scan(anchor, |level, &step| {
                *level += step;
                Some(*level)
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn first_difference_of_weekly_ramp() {
        let units = [100.0, 104.0, 109.0, 115.0];
        assert_eq!(difference(&units, 1), vec![4.0, 5.0, 6.0]);
        assert_eq!(difference(&units, 2), vec![1.0, 1.0]);
        assert_eq!(difference(&units, 0), units.to_vec());
    }

    #[test]
    fn over_differencing_stops_at_one_point() {
        assert_eq!(difference(&[3.0, 5.0], 4), vec![2.0]);
    }

    #[test]
    fn integrate_continues_first_difference() {
        let history = [10.0, 12.0, 15.0];
        let future_steps = [1.0, 2.0];
        let restored = integrate(&future_steps, &history, 1);
        assert_eq!(restored, vec![16.0, 18.0]);
    }

    #[test]
    fn integrate_continues_second_difference() {
        // Quadratic history: second differences are constant 2
        let history: Vec<f64> = (0..6).map(|t| (t * t) as f64).collect();
        let restored = integrate(&[2.0, 2.0], &history, 2);
        assert_relative_eq!(restored[0], 36.0);
        assert_relative_eq!(restored[1], 49.0);
    }

    #[test]
    fn integrate_without_differencing_is_identity() {
        assert_eq!(integrate(&[1.5, 2.5], &[9.0], 0), vec![1.5, 2.5]);
    }
}

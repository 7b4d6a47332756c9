// Clock-skew correction for move timestamps.
//
// The cube's millisecond clock drifts relative to the host (observed up to
// ~1% on real hardware). A least-squares fit of cube time onto host time
// over a solve's moves re-expresses every cube timestamp on the host
// timeline, anchored so the first move lands at zero.

use crate::event::MoveEvent;

const RECOVERED_MOVE_GAP_MS: u64 = 50;

/// Fit cube timestamps onto the host clock.
///
/// Moves recovered from history carry no `cube_ts`; their gaps are filled
/// first (walking tail-to-head, then head-to-tail, 50 ms per step) so the
/// regression sees a complete series. Returns a corrected copy; the input
/// order is preserved.
pub fn fit_timestamps(moves: &[MoveEvent]) -> Vec<MoveEvent> {
    let mut moves = moves.to_vec();
    fill_gaps(&mut moves);

    let pairs = paired_samples(&moves);
    let (slope, intercept) = least_squares(&pairs);

    let Some(first) = moves.iter().find_map(|m| m.cube_ts) else {
        return moves;
    };
    let offset = (slope * first as f64 + intercept).round();

    for mv in &mut moves {
        if let Some(cube_ts) = mv.cube_ts {
            let fitted = (slope * cube_ts as f64 + intercept).round() - offset;
            mv.cube_ts = Some(fitted.max(0.0) as u64);
        }
    }
    moves
}

/// Relative speed of the cube clock against the host clock, in percent
/// with millesimal precision. Positive means the cube runs fast. Zero for
/// fewer than two usable samples.
pub fn skew_percent(moves: &[MoveEvent]) -> f64 {
    let pairs: Vec<(f64, f64)> = moves
        .iter()
        .filter_map(|m| Some((m.host_ts? as f64, m.cube_ts? as f64)))
        .collect();
    let (slope, _) = least_squares(&pairs);
    ((slope - 1.0) * 100_000.0).round() / 1_000.0
}

fn fill_gaps(moves: &mut [MoveEvent]) {
    let len = moves.len();
    if len == 0 {
        return;
    }
    for i in (0..len - 1).rev() {
        if moves[i].cube_ts.is_none() {
            if let Some(next) = moves[i + 1].cube_ts {
                moves[i].cube_ts = Some(next.saturating_sub(RECOVERED_MOVE_GAP_MS));
            }
        }
    }
    for i in 1..len {
        if moves[i].cube_ts.is_none() {
            if let Some(prev) = moves[i - 1].cube_ts {
                moves[i].cube_ts = Some(prev + RECOVERED_MOVE_GAP_MS);
            }
        }
    }
}

fn paired_samples(moves: &[MoveEvent]) -> Vec<(f64, f64)> {
    moves
        .iter()
        .filter_map(|m| Some((m.cube_ts? as f64, m.host_ts? as f64)))
        .collect()
}

// Ordinary least squares y = slope * x + intercept. Degenerate inputs fall
// back to the identity mapping: slope 1 when x has no variance, intercept 0
// when there are no samples.
fn least_squares(pairs: &[(f64, f64)]) -> (f64, f64) {
    let n = pairs.len() as f64;
    if pairs.is_empty() {
        return (1.0, 0.0);
    }
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let var_x: f64 = pairs.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let cov: f64 = pairs
        .iter()
        .map(|p| (p.0 - mean_x) * (p.1 - mean_y))
        .sum();
    let slope = if var_x.abs() < 1e-3 { 1.0 } else { cov / var_x };
    (slope, mean_y - slope * mean_x)
}

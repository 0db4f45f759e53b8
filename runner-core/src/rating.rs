//! A multi-player generalisation of Elo. Players are grouped by outcome;
//! inter-group swings are the classical pairwise formula applied to the
//! groups' summed ratings, and a same-outcome match falls back to an
//! intra-group mirror-pairing so a sweep still redistributes points among
//! players who didn't all perform equally against the held-out opponent.

use crate::result::Outcome;

/// The classical pairwise Elo delta: `k * (w - expected_score(a, b))`.
pub fn pairwise_delta(rating_a: f64, rating_b: f64, winner_weight: f64, k: f64) -> f64 {
    let qa = 10f64.powf(rating_a / 400.0);
    let qb = 10f64.powf(rating_b / 400.0);
    k * (winner_weight - qa / (qa + qb))
}

/// Computes one rating delta per player in `outcomes`/`ratings` (same order,
/// same length). `k` is the configured score turbulence.
pub fn calculate_deltas(outcomes: &[Outcome], ratings: &[f64], k: f64) -> Vec<f64> {
    assert_eq!(outcomes.len(), ratings.len());
    let n = outcomes.len();

    let winners: Vec<usize> = (0..n).filter(|&i| outcomes[i] == Outcome::Win).collect();
    let losers: Vec<usize> = (0..n).filter(|&i| outcomes[i] == Outcome::Loss).collect();
    let drawers: Vec<usize> = (0..n).filter(|&i| outcomes[i] == Outcome::Draw).collect();

    let sum = |idxs: &[usize]| idxs.iter().map(|&i| ratings[i]).sum::<f64>();
    let (sum_w, sum_l, sum_d) = (sum(&winners), sum(&losers), sum(&drawers));

    let x_wl = if !winners.is_empty() && !losers.is_empty() { pairwise_delta(sum_w, sum_l, 1.0, k) } else { 0.0 };
    let x_wd = if !winners.is_empty() && !drawers.is_empty() { pairwise_delta(sum_w, sum_d, 1.0, k) } else { 0.0 };
    let x_ld = if !losers.is_empty() && !drawers.is_empty() { pairwise_delta(sum_d, sum_l, 1.0, k) } else { 0.0 };

    let mut deltas = vec![0.0; n];

    if !winners.is_empty() {
        let share = (x_wl + x_wd) / winners.len() as f64;
        for &i in &winners {
            deltas[i] = share;
        }
    }
    if !losers.is_empty() {
        let share = (-x_wl - x_ld) / losers.len() as f64;
        for &i in &losers {
            deltas[i] = share;
        }
    }
    if !drawers.is_empty() {
        let share = (x_ld - x_wd) / drawers.len() as f64;
        for &i in &drawers {
            deltas[i] = share;
        }
    }

    // A single-outcome match (everyone won, everyone lost, or everyone drew)
    // leaves every inter-group term at zero. Redistribute within the group by
    // mirror-pairing the sorted ratings: the strongest against the weakest,
    // and so on, each pair scored as a notional 0.5-weighted draw.
    let groups_present = [!winners.is_empty(), !losers.is_empty(), !drawers.is_empty()].iter().filter(|&&p| p).count();
    if groups_present == 1 {
        let group = if !winners.is_empty() { &winners } else if !losers.is_empty() { &losers } else { &drawers };
        apply_intra_group_mirroring(group, ratings, k, &mut deltas);
    }

    deltas
}

fn apply_intra_group_mirroring(group: &[usize], ratings: &[f64], k: f64, deltas: &mut [f64]) {
    let mut sorted = group.to_vec();
    sorted.sort_by(|&a, &b| ratings[a].partial_cmp(&ratings[b]).unwrap());
    let m = sorted.len();
    for i in 0..m {
        let j = m - 1 - i;
        if i == j {
            continue;
        }
        let (player, opponent) = (sorted[i], sorted[j]);
        deltas[player] += pairwise_delta(ratings[player], ratings[opponent], 0.5, k);
    }
}

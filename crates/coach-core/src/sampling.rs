//! Opponent move selection

use std::time::Duration;

use rand::Rng;

use crate::board::MoveRecord;
use crate::evaluation::MoveDistribution;

/// White's first move when the predictor has white
const WHITE_FIRST_MOVE: &str = "e2e4";

/// Black's fixed reply to each common first move
const BLACK_REPLIES: [(&str, &str); 4] = [
    ("e2e4", "e7e5"),
    ("d2d4", "d7d5"),
    ("c2c4", "e7e5"),
    ("g1f3", "g8f6"),
];

/// Deterministic move for the first move of the game, if there is one.
pub fn opening_move(history: &[MoveRecord]) -> Option<&'static str> {
    match history {
        [] => Some(WHITE_FIRST_MOVE),
        [first] => BLACK_REPLIES
            .iter()
            .find(|(white, _)| *white == first.uci)
            .map(|(_, reply)| *reply),
        _ => None,
    }
}

/// Weighted draw over a move distribution. Non-positive and non-finite
/// weights are never picked.
pub fn sample_move<R: Rng + ?Sized>(distribution: &MoveDistribution, rng: &mut R) -> Option<String> {
    let total: f64 = distribution
        .values()
        .filter(|p| p.is_finite() && **p > 0.0)
        .sum();
    if total <= 0.0 {
        return None;
    }

    let mut target = rng.random::<f64>() * total;
    let mut last = None;
    for (uci, &p) in distribution {
        if !p.is_finite() || p <= 0.0 {
            continue;
        }
        if target < p {
            return Some(uci.clone());
        }
        target -= p;
        last = Some(uci);
    }
    // Rounding can leave a sliver past the final bucket
    last.cloned()
}

/// Uniform draw over a list of moves.
pub fn random_move<R: Rng + ?Sized>(moves: &[String], rng: &mut R) -> Option<String> {
    if moves.is_empty() {
        return None;
    }
    Some(moves[rng.random_range(0..moves.len())].clone())
}

/// Simulated thinking time, uniform in `[min, max]`.
pub fn think_delay<R: Rng + ?Sized>(min: Duration, max: Duration, rng: &mut R) -> Duration {
    let min_ms = min.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    if max_ms <= min_ms {
        return min;
    }
    Duration::from_millis(rng.random_range(min_ms..=max_ms))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::side::Side;

    fn played(uci: &str) -> MoveRecord {
        MoveRecord {
            side: Side::White,
            from: uci[0..2].into(),
            to: uci[2..4].into(),
            promotion: None,
            san: String::new(),
            uci: uci.into(),
            fen_before: String::new(),
            fen_after: String::new(),
        }
    }

    #[test]
    fn test_opening_moves() {
        assert_eq!(opening_move(&[]), Some("e2e4"));
        assert_eq!(opening_move(&[played("d2d4")]), Some("d7d5"));
        assert_eq!(opening_move(&[played("b2b3")]), None);
        assert_eq!(opening_move(&[played("e2e4"), played("e7e5")]), None);
    }

    #[test]
    fn test_sample_skips_zero_weights() {
        let dist = BTreeMap::from([
            ("a2a3".to_string(), 0.0),
            ("e2e4".to_string(), 1.0),
            ("h2h3".to_string(), -0.5),
        ]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(sample_move(&dist, &mut rng).as_deref(), Some("e2e4"));
        }
    }

    #[test]
    fn test_sample_roughly_follows_weights() {
        let dist = BTreeMap::from([("d2d4".to_string(), 0.2), ("e2e4".to_string(), 0.8)]);
        let mut rng = StdRng::seed_from_u64(42);
        let hits = (0..2000)
            .filter(|_| sample_move(&dist, &mut rng).as_deref() == Some("e2e4"))
            .count();
        assert!((1450..1750).contains(&hits), "hits={hits}");
    }

    #[test]
    fn test_sample_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample_move(&BTreeMap::new(), &mut rng), None);
        assert_eq!(random_move(&[], &mut rng), None);
    }

    #[test]
    fn test_think_delay_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let d = think_delay(Duration::from_millis(200), Duration::from_millis(400), &mut rng);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(400));
        }
        assert_eq!(
            think_delay(Duration::from_millis(5), Duration::ZERO, &mut rng),
            Duration::from_millis(5)
        );
    }
}

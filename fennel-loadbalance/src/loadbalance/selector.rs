use rand::Rng;

/// 加权随机选择
///
/// 在 `[0, total)` 内取随机数，依次减去每个候选的权重，余数首次为负时选中该候选。
/// 权重为 0 的候选永远不会被选中，总权重为 0 时返回 `None`。
pub fn select_weighted<'a, T, F, R>(candidates: &'a [T], weight: F, rng: &mut R) -> Option<&'a T>
where
    F: Fn(&T) -> i32,
    R: Rng,
{
    let total: i64 = candidates.iter().map(|c| i64::from(weight(c).max(0))).sum();
    if total <= 0 {
        return None;
    }

    let mut remaining = rng.random_range(0..total);
    for candidate in candidates {
        remaining -= i64::from(weight(candidate).max(0));
        if remaining < 0 {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_empty_and_zero_weight() {
        let mut rng = StdRng::seed_from_u64(7);
        let empty: Vec<i32> = vec![];
        assert!(select_weighted(&empty, |w| *w, &mut rng).is_none());
        assert!(select_weighted(&[0, 0, 0], |w| *w, &mut rng).is_none());
    }

    #[test]
    fn test_zero_weight_is_never_selected() {
        let mut rng = StdRng::seed_from_u64(11);
        let candidates = [("a", 0), ("b", 5), ("c", 0)];
        for _ in 0..1_000 {
            let picked = select_weighted(&candidates, |c| c.1, &mut rng).unwrap();
            assert_eq!(picked.0, "b");
        }
    }

    #[test]
    fn test_distribution_follows_weights() {
        let mut rng = StdRng::seed_from_u64(42);
        let candidates = [("a", 10), ("b", 5), ("c", 5)];
        let draws = 20_000;
        let mut counts = [0usize; 3];
        for _ in 0..draws {
            let picked = select_weighted(&candidates, |c| c.1, &mut rng).unwrap();
            let index = candidates.iter().position(|c| c.0 == picked.0).unwrap();
            counts[index] += 1;
        }

        let share = |n: usize| n as f64 / draws as f64;
        assert!((share(counts[0]) - 0.5).abs() < 0.02, "a share {}", share(counts[0]));
        assert!((share(counts[1]) - 0.25).abs() < 0.02, "b share {}", share(counts[1]));
        assert!((share(counts[2]) - 0.25).abs() < 0.02, "c share {}", share(counts[2]));
    }
}

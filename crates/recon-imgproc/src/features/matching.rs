use std::num::NonZeroUsize;

use kiddo::immutable::float::kdtree::ImmutableKdTree;

use super::{descriptor_signature, Descriptor, SIGNATURE_SIZE};

/// A tentative correspondence between two feature sets.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Correspondence {
    /// Index of the feature in the first (query) set.
    pub query: usize,
    /// Index of the feature in the second (train) set.
    pub train: usize,
    /// Descriptor distance to the nearest neighbour.
    pub distance: f32,
    /// Ratio between the nearest and the second nearest distance.
    pub ratio: f32,
}

/// Nearest neighbour search strategy.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Exhaustive search, exact and O(n * m).
    BruteForce,
    /// Approximate search on a k-d tree built over coarse descriptor signatures.
    ///
    /// The `candidates` closest signatures are re-ranked with the full descriptor distance.
    Indexed {
        /// Number of candidates retrieved from the index per query.
        candidates: usize,
    },
}

/// Configuration for descriptor matching.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Lowe's ratio: accept when `nearest < ratio_threshold * second_nearest`.
    pub ratio_threshold: f32,
    /// Search strategy.
    pub strategy: MatchStrategy,
    /// Keep only mutual nearest neighbours.
    pub cross_check: bool,
    /// Keep at most this many correspondences, the most distinctive first.
    pub max_correspondences: Option<usize>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.75,
            strategy: MatchStrategy::BruteForce,
            cross_check: false,
            max_correspondences: None,
        }
    }
}

/// The two nearest neighbours of a query, as `(index, squared distance)`.
#[derive(Clone, Copy, Debug)]
struct TwoNearest {
    best: (usize, f32),
    second: f32,
}

impl TwoNearest {
    fn new() -> Self {
        Self {
            best: (usize::MAX, f32::INFINITY),
            second: f32::INFINITY,
        }
    }

    fn push(&mut self, index: usize, dist2: f32) {
        if dist2 < self.best.1 {
            self.second = self.best.1;
            self.best = (index, dist2);
        } else if dist2 < self.second {
            self.second = dist2;
        }
    }
}

#[inline]
fn squared_distance(a: &Descriptor, b: &Descriptor) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Match descriptors of two images with the nearest neighbour ratio test.
///
/// For each descriptor in `descriptors1`, the two nearest neighbours in `descriptors2`
/// are retrieved and the match is accepted only when the nearest distance is smaller
/// than `ratio_threshold` times the second nearest distance. Ambiguous matches, where
/// two candidates are nearly equidistant, are rejected.
///
/// # Arguments
///
/// * `descriptors1` - Descriptors of the query image.
/// * `descriptors2` - Descriptors of the train image.
/// * `config` - The matching configuration.
///
/// # Returns
///
/// The accepted correspondences sorted by query index. Empty inputs, or a train set
/// with fewer than two descriptors, yield no correspondences.
pub fn match_descriptors(
    descriptors1: &[Descriptor],
    descriptors2: &[Descriptor],
    config: &MatchConfig,
) -> Vec<Correspondence> {
    if descriptors1.is_empty() || descriptors2.len() < 2 {
        log::debug!(
            "nothing to match: {} query and {} train descriptors",
            descriptors1.len(),
            descriptors2.len()
        );
        return Vec::new();
    }

    let neighbours = match config.strategy {
        MatchStrategy::BruteForce => brute_force_neighbours(descriptors1, descriptors2),
        MatchStrategy::Indexed { candidates } => {
            indexed_neighbours(descriptors1, descriptors2, candidates)
        }
    };

    let mut matches = neighbours
        .into_iter()
        .enumerate()
        .filter_map(|(query, nn)| ratio_test(query, &nn, config.ratio_threshold))
        .collect::<Vec<_>>();

    if config.cross_check {
        matches.retain(|m| is_mutual(descriptors1, descriptors2, m));
    }

    if let Some(max) = config.max_correspondences {
        if matches.len() > max {
            matches.sort_by(|a, b| a.ratio.total_cmp(&b.ratio).then(a.query.cmp(&b.query)));
            matches.truncate(max);
            matches.sort_by_key(|m| m.query);
        }
    }

    log::debug!(
        "{} of {} descriptors passed the ratio test",
        matches.len(),
        descriptors1.len()
    );

    matches
}

fn ratio_test(query: usize, nn: &TwoNearest, ratio_threshold: f32) -> Option<Correspondence> {
    if nn.best.0 == usize::MAX || !nn.second.is_finite() {
        return None;
    }
    let best = nn.best.1.sqrt();
    let second = nn.second.sqrt();
    if second <= 0.0 || best >= ratio_threshold * second {
        return None;
    }
    Some(Correspondence {
        query,
        train: nn.best.0,
        distance: best,
        ratio: best / second,
    })
}

fn brute_force_neighbours(
    descriptors1: &[Descriptor],
    descriptors2: &[Descriptor],
) -> Vec<TwoNearest> {
    descriptors1
        .iter()
        .map(|d1| {
            let mut nn = TwoNearest::new();
            for (j, d2) in descriptors2.iter().enumerate() {
                nn.push(j, squared_distance(d1, d2));
            }
            nn
        })
        .collect()
}

fn indexed_neighbours(
    descriptors1: &[Descriptor],
    descriptors2: &[Descriptor],
    candidates: usize,
) -> Vec<TwoNearest> {
    let signatures = descriptors2
        .iter()
        .map(descriptor_signature)
        .collect::<Vec<_>>();

    // build kdtree over the train signatures to speed up the candidate search
    let kdtree: ImmutableKdTree<f32, u32, SIGNATURE_SIZE, 32> =
        ImmutableKdTree::new_from_slice(&signatures);

    let qty = NonZeroUsize::new(candidates.clamp(2, descriptors2.len())).unwrap_or(NonZeroUsize::MIN);

    descriptors1
        .iter()
        .map(|d1| {
            let mut nn = TwoNearest::new();
            let query = descriptor_signature(d1);
            for candidate in kdtree.nearest_n::<kiddo::SquaredEuclidean>(&query, qty) {
                let j = candidate.item as usize;
                nn.push(j, squared_distance(d1, &descriptors2[j]));
            }
            nn
        })
        .collect()
}

/// Whether the query descriptor is also the nearest neighbour of its match.
fn is_mutual(
    descriptors1: &[Descriptor],
    descriptors2: &[Descriptor],
    m: &Correspondence,
) -> bool {
    let target = &descriptors2[m.train];
    let forward = squared_distance(&descriptors1[m.query], target);
    descriptors1
        .iter()
        .enumerate()
        .all(|(i, d1)| i == m.query || squared_distance(d1, target) > forward)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::DESCRIPTOR_SIZE;
    use rand::prelude::*;

    fn random_descriptor(rng: &mut StdRng) -> Descriptor {
        let mut d = [0f32; DESCRIPTOR_SIZE];
        d.iter_mut().for_each(|v| *v = rng.random::<f32>());
        let norm = d.iter().map(|v| v * v).sum::<f32>().sqrt();
        d.iter_mut().for_each(|v| *v /= norm);
        d
    }

    fn perturb(d: &Descriptor, rng: &mut StdRng, amplitude: f32) -> Descriptor {
        let mut out = *d;
        out.iter_mut()
            .for_each(|v| *v += amplitude * (rng.random::<f32>() - 0.5));
        out
    }

    /// Query descriptors plus a shuffled and perturbed copy with some distractors.
    fn make_sets(n: usize, seed: u64) -> (Vec<Descriptor>, Vec<Descriptor>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let desc1 = (0..n).map(|_| random_descriptor(&mut rng)).collect::<Vec<_>>();

        let mut order = (0..n).collect::<Vec<_>>();
        order.shuffle(&mut rng);

        let mut desc2 = order
            .iter()
            .map(|&i| perturb(&desc1[i], &mut rng, 0.01))
            .collect::<Vec<_>>();
        desc2.extend((0..n / 2).map(|_| random_descriptor(&mut rng)));

        // ground truth: position in desc2 of each query
        let mut gt = vec![0usize; n];
        for (j, &i) in order.iter().enumerate() {
            gt[i] = j;
        }
        (desc1, desc2, gt)
    }

    #[test]
    fn test_match_brute_force_recovers_permutation() {
        let (desc1, desc2, gt) = make_sets(50, 0);
        let matches = match_descriptors(&desc1, &desc2, &MatchConfig::default());
        assert_eq!(matches.len(), 50);
        for m in matches.iter() {
            assert_eq!(m.train, gt[m.query]);
            assert!(m.ratio < 0.75);
        }
    }

    #[test]
    fn test_match_is_idempotent() {
        let (desc1, desc2, _) = make_sets(40, 1);
        for strategy in [
            MatchStrategy::BruteForce,
            MatchStrategy::Indexed { candidates: 8 },
        ] {
            let config = MatchConfig {
                strategy,
                ..Default::default()
            };
            let first = match_descriptors(&desc1, &desc2, &config);
            let second = match_descriptors(&desc1, &desc2, &config);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_match_indexed_agrees_with_brute_force() {
        let (desc1, desc2, _) = make_sets(40, 2);
        let exact = match_descriptors(&desc1, &desc2, &MatchConfig::default());
        // retrieving every candidate makes the indexed search exact
        let indexed = match_descriptors(
            &desc1,
            &desc2,
            &MatchConfig {
                strategy: MatchStrategy::Indexed {
                    candidates: desc2.len(),
                },
                ..Default::default()
            },
        );
        assert_eq!(exact, indexed);
    }

    #[test]
    fn test_match_ratio_rejects_ambiguous() {
        let mut rng = StdRng::seed_from_u64(3);
        let d = random_descriptor(&mut rng);
        let desc1 = vec![d];
        // two equally good candidates
        let desc2 = vec![perturb(&d, &mut rng, 0.001), perturb(&d, &mut rng, 0.001)];
        let matches = match_descriptors(&desc1, &desc2, &MatchConfig::default());
        assert!(matches.is_empty());
    }

    #[test]
    fn test_match_empty_inputs() {
        let (desc1, desc2, _) = make_sets(10, 4);
        let config = MatchConfig::default();
        assert!(match_descriptors(&[], &desc2, &config).is_empty());
        assert!(match_descriptors(&desc1, &[], &config).is_empty());
        assert!(match_descriptors(&desc1, &desc2[..1], &config).is_empty());
    }

    #[test]
    fn test_match_max_correspondences_and_cross_check() {
        let (desc1, desc2, _) = make_sets(30, 5);
        let config = MatchConfig {
            max_correspondences: Some(10),
            cross_check: true,
            ..Default::default()
        };
        let matches = match_descriptors(&desc1, &desc2, &config);
        assert_eq!(matches.len(), 10);
        for pair in matches.windows(2) {
            assert!(pair[0].query < pair[1].query);
        }

        let all = match_descriptors(&desc1, &desc2, &MatchConfig::default());
        let mut ratios = all.iter().map(|m| m.ratio).collect::<Vec<_>>();
        ratios.sort_by(f32::total_cmp);
        let worst_kept = matches.iter().map(|m| m.ratio).fold(0.0f32, f32::max);
        assert!(worst_kept <= ratios[9]);
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Décompte des votes : numéro -> nombre de prédicteurs l'ayant retenu.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    votes: BTreeMap<u8, usize>,
    voters: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSet {
    pub threshold: usize,
    pub numbers: Vec<u8>,
}

impl VoteTally {
    /// Une prédiction vide (membre en échec) compte comme un votant sans vote.
    pub fn from_predictions<'a>(predictions: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut tally = Self::default();
        for prediction in predictions {
            tally.add(prediction);
        }
        tally
    }

    pub fn add(&mut self, prediction: &[u8]) {
        self.voters += 1;
        for &n in prediction {
            *self.votes.entry(n).or_insert(0) += 1;
        }
    }

    pub fn voters(&self) -> usize {
        self.voters
    }

    pub fn votes(&self, number: u8) -> usize {
        self.votes.get(&number).copied().unwrap_or(0)
    }

    /// Numéros ayant au moins `threshold` votes, croissants.
    pub fn consensus_at(&self, threshold: usize) -> Vec<u8> {
        self.votes
            .iter()
            .filter(|(_, &v)| v >= threshold)
            .map(|(&n, _)| n)
            .collect()
    }

    /// Un ensemble par seuil T = 2..=votants.
    pub fn consensus_sets(&self) -> Vec<ConsensusSet> {
        (2..=self.voters)
            .map(|threshold| ConsensusSet {
                threshold,
                numbers: self.consensus_at(threshold),
            })
            .collect()
    }

    /// Classement complet : votes décroissants, puis numéro croissant.
    pub fn ranking(&self) -> Vec<(u8, usize)> {
        let mut ranking: Vec<(u8, usize)> = self.votes.iter().map(|(&n, &v)| (n, v)).collect();
        ranking.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranking
    }

    /// Les `count` numéros les plus votés, croissants. Jamais de numéro sans vote.
    pub fn suggestion(&self, count: usize) -> Vec<u8> {
        let mut picked: Vec<u8> = self
            .ranking()
            .into_iter()
            .filter(|&(_, v)| v > 0)
            .take(count)
            .map(|(n, _)| n)
            .collect();
        picked.sort_unstable();
        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally() -> VoteTally {
        let preds: Vec<Vec<u8>> = vec![
            vec![1, 2, 3, 4],
            vec![2, 3, 4, 5],
            vec![3, 4, 5, 6],
            vec![],
        ];
        VoteTally::from_predictions(preds.iter().map(|p| p.as_slice()))
    }

    #[test]
    fn test_votes() {
        let t = tally();
        assert_eq!(t.voters(), 4);
        assert_eq!(t.votes(3), 3);
        assert_eq!(t.votes(1), 1);
        assert_eq!(t.votes(9), 0);
    }

    #[test]
    fn test_consensus_sets_per_threshold() {
        let t = tally();
        let sets = t.consensus_sets();
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0], ConsensusSet { threshold: 2, numbers: vec![2, 3, 4, 5] });
        assert_eq!(sets[1].numbers, vec![3, 4]);
        assert!(sets[2].numbers.is_empty());
    }

    #[test]
    fn test_consensus_monotonic() {
        let t = tally();
        for t1 in 1..=t.voters() {
            for t2 in t1 + 1..=t.voters() {
                let low = t.consensus_at(t1);
                assert!(t.consensus_at(t2).iter().all(|n| low.contains(n)));
            }
        }
    }

    #[test]
    fn test_ranking_and_suggestion() {
        let t = tally();
        assert_eq!(t.ranking()[0], (3, 3));
        assert_eq!(t.ranking()[1], (4, 3));
        assert_eq!(t.suggestion(3), vec![2, 3, 4]);
    }

    #[test]
    fn test_suggestion_never_pads_with_unvoted() {
        let preds: Vec<Vec<u8>> = vec![vec![7, 9]];
        let t = VoteTally::from_predictions(preds.iter().map(|p| p.as_slice()));
        assert_eq!(t.suggestion(5), vec![7, 9]);
        assert!(t.consensus_sets().is_empty());
    }
}

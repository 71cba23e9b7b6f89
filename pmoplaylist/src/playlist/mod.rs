//! Ordre de lecture et curseur
//!
//! [`PlaylistQueue`] ne contient que des identifiants ; les métadonnées
//! vivent dans le moteur. Invariant : le curseur, s'il existe, désigne une
//! position valide, et il est nul si et seulement si la file est vide.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistQueue {
    order: Vec<String>,
    current: Option<usize>,
}

impl PlaylistQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstruit une file ; un curseur absent ou hors bornes d'une file
    /// non vide est ramené au début
    pub fn from_parts(order: Vec<String>, current: Option<usize>) -> Self {
        let current = if order.is_empty() {
            None
        } else {
            Some(current.filter(|&i| i < order.len()).unwrap_or(0))
        };
        Self { order, current }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|x| x == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.map(|i| self.order[i].as_str())
    }

    /// Ajoute en fin de file ; renvoie `false` si l'identifiant est déjà présent
    ///
    /// La première piste d'une file vide devient la piste courante.
    pub fn push(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.contains(&id) {
            return false;
        }
        self.order.push(id);
        if self.current.is_none() {
            self.current = Some(0);
        }
        true
    }

    /// Retire une piste et renvoie son ancienne position
    ///
    /// Le curseur suit la piste courante. Si c'est elle qui est retirée, il
    /// reste sur la même position (la piste suivante), revient au début
    /// au-delà de la fin, et devient nul si la file se vide.
    pub fn remove(&mut self, id: &str) -> Option<usize> {
        let pos = self.position(id)?;
        self.order.remove(pos);

        self.current = match self.current {
            _ if self.order.is_empty() => None,
            Some(c) if pos < c => Some(c - 1),
            Some(c) if pos == c && c >= self.order.len() => Some(0),
            other => other,
        };
        Some(pos)
    }

    /// Place le curseur ; renvoie `false` si l'index est hors bornes
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.order.len() {
            return false;
        }
        self.current = Some(index);
        true
    }

    /// Position de la piste suivante, en bouclant ; la première sans curseur
    pub fn next_index(&self) -> Option<usize> {
        self.next_index_from(self.current)
    }

    /// Position suivant `from`, en bouclant ; la première si `from` est nul
    pub fn next_index_from(&self, from: Option<usize>) -> Option<usize> {
        let n = self.order.len();
        if n == 0 {
            return None;
        }
        Some(match from {
            None => 0,
            Some(c) => (c + 1) % n,
        })
    }

    /// Position de la piste précédente, en bouclant ; la dernière sans curseur
    pub fn previous_index(&self) -> Option<usize> {
        self.previous_index_from(self.current)
    }

    pub fn previous_index_from(&self, from: Option<usize>) -> Option<usize> {
        let n = self.order.len();
        if n == 0 {
            return None;
        }
        Some(match from {
            None => n - 1,
            Some(c) => (c + n - 1) % n,
        })
    }

    /// Permutation uniforme (Fisher-Yates) ; le curseur suit la piste courante
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let current_id = self.current_id().map(str::to_string);
        self.order.shuffle(rng);
        self.current = current_id.and_then(|id| self.position(&id));
    }

    /// Déplace une piste à `position` ; le curseur suit la piste courante
    pub fn move_to(&mut self, id: &str, position: usize) -> Result<()> {
        let len = self.order.len();
        let from = self
            .position(id)
            .ok_or_else(|| Error::TrackNotFound(id.to_string()))?;
        if position >= len {
            return Err(Error::InvalidPosition { position, len });
        }
        if from == position {
            return Ok(());
        }

        let moved = self.order.remove(from);
        self.order.insert(position, moved);

        self.current = self.current.map(|c| {
            if c == from {
                position
            } else if from < c && c <= position {
                c - 1
            } else if position <= c && c < from {
                c + 1
            } else {
                c
            }
        });
        Ok(())
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn queue(ids: &[&str]) -> PlaylistQueue {
        let mut q = PlaylistQueue::new();
        for id in ids {
            q.push(*id);
        }
        q
    }

    #[test]
    fn test_push_ignores_duplicates() {
        let mut q = queue(&["a", "b"]);
        assert!(!q.push("a"));
        assert_eq!(q.ids(), ["a", "b"]);
    }

    #[test]
    fn test_first_push_selects_track() {
        let mut q = PlaylistQueue::new();
        assert_eq!(q.current_index(), None);
        q.push("a");
        assert_eq!(q.current_id(), Some("a"));
        q.push("b");
        assert_eq!(q.current_id(), Some("a"));
    }

    #[test]
    fn test_remove_before_cursor() {
        let mut q = queue(&["a", "b", "c"]);
        q.select(2);
        assert_eq!(q.remove("a"), Some(0));
        assert_eq!(q.current_id(), Some("c"));
        assert_eq!(q.current_index(), Some(1));
    }

    #[test]
    fn test_remove_after_cursor() {
        let mut q = queue(&["a", "b", "c"]);
        q.select(0);
        q.remove("c");
        assert_eq!(q.current_id(), Some("a"));
    }

    #[test]
    fn test_remove_current_moves_to_next() {
        let mut q = queue(&["a", "b", "c"]);
        q.select(1);
        q.remove("b");
        assert_eq!(q.current_id(), Some("c"));

        // Au-delà de la fin : retour au début
        q.remove("c");
        assert_eq!(q.current_id(), Some("a"));

        q.remove("a");
        assert!(q.is_empty());
        assert_eq!(q.current_index(), None);
    }

    #[test]
    fn test_remove_unknown() {
        let mut q = queue(&["a"]);
        assert_eq!(q.remove("zz"), None);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_next_and_previous_wrap() {
        let mut q = queue(&["a", "b", "c"]);
        assert_eq!(q.next_index(), Some(1));
        assert_eq!(q.previous_index(), Some(2));

        q.select(2);
        assert_eq!(q.next_index(), Some(0));
        q.select(0);
        assert_eq!(q.previous_index(), Some(2));

        assert_eq!(PlaylistQueue::new().next_index(), None);
        assert_eq!(PlaylistQueue::new().previous_index(), None);
    }

    #[test]
    fn test_shuffle_keeps_current_track() {
        let mut rng = StdRng::seed_from_u64(42);
        let ids: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
        let mut q = PlaylistQueue::from_parts(ids.clone(), Some(7));

        for _ in 0..50 {
            q.shuffle_with(&mut rng);
            assert_eq!(q.current_id(), Some("t7"));
            let mut sorted = q.ids().to_vec();
            sorted.sort();
            let mut expected = ids.clone();
            expected.sort();
            assert_eq!(sorted, expected);
        }
    }

    #[test]
    fn test_shuffle_without_cursor() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut q = PlaylistQueue::new();
        q.shuffle_with(&mut rng);
        assert_eq!(q.current_index(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_seeded_shuffle_is_deterministic() {
        let mut a = queue(&["a", "b", "c", "d", "e", "f"]);
        let mut b = a.clone();
        a.shuffle_with(&mut StdRng::seed_from_u64(7));
        b.shuffle_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_move_updates_cursor() {
        let mut q = queue(&["a", "b", "c", "d"]);

        q.select(0);
        q.move_to("a", 3).unwrap();
        assert_eq!(q.ids(), ["b", "c", "d", "a"]);
        assert_eq!(q.current_id(), Some("a"));

        // Piste déplacée par-dessus le curseur
        q.move_to("b", 3).unwrap();
        assert_eq!(q.ids(), ["c", "d", "a", "b"]);
        assert_eq!(q.current_id(), Some("a"));

        q.move_to("b", 0).unwrap();
        assert_eq!(q.ids(), ["b", "c", "d", "a"]);
        assert_eq!(q.current_id(), Some("a"));
    }

    #[test]
    fn test_move_errors() {
        let mut q = queue(&["a", "b"]);
        assert!(matches!(q.move_to("zz", 0), Err(Error::TrackNotFound(_))));
        assert!(matches!(
            q.move_to("a", 2),
            Err(Error::InvalidPosition { position: 2, len: 2 })
        ));
    }

    #[test]
    fn test_from_parts_repairs_cursor() {
        let q = PlaylistQueue::from_parts(vec!["a".into(), "b".into()], Some(3));
        assert_eq!(q.current_index(), Some(0));
        let q = PlaylistQueue::from_parts(vec!["a".into(), "b".into()], Some(1));
        assert_eq!(q.current_index(), Some(1));
        let q = PlaylistQueue::from_parts(Vec::new(), Some(0));
        assert_eq!(q.current_index(), None);
    }

    #[test]
    fn test_random_operations_keep_cursor_valid() {
        let mut rng = StdRng::seed_from_u64(2024);
        let mut q = PlaylistQueue::new();
        let mut next_id = 0;

        for _ in 0..2000 {
            match rng.random_range(0..5) {
                0 | 1 => {
                    q.push(format!("t{next_id}"));
                    next_id += 1;
                }
                2 if !q.is_empty() => {
                    let victim = q.ids()[rng.random_range(0..q.len())].clone();
                    q.remove(&victim);
                }
                3 if !q.is_empty() => {
                    q.select(rng.random_range(0..q.len()));
                }
                4 => q.shuffle_with(&mut rng),
                _ => {}
            }

            match q.current_index() {
                Some(i) => assert!(i < q.len()),
                None => assert!(q.is_empty()),
            }
            if q.is_empty() {
                assert_eq!(q.current_index(), None);
            }
        }
    }
}

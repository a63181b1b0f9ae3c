//! The Glauber nearest-neighbour majority rule.

use super::cell::{Coord, NEIGHBOR_OFFSETS};
use super::grid::BitMatrix;

/// Sum of the 4 nearest neighbours of `coord`.
///
/// Reads wrap when the lattice is in wraparound mode; on a bordered lattice
/// `coord` must not lie on the border ring.
#[inline]
pub fn neighbor_sum(lattice: &BitMatrix, coord: Coord) -> u8 {
    let (row, col) = (coord.row as isize, coord.col as isize);
    NEIGHBOR_OFFSETS
        .iter()
        .map(|&(dr, dc)| lattice.get(row + dr, col + dc) as u8)
        .sum()
}

/// New value of a vertex whose neighbours sum to `sum`.
///
/// `coin` is only called on a tie, so ties are the only updates that
/// consume randomness.
#[inline]
pub fn glauber_value(sum: u8, coin: impl FnOnce() -> bool) -> bool {
    match sum {
        0 | 1 => false,
        2 => coin(),
        _ => true,
    }
}

/// Whether an update of `coord` could change it: its neighbours are tied,
/// or their majority disagrees with its current value.
///
/// Deliberately wider than the three classic cases (sum 3 under a 0,
/// sum 1 under a 1, a tie): unanimous neighbours also count, sum 4 under
/// a 0 and sum 0 under a 1.
#[inline]
pub fn can_flip(lattice: &BitMatrix, coord: Coord) -> bool {
    let value = lattice.get(coord.row as isize, coord.col as isize);
    match neighbor_sum(lattice, coord) {
        2 => true,
        3 | 4 => !value,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::grid::IndexMode;

    /// 3x3 lattice with the centre at `center` and the 4 neighbours from `nbs`
    /// (down, right, up, left).
    fn plus(center: bool, nbs: [bool; 4]) -> BitMatrix {
        let mut m = BitMatrix::new(3, 3);
        m.set(1, 1, center);
        for (&(dr, dc), bit) in NEIGHBOR_OFFSETS.iter().zip(nbs) {
            m.set(1 + dr, 1 + dc, bit);
        }
        m
    }

    #[test]
    fn test_majority_decides() {
        assert!(glauber_value(3, || unreachable!()));
        assert!(glauber_value(4, || unreachable!()));
        assert!(!glauber_value(1, || unreachable!()));
        assert!(!glauber_value(0, || unreachable!()));
    }

    #[test]
    fn test_tie_uses_coin() {
        assert!(glauber_value(2, || true));
        assert!(!glauber_value(2, || false));
    }

    #[test]
    fn test_neighbor_sum_ignores_diagonals() {
        let mut m = plus(true, [true, false, true, false]);
        m.set(0, 0, true);
        m.set(2, 2, true);
        assert_eq!(neighbor_sum(&m, Coord::new(1, 1)), 2);
    }

    #[test]
    fn test_neighbor_sum_wraps_on_torus() {
        let mut m = BitMatrix::new(3, 3).with_index_mode(IndexMode::Wraparound);
        m.set(2, 0, true);
        m.set(0, 2, true);
        m.set(1, 0, true);
        assert_eq!(neighbor_sum(&m, Coord::new(0, 0)), 3);
    }

    #[test]
    fn test_can_flip() {
        assert!(can_flip(&plus(false, [true, true, true, false]), Coord::new(1, 1)));
        assert!(!can_flip(&plus(true, [true, true, true, false]), Coord::new(1, 1)));
        assert!(can_flip(&plus(true, [true, false, false, false]), Coord::new(1, 1)));
        assert!(!can_flip(&plus(false, [true, false, false, false]), Coord::new(1, 1)));
        assert!(can_flip(&plus(true, [true, true, false, false]), Coord::new(1, 1)));
        assert!(can_flip(&plus(false, [true, true, false, false]), Coord::new(1, 1)));
        assert!(can_flip(&plus(false, [true; 4]), Coord::new(1, 1)));
        assert!(!can_flip(&plus(true, [true; 4]), Coord::new(1, 1)));
        assert!(can_flip(&plus(true, [false; 4]), Coord::new(1, 1)));
        assert!(!can_flip(&plus(false, [false; 4]), Coord::new(1, 1)));
    }
}

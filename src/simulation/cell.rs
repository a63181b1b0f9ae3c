use std::fmt;

/// Lattice topology a strategy and its lattice agree on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Fixed border ring, never updated
    Bordered,
    /// Periodic boundary, indices wrap modulo the lattice size
    Torus,
}

/// Position of a vertex on the outer lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

/// Row/column offsets of the 4 nearest neighbours: down, right, up, left
pub const NEIGHBOR_OFFSETS: [(isize, isize); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

impl Coord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Encode into the row-major flat index of an `n`-column lattice
    pub fn encode(self, ncol: usize) -> usize {
        self.row * ncol + self.col
    }

    /// Decode a row-major flat index
    pub fn decode(flat: usize, ncol: usize) -> Self {
        Self {
            row: flat / ncol,
            col: flat % ncol,
        }
    }

    /// Whether the vertex may ever be picked for an update
    pub fn is_updatable(self, n_outer: usize, topology: Topology) -> bool {
        match topology {
            Topology::Torus => self.row < n_outer && self.col < n_outer,
            Topology::Bordered => {
                (1..n_outer.saturating_sub(1)).contains(&self.row)
                    && (1..n_outer.saturating_sub(1)).contains(&self.col)
            }
        }
    }

    /// The updatable 4-neighbours of this vertex.
    ///
    /// Bordered lattices drop neighbours on the border ring, the torus wraps.
    pub fn neighbors(self, n_outer: usize, topology: Topology) -> impl Iterator<Item = Coord> {
        NEIGHBOR_OFFSETS.into_iter().filter_map(move |(dr, dc)| {
            let row = self.row as isize + dr;
            let col = self.col as isize + dc;
            let neighbor = match topology {
                Topology::Torus => Coord {
                    row: row.rem_euclid(n_outer as isize) as usize,
                    col: col.rem_euclid(n_outer as isize) as usize,
                },
                Topology::Bordered => {
                    if row < 0 || col < 0 {
                        return None;
                    }
                    Coord {
                        row: row as usize,
                        col: col as usize,
                    }
                }
            };
            neighbor.is_updatable(n_outer, topology).then_some(neighbor)
        })
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let coord = Coord::new(500, 300);
        let flat = coord.encode(1000);
        assert_eq!(flat, 500_300);
        assert_eq!(Coord::decode(flat, 1000), coord);
    }

    #[test]
    fn test_bordered_neighbors_skip_border() {
        let corner = Coord::new(1, 1);
        let neighbors: Vec<_> = corner.neighbors(5, Topology::Bordered).collect();
        assert_eq!(neighbors, vec![Coord::new(2, 1), Coord::new(1, 2)]);

        let center = Coord::new(2, 2);
        assert_eq!(center.neighbors(5, Topology::Bordered).count(), 4);
    }

    #[test]
    fn test_torus_neighbors_wrap() {
        let corner = Coord::new(0, 0);
        let neighbors: Vec<_> = corner.neighbors(4, Topology::Torus).collect();
        assert_eq!(
            neighbors,
            vec![
                Coord::new(1, 0),
                Coord::new(0, 1),
                Coord::new(3, 0),
                Coord::new(0, 3),
            ]
        );
    }

    #[test]
    fn test_updatable_region() {
        assert!(!Coord::new(0, 2).is_updatable(5, Topology::Bordered));
        assert!(!Coord::new(2, 4).is_updatable(5, Topology::Bordered));
        assert!(Coord::new(3, 3).is_updatable(5, Topology::Bordered));
        assert!(Coord::new(0, 4).is_updatable(5, Topology::Torus));
    }
}

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use bitvec::prelude::*;
use rand::Rng;

use crate::error::{GlauberError, Result};

/// How out-of-range row/column indices are treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IndexMode {
    /// Indices outside `[0, dim)` are a contract violation
    #[default]
    Bounded,
    /// Indices are reduced modulo the dimension, negative ones included
    Wraparound,
}

/// Bit-packed 2-D boolean matrix stored row-major.
///
/// Backed by a most-significant-bit-first `BitVec<u8>`, so the raw bytes
/// are also the on-disk checkpoint layout. The unused bits of the last
/// byte start at zero and are never written.
#[derive(Clone, PartialEq, Eq)]
pub struct BitMatrix {
    nrow: usize,
    ncol: usize,
    bits: BitVec<u8, Msb0>,
    mode: IndexMode,
}

impl BitMatrix {
    /// All-zero matrix
    pub fn new(nrow: usize, ncol: usize) -> Self {
        Self {
            nrow,
            ncol,
            bits: BitVec::repeat(false, nrow * ncol),
            mode: IndexMode::Bounded,
        }
    }

    /// Matrix from row-major bits; panics if the count does not match the shape
    pub fn from_bits(nrow: usize, ncol: usize, bits: impl IntoIterator<Item = bool>) -> Self {
        let mut matrix = Self::new(nrow, ncol);
        let mut written = 0;
        for (flat, bit) in bits.into_iter().enumerate() {
            assert!(flat < nrow * ncol, "more bits than a {nrow}x{ncol} matrix holds");
            matrix.bits.set(flat, bit);
            written += 1;
        }
        assert_eq!(written, nrow * ncol, "bit count does not match {nrow}x{ncol}");
        matrix
    }

    /// Square matrix with every cell an independent Bernoulli(p) draw,
    /// sampled in row-major order.
    pub fn random<R: Rng + ?Sized>(n: usize, p: f64, rng: &mut R) -> Self {
        let mut matrix = Self::new(n, n);
        for flat in 0..n * n {
            if rng.gen_bool(p) {
                matrix.bits.set(flat, true);
            }
        }
        matrix
    }

    pub fn with_index_mode(mut self, mode: IndexMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn set_index_mode(&mut self, mode: IndexMode) {
        self.mode = mode;
    }

    pub fn index_mode(&self) -> IndexMode {
        self.mode
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrow, self.ncol)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Raw packed bytes, exactly the checkpoint file contents
    pub fn as_bytes(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }

    fn flat_index(&self, row: isize, col: isize) -> Result<usize> {
        let out_of_range = || GlauberError::OutOfRange {
            row,
            col,
            nrow: self.nrow,
            ncol: self.ncol,
        };
        let (r, c) = match self.mode {
            IndexMode::Bounded => {
                if row < 0 || col < 0 || row as usize >= self.nrow || col as usize >= self.ncol {
                    return Err(out_of_range());
                }
                (row as usize, col as usize)
            }
            IndexMode::Wraparound => {
                if self.is_empty() {
                    return Err(out_of_range());
                }
                (
                    row.rem_euclid(self.nrow as isize) as usize,
                    col.rem_euclid(self.ncol as isize) as usize,
                )
            }
        };
        Ok(r * self.ncol + c)
    }

    pub fn try_get(&self, row: isize, col: isize) -> Result<bool> {
        Ok(self.bits[self.flat_index(row, col)?])
    }

    pub fn try_set(&mut self, row: isize, col: isize, bit: bool) -> Result<()> {
        let flat = self.flat_index(row, col)?;
        self.bits.set(flat, bit);
        Ok(())
    }

    /// Read one cell.
    ///
    /// # Panics
    ///
    /// On an out-of-range index in [`IndexMode::Bounded`].
    pub fn get(&self, row: isize, col: isize) -> bool {
        match self.try_get(row, col) {
            Ok(bit) => bit,
            Err(e) => panic!("{e}"),
        }
    }

    /// Write one cell.
    ///
    /// # Panics
    ///
    /// On an out-of-range index in [`IndexMode::Bounded`].
    pub fn set(&mut self, row: isize, col: isize, bit: bool) {
        if let Err(e) = self.try_set(row, col, bit) {
            panic!("{e}");
        }
    }

    fn row_bits(&self, row: usize) -> &BitSlice<u8, Msb0> {
        let start = row * self.ncol;
        &self.bits[start..start + self.ncol]
    }

    /// Bits of one row
    pub fn row(&self, row: usize) -> Vec<bool> {
        assert!(row < self.nrow, "row {row} out of range for {} rows", self.nrow);
        self.row_bits(row).iter().by_vals().collect()
    }

    /// Overwrite the outermost rows and columns with `bit`
    pub fn fill_border(&mut self, bit: bool) {
        if self.is_empty() {
            return;
        }
        let (n, last_row) = (self.ncol, (self.nrow - 1) * self.ncol);
        self.bits[..n].fill(bit);
        self.bits[last_row..].fill(bit);
        for row in 0..self.nrow {
            self.bits.set(row * n, bit);
            self.bits.set(row * n + n - 1, bit);
        }
    }

    /// Set every cell in rows and columns `[lo, hi)`
    pub fn fill_square(&mut self, lo: usize, hi: usize, bit: bool) {
        let hi_col = hi.min(self.ncol);
        if lo >= hi_col {
            return;
        }
        for row in lo..hi.min(self.nrow) {
            let start = row * self.ncol;
            self.bits[start + lo..start + hi_col].fill(bit);
        }
    }

    /// Number of cells equal to `bit`
    pub fn count(&self, bit: bool) -> usize {
        if bit {
            self.bits.count_ones()
        } else {
            self.bits.count_zeros()
        }
    }

    /// Number of set cells that are also set in `mask`
    pub fn count_ones_masked(&self, mask: &BitMatrix) -> usize {
        assert_eq!(self.shape(), mask.shape(), "mask shape mismatch");
        let mut masked = self.bits.clone();
        masked &= mask.bits.as_bitslice();
        masked.count_ones()
    }

    /// Write the packed bytes, no header
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), self.as_bytes())?;
        Ok(())
    }

    /// Replace the contents with a file written by [`BitMatrix::export`]
    /// for a matrix of this shape. Trailing bytes and pad bits are ignored.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => GlauberError::CheckpointNotFound(path.to_path_buf()),
            _ => GlauberError::Io(e),
        })?;

        let expected = self.as_bytes().len();
        if raw.len() < expected {
            return Err(GlauberError::CheckpointTruncated {
                path: path.to_path_buf(),
                expected,
                found: raw.len(),
            });
        }

        let len = self.len();
        self.bits
            .copy_from_bitslice(&raw.view_bits::<Msb0>()[..len]);
        Ok(())
    }

    /// Matrix rendering with the cell at (`row`, `col`) shown as `*`
    pub fn debug_string(&self, row: usize, col: usize) -> String {
        let mut out = String::with_capacity(self.nrow * (self.ncol + 1));
        for r in 0..self.nrow {
            for (c, bit) in self.row_bits(r).iter().by_vals().enumerate() {
                out.push(match (r == row && c == col, bit) {
                    (true, _) => '*',
                    (false, true) => '1',
                    (false, false) => '0',
                });
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for BitMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.nrow {
            for bit in self.row_bits(r).iter().by_vals() {
                f.write_str(if bit { "1" } else { "0" })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for BitMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitMatrix {}x{} ({:?})\n{}", self.nrow, self.ncol, self.mode, self)
    }
}

/// Mask of the centred `n_outer - 2 * padding` square
pub fn interior_mask(n_outer: usize, padding: usize) -> BitMatrix {
    let mut mask = BitMatrix::new(n_outer, n_outer);
    mask.fill_square(padding, n_outer.saturating_sub(padding), true);
    mask
}

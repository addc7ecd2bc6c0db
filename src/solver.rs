//! C4 shared ring abstraction (spec §9, "polymorphism over ring"). GF(2)
//! and GF(3) lazy Gaussian elimination are nearly identical procedures;
//! rather than modelling that with inheritance, both [`crate::gf2`] and
//! [`crate::gf3`] implement the same structural algorithm over a row type
//! of their own (packed bits vs. packed trits, spec §3/§4.4.b), and share
//! only the scalar [`Ring`] trait plus the dense fallback solver used in
//! step 5 of the lazy procedure.

/// Minimal field capability the dense fallback solver needs: additive and
/// multiplicative identity, add/sub, and multiplicative inverse (defined
/// for nonzero elements — both GF(2) and GF(3) are fields, so every
/// nonzero element has one).
pub trait Ring: Copy + PartialEq {
    fn zero() -> Self;
    fn one() -> Self;
    fn is_zero(self) -> bool;
    fn add(self, other: Self) -> Self;
    fn sub(self, other: Self) -> Self;
    fn mul(self, other: Self) -> Self;
    fn inv(self) -> Self;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Gf2(pub bool);

impl Ring for Gf2 {
    #[inline]
    fn zero() -> Self {
        Gf2(false)
    }
    #[inline]
    fn one() -> Self {
        Gf2(true)
    }
    #[inline]
    fn is_zero(self) -> bool {
        !self.0
    }
    #[inline]
    fn add(self, other: Self) -> Self {
        Gf2(self.0 ^ other.0)
    }
    #[inline]
    fn sub(self, other: Self) -> Self {
        Gf2(self.0 ^ other.0)
    }
    #[inline]
    fn mul(self, other: Self) -> Self {
        Gf2(self.0 & other.0)
    }
    #[inline]
    fn inv(self) -> Self {
        debug_assert!(self.0, "GF(2) zero has no multiplicative inverse");
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Gf3(pub u8);

impl Ring for Gf3 {
    #[inline]
    fn zero() -> Self {
        Gf3(0)
    }
    #[inline]
    fn one() -> Self {
        Gf3(1)
    }
    #[inline]
    fn is_zero(self) -> bool {
        self.0 == 0
    }
    #[inline]
    fn add(self, other: Self) -> Self {
        Gf3((self.0 + other.0) % 3)
    }
    #[inline]
    fn sub(self, other: Self) -> Self {
        Gf3((self.0 + 3 - other.0) % 3)
    }
    #[inline]
    fn mul(self, other: Self) -> Self {
        Gf3((self.0 * other.0) % 3)
    }
    #[inline]
    fn inv(self) -> Self {
        // GF(3)*: 1 is self-inverse, 2 is self-inverse (2*2=4≡1).
        debug_assert!(self.0 != 0, "GF(3) zero has no multiplicative inverse");
        self
    }
}

/// A dense row over a [`Ring`]: `m` coefficients plus a constant term.
/// Only used for the residual "heavy variable" system step 5 hands to
/// plain elimination — the sparse part of the system never materializes
/// a dense row.
#[derive(Clone, Debug)]
pub struct DenseRow<R: Ring> {
    pub coeffs: Vec<R>,
    pub constant: R,
}

/// Plain (textbook) Gaussian elimination over a `Ring`, pivoting by
/// smallest-index set variable (spec §4.4.a). Used both as a standalone
/// solver and as the dense fallback in step 5 of the lazy procedure.
pub struct PlainGaussianSolver;

impl PlainGaussianSolver {
    /// Solves `rows` (each of width `num_vars`) for an assignment. Returns
    /// `None` if the system is inconsistent (an empty row with nonzero
    /// constant). Variables that never appear default to `R::zero()`.
    pub fn solve<R: Ring>(mut rows: Vec<DenseRow<R>>, num_vars: usize) -> Option<Vec<R>> {
        let mut pivot_col_for_row: Vec<Option<usize>> = vec![None; rows.len()];
        let mut next_row = 0usize;

        for col in 0..num_vars {
            if next_row >= rows.len() {
                break;
            }
            let Some(pivot_row) = (next_row..rows.len()).find(|&r| !rows[r].coeffs[col].is_zero())
            else {
                continue;
            };
            rows.swap(next_row, pivot_row);

            let inv = rows[next_row].coeffs[col].inv();
            if inv != R::one() {
                for c in rows[next_row].coeffs.iter_mut() {
                    *c = c.mul(inv);
                }
                rows[next_row].constant = rows[next_row].constant.mul(inv);
            }

            for r in 0..rows.len() {
                if r == next_row {
                    continue;
                }
                let factor = rows[r].coeffs[col];
                if factor.is_zero() {
                    continue;
                }
                for c in 0..num_vars {
                    let scaled = rows[next_row].coeffs[c].mul(factor);
                    rows[r].coeffs[c] = rows[r].coeffs[c].sub(scaled);
                }
                let scaled_const = rows[next_row].constant.mul(factor);
                rows[r].constant = rows[r].constant.sub(scaled_const);
            }

            pivot_col_for_row[next_row] = Some(col);
            next_row += 1;
        }

        for row in &rows[next_row..] {
            if row.coeffs.iter().all(|c| c.is_zero()) && !row.constant.is_zero() {
                return None; // unsolvable: empty row, nonzero constant
            }
        }

        let mut solution = vec![R::zero(); num_vars];
        for (r, col) in pivot_col_for_row.iter().enumerate() {
            if let Some(col) = col {
                solution[*col] = rows[r].constant;
            }
        }
        Some(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_gf2_solves_small_system() {
        // x0 ^ x1 = 1
        // x1 ^ x2 = 0
        // x0       = 1
        let rows = vec![
            DenseRow { coeffs: vec![Gf2(true), Gf2(true), Gf2(false)], constant: Gf2(true) },
            DenseRow { coeffs: vec![Gf2(false), Gf2(true), Gf2(true)], constant: Gf2(false) },
            DenseRow { coeffs: vec![Gf2(true), Gf2(false), Gf2(false)], constant: Gf2(true) },
        ];
        let sol = PlainGaussianSolver::solve(rows, 3).unwrap();
        assert_eq!(sol[0], Gf2(true));
        assert_eq!(sol[0].add(sol[1]), Gf2(true));
        assert_eq!(sol[1].add(sol[2]), Gf2(false));
    }

    #[test]
    fn plain_gf2_detects_unsolvable() {
        let rows = vec![
            DenseRow { coeffs: vec![Gf2(false), Gf2(false)], constant: Gf2(true) },
        ];
        assert!(PlainGaussianSolver::solve(rows, 2).is_none());
    }

    #[test]
    fn plain_gf3_solves_small_system() {
        // x0 + x1 = 1 (mod 3); 2*x0 = 2 (mod 3) => x0 = 1, x1 = 0
        let rows = vec![
            DenseRow { coeffs: vec![Gf3(1), Gf3(1)], constant: Gf3(1) },
            DenseRow { coeffs: vec![Gf3(2), Gf3(0)], constant: Gf3(2) },
        ];
        let sol = PlainGaussianSolver::solve(rows, 2).unwrap();
        assert_eq!(sol[0], Gf3(1));
        assert_eq!(sol[1], Gf3(0));
    }
}

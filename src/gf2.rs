//! C4 — GF2System: sparse modulo-2 linear-equation solver used on the
//! unpeeled "2-core" left behind by [`crate::peel`] (spec §4.4). Used by
//! [`crate::function`]'s GOV3/GOV4 static-function assignment, where an
//! edge's constraint is `values[v0] XOR values[v1] XOR values[v2] == target`
//! (XOR of w-bit words, generalizing spec §3's single-bit `Gf2Equation` to a
//! full `u64` constant — see DESIGN.md "Gf2/Gf3 role split").
//!
//! Implements both plain (§4.4.a, via [`crate::solver::PlainGaussianSolver`])
//! and lazy/structured (§4.4.b) elimination. Per spec §9's design note, this
//! is a concrete module over `FixedBitRow` rather than a generic — its twin
//! is [`crate::gf3`], which repeats the same five-step shape over trits.

use std::collections::HashMap;

use crate::bits::FixedBitRow;
use crate::solver::{DenseRow, Gf2, PlainGaussianSolver};

/// One GF(2) equation: a set of variables XORed together, equal to a
/// `u64` constant (spec §3's "Equation (GF(2))" generalized to a vector
/// constant, see module docs).
#[derive(Clone, Debug)]
pub struct Gf2Equation {
    pub bits: FixedBitRow,
    pub constant: u64,
}

impl Gf2Equation {
    pub fn new(num_vars: u32, vars: &[u32], constant: u64) -> Self {
        Self { bits: FixedBitRow::from_vars(num_vars, vars), constant }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_zero()
    }

    #[inline]
    pub fn is_unsolvable(&self) -> bool {
        self.is_empty() && self.constant != 0
    }
}

/// A sparse GF(2) linear system over `num_vars` variables, each equation
/// carrying a `u64` (up to 64-bit) constant.
#[derive(Clone, Debug)]
pub struct Gf2System {
    num_vars: u32,
    equations: Vec<Gf2Equation>,
}

impl Gf2System {
    pub fn new(num_vars: u32) -> Self {
        Self { num_vars, equations: Vec::new() }
    }

    pub fn push(&mut self, vars: &[u32], constant: u64) {
        self.equations.push(Gf2Equation::new(self.num_vars, vars, constant));
    }

    pub fn num_vars(&self) -> u32 {
        self.num_vars
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    /// `check(sol)`: for every equation, XOR of `sol` over its set
    /// variables equals the stored constant (spec §4.4.b "Properties
    /// preserved").
    pub fn check(&self, sol: &[u64]) -> bool {
        self.equations.iter().all(|eq| {
            let xor = eq.bits.iter_set().fold(0u64, |acc, v| acc ^ sol[v as usize]);
            xor == eq.constant
        })
    }

    /// Plain (textbook) Gaussian elimination (spec §4.4.a), one dense pass
    /// per bit-plane of the constant. Used for small residual systems and
    /// as a reference oracle in tests.
    pub fn solve_plain(&self, width: u8) -> Option<Vec<u64>> {
        let nv = self.num_vars as usize;
        solve_dense_by_plane(
            self.equations.iter().map(|eq| (eq.bits.iter_set().collect::<Vec<_>>(), eq.constant)),
            nv,
            width,
            |v| v as usize,
        )
    }

    /// Lazy / structured Gaussian elimination (spec §4.4.b): repeatedly
    /// peel away priority-0/1 equations, escalate stubborn variables to
    /// "heavy" when no such equation remains, solve the residual dense
    /// system over heavy variables only, then back-substitute the light
    /// pivots in reverse discovery order.
    pub fn solve_lazy(&self, width: u8) -> Option<Vec<u64>> {
        let n = self.num_vars as usize;
        if n == 0 {
            return Some(Vec::new());
        }

        let mut rows: Vec<Option<(FixedBitRow, u64)>> =
            self.equations.iter().map(|e| Some((e.bits.clone(), e.constant))).collect();
        let mut light = vec![true; n];
        let mut var_eqs: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (eid, slot) in rows.iter().enumerate() {
            for v in slot.as_ref().unwrap().0.iter_set() {
                var_eqs[v as usize].push(eid);
            }
        }
        let light_count = |row: &FixedBitRow, light: &[bool]| -> u32 {
            row.iter_set().filter(|&v| light[v as usize]).count() as u32
        };
        let mut remaining_light: Vec<u32> =
            rows.iter().map(|s| light_count(&s.as_ref().unwrap().0, &light)).collect();

        // (pivot variable, the row and constant it was solved from, *at
        // the time of solving* — i.e. already reduced by earlier pivots).
        let mut solved: Vec<(u32, FixedBitRow, u64)> = Vec::new();
        // Deferred dense equations: (heavy variables set, constant).
        let mut dense_raw: Vec<(Vec<u32>, u64)> = Vec::new();
        let mut heavy_vars: Vec<u32> = Vec::new();

        loop {
            let candidate = (0..rows.len()).find(|&e| rows[e].is_some() && remaining_light[e] <= 1);

            let Some(e) = candidate else {
                // No priority<=1 equation live: escalate the live light
                // variable touched by the most live rows.
                let mut best: Option<(usize, u32)> = None;
                for v in 0..n {
                    if !light[v] {
                        continue;
                    }
                    let live = var_eqs[v]
                        .iter()
                        .filter(|&&e| rows[e].as_ref().is_some_and(|(r, _)| r.get(v as u32)))
                        .count();
                    if live > 0 && best.is_none_or(|(_, bc)| live as u32 > bc) {
                        best = Some((v, live as u32));
                    }
                }
                match best {
                    Some((v, _)) => {
                        light[v] = false;
                        heavy_vars.push(v as u32);
                        for &eid in &var_eqs[v] {
                            if let Some((row, _)) = &rows[eid] {
                                if row.get(v as u32) {
                                    remaining_light[eid] = light_count(row, &light);
                                }
                            }
                        }
                    }
                    None => break, // nothing live remains
                }
                continue;
            };

            let (row, constant) = rows[e].take().unwrap();
            if remaining_light[e] == 0 {
                if row.is_zero() {
                    if constant != 0 {
                        return None; // unsolvable: empty row, nonzero constant
                    }
                    // identity equation: discard
                } else {
                    dense_raw.push((row.iter_set().collect(), constant));
                }
                continue;
            }

            // Exactly one light variable remains set: it becomes a pivot.
            let pivot = row
                .iter_set()
                .find(|&v| light[v as usize])
                .expect("priority-1 equation must have one light variable");

            for &other in var_eqs[pivot as usize].clone().iter() {
                if other == e {
                    continue;
                }
                if let Some((orow, oconst)) = rows[other].as_mut() {
                    if orow.get(pivot) {
                        orow.xor_assign(&row);
                        *oconst ^= constant;
                        for v in orow.iter_set() {
                            if !var_eqs[v as usize].contains(&other) {
                                var_eqs[v as usize].push(other);
                            }
                        }
                        remaining_light[other] = light_count(orow, &light);
                    }
                }
            }

            light[pivot as usize] = false;
            solved.push((pivot, row, constant));
        }

        // Step 5: solve the dense heavy-variable system, now that the
        // final heavy-variable set (and thus column numbering) is fixed.
        let col_of: HashMap<u32, usize> =
            heavy_vars.iter().enumerate().map(|(i, &v)| (v, i)).collect();
        let heavy_solution = solve_dense_by_plane(
            dense_raw.into_iter(),
            heavy_vars.len(),
            width,
            |v| col_of[&v],
        )?;

        let mut solution = vec![0u64; n];
        for (slot, &v) in heavy_vars.iter().enumerate() {
            solution[v as usize] = heavy_solution[slot];
        }

        // Back-substitute light pivots in reverse discovery order using
        // the reduced row captured when each was solved.
        for (pivot, row, constant) in solved.iter().rev() {
            let mut acc = *constant;
            for v in row.iter_set() {
                if v != *pivot {
                    acc ^= solution[v as usize];
                }
            }
            solution[*pivot as usize] = acc;
        }

        Some(solution)
    }
}

/// Solve a dense GF(2) system one bit-plane of the (vector) constant at a
/// time, reusing [`PlainGaussianSolver`] per plane. `col_of` maps a raw
/// variable id to its dense column index.
fn solve_dense_by_plane(
    rows: impl Iterator<Item = (Vec<u32>, u64)> + Clone,
    num_cols: usize,
    width: u8,
    col_of: impl Fn(u32) -> usize,
) -> Option<Vec<u64>> {
    if num_cols == 0 {
        return Some(Vec::new());
    }
    let rows: Vec<(Vec<u32>, u64)> = rows.collect();
    let mut result = vec![0u64; num_cols];
    for bit in 0..width.max(1) {
        let plane: Vec<DenseRow<Gf2>> = rows
            .iter()
            .map(|(vars, constant)| {
                let mut coeffs = vec![Gf2(false); num_cols];
                for &v in vars {
                    coeffs[col_of(v)] = Gf2(true);
                }
                DenseRow { coeffs, constant: Gf2((constant >> bit) & 1 == 1) }
            })
            .collect();
        let sol = PlainGaussianSolver::solve(plane, num_cols)?;
        for (i, v) in sol.into_iter().enumerate() {
            if v.0 {
                result[i] |= 1u64 << bit;
            }
        }
    }
    Some(result)
}

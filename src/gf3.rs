//! C4 — GF3System: sparse modulo-3 linear-equation solver used on the
//! unpeeled "2-core" (spec §4.4), specifically by [`crate::mphf`]'s hinge
//! assignment: for each core edge `label[v0] + label[v1] + label[v2] ≡
//! target (mod 3)`, where `target` is the edge's pivot position (which of
//! its vertices is the designated hinge). See DESIGN.md "Gf2/Gf3 role
//! split" for why GF(3) is reserved for the MPHF path and GF(2) for the
//! general static function.
//!
//! Mirrors [`crate::gf2`]'s five-step lazy structure (spec §4.4.b) over
//! [`crate::bits::PackedTritRow`] instead of `FixedBitRow`; per spec §9's
//! design note these stay two concrete modules rather than one generic.

use std::collections::HashMap;

use crate::bits::PackedTritRow;
use crate::solver::{DenseRow, Gf3, PlainGaussianSolver, Ring};

/// One GF(3) equation: a weighted sum of variables (coefficients in
/// `{0,1,2}`) equal to a constant trit (spec §3's "Equation (GF(3))").
#[derive(Clone, Debug)]
pub struct Gf3Equation {
    pub coeffs: PackedTritRow,
    pub constant: u8,
}

impl Gf3Equation {
    pub fn new(num_vars: u32, vars: &[u32], constant: u8) -> Self {
        Self { coeffs: PackedTritRow::from_vars(num_vars, vars), constant: constant % 3 }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coeffs.is_zero()
    }

    #[inline]
    pub fn is_unsolvable(&self) -> bool {
        self.is_empty() && self.constant != 0
    }
}

/// A sparse GF(3) linear system over `num_vars` variables.
#[derive(Clone, Debug)]
pub struct Gf3System {
    num_vars: u32,
    equations: Vec<Gf3Equation>,
}

impl Gf3System {
    pub fn new(num_vars: u32) -> Self {
        Self { num_vars, equations: Vec::new() }
    }

    /// Adds `sum(vars) == constant (mod 3)`, coefficient `1` per
    /// occurrence (repeated variables accumulate mod 3, per
    /// `PackedTritRow::from_vars`).
    pub fn push(&mut self, vars: &[u32], constant: u8) {
        self.equations.push(Gf3Equation::new(self.num_vars, vars, constant));
    }

    pub fn num_vars(&self) -> u32 {
        self.num_vars
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    /// `check(sol)`: for every equation, the weighted mod-3 sum over `sol`
    /// equals the stored constant (spec §4.4.b "Properties preserved").
    pub fn check(&self, sol: &[u8]) -> bool {
        self.equations.iter().all(|eq| {
            let sum = eq
                .coeffs
                .iter_nonzero()
                .fold(0u32, |acc, (v, c)| acc + c as u32 * sol[v as usize] as u32);
            (sum % 3) as u8 == eq.constant
        })
    }

    /// Plain (textbook) Gaussian elimination (spec §4.4.a).
    pub fn solve_plain(&self) -> Option<Vec<u8>> {
        let nv = self.num_vars as usize;
        let rows: Vec<DenseRow<Gf3>> = self
            .equations
            .iter()
            .map(|eq| {
                let mut coeffs = vec![Gf3(0); nv];
                for (v, c) in eq.coeffs.iter_nonzero() {
                    coeffs[v as usize] = Gf3(c);
                }
                DenseRow { coeffs, constant: Gf3(eq.constant) }
            })
            .collect();
        PlainGaussianSolver::solve(rows, nv).map(|sol| sol.into_iter().map(|g| g.0).collect())
    }

    /// Lazy / structured Gaussian elimination (spec §4.4.b): same shape as
    /// [`crate::gf2::Gf2System::solve_lazy`] but using mod-3 scaling
    /// (`PackedTritRow::scaled_by`/`sub_assign`, the SWAR `addMod3`/
    /// `subMod3` ops from spec §4.4.b) instead of XOR.
    pub fn solve_lazy(&self) -> Option<Vec<u8>> {
        let n = self.num_vars as usize;
        if n == 0 {
            return Some(Vec::new());
        }

        let mut rows: Vec<Option<(PackedTritRow, u8)>> =
            self.equations.iter().map(|e| Some((e.coeffs.clone(), e.constant))).collect();
        let mut light = vec![true; n];
        let mut var_eqs: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (eid, slot) in rows.iter().enumerate() {
            for (v, _) in slot.as_ref().unwrap().0.iter_nonzero() {
                var_eqs[v as usize].push(eid);
            }
        }
        let light_count = |row: &PackedTritRow, light: &[bool]| -> u32 {
            row.iter_nonzero().filter(|&(v, _)| light[v as usize]).count() as u32
        };
        let mut remaining_light: Vec<u32> =
            rows.iter().map(|s| light_count(&s.as_ref().unwrap().0, &light)).collect();

        let mut solved: Vec<(u32, PackedTritRow, u8)> = Vec::new();
        let mut dense_raw: Vec<(Vec<(u32, u8)>, u8)> = Vec::new();
        let mut heavy_vars: Vec<u32> = Vec::new();

        loop {
            let candidate = (0..rows.len()).find(|&e| rows[e].is_some() && remaining_light[e] <= 1);

            let Some(e) = candidate else {
                let mut best: Option<(usize, u32)> = None;
                for v in 0..n {
                    if !light[v] {
                        continue;
                    }
                    let live = var_eqs[v]
                        .iter()
                        .filter(|&&e| rows[e].as_ref().is_some_and(|(r, _)| r.get(v as u32) != 0))
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
                                if row.get(v as u32) != 0 {
                                    remaining_light[eid] = light_count(row, &light);
                                }
                            }
                        }
                    }
                    None => break,
                }
                continue;
            };

            let (row, constant) = rows[e].take().unwrap();
            if remaining_light[e] == 0 {
                if row.is_zero() {
                    if constant != 0 {
                        return None;
                    }
                } else {
                    dense_raw.push((row.iter_nonzero().collect(), constant));
                }
                continue;
            }

            let (pivot, pivot_coeff) = row
                .iter_nonzero()
                .find(|&(v, _)| light[v as usize])
                .expect("priority-1 equation must have one light variable");
            let inv = Gf3(pivot_coeff).inv().0;

            for &other in var_eqs[pivot as usize].clone().iter() {
                if other == e {
                    continue;
                }
                if let Some((orow, oconst)) = rows[other].as_mut() {
                    let ocoeff = orow.get(pivot);
                    if ocoeff != 0 {
                        let factor = (ocoeff as u32 * inv as u32 % 3) as u8;
                        let scaled = row.scaled_by(factor);
                        orow.sub_assign(&scaled);
                        *oconst = ((*oconst as i16 - (factor as i16 * constant as i16)).rem_euclid(3)) as u8;
                        for (v, _) in orow.iter_nonzero() {
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

        let col_of: HashMap<u32, usize> =
            heavy_vars.iter().enumerate().map(|(i, &v)| (v, i)).collect();
        let heavy_rows: Vec<DenseRow<Gf3>> = dense_raw
            .iter()
            .map(|(vars, constant)| {
                let mut coeffs = vec![Gf3(0); heavy_vars.len()];
                for &(v, c) in vars {
                    coeffs[col_of[&v]] = Gf3(c);
                }
                DenseRow { coeffs, constant: Gf3(*constant) }
            })
            .collect();
        let heavy_solution: Vec<u8> = if heavy_vars.is_empty() {
            Vec::new()
        } else {
            PlainGaussianSolver::solve(heavy_rows, heavy_vars.len())?
                .into_iter()
                .map(|g| g.0)
                .collect()
        };

        let mut solution = vec![0u8; n];
        for (slot, &v) in heavy_vars.iter().enumerate() {
            solution[v as usize] = heavy_solution[slot];
        }

        for (pivot, row, constant) in solved.iter().rev() {
            let mut acc = *constant as i16;
            for (v, c) in row.iter_nonzero() {
                if v != *pivot {
                    acc -= c as i16 * solution[v as usize] as i16;
                }
            }
            let pivot_coeff = row.get(*pivot);
            let inv = Gf3(pivot_coeff).inv().0 as i16;
            solution[*pivot as usize] = (acc.rem_euclid(3) * inv).rem_euclid(3) as u8;
        }

        Some(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazy_solves_tiny_mod3_system() {
        // x0 + x1 = 2 ; x1 + x2 = 1 ; x0 = 1 (mod 3)
        let mut sys = Gf3System::new(3);
        sys.push(&[0, 1], 2);
        sys.push(&[1, 2], 1);
        sys.push(&[0], 1);
        let sol = sys.solve_lazy().unwrap();
        assert!(sys.check(&sol));
        assert_eq!(sol[0], 1);
    }

    #[test]
    fn lazy_matches_plain_on_small_system() {
        let mut sys = Gf3System::new(5);
        sys.push(&[0, 1, 2], 1);
        sys.push(&[1, 3], 2);
        sys.push(&[2, 3, 4], 0);
        let lazy = sys.solve_lazy().unwrap();
        assert!(sys.check(&lazy));
        let plain = sys.solve_plain().unwrap();
        assert!(sys.check(&plain));
    }

    #[test]
    fn detects_unsolvable_system() {
        let mut sys = Gf3System::new(2);
        sys.push(&[0, 1], 1);
        sys.push(&[0, 1], 2);
        assert!(sys.solve_lazy().is_none());
        assert!(sys.solve_plain().is_none());
    }

    #[test]
    fn shared_variable_forces_heavy_escalation() {
        let mut sys = Gf3System::new(5);
        for i in 1..5u32 {
            sys.push(&[0, i], (i % 3) as u8);
        }
        let sol = sys.solve_lazy().unwrap();
        assert!(sys.check(&sol));
    }
}

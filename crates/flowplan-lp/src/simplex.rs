//! Two-phase primal simplex on a dense tableau.
//!
//! The user-facing problem (bounded variables, range constraints) is
//! rewritten into computational standard form: shifted/mirrored/split
//! non-negative columns, explicit upper-bound rows, slack and surplus
//! columns, and artificial columns for the phase-1 basis. Bland's rule
//! (under a seed-permuted column order) guarantees termination; duals are
//! recovered from the initial-identity columns of the final tableau.

use crate::problem::{BasisStatus, Direction, Problem, Solution, SolveStatus};

const TOL: f64 = 1e-9;
const FEAS_TOL: f64 = 1e-7;

#[derive(Debug, Clone, Copy)]
enum VarMap {
    Fixed(f64),
    Shift { col: usize, lb: f64 },
    Mirror { col: usize, ub: f64 },
    Split { pos: usize, neg: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rel {
    Le,
    Ge,
    Eq,
}

#[derive(Debug, Clone)]
struct StdRow {
    coefs: Vec<(usize, f64)>,
    rel: Rel,
    rhs: f64,
    /// Originating user constraint and the sign picked up by rhs
    /// normalization; `None` for variable upper-bound rows.
    user: Option<(usize, f64)>,
}

enum CoreOutcome {
    Optimal,
    Unbounded,
    IterLimit,
}

pub(crate) fn solve(problem: &Problem, seed: Option<u64>) -> Solution {
    let n_user_vars = problem.vars.len();
    let n_user_ctrs = problem.ctrs.len();
    let fail = |status| Solution::failed(status, n_user_vars, n_user_ctrs);

    // Degenerate bound checks up front.
    for v in &problem.vars {
        if v.lb > v.ub {
            return fail(SolveStatus::Infeasible);
        }
    }
    for c in &problem.ctrs {
        if c.lo > c.hi {
            return fail(SolveStatus::Infeasible);
        }
    }

    let sense = match problem.direction {
        Direction::Minimize => 1.0,
        Direction::Maximize => -1.0,
    };

    // ---- Variable transformation ------------------------------------------
    let mut maps = Vec::with_capacity(n_user_vars);
    let mut n_cols = 0usize;
    let mut rows: Vec<StdRow> = Vec::new();

    for v in &problem.vars {
        if v.lb.is_finite() && v.ub.is_finite() && v.lb == v.ub {
            maps.push(VarMap::Fixed(v.lb));
        } else if v.lb.is_finite() {
            let col = n_cols;
            n_cols += 1;
            maps.push(VarMap::Shift { col, lb: v.lb });
            if v.ub.is_finite() {
                rows.push(StdRow {
                    coefs: vec![(col, 1.0)],
                    rel: Rel::Le,
                    rhs: v.ub - v.lb,
                    user: None,
                });
            }
        } else if v.ub.is_finite() {
            let col = n_cols;
            n_cols += 1;
            maps.push(VarMap::Mirror { col, ub: v.ub });
        } else {
            let pos = n_cols;
            let neg = n_cols + 1;
            n_cols += 2;
            maps.push(VarMap::Split { pos, neg });
        }
    }
    let n_struct = n_cols;

    // ---- Constraint transformation ----------------------------------------
    for (ci, ctr) in problem.ctrs.iter().enumerate() {
        let mut shift = 0.0;
        let mut coefs: Vec<(usize, f64)> = Vec::new();
        for (&vi, &a) in &ctr.coefs {
            if a == 0.0 {
                continue;
            }
            match maps[vi] {
                VarMap::Fixed(v) => shift += a * v,
                VarMap::Shift { col, lb } => {
                    shift += a * lb;
                    coefs.push((col, a));
                }
                VarMap::Mirror { col, ub } => {
                    shift += a * ub;
                    coefs.push((col, -a));
                }
                VarMap::Split { pos, neg } => {
                    coefs.push((pos, a));
                    coefs.push((neg, -a));
                }
            }
        }
        let lo = ctr.lo;
        let hi = ctr.hi;
        if lo.is_finite() && hi.is_finite() && lo == hi {
            rows.push(StdRow {
                coefs,
                rel: Rel::Eq,
                rhs: lo - shift,
                user: Some((ci, 1.0)),
            });
        } else {
            if lo.is_finite() {
                rows.push(StdRow {
                    coefs: coefs.clone(),
                    rel: Rel::Ge,
                    rhs: lo - shift,
                    user: Some((ci, 1.0)),
                });
            }
            if hi.is_finite() {
                rows.push(StdRow {
                    coefs,
                    rel: Rel::Le,
                    rhs: hi - shift,
                    user: Some((ci, 1.0)),
                });
            }
        }
    }

    // Normalize rhs >= 0.
    for row in &mut rows {
        if row.rhs < 0.0 {
            row.rhs = -row.rhs;
            for c in &mut row.coefs {
                c.1 = -c.1;
            }
            row.rel = match row.rel {
                Rel::Le => Rel::Ge,
                Rel::Ge => Rel::Le,
                Rel::Eq => Rel::Eq,
            };
            if let Some((_, flip)) = &mut row.user {
                *flip = -*flip;
            }
        }
    }

    // ---- Slack / surplus / artificial columns -----------------------------
    let m = rows.len();
    let mut identity_col = vec![0usize; m];
    let mut basis = vec![0usize; m];
    let mut n_total = n_struct;
    // (row, col, coef) triples appended after structural coefficients.
    let mut extra: Vec<(usize, usize, f64)> = Vec::new();
    let mut artificial_start = usize::MAX;

    for (r, row) in rows.iter().enumerate() {
        if row.rel == Rel::Le {
            let slack = n_total;
            n_total += 1;
            extra.push((r, slack, 1.0));
            identity_col[r] = slack;
            basis[r] = slack;
        } else if row.rel == Rel::Ge {
            let surplus = n_total;
            n_total += 1;
            extra.push((r, surplus, -1.0));
        }
    }
    for (r, row) in rows.iter().enumerate() {
        if row.rel != Rel::Le {
            if artificial_start == usize::MAX {
                artificial_start = n_total;
            }
            let art = n_total;
            n_total += 1;
            extra.push((r, art, 1.0));
            identity_col[r] = art;
            basis[r] = art;
        }
    }
    if artificial_start == usize::MAX {
        artificial_start = n_total;
    }
    let is_artificial = |col: usize| col >= artificial_start;

    // ---- Dense tableau ----------------------------------------------------
    let mut tab = vec![vec![0.0f64; n_total]; m];
    let mut b = vec![0.0f64; m];
    for (r, row) in rows.iter().enumerate() {
        for &(col, a) in &row.coefs {
            tab[r][col] += a;
        }
        b[r] = row.rhs;
    }
    for &(r, col, a) in &extra {
        tab[r][col] = a;
    }

    // ---- Column scan order (seeded) ---------------------------------------
    let mut order: Vec<usize> = (0..n_total).collect();
    if let Some(seed) = seed {
        shuffle(&mut order, seed);
    }
    let mut order_pos = vec![0usize; n_total];
    for (pos, &col) in order.iter().enumerate() {
        order_pos[col] = pos;
    }

    let mut in_basis = vec![false; n_total];
    for &col in &basis {
        in_basis[col] = true;
    }

    let max_iter = 1000 + 50 * (m + n_total);

    // ---- Phase 1 ----------------------------------------------------------
    if basis.iter().any(|&col| is_artificial(col)) {
        let costs: Vec<f64> = (0..n_total)
            .map(|j| if is_artificial(j) { 1.0 } else { 0.0 })
            .collect();
        let barred: Vec<bool> = (0..n_total).map(is_artificial).collect();
        match run_simplex(
            &mut tab, &mut b, &mut basis, &mut in_basis, &costs, &barred, &order, &order_pos,
            max_iter,
        ) {
            CoreOutcome::Optimal => {}
            CoreOutcome::Unbounded => return fail(SolveStatus::Abnormal),
            CoreOutcome::IterLimit => return fail(SolveStatus::Abnormal),
        }
        let infeasibility: f64 = basis
            .iter()
            .zip(b.iter())
            .filter(|(&col, _)| is_artificial(col))
            .map(|(_, &v)| v)
            .sum();
        if infeasibility > FEAS_TOL {
            return fail(SolveStatus::Infeasible);
        }
        // Pivot out artificials stuck basic at zero where a real column
        // exists; rows that stay are redundant and never move again. The
        // largest-magnitude pivot keeps the near-zero rhs from blowing up.
        for r in 0..m {
            if !is_artificial(basis[r]) {
                continue;
            }
            if b[r].abs() <= FEAS_TOL {
                b[r] = 0.0;
            }
            let pivot_col = (0..artificial_start)
                .filter(|&j| !in_basis[j] && tab[r][j].abs() > TOL)
                .max_by(|&a, &j| tab[r][a].abs().total_cmp(&tab[r][j].abs()));
            if let Some(j) = pivot_col {
                pivot(&mut tab, &mut b, &mut basis, &mut in_basis, r, j);
            }
        }
    }

    // ---- Phase 2 ----------------------------------------------------------
    let mut costs = vec![0.0f64; n_total];
    for (vi, map) in maps.iter().enumerate() {
        let c = sense * problem.vars[vi].obj;
        match *map {
            VarMap::Fixed(_) => {}
            VarMap::Shift { col, .. } => costs[col] += c,
            VarMap::Mirror { col, .. } => costs[col] -= c,
            VarMap::Split { pos, neg } => {
                costs[pos] += c;
                costs[neg] -= c;
            }
        }
    }
    let barred: Vec<bool> = (0..n_total).map(is_artificial).collect();
    let status = match run_simplex(
        &mut tab, &mut b, &mut basis, &mut in_basis, &costs, &barred, &order, &order_pos,
        max_iter,
    ) {
        CoreOutcome::Optimal => SolveStatus::Optimal,
        CoreOutcome::Unbounded => return fail(SolveStatus::Unbounded),
        CoreOutcome::IterLimit => SolveStatus::Feasible,
    };

    // ---- Extraction -------------------------------------------------------
    let mut x_std = vec![0.0f64; n_total];
    for (r, &col) in basis.iter().enumerate() {
        x_std[col] = b[r];
    }

    let mut var_values = vec![0.0f64; n_user_vars];
    for (vi, map) in maps.iter().enumerate() {
        var_values[vi] = match *map {
            VarMap::Fixed(v) => v,
            VarMap::Shift { col, lb } => lb + x_std[col],
            VarMap::Mirror { col, ub } => ub - x_std[col],
            VarMap::Split { pos, neg } => x_std[pos] - x_std[neg],
        };
    }

    let objective: f64 = problem
        .vars
        .iter()
        .zip(var_values.iter())
        .map(|(v, &x)| v.obj * x)
        .sum();

    // Row duals from the identity columns of the final tableau:
    // B^-1 e_r sits under the column that formed row r's initial basis.
    let mut ctr_duals = vec![0.0f64; n_user_ctrs];
    for (r, row) in rows.iter().enumerate() {
        let Some((ci, flip)) = row.user else {
            continue;
        };
        let id_col = identity_col[r];
        let mut y = 0.0;
        for (i, &bcol) in basis.iter().enumerate() {
            let c = costs[bcol];
            if c != 0.0 {
                y += c * tab[i][id_col];
            }
        }
        ctr_duals[ci] += sense * flip * y;
    }

    let mut ctr_activity = vec![0.0f64; n_user_ctrs];
    let mut ctr_basis = vec![BasisStatus::Free; n_user_ctrs];
    for (ci, ctr) in problem.ctrs.iter().enumerate() {
        let activity: f64 = ctr
            .coefs
            .iter()
            .map(|(&vi, &a)| a * var_values[vi])
            .sum();
        ctr_activity[ci] = activity;
        ctr_basis[ci] = if !ctr.lo.is_finite() && !ctr.hi.is_finite() {
            BasisStatus::Free
        } else if ctr.lo.is_finite() && ctr.hi.is_finite() && ctr.lo == ctr.hi {
            BasisStatus::Fixed
        } else if ctr.lo.is_finite() && activity <= ctr.lo + FEAS_TOL {
            BasisStatus::AtLowerBound
        } else if ctr.hi.is_finite() && activity >= ctr.hi - FEAS_TOL {
            BasisStatus::AtUpperBound
        } else {
            BasisStatus::Basic
        };
    }

    Solution {
        status,
        objective,
        var_values,
        ctr_duals,
        ctr_activity,
        ctr_basis,
    }
}

// ---------------------------------------------------------------------------
// Core iteration
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn run_simplex(
    tab: &mut [Vec<f64>],
    b: &mut [f64],
    basis: &mut [usize],
    in_basis: &mut [bool],
    costs: &[f64],
    barred: &[bool],
    order: &[usize],
    order_pos: &[usize],
    max_iter: usize,
) -> CoreOutcome {
    let m = tab.len();
    for _ in 0..max_iter {
        // Entering column: Bland's rule under the (possibly permuted)
        // scan order — first column with negative reduced cost.
        let mut entering = None;
        for &j in order {
            if barred[j] || in_basis[j] {
                continue;
            }
            let mut reduced = costs[j];
            for i in 0..m {
                let c = costs[basis[i]];
                if c != 0.0 {
                    reduced -= c * tab[i][j];
                }
            }
            if reduced < -TOL {
                entering = Some(j);
                break;
            }
        }
        let Some(col) = entering else {
            return CoreOutcome::Optimal;
        };

        // Leaving row: minimum ratio, ties broken by the basic column's
        // scan-order position (Bland).
        let mut leaving: Option<usize> = None;
        let mut best = f64::INFINITY;
        for i in 0..m {
            if tab[i][col] > TOL {
                let ratio = b[i] / tab[i][col];
                let replace = match leaving {
                    None => true,
                    Some(cur) => {
                        ratio < best - TOL
                            || (ratio < best + TOL
                                && order_pos[basis[i]] < order_pos[basis[cur]])
                    }
                };
                if replace {
                    leaving = Some(i);
                    best = ratio;
                }
            }
        }
        let Some(row) = leaving else {
            return CoreOutcome::Unbounded;
        };

        pivot(tab, b, basis, in_basis, row, col);
    }
    CoreOutcome::IterLimit
}

fn pivot(
    tab: &mut [Vec<f64>],
    b: &mut [f64],
    basis: &mut [usize],
    in_basis: &mut [bool],
    row: usize,
    col: usize,
) {
    let piv = tab[row][col];
    let inv = 1.0 / piv;
    for v in tab[row].iter_mut() {
        *v *= inv;
    }
    b[row] *= inv;
    let pivot_row = tab[row].clone();
    let pivot_rhs = b[row];
    for i in 0..tab.len() {
        if i == row {
            continue;
        }
        let factor = tab[i][col];
        if factor == 0.0 {
            continue;
        }
        for (v, pv) in tab[i].iter_mut().zip(pivot_row.iter()) {
            *v -= factor * pv;
        }
        tab[i][col] = 0.0;
        b[i] -= factor * pivot_rhs;
        if b[i] < 0.0 && b[i] > -FEAS_TOL {
            b[i] = 0.0;
        }
    }
    in_basis[basis[row]] = false;
    in_basis[col] = true;
    basis[row] = col;
}

// ---------------------------------------------------------------------------
// Seeded shuffle (SplitMix64)
// ---------------------------------------------------------------------------

fn shuffle(order: &mut [usize], seed: u64) {
    let mut state = seed;
    let mut next = || {
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    };
    for i in (1..order.len()).rev() {
        let j = (next() % (i as u64 + 1)) as usize;
        order.swap(i, j);
    }
}

// ===========================================================================
// Tests
// ===========================================================================

//! Dense column-major routines in the LAPACK calling style
//!
//! Matrices are `&[T]` in column-major order with the leading dimension equal to
//! the row count. Factorizations report failures through a LAPACK `info` code:
//! `info > 0` names the 1-based column whose pivot (or R diagonal) is zero.

use crate::dispatch::FloatElement;

#[inline]
fn at(ld: usize, i: usize, j: usize) -> usize {
    i + j * ld
}

/// `c (m x n) = a (m x k) * b (k x n)`, one output column at a time.
pub fn gemm_column<T: FloatElement>(m: usize, k: usize, a: &[T], b_col: &[T], c_col: &mut [T]) {
    c_col.iter_mut().for_each(|c| *c = T::zero());
    for p in 0..k {
        let scale = b_col[p];
        if scale == T::zero() {
            continue;
        }
        let a_col = &a[p * m..(p + 1) * m];
        for (c, &av) in c_col.iter_mut().zip(a_col) {
            *c = c.add(av.mul(scale));
        }
    }
}

/// In-place LU factorization with partial pivoting of an `n x n` matrix.
///
/// Returns 1-based pivots (`row i` was swapped with `ipiv[i]`) and `info`.
pub fn getrf<T: FloatElement>(n: usize, a: &mut [T]) -> (Vec<i32>, i64) {
    let mut ipiv = vec![0i32; n];
    let mut info = 0i64;
    for k in 0..n {
        let mut p = k;
        let mut best = a[at(n, k, k)].abs();
        for i in k + 1..n {
            let v = a[at(n, i, k)].abs();
            if v > best {
                best = v;
                p = i;
            }
        }
        ipiv[k] = p as i32 + 1;
        if a[at(n, p, k)] == T::zero() {
            if info == 0 {
                info = k as i64 + 1;
            }
            continue;
        }
        if p != k {
            for j in 0..n {
                a.swap(at(n, k, j), at(n, p, j));
            }
        }
        let pivot = a[at(n, k, k)];
        for i in k + 1..n {
            let idx = at(n, i, k);
            a[idx] = a[idx].div(pivot);
        }
        for j in k + 1..n {
            let u = a[at(n, k, j)];
            if u == T::zero() {
                continue;
            }
            for i in k + 1..n {
                let l = a[at(n, i, k)];
                let idx = at(n, i, j);
                a[idx] = a[idx].sub(l.mul(u));
            }
        }
    }
    (ipiv, info)
}

/// Solve `A X = B` given the output of [`getrf`]; `b` is `n x nrhs` and is overwritten with X.
pub fn getrs<T: FloatElement>(n: usize, nrhs: usize, lu: &[T], ipiv: &[i32], b: &mut [T]) {
    for col in 0..nrhs {
        let x = &mut b[col * n..(col + 1) * n];
        for (i, &p) in ipiv.iter().enumerate() {
            let p = p as usize - 1;
            if p != i {
                x.swap(i, p);
            }
        }
        for j in 0..n {
            let xj = x[j];
            for i in j + 1..n {
                x[i] = x[i].sub(lu[at(n, i, j)].mul(xj));
            }
        }
        for j in (0..n).rev() {
            x[j] = x[j].div(lu[at(n, j, j)]);
            let xj = x[j];
            for i in 0..j {
                x[i] = x[i].sub(lu[at(n, i, j)].mul(xj));
            }
        }
    }
}

/// Inverse from the output of [`getrf`].
pub fn getri<T: FloatElement>(n: usize, lu: &[T], ipiv: &[i32]) -> Vec<T> {
    let mut inv = vec![T::zero(); n * n];
    for i in 0..n {
        inv[at(n, i, i)] = T::one();
    }
    getrs(n, n, lu, ipiv, &mut inv);
    inv
}

/// Least-squares solution of `A X = B` for `m x n` `a` with `m >= n` via Householder QR.
///
/// `b` is `m x nrhs`; on success its leading `n` rows of each column hold X.
pub fn gels<T: FloatElement>(m: usize, n: usize, nrhs: usize, a: &mut [T], b: &mut [T]) -> i64 {
    let two = T::one().add(T::one());
    for k in 0..n {
        let mut norm = T::zero();
        for i in k..m {
            let v = a[at(m, i, k)];
            norm = norm.add(v.mul(v));
        }
        let norm = norm.sqrt();
        if norm == T::zero() {
            return k as i64 + 1;
        }
        let akk = a[at(m, k, k)];
        let alpha = if akk > T::zero() { norm.neg() } else { norm };

        // Householder vector v = x - alpha * e1 over rows k..m.
        let mut v = vec![T::zero(); m - k];
        v[0] = akk.sub(alpha);
        for i in k + 1..m {
            v[i - k] = a[at(m, i, k)];
        }
        let vtv = v.iter().fold(T::zero(), |acc, &x| acc.add(x.mul(x)));
        if vtv == T::zero() {
            continue;
        }

        let reflect = |data: &mut [T], ld: usize, col: usize| {
            let mut dot = T::zero();
            for i in k..m {
                dot = dot.add(v[i - k].mul(data[at(ld, i, col)]));
            }
            let scale = two.mul(dot).div(vtv);
            for i in k..m {
                let idx = at(ld, i, col);
                data[idx] = data[idx].sub(scale.mul(v[i - k]));
            }
        };
        for j in k..n {
            reflect(a, m, j);
        }
        for j in 0..nrhs {
            reflect(b, m, j);
        }
    }

    for j in 0..n {
        if a[at(m, j, j)] == T::zero() {
            return j as i64 + 1;
        }
    }
    for col in 0..nrhs {
        let x = &mut b[col * m..(col + 1) * m];
        for j in (0..n).rev() {
            x[j] = x[j].div(a[at(m, j, j)]);
            let xj = x[j];
            for i in 0..j {
                x[i] = x[i].sub(a[at(m, i, j)].mul(xj));
            }
        }
    }
    0
}

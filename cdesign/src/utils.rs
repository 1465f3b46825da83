use faer::Mat;
use faer_ext::{IntoFaer, IntoNalgebra};
use itertools::Itertools;
use nalgebra::DVector;

/// Convert a faer column matrix into a nalgebra vector.
pub trait IntoDVector {
    /// Returns the first column as dynamic vector.
    fn into_dvector(self) -> DVector<f64>;
}

impl IntoDVector for &Mat<f64> {
    fn into_dvector(self) -> DVector<f64> {
        self.as_ref().into_nalgebra().column(0).into()
    }
}

/// Convert a nalgebra vector into a faer column matrix.
pub trait IntoColMat {
    /// Returns a matrix with a single column.
    fn into_col_mat(self) -> Mat<f64>;
}

impl IntoColMat for &DVector<f64> {
    fn into_col_mat(self) -> Mat<f64> {
        self.view_range(.., ..).into_faer().to_owned()
    }
}

/// All `k`-combinations of `0..n` in lexicographic order.
pub fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    (0..n).combinations(k).collect()
}

/// All `k`-multisets of `0..n` in lexicographic order, generated lazily.
pub fn multisets(n: usize, k: usize) -> impl Iterator<Item = Vec<usize>> {
    (0..n).combinations_with_replacement(k)
}

/// Products of one `sizes[g]`-multiset of `0..n` per group, last group varying fastest.
pub fn grouped_multisets(n: usize, sizes: &[usize]) -> impl Iterator<Item = Vec<Vec<usize>>> {
    sizes
        .iter()
        .map(|s| (0..n).combinations_with_replacement(*s))
        .collect::<Vec<_>>()
        .into_iter()
        .multi_cartesian_product()
}

/// Number of `k`-multisets of `n` elements, saturating at `usize::MAX`.
pub fn n_multisets(n: usize, k: usize) -> usize {
    if n == 0 {
        return usize::from(k == 0);
    }
    let m = n as u128 + k as u128 - 1;
    let r = k.min(n - 1) as u128;
    let mut count: u128 = 1;
    for i in 1..=r {
        count = match count.checked_mul(m - r + i) {
            Some(c) => c / i,
            None => return usize::MAX,
        };
    }
    usize::try_from(count).unwrap_or(usize::MAX)
}

/// Cartesian product of index ranges with the given sizes, last position varying fastest.
pub fn cartesian_product(sizes: &[usize]) -> Vec<Vec<usize>> {
    sizes.iter().map(|s| 0..*s).multi_cartesian_product().collect()
}

/// Number of distinct rows of a row-major point list, compared with tolerance.
pub fn count_unique_rows(rows: &[Vec<f64>], tol: f64) -> usize {
    let mut unique: Vec<&Vec<f64>> = vec![];
    for r in rows {
        let seen = unique
            .iter()
            .any(|u| u.iter().zip(r).all(|(a, b)| (a - b).abs() <= tol));
        if !seen {
            unique.push(r);
        }
    }
    unique.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn test_into_dvector() {
        let mat = mat![[1.], [2.], [3.]];
        let v = mat.into_dvector();
        assert_eq!(v, DVector::from_vec(vec![1., 2., 3.]));
        assert_eq!((&v).into_col_mat(), mat);
    }

    #[test]
    fn test_combinations() {
        assert_eq!(
            combinations(4, 2),
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert_eq!(combinations(3, 0), vec![Vec::<usize>::new()]);
        assert!(combinations(2, 3).is_empty());
    }

    #[test]
    fn test_multisets() {
        let c: Vec<Vec<usize>> = multisets(3, 2).collect();
        assert_eq!(
            c,
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 1],
                vec![1, 2],
                vec![2, 2]
            ]
        );
        // C(3 + 7 - 1, 7)
        assert_eq!(multisets(3, 7).count(), 36);
        assert_eq!(n_multisets(3, 7), 36);
        assert_eq!(n_multisets(3, 2), 6);
        assert_eq!(n_multisets(0, 0), 1);
        assert_eq!(n_multisets(200, 200), usize::MAX);
        assert_eq!(multisets(4, 3).take(2).last(), Some(vec![0, 0, 1]));
    }

    #[test]
    fn test_grouped_multisets() {
        let g: Vec<Vec<Vec<usize>>> = grouped_multisets(2, &[2, 1]).collect();
        assert_eq!(g.len(), n_multisets(2, 2) * n_multisets(2, 1));
        assert_eq!(g[0], vec![vec![0, 0], vec![0]]);
        assert_eq!(g[1], vec![vec![0, 0], vec![1]]);
        assert_eq!(g[2], vec![vec![0, 1], vec![0]]);
        assert_eq!(g[5], vec![vec![1, 1], vec![1]]);
        assert_eq!(grouped_multisets(3, &[]).count(), 1);
        assert_eq!(grouped_multisets(0, &[1]).count(), 0);
    }

    #[test]
    fn test_cartesian_product() {
        let p = cartesian_product(&[2, 3]);
        assert_eq!(p.len(), 6);
        assert_eq!(p[0], vec![0, 0]);
        assert_eq!(p[1], vec![0, 1]);
        assert_eq!(p[5], vec![1, 2]);
        assert!(cartesian_product(&[2, 0]).is_empty());
        assert_eq!(cartesian_product(&[]), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_count_unique_rows() {
        let rows = vec![vec![0., 1.], vec![0., 1. + 1e-12], vec![1., 0.]];
        assert_eq!(count_unique_rows(&rows, 1e-9), 2);
    }
}

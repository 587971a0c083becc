//! Coordinate system algebra: signed permutation matrices between anatomical
//! labels, their closest approximation of arbitrary affines, and exact axis
//! swapping of voxel arrays.

use std::ops::Mul;

use nalgebra::{Matrix3, Matrix4, Vector3};
use ndarray::{Array3, ArrayView3, Axis};

use crate::error::InvalidMatrixError;
use crate::label::AnatomicalLabel;

/// Tolerance on the rotational determinant used by [`validate_transform_matrix`]
/// unless configured otherwise.
pub const DEFAULT_TRANSFORM_TOLERANCE: f64 = 1e-3;

/// Normalized values closer than this are treated as a tie.
const TIE_EPSILON: f64 = 1e-9;

/// A 3×3 permutation-reflection matrix.
///
/// Entries are -1, 0 or 1 with exactly one non-zero entry per row and column.
/// Entry `(i, j)` being non-zero means destination axis `i` is taken from
/// source axis `j`; a -1 means the axis direction is reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignedPermutation(Matrix3<i32>);

impl SignedPermutation {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    /// Validate an integer matrix.
    ///
    /// # Errors
    ///
    /// See [`validate_permutation_matrix`].
    pub fn new(matrix: Matrix3<i32>) -> Result<Self, InvalidMatrixError> {
        validate_permutation_matrix(&matrix.map(f64::from))
    }

    /// Take the upper left 3×3 block of a homogeneous matrix.
    ///
    /// # Errors
    ///
    /// See [`validate_permutation_matrix`].
    pub fn from_homogeneous(matrix: &Matrix4<i32>) -> Result<Self, InvalidMatrixError> {
        Self::new(matrix.fixed_view::<3, 3>(0, 0).into_owned())
    }

    pub fn matrix(&self) -> Matrix3<i32> {
        self.0
    }

    pub fn to_f64(&self) -> Matrix3<f64> {
        self.0.map(f64::from)
    }

    /// The inverse, which for a signed permutation is its transpose.
    pub fn inverse(&self) -> Self {
        Self(self.0.transpose())
    }

    /// Per source axis: -1 if the axis is reflected, 1 otherwise.
    pub fn axis_signs(&self) -> [i32; 3] {
        [0, 1, 2].map(|j| self.0.column(j).sum())
    }

    /// Per destination axis: the source axis it is taken from.
    pub fn axis_order(&self) -> [usize; 3] {
        let order = self.0.map(i32::abs) * Vector3::new(0, 1, 2);
        [0, 1, 2].map(|i| order[i] as usize)
    }
}

impl Mul for SignedPermutation {
    type Output = SignedPermutation;

    fn mul(self, rhs: SignedPermutation) -> SignedPermutation {
        SignedPermutation(self.0 * rhs.0)
    }
}

/// Permutation-reflection matrices mapping `src` axes onto `dst` axes and back.
///
/// Returns `(src2dst, dst2src)`; the second one is the transpose of the first.
pub fn permutation_matrix(
    src: &AnatomicalLabel,
    dst: &AnatomicalLabel,
) -> (SignedPermutation, SignedPermutation) {
    let src_dirs = src.directions();
    let dst_dirs = dst.directions();
    let src_pos = src.positions();
    let dst_pos = dst.positions();

    let mut mat = Matrix3::zeros();
    for i in 0..3 {
        let (row, col) = (dst_pos[i], src_pos[i]);
        mat[(row, col)] = if dst_dirs[row] == src_dirs[col] { 1 } else { -1 };
    }
    let src2dst = SignedPermutation(mat);
    (src2dst, src2dst.inverse())
}

/// The signed permutation closest to `trans`, the rotational (and scaling)
/// part of a voxel-to-world affine.
///
/// Columns are normalized by their norm first. Then the entry of largest
/// absolute value gets its sign, its row and column are excluded, and so on
/// until every axis is assigned. Ties go to the first entry in row-major order.
///
/// # Errors
///
/// Returns [`InvalidMatrixError`] if `trans` is degenerate, e.g. holds a zero
/// column.
pub fn find_closest_permutation(
    trans: &Matrix3<f64>,
) -> Result<SignedPermutation, InvalidMatrixError> {
    let mut normalized = trans.map(f64::abs);
    for (j, mut column) in normalized.column_iter_mut().enumerate() {
        column /= trans.column(j).norm();
    }

    let mut perm = Matrix3::<f64>::zeros();
    let mut free_rows = [true; 3];
    let mut free_cols = [true; 3];
    for _ in 0..3 {
        let mut best: Option<(usize, usize)> = None;
        for (i, j) in free_cells(free_rows, free_cols) {
            if best.is_none_or(|b| normalized[(i, j)] > normalized[b]) {
                best = Some((i, j));
            }
        }
        let Some((i, j)) = best else { break };
        let max = normalized[(i, j)];
        if free_cells(free_rows, free_cols).any(|c| c != (i, j) && (normalized[c] - max).abs() <= TIE_EPSILON) {
            log::warn!("ambiguous axis assignment for {trans:?}, picking ({i}, {j})");
        }
        perm[(i, j)] = sign(trans[(i, j)]);
        free_rows[i] = false;
        free_cols[j] = false;
    }

    validate_permutation_matrix(&perm)
}

/// Cells of a 3×3 matrix in row-major order, restricted to free rows and columns.
fn free_cells(rows: [bool; 3], cols: [bool; 3]) -> impl Iterator<Item = (usize, usize)> {
    (0..3)
        .filter(move |&i| rows[i])
        .flat_map(move |i| (0..3).filter(move |&j| cols[j]).map(move |j| (i, j)))
}

fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Check that `perm` is a permutation-reflection matrix.
///
/// A valid matrix has a determinant of exactly 1 or -1, contains only -1, 0
/// and 1, and holds one non-zero element per row and column.
///
/// # Errors
///
/// Returns [`InvalidMatrixError`] naming the first violated condition.
pub fn validate_permutation_matrix(
    perm: &Matrix3<f64>,
) -> Result<SignedPermutation, InvalidMatrixError> {
    let det = perm.determinant();
    if det.abs() != 1.0 {
        return Err(InvalidMatrixError::Determinant(det));
    }
    for ((row, col), &value) in (0..3)
        .flat_map(|col| (0..3).map(move |row| (row, col)))
        .zip(perm.iter())
    {
        if value != -1.0 && value != 0.0 && value != 1.0 {
            return Err(InvalidMatrixError::EntryOutOfDomain { row, col, value });
        }
    }
    let one_per_line = |line: usize, by_row: bool| {
        (0..3)
            .filter(|&k| {
                let value = if by_row { perm[(line, k)] } else { perm[(k, line)] };
                value != 0.0
            })
            .count()
            == 1
    };
    if !(0..3).all(|i| one_per_line(i, true) && one_per_line(i, false)) {
        return Err(InvalidMatrixError::NotPermutation);
    }
    Ok(SignedPermutation(perm.map(|v| v as i32)))
}

/// Check that `mat` is a voxel-to-world affine.
///
/// The rotational part, with each column divided by its norm to factor out
/// voxel spacing, must have an absolute determinant within `tol` of one. The
/// last row must be `[0, 0, 0, 1]`.
///
/// # Errors
///
/// Returns [`InvalidMatrixError`] naming the first violated condition.
pub fn validate_transform_matrix(mat: &Matrix4<f64>, tol: f64) -> Result<(), InvalidMatrixError> {
    let mut rotation = mat.fixed_view::<3, 3>(0, 0).into_owned();
    for mut column in rotation.column_iter_mut() {
        let norm = column.norm();
        column /= norm;
    }

    let abs_det = rotation.determinant().abs();
    if !((1.0 - tol)..=(1.0 + tol)).contains(&abs_det) {
        return Err(InvalidMatrixError::Rotation(abs_det));
    }
    if (0..3).any(|j| mat[(3, j)] != 0.0) {
        return Err(InvalidMatrixError::BottomRow);
    }
    if mat[(3, 3)] != 1.0 {
        return Err(InvalidMatrixError::BottomRight(mat[(3, 3)]));
    }
    Ok(())
}

/// Voxel spacing of an affine: the norms of its rotational part's columns.
pub fn spacing(mat: &Matrix4<f64>) -> Vector3<f64> {
    let rotation = mat.fixed_view::<3, 3>(0, 0);
    Vector3::from_fn(|j, _| rotation.column(j).norm())
}

/// Reflect and permute the axes of `volume` according to `perm`.
///
/// Source axes whose column in `perm` sums to -1 are reversed first, then the
/// axes are reordered so that destination axis `i` is the source axis selected
/// by row `i`. The result is a newly allocated array in standard layout.
pub fn swap<T: Clone>(volume: ArrayView3<'_, T>, perm: &SignedPermutation) -> Array3<T> {
    let mut view = volume;
    for (axis, sign) in perm.axis_signs().into_iter().enumerate() {
        if sign < 0 {
            view.invert_axis(Axis(axis));
        }
    }
    view.permuted_axes(perm.axis_order())
        .as_standard_layout()
        .into_owned()
}

/// Translation that keeps reflected indices inside the destination array.
///
/// For an array of `shape` mapped through `perm`, every destination axis fed
/// by a reflected source axis is shifted by `size - 1` of that source axis.
pub fn offset(perm: &SignedPermutation, shape: [usize; 3]) -> Vector3<i32> {
    let last = Vector3::from(shape.map(|s| s as i32 - 1));
    -(perm.matrix() * last).map(|v| v.min(0))
}

/// The 4×4 homogeneous form of `perm`, without translation.
pub fn homogeneous_form(perm: &SignedPermutation) -> Matrix4<i32> {
    perm.matrix().to_homogeneous()
}

/// Exact integer affine mapping indices of an array of `shape` to the indices
/// of `swap(array, perm)`.
pub fn index_affine(perm: &SignedPermutation, shape: [usize; 3]) -> Matrix4<i32> {
    let mut affine = homogeneous_form(perm);
    affine
        .fixed_view_mut::<3, 1>(0, 3)
        .copy_from(&offset(perm, shape));
    affine
}

/// Exact inverse of an index affine built by [`index_affine`].
///
/// # Errors
///
/// Returns [`InvalidMatrixError`] if the rotational part is not a signed
/// permutation or the last row is not `[0, 0, 0, 1]`.
pub fn invert_index_affine(affine: &Matrix4<i32>) -> Result<Matrix4<i32>, InvalidMatrixError> {
    if (0..3).any(|j| affine[(3, j)] != 0) {
        return Err(InvalidMatrixError::BottomRow);
    }
    if affine[(3, 3)] != 1 {
        return Err(InvalidMatrixError::BottomRight(f64::from(affine[(3, 3)])));
    }
    let inverse = SignedPermutation::from_homogeneous(affine)?.inverse();
    let translation: Vector3<i32> = affine.fixed_view::<3, 1>(0, 3).into_owned();

    let mut result = homogeneous_form(&inverse);
    result
        .fixed_view_mut::<3, 1>(0, 3)
        .copy_from(&(-(inverse.matrix() * translation)));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array;

    fn label(s: &str) -> AnatomicalLabel {
        s.parse().unwrap()
    }

    #[test]
    fn test_permutation_matrix_lps_to_ras() {
        let (src2dst, dst2src) = permutation_matrix(&label("LPS"), &label("RAS"));
        assert_eq!(
            src2dst.matrix(),
            Matrix3::new(-1, 0, 0, 0, -1, 0, 0, 0, 1)
        );
        assert_eq!(dst2src, src2dst);
    }

    #[test]
    fn test_permutation_matrix_reorders_axes() {
        // R/L moves from position 0 to 2, S/I from 2 to 1 (reversed), A/P from 1 to 0.
        let (src2dst, dst2src) = permutation_matrix(&label("RAS"), &label("AIR"));
        assert_eq!(
            src2dst.matrix(),
            Matrix3::new(0, 1, 0, 0, 0, -1, 1, 0, 0)
        );
        assert_eq!(dst2src.matrix(), src2dst.matrix().transpose());
    }

    #[test]
    fn test_find_closest_permutation_of_scaled_permutation() {
        let trans = Matrix3::new(0.0, 0.0, -3.0, 0.7, 0.0, 0.0, 0.0, 2.5, 0.0);
        let perm = find_closest_permutation(&trans).unwrap();
        assert_eq!(perm.matrix(), Matrix3::new(0, 0, -1, 1, 0, 0, 0, 1, 0));
    }

    #[test]
    fn test_find_closest_permutation_of_oblique_rotation() {
        let angle = 20f64.to_radians();
        let (s, c) = angle.sin_cos();
        let trans = Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0) * 0.8;
        let perm = find_closest_permutation(&trans).unwrap();
        assert_eq!(perm, SignedPermutation::identity());
    }

    #[test]
    fn test_find_closest_permutation_breaks_ties_in_row_major_order() {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        // 45 degree rotation about the third axis; all four in-plane entries tie.
        let trans = Matrix3::new(h, -h, 0.0, h, h, 0.0, 0.0, 0.0, 1.0);
        let perm = find_closest_permutation(&trans).unwrap();
        assert_eq!(perm.matrix(), Matrix3::new(1, 0, 0, 0, 1, 0, 0, 0, 1));

        let trans = Matrix3::new(-h, h, 0.0, h, h, 0.0, 0.0, 0.0, 1.0);
        let perm = find_closest_permutation(&trans).unwrap();
        assert_eq!(perm.matrix(), Matrix3::new(-1, 0, 0, 0, 1, 0, 0, 0, 1));
    }

    #[test]
    fn test_find_closest_permutation_rejects_degenerate_input() {
        let trans = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0);
        assert!(find_closest_permutation(&trans).is_err());
    }

    #[test]
    fn test_validate_permutation_matrix() {
        let ok = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        assert!(validate_permutation_matrix(&ok).is_ok());

        let singular = Matrix3::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        assert!(matches!(
            validate_permutation_matrix(&singular),
            Err(InvalidMatrixError::Determinant(d)) if d == 0.0
        ));

        let scaled = Matrix3::new(2.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(matches!(
            validate_permutation_matrix(&scaled),
            Err(InvalidMatrixError::Determinant(d)) if d == 2.0
        ));

        let fractional = Matrix3::new(2.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 1.0);
        assert!(matches!(
            validate_permutation_matrix(&fractional),
            Err(InvalidMatrixError::EntryOutOfDomain { row: 0, col: 0, .. })
        ));

        let shear = Matrix3::new(1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert_eq!(
            validate_permutation_matrix(&shear),
            Err(InvalidMatrixError::NotPermutation)
        );
    }

    #[test]
    fn test_validate_transform_matrix() {
        let mut mat = Matrix4::new_nonuniform_scaling(&Vector3::new(0.5, 0.5, 3.0));
        mat[(0, 3)] = -120.0;
        assert!(validate_transform_matrix(&mat, DEFAULT_TRANSFORM_TOLERANCE).is_ok());

        let mut bottom = Matrix4::identity();
        bottom[(3, 2)] = 1.0;
        assert_eq!(
            validate_transform_matrix(&bottom, DEFAULT_TRANSFORM_TOLERANCE),
            Err(InvalidMatrixError::BottomRow)
        );

        let mut corner = Matrix4::identity();
        corner[(3, 3)] = 2.0;
        assert_eq!(
            validate_transform_matrix(&corner, DEFAULT_TRANSFORM_TOLERANCE),
            Err(InvalidMatrixError::BottomRight(2.0))
        );

        let mut singular = Matrix4::identity();
        singular[(0, 1)] = 1.0;
        singular[(1, 1)] = 0.0;
        assert!(matches!(
            validate_transform_matrix(&singular, DEFAULT_TRANSFORM_TOLERANCE),
            Err(InvalidMatrixError::Rotation(_))
        ));
    }

    #[test]
    fn test_spacing() {
        let mut mat = Matrix4::identity();
        mat[(0, 0)] = 0.0;
        mat[(1, 0)] = -0.8;
        mat[(0, 1)] = 0.6;
        mat[(1, 1)] = 0.0;
        mat[(2, 2)] = 2.5;
        let spacing = spacing(&mat);
        assert_relative_eq!(spacing.x, 0.8, epsilon = 1e-12);
        assert_relative_eq!(spacing.y, 0.6, epsilon = 1e-12);
        assert_relative_eq!(spacing.z, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_swap_reflects_and_permutes() {
        let volume = Array::from_iter(0..24).into_shape_with_order((2, 3, 4)).unwrap();
        // Destination axis 0 <- reversed source axis 2, 1 <- source axis 0, 2 <- source axis 1.
        let perm = SignedPermutation::new(Matrix3::new(0, 0, -1, 1, 0, 0, 0, 1, 0)).unwrap();
        let swapped = swap(volume.view(), &perm);
        assert_eq!(swapped.dim(), (4, 2, 3));
        for ((i, j, k), value) in volume.indexed_iter() {
            assert_eq!(swapped[[3 - k, i, j]], *value);
        }
        assert!(swapped.is_standard_layout());
    }

    #[test]
    fn test_offset_and_index_affine() {
        let perm = SignedPermutation::new(Matrix3::new(0, 0, -1, 1, 0, 0, 0, 1, 0)).unwrap();
        let shape = [2, 3, 4];
        assert_eq!(offset(&perm, shape), Vector3::new(3, 0, 0));

        let affine = index_affine(&perm, shape);
        let inverse = invert_index_affine(&affine).unwrap();
        assert_eq!(affine * inverse, Matrix4::identity());

        // Source index (1, 2, 0) lands on (3, 1, 2) in the swapped array.
        let index = affine * nalgebra::Vector4::new(1, 2, 0, 1);
        assert_eq!(index, nalgebra::Vector4::new(3, 1, 2, 1));
    }
}

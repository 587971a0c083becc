use std::any::Any;
use std::fmt;
use std::sync::Arc;

use image::GrayImage;
use nalgebra::{Matrix4, Point3, Vector3};
use ndarray::{ArcArray, Array3, ArrayView2, ArrayViewMut3, Axis, Ix3};

use crate::coordinate_system::{
    DEFAULT_TRANSFORM_TOLERANCE, SignedPermutation, find_closest_permutation, homogeneous_form,
    index_affine, invert_index_affine, permutation_matrix, spacing, swap,
    validate_transform_matrix,
};
use crate::enums::{Orientation, Representation};
use crate::error::Result;
use crate::label::AnatomicalLabel;
use crate::renderer::Renderer;

/// Dense voxel storage; clones share the buffer until one of them writes.
pub type VoxelArray<T> = ArcArray<T, Ix3>;

/// Opaque handle to whatever object the voxels were decoded from.
pub type Provenance = Arc<dyn Any + Send + Sync>;

/// Optional construction parameters of a [`Volume`].
#[derive(Clone)]
pub struct VolumeOptions {
    /// Anatomical coordinate system the aligned representation follows.
    pub target_label: AnatomicalLabel,
    pub provenance: Option<Provenance>,
    /// Tolerance on the rotational determinant of the source transform.
    pub tolerance: f64,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            target_label: AnatomicalLabel::RAS,
            provenance: None,
            tolerance: DEFAULT_TRANSFORM_TOLERANCE,
        }
    }
}

/// Everything derived from the source data for one target label.
#[derive(Clone)]
struct Alignment<T> {
    target_label: AnatomicalLabel,
    src_to_aligned_indices: Matrix4<i32>,
    aligned_to_src_indices: Matrix4<i32>,
    voxels: VoxelArray<T>,
    transform: Matrix4<f64>,
    src_to_target_transform: Matrix4<f64>,
    spacing: Vector3<f64>,
}

/// A 3D image volume expressed in a desired anatomical coordinate system.
///
/// The source voxels, their voxel-to-world transform and the anatomical label
/// of that transform's world space stay as handed over by the decoder. On top
/// of them the volume keeps an *aligned* copy of the voxels whose axes follow
/// the target label as closely as possible without interpolation: for "RAS",
/// increasing the index on axis 0 moves to the right of the subject, on axis 1
/// to anterior and on axis 2 to superior.
#[derive(Clone)]
pub struct Volume<T> {
    src_label: AnatomicalLabel,
    src_transform: Matrix4<f64>,
    src_voxels: VoxelArray<T>,
    src_spacing: Vector3<f64>,
    provenance: Option<Provenance>,
    tolerance: f64,
    aligned: Alignment<T>,
}

fn shape_of<T>(voxels: &VoxelArray<T>) -> [usize; 3] {
    let (a, b, c) = voxels.dim();
    [a, b, c]
}

impl<T: Clone> Volume<T> {
    /// Create a volume aligned to "RAS".
    ///
    /// # Errors
    ///
    /// Fails if `src_transform` is not a valid voxel-to-world affine.
    pub fn new(
        src_voxels: Array3<T>,
        src_transform: Matrix4<f64>,
        src_label: AnatomicalLabel,
    ) -> Result<Self> {
        Self::with_options(
            src_voxels.into_shared(),
            src_transform,
            src_label,
            VolumeOptions::default(),
        )
    }

    /// Create a volume with explicit options.
    ///
    /// # Errors
    ///
    /// Fails if `src_transform` is not a valid voxel-to-world affine within
    /// `options.tolerance`, or its rotational part has no closest permutation.
    pub fn with_options(
        src_voxels: VoxelArray<T>,
        src_transform: Matrix4<f64>,
        src_label: AnatomicalLabel,
        options: VolumeOptions,
    ) -> Result<Self> {
        validate_transform_matrix(&src_transform, options.tolerance)?;
        let aligned = Self::align(&src_voxels, &src_transform, src_label, options.target_label)?;
        Ok(Self {
            src_label,
            src_spacing: spacing(&src_transform),
            src_transform,
            src_voxels,
            provenance: options.provenance,
            tolerance: options.tolerance,
            aligned,
        })
    }

    fn align(
        src_voxels: &VoxelArray<T>,
        src_transform: &Matrix4<f64>,
        src_label: AnatomicalLabel,
        target_label: AnatomicalLabel,
    ) -> Result<Alignment<T>> {
        let rotation = src_transform.fixed_view::<3, 3>(0, 0).into_owned();

        // Voxel axes -> source world axes, then source world axes -> target world axes
        let src_to_src_axes = find_closest_permutation(&rotation)?;
        let (src_label_to_target, _) = permutation_matrix(&src_label, &target_label);
        let src_axes_to_target_axes = src_label_to_target * src_to_src_axes;

        let shape = shape_of(src_voxels);
        let src_to_aligned_indices = index_affine(&src_axes_to_target_axes, shape);
        let aligned_to_src_indices = invert_index_affine(&src_to_aligned_indices)?;

        if log::log_enabled!(log::Level::Debug) {
            let closest = src_to_src_axes.to_f64();
            let oblique = (0..3).any(|j| {
                let unit = rotation.column(j) / rotation.column(j).norm();
                (unit - closest.column(j)).amax() > 1e-6
            });
            if oblique {
                log::debug!("source axes are oblique, aligning to closest permutation");
            }
        }
        log::debug!(
            "aligning {src_label} volume of shape {shape:?} to {target_label}: {:?}",
            src_axes_to_target_axes.matrix()
        );

        let voxels = swap(src_voxels.view(), &src_axes_to_target_axes).into_shared();
        let src_to_target_transform =
            homogeneous_form(&src_label_to_target).map(f64::from) * src_transform;
        let transform = src_to_target_transform * aligned_to_src_indices.map(f64::from);

        Ok(Alignment {
            target_label,
            src_to_aligned_indices,
            aligned_to_src_indices,
            voxels,
            transform,
            src_to_target_transform,
            spacing: spacing(&transform),
        })
    }

    /// Realign the volume to the label given as text, e.g. "LPS".
    ///
    /// # Errors
    ///
    /// Fails on a malformed label; the volume is left unchanged.
    pub fn set_target_label(&mut self, label: &str) -> Result<()> {
        self.align_to(label.parse()?)
    }

    /// Realign the volume to `label`.
    ///
    /// All derived state is computed before anything is replaced, so on error
    /// the volume is left unchanged.
    ///
    /// # Errors
    ///
    /// Fails if an intermediate matrix turns out invalid.
    pub fn align_to(&mut self, label: AnatomicalLabel) -> Result<()> {
        if label == self.aligned.target_label {
            log::trace!("volume already aligned to {label}");
            return Ok(());
        }
        self.aligned = Self::align(&self.src_voxels, &self.src_transform, self.src_label, label)?;
        Ok(())
    }

    /// Consume the volume and return it realigned to `label`.
    ///
    /// # Errors
    ///
    /// See [`Volume::align_to`].
    pub fn with_target_label(mut self, label: AnatomicalLabel) -> Result<Self> {
        self.align_to(label)?;
        Ok(self)
    }

    /// Duplicate the volume.
    ///
    /// A deep copy owns fresh voxel buffers. A shallow copy shares them with
    /// `self` until either side writes. Transform and label state is never
    /// shared, the provenance handle always is.
    pub fn copy(&self, deep: bool) -> Self {
        let mut copy = self.clone();
        if deep {
            copy.src_voxels = self.src_voxels.to_owned().into_shared();
            copy.aligned.voxels = self.aligned.voxels.to_owned().into_shared();
        }
        copy
    }

    /// Rebuild this volume so that its source axes are ordered and oriented
    /// like those of `template`.
    ///
    /// The result is aligned to the template's target label and uses the
    /// template's source label. Only the axis permutation and reflection are
    /// taken over; spacing and the exact world rotation remain this volume's.
    ///
    /// # Errors
    ///
    /// Fails if an intermediate matrix turns out invalid.
    pub fn copy_aligned_like<U>(&self, template: &Volume<U>) -> Result<Self> {
        let target_label = template.target_label();
        let aligned = if target_label == self.aligned.target_label {
            self.aligned.clone()
        } else {
            Self::align(&self.src_voxels, &self.src_transform, self.src_label, target_label)?
        };

        let aligned_to_new_src =
            SignedPermutation::from_homogeneous(&template.aligned.aligned_to_src_indices)?;
        let aligned_to_new_indices = index_affine(&aligned_to_new_src, shape_of(&aligned.voxels));
        let new_to_aligned_indices = invert_index_affine(&aligned_to_new_indices)?;

        let voxels = swap(aligned.voxels.view(), &aligned_to_new_src).into_shared();
        let transform = self.src_transform_to(template.src_label)
            * aligned.aligned_to_src_indices.map(f64::from)
            * new_to_aligned_indices.map(f64::from);

        Volume::with_options(
            voxels,
            transform,
            template.src_label,
            VolumeOptions {
                target_label,
                provenance: self.provenance.clone(),
                tolerance: self.tolerance,
            },
        )
    }
}

impl<T> Volume<T> {
    pub fn src_label(&self) -> AnatomicalLabel {
        self.src_label
    }

    pub fn target_label(&self) -> AnatomicalLabel {
        self.aligned.target_label
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    /// The voxels as handed over by the decoder.
    pub fn src_voxels(&self) -> &VoxelArray<T> {
        &self.src_voxels
    }

    /// The voxels with axes aligned to the target label.
    pub fn aligned_voxels(&self) -> &VoxelArray<T> {
        &self.aligned.voxels
    }

    /// Mutable access to the aligned voxels; a buffer shared with a shallow
    /// copy is duplicated first.
    pub fn aligned_voxels_mut(&mut self) -> ArrayViewMut3<'_, T>
    where
        T: Clone,
    {
        self.aligned.voxels.view_mut()
    }

    /// Source voxel indices to source world coordinates.
    pub fn src_transform(&self) -> Matrix4<f64> {
        self.src_transform
    }

    /// Aligned voxel indices to target world coordinates.
    pub fn aligned_transform(&self) -> Matrix4<f64> {
        self.aligned.transform
    }

    /// Source voxel indices to target world coordinates.
    pub fn src_to_aligned_transform(&self) -> Matrix4<f64> {
        self.aligned.src_to_target_transform
    }

    /// Source voxel indices to aligned voxel indices.
    pub fn src_to_aligned_indices(&self) -> Matrix4<i32> {
        self.aligned.src_to_aligned_indices
    }

    /// Aligned voxel indices to source voxel indices.
    pub fn aligned_to_src_indices(&self) -> Matrix4<i32> {
        self.aligned.aligned_to_src_indices
    }

    /// World units per voxel step along each source axis.
    pub fn src_spacing(&self) -> Vector3<f64> {
        self.src_spacing
    }

    /// World units per voxel step along each aligned axis.
    pub fn aligned_spacing(&self) -> Vector3<f64> {
        self.aligned.spacing
    }

    pub fn dim(&self, representation: Representation) -> (usize, usize, usize) {
        match representation {
            Representation::Source => self.src_voxels.dim(),
            Representation::Aligned => self.aligned.voxels.dim(),
        }
    }

    fn src_transform_to(&self, label: AnatomicalLabel) -> Matrix4<f64> {
        let (src_to_label, _) = permutation_matrix(&self.src_label, &label);
        homogeneous_form(&src_to_label).map(f64::from) * self.src_transform
    }

    /// Transform from the indices of `representation` to world coordinates in
    /// the anatomical system `label`. Does not change the volume.
    pub fn transform_to(
        &self,
        representation: Representation,
        label: AnatomicalLabel,
    ) -> Matrix4<f64> {
        match representation {
            Representation::Source => self.src_transform_to(label),
            Representation::Aligned => {
                self.src_transform_to(label) * self.aligned.aligned_to_src_indices.map(f64::from)
            }
        }
    }

    fn current_transform(&self, representation: Representation) -> Matrix4<f64> {
        match representation {
            Representation::Source => self.aligned.src_to_target_transform,
            Representation::Aligned => self.aligned.transform,
        }
    }

    /// World coordinates (in the target system) of a voxel index.
    pub fn index_to_world(&self, representation: Representation, index: [usize; 3]) -> Point3<f64> {
        let index = Point3::new(index[0] as f64, index[1] as f64, index[2] as f64);
        self.current_transform(representation).transform_point(&index)
    }

    /// Nearest voxel index of a point given in target world coordinates.
    ///
    /// Returns `None` if the point lies outside the array.
    pub fn world_to_index(
        &self,
        representation: Representation,
        point: &Point3<f64>,
    ) -> Option<[usize; 3]> {
        let inverse = self.current_transform(representation).try_inverse()?;
        let index = inverse.transform_point(point);
        let (a, b, c) = self.dim(representation);
        let shape = [a, b, c];
        let mut result = [0usize; 3];
        for axis in 0..3 {
            let i = index[axis].round();
            if !(0.0..shape[axis] as f64).contains(&i) {
                return None;
            }
            result[axis] = i as usize;
        }
        Some(result)
    }

    /// The aligned voxels in an anatomical plane, e.g. the `index`-th axial
    /// slice counted from inferior for a target label containing "S".
    pub fn plane(&self, orientation: Orientation, index: usize) -> Option<ArrayView2<'_, T>> {
        let axis = self.aligned.target_label.axis_position(orientation.normal());
        if index >= self.aligned.voxels.len_of(Axis(axis)) {
            return None;
        }
        Some(self.aligned.voxels.index_axis(Axis(axis), index))
    }

    /// An anatomical plane as an 8-bit gray image, windowed to its value range.
    pub fn plane_image(&self, orientation: Orientation, index: usize) -> Option<GrayImage>
    where
        T: Copy + Into<f64> + Send + Sync,
    {
        let plane = self.plane(orientation, index)?;
        Renderer::plane_to_image(&plane)
    }
}

impl<T> fmt::Debug for Volume<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("src_label", &self.src_label)
            .field("target_label", &self.aligned.target_label)
            .field("src_shape", &self.src_voxels.shape())
            .field("aligned_shape", &self.aligned.voxels.shape())
            .field("src_transform", &self.src_transform)
            .field("has_provenance", &self.provenance.is_some())
            .finish()
    }
}

//! # Anatomical volume library
//!
//! This crate aligns 3D medical image volumes to anatomical coordinate
//! systems ("RAS", "LPS", ...) without resampling. It sits on top of format
//! specific decoders (DICOM, NIfTI, NRRD), which hand over three things:
//!  - a dense 3D voxel array,
//!  - a 4×4 affine mapping voxel indices to world coordinates,
//!  - the anatomical label of that world coordinate system (usually "LPS" for
//!    DICOM and "RAS" for NIfTI).
//!
//! A [`Volume`] keeps the decoder's data untouched and additionally exposes
//! an *aligned* array whose axes follow a target label as closely as exact
//! axis permutation and reflection allow, together with the matching
//! transforms and voxel spacings. Changing the target label recomputes all of
//! it at once.
//!
//! The building blocks live in [`coordinate_system`]: permutation-reflection
//! matrices between labels, the closest permutation of an arbitrary affine
//! and the axis swap itself.
//!
//! # Examples
//!
//! ## Aligning DICOM voxels to RAS
//!
//! ```
//! # use anatomical_volume::{AnatomicalLabel, Orientation, Volume};
//! # use nalgebra::Matrix4;
//! # use ndarray::Array3;
//! let voxels = Array3::<u16>::zeros((64, 64, 32));
//! let volume = Volume::new(voxels, Matrix4::identity(), AnatomicalLabel::LPS)
//!     .expect("identity is a valid transform");
//! assert_eq!(volume.target_label().to_string(), "RAS");
//! let axial = volume
//!     .plane(Orientation::Axial, 16)
//!     .expect("slice 16 exists");
//! assert_eq!(axial.dim(), (64, 64));
//! ```

pub mod coordinate_system;
pub mod enums;
pub mod error;
pub mod label;
mod renderer;
pub mod volume;

pub use coordinate_system::SignedPermutation;
pub use enums::{Orientation, Representation};
pub use error::{InvalidMatrixError, LabelError, LabelErrorKind, Result, VolumeError};
pub use label::{AnatomicalLabel, Direction};
pub use volume::{Provenance, Volume, VolumeOptions, VoxelArray};

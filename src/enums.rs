use crate::label::Direction;

/// Anatomical plane through a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    /// Direction perpendicular to the plane.
    pub fn normal(self) -> Direction {
        match self {
            Orientation::Axial => Direction::Superior,
            Orientation::Coronal => Direction::Anterior,
            Orientation::Sagittal => Direction::Right,
        }
    }
}

/// Which voxel array of a [`Volume`](crate::volume::Volume) indices refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Representation {
    /// The array as handed over by the decoder.
    Source,
    /// The array with its axes swapped to follow the target label.
    #[default]
    Aligned,
}

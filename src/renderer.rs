use image::{GrayImage, ImageBuffer};
use ndarray::ArrayView2;
use rayon::prelude::*;

pub(crate) struct Renderer;

impl Renderer {
    /// Smallest and largest value of a plane; `None` for an empty plane.
    pub(crate) fn value_range<T>(plane: &ArrayView2<'_, T>) -> Option<(f64, f64)>
    where
        T: Copy + Into<f64>,
    {
        plane.iter().fold(None, |range, &v| {
            let v: f64 = v.into();
            Some(match range {
                None => (v, v),
                Some((min, max)) => (min.min(v), max.max(v)),
            })
        })
    }

    #[inline]
    pub(crate) fn normalize_to_u8(value: f64, min: f64, max: f64) -> u8 {
        if max <= min {
            return 0;
        }
        ((value - min) / (max - min) * 255.0).round().clamp(0.0, 255.0) as u8
    }

    /// Map a plane onto 8-bit gray values, darkest value to 0 and brightest to 255.
    pub(crate) fn plane_to_image<T>(plane: &ArrayView2<'_, T>) -> Option<GrayImage>
    where
        T: Copy + Into<f64> + Send + Sync,
    {
        let (height, width) = plane.dim();
        let (min, max) = Self::value_range(plane)?;
        let pixel_data: Vec<u8> = plane
            .into_par_iter()
            .map(|&v| Self::normalize_to_u8(v.into(), min, max))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }
}

//! Organized depth clouds.
//!
//! A [`DepthCloud`] is an organized raster of 3D points in the depth sensor
//! frame. Missing measurements are NaN points, mirroring the conventions of
//! organized RGB-D streams; the `dense` flag is true only while no point is
//! missing.

use crate::{CalibError, Pt3, Real};

/// An organized cloud of 3D points with row-major storage.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthCloud {
    width: usize,
    height: usize,
    points: Vec<Pt3>,
    dense: bool,
}

impl DepthCloud {
    /// A cloud with every cell missing.
    pub fn new_missing(width: usize, height: usize) -> Self {
        let nan = Real::NAN;
        Self {
            width,
            height,
            points: vec![Pt3::new(nan, nan, nan); width * height],
            dense: false,
        }
    }

    /// A cloud from row-major points. `dense` is derived from the data.
    pub fn from_points(width: usize, height: usize, points: Vec<Pt3>) -> Result<Self, CalibError> {
        if points.len() != width * height {
            return Err(CalibError::PointCountMismatch {
                expected: width * height,
                got: points.len(),
            });
        }
        let dense = points.iter().all(is_finite);
        Ok(Self {
            width,
            height,
            points,
            dense,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// True while no cell is missing.
    pub fn is_dense(&self) -> bool {
        self.dense
    }

    /// Point at raster position `(col, row)`.
    pub fn at(&self, col: usize, row: usize) -> &Pt3 {
        &self.points[row * self.width + col]
    }

    /// Point at a flat row-major index.
    pub fn point(&self, idx: usize) -> &Pt3 {
        &self.points[idx]
    }

    /// Row-major point slice.
    pub fn points(&self) -> &[Pt3] {
        &self.points
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Replace the point at `(col, row)`, updating the dense flag downwards only.
    pub fn set(&mut self, col: usize, row: usize, p: Pt3) {
        if !is_finite(&p) {
            self.dense = false;
        }
        self.points[row * self.width + col] = p;
    }

    /// Map every finite point through `f`, leaving missing cells untouched.
    pub fn map_points(&self, f: impl Fn(usize, usize, &Pt3) -> Pt3) -> Self {
        let mut out = self.clone();
        for row in 0..self.height {
            for col in 0..self.width {
                let p = self.at(col, row);
                if is_finite(p) {
                    out.set(col, row, f(col, row, p));
                }
            }
        }
        out
    }

    /// Block-average the cloud by an integer ratio.
    ///
    /// Each output cell is the arithmetic mean of the finite points among the
    /// `ratio × ratio` input cells it covers, accumulated in raster order so the
    /// reduction is reproducible. A cell with no finite input becomes missing
    /// and clears the dense flag. Output dimensions are
    /// `floor(w / ratio) × floor(h / ratio)`. `ratio == 1` returns an exact copy.
    pub fn block_average(&self, ratio: usize) -> Result<Self, CalibError> {
        if ratio == 0 {
            return Err(CalibError::InvalidDownsampleRatio(ratio));
        }
        if ratio == 1 {
            return Ok(self.clone());
        }

        let out_w = self.width / ratio;
        let out_h = self.height / ratio;
        let mut out = Self {
            width: out_w,
            height: out_h,
            points: Vec::with_capacity(out_w * out_h),
            // Derived from the output cells alone: a sparse input whose holes
            // all average away yields a dense cloud.
            dense: true,
        };

        for row in 0..out_h {
            for col in 0..out_w {
                let mut sum = Pt3::origin();
                let mut count = 0usize;
                for di in 0..ratio {
                    for dj in 0..ratio {
                        let p = self.at(col * ratio + dj, row * ratio + di);
                        if is_finite(p) {
                            sum.coords += p.coords;
                            count += 1;
                        }
                    }
                }
                if count > 0 {
                    out.points.push(Pt3::from(sum.coords / count as Real));
                } else {
                    let nan = Real::NAN;
                    out.points.push(Pt3::new(nan, nan, nan));
                    out.dense = false;
                }
            }
        }
        Ok(out)
    }
}

/// True when all three coordinates are finite.
pub fn is_finite(p: &Pt3) -> bool {
    p.x.is_finite() && p.y.is_finite() && p.z.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp_cloud(w: usize, h: usize) -> DepthCloud {
        let points = (0..w * h)
            .map(|i| Pt3::new(i as Real, 2.0 * i as Real, 1.0 + i as Real * 0.1))
            .collect();
        DepthCloud::from_points(w, h, points).unwrap()
    }

    #[test]
    fn ratio_one_is_identity() {
        let cloud = ramp_cloud(6, 4);
        let out = cloud.block_average(1).unwrap();
        assert_eq!(out, cloud);
    }

    #[test]
    fn zero_ratio_is_rejected() {
        let cloud = ramp_cloud(2, 2);
        assert!(matches!(
            cloud.block_average(0),
            Err(CalibError::InvalidDownsampleRatio(0))
        ));
    }

    #[test]
    fn block_average_takes_the_mean_of_finite_points() {
        let mut cloud = ramp_cloud(4, 4);
        // One missing point inside the top-left block.
        cloud.set(1, 1, Pt3::new(Real::NAN, Real::NAN, Real::NAN));
        let out = cloud.block_average(2).unwrap();
        assert_eq!(out.width(), 2);
        assert_eq!(out.height(), 2);

        // The top-left block averages cells (0,0), (1,0), (0,1) only.
        let expected = (cloud.at(0, 0).coords + cloud.at(1, 0).coords + cloud.at(0, 1).coords) / 3.0;
        assert_relative_eq!(out.at(0, 0).coords, expected, epsilon = 1e-12);
        assert!(out.is_dense());
    }

    #[test]
    fn all_missing_block_becomes_missing_and_clears_dense() {
        let mut cloud = ramp_cloud(4, 2);
        for di in 0..2 {
            for dj in 0..2 {
                cloud.set(2 + dj, di, Pt3::new(Real::NAN, Real::NAN, Real::NAN));
            }
        }
        let out = cloud.block_average(2).unwrap();
        assert!(is_finite(out.at(0, 0)));
        assert!(!is_finite(out.at(1, 0)));
        assert!(!out.is_dense());
    }

    #[test]
    fn non_divisible_dimensions_are_floored() {
        let cloud = ramp_cloud(7, 5);
        let out = cloud.block_average(2).unwrap();
        assert_eq!((out.width(), out.height()), (3, 2));
    }
}

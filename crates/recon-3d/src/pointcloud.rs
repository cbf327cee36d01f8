/// A point cloud with points and optional per-point colors.
///
/// Points are expressed in the frame of the reference camera of the reconstruction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The colors of the points.
    colors: Option<Vec<[u8; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud from points and optional colors.
    ///
    /// Colors are discarded when their count differs from the number of points.
    pub fn new(points: Vec<[f64; 3]>, colors: Option<Vec<[u8; 3]>>) -> Self {
        let colors = colors.filter(|c| {
            let valid = c.len() == points.len();
            if !valid {
                log::warn!(
                    "ignoring {} colors for a cloud of {} points",
                    c.len(),
                    points.len()
                );
            }
            valid
        });
        Self { points, colors }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the colors of the points in the point cloud.
    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    /// Attach colors to the points, replacing existing ones.
    pub fn with_colors(self, colors: Vec<[u8; 3]>) -> Self {
        Self::new(self.points, Some(colors))
    }

    /// Axis aligned bounding box as `(min, max)`, or `None` for an empty cloud.
    pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
        let first = *self.points.first()?;
        Some(self.points.iter().fold((first, first), |(lo, hi), p| {
            (
                [lo[0].min(p[0]), lo[1].min(p[1]), lo[2].min(p[2])],
                [hi[0].max(p[0]), hi[1].max(p[1]), hi[2].max(p[2])],
            )
        }))
    }

    /// Mean of the points, or `None` for an empty cloud.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as f64;
        let sum = self.points.iter().fold([0.0; 3], |acc, p| {
            [acc[0] + p[0], acc[1] + p[1], acc[2] + p[2]]
        });
        Some([sum[0] / n, sum[1] / n, sum[2] / n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointcloud() {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 2.0]],
            Some(vec![[255, 0, 0], [0, 255, 0]]),
        );

        assert_eq!(pointcloud.len(), 2);
        assert_eq!(pointcloud.colors().map(|c| c.len()), Some(2));
        assert_eq!(
            pointcloud.bounds(),
            Some(([0.0, 0.0, 0.0], [1.0, 0.0, 2.0]))
        );
        assert_eq!(pointcloud.centroid(), Some([0.5, 0.0, 1.0]));
    }

    #[test]
    fn test_pointcloud_mismatched_colors() {
        let pointcloud = PointCloud::new(vec![[0.0, 0.0, 1.0]], Some(vec![]));
        assert!(pointcloud.colors().is_none());

        let pointcloud = pointcloud.with_colors(vec![[1, 2, 3]]);
        assert_eq!(pointcloud.colors(), Some(&[[1u8, 2, 3]][..]));
    }

    #[test]
    fn test_pointcloud_empty() {
        let pointcloud = PointCloud::default();
        assert!(pointcloud.is_empty());
        assert!(pointcloud.bounds().is_none());
        assert!(pointcloud.centroid().is_none());
    }
}

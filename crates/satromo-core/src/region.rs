use crate::job::Partition;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding rectangle `[min_x, min_y, max_x, max_y]` in the
/// coordinate system of the compute service (WGS84 degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Region {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Region {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x < self.max_x
            && self.min_y < self.max_y
    }

    /// Split into four quadrants: 1 south-west, 2 south-east, 3 north-west,
    /// 4 north-east.
    pub fn quadrants(&self) -> Vec<(Partition, Region)> {
        let mid_x = (self.min_x + self.max_x) / 2.0;
        let mid_y = (self.min_y + self.max_y) / 2.0;
        let parts = [
            Region::new(self.min_x, self.min_y, mid_x, mid_y),
            Region::new(mid_x, self.min_y, self.max_x, mid_y),
            Region::new(self.min_x, mid_y, mid_x, self.max_y),
            Region::new(mid_x, mid_y, self.max_x, self.max_y),
        ];
        Partition::all().zip(parts).collect()
    }
}

impl From<[f64; 4]> for Region {
    fn from(v: [f64; 4]) -> Self {
        Region::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Region> for [f64; 4] {
    fn from(r: Region) -> Self {
        [r.min_x, r.min_y, r.max_x, r.max_y]
    }
}

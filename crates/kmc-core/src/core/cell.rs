use serde::Serialize;
use std::fmt;
use std::ops::{Add, Neg};

/// Absolute coordinates of a lattice cell.
///
/// `i` and `j` index the plane and are wrapped periodically by the lattice;
/// `k` is the plane index (the height above the substrate) and is never wrapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CellInds {
    pub i: i32,
    pub j: i32,
    pub k: i32,
}

impl CellInds {
    pub const fn new(i: i32, j: i32, k: i32) -> Self {
        Self { i, j, k }
    }
}

impl fmt::Display for CellInds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{},{}]", self.i, self.j, self.k)
    }
}

/// Relative position of one cell with respect to another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CellIndsOffset {
    pub i: i32,
    pub j: i32,
    pub k: i32,
}

impl CellIndsOffset {
    pub const ZERO: Self = Self::new(0, 0, 0);

    pub const fn new(i: i32, j: i32, k: i32) -> Self {
        Self { i, j, k }
    }

    /// An offset that stays within the same plane.
    pub const fn planar(i: i32, j: i32) -> Self {
        Self { i, j, k: 0 }
    }
}

impl fmt::Display for CellIndsOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.i, self.j, self.k)
    }
}

impl Add<CellIndsOffset> for CellInds {
    type Output = CellInds;

    fn add(self, rhs: CellIndsOffset) -> CellInds {
        CellInds::new(self.i + rhs.i, self.j + rhs.j, self.k + rhs.k)
    }
}

impl Add for CellIndsOffset {
    type Output = CellIndsOffset;

    fn add(self, rhs: CellIndsOffset) -> CellIndsOffset {
        CellIndsOffset::new(self.i + rhs.i, self.j + rhs.j, self.k + rhs.k)
    }
}

impl Neg for CellIndsOffset {
    type Output = CellIndsOffset;

    fn neg(self) -> CellIndsOffset {
        CellIndsOffset::new(-self.i, -self.j, -self.k)
    }
}

/// Maps `ind` into `[0, dim)` assuming periodic boundaries.
///
/// Offsets used by events are small compared to the lattice, so the loop
/// runs at most a handful of times.
#[inline]
pub fn wrap_ind(mut ind: i32, dim: i32) -> i32 {
    while ind < 0 {
        ind += dim;
    }
    while ind >= dim {
        ind -= dim;
    }
    ind
}

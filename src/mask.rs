//! Fixed-width lane masks.
//!
//! Hit masks of the box test, the 16-lane activity/terminated masks of a ray packet and the keep mask used
//! by stack compaction are all the same thing: a small bit vector with one bit per SIMD lane. Keeping the bit
//! tricks in one place makes them testable on their own.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, Not};

/// A boolean vector of `LANES` lanes (at most 32), stored as the low bits of a `u32`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct LaneMask<const LANES: usize>(u32);

/// One bit per child of a BVH4 node.
pub type Mask4 = LaneMask<4>;
/// One bit per ray of a 16-wide ray packet.
pub type Mask16 = LaneMask<16>;

impl<const LANES: usize> LaneMask<LANES> {
    const VALID_BITS: u32 = u32::MAX >> (32 - LANES);

    /// No lane set.
    pub const NONE: Self = Self(0);
    /// Every lane set.
    pub const ALL: Self = Self(Self::VALID_BITS);

    /// Creates a mask from raw bits. Bits above `LANES` are dropped.
    #[inline(always)]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::VALID_BITS)
    }

    /// Mask with only `lane` set.
    #[inline(always)]
    pub const fn lane(lane: usize) -> Self {
        debug_assert!(lane < LANES);
        Self(1 << lane)
    }

    /// Mask with the first `count` lanes set.
    #[inline(always)]
    pub const fn first_n(count: usize) -> Self {
        if count >= LANES {
            Self::ALL
        } else {
            Self((1 << count) - 1)
        }
    }

    /// Builds a mask from a per-lane predicate.
    #[inline(always)]
    pub fn from_fn(mut f: impl FnMut(usize) -> bool) -> Self {
        let mut bits = 0;
        for i in 0..LANES {
            bits |= (f(i) as u32) << i;
        }
        Self(bits)
    }

    #[inline(always)]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Population count.
    #[inline(always)]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    #[inline(always)]
    pub const fn none(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub const fn any(self) -> bool {
        self.0 != 0
    }

    #[inline(always)]
    pub const fn all(self) -> bool {
        self.0 == Self::VALID_BITS
    }

    #[inline(always)]
    pub const fn test(self, lane: usize) -> bool {
        self.0 & (1 << lane) != 0
    }

    #[inline(always)]
    pub fn set(&mut self, lane: usize) {
        debug_assert!(lane < LANES);
        self.0 |= 1 << lane;
    }

    #[inline(always)]
    pub fn clear(&mut self, lane: usize) {
        self.0 &= !(1 << lane);
    }

    /// Index of the lowest set lane (find-first-set).
    #[inline(always)]
    pub const fn first(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Index of the lowest set lane strictly above `lane`.
    #[inline(always)]
    pub const fn next_after(self, lane: usize) -> Option<usize> {
        if lane + 1 >= LANES {
            return None;
        }
        Self(self.0 & (u32::MAX << (lane + 1))).first()
    }

    /// Only the lowest set lane, or an empty mask.
    #[inline(always)]
    pub const fn lowest(self) -> Self {
        Self(self.0 & self.0.wrapping_neg())
    }

    /// Every set lane except the lowest one.
    #[inline(always)]
    pub const fn without_lowest(self) -> Self {
        Self(self.0 & self.0.wrapping_sub(1))
    }

    /// `self & !other`
    #[inline(always)]
    pub const fn and_not(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Iterates the set lanes from low to high.
    #[inline(always)]
    pub fn iter(self) -> SetLanes {
        SetLanes(self.0)
    }

    /// Compress-store: writes the selected lanes of `src` contiguously to the front of `dst`, preserving lane
    /// order, and returns how many were written. Entries of `dst` past that count are left untouched.
    ///
    /// # Panics
    /// If `dst` is shorter than the number of selected lanes.
    #[inline(always)]
    pub fn compress<T: Copy>(self, src: &[T; LANES], dst: &mut [T]) -> usize {
        let mut written = 0;
        for lane in self.iter() {
            dst[written] = src[lane];
            written += 1;
        }
        written
    }
}

impl Mask16 {
    /// Mask of the lanes whose valid value is non-zero, the integer activity vector convention of packet
    /// ray tracing APIs.
    #[inline]
    pub fn from_valid(valid: &[i32; 16]) -> Self {
        Self::from_fn(|i| valid[i] != 0)
    }

    /// Concatenates four 4-lane masks, `parts[0]` being the lowest lanes.
    #[inline(always)]
    pub const fn from_quads(parts: [u32; 4]) -> Self {
        Self::from_bits(
            (parts[0] & 0xf) | (parts[1] & 0xf) << 4 | (parts[2] & 0xf) << 8 | (parts[3] & 0xf) << 12,
        )
    }
}

/// Iterator over the set lanes of a [`LaneMask`], lowest first.
#[derive(Clone, Copy, Debug)]
pub struct SetLanes(u32);

impl Iterator for SetLanes {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let lane = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some(lane)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for SetLanes {}

impl<const LANES: usize> IntoIterator for LaneMask<LANES> {
    type Item = usize;
    type IntoIter = SetLanes;

    fn into_iter(self) -> SetLanes {
        self.iter()
    }
}

impl<const LANES: usize> BitAnd for LaneMask<LANES> {
    type Output = Self;
    #[inline(always)]
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl<const LANES: usize> BitAndAssign for LaneMask<LANES> {
    #[inline(always)]
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl<const LANES: usize> BitOr for LaneMask<LANES> {
    type Output = Self;
    #[inline(always)]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl<const LANES: usize> BitOrAssign for LaneMask<LANES> {
    #[inline(always)]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl<const LANES: usize> BitXor for LaneMask<LANES> {
    type Output = Self;
    #[inline(always)]
    fn bitxor(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl<const LANES: usize> Not for LaneMask<LANES> {
    type Output = Self;
    #[inline(always)]
    fn not(self) -> Self {
        Self(!self.0 & Self::VALID_BITS)
    }
}

impl<const LANES: usize> fmt::Debug for LaneMask<LANES> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LaneMask<{}>({:#0width$b})",
            LANES,
            self.0,
            width = LANES + 2
        )
    }
}

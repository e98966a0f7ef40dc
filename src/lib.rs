//! # BVH4 Packet Traversal Library
//!
//! - A four-way BVH ([`bvh4::Bvh4`]) with 128 byte nodes, each holding the boxes and packed references of up to 4
//!   children.
//! - 16-wide ray packets ([`packet::RayPacket16`]) traversed one ray at a time: closest hit and occlusion
//!   queries driven by a 16 bit activity mask.
//! - SIMD box tests (SSE2 on x86/x86_64, with a portable glam fallback), a 4-wide Möller–Trumbore triangle test,
//!   and a closure based intersector for user defined primitives.
//!
//! Optionally uses [rayon](https://github.com/rayon-rs/rayon) to traverse many packets in parallel.
//!
//! ## Example
//!
//! ```
//! use glam::*;
//! use bvh4_packet::{
//!     packet::RayPacket16,
//!     ray::{Ray, INVALID_ID},
//!     test_util::{builder::build_bvh4_from_tris, geometry::{icosphere, PLANE}},
//!     triangle::Triangle,
//! };
//!
//! // Build a scene with an icosphere and a plane.
//! let mut tris: Vec<Triangle> = Vec::new();
//! tris.extend(icosphere(1));
//! tris.extend(PLANE);
//! let bvh = build_bvh4_from_tris(&tris, 0, 4).unwrap();
//!
//! // Two rays in the first lanes of a packet, the rest stay inactive.
//! let (mut packet, valid) = RayPacket16::new(&[
//!     Ray::new_inf(vec3a(0.1, 0.1, 4.0), vec3a(0.0, 0.0, -1.0)),
//!     Ray::new_inf(vec3a(0.1, 0.1, 4.0), vec3a(0.0, 0.0, 1.0)),
//! ]);
//!
//! // Closest hit: lanes that hit get their far bound and hit record overwritten.
//! bvh.intersect16(valid, &mut packet);
//! for lane in valid {
//!     if packet.geom_id[lane] != INVALID_ID {
//!         println!("Lane {lane} hit triangle {} at {}", packet.prim_id[lane], packet.tfar[lane]);
//!     } else {
//!         println!("Lane {lane} missed");
//!     }
//! }
//! assert_eq!(packet.geom_id[1], INVALID_ID);
//! ```

use std::time::Duration;

use aabb::Aabb;

pub mod aabb;
pub mod bvh4;
pub mod error;
pub mod mask;
pub mod packet;
pub mod primitive;
pub mod ray;
pub mod test_util;
pub mod triangle;

/// A trait for types that can be bounded by an axis-aligned bounding box (AABB). Used in Bvh4 validation and
/// building.
#[cfg(feature = "parallel")]
pub trait Boundable: Send + Sync {
    fn aabb(&self) -> Aabb;
}

/// A trait for types that can be bounded by an axis-aligned bounding box (AABB). Used in Bvh4 validation and
/// building.
#[cfg(not(feature = "parallel"))]
pub trait Boundable {
    fn aabb(&self) -> Aabb;
}

/// A macro to measure and print the execution time of a block of code.
///
/// # Arguments
/// * `$label` - A string label to identify the code block being timed.
/// * `$($code:tt)*` - The code block whose execution time is to be measured.
///
/// # Usage
/// ```rust
/// use bvh4_packet::timeit;
/// timeit!["example",
///     // code to measure
/// ];
/// ```
///
/// # Note
/// The macro purposefully doesn't include a scope so variables don't need to
/// be passed out of it. This allows it to be trivially added to existing code.
///
/// This macro only measures time when the `timeit` feature is enabled.
#[macro_export]
#[doc(hidden)]
macro_rules! timeit {
    [$label:expr, $($code:tt)*] => {
        #[cfg(feature = "timeit")]
        let timeit_start = std::time::Instant::now();
        $($code)*
        #[cfg(feature = "timeit")]
        println!("{:>8} {}", format!("{}", $crate::PrettyDuration(timeit_start.elapsed())), $label);
    };
}

/// A wrapper struct for `std::time::Duration` to provide pretty-printing of durations.
#[doc(hidden)]
pub struct PrettyDuration(pub Duration);

impl std::fmt::Display for PrettyDuration {
    /// Seconds (two decimals) from 1s up, milliseconds (two decimals) from 1ms up, whole microseconds below.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let duration = self.0;
        if duration.as_secs() > 0 {
            let seconds =
                duration.as_secs() as f64 + f64::from(duration.subsec_nanos()) / 1_000_000_000.0;
            write!(f, "{seconds:.2}s ")
        } else if duration.subsec_millis() > 0 {
            let milliseconds =
                duration.as_millis() as f64 + f64::from(duration.subsec_micros() % 1_000) / 1_000.0;
            write!(f, "{milliseconds:.2}ms")
        } else {
            let microseconds = duration.as_micros();
            write!(f, "{microseconds}µs")
        }
    }
}

/// Add profile scope. Nesting the macro allows us to make the profiling crate optional.
#[doc(hidden)]
#[macro_export]
macro_rules! scope {
    [$label:expr] => {
        #[cfg(feature = "profile")]
        profiling::scope!($label);
    };
}

//! Preprocessing applied to a day's raw observations before feature and
//! target construction.
//!
//! - **Resampling**: bucket means on a uniform `P` grid, offset so the first
//!   bucket is complete (see [`resampling`])
//!
//! Derived columns (clearness index and friends) are computed on the raw
//! samples beforehand by [`crate::transforms`].

pub mod resampling;

pub use resampling::Resampler;

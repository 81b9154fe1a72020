//! Utility Module
//!
//! - [`OrbitControls`]: orbit camera controller driven by abstract input deltas
//! - [`Timer`]: frame clock used by the viewer's render loop

pub mod orbit_control;
pub mod time;

pub use orbit_control::OrbitControls;
pub use time::Timer;

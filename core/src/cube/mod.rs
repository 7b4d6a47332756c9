// Cube-level math shared by every protocol generation: the packed-state
// facelet codec and the clock-skew fitter.

pub mod facelets;
pub mod timestamps;

pub use facelets::CubeState;
pub use timestamps::{fit_timestamps, skew_percent};

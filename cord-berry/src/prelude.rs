//! 常用条目的一站式导入.
//!
//! ```
//! use cord_berry::prelude::*;
//! ```

pub use crate::centerline::{CenterlineSamples, FittedCenterline, GapPolicy};
pub use crate::csa::{CsaArray, TangentPolicy};
pub use crate::fitting::{CurveType, WindowKind};
pub use crate::levels::{LevelMap, LevelRange, SliceRange};
pub use crate::metrics::{cord_volume_mm3, CsaStats};
pub use crate::pipeline::{export, process, CsaOutcome, ProcessSpec, TmpWorkspace};
pub use crate::report::ReportContext;
pub use crate::{LevelVolume, PipelineError, PipelineResult, SegVolume, VolumeAttr};

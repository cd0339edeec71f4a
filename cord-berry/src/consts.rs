//! 通用常量.

/// 椎体标注中 "未标注" 的层级编号.
pub const UNLABELED: u8 = 0;

/// 判定前景体素的阈值. 分割可能带部分容积效应 (取值在 0 和 1 之间),
/// 质心提取只统计严格大于该值的体素.
pub const FOREGROUND_THRESHOLD: f32 = 0.0;

/// 中心线窗平滑的默认窗长 (单位: 样本数).
pub const DEFAULT_WINDOW_LEN: usize = 80;

/// 三次样条拟合模式下, 每个节点默认覆盖的样本数.
pub const DEFAULT_SAMPLES_PER_KNOT: u32 = 10;

/// 默认的 CSA 平滑窗长 (单位: 毫米). 0 代表不平滑.
pub const DEFAULT_CSA_SMOOTHING_MM: f64 = 0.0;

/// 体素是否属于前景?
#[inline]
pub fn is_foreground(v: f32) -> bool {
    v > FOREGROUND_THRESHOLD
}

/// 层级编号是否已标注?
#[inline]
pub const fn is_labeled(code: u8) -> bool {
    code != UNLABELED
}

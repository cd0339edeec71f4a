//! 曲线拟合与序列平滑.
//!
//! 给定一系列点 `(z, v)`, 该模块可以生成一条平滑曲线及其一阶导数.

mod cubic_spline;
mod window;

pub use cubic_spline::{SplineFit, SplineFit32};
pub use window::{gradient, smooth, WindowKind};

/// 拟合策略. 在构建流水线参数时一次性确定, 运行期不再出现字符串分派.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CurveType {
    /// 归一化对称窗卷积平滑, 导数用有限差分获得.
    Window {
        /// 窗形状.
        kind: WindowKind,

        /// 窗长 (单位: 样本数). 不超过 2 时退化为恒等变换.
        len: usize,
    },

    /// 三次样条曲线. 节点从样本中按固定间隔抽取 (始终保留两端),
    /// 导数由样条系数解析求出.
    CubicSpline {
        /// 每个节点覆盖的样本数. 节点数与样本数成正比, 以避免振铃.
        samples_per_knot: u32,
    },
}

impl CurveType {
    /// 默认的窗平滑配置 (Hanning 窗).
    #[inline]
    pub fn default_window() -> Self {
        Self::Window {
            kind: WindowKind::Hanning,
            len: crate::consts::DEFAULT_WINDOW_LEN,
        }
    }

    /// 默认的样条拟合配置.
    #[inline]
    pub fn default_spline() -> Self {
        Self::CubicSpline {
            samples_per_knot: crate::consts::DEFAULT_SAMPLES_PER_KNOT,
        }
    }
}

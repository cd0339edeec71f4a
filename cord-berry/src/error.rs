//! 运行时错误.

use std::fmt;

/// 分割处理流水线的运行时错误.
///
/// 这些错误在流水线内部均不可恢复 (输入是静态文件, 重试不改变结果),
/// 但在调用边界可以被捕获并报告给用户.
#[derive(Debug)]
pub enum PipelineError {
    /// 中心线样本不足. 参数为实际提取到的样本数 (有效拟合至少需要 2 个).
    InsufficientData(usize),

    /// 分割在 z 方向不连续, 且空洞长度超出容忍范围.
    /// `z` 为空洞起始切片索引, `run` 为连续空切片个数.
    DiscontinuousSegmentation {
        /// 空洞起始切片索引.
        z: usize,
        /// 连续空切片个数.
        run: usize,
    },

    /// 解析后的椎体层级区间内没有任何中心线样本.
    EmptyLevelRange,

    /// 区间本身非法: 起点大于终点, 或者区间字符串格式错误.
    InvalidRange(String),

    /// 请求了椎体层级选择, 但没有提供 (或提供了空的) 椎体标注文件.
    MissingLabelingData,

    /// 底层 nifti 读写错误.
    Nifti(nifti::NiftiError),

    /// 其他底层 I/O 错误.
    Io(std::io::Error),
}

/// 流水线计算结果.
pub type PipelineResult<T> = Result<T, PipelineError>;

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData(n) => {
                write!(f, "centerline has {n} sample(s), at least 2 required")
            }
            Self::DiscontinuousSegmentation { z, run } => {
                write!(f, "segmentation discontinuous: {run} empty slice(s) from z={z}")
            }
            Self::EmptyLevelRange => {
                write!(f, "no centerline sample falls into the resolved vertebral range")
            }
            Self::InvalidRange(s) => write!(f, "invalid range: {s}"),
            Self::MissingLabelingData => {
                write!(f, "vertebral levels requested without a usable labeling volume")
            }
            Self::Nifti(e) => write!(f, "nifti error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Nifti(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<nifti::NiftiError> for PipelineError {
    #[inline]
    fn from(value: nifti::NiftiError) -> Self {
        Self::Nifti(value)
    }
}

impl From<std::io::Error> for PipelineError {
    #[inline]
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// 记录一条非致命警告: 写入日志, 同时追加到警告列表 (最终进入报告头部).
pub(crate) fn record_warning(sink: &mut Vec<String>, msg: String) {
    log::warn!("{msg}");
    sink.push(msg);
}

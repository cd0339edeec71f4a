#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供 RPI 朝向的 3D 脊髓 MR 分割文件的结构化信息和基础处理算法.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 该 crate 假设输入 nifti 文件已经转换到 RPI 朝向, 没有实现朝向转换
//!   (但如果新数据按照 RPI 模式组织, 也可以工作).
//! 2. 在非期望情况下, 程序会直接 panic, 而不会导致内存错误. As what Rust promises.
//!
//! # 功能总览
//!
//! ### 中心线提取与平滑 ✅
//!
//! 从二值 (或部分容积) 分割中逐层提取质心, 然后用 Hanning
//! 窗平滑或三次样条拟合出连续曲线与其一阶导数.
//!
//! 实现位于 `cord-berry/src/{centerline, fitting}`.
//!
//! ### 斜切面校正的横截面积 (CSA) ✅
//!
//! 对每个水平切片, 以中心线切向量与 z 轴的夹角校正体素计数,
//! 得到以平方毫米为单位的 CSA 序列. 支持按物理长度 (毫米) 的窗平滑.
//!
//! 实现位于 `cord-berry/src/csa`.
//!
//! ### 椎体层级匹配 ✅
//!
//! 给定椎体标注文件, 将请求的层级区间解析为连续的切片区间.
//! 区间越界会被夹取, 缺失的层级会吸附到最近的可用层级, 全部记录为警告.
//!
//! 实现位于 `cord-berry/src/levels`.
//!
//! ### 统计与报告 ✅
//!
//! 在选定切片区间上计算 CSA 的均值 / 样本标准差 / 极值, 以及分割总体积.
//! 结果以带 `#` 头部的文本报告输出, 逐层 CSA 可无损往返解析.
//!
//! 实现位于 `cord-berry/src/{metrics, report}`.
//!
//! ### 流水线编排 ✅
//!
//! 一次性构建的不可变参数结构 + 单一入口函数, 临时目录由 RAII
//! 守卫管理, 在任何退出路径上都会被清理 (除非显式要求保留).
//!
//! 实现位于 `cord-berry/src/pipeline`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 高精度通用索引 / 向量.
type Idx2dF = (f64, f64);

/// 3D 脊髓 MR nii 文件基础数据结构.
mod data;

pub use data::{LevelVolume, SegSlice, SegSliceMut, SegVolume, VolumeAttr};

pub mod consts;

mod error;

pub use error::{PipelineError, PipelineResult};

pub mod fitting;

pub mod centerline;

pub mod csa;

pub mod levels;

pub mod metrics;

pub mod report;

pub mod pipeline;

pub mod prelude;

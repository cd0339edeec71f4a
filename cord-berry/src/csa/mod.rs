//! 逐层横截面积 (CSA) 估计.
//!
//! 水平切片的前景像素面积会因脊髓相对 z 轴倾斜而被高估,
//! 因此逐层以中心线切向量与 z 轴夹角的余弦进行校正:
//!
//! ```text
//! csa(z) = 前景值和(z) * 像素面积 * cos(夹角(z))
//! ```
//!
//! 前景值直接求和 (而非计数), 以便保留部分容积效应的小数分割值.

use cfg_if::cfg_if;
use ndarray::{Array3, Axis};

use crate::centerline::FittedCenterline;
use crate::error::record_warning;
use crate::fitting::{smooth, WindowKind};
use crate::{SegSliceMut, SegVolume, VolumeAttr};

/// 中心线空洞层 (无切向量可用) 的 CSA 处理策略.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TangentPolicy {
    /// 跳过该层: CSA 记为 NaN, 不参与统计 (默认行为).
    SkipSlice,

    /// 假设该层与 z 轴对齐 (余弦取 1), 不做倾角校正.
    AxisAligned,
}

impl Default for TangentPolicy {
    #[inline]
    fn default() -> Self {
        Self::SkipSlice
    }
}

/// 逐层 CSA 序列, 以平方毫米为单位.
///
/// 序列覆盖中心线 z 区间 `[min_z, max_z]` 内的每一层
/// (长度恒为 `max_z - min_z + 1`), 空洞层的值为 NaN.
#[derive(Debug, Clone)]
pub struct CsaArray {
    min_z: usize,
    values: Vec<f64>,
}

impl CsaArray {
    /// 沿拟合中心线逐层计算倾角校正后的 CSA.
    pub fn compute(
        seg: &SegVolume,
        centerline: &FittedCenterline,
        policy: TangentPolicy,
        warnings: &mut Vec<String>,
    ) -> Self {
        debug_assert!(!centerline.is_empty());
        let (min_z, max_z) = {
            let z = centerline.z();
            (z[0], z[z.len() - 1])
        };
        let pixel_mm2 = seg.slice_pixel_mm2();

        let per_slice = |iz: usize| -> f64 {
            let cos = match centerline.index_of(iz) {
                Some(i) => centerline.cos_tilt(i),
                None => match policy {
                    TangentPolicy::SkipSlice => return f64::NAN,
                    TangentPolicy::AxisAligned => 1.0,
                },
            };
            seg.slice_at(iz).value_sum() * pixel_mm2 * cos
        };

        cfg_if! {
            if #[cfg(feature = "rayon")] {
                use rayon::prelude::*;
                let values: Vec<f64> = (min_z..=max_z).into_par_iter().map(per_slice).collect();
            } else {
                let values: Vec<f64> = (min_z..=max_z).map(per_slice).collect();
            }
        }

        let missing = (min_z..=max_z)
            .filter(|&iz| centerline.index_of(iz).is_none())
            .count();
        if missing > 0 {
            let effect = match policy {
                TangentPolicy::SkipSlice => "CSA left undefined",
                TangentPolicy::AxisAligned => "assumed axis-aligned",
            };
            record_warning(
                warnings,
                format!("{missing} slice(s) without centerline tangent, {effect}"),
            );
        }

        Self { min_z, values }
    }

    /// 序列起始的 z 索引.
    #[inline]
    pub fn min_z(&self) -> usize {
        self.min_z
    }

    /// 序列末尾的 z 索引 (含).
    #[inline]
    pub fn max_z(&self) -> usize {
        self.min_z + self.values.len() - 1
    }

    /// 逐层 CSA 值, 下标 0 对应 `min_z`.
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// 获取 `z` 层的 CSA. 越界返回 `None`; 界内空洞层返回 `Some(NaN)`.
    #[inline]
    pub fn get(&self, z: usize) -> Option<f64> {
        z.checked_sub(self.min_z).and_then(|i| self.values.get(i)).copied()
    }

    /// 迭代 `(z, csa)` 对, z 升序.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (usize, f64)> + '_ {
        self.values.iter().enumerate().map(|(i, &v)| (self.min_z + i, v))
    }

    /// 沿 z 方向以 Hanning 窗平滑 CSA 序列, 窗的物理长度为 `sigma_mm` 毫米.
    /// 平滑前空洞层 (NaN) 以相邻有效值线性填充, 平滑后复原为 NaN.
    ///
    /// `sigma_mm` 换算后不足 2 个切片时不做任何处理.
    pub fn smooth_mm(&mut self, sigma_mm: f64, z_mm: f64) {
        assert!(z_mm > 0.0, "层厚必须为正");
        let len = (sigma_mm / z_mm).round() as usize;
        if len < 2 {
            return;
        }

        let nan_mask: Vec<bool> = self.values.iter().map(|v| v.is_nan()).collect();
        let filled = fill_nan_linear(&self.values);
        let (smoothed, _) = smooth(&filled, WindowKind::Hanning, len);
        for (slot, (v, &was_nan)) in self
            .values
            .iter_mut()
            .zip(smoothed.into_iter().zip(&nan_mask))
        {
            *slot = if was_nan { f64::NAN } else { v };
        }
    }
}

/// 将序列中的 NaN 以最近的有效邻值线性插值填充; 两端的 NaN 取最近有效值.
///
/// 全 NaN 序列原样返回.
fn fill_nan_linear(values: &[f64]) -> Vec<f64> {
    let valid: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_nan()).collect();
    if valid.is_empty() {
        return values.to_vec();
    }

    let mut out = values.to_vec();
    for i in 0..out.len() {
        if !out[i].is_nan() {
            continue;
        }
        // 有效下标中第一个大于 i 的位置.
        let pos = valid.partition_point(|&j| j < i);
        out[i] = match (pos.checked_sub(1).map(|p| valid[p]), valid.get(pos).copied()) {
            (Some(lo), Some(hi)) => {
                let t = (i - lo) as f64 / (hi - lo) as f64;
                values[lo] + (values[hi] - values[lo]) * t
            }
            (Some(lo), None) => values[lo],
            (None, Some(hi)) => values[hi],
            (None, None) => unreachable!(),
        };
    }
    out
}

/// 生成 CSA 标注体: 与 `seg` 同形状的 `f32` 体, 前景体素取所在层的 CSA 值.
///
/// 空洞层的前景保持 0, 便于在查看器中直接辨认.
pub fn csa_volume(seg: &SegVolume, csa: &CsaArray) -> Array3<f32> {
    let mut out = Array3::<f32>::zeros(seg.shape());
    for (z, value) in csa.iter() {
        if value.is_nan() {
            continue;
        }
        let src = seg.slice_at(z);
        SegSliceMut::new(out.index_axis_mut(Axis(0), z)).copy_foreground_from(&src, value as f32);
    }
    out
}

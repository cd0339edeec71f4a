//! 分析范围内的统计量汇总.

use ordered_float::NotNan;

use crate::csa::CsaArray;
use crate::levels::SliceRange;
use crate::{SegVolume, VolumeAttr};

/// CSA 序列在分析范围内的描述统计. 空洞层 (NaN) 不参与统计.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CsaStats {
    /// 均值, 平方毫米.
    pub mean: f64,

    /// 样本标准差 (除以 N-1). 只有一个样本时取 0.
    pub std: f64,

    /// 最小值, 平方毫米.
    pub min: f64,

    /// 最大值, 平方毫米.
    pub max: f64,

    /// 参与统计的切片数.
    pub count: usize,
}

impl CsaStats {
    /// 对 `range` 内的有效 CSA 值做统计. 范围内没有有效值时返回 `None`.
    pub fn from_csa(csa: &CsaArray, range: &SliceRange) -> Option<Self> {
        // NaN 已滤除, NotNan 包装不会失败.
        let valid: Vec<NotNan<f64>> = csa
            .iter()
            .filter(|(z, v)| range.contains(*z) && !v.is_nan())
            .map(|(_, v)| NotNan::new(v).unwrap())
            .collect();
        if valid.is_empty() {
            return None;
        }

        let count = valid.len();
        let mean = valid.iter().map(|v| v.into_inner()).sum::<f64>() / count as f64;
        let std = if count > 1 {
            let ss: f64 = valid
                .iter()
                .map(|v| {
                    let d = v.into_inner() - mean;
                    d * d
                })
                .sum();
            (ss / (count - 1) as f64).sqrt()
        } else {
            0.0
        };

        Some(Self {
            mean,
            std,
            min: valid.iter().min().unwrap().into_inner(),
            max: valid.iter().max().unwrap().into_inner(),
            count,
        })
    }
}

/// 计算 `range` 内分割的物理体积, 以立方毫米为单位.
/// 体素按分割值加权求和, 以保留部分容积效应.
pub fn cord_volume_mm3(seg: &SegVolume, range: &SliceRange) -> f64 {
    let hi = range.hi().min(seg.len_z().saturating_sub(1));
    let sum: f64 = (range.lo()..=hi)
        .map(|z| seg.slice_at(z).value_sum())
        .sum();
    sum * seg.voxel_mm3()
}

#[cfg(test)]
mod tests {
    use super::{cord_volume_mm3, CsaStats};
    use crate::centerline::{CenterlineSamples, FittedCenterline, GapPolicy};
    use crate::csa::{CsaArray, TangentPolicy};
    use crate::fitting::{CurveType, WindowKind};
    use crate::levels::SliceRange;
    use crate::SegVolume;
    use ndarray::Array3;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn column(nz: usize, per_slice: &[f32]) -> SegVolume {
        let mut data = Array3::<f32>::zeros((nz, 8, 8));
        for z in 0..nz {
            for (k, &v) in per_slice.iter().enumerate() {
                data[(z, 4, 3 + k)] = v;
            }
        }
        SegVolume::from_parts(data, [1.0, 1.0, 1.0])
    }

    fn compute_csa(seg: &SegVolume) -> CsaArray {
        let mut warnings = Vec::new();
        let samples = CenterlineSamples::extract(seg, GapPolicy::Warn, &mut warnings).unwrap();
        let fit = FittedCenterline::fit(
            &samples,
            CurveType::Window {
                kind: WindowKind::Flat,
                len: 1,
            },
            &mut warnings,
        )
        .unwrap();
        CsaArray::compute(seg, &fit, TangentPolicy::SkipSlice, &mut warnings)
    }

    /// 常数序列: 均值与极值相等, 标准差为 0.
    #[test]
    fn test_constant_stats() {
        let seg = column(10, &[1.0, 1.0, 1.0]);
        let csa = compute_csa(&seg);
        let stats = CsaStats::from_csa(&csa, &SliceRange::new(0, 9).unwrap()).unwrap();
        assert_eq!(stats.count, 10);
        assert!(f64_eq(stats.mean, 3.0));
        assert!(f64_eq(stats.std, 0.0));
        assert!(f64_eq(stats.min, 3.0));
        assert!(f64_eq(stats.max, 3.0));
    }

    /// 手工构造的序列核对各统计量; 范围把序列截断.
    #[test]
    fn test_stats_against_hand_values() {
        let mut data = Array3::<f32>::zeros((4, 8, 8));
        // 逐层前景像素个数: 2, 4, 6, 8. 前景段以固定列为中心对称延伸,
        // 保证各层质心一致, 中心线垂直, 倾角校正系数为 1.
        for z in 0..4 {
            for k in 0..(2 * (z + 1)) {
                data[(z, 4, 3 - z + k)] = 1.0;
            }
        }
        let seg = SegVolume::from_parts(data, [1.0, 1.0, 1.0]);
        let csa = compute_csa(&seg);

        let all = CsaStats::from_csa(&csa, &SliceRange::new(0, 3).unwrap()).unwrap();
        assert_eq!(all.count, 4);
        assert!(f64_eq(all.mean, 5.0));
        // 样本方差 = ((-3)^2 + (-1)^2 + 1 + 9) / 3.
        assert!(f64_eq(all.std, (20.0f64 / 3.0).sqrt()));
        assert!(f64_eq(all.min, 2.0));
        assert!(f64_eq(all.max, 8.0));

        let head = CsaStats::from_csa(&csa, &SliceRange::new(0, 1).unwrap()).unwrap();
        assert_eq!(head.count, 2);
        assert!(f64_eq(head.mean, 3.0));

        let single = CsaStats::from_csa(&csa, &SliceRange::new(2, 2).unwrap()).unwrap();
        assert_eq!(single.count, 1);
        assert!(f64_eq(single.std, 0.0));
    }

    /// 范围不含任何有效值时无统计.
    #[test]
    fn test_empty_range() {
        let seg = column(6, &[1.0]);
        let csa = compute_csa(&seg);
        assert!(CsaStats::from_csa(&csa, &SliceRange::new(50, 60).unwrap()).is_none());
    }

    /// 体积 = 分割值总和 * 体素体积, 且尊重部分容积效应.
    #[test]
    fn test_cord_volume() {
        let seg = column(10, &[1.0, 0.5]);
        let full = cord_volume_mm3(&seg, &SliceRange::new(0, 9).unwrap());
        assert!(f64_eq(full, 15.0));

        let half = cord_volume_mm3(&seg, &SliceRange::new(0, 4).unwrap());
        assert!(f64_eq(half, 7.5));

        // 范围超出体数据时只累计实际存在的层.
        let over = cord_volume_mm3(&seg, &SliceRange::new(5, 99).unwrap());
        assert!(f64_eq(over, 7.5));

        // 各向异性体素.
        let mut data = Array3::<f32>::zeros((2, 4, 4));
        data[(0, 1, 1)] = 1.0;
        data[(1, 1, 1)] = 1.0;
        let aniso = SegVolume::from_parts(data, [2.0, 0.5, 0.5]);
        assert!(f64_eq(
            cord_volume_mm3(&aniso, &SliceRange::new(0, 1).unwrap()),
            1.0
        ));
    }
}

//! 脊髓中心线提取、平滑与派生量.
//!
//! 逐层提取分割前景质心得到离散样本, 再按配置的拟合策略得到
//! 连续的平滑曲线及其一阶导数. 导数用于估计切片倾角 (见 [`crate::csa`]).

use itertools::izip;
use ndarray::Array3;

use crate::error::record_warning;
use crate::fitting::{gradient, smooth, CurveType, SplineFit};
use crate::{PipelineError, PipelineResult, SegVolume, VolumeAttr};

/// 分割 z 方向空洞的处理策略.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GapPolicy {
    /// 记录警告并继续 (默认行为).
    Warn,

    /// 空洞长度超过 `tolerance` 个切片时报错.
    Strict {
        /// 可容忍的最大连续空切片数.
        tolerance: usize,
    },
}

impl Default for GapPolicy {
    #[inline]
    fn default() -> Self {
        Self::Warn
    }
}

/// 中心线离散样本. 每个含前景的切片贡献一个样本:
/// 其 z 索引与前景质心坐标 `(h, w)`.
#[derive(Debug, Clone)]
pub struct CenterlineSamples {
    z: Vec<usize>,
    h: Vec<f64>,
    w: Vec<f64>,
}

impl CenterlineSamples {
    /// 从分割中提取中心线样本.
    ///
    /// `[min_z, max_z]` 内不含前景的切片构成空洞, 每段空洞都会记录一条警告;
    /// 在 [`GapPolicy::Strict`] 下, 超出容忍长度的空洞会返回
    /// [`PipelineError::DiscontinuousSegmentation`].
    /// 样本数不足 2 时返回 [`PipelineError::InsufficientData`].
    pub fn extract(
        seg: &SegVolume,
        policy: GapPolicy,
        warnings: &mut Vec<String>,
    ) -> PipelineResult<Self> {
        let mut z = Vec::new();
        let mut h = Vec::new();
        let mut w = Vec::new();
        for (iz, sli) in seg.slice_iter().enumerate() {
            if let Some((ch, cw)) = sli.centroid() {
                z.push(iz);
                h.push(ch);
                w.push(cw);
            }
        }

        if z.len() < 2 {
            return Err(PipelineError::InsufficientData(z.len()));
        }

        for (&prev, &next) in izip!(&z, &z[1..]) {
            let run = next - prev - 1;
            if run == 0 {
                continue;
            }
            let start = prev + 1;
            record_warning(
                warnings,
                format!(
                    "segmentation not continuous: {run} empty slice(s) starting at z={start}; \
                     estimations near the gap may be wrong"
                ),
            );
            if let GapPolicy::Strict { tolerance } = policy {
                if run > tolerance {
                    return Err(PipelineError::DiscontinuousSegmentation { z: start, run });
                }
            }
        }

        Ok(Self { z, h, w })
    }

    /// 样本个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.z.len()
    }

    /// 是否没有样本.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    /// 样本覆盖的 z 区间 `(min_z, max_z)`.
    ///
    /// 样本为空时 panic.
    #[inline]
    pub fn z_range(&self) -> (usize, usize) {
        (*self.z.first().unwrap(), *self.z.last().unwrap())
    }

    /// 各样本的 z 索引, 严格递增 (空洞处不连续).
    #[inline]
    pub fn z(&self) -> &[usize] {
        &self.z
    }
}

/// 拟合后的中心线: 平滑的 `(h, w)` 坐标及其对 z 的一阶导数,
/// 与输入样本共享同一 z 索引集合.
#[derive(Debug, Clone)]
pub struct FittedCenterline {
    z: Vec<usize>,
    h: Vec<f64>,
    w: Vec<f64>,
    dh: Vec<f64>,
    dw: Vec<f64>,
}

impl FittedCenterline {
    /// 按 `curve` 策略拟合中心线样本.
    ///
    /// 窗平滑模式下, 序列短于配置窗长时窗会自动收缩并记录警告.
    /// 样条模式下, 抽取的节点少于 3 个时返回
    /// [`PipelineError::InsufficientData`].
    pub fn fit(
        samples: &CenterlineSamples,
        curve: CurveType,
        warnings: &mut Vec<String>,
    ) -> PipelineResult<Self> {
        debug_assert!(samples.len() >= 2);
        match curve {
            CurveType::Window { kind, len } => {
                let (h, used_h) = smooth(&samples.h, kind, len);
                let (w, _) = smooth(&samples.w, kind, len);
                if used_h < len && len <= samples.len() {
                    // min(len, n) 为偶数时窗长只会缩 1, 也一并提示.
                    record_warning(
                        warnings,
                        format!("smoothing window shortened from {len} to {used_h} samples"),
                    );
                } else if len > samples.len() {
                    record_warning(
                        warnings,
                        format!(
                            "smoothing window ({len}) longer than centerline ({}), \
                             shortened to {used_h} samples",
                            samples.len()
                        ),
                    );
                }
                let dh = gradient(&h);
                let dw = gradient(&w);
                Ok(Self {
                    z: samples.z.clone(),
                    h,
                    w,
                    dh,
                    dw,
                })
            }
            CurveType::CubicSpline { samples_per_knot } => {
                let knots = Self::knot_indices(samples.len(), samples_per_knot);
                if knots.len() < 3 {
                    return Err(PipelineError::InsufficientData(samples.len()));
                }
                let kx: Vec<f64> = knots.iter().map(|&i| samples.z[i] as f64).collect();
                let kh: Vec<f64> = knots.iter().map(|&i| samples.h[i]).collect();
                let kw: Vec<f64> = knots.iter().map(|&i| samples.w[i]).collect();

                let sp_h = SplineFit::new(&kx, &kh);
                let sp_w = SplineFit::new(&kx, &kw);

                let mut fitted = Self {
                    z: samples.z.clone(),
                    h: Vec::with_capacity(samples.len()),
                    w: Vec::with_capacity(samples.len()),
                    dh: Vec::with_capacity(samples.len()),
                    dw: Vec::with_capacity(samples.len()),
                };
                for &iz in &samples.z {
                    let t = iz as f64;
                    fitted.h.push(sp_h.eval(t));
                    fitted.w.push(sp_w.eval(t));
                    fitted.dh.push(sp_h.deriv(t));
                    fitted.dw.push(sp_w.deriv(t));
                }
                Ok(fitted)
            }
        }
    }

    /// 抽取样条节点的样本下标: 每 `samples_per_knot` 个样本取一个, 两端必取.
    fn knot_indices(len: usize, samples_per_knot: u32) -> Vec<usize> {
        assert_ne!(samples_per_knot, 0, "节点覆盖的样本数必须为正");
        let mut idx: Vec<usize> = (0..len).step_by(samples_per_knot as usize).collect();
        if *idx.last().unwrap() != len - 1 {
            idx.push(len - 1);
        }
        idx
    }

    /// 样本个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.z.len()
    }

    /// 是否没有样本.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    /// 各样本的 z 索引.
    #[inline]
    pub fn z(&self) -> &[usize] {
        &self.z
    }

    /// 拟合后的 h 坐标序列.
    #[inline]
    pub fn h(&self) -> &[f64] {
        &self.h
    }

    /// 拟合后的 w 坐标序列.
    #[inline]
    pub fn w(&self) -> &[f64] {
        &self.w
    }

    /// 查找 z 索引对应的样本下标. 该 z 上没有样本 (空洞) 时返回 `None`.
    #[inline]
    pub fn index_of(&self, z: usize) -> Option<usize> {
        self.z.binary_search(&z).ok()
    }

    /// 第 `i` 个样本处的归一化切向量 `[dh, dw, dz] / 模长`.
    /// `dz` 恒为 1 (以切片为单位参数化).
    pub fn tangent(&self, i: usize) -> [f64; 3] {
        let (dh, dw) = (self.dh[i], self.dw[i]);
        let norm = (dh * dh + dw * dw + 1.0).sqrt();
        [dh / norm, dw / norm, 1.0 / norm]
    }

    /// 第 `i` 个样本处切向量与 z 轴夹角的余弦, 已夹取到 `[0, 1]`.
    #[inline]
    pub fn cos_tilt(&self, i: usize) -> f64 {
        self.tangent(i)[2].clamp(0.0, 1.0)
    }

    /// 按体素分辨率 `[z, h, w]` (毫米) 计算拟合中心线的物理长度 (毫米).
    pub fn length_mm(&self, pix_dim: [f64; 3]) -> f64 {
        let [pz, ph, pw] = pix_dim;
        izip!(
            self.z.windows(2),
            self.h.windows(2),
            self.w.windows(2)
        )
        .map(|(z2, h2, w2)| {
            let dz = (z2[1] - z2[0]) as f64 * pz;
            let dh = (h2[1] - h2[0]) * ph;
            let dw = (w2[1] - w2[0]) * pw;
            (dz * dz + dh * dh + dw * dw).sqrt()
        })
        .sum()
    }

    /// 生成中心线体数据: 与 `seg` 同形状的 `u8` 体, 拟合点四舍五入处取 1.
    ///
    /// 拟合点越界 (通常意味着分割有空洞或带杂散标记) 时跳过该层并记录警告.
    pub fn to_volume(&self, seg: &SegVolume, warnings: &mut Vec<String>) -> Array3<u8> {
        let shape = seg.shape();
        let mut out = Array3::<u8>::zeros(shape);
        for (&iz, &fh, &fw) in izip!(&self.z, &self.h, &self.w) {
            let (rh, rw) = (fh.round(), fw.round());
            if rh < 0.0 || rw < 0.0 {
                record_warning(warnings, format!("fitted centerline out of bounds at z={iz}"));
                continue;
            }
            let pos = (iz, rh as usize, rw as usize);
            if seg.check(&pos) {
                out[pos] = 1;
            } else {
                record_warning(warnings, format!("fitted centerline out of bounds at z={iz}"));
            }
        }
        out
    }
}

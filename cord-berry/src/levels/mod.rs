//! 椎体层级标注与切片区间解析.
//!
//! 分析范围有两种写法: 直接给出 z 切片区间, 或给出椎体层级区间
//! (如 C2 到 C5 写作 `2:5`), 后者需要沿中心线查询层级标注体来换算.

use std::fmt;
use std::str::FromStr;

use itertools::izip;

use crate::centerline::FittedCenterline;
use crate::error::record_warning;
use crate::{LevelVolume, PipelineError, PipelineResult};

/// 解析 `"a:b"` 或单值 `"n"` 的闭区间写法.
fn parse_pair<T: FromStr + Copy>(s: &str) -> Option<(T, T)> {
    match s.split_once(':') {
        Some((a, b)) => {
            let lo = a.trim().parse().ok()?;
            let hi = b.trim().parse().ok()?;
            Some((lo, hi))
        }
        None => {
            let v: T = s.trim().parse().ok()?;
            Some((v, v))
        }
    }
}

/// z 切片闭区间 `[lo, hi]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SliceRange {
    lo: usize,
    hi: usize,
}

impl SliceRange {
    /// 构造闭区间. 起点大于终点时返回 [`PipelineError::InvalidRange`].
    pub fn new(lo: usize, hi: usize) -> PipelineResult<Self> {
        if lo > hi {
            return Err(PipelineError::InvalidRange(format!("{lo}:{hi}")));
        }
        Ok(Self { lo, hi })
    }

    /// 区间起点.
    #[inline]
    pub fn lo(&self) -> usize {
        self.lo
    }

    /// 区间终点 (含).
    #[inline]
    pub fn hi(&self) -> usize {
        self.hi
    }

    /// `z` 是否落在区间内?
    #[inline]
    pub fn contains(&self, z: usize) -> bool {
        self.lo <= z && z <= self.hi
    }

    /// 与另一区间求交. 不相交时返回 `None`.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let lo = self.lo.max(other.lo);
        let hi = self.hi.min(other.hi);
        (lo <= hi).then_some(Self { lo, hi })
    }
}

impl FromStr for SliceRange {
    type Err = PipelineError;

    /// 接受 `"a:b"` 或单值 `"n"` (等价于 `"n:n"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lo, hi) =
            parse_pair(s).ok_or_else(|| PipelineError::InvalidRange(s.to_owned()))?;
        Self::new(lo, hi)
    }
}

impl fmt::Display for SliceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lo, self.hi)
    }
}

/// 椎体层级闭区间 `[lo, hi]`, 编号与标注体一致 (1 起).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LevelRange {
    lo: u8,
    hi: u8,
}

impl LevelRange {
    /// 构造闭区间. 起点大于终点或含 0 时返回 [`PipelineError::InvalidRange`].
    pub fn new(lo: u8, hi: u8) -> PipelineResult<Self> {
        if lo > hi || lo == 0 {
            return Err(PipelineError::InvalidRange(format!("{lo}:{hi}")));
        }
        Ok(Self { lo, hi })
    }

    /// 区间起点 (头侧, 编号较小).
    #[inline]
    pub fn lo(&self) -> u8 {
        self.lo
    }

    /// 区间终点 (含, 尾侧).
    #[inline]
    pub fn hi(&self) -> u8 {
        self.hi
    }

    /// 层级编号是否在区间内?
    #[inline]
    pub fn contains(&self, code: u8) -> bool {
        self.lo <= code && code <= self.hi
    }
}

impl FromStr for LevelRange {
    type Err = PipelineError;

    /// 接受 `"a:b"` 或单值 `"n"` (等价于 `"n:n"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lo, hi) =
            parse_pair(s).ok_or_else(|| PipelineError::InvalidRange(s.to_owned()))?;
        Self::new(lo, hi)
    }
}

impl fmt::Display for LevelRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lo, self.hi)
    }
}

/// 中心线样本到椎体层级的映射: 在每个样本的整数化位置上查询标注体.
#[derive(Debug, Clone)]
pub struct LevelMap {
    z: Vec<usize>,
    level: Vec<u8>,
    available: Vec<u8>,
}

impl LevelMap {
    /// 沿拟合中心线查询层级标注.
    ///
    /// 标注体中没有任何非零层级, 或中心线没有经过任何标注体素时,
    /// 返回 [`PipelineError::MissingLabelingData`].
    pub fn from_labeling(
        labeling: &LevelVolume,
        centerline: &FittedCenterline,
    ) -> PipelineResult<Self> {
        if labeling.available_levels().is_empty() {
            return Err(PipelineError::MissingLabelingData);
        }

        let mut z = Vec::with_capacity(centerline.len());
        let mut level = Vec::with_capacity(centerline.len());
        for (&iz, &fh, &fw) in izip!(centerline.z(), centerline.h(), centerline.w()) {
            let (rh, rw) = (fh.round(), fw.round());
            if rh < 0.0 || rw < 0.0 {
                continue;
            }
            // 越界位置视作未标注.
            let code = labeling.get((iz, rh as usize, rw as usize)).unwrap_or(0);
            z.push(iz);
            level.push(code);
        }

        let mut available: Vec<u8> = level.iter().copied().filter(|&c| c != 0).collect();
        available.sort_unstable();
        available.dedup();
        if available.is_empty() {
            return Err(PipelineError::MissingLabelingData);
        }

        Ok(Self { z, level, available })
    }

    /// 中心线实际经过的层级编号, 升序且去重.
    #[inline]
    pub fn available(&self) -> &[u8] {
        &self.available
    }

    /// 查询 `z` 层中心线位置上的层级编号. 未标注或无样本时返回 `None`.
    pub fn level_at(&self, z: usize) -> Option<u8> {
        let i = self.z.binary_search(&z).ok()?;
        let code = self.level[i];
        (code != 0).then_some(code)
    }

    /// 将请求的层级区间换算成 z 切片区间.
    ///
    /// 端点超出可用层级时夹取到边界, 端点缺标时吸附到最近的可用层级
    /// (等距时偏向区间内侧), 两种修正都会记录警告.
    /// 换算后没有任何切片落入区间时返回 [`PipelineError::EmptyLevelRange`].
    /// 返回修正后的层级区间与覆盖的切片区间.
    pub fn resolve(
        &self,
        requested: LevelRange,
        warnings: &mut Vec<String>,
    ) -> PipelineResult<(LevelRange, SliceRange)> {
        let lo = self.resolve_endpoint(requested.lo, true, warnings);
        let hi = self.resolve_endpoint(requested.hi, false, warnings);
        if lo > hi {
            return Err(PipelineError::EmptyLevelRange);
        }
        let resolved = LevelRange { lo, hi };

        let covered: Vec<usize> = izip!(&self.z, &self.level)
            .filter(|(_, &code)| resolved.contains(code))
            .map(|(&z, _)| z)
            .collect();
        match (covered.first(), covered.last()) {
            (Some(&min_z), Some(&max_z)) => Ok((resolved, SliceRange { lo: min_z, hi: max_z })),
            _ => Err(PipelineError::EmptyLevelRange),
        }
    }

    /// 把单个层级端点修正到可用层级上. `is_lo` 指明这是区间的哪一端,
    /// 用于决定等距吸附的方向 (偏向区间内侧).
    fn resolve_endpoint(&self, code: u8, is_lo: bool, warnings: &mut Vec<String>) -> u8 {
        debug_assert!(!self.available.is_empty());
        let (min, max) = (self.available[0], *self.available.last().unwrap());
        if code < min {
            record_warning(
                warnings,
                format!("vertebral level {code} not covered, clamped to {min}"),
            );
            return min;
        }
        if code > max {
            record_warning(
                warnings,
                format!("vertebral level {code} not covered, clamped to {max}"),
            );
            return max;
        }
        if self.available.binary_search(&code).is_ok() {
            return code;
        }

        // 在可用层级中吸附到最近者, 等距时偏向区间内侧.
        let snapped = self
            .available
            .iter()
            .copied()
            .min_by_key(|&c| {
                let dist = code.abs_diff(c) as u16 * 2;
                // 内侧候选在等距时胜出.
                let interior = if is_lo { c > code } else { c < code };
                dist + u16::from(!interior)
            })
            .unwrap();
        record_warning(
            warnings,
            format!("vertebral level {code} absent from labeling, snapped to {snapped}"),
        );
        snapped
    }
}

#[cfg(test)]
mod tests {
    use super::{LevelMap, LevelRange, SliceRange};
    use crate::centerline::{CenterlineSamples, FittedCenterline, GapPolicy};
    use crate::fitting::{CurveType, WindowKind};
    use crate::{LevelVolume, PipelineError, SegVolume};
    use ndarray::Array3;

    /// 竖直中心线 + 沿 z 分段的层级标注.
    /// `bands` 的每个元素 `(code, z_lo, z_hi)` 是一段闭区间标注.
    fn build(nz: usize, bands: &[(u8, usize, usize)]) -> (FittedCenterline, LevelVolume) {
        let mut seg = Array3::<f32>::zeros((nz, 8, 8));
        let mut lab = Array3::<u8>::zeros((nz, 8, 8));
        for z in 0..nz {
            seg[(z, 4, 4)] = 1.0;
        }
        for &(code, z_lo, z_hi) in bands {
            for z in z_lo..=z_hi {
                lab[(z, 4, 4)] = code;
            }
        }
        let seg = SegVolume::from_parts(seg, [1.0, 1.0, 1.0]);
        let lab = LevelVolume::from_parts(lab, [1.0, 1.0, 1.0]);

        let mut warnings = Vec::new();
        let samples = CenterlineSamples::extract(&seg, GapPolicy::Warn, &mut warnings).unwrap();
        let fit = FittedCenterline::fit(
            &samples,
            CurveType::Window {
                kind: WindowKind::Flat,
                len: 1,
            },
            &mut warnings,
        )
        .unwrap();
        (fit, lab)
    }

    /// 区间字符串解析.
    #[test]
    fn test_range_parsing() {
        assert_eq!("5:23".parse::<SliceRange>().unwrap(), SliceRange::new(5, 23).unwrap());
        assert_eq!("7".parse::<SliceRange>().unwrap(), SliceRange::new(7, 7).unwrap());
        assert_eq!(" 2 : 5 ".parse::<LevelRange>().unwrap(), LevelRange::new(2, 5).unwrap());

        assert!(matches!(
            "9:3".parse::<SliceRange>(),
            Err(PipelineError::InvalidRange(_))
        ));
        assert!(matches!(
            "abc".parse::<SliceRange>(),
            Err(PipelineError::InvalidRange(_))
        ));
        assert!(matches!(
            "0:3".parse::<LevelRange>(),
            Err(PipelineError::InvalidRange(_))
        ));
        assert_eq!(LevelRange::new(2, 5).unwrap().to_string(), "2:5");
    }

    /// 区间交集与包含.
    #[test]
    fn test_slice_range_ops() {
        let a = SliceRange::new(3, 10).unwrap();
        let b = SliceRange::new(8, 20).unwrap();
        assert_eq!(a.intersect(&b), Some(SliceRange::new(8, 10).unwrap()));
        assert_eq!(a.intersect(&SliceRange::new(11, 12).unwrap()), None);
        assert!(a.contains(3) && a.contains(10) && !a.contains(11));
    }

    /// 精确命中的层级区间直接换算为切片区间.
    #[test]
    fn test_resolve_exact() {
        let (fit, lab) = build(30, &[(2, 0, 9), (3, 10, 19), (4, 20, 29)]);
        let map = LevelMap::from_labeling(&lab, &fit).unwrap();
        assert_eq!(map.available(), &[2, 3, 4]);
        assert_eq!(map.level_at(15), Some(3));

        let mut warnings = Vec::new();
        let (levels, slices) = map
            .resolve(LevelRange::new(3, 4).unwrap(), &mut warnings)
            .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(levels, LevelRange::new(3, 4).unwrap());
        assert_eq!(slices, SliceRange::new(10, 29).unwrap());
    }

    /// 超界端点夹取到可用范围, 每端一条警告.
    #[test]
    fn test_resolve_clamp() {
        let (fit, lab) = build(30, &[(3, 0, 14), (4, 15, 29)]);
        let map = LevelMap::from_labeling(&lab, &fit).unwrap();

        let mut warnings = Vec::new();
        let (levels, slices) = map
            .resolve(LevelRange::new(1, 20).unwrap(), &mut warnings)
            .unwrap();
        assert_eq!(levels, LevelRange::new(3, 4).unwrap());
        assert_eq!(slices, SliceRange::new(0, 29).unwrap());
        assert_eq!(warnings.len(), 2);

        // 夹取是幂等的: 再解析一次修正后的区间没有新警告.
        let mut again = Vec::new();
        let (levels2, _) = map.resolve(levels, &mut again).unwrap();
        assert_eq!(levels2, levels);
        assert!(again.is_empty());
    }

    /// 缺标层级吸附到最近可用层级, 等距时偏向区间内侧.
    #[test]
    fn test_resolve_snap() {
        let (fit, lab) = build(40, &[(2, 0, 9), (4, 10, 19), (6, 20, 29), (8, 30, 39)]);
        let map = LevelMap::from_labeling(&lab, &fit).unwrap();

        // 3 与 2/4 等距: 作为起点吸附向内侧 (4), 作为终点吸附向内侧 (2).
        let mut warnings = Vec::new();
        let (levels, _) = map
            .resolve(LevelRange::new(3, 7).unwrap(), &mut warnings)
            .unwrap();
        assert_eq!(levels, LevelRange::new(4, 6).unwrap());
        assert_eq!(warnings.len(), 2);

        // 非等距时吸附到更近者: 5 距 4 比距 6 近? 等距, 内侧优先已验;
        // 用 7 作单端检验: 7 距 6 与 8 等距, 作为起点取 8.
        let mut w2 = Vec::new();
        let (lv, _) = map.resolve(LevelRange::new(7, 8).unwrap(), &mut w2).unwrap();
        assert_eq!(lv, LevelRange::new(8, 8).unwrap());
    }

    /// 无可用标注与空结果区间的错误路径.
    #[test]
    fn test_resolve_errors() {
        let (fit, lab) = build(10, &[]);
        assert!(matches!(
            LevelMap::from_labeling(&lab, &fit),
            Err(PipelineError::MissingLabelingData)
        ));

        let (fit, lab) = build(20, &[(2, 0, 4), (8, 15, 19)]);
        let map = LevelMap::from_labeling(&lab, &fit).unwrap();
        // 5 与 2/8 等距: 起点向内吸附到 8, 终点向内吸附到 2, 区间翻转为空.
        let err = map
            .resolve(LevelRange::new(5, 5).unwrap(), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyLevelRange));
    }
}

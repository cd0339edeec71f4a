//! 流水线编排: 从分割体到 CSA 报告的端到端流程.
//!
//! [`process`] 串联中心线提取、拟合、CSA 计算、范围解析与统计;
//! [`export`] 把结果落盘为文本报告与派生 nii 体;
//! [`TmpWorkspace`] 提供自动清理的临时工作目录.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Local;
use either::Either;

use crate::centerline::{CenterlineSamples, FittedCenterline, GapPolicy};
use crate::consts::DEFAULT_CSA_SMOOTHING_MM;
use crate::csa::{csa_volume, CsaArray, TangentPolicy};
use crate::error::record_warning;
use crate::fitting::CurveType;
use crate::levels::{LevelMap, LevelRange, SliceRange};
use crate::metrics::{cord_volume_mm3, CsaStats};
use crate::report::{parse_per_slice, ReportContext};
use crate::{LevelVolume, PipelineError, PipelineResult, SegVolume, VolumeAttr};

/// 一次 CSA 分析的全部参数. 通过链式方法配置, 非法参数在配置时 panic.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    curve: CurveType,
    gap_policy: GapPolicy,
    tangent_policy: TangentPolicy,
    selector: Option<Either<SliceRange, LevelRange>>,
    csa_smoothing_mm: f64,
}

impl Default for ProcessSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSpec {
    /// 默认参数: Hanning 窗平滑中心线, 空洞只警告, 空洞层 CSA 记 NaN,
    /// 分析整条中心线, 不对 CSA 序列做 z 向平滑.
    pub fn new() -> Self {
        Self {
            curve: CurveType::default_window(),
            gap_policy: GapPolicy::Warn,
            tangent_policy: TangentPolicy::SkipSlice,
            selector: None,
            csa_smoothing_mm: DEFAULT_CSA_SMOOTHING_MM,
        }
    }

    /// 指定中心线拟合策略.
    #[inline]
    pub fn with_curve(mut self, curve: CurveType) -> Self {
        match curve {
            CurveType::Window { len, .. } => assert_ne!(len, 0, "窗长必须为正"),
            CurveType::CubicSpline { samples_per_knot } => {
                assert_ne!(samples_per_knot, 0, "节点覆盖的样本数必须为正")
            }
        }
        self.curve = curve;
        self
    }

    /// 改用样条拟合, 节点密度取默认值.
    #[inline]
    pub fn with_default_spline(self) -> Self {
        self.with_curve(CurveType::default_spline())
    }

    /// 指定分割空洞的处理策略.
    #[inline]
    pub fn with_gap_policy(mut self, policy: GapPolicy) -> Self {
        self.gap_policy = policy;
        self
    }

    /// 指定空洞层的 CSA 处理策略.
    #[inline]
    pub fn with_tangent_policy(mut self, policy: TangentPolicy) -> Self {
        self.tangent_policy = policy;
        self
    }

    /// 将分析限制在给定 z 切片区间.
    ///
    /// 与 [`Self::select_levels`] 互斥, 后设置者覆盖前者.
    #[inline]
    pub fn select_slices(mut self, range: SliceRange) -> Self {
        self.selector = Some(Either::Left(range));
        self
    }

    /// 将分析限制在给定椎体层级区间 (需要层级标注体).
    #[inline]
    pub fn select_levels(mut self, range: LevelRange) -> Self {
        self.selector = Some(Either::Right(range));
        self
    }

    /// 对 CSA 序列做 z 向 Hanning 平滑, 窗的物理长度为 `sigma_mm` 毫米.
    /// 必须非负且有限, 取 0 表示关闭.
    #[inline]
    pub fn with_csa_smoothing_mm(mut self, sigma_mm: f64) -> Self {
        assert!(sigma_mm.is_finite() && sigma_mm >= 0.0, "平滑长度必须为非负有限值");
        self.csa_smoothing_mm = sigma_mm;
        self
    }

    /// 人类可读的方法描述, 写入报告头部.
    fn method_string(&self) -> String {
        let base = match self.curve {
            CurveType::Window { kind, len } => {
                format!("counting voxels with tilt correction ({kind:?} window, {len} samples)")
            }
            CurveType::CubicSpline { samples_per_knot } => format!(
                "counting voxels with tilt correction (cubic spline, 1 knot per {samples_per_knot} samples)"
            ),
        };
        if self.csa_smoothing_mm > 0.0 {
            format!("{base}, CSA smoothed over {} mm", self.csa_smoothing_mm)
        } else {
            base
        }
    }
}

/// [`process`] 的输出: 序列、统计量与解析后的分析范围.
#[derive(Debug, Clone)]
pub struct CsaOutcome {
    /// 逐层 CSA 序列 (覆盖整条中心线, 不限于分析范围).
    pub csa: CsaArray,

    /// 分析范围内的 CSA 统计.
    pub stats: CsaStats,

    /// 分析范围内的分割体积, 立方毫米.
    pub volume_mm3: f64,

    /// 整条拟合中心线的物理长度, 毫米.
    pub length_mm: f64,

    /// 拟合后的中心线.
    pub centerline: FittedCenterline,

    /// 解析后的椎体层级区间 (仅按层级选择时存在).
    pub levels: Option<LevelRange>,

    /// 解析后的 z 切片分析范围.
    pub slices: SliceRange,

    /// 流程中积累的全部警告.
    pub warnings: Vec<String>,

    method: String,
}

/// 端到端执行一次 CSA 分析.
///
/// `labeling` 仅在 [`ProcessSpec::select_levels`] 时必要,
/// 缺失时返回 [`PipelineError::MissingLabelingData`].
pub fn process(
    seg: &SegVolume,
    labeling: Option<&LevelVolume>,
    spec: &ProcessSpec,
) -> PipelineResult<CsaOutcome> {
    let mut warnings = Vec::new();

    let samples = CenterlineSamples::extract(seg, spec.gap_policy, &mut warnings)?;
    let centerline = FittedCenterline::fit(&samples, spec.curve, &mut warnings)?;
    let mut csa = CsaArray::compute(seg, &centerline, spec.tangent_policy, &mut warnings);
    if spec.csa_smoothing_mm > 0.0 {
        csa.smooth_mm(spec.csa_smoothing_mm, seg.z_mm());
    }

    let full = SliceRange::new(csa.min_z(), csa.max_z())?;
    let (levels, slices) = match spec.selector {
        None => (None, full),
        Some(Either::Left(requested)) => {
            let clipped = requested.intersect(&full).ok_or_else(|| {
                PipelineError::InvalidRange(format!(
                    "slices {requested} do not overlap segmentation ({full})"
                ))
            })?;
            if clipped != requested {
                record_warning(
                    &mut warnings,
                    format!("slices {requested} clipped to segmentation extent ({clipped})"),
                );
            }
            (None, clipped)
        }
        Some(Either::Right(requested)) => {
            let labeling = labeling.ok_or(PipelineError::MissingLabelingData)?;
            let map = LevelMap::from_labeling(labeling, &centerline)?;
            let (resolved, slices) = map.resolve(requested, &mut warnings)?;
            (Some(resolved), slices)
        }
    };

    let stats =
        CsaStats::from_csa(&csa, &slices).ok_or(PipelineError::InsufficientData(0))?;
    let volume_mm3 = cord_volume_mm3(seg, &slices);
    let length_mm = centerline.length_mm(seg.pix_dim());

    Ok(CsaOutcome {
        csa,
        stats,
        volume_mm3,
        length_mm,
        centerline,
        levels,
        slices,
        warnings,
        method: spec.method_string(),
    })
}

/// 将分析结果落盘. 产出:
///
/// | 文件 | 内容 |
/// | ---- | ---- |
/// | `<前缀>_csa_per_slice.txt` | 范围内逐层 CSA |
/// | `<前缀>_csa_mean.txt` | CSA 均值与标准差 |
/// | `<前缀>_volume.txt` | 分割体积 |
/// | `<前缀>_length.txt` | 中心线长度 |
/// | `<前缀>_csa_image.nii.gz` | 前景取所在层 CSA 的标注体 |
/// | `<前缀>_centerline.txt` | 拟合中心线的逐层坐标 |
/// | `<前缀>_centerline.nii.gz` | 拟合中心线的二值体 |
///
/// 返回全部写出的路径.
pub fn export(
    outcome: &CsaOutcome,
    seg: &SegVolume,
    dir: &Path,
    prefix: &str,
) -> PipelineResult<Vec<PathBuf>> {
    let mut ctx = ReportContext::new(outcome.method.clone(), outcome.levels, outcome.slices);
    ctx.warnings = outcome.warnings.clone();

    let mut written = Vec::with_capacity(7);
    let mut stage = |name: &str| {
        let path = dir.join(format!("{prefix}{name}"));
        written.push(path.clone());
        path
    };

    let per_slice = File::create(stage("_csa_per_slice.txt"))?;
    ctx.write_per_slice(&mut BufWriter::new(per_slice), &outcome.csa)?;

    let mean = File::create(stage("_csa_mean.txt"))?;
    ctx.write_mean_std(&mut BufWriter::new(mean), &outcome.stats)?;

    let volume = File::create(stage("_volume.txt"))?;
    ctx.write_scalar(&mut BufWriter::new(volume), "volume (mm^3)", outcome.volume_mm3)?;

    let length = File::create(stage("_length.txt"))?;
    ctx.write_scalar(
        &mut BufWriter::new(length),
        "centerline length (mm)",
        outcome.length_mm,
    )?;

    seg.save_derived(&csa_volume(seg, &outcome.csa), stage("_csa_image.nii.gz"))?;

    let ctr = File::create(stage("_centerline.txt"))?;
    ctx.write_centerline(&mut BufWriter::new(ctr), &outcome.centerline)?;

    let mut discard = Vec::new();
    let centerline_vol = outcome.centerline.to_volume(seg, &mut discard);
    seg.save_derived(&centerline_vol, stage("_centerline.nii.gz"))?;

    Ok(written)
}

/// 读回 [`export`] 写出的逐层 CSA 文件.
pub fn import_per_slice<P: AsRef<Path>>(path: P) -> PipelineResult<Vec<(usize, f64)>> {
    let file = File::open(path.as_ref())?;
    parse_per_slice(io::BufReader::new(file))
}

/// 自动清理的临时工作目录, 目录名形如 `tmp.240101123000.4242.0`.
///
/// 默认在 drop 时递归删除; 设置 `keep` 后保留, 便于排查中间产物.
#[derive(Debug)]
pub struct TmpWorkspace {
    dir: PathBuf,
    keep: bool,
}

/// 同一进程内区分多个工作目录.
static WORKSPACE_SEQ: AtomicUsize = AtomicUsize::new(0);

impl TmpWorkspace {
    /// 在 `root` (缺省为系统临时目录) 下创建工作目录.
    pub fn create(root: Option<&Path>, keep: bool) -> io::Result<Self> {
        let stamp = Local::now().format("%y%m%d%H%M%S");
        let seq = WORKSPACE_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!("tmp.{stamp}.{}.{seq}", process::id());
        let dir = root
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir)
            .join(name);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, keep })
    }

    /// 工作目录路径.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// 工作目录下的文件路径.
    #[inline]
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// 此后 drop 时保留目录.
    #[inline]
    pub fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for TmpWorkspace {
    fn drop(&mut self) {
        if self.keep {
            log::info!("keeping workspace at {}", self.dir.display());
        } else if let Err(e) = fs::remove_dir_all(&self.dir) {
            // 清理失败不影响计算结果, 只提示.
            log::warn!("failed to remove workspace {}: {e}", self.dir.display());
        }
    }
}

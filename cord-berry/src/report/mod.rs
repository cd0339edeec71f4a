//! 文本结果文件的写出与读回.
//!
//! 输出沿用惯例格式: 以 `#` 开头的头部注释行 (时间、指标、方法、
//! 分析范围与警告), 随后是 `z,值` 的逐层数据行或单个标量值.
//! 数值以 `f64` 的默认格式 (最短可往返表示) 写出, 读回不丢精度.

use std::io::{self, BufRead, Write};

use chrono::{DateTime, Local};
use itertools::izip;

use crate::centerline::FittedCenterline;
use crate::csa::CsaArray;
use crate::levels::{LevelRange, SliceRange};
use crate::metrics::CsaStats;
use crate::{PipelineError, PipelineResult};

/// 头部时间戳的格式.
const STAMP_FORMAT: &str = "%Y/%m/%d - %H:%M:%S";

/// 一次分析的报告上下文, 决定每个输出文件的头部内容.
#[derive(Debug, Clone)]
pub struct ReportContext {
    /// 报告生成时间.
    pub timestamp: DateTime<Local>,

    /// 计算方法的简述, 如 `"counting voxels with tilt correction"`.
    pub method: String,

    /// 分析的椎体层级区间. `None` 表示未按层级选择 (输出 `ALL`).
    pub levels: Option<LevelRange>,

    /// 分析的 z 切片区间.
    pub slices: SliceRange,

    /// 流水线积累的警告, 逐条写入头部.
    pub warnings: Vec<String>,
}

impl ReportContext {
    /// 以当前时间创建报告上下文.
    pub fn new(method: impl Into<String>, levels: Option<LevelRange>, slices: SliceRange) -> Self {
        Self {
            timestamp: Local::now(),
            method: method.into(),
            levels,
            slices,
            warnings: Vec::new(),
        }
    }

    /// 写出头部注释行. `metric` 为该文件承载的指标名.
    fn write_header<W: Write>(&self, w: &mut W, metric: &str) -> io::Result<()> {
        writeln!(w, "# Date - Time: {}", self.timestamp.format(STAMP_FORMAT))?;
        writeln!(w, "# Metric: {metric}")?;
        writeln!(w, "# Calculation method: {}", self.method)?;
        match self.levels {
            Some(r) => writeln!(w, "# Vertebral levels: {} to {}", r.lo(), r.hi())?,
            None => writeln!(w, "# Vertebral levels: ALL")?,
        }
        writeln!(w, "# Slices (z): {}", self.slices)?;
        for warning in &self.warnings {
            writeln!(w, "# WARNING: {warning}")?;
        }
        Ok(())
    }

    /// 写出逐层 CSA 文件: 头部加上范围内每层一行 `z,值`.
    /// 空洞层以 `NaN` 写出, 占位但可被读回识别.
    pub fn write_per_slice<W: Write>(&self, w: &mut W, csa: &CsaArray) -> io::Result<()> {
        self.write_header(w, "CSA (mm^2)")?;
        for (z, value) in csa.iter() {
            if self.slices.contains(z) {
                writeln!(w, "{z},{value}")?;
            }
        }
        Ok(())
    }

    /// 写出单标量文件 (如体积或长度): 头部加上一行数值.
    pub fn write_scalar<W: Write>(&self, w: &mut W, metric: &str, value: f64) -> io::Result<()> {
        self.write_header(w, metric)?;
        writeln!(w, "{value}")
    }

    /// 写出汇总文件: 头部加上一行 `均值,标准差`.
    pub fn write_mean_std<W: Write>(&self, w: &mut W, stats: &CsaStats) -> io::Result<()> {
        self.write_header(w, "CSA mean, std (mm^2)")?;
        writeln!(w, "{},{}", stats.mean, stats.std)
    }

    /// 写出拟合中心线的文本形式: 头部加上每个样本一行 `z,h,w`.
    pub fn write_centerline<W: Write>(
        &self,
        w: &mut W,
        centerline: &FittedCenterline,
    ) -> io::Result<()> {
        self.write_header(w, "centerline (voxel)")?;
        for (&z, &h, &fw) in izip!(centerline.z(), centerline.h(), centerline.w()) {
            writeln!(w, "{z},{h},{fw}")?;
        }
        Ok(())
    }
}

/// 读回逐层文件的数据行, 返回 `(z, 值)` 列表. `#` 行与空行被跳过.
///
/// 数据行格式非法时返回 [`PipelineError::InvalidRange`] 并附原始行.
pub fn parse_per_slice<R: BufRead>(r: R) -> PipelineResult<Vec<(usize, f64)>> {
    let mut out = Vec::new();
    for line in r.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parsed = trimmed.split_once(',').and_then(|(z, v)| {
            let z = z.trim().parse::<usize>().ok()?;
            let v = v.trim().parse::<f64>().ok()?;
            Some((z, v))
        });
        match parsed {
            Some(pair) => out.push(pair),
            None => return Err(PipelineError::InvalidRange(line)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{parse_per_slice, ReportContext};
    use crate::centerline::{CenterlineSamples, FittedCenterline, GapPolicy};
    use crate::csa::{CsaArray, TangentPolicy};
    use crate::fitting::{CurveType, WindowKind};
    use crate::levels::{LevelRange, SliceRange};
    use crate::{PipelineError, SegVolume};
    use ndarray::Array3;

    fn sample_csa() -> CsaArray {
        let mut data = Array3::<f32>::zeros((6, 8, 8));
        for z in 0..6 {
            data[(z, 4, 4)] = 1.0;
            data[(z, 4, 5)] = 0.37;
        }
        data[(3, 4, 4)] = 0.0;
        data[(3, 4, 5)] = 0.0;
        let seg = SegVolume::from_parts(data, [1.0, 1.0, 1.0]);
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
        CsaArray::compute(&seg, &fit, TangentPolicy::SkipSlice, &mut warnings)
    }

    /// 头部包含全部上下文行, 顺序固定.
    #[test]
    fn test_header_lines() {
        let mut ctx = ReportContext::new(
            "counting voxels with tilt correction",
            Some(LevelRange::new(2, 5).unwrap()),
            SliceRange::new(3, 40).unwrap(),
        );
        ctx.warnings.push("something looked off".to_owned());

        let mut buf = Vec::new();
        ctx.write_scalar(&mut buf, "CSA mean (mm^2)", 71.5).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("# Date - Time: "));
        assert_eq!(lines[1], "# Metric: CSA mean (mm^2)");
        assert_eq!(lines[2], "# Calculation method: counting voxels with tilt correction");
        assert_eq!(lines[3], "# Vertebral levels: 2 to 5");
        assert_eq!(lines[4], "# Slices (z): 3:40");
        assert_eq!(lines[5], "# WARNING: something looked off");
        assert_eq!(lines[6], "71.5");
    }

    /// 未按层级选择时头部写 ALL.
    #[test]
    fn test_header_all_levels() {
        let ctx = ReportContext::new("x", None, SliceRange::new(0, 5).unwrap());
        let mut buf = Vec::new();
        ctx.write_scalar(&mut buf, "volume (mm^3)", 2.0).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("# Vertebral levels: ALL\n"));
    }

    /// 写出再读回不丢失任何数值 (含 NaN 层), 且遵守切片范围.
    #[test]
    fn test_per_slice_round_trip() {
        let csa = sample_csa();
        let ctx = ReportContext::new("m", None, SliceRange::new(1, 4).unwrap());

        let mut buf = Vec::new();
        ctx.write_per_slice(&mut buf, &csa).unwrap();
        let parsed = parse_per_slice(buf.as_slice()).unwrap();

        assert_eq!(parsed.len(), 4);
        for (i, &(z, v)) in parsed.iter().enumerate() {
            assert_eq!(z, i + 1);
            let orig = csa.get(z).unwrap();
            if orig.is_nan() {
                assert!(v.is_nan());
            } else {
                // f64 默认格式可精确往返.
                assert_eq!(v, orig);
            }
        }
        assert!(parsed[2].1.is_nan());
    }

    /// 汇总行与中心线文本的格式.
    #[test]
    fn test_mean_std_and_centerline() {
        let mut data = Array3::<f32>::zeros((4, 8, 8));
        for z in 0..4 {
            data[(z, 4, 4)] = 1.0;
        }
        let seg = SegVolume::from_parts(data, [1.0, 1.0, 1.0]);
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

        let ctx = ReportContext::new("m", None, SliceRange::new(0, 3).unwrap());

        let stats = crate::metrics::CsaStats {
            mean: 2.5,
            std: 0.25,
            min: 2.0,
            max: 3.0,
            count: 4,
        };
        let mut buf = Vec::new();
        ctx.write_mean_std(&mut buf, &stats).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with("2.5,0.25\n"));

        let mut buf = Vec::new();
        ctx.write_centerline(&mut buf, &fit).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let data_lines: Vec<&str> =
            text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(data_lines, vec!["0,4,4", "1,4,4", "2,4,4", "3,4,4"]);
    }

    /// 非法数据行报错并回显原文.
    #[test]
    fn test_parse_rejects_garbage() {
        let text = "# header\n3,1.5\nnot-a-line\n";
        let err = parse_per_slice(text.as_bytes()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRange(s) if s == "not-a-line"));
    }
}

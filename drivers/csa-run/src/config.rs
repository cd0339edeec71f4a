//! 运行参数. 全部来自环境变量, 不引入命令行解析.
//!
//! | 变量 | 含义 | 缺省 |
//! | ---- | ---- | ---- |
//! | `CORD_SEG` | 分割 nii 路径 | `$HOME/dataset/cord/seg.nii.gz` |
//! | `CORD_VERTFILE` | 椎体层级标注 nii 路径 | 无 |
//! | `CORD_VERT` | 椎体层级区间, `a:b` 或 `n` | 无 |
//! | `CORD_SLICES` | z 切片区间, `a:b` 或 `n` | 无 (分析全部) |
//! | `CORD_CURVE` | `hanning[:窗长]` 或 `spline[:节点间隔]` | `hanning` |
//! | `CORD_SMOOTH_MM` | CSA z 向平滑的物理窗长 (毫米) | `0` |
//! | `CORD_OUT` | 结果目录 | 当前目录 |
//! | `CORD_PREFIX` | 结果文件名前缀 | `cord` |
//! | `CORD_KEEP_TMP` | 置 `1` 保留临时工作目录 | 不保留 |
//!
//! `CORD_VERT` 与 `CORD_SLICES` 互斥, 同时给出时报错.

use std::env;
use std::path::PathBuf;

use cord_berry::consts::{DEFAULT_SAMPLES_PER_KNOT, DEFAULT_WINDOW_LEN};
use cord_berry::prelude::*;

/// 一次运行的全部配置.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// 分割 nii 路径.
    pub seg_path: PathBuf,

    /// 椎体层级标注 nii 路径.
    pub labeling_path: Option<PathBuf>,

    /// 结果目录.
    pub out_dir: PathBuf,

    /// 结果文件名前缀.
    pub prefix: String,

    /// 保留临时工作目录?
    pub keep_tmp: bool,

    spec: ProcessSpec,
}

/// 读取非空环境变量.
fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// 解析 `hanning[:窗长]` / `spline[:节点间隔]` 写法的拟合策略.
fn parse_curve(s: &str) -> PipelineResult<CurveType> {
    let (name, arg) = match s.split_once(':') {
        Some((n, a)) => (n.trim(), Some(a.trim())),
        None => (s.trim(), None),
    };
    let bad = || PipelineError::InvalidRange(format!("CORD_CURVE={s}"));
    match name {
        "hanning" => {
            let len = match arg {
                Some(a) => a.parse().map_err(|_| bad())?,
                None => DEFAULT_WINDOW_LEN,
            };
            if len == 0 {
                return Err(bad());
            }
            Ok(CurveType::Window {
                kind: WindowKind::Hanning,
                len,
            })
        }
        "spline" => {
            let samples_per_knot = match arg {
                Some(a) => a.parse().map_err(|_| bad())?,
                None => DEFAULT_SAMPLES_PER_KNOT,
            };
            if samples_per_knot == 0 {
                return Err(bad());
            }
            Ok(CurveType::CubicSpline { samples_per_knot })
        }
        _ => Err(bad()),
    }
}

impl RunConfig {
    /// 从环境变量组装配置.
    pub fn from_env() -> PipelineResult<Self> {
        let seg_path = match var("CORD_SEG") {
            Some(p) => PathBuf::from(p),
            None => {
                let mut p = dirs::home_dir().ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "home directory not found")
                })?;
                p.extend(["dataset", "cord", "seg.nii.gz"]);
                p
            }
        };
        let labeling_path = var("CORD_VERTFILE").map(PathBuf::from);

        let mut spec = ProcessSpec::new();
        match (var("CORD_VERT"), var("CORD_SLICES")) {
            (Some(_), Some(_)) => {
                return Err(PipelineError::InvalidRange(
                    "CORD_VERT and CORD_SLICES are mutually exclusive".to_owned(),
                ));
            }
            (Some(v), None) => spec = spec.select_levels(v.parse()?),
            (None, Some(s)) => spec = spec.select_slices(s.parse()?),
            (None, None) => {}
        }
        if let Some(c) = var("CORD_CURVE") {
            spec = spec.with_curve(parse_curve(&c)?);
        }
        if let Some(s) = var("CORD_SMOOTH_MM") {
            let mm: f64 = s
                .parse()
                .map_err(|_| PipelineError::InvalidRange(format!("CORD_SMOOTH_MM={s}")))?;
            if !mm.is_finite() || mm < 0.0 {
                return Err(PipelineError::InvalidRange(format!("CORD_SMOOTH_MM={s}")));
            }
            spec = spec.with_csa_smoothing_mm(mm);
        }

        Ok(Self {
            seg_path,
            labeling_path,
            out_dir: var("CORD_OUT").map_or_else(|| PathBuf::from("."), PathBuf::from),
            prefix: var("CORD_PREFIX").unwrap_or_else(|| "cord".to_owned()),
            keep_tmp: var("CORD_KEEP_TMP").is_some_and(|v| v == "1"),
            spec,
        })
    }

    /// 流水线参数.
    #[inline]
    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::parse_curve;
    use cord_berry::prelude::*;

    /// 拟合策略字符串的各种写法.
    #[test]
    fn test_parse_curve() {
        assert_eq!(
            parse_curve("hanning:9").unwrap(),
            CurveType::Window {
                kind: WindowKind::Hanning,
                len: 9
            }
        );
        assert_eq!(
            parse_curve("spline").unwrap(),
            CurveType::CubicSpline {
                samples_per_knot: cord_berry::consts::DEFAULT_SAMPLES_PER_KNOT
            }
        );
        assert!(parse_curve("spline:0").is_err());
        assert!(parse_curve("hanning:0").is_err());
        assert!(parse_curve("bezier").is_err());
        assert!(parse_curve("hanning:x").is_err());
    }
}

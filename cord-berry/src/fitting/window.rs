//! 归一化对称窗平滑与有限差分.

use std::f64::consts::PI;

/// 平滑窗的形状.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WindowKind {
    /// Hanning 窗: `0.5 - 0.5 * cos(2 * pi * i / (m - 1))`.
    Hanning,

    /// 矩形窗 (滑动平均).
    Flat,
}

impl WindowKind {
    /// 生成长度为 `len` 的未归一化窗系数. `len` 必须为正.
    pub fn coefficients(&self, len: usize) -> Vec<f64> {
        assert_ne!(len, 0, "窗长必须为正");
        if len == 1 {
            return vec![1.0];
        }
        match self {
            WindowKind::Hanning => {
                let m = (len - 1) as f64;
                (0..len)
                    .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / m).cos())
                    .collect()
            }
            WindowKind::Flat => vec![1.0; len],
        }
    }
}

/// 对 `values` 做归一化对称窗卷积平滑.
///
/// 边界策略: 序列按镜像方式延拓 (不重复端点本身), 输出长度与输入一致.
/// 实际使用的窗长是不超过 `len` 且不超过序列长度的最大奇数 (下限为 1);
/// 因此 `len` 过小或序列过短时窗会自动收缩, 而不会 panic. 实际窗长
/// 不超过 2 时该操作是恒等变换.
///
/// 返回 (平滑后序列, 实际使用的窗长). 调用方可以据此判断是否需要记录
/// "窗被截短" 的警告.
pub fn smooth(values: &[f64], kind: WindowKind, len: usize) -> (Vec<f64>, usize) {
    let n = values.len();
    if n == 0 {
        return (Vec::new(), 0);
    }

    let mut used = len.min(n).max(1);
    if used % 2 == 0 {
        used -= 1;
    }
    if used <= 2 {
        return (values.to_vec(), used);
    }

    let mut w = kind.coefficients(used);
    let total: f64 = w.iter().sum();
    debug_assert!(total > 0.0);
    w.iter_mut().for_each(|c| *c /= total);

    let half = used / 2;
    let mirrored = |idx: isize| -> f64 {
        // 镜像延拓: -1 -> 1, n -> n - 2.
        let n = n as isize;
        let mut i = idx;
        if i < 0 {
            i = -i;
        }
        if i >= n {
            i = 2 * n - 2 - i;
        }
        values[i as usize]
    };

    let out = (0..n as isize)
        .map(|center| {
            w.iter()
                .enumerate()
                .map(|(k, &c)| c * mirrored(center + k as isize - half as isize))
                .sum()
        })
        .collect();
    (out, used)
}

/// 有限差分求导. 内部使用中心差分, 两端使用单侧差分
/// (与 `numpy.gradient` 的缺省行为一致). 步长视为 1.
pub fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| {
                if i == 0 {
                    values[1] - values[0]
                } else if i == n - 1 {
                    values[n - 1] - values[n - 2]
                } else {
                    (values[i + 1] - values[i - 1]) / 2.0
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::{gradient, smooth, WindowKind};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    /// 窗长不超过 2 (包括 0) 时平滑是恒等变换.
    #[test]
    fn test_smooth_identity() {
        let v = [3.0, 1.0, 4.0, 1.0, 5.0];
        for len in [0, 1, 2] {
            let (out, used) = smooth(&v, WindowKind::Hanning, len);
            assert_eq!(out, v.to_vec());
            assert!((1..=2).contains(&used));
        }
        let (out, used) = smooth(&[1.0, 2.0, 3.0], WindowKind::Hanning, 0);
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
        assert_eq!(used, 1);
    }

    /// 常数序列平滑后仍是常数 (窗已归一化).
    #[test]
    fn test_smooth_constant() {
        let v = [2.5; 20];
        for kind in [WindowKind::Hanning, WindowKind::Flat] {
            let (out, used) = smooth(&v, kind, 7);
            assert_eq!(used, 7);
            assert!(out.iter().all(|&x| f64_eq(x, 2.5)));
        }
    }

    /// 序列比请求的窗短时, 窗自动收缩且不 panic.
    #[test]
    fn test_smooth_window_shrinks() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        let (out, used) = smooth(&v, WindowKind::Hanning, 80);
        assert_eq!(out.len(), v.len());
        assert_eq!(used, 5);
    }

    /// 矩形窗就是滑动平均.
    #[test]
    fn test_flat_window_is_moving_average() {
        let v = [0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 0.0];
        let (out, used) = smooth(&v, WindowKind::Flat, 3);
        assert_eq!(used, 3);
        assert!(f64_eq(out[1], 1.0));
        assert!(f64_eq(out[2], 1.0));
        assert!(f64_eq(out[3], 1.0));
        assert!(f64_eq(out[5], 0.0));
    }

    /// Hanning 窗系数首尾为 0, 中心为 1.
    #[test]
    fn test_hanning_coefficients() {
        let w = WindowKind::Hanning.coefficients(5);
        assert!(f64_eq(w[0], 0.0));
        assert!(f64_eq(w[2], 1.0));
        assert!(f64_eq(w[4], 0.0));
        assert!(f64_eq(w[1], w[3]));
    }

    /// 线性序列的梯度处处等于斜率.
    #[test]
    fn test_gradient_linear() {
        let v: Vec<f64> = (0..10).map(|i| 2.0 * i as f64 + 1.0).collect();
        let g = gradient(&v);
        assert_eq!(g.len(), 10);
        assert!(g.iter().all(|&x| f64_eq(x, 2.0)));
    }

    /// 退化输入.
    #[test]
    fn test_gradient_degenerate() {
        assert!(gradient(&[]).is_empty());
        assert_eq!(gradient(&[7.0]), vec![0.0]);
        assert_eq!(gradient(&[1.0, 4.0]), vec![3.0, 3.0]);
    }
}

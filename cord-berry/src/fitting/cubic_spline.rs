//! 自然三次样条曲线.
//!
//! 系数矩阵是三对角的, 直接用追赶法 (Thomas algorithm) 求解,
//! 无需引入通用线性代数后端.

use num::Float;

/// 自然三次样条拟合结果. 第 `i` 段多项式为
/// `a[i] + b[i]*dt + c[i]*dt^2 + d[i]*dt^3`, 其中 `dt = t - xs[i]`.
pub struct SplineFitImp<T: Float> {
    xs: Vec<T>,
    a: Vec<T>,
    b: Vec<T>,
    c: Vec<T>,
    d: Vec<T>,
}

/// `f64` 精度的自然三次样条.
pub type SplineFit = SplineFitImp<f64>;

/// `f32` 精度的自然三次样条.
pub type SplineFit32 = SplineFitImp<f32>;

macro_rules! impl_spline {
    ($fp: ty, $one: expr, $two: expr, $three: expr) => {
        impl SplineFitImp<$fp> {
            /// 以 `x` 为节点位置、`y` 为对应函数值拟合自然三次样条.
            ///
            /// `x` 必须严格递增且与 `y` 一一对应, 至少需要三个节点.
            pub fn new(x: &[$fp], y: &[$fp]) -> Self {
                assert_eq!(x.len(), y.len(), "x 值和 y 值必须一一对应");
                assert!(x.len() >= 3, "该样条曲线至少需要三个节点");
                assert!(
                    x.windows(2).all(|v| v[0] < v[1]),
                    "x 值必须严格递增"
                );

                let len = x.len();
                let dx: Vec<$fp> = x.windows(2).map(|v| v[1] - v[0]).collect();
                let dy: Vec<$fp> = y.windows(2).map(|v| v[1] - v[0]).collect();

                // 自然边界: 两端二阶导为 0, 即 c[0] = c[len-1] = 0.
                let mut diag = vec![$one; len];
                let mut upper = vec![0.0 as $fp; len];
                let mut lower = vec![0.0 as $fp; len];
                let mut rhs = vec![0.0 as $fp; len];
                for i in 1..(len - 1) {
                    lower[i] = dx[i - 1];
                    diag[i] = $two * (dx[i - 1] + dx[i]);
                    upper[i] = dx[i];
                    rhs[i] = $three * (dy[i] / dx[i] - dy[i - 1] / dx[i - 1]);
                }

                // 追赶法.
                for i in 1..len {
                    let m = lower[i] / diag[i - 1];
                    diag[i] -= m * upper[i - 1];
                    rhs[i] -= m * rhs[i - 1];
                }
                let mut c = vec![0.0 as $fp; len];
                c[len - 1] = rhs[len - 1] / diag[len - 1];
                for i in (0..(len - 1)).rev() {
                    c[i] = (rhs[i] - upper[i] * c[i + 1]) / diag[i];
                }

                let mut b = Vec::with_capacity(len - 1);
                let mut d = Vec::with_capacity(len - 1);
                for i in 0..(len - 1) {
                    b.push(dy[i] / dx[i] - dx[i] * ($two * c[i] + c[i + 1]) / $three);
                    d.push((c[i + 1] - c[i]) / ($three * dx[i]));
                }
                c.truncate(len - 1);

                Self {
                    xs: x.to_vec(),
                    a: y[..(len - 1)].to_vec(),
                    b,
                    c,
                    d,
                }
            }

            /// 求曲线在 `t` 处的值. `t` 超出节点范围时按端段多项式外推.
            pub fn eval(&self, t: $fp) -> $fp {
                let i = self.segment(t);
                let dt = t - self.xs[i];
                ((self.d[i] * dt + self.c[i]) * dt + self.b[i]) * dt + self.a[i]
            }

            /// 求曲线在 `t` 处的一阶导数.
            pub fn deriv(&self, t: $fp) -> $fp {
                let i = self.segment(t);
                let dt = t - self.xs[i];
                ($three * self.d[i] * dt + $two * self.c[i]) * dt + self.b[i]
            }

            /// 定位 `t` 所在的段索引.
            #[inline]
            fn segment(&self, t: $fp) -> usize {
                match self.xs.partition_point(|&x| x <= t) {
                    0 => 0,
                    p => (p - 1).min(self.xs.len() - 2),
                }
            }
        }
    };
}

impl_spline!(f32, 1.0_f32, 2.0_f32, 3.0_f32);
impl_spline!(f64, 1.0_f64, 2.0_f64, 3.0_f64);

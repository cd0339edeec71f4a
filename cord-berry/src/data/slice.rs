//! 水平切片视图.

use ndarray::iter::Iter;
use ndarray::{ArrayView2, ArrayViewMut2, Ix2};
use std::ops::Index;

use crate::consts::is_foreground;
use crate::{Idx2d, Idx2dF};

/// 不可变、借用的二维水平分割切片.
pub struct SegSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::SegVolume`].
    ///
    /// 这里有意把代码写死为 `ArrayView` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayView2<'a, f32>,
}

impl Index<Idx2d> for SegSlice<'_> {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl<'a> SegSlice<'a> {
    /// 初始化.
    #[inline]
    pub fn new(data: ArrayView2<'a, f32>) -> Self {
        Self { data }
    }

    /// 获取切片形状.
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 获取可以迭代图像像素的迭代器.
    #[inline]
    pub fn iter(&self) -> Iter<'_, f32, Ix2> {
        self.data.iter()
    }

    /// 切片内所有像素值之和. 分割带部分容积效应时,
    /// 该值即校正前的 "体素个数".
    #[inline]
    pub fn value_sum(&self) -> f64 {
        self.data.iter().map(|&v| v as f64).sum()
    }

    /// 切片内前景像素个数.
    #[inline]
    pub fn foreground_len(&self) -> usize {
        self.data.iter().filter(|&&v| is_foreground(v)).count()
    }

    /// 切片是否不含任何前景像素?
    #[inline]
    pub fn is_background(&self) -> bool {
        self.foreground_len() == 0
    }

    /// 计算前景像素的质心, 格式为 `(mean_h, mean_w)`.
    /// 切片不含前景时返回 `None`.
    pub fn centroid(&self) -> Option<Idx2dF> {
        let mut count = 0usize;
        let (mut sum_h, mut sum_w) = (0.0f64, 0.0f64);
        for ((h, w), &v) in self.data.indexed_iter() {
            if is_foreground(v) {
                count += 1;
                sum_h += h as f64;
                sum_w += w as f64;
            }
        }
        (count > 0).then(|| (sum_h / count as f64, sum_w / count as f64))
    }
}

/// 可变、借用的二维水平分割切片.
pub struct SegSliceMut<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::SegVolume`].
    data: ArrayViewMut2<'a, f32>,
}

impl<'a> SegSliceMut<'a> {
    /// 初始化.
    #[inline]
    pub fn new(data: ArrayViewMut2<'a, f32>) -> Self {
        Self { data }
    }

    /// 获得一份不可变视图.
    #[inline]
    pub fn as_ref(&self) -> SegSlice<'_> {
        SegSlice::new(self.data.view())
    }

    /// 将切片内所有前景像素替换为 `value`. 返回替换的个数.
    pub fn fill_foreground(&mut self, value: f32) -> usize {
        let mut cnt = 0usize;
        self.data
            .iter_mut()
            .filter(|p| is_foreground(**p))
            .for_each(|p| {
                cnt += 1;
                *p = value;
            });
        cnt
    }

    /// 将切片整体清零.
    #[inline]
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// 在 `src` 的前景位置上写入 `value`. 返回写入的个数.
    ///
    /// 两切片形状不一致时 panic.
    pub fn copy_foreground_from(&mut self, src: &SegSlice<'_>, value: f32) -> usize {
        assert_eq!(self.data.dim(), src.shape(), "切片形状不一致");
        let mut cnt = 0usize;
        for (slot, (_, &v)) in self.data.iter_mut().zip(src.data.indexed_iter()) {
            if is_foreground(v) {
                cnt += 1;
                *slot = value;
            }
        }
        cnt
    }
}

use std::ops::{Index, IndexMut};
use std::path::Path;

use bytemuck::Pod;
use ndarray::{Array3, ArrayView, ArrayViewMut, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{DataElement, IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::is_labeled;
use crate::{Idx2d, Idx3d};

pub mod slice;

pub use slice::{SegSlice, SegSliceMut};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 3D nii 文件 header 的共用属性和部分通用操作.
///
/// 本 crate 假设文件已经是 RPI 朝向, 因此 z 即上下 (superior-inferior) 方向,
/// 所有逐层操作都沿 z 轴进行.
pub trait VolumeAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取数据水平切片形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表 z (上下方向),
    /// 高 (前后方向), 宽 (左右方向).
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, w, h, z, ..] = self.header().pixdim;
        [z as f64, h as f64, w as f64]
    }

    /// 获取 width 方向体素分辨率, 以毫米为单位.
    #[inline]
    fn width_mm(&self) -> f64 {
        self.header().pixdim[1] as f64
    }

    /// 获取 height 方向体素分辨率, 以毫米为单位.
    #[inline]
    fn height_mm(&self) -> f64 {
        self.header().pixdim[2] as f64
    }

    /// 获取 z 方向 (相邻 2D 切片的方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn z_mm(&self) -> f64 {
        self.header().pixdim[3] as f64
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [z, h, w] = self.pix_dim();
        z == h && z == w
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel_mm3(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 获取水平切片方向的像素实际面积值, 以平方毫米为单位.
    #[inline]
    fn slice_pixel_mm2(&self) -> f64 {
        self.pix_dim().iter().skip(1).product()
    }
}

/// nii 格式 3D 脊髓分割, 包括 header 和分割值. 分割值以 `f32` 保存,
/// 0 为背景, 1 为脊髓, 部分容积效应允许取中间值.
#[derive(Debug, Clone)]
pub struct SegVolume {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl VolumeAttr for SegVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for SegVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for SegVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl SegVolume {
    /// 打开 nii 文件格式的 3D 脊髓分割. `path` 为 nii 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let (header, data) = open_as::<f32, P>(path)?;
        Ok(Self { header, data })
    }

    /// 根据裸分割数据和体素分辨率直接创建 `SegVolume` 实体.
    ///
    /// # 参数
    ///
    /// 1. `data` 按照 \[z, h, w\] 格式存储, 取值应在 `[0, 1]` 内.
    /// 2. `pix_dim` 按照 \[z, h, w\] 格式存储, 以毫米为单位.
    ///
    /// # 注意
    ///
    /// 该方法可能会创建不一致的实体, 因此你应仅将其用于实验目的.
    pub fn from_parts(data: Array3<f32>, pix_dim: [f32; 3]) -> Self {
        Self {
            header: fake_header(data.dim(), pix_dim),
            data,
        }
    }

    /// 获取 3D 分割 z 空间的第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> SegSlice<'_> {
        SegSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取 3D 分割 z 空间的第 `z_index` 层可变切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at_mut(&mut self, z_index: usize) -> SegSliceMut<'_> {
        SegSliceMut::new(self.data.index_axis_mut(Axis(0), z_index))
    }

    /// 获取能按升序迭代 3D 分割水平不可变切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = SegSlice> {
        self.data.axis_iter(Axis(0)).map(SegSlice::new)
    }

    /// 获取能按升序迭代 3D 分割水平可变切片的迭代器.
    #[inline]
    pub fn slice_iter_mut(&mut self) -> impl ExactSizeIterator<Item = SegSliceMut> {
        self.data.axis_iter_mut(Axis(0)).map(SegSliceMut::new)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }

    /// 以 `self` 的 header 为参考, 将派生数据 `data` 写入 `path`.
    ///
    /// `data` 按照 \[z, h, w\] 格式组织, 形状必须与 `self` 一致;
    /// 输出的数值类型由 `data` 的元素类型决定.
    pub fn save_derived<T, P>(&self, data: &Array3<T>, path: P) -> nifti::Result<()>
    where
        T: DataElement + Pod,
        P: AsRef<Path>,
    {
        assert_eq!(data.dim(), self.data.dim(), "派生数据与原分割形状不一致");
        save_as(&self.header, data, path)
    }
}

/// nii 格式的 3D 椎体层级标注, 包括 header 和层级编号. 编号以 `u8` 保存,
/// 0 代表未标注. 该结构在流水线中是只读输入.
#[derive(Debug, Clone)]
pub struct LevelVolume {
    header: BoxedHeader,
    data: Array3<u8>,
}

impl VolumeAttr for LevelVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for LevelVolume {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl LevelVolume {
    /// 打开 nii 文件格式的椎体层级标注. `path` 为 nii 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let (header, data) = open_as::<u8, P>(path)?;
        Ok(Self { header, data })
    }

    /// 根据裸标注数据和体素分辨率直接创建 `LevelVolume` 实体.
    ///
    /// `data` 按照 \[z, h, w\] 格式存储. 参见 [`SegVolume::from_parts`].
    pub fn from_parts(data: Array3<u8>, pix_dim: [f32; 3]) -> Self {
        Self {
            header: fake_header(data.dim(), pix_dim),
            data,
        }
    }

    /// 获取给定位置的层级编号. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx3d) -> Option<u8> {
        self.data.get(pos).copied()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 收集标注中出现过的所有非零层级编号, 升序且去重.
    pub fn available_levels(&self) -> Vec<u8> {
        let mut seen = [false; 256];
        for &code in self.data.iter() {
            seen[code as usize] = true;
        }
        (0u8..=u8::MAX)
            .filter(|&c| is_labeled(c) && seen[c as usize])
            .collect()
    }

    /// 获取标注中层级编号为 `code` 的体素个数.
    #[inline]
    pub fn count(&self, code: u8) -> usize {
        self.data.iter().filter(|p| **p == code).count()
    }
}

/// 打开 nii 文件并将数据转换成 \[z, h, w\] 布局.
fn open_as<T, P>(path: P) -> nifti::Result<(BoxedHeader, Array3<T>)>
where
    T: DataElement + Clone,
    P: AsRef<Path>,
{
    let obj = ReaderOptions::new().read_file(path.as_ref())?;
    let header = Box::new(obj.header().clone());

    // [W, H, z] -> [z, H, W].
    // hint: 原第一维向下增长, 原第二维向右增长.
    let data = obj
        .into_volume()
        .into_ndarray::<T>()?
        .permuted_axes([2, 1, 0].as_slice());

    // The nature of nifti data field layout.
    debug_assert!(data.is_standard_layout());

    // 该操作不会生成 `Err`, 可直接 unwrap.
    let data = Array3::<T>::from_shape_vec(get_shape_from_header(&header), data.into_raw_vec())
        .unwrap();

    Ok((header, data))
}

/// 以 `header` 为参考, 将 \[z, h, w\] 布局的数据转回 nifti 惯用的
/// \[W, H, z\] 布局并写入 `path`.
fn save_as<T, P>(header: &NiftiHeader, data: &Array3<T>, path: P) -> nifti::Result<()>
where
    T: DataElement + Pod,
    P: AsRef<Path>,
{
    let ordered = data.view().permuted_axes([2, 1, 0]);
    WriterOptions::new(path.as_ref())
        .reference_header(header)
        .write_nifti(&ordered)
}

/// 为实验数据拼接一个最小可用的 header.
fn fake_header((z, h, w): Idx3d, pix_dim: [f32; 3]) -> BoxedHeader {
    let mut header = Box::<NiftiHeader>::default();
    header.dim = [3, w as u16, h as u16, z as u16, 1, 1, 1, 1];
    let [pz, ph, pw] = pix_dim;
    header.pixdim = [1.0, pw, ph, pz, 1.0, 1.0, 1.0, 1.0];
    header.intent_name[..4].copy_from_slice(b"fake");
    header
}

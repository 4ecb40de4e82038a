//! 预览方向矫正
//!
//! 相机原生 buffer 通常相对竖屏显示旋转了 90°，所以基准映射把
//! buffer 的高对齐到显示的宽。四种屏幕旋转状态按枚举分支处理，
//! 不能写成连续公式：真实设备的旋转约定就是不对称的。

use crate::geometry::StreamSize;

/// 显示相对自然方向的四种旋转状态 (四分之一圈)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Rotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl Rotation {
    /// 旋转了几个 90°，取值 0..=3
    pub fn quarter_turns(&self) -> i32 {
        match self {
            Self::Rotation0 => 0,
            Self::Rotation90 => 1,
            Self::Rotation180 => 2,
            Self::Rotation270 => 3,
        }
    }

}

// 浮点矩形 (left, top, right, bottom)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct RectF {
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

impl RectF {
    fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    fn width(&self) -> f32 {
        self.right - self.left
    }

    fn height(&self) -> f32 {
        self.bottom - self.top
    }

    fn center_x(&self) -> f32 {
        (self.left + self.right) * 0.5
    }

    fn center_y(&self) -> f32 {
        (self.top + self.bottom) * 0.5
    }

    fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// 平移
    fn offset(&mut self, dx: f32, dy: f32) {
        self.left += dx;
        self.right += dx;
        self.top += dy;
        self.bottom += dy;
    }
}

/// 2D 仿射变换
///
/// 映射关系：
/// ```text
/// x' = scale_x * x + skew_x  * y + trans_x
/// y' = skew_y  * x + scale_y * y + trans_y
/// ```
/// `post_*` 系列操作把新变换左乘到当前矩阵上 (先应用已有变换，再应用新的)。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub scale_x: f32,
    pub skew_x: f32,
    pub trans_x: f32,
    pub skew_y: f32,
    pub scale_y: f32,
    pub trans_y: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub const fn identity() -> Self {
        Self {
            scale_x: 1.0,
            skew_x: 0.0,
            trans_x: 0.0,
            skew_y: 0.0,
            scale_y: 1.0,
            trans_y: 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// 对一个点做映射
    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.scale_x * x + self.skew_x * y + self.trans_x,
            self.skew_y * x + self.scale_y * y + self.trans_y,
        )
    }

    /// self = other * self
    fn post_concat(&mut self, other: &Matrix) {
        let m = *self;
        self.scale_x = other.scale_x * m.scale_x + other.skew_x * m.skew_y;
        self.skew_x = other.scale_x * m.skew_x + other.skew_x * m.scale_y;
        self.trans_x = other.scale_x * m.trans_x + other.skew_x * m.trans_y + other.trans_x;
        self.skew_y = other.skew_y * m.scale_x + other.scale_y * m.skew_y;
        self.scale_y = other.skew_y * m.skew_x + other.scale_y * m.scale_y;
        self.trans_y = other.skew_y * m.trans_x + other.scale_y * m.trans_y + other.trans_y;
    }

    /// 以 (px, py) 为中心缩放
    pub fn post_scale(&mut self, sx: f32, sy: f32, px: f32, py: f32) {
        let scale = Matrix {
            scale_x: sx,
            skew_x: 0.0,
            trans_x: px - sx * px,
            skew_y: 0.0,
            scale_y: sy,
            trans_y: py - sy * py,
        };
        self.post_concat(&scale);
    }

    /// 以 (px, py) 为中心旋转 `degrees` 度 (顺时针，y 轴向下)
    pub fn post_rotate(&mut self, degrees: f32, px: f32, py: f32) {
        let (sin, cos) = sin_cos_degrees(degrees);
        let rotate = Matrix {
            scale_x: cos,
            skew_x: -sin,
            trans_x: px - cos * px + sin * py,
            skew_y: sin,
            scale_y: cos,
            trans_y: py - sin * px - cos * py,
        };
        self.post_concat(&rotate);
    }

    /// 把 `src` 拉伸填满 `dst` (FILL 语义，宽高独立缩放)
    ///
    /// `src` 为空时矩阵重置为单位阵并返回 false。
    fn set_rect_to_rect(&mut self, src: RectF, dst: RectF) -> bool {
        if src.is_empty() {
            *self = Self::identity();
            return false;
        }
        let sx = dst.width() / src.width();
        let sy = dst.height() / src.height();
        *self = Matrix {
            scale_x: sx,
            skew_x: 0.0,
            trans_x: dst.left - src.left * sx,
            skew_y: 0.0,
            scale_y: sy,
            trans_y: dst.top - src.top * sy,
        };
        true
    }
}

// 90° 的整数倍直接给精确值，避免 cos(180°) = -1 + 1e-8 这种噪声
fn sin_cos_degrees(degrees: f32) -> (f32, f32) {
    let normalized = degrees.rem_euclid(360.0);
    if normalized == 0.0 {
        (0.0, 1.0)
    } else if normalized == 90.0 {
        (1.0, 0.0)
    } else if normalized == 180.0 {
        (0.0, -1.0)
    } else if normalized == 270.0 {
        (-1.0, 0.0)
    } else {
        normalized.to_radians().sin_cos()
    }
}

/// 核心：计算预览 Surface 的方向矫正变换
///
/// * `view_width` / `view_height`: 显示 Surface 尺寸
/// * `rotation`: 当前屏幕旋转状态
/// * `buffer`: 相机原生 buffer 尺寸 (相机坐标系，横向)
///
/// `Rotation0` / `Rotation90` 返回单位阵；`Rotation180` 绕中心转 180°；
/// `Rotation270` 先把 view 拉伸到转置后的 buffer 矩形，再按 "铺满" 原则
/// 等比缩放，最后绕中心再转 90° 的倍数。
pub fn compute_preview_transform(
    view_width: u32,
    view_height: u32,
    rotation: Rotation,
    buffer: StreamSize,
) -> Matrix {
    let mut matrix = Matrix::identity();

    if view_width == 0 || view_height == 0 || buffer.width == 0 || buffer.height == 0 {
        tracing::warn!(
            "Degenerate preview geometry (view {}x{}, buffer {}), using identity transform",
            view_width,
            view_height,
            buffer
        );
        return matrix;
    }

    let view_w = view_width as f32;
    let view_h = view_height as f32;
    let buf_w = buffer.width as f32;
    let buf_h = buffer.height as f32;

    let view_rect = RectF::new(0.0, 0.0, view_w, view_h);
    // 相机 buffer 相对显示转了 90°：宽高互换
    let mut buffer_rect = RectF::new(0.0, 0.0, buf_h, buf_w);
    let center_x = view_rect.center_x();
    let center_y = view_rect.center_y();

    match rotation {
        Rotation::Rotation270 => {
            buffer_rect.offset(
                center_x - buffer_rect.center_x(),
                center_y - buffer_rect.center_y(),
            );
            matrix.set_rect_to_rect(view_rect, buffer_rect);
            let scale = (view_h / buf_h).max(view_w / buf_w);
            matrix.post_scale(scale, scale, center_x, center_y);
            matrix.post_rotate(
                (90 * (rotation.quarter_turns() - 2)) as f32,
                center_x,
                center_y,
            );
        }
        Rotation::Rotation180 => {
            matrix.post_rotate(180.0, center_x, center_y);
        }
        Rotation::Rotation0 | Rotation::Rotation90 => {}
    }

    matrix
}

//! 物体検出の結果を保持するモジュール

/// バウンディングボックス (中心座標とサイズ、ピクセル単位)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredBox {
    /// 中心のx座標
    pub x: f32,
    /// 中心のy座標
    pub y: f32,
    /// 幅
    pub w: f32,
    /// 高さ
    pub h: f32,
}

impl PredBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// 左上と右下の角の座標から`PredBox`を作成します。
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: (x1 + x2) / 2.,
            y: (y1 + y2) / 2.,
            w: x2 - x1,
            h: y2 - y1,
        }
    }

    /// 左上の角の座標
    pub fn left_top(&self) -> (f32, f32) {
        (self.x - self.w / 2., self.y - self.h / 2.)
    }

    /// 右下の角の座標
    pub fn right_bottom(&self) -> (f32, f32) {
        (self.x + self.w / 2., self.y + self.h / 2.)
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// ボックスを画像の枠内に収めます。
    ///
    /// # Args
    /// * `img_w` - 画像の幅
    /// * `img_h` - 画像の高さ
    ///
    /// # Return
    /// * 両角を`[0, img_w] x [0, img_h]`にクランプした新たな`PredBox`
    pub fn clip(&self, img_w: f32, img_h: f32) -> Self {
        let (x1, y1) = self.left_top();
        let (x2, y2) = self.right_bottom();
        Self::from_corners(
            x1.clamp(0., img_w),
            y1.clamp(0., img_h),
            x2.clamp(0., img_w),
            y2.clamp(0., img_h),
        )
    }
}

/// 1つの検出結果を保持する構造体
#[derive(Debug, Clone)]
pub struct Detection {
    /// クラスID (probsのargmax)
    pub class_id: usize,
    /// クラスのラベル
    pub label: String,
    /// クラスごとの確率 (class_id順)
    pub probs: Vec<f32>,
    /// 物体が存在する確率 (objectness)
    pub objectness: f32,
    /// objectness * max(probs) の複合スコア
    pub score: f32,
    /// バウンディングボックス
    pub bbox: PredBox,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_roundtrip() {
        let b = PredBox::new(50., 40., 20., 10.);
        assert_eq!(b.left_top(), (40., 35.));
        assert_eq!(b.right_bottom(), (60., 45.));
        assert_eq!(PredBox::from_corners(40., 35., 60., 45.), b);
    }

    #[test]
    fn clip_clamps_to_frame() {
        let b = PredBox::new(5., 5., 20., 20.).clip(100., 100.);
        assert_eq!(b.left_top(), (0., 0.));
        assert_eq!(b.right_bottom(), (15., 15.));

        let b = PredBox::new(95., 95., 20., 20.).clip(100., 100.);
        assert_eq!(b.right_bottom(), (100., 100.));
    }

    #[test]
    fn clip_keeps_inner_box_unchanged() {
        let b = PredBox::new(50., 50., 20., 20.);
        assert_eq!(b.clip(100., 100.), b);
    }
}

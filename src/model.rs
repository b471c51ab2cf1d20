//! YOLOv2のネットワーク定義モジュール
//!
//! 畳み込み・バッチ正規化・プーリングなどのテンソル演算はすべてcandleに委譲します。
//! 重みは`weights`モジュールが変換したsafetensorsコンテナから`VarBuilder`で読み込みます。

use candle_core::Tensor;
use candle_nn::{
    batch_norm, conv2d, conv2d_no_bias, ops, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig,
    Module, VarBuilder,
};

use crate::error::{Error, Result};

/// ネットワーク入力の一辺のピクセル数
pub const INPUT_SIZE: usize = 640;

/// 畳み込みレイヤのテーブル: (入力チャネル数, 出力チャネル数, カーネルサイズ)
///
/// darknetの重みファイルもこの順でパラメータを格納しています。
#[rustfmt::skip]
pub const CONV_LAYERS: [(usize, usize, usize); 21] = [
    (   3,   32, 3),
    (  32,   64, 3),
    (  64,  128, 3),
    ( 128,   64, 1),
    (  64,  128, 3),
    ( 128,  256, 3),
    ( 256,  128, 1),
    ( 128,  256, 3),
    ( 256,  512, 3),
    ( 512,  256, 1),
    ( 256,  512, 3),
    ( 512,  256, 1),
    ( 256,  512, 3),
    ( 512, 1024, 3),
    (1024,  512, 1),
    ( 512, 1024, 3),
    (1024,  512, 1),
    ( 512, 1024, 3),
    (1024, 1024, 3),
    (1024, 1024, 3),
    (3072, 1024, 3),
];

/// 検出ヘッド (1x1畳み込み) の入力チャネル数
pub const HEAD_IN_CH: usize = 1024;

/// 2x2マックスプーリングを行うレイヤの番号 (1始まり)
const POOL_AFTER: [usize; 5] = [1, 2, 5, 8, 13];

/// 高解像度特徴をパススルーするレイヤの番号
const PASSTHROUGH_LAYER: usize = 13;

/// 畳み込み + バッチ正規化 + Leaky ReLU のブロック
struct ConvBlock {
    conv: Conv2d,
    bn: BatchNorm,
}

impl ConvBlock {
    fn load(vb: &VarBuilder, idx: usize, in_ch: usize, out_ch: usize, ksize: usize) -> Result<Self> {
        let conv_cfg = Conv2dConfig {
            padding: ksize / 2,
            ..Default::default()
        };
        let conv = conv2d_no_bias(in_ch, out_ch, ksize, conv_cfg, vb.pp(format!("conv{idx}")))?;
        let bn_cfg = BatchNormConfig {
            eps: 2e-5,
            ..Default::default()
        };
        let bn = batch_norm(out_ch, bn_cfg, vb.pp(format!("bn{idx}")))?;
        Ok(Self { conv, bn })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.conv.forward(xs)?;
        let xs = xs.apply_t(&self.bn, false)?;
        Ok(ops::leaky_relu(&xs, 0.1)?)
    }
}

/// stride 2 のreorg (space-to-depth)
///
/// `[b, c, h, w]`を`[b, 4c, h/2, w/2]`に変換します。
/// チャネルは(行オフセット, 列オフセット, 元チャネル)の順に並びます。
fn reorg(xs: &Tensor) -> Result<Tensor> {
    let (b, c, h, w) = xs.dims4()?;
    let xs = xs.reshape((b, c, h / 2, 2, w / 2, 2))?;
    let xs = xs.permute((0, 3, 5, 1, 2, 4))?.contiguous()?;
    Ok(xs.reshape((b, c * 4, h / 2, w / 2))?)
}

/// YOLOv2のネットワーク
pub struct YoloV2 {
    blocks: Vec<ConvBlock>,
    head: Conv2d,
}

impl YoloV2 {
    /// `VarBuilder`からネットワークを構築します。
    ///
    /// # Args
    /// * `vb` - 変換済みの重みを持つ`VarBuilder`
    /// * `n_classes` - クラス数
    /// * `n_boxes` - アンカーボックスの数
    ///
    /// # Return
    /// * 新たな`YoloV2`インスタンス
    pub fn load(vb: &VarBuilder, n_classes: usize, n_boxes: usize) -> Result<Self> {
        let mut blocks = Vec::with_capacity(CONV_LAYERS.len());
        for (i, &(in_ch, out_ch, ksize)) in CONV_LAYERS.iter().enumerate() {
            blocks.push(ConvBlock::load(vb, i + 1, in_ch, out_ch, ksize)?);
        }

        let head_out = (n_classes + 5) * n_boxes;
        let head_idx = CONV_LAYERS.len() + 1;
        let head = conv2d(
            HEAD_IN_CH,
            head_out,
            1,
            Conv2dConfig::default(),
            vb.pp(format!("conv{head_idx}")),
        )?;

        Ok(Self { blocks, head })
    }

    /// 1回のフォワードパスを実行します。
    ///
    /// # Args
    /// * `xs` - `[1, 3, H, W]`の入力画像テンソル (HとWは32の倍数)
    ///
    /// # Return
    /// * 検出ヘッドの生の出力 `[1, (n_classes + 5) * n_boxes, H/32, W/32]`
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        let mut passthrough = None;

        // darknet-19相当のバックボーン (レイヤ1〜18)
        for i in 0..18 {
            let idx = i + 1;
            xs = self.blocks[i].forward(&xs)?;
            if idx == PASSTHROUGH_LAYER {
                passthrough = Some(xs.clone());
            }
            if POOL_AFTER.contains(&idx) {
                xs = xs.max_pool2d(2)?;
            }
        }

        let xs = self.blocks[18].forward(&xs)?;
        let xs = self.blocks[19].forward(&xs)?;

        // レイヤ13の高解像度特徴をreorgしてレイヤ20の出力と結合する
        let high = passthrough.ok_or_else(|| {
            candle_core::Error::Msg("passthrough feature not captured".to_string())
        })?;
        let xs = Tensor::cat(&[&reorg(&high)?, &xs], 1)?;

        let xs = self.blocks[20].forward(&xs)?;
        Ok(self.head.forward(&xs)?)
    }
}

/// ネットワーク出力をアンカーごとの正規化された平面に展開した構造体
///
/// x/y/w/hは入力画像の幅・高さを1とした正規化座標、confはobjectness、
/// probはクラスごとの確率です。
#[derive(Debug, Clone)]
pub struct NetworkOutput {
    pub n_boxes: usize,
    pub n_classes: usize,
    pub grid_h: usize,
    pub grid_w: usize,
    /// 中心のx座標 `[n_boxes, grid_h, grid_w]`
    pub x: Vec<f32>,
    /// 中心のy座標 `[n_boxes, grid_h, grid_w]`
    pub y: Vec<f32>,
    /// 幅 `[n_boxes, grid_h, grid_w]`
    pub w: Vec<f32>,
    /// 高さ `[n_boxes, grid_h, grid_w]`
    pub h: Vec<f32>,
    /// objectness `[n_boxes, grid_h, grid_w]`
    pub conf: Vec<f32>,
    /// クラス確率 `[n_boxes, n_classes, grid_h, grid_w]`
    pub prob: Vec<f32>,
}

impl NetworkOutput {
    /// x/y/w/h/confの平面へのインデックス
    pub fn plane_idx(&self, b: usize, row: usize, col: usize) -> usize {
        (b * self.grid_h + row) * self.grid_w + col
    }

    /// probへのインデックス
    pub fn prob_idx(&self, b: usize, cls: usize, row: usize, col: usize) -> usize {
        ((b * self.n_classes + cls) * self.grid_h + row) * self.grid_w + col
    }
}

/// 検出ヘッドの生の出力を`NetworkOutput`に変換します。
///
/// x/y/confにはシグモイド、クラスにはソフトマックスを適用し、
/// x/yにはグリッドセルのオフセットを加算、w/hには`exp`とアンカーサイズを掛けて
/// グリッドサイズで正規化します。
///
/// # Args
/// * `head` - `forward`の出力 `[1, (n_classes + 5) * n_boxes, grid_h, grid_w]`
/// * `anchors` - アンカーボックスの(幅, 高さ) (グリッド単位)
/// * `n_classes` - クラス数
///
/// # Return
/// * 正規化された`NetworkOutput`
pub fn decode_head(head: &Tensor, anchors: &[(f32, f32)], n_classes: usize) -> Result<NetworkOutput> {
    let n_boxes = anchors.len();
    let (batch, ch, grid_h, grid_w) = head.dims4()?;
    if batch != 1 || ch != n_boxes * (5 + n_classes) {
        return Err(Error::OutputShape(head.dims().to_vec()));
    }
    let device = head.device();

    let out = head.reshape((n_boxes, 5 + n_classes, grid_h, grid_w))?;
    let tx = out.narrow(1, 0, 1)?.squeeze(1)?;
    let ty = out.narrow(1, 1, 1)?.squeeze(1)?;
    let tw = out.narrow(1, 2, 1)?.squeeze(1)?;
    let th = out.narrow(1, 3, 1)?.squeeze(1)?;
    let tconf = out.narrow(1, 4, 1)?.squeeze(1)?;
    let tprob = out.narrow(1, 5, n_classes)?;

    // グリッドセルのオフセット
    let grid_x = Tensor::arange(0f32, grid_w as f32, device)?.reshape((1, 1, grid_w))?;
    let grid_y = Tensor::arange(0f32, grid_h as f32, device)?.reshape((1, grid_h, 1))?;

    let x = (ops::sigmoid(&tx)?.broadcast_add(&grid_x)? / grid_w as f64)?;
    let y = (ops::sigmoid(&ty)?.broadcast_add(&grid_y)? / grid_h as f64)?;

    // アンカーサイズ [n_boxes, 1, 1]
    let anchor_w: Vec<f32> = anchors.iter().map(|a| a.0).collect();
    let anchor_h: Vec<f32> = anchors.iter().map(|a| a.1).collect();
    let anchor_w = Tensor::from_vec(anchor_w, (n_boxes, 1, 1), device)?;
    let anchor_h = Tensor::from_vec(anchor_h, (n_boxes, 1, 1), device)?;

    let w = (tw.exp()?.broadcast_mul(&anchor_w)? / grid_w as f64)?;
    let h = (th.exp()?.broadcast_mul(&anchor_h)? / grid_h as f64)?;

    let conf = ops::sigmoid(&tconf)?;
    let prob = ops::softmax(&tprob, 1)?;

    Ok(NetworkOutput {
        n_boxes,
        n_classes,
        grid_h,
        grid_w,
        x: x.flatten_all()?.to_vec1::<f32>()?,
        y: y.flatten_all()?.to_vec1::<f32>()?,
        w: w.flatten_all()?.to_vec1::<f32>()?,
        h: h.flatten_all()?.to_vec1::<f32>()?,
        conf: conf.flatten_all()?.to_vec1::<f32>()?,
        prob: prob.flatten_all()?.to_vec1::<f32>()?,
    })
}

//! YOLOv2の予測をコントロールするモジュール

use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use image::DynamicImage;
use log::info;

use crate::config::ModelConfig;
use crate::detection::Detection;
use crate::error::Result;
use crate::img_proc;
use crate::model::{self, YoloV2, INPUT_SIZE};
use crate::nms::nms;
use crate::postprocess;

/// モデルと閾値をまとめた予測器
pub struct Predictor {
    model: YoloV2,
    config: ModelConfig,
    detection_thresh: f32,
    iou_thresh: f32,
    device: Device,
}

impl Predictor {
    /// 変換済みの重みを読み込み、新しい`Predictor`を作成します。
    ///
    /// # Args
    /// * `config` - データセットのモデル設定
    /// * `weight_path` - safetensors形式の重みファイルへのパス
    /// * `detection_thresh` - 検出の閾値
    /// * `iou_thresh` - NMSのIoU閾値
    ///
    /// # Return
    /// * 新たな`Predictor`インスタンス
    pub fn new<P: AsRef<Path>>(
        config: ModelConfig,
        weight_path: P,
        detection_thresh: f32,
        iou_thresh: f32,
    ) -> Result<Self> {
        let device = Device::Cpu;
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weight_path.as_ref()], DType::F32, &device)?
        };
        let model = YoloV2::load(&vb, config.n_classes, config.n_boxes)?;
        info!(
            "model loaded: {} classes, {} anchors",
            config.n_classes, config.n_boxes
        );

        Ok(Self {
            model,
            config,
            detection_thresh,
            iou_thresh,
            device,
        })
    }

    /// 1枚の画像に対して物体検出を実行します。
    ///
    /// # Args
    /// * `img` - 入力画像
    ///
    /// # Return
    /// * NMS適用後の検出結果 (元画像のピクセル座標)
    pub fn run(&self, img: &DynamicImage) -> Result<Vec<Detection>> {
        let input = img_proc::to_input_tensor(img, INPUT_SIZE, &self.device)?;
        let head = self.model.forward(&input)?;
        let out = model::decode_head(&head, &self.config.anchors, self.config.n_classes)?;

        let detections = postprocess::decode(
            &out,
            &self.config.labels,
            self.detection_thresh,
            img.width(),
            img.height(),
        );
        Ok(nms(detections, self.iou_thresh))
    }
}

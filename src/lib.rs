//! # YOLOv2 推論・重み変換ライブラリ
//!
//! このクレートは、YOLOv2モデルによる物体検出と、darknet形式の重みファイルの
//! 変換を行うためのRustライブラリです。テンソル演算はcandleに委譲します。
//!
//! ## 主な機能
//!
//! 1. **重みの変換**: darknetのフラットな重みダンプをレイヤテーブルに沿って
//!    スライスし、safetensors形式のコンテナに書き出します。
//! 2. **画像の物体検出**: 変換済みの重みでYOLOv2モデルを構築し、1枚の画像から
//!    物体を検出します。
//! 3. **後処理**: ネットワーク出力をバウンディングボックスにデコードし、
//!    閾値処理とNon-Maximum Suppression (NMS) を適用します。
//!
//! ## Example
//! ```no_run
//! use yolo_v2_rs::config::{self, Dataset};
//! use yolo_v2_rs::predictor::Predictor;
//!
//! # fn main() -> anyhow::Result<()> {
//! let cfg = config::load("config.json", Dataset::Voc)?;
//! let predictor = Predictor::new(cfg, "yolov2_voc.safetensors", 0.5, 0.5)?;
//! let img = image::open("dog.jpg")?;
//! let result = predictor.run(&img)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod detection;
pub mod error;
pub mod img_proc;
pub mod model;
pub mod nms;
pub mod postprocess;
pub mod predictor;
pub mod weights;

pub use error::{Error, Result};

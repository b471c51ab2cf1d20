//! クレート全体のエラー型を定義するモジュール

use std::path::PathBuf;

use thiserror::Error;

/// クレート共通のResult型
pub type Result<T> = std::result::Result<T, Error>;

/// 予測・重み変換で発生するエラーの列挙型
#[derive(Debug, Error)]
pub enum Error {
    /// 設定ファイルが見つからない
    #[error("config file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 未知のデータセット名が指定された
    #[error("unknown dataset type: {0} (expected \"voc\" or \"coco\")")]
    UnknownDatasetType(String),

    /// 設定の内容に矛盾がある
    #[error("invalid config for {dataset}: {reason}")]
    InvalidConfig { dataset: String, reason: String },

    /// 画像の読み込みに失敗した
    #[error("failed to read image: {path}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// 重みファイルの長さがレイヤテーブルの合計と一致しない
    #[error("weight length mismatch: consumed {consumed} floats but file has {total}")]
    WeightLengthMismatch { consumed: usize, total: usize },

    /// 重みファイルが途中で終わっている
    #[error(
        "weight file too short: need {needed} floats at offset {offset}, only {remaining} left"
    )]
    WeightFileTooShort {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    /// 重みファイルの形式が不正
    #[error("malformed weight file: {0}")]
    MalformedWeights(String),

    /// ネットワーク出力の形状が想定と異なる
    #[error("unexpected network output shape: {0:?}")]
    OutputShape(Vec<usize>),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

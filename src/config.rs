//! データセットごとのモデル設定を読み込むモジュール

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};

/// 対応しているデータセットの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Voc,
    Coco,
}

impl Dataset {
    /// 設定ファイル内のキー名を返します。
    pub fn key(&self) -> &'static str {
        match self {
            Dataset::Voc => "voc",
            Dataset::Coco => "coco",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Dataset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "voc" => Ok(Dataset::Voc),
            "coco" => Ok(Dataset::Coco),
            other => Err(Error::UnknownDatasetType(other.to_string())),
        }
    }
}

/// データセットごとのモデル設定
///
/// `config.json` の1エントリに対応します。
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// クラス数
    pub n_classes: usize,
    /// アンカーボックスの数
    pub n_boxes: usize,
    /// クラスのラベル (class_id順)
    pub labels: Vec<String>,
    /// アンカーボックスの(幅, 高さ)の組 (グリッド単位)
    pub anchors: Vec<(f32, f32)>,
}

impl ModelConfig {
    /// 検出ヘッドの出力チャネル数を返します。
    pub fn head_out_channels(&self) -> usize {
        (self.n_classes + 5) * self.n_boxes
    }

    fn validate(&self, dataset: Dataset) -> Result<()> {
        if self.labels.len() != self.n_classes {
            return Err(Error::InvalidConfig {
                dataset: dataset.to_string(),
                reason: format!(
                    "n_classes is {} but {} labels given",
                    self.n_classes,
                    self.labels.len()
                ),
            });
        }
        if self.anchors.len() != self.n_boxes {
            return Err(Error::InvalidConfig {
                dataset: dataset.to_string(),
                reason: format!(
                    "n_boxes is {} but {} anchors given",
                    self.n_boxes,
                    self.anchors.len()
                ),
            });
        }
        Ok(())
    }
}

/// 設定ファイルを読み込み、指定したデータセットのエントリを返します。
///
/// # Args
/// * `path` - 設定ファイル (JSON) へのパス
/// * `dataset` - データセットの種類
///
/// # Return
/// * 検証済みの`ModelConfig`
pub fn load<P: AsRef<Path>>(path: P, dataset: Dataset) -> Result<ModelConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    let mut entries: HashMap<String, ModelConfig> = serde_json::from_str(&text)?;
    let config = entries
        .remove(dataset.key())
        .ok_or_else(|| Error::UnknownDatasetType(dataset.key().to_string()))?;
    config.validate(dataset)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "voc": {
            "n_classes": 2,
            "n_boxes": 2,
            "labels": ["cat", "dog"],
            "anchors": [[1.0, 2.0], [3.0, 4.0]]
        }
    }"#;

    #[test]
    fn dataset_from_str() {
        assert_eq!("voc".parse::<Dataset>().unwrap(), Dataset::Voc);
        assert_eq!("coco".parse::<Dataset>().unwrap(), Dataset::Coco);
        assert!(matches!(
            "imagenet".parse::<Dataset>(),
            Err(Error::UnknownDatasetType(_))
        ));
    }

    #[test]
    fn parse_sample_entry() {
        let entries: HashMap<String, ModelConfig> = serde_json::from_str(SAMPLE).unwrap();
        let config = &entries["voc"];
        assert_eq!(config.n_classes, 2);
        assert_eq!(config.labels, vec!["cat", "dog"]);
        assert_eq!(config.anchors, vec![(1.0, 2.0), (3.0, 4.0)]);
        assert_eq!(config.head_out_channels(), (2 + 5) * 2);
        config.validate(Dataset::Voc).unwrap();
    }

    #[test]
    fn validate_rejects_mismatched_labels() {
        let config = ModelConfig {
            n_classes: 3,
            n_boxes: 1,
            labels: vec!["cat".into()],
            anchors: vec![(1.0, 1.0)],
        };
        assert!(matches!(
            config.validate(Dataset::Voc),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn validate_rejects_mismatched_anchors() {
        let config = ModelConfig {
            n_classes: 1,
            n_boxes: 5,
            labels: vec!["cat".into()],
            anchors: vec![(1.0, 1.0)],
        };
        assert!(matches!(
            config.validate(Dataset::Voc),
            Err(Error::InvalidConfig { .. })
        ));
    }
}

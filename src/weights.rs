//! darknet形式の重みファイルをsafetensorsコンテナに変換するモジュール
//!
//! 重みファイルはリトルエンディアンのfloat32配列で、先頭4要素のヘッダに続いて
//! レイヤごとに bias / BNスケール / 移動平均 / 移動分散 / 畳み込み重み の順で
//! パラメータが並びます。最後の検出ヘッドだけはbiasと畳み込み重みのみです。

use std::collections::HashMap;
use std::path::Path;

use candle_core::{Device, Tensor};
use log::debug;

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::model::{CONV_LAYERS, HEAD_IN_CH};

/// ヘッダ (4 x int) の要素数
pub const HEADER_LEN: usize = 4;

/// BNレイヤのパラメータスロット (darknetの格納順)
const BN_SLOTS: [&str; 4] = ["bias", "weight", "running_mean", "running_var"];

/// フラットなfloat配列を順に消費するカーソル
struct Cursor<'a> {
    dat: &'a [f32],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [f32]> {
        let remaining = self.dat.len() - self.offset;
        if len > remaining {
            return Err(Error::WeightFileTooShort {
                offset: self.offset,
                needed: len,
                remaining,
            });
        }
        let slice = &self.dat[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }
}

/// darknetの重みファイルを読み込み、ヘッダを取り除いたfloat配列を返します。
///
/// # Args
/// * `path` - 重みファイルへのパス
///
/// # Return
/// * ヘッダ以降のパラメータ列
pub fn read_darknet<P: AsRef<Path>>(path: P) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path)?;
    if bytes.len() % 4 != 0 {
        return Err(Error::MalformedWeights(format!(
            "file size {} is not a multiple of 4",
            bytes.len()
        )));
    }
    let mut floats: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    if floats.len() < HEADER_LEN {
        return Err(Error::MalformedWeights(format!(
            "file has only {} floats, header needs {}",
            floats.len(),
            HEADER_LEN
        )));
    }
    Ok(floats.split_off(HEADER_LEN))
}

/// レイヤテーブルが消費するfloatの総数 (ヘッダを除く)
pub fn expected_len(config: &ModelConfig) -> usize {
    let body: usize = CONV_LAYERS
        .iter()
        .map(|&(in_ch, out_ch, ksize)| out_ch * 4 + out_ch * in_ch * ksize * ksize)
        .sum();
    let head_out = config.head_out_channels();
    body + head_out + head_out * HEAD_IN_CH
}

/// ヘッダを除いたfloat配列をレイヤテーブルに沿ってスライスし、名前付きテンソルに変換します。
///
/// 全レイヤを消費した後のオフセットが入力の長さと一致しない場合は
/// `WeightLengthMismatch`で失敗します。
///
/// # Args
/// * `dat` - ヘッダを除いたパラメータ列
/// * `config` - モデル設定 (検出ヘッドの出力チャネル数の計算に使用)
/// * `device` - テンソルを配置するデバイス
///
/// # Return
/// * テンソル名から`Tensor`へのマップ
pub fn convert(
    dat: &[f32],
    config: &ModelConfig,
    device: &Device,
) -> Result<HashMap<String, Tensor>> {
    let mut tensors = HashMap::new();
    let mut cursor = Cursor { dat, offset: 0 };

    for (i, &(in_ch, out_ch, ksize)) in CONV_LAYERS.iter().enumerate() {
        let idx = i + 1;
        for slot in BN_SLOTS {
            let v = cursor.take(out_ch)?;
            tensors.insert(format!("bn{idx}.{slot}"), Tensor::from_slice(v, out_ch, device)?);
        }
        let v = cursor.take(out_ch * in_ch * ksize * ksize)?;
        tensors.insert(
            format!("conv{idx}.weight"),
            Tensor::from_slice(v, (out_ch, in_ch, ksize, ksize), device)?,
        );
        debug!("layer {}: offset {}", idx, cursor.offset);
    }

    // 検出ヘッドはbiasと畳み込み重みのみ (BNなし)
    let head_idx = CONV_LAYERS.len() + 1;
    let head_out = config.head_out_channels();
    let v = cursor.take(head_out)?;
    tensors.insert(
        format!("conv{head_idx}.bias"),
        Tensor::from_slice(v, head_out, device)?,
    );
    let v = cursor.take(head_out * HEAD_IN_CH)?;
    tensors.insert(
        format!("conv{head_idx}.weight"),
        Tensor::from_slice(v, (head_out, HEAD_IN_CH, 1, 1), device)?,
    );
    debug!("layer {}: offset {}", head_idx, cursor.offset);

    if cursor.offset != dat.len() {
        return Err(Error::WeightLengthMismatch {
            consumed: cursor.offset,
            total: dat.len(),
        });
    }
    Ok(tensors)
}

/// 変換済みのテンソルをsafetensors形式で保存します。
///
/// # Args
/// * `tensors` - `convert`が返したテンソルのマップ
/// * `path` - 出力先のパス
pub fn save<P: AsRef<Path>>(tensors: &HashMap<String, Tensor>, path: P) -> Result<()> {
    candle_core::safetensors::save(tensors, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voc_config() -> ModelConfig {
        ModelConfig {
            n_classes: 20,
            n_boxes: 5,
            labels: (0..20).map(|i| format!("class{i}")).collect(),
            anchors: vec![(1., 1.); 5],
        }
    }

    #[test]
    fn expected_len_voc_table() {
        let config = voc_config();
        // 本体: Σ (4 * out + out * in * k^2), ヘッド: 125 + 125 * 1024
        assert_eq!(config.head_out_channels(), 125);
        assert_eq!(expected_len(&config), 67_029_984 + 125 + 125 * 1024);
    }

    #[test]
    fn convert_consumes_whole_array() {
        let config = voc_config();
        let dat = vec![0.5f32; expected_len(&config)];
        let tensors = convert(&dat, &config, &Device::Cpu).unwrap();

        // 21レイヤ x 5テンソル + ヘッドの2テンソル
        assert_eq!(tensors.len(), CONV_LAYERS.len() * 5 + 2);
        assert_eq!(tensors["conv1.weight"].dims(), &[32, 3, 3, 3]);
        assert_eq!(tensors["bn21.running_var"].dims(), &[1024]);
        assert_eq!(tensors["conv22.bias"].dims(), &[125]);
        assert_eq!(tensors["conv22.weight"].dims(), &[125, 1024, 1, 1]);
    }

    #[test]
    fn convert_rejects_trailing_floats() {
        let config = voc_config();
        let dat = vec![0.5f32; expected_len(&config) + 1];
        assert!(matches!(
            convert(&dat, &config, &Device::Cpu),
            Err(Error::WeightLengthMismatch { consumed, total })
                if total == consumed + 1
        ));
    }

    #[test]
    fn convert_rejects_truncated_input() {
        let config = voc_config();
        let dat = vec![0.5f32; expected_len(&config) - 1];
        assert!(matches!(
            convert(&dat, &config, &Device::Cpu),
            Err(Error::WeightFileTooShort { .. })
        ));
    }

    #[test]
    fn read_darknet_skips_header() {
        let path = std::env::temp_dir().join(format!("yolo_v2_rs_weights_{}", std::process::id()));
        let mut bytes = Vec::new();
        for v in [0f32, 1., 2., 3., 10.5, -1.25] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        std::fs::write(&path, &bytes).unwrap();
        let dat = read_darknet(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(dat, vec![10.5, -1.25]);
    }

    #[test]
    fn read_darknet_rejects_odd_size() {
        let path = std::env::temp_dir().join(format!("yolo_v2_rs_odd_{}", std::process::id()));
        std::fs::write(&path, [0u8; 18]).unwrap();
        let result = read_darknet(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(Error::MalformedWeights(_))));
    }
}

//! ネットワーク出力を検出結果に変換するモジュール

use crate::detection::{Detection, PredBox};
use crate::model::NetworkOutput;

/// 正規化されたネットワーク出力から検出結果を抽出します。
///
/// 各グリッドセル・アンカーについて`objectness * max(クラス確率)`を複合スコアとし、
/// `detection_thresh`を超えたものだけをピクセル座標の`Detection`として返します。
/// ボックスは元画像の大きさにスケールし、画像の枠内にクリップします。
///
/// # Args
/// * `out` - ネットワーク出力
/// * `labels` - クラスのラベル (class_id順)
/// * `detection_thresh` - 検出の閾値
/// * `img_w`, `img_h` - 元画像の幅と高さ
///
/// # Return
/// * 検出結果の配列。何も検出されなければ空の配列 (エラーではない)
pub fn decode(
    out: &NetworkOutput,
    labels: &[String],
    detection_thresh: f32,
    img_w: u32,
    img_h: u32,
) -> Vec<Detection> {
    let mut results = Vec::new();

    for b in 0..out.n_boxes {
        for row in 0..out.grid_h {
            for col in 0..out.grid_w {
                let idx = out.plane_idx(b, row, col);
                let objectness = out.conf[idx];

                let probs: Vec<f32> = (0..out.n_classes)
                    .map(|cls| out.prob[out.prob_idx(b, cls, row, col)])
                    .collect();
                let (class_id, &max_prob) = probs
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .unwrap_or((0, &0.));

                let score = objectness * max_prob;
                if score <= detection_thresh {
                    continue;
                }

                let bbox = PredBox::new(
                    out.x[idx] * img_w as f32,
                    out.y[idx] * img_h as f32,
                    out.w[idx] * img_w as f32,
                    out.h[idx] * img_h as f32,
                )
                .clip(img_w as f32, img_h as f32);

                results.push(Detection {
                    class_id,
                    label: labels.get(class_id).cloned().unwrap_or_default(),
                    probs,
                    objectness,
                    score,
                    bbox,
                });
            }
        }
    }
    results
}

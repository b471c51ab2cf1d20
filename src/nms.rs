use crate::detection::{Detection, PredBox};

/// 2つのバウンディングボックスのIoU (Intersection over Union) を計算します。
///
/// # Args
/// * `a`, `b` - 比較するバウンディングボックス
///
/// # Return
/// * `[0, 1]`のIoU。面積0のボックスは常に0を返します
pub fn iou(a: &PredBox, b: &PredBox) -> f32 {
    let (ax1, ay1) = a.left_top();
    let (ax2, ay2) = a.right_bottom();
    let (bx1, by1) = b.left_top();
    let (bx2, by2) = b.right_bottom();

    let iw = f32::min(ax2, bx2) - f32::max(ax1, bx1);
    let ih = f32::min(ay2, by2) - f32::max(ay1, by1);
    if iw <= 0. || ih <= 0. {
        return 0.;
    }

    let intersection = iw * ih;
    let union = a.area() + b.area() - intersection;
    if union <= 0. {
        return 0.;
    }
    intersection / union
}

/// Non-Maximum Suppression (NMS) を適用します。
///
/// スコアの降順にソートし (同スコアは入力順を保持)、スコアが最大のものから順に採用します。
/// 採用済みのボックスとのIoUが`iou_threshold`を超える検出は捨てられます。
///
/// # Args
/// * `detections` - 検出結果の配列
/// * `iou_threshold` - 重複とみなすIoUの閾値
///
/// # Return
/// * 採用された検出結果 (スコアの降順)
pub fn nms(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections;
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::with_capacity(sorted.len());
    'candidates: for d in sorted {
        for k in &kept {
            if iou(&k.bbox, &d.bbox) > iou_threshold {
                continue 'candidates;
            }
        }
        kept.push(d);
    }
    kept
}

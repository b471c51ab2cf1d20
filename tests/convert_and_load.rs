//! 重み変換とモデル構築の整合性を確認する統合テスト

use candle_core::{DType, Device};
use candle_nn::VarBuilder;

use yolo_v2_rs::config::ModelConfig;
use yolo_v2_rs::detection::PredBox;
use yolo_v2_rs::model::{NetworkOutput, YoloV2};
use yolo_v2_rs::nms::nms;
use yolo_v2_rs::{postprocess, weights};

fn voc_config() -> ModelConfig {
    ModelConfig {
        n_classes: 20,
        n_boxes: 5,
        labels: (0..20).map(|i| format!("class{i}")).collect(),
        anchors: vec![
            (1.3221, 1.73145),
            (3.19275, 4.00944),
            (5.05587, 8.09892),
            (9.47112, 4.84053),
            (11.2364, 10.0071),
        ],
    }
}

/// 変換器が出力するテンソル名と形状が、モデルの`VarBuilder`ルックアップと一致すること
#[test]
fn converted_tensors_align_with_model() {
    let config = voc_config();
    let device = Device::Cpu;

    let dat = vec![0.01f32; weights::expected_len(&config)];
    let tensors = weights::convert(&dat, &config, &device).unwrap();

    let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
    YoloV2::load(&vb, config.n_classes, config.n_boxes).unwrap();
}

/// デコードとNMSを通したエンドツーエンドの挙動
#[test]
fn decode_then_nms_keeps_best_per_cluster() {
    let grid = 4;
    let n = grid * grid;
    let mut out = NetworkOutput {
        n_boxes: 1,
        n_classes: 2,
        grid_h: grid,
        grid_w: grid,
        x: vec![0.5; n],
        y: vec![0.5; n],
        w: vec![0.25; n],
        h: vec![0.25; n],
        conf: vec![0.; n],
        prob: vec![0.; 2 * n],
    };

    // ほぼ同じ場所を指す2つのセルと、離れた場所の1つのセル
    for (row, col, conf, x) in [(0, 0, 0.9, 0.50), (0, 1, 0.8, 0.51), (3, 3, 0.7, 0.05)] {
        let idx = out.plane_idx(0, row, col);
        out.conf[idx] = conf;
        out.x[idx] = x;
        let pidx = out.prob_idx(0, 1, row, col);
        out.prob[pidx] = 1.0;
    }
    // (3,3)のボックスは別の場所に移す
    let far = out.plane_idx(0, 3, 3);
    out.y[far] = 0.05;
    out.w[far] = 0.05;
    out.h[far] = 0.05;

    let labels = vec!["cat".to_string(), "dog".to_string()];
    let detections = postprocess::decode(&out, &labels, 0.5, 640, 640);
    assert_eq!(detections.len(), 3);

    let kept = nms(detections, 0.5);
    assert_eq!(kept.len(), 2);
    assert!((kept[0].score - 0.9).abs() < 1e-6);
    assert!((kept[1].score - 0.7).abs() < 1e-6);
    assert_eq!(kept[0].label, "dog");
}

/// NMSの採用結果同士は閾値を超えて重ならないこと
#[test]
fn nms_pairwise_iou_bounded() {
    let labels = vec!["cat".to_string()];
    let grid = 2;
    let n = grid * grid;
    let out = NetworkOutput {
        n_boxes: 1,
        n_classes: 1,
        grid_h: grid,
        grid_w: grid,
        x: vec![0.5, 0.52, 0.48, 0.1],
        y: vec![0.5, 0.5, 0.5, 0.1],
        w: vec![0.3; n],
        h: vec![0.3; n],
        conf: vec![0.9, 0.8, 0.7, 0.6],
        prob: vec![1.0; n],
    };

    let kept = nms(postprocess::decode(&out, &labels, 0.5, 640, 640), 0.4);
    for (i, a) in kept.iter().enumerate() {
        for b in kept.iter().skip(i + 1) {
            let v = iou_of(&a.bbox, &b.bbox);
            assert!(v <= 0.4, "kept boxes overlap with IoU {v}");
        }
    }
}

fn iou_of(a: &PredBox, b: &PredBox) -> f32 {
    yolo_v2_rs::nms::iou(a, b)
}

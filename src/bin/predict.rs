//! 指定したパスの画像を読み込み、BBox及びクラスの予測を行うCLI

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use yolo_v2_rs::config::{self, Dataset};
use yolo_v2_rs::img_proc;
use yolo_v2_rs::predictor::Predictor;
use yolo_v2_rs::Error;

#[derive(Parser, Debug)]
#[command(about = "指定したパスの画像を読み込み、BBox及びクラスの予測を行う")]
struct Args {
    /// データセットの種類 (voc / coco)
    dtype: String,
    /// 画像ファイルへのパス
    path: PathBuf,
    /// 変換済みの重みファイル (safetensors)
    weight: PathBuf,
    /// detection threshold
    #[arg(long, default_value_t = 0.5)]
    thresh: f32,
    /// IoU threshold in NMS
    #[arg(long, default_value_t = 0.5)]
    iou: f32,
    /// 設定ファイルへのパス
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    /// 結果画像の保存先
    #[arg(long, default_value = "yolov2_result.jpg")]
    out: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let dataset: Dataset = args.dtype.parse()?;
    let cfg = config::load(&args.config, dataset)?;

    info!("loading image...");
    let img = image::open(&args.path).map_err(|source| Error::ImageRead {
        path: args.path.clone(),
        source,
    })?;

    info!("loading {} model...", dataset);
    let predictor = Predictor::new(cfg, &args.weight, args.thresh, args.iou)?;

    let results = predictor.run(&img)?;

    // 結果を描画して保存
    let font = img_proc::load_font();
    let mut rgb_img = img.to_rgb8();
    img_proc::draw_bbox(&mut rgb_img, &results, font.as_ref(), 20., 5.);

    for d in &results {
        println!("{}({:.0}%)", d.label, d.score * 100.);
    }

    info!("save results to {}", args.out.display());
    rgb_img.save(&args.out)?;

    Ok(())
}

//! darknetの重みファイルをsafetensors形式に変換するCLI

use std::path::PathBuf;

use anyhow::Result;
use candle_core::Device;
use clap::Parser;
use log::info;

use yolo_v2_rs::config::{self, Dataset};
use yolo_v2_rs::weights;

#[derive(Parser, Debug)]
#[command(about = "darknetの重みファイルを読み込み、safetensors形式に変換する")]
struct Args {
    /// データセットの種類 (voc / coco)
    dtype: String,
    /// original darknet weight
    infile: PathBuf,
    /// converted weights
    outfile: PathBuf,
    /// 設定ファイルへのパス
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let dataset: Dataset = args.dtype.parse()?;
    let cfg = config::load(&args.config, dataset)?;

    info!("loading {}", args.infile.display());
    let dat = weights::read_darknet(&args.infile)?;

    let tensors = weights::convert(&dat, &cfg, &Device::Cpu)?;

    info!("save weights file to {}", args.outfile.display());
    weights::save(&tensors, &args.outfile)?;

    Ok(())
}

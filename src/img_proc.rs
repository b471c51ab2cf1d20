//! 画像の前処理と検出結果の描画を行うモジュール

use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use image::{DynamicImage, Pixel, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use log::warn;
use rusttype::{Font, Scale};

use crate::detection::Detection;
use crate::error::Result;

const COLORS: [[u8; 3]; 10] = [
    [255, 0, 0],
    [255, 255, 0],
    [0, 0, 255],
    [14, 23, 50],
    [28, 105, 80],
    [190, 159, 53],
    [46, 194, 148],
    [242, 30, 131],
    [97, 101, 198],
    [115, 11, 87],
];

/// ラベル描画に使うフォントの探索パス
const FONT_PATHS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

/// 画像をネットワーク入力用のテンソルに変換します。
///
/// 画像を`size` x `size`にリサイズし、RGB各チャネルを`[0, 1]`に正規化した
/// `[1, 3, size, size]`のテンソルを返します。
///
/// # Args
/// * `img` - 入力画像
/// * `size` - リサイズ後の一辺のピクセル数
/// * `device` - テンソルを配置するデバイス
pub fn to_input_tensor(img: &DynamicImage, size: usize, device: &Device) -> Result<Tensor> {
    let resized = img.resize_exact(size as u32, size as u32, FilterType::Triangle);
    let rgb = resized.to_rgb8();

    let plane = size * size;
    let mut data = vec![0f32; 3 * plane];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let base = y as usize * size + x as usize;
        data[base] = pixel[0] as f32 / 255.;
        data[plane + base] = pixel[1] as f32 / 255.;
        data[2 * plane + base] = pixel[2] as f32 / 255.;
    }
    Ok(Tensor::from_vec(data, (1, 3, size, size), device)?)
}

/// システムのフォントパスからラベル描画用のフォントを読み込みます。
///
/// # Return
/// * 読み込めたフォント。どのパスにもフォントがなければ`None`
pub fn load_font() -> Option<Font<'static>> {
    for path in FONT_PATHS {
        if let Ok(data) = std::fs::read(path) {
            if let Some(font) = Font::try_from_vec(data) {
                return Some(font);
            }
        }
    }
    warn!("no usable font found, bounding boxes are drawn without labels");
    None
}

/// 画像上に線を描画します。
///
/// # Args
///
/// * `img` - 線を描画する画像 (in-place)
/// * `x1`, `y1`, `x2`, `y2` - 線の始点と終点の座標
/// * `thickness` - 線の太さ
/// * `color` - 線の色
fn draw_line(
    img: &mut RgbImage,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    thickness: f32,
    color: Rgb<u8>,
) {
    let (bx, by) = (x1 - (thickness / 2.).floor(), y1 - (thickness / 2.).floor());

    let (w, h) = if x1 == x2 {
        (thickness, (y2 - y1).abs() + thickness)
    } else {
        ((x2 - x1).abs() + thickness, thickness)
    };

    let rect = Rect::at(bx as i32, by as i32).of_size(w as u32, h as u32);
    draw_filled_rect_mut(img, rect, color);
}

/// 画像上に矩形を描画します。
///
/// # Args
///
/// * `img` - 矩形を描画する画像 (in-place)
/// * `x1`, `y1`, `x2`, `y2` - 矩形の左上と右下の座標
/// * `thickness` - 線の太さ
/// * `color` - 線の色
fn draw_rect(
    img: &mut RgbImage,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    thickness: f32,
    color: Rgb<u8>,
) {
    draw_line(img, x1, y1, x1, y2, thickness, color);
    draw_line(img, x1, y2, x2, y2, thickness, color);
    draw_line(img, x1, y1, x2, y1, thickness, color);
    draw_line(img, x2, y1, x2, y2, thickness, color);
}

/// 画像上にラベルを描画します。
///
/// # Args
///
/// * `img` - ラベルを描画する画像 (in-place)
/// * `x1`, `y1` - ラベルの左上の座標
/// * `line_thickness` - ラベルの枠線の太さ
/// * `bg_color` - ラベルの背景色
/// * `font` - ラベルのフォント
/// * `font_size` - ラベルのフォントサイズ
/// * `text` - ラベルに表示するテキスト
fn draw_label(
    img: &mut RgbImage,
    x1: f32,
    y1: f32,
    line_thickness: f32,
    bg_color: Rgb<u8>,
    font: &Font,
    font_size: f32,
    text: &str,
) {
    let label_h = font_size;
    let dx1 = x1 - (line_thickness / 2.).floor();
    let label_y = y1 - label_h;

    let pad = 6.;
    let scale = Scale::uniform(label_h);
    let (text_w, _) = text_size(scale, font, text);
    let v_metrics = font.v_metrics(scale);
    let text_h = v_metrics.ascent - v_metrics.descent + v_metrics.line_gap;

    let rect = Rect::at(dx1 as i32, label_y as i32)
        .of_size((text_w as f32 + pad * 2.) as u32, label_h as u32);
    draw_filled_rect_mut(img, rect, bg_color);

    let text_y = label_y + (label_h - text_h) / 2.;

    let text_color = if (bg_color[0] as i32 + bg_color[1] as i32 + bg_color[2] as i32) < 382 {
        Rgb([255u8, 255, 255])
    } else {
        Rgb([0u8, 0, 0])
    };
    draw_text_mut(
        img,
        text_color,
        (dx1 + pad) as i32,
        text_y as i32,
        scale,
        font,
        text,
    );
}

/// 画像上にバウンディングボックスとラベルを描画します。
///
/// # Args
///
/// * `img` - バウンディングボックスとラベルを描画する画像 (in-place)
/// * `d_result` - 検出結果の配列
/// * `font` - ラベルのフォント。`None`ならボックスのみ描画する
/// * `font_size` - ラベルのフォントサイズ
/// * `line_thickness` - バウンディングボックスの線の太さ
pub fn draw_bbox(
    img: &mut RgbImage,
    d_result: &[Detection],
    font: Option<&Font>,
    font_size: f32,
    line_thickness: f32,
) {
    // スコアの高い検出を最後に描画する
    let mut sorted = d_result.to_vec();
    sorted.sort_by(|a, b| a.score.total_cmp(&b.score));

    for d in sorted.iter() {
        let color: Rgb<u8> = *Rgb::from_slice(&COLORS[d.class_id % COLORS.len()]);

        let (x1, y1) = d.bbox.left_top();
        let (x2, y2) = d.bbox.right_bottom();
        let (x1, y1, x2, y2) = (x1.round(), y1.round(), x2.round(), y2.round());

        draw_rect(img, x1, y1, x2, y2, line_thickness, color);

        if let Some(font) = font {
            let text = format!("{}({:.0}%)", d.label, d.score * 100.);
            draw_label(img, x1, y1, line_thickness, color, font, font_size, &text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_tensor_shape_and_range() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([255, 0, 128])));
        let t = to_input_tensor(&img, 4, &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[1, 3, 4, 4]);

        let v = t.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(v.iter().all(|&p| (0. ..=1.).contains(&p)));
        // Rチャネルは全て1.0
        assert!(v[..16].iter().all(|&p| (p - 1.0).abs() < 1e-6));
    }
}

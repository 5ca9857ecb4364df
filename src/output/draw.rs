// 该文件是 Jishu （计数） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Jishu 项目贡献者

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::detect::{BoundingBox, Prediction};

const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const BOX_THICKNESS: i32 = 2;

pub struct Draw {
  color: [u8; 3],
  thickness: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      color: BOX_COLOR,
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = color;
    self
  }

  /// 归一化坐标换算为像素坐标，超出图像的部分被截断
  fn pixel_rect(&self, image: &RgbImage, bbox: &BoundingBox) -> Option<(i32, i32, i32, i32)> {
    let (w, h) = (image.width() as f32, image.height() as f32);
    if w < 1.0 || h < 1.0 {
      return None;
    }

    let x_min = ((bbox.xmin * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((bbox.ymin * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((bbox.xmax * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((bbox.ymax * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return None;
    }
    Some((x_min, y_min, x_max, y_max))
  }

  pub fn draw_predictions(&self, image: &mut RgbImage, predictions: &[Prediction]) {
    for prediction in predictions {
      let Some((x_min, y_min, x_max, y_max)) = self.pixel_rect(image, &prediction.bbox) else {
        continue;
      };

      // 向内逐层绘制以加粗边框
      for t in 0..self.thickness {
        let width = x_max - x_min - 2 * t;
        let height = y_max - y_min - 2 * t;
        if width <= 0 || height <= 0 {
          break;
        }
        let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
        draw_hollow_rect_mut(image, rect, Rgb(self.color));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn draws_box_edges_only() {
    let mut image = RgbImage::new(100, 100);
    let prediction = Prediction {
      class_name: "cat".to_string(),
      bbox: BoundingBox::new(0.1, 0.1, 0.5, 0.5).unwrap(),
      score: 0.9,
    };
    Draw::default().draw_predictions(&mut image, &[prediction]);

    assert_eq!(image.get_pixel(10, 10), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(11, 30), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(50, 50), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(30, 30), &Rgb([0, 0, 0]));
    assert_eq!(image.get_pixel(70, 70), &Rgb([0, 0, 0]));
  }
}

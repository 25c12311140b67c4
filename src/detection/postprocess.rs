// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 前处理 / 后处理 (Pre- and post-processing)
// 与推理后端无关: letterbox 输入张量, YOLOv8 输出解码, NMS, 人脸网格取眼部关键点

use image::{imageops::FilterType, RgbImage};
use ndarray::{s, Array, ArrayView2, Axis, Ix4};

use super::{DetectError, EyeLandmarks, FaceLandmarks, Point2};
use crate::frame::Region;

const CXYWH_OFFSET: usize = 4;
const PAD_VALUE: f32 = 144.0 / 255.0;

/// Mesh indices around each eye, ordered outer corner, upper lid (2), inner
/// corner, lower lid (2).
pub const LEFT_EYE_MESH: [usize; 6] = [33, 160, 158, 133, 153, 144];
pub const RIGHT_EYE_MESH: [usize; 6] = [362, 385, 387, 263, 373, 380];

/// Scale factor from original pixels to network input pixels.
pub fn scale_ratio(w0: u32, h0: u32, w1: u32, h1: u32) -> f32 {
    (w1 as f32 / w0 as f32).min(h1 as f32 / h0 as f32)
}

/// Keep-aspect resize into the top-left of a `size`×`size` canvas padded
/// with grey, as a normalized NCHW tensor. Returns the tensor and the ratio
/// used.
pub fn letterbox(image: &RgbImage, size: u32) -> (Array<f32, Ix4>, f32) {
    let (w0, h0) = image.dimensions();
    let ratio = scale_ratio(w0, h0, size, size);
    let w_new = ((w0 as f32 * ratio).round() as u32).clamp(1, size);
    let h_new = ((h0 as f32 * ratio).round() as u32).clamp(1, size);
    let resized = image::imageops::resize(image, w_new, h_new, FilterType::Triangle);

    let mut ys = Array::ones((1, 3, size as usize, size as usize));
    ys.fill(PAD_VALUE);
    for (x, y, rgb) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = rgb.0;
        ys[[0, 0, y, x]] = r as f32 / 255.0;
        ys[[0, 1, y, x]] = g as f32 / 255.0;
        ys[[0, 2, y, x]] = b as f32 / 255.0;
    }
    (ys, ratio)
}

/// Plain resize to `size`×`size`, normalized NCHW.
pub fn stretch(image: &RgbImage, size: u32) -> Array<f32, Ix4> {
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let mut ys = Array::zeros((1, 3, size as usize, size as usize));
    for (x, y, rgb) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            ys[[0, c, y, x]] = rgb.0[c] as f32 / 255.0;
        }
    }
    ys
}

/// Decode a YOLOv8 detection head laid out as `[1, 4 + nc, anchors]` into
/// boxes in original-image pixels, then suppress overlaps.
///
/// `classes` limits the result to the given class ids when set.
pub fn decode_yolov8(
    output: &[f32],
    dims: &[usize],
    ratio: f32,
    original: (u32, u32),
    confidence: f32,
    iou: f32,
    classes: Option<&[u32]>,
) -> Result<Vec<Region>, DetectError> {
    let (rows, anchors) = match dims {
        [1, rows, anchors] if *rows > CXYWH_OFFSET => (*rows, *anchors),
        _ => {
            return Err(DetectError::Inference(format!(
                "unexpected YOLOv8 output shape {:?}",
                dims
            )))
        }
    };
    let preds = ArrayView2::from_shape((rows, anchors), output)
        .map_err(|e| DetectError::Inference(e.to_string()))?;
    let (width_original, height_original) = (original.0 as f32, original.1 as f32);

    let mut data = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        let bbox = pred.slice(s![0..CXYWH_OFFSET]);
        let clss = pred.slice(s![CXYWH_OFFSET..]);
        let Some((id, &score)) = clss
            .iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };
        if score < confidence {
            continue;
        }
        if let Some(wanted) = classes {
            if !wanted.contains(&(id as u32)) {
                continue;
            }
        }

        let cx = bbox[0] / ratio;
        let cy = bbox[1] / ratio;
        let w = bbox[2] / ratio;
        let h = bbox[3] / ratio;
        let x1 = (cx - w / 2.).clamp(0.0, width_original);
        let y1 = (cy - h / 2.).clamp(0.0, height_original);
        let x2 = (cx + w / 2.).clamp(0.0, width_original);
        let y2 = (cy + h / 2.).clamp(0.0, height_original);
        data.push(Region::new(x1, y1, x2, y2).with_score(id as u32, score));
    }

    non_max_suppression(&mut data, iou);
    Ok(data)
}

/// Greedy NMS: keep the most confident box, drop later ones overlapping a
/// kept box above `iou_threshold`.
pub fn non_max_suppression(xs: &mut Vec<Region>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].iou(&xs[index]) > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// Pick both eyes out of a flat `[x, y, z] * n` face mesh given in input
/// pixels of a `size`×`size` crop. Coordinates come back normalized.
pub fn face_from_mesh(mesh: &[f32], size: u32) -> Result<FaceLandmarks, DetectError> {
    let scale = size as f32;
    let point = |i: usize| -> Result<Point2, DetectError> {
        match mesh.get(i * 3..i * 3 + 2) {
            Some(&[x, y]) => Ok(Point2::new(x / scale, y / scale)),
            _ => Err(DetectError::Inference(format!(
                "face mesh has {} values, landmark {} missing",
                mesh.len(),
                i
            ))),
        }
    };
    let eye = |indices: &[usize; 6]| -> Result<EyeLandmarks, DetectError> {
        let mut points = [Point2::default(); 6];
        for (slot, &i) in points.iter_mut().zip(indices) {
            *slot = point(i)?;
        }
        Ok(EyeLandmarks::new(points))
    };
    Ok(FaceLandmarks {
        left_eye: eye(&LEFT_EYE_MESH)?,
        right_eye: eye(&RIGHT_EYE_MESH)?,
    })
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Build a `[1, 4 + nc, n]` head from per-anchor rows.
    fn head(anchors: &[[f32; 6]]) -> (Vec<f32>, Vec<usize>) {
        let rows = 6;
        let mut out = vec![0.0; rows * anchors.len()];
        for (j, a) in anchors.iter().enumerate() {
            for r in 0..rows {
                out[r * anchors.len() + j] = a[r];
            }
        }
        (out, vec![1, rows, anchors.len()])
    }

    #[test]
    fn test_letterbox_keeps_aspect_and_pads() {
        let image = RgbImage::from_pixel(200, 100, Rgb([255, 0, 0]));
        let (tensor, ratio) = letterbox(&image, 64);
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert!((ratio - 0.32).abs() < 1e-6);
        assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 60, 10]] - PAD_VALUE).abs() < 1e-6);
    }

    #[test]
    fn test_decode_scales_and_filters() {
        let (out, dims) = head(&[
            [50.0, 50.0, 20.0, 20.0, 0.9, 0.1],
            [51.0, 51.0, 20.0, 20.0, 0.8, 0.1],
            [10.0, 10.0, 4.0, 4.0, 0.1, 0.2],
            [90.0, 90.0, 10.0, 10.0, 0.1, 0.7],
        ]);
        let regions = decode_yolov8(&out, &dims, 0.5, (200, 200), 0.4, 0.45, None).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].class_id, 0);
        assert!((regions[0].x1 - 80.0).abs() < 1e-4);
        assert!((regions[0].x2 - 120.0).abs() < 1e-4);
        assert_eq!(regions[1].class_id, 1);

        let only_first = decode_yolov8(&out, &dims, 0.5, (200, 200), 0.4, 0.45, Some(&[1])).unwrap();
        assert_eq!(only_first.len(), 1);
        assert_eq!(only_first[0].class_id, 1);
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        let err = decode_yolov8(&[0.0; 8], &[2, 4], 1.0, (10, 10), 0.4, 0.45, None);
        assert!(matches!(err, Err(DetectError::Inference(_))));
    }

    #[test]
    fn test_nms_drops_overlaps() {
        let mut boxes = vec![
            Region::new(0.0, 0.0, 10.0, 10.0).with_score(0, 0.6),
            Region::new(1.0, 1.0, 11.0, 11.0).with_score(0, 0.9),
            Region::new(50.0, 50.0, 60.0, 60.0).with_score(0, 0.5),
        ];
        non_max_suppression(&mut boxes, 0.45);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].confidence, 0.9);
        assert_eq!(boxes[1].confidence, 0.5);
    }

    #[test]
    fn test_face_from_mesh_picks_eye_points() {
        let mut mesh = vec![0.0; 468 * 3];
        for (k, &i) in LEFT_EYE_MESH.iter().chain(RIGHT_EYE_MESH.iter()).enumerate() {
            mesh[i * 3] = k as f32 * 10.0;
            mesh[i * 3 + 1] = 96.0;
        }
        let face = face_from_mesh(&mesh, 192).unwrap();
        assert_eq!(face.left_eye.points[1], Point2::new(10.0 / 192.0, 0.5));
        assert_eq!(face.right_eye.points[0], Point2::new(60.0 / 192.0, 0.5));

        assert!(face_from_mesh(&mesh[..30], 192).is_err());
    }
}

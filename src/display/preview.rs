use std::sync::{Arc, RwLock};

use opencv::core::{Mat, Point, Rect, Scalar, Vector};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;

use crate::analytics::DetectedObject;

/// Latest annotated preview frame as JPEG; None until the first frame
pub type SharedPreview = Arc<RwLock<Option<Vec<u8>>>>;

pub fn new_shared_preview() -> SharedPreview {
    Arc::new(RwLock::new(None))
}

const BOX_COLOR: (f64, f64, f64) = (0.0, 255.0, 0.0);

/// Draw bounding boxes and best labels onto a copy of the frame and
/// JPEG-encode it. Returns None when drawing or encoding fails; the
/// preview is cosmetic and must never take the pipeline down.
pub fn render_preview(frame: &Mat, objects: &[DetectedObject]) -> Option<Vec<u8>> {
    let mut canvas = frame.try_clone().ok()?;
    let color = Scalar::new(BOX_COLOR.0, BOX_COLOR.1, BOX_COLOR.2, 0.0);

    for obj in objects {
        let bbox = obj.bounding_box;
        let rect = Rect::new(
            bbox.x as i32,
            bbox.y as i32,
            bbox.width as i32,
            bbox.height as i32,
        );
        if imgproc::rectangle(&mut canvas, rect, color, 2, imgproc::LINE_8, 0).is_err() {
            continue;
        }

        let Some(label) = obj.best_label() else {
            continue;
        };
        let caption = match obj.tracking_id {
            Some(id) => format!("#{} {} {}%", id, label.text, (label.confidence * 100.0) as u8),
            None => format!("{} {}%", label.text, (label.confidence * 100.0) as u8),
        };
        let origin = Point::new(rect.x, (rect.y - 6).max(12));
        let _ = imgproc::put_text(
            &mut canvas,
            &caption,
            origin,
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            color,
            1,
            imgproc::LINE_8,
            false,
        );
    }

    encode_jpeg(&canvas)
}

fn encode_jpeg(mat: &Mat) -> Option<Vec<u8>> {
    let mut buf = Vector::<u8>::new();
    let params = Vector::<i32>::new();
    imgcodecs::imencode(".jpg", mat, &mut buf, &params).ok()?;
    Some(buf.to_vec())
}

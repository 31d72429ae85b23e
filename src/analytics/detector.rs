use ndarray::{Array4, ArrayViewD};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;

use crate::config::DetectorConfig;

const DETECTOR_INPUT_SIZE: u32 = 640;

const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone)]
pub struct ObjectLabel {
    pub text: String,
    pub index: usize,
    pub confidence: f32,
}

/// One detected object: bounding box, tracking identifier once assigned,
/// and classification labels ordered by descending confidence
#[derive(Debug, Clone)]
pub struct DetectedObject {
    pub bounding_box: BoundingBox,
    pub tracking_id: Option<u64>,
    pub labels: Vec<ObjectLabel>,
}

impl DetectedObject {
    pub fn best_label(&self) -> Option<&ObjectLabel> {
        self.labels.first()
    }
}

pub struct ObjectDetector {
    session: Session,
    label_map: Vec<String>,
    confidence_threshold: f32,
    max_labels_per_object: usize,
    allowed_labels: Vec<String>,
}

impl ObjectDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        let session = if config.model.starts_with("http://") || config.model.starts_with("https://")
        {
            builder.commit_from_url(&config.model)?
        } else {
            builder.commit_from_file(&config.model)?
        };

        let label_map = match &config.labels_file {
            Some(path) => load_label_map(path)?,
            None => COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
        };

        Ok(Self {
            session,
            label_map,
            confidence_threshold: config.confidence_threshold,
            max_labels_per_object: config.max_labels_per_object,
            allowed_labels: config.allowed_labels.clone(),
        })
    }

    pub fn detect(
        &mut self,
        frame: &opencv::core::Mat,
    ) -> Result<Vec<DetectedObject>, Box<dyn std::error::Error + Send + Sync>> {
        use opencv::prelude::*;

        let rows = frame.rows();
        let cols = frame.cols();
        if rows == 0 || cols == 0 {
            return Ok(Vec::new());
        }

        let (input_tensor, scale, pad_x, pad_y) = self.preprocess(frame)?;

        let tensor_ref = TensorRef::from_array_view(input_tensor.view())?.into_dyn();
        let outputs = self.session.run(ort::inputs![tensor_ref])?;

        // YOLO26 format: separate "logits" and "pred_boxes" outputs
        let (Some(logits_val), Some(boxes_val)) =
            (outputs.get("logits"), outputs.get("pred_boxes"))
        else {
            return Err(
                "Unsupported model format: expected YOLO26 with 'logits' and 'pred_boxes' outputs"
                    .into(),
            );
        };

        let logits = logits_val.try_extract_array::<f32>()?;
        let boxes = boxes_val.try_extract_array::<f32>()?;
        let logits_owned = logits.to_owned();
        let boxes_owned = boxes.to_owned();
        drop(outputs);

        let objects = decode_outputs(
            &logits_owned.view(),
            &boxes_owned.view(),
            &self.label_map,
            self.confidence_threshold,
            self.max_labels_per_object,
            &self.allowed_labels,
            scale,
            pad_x,
            pad_y,
            cols as f32,
            rows as f32,
        )?;

        Ok(objects)
    }

    fn preprocess(
        &self,
        frame: &opencv::core::Mat,
    ) -> Result<(Array4<f32>, f32, f32, f32), Box<dyn std::error::Error + Send + Sync>> {
        use opencv::core::{Mat, Size, BORDER_CONSTANT};
        use opencv::imgproc;
        use opencv::prelude::*;

        let rows = frame.rows() as f32;
        let cols = frame.cols() as f32;
        let input_size = DETECTOR_INPUT_SIZE as f32;

        let scale = (input_size / cols).min(input_size / rows);
        let new_w = (cols * scale).round() as i32;
        let new_h = (rows * scale).round() as i32;

        let mut resized = Mat::default();
        imgproc::resize(
            frame,
            &mut resized,
            Size::new(new_w, new_h),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let pad_x = ((input_size as i32 - new_w) / 2) as f32;
        let pad_y = ((input_size as i32 - new_h) / 2) as f32;

        let mut padded = Mat::default();
        opencv::core::copy_make_border(
            &resized,
            &mut padded,
            pad_y as i32,
            input_size as i32 - new_h - pad_y as i32,
            pad_x as i32,
            input_size as i32 - new_w - pad_x as i32,
            BORDER_CONSTANT,
            opencv::core::Scalar::new(114.0, 114.0, 114.0, 0.0),
        )?;

        let mut rgb = Mat::default();
        imgproc::cvt_color(&padded, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        let data = rgb.data_bytes()?;
        let total_size = (DETECTOR_INPUT_SIZE * DETECTOR_INPUT_SIZE * 3) as usize;
        if data.len() < total_size {
            return Err("Frame data too small".into());
        }

        let mut tensor = Array4::<f32>::zeros((
            1,
            3,
            DETECTOR_INPUT_SIZE as usize,
            DETECTOR_INPUT_SIZE as usize,
        ));
        for y in 0..DETECTOR_INPUT_SIZE as usize {
            for x in 0..DETECTOR_INPUT_SIZE as usize {
                let idx = (y * DETECTOR_INPUT_SIZE as usize + x) * 3;
                tensor[[0, 0, y, x]] = data[idx] as f32 / 255.0;
                tensor[[0, 1, y, x]] = data[idx + 1] as f32 / 255.0;
                tensor[[0, 2, y, x]] = data[idx + 2] as f32 / 255.0;
            }
        }

        Ok((tensor, scale, pad_x, pad_y))
    }
}

fn load_label_map(path: &str) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
    let content = std::fs::read_to_string(path)?;
    let labels: Vec<String> = content
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    if labels.is_empty() {
        return Err(format!("label file {path} contains no labels").into());
    }

    Ok(labels)
}

fn decode_outputs(
    logits: &ArrayViewD<f32>,
    boxes: &ArrayViewD<f32>,
    label_map: &[String],
    confidence_threshold: f32,
    max_labels_per_object: usize,
    allowed_labels: &[String],
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    orig_w: f32,
    orig_h: f32,
) -> Result<Vec<DetectedObject>, Box<dyn std::error::Error + Send + Sync>> {
    let logits_shape = logits.shape();
    let boxes_shape = boxes.shape();

    // Expected shapes: logits [1, 300, C], boxes [1, 300, 4]
    if logits_shape.len() < 2 || boxes_shape.len() < 2 {
        return Ok(Vec::new());
    }

    let num_candidates = if logits_shape.len() == 3 {
        logits_shape[1]
    } else {
        logits_shape[0]
    };
    let num_classes = if logits_shape.len() == 3 {
        logits_shape[2]
    } else {
        logits_shape[1]
    };

    let logits_flat = logits.as_slice().ok_or("Cannot get logits slice")?;
    let boxes_flat = boxes.as_slice().ok_or("Cannot get boxes slice")?;

    let input_size = DETECTOR_INPUT_SIZE as f32;
    let mut objects = Vec::new();

    for i in 0..num_candidates {
        // Every class clearing the threshold becomes a label for this candidate
        let mut labels = Vec::new();
        for j in 0..num_classes {
            let logit = logits_flat[i * num_classes + j];
            let score = 1.0 / (1.0 + (-logit).exp()); // sigmoid
            if score < confidence_threshold {
                continue;
            }

            let text = match label_map.get(j) {
                Some(name) => name.clone(),
                None => format!("class_{}", j),
            };
            labels.push(ObjectLabel {
                text,
                index: j,
                confidence: score,
            });
        }

        if labels.is_empty() {
            continue;
        }

        labels.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        labels.truncate(max_labels_per_object);

        if !allowed_labels.is_empty() && !allowed_labels.contains(&labels[0].text) {
            continue;
        }

        // Box format: (cx, cy, w, h) normalized to [0, 1]
        let cx = boxes_flat[i * 4] * input_size;
        let cy = boxes_flat[i * 4 + 1] * input_size;
        let w = boxes_flat[i * 4 + 2] * input_size;
        let h = boxes_flat[i * 4 + 3] * input_size;

        // Convert to original image coordinates
        let x = ((cx - w / 2.0) - pad_x) / scale;
        let y = ((cy - h / 2.0) - pad_y) / scale;
        let obj_w = w / scale;
        let obj_h = h / scale;

        // Clamp to image bounds
        let x = x.max(0.0).min(orig_w);
        let y = y.max(0.0).min(orig_h);
        let obj_w = obj_w.min(orig_w - x);
        let obj_h = obj_h.min(orig_h - y);

        objects.push(DetectedObject {
            bounding_box: BoundingBox {
                x,
                y,
                width: obj_w,
                height: obj_h,
            },
            tracking_id: None,
            labels,
        });
    }

    Ok(objects)
}

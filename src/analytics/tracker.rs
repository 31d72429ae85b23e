use super::detector::{BoundingBox, DetectedObject};

const IOU_MATCH_THRESHOLD: f32 = 0.3;
const MAX_LOST_FRAMES: u32 = 5;

struct Track {
    id: u64,
    bounding_box: BoundingBox,
    lost_frames: u32,
}

/// Assigns stable tracking identifiers across frames by greedy IoU
/// association against the previous frame's tracks. IDs are never reused.
pub struct ObjectTracker {
    tracks: Vec<Track>,
    next_id: u64,
}

impl ObjectTracker {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    pub fn assign(&mut self, objects: &mut [DetectedObject]) {
        let mut matched = vec![false; self.tracks.len()];

        for obj in objects.iter_mut() {
            let mut best: Option<(usize, f32)> = None;
            for (i, track) in self.tracks.iter().enumerate() {
                if matched.get(i).copied().unwrap_or(true) {
                    continue;
                }
                let overlap = iou(&track.bounding_box, &obj.bounding_box);
                if overlap >= IOU_MATCH_THRESHOLD
                    && best.map(|(_, b)| overlap > b).unwrap_or(true)
                {
                    best = Some((i, overlap));
                }
            }

            match best {
                Some((i, _)) => {
                    matched[i] = true;
                    self.tracks[i].bounding_box = obj.bounding_box;
                    self.tracks[i].lost_frames = 0;
                    obj.tracking_id = Some(self.tracks[i].id);
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks.push(Track {
                        id,
                        bounding_box: obj.bounding_box,
                        lost_frames: 0,
                    });
                    matched.push(true);
                    obj.tracking_id = Some(id);
                }
            }
        }

        // Age out tracks that went unmatched for too long
        let mut index = 0;
        self.tracks.retain_mut(|track| {
            let was_matched = matched[index];
            index += 1;
            if was_matched {
                true
            } else {
                track.lost_frames += 1;
                track.lost_frames <= MAX_LOST_FRAMES
            }
        });
    }
}

impl Default for ObjectTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let left = a.x.max(b.x);
    let top = a.y.max(b.y);
    let right = (a.x + a.width).min(b.x + b.width);
    let bottom = (a.y + a.height).min(b.y + b.height);

    if right <= left || bottom <= top {
        return 0.0;
    }

    let intersection = (right - left) * (bottom - top);
    let union = a.width * a.height + b.width * b.height - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(x: f32, y: f32, w: f32, h: f32) -> DetectedObject {
        DetectedObject {
            bounding_box: BoundingBox {
                x,
                y,
                width: w,
                height: h,
            },
            tracking_id: None,
            labels: Vec::new(),
        }
    }

    #[test]
    fn overlapping_object_keeps_its_id() {
        let mut tracker = ObjectTracker::new();

        let mut frame1 = [object(100.0, 100.0, 50.0, 50.0)];
        tracker.assign(&mut frame1);
        let id = frame1[0].tracking_id.unwrap();

        // Same object, slightly moved
        let mut frame2 = [object(105.0, 102.0, 50.0, 50.0)];
        tracker.assign(&mut frame2);
        assert_eq!(frame2[0].tracking_id, Some(id));
    }

    #[test]
    fn disjoint_object_gets_a_new_id() {
        let mut tracker = ObjectTracker::new();

        let mut frame1 = [object(0.0, 0.0, 50.0, 50.0)];
        tracker.assign(&mut frame1);
        let first_id = frame1[0].tracking_id.unwrap();

        let mut frame2 = [object(300.0, 300.0, 50.0, 50.0)];
        tracker.assign(&mut frame2);
        let second_id = frame2[0].tracking_id.unwrap();

        assert_ne!(first_id, second_id);
    }

    #[test]
    fn two_objects_get_distinct_ids() {
        let mut tracker = ObjectTracker::new();

        let mut frame = [
            object(0.0, 0.0, 50.0, 50.0),
            object(200.0, 200.0, 50.0, 50.0),
        ];
        tracker.assign(&mut frame);

        let a = frame[0].tracking_id.unwrap();
        let b = frame[1].tracking_id.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn expired_track_id_is_not_reused() {
        let mut tracker = ObjectTracker::new();

        let mut frame1 = [object(100.0, 100.0, 50.0, 50.0)];
        tracker.assign(&mut frame1);
        let original_id = frame1[0].tracking_id.unwrap();

        // Object disappears for longer than the track lifetime
        for _ in 0..=MAX_LOST_FRAMES {
            tracker.assign(&mut []);
        }

        let mut frame2 = [object(100.0, 100.0, 50.0, 50.0)];
        tracker.assign(&mut frame2);
        let new_id = frame2[0].tracking_id.unwrap();

        assert_ne!(new_id, original_id);
    }

    #[test]
    fn brief_occlusion_keeps_track_alive() {
        let mut tracker = ObjectTracker::new();

        let mut frame1 = [object(100.0, 100.0, 50.0, 50.0)];
        tracker.assign(&mut frame1);
        let id = frame1[0].tracking_id.unwrap();

        // Gone for fewer frames than the track lifetime
        for _ in 0..MAX_LOST_FRAMES {
            tracker.assign(&mut []);
        }

        let mut frame2 = [object(102.0, 100.0, 50.0, 50.0)];
        tracker.assign(&mut frame2);
        assert_eq!(frame2[0].tracking_id, Some(id));
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BoundingBox {
            x: 10.0,
            y: 10.0,
            width: 20.0,
            height: 20.0,
        };
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
        };
        let b = BoundingBox {
            x: 100.0,
            y: 100.0,
            width: 10.0,
            height: 10.0,
        };
        assert_eq!(iou(&a, &b), 0.0);
    }
}

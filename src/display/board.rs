use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::analytics::DetectedObject;

/// Fixed number of display slots
pub const SLOT_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Slot {
    Empty,
    Label { text: String, confidence_pct: u8 },
}

/// Fixed ordered list of display slots. Rebuilt from every inference
/// result; slots not covered by returned labels are reset to Empty.
pub struct LabelBoard {
    slots: [Slot; SLOT_COUNT],
}

impl LabelBoard {
    pub fn new() -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(Self {
            slots: [const { Slot::Empty }; SLOT_COUNT],
        }))
    }

    /// Map one inference result onto the slots. Each labeled object writes
    /// its labels into slots 0..n and clears the rest, so with several
    /// labeled objects the last one wins. An empty result, or an object
    /// carrying no labels, clears the board.
    pub fn apply(&mut self, objects: &[DetectedObject]) {
        if objects.is_empty() {
            self.clear();
            return;
        }

        for obj in objects {
            if obj.labels.is_empty() {
                self.clear();
                continue;
            }
            for (i, slot) in self.slots.iter_mut().enumerate() {
                *slot = match obj.labels.get(i) {
                    Some(label) => Slot::Label {
                        text: label.text.clone(),
                        confidence_pct: (label.confidence * 100.0) as u8,
                    },
                    None => Slot::Empty,
                };
            }
        }
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = Slot::Empty;
        }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slots_in_use(&self) -> usize {
        self.slots.iter().filter(|s| **s != Slot::Empty).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{BoundingBox, ObjectLabel};

    fn object(labels: &[(&str, f32)]) -> DetectedObject {
        DetectedObject {
            bounding_box: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
            tracking_id: Some(1),
            labels: labels
                .iter()
                .enumerate()
                .map(|(i, (text, confidence))| ObjectLabel {
                    text: text.to_string(),
                    index: i,
                    confidence: *confidence,
                })
                .collect(),
        }
    }

    fn board() -> LabelBoard {
        LabelBoard {
            slots: [const { Slot::Empty }; SLOT_COUNT],
        }
    }

    #[test]
    fn labels_fill_slots_in_order() {
        let mut board = board();
        board.apply(&[object(&[("cat", 0.9), ("animal", 0.6)])]);

        assert_eq!(
            board.slots()[0],
            Slot::Label {
                text: "cat".to_string(),
                confidence_pct: 90,
            }
        );
        assert_eq!(
            board.slots()[1],
            Slot::Label {
                text: "animal".to_string(),
                confidence_pct: 60,
            }
        );
        assert_eq!(board.slots()[2], Slot::Empty);
        assert_eq!(board.slots_in_use(), 2);
    }

    #[test]
    fn uncovered_slots_reset_to_empty() {
        let mut board = board();
        board.apply(&[object(&[("cat", 0.9), ("animal", 0.6), ("pet", 0.5)])]);
        assert_eq!(board.slots_in_use(), 3);

        // Next result covers fewer slots; stale labels must not survive
        board.apply(&[object(&[("dog", 0.8)])]);
        assert_eq!(
            board.slots()[0],
            Slot::Label {
                text: "dog".to_string(),
                confidence_pct: 80,
            }
        );
        assert_eq!(board.slots()[1], Slot::Empty);
        assert_eq!(board.slots()[2], Slot::Empty);
    }

    #[test]
    fn empty_result_clears_the_board() {
        let mut board = board();
        board.apply(&[object(&[("cat", 0.9)])]);
        board.apply(&[]);
        assert_eq!(board.slots_in_use(), 0);
    }

    #[test]
    fn unlabeled_object_clears_the_board() {
        let mut board = board();
        board.apply(&[object(&[("cat", 0.9)])]);

        // A frame whose detected object carries no labels must not leave
        // the previous frame's labels on display
        board.apply(&[object(&[])]);
        assert_eq!(board.slots(), [const { Slot::Empty }; SLOT_COUNT]);
    }

    #[test]
    fn trailing_unlabeled_object_clears_earlier_labels() {
        let mut board = board();
        board.apply(&[object(&[("cat", 0.9)]), object(&[])]);
        assert_eq!(board.slots_in_use(), 0);
    }

    #[test]
    fn last_labeled_object_wins() {
        let mut board = board();
        board.apply(&[object(&[("cat", 0.9)]), object(&[("dog", 0.7)])]);

        assert_eq!(
            board.slots()[0],
            Slot::Label {
                text: "dog".to_string(),
                confidence_pct: 70,
            }
        );
        assert_eq!(board.slots_in_use(), 1);
    }

    #[test]
    fn confidence_is_truncated_to_integer_percent() {
        let mut board = board();
        board.apply(&[object(&[("cat", 0.789)])]);

        assert_eq!(
            board.slots()[0],
            Slot::Label {
                text: "cat".to_string(),
                confidence_pct: 78,
            }
        );
    }

    #[test]
    fn slots_serialize_with_state_tag() {
        let mut board = board();
        board.apply(&[object(&[("cat", 0.9)])]);

        let json = serde_json::to_value(board.slots()).unwrap();
        assert_eq!(json[0]["state"], "label");
        assert_eq!(json[0]["text"], "cat");
        assert_eq!(json[0]["confidence_pct"], 90);
        assert_eq!(json[1]["state"], "empty");
    }
}

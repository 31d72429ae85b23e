mod board;
mod preview;

pub use board::{LabelBoard, Slot, SLOT_COUNT};
pub use preview::{new_shared_preview, render_preview, SharedPreview};

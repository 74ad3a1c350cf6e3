//! Blend-shape application over a scratch vertex buffer.

use crate::model::{Model, MorphElements, MorphKey, Motion, Vertex};
use std::sync::Arc;

/// Blends vertex-morph deltas into a scratch copy of the base vertex buffer.
/// The scratch buffer is exclusive to one model instance.
#[derive(Clone, Debug)]
pub struct MorphApplicator {
    data: Arc<Model>,
    motion: Arc<Motion>,
    scratch: Vec<Vertex>,
}

impl MorphApplicator {
    pub fn new(data: Arc<Model>, motion: Arc<Motion>) -> Self {
        let scratch = data.vertices.clone();
        Self {
            data,
            motion,
            scratch,
        }
    }

    /// Deformed vertex buffer for `frame`, in the base buffer's layout.
    ///
    /// The nearest weight-table entries at or before ("left") and at or after
    /// ("right") the frame are blended: left entries contribute
    /// `weight * (1 - t)`, right entries `weight * t`, with `t = 1` when the
    /// bracketing frames coincide. Frames with no entries on either side
    /// return the base buffer unchanged.
    pub fn apply(&mut self, frame: u32) -> &[Vertex] {
        self.scratch.clone_from(&self.data.vertices);

        let left = self.motion.morph_frames.range(..=frame).next_back();
        let right = self.motion.morph_frames.range(frame..).next();
        if left.is_none() && right.is_none() {
            return &self.scratch;
        }

        let from = left.map(|(&f, _)| f).unwrap_or(frame);
        let to = right.map(|(&f, _)| f).unwrap_or(frame);
        let t = if from == to {
            1.0
        } else {
            (frame - from) as f32 / (to - from) as f32
        };

        let data = Arc::clone(&self.data);
        let motion = Arc::clone(&self.motion);
        if let Some((&f, _)) = left {
            apply_entries(&data, &mut self.scratch, &motion.morph_frames[&f], 1.0 - t);
        }
        if let Some((&f, _)) = right {
            apply_entries(&data, &mut self.scratch, &motion.morph_frames[&f], t);
        }

        &self.scratch
    }
}

fn apply_entries(data: &Model, scratch: &mut [Vertex], entries: &[MorphKey], blend: f32) {
    for entry in entries {
        let Some(morph) = data.morph(&entry.morph) else {
            continue;
        };
        match &morph.elements {
            MorphElements::Vertex(elements) => {
                let weight = entry.weight * blend;
                for element in elements {
                    scratch[element.vertex].position += element.offset * weight;
                }
            }
            // Recognized but not applied in this pipeline.
            MorphElements::Group(_)
            | MorphElements::Bone(_)
            | MorphElements::Uv { .. }
            | MorphElements::Material(_) => {}
        }
    }
}

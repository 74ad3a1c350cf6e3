//! VMD (motion capture) loader.
//!
//! Every field is fixed-size; strings are fixed-width, NUL-truncated
//! Shift_JIS. Bone keyframes arrive interleaved across bones in file order, so
//! each curve is sorted by frame once the whole stream is consumed.

use crate::model::{channel, BoneCurve, Keyframe, Motion, MorphKey};
use crate::reader::BinaryInput;
use crate::Error;
use glam::Vec2;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const LABEL_LEN: usize = 30;
const MODEL_NAME_LEN: usize = 20;
const BONE_NAME_LEN: usize = 15;
const MORPH_NAME_LEN: usize = 15;
/// Reserved per-record interpolation bytes with no consumer here.
const KEYFRAME_PADDING: usize = 48;

impl Motion {
    pub fn from_vmd_bytes(bytes: &[u8]) -> Result<Arc<Self>, Error> {
        let mut input = BinaryInput::new(bytes);

        let label = input.read_fixed_string(LABEL_LEN)?;
        let model_name = input.read_fixed_string(MODEL_NAME_LEN)?;

        let (curves, curve_index, last_frame) = read_bone_keyframes(&mut input)?;
        let morph_frames = read_morph_keyframes(&mut input)?;

        Ok(Arc::new(Motion {
            label,
            model_name,
            curves,
            curve_index,
            morph_frames,
            last_frame,
        }))
    }
}

type Curves = (Vec<BoneCurve>, HashMap<String, usize>, u32);

fn read_bone_keyframes(input: &mut BinaryInput<'_>) -> Result<Curves, Error> {
    let total = input.read_u32()? as usize;
    let mut curves: Vec<BoneCurve> = Vec::new();
    let mut curve_index: HashMap<String, usize> = HashMap::new();
    let mut last_frame = 0u32;

    for _ in 0..total {
        let bone = input.read_fixed_string(BONE_NAME_LEN)?;
        let frame = input.read_u32()?;
        last_frame = last_frame.max(frame);

        let mut key = Keyframe::new(frame);
        key.channels[channel::TX].value = input.read_f32()?;
        key.channels[channel::TY].value = input.read_f32()?;
        key.channels[channel::TZ].value = -input.read_f32()?;
        key.channels[channel::QX].value = input.read_f32()?;
        key.channels[channel::QY].value = input.read_f32()?;
        key.channels[channel::QZ].value = -input.read_f32()?;
        key.channels[channel::QW].value = -input.read_f32()?;

        // Control bytes for the four grouped curves {Tx, Ty, Tz, Rot} are
        // interleaved 4-at-a-time: one byte per group per logical axis,
        // twice per control point. The rotation group lives in the QW slot.
        for point in 0..2 {
            let xs = [
                input.read_u8()? as f32,
                input.read_u8()? as f32,
                input.read_u8()? as f32,
                input.read_u8()? as f32,
            ];
            let ys = [
                input.read_u8()? as f32,
                input.read_u8()? as f32,
                input.read_u8()? as f32,
                input.read_u8()? as f32,
            ];
            for (slot, group) in [channel::TX, channel::TY, channel::TZ, channel::QW]
                .into_iter()
                .enumerate()
            {
                key.channels[group].control[point] = Vec2::new(xs[slot], ys[slot]);
            }
        }

        input.skip(KEYFRAME_PADDING)?;

        let index = match curve_index.get(&bone) {
            Some(&index) => index,
            None => {
                let index = curves.len();
                curve_index.insert(bone.clone(), index);
                curves.push(BoneCurve {
                    bone,
                    keys: Vec::new(),
                });
                index
            }
        };
        curves[index].keys.push(key);
    }

    // File order interleaves bones; the evaluator's bracketing search needs
    // each curve ascending by frame.
    for curve in &mut curves {
        curve.keys.sort_by_key(|key| key.frame);
    }

    Ok((curves, curve_index, last_frame))
}

fn read_morph_keyframes(
    input: &mut BinaryInput<'_>,
) -> Result<BTreeMap<u32, Vec<MorphKey>>, Error> {
    let count = input.read_u32()? as usize;
    let mut frames: BTreeMap<u32, Vec<MorphKey>> = BTreeMap::new();

    for _ in 0..count {
        let morph = input.read_fixed_string(MORPH_NAME_LEN)?;
        let frame = input.read_u32()?;
        let weight = input.read_f32()?;
        frames
            .entry(frame)
            .or_default()
            .push(MorphKey { morph, weight });
    }

    Ok(frames)
}

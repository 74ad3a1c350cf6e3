use crate::model::{
    Model, ModelHeader, Morph, MorphElements, MorphKey, Motion, SkinningMethod, UvElement, Vertex,
    VertexElement,
};
use crate::reader::{IndexWidth, TextEncoding};
use crate::runtime::MorphApplicator;
use glam::{Vec2, Vec3, Vec4};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

fn header() -> ModelHeader {
    ModelHeader {
        version: 2.0,
        encoding: TextEncoding::Utf8,
        extra_uv_count: 0,
        vertex_index: IndexWidth::U8,
        texture_index: IndexWidth::U8,
        material_index: IndexWidth::U8,
        bone_index: IndexWidth::U8,
        morph_index: IndexWidth::U8,
        rigid_body_index: IndexWidth::U8,
        name: String::new(),
        name_en: String::new(),
        comment: String::new(),
        comment_en: String::new(),
    }
}

fn vertex(position: Vec3) -> Vertex {
    Vertex {
        position,
        normal: Vec3::Y,
        uv: Vec2::ZERO,
        extra_uvs: Vec::new(),
        skinning: SkinningMethod::One,
        bones: [0; 4],
        weights: [1.0, 0.0, 0.0, 0.0],
        edge_scale: 1.0,
    }
}

fn morph(name: &str, elements: MorphElements) -> Morph {
    Morph {
        name: name.to_string(),
        name_en: String::new(),
        panel: 1,
        elements,
    }
}

fn model(morphs: Vec<Morph>) -> Arc<Model> {
    let morph_index = morphs
        .iter()
        .enumerate()
        .map(|(i, m)| (m.name.clone(), i))
        .collect();
    Arc::new(Model {
        header: header(),
        vertices: vec![vertex(Vec3::ZERO), vertex(Vec3::ONE)],
        indices: Vec::new(),
        textures: Vec::new(),
        materials: Vec::new(),
        bones: Vec::new(),
        morphs,
        morph_index,
        rigid_bodies: Vec::new(),
        joints: Vec::new(),
    })
}

fn smile() -> Morph {
    morph(
        "smile",
        MorphElements::Vertex(vec![VertexElement {
            vertex: 0,
            offset: Vec3::new(1.0, 0.0, 0.0),
        }]),
    )
}

fn motion(frames: Vec<(u32, Vec<(&str, f32)>)>) -> Arc<Motion> {
    let morph_frames: BTreeMap<u32, Vec<MorphKey>> = frames
        .into_iter()
        .map(|(frame, entries)| {
            let keys = entries
                .into_iter()
                .map(|(morph, weight)| MorphKey {
                    morph: morph.to_string(),
                    weight,
                })
                .collect();
            (frame, keys)
        })
        .collect();
    Arc::new(Motion {
        label: String::new(),
        model_name: String::new(),
        curves: Vec::new(),
        curve_index: HashMap::new(),
        morph_frames,
        last_frame: 0,
    })
}

#[test]
fn exact_frame_applies_the_entry_once() {
    let data = model(vec![smile()]);
    let motion = motion(vec![(10, vec![("smile", 1.0)])]);
    let mut applicator = MorphApplicator::new(data, motion);

    // Bracketing frames coincide, so t = 1 and only the right pass lands.
    let vertices = applicator.apply(10);
    assert_eq!(vertices[0].position, Vec3::new(1.0, 0.0, 0.0));
    assert_eq!(vertices[1].position, Vec3::ONE);
}

#[test]
fn weights_blend_between_bracketing_frames() {
    let data = model(vec![smile()]);
    let motion = motion(vec![(0, vec![("smile", 0.0)]), (10, vec![("smile", 1.0)])]);
    let mut applicator = MorphApplicator::new(data, motion);

    let vertices = applicator.apply(5);
    assert_eq!(vertices[0].position, Vec3::new(0.5, 0.0, 0.0));
}

#[test]
fn before_the_first_entry_the_base_buffer_returns() {
    let data = model(vec![smile()]);
    let motion = motion(vec![(10, vec![("smile", 1.0)])]);
    let mut applicator = MorphApplicator::new(data, motion);

    let vertices = applicator.apply(4);
    assert_eq!(vertices[0].position, Vec3::ZERO);
}

#[test]
fn past_the_last_entry_the_base_buffer_returns() {
    let data = model(vec![smile()]);
    let motion = motion(vec![(10, vec![("smile", 1.0)])]);
    let mut applicator = MorphApplicator::new(data, motion);

    let vertices = applicator.apply(15);
    assert_eq!(vertices[0].position, Vec3::ZERO);
}

#[test]
fn empty_weight_table_is_a_pass_through() {
    let data = model(vec![smile()]);
    let motion = motion(Vec::new());
    let mut applicator = MorphApplicator::new(data, motion);

    let vertices = applicator.apply(0);
    assert_eq!(vertices[0].position, Vec3::ZERO);
    assert_eq!(vertices[1].position, Vec3::ONE);
}

#[test]
fn simultaneous_entries_all_apply() {
    let wide = morph(
        "wide",
        MorphElements::Vertex(vec![VertexElement {
            vertex: 1,
            offset: Vec3::new(0.0, 2.0, 0.0),
        }]),
    );
    let data = model(vec![smile(), wide]);
    let motion = motion(vec![(10, vec![("smile", 1.0), ("wide", 0.5)])]);
    let mut applicator = MorphApplicator::new(data, motion);

    let vertices = applicator.apply(10);
    assert_eq!(vertices[0].position, Vec3::new(1.0, 0.0, 0.0));
    assert_eq!(vertices[1].position, Vec3::new(1.0, 2.0, 1.0));
}

#[test]
fn scratch_resets_between_frames() {
    let data = model(vec![smile()]);
    let motion = motion(vec![(10, vec![("smile", 1.0)])]);
    let mut applicator = MorphApplicator::new(data, motion);

    applicator.apply(10);
    // No accumulation across calls.
    let vertices = applicator.apply(10);
    assert_eq!(vertices[0].position, Vec3::new(1.0, 0.0, 0.0));
}

#[test]
fn unknown_morph_names_are_skipped() {
    let data = model(vec![smile()]);
    let motion = motion(vec![(10, vec![("nosuch", 1.0), ("smile", 1.0)])]);
    let mut applicator = MorphApplicator::new(data, motion);

    let vertices = applicator.apply(10);
    assert_eq!(vertices[0].position, Vec3::new(1.0, 0.0, 0.0));
}

#[test]
fn non_vertex_morphs_leave_positions_alone() {
    let shift = morph(
        "shift",
        MorphElements::Uv {
            channel: 0,
            elements: vec![UvElement {
                vertex: 0,
                offset: Vec4::new(0.5, 0.5, 0.0, 0.0),
            }],
        },
    );
    let data = model(vec![shift]);
    let motion = motion(vec![(10, vec![("shift", 1.0)])]);
    let mut applicator = MorphApplicator::new(data, motion);

    let vertices = applicator.apply(10);
    assert_eq!(vertices[0].position, Vec3::ZERO);
    assert_eq!(vertices[0].uv, Vec2::ZERO);
}

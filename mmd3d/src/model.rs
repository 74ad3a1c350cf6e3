use crate::reader::{IndexWidth, TextEncoding};
use bitflags::bitflags;
use glam::{Quat, Vec2, Vec3, Vec4};
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Debug)]
pub struct ModelHeader {
    pub version: f32,
    pub encoding: TextEncoding,
    pub extra_uv_count: usize,
    pub vertex_index: IndexWidth,
    pub texture_index: IndexWidth,
    pub material_index: IndexWidth,
    pub bone_index: IndexWidth,
    pub morph_index: IndexWidth,
    pub rigid_body_index: IndexWidth,
    pub name: String,
    pub name_en: String,
    pub comment: String,
    pub comment_en: String,
}

/// How a vertex is bound to the skeleton. The weight layout is normalized at
/// load time into four index/weight slots, unused slots zero-filled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SkinningMethod {
    /// Single bone, full weight.
    One,
    /// Two bones; the second weight is derived as `1 - first`.
    Two,
    /// Four bones with explicit weights.
    Four,
    /// Two-bone variant carrying a spring-deform payload that is skipped.
    TwoSpring,
}

#[derive(Clone, Debug)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub extra_uvs: Vec<Vec4>,
    pub skinning: SkinningMethod,
    pub bones: [u32; 4],
    pub weights: [f32; 4],
    pub edge_scale: f32,
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct MaterialFlags: u8 {
        const DOUBLE_SIDED = 0x01;
        const GROUND_SHADOW = 0x02;
        const CAST_SHADOW = 0x04;
        const RECEIVE_SHADOW = 0x08;
        const EDGE = 0x10;
    }
}

#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    pub name_en: String,
    pub diffuse: Vec4,
    pub specular: Vec3,
    pub specular_power: f32,
    pub ambient: Vec3,
    pub flags: MaterialFlags,
    pub edge_color: Vec4,
    pub edge_size: f32,
    pub texture: Option<usize>,
    pub sphere_texture: Option<usize>,
    pub sphere_mode: u8,
    pub toon: ToonTexture,
    pub memo: String,
    /// Number of face indices drawn with this material.
    pub index_count: usize,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ToonTexture {
    Shared(u8),
    Indexed(Option<usize>),
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct BoneFlags: u16 {
        const TAIL_IS_BONE = 0x0001;
        const CAN_ROTATE = 0x0002;
        const CAN_TRANSLATE = 0x0004;
        const VISIBLE = 0x0008;
        const EDITABLE = 0x0010;
        const INVERSE_KINEMATICS = 0x0020;
        const LOCAL_ADD = 0x0080;
        const ROTATION_ADD = 0x0100;
        const TRANSLATION_ADD = 0x0200;
        const FIXED_AXIS = 0x0400;
        const LOCAL_AXES = 0x0800;
        const DEFORM_AFTER_PHYSICS = 0x1000;
        const DEFORM_EXTERNAL_PARENT = 0x2000;
    }
}

/// Where the bone's tail points: an explicit child bone or a raw offset.
#[derive(Clone, Debug)]
pub enum BoneTail {
    Bone(Option<usize>),
    Offset(Vec3),
}

/// Additive influence taken from another bone's already-solved pose.
#[derive(Clone, Debug)]
pub struct Grant {
    pub source: usize,
    pub rate: f32,
    pub rotation: bool,
    pub translation: bool,
}

#[derive(Clone, Debug)]
pub struct LocalAxes {
    pub x: Vec3,
    pub z: Vec3,
}

#[derive(Clone, Debug)]
pub struct IkLink {
    pub bone: usize,
    /// Per-axis angular clamp; presence collapses the link to a hinge.
    pub limit: Option<AngularLimit>,
}

#[derive(Clone, Debug)]
pub struct AngularLimit {
    pub min: Vec3,
    pub max: Vec3,
}

#[derive(Clone, Debug)]
pub struct Ik {
    pub target: usize,
    pub loop_count: u32,
    /// Angular step limit per CCD iteration, radians.
    pub angular_limit: f32,
    pub links: Vec<IkLink>,
}

#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub name_en: String,
    /// Bind-pose position.
    pub position: Vec3,
    pub parent: Option<usize>,
    pub deform_layer: i32,
    pub flags: BoneFlags,
    pub tail: BoneTail,
    pub grant: Option<Grant>,
    pub fixed_axis: Option<Vec3>,
    pub local_axes: Option<LocalAxes>,
    pub external_parent_key: Option<i32>,
    pub ik: Option<Ik>,
}

#[derive(Clone, Debug)]
pub struct GroupElement {
    pub morph: usize,
    pub ratio: f32,
}

#[derive(Clone, Debug)]
pub struct VertexElement {
    pub vertex: usize,
    pub offset: Vec3,
}

#[derive(Clone, Debug)]
pub struct BoneElement {
    pub bone: usize,
    pub translation: Vec3,
    pub rotation: Quat,
}

#[derive(Clone, Debug)]
pub struct UvElement {
    pub vertex: usize,
    pub offset: Vec4,
}

#[derive(Clone, Debug)]
pub struct MaterialElement {
    /// None applies the deltas to every material.
    pub material: Option<usize>,
    pub op: MaterialMorphOp,
    pub diffuse: Vec4,
    pub specular: Vec3,
    pub specular_power: f32,
    pub ambient: Vec3,
    pub edge_color: Vec4,
    pub edge_size: f32,
    pub texture_tint: Vec4,
    pub sphere_tint: Vec4,
    pub toon_tint: Vec4,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MaterialMorphOp {
    Multiply,
    Add,
}

/// Typed element list, one shape per morph type tag.
#[derive(Clone, Debug)]
pub enum MorphElements {
    Group(Vec<GroupElement>),
    Vertex(Vec<VertexElement>),
    Bone(Vec<BoneElement>),
    Uv { channel: u8, elements: Vec<UvElement> },
    Material(Vec<MaterialElement>),
}

#[derive(Clone, Debug)]
pub struct Morph {
    pub name: String,
    pub name_en: String,
    pub panel: u8,
    pub elements: MorphElements,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RigidBodyMode {
    /// Kinematic: driven by the bone, pushed into the physics engine.
    FollowBone,
    /// Dynamic: driven by the physics engine, pulled back onto the bone.
    Dynamic,
    /// Dynamic, but re-anchored to the bone position each step.
    DynamicWithBone,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RigidBodyShape {
    Sphere,
    Box,
    Capsule,
}

#[derive(Clone, Debug)]
pub struct RigidBody {
    pub name: String,
    pub name_en: String,
    pub bone: Option<usize>,
    pub group: u8,
    pub collision_mask: u16,
    pub shape: RigidBodyShape,
    pub size: Vec3,
    pub position: Vec3,
    /// Euler angles, radians.
    pub rotation: Vec3,
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub restitution: f32,
    pub friction: f32,
    pub mode: RigidBodyMode,
}

/// Six-DoF joint between two rigid bodies.
#[derive(Clone, Debug)]
pub struct Joint {
    pub name: String,
    pub name_en: String,
    pub kind: u8,
    pub rigid_a: Option<usize>,
    pub rigid_b: Option<usize>,
    pub position: Vec3,
    pub rotation: Vec3,
    pub linear_lower: Vec3,
    pub linear_upper: Vec3,
    pub angular_lower: Vec3,
    pub angular_upper: Vec3,
    pub linear_spring: Vec3,
    pub angular_spring: Vec3,
}

/// Static model asset. Immutable after load; share via `Arc` across model
/// instances and threads.
#[derive(Clone, Debug)]
pub struct Model {
    pub header: ModelHeader,
    pub vertices: Vec<Vertex>,
    /// Triangle list; winding already flipped for the converted handedness.
    pub indices: Vec<u32>,
    pub textures: Vec<String>,
    pub materials: Vec<Material>,
    pub bones: Vec<Bone>,
    pub morphs: Vec<Morph>,
    pub morph_index: HashMap<String, usize>,
    pub rigid_bodies: Vec<RigidBody>,
    pub joints: Vec<Joint>,
}

impl Model {
    pub fn morph(&self, name: &str) -> Option<&Morph> {
        let index = *self.morph_index.get(name)?;
        Some(&self.morphs[index])
    }
}

/// Channel order of a bone keyframe record.
pub mod channel {
    pub const TX: usize = 0;
    pub const TY: usize = 1;
    pub const TZ: usize = 2;
    pub const QX: usize = 3;
    pub const QY: usize = 4;
    pub const QZ: usize = 5;
    /// Also carries the rotation group's interpolation control points.
    pub const QW: usize = 6;
    pub const COUNT: usize = 7;
}

/// One scalar channel of a keyframe: its value plus the two quantized
/// (0-127) Bezier control points of its curve segment.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ChannelKey {
    pub value: f32,
    pub control: [Vec2; 2],
}

#[derive(Clone, Debug)]
pub struct Keyframe {
    pub frame: u32,
    pub channels: [ChannelKey; channel::COUNT],
}

impl Keyframe {
    pub fn new(frame: u32) -> Self {
        Self {
            frame,
            channels: [ChannelKey::default(); channel::COUNT],
        }
    }

    /// All-zero translation means "no translation recorded", letting the
    /// solver fall back to the bind pose. This collides with a legitimately
    /// zero pose; the convention is preserved from the format as shipped.
    pub fn has_translation(&self) -> bool {
        self.channels[channel::TX].value != 0.0
            || self.channels[channel::TY].value != 0.0
            || self.channels[channel::TZ].value != 0.0
    }

    pub fn has_rotation(&self) -> bool {
        self.channels[channel::QX].value != 0.0
            || self.channels[channel::QY].value != 0.0
            || self.channels[channel::QZ].value != 0.0
            || self.channels[channel::QW].value != 0.0
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::new(
            self.channels[channel::TX].value,
            self.channels[channel::TY].value,
            self.channels[channel::TZ].value,
        )
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_xyzw(
            self.channels[channel::QX].value,
            self.channels[channel::QY].value,
            self.channels[channel::QZ].value,
            self.channels[channel::QW].value,
        )
    }
}

/// Keyframe curve of one bone, sorted ascending by frame after decode.
#[derive(Clone, Debug)]
pub struct BoneCurve {
    pub bone: String,
    pub keys: Vec<Keyframe>,
}

#[derive(Clone, Debug)]
pub struct MorphKey {
    pub morph: String,
    pub weight: f32,
}

/// Motion-capture asset. Immutable after load; share via `Arc`.
#[derive(Clone, Debug)]
pub struct Motion {
    pub label: String,
    pub model_name: String,
    pub curves: Vec<BoneCurve>,
    pub curve_index: HashMap<String, usize>,
    /// Sparse frame -> simultaneous morph weight entries.
    pub morph_frames: BTreeMap<u32, Vec<MorphKey>>,
    /// Highest bone keyframe number in the stream.
    pub last_frame: u32,
}

impl Motion {
    pub fn curve(&self, bone: &str) -> Option<&BoneCurve> {
        let index = *self.curve_index.get(bone)?;
        Some(&self.curves[index])
    }
}

//! PMX (static model) loader.
//!
//! The loader is IO-free: it operates on an in-memory byte slice. Sections are
//! decoded in the file's fixed order; any format or integrity error aborts the
//! whole load and no partial model is published.

use crate::model::{
    AngularLimit, Bone, BoneElement, BoneFlags, BoneTail, Grant, GroupElement, Ik, IkLink, Joint,
    LocalAxes, Material, MaterialElement, MaterialFlags, MaterialMorphOp, Model, ModelHeader,
    Morph, MorphElements, RigidBody, RigidBodyMode, RigidBodyShape, SkinningMethod, ToonTexture,
    UvElement, Vertex, VertexElement,
};
use crate::reader::{BinaryInput, IndexWidth, TextEncoding};
use crate::Error;
use std::collections::HashMap;
use std::sync::Arc;

const SIGNATURE: [u8; 4] = *b"PMX ";

impl Model {
    pub fn from_pmx_bytes(bytes: &[u8]) -> Result<Arc<Self>, Error> {
        let mut input = BinaryInput::new(bytes);

        let header = read_header(&mut input)?;
        let vertices = read_vertices(&mut input, &header)?;
        let indices = read_faces(&mut input, &header, vertices.len())?;
        let textures = read_textures(&mut input, &header)?;
        let materials = read_materials(&mut input, &header, textures.len())?;
        let bones = read_bones(&mut input, &header)?;
        let (morphs, morph_index) =
            read_morphs(&mut input, &header, vertices.len(), materials.len(), bones.len())?;
        skip_display_frames(&mut input, &header)?;
        let rigid_bodies = read_rigid_bodies(&mut input, &header, bones.len())?;
        let joints = read_joints(&mut input, &header, rigid_bodies.len())?;

        Ok(Arc::new(Model {
            header,
            vertices,
            indices,
            textures,
            materials,
            bones,
            morphs,
            morph_index,
            rigid_bodies,
            joints,
        }))
    }
}

fn read_header(input: &mut BinaryInput<'_>) -> Result<ModelHeader, Error> {
    let mut signature = [0u8; 4];
    for b in &mut signature {
        *b = input.read_u8()?;
    }
    if signature != SIGNATURE {
        return Err(Error::BadModelSignature { found: signature });
    }

    let version = input.read_f32()?;
    if version != 2.0 {
        log::warn!("PMX version {version} declared, decoding as 2.0");
    }

    // The header declares how many global bytes follow; eight are defined,
    // extras are skipped.
    let mut remain = input.read_u8()? as i32;
    let mut next = |input: &mut BinaryInput<'_>| -> Result<u8, Error> {
        if remain > 0 {
            remain -= 1;
            input.read_u8()
        } else {
            remain -= 1;
            Ok(0)
        }
    };

    let encoding = TextEncoding::from_code(next(input)?)?;
    let extra_uv_count = next(input)? as usize;
    let vertex_index = IndexWidth::from_code(next(input)?, "vertex")?;
    let texture_index = IndexWidth::from_code(next(input)?, "texture")?;
    let material_index = IndexWidth::from_code(next(input)?, "material")?;
    let bone_index = IndexWidth::from_code(next(input)?, "bone")?;
    let morph_index = IndexWidth::from_code(next(input)?, "morph")?;
    let rigid_body_index = IndexWidth::from_code(next(input)?, "rigid body")?;
    if remain > 0 {
        input.skip(remain as usize)?;
    }

    let name = input.read_string(encoding)?;
    let name_en = input.read_string(encoding)?;
    let comment = input.read_string(encoding)?;
    let comment_en = input.read_string(encoding)?;

    Ok(ModelHeader {
        version,
        encoding,
        extra_uv_count,
        vertex_index,
        texture_index,
        material_index,
        bone_index,
        morph_index,
        rigid_body_index,
        name,
        name_en,
        comment,
        comment_en,
    })
}

fn read_vertices(input: &mut BinaryInput<'_>, header: &ModelHeader) -> Result<Vec<Vertex>, Error> {
    let count = input.read_u32()? as usize;
    let mut vertices = Vec::with_capacity(count);

    for vertex in 0..count {
        let position = input.read_vec3_flip_z()?;
        let normal = input.read_vec3_flip_z()?;
        let uv = input.read_vec2()?;
        let method = input.read_u8()?;

        let mut extra_uvs = Vec::with_capacity(header.extra_uv_count);
        for _ in 0..header.extra_uv_count {
            extra_uvs.push(input.read_vec4()?);
        }

        let mut bones = [0u32; 4];
        let mut weights = [0f32; 4];
        let skinning = match method {
            0 => {
                bones[0] = input.read_index(header.bone_index)?;
                weights[0] = 1.0;
                SkinningMethod::One
            }
            1 => {
                bones[0] = input.read_index(header.bone_index)?;
                bones[1] = input.read_index(header.bone_index)?;
                weights[0] = input.read_f32()?;
                weights[1] = 1.0 - weights[0];
                SkinningMethod::Two
            }
            2 => {
                for b in &mut bones {
                    *b = input.read_index(header.bone_index)?;
                }
                for w in &mut weights {
                    *w = input.read_f32()?;
                }
                SkinningMethod::Four
            }
            3 => {
                bones[0] = input.read_index(header.bone_index)?;
                bones[1] = input.read_index(header.bone_index)?;
                weights[0] = input.read_f32()?;
                weights[1] = 1.0 - weights[0];
                // spring-deform payload (C, R0, R1), unused
                input.skip(4 * 3 * 3)?;
                SkinningMethod::TwoSpring
            }
            method => {
                return Err(Error::UnsupportedSkinningMethod { vertex, method });
            }
        };

        let edge_scale = input.read_f32()?;

        vertices.push(Vertex {
            position,
            normal,
            uv,
            extra_uvs,
            skinning,
            bones,
            weights,
            edge_scale,
        });
    }

    Ok(vertices)
}

fn read_faces(
    input: &mut BinaryInput<'_>,
    header: &ModelHeader,
    vertex_count: usize,
) -> Result<Vec<u32>, Error> {
    let index_count = input.read_i32()?.max(0) as usize;
    let mut indices = Vec::with_capacity(index_count);

    for _ in 0..index_count / 3 {
        let i0 = input.read_index(header.vertex_index)?;
        let i1 = input.read_index(header.vertex_index)?;
        let i2 = input.read_index(header.vertex_index)?;
        for i in [i0, i1, i2] {
            if i as usize >= vertex_count {
                return Err(Error::IndexOutOfRange {
                    context: "face vertex",
                    index: i as usize,
                    count: vertex_count,
                });
            }
        }
        // winding flipped to match the handedness conversion
        indices.push(i0);
        indices.push(i2);
        indices.push(i1);
    }

    Ok(indices)
}

fn read_textures(input: &mut BinaryInput<'_>, header: &ModelHeader) -> Result<Vec<String>, Error> {
    let count = input.read_i32()?.max(0) as usize;
    let mut textures = Vec::with_capacity(count);
    for _ in 0..count {
        textures.push(input.read_string(header.encoding)?);
    }
    Ok(textures)
}

fn optional_index(raw: u32, width: IndexWidth) -> Option<usize> {
    if raw == width.none_value() {
        None
    } else {
        Some(raw as usize)
    }
}

fn checked_index(
    raw: u32,
    width: IndexWidth,
    count: usize,
    context: &'static str,
) -> Result<Option<usize>, Error> {
    match optional_index(raw, width) {
        None => Ok(None),
        Some(index) if index < count => Ok(Some(index)),
        Some(index) => Err(Error::IndexOutOfRange {
            context,
            index,
            count,
        }),
    }
}

fn read_materials(
    input: &mut BinaryInput<'_>,
    header: &ModelHeader,
    texture_count: usize,
) -> Result<Vec<Material>, Error> {
    let count = input.read_u32()? as usize;
    let mut materials = Vec::with_capacity(count);

    for _ in 0..count {
        let name = input.read_string(header.encoding)?;
        let name_en = input.read_string(header.encoding)?;
        let diffuse = input.read_vec4()?;
        let specular = input.read_vec3()?;
        let specular_power = input.read_f32()?;
        let ambient = input.read_vec3()?;
        let flags = MaterialFlags::from_bits_truncate(input.read_u8()?);
        let edge_color = input.read_vec4()?;
        let edge_size = input.read_f32()?;
        let texture = checked_index(
            input.read_index(header.texture_index)?,
            header.texture_index,
            texture_count,
            "material texture",
        )?;
        let sphere_texture = checked_index(
            input.read_index(header.texture_index)?,
            header.texture_index,
            texture_count,
            "material sphere texture",
        )?;
        let sphere_mode = input.read_u8()?;
        let shared_toon = input.read_u8()? != 0;
        let toon = if shared_toon {
            ToonTexture::Shared(input.read_u8()?)
        } else {
            ToonTexture::Indexed(checked_index(
                input.read_index(header.texture_index)?,
                header.texture_index,
                texture_count,
                "material toon texture",
            )?)
        };
        let memo = input.read_string(header.encoding)?;
        let index_count = input.read_i32()?.max(0) as usize;

        materials.push(Material {
            name,
            name_en,
            diffuse,
            specular,
            specular_power,
            ambient,
            flags,
            edge_color,
            edge_size,
            texture,
            sphere_texture,
            sphere_mode,
            toon,
            memo,
            index_count,
        });
    }

    Ok(materials)
}

fn read_bones(input: &mut BinaryInput<'_>, header: &ModelHeader) -> Result<Vec<Bone>, Error> {
    let count = input.read_u32()? as usize;
    let mut bones = Vec::with_capacity(count);

    for index in 0..count {
        let name = input.read_string(header.encoding)?;
        let name_en = input.read_string(header.encoding)?;
        let position = input.read_vec3_flip_z()?;
        let parent = optional_index(input.read_index(header.bone_index)?, header.bone_index);
        let deform_layer = input.read_i32()?;
        let flags = BoneFlags::from_bits_truncate(input.read_u16()?);

        // The single forward FK pass depends on parents preceding children.
        if let Some(parent) = parent {
            if parent >= index {
                return Err(Error::ParentOutOfOrder {
                    bone: index,
                    parent,
                });
            }
        }

        let tail = if flags.contains(BoneFlags::TAIL_IS_BONE) {
            BoneTail::Bone(optional_index(
                input.read_index(header.bone_index)?,
                header.bone_index,
            ))
        } else {
            BoneTail::Offset(input.read_vec3_flip_z()?)
        };

        let grant = if flags.intersects(BoneFlags::ROTATION_ADD | BoneFlags::TRANSLATION_ADD) {
            let source = input.read_index(header.bone_index)? as usize;
            let rate = input.read_f32()?;
            Some(Grant {
                source,
                rate,
                rotation: flags.contains(BoneFlags::ROTATION_ADD),
                translation: flags.contains(BoneFlags::TRANSLATION_ADD),
            })
        } else {
            None
        };

        let fixed_axis = if flags.contains(BoneFlags::FIXED_AXIS) {
            Some(input.read_vec3_flip_z()?)
        } else {
            None
        };

        let local_axes = if flags.contains(BoneFlags::LOCAL_AXES) {
            Some(LocalAxes {
                x: input.read_vec3_flip_z()?,
                z: input.read_vec3_flip_z()?,
            })
        } else {
            None
        };

        let external_parent_key = if flags.contains(BoneFlags::DEFORM_EXTERNAL_PARENT) {
            Some(input.read_i32()?)
        } else {
            None
        };

        let ik = if flags.contains(BoneFlags::INVERSE_KINEMATICS) {
            let target = input.read_index(header.bone_index)? as usize;
            let loop_count = input.read_i32()?.max(0) as u32;
            let angular_limit = input.read_f32()?;
            let link_count = input.read_i32()?.max(0) as usize;
            let mut links = Vec::with_capacity(link_count);
            for _ in 0..link_count {
                let bone = input.read_index(header.bone_index)? as usize;
                let limited = input.read_u8()? != 0;
                let limit = if limited {
                    Some(AngularLimit {
                        min: input.read_vec3()?,
                        max: input.read_vec3()?,
                    })
                } else {
                    None
                };
                links.push(IkLink { bone, limit });
            }
            Some(Ik {
                target,
                loop_count,
                angular_limit,
                links,
            })
        } else {
            None
        };

        bones.push(Bone {
            name,
            name_en,
            position,
            parent,
            deform_layer,
            flags,
            tail,
            grant,
            fixed_axis,
            local_axes,
            external_parent_key,
            ik,
        });
    }

    validate_bone_references(&bones)?;
    Ok(bones)
}

/// A malformed skeleton cannot be meaningfully posed; reject the whole model
/// instead of clamping indices at solve time.
fn validate_bone_references(bones: &[Bone]) -> Result<(), Error> {
    let count = bones.len();
    let check = |index: usize, context: &'static str| -> Result<(), Error> {
        if index < count {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                context,
                index,
                count,
            })
        }
    };

    for bone in bones {
        if let BoneTail::Bone(Some(tail)) = bone.tail {
            check(tail, "bone tail")?;
        }
        if let Some(grant) = &bone.grant {
            check(grant.source, "grant source bone")?;
        }
        if let Some(ik) = &bone.ik {
            check(ik.target, "IK target bone")?;
            for link in &ik.links {
                check(link.bone, "IK link bone")?;
            }
        }
    }
    Ok(())
}

fn read_morphs(
    input: &mut BinaryInput<'_>,
    header: &ModelHeader,
    vertex_count: usize,
    material_count: usize,
    bone_count: usize,
) -> Result<(Vec<Morph>, HashMap<String, usize>), Error> {
    let count = input.read_u32()? as usize;
    let mut morphs = Vec::with_capacity(count);
    let mut by_name = HashMap::with_capacity(count);

    for _ in 0..count {
        let name = input.read_string(header.encoding)?;
        let name_en = input.read_string(header.encoding)?;
        let panel = input.read_u8()?;
        let type_tag = input.read_u8()?;
        let element_count = input.read_i32()?.max(0) as usize;

        let elements = match type_tag {
            0 => {
                let mut elements = Vec::with_capacity(element_count);
                for _ in 0..element_count {
                    let morph = input.read_index(header.morph_index)? as usize;
                    let ratio = input.read_f32()?;
                    if morph >= count {
                        return Err(Error::IndexOutOfRange {
                            context: "group morph",
                            index: morph,
                            count,
                        });
                    }
                    elements.push(GroupElement { morph, ratio });
                }
                MorphElements::Group(elements)
            }
            1 => {
                let mut elements = Vec::with_capacity(element_count);
                for _ in 0..element_count {
                    let vertex = input.read_index(header.vertex_index)? as usize;
                    let offset = input.read_vec3_flip_z()?;
                    if vertex >= vertex_count {
                        return Err(Error::IndexOutOfRange {
                            context: "vertex morph vertex",
                            index: vertex,
                            count: vertex_count,
                        });
                    }
                    elements.push(VertexElement { vertex, offset });
                }
                MorphElements::Vertex(elements)
            }
            2 => {
                let mut elements = Vec::with_capacity(element_count);
                for _ in 0..element_count {
                    let bone = input.read_index(header.bone_index)? as usize;
                    let translation = input.read_vec3_flip_z()?;
                    let rotation = input.read_quat_flip()?;
                    if bone >= bone_count {
                        return Err(Error::IndexOutOfRange {
                            context: "bone morph bone",
                            index: bone,
                            count: bone_count,
                        });
                    }
                    elements.push(BoneElement {
                        bone,
                        translation,
                        rotation,
                    });
                }
                MorphElements::Bone(elements)
            }
            3..=7 => {
                let channel = type_tag - 3;
                let mut elements = Vec::with_capacity(element_count);
                for _ in 0..element_count {
                    let vertex = input.read_index(header.vertex_index)? as usize;
                    let offset = input.read_vec4()?;
                    if vertex >= vertex_count {
                        return Err(Error::IndexOutOfRange {
                            context: "uv morph vertex",
                            index: vertex,
                            count: vertex_count,
                        });
                    }
                    elements.push(UvElement { vertex, offset });
                }
                MorphElements::Uv { channel, elements }
            }
            8 => {
                let mut elements = Vec::with_capacity(element_count);
                for _ in 0..element_count {
                    let material = checked_index(
                        input.read_index(header.material_index)?,
                        header.material_index,
                        material_count,
                        "material morph material",
                    )?;
                    let op = match input.read_u8()? {
                        0 => MaterialMorphOp::Multiply,
                        _ => MaterialMorphOp::Add,
                    };
                    elements.push(MaterialElement {
                        material,
                        op,
                        diffuse: input.read_vec4()?,
                        specular: input.read_vec3()?,
                        specular_power: input.read_f32()?,
                        ambient: input.read_vec3()?,
                        edge_color: input.read_vec4()?,
                        edge_size: input.read_f32()?,
                        texture_tint: input.read_vec4()?,
                        sphere_tint: input.read_vec4()?,
                        toon_tint: input.read_vec4()?,
                    });
                }
                MorphElements::Material(elements)
            }
            value => {
                return Err(Error::UnknownMorphType { morph: name, value });
            }
        };

        by_name.insert(name.clone(), morphs.len());
        morphs.push(Morph {
            name,
            name_en,
            panel,
            elements,
        });
    }

    Ok((morphs, by_name))
}

/// The display-frame section only matters to authoring UIs; it is parsed
/// structurally to advance the cursor and its contents are discarded.
fn skip_display_frames(input: &mut BinaryInput<'_>, header: &ModelHeader) -> Result<(), Error> {
    let count = input.read_u32()? as usize;
    for _ in 0..count {
        let _ = input.read_string(header.encoding)?;
        let _ = input.read_string(header.encoding)?;
        let _ = input.read_u8()?;
        let element_count = input.read_i32()?.max(0) as usize;
        for _ in 0..element_count {
            if input.read_u8()? == 0 {
                input.skip(header.bone_index.byte_len())?;
            } else {
                input.skip(header.morph_index.byte_len())?;
            }
        }
    }
    Ok(())
}

fn read_rigid_bodies(
    input: &mut BinaryInput<'_>,
    header: &ModelHeader,
    bone_count: usize,
) -> Result<Vec<RigidBody>, Error> {
    let count = input.read_u32()? as usize;
    let mut bodies = Vec::with_capacity(count);

    for _ in 0..count {
        let name = input.read_string(header.encoding)?;
        let name_en = input.read_string(header.encoding)?;
        let bone = checked_index(
            input.read_index(header.bone_index)?,
            header.bone_index,
            bone_count,
            "rigid body bone",
        )?;
        let group = input.read_u8()?;
        let collision_mask = input.read_u16()?;
        let shape = match input.read_u8()? {
            0 => RigidBodyShape::Sphere,
            1 => RigidBodyShape::Box,
            2 => RigidBodyShape::Capsule,
            value => {
                return Err(Error::ModelParse {
                    message: format!("unknown rigid body shape {value}"),
                });
            }
        };
        let size = input.read_vec3()?;
        let position = input.read_vec3_flip_z()?;
        let rotation = input.read_vec3()?;
        let mass = input.read_f32()?;
        let linear_damping = input.read_f32()?;
        let angular_damping = input.read_f32()?;
        let restitution = input.read_f32()?;
        let friction = input.read_f32()?;
        let mode = match input.read_u8()? {
            0 => RigidBodyMode::FollowBone,
            1 => RigidBodyMode::Dynamic,
            2 => RigidBodyMode::DynamicWithBone,
            value => {
                return Err(Error::ModelParse {
                    message: format!("unknown rigid body mode {value}"),
                });
            }
        };

        bodies.push(RigidBody {
            name,
            name_en,
            bone,
            group,
            collision_mask,
            shape,
            size,
            position,
            rotation,
            mass,
            linear_damping,
            angular_damping,
            restitution,
            friction,
            mode,
        });
    }

    Ok(bodies)
}

fn read_joints(
    input: &mut BinaryInput<'_>,
    header: &ModelHeader,
    rigid_body_count: usize,
) -> Result<Vec<Joint>, Error> {
    let count = input.read_u32()? as usize;
    let mut joints = Vec::with_capacity(count);

    for _ in 0..count {
        joints.push(Joint {
            name: input.read_string(header.encoding)?,
            name_en: input.read_string(header.encoding)?,
            kind: input.read_u8()?,
            rigid_a: checked_index(
                input.read_index(header.rigid_body_index)?,
                header.rigid_body_index,
                rigid_body_count,
                "joint rigid body",
            )?,
            rigid_b: checked_index(
                input.read_index(header.rigid_body_index)?,
                header.rigid_body_index,
                rigid_body_count,
                "joint rigid body",
            )?,
            position: input.read_vec3_flip_z()?,
            rotation: input.read_vec3()?,
            linear_lower: input.read_vec3()?,
            linear_upper: input.read_vec3()?,
            angular_lower: input.read_vec3()?,
            angular_upper: input.read_vec3()?,
            linear_spring: input.read_vec3()?,
            angular_spring: input.read_vec3()?,
        });
    }

    Ok(joints)
}

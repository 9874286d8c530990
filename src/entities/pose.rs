//! OpenPose annotation: bone role tags → 18-point keypoint maps.
//!
//! Each bone carries a `BoneAnnotation { enabled, role, side }`. Extraction
//! projects the head of every enabled bone through the scene camera and stores
//! it in the slot of its joint role. Slots follow the COCO-18 body layout used
//! by OpenPose conditioning models:
//!
//! ```text
//!  0 nose      1 chest(neck)  2 shoulder_r  3 elbow_r   4 hand_r    5 shoulder_l
//!  6 elbow_l   7 hand_l       8 hip_r       9 knee_r   10 foot_r   11 hip_l
//! 12 knee_l   13 foot_l      14 eye_r      15 eye_l    16 ear_r    17 ear_l
//! ```
//!
//! # Determinism
//!
//! Bones are visited in name order and armatures in name order, so the same
//! pose yields byte-identical maps regardless of how the host enumerates them.
//! When several bones resolve to one role, the first by name wins.

use log::warn;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::frame::{Channels, Frame};
use super::scene::{Armature, Bone, Camera, SceneSnapshot};

pub const JOINT_COUNT: usize = 18;

/// Semantic joint role; discriminant is the keypoint slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JointRole {
    #[default]
    Nose,
    Chest,
    ShoulderR,
    ElbowR,
    HandR,
    ShoulderL,
    ElbowL,
    HandL,
    HipR,
    KneeR,
    FootR,
    HipL,
    KneeL,
    FootL,
    EyeR,
    EyeL,
    EarR,
    EarL,
}

impl JointRole {
    pub const ALL: [JointRole; JOINT_COUNT] = [
        JointRole::Nose,
        JointRole::Chest,
        JointRole::ShoulderR,
        JointRole::ElbowR,
        JointRole::HandR,
        JointRole::ShoulderL,
        JointRole::ElbowL,
        JointRole::HandL,
        JointRole::HipR,
        JointRole::KneeR,
        JointRole::FootR,
        JointRole::HipL,
        JointRole::KneeL,
        JointRole::FootL,
        JointRole::EyeR,
        JointRole::EyeL,
        JointRole::EarR,
        JointRole::EarL,
    ];

    /// Keypoint slot index
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn side(self) -> Side {
        use JointRole::*;
        match self {
            Nose | Chest => Side::None,
            ShoulderR | ElbowR | HandR | HipR | KneeR | FootR | EyeR | EarR => Side::Right,
            ShoulderL | ElbowL | HandL | HipL | KneeL | FootL | EyeL | EarL => Side::Left,
        }
    }

    /// Same joint on the opposite side; centre joints map to themselves.
    pub fn mirrored(self) -> JointRole {
        use JointRole::*;
        match self {
            Nose => Nose,
            Chest => Chest,
            ShoulderR => ShoulderL,
            ShoulderL => ShoulderR,
            ElbowR => ElbowL,
            ElbowL => ElbowR,
            HandR => HandL,
            HandL => HandR,
            HipR => HipL,
            HipL => HipR,
            KneeR => KneeL,
            KneeL => KneeR,
            FootR => FootL,
            FootL => FootR,
            EyeR => EyeL,
            EyeL => EyeR,
            EarR => EarL,
            EarL => EarR,
        }
    }

    /// Apply a side tag: lateral roles move to `side`, `Side::None` keeps the role.
    pub fn with_side(self, side: Side) -> JointRole {
        match (self.side(), side) {
            (Side::None, _) | (_, Side::None) => self,
            (current, wanted) if current == wanted => self,
            _ => self.mirrored(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Left,
    Right,
    #[default]
    None,
}

/// Per-bone annotation authored on the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BoneAnnotation {
    pub enabled: bool,
    pub role: JointRole,
    pub side: Side,
}

impl BoneAnnotation {
    pub fn new(role: JointRole, side: Side) -> Self {
        Self {
            enabled: true,
            role,
            side,
        }
    }

    pub fn resolved_role(&self) -> JointRole {
        self.role.with_side(self.side)
    }
}

/// Per-armature role toggles. Defaults to all roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmatureAnnotation {
    pub enabled_roles: BTreeSet<JointRole>,
}

impl Default for ArmatureAnnotation {
    fn default() -> Self {
        Self {
            enabled_roles: JointRole::ALL.iter().copied().collect(),
        }
    }
}

/// Keypoints of one armature, pixel coordinates, origin top-left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub armature: String,
    pub points: [Option<[f32; 2]>; JOINT_COUNT],
}

impl Skeleton {
    pub fn point(&self, role: JointRole) -> Option<[f32; 2]> {
        self.points[role.index()]
    }

    pub fn len(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed-layout keypoint map for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointMap {
    pub width: usize,
    pub height: usize,
    pub skeletons: Vec<Skeleton>,
}

/// Total order on bones: name, then role, then rest position.
fn bone_key(bone: &Bone) -> (&str, JointRole, [u32; 3], [u32; 3]) {
    (
        bone.name.as_str(),
        bone.annotation.resolved_role(),
        bone.head.to_array().map(f32::to_bits),
        bone.tail.to_array().map(f32::to_bits),
    )
}

/// Map one armature's annotated bones to keypoints.
pub fn extract(armature: &Armature, camera: &Camera, width: usize, height: usize) -> Skeleton {
    let mut bones: Vec<_> = armature
        .bones
        .iter()
        .filter(|b| b.annotation.enabled)
        .collect();
    bones.sort_by(|a, b| bone_key(a).cmp(&bone_key(b)));

    let mut points = [None; JOINT_COUNT];
    let mut owners: [Option<&str>; JOINT_COUNT] = [None; JOINT_COUNT];

    for bone in bones {
        let role = bone.annotation.resolved_role();
        if !armature.annotation.enabled_roles.contains(&role) {
            continue;
        }
        let slot = role.index();
        if let Some(owner) = owners[slot] {
            warn!(
                "Armature '{}': bone '{}' duplicates role {:?} of bone '{}', ignored",
                armature.name, bone.name, role, owner
            );
            continue;
        }
        owners[slot] = Some(bone.name.as_str());
        points[slot] = camera
            .project(armature.bone_head_world(bone), width, height)
            .map(|p| [p.x, p.y]);
    }

    Skeleton {
        armature: armature.name.clone(),
        points,
    }
}

impl KeypointMap {
    /// Extract every armature in the scene, or only `armature` when given.
    pub fn from_scene(
        scene: &SceneSnapshot,
        armature: Option<&str>,
        width: usize,
        height: usize,
    ) -> KeypointMap {
        let camera = scene.camera();
        let mut armatures: Vec<&Armature> = scene
            .armatures
            .iter()
            .filter(|a| armature.is_none_or(|name| a.name == name))
            .collect();
        armatures.sort_by(|a, b| {
            let key = |arm: &Armature| arm.matrix_world.to_cols_array().map(f32::to_bits);
            a.name.cmp(&b.name).then_with(|| key(*a).cmp(&key(*b)))
        });

        KeypointMap {
            width,
            height,
            skeletons: armatures
                .into_iter()
                .map(|a| extract(a, &camera, width, height))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Rasterize in OpenPose colours: black background, limbs, joint dots.
    pub fn to_frame(&self) -> Frame {
        let (w, h) = (self.width, self.height);
        let scale = w.max(h) as f32 / 512.0;
        let stick = (4.0 * scale).max(1.0);
        let radius = (4.0 * scale).max(1.0);

        // Primitives in paint order; later ones overwrite earlier ones.
        let mut prims: Vec<(Prim, [f32; 3])> = Vec::new();
        for skeleton in &self.skeletons {
            for (i, (a, b)) in LIMBS.iter().enumerate() {
                if let (Some(pa), Some(pb)) = (skeleton.points[*a], skeleton.points[*b]) {
                    let c = COLORS[i];
                    prims.push((
                        Prim::Segment(pa, pb, stick),
                        [c[0] * 0.6, c[1] * 0.6, c[2] * 0.6],
                    ));
                }
            }
            for (i, p) in skeleton.points.iter().enumerate() {
                if let Some(p) = p {
                    prims.push((Prim::Dot(*p, radius), COLORS[i]));
                }
            }
        }

        let mut data = vec![0.0f32; w * h * 4];
        data.par_chunks_mut(w.max(1) * 4).enumerate().for_each(|(y, row)| {
            let py = y as f32 + 0.5;
            for x in 0..w {
                let px = x as f32 + 0.5;
                let mut color = [0.0, 0.0, 0.0];
                for (prim, c) in &prims {
                    if prim.covers(px, py) {
                        color = *c;
                    }
                }
                row[x * 4..x * 4 + 4].copy_from_slice(&[color[0], color[1], color[2], 1.0]);
            }
        });

        // Buffer length matches the shape by construction
        Frame::from_vec(w, h, Channels::Rgba, data).unwrap_or_else(|_| Frame::new(w, h, Channels::Rgba))
    }
}

enum Prim {
    Segment([f32; 2], [f32; 2], f32),
    Dot([f32; 2], f32),
}

impl Prim {
    fn covers(&self, x: f32, y: f32) -> bool {
        match self {
            Prim::Dot(c, r) => {
                let (dx, dy) = (x - c[0], y - c[1]);
                dx * dx + dy * dy <= r * r
            }
            Prim::Segment(a, b, width) => {
                let (abx, aby) = (b[0] - a[0], b[1] - a[1]);
                let len2 = abx * abx + aby * aby;
                let t = if len2 <= f32::EPSILON {
                    0.0
                } else {
                    (((x - a[0]) * abx + (y - a[1]) * aby) / len2).clamp(0.0, 1.0)
                };
                let (dx, dy) = (x - (a[0] + abx * t), y - (a[1] + aby * t));
                dx * dx + dy * dy <= width * width
            }
        }
    }
}

/// Limb pairs (slot indices) in OpenPose paint order
const LIMBS: [(usize, usize); 17] = [
    (1, 2),
    (1, 5),
    (2, 3),
    (3, 4),
    (5, 6),
    (6, 7),
    (1, 8),
    (8, 9),
    (9, 10),
    (1, 11),
    (11, 12),
    (12, 13),
    (1, 0),
    (0, 14),
    (14, 16),
    (0, 15),
    (15, 17),
];

const fn rgb(r: u8, g: u8, b: u8) -> [f32; 3] {
    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
}

/// Per-joint colours (also used for the limb leaving the joint)
const COLORS: [[f32; 3]; JOINT_COUNT] = [
    rgb(255, 0, 0),
    rgb(255, 85, 0),
    rgb(255, 170, 0),
    rgb(255, 255, 0),
    rgb(170, 255, 0),
    rgb(85, 255, 0),
    rgb(0, 255, 0),
    rgb(0, 255, 85),
    rgb(0, 255, 170),
    rgb(0, 255, 255),
    rgb(0, 170, 255),
    rgb(0, 85, 255),
    rgb(0, 0, 255),
    rgb(85, 0, 255),
    rgb(170, 0, 255),
    rgb(255, 0, 255),
    rgb(255, 0, 170),
    rgb(255, 0, 85),
];

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn bone(name: &str, head: Vec3, role: JointRole, side: Side) -> Bone {
        Bone {
            name: name.to_string(),
            head,
            tail: head + Vec3::Z * 0.1,
            annotation: BoneAnnotation::new(role, side),
        }
    }

    fn rig() -> Armature {
        Armature {
            name: "Rig".to_string(),
            bones: vec![
                bone("head", Vec3::new(0.0, 0.0, 1.8), JointRole::Nose, Side::None),
                bone("spine", Vec3::new(0.0, 0.0, 1.5), JointRole::Chest, Side::None),
                bone("upper_arm.L", Vec3::new(0.3, 0.0, 1.5), JointRole::ShoulderL, Side::Left),
                bone("upper_arm.R", Vec3::new(-0.3, 0.0, 1.5), JointRole::ShoulderL, Side::Right),
                bone("thigh.L", Vec3::new(0.15, 0.0, 0.9), JointRole::HipL, Side::None),
                Bone {
                    name: "ik_helper".to_string(),
                    head: Vec3::new(5.0, 0.0, 0.0),
                    tail: Vec3::ZERO,
                    annotation: BoneAnnotation::default(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_side_resolution() {
        assert_eq!(JointRole::ShoulderL.with_side(Side::Right), JointRole::ShoulderR);
        assert_eq!(JointRole::ShoulderL.with_side(Side::Left), JointRole::ShoulderL);
        assert_eq!(JointRole::HipR.with_side(Side::None), JointRole::HipR);
        assert_eq!(JointRole::Nose.with_side(Side::Left), JointRole::Nose);
        for (i, role) in JointRole::ALL.iter().enumerate() {
            assert_eq!(role.index(), i);
            assert_eq!(role.mirrored().mirrored(), *role);
        }
    }

    #[test]
    fn test_extract_skips_disabled_and_fills_slots() {
        let skeleton = extract(&rig(), &Camera::default(), 512, 512);

        assert_eq!(skeleton.len(), 5);
        assert!(skeleton.point(JointRole::Nose).is_some());
        assert!(skeleton.point(JointRole::ShoulderR).is_some());
        assert!(skeleton.point(JointRole::HandL).is_none());
        // Camera looks along +Y: +X world is screen right
        let l = skeleton.point(JointRole::ShoulderL).unwrap();
        let r = skeleton.point(JointRole::ShoulderR).unwrap();
        assert!(l[0] > r[0]);
        // Nose above chest
        assert!(skeleton.point(JointRole::Nose).unwrap()[1] < skeleton.point(JointRole::Chest).unwrap()[1]);
    }

    #[test]
    fn test_armature_role_toggles() {
        let mut armature = rig();
        armature.annotation.enabled_roles.remove(&JointRole::Nose);
        let skeleton = extract(&armature, &Camera::default(), 512, 512);
        assert!(skeleton.point(JointRole::Nose).is_none());
        assert_eq!(skeleton.len(), 4);
    }

    #[test]
    fn test_extraction_is_order_independent() {
        let forward = rig();
        let mut reversed = rig();
        reversed.bones.reverse();
        // Duplicate role: first by name must win in both orders
        reversed
            .bones
            .push(bone("aaa_nose", Vec3::new(1.0, 0.0, 2.0), JointRole::Nose, Side::None));
        let mut forward_dup = forward.clone();
        forward_dup
            .bones
            .insert(0, bone("aaa_nose", Vec3::new(1.0, 0.0, 2.0), JointRole::Nose, Side::None));

        let scene_a = SceneSnapshot {
            armatures: vec![forward_dup],
            ..Default::default()
        };
        let scene_b = SceneSnapshot {
            armatures: vec![reversed],
            ..Default::default()
        };

        let a = KeypointMap::from_scene(&scene_a, None, 128, 96);
        let b = KeypointMap::from_scene(&scene_b, None, 128, 96);
        assert_eq!(a, b);

        let fa = a.to_frame();
        let fb = b.to_frame();
        let bits = |f: &Frame| f.data().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&fa), bits(&fb));
    }

    #[test]
    fn test_same_name_ties_are_order_independent() {
        let twin = |x: f32| bone("twin", Vec3::new(x, 0.0, 1.8), JointRole::Nose, Side::None);
        let mut a = rig();
        a.bones.retain(|b| b.annotation.resolved_role() != JointRole::Nose);
        let mut b = a.clone();
        a.bones.extend([twin(0.2), twin(-0.2)]);
        b.bones.extend([twin(-0.2), twin(0.2)]);

        let camera = Camera::default();
        let sa = extract(&a, &camera, 128, 128);
        let sb = extract(&b, &camera, 128, 128);
        assert_eq!(sa, sb);
        assert!(sa.points[JointRole::Nose.index()].is_some());

        // Armatures sharing a name
        let mut moved = rig();
        moved.matrix_world = glam::Mat4::from_translation(Vec3::new(0.5, 0.0, 0.0));
        let forward = SceneSnapshot {
            armatures: vec![rig(), moved.clone()],
            ..Default::default()
        };
        let backward = SceneSnapshot {
            armatures: vec![moved, rig()],
            ..Default::default()
        };
        assert_eq!(
            KeypointMap::from_scene(&forward, None, 64, 64),
            KeypointMap::from_scene(&backward, None, 64, 64)
        );
    }

    #[test]
    fn test_rasterize_draws_joint_colour() {
        let map = KeypointMap {
            width: 64,
            height: 64,
            skeletons: vec![Skeleton {
                armature: "Rig".to_string(),
                points: {
                    let mut p = [None; JOINT_COUNT];
                    p[0] = Some([32.0, 32.0]);
                    p
                },
            }],
        };
        let frame = map.to_frame();
        assert_eq!(frame.shape(), (64, 64, 4));
        assert_eq!(frame.pixel(32, 32), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(frame.pixel(0, 0), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_armature_filter() {
        let mut other = rig();
        other.name = "Other".to_string();
        let scene = SceneSnapshot {
            armatures: vec![rig(), other],
            ..Default::default()
        };
        assert_eq!(KeypointMap::from_scene(&scene, None, 64, 64).skeletons.len(), 2);
        let only = KeypointMap::from_scene(&scene, Some("Rig"), 64, 64);
        assert_eq!(only.skeletons.len(), 1);
        assert_eq!(only.skeletons[0].armature, "Rig");
    }
}

//! Scene snapshot handed to the engine by the host.
//!
//! Plain typed structs populated at the host boundary (the headless host reads
//! them from JSON). The executor only ever reads a snapshot.

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::pose::{ArmatureAnnotation, BoneAnnotation};

/// Read-only view of the scene for one render invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSnapshot {
    pub name: String,
    /// Current frame number
    pub frame: i32,
    pub render: RenderSettings,
    /// Active camera; `None` uses `Camera::default()`
    pub camera: Option<Camera>,
    pub armatures: Vec<Armature>,
    /// Datablocks changed since the previous snapshot (depsgraph updates)
    pub updates: Vec<DatablockUpdate>,
}

impl SceneSnapshot {
    /// Effective output resolution (percentage applied, at least 1x1).
    pub fn resolution(&self) -> (usize, usize) {
        self.render.resolution()
    }

    pub fn camera(&self) -> Camera {
        self.camera.clone().unwrap_or_default()
    }

    /// Copy with the render resolution replaced (viewport renders).
    pub fn with_resolution(&self, width: usize, height: usize) -> SceneSnapshot {
        let mut scene = self.clone();
        scene.render.resolution_x = width as u32;
        scene.render.resolution_y = height as u32;
        scene.render.resolution_percentage = 100;
        scene
    }

    pub fn armature(&self, name: &str) -> Option<&Armature> {
        self.armatures.iter().find(|a| a.name == name)
    }
}

/// Output format settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub resolution_x: u32,
    pub resolution_y: u32,
    pub resolution_percentage: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution_x: 512,
            resolution_y: 512,
            resolution_percentage: 100,
        }
    }
}

impl RenderSettings {
    pub fn resolution(&self) -> (usize, usize) {
        let scale = |v: u32| ((v as u64 * self.resolution_percentage as u64) / 100).max(1) as usize;
        (scale(self.resolution_x), scale(self.resolution_y))
    }
}

/// Look-at camera. Z is up, matching the host's convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees (perspective)
    pub fov_y_deg: f32,
    /// Orthographic view height in world units; set = orthographic camera
    pub ortho_scale: Option<f32>,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, -10.0, 1.0),
            target: Vec3::new(0.0, 0.0, 1.0),
            up: Vec3::Z,
            fov_y_deg: 39.6,
            ortho_scale: None,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        let view = Mat4::look_at_rh(self.eye, self.target, self.up);
        let proj = match self.ortho_scale {
            Some(scale) => {
                let half_h = scale * 0.5;
                let half_w = half_h * aspect;
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, self.near, self.far)
            }
            None => Mat4::perspective_rh(self.fov_y_deg.to_radians(), aspect, self.near, self.far),
        };
        proj * view
    }

    /// Project a world point to pixel coordinates (origin top-left).
    /// Returns `None` for points behind the camera.
    pub fn project(&self, world: Vec3, width: usize, height: usize) -> Option<Vec2> {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let clip = self.view_projection(aspect) * world.extend(1.0);
        if clip.w <= 1e-6 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(Vec2::new(
            (ndc.x * 0.5 + 0.5) * width as f32,
            (0.5 - ndc.y * 0.5) * height as f32,
        ))
    }
}

/// Skeletal rig with per-bone pose annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Armature {
    pub name: String,
    pub matrix_world: Mat4,
    pub annotation: ArmatureAnnotation,
    pub bones: Vec<Bone>,
}

impl Default for Armature {
    fn default() -> Self {
        Self {
            name: String::new(),
            matrix_world: Mat4::IDENTITY,
            annotation: ArmatureAnnotation::default(),
            bones: Vec::new(),
        }
    }
}

impl Armature {
    /// Bone head in world space
    pub fn bone_head_world(&self, bone: &Bone) -> Vec3 {
        self.matrix_world.transform_point3(bone.head)
    }
}

/// Posed bone in armature space.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Bone {
    pub name: String,
    pub head: Vec3,
    pub tail: Vec3,
    pub annotation: BoneAnnotation,
}

/// Datablock category of a depsgraph update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatablockKind {
    Object,
    Material,
    Armature,
    Scene,
    NodeTree,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatablockUpdate {
    pub id: String,
    pub kind: DatablockKind,
}

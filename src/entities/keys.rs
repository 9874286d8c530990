//! Parameter and socket name constants.
//!
//! Avoid string typos, enable IDE autocomplete.
//! Usage: `params.get_str(P_BACKEND)`, `inputs.image(S_IMAGE)`

// === Common sockets ===
/// Image payload (input or output)
pub const S_IMAGE: &str = "image";
/// Scalar payload
pub const S_VALUE: &str = "value";
/// Output width override (0 = scene resolution)
pub const S_WIDTH: &str = "width";
/// Output height override (0 = scene resolution)
pub const S_HEIGHT: &str = "height";
/// Random seed
pub const S_SEED: &str = "seed";

// === Math ===
pub const S_A: &str = "a";
pub const S_B: &str = "b";
/// Math operation name (add, subtract, multiply, divide, power, minimum, maximum)
pub const P_OPERATION: &str = "operation";
pub const S_MIN: &str = "min";
pub const S_MAX: &str = "max";

// === Compositing ===
/// Mix factor (0 = a, 1 = b)
pub const S_FACTOR: &str = "factor";
/// Blend mode name (normal, screen, add, subtract, multiply, divide, difference)
pub const P_BLEND_MODE: &str = "blend_mode";
pub const S_BRIGHTNESS: &str = "brightness";
pub const S_CONTRAST: &str = "contrast";

// === Sources ===
/// Image file path
pub const S_PATH: &str = "path";

// === Scene info ===
pub const S_RESOLUTION_X: &str = "resolution_x";
pub const S_RESOLUTION_Y: &str = "resolution_y";
pub const S_FRAME: &str = "frame";

// === Annotation ===
/// Armature name filter (empty = all armatures)
pub const S_ARMATURE: &str = "armature";
pub const S_KEYPOINTS: &str = "keypoints";

// === Conditioning ===
pub const S_CONTROL_IMAGE: &str = "control_image";
pub const S_CONDITIONING_SCALE: &str = "conditioning_scale";
pub const S_CONDITIONING: &str = "conditioning";
/// Control model identifier
pub const P_MODEL: &str = "model";

// === Generation ===
pub const S_PROMPT: &str = "prompt";
pub const S_NEGATIVE_PROMPT: &str = "negative_prompt";
pub const S_STEPS: &str = "steps";
pub const S_CFG_SCALE: &str = "cfg_scale";
pub const S_INIT_IMAGE: &str = "init_image";
pub const S_STRENGTH: &str = "strength";
pub const S_CONTROL: &str = "control";
/// Backend name in the registry (empty = registry default)
pub const P_BACKEND: &str = "backend";
/// Retries on transient backend failures
pub const P_RETRIES: &str = "retries";

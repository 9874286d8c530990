//! Built-in node library.
//!
//! | Module | Kinds |
//! |--------|-------|
//! | `source` | ConstantImage, ImageFile, Noise |
//! | `scalar` | Value, Math, RandomValue |
//! | `compositor` | Mix, BrightnessContrast, Resize |
//! | `scene_info` | RenderProperties |
//! | `annotation` | OpenPose, ControlNet |
//! | `generate` | Generate |
//! | `output` | GroupOutput |

pub mod annotation;
pub mod compositor;
pub mod generate;
pub mod output;
pub mod scalar;
pub mod scene_info;
pub mod source;

//! Compute background effects.

use glam::Vec4;

/// Push constants shared by every background compute shader (64 bytes).
///
/// Each effect interprets the four vectors on its own.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ComputePushConstants {
    pub data1: Vec4,
    pub data2: Vec4,
    pub data3: Vec4,
    pub data4: Vec4,
}

impl ComputePushConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// A compute background: the shader to run and its default parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeEffect {
    pub name: &'static str,
    /// File name of the compiled shader, embedded or inside the shader directory.
    pub shader: &'static str,
    pub push: ComputePushConstants,
}

/// Built-in effects, in cycling order.
pub fn builtin_effects() -> Vec<ComputeEffect> {
    vec![
        ComputeEffect {
            name: "gradient",
            shader: spock_shaders::GRADIENT_COMP,
            push: ComputePushConstants {
                data1: Vec4::new(1.0, 0.0, 0.0, 1.0),
                data2: Vec4::new(0.0, 0.0, 1.0, 1.0),
                ..Default::default()
            },
        },
        ComputeEffect {
            name: "sky",
            shader: spock_shaders::SKY_COMP,
            push: ComputePushConstants {
                data1: Vec4::new(0.1, 0.2, 0.4, 0.97),
                ..Default::default()
            },
        },
    ]
}

/// Index of the effect called `name`.
pub fn find_effect(effects: &[ComputeEffect], name: &str) -> Option<usize> {
    effects.iter().position(|effect| effect.name == name)
}

/// Index after `current`, wrapping around.
pub fn next_effect(current: usize, count: usize) -> usize {
    if count == 0 {
        0
    } else {
        (current + 1) % count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_constant_layout() {
        assert_eq!(ComputePushConstants::SIZE, 64);
        assert_eq!(std::mem::offset_of!(ComputePushConstants, data4), 48);
    }

    #[test]
    fn builtin_defaults() {
        let effects = builtin_effects();
        let gradient = &effects[find_effect(&effects, "gradient").unwrap()];
        assert_eq!(gradient.push.data1, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(gradient.push.data2, Vec4::new(0.0, 0.0, 1.0, 1.0));

        let sky = &effects[find_effect(&effects, "sky").unwrap()];
        assert_eq!(sky.push.data1, Vec4::new(0.1, 0.2, 0.4, 0.97));
        assert_eq!(sky.shader, "sky.comp.spv");

        assert_eq!(find_effect(&effects, "plasma"), None);
    }

    #[test]
    fn cycling_wraps() {
        assert_eq!(next_effect(0, 2), 1);
        assert_eq!(next_effect(1, 2), 0);
        assert_eq!(next_effect(0, 0), 0);
    }
}

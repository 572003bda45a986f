//! Shaders for the Spock engine.
//!
//! The GLSL sources live in `shaders/` and are compiled to SPIR-V by the
//! build script using shaderc. Each compiled module is embedded here under
//! its `.spv` file name, the same name used when loading from a directory.

/// Gradient background effect.
pub const GRADIENT_COMP: &str = "gradient_color.comp.spv";
/// Sky background effect.
pub const SKY_COMP: &str = "sky.comp.spv";
/// Hardcoded triangle, vertex stage.
pub const TRIANGLE_VERT: &str = "colored_triangle.vert.spv";
/// Vertex color passthrough shared by the triangle and mesh pipelines.
pub const TRIANGLE_FRAG: &str = "colored_triangle.frag.spv";
/// Mesh vertex stage pulling vertices through a buffer device address.
pub const MESH_VERT: &str = "colored_triangle_mesh.vert.spv";

/// Embedded SPIR-V bytecode (raw bytes, may not be aligned).
static SHADERS: &[(&str, &[u8])] = &[
    (
        GRADIENT_COMP,
        include_bytes!(concat!(env!("OUT_DIR"), "/gradient_color.comp.spv")),
    ),
    (
        SKY_COMP,
        include_bytes!(concat!(env!("OUT_DIR"), "/sky.comp.spv")),
    ),
    (
        TRIANGLE_VERT,
        include_bytes!(concat!(env!("OUT_DIR"), "/colored_triangle.vert.spv")),
    ),
    (
        TRIANGLE_FRAG,
        include_bytes!(concat!(env!("OUT_DIR"), "/colored_triangle.frag.spv")),
    ),
    (
        MESH_VERT,
        include_bytes!(concat!(env!("OUT_DIR"), "/colored_triangle_mesh.vert.spv")),
    ),
];

/// Every embedded shader as `(file name, SPIR-V bytes)`.
pub fn all() -> &'static [(&'static str, &'static [u8])] {
    SHADERS
}

/// SPIR-V bytes of the shader named `name`, e.g. `sky.comp.spv`.
pub fn spirv(name: &str) -> Option<&'static [u8]> {
    SHADERS
        .iter()
        .find(|(shader, _)| *shader == name)
        .map(|(_, bytes)| *bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn every_shader_is_spirv() {
        assert_eq!(all().len(), 5);
        for (name, bytes) in all() {
            assert_eq!(bytes.len() % 4, 0, "{name} is not word aligned");
            let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            assert_eq!(magic, SPIRV_MAGIC, "Invalid SPIR-V magic number in {name}");
            assert!(bytes.len() > 100, "{name} is too small");
        }
    }

    #[test]
    fn lookup_by_file_name() {
        assert!(spirv(SKY_COMP).is_some());
        assert!(spirv(MESH_VERT).is_some());
        assert!(spirv("sky.comp").is_none());
        assert!(spirv("missing.comp.spv").is_none());
    }
}

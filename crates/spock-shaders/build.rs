//! Build script to compile the GLSL sources under `shaders/` to SPIR-V.

use std::env;
use std::fs;
use std::path::Path;

use shaderc::{Compiler, ShaderKind};

/// Every source the engine uses. Output lands in `OUT_DIR` as `<source>.spv`.
const SOURCES: &[(&str, ShaderKind)] = &[
    ("gradient_color.comp", ShaderKind::Compute),
    ("sky.comp", ShaderKind::Compute),
    ("colored_triangle.vert", ShaderKind::Vertex),
    ("colored_triangle.frag", ShaderKind::Fragment),
    ("colored_triangle_mesh.vert", ShaderKind::Vertex),
];

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let shader_dir = Path::new("shaders");

    println!("cargo:rerun-if-changed=shaders/");

    let compiler = Compiler::new().expect("Failed to create shader compiler");

    for &(source, kind) in SOURCES {
        compile_shader(
            &compiler,
            shader_dir.join(source),
            Path::new(&out_dir).join(format!("{source}.spv")),
            kind,
        );
    }
}

fn compile_shader(
    compiler: &Compiler,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    kind: ShaderKind,
) {
    let input_path = input.as_ref();
    let output_path = output.as_ref();

    let source = fs::read_to_string(input_path)
        .unwrap_or_else(|e| panic!("Failed to read shader {}: {e}", input_path.display()));

    let file_name = input_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("shader");

    let mut options = shaderc::CompileOptions::new().expect("Failed to create compile options");
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_3 as u32,
    );
    options.set_target_spirv(shaderc::SpirvVersion::V1_6);
    options.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let result = compiler
        .compile_into_spirv(&source, kind, file_name, "main", Some(&options))
        .unwrap_or_else(|e| panic!("Failed to compile shader {}: {e}", input_path.display()));

    if result.get_num_warnings() > 0 {
        println!(
            "cargo:warning={}: {}",
            input_path.display(),
            result.get_warning_messages()
        );
    }

    fs::write(
        output_path,
        bytemuck::cast_slice::<u32, u8>(result.as_binary()),
    )
    .unwrap_or_else(|e| panic!("Failed to write shader {}: {e}", output_path.display()));
}

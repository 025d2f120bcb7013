// SPDX-License-Identifier: CEPL-1.0
use std::{env, fs, path::PathBuf};

const SHADERS: [(&str, shaderc::ShaderKind); 2] = [
    ("triangle.vert", shaderc::ShaderKind::Vertex),
    ("triangle.frag", shaderc::ShaderKind::Fragment),
];

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let manifest = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR is set by cargo"));
    let src_dir = manifest.join("../../assets/shaders");

    let comp = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    for (name, kind) in SHADERS {
        let path = src_dir.join(name);
        println!("cargo:rerun-if-changed={}", path.display());
        let source = fs::read_to_string(&path)
            .unwrap_or_else(|err| panic!("reading {}: {err}", path.display()));
        let spv = comp
            .compile_into_spirv(&source, kind, name, "main", Some(&opts))
            .unwrap_or_else(|err| panic!("compiling {name}: {err}"));
        let bytes = spv.as_binary_u8();
        fs::write(out.join(format!("{name}.spv")), bytes)
            .unwrap_or_else(|err| panic!("writing {name}.spv: {err}"));

        // the runtime loads <assets>/shaders/<name>.spv; skip unchanged
        // output so the asset mirror is not re-copied on every build
        let asset = src_dir.join(format!("{name}.spv"));
        if fs::read(&asset).ok().as_deref() != Some(bytes) {
            fs::write(&asset, bytes)
                .unwrap_or_else(|err| panic!("writing {}: {err}", asset.display()));
        }
    }

    println!("cargo:rerun-if-changed=build.rs");
}

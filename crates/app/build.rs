//! Compiles the demo's GLSL shaders to the SPIR-V binaries loaded at
//! runtime. Uses glslc (or glslangValidator) from the Vulkan SDK; when
//! neither is installed the build still succeeds and the shaders must
//! be compiled manually with shaders/compile.sh.

use std::path::Path;
use std::process::Command;

const SHADER_DIR: &str = "../../shaders";
const SHADERS: &[&str] = &["spin.vert", "spin.frag"];

fn find_compiler() -> Option<&'static str> {
    ["glslc", "glslangValidator"]
        .into_iter()
        .find(|compiler| Command::new(compiler).arg("--version").output().is_ok())
}

fn needs_compile(source: &Path, output: &Path) -> bool {
    match (source.metadata(), output.metadata()) {
        (Ok(src), Ok(out)) => match (src.modified(), out.modified()) {
            (Ok(src_time), Ok(out_time)) => src_time > out_time,
            _ => true,
        },
        _ => true,
    }
}

fn main() {
    for shader in SHADERS {
        println!("cargo:rerun-if-changed={}/{}", SHADER_DIR, shader);
    }

    let Some(compiler) = find_compiler() else {
        println!(
            "cargo:warning=no GLSL compiler found (glslc or glslangValidator); \
             run shaders/compile.sh before launching the demo"
        );
        return;
    };

    for shader in SHADERS {
        let source = Path::new(SHADER_DIR).join(shader);
        let output = Path::new(SHADER_DIR).join(format!("{}.spv", shader));
        if !needs_compile(&source, &output) {
            continue;
        }

        let status = match compiler {
            "glslangValidator" => Command::new(compiler)
                .arg("-V")
                .arg(&source)
                .arg("-o")
                .arg(&output)
                .status(),
            _ => Command::new(compiler)
                .arg(&source)
                .arg("-o")
                .arg(&output)
                .status(),
        };

        match status {
            Ok(status) if status.success() => {}
            Ok(status) => panic!("{} failed on {:?}: {}", compiler, source, status),
            Err(e) => panic!("failed to run {}: {}", compiler, e),
        }
    }
}

use std::env;
use std::path::{Path, PathBuf};

const WATCHED: [&str; 4] = ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_TRIPLET", "VCPKGRS_DYNAMIC"];

fn warn(message: &str) {
    println!("cargo:warning={message}");
}

fn vcpkg_install(root: &Path) -> PathBuf {
    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    root.join("installed").join(triplet)
}

fn main() {
    for name in WATCHED {
        println!("cargo:rerun-if-env-changed={name}");
    }

    // pkg-config finds FFmpeg everywhere else.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }

    if let Some(dir) = env::var_os("FFMPEG_DIR") {
        if !Path::new(&dir).join("include").is_dir() {
            warn(&format!(
                "FFMPEG_DIR={} has no include directory; the FFmpeg bindings will fail to build.",
                Path::new(&dir).display()
            ));
        }
        return;
    }

    let Some(root) = env::var_os("VCPKG_ROOT") else {
        warn("FFMPEG_DIR is not set. Install FFmpeg (for example through vcpkg) and point FFMPEG_DIR at it, or use the command backend with ffprobe/ffmpeg on PATH.");
        return;
    };

    let install = vcpkg_install(Path::new(&root));
    if !install.is_dir() {
        warn(&format!("No vcpkg FFmpeg install under {}.", install.display()));
        return;
    }

    warn(&format!(
        "Using vcpkg FFmpeg at {0}; set FFMPEG_DIR={0} to silence this warning.",
        install.display()
    ));
    if env::var_os("VCPKGRS_DYNAMIC").is_none() {
        warn("Set VCPKGRS_DYNAMIC=1 if vcpkg built FFmpeg as shared libraries.");
    }
}

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");

    // The built-in backend is pure Rust, only the FFmpeg backend needs
    // anything from here.
    if env::var_os("CARGO_FEATURE_FFMPEG").is_none() {
        return Ok(());
    }

    match env::var("CARGO_CFG_TARGET_OS").as_deref() {
        Ok("windows") => copy_ffmpeg_dlls(),
        _ => Ok(()),
    }
}

/// Copy the FFmpeg DLLs from `$FFMPEG_DIR/bin` next to the executables (and
/// test binaries) so they can be found at runtime.
fn copy_ffmpeg_dlls() -> io::Result<()> {
    let Some(ffmpeg_dir) = env::var_os("FFMPEG_DIR") else {
        println!("cargo:warning=`FFMPEG_DIR` is unset, FFmpeg's DLLs won't be copied.");
        return Ok(());
    };
    let ffmpeg_bin_dir = Path::new(&ffmpeg_dir).join("bin");

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap_or_default());
    let Some(target_dir) = out_dir.ancestors().nth(3) else {
        return Ok(());
    };

    for entry in fs::read_dir(&ffmpeg_bin_dir)? {
        let entry_path = entry?.path();
        if entry_path.extension().and_then(|s| s.to_str()) != Some("dll") {
            continue;
        }
        let Some(dll_file_name) = entry_path.file_name() else {
            continue;
        };

        fs::copy(&entry_path, target_dir.join(dll_file_name))?;
        fs::copy(&entry_path, target_dir.join("deps").join(dll_file_name))?;
    }

    Ok(())
}

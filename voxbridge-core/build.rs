// Link directives for the embedded entry-point table.
//
// Only active with the `embedded` feature. Inputs:
//   SHERPA_ONNX_LIB_DIR     directory holding the engine library (search path)
//   SHERPA_ONNX_LINK_KIND   `static` (default) or `dylib`
//   SHERPA_ONNX_EXTRA_LIBS  comma-separated extra libraries (e.g. onnxruntime)

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=SHERPA_ONNX_LIB_DIR");
    println!("cargo:rerun-if-env-changed=SHERPA_ONNX_LINK_KIND");
    println!("cargo:rerun-if-env-changed=SHERPA_ONNX_EXTRA_LIBS");

    if std::env::var_os("CARGO_FEATURE_EMBEDDED").is_none() {
        return;
    }

    if let Ok(dir) = std::env::var("SHERPA_ONNX_LIB_DIR") {
        println!("cargo:rustc-link-search=native={dir}");
    } else {
        println!(
            "cargo:warning=SHERPA_ONNX_LIB_DIR is not set; relying on the default linker search path"
        );
    }

    let kind = match std::env::var("SHERPA_ONNX_LINK_KIND").as_deref() {
        Ok("dylib") | Ok("dynamic") => "dylib",
        _ => "static",
    };
    println!("cargo:rustc-link-lib={kind}=sherpa-onnx-c-api");

    if let Ok(extra) = std::env::var("SHERPA_ONNX_EXTRA_LIBS") {
        for lib in extra.split(',').map(str::trim).filter(|l| !l.is_empty()) {
            println!("cargo:rustc-link-lib={lib}");
        }
    }

    // A static engine archive is C++; pull in the platform runtime.
    if kind == "static" {
        match std::env::var("CARGO_CFG_TARGET_OS").as_deref() {
            Ok("macos") | Ok("ios") => println!("cargo:rustc-link-lib=c++"),
            Ok("android") => println!("cargo:rustc-link-lib=c++_shared"),
            Ok("windows") => {}
            _ => println!("cargo:rustc-link-lib=stdc++"),
        }
    }
}

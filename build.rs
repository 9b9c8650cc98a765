use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Drop a starter config next to the build output; Config::load() falls
    // back to defaults if this is never copied into place, so failure here
    // is not fatal to the build.
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| "./".to_string());
    let template_path = Path::new(&out_dir).join("../../../robotv.conf.template");

    let template = r#"# robotv-live configuration template.
# Copy to robotv.conf (or wherever the server's config path points) and
# adjust. Unrecognized keys are ignored.

TimeShiftDir = /video
MaxTimeShiftSize = 1073741824
ListenPort = 34892
FilterChannels = false
"#;

    let _ = fs::write(template_path, template);
    println!("cargo:rerun-if-changed=build.rs");
}

fn main() {
    // Only rebuild the browser bundle when explicitly requested and the UI sources are present
    let ui_dir = std::path::Path::new("ui");
    if std::env::var("STATICMS_BUILD_UI").is_ok() && ui_dir.join("package.json").exists() {
        println!("cargo:rerun-if-changed=ui/src");
        println!("cargo:rerun-if-changed=ui/index.html");
        println!("cargo:rerun-if-changed=ui/package.json");

        if !ui_dir.join("node_modules").exists() {
            let install = std::process::Command::new("npm")
                .args(["install"])
                .current_dir("ui")
                .status()
                .expect("Failed to run npm install");
            assert!(install.success(), "npm install failed");
        }

        let status = std::process::Command::new("npm")
            .args(["run", "build"])
            .current_dir("ui")
            .status()
            .expect("Failed to run npm build");

        assert!(status.success(), "npm build failed");
    }
    println!("cargo:rerun-if-env-changed=STATICMS_BUILD_UI");
    println!("cargo:rerun-if-changed=ui/dist");
}

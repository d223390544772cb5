use embed_manifest::manifest::Setting;
use embed_manifest::{embed_manifest, new_manifest};

fn main() {
    // Elevation is decided at runtime (runas relaunch), so the manifest stays
    // asInvoker; long paths matter for the recovery-tree copies.
    if std::env::var_os("CARGO_CFG_WINDOWS").is_some() {
        embed_manifest(new_manifest("Ws1Migrate.Migrator").long_path_aware(Setting::Enabled))
            .expect("embed manifest");
    }
    println!("cargo:rerun-if-changed=build.rs");
}

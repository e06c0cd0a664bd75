use anyhow::Result;
use vergen::EmitBuilder;

fn main() -> Result<()> {
    if EmitBuilder::builder()
        .fail_on_error()
        .git_sha(true)
        .emit()
        .is_err()
    {
        println!("cargo:rustc-env=VERGEN_GIT_SHA=unknown");
    }
    Ok(())
}

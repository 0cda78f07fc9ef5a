use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(excel_uploader_lib::run());

    // A confirmation prompt interrupted by Ctrl-C may still be blocked on stdin.
    runtime.shutdown_background();
    result
}

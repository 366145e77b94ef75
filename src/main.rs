//! Thin CLI wrapper around [`mfs::compile`]: reads a `.mf` file, compiles
//! it, and prints the resulting IR (or diagnostics) as JSON on stdout.
//! File-watching, debouncing, and project configuration are handled by
//! external collaborators, not this binary.

use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: mfsc <score.mf>");
        return ExitCode::FAILURE;
    };
    let root_file_path = PathBuf::from(&path);
    let base_dir = root_file_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    log::info!("compiling {}", root_file_path.display());
    let result = mfs::compile(&root_file_path, &base_dir);

    for diagnostic in &result.diagnostics {
        match diagnostic.severity {
            mfs::Severity::Error => log::error!("{}", diagnostic.message),
            mfs::Severity::Warning => log::warn!("{}", diagnostic.message),
            mfs::Severity::Info => log::info!("{}", diagnostic.message),
        }
    }

    match &result.ir {
        Some(ir) => {
            let json = serde_json::to_string_pretty(ir).expect("ScoreIr always serializes");
            println!("{json}");
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("compile failed with {} diagnostic(s)", result.diagnostics.len());
            ExitCode::FAILURE
        }
    }
}

//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `threadkeep_core` linkage.
//! - Open an in-memory store through the coordinator and report its schema.

use std::process::ExitCode;
use threadkeep_core::db::migrations::latest_version;
use threadkeep_core::{core_version, ping, Coordinator};

fn main() -> ExitCode {
    println!("threadkeep_core ping={}", ping());
    println!("threadkeep_core version={}", core_version());

    match Coordinator::open_in_memory().and_then(|coordinator| coordinator.schema_version()) {
        Ok(version) => {
            println!(
                "threadkeep_core schema_version={version} latest={}",
                latest_version()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("threadkeep_core store_open=failed error={err}");
            ExitCode::FAILURE
        }
    }
}

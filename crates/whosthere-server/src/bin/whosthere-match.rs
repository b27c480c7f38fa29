//! Offline passphrase check.
//!
//! Usage: `whosthere-match <text...>`
//!
//! Loads the server configuration (from `WHOSTHERE_CONFIG_PATH` or
//! `config.toml`) and prints the match result as JSON. Exits with 0 on a
//! match, 1 on a miss and 2 on a usage or configuration error.

use std::process::ExitCode;

use serde_json::json;
use whosthere_server::config;

fn main() -> ExitCode {
    let text = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if text.trim().is_empty() {
        eprintln!("usage: whosthere-match <text...>");
        return ExitCode::from(2);
    }

    let (path, _) = config::resolve_config_path(None);
    let config = match config::load_config(Some(path.as_str())) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };
    let passphrases = match config.passphrase_set() {
        Ok(set) => set,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    let threshold = config.auth.threshold;
    let result = passphrases.check(&text, threshold);
    println!(
        "{}",
        json!({
            "matched": result.matched,
            "score": result.score,
            "matched_index": result.matched_phrase_index,
            "threshold": threshold,
        })
    );

    if result.matched {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

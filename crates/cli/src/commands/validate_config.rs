//! The `validate-config` command — load a config file and report problems.

use std::path::Path;

use mentora_config::AppConfig;

pub fn run(path: &Path) -> anyhow::Result<()> {
    match AppConfig::load(path) {
        Ok(config) => {
            println!("Config OK: {}", path.display());
            println!(
                "  generation: deadline {}s, {} transient retries, {}ms base backoff",
                config.generation.deadline_secs,
                config.generation.transient_retries,
                config.generation.backoff_base_ms
            );
            println!(
                "  events: stream buffer {}, bus capacity {}",
                config.events.stream_buffer, config.events.bus_capacity
            );
            println!("  hints: {} fallback texts", config.hints.fallback_texts.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("Config invalid: {e}");
            Err(e.into())
        }
    }
}

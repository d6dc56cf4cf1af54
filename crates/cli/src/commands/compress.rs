//! `tollgate compress` — preview what the compressor sends upstream.

use std::path::Path;

use tollgate_config::CompressionLevel;
use tollgate_core::estimate_tokens;
use tollgate_gateway::{compress, compression_ratio};

pub fn run(
    config_path: Option<&Path>,
    text: &str,
    level: Option<CompressionLevel>,
) -> anyhow::Result<()> {
    let level = match level {
        Some(level) => level,
        None => super::load_config(config_path)?.compression_level,
    };

    let compressed = compress(text, level);
    println!("{compressed}");
    eprintln!();
    eprintln!(
        "   level {level} · {} → {} tokens · {:.1}% smaller",
        estimate_tokens(text),
        estimate_tokens(&compressed),
        compression_ratio(text, &compressed) * 100.0
    );
    Ok(())
}

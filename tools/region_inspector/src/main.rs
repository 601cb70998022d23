use std::env;
use std::path::Path;

use strata_persist::region::RegionFile;
use strata_world::block::{register_default_blocks, BlockId};

fn main() {
    let Some(path) = env::args().nth(1) else {
        eprintln!("Usage: region_inspector <path/to/r.X.Z.strr>");
        std::process::exit(2);
    };

    if let Err(err) = run(Path::new(&path)) {
        eprintln!("region_inspector error: {err}");
        std::process::exit(1);
    }
}

fn run(path: &Path) -> Result<(), String> {
    let region = RegionFile::open(path)
        .map_err(|err| format!("failed to open {}: {err}", path.display()))?;
    let registry = register_default_blocks();

    println!("Region: {}", path.display());
    println!("Magic: {:?}", RegionFile::MAGIC);
    println!("Chunk count: {}", region.chunk_count());

    for pos in region.chunk_positions() {
        let Some(saved) = region.saved_chunk(pos) else {
            continue;
        };
        let solid = saved
            .blocks
            .iter()
            .filter(|&&id| registry.get_properties(BlockId(id)).solid)
            .count();
        let metadata = if saved.metadata.is_empty() {
            "none".to_string()
        } else {
            format!("{} set", saved.metadata.iter().filter(|&&m| m != 0).count())
        };
        println!(
            "  chunk @ ({}, {}): {solid} solid block(s), metadata {metadata}",
            pos.x, pos.z
        );
    }

    Ok(())
}

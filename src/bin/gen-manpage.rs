//! Man page generator for mramqual
//!
//! Writes `mramqual.1` plus one `mramqual-<command>.1` page per subcommand.
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

#[allow(dead_code)]
#[path = "../devices.rs"]
mod devices;

/// Render the top-level page and every subcommand page as (file name, roff)
fn render_pages() -> std::io::Result<Vec<(String, Vec<u8>)>> {
    let mut cmd = cli::Cli::command();
    cmd.build();

    let mut pages = Vec::new();
    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd.clone()).render(&mut buffer)?;
    pages.push(("mramqual.1".to_string(), buffer));

    for sub in cmd.get_subcommands().filter(|s| !s.is_hide_set()) {
        let name = format!("mramqual-{}", sub.get_name());
        let mut buffer = Vec::new();
        clap_mangen::Man::new(sub.clone())
            .title(name.clone())
            .render(&mut buffer)?;
        pages.push((format!("{}.1", name), buffer));
    }

    Ok(pages)
}

fn write_pages(output_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)?;
    render_pages()?
        .into_iter()
        .map(|(file, roff)| {
            let path = output_dir.join(file);
            fs::write(&path, roff)?;
            Ok(path)
        })
        .collect()
}

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));

    for path in write_pages(&output_dir)? {
        println!("Man page generated at: {}", path.display());
    }
    println!("\nTo view the main page:");
    println!("  man -l {}", output_dir.join("mramqual.1").display());

    Ok(())
}

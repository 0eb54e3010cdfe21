//! Shell completions and man pages, both rendered from the clap definition.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

use crate::Cli;

fn render_completions(shell: clap_complete::Shell, out: &mut impl Write) {
    let mut cmd = Cli::command();
    let bin = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, bin, out);
}

/// Write one page for the binary and one per subcommand (`crmsync-sync.1`, ...).
fn write_pages(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let root = Cli::command();
    let bin = root.get_name().to_string();

    let mut pages = vec![(bin.clone(), Man::new(root.clone()))];
    for sub in root.get_subcommands() {
        let title = format!("{bin}-{}", sub.get_name());
        pages.push((title.clone(), Man::new(sub.clone()).title(title)));
    }

    let mut written = Vec::with_capacity(pages.len());
    for (title, man) in pages {
        let path = dir.join(format!("{title}.1"));
        let mut buf = Vec::new();
        man.render(&mut buf)?;
        std::fs::write(&path, buf)?;
        written.push(path);
    }
    Ok(written)
}

pub(crate) fn handle_completions(
    shell: clap_complete::Shell,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut out = Vec::new();
    render_completions(shell, &mut out);
    std::io::stdout().write_all(&out)?;
    Ok(())
}

pub(crate) fn handle_man(output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(dir) = output else {
        Man::new(Cli::command()).render(&mut std::io::stdout())?;
        return Ok(());
    };

    std::fs::create_dir_all(&dir)?;
    let pages = write_pages(&dir)?;
    println!("Wrote {} man pages to {}", pages.len(), dir.display());
    Ok(())
}

use anyhow::Result;
use outpack_core::{Root, Universe};

pub(crate) fn run(query: String, allow_remote: bool) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let root = Root::open_descend(&cwd)?;
    let universe = if allow_remote { Universe::All } else { Universe::Local };
    let id = outpack_core::search(root.index(), &query, universe)?;
    println!("{id}");
    Ok(())
}

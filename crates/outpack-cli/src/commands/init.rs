use std::path::PathBuf;

use anyhow::Result;
use outpack_core::Root;

pub(crate) fn run(path: PathBuf, archive: Option<String>, use_file_store: bool, require_complete_tree: bool) -> Result<()> {
    Root::init(path, archive, use_file_store, require_complete_tree)?;
    println!("initialized outpack repository");
    Ok(())
}

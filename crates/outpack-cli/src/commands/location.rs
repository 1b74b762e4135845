use anyhow::Result;
use outpack_core::{LocationKind, Root};

pub(crate) fn list() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let root = Root::open_descend(&cwd)?;
    for location in root.config().remote_locations() {
        println!("{}", location.name);
    }
    Ok(())
}

pub(crate) fn add(name: String, address: String) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut root = Root::open_descend(&cwd)?;
    let kind = LocationKind::parse(&address)?;
    root.config_mut().add_location(&name, kind)?;
    root.write_config()?;
    Ok(())
}

pub(crate) fn remove(name: String) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut root = Root::open_descend(&cwd)?;
    root.config_mut().remove_location(&name)?;
    root.write_config()?;
    Ok(())
}

pub(crate) fn rename(old: String, new: String) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut root = Root::open_descend(&cwd)?;
    root.config_mut().rename_location(&old, &new)?;
    root.write_config()?;
    Ok(())
}

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use outpack_core::{ParameterValue, Root};

#[allow(clippy::too_many_arguments)]
pub(crate) fn run(
    name: String,
    strings: Vec<(String, String)>,
    numbers: Vec<(String, f64)>,
    bools: Vec<(String, bool)>,
) -> Result<()> {
    let mut parameters: BTreeMap<String, ParameterValue> = BTreeMap::new();
    for (key, value) in strings {
        if parameters.insert(key.clone(), ParameterValue::String(value)).is_some() {
            bail!("duplicate parameter '{key}'");
        }
    }
    for (key, value) in numbers {
        if parameters.insert(key.clone(), ParameterValue::Number(value)).is_some() {
            bail!("duplicate parameter '{key}'");
        }
    }
    for (key, value) in bools {
        if parameters.insert(key.clone(), ParameterValue::Bool(value)).is_some() {
            bail!("duplicate parameter '{key}'");
        }
    }

    let cwd = std::env::current_dir()?;
    let mut root = Root::open_descend(&cwd)?;
    let packet = outpack_core::Packet::new(&mut root, cwd, name, None, parameters);
    let id = packet.end(true)?;
    println!("{id}");
    Ok(())
}

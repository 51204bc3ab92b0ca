use super::{report, AnyProvider, EXIT_SUCCESS};
use std::path::Path;

pub fn run(
    provider: &mut AnyProvider,
    source: &Path,
    destination: &Path,
    delete: bool,
) -> Result<u8, String> {
    let instance = match provider.setup() {
        Ok(instance) => instance,
        Err(err) => return Ok(report(&err)),
    };
    instance
        .sync_from(source, destination, delete)
        .map_err(|e| e.to_string())?;
    println!("pulled {} to {}", source.display(), destination.display());
    Ok(EXIT_SUCCESS)
}

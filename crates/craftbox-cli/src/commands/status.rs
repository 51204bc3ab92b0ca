use super::{report, AnyProvider, EXIT_SUCCESS};

/// Report the instance's observed state without mutating it.
pub fn run(provider: &AnyProvider) -> Result<u8, String> {
    let instance = provider.instance();
    let state = match instance.exists() {
        Ok(false) => "absent",
        Ok(true) => match instance.is_running() {
            Ok(true) => "running",
            Ok(false) => "stopped",
            Err(err) => return Ok(report(&err)),
        },
        Err(err) => return Ok(report(&err)),
    };
    println!("{} {state}", instance.name());
    Ok(EXIT_SUCCESS)
}

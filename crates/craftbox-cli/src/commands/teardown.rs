use super::{report, AnyProvider, EXIT_SUCCESS};

pub fn run(provider: &mut AnyProvider, clean: bool) -> Result<u8, String> {
    match provider.teardown(clean) {
        Ok(()) => {
            let verb = if clean { "deleted" } else { "stopped" };
            println!("instance '{}' {verb}", provider.instance().name());
            Ok(EXIT_SUCCESS)
        }
        Err(err) => Ok(report(&err)),
    }
}

use super::{report, AnyProvider, EXIT_SUCCESS};

pub fn run(provider: &mut AnyProvider) -> Result<u8, String> {
    match provider.setup() {
        Ok(instance) => {
            println!("instance '{}' is ready", instance.name());
            Ok(EXIT_SUCCESS)
        }
        Err(err) => Ok(report(&err)),
    }
}

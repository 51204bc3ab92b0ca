use super::{report, AnyProvider, EXIT_FAILURE};
use craftbox_exec::ExecOptions;

/// Run a command inside the environment, forwarding its exit code.
pub fn run(
    provider: &mut AnyProvider,
    command: &[String],
    env_overrides: &[String],
) -> Result<u8, String> {
    let mut opts = ExecOptions::default();
    for pair in env_overrides {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("invalid --env '{pair}', expected KEY=VALUE"))?;
        opts.env.insert(key.to_owned(), value.to_owned());
    }

    let instance = match provider.setup() {
        Ok(instance) => instance,
        Err(err) => return Ok(report(&err)),
    };
    let out = instance.execute(command, &opts).map_err(|e| e.to_string())?;
    Ok(u8::try_from(out.exit_code).unwrap_or(EXIT_FAILURE))
}

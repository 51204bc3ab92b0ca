//! `/etc/os-release` inspection.

use craftbox_exec::{argv, ExecError, ExecOptions, Executor};
use std::collections::BTreeMap;

pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Parsed snapshot of the environment's OS identification file. Not cached
/// across negotiations; the environment may change between calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease(BTreeMap<String, String>);

impl OsRelease {
    pub fn parse(content: &str) -> Self {
        let mut map = BTreeMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value
                    .trim()
                    .trim_matches('"')
                    .trim_matches('\'')
                    .to_owned();
                map.insert(key.trim().to_owned(), value);
            }
        }
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.get("ID")
    }

    pub fn version_id(&self) -> Option<&str> {
        self.get("VERSION_ID")
    }
}

/// Read and parse the OS identification file. `None` when the file is
/// absent or unreadable.
pub fn read_os_release(executor: &dyn Executor) -> Result<Option<OsRelease>, ExecError> {
    let out = executor.execute(&argv(&["cat", OS_RELEASE_PATH]), &ExecOptions::captured())?;
    if !out.success() {
        return Ok(None);
    }
    Ok(Some(OsRelease::parse(&out.stdout_str())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftbox_exec::FakeExecutor;

    const FOCAL: &str = r#"NAME="Ubuntu"
VERSION="20.04.1 LTS (Focal Fossa)"
ID=ubuntu
ID_LIKE=debian
# comment line
VERSION_ID="20.04"
VERSION_CODENAME=focal
"#;

    #[test]
    fn parse_strips_quotes_and_comments() {
        let os = OsRelease::parse(FOCAL);
        assert_eq!(os.id(), Some("ubuntu"));
        assert_eq!(os.version_id(), Some("20.04"));
        assert_eq!(os.get("VERSION_CODENAME"), Some("focal"));
        assert_eq!(os.get("NAME"), Some("Ubuntu"));
    }

    #[test]
    fn parse_tolerates_malformed_lines() {
        let os = OsRelease::parse("garbage\nVERSION_ID=16.04\n");
        assert_eq!(os.version_id(), Some("16.04"));
    }

    #[test]
    fn read_missing_file_is_none() {
        let fake = FakeExecutor::new();
        assert_eq!(read_os_release(&fake).unwrap(), None);
    }

    #[test]
    fn read_parses_remote_file() {
        let fake = FakeExecutor::new();
        fake.put_file(OS_RELEASE_PATH, FOCAL.as_bytes().to_vec());

        let os = read_os_release(&fake).unwrap().unwrap();
        assert_eq!(os.version_id(), Some("20.04"));
    }
}

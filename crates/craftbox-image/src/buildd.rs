//! Ubuntu buildd image definitions and compatibility checks.

use crate::config::{load_craft_config, save_craft_config, CraftImageConfig};
use crate::os_release::read_os_release;
use crate::{CompatibilityError, ImageError};
use craftbox_exec::Executor;
use tracing::debug;

/// Bumped whenever provisioning changes in a way that makes previously
/// provisioned instances unusable.
pub const COMPATIBILITY_TAG: &str = "craft-buildd-image-v0";

/// Supported Ubuntu buildd series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageAlias {
    Xenial,
    Bionic,
    Focal,
}

impl ImageAlias {
    pub fn version_id(self) -> &'static str {
        match self {
            Self::Xenial => "16.04",
            Self::Bionic => "18.04",
            Self::Focal => "20.04",
        }
    }

    /// Series name as the backends know it (`multipass launch <name>`,
    /// `lxc launch ubuntu:<version>`).
    pub fn series(self) -> &'static str {
        match self {
            Self::Xenial => "xenial",
            Self::Bionic => "bionic",
            Self::Focal => "focal",
        }
    }
}

impl std::str::FromStr for ImageAlias {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xenial" | "16.04" => Ok(Self::Xenial),
            "bionic" | "18.04" => Ok(Self::Bionic),
            "focal" | "20.04" => Ok(Self::Focal),
            other => Err(format!("unknown image alias '{other}'")),
        }
    }
}

impl std::fmt::Display for ImageAlias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.series())
    }
}

/// An Ubuntu buildd image expectation: a series plus the compatibility tag
/// a reusable instance must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilddImage {
    pub alias: ImageAlias,
    pub compatibility_tag: String,
}

impl BuilddImage {
    pub fn new(alias: ImageAlias) -> Self {
        Self {
            alias,
            compatibility_tag: COMPATIBILITY_TAG.to_owned(),
        }
    }

    /// Verify an existing environment against this image without modifying
    /// it. Gates run in order: the compatibility marker first, the OS
    /// version second, so a stale instance reports the marker mismatch even
    /// when the OS also differs.
    pub fn check_compatible(&self, executor: &dyn Executor) -> Result<(), ImageError> {
        self.check_tag(executor)?;
        self.check_os_version(executor)?;
        Ok(())
    }

    /// Establish this image's identity in a fresh environment: verify the OS
    /// matches, then either confirm an existing marker or write one.
    pub fn setup(&self, executor: &dyn Executor) -> Result<(), ImageError> {
        self.check_os_version(executor)?;
        match load_craft_config(executor)? {
            Some(config) => config.ensure_tag(&self.compatibility_tag)?,
            None => {
                debug!(tag = %self.compatibility_tag, "writing compatibility marker");
                save_craft_config(executor, &CraftImageConfig::new(&self.compatibility_tag))?;
            }
        }
        Ok(())
    }

    fn check_tag(&self, executor: &dyn Executor) -> Result<(), ImageError> {
        match load_craft_config(executor)? {
            Some(config) => config.ensure_tag(&self.compatibility_tag)?,
            None => {
                return Err(CompatibilityError::new("no compatibility marker found").into());
            }
        }
        Ok(())
    }

    fn check_os_version(&self, executor: &dyn Executor) -> Result<(), ImageError> {
        let expected = self.alias.version_id();
        let found = read_os_release(executor)?
            .and_then(|os| os.version_id().map(str::to_owned));
        match found {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(CompatibilityError::new(format!(
                "Expected OS version '{expected}', found '{actual}'"
            ))
            .into()),
            None => Err(CompatibilityError::new(format!(
                "Expected OS version '{expected}', found an unknown version"
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CRAFT_IMAGE_CONF_PATH;
    use crate::os_release::OS_RELEASE_PATH;
    use craftbox_exec::FakeExecutor;
    use std::path::Path;

    fn seed_os(fake: &FakeExecutor, version: &str) {
        fake.put_file(
            OS_RELEASE_PATH,
            format!("ID=ubuntu\nVERSION_ID=\"{version}\"\n").into_bytes(),
        );
    }

    fn seed_marker(fake: &FakeExecutor, tag: &str) {
        fake.put_file(
            CRAFT_IMAGE_CONF_PATH,
            format!("compatibility_tag: {tag}\n").into_bytes(),
        );
    }

    fn reason(err: ImageError) -> String {
        match err {
            ImageError::Incompatible(e) => e.reason,
            other => panic!("expected compatibility error, got {other:?}"),
        }
    }

    #[test]
    fn check_passes_for_matching_instance() {
        let fake = FakeExecutor::new();
        seed_os(&fake, "20.04");
        seed_marker(&fake, COMPATIBILITY_TAG);

        BuilddImage::new(ImageAlias::Focal)
            .check_compatible(&fake)
            .unwrap();
    }

    #[test]
    fn check_missing_marker() {
        let fake = FakeExecutor::new();
        seed_os(&fake, "20.04");

        let err = BuilddImage::new(ImageAlias::Focal)
            .check_compatible(&fake)
            .unwrap_err();
        assert_eq!(reason(err), "no compatibility marker found");
    }

    #[test]
    fn check_tag_mismatch_wins_over_os_mismatch() {
        let fake = FakeExecutor::new();
        seed_os(&fake, "20.10");
        seed_marker(&fake, "craft-buildd-image-vX");

        let err = BuilddImage::new(ImageAlias::Focal)
            .check_compatible(&fake)
            .unwrap_err();
        assert_eq!(
            reason(err),
            "Expected image compatibility tag 'craft-buildd-image-v0', found 'craft-buildd-image-vX'"
        );
    }

    #[test]
    fn check_os_version_mismatch() {
        let fake = FakeExecutor::new();
        seed_os(&fake, "20.10");
        seed_marker(&fake, COMPATIBILITY_TAG);

        let err = BuilddImage::new(ImageAlias::Focal)
            .check_compatible(&fake)
            .unwrap_err();
        assert_eq!(reason(err), "Expected OS version '20.04', found '20.10'");
    }

    #[test]
    fn check_missing_version_id() {
        let fake = FakeExecutor::new();
        fake.put_file(OS_RELEASE_PATH, b"ID=ubuntu\n".to_vec());
        seed_marker(&fake, COMPATIBILITY_TAG);

        let err = BuilddImage::new(ImageAlias::Xenial)
            .check_compatible(&fake)
            .unwrap_err();
        assert_eq!(
            reason(err),
            "Expected OS version '16.04', found an unknown version"
        );
    }

    #[test]
    fn setup_writes_marker_when_absent() {
        let fake = FakeExecutor::new();
        seed_os(&fake, "18.04");

        BuilddImage::new(ImageAlias::Bionic).setup(&fake).unwrap();

        let written = fake.file_content(Path::new(CRAFT_IMAGE_CONF_PATH)).unwrap();
        assert!(String::from_utf8(written)
            .unwrap()
            .contains("compatibility_tag: craft-buildd-image-v0"));
    }

    #[test]
    fn setup_rejects_stale_marker() {
        let fake = FakeExecutor::new();
        seed_os(&fake, "18.04");
        seed_marker(&fake, "craft-buildd-image-vX");

        let err = BuilddImage::new(ImageAlias::Bionic).setup(&fake).unwrap_err();
        assert_eq!(
            reason(err),
            "Expected image compatibility tag 'craft-buildd-image-v0', found 'craft-buildd-image-vX'"
        );
    }

    #[test]
    fn setup_rejects_wrong_os() {
        let fake = FakeExecutor::new();
        seed_os(&fake, "16.04");

        let err = BuilddImage::new(ImageAlias::Focal).setup(&fake).unwrap_err();
        assert_eq!(reason(err), "Expected OS version '20.04', found '16.04'");
    }

    #[test]
    fn alias_parsing() {
        assert_eq!("focal".parse::<ImageAlias>().unwrap(), ImageAlias::Focal);
        assert_eq!("16.04".parse::<ImageAlias>().unwrap(), ImageAlias::Xenial);
        assert!("warty".parse::<ImageAlias>().is_err());
    }
}

//! Command options

use std::time::Duration;

use crate::publish::upload;
use crate::storage::settings::Settings;
use crate::utils::CooldownOptions;

/// `releases ls --truncate` shows this many of the newest releases
pub const TRUNCATED_LISTING_LEN: usize = 10;

/// Options for `deploy`
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Run the interactive command instead of the deploy command
    pub interactive: bool,

    /// Keep the previous work directory instead of starting from a blank one
    pub keep_cache: bool,
}

/// Options for `releases ls`
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only show the newest releases
    pub truncate: bool,
}

impl ListOptions {
    pub fn limit(&self) -> Option<usize> {
        self.truncate.then_some(TRUNCATED_LISTING_LEN)
    }
}

/// Upload worker options from settings
pub fn upload_options(settings: &Settings) -> upload::Options {
    upload::Options {
        concurrency: settings.uploads.concurrency,
        per_file_timeout: Duration::from_secs(settings.uploads.per_file_timeout_secs),
        cooldown: CooldownOptions::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_options_from_settings() {
        let mut settings = Settings::default();
        settings.uploads.concurrency = 5;

        let options = upload_options(&settings);
        assert_eq!(options.concurrency, 5);
        assert_eq!(options.per_file_timeout, Duration::from_secs(300));
        assert_eq!(options.cooldown.max_delay, Duration::from_secs(15));
    }

    #[test]
    fn test_list_limit() {
        assert_eq!(ListOptions { truncate: true }.limit(), Some(10));
        assert_eq!(ListOptions::default().limit(), None);
    }
}

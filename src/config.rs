//! Build configuration loading via `ortho-config`.
//!
//! Values merge defaults, the `letsbake.toml` configuration file, and
//! `LETSCLOUD_*` environment variables. [`BuildConfig::validate`] reports
//! every problem at once so a user can fix their configuration in one pass.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::password::MIN_PASSWORD_LENGTH;

/// Default time allowed for an instance or snapshot to become ready.
pub const DEFAULT_STATE_TIMEOUT: &str = "10m";

/// Default length of the generated root password.
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

/// LetsCloud settings for one image build.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "LETSCLOUD",
    discovery(
        app_name = "letsbake",
        env_var = "LETSBAKE_CONFIG_PATH",
        config_file_name = "letsbake.toml",
        dotfile_name = ".letsbake.toml",
        project_file_name = "letsbake.toml"
    )
)]
pub struct BuildConfig {
    /// API token used to authenticate. Required.
    #[ortho_config(default = String::new())]
    pub api_key: String,
    /// Datacenter location slug (for example `MIA1`). Required.
    #[ortho_config(default = String::new())]
    pub location_slug: String,
    /// Plan slug deciding the instance size. Required.
    #[ortho_config(default = String::new())]
    pub plan_slug: String,
    /// Image the instance boots from. Required.
    #[ortho_config(default = String::new())]
    pub image_slug: String,
    /// Existing SSH key to install instead of generating one.
    pub ssh_slug: Option<String>,
    /// Hostname override; defaults to `letsbake-<timestamp>`.
    pub hostname: Option<String>,
    /// Label prefix; a `-<timestamp>` suffix is always appended.
    pub label: Option<String>,
    /// Snapshot label override; defaults to `letsbake-snapshot-<timestamp>`.
    pub snapshot_name: Option<String>,
    /// Maximum time to wait for an instance or snapshot, as a duration
    /// string such as `10m`, `90s`, or `1h30m`.
    #[ortho_config(default = DEFAULT_STATE_TIMEOUT.to_owned())]
    pub state_timeout: String,
    /// Whether to leave the instance running when the build ends.
    #[ortho_config(default = false)]
    pub keep_instance: bool,
    /// Whether to capture a snapshot after shutdown.
    #[ortho_config(default = false)]
    pub snapshot: bool,
    /// Length of the generated root password.
    #[ortho_config(default = 16)]
    pub password_length: usize,
    /// Directory for the temporary private key file; defaults to the
    /// system temporary directory.
    pub key_directory: Option<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            location_slug: String::new(),
            plan_slug: String::new(),
            image_slug: String::new(),
            ssh_slug: None,
            hostname: None,
            label: None,
            snapshot_name: None,
            state_timeout: DEFAULT_STATE_TIMEOUT.to_owned(),
            keep_instance: false,
            snapshot: false,
            password_length: DEFAULT_PASSWORD_LENGTH,
            key_directory: None,
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Lists every problem found by [`BuildConfig::validate`].
    #[error("invalid configuration: {}", problems.join("; "))]
    Invalid {
        /// One actionable message per problem.
        problems: Vec<String>,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

struct RequiredField {
    description: &'static str,
    toml_key: &'static str,
}

const REQUIRED_FIELDS: [RequiredField; 4] = [
    RequiredField {
        description: "LetsCloud API key",
        toml_key: "api_key",
    },
    RequiredField {
        description: "location slug",
        toml_key: "location_slug",
    },
    RequiredField {
        description: "plan slug",
        toml_key: "plan_slug",
    },
    RequiredField {
        description: "image slug",
        toml_key: "image_slug",
    },
];

impl BuildConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("letsbake")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks every field and reports all problems together.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing each missing required field,
    /// an unparseable or zero `state_timeout`, a `password_length` below the
    /// minimum, and blank optional overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        let values = [
            &self.api_key,
            &self.location_slug,
            &self.plan_slug,
            &self.image_slug,
        ];
        for (value, field) in values.into_iter().zip(REQUIRED_FIELDS.iter()) {
            if value.trim().is_empty() {
                problems.push(format!(
                    "missing {}: set LETSCLOUD_{} or add {} to letsbake.toml",
                    field.description,
                    field.toml_key.to_uppercase(),
                    field.toml_key
                ));
            }
        }

        let overrides = [
            ("ssh_slug", self.ssh_slug.as_deref()),
            ("hostname", self.hostname.as_deref()),
            ("label", self.label.as_deref()),
            ("snapshot_name", self.snapshot_name.as_deref()),
            ("key_directory", self.key_directory.as_deref()),
        ];
        for (field, value) in overrides {
            if value.is_some_and(|v| v.trim().is_empty()) {
                problems.push(format!("{field} must not be blank when set"));
            }
        }

        if let Err(message) = parse_duration(&self.state_timeout) {
            problems.push(format!("state_timeout '{}' {message}", self.state_timeout));
        }

        if self.password_length < MIN_PASSWORD_LENGTH {
            problems.push(format!(
                "password_length must be at least {MIN_PASSWORD_LENGTH}, got {}",
                self.password_length
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    /// Parsed `state_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the value is not a positive
    /// duration.
    pub fn state_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.state_timeout).map_err(|message| ConfigError::Invalid {
            problems: vec![format!("state_timeout '{}' {message}", self.state_timeout)],
        })
    }

    /// Returns the SSH key slug when an existing key was configured.
    #[must_use]
    pub fn existing_ssh_slug(&self) -> Option<&str> {
        self.ssh_slug.as_deref().filter(|slug| !slug.trim().is_empty())
    }
}

/// Parses a duration written as a sequence of number/unit pairs such as
/// `1h30m`, `90s`, `2.5m`, or `500ms`.
///
/// Accepted units are `h`, `m`, `s`, and `ms`. Zero is rejected.
///
/// # Errors
///
/// Returns a description of the first problem found.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(String::from("is empty"));
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| String::from("is missing a unit (h, m, s, or ms)"))?;
        let (number, after_number) = rest.split_at(number_len);
        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, remainder) = after_number.split_at(unit_len);

        let part = parse_component(number, unit)?;
        total = total
            .checked_add(part)
            .ok_or_else(|| String::from("is too large"))?;
        rest = remainder;
    }

    if total.is_zero() {
        return Err(String::from("must be greater than zero"));
    }
    Ok(total)
}

fn parse_component(number: &str, unit: &str) -> Result<Duration, String> {
    if number.is_empty() {
        return Err(format!("has unit '{unit}' without a number"));
    }
    let millis_per_unit: u64 = match unit {
        "h" => 3_600_000,
        "m" => 60_000,
        "s" => 1_000,
        "ms" => 1,
        other => return Err(format!("has unknown unit '{other}'")),
    };

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    let whole_value: u64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| format!("has invalid number '{number}'"))?
    };
    let mut millis = whole_value
        .checked_mul(millis_per_unit)
        .ok_or_else(|| String::from("is too large"))?;

    // Fractions are resolved to whole milliseconds, digit by digit.
    let mut scale = millis_per_unit;
    for digit in fraction.chars() {
        let value = u64::from(
            digit
                .to_digit(10)
                .ok_or_else(|| format!("has invalid number '{number}'"))?,
        );
        scale = scale.checked_div(10).unwrap_or_default();
        millis = millis
            .checked_add(value * scale)
            .ok_or_else(|| String::from("is too large"))?;
    }

    Ok(Duration::from_millis(millis))
}

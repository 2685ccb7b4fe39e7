//! Engine configuration.

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::utils::{get_env_with_prefix, parse_env_with_prefix};

/// Unit that plan `duration` and `renewable_within` are counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Days,
    #[default]
    Weeks,
}

impl PeriodUnit {
    /// Length of `count` units.
    #[must_use]
    pub fn span(&self, count: u32) -> ChronoDuration {
        match self {
            Self::Days => ChronoDuration::days(i64::from(count)),
            Self::Weeks => ChronoDuration::weeks(i64::from(count)),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Days => "days",
            Self::Weeks => "weeks",
        }
    }

    /// Parse a unit name, accepting singular and plural forms.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "day" | "days" => Some(Self::Days),
            "week" | "weeks" => Some(Self::Weeks),
            _ => None,
        }
    }
}

/// How the "in grace" predicate treats the grace window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraceBoundary {
    /// In grace once `now` is past the end of the grace window.
    ///
    /// Under this rule in-grace and past-grace coincide, so renewal never
    /// anchors to the grace end.
    #[default]
    Literal,
    /// In grace while `expiration < now <= grace_end`.
    Window,
}

impl GraceBoundary {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "literal" => Some(Self::Literal),
            "window" => Some(Self::Window),
            _ => None,
        }
    }
}

/// Tunables for the lifecycle processors and listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub period_unit: PeriodUnit,
    #[serde(default)]
    pub grace_boundary: GraceBoundary,
    #[serde(default = "default_custom_name_max_length")]
    pub custom_name_max_length: usize,
    #[serde(default = "default_listing_default_per_page")]
    pub listing_default_per_page: u32,
    #[serde(default = "default_listing_max_per_page")]
    pub listing_max_per_page: u32,
    /// Deadline applied to each operation by the service facade.
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
}

fn default_custom_name_max_length() -> usize {
    60
}

fn default_listing_default_per_page() -> u32 {
    20
}

fn default_listing_max_per_page() -> u32 {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            period_unit: PeriodUnit::default(),
            grace_boundary: GraceBoundary::default(),
            custom_name_max_length: default_custom_name_max_length(),
            listing_default_per_page: default_listing_default_per_page(),
            listing_max_per_page: default_listing_max_per_page(),
            operation_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_period_unit(mut self, unit: PeriodUnit) -> Self {
        self.period_unit = unit;
        self
    }

    #[must_use]
    pub fn with_grace_boundary(mut self, boundary: GraceBoundary) -> Self {
        self.grace_boundary = boundary;
        self
    }

    #[must_use]
    pub fn with_custom_name_max_length(mut self, max: usize) -> Self {
        self.custom_name_max_length = max;
        self
    }

    #[must_use]
    pub fn with_listing_per_page(mut self, default_per_page: u32, max_per_page: u32) -> Self {
        self.listing_default_per_page = default_per_page;
        self.listing_max_per_page = max_per_page;
        self
    }

    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    /// Operation deadline, if one is configured.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }

    /// Load engine settings from `MEMBERFLOW_*` variables.
    ///
    /// Unparseable values are ignored and the default is kept.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(unit) = get_env_with_prefix("PERIOD_UNIT").and_then(|v| PeriodUnit::parse(&v)) {
            config.period_unit = unit;
        }
        if let Some(boundary) =
            get_env_with_prefix("GRACE_BOUNDARY").and_then(|v| GraceBoundary::parse(&v))
        {
            config.grace_boundary = boundary;
        }
        if let Some(max) = parse_env_with_prefix("CUSTOM_NAME_MAX_LENGTH") {
            config.custom_name_max_length = max;
        }
        if let Some(per_page) = parse_env_with_prefix("LISTING_DEFAULT_PER_PAGE") {
            config.listing_default_per_page = per_page;
        }
        if let Some(max) = parse_env_with_prefix("LISTING_MAX_PER_PAGE") {
            config.listing_max_per_page = max;
        }
        if let Some(secs) = parse_env_with_prefix::<u64>("OPERATION_TIMEOUT_SECS") {
            config.operation_timeout_secs = (secs > 0).then_some(secs);
        }

        config
    }

    /// Check the settings for values the processors cannot work with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.listing_default_per_page == 0 || self.listing_max_per_page == 0 {
            return Err(crate::error::MemberflowError::bad_request(
                "Listing page sizes must be greater than 0",
            ));
        }
        if self.listing_default_per_page > self.listing_max_per_page {
            return Err(crate::error::MemberflowError::bad_request(format!(
                "Listing default page size {} exceeds maximum {}",
                self.listing_default_per_page, self.listing_max_per_page
            )));
        }
        if self.custom_name_max_length == 0 {
            return Err(crate::error::MemberflowError::bad_request(
                "Custom name maximum length must be greater than 0",
            ));
        }
        if self.operation_timeout_secs == Some(0) {
            return Err(crate::error::MemberflowError::bad_request(
                "Operation timeout must be greater than 0 when set",
            ));
        }
        Ok(())
    }
}

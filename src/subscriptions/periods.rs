//! Grace and warning period arithmetic.
//!
//! All derived subscription states are pure functions of the expiration
//! date, the plan's `duration` and `renewable_within`, and the current
//! instant. Nothing computed here is ever stored.
//!
//! ```text
//!   exp - 3*duration        exp - duration      exp              exp + renewable_within
//!        |-------- warning --------|              |------- grace window -------|
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::config::{EngineConfig, GraceBoundary, PeriodUnit};
use super::types::SubscriptionPlan;

/// Derived period flags for one subscription at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodState {
    pub in_grace: bool,
    pub in_warning: bool,
    pub past_grace: bool,
    pub grace_end: DateTime<Utc>,
    pub warning_message: Option<String>,
}

/// Period calculator bound to a unit and grace boundary rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodCalculator {
    unit: PeriodUnit,
    boundary: GraceBoundary,
}

impl Default for PeriodCalculator {
    fn default() -> Self {
        Self::new(PeriodUnit::default(), GraceBoundary::default())
    }
}

impl PeriodCalculator {
    #[must_use]
    pub fn new(unit: PeriodUnit, boundary: GraceBoundary) -> Self {
        Self { unit, boundary }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.period_unit, config.grace_boundary)
    }

    #[must_use]
    pub fn unit(&self) -> PeriodUnit {
        self.unit
    }

    #[must_use]
    pub fn boundary(&self) -> GraceBoundary {
        self.boundary
    }

    /// End of the grace window.
    #[must_use]
    pub fn grace_end(&self, expiration: DateTime<Utc>, renewable_within: u32) -> DateTime<Utc> {
        saturating_add(expiration, self.unit.span(renewable_within))
    }

    #[must_use]
    pub fn is_past_grace(
        &self,
        expiration: DateTime<Utc>,
        renewable_within: u32,
        now: DateTime<Utc>,
    ) -> bool {
        now > self.grace_end(expiration, renewable_within)
    }

    /// Whether `now` counts as in grace under the configured boundary.
    #[must_use]
    pub fn is_in_grace(
        &self,
        expiration: DateTime<Utc>,
        renewable_within: u32,
        now: DateTime<Utc>,
    ) -> bool {
        let grace_end = self.grace_end(expiration, renewable_within);
        match self.boundary {
            GraceBoundary::Literal => now > grace_end,
            GraceBoundary::Window => expiration < now && now <= grace_end,
        }
    }

    /// Bounds of the warning window, earliest first.
    #[must_use]
    pub fn warning_window(
        &self,
        expiration: DateTime<Utc>,
        duration: u32,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let one = self.unit.span(duration);
        let start = saturating_sub(expiration, one * 3);
        let end = saturating_sub(expiration, one);
        (start, end)
    }

    /// Strictly inside the warning window.
    #[must_use]
    pub fn is_in_warning(&self, expiration: DateTime<Utc>, duration: u32, now: DateTime<Utc>) -> bool {
        let (start, end) = self.warning_window(expiration, duration);
        start < now && now < end
    }

    /// Human-readable explanation when `now` is in the warning window.
    #[must_use]
    pub fn warning_message(
        &self,
        expiration: DateTime<Utc>,
        duration: u32,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if !self.is_in_warning(expiration, duration, now) {
            return None;
        }
        let (_, end) = self.warning_window(expiration, duration);
        Some(format!(
            "Subscription expires on {}. Renewal opens on {}.",
            expiration.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        ))
    }

    /// All derived flags for `expiration` under `plan` at `now`.
    #[must_use]
    pub fn state(
        &self,
        expiration: DateTime<Utc>,
        plan: &SubscriptionPlan,
        now: DateTime<Utc>,
    ) -> PeriodState {
        PeriodState {
            in_grace: self.is_in_grace(expiration, plan.renewable_within, now),
            in_warning: self.is_in_warning(expiration, plan.duration, now),
            past_grace: self.is_past_grace(expiration, plan.renewable_within, now),
            grace_end: self.grace_end(expiration, plan.renewable_within),
            warning_message: self.warning_message(expiration, plan.duration, now),
        }
    }

    /// Expiration of a fresh subscription started at `now`.
    #[must_use]
    pub fn term_end(&self, now: DateTime<Utc>, duration: u32) -> DateTime<Utc> {
        saturating_add(now, self.unit.span(duration))
    }

    /// New expiration after a renewal at `now`.
    ///
    /// Anchored to the grace end when in grace, otherwise one term from
    /// `now`. Never earlier than `current`.
    #[must_use]
    pub fn renewal_expiration(
        &self,
        current: DateTime<Utc>,
        plan: &SubscriptionPlan,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let candidate = if self.is_in_grace(current, plan.renewable_within, now) {
            self.grace_end(current, plan.renewable_within)
        } else {
            self.term_end(now, plan.duration)
        };
        candidate.max(current)
    }
}

fn saturating_add(at: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    at.checked_add_signed(span).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn saturating_sub(at: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    at.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

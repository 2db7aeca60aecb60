//! Trial eligibility screening.
//!
//! Pure functions over in-memory patient populations:
//! - [`build_params`] derives a trial's admission envelope from the patients
//!   on file for its indication
//! - [`is_eligible`] and [`classify_and_paginate`] screen a population and
//!   return one anonymized page of either tab
//! - [`summarize_trials`] lists the catalogue with sampled eligible estimates

pub mod classify;
pub mod paginate;
pub mod params;
pub mod trials;

pub use classify::{count_eligible, is_eligible, partition, Partition};
pub use paginate::{
    anonymous_id, clamp_page_size, classify_and_paginate, total_pages, FederatedPatientRow, PageResult, Tab,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE, PRIVACY_SAFE_COLUMNS,
};
pub use params::{build_params, TrialEligibilityParams};
pub use trials::{
    default_trials, extrapolate, resolve_indication, sample_population, summarize_trials, TrialSummary,
    DEFAULT_SAMPLE_SIZE,
};

//! Faceted filtering over an already-loaded profile collection.
//!
//! Facets AND together; selected values inside one facet OR together. Nothing
//! here reorders, suspends, or mutates its inputs.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;
use ugig_core::{FilterCriteria, NormalizedProfile, PriceRange};

pub use ugig_core::text_matches;

pub const CRATE_NAME: &str = "ugig-search";

/// Profiles satisfying every active criterion, in input order.
pub fn filter(profiles: &[NormalizedProfile], criteria: &FilterCriteria) -> Vec<NormalizedProfile> {
    if criteria.min_rating.is_some() {
        debug!("min_rating set but profiles carry no rating; ignoring");
    }
    let matcher = Matcher::new(criteria);
    let mut skipped = 0usize;
    let out = profiles
        .iter()
        .filter(|p| {
            if !is_well_formed(p) {
                skipped += 1;
                return false;
            }
            matcher.matches(p)
        })
        .cloned()
        .collect::<Vec<_>>();
    if skipped > 0 {
        debug!(skipped, "excluded malformed profiles from filter pass");
    }
    out
}

/// Single-profile form of [`filter`].
pub fn profile_matches(profile: &NormalizedProfile, criteria: &FilterCriteria) -> bool {
    is_well_formed(profile) && Matcher::new(criteria).matches(profile)
}

/// Every distinct skill in the collection, sorted. Ignores filter selection.
pub fn derive_skill_facet(profiles: &[NormalizedProfile]) -> Vec<String> {
    profiles
        .iter()
        .flat_map(|p| p.skills.iter())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Facet values matching a facet search box, input order kept.
pub fn filter_facet_values(values: &[String], query: &str) -> Vec<String> {
    values
        .iter()
        .filter(|v| text_matches(v, query))
        .cloned()
        .collect()
}

// Profiles should arrive normalized, but the engine does not rely on it.
fn is_well_formed(profile: &NormalizedProfile) -> bool {
    profile.hourly_rate.is_finite() && profile.hourly_rate >= 0.0 && profile.has_name()
}

struct Matcher<'a> {
    term: Option<String>,
    majors: &'a BTreeSet<String>,
    skills: &'a BTreeSet<String>,
    payment_methods: &'a BTreeSet<String>,
    price_range: Option<PriceRange>,
}

impl<'a> Matcher<'a> {
    fn new(criteria: &'a FilterCriteria) -> Self {
        let term = criteria.search_term.trim().to_lowercase();
        Self {
            term: (!term.is_empty()).then_some(term),
            majors: &criteria.selected_majors,
            skills: &criteria.selected_skills,
            payment_methods: &criteria.selected_payment_methods,
            price_range: criteria.price_range,
        }
    }

    fn matches(&self, p: &NormalizedProfile) -> bool {
        self.matches_text(p)
            && (self.majors.is_empty() || self.majors.contains(&p.major))
            && intersects(self.skills, &p.skills)
            && intersects(self.payment_methods, &p.payment_methods)
            && self.price_range.map_or(true, |r| r.contains(p.hourly_rate))
    }

    fn matches_text(&self, p: &NormalizedProfile) -> bool {
        let Some(term) = &self.term else {
            return true;
        };
        let hit = |field: &str| field.to_lowercase().contains(term.as_str());
        hit(p.full_name().as_str())
            || hit(p.major.as_str())
            || hit(p.bio.as_str())
            || p.skills.iter().any(|s| hit(s.as_str()))
    }
}

// Empty selection accepts everything.
fn intersects(selected: &BTreeSet<String>, values: &[String]) -> bool {
    if selected.is_empty() {
        return true;
    }
    let values = values.iter().map(String::as_str).collect::<HashSet<_>>();
    selected.iter().any(|s| values.contains(s.as_str()))
}

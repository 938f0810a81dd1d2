//! Core domain model for the campus freelance directory.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "ugig-core";

/// Role tag stored on a profile row upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileRole {
    Freelancer,
    Client,
    Both,
}

impl ProfileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileRole::Freelancer => "freelancer",
            ProfileRole::Client => "client",
            ProfileRole::Both => "both",
        }
    }
}

impl fmt::Display for ProfileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which browse page a load is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleScope {
    Freelancer,
    Client,
}

impl RoleScope {
    /// Roles the store is asked for. Dual-role profiles show up on both pages.
    pub fn roles(&self) -> [ProfileRole; 2] {
        match self {
            RoleScope::Freelancer => [ProfileRole::Freelancer, ProfileRole::Both],
            RoleScope::Client => [ProfileRole::Client, ProfileRole::Both],
        }
    }

    /// Only the freelancer page has a rate facet.
    pub fn has_price_facet(&self) -> bool {
        matches!(self, RoleScope::Freelancer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleScope::Freelancer => "freelancer",
            RoleScope::Client => "client",
        }
    }
}

impl fmt::Display for RoleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownScope(pub String);

impl fmt::Display for UnknownScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role scope `{}` (expected freelancer or client)", self.0)
    }
}

impl std::error::Error for UnknownScope {}

impl FromStr for RoleScope {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "freelancer" | "freelancers" => Ok(RoleScope::Freelancer),
            "client" | "clients" => Ok(RoleScope::Client),
            other => Err(UnknownScope(other.to_string())),
        }
    }
}

/// Fully defaulted projection of an untrusted profile row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedProfile {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub major: String,
    pub academic_year: String,
    pub bio: String,
    pub hourly_rate: f64,
    pub avatar_url: Option<String>,
    pub skills: Vec<String>,
    pub payment_methods: Vec<String>,
}

impl NormalizedProfile {
    /// `"first last"`, the form free-text search matches against.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn has_name(&self) -> bool {
        !self.first_name.trim().is_empty() || !self.last_name.trim().is_empty()
    }
}

/// Closed interval over hourly rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, rate: f64) -> bool {
        self.min <= rate && rate <= self.max
    }
}

/// Criteria a browse page narrows its collection with.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub search_term: String,
    pub selected_majors: BTreeSet<String>,
    pub selected_skills: BTreeSet<String>,
    pub selected_payment_methods: BTreeSet<String>,
    pub price_range: Option<PriceRange>,
    /// Collected from the page but never applied: profiles carry no rating.
    pub min_rating: Option<f64>,
}

impl FilterCriteria {
    /// Copy adjusted to what the scope's page offers.
    pub fn for_scope(&self, scope: RoleScope) -> FilterCriteria {
        let mut scoped = self.clone();
        if !scope.has_price_facet() {
            scoped.price_range = None;
        }
        scoped
    }

    /// True when nothing narrows the collection.
    pub fn is_empty(&self) -> bool {
        self.search_term.trim().is_empty()
            && self.selected_majors.is_empty()
            && self.selected_skills.is_empty()
            && self.selected_payment_methods.is_empty()
            && self.price_range.is_none()
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    pub fn toggle_major(&mut self, major: &str) {
        toggle(&mut self.selected_majors, major);
    }

    pub fn toggle_skill(&mut self, skill: &str) {
        toggle(&mut self.selected_skills, skill);
    }

    pub fn toggle_payment_method(&mut self, method: &str) {
        toggle(&mut self.selected_payment_methods, method);
    }

    pub fn set_price_range(&mut self, range: Option<PriceRange>) {
        self.price_range = range;
    }

    pub fn set_min_rating(&mut self, rating: Option<f64>) {
        self.min_rating = rating;
    }

    pub fn clear_all(&mut self) {
        *self = FilterCriteria::default();
    }
}

fn toggle(set: &mut BTreeSet<String>, value: &str) {
    if !set.remove(value) {
        set.insert(value.to_string());
    }
}

/// Case-insensitive substring test shared by profile search and facet search boxes.
/// A blank needle matches everything.
pub fn text_matches(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    needle.is_empty() || haystack.to_lowercase().contains(&needle)
}

/// Static option lists that are configured rather than derived from profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub majors: Vec<String>,
    #[serde(default)]
    pub payment_methods: Vec<String>,
}

impl Catalog {
    pub fn builtin() -> Self {
        Self {
            majors: BUILTIN_MAJORS.iter().map(ToString::to_string).collect(),
            payment_methods: BUILTIN_PAYMENT_METHODS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Majors matching the major search box, catalog order kept.
    pub fn search_majors(&self, query: &str) -> Vec<String> {
        self.majors
            .iter()
            .filter(|m| text_matches(m, query))
            .cloned()
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

const BUILTIN_MAJORS: &[&str] = &[
    "Accounting",
    "Art",
    "Biology",
    "Business Administration",
    "Chemistry",
    "Communications",
    "Computer Science",
    "Economics",
    "Education",
    "Electrical Engineering",
    "English",
    "Finance",
    "Graphic Design",
    "History",
    "Marketing",
    "Mathematics",
    "Mechanical Engineering",
    "Music",
    "Nursing",
    "Philosophy",
    "Physics",
    "Political Science",
    "Psychology",
    "Sociology",
];

const BUILTIN_PAYMENT_METHODS: &[&str] = &["Venmo", "Zelle", "PayPal", "Cash App", "Cash"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_roles_include_dual_role_profiles() {
        assert_eq!(
            RoleScope::Freelancer.roles(),
            [ProfileRole::Freelancer, ProfileRole::Both]
        );
        assert_eq!(RoleScope::Client.roles(), [ProfileRole::Client, ProfileRole::Both]);
    }

    #[test]
    fn scope_parses_page_names() {
        assert_eq!("Freelancers".parse::<RoleScope>(), Ok(RoleScope::Freelancer));
        assert_eq!(" client ".parse::<RoleScope>(), Ok(RoleScope::Client));
        assert!("both".parse::<RoleScope>().is_err());
    }

    #[test]
    fn price_range_is_inclusive() {
        assert!(PriceRange::new(0.0, 100.0).contains(100.0));
        assert!(PriceRange::new(100.0, 100.0).contains(100.0));
        assert!(!PriceRange::new(0.0, 99.0).contains(100.0));
    }

    #[test]
    fn toggles_add_then_remove() {
        let mut criteria = FilterCriteria::default();
        criteria.toggle_skill("React");
        criteria.toggle_major("Art");
        assert!(criteria.selected_skills.contains("React"));
        assert!(!criteria.is_empty());
        criteria.toggle_skill("React");
        criteria.toggle_major("Art");
        assert!(criteria.is_empty());
    }

    #[test]
    fn clear_all_is_idempotent() {
        let mut criteria = FilterCriteria::default();
        criteria.set_search_term("design");
        criteria.toggle_payment_method("Venmo");
        criteria.set_price_range(Some(PriceRange::new(10.0, 40.0)));
        criteria.set_min_rating(Some(4.0));

        criteria.clear_all();
        let once = criteria.clone();
        criteria.clear_all();
        assert_eq!(criteria, once);
        assert_eq!(criteria, FilterCriteria::default());
    }

    #[test]
    fn client_scope_drops_price_range() {
        let mut criteria = FilterCriteria::default();
        criteria.set_price_range(Some(PriceRange::new(0.0, 30.0)));
        assert!(criteria.for_scope(RoleScope::Client).price_range.is_none());
        assert!(criteria.for_scope(RoleScope::Freelancer).price_range.is_some());
    }

    #[test]
    fn text_matches_ignores_case_and_blank_needles() {
        assert!(text_matches("Logo Design", "  DESIGN "));
        assert!(text_matches("anything", "   "));
        assert!(!text_matches("React", "python"));
    }

    #[test]
    fn catalog_major_search_keeps_catalog_order() {
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.search_majors("engineering"),
            vec!["Electrical Engineering", "Mechanical Engineering"]
        );
        assert_eq!(catalog.search_majors("").len(), catalog.majors.len());
    }

    #[test]
    fn criteria_deserializes_with_missing_fields() {
        let criteria: FilterCriteria =
            serde_json::from_str(r#"{"search_term":"react"}"#).unwrap();
        assert_eq!(criteria.search_term, "react");
        assert!(criteria.selected_skills.is_empty());
        assert!(criteria.price_range.is_none());
    }
}

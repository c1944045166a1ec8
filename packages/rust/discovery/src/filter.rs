//! Allow/deny and geography filtering applied before scoring.

use buyergroup_shared::text::{contains_any, normalize};
use buyergroup_shared::{Candidate, CandidateFilters};

/// Why a candidate was excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    DepartmentDenied,
    DepartmentNotAllowed,
    TitleDenied,
    TitleNotAllowed,
    OutsideRegions,
    UnknownLocation,
}

/// Compiled view over [`CandidateFilters`].
#[derive(Debug, Clone)]
pub struct CandidateFilter<'a> {
    filters: &'a CandidateFilters,
}

impl<'a> CandidateFilter<'a> {
    pub fn new(filters: &'a CandidateFilters) -> Self {
        Self { filters }
    }

    /// Check one candidate. Deny lists are evaluated before allow lists.
    pub fn check(&self, candidate: &Candidate) -> Result<(), Rejection> {
        let f = self.filters;
        let department = normalize(&candidate.department);
        let title = normalize(&candidate.title);

        if contains_any(&department, &f.department_deny) {
            return Err(Rejection::DepartmentDenied);
        }
        if contains_any(&title, &f.title_deny) {
            return Err(Rejection::TitleDenied);
        }
        if !f.department_allow.is_empty() && !contains_any(&department, &f.department_allow) {
            return Err(Rejection::DepartmentNotAllowed);
        }
        if !f.title_allow.is_empty() && !contains_any(&title, &f.title_allow) {
            return Err(Rejection::TitleNotAllowed);
        }
        // An unknown location cannot prove membership in a restricted region.
        if f.geography_restricted {
            let location = normalize(&candidate.location);
            if location.is_empty() {
                return Err(Rejection::UnknownLocation);
            }
            if !f.regions.is_empty() && !contains_any(&location, &f.regions) {
                return Err(Rejection::OutsideRegions);
            }
        }
        Ok(())
    }

    pub fn admits(&self, candidate: &Candidate) -> bool {
        self.check(candidate).is_ok()
    }
}

use crate::models::{Candidate, CandidateQuery, HardFiltersConfig, PreferenceData, ProfileData};

/// Check a profile against the viewer's hard (non-negotiable) preferences
///
/// Each filter only applies when enabled in `filters`; an axis without
/// usable bounds or with an empty set never excludes anyone.
#[inline]
pub fn passes_hard_filters(
    profile: &ProfileData,
    preferences: &PreferenceData,
    filters: &HardFiltersConfig,
) -> bool {
    if filters.age {
        if let Some(bounds) = preferences.age_bounds() {
            if !bounds.contains(profile.age) {
                return false;
            }
        }
    }

    if filters.height {
        if let Some(bounds) = preferences.height_bounds() {
            if !bounds.contains(profile.height_cm) {
                return false;
            }
        }
    }

    if filters.marital_status
        && !preferences.marital_statuses.is_empty()
        && !preferences.marital_statuses.contains(&profile.marital_status)
    {
        return false;
    }

    if filters.physically_challenged
        && profile.physically_challenged
        && !preferences.accept_physically_challenged
    {
        return false;
    }

    if filters.education
        && !preferences.education_levels.is_empty()
        && !preferences.education_levels.contains(&profile.highest_education_level)
    {
        return false;
    }

    true
}

/// Check a pooled candidate against the full query
///
/// Re-applied in-process after the storage query so a stale or loosely
/// filtered pool never leaks self, excluded or ineligible profiles.
#[inline]
pub fn matches_query_constraints(candidate: &Candidate, query: &CandidateQuery) -> bool {
    if candidate.id == query.viewer_id {
        return false;
    }

    if query.exclude_ids.iter().any(|id| *id == candidate.id) {
        return false;
    }

    if let Some(seeking_bride) = query.seeking_bride {
        if candidate.profile.is_bride != seeking_bride {
            return false;
        }
    }

    passes_hard_filters(&candidate.profile, &query.preferences, &query.filters)
}

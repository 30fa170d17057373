use crate::models::{Bounds, MatchScore, PreferenceData, ProfileData};
use std::collections::BTreeSet;

const AGE_POINTS: f64 = 15.0;
const AGE_NEAR_POINTS: f64 = 5.0;
/// Years outside the preferred age range that still earn partial credit
const AGE_TOLERANCE_YEARS: i32 = 2;
const HEIGHT_POINTS: f64 = 10.0;
const COMMUNITY_POINTS: f64 = 20.0;
const MARITAL_STATUS_POINTS: f64 = 15.0;
const EDUCATION_POINTS: f64 = 10.0;
const PROFESSION_POINTS: f64 = 10.0;
const PROFESSION_TYPE_POINTS: f64 = 5.0;
const HOME_DISTRICT_POINTS: f64 = 10.0;
const PHYSICALLY_CHALLENGED_PENALTY: f64 = 40.0;

pub const REASON_AGE: &str = "Age matches preferences";
pub const REASON_AGE_NEAR: &str = "Age is close to preferred range";
pub const REASON_HEIGHT: &str = "Height matches preferences";
pub const REASON_COMMUNITY: &str = "Community matches preferences";
pub const REASON_MARITAL_STATUS: &str = "Marital status matches preferences";
pub const REASON_EDUCATION: &str = "Education level matches preferences";
pub const REASON_PROFESSION: &str = "Profession matches preferences";
pub const REASON_PROFESSION_TYPE: &str = "Profession type matches preferences";
pub const REASON_HOME_DISTRICT: &str = "Home district matches preferences";

/// Calculate a compatibility score (0-100) for a profile against a viewer's preferences
///
/// Point table, each axis scored independently:
/// ```text
///   age within range           15  (within 2 years of it: 5)
///   height within range        10
///   community in set           20
///   marital status in set      15
///   education level in set     10
///   profession in set          10
///   profession type in set      5
///   home district in set       10
/// ```
/// A physically challenged profile the viewer does not accept loses 40
/// points after the additive pass. Unconstrained axes add nothing.
pub fn score(profile: &ProfileData, prefs: &PreferenceData) -> MatchScore {
    let mut total = 0.0_f64;
    let mut reasons = Vec::new();

    if let Some(bounds) = prefs.age_bounds() {
        let (points, reason) = age_points(profile.age, &bounds);
        total += points;
        reasons.extend(reason.map(str::to_string));
    }

    if let Some(bounds) = prefs.height_bounds() {
        if bounds.contains(profile.height_cm) {
            total += HEIGHT_POINTS;
            reasons.push(REASON_HEIGHT.to_string());
        }
    }

    let set_axes: [(&BTreeSet<String>, &str, f64, &str); 6] = [
        (&prefs.communities, profile.community.as_str(), COMMUNITY_POINTS, REASON_COMMUNITY),
        (&prefs.marital_statuses, profile.marital_status.as_str(), MARITAL_STATUS_POINTS, REASON_MARITAL_STATUS),
        (&prefs.education_levels, profile.highest_education_level.as_str(), EDUCATION_POINTS, REASON_EDUCATION),
        (&prefs.professions, profile.profession.as_str(), PROFESSION_POINTS, REASON_PROFESSION),
        (&prefs.profession_types, profile.profession_type.as_str(), PROFESSION_TYPE_POINTS, REASON_PROFESSION_TYPE),
        (&prefs.home_districts, profile.home_district.as_str(), HOME_DISTRICT_POINTS, REASON_HOME_DISTRICT),
    ];

    for (accepted, value, points, reason) in set_axes {
        if in_set(accepted, value) {
            total += points;
            reasons.push(reason.to_string());
        }
    }

    if profile.physically_challenged && !prefs.accept_physically_challenged {
        total -= PHYSICALLY_CHALLENGED_PENALTY;
    }

    MatchScore {
        score: total.clamp(0.0, 100.0),
        reasons,
    }
}

#[inline]
fn age_points(age: i32, bounds: &Bounds) -> (f64, Option<&'static str>) {
    match bounds.distance(age) {
        0 => (AGE_POINTS, Some(REASON_AGE)),
        d if d <= AGE_TOLERANCE_YEARS => (AGE_NEAR_POINTS, Some(REASON_AGE_NEAR)),
        _ => (0.0, None),
    }
}

/// Empty sets never match: an unconstrained axis scores nothing
#[inline]
fn in_set(accepted: &BTreeSet<String>, value: &str) -> bool {
    !value.is_empty() && accepted.contains(value)
}

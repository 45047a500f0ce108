//! Folding per-location usage counts from a cache record into totals.

use crate::cache::Record;
use crate::rule::Profile;

/// Field-name prefix of static (per-location occurrence) counts.
pub const STATIC_PREFIX: &str = "sprofile ";
/// Field-name prefix of dynamic (execution-weighted) counts.
pub const DYNAMIC_PREFIX: &str = "dprofile ";

/// Static and dynamic profiles of one record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Profiles {
    pub static_profile: Profile,
    pub dynamic_profile: Profile,
}

/// Sum every `sprofile <location>` / `dprofile <location>` field of a
/// record. Counts that are not non-negative integers are ignored.
pub fn aggregate(record: &Record) -> Profiles {
    let mut profiles = Profiles::default();
    for (field, value) in record {
        let (profile, location) = if let Some(loc) = field.strip_prefix(STATIC_PREFIX) {
            (&mut profiles.static_profile, loc)
        } else if let Some(loc) = field.strip_prefix(DYNAMIC_PREFIX) {
            (&mut profiles.dynamic_profile, loc)
        } else {
            continue;
        };
        if let Ok(count) = value.trim().parse::<u64>() {
            profile.record(location, count);
        }
    }
    profiles
}

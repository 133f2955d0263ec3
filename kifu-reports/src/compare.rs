use std::cmp::Ordering;

use crate::models::Report;
use crate::preferences::{ReportPreferences, SortOrder};

/// Queue order for `viewer_id`.
///
/// Reports claimed by the viewer come first, then unclaimed reports, then
/// reports claimed by other moderators. Unclaimed reports are ordered by type
/// priority and then newest first. Claimed groups are ordered by type priority
/// and then by the viewer's sort order preference. Two reports only compare
/// equal when their ids are equal.
pub fn compare_reports(a: &Report, b: &Report, prefs: &ReportPreferences, viewer_id: i64) -> Ordering {
    let custom_ordering = prefs
        .priority(&a.report_type)
        .cmp(&prefs.priority(&b.report_type));

    match (a.moderator_id(), b.moderator_id()) {
        (None, None) => custom_ordering.then_with(|| b.id.cmp(&a.id)),
        (Some(a_mod), None) => {
            if a_mod == viewer_id {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (None, Some(b_mod)) => {
            if b_mod == viewer_id {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (Some(a_mod), Some(b_mod)) => match (a_mod == viewer_id, b_mod == viewer_id) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => custom_ordering.then_with(|| match prefs.sort_order {
                SortOrder::NewestFirst => b.id.cmp(&a.id),
                SortOrder::OldestFirst => a.id.cmp(&b.id),
            }),
        },
    }
}

pub fn sort_reports(reports: &mut [Report], prefs: &ReportPreferences, viewer_id: i64) {
    reports.sort_by(|a, b| compare_reports(a, b, prefs, viewer_id));
}

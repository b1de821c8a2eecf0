//! Group cycling arithmetic. No I/O; the registry feeds it titles.

/// Computes the next window of a group to activate.
pub struct WindowCycleEngine;

impl WindowCycleEngine {
    /// Members that currently have a thumbnail, in configured order.
    pub fn active_members(members: &[String], active_titles: &[String]) -> Vec<String> {
        members
            .iter()
            .filter(|m| active_titles.iter().any(|t| t.eq_ignore_ascii_case(m)))
            .cloned()
            .collect()
    }

    /// Index after `current` in a list of `count` entries.
    ///
    /// An unknown current position sits before the first entry going forward
    /// and after the last going backward.
    pub fn next_index(count: usize, current: Option<usize>, forward: bool) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let current: i64 = match current {
            Some(index) => index as i64,
            None if forward => -1,
            None => count as i64,
        };

        let next = if forward {
            (current + 1).rem_euclid(count as i64)
        } else if current <= 0 {
            count as i64 - 1
        } else {
            current - 1
        };
        Some(next as usize)
    }

    /// Title to activate next, `None` when no member is active.
    pub fn next(members: &[String], active_titles: &[String], current_title: Option<&str>, forward: bool) -> Option<String> {
        let members = Self::active_members(members, active_titles);
        let current = current_title.and_then(|title| members.iter().position(|m| m.eq_ignore_ascii_case(title)));
        Self::next_index(members.len(), current, forward).map(|i| members[i].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_forward_and_backward() {
        let group = titles(&["A", "B", "C"]);
        let active = group.clone();

        assert_eq!(WindowCycleEngine::next(&group, &active, Some("B"), true).as_deref(), Some("C"));
        assert_eq!(WindowCycleEngine::next(&group, &active, Some("C"), true).as_deref(), Some("A"));
        assert_eq!(WindowCycleEngine::next(&group, &active, Some("A"), false).as_deref(), Some("C"));
        assert_eq!(WindowCycleEngine::next(&group, &active, Some("B"), false).as_deref(), Some("A"));
    }

    #[test]
    fn test_non_member_foreground() {
        let group = titles(&["A", "B", "C"]);
        assert_eq!(WindowCycleEngine::next(&group, &group, Some("Browser"), true).as_deref(), Some("A"));
        assert_eq!(WindowCycleEngine::next(&group, &group, None, false).as_deref(), Some("C"));
    }

    #[test]
    fn test_inactive_members_are_skipped() {
        let group = titles(&["EVE - Alice", "EVE - Bob", "EVE - Carol"]);
        let active = titles(&["eve - carol", "EVE - Alice"]);

        assert_eq!(
            WindowCycleEngine::active_members(&group, &active),
            titles(&["EVE - Alice", "EVE - Carol"])
        );
        assert_eq!(
            WindowCycleEngine::next(&group, &active, Some("EVE - ALICE"), true).as_deref(),
            Some("EVE - Carol")
        );
    }

    #[test]
    fn test_empty_group_is_noop() {
        assert_eq!(WindowCycleEngine::next(&[], &titles(&["A"]), Some("A"), true), None);
        assert_eq!(WindowCycleEngine::next(&titles(&["A"]), &[], None, true), None);
        assert_eq!(WindowCycleEngine::next_index(0, None, false), None);
    }

    #[test]
    fn test_single_member_wraps_to_itself() {
        assert_eq!(WindowCycleEngine::next_index(1, Some(0), true), Some(0));
        assert_eq!(WindowCycleEngine::next_index(1, Some(0), false), Some(0));
    }
}

use crate::list::SharedList;

/// The list to render: search matches while a search is active, otherwise the
/// live list.
pub fn select_view<'a>(active_matches: Option<&'a SharedList>, live: &'a SharedList) -> &'a SharedList {
    active_matches.unwrap_or(live)
}

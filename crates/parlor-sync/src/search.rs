use std::fmt;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use tracing::debug;

use parlor_types::Message;

use crate::list::SharedList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// No query; the live list is shown.
    Inactive,
    /// A query was issued and its settle delay has not elapsed yet.
    Loading,
    Settled,
}

/// Identifies one `set_query` call. Settles carrying an older generation
/// are discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryGeneration(u64);

impl QueryGeneration {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for QueryGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// A settle arrived for a query that is no longer current. Internal only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("search {stale} superseded by {current}")]
pub struct QuerySuperseded {
    pub stale: QueryGeneration,
    pub current: QueryGeneration,
}

/// Case-insensitive pattern. Queries that are not valid regular expressions
/// are matched literally.
enum Matcher {
    Pattern(Regex),
    Literal(String),
}

impl Matcher {
    fn new(query: &str) -> Self {
        match RegexBuilder::new(query).case_insensitive(true).build() {
            Ok(re) => Self::Pattern(re),
            Err(e) => {
                debug!(%query, "query is not a valid pattern, matching literally: {}", e);
                Self::Literal(query.to_lowercase())
            }
        }
    }

    fn is_match_str(&self, haystack: &str) -> bool {
        match self {
            Self::Pattern(re) => re.is_match(haystack),
            Self::Literal(needle) => haystack.to_lowercase().contains(needle.as_str()),
        }
    }

    fn is_match(&self, message: &Message) -> bool {
        message.content().is_some_and(|c| self.is_match_str(c))
            || self.is_match_str(&message.author.name)
    }
}

/// Client-side filter over the materialized message list.
///
/// Never mutates the list it reads; matches share the same `Arc<Message>`s.
pub struct SearchIndexer {
    query: String,
    generation: QueryGeneration,
    status: SearchStatus,
    matcher: Option<Matcher>,
    matches: SharedList,
}

impl Default for SearchIndexer {
    fn default() -> Self {
        Self {
            query: String::new(),
            generation: QueryGeneration::default(),
            status: SearchStatus::Inactive,
            matcher: None,
            matches: SharedList::new(),
        }
    }
}

impl SearchIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new query. Every call supersedes pending settles.
    ///
    /// Returns the generation to settle later, or `None` when the query is
    /// empty and search goes inactive.
    pub fn set_query(&mut self, text: &str) -> Option<QueryGeneration> {
        self.generation = self.generation.next();
        self.query = text.to_string();
        self.matches.clear();

        if text.is_empty() {
            self.matcher = None;
            self.status = SearchStatus::Inactive;
            return None;
        }

        self.matcher = Some(Matcher::new(text));
        self.status = SearchStatus::Loading;
        Some(self.generation)
    }

    /// Rebuild matches from the current list, preserving its order.
    pub fn recompute(&mut self, messages: &[Arc<Message>]) {
        let Some(matcher) = &self.matcher else {
            return;
        };
        let matches: Vec<Arc<Message>> = messages
            .iter()
            .filter(|m| matcher.is_match(m))
            .cloned()
            .collect();
        self.matches = matches.into();
    }

    /// Extend matches with a message appended to the list after the last
    /// recompute. Returns whether it matched.
    pub fn observe(&mut self, message: &Arc<Message>) -> bool {
        match &self.matcher {
            Some(matcher) if matcher.is_match(message) => {
                self.matches.push(message.clone());
                true
            }
            _ => false,
        }
    }

    /// Mark the query `generation` as settled, unless it has been superseded.
    pub fn settle(&mut self, generation: QueryGeneration) -> Result<(), QuerySuperseded> {
        if generation != self.generation {
            return Err(QuerySuperseded {
                stale: generation,
                current: self.generation,
            });
        }
        if self.status == SearchStatus::Loading {
            self.status = SearchStatus::Settled;
        }
        Ok(())
    }

    /// Drop the query and results (channel switch). Pending settles go stale.
    pub fn reset(&mut self) {
        self.set_query("");
    }

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    pub fn generation(&self) -> QueryGeneration {
        self.generation
    }

    pub fn query(&self) -> Option<&str> {
        self.matcher.as_ref().map(|_| self.query.as_str())
    }

    /// Matches for the active query; `None` when no search is active.
    pub fn active_matches(&self) -> Option<&SharedList> {
        self.matcher.as_ref().map(|_| &self.matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_types::{Author, MessageBody, Timestamp};

    fn msg(author: &str, body: MessageBody, ts: i64) -> Arc<Message> {
        Arc::new(Message {
            author: Author {
                id: format!("id-{}", author),
                name: author.into(),
                avatar_url: String::new(),
            },
            body,
            timestamp: Timestamp(ts),
        })
    }

    fn text(author: &str, content: &str, ts: i64) -> Arc<Message> {
        msg(author, MessageBody::Text(content.into()), ts)
    }

    fn sample() -> Vec<Arc<Message>> {
        vec![text("alice", "hello world", 1), text("bob", "goodbye", 2)]
    }

    fn matched(indexer: &SearchIndexer) -> Vec<i64> {
        indexer
            .active_matches()
            .map(|m| m.read().iter().map(|m| m.timestamp.0).collect())
            .unwrap_or_default()
    }

    fn search(indexer: &mut SearchIndexer, messages: &[Arc<Message>], query: &str) -> Vec<i64> {
        indexer.set_query(query);
        indexer.recompute(messages);
        matched(indexer)
    }

    #[test]
    fn test_matches_content_and_author() {
        let messages = sample();
        let mut indexer = SearchIndexer::new();

        assert_eq!(search(&mut indexer, &messages, "hello"), vec![1]);
        assert_eq!(search(&mut indexer, &messages, "bob"), vec![2]);
        assert_eq!(search(&mut indexer, &messages, "xyz"), Vec::<i64>::new());
        assert!(indexer.active_matches().is_some_and(|m| m.is_empty()));
    }

    #[test]
    fn test_case_insensitive_and_ordered() {
        let messages = vec![
            text("alice", "Rust is fun", 1),
            text("bob", "no", 2),
            text("carol", "TRUST me", 3),
        ];
        let mut indexer = SearchIndexer::new();
        assert_eq!(search(&mut indexer, &messages, "rust"), vec![1, 3]);
    }

    #[test]
    fn test_regex_and_literal_fallback() {
        let messages = vec![
            text("alice", "call me at 555-1234", 1),
            text("bob", "what (is) this", 2),
        ];
        let mut indexer = SearchIndexer::new();
        assert_eq!(search(&mut indexer, &messages, r"\d{3}-\d{4}"), vec![1]);
        // unbalanced parenthesis is not a valid pattern
        assert_eq!(search(&mut indexer, &messages, "(is"), vec![2]);
    }

    #[test]
    fn test_media_messages_match_on_author_only() {
        let messages = vec![msg("alice", MessageBody::Media("https://cdn/alice.png".into()), 1)];
        let mut indexer = SearchIndexer::new();
        assert_eq!(search(&mut indexer, &messages, "cdn"), Vec::<i64>::new());
        assert_eq!(search(&mut indexer, &messages, "ALI"), vec![1]);
    }

    #[test]
    fn test_empty_query_is_inactive() {
        let messages = sample();
        let mut indexer = SearchIndexer::new();
        search(&mut indexer, &messages, "hello");

        assert_eq!(indexer.set_query(""), None);
        assert_eq!(indexer.status(), SearchStatus::Inactive);
        assert!(indexer.active_matches().is_none());
        assert_eq!(indexer.query(), None);
    }

    #[test]
    fn test_last_query_wins() {
        let messages = sample();
        let mut indexer = SearchIndexer::new();

        let first = indexer.set_query("a").unwrap();
        indexer.recompute(&messages);
        let second = indexer.set_query("ab").unwrap();
        indexer.recompute(&messages);

        let err = indexer.settle(first).unwrap_err();
        assert_eq!(err, QuerySuperseded { stale: first, current: second });
        assert_eq!(indexer.status(), SearchStatus::Loading);

        indexer.settle(second).unwrap();
        assert_eq!(indexer.status(), SearchStatus::Settled);
        assert_eq!(indexer.query(), Some("ab"));
    }

    #[test]
    fn test_observe_extends_matches() {
        let mut messages = sample();
        let mut indexer = SearchIndexer::new();
        search(&mut indexer, &messages, "o");

        let late = text("dave", "zzz", 3);
        messages.push(late.clone());
        assert!(!indexer.observe(&late));

        let later = text("erin", "hello again", 4);
        messages.push(later.clone());
        assert!(indexer.observe(&later));

        assert_eq!(matched(&indexer), vec![1, 2, 4]);
    }

    #[test]
    fn test_reset_supersedes_pending_settle() {
        let mut indexer = SearchIndexer::new();
        let pending = indexer.set_query("hello").unwrap();
        indexer.reset();
        assert!(indexer.settle(pending).is_err());
        assert_eq!(indexer.status(), SearchStatus::Inactive);
    }
}

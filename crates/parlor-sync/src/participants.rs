use std::collections::HashSet;

use parlor_types::Message;

/// Distinct author names seen in the active channel.
///
/// Each observed message costs one set lookup, plus one insert for a new
/// author; the message list is never rescanned. Only shrinks through
/// [`reset`](Self::reset) on channel switch.
#[derive(Debug, Default)]
pub struct ParticipantIndex {
    names: HashSet<String>,
    probes: u64,
}

impl ParticipantIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the author of `message`; returns the distinct-author count.
    pub fn observe(&mut self, message: &Message) -> usize {
        if !self.lookup(&message.author.name) {
            self.insert(message.author.name.clone());
        }
        self.names.len()
    }

    fn lookup(&mut self, name: &str) -> bool {
        self.probes += 1;
        self.names.contains(name)
    }

    fn insert(&mut self, name: String) {
        self.probes += 1;
        self.names.insert(name);
    }

    pub fn reset(&mut self) {
        self.names.clear();
        self.probes = 0;
    }

    pub fn count(&self) -> usize {
        self.names.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Set lookups and inserts performed since the last reset.
    pub fn probes(&self) -> u64 {
        self.probes
    }
}

/// "0 users", "1 user", "5 users".
pub fn participant_label(count: usize) -> String {
    if count == 1 {
        "1 user".to_string()
    } else {
        format!("{} users", count)
    }
}

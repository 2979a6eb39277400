use std::collections::{BTreeSet, HashMap, HashSet};

use regex::Regex;

use crate::domain::{User, UserId};

// ============== Authorization ==============

/// Admin ids from the live directory: every user whose username is on the
/// allow-list (case-insensitive), plus the bot itself when its own username
/// is listed.
pub fn resolve_admin_ids(
    users: &[User],
    allow_list: &[String],
    own_username: &str,
    own_id: Option<UserId>,
) -> HashSet<UserId> {
    let allowed: HashSet<String> = allow_list.iter().map(|u| u.trim().to_lowercase()).collect();
    if allowed.is_empty() {
        return HashSet::new();
    }

    let mut ids: HashSet<UserId> = users
        .iter()
        .filter(|u| allowed.contains(&u.username.to_lowercase()))
        .map(|u| u.id)
        .collect();

    if let Some(own_id) = own_id {
        if allowed.contains(&own_username.to_lowercase()) {
            ids.insert(own_id);
        }
    }
    ids
}

// ============== Word Filter ==============

pub const WARNING_THRESHOLD: u32 = 3;

/// Outcome of a filter hit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterHit {
    pub word: String,
    /// Warning count after this hit (1..=WARNING_THRESHOLD).
    pub warnings: u32,
}

impl FilterHit {
    pub fn threshold_reached(&self) -> bool {
        self.warnings >= WARNING_THRESHOLD
    }
}

/// Whole-word, case-insensitive block-list with per-user warning counts.
#[derive(Debug, Default)]
pub struct WordFilter {
    words: BTreeSet<String>,
    patterns: Vec<(String, Regex)>,
    warnings: HashMap<UserId, u32>,
}

impl WordFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        for w in words {
            let w = w.as_ref().trim().to_lowercase();
            if !w.is_empty() {
                filter.words.insert(w);
            }
        }
        filter.rebuild();
        filter
    }

    fn rebuild(&mut self) {
        self.patterns = self
            .words
            .iter()
            .filter_map(|w| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(w));
                match Regex::new(&pattern) {
                    Ok(re) => Some((w.clone(), re)),
                    Err(e) => {
                        tracing::warn!(word = %w, error = %e, "skipping unfilterable word");
                        None
                    }
                }
            })
            .collect();
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    /// Returns `false` when the word was already listed (or blank).
    pub fn add_word(&mut self, word: &str) -> bool {
        let w = word.trim().to_lowercase();
        if w.is_empty() || !self.words.insert(w) {
            return false;
        }
        self.rebuild();
        true
    }

    pub fn remove_word(&mut self, word: &str) -> bool {
        let removed = self.words.remove(&word.trim().to_lowercase());
        if removed {
            self.rebuild();
        }
        removed
    }

    pub fn warnings(&self, user_id: UserId) -> u32 {
        self.warnings.get(&user_id).copied().unwrap_or(0)
    }

    /// Look for the first listed word in `text`. A hit bumps the sender's
    /// warning count; reaching the threshold resets it to zero (the caller
    /// acts on the returned hit).
    pub fn inspect(&mut self, user_id: UserId, text: &str) -> Option<FilterHit> {
        let (word, _) = self.patterns.iter().find(|(_, re)| re.is_match(text))?;
        let word = word.clone();

        let count = self.warnings.entry(user_id).or_insert(0);
        *count += 1;
        let warnings = *count;
        if warnings >= WARNING_THRESHOLD {
            *count = 0;
        }
        Some(FilterHit { word, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChannelId;

    fn user(id: i32, username: &str) -> User {
        User {
            id: UserId(id),
            nickname: format!("nick{id}"),
            username: username.to_string(),
            status_message: String::new(),
            channel_id: ChannelId(1),
        }
    }

    #[test]
    fn admins_match_usernames_case_insensitively() {
        let users = vec![user(2, "Alice"), user(3, "bob"), user(4, "carol")];
        let allow = vec!["alice".to_string(), "CAROL".to_string()];
        let ids = resolve_admin_ids(&users, &allow, "botacct", Some(UserId(1)));
        assert_eq!(ids, HashSet::from([UserId(2), UserId(4)]));
    }

    #[test]
    fn bot_is_admin_when_its_username_is_listed() {
        let allow = vec!["BotAcct".to_string()];
        let ids = resolve_admin_ids(&[], &allow, "botacct", Some(UserId(1)));
        assert_eq!(ids, HashSet::from([UserId(1)]));

        assert!(resolve_admin_ids(&[user(2, "alice")], &[], "alice", Some(UserId(1))).is_empty());
    }

    #[test]
    fn whole_word_hits_only() {
        let mut f = WordFilter::new(["bad"]);
        assert!(f.inspect(UserId(5), "this is badger talk").is_none());
        assert!(f.inspect(UserId(5), "not BAD at all").is_some());
        assert_eq!(f.warnings(UserId(5)), 1);
    }

    #[test]
    fn third_hit_reaches_threshold_and_resets() {
        let mut f = WordFilter::new(["bad"]);
        let u = UserId(5);
        assert_eq!(f.inspect(u, "bad").unwrap().warnings, 1);
        assert_eq!(f.inspect(u, "bad").unwrap().warnings, 2);
        let hit = f.inspect(u, "so bad").unwrap();
        assert!(hit.threshold_reached());
        assert_eq!(f.warnings(u), 0);
        assert_eq!(f.inspect(u, "bad").unwrap().warnings, 1);
    }

    #[test]
    fn one_hit_per_message_even_with_several_words() {
        let mut f = WordFilter::new(["bad", "worse"]);
        let hit = f.inspect(UserId(5), "bad and worse").unwrap();
        assert_eq!(hit.word, "bad");
        assert_eq!(f.warnings(UserId(5)), 1);
    }

    #[test]
    fn word_list_edits() {
        let mut f = WordFilter::new(Vec::<String>::new());
        assert!(f.is_empty());
        assert!(f.add_word("Ugh"));
        assert!(!f.add_word("ugh"));
        assert!(f.inspect(UserId(1), "UGH!").is_some());
        assert!(f.remove_word("ugh"));
        assert!(f.is_empty());
        assert!(f.inspect(UserId(1), "ugh").is_none());
    }
}

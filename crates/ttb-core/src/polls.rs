use std::collections::{BTreeMap, HashMap};

use crate::domain::UserId;

pub const MAX_POLL_OPTIONS: usize = 10;

pub const POLL_USAGE: &str = "Usage: poll \"Question\" \"Option A\" \"Option B\" ...";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Poll {
    pub id: u32,
    pub question: String,
    pub options: Vec<String>,
    /// Voter -> zero-based option index. Re-voting overwrites.
    votes: HashMap<UserId, usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    #[error("{}", POLL_USAGE)]
    Usage,
    #[error("Error: Maximum {} options allowed.", MAX_POLL_OPTIONS)]
    TooManyOptions,
    #[error("Error: Poll #{0} not found.")]
    NotFound(u32),
    #[error("Error: Invalid option. Choose 1-{max}.")]
    InvalidOption { max: usize },
}

impl Poll {
    pub fn total_votes(&self) -> usize {
        self.votes.len()
    }

    /// Vote count per option, in option order.
    pub fn tally(&self) -> Vec<usize> {
        let mut counts = vec![0; self.options.len()];
        for &idx in self.votes.values() {
            if let Some(c) = counts.get_mut(idx) {
                *c += 1;
            }
        }
        counts
    }

    /// Text posted when the poll is created.
    pub fn announcement(&self) -> String {
        let mut lines = vec![
            format!("--- Poll #{} Created ---", self.id),
            format!("Q: {}", self.question),
        ];
        lines.extend(
            self.options
                .iter()
                .enumerate()
                .map(|(i, opt)| format!(" {}. {}", i + 1, opt)),
        );
        lines.push(format!("To vote, PM me: vote {} <option_number>", self.id));
        lines.join("\n")
    }

    pub fn results_text(&self) -> String {
        let total = self.total_votes();
        let mut lines = vec![
            format!("--- Poll #{} Results ---", self.id),
            format!("Q: {}", self.question),
            format!("Total Votes: {total}"),
        ];
        for (i, (opt, count)) in self.options.iter().zip(self.tally()).enumerate() {
            let pct = if total > 0 {
                count as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            lines.push(format!(" {}. {} - {} votes ({:.1}%)", i + 1, opt, count, pct));
        }
        lines.join("\n")
    }
}

/// All polls of one bot instance. Ids start at 1 and are never reused.
#[derive(Debug)]
pub struct PollBook {
    next_id: u32,
    polls: BTreeMap<u32, Poll>,
}

impl Default for PollBook {
    fn default() -> Self {
        Self {
            next_id: 1,
            polls: BTreeMap::new(),
        }
    }
}

impl PollBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from `"Question" "Option A" "Option B" ...`.
    pub fn create(&mut self, args: &str) -> Result<&Poll, PollError> {
        let (question, options) = parse_poll_args(args)?;
        let id = self.next_id;
        self.next_id += 1;
        let poll = Poll {
            id,
            question,
            options,
            votes: HashMap::new(),
        };
        Ok(self.polls.entry(id).or_insert(poll))
    }

    /// Record `voter`'s 1-based `choice`; returns the chosen option text.
    pub fn vote(&mut self, poll_id: u32, voter: UserId, choice: usize) -> Result<&str, PollError> {
        let poll = self
            .polls
            .get_mut(&poll_id)
            .ok_or(PollError::NotFound(poll_id))?;
        if choice == 0 || choice > poll.options.len() {
            return Err(PollError::InvalidOption {
                max: poll.options.len(),
            });
        }
        poll.votes.insert(voter, choice - 1);
        Ok(poll.options[choice - 1].as_str())
    }

    pub fn get(&self, poll_id: u32) -> Result<&Poll, PollError> {
        self.polls.get(&poll_id).ok_or(PollError::NotFound(poll_id))
    }

    pub fn ids(&self) -> Vec<u32> {
        self.polls.keys().copied().collect()
    }
}

fn parse_poll_args(args: &str) -> Result<(String, Vec<String>), PollError> {
    let mut parts: Vec<String> = args
        .split('"')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if parts.len() < 3 {
        return Err(PollError::Usage);
    }
    let question = parts.remove(0);
    if parts.len() > MAX_POLL_OPTIONS {
        return Err(PollError::TooManyOptions);
    }
    Ok((question, parts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_vote_wins() {
        let mut book = PollBook::new();
        let id = book.create(r#""Q" "A" "B""#).unwrap().id;
        assert_eq!(id, 1);

        assert_eq!(book.vote(id, UserId(9), 1).unwrap(), "A");
        assert_eq!(book.vote(id, UserId(9), 2).unwrap(), "B");

        let poll = book.get(id).unwrap();
        assert_eq!(poll.total_votes(), 1);
        assert_eq!(poll.tally(), vec![0, 1]);
        let text = poll.results_text();
        assert!(text.contains("Total Votes: 1"));
        assert!(text.contains(" 1. A - 0 votes (0.0%)"));
        assert!(text.contains(" 2. B - 1 votes (100.0%)"));
    }

    #[test]
    fn ids_are_sequential() {
        let mut book = PollBook::new();
        book.create(r#""Q1" "A" "B""#).unwrap();
        book.create(r#""Q2" "A" "B""#).unwrap();
        assert_eq!(book.ids(), vec![1, 2]);
    }

    #[test]
    fn rejects_bad_input() {
        let mut book = PollBook::new();
        assert_eq!(book.create(r#""Q" "only one""#).unwrap_err(), PollError::Usage);

        let many = (0..11).map(|i| format!("\"o{i}\"")).collect::<Vec<_>>().join(" ");
        assert_eq!(
            book.create(&format!("\"Q\" {many}")).unwrap_err(),
            PollError::TooManyOptions
        );

        let id = book.create(r#""Q" "A" "B""#).unwrap().id;
        assert_eq!(
            book.vote(id, UserId(1), 3).unwrap_err().to_string(),
            "Error: Invalid option. Choose 1-2."
        );
        assert_eq!(
            book.vote(42, UserId(1), 1).unwrap_err().to_string(),
            "Error: Poll #42 not found."
        );
    }

    #[test]
    fn error_messages_are_user_facing() {
        assert_eq!(PollError::Usage.to_string(), POLL_USAGE);
        assert_eq!(
            PollError::TooManyOptions.to_string(),
            "Error: Maximum 10 options allowed."
        );
        let err: &dyn std::error::Error = &PollError::NotFound(7);
        assert_eq!(err.to_string(), "Error: Poll #7 not found.");
    }

    #[test]
    fn announcement_lists_options() {
        let mut book = PollBook::new();
        let text = book.create(r#""Lunch?" "Pizza" "Soup""#).unwrap().announcement();
        assert_eq!(
            text,
            "--- Poll #1 Created ---\nQ: Lunch?\n 1. Pizza\n 2. Soup\nTo vote, PM me: vote 1 <option_number>"
        );
    }
}

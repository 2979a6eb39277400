use std::collections::HashMap;

use crate::domain::{ChannelId, MsgType, TextMessage, UserId};

type PartKey = (UserId, MsgType, ChannelId);

/// Joins multi-part text messages back together.
///
/// Parts are buffered per `(sender, type, channel)` until the final part
/// arrives. Buffers never expire.
#[derive(Debug, Default)]
pub struct Reassembler {
    pending: HashMap<PartKey, String>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one part. Returns the full text once the final part arrives.
    ///
    /// `my_id` is the bot's own id (parts from it are ignored), `None` while
    /// not logged in (every part is ignored).
    pub fn on_part(&mut self, my_id: Option<UserId>, msg: &TextMessage) -> Option<String> {
        let me = my_id?;
        if msg.from == me {
            return None;
        }

        let key = (msg.from, msg.msg_type, msg.channel_id);
        self.pending
            .entry(key)
            .or_default()
            .push_str(&msg.content);
        if msg.more {
            return None;
        }

        let full = self.pending.remove(&key)?;
        if full.is_empty() {
            return None;
        }
        Some(full)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: UserId = UserId(1);

    fn part(from: i32, msg_type: MsgType, channel: i32, content: &str, more: bool) -> TextMessage {
        TextMessage {
            msg_type,
            from: UserId(from),
            to: None,
            channel_id: ChannelId(channel),
            content: content.to_string(),
            more,
        }
    }

    #[test]
    fn joins_parts_in_order_exactly_once() {
        let mut r = Reassembler::new();
        assert_eq!(r.on_part(Some(ME), &part(7, MsgType::User, 0, "hel", true)), None);
        assert_eq!(r.on_part(Some(ME), &part(7, MsgType::User, 0, "lo ", true)), None);
        assert_eq!(
            r.on_part(Some(ME), &part(7, MsgType::User, 0, "world", false)),
            Some("hello world".to_string())
        );
        assert_eq!(r.pending_len(), 0);
    }

    #[test]
    fn keys_do_not_mix() {
        let mut r = Reassembler::new();
        r.on_part(Some(ME), &part(7, MsgType::Channel, 2, "chan-", true));
        r.on_part(Some(ME), &part(7, MsgType::User, 0, "pm-", true));
        r.on_part(Some(ME), &part(8, MsgType::Channel, 2, "other-", true));
        assert_eq!(r.pending_len(), 3);

        assert_eq!(
            r.on_part(Some(ME), &part(7, MsgType::User, 0, "end", false)),
            Some("pm-end".to_string())
        );
        assert_eq!(
            r.on_part(Some(ME), &part(7, MsgType::Channel, 2, "end", false)),
            Some("chan-end".to_string())
        );
        assert_eq!(r.pending_len(), 1);
    }

    #[test]
    fn ignores_own_messages_and_logged_out_state() {
        let mut r = Reassembler::new();
        assert_eq!(r.on_part(Some(ME), &part(1, MsgType::User, 0, "echo", false)), None);
        assert_eq!(r.on_part(None, &part(7, MsgType::User, 0, "early", false)), None);
        assert_eq!(r.pending_len(), 0);
    }

    #[test]
    fn empty_final_text_is_dropped() {
        let mut r = Reassembler::new();
        assert_eq!(r.on_part(Some(ME), &part(7, MsgType::User, 0, "", false)), None);
        assert_eq!(r.pending_len(), 0);
    }
}

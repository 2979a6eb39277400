/// Split `message` into chunks of at most `max_len` characters.
///
/// Breaks happen on single spaces; a word longer than `max_len` is cut
/// mid-word. Empty input yields no chunks.
pub fn split_message(message: &str, max_len: usize) -> Vec<String> {
    if message.is_empty() || max_len == 0 {
        return Vec::new();
    }
    if message.chars().count() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut cur = String::new();
    let mut cur_len = 0usize;

    for word in message.split(' ') {
        let word_len = word.chars().count();

        if word_len > max_len {
            if !cur.is_empty() {
                chunks.push(std::mem::take(&mut cur));
                cur_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            let mut pieces = chars.chunks(max_len).peekable();
            while let Some(piece) = pieces.next() {
                let piece: String = piece.iter().collect();
                if pieces.peek().is_some() {
                    chunks.push(piece);
                } else {
                    cur_len = piece.chars().count();
                    cur = piece;
                }
            }
            continue;
        }

        let needed = if cur.is_empty() { word_len } else { cur_len + 1 + word_len };
        if needed <= max_len {
            if !cur.is_empty() {
                cur.push(' ');
            }
            cur.push_str(word);
            cur_len = needed;
        } else {
            chunks.push(std::mem::take(&mut cur));
            cur.push_str(word);
            cur_len = word_len;
        }
    }
    if !cur.is_empty() {
        chunks.push(cur);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_one_chunk() {
        assert_eq!(split_message("hello world", 20), vec!["hello world"]);
        assert!(split_message("", 20).is_empty());
    }

    #[test]
    fn breaks_on_spaces_within_limit() {
        let chunks = split_message("aaa bbb ccc ddd", 7);
        assert_eq!(chunks, vec!["aaa bbb", "ccc ddd"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
    }

    #[test]
    fn overlong_words_are_hard_split() {
        let chunks = split_message("ab cdefghij k", 4);
        assert_eq!(chunks, vec!["ab", "cdef", "ghij", "k"]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(10);
        let chunks = split_message(&text, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }
}

//! Bounded "send view" of the chat history.
//!
//! Small local models reject requests above a fairly small size, so every
//! dispatch sends a trimmed copy of the history rather than the history
//! itself. The stored conversation always keeps the full text.

use crate::state::{ChatMessage, ChatRole};

/// Appended to any text that was shortened
pub const CLIP_MARKER: &str = "… [clipped]";

/// Character budgets applied by [`build_send_view`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendLimits {
    /// Cap on the leading system preamble
    pub preamble_chars: usize,
    /// Cap on each message after the preamble
    pub message_chars: usize,
    /// How many messages after the preamble are considered at all
    pub keep_last: usize,
    /// Cap on the whole view
    pub total_chars: usize,
    /// The newest message is never clipped below this
    pub newest_floor_chars: usize,
}

impl Default for SendLimits {
    fn default() -> Self {
        Self {
            preamble_chars: 380,
            message_chars: 650,
            keep_last: 8,
            total_chars: 1100,
            newest_floor_chars: 200,
        }
    }
}

/// Clip `text` to at most `max` characters, marker included.
///
/// Caps shorter than the marker itself truncate without one.
pub fn clip_text(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }

    let marker_len = CLIP_MARKER.chars().count();
    if max <= marker_len {
        return text.chars().take(max).collect();
    }

    let mut clipped: String = text.chars().take(max - marker_len).collect();
    clipped.push_str(CLIP_MARKER);
    clipped
}

/// Total characters across all message contents
pub fn total_chars(messages: &[ChatMessage]) -> usize {
    messages.iter().map(ChatMessage::char_len).sum()
}

/// Build the trimmed copy of `history` that is actually sent to a provider.
///
/// Order of operations matters and is kept deliberately crude:
/// 1. a leading system message is clipped and always kept first;
/// 2. only the last `keep_last` other messages are considered, each clipped;
/// 3. the oldest of those are dropped until the view fits the total budget
///    or only the newest one is left;
/// 4. if it still does not fit, the newest message is clipped to whatever
///    budget remains, but never below `newest_floor_chars`.
///
/// Because of (4) the view can exceed `total_chars` only when the floor wins.
pub fn build_send_view(history: &[ChatMessage], limits: &SendLimits) -> Vec<ChatMessage> {
    let Some(first) = history.first() else {
        return Vec::new();
    };

    let preamble = (first.role == ChatRole::System)
        .then(|| ChatMessage::system(clip_text(&first.content, limits.preamble_chars)));

    let rest = if preamble.is_some() { &history[1..] } else { history };
    let start = rest.len().saturating_sub(limits.keep_last);
    let mut tail: Vec<ChatMessage> = rest[start..]
        .iter()
        .map(|m| ChatMessage::new(m.role, clip_text(&m.content, limits.message_chars)))
        .collect();

    let preamble_len = preamble.as_ref().map_or(0, ChatMessage::char_len);
    let mut total = preamble_len + total_chars(&tail);

    while total > limits.total_chars && tail.len() > 1 {
        let dropped = tail.remove(0);
        total -= dropped.char_len();
    }

    if total > limits.total_chars {
        if let Some(newest) = tail.last_mut() {
            let others = total - newest.char_len();
            let allowed = limits
                .total_chars
                .saturating_sub(others)
                .max(limits.newest_floor_chars);
            newest.content = clip_text(&newest.content, allowed);
        }
    }

    let mut view = Vec::with_capacity(tail.len() + 1);
    view.extend(preamble);
    view.extend(tail);
    view
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(n: usize) -> String {
        "a".repeat(n)
    }

    #[test]
    fn test_clip_text_short_is_untouched() {
        assert_eq!(clip_text("hello", 5), "hello");
    }

    #[test]
    fn test_clip_text_counts_marker() {
        let clipped = clip_text(&text(100), 40);
        assert_eq!(clipped.chars().count(), 40);
        assert!(clipped.ends_with(CLIP_MARKER));
    }

    #[test]
    fn test_clip_text_is_char_safe() {
        let clipped = clip_text(&"é".repeat(50), 20);
        assert_eq!(clipped.chars().count(), 20);
        assert!(clipped.starts_with("ééé"));
    }

    #[test]
    fn test_empty_history_gives_empty_view() {
        assert!(build_send_view(&[], &SendLimits::default()).is_empty());
    }

    #[test]
    fn test_small_history_passes_through() {
        let history = vec![ChatMessage::system("be concise"), ChatMessage::user("hi")];
        assert_eq!(build_send_view(&history, &SendLimits::default()), history);
    }

    #[test]
    fn test_preamble_is_clipped_and_kept_first() {
        let history = vec![ChatMessage::system(text(1000)), ChatMessage::user("hi")];
        let view = build_send_view(&history, &SendLimits::default());

        assert_eq!(view[0].role, ChatRole::System);
        assert_eq!(view[0].char_len(), 380);
        assert!(view[0].content.ends_with(CLIP_MARKER));
        assert_eq!(view[1], ChatMessage::user("hi"));
    }

    #[test]
    fn test_keeps_only_last_messages() {
        let mut history = vec![ChatMessage::system("sys")];
        for i in 0..20 {
            history.push(ChatMessage::user(format!("m{i}")));
        }
        let view = build_send_view(&history, &SendLimits::default());

        assert_eq!(view.len(), 9);
        assert_eq!(view[1].content, "m12");
        assert_eq!(view[8].content, "m19");
    }

    #[test]
    fn test_each_message_is_clipped() {
        let history = vec![ChatMessage::user(text(2000))];
        let view = build_send_view(&history, &SendLimits::default());
        assert_eq!(view[0].char_len(), 650);
    }

    #[test]
    fn test_drops_oldest_until_under_budget() {
        let history = vec![
            ChatMessage::system("sys"),
            ChatMessage::user(format!("first {}", text(400))),
            ChatMessage::assistant(format!("second {}", text(400))),
            ChatMessage::user(format!("third {}", text(400))),
        ];
        let view = build_send_view(&history, &SendLimits::default());

        assert_eq!(view.len(), 3);
        assert_eq!(view[0].content, "sys");
        assert!(view[1].content.starts_with("second"));
        assert!(view[2].content.starts_with("third"));
        assert!(total_chars(&view) <= 1100);
    }

    #[test]
    fn test_clips_newest_when_dropping_is_not_enough() {
        let limits = SendLimits {
            preamble_chars: 50,
            message_chars: 80,
            keep_last: 8,
            total_chars: 100,
            newest_floor_chars: 20,
        };
        let history = vec![
            ChatMessage::system(text(50)),
            ChatMessage::user(text(80)),
            ChatMessage::user(text(80)),
        ];
        let view = build_send_view(&history, &limits);

        assert_eq!(view.len(), 2);
        assert_eq!(view[1].char_len(), 50);
        assert_eq!(total_chars(&view), 100);
    }

    #[test]
    fn test_floor_can_exceed_budget() {
        let limits = SendLimits {
            preamble_chars: 50,
            message_chars: 80,
            keep_last: 8,
            total_chars: 60,
            newest_floor_chars: 20,
        };
        let history = vec![ChatMessage::system(text(50)), ChatMessage::user(text(80))];
        let view = build_send_view(&history, &limits);

        assert_eq!(view[0].char_len(), 50);
        assert_eq!(view[1].char_len(), 20);
        assert_eq!(total_chars(&view), 70);
    }

    #[test]
    fn test_without_preamble_keeps_newest_only() {
        let limits = SendLimits {
            total_chars: 100,
            ..SendLimits::default()
        };
        let history = vec![ChatMessage::user(text(90)), ChatMessage::assistant(text(90))];
        let view = build_send_view(&history, &limits);

        assert_eq!(view, vec![ChatMessage::assistant(text(90))]);
    }

    #[test]
    fn test_does_not_mutate_and_is_deterministic() {
        let mut history = vec![ChatMessage::system(text(500))];
        for i in 0..12 {
            history.push(ChatMessage::user(format!("{i} {}", text(300 + i * 40))));
        }
        let before = history.clone();

        let first = build_send_view(&history, &SendLimits::default());
        let second = build_send_view(&history, &SendLimits::default());

        assert_eq!(history, before);
        assert_eq!(first, second);
    }

    #[test]
    fn test_budget_holds_across_many_histories() {
        let limits = SendLimits::default();
        // Cheap deterministic generator so failures are reproducible
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move |bound: u64| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed % bound
        };

        for _ in 0..200 {
            let mut history = Vec::new();
            let with_preamble = next(2) == 0;
            if with_preamble {
                history.push(ChatMessage::system(text(next(900) as usize)));
            }
            for i in 0..next(15) {
                let role = if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant };
                history.push(ChatMessage::new(role, text(next(1500) as usize)));
            }

            let view = build_send_view(&history, &limits);
            let newest_at_floor = view
                .last()
                .is_some_and(|m| m.char_len() <= limits.newest_floor_chars);
            assert!(total_chars(&view) <= limits.total_chars || newest_at_floor);

            if with_preamble {
                assert_eq!(view[0].role, ChatRole::System);
            }
        }
    }
}

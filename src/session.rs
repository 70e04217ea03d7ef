//! Session-scoped conversation state: the ordered turn log and the sink that
//! makes partial responses visible while they stream in.
//!
//! Each session owns its own [`Conversation`]; nothing here is shared across
//! sessions, so no locking is involved.

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire/display name for the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in the conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completed request/response pair, staged by the orchestrator and
/// committed to the conversation as a unit. Either both turns land in the
/// log or neither does.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub user: Turn,
    pub assistant: Turn,
}

/// Ordered, append-only log of turns for one session.
///
/// Insertion order is chronological order and is never rearranged. Growth is
/// unbounded; history lives only as long as the process.
#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one turn at the end.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Append the user turn, then the assistant turn, as one unit.
    pub fn commit(&mut self, exchange: Exchange) {
        self.turns.push(exchange.user);
        self.turns.push(exchange.assistant);
    }

    /// Drop all turns.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// The turns in chronological order.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Accumulates streamed fragments and publishes the full text after every
/// fragment, so partial output is visible as soon as it arrives. No
/// coalescing, no delay: one `feed` means one publish.
pub struct StreamSink<F: FnMut(&str)> {
    text: String,
    publish: F,
}

impl<F: FnMut(&str)> StreamSink<F> {
    pub fn new(initial: impl Into<String>, publish: F) -> Self {
        Self {
            text: initial.into(),
            publish,
        }
    }

    /// Append a fragment and publish the accumulated text.
    pub fn feed(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        (self.publish)(&self.text);
    }

    /// Text accumulated so far; after the stream completes this is the
    /// assistant turn's content.
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_preserves_insertion_order() {
        let mut conv = Conversation::new();
        conv.append(Turn::user("a"));
        conv.append(Turn::assistant("b"));
        conv.append(Turn::user("c"));

        let turns = conv.snapshot();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0], Turn::user("a"));
        assert_eq!(turns[1], Turn::assistant("b"));
        assert_eq!(turns[2], Turn::user("c"));
    }

    #[test]
    fn clear_empties_regardless_of_content() {
        let mut conv = Conversation::new();
        assert!(conv.is_empty());

        conv.append(Turn::user("hello"));
        conv.append(Turn::assistant("hi"));
        conv.clear();

        assert!(conv.is_empty());
        assert!(conv.snapshot().is_empty());

        // Usable again after clearing.
        conv.append(Turn::user("again"));
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn commit_appends_user_then_assistant() {
        let mut conv = Conversation::new();
        conv.commit(Exchange {
            user: Turn::user("Hi"),
            assistant: Turn::assistant("Hello there"),
        });

        assert_eq!(
            conv.snapshot(),
            &[Turn::user("Hi"), Turn::assistant("Hello there")]
        );
    }

    #[test]
    fn sink_publishes_growing_text_per_fragment() {
        let mut seen: Vec<String> = Vec::new();
        {
            let mut sink = StreamSink::new(String::new(), |text: &str| {
                seen.push(text.to_string());
            });
            sink.feed("Hel");
            sink.feed("lo");
            assert_eq!(sink.text(), "Hello");
        }
        assert_eq!(seen, vec!["Hel".to_string(), "Hello".to_string()]);
    }

    #[test]
    fn sink_keeps_initial_text() {
        let mut published = String::new();
        let mut sink = StreamSink::new("> ", |text: &str| {
            published = text.to_string();
        });
        sink.feed("ok");
        drop(sink);
        assert_eq!(published, "> ok");
    }
}

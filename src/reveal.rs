//! Progressive disclosure of an already received answer
//!
//! The answer is split into words and shown as growing prefixes, roughly ten
//! steps per answer. Prefixes are cut from the original text at word ends, so
//! the last step is exactly the answer, whitespace included.

use futures::Stream;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Number of steps an answer is revealed in, give or take
pub const TARGET_STEPS: usize = 10;

/// Word chunking of one answer
#[derive(Debug, Clone)]
pub struct RevealPlan {
    text: String,
    /// Byte offset just past each word
    word_ends: Vec<usize>,
    chunk_size: usize,
}

impl RevealPlan {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let word_ends = word_ends(&text);
        let chunk_size = (word_ends.len() / TARGET_STEPS).max(1);
        Self {
            text,
            word_ends,
            chunk_size,
        }
    }

    pub fn word_count(&self) -> usize {
        self.word_ends.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// How many prefixes the reveal emits
    pub fn step_count(&self) -> usize {
        self.word_count().div_ceil(self.chunk_size).max(1)
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl IntoIterator for RevealPlan {
    type Item = String;
    type IntoIter = Reveal;

    fn into_iter(self) -> Reveal {
        Reveal {
            plan: self,
            shown_words: 0,
            done: false,
        }
    }
}

/// Lazy sequence of growing prefixes; consumed once
#[derive(Debug)]
pub struct Reveal {
    plan: RevealPlan,
    shown_words: usize,
    done: bool,
}

impl Iterator for Reveal {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }

        let total = self.plan.word_count();
        if self.shown_words + self.plan.chunk_size >= total {
            self.done = true;
            self.shown_words = total;
            return Some(self.plan.text.clone());
        }

        self.shown_words += self.plan.chunk_size;
        let end = self.plan.word_ends[self.shown_words - 1];
        Some(self.plan.text.get(..end).unwrap_or_default().to_string())
    }
}

/// Emit the plan's prefixes, pausing `interval` after each one.
///
/// The stream ends early, without emitting further prefixes, once `cancel`
/// fires.
pub fn reveal_stream(
    plan: RevealPlan,
    interval: Duration,
    cancel: CancellationToken,
) -> impl Stream<Item = String> + Send + 'static {
    futures::stream::unfold(
        (plan.into_iter(), cancel, false),
        move |(mut steps, cancel, started)| async move {
            if started {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return None,
                    () = tokio::time::sleep(interval) => {}
                }
            }
            if cancel.is_cancelled() {
                return None;
            }
            let prefix = steps.next()?;
            Some((prefix, (steps, cancel, true)))
        },
    )
}

fn word_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if in_word {
                ends.push(i);
                in_word = false;
            }
        } else {
            in_word = true;
        }
    }
    if in_word {
        ends.push(text.len());
    }
    ends
}

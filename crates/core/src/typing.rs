//! Typing Animator
//!
//! Turns a text blob into a time-paced sequence of growing prefixes. The pace
//! is relative to the text length: every text takes roughly `TARGET_STEPS`
//! ticks, however long it is.

use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};

pub const TARGET_STEPS: usize = 50;
pub const DEFAULT_TICK: Duration = Duration::from_millis(20);

/// Number of characters revealed per tick for a text of `len` characters.
pub fn step_size(len: usize) -> usize {
    (len / TARGET_STEPS).max(1)
}

/// Byte offset of the `chars`-th character boundary in `text`.
fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

/// Snapshot of one animation.
///
/// `displayed_prefix` is always a prefix of `source_text`, and `cursor` is its
/// length in characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnimationState {
    pub source_text: String,
    pub displayed_prefix: String,
    pub cursor: usize,
    pub complete: bool,
    /// Bumped on every reset; ticks from an older revision are ignored.
    pub revision: u64,
}

impl AnimationState {
    /// A fresh animation for `source_text`, nothing displayed yet.
    ///
    /// An empty text has nothing to type and starts out complete.
    pub fn start(source_text: &str, revision: u64) -> Self {
        Self {
            source_text: source_text.to_string(),
            displayed_prefix: String::new(),
            cursor: 0,
            complete: source_text.is_empty(),
            revision,
        }
    }

    /// Moves the animation one tick forward. Returns whether anything changed.
    ///
    /// The tick after the last chunk is shown flips `complete`, so a stable
    /// source completes exactly once.
    pub fn advance(&mut self) -> bool {
        if self.complete {
            return false;
        }
        let total = self.source_text.chars().count();
        if self.cursor >= total {
            self.complete = true;
            return true;
        }
        self.cursor = (self.cursor + step_size(total)).min(total);
        let end = byte_offset(&self.source_text, self.cursor);
        self.displayed_prefix = self.source_text[..end].to_string();
        true
    }

    /// Whether the full `target` text is on screen.
    pub fn is_caught_up(&self, target: &str) -> bool {
        self.complete && self.source_text == target && self.displayed_prefix == target
    }
}

/// Owns the ticking task for the current animation and publishes every frame
/// on a watch channel.
pub struct TypingAnimator {
    tick: Duration,
    state_tx: Arc<watch::Sender<AnimationState>>,
    task: Option<JoinHandle<()>>,
    revision: u64,
    armed: bool,
}

impl TypingAnimator {
    pub fn new(tick: Duration) -> Self {
        let (state_tx, _) = watch::channel(AnimationState::default());
        Self {
            tick,
            state_tx: Arc::new(state_tx),
            task: None,
            revision: 0,
            armed: false,
        }
    }

    /// Points the animator at `text`.
    ///
    /// Setting the text that is already the source keeps the current
    /// animation going (or finished). Any other value cancels the running
    /// animation and restarts from the first character of the new text.
    pub fn set_source(&mut self, text: &str) {
        if self.armed && self.state_tx.borrow().source_text == text {
            return;
        }

        self.cancel();
        self.revision += 1;
        self.armed = true;
        let revision = self.revision;
        self.state_tx
            .send_replace(AnimationState::start(text, revision));

        let state_tx = self.state_tx.clone();
        let tick = self.tick;
        self.task = Some(tokio::spawn(async move {
            loop {
                let mut finished = false;
                state_tx.send_if_modified(|state| {
                    if state.revision != revision {
                        finished = true;
                        return false;
                    }
                    let changed = state.advance();
                    finished = state.complete;
                    changed
                });
                if finished {
                    break;
                }
                tokio::time::sleep(tick).await;
            }
        }));
    }

    /// Cancels any animation and forgets the source text.
    pub fn clear(&mut self) {
        self.cancel();
        self.revision += 1;
        self.armed = false;
        self.state_tx.send_replace(AnimationState {
            revision: self.revision,
            ..AnimationState::default()
        });
    }

    pub fn state(&self) -> AnimationState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnimationState> {
        self.state_tx.subscribe()
    }

    /// Resolves once `target` is the source and has been fully displayed.
    pub async fn wait_until_caught_up(&self, target: &str) -> bool {
        let mut rx = self.state_tx.subscribe();
        rx.wait_for(|state| state.is_caught_up(target)).await.is_ok()
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Default for TypingAnimator {
    fn default() -> Self {
        Self::new(DEFAULT_TICK)
    }
}

impl Drop for TypingAnimator {
    fn drop(&mut self) {
        self.cancel();
    }
}

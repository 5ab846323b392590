//! Key listeners for detect mode
//!
//! One blocking reader pulls key presses from a [`KeySource`] and broadcasts
//! them. Every bound key has its own listener task that runs its handler when
//! that exact character arrives, so handlers for different keys can run at
//! the same time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::mode::Action;
use crate::Result;

/// How long one read waits before checking for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

const KEY_BUFFER: usize = 16;

/// Runs the action bound to a key
pub type KeyHandler = Arc<dyn Fn(Action) -> BoxFuture<'static, ()> + Send + Sync>;

/// Blocking source of key presses
pub trait KeySource: Send + Sync + 'static {
    /// Prepare the source before the first read
    ///
    /// # Errors
    ///
    /// Returns error if the input cannot be set up
    fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Restore the input after the last read
    fn close(&self) {}

    /// Wait up to `timeout` for a character key
    ///
    /// # Errors
    ///
    /// Returns error if reading input fails
    fn next_key(&self, timeout: Duration) -> Result<Option<char>>;
}

/// Key presses from the controlling terminal, read in raw mode
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalKeys;

impl KeySource for TerminalKeys {
    fn open(&self) -> Result<()> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(())
    }

    fn close(&self) {
        if let Err(e) = crossterm::terminal::disable_raw_mode() {
            tracing::warn!(error = %e, "failed to leave raw mode");
        }
    }

    fn next_key(&self, timeout: Duration) -> Result<Option<char>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        let Event::Key(key) = event::read()? else {
            return Ok(None);
        };
        if key.kind != KeyEventKind::Press {
            return Ok(None);
        }
        Ok(match key.code {
            // raw mode swallows the interrupt signal
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some('q'),
            KeyCode::Char(c) => Some(c),
            _ => None,
        })
    }
}

/// An installed set of key listeners
pub struct KeyListeners {
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

impl KeyListeners {
    /// Start reading keys and dispatching `bindings` to `handler`
    #[must_use]
    pub fn start(
        source: Arc<dyn KeySource>,
        bindings: &HashMap<char, Action>,
        handler: &KeyHandler,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (tx, _) = broadcast::channel(KEY_BUFFER);

        for (&key, &action) in bindings {
            let rx = tx.subscribe();
            tokio::spawn(listen(key, action, rx, Arc::clone(handler), cancel.clone()));
        }

        let reader = {
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || read_keys(source.as_ref(), &tx, &cancel))
        };

        tracing::debug!(keys = bindings.len(), "key listeners started");
        Self { cancel, reader }
    }

    /// Stop listening and wait for the reader to release the input
    ///
    /// Handlers that are already running are left to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.reader.await {
            tracing::error!(error = %e, "key reader panicked");
        }
        tracing::debug!("key listeners stopped");
    }
}

fn read_keys(source: &dyn KeySource, tx: &broadcast::Sender<char>, cancel: &CancellationToken) {
    if let Err(e) = source.open() {
        tracing::error!(error = %e, "failed to open key input");
        return;
    }

    while !cancel.is_cancelled() {
        match source.next_key(POLL_INTERVAL) {
            Ok(Some(key)) => {
                tracing::trace!(%key, "key pressed");
                // errors only when no key is bound
                let _ = tx.send(key);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "key input failed");
                break;
            }
        }
    }

    source.close();
}

async fn listen(
    key: char,
    action: Action,
    mut rx: broadcast::Receiver<char>,
    handler: KeyHandler,
    cancel: CancellationToken,
) {
    loop {
        let pressed = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            pressed = rx.recv() => pressed,
        };
        match pressed {
            Ok(pressed) if pressed == key => {
                // a press buffered before stop must not reach the next mode
                if cancel.is_cancelled() {
                    break;
                }
                handler(action).await;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(%key, skipped, "key listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Scripted {
        keys: Mutex<VecDeque<char>>,
        open: AtomicBool,
    }

    impl Scripted {
        fn new(keys: &str) -> Self {
            Self {
                keys: Mutex::new(keys.chars().collect()),
                open: AtomicBool::new(false),
            }
        }
    }

    impl KeySource for Scripted {
        fn open(&self) -> Result<()> {
            self.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
        }

        fn next_key(&self, timeout: Duration) -> Result<Option<char>> {
            let next = self.keys.lock().unwrap().pop_front();
            if next.is_none() {
                std::thread::sleep(timeout);
            }
            Ok(next)
        }
    }

    fn recording_handler() -> (KeyHandler, tokio::sync::mpsc::UnboundedReceiver<Action>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let handler: KeyHandler = Arc::new(move |action| {
            let tx = tx.clone();
            async move {
                tx.send(action).unwrap();
            }
            .boxed()
        });
        (handler, rx)
    }

    #[tokio::test]
    async fn bound_keys_dispatch_their_action() {
        let source = Arc::new(Scripted::new("xdm"));
        let bindings = HashMap::from([('d', Action::Detect), ('m', Action::SwitchToMenu)]);
        let (handler, mut rx) = recording_handler();

        let listeners = KeyListeners::start(source.clone(), &bindings, &handler);

        let mut seen = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        seen.sort_by_key(|a| *a == Action::SwitchToMenu);
        assert_eq!(seen, vec![Action::Detect, Action::SwitchToMenu]);

        listeners.stop().await;
        assert!(!source.open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn buffered_presses_are_dropped_after_stop() {
        for _ in 0..20 {
            let source = Arc::new(Scripted::new("dd"));
            let bindings = HashMap::from([('d', Action::Detect)]);
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let handler: KeyHandler = Arc::new(move |action| {
                let tx = tx.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    tx.send(action).unwrap();
                }
                .boxed()
            });

            let listeners = KeyListeners::start(source, &bindings, &handler);
            tokio::time::sleep(Duration::from_millis(20)).await;
            listeners.stop().await;
            drop(handler);

            tokio::time::sleep(Duration::from_millis(200)).await;
            let mut fired = 0;
            while rx.try_recv().is_ok() {
                fired += 1;
            }
            assert_eq!(fired, 1);
        }
    }

    #[tokio::test]
    async fn stop_releases_the_input() {
        let source = Arc::new(Scripted::new(""));
        let (handler, _rx) = recording_handler();

        let listeners = KeyListeners::start(source.clone(), &HashMap::new(), &handler);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(source.open.load(Ordering::SeqCst));

        listeners.stop().await;
        assert!(!source.open.load(Ordering::SeqCst));
    }
}

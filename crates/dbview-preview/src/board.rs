use crate::fetch::fetch_preview;
use crate::html::LinkPreview;
use dbview_storage::TablePage;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewState {
    Pending,
    Ready(LinkPreview),
    Unavailable,
}

#[derive(Debug, Default)]
struct BoardState {
    generation: u64,
    entries: HashMap<String, PreviewState>,
}

/// Preview results for the links on the currently rendered page.
///
/// Cloning shares the board; spawned fetches hold a clone and write back
/// through [`PreviewBoard::apply`].
#[derive(Debug, Clone)]
pub struct PreviewBoard {
    client: reqwest::Client,
    timeout: Duration,
    state: Arc<Mutex<BoardState>>,
}

impl PreviewBoard {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_FETCH_TIMEOUT,
            state: Arc::new(Mutex::new(BoardState::default())),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().expect("preview board mutex poisoned").generation
    }

    /// Move the board to `generation`. Pending and failed entries from the
    /// previous render are forgotten; finished previews stay cached.
    pub fn begin_render(&self, generation: u64) {
        let mut state = self.state.lock().expect("preview board mutex poisoned");
        if generation < state.generation {
            return;
        }
        state.generation = generation;
        state
            .entries
            .retain(|_, entry| matches!(entry, PreviewState::Ready(_)));
    }

    /// Record a fetch result. Returns `false` when the result belongs to an
    /// older render and was dropped.
    pub fn apply(&self, generation: u64, url: &str, result: PreviewState) -> bool {
        let mut state = self.state.lock().expect("preview board mutex poisoned");
        if generation != state.generation {
            log::debug!(
                "dropping preview for {url}: generation {generation} superseded by {}",
                state.generation
            );
            return false;
        }
        state.entries.insert(url.to_string(), result);
        true
    }

    pub fn get(&self, url: &str) -> Option<PreviewState> {
        self.state
            .lock()
            .expect("preview board mutex poisoned")
            .entries
            .get(url)
            .cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, PreviewState> {
        self.state
            .lock()
            .expect("preview board mutex poisoned")
            .entries
            .clone()
    }

    /// Start a fetch for every distinct link on `page` that is not already
    /// cached. Must be called from within a tokio runtime.
    pub fn schedule(&self, page: &TablePage) -> Vec<JoinHandle<()>> {
        self.begin_render(page.generation);
        let generation = page.generation;

        let urls: BTreeSet<String> = page.link_urls().map(str::to_string).collect();
        let mut handles = Vec::new();
        for url in urls {
            {
                let mut state = self.state.lock().expect("preview board mutex poisoned");
                if state.generation != generation || state.entries.contains_key(&url) {
                    continue;
                }
                state.entries.insert(url.clone(), PreviewState::Pending);
            }

            let board = self.clone();
            handles.push(tokio::spawn(async move {
                let fetched =
                    tokio::time::timeout(board.timeout, fetch_preview(&board.client, &url)).await;
                let result = match fetched {
                    Ok(Ok(preview)) => PreviewState::Ready(preview),
                    Ok(Err(err)) => {
                        log::debug!("preview for {url} unavailable: {err}");
                        PreviewState::Unavailable
                    }
                    Err(_) => {
                        log::debug!("preview for {url} timed out");
                        PreviewState::Unavailable
                    }
                };
                board.apply(generation, &url, result);
            }));
        }
        handles
    }
}

//! The asynchronous crawl pipeline: a pool of downloader workers and a
//! single parser worker, coordinated by one mutex and two condition
//! variables, mutating a shared [`Graph`]. See module-level docs in the
//! crate root for the termination condition.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tokio::sync::oneshot;
use webgraph::{Graph, NodeId};

use crate::downloader::{ProxySettings, WebPageDownloader, WebPageDownloaderFactory};
use crate::error::{Error, Result};
use crate::extractor::extract_and_filter_links;

struct State {
    frontier: VecDeque<NodeId>,
    parse_queue: VecDeque<(NodeId, String)>,
    free_downloaders: Vec<Box<dyn WebPageDownloader>>,
    graph: Graph,
    root_url: String,
    stripped_root_url: String,
    completion: Option<oneshot::Sender<std::result::Result<Graph, Error>>>,
}

struct Inner {
    state: Mutex<State>,
    download_cv: Condvar,
    parse_cv: Condvar,
    running: AtomicBool,
    needs_to_stop: AtomicBool,
    graph_completed: AtomicBool,
    max_threads: usize,
}

/// The crawl pipeline. `maxThreads` download workers plus exactly one
/// parser worker run as native OS threads between [`CrawlPipeline::start`]
/// and completion or [`CrawlPipeline::stop`].
pub struct CrawlPipeline {
    inner: Arc<Inner>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl CrawlPipeline {
    /// Allocate `max_threads` downloader handles from `factory`. Fails if
    /// `max_threads == 0`.
    pub fn construct(
        factory: &dyn WebPageDownloaderFactory,
        max_threads: usize,
    ) -> Result<Self> {
        if max_threads == 0 {
            return Err(Error::InvalidArgument(
                "number of threads should be positive".to_string(),
            ));
        }

        let free_downloaders = (0..max_threads).map(|_| factory.create()).collect();

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    frontier: VecDeque::new(),
                    parse_queue: VecDeque::new(),
                    free_downloaders,
                    graph: Graph::empty(),
                    root_url: String::new(),
                    stripped_root_url: String::new(),
                    completion: None,
                }),
                download_cv: Condvar::new(),
                parse_cv: Condvar::new(),
                running: AtomicBool::new(false),
                needs_to_stop: AtomicBool::new(false),
                graph_completed: AtomicBool::new(false),
                max_threads,
            }),
            threads: Mutex::new(Vec::new()),
        })
    }

    /// Apply proxy credentials to every pooled downloader. Only permitted
    /// while not running; returns whether it was applied.
    pub fn set_proxy(&self, settings: &ProxySettings) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        if self.inner.running.load(Ordering::SeqCst) {
            return false;
        }

        for downloader in state.free_downloaders.iter_mut() {
            let _ = downloader.set_proxy(settings);
        }

        true
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Begin a crawl from `seed_url`. Fails if a crawl is already running or
    /// `seed_url` is empty. The returned receiver resolves with the
    /// completed graph, or an error if [`CrawlPipeline::stop`] is called
    /// first.
    pub fn start(
        &self,
        seed_url: &str,
    ) -> Result<oneshot::Receiver<std::result::Result<Graph, Error>>> {
        if seed_url.is_empty() {
            return Err(Error::InvalidArgument(
                "url should not be empty".to_string(),
            ));
        }

        let rx = {
            let mut state = self.inner.state.lock().unwrap();
            if self.inner.running.load(Ordering::SeqCst) {
                return Err(Error::AlreadyRunning);
            }

            let root_url = clean_root_url(seed_url);
            let stripped_root_url = strip_web_prefixes(&root_url);
            let graph = Graph::create(&root_url);
            let root_id = graph.root().expect("graph just created with a root");

            state.frontier.clear();
            state.parse_queue.clear();
            state.graph = graph;
            state.root_url = root_url;
            state.stripped_root_url = stripped_root_url;
            state.frontier.push_back(root_id);

            let (tx, rx) = oneshot::channel();
            state.completion = Some(tx);

            // Set while still holding `state`, so the check-and-set is atomic
            // with respect to a second concurrent `start()` call.
            self.inner.needs_to_stop.store(false, Ordering::SeqCst);
            self.inner.graph_completed.store(false, Ordering::SeqCst);
            self.inner.running.store(true, Ordering::SeqCst);

            rx
        };

        {
            let mut threads = self.threads.lock().unwrap();
            for _ in 0..self.inner.max_threads {
                let inner = Arc::clone(&self.inner);
                threads.push(std::thread::spawn(move || download_worker(inner)));
            }
            let inner = Arc::clone(&self.inner);
            threads.push(std::thread::spawn(move || parse_worker(inner)));
        }

        self.inner.download_cv.notify_one();

        Ok(rx)
    }

    /// Cooperative shutdown: sets the stop flag, wakes every worker, and
    /// joins them. If a crawl was in progress its future resolves with
    /// [`Error::Aborted`]. Safe to call redundantly, including from `Drop`.
    pub fn stop(&self) {
        self.inner.needs_to_stop.store(true, Ordering::SeqCst);
        self.inner.download_cv.notify_all();
        self.inner.parse_cv.notify_all();

        let handles: Vec<JoinHandle<()>> = {
            let mut threads = self.threads.lock().unwrap();
            threads.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }

        let mut state = self.inner.state.lock().unwrap();
        if let Some(tx) = state.completion.take() {
            let _ = tx.send(Err(Error::Aborted));
        }
        self.inner.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for CrawlPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Recompute and store the graph-complete predicate, broadcasting both
/// condition variables the instant it becomes true (§5: "Both CVs are
/// broadcast when the predicate flips to true").
fn update_graph_completed(inner: &Inner, state: &State) {
    let completed = state.frontier.is_empty()
        && state.parse_queue.is_empty()
        && state.free_downloaders.len() == inner.max_threads;

    inner.graph_completed.store(completed, Ordering::SeqCst);
    if completed {
        inner.download_cv.notify_all();
        inner.parse_cv.notify_all();
    }
}

fn download_worker(inner: Arc<Inner>) {
    loop {
        let (mut downloader, node_id, url) = {
            let guard = inner.state.lock().unwrap();
            let mut guard = inner
                .download_cv
                .wait_while(guard, |s| {
                    let can_download = !s.frontier.is_empty() && !s.free_downloaders.is_empty();
                    !can_download
                        && !inner.graph_completed.load(Ordering::SeqCst)
                        && !inner.needs_to_stop.load(Ordering::SeqCst)
                })
                .unwrap();

            if inner.needs_to_stop.load(Ordering::SeqCst)
                || inner.graph_completed.load(Ordering::SeqCst)
            {
                return;
            }

            let downloader = guard
                .free_downloaders
                .pop()
                .expect("wait predicate guarantees a free downloader");
            let node_id = guard
                .frontier
                .pop_front()
                .expect("wait predicate guarantees a queued node");
            let url = guard
                .graph
                .node(node_id)
                .map(|n| n.original_url().to_string())
                .unwrap_or_default();

            (downloader, node_id, url)
        };

        let result = downloader.download_page(&url);

        let mut guard = inner.state.lock().unwrap();
        match result {
            Ok(body) => {
                guard.parse_queue.push_back((node_id, body));
                inner.parse_cv.notify_one();
            }
            Err(e) => {
                tracing::warn!("failed to download page {url}: {e}");
            }
        }
        guard.free_downloaders.push(downloader);

        update_graph_completed(&inner, &guard);
    }
}

fn parse_worker(inner: Arc<Inner>) {
    loop {
        let (node_id, body, root_url, stripped_root_url) = {
            let guard = inner.state.lock().unwrap();
            let mut guard = inner
                .parse_cv
                .wait_while(guard, |s| {
                    s.parse_queue.is_empty()
                        && !inner.graph_completed.load(Ordering::SeqCst)
                        && !inner.needs_to_stop.load(Ordering::SeqCst)
                })
                .unwrap();

            if inner.needs_to_stop.load(Ordering::SeqCst) {
                if let Some(tx) = guard.completion.take() {
                    let _ = tx.send(Err(Error::Aborted));
                }
                inner.running.store(false, Ordering::SeqCst);
                return;
            }

            if inner.graph_completed.load(Ordering::SeqCst) {
                let graph = std::mem::replace(&mut guard.graph, Graph::empty());
                if let Some(tx) = guard.completion.take() {
                    let _ = tx.send(Ok(graph));
                }
                inner.running.store(false, Ordering::SeqCst);
                return;
            }

            let (node_id, body) = guard
                .parse_queue
                .pop_front()
                .expect("wait predicate guarantees a queued entry");
            (node_id, body, guard.root_url.clone(), guard.stripped_root_url.clone())
        };

        let urls = extract_and_filter_links(&body, &root_url, &stripped_root_url);

        let mut guard = inner.state.lock().unwrap();
        for url in urls {
            match guard.graph.get_node(&url) {
                Some(existing) => {
                    guard.graph.add_link(existing, node_id);
                }
                None => {
                    let new_id = guard.graph.add_link_to_url(&url, node_id);
                    guard.frontier.push_back(new_id);
                    inner.download_cv.notify_one();
                }
            }
        }

        update_graph_completed(&inner, &guard);
    }
}

/// `TrimUrl` + percent-decode + quoting-punctuation removal, applied to the
/// seed URL once at `Start`. Scheme and `www.` are deliberately NOT
/// stripped here — that's what [`strip_web_prefixes`] is for — since this
/// is the form the graph stores and the form site-relative hrefs resolve
/// against.
fn clean_root_url(raw: &str) -> String {
    let mut s = raw.to_string();
    if s.ends_with('/') {
        s.pop();
    }
    s = webgraph::percent_decode(&s);
    s.retain(|c| !matches!(c, '"' | '\u{201d}' | '\'' | '&'));
    s
}

fn strip_web_prefixes(url: &str) -> String {
    let mut s = url.to_string();
    for prefix in ["http://", "https://", "www."] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.to_string();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeDownloader {
        pages: Arc<StdMutex<HashMap<String, String>>>,
    }

    impl WebPageDownloader for FakeDownloader {
        fn set_proxy(&mut self, _settings: &ProxySettings) -> Result<()> {
            Ok(())
        }

        fn download_page(&mut self, url: &str) -> Result<String> {
            Ok(self
                .pages
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_default())
        }
    }

    struct FakeFactory {
        pages: Arc<StdMutex<HashMap<String, String>>>,
    }

    impl WebPageDownloaderFactory for FakeFactory {
        fn create(&self) -> Box<dyn WebPageDownloader> {
            Box::new(FakeDownloader {
                pages: Arc::clone(&self.pages),
            })
        }
    }

    #[test]
    fn construct_fails_on_zero_threads() {
        let factory = FakeFactory {
            pages: Arc::new(StdMutex::new(HashMap::new())),
        };
        assert!(CrawlPipeline::construct(&factory, 0).is_err());
    }

    #[test]
    fn start_fails_on_empty_seed() {
        let factory = FakeFactory {
            pages: Arc::new(StdMutex::new(HashMap::new())),
        };
        let pipeline = CrawlPipeline::construct(&factory, 2).unwrap();
        assert!(pipeline.start("").is_err());
    }

    #[tokio::test]
    async fn small_site_crawl_terminates_and_links_pages() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://example.com".to_string(),
            r#"<a href="https://example.com/a">a</a><a href="https://example.com/b">b</a>"#
                .to_string(),
        );
        pages.insert(
            "https://example.com/a".to_string(),
            r#"<a href="https://example.com/b">b</a>"#.to_string(),
        );
        pages.insert("https://example.com/b".to_string(), String::new());

        let factory = FakeFactory {
            pages: Arc::new(StdMutex::new(pages)),
        };
        let pipeline = CrawlPipeline::construct(&factory, 2).unwrap();
        let rx = pipeline.start("https://example.com").unwrap();

        let graph = rx.await.unwrap().unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.total_links(), 3);
    }

    #[tokio::test]
    async fn page_with_no_hrefs_does_not_hang_pipeline() {
        let mut pages = HashMap::new();
        pages.insert("https://example.com".to_string(), String::new());

        let factory = FakeFactory {
            pages: Arc::new(StdMutex::new(pages)),
        };
        let pipeline = CrawlPipeline::construct(&factory, 3).unwrap();
        let rx = pipeline.start("https://example.com").unwrap();

        let graph = rx.await.unwrap().unwrap();
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn clean_root_url_trims_and_decodes() {
        assert_eq!(clean_root_url("https://example.com/"), "https://example.com");
        assert_eq!(strip_web_prefixes("https://www.example.com"), "example.com");
    }
}

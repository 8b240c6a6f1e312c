use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use browser_relay::{
    BrowserEngine, BrowserSession, FetchEvent, FetchRequest, FetcherSettings, InterceptedResponse, PageFetcher,
    RelayError, ResourceKind,
};

/// Tracks how many browsers are alive at once
#[derive(Default)]
struct Gauge {
    live: AtomicUsize,
    peak: AtomicUsize,
    closed: AtomicUsize,
}

struct SlowEngine {
    gauge: Arc<Gauge>,
}

struct SlowSession {
    gauge: Arc<Gauge>,
}

#[async_trait]
impl BrowserEngine for SlowEngine {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, RelayError> {
        let live = self.gauge.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(SlowSession {
            gauge: self.gauge.clone(),
        }))
    }
}

#[async_trait]
impl BrowserSession for SlowSession {
    async fn prepare(&mut self, _user_agent: &str, _headers: &[(String, String)]) -> Result<(), RelayError> {
        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        responses: mpsc::UnboundedSender<InterceptedResponse>,
    ) -> Result<(), RelayError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let _ = responses.send(InterceptedResponse {
            url: url.to_string(),
            status: 200,
            headers,
            resource: ResourceKind::Document,
            body: Some(format!(r#"{{"url":"{}"}}"#, url)),
        });
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), RelayError> {
        self.gauge.live.fetch_sub(1, Ordering::SeqCst);
        self.gauge.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fetcher(gauge: Arc<Gauge>, max_concurrent_browsers: usize) -> Arc<PageFetcher> {
    let settings = FetcherSettings {
        user_agent: "relay-test".to_string(),
        navigation_timeout: Duration::from_secs(5),
        settle_delay: Duration::from_millis(100),
        max_concurrent_browsers,
    };
    Arc::new(PageFetcher::new(Arc::new(SlowEngine { gauge }), settings))
}

#[tokio::test(start_paused = true)]
async fn concurrent_fetches_get_their_own_browser_and_payload() {
    let gauge = Arc::new(Gauge::default());
    let fetcher = fetcher(gauge.clone(), 4);

    let urls: Vec<String> = (0..3)
        .map(|i| format!("https://gmgn.ai/api/v1/token_stat/sol/mint{}", i))
        .collect();
    let handles: Vec<_> = urls
        .iter()
        .cloned()
        .map(|url| {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.fetch(&FetchRequest::new(&url).unwrap()).await })
        })
        .collect();

    for (url, handle) in urls.iter().zip(handles) {
        let captured = handle.await.unwrap().unwrap();
        assert_eq!(captured.data["url"], url.as_str());
    }

    assert_eq!(gauge.peak.load(Ordering::SeqCst), 3);
    assert_eq!(gauge.closed.load(Ordering::SeqCst), 3);
    assert_eq!(gauge.live.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn browser_pool_limit_is_respected() {
    let gauge = Arc::new(Gauge::default());
    let fetcher = fetcher(gauge.clone(), 1);

    let first = {
        let fetcher = fetcher.clone();
        tokio::spawn(async move {
            fetcher
                .fetch(&FetchRequest::new("https://gmgn.ai/api/v1/token_stat/sol/a").unwrap())
                .await
        })
    };
    let second = {
        let fetcher = fetcher.clone();
        tokio::spawn(async move {
            fetcher
                .fetch(&FetchRequest::new("https://gmgn.ai/api/v1/token_stat/sol/b").unwrap())
                .await
        })
    };

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
    assert_eq!(gauge.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_page_times_out_and_reports_events() {
    let gauge = Arc::new(Gauge::default());
    let fetcher = fetcher(gauge.clone(), 1);
    let mut events = fetcher.subscribe();

    let err = fetcher
        .fetch_with_timeout(
            &FetchRequest::new("https://gmgn.ai/api/v1/token_stat/sol/slow").unwrap(),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "NavigationTimeout");
    assert_eq!(gauge.closed.load(Ordering::SeqCst), 1);

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(match event {
            FetchEvent::NavigationStarted { .. } => "started",
            FetchEvent::ResponseCaptured { .. } => "captured",
            FetchEvent::CaptureFailed { .. } => "failed",
            FetchEvent::TornDown { .. } => "torn_down",
        });
    }
    assert_eq!(names, vec!["started", "torn_down", "failed"]);
}

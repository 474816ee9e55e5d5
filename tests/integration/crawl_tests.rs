//! Integration tests for the harvester
//!
//! Most tests drive full runs against an in-memory site; the last one goes over
//! real HTTP with wiremock.

use agency_harvester::config::{parse_config, Config};
use agency_harvester::fetch::{FetchAdapter, FetchError, HttpFetchAdapter, HttpResponse, RenderedPage};
use agency_harvester::storage::{lock, share, SharedStorage, SqliteStorage, Storage};
use agency_harvester::{Harvester, RunSummary};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SITE: &str = "https://example-agency.test";

/// In-memory site: canned responses by exact URL, 404 for everything else
#[derive(Default)]
struct SiteStub {
    responses: Mutex<HashMap<String, (u16, Vec<u8>, Option<String>)>>,
    requests: Mutex<Vec<String>>,
    latency: Duration,
}

impl SiteStub {
    fn new() -> Self {
        Self::default()
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn html(self, url: &str, body: &str) -> Self {
        self.add(url, 200, body.as_bytes(), "text/html")
    }

    fn xml(self, url: &str, body: &str) -> Self {
        self.add(url, 200, body.as_bytes(), "application/xml")
    }

    fn pdf(self, url: &str, body: &[u8]) -> Self {
        self.add(url, 200, body, "application/pdf")
    }

    fn add(self, url: &str, status: u16, body: &[u8], content_type: &str) -> Self {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            (status, body.to_vec(), Some(content_type.to_string())),
        );
        self
    }

    fn request_count(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| *r == url).count()
    }

    async fn respond(&self, url: &url::Url) -> (u16, Vec<u8>, Option<String>) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.requests.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .unwrap_or((404, Vec::new(), None))
    }
}

#[async_trait]
impl FetchAdapter for SiteStub {
    async fn render(&self, url: &url::Url) -> Result<RenderedPage, FetchError> {
        let (status, body, content_type) = self.respond(url).await;
        Ok(RenderedPage {
            html: String::from_utf8_lossy(&body).into_owned(),
            final_url: url.clone(),
            status,
            content_type,
        })
    }

    async fn http_get(&self, url: &url::Url) -> Result<HttpResponse, FetchError> {
        let (status, bytes, content_type) = self.respond(url).await;
        Ok(HttpResponse {
            bytes,
            content_type,
            status,
            final_url: url.clone(),
        })
    }
}

/// Builds a validated config around one `[[authority]]` block
fn config(download_dir: &TempDir, authority: &str) -> Config {
    parse_config(&format!(
        r#"
[crawler]
minimum-time-between-requests = 0
max-concurrent-per-domain = 4

[retry]
max-attempts = 2
base-delay = 1
max-delay = 2

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "unused.db"
download-dir = "{}"
export-path = "unused.csv"

{}
"#,
        download_dir.path().display(),
        authority
    ))
    .unwrap()
}

const LISTING_AUTHORITY: &str = r#"
[[authority]]
name = "agency"
domain = "example-agency.test"

[authority.rules]
kind = "selectors"
title = "h1"
reference-label = "Diarienummer"
description = [".lead", "p"]
date = ".date"

[[authority.listing]]
url = "https://example-agency.test/reports"
entry = "li"
pagination = { kind = "template", template = "{url}?page={page}" }
"#;

fn listing_html(ids: &[u32]) -> String {
    let items: String = ids
        .iter()
        .map(|i| format!(r#"<li><a href="/reports/r{}">Rapport {}</a></li>"#, i, i))
        .collect();
    format!("<h1>Reports</h1><ul>{}</ul>", items)
}

fn record_html(id: u32) -> String {
    format!(
        r#"<h1>Rapport {id}</h1>
           <p class="lead">Sammanfattning {id}</p>
           <dl><dt>Diarienummer</dt><dd>2024/{id}</dd></dl>
           <span class="date">{id} mars 2024</span>"#
    )
}

fn with_records(mut stub: SiteStub, ids: &[u32]) -> SiteStub {
    for id in ids {
        stub = stub.html(&format!("{}/reports/r{}", SITE, id), &record_html(*id));
    }
    stub
}

fn listing_page(n: u32) -> String {
    format!("{}/reports?page={}", SITE, n)
}

async fn run(config: Config, storage: &SharedStorage, site: Arc<SiteStub>) -> RunSummary {
    Harvester::with_components(config, "test", false, storage.clone(), site, CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap()
}

fn memory_storage() -> SharedStorage {
    share(SqliteStorage::new_in_memory().unwrap())
}

#[tokio::test]
async fn test_listing_repeating_page_yields_three_records() {
    let dir = TempDir::new().unwrap();
    let storage = memory_storage();
    let site = Arc::new(with_records(
        SiteStub::new()
            .html(&format!("{}/reports", SITE), &listing_html(&[1, 2, 3]))
            .html(&listing_page(2), &listing_html(&[1, 2, 3]))
            .html(&listing_page(3), &listing_html(&[1, 2, 3])),
        &[1, 2, 3],
    ));

    let summary = run(config(&dir, LISTING_AUTHORITY), &storage, site.clone()).await;

    assert_eq!(summary.records_persisted, 3);
    assert_eq!(site.request_count(&listing_page(2)), 1);
    assert_eq!(site.request_count(&listing_page(3)), 0);

    let storage = lock(&storage).unwrap();
    let records = storage.list_documents().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].title, "Rapport 1");
    assert_eq!(records[0].reference_id, "2024/1");
    assert_eq!(records[0].description, "Sammanfattning 1");
    assert_eq!(records[0].date, "1 mars 2024");
}

#[tokio::test]
async fn test_listing_shrinking_repeats_stop_within_two_extra_pages() {
    let dir = TempDir::new().unwrap();
    let storage = memory_storage();
    let mut stub = SiteStub::new().html(&format!("{}/reports", SITE), &listing_html(&[1, 2, 3]));
    // Every later page shows a different subset of page 1, so counts never settle
    for n in 2..=10 {
        let subset: Vec<u32> = if n % 2 == 0 { vec![2, 1] } else { vec![3] };
        stub = stub.html(&listing_page(n), &listing_html(&subset));
    }
    let site = Arc::new(with_records(stub, &[1, 2, 3]));

    let summary = run(config(&dir, LISTING_AUTHORITY), &storage, site.clone()).await;

    assert_eq!(summary.records_persisted, 3);
    let extra_pages: usize = (2..=10).map(|n| site.request_count(&listing_page(n))).sum();
    assert!(extra_pages <= 2, "walked {} extra pages", extra_pages);
}

#[tokio::test]
async fn test_record_without_date_is_kept() {
    let dir = TempDir::new().unwrap();
    let storage = memory_storage();
    let site = Arc::new(
        SiteStub::new()
            .html(&format!("{}/reports", SITE), &listing_html(&[7]))
            .html(&format!("{}/reports/r7", SITE), "<h1>Utan datum</h1>"),
    );

    run(config(&dir, LISTING_AUTHORITY), &storage, site).await;

    let storage = lock(&storage).unwrap();
    let record = storage
        .get_document(&format!("{}/reports/r7", SITE))
        .unwrap()
        .unwrap();
    assert_eq!(record.title, "Utan datum");
    assert_eq!(record.date, "");
    assert!(!record.source_url.is_empty());
}

fn sitemap(urls: &[&str]) -> String {
    let entries: String = urls
        .iter()
        .map(|u| format!("<url><loc>{}</loc><lastmod>2023-11-02</lastmod></url>", u))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
        entries
    )
}

fn sitemap_authority(sitemaps: &[String]) -> String {
    let list: Vec<String> = sitemaps.iter().map(|s| format!("\"{}\"", s)).collect();
    format!(
        r#"
[[authority]]
name = "agency"
domain = "example-agency.test"
sitemaps = [{}]
"#,
        list.join(", ")
    )
}

#[tokio::test]
async fn test_malformed_sitemap_is_isolated() {
    let dir = TempDir::new().unwrap();
    let storage = memory_storage();

    let mut stub = SiteStub::new();
    let mut sitemaps = Vec::new();
    for n in 1..=5 {
        let sitemap_url = format!("{}/sitemap-{}.xml", SITE, n);
        let pdf_url = format!("{}/files/doc-{}.pdf", SITE, n);
        stub = if n == 3 {
            stub.xml(&sitemap_url, "<urlset><url><loc>broken")
        } else {
            stub.xml(&sitemap_url, &sitemap(&[&pdf_url]))
        };
        stub = stub.pdf(&pdf_url, format!("%PDF-{}", n).as_bytes());
        sitemaps.push(sitemap_url);
    }
    let site = Arc::new(stub);

    let summary = run(config(&dir, &sitemap_authority(&sitemaps)), &storage, site.clone()).await;

    assert_eq!(summary.records_persisted, 4);
    assert_eq!(summary.artifacts_stored, 4);
    assert_eq!(summary.skips, 1);
    assert_eq!(site.request_count(&format!("{}/files/doc-3.pdf", SITE)), 0);

    let storage = lock(&storage).unwrap();
    let run_id = storage.get_latest_run().unwrap().unwrap().id;
    let skips = storage.list_skips(run_id).unwrap();
    assert_eq!(skips.len(), 1);
    assert_eq!(skips[0].url, format!("{}/sitemap-3.xml", SITE));
}

#[tokio::test]
async fn test_identical_content_under_two_urls_stored_once() {
    let dir = TempDir::new().unwrap();
    let storage = memory_storage();
    let a = format!("{}/files/report.pdf", SITE);
    let b = format!("{}/mirror/report-copy.pdf", SITE);
    let sitemap_url = format!("{}/sitemap.xml", SITE);
    let site = Arc::new(
        SiteStub::new()
            .xml(&sitemap_url, &sitemap(&[&a, &b]))
            .pdf(&a, b"%PDF-same")
            .pdf(&b, b"%PDF-same"),
    );

    let summary = run(config(&dir, &sitemap_authority(&[sitemap_url])), &storage, site).await;

    assert_eq!(summary.artifacts_stored, 1);
    assert_eq!(summary.artifacts_deduplicated, 1);

    let storage = lock(&storage).unwrap();
    assert_eq!(storage.count_artifacts().unwrap(), 1);
    let first = storage.artifacts_for_document(&a).unwrap();
    let second = storage.artifacts_for_document(&b).unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].source_url, a);
    assert!(storage.is_checksum_seen(&first[0].checksum).unwrap());

    let stored = dir.path().join(&first[0].local_path);
    assert!(stored.exists());
    assert!(!dir.path().join("agency/pdf/2023/report-copy.pdf").exists());
}

#[tokio::test]
async fn test_second_run_adds_nothing() {
    let dir = TempDir::new().unwrap();
    let db = TempDir::new().unwrap();
    let db_path = db.path().join("harvest.db");

    let pdf = format!("{}/files/annual.pdf", SITE);
    let sitemap_url = format!("{}/sitemap.xml", SITE);
    let authority = LISTING_AUTHORITY.replacen(
        "domain = \"example-agency.test\"\n",
        &format!("domain = \"example-agency.test\"\nsitemaps = [\"{}\"]\n", sitemap_url),
        1,
    );

    let site = Arc::new(with_records(
        SiteStub::new()
            .html(&format!("{}/reports", SITE), &listing_html(&[1, 2]))
            .xml(&sitemap_url, &sitemap(&[&pdf]))
            .pdf(&pdf, b"%PDF-annual"),
        &[1, 2],
    ));

    let first_storage = share(SqliteStorage::new(&db_path).unwrap());
    let first = run(config(&dir, &authority), &first_storage, site.clone()).await;
    drop(first_storage);

    let second_storage = share(SqliteStorage::new(&db_path).unwrap());
    let second = run(config(&dir, &authority), &second_storage, site.clone()).await;

    assert_eq!(first.records_persisted, 3);
    assert_eq!(first.artifacts_stored, 1);
    assert_eq!(second.records_persisted, 0);
    assert_eq!(second.artifacts_stored, 0);
    assert_eq!(second.already_seen, 3);
    assert_eq!(site.request_count(&pdf), 1);

    let storage = lock(&second_storage).unwrap();
    assert_eq!(storage.count_documents().unwrap(), 3);
    assert_eq!(storage.count_artifacts().unwrap(), 1);
}

#[tokio::test]
async fn test_same_url_from_two_strategies_processed_once() {
    let dir = TempDir::new().unwrap();
    let storage = memory_storage();
    let pdf = format!("{}/files/shared.pdf", SITE);
    let sitemap_url = format!("{}/sitemap.xml", SITE);
    let feed_url = format!("{}/feed.xml", SITE);
    let feed = format!(
        r#"<rss version="2.0"><channel>
             <item><title>Delad rapport</title><link>{}</link></item>
           </channel></rss>"#,
        pdf
    );

    let site = Arc::new(
        SiteStub::new()
            .with_latency(Duration::from_millis(20))
            .xml(&sitemap_url, &sitemap(&[&pdf]))
            .xml(&feed_url, &feed)
            .pdf(&pdf, b"%PDF-shared"),
    );
    let authority = format!(
        r#"
[[authority]]
name = "agency"
domain = "example-agency.test"
sitemaps = ["{}"]
feeds = ["{}"]

[authority.rules]
kind = "head-meta"
"#,
        sitemap_url, feed_url
    );

    let summary = run(config(&dir, &authority), &storage, site.clone()).await;

    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.records_persisted, 1);
    assert_eq!(summary.already_seen, 1);
    assert_eq!(site.request_count(&pdf), 1);

    let storage = lock(&storage).unwrap();
    assert_eq!(storage.count_artifacts().unwrap(), 1);
    assert_eq!(storage.count_documents().unwrap(), 1);
}

#[tokio::test]
async fn test_full_run_over_http() {
    let server = MockServer::start().await;
    let base = server.uri();
    let user_agent = "TestHarvester/1.0 (+https://example.com/about; admin@example.com)";

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .and(header("user-agent", user_agent))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string(sitemap(&[
                    &format!("{}/files/Fordon%202024.pdf", base),
                    &format!("{}/files/gone.pdf", base),
                    &format!("{}/files/busy.pdf", base),
                ])),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/Fordon%202024.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(b"%PDF-1.7 fordon".to_vec()),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/gone.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/busy.pdf"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = TempDir::new().unwrap();
    let config = config(&dir, &sitemap_authority(&[format!("{}/sitemap.xml", base)]));
    let storage = share(SqliteStorage::new(&db.path().join("harvest.db")).unwrap());
    let adapter = Arc::new(HttpFetchAdapter::from_config(&config.user_agent).unwrap());

    let harvester = Harvester::with_components(
        config,
        "test",
        false,
        storage.clone(),
        adapter,
        CancellationToken::new(),
    )
    .unwrap();
    let summary = harvester.run().await.unwrap();

    assert_eq!(summary.records_persisted, 1);
    assert_eq!(summary.artifacts_stored, 1);
    assert_eq!(summary.failures, 2);

    let stored = dir.path().join("agency/pdf/2023/Fordon 2024.pdf");
    assert_eq!(std::fs::read(&stored).unwrap(), b"%PDF-1.7 fordon");

    {
        let storage = lock(&storage).unwrap();
        let failures = storage.list_failures(harvester.run_id()).unwrap();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| f.stage == "download"));

        let busy = failures.iter().find(|f| f.url.ends_with("busy.pdf")).unwrap();
        assert_eq!(busy.attempts, 2);

        assert!(storage.is_url_seen(&format!("{}/files/gone.pdf", base)).unwrap());
        assert!(!storage.is_url_seen(&format!("{}/files/busy.pdf", base)).unwrap());
    }

    let export = dir.path().join("records.csv");
    assert_eq!(harvester.sink().export(&export).unwrap(), 1);
    let csv = std::fs::read_to_string(&export).unwrap();
    assert!(csv.starts_with("title,reference_id,series_id,description,date,url"));
    assert!(csv.contains("Fordon 2024"));
}

use shipfront_artifacts::hash_bytes;
use shipfront_core::CacheConfig;
use shipfront_deployer::memory::{InMemoryCdn, InMemoryStore, ScriptedBuild};
use shipfront_deployer::{
    BucketLocks, DeployError, DeployRequest, Pipeline, RetryPolicy, Step, UploadReason,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const BUCKET: &str = "my-site";
const DIST: &str = "E2EXAMPLE1234";

fn write_site(dir: &Path, files: &[(&str, &str)]) {
    for (rel, body) in files {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(1),
        multiplier: 2.0,
        max_delay: Duration::from_millis(10),
        max_attempts: 3,
        request_timeout: Duration::from_secs(5),
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    cdn: Arc<InMemoryCdn>,
    pipeline: Pipeline,
}

fn harness_with(store: InMemoryStore, cdn: InMemoryCdn) -> Harness {
    let store = Arc::new(store);
    let cdn = Arc::new(cdn);
    let pipeline = Pipeline::new(store.clone(), cdn.clone())
        .with_retry(fast_retry())
        .with_poll_interval(Duration::from_millis(1));
    Harness {
        store,
        cdn,
        pipeline,
    }
}

fn harness() -> Harness {
    harness_with(InMemoryStore::new(), InMemoryCdn::new().with_distribution(DIST))
}

fn expected(files: &[(&str, &str)]) -> BTreeMap<String, String> {
    files
        .iter()
        .map(|(k, v)| (k.to_string(), hash_bytes(v.as_bytes())))
        .collect()
}

#[tokio::test]
async fn fresh_bucket_gets_every_file_and_one_invalidation() {
    let tmp = TempDir::new().unwrap();
    let files = [("index.html", "<html></html>"), ("main.js", "console.log(1)")];
    write_site(tmp.path(), &files);
    let h = harness();

    let summary = h
        .pipeline
        .deploy(&DeployRequest::new(tmp.path(), BUCKET, DIST))
        .await
        .unwrap();

    assert_eq!(summary.uploaded, 2);
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.bytes_uploaded, 13 + 14);
    assert_eq!(summary.invalidation_id.as_deref(), Some("I0001"));
    assert_eq!(h.store.contents(BUCKET), expected(&files));

    let requests = h.cdn.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].distribution_id, DIST);
    assert_eq!(requests[0].paths, vec!["/*".to_string()]);
}

#[tokio::test]
async fn stale_remote_files_are_removed() {
    let tmp = TempDir::new().unwrap();
    let files = [("index.html", "<html>v2</html>")];
    write_site(tmp.path(), &files);
    let h = harness();
    h.store.seed(BUCKET, "old.js", b"old");

    let summary = h
        .pipeline
        .deploy(&DeployRequest::new(tmp.path(), BUCKET, DIST))
        .await
        .unwrap();

    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(h.store.deleted_keys(), vec!["old.js".to_string()]);
    assert_eq!(h.store.contents(BUCKET), expected(&files));
    assert_eq!(h.cdn.requests().len(), 1);
}

#[tokio::test]
async fn redeploying_the_same_set_transfers_nothing() {
    let tmp = TempDir::new().unwrap();
    write_site(
        tmp.path(),
        &[("index.html", "<html></html>"), ("css/app.css", "body{}")],
    );
    let h = harness();
    let request = DeployRequest::new(tmp.path(), BUCKET, DIST);

    h.pipeline.deploy(&request).await.unwrap();
    let second = h.pipeline.deploy(&request).await.unwrap();

    assert_eq!(second.uploaded, 0);
    assert_eq!(second.deleted, 0);
    assert_eq!(second.unchanged, 2);
    assert!(second.invalidation_id.is_some());
    assert_eq!(h.store.put_keys().len(), 2);
    assert_eq!(h.cdn.requests().len(), 2);
}

#[tokio::test]
async fn changed_content_of_same_size_is_uploaded() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("app.js", "aaaa")]);
    let h = harness();
    h.store.seed(BUCKET, "app.js", b"bbbb");

    let summary = h
        .pipeline
        .deploy(&DeployRequest::new(tmp.path(), BUCKET, DIST))
        .await
        .unwrap();

    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.plan.uploads[0].reason, UploadReason::Changed);
    assert_eq!(h.store.head_calls(), 1);
}

#[tokio::test]
async fn objects_without_recorded_hash_are_uploaded_once() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("app.js", "same")]);
    let h = harness();
    h.store.seed_foreign(BUCKET, "app.js", b"same");
    let request = DeployRequest::new(tmp.path(), BUCKET, DIST);

    let first = h.pipeline.deploy(&request).await.unwrap();
    assert_eq!(first.plan.uploads[0].reason, UploadReason::Unverified);

    let second = h.pipeline.deploy(&request).await.unwrap();
    assert_eq!(second.uploaded, 0);
}

#[tokio::test]
async fn failed_build_touches_nothing() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("index.html", "old build output")]);
    let h = harness();
    let build = ScriptedBuild::failing("npm ERR! missing script: build");
    let pipeline = h.pipeline.with_build(Arc::new(build.clone()));

    let err = pipeline
        .deploy(&DeployRequest::new(tmp.path(), BUCKET, DIST))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Build(_)));
    assert_eq!(err.step(), Step::Build);
    assert_eq!(err.exit_code(), 3);
    assert_eq!(build.runs(), 1);
    assert_eq!(h.store.list_calls(), 0);
    assert!(h.store.put_keys().is_empty());
    assert!(h.cdn.requests().is_empty());
}

#[tokio::test]
async fn build_output_is_what_gets_deployed() {
    let tmp = TempDir::new().unwrap();
    let dist = tmp.path().join("dist");
    let h = harness();
    let build = ScriptedBuild::writing(&dist, &[("index.html", "built"), ("a/b.js", "js")]);
    let pipeline = h.pipeline.with_build(Arc::new(build.clone()));

    let summary = pipeline
        .deploy(&DeployRequest::new(&dist, BUCKET, DIST))
        .await
        .unwrap();

    assert_eq!(build.runs(), 1);
    assert_eq!(summary.uploaded, 2);
    assert_eq!(
        h.store.contents(BUCKET),
        expected(&[("index.html", "built"), ("a/b.js", "js")])
    );
}

#[tokio::test]
async fn skip_build_uses_existing_output() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("index.html", "prebuilt")]);
    let h = harness();
    let build = ScriptedBuild::failing("should not run");
    let pipeline = h.pipeline.with_build(Arc::new(build.clone()));

    let mut request = DeployRequest::new(tmp.path(), BUCKET, DIST);
    request.skip_build = true;
    pipeline.deploy(&request).await.unwrap();

    assert_eq!(build.runs(), 0);
}

#[tokio::test]
async fn missing_or_empty_artifact_dir_is_a_config_error() {
    let tmp = TempDir::new().unwrap();
    let h = harness();

    let err = h
        .pipeline
        .deploy(&DeployRequest::new(tmp.path().join("dist"), BUCKET, DIST))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Config(_)));
    assert_eq!(err.exit_code(), 2);

    let err = h
        .pipeline
        .deploy(&DeployRequest::new(tmp.path(), BUCKET, DIST))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("empty"));
    assert_eq!(h.store.list_calls(), 0);
    assert!(h.cdn.requests().is_empty());
}

#[tokio::test]
async fn upload_failure_midway_skips_invalidation() {
    let tmp = TempDir::new().unwrap();
    write_site(
        tmp.path(),
        &[("a.html", "a"), ("b.html", "b"), ("c.html", "c")],
    );
    let h = harness();
    h.store.seed(BUCKET, "stale.js", b"stale");
    h.store.fail_puts_after(1);

    let err = h
        .pipeline
        .deploy(&DeployRequest::new(tmp.path(), BUCKET, DIST))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Transfer(_)));
    assert_eq!(err.step(), Step::Sync);
    assert_eq!(err.exit_code(), 5);
    assert!(err.to_string().contains("uploaded 1 of 3"));
    // No rollback, no deletions, no invalidation
    assert_eq!(h.store.put_keys(), vec!["a.html".to_string()]);
    assert!(h.store.deleted_keys().is_empty());
    assert!(h.store.contents(BUCKET).contains_key("stale.js"));
    assert!(h.cdn.requests().is_empty());
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("index.html", "x")]);
    let h = harness();
    h.store.fail_next_calls(2);

    let summary = h
        .pipeline
        .deploy(&DeployRequest::new(tmp.path(), BUCKET, DIST))
        .await
        .unwrap();

    assert_eq!(summary.uploaded, 1);
    assert_eq!(h.cdn.requests().len(), 1);
}

#[tokio::test]
async fn rejected_credentials_are_an_auth_error() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("index.html", "x")]);
    let h = harness();
    h.store.reject_credentials();

    let err = h
        .pipeline
        .deploy(&DeployRequest::new(tmp.path(), BUCKET, DIST))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Auth { step: Step::Sync, .. }));
    assert_eq!(err.exit_code(), 4);
    assert_eq!(h.store.list_calls(), 0);
    assert!(h.cdn.requests().is_empty());
}

#[tokio::test]
async fn unknown_distribution_fails_after_sync() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("index.html", "x")]);
    let h = harness();

    let err = h
        .pipeline
        .deploy(&DeployRequest::new(tmp.path(), BUCKET, "EOTHER"))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Invalidation(_)));
    assert_eq!(err.step(), Step::Invalidate);
    assert_eq!(err.exit_code(), 6);
    // The sync is not undone
    assert_eq!(h.store.contents(BUCKET), expected(&[("index.html", "x")]));
}

#[tokio::test]
async fn cdn_credential_rejection_names_invalidate_step() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("index.html", "x")]);
    let h = harness_with(
        InMemoryStore::new(),
        InMemoryCdn::new().with_distribution(DIST).rejecting_credentials(),
    );

    let err = h
        .pipeline
        .deploy(&DeployRequest::new(tmp.path(), BUCKET, DIST))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Auth { step: Step::Invalidate, .. }));
}

#[tokio::test]
async fn invalid_identifiers_are_rejected_before_any_call() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("index.html", "x")]);
    let h = harness();

    let err = h
        .pipeline
        .deploy(&DeployRequest::new(tmp.path(), "Not A Bucket", DIST))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Config(_)));

    let mut request = DeployRequest::new(tmp.path(), BUCKET, DIST);
    request.invalidation_paths = vec!["index.html".to_string()];
    let err = h.pipeline.deploy(&request).await.unwrap_err();
    assert!(matches!(err, DeployError::Config(_)));

    assert_eq!(h.store.list_calls(), 0);
}

#[tokio::test]
async fn prefix_scopes_the_sync() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("index.html", "new")]);
    let h = harness();
    h.store.seed(BUCKET, "app/old.js", b"old");
    h.store.seed(BUCKET, "other/keep.js", b"keep");
    h.store.seed(BUCKET, "root.txt", b"keep");

    let mut request = DeployRequest::new(tmp.path(), BUCKET, DIST);
    request.prefix = Some("app/".to_string());
    let summary = h.pipeline.deploy(&request).await.unwrap();

    assert_eq!(summary.prefix.as_deref(), Some("app"));
    assert_eq!(h.store.deleted_keys(), vec!["app/old.js".to_string()]);
    let contents = h.store.contents(BUCKET);
    assert!(contents.contains_key("app/index.html"));
    assert!(contents.contains_key("other/keep.js"));
    assert!(contents.contains_key("root.txt"));
}

#[tokio::test]
async fn dry_run_changes_nothing() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("index.html", "new")]);
    let h = harness();
    h.store.seed(BUCKET, "old.js", b"old");

    let mut request = DeployRequest::new(tmp.path(), BUCKET, DIST);
    request.dry_run = true;
    let summary = h.pipeline.deploy(&request).await.unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.plan.uploads.len(), 1);
    assert_eq!(summary.plan.deletions, vec!["old.js".to_string()]);
    assert_eq!(summary.uploaded, 0);
    assert!(summary.invalidation_id.is_none());
    assert!(h.store.put_keys().is_empty());
    assert!(h.store.deleted_keys().is_empty());
    assert!(h.cdn.requests().is_empty());
}

#[tokio::test]
async fn uploads_carry_headers() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("index.html", "<p>"), ("app.js", "1")]);
    let h = harness();

    let mut request = DeployRequest::new(tmp.path(), BUCKET, DIST);
    request.cache = CacheConfig {
        default: Some("public, max-age=31536000, immutable".to_string()),
        html: Some("no-cache".to_string()),
    };
    h.pipeline.deploy(&request).await.unwrap();

    let index = h.store.object(BUCKET, "index.html").unwrap();
    assert_eq!(index.content_type.as_deref(), Some("text/html"));
    assert_eq!(index.cache_control.as_deref(), Some("no-cache"));
    assert_eq!(index.sha256, Some(hash_bytes(b"<p>")));

    let js = h.store.object(BUCKET, "app.js").unwrap();
    assert_eq!(
        js.cache_control.as_deref(),
        Some("public, max-age=31536000, immutable")
    );
}

#[tokio::test]
async fn waiting_reports_completed_invalidation() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("index.html", "x")]);
    let h = harness_with(
        InMemoryStore::new(),
        InMemoryCdn::new().with_distribution(DIST).with_pending_polls(2),
    );

    let mut request = DeployRequest::new(tmp.path(), BUCKET, DIST);
    request.wait_for_invalidation = Some(Duration::from_secs(5));
    let summary = h.pipeline.deploy(&request).await.unwrap();

    assert_eq!(summary.invalidation_status.as_deref(), Some("Completed"));
}

#[tokio::test]
async fn deploys_to_one_bucket_do_not_overlap() {
    let tmp = TempDir::new().unwrap();
    // One file, so neither deploy issues parallel hash lookups of its own
    write_site(tmp.path(), &[("index.html", "x")]);
    let store = Arc::new(InMemoryStore::new().with_op_delay(Duration::from_millis(5)));
    let cdn = Arc::new(InMemoryCdn::new().with_distribution(DIST));
    let locks = BucketLocks::new();

    let first = Pipeline::new(store.clone(), cdn.clone()).with_locks(locks.clone());
    let second = Pipeline::new(store.clone(), cdn.clone()).with_locks(locks.clone());
    let request = DeployRequest::new(tmp.path(), BUCKET, DIST);

    let (a, b) = tokio::join!(first.deploy(&request), second.deploy(&request));
    a.unwrap();
    b.unwrap();

    assert_eq!(store.max_in_flight(), 1);
    assert_eq!(cdn.requests().len(), 2);
    assert_eq!(store.put_keys().len(), 1);
}

#[tokio::test]
async fn hash_lookups_overlap_within_one_deploy() {
    let tmp = TempDir::new().unwrap();
    let files: Vec<(String, String)> = (0..8)
        .map(|i| (format!("page-{}.html", i), format!("body {}", i)))
        .collect();
    let borrowed: Vec<(&str, &str)> = files
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    write_site(tmp.path(), &borrowed);

    let store = Arc::new(InMemoryStore::new().with_op_delay(Duration::from_millis(5)));
    for (key, body) in &borrowed {
        store.seed(BUCKET, key, body.as_bytes());
    }
    let cdn = Arc::new(InMemoryCdn::new().with_distribution(DIST));
    let pipeline = Pipeline::new(store.clone(), cdn.clone()).with_retry(fast_retry());

    let summary = pipeline
        .deploy(&DeployRequest::new(tmp.path(), BUCKET, DIST))
        .await
        .unwrap();

    assert_eq!(summary.uploaded, 0);
    assert_eq!(summary.unchanged, 8);
    assert_eq!(store.head_calls(), 8);
    assert!(store.max_in_flight() > 1);
}

#[tokio::test]
async fn summary_serializes_for_ci_output() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path(), &[("index.html", "x")]);
    let h = harness();

    let summary = h
        .pipeline
        .deploy(&DeployRequest::new(tmp.path(), BUCKET, DIST))
        .await
        .unwrap();
    let json = serde_json::to_value(&summary).unwrap();

    assert_eq!(json["uploaded"], 1);
    assert_eq!(json["invalidation_id"], "I0001");
    assert_eq!(json["plan"]["uploads"][0]["reason"], "new");
}

#[tokio::test]
async fn standalone_invalidation_touches_no_objects() {
    let h = harness_with(
        InMemoryStore::new(),
        InMemoryCdn::new().with_distribution(DIST).with_pending_polls(1),
    );
    let paths = vec!["/index.html".to_string()];

    let receipt = h
        .pipeline
        .invalidate(DIST, &paths, Some(Duration::from_secs(1)))
        .await
        .unwrap();

    assert_eq!(receipt.id, "I0001");
    assert_eq!(receipt.status, "Completed");
    assert_eq!(h.cdn.requests()[0].paths, paths);
    assert_eq!(h.store.list_calls(), 0);

    let err = h.pipeline.invalidate(DIST, &[], None).await.unwrap_err();
    assert_eq!(err.step(), Step::Validate);
    assert_eq!(h.cdn.requests().len(), 1);
}

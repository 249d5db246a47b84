// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end scenarios across templates, operators, clustering, workflows
//! and the scheduler, all against canned transports.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::config::{ExecuterOptions, ScanOptions};
use crate::engine::test_support::{
    CannedTransport, FakeInteractionServer, RecordingObserver, SlowTransport,
};
use crate::engine::{cluster_templates, Engine, ListInput, ScanTarget, WorkflowExecuter};
use crate::errors::ExecutionError;
use crate::interactions::Interaction;
use crate::output::{InternalEvent, InternalWrappedEvent, MemorySink};
use crate::template::definition::TemplateDefinition;
use crate::template::loader::Loaded;
use crate::template::workflow::{NodeTarget, Workflow, WorkflowNode};
use crate::template::{Template, TemplateCache, TemplateLoader};
use crate::traits::{ExecutionOutcome, ScanContext, TemplateExecuter};

struct Harness {
    transport: Arc<CannedTransport>,
    sink: Arc<MemorySink>,
    options: ExecuterOptions,
}

fn harness(transport: CannedTransport, scan: ScanOptions) -> Harness {
    let transport = Arc::new(transport);
    let sink = Arc::new(MemorySink::new());
    let options = ExecuterOptions::with_transport(scan, sink.clone(), transport.clone());
    Harness {
        transport,
        sink,
        options,
    }
}

fn template(yaml: &str, options: &ExecuterOptions) -> Arc<Template> {
    let definition: TemplateDefinition = serde_yaml::from_str(yaml).unwrap();
    Arc::new(Template::compile(definition, None, options).unwrap())
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn status_template(id: &str, status: u16) -> String {
    format!(
        r#"
id: {id}
http:
  - method: GET
    path: ["{{{{BaseURL}}}}/"]
    matchers:
      - type: status
        status: [{status}]
"#
    )
}

async fn scan(
    harness: &Harness,
    executers: Vec<Arc<dyn TemplateExecuter>>,
    targets: &[&str],
) -> crate::engine::ScanSummary {
    Engine::new(harness.options.clone())
        .execute(
            executers,
            Box::new(ListInput::new(targets.iter().copied())),
            CancellationToken::new(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_word_matcher_reports_named_match() {
    let h = harness(
        CannedTransport::with_body(200, "Welcome home"),
        ScanOptions::default(),
    );
    let probe = template(
        r#"
id: scenario-a
info:
  name: Welcome page
  severity: info
http:
  - path: ["{{BaseURL}}/"]
    matchers:
      - type: word
        name: word-matcher
        words: ["welcome"]
        case-insensitive: true
"#,
        &h.options,
    );

    let mut outcomes = Vec::new();
    let mut callback = |event: InternalWrappedEvent| -> Result<(), ExecutionError> {
        outcomes.push(event);
        Ok(())
    };
    probe.requests[0]
        .execute_with_results(
            &ScanTarget::new("http://example.com"),
            &InternalEvent::new(),
            &InternalEvent::new(),
            &mut callback,
        )
        .await
        .unwrap();
    let result = outcomes[0].operators_result.as_ref().unwrap();
    assert!(result.matched);
    assert_eq!(result.matches["word-matcher"], vec!["welcome".to_string()]);

    let summary = scan(&h, cluster_templates(&[probe], &h.options), &["http://example.com"]).await;
    assert_eq!(summary.pairs_executed, 1);
    assert_eq!(summary.pairs_matched, 1);

    let results = h.sink.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].template_id, "scenario-a");
    assert_eq!(results[0].matcher_name.as_deref(), Some("word-matcher"));
    assert_eq!(results[0].matched_at, "http://example.com/");
    assert_eq!(results[0].protocol, "http");
}

#[tokio::test]
async fn test_clustered_templates_share_one_request() {
    let h = harness(CannedTransport::with_body(200, "ok"), ScanOptions::default());
    let templates = vec![
        template(&status_template("expects-200", 200), &h.options),
        template(&status_template("expects-404", 404), &h.options),
    ];

    let executers = cluster_templates(&templates, &h.options);
    assert_eq!(executers.len(), 1);
    assert_eq!(executers[0].template_ids(), vec!["expects-200", "expects-404"]);

    let summary = scan(&h, executers, &["http://example.com"]).await;
    assert_eq!(h.transport.call_count(), 1);
    assert_eq!(summary.pairs_matched, 1);

    let results = h.sink.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].template_id, "expects-200");
}

#[tokio::test]
async fn test_clustering_does_not_change_results() {
    let run = |disable_clustering: bool| async move {
        let h = harness(
            CannedTransport::with_body(200, "<title>Admin</title>"),
            ScanOptions {
                disable_clustering,
                ..ScanOptions::default()
            },
        );
        let templates = vec![
            template(&status_template("status-ok", 200), &h.options),
            template(&status_template("status-missing", 404), &h.options),
            template(
                r#"
id: admin-title
http:
  - method: GET
    path: ["{{BaseURL}}/"]
    matchers:
      - type: regex
        regex: ["<title>([^<]+)</title>"]
    extractors:
      - type: regex
        regex: ["<title>([^<]+)</title>"]
        group: 1
"#,
                &h.options,
            ),
        ];
        scan(&h, cluster_templates(&templates, &h.options), &["http://a.test", "http://b.test"]).await;

        let mut results: Vec<_> = h
            .sink
            .results()
            .into_iter()
            .map(|r| (r.host, r.template_id, r.matcher_name, r.extracted_results))
            .collect();
        results.sort();
        (results, h.transport.call_count())
    };

    let (clustered, clustered_calls) = run(false).await;
    let (standalone, standalone_calls) = run(true).await;

    assert_eq!(clustered, standalone);
    assert_eq!(clustered.len(), 4);
    assert_eq!(clustered_calls, 2);
    assert_eq!(standalone_calls, 6);
}

fn first_match_template(id: &str, word: &str, per_request: bool) -> String {
    format!(
        r#"
id: {id}
http:
  - path: ["{{{{BaseURL}}}}/a", "{{{{BaseURL}}}}/b"]
    stop-at-first-match: {per_request}
    matchers:
      - type: word
        words: ["{word}"]
"#
    )
}

#[tokio::test]
async fn test_stop_at_first_match_applies_per_template_with_clustering() {
    let run = |disable_clustering: bool, per_request: bool| async move {
        let h = harness(
            CannedTransport::default().route("/a", 200, "AAA").route("/b", 200, "BBB"),
            ScanOptions {
                disable_clustering,
                stop_at_first_match: !per_request,
                ..ScanOptions::default()
            },
        );
        let templates = vec![
            template(&first_match_template("first", "AAA", per_request), &h.options),
            template(&first_match_template("second", "BBB", per_request), &h.options),
        ];
        scan(&h, cluster_templates(&templates, &h.options), &["http://a.test"]).await;

        let mut results: Vec<_> = h
            .sink
            .results()
            .into_iter()
            .map(|r| (r.template_id, r.matched_at))
            .collect();
        results.sort();
        results
    };

    let expected = vec![
        ("first".to_string(), "http://a.test/a".to_string()),
        ("second".to_string(), "http://a.test/b".to_string()),
    ];
    for per_request in [true, false] {
        assert_eq!(run(false, per_request).await, expected);
        assert_eq!(run(true, per_request).await, expected);
    }
}

#[tokio::test]
async fn test_steps_see_prefixed_fields_and_dynamic_values_of_earlier_steps() {
    let h = harness(
        CannedTransport::with_body(404, "nope")
            .route("/login", 200, "session token=abc123;")
            .route("/admin?t=abc123", 200, "Admin console"),
        ScanOptions::default(),
    );
    let chained = template(
        r#"
id: login-then-admin
http:
  - id: login
    path: ["{{BaseURL}}/login"]
    extractors:
      - type: regex
        name: token
        internal: true
        group: 1
        regex: ["token=([a-z0-9]+)"]
  - id: admin
    path: ["{{BaseURL}}/admin?t={{token}}"]
    matchers-condition: and
    matchers:
      - type: dsl
        dsl: ["login_status_code == 200"]
      - type: word
        words: ["Admin console"]
"#,
        &h.options,
    );

    let summary = scan(&h, cluster_templates(&[chained], &h.options), &["http://example.com"]).await;
    assert_eq!(summary.pairs_matched, 1);

    let urls: Vec<_> = h.transport.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(
        urls,
        vec!["http://example.com/login", "http://example.com/admin?t=abc123"]
    );
    assert_eq!(h.sink.results().len(), 2);
}

#[tokio::test]
async fn test_workflow_child_receives_parent_dynamic_values() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "parent.yaml",
        r#"
id: parent
http:
  - path: ["{{BaseURL}}/login"]
    matchers:
      - type: status
        status: [200]
    extractors:
      - type: regex
        name: csrf
        internal: true
        group: 1
        regex: ["csrf=([A-Z]+)"]
"#,
    );
    write(
        dir.path(),
        "child.yaml",
        r#"
id: child
http:
  - method: POST
    path: ["{{BaseURL}}/submit"]
    body: "token={{csrf}}"
    matchers:
      - type: status
        status: [200]
"#,
    );
    let flow = write(
        dir.path(),
        "flow.yaml",
        r#"
id: csrf-flow
workflows:
  - template: parent.yaml
    subtemplates:
      - template: child.yaml
"#,
    );

    let h = harness(
        CannedTransport::with_body(200, "<input name=x value=1>")
            .route("/login", 200, "<form>csrf=XYZ</form>"),
        ScanOptions::default(),
    );
    let loader = TemplateLoader::new(Arc::new(TemplateCache::new()), h.options.clone());
    let set = loader.load_all(&[flow]);
    assert!(set.rejected.is_empty());

    let summary = scan(&h, set.into_executers(&h.options), &["http://example.com"]).await;
    assert_eq!(summary.pairs_matched, 1);

    let requests = h.transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].method, "POST");
    assert_eq!(requests[1].body.as_deref(), Some("token=XYZ"));

    let ids: Vec<_> = h.sink.results().into_iter().map(|r| r.template_id).collect();
    assert_eq!(ids, vec!["parent", "child"]);
}

#[tokio::test]
async fn test_workflow_branches_and_sibling_isolation() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "detect.yaml",
        r#"
id: detect
http:
  - path: ["{{BaseURL}}/"]
    matchers:
      - type: word
        name: wordpress
        words: ["wp-content"]
      - type: word
        name: joomla
        words: ["Joomla!"]
"#,
    );
    write(
        dir.path(),
        "secret.yaml",
        r#"
id: secret
http:
  - path: ["{{BaseURL}}/secret"]
    extractors:
      - type: regex
        name: secret
        internal: true
        regex: ["s3cr3t"]
"#,
    );
    write(
        dir.path(),
        "uses-secret.yaml",
        r#"
id: uses-secret
http:
  - path: ["{{BaseURL}}/use/{{secret}}"]
    matchers:
      - type: status
        status: [200]
"#,
    );
    write(
        dir.path(),
        "joomla-admin.yaml",
        r#"
id: joomla-admin
http:
  - path: ["{{BaseURL}}/administrator"]
    matchers:
      - type: status
        status: [200]
"#,
    );
    let flow = write(
        dir.path(),
        "cms.yaml",
        r#"
id: cms
workflows:
  - template: detect.yaml
    matchers:
      - name: wordpress
        subtemplates:
          - template: secret.yaml
          - template: uses-secret.yaml
      - name: joomla
        subtemplates:
          - template: joomla-admin.yaml
"#,
    );

    let h = harness(
        CannedTransport::with_body(200, "<link href=/wp-content/x.css>")
            .route("/secret", 200, "the s3cr3t"),
        ScanOptions::default(),
    );
    let loader = TemplateLoader::new(Arc::new(TemplateCache::new()), h.options.clone());
    let Loaded::Workflow(workflow) = loader.load(&flow).unwrap() else {
        panic!("expected a workflow");
    };

    let executer = WorkflowExecuter::new(workflow, h.options.clone());
    let outcome = executer
        .execute_with_context(&ScanContext::new(ScanTarget::new("http://example.com")))
        .await
        .unwrap();
    assert!(outcome.matched);

    let urls: Vec<_> = h.transport.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(urls, vec!["http://example.com/", "http://example.com/secret"]);
}

struct FailingExecuter;

#[async_trait]
impl TemplateExecuter for FailingExecuter {
    fn id(&self) -> &str {
        "failing"
    }

    fn requests(&self) -> usize {
        1
    }

    async fn execute_with_context(
        &self,
        _context: &ScanContext,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        Err(ExecutionError::InternalError {
            message: "boom".to_string(),
        })
    }
}

#[tokio::test]
async fn test_failing_workflow_node_is_isolated() {
    let h = harness(CannedTransport::with_body(200, "ok"), ScanOptions::default());
    let probe = template(&status_template("probe", 200), &h.options);

    let child = WorkflowNode {
        label: "never-runs".to_string(),
        target: NodeTarget::Template(Arc::new(crate::engine::Executer::new(&probe, h.options.clone()))),
        condition: None,
        branches: Vec::new(),
    };
    let workflow = Workflow {
        id: "isolation".to_string(),
        nodes: vec![
            WorkflowNode {
                label: "failing.yaml".to_string(),
                target: NodeTarget::Template(Arc::new(FailingExecuter)),
                condition: None,
                branches: vec![crate::template::workflow::Branch {
                    trigger: crate::template::workflow::BranchTrigger::Always,
                    nodes: vec![child],
                }],
            },
            WorkflowNode {
                label: "probe.yaml".to_string(),
                target: NodeTarget::Template(Arc::new(crate::engine::Executer::new(&probe, h.options.clone()))),
                condition: None,
                branches: Vec::new(),
            },
        ],
    };

    let executer = WorkflowExecuter::new(Arc::new(workflow), h.options.clone());
    let outcome = executer
        .execute_with_context(&ScanContext::new(ScanTarget::new("http://example.com")))
        .await
        .unwrap();

    assert!(outcome.matched);
    assert_eq!(h.transport.call_count(), 1);
    let failures = h.sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].node.as_deref(), Some("failing.yaml"));
    assert_eq!(h.sink.results().len(), 1);
}

#[tokio::test]
async fn test_host_at_threshold_is_skipped_without_requests() {
    let h = harness(
        CannedTransport::with_body(200, "ok"),
        ScanOptions {
            max_host_error: 2,
            ..ScanOptions::default()
        },
    );
    let cache = h.options.host_errors.clone().unwrap();
    let down = ScanTarget::new("http://down.test");
    let refused = crate::errors::TransportError::ConnectionRefused("down.test".to_string());
    cache.mark_failed(&down, &refused);
    cache.mark_failed(&down, &refused);

    let templates = vec![
        template(&status_template("one", 200), &h.options),
        template(&status_template("two", 201), &h.options),
    ];
    let options = h.options.clone();
    let summary = scan(
        &h,
        crate::engine::cluster_templates(
            &templates,
            &ExecuterOptions {
                options: Arc::new(ScanOptions {
                    disable_clustering: true,
                    ..(*options.options).clone()
                }),
                ..options
            },
        ),
        &["http://down.test", "http://up.test"],
    )
    .await;

    assert_eq!(summary.pairs_skipped, 2);
    assert_eq!(summary.pairs_executed, 2);
    assert_eq!(cache.error_count(&down), 2);
    let urls: Vec<_> = h.transport.requests().into_iter().map(|r| r.url).collect();
    assert!(urls.iter().all(|url| url.starts_with("http://up.test")));
}

#[tokio::test]
async fn test_transport_failures_trip_the_breaker() {
    let observer = Arc::new(RecordingObserver::default());
    let mut h = harness(
        CannedTransport::failing(),
        ScanOptions {
            max_host_error: 2,
            concurrency: 1,
            disable_clustering: true,
            ..ScanOptions::default()
        },
    );
    h.options = h.options.clone().observer(observer.clone());
    let templates: Vec<_> = (0..4)
        .map(|i| template(&status_template(&format!("t{i}"), 200), &h.options))
        .collect();

    let summary = scan(&h, cluster_templates(&templates, &h.options), &["http://down.test"]).await;

    assert_eq!(h.transport.call_count(), 2);
    assert_eq!(summary.pairs_executed + summary.pairs_skipped, 4);
    assert_eq!(summary.pairs_failed, 0);
    let attempts = observer.attempts();
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|a| !a.succeeded()));
}

#[tokio::test]
async fn test_cancellation_stops_new_pairs_and_keeps_results() {
    let cancel = CancellationToken::new();
    let h = harness(
        CannedTransport::with_body(200, "ok").cancel_on_send(cancel.clone()),
        ScanOptions {
            concurrency: 1,
            ..ScanOptions::default()
        },
    );
    let probe = template(&status_template("probe", 200), &h.options);

    let summary = Engine::new(h.options.clone())
        .execute(
            cluster_templates(&[probe], &h.options),
            Box::new(ListInput::new(["http://a.test", "http://b.test", "http://c.test"])),
            cancel,
        )
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.pairs_executed, 1);
    assert_eq!(h.transport.call_count(), 1);
    assert_eq!(h.sink.results().len(), 1);
}

#[tokio::test]
async fn test_out_of_band_interaction_produces_late_result() {
    let server = Arc::new(FakeInteractionServer::default());
    let sink = Arc::new(MemorySink::new());
    let transport = Arc::new(CannedTransport::with_body(200, "queued"));
    let scan = ScanOptions {
        interactions_cache_size: 16,
        ..ScanOptions::default()
    };
    let options = ExecuterOptions::with_transport(scan, sink.clone(), transport.clone())
        .interaction_client(server.clone());
    let correlator = options.interactions.clone().unwrap();

    let ssrf = template(
        r#"
id: blind-ssrf
http:
  - path: ["{{BaseURL}}/fetch?url=http://{{interactsh-url}}"]
    matchers:
      - type: word
        part: interactsh_protocol
        words: ["dns"]
"#,
        &options,
    );
    assert!(ssrf.requests[0].cluster_key().is_none());

    let executer = crate::engine::Executer::new(&ssrf, options.clone());
    let outcome = executer
        .execute_with_context(&ScanContext::new(ScanTarget::new("http://example.com")))
        .await
        .unwrap();
    assert!(!outcome.matched);
    assert!(sink.results().is_empty());
    assert_eq!(correlator.pending(), 1);

    let registered = server.registered();
    assert_eq!(registered.len(), 1);
    let sent = &transport.requests()[0].url;
    assert!(sent.contains(&format!("{}.oast.test", registered[0])));

    let written = correlator
        .on_interaction(&Interaction {
            protocol: "dns".to_string(),
            unique_id: registered[0].clone(),
            raw_request: String::new(),
            raw_response: String::new(),
            remote_address: "192.0.2.10".to_string(),
            timestamp: Utc::now(),
        })
        .unwrap();
    assert_eq!(written, 1);

    let results = sink.results();
    assert_eq!(results[0].template_id, "blind-ssrf");
    assert_eq!(results[0].interaction.as_ref().unwrap()["protocol"], "dns");
}

#[tokio::test]
async fn test_in_flight_pairs_never_exceed_concurrency() {
    let transport = Arc::new(SlowTransport::new(
        Duration::from_millis(30),
        Duration::ZERO,
    ));
    let sink = Arc::new(MemorySink::new());
    let options = ExecuterOptions::with_transport(
        ScanOptions {
            concurrency: 2,
            ..ScanOptions::default()
        },
        sink.clone(),
        transport.clone(),
    );
    let status_check = template(&status_template("status-ok", 200), &options);
    let targets: Vec<String> = (0..6).map(|i| format!("http://host{}.test", i)).collect();

    let summary = Engine::new(options.clone())
        .execute(
            cluster_templates(&[status_check], &options),
            Box::new(ListInput::new(targets.iter().map(String::as_str))),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.pairs_executed, 6);
    assert_eq!(sink.results().len(), 6);
    assert_eq!(transport.call_count(), 6);
    assert_eq!(transport.peak(), 2);
}

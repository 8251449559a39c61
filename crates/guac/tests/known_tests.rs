//! Known-query tool tests against a scripted GraphQL backend.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use analyst_guac::tools::known::{known_query, KnownQueryInput};
use analyst_guac::{GuacClient, GuacError, ToolRegistry};

type Responder = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

async fn spawn_backend(responder: Responder) -> GuacClient {
    let app = Router::new().route(
        "/query",
        post(move |Json(body): Json<Value>| {
            let responder = Arc::clone(&responder);
            async move { Json(responder(&body)) }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    GuacClient::new(format!("http://{addr}/query"), Duration::from_secs(5)).unwrap()
}

fn input(subject_type: &str, subject: &str) -> KnownQueryInput {
    serde_json::from_value(json!({"subjectType": subject_type, "subject": subject})).unwrap()
}

fn log4j_tree() -> Value {
    json!({
        "id": "1",
        "type": "maven",
        "namespaces": [{
            "id": "2",
            "namespace": "org.apache.logging.log4j",
            "names": [{
                "id": "3",
                "name": "log4j-core",
                "versions": [{
                    "id": "4",
                    "version": "2.8.1",
                    "qualifiers": [],
                    "subpath": ""
                }]
            }]
        }]
    })
}

/// Backend for the package flow: the name node has hasSrcAt/badLink
/// neighbors, the version node has no SBOM/SLSA of its own but exposes an
/// occurrence whose artifact carries them.
fn package_responder(body: &Value) -> Value {
    let query = body["query"].as_str().unwrap_or_default();
    let variables = &body["variables"];

    if query.contains("packages(") {
        return json!({"data": {"packages": [log4j_tree()]}});
    }
    if query.contains("artifacts(") {
        return json!({"data": {"artifacts": [
            {"id": "30", "algorithm": "sha256", "digest": "abc"}
        ]}});
    }

    assert!(query.contains("neighbors("), "unexpected query: {query}");
    match variables["node"].as_str().unwrap() {
        "3" => json!({"data": {"neighbors": [
            {
                "__typename": "HasSourceAt",
                "id": "10",
                "source": {
                    "id": "50",
                    "type": "git",
                    "namespaces": [{
                        "id": "51",
                        "namespace": "github.com/apache",
                        "names": [{"id": "52", "name": "logging-log4j2", "tag": null, "commit": null}]
                    }]
                },
                "package": log4j_tree()
            },
            {"__typename": "CertifyBad", "id": "11", "justification": "end of life"}
        ]}}),
        "4" => json!({"data": {"neighbors": [
            {
                "__typename": "CertifyVuln",
                "id": "20",
                "vulnerability": {
                    "type": "osv",
                    "vulnerabilityIDs": [{"vulnerabilityID": "cve-2021-44228"}]
                }
            },
            {
                "__typename": "IsOccurrence",
                "id": "21",
                "subject": log4j_subject(),
                "artifact": {"id": "30", "algorithm": "sha256", "digest": "abc"}
            },
            {
                "__typename": "CertifyLegal",
                "id": "22",
                "declaredLicense": "Apache-2.0",
                "discoveredLicense": "Apache-2.0",
                "origin": "clearlydefined"
            },
            {"__typename": "CertifyVEXStatement", "id": "23", "status": "NOT_AFFECTED"},
            {"__typename": "CertifyGood", "id": "24", "justification": "vetted"}
        ]}}),
        "30" => {
            let using_only = variables["usingOnly"].as_array().unwrap();
            if using_only.contains(&json!("ARTIFACT_HAS_SBOM")) {
                json!({"data": {"neighbors": [
                    {"__typename": "HasSBOM", "id": "31", "downloadLocation": "s3://sboms/log4j"}
                ]}})
            } else {
                json!({"data": {"neighbors": [
                    {"__typename": "HasSLSA", "id": "32", "slsa": {"origin": "https://builder.example/att"}}
                ]}})
            }
        }
        node => panic!("unexpected neighbors node {node}"),
    }
}

fn log4j_subject() -> Value {
    let mut tree = log4j_tree();
    tree["__typename"] = json!("Package");
    tree
}

#[tokio::test]
async fn test_package_known_query_sections() {
    let client = spawn_backend(Arc::new(package_responder)).await;

    let result = known_query(
        &client,
        input("package", "pkg:maven/org.apache.logging.log4j/log4j-core@2.8.1"),
    )
    .await
    .unwrap();

    assert_eq!(result.sections.len(), 2);

    let name_section = &result.sections[0];
    assert_eq!(name_section.title, "Package Name Nodes");
    assert_eq!(name_section.rows.len(), 2);
    assert_eq!(name_section.rows[0].node_type, "hasSrcAt");
    assert_eq!(
        name_section.rows[0].extra_info,
        "Source: git+https://github.com/apache/logging-log4j2"
    );
    assert_eq!(name_section.rows[1].node_type, "badLink");
    assert_eq!(name_section.rows[1].extra_info, "justification: end of life");

    let version_section = &result.sections[1];
    assert_eq!(version_section.title, "Package Version Nodes");

    let kinds: Vec<&str> = version_section
        .rows
        .iter()
        .map(|row| row.node_type.as_str())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "certifyVuln",
            "hasSBOM",
            "occurrence",
            "certifyLegal",
            "hasSLSA",
            "vexLink",
            "goodLink"
        ]
    );

    assert_eq!(
        version_section.rows[0].extra_info,
        "vulnerability ID: cve-2021-44228"
    );
    // No direct SBOM/SLSA: both resolved through the occurrence's artifact.
    assert_eq!(version_section.rows[1].node_id, "31");
    assert_eq!(
        version_section.rows[1].extra_info,
        "SBOM Download Location: s3://sboms/log4j"
    );
    assert_eq!(
        version_section.rows[2].extra_info,
        "Occurrence for Artifact: sha256:abc"
    );
    assert_eq!(
        version_section.rows[3].extra_info,
        "Declared License: Apache-2.0, Discovered License: Apache-2.0, Origin: clearlydefined"
    );
    assert_eq!(version_section.rows[4].node_id, "32");
    assert_eq!(version_section.rows[5].extra_info, "Vex Status: NOT_AFFECTED");
}

#[tokio::test]
async fn test_package_known_query_visualizer_path() {
    let client = spawn_backend(Arc::new(package_responder)).await;

    let result = known_query(
        &client,
        input("package", "pkg:maven/org.apache.logging.log4j/log4j-core@2.8.1"),
    )
    .await
    .unwrap();

    // Name chain first, then its neighbors, then the version chain (shared
    // IDs deduped), then the version neighbors.
    assert_eq!(
        result.visualizer_url,
        "http://localhost:3000/?path=3,2,1,10,11,4,20,21,22,23,24"
    );

    let path = result
        .visualizer_url
        .strip_prefix("http://localhost:3000/?path=")
        .unwrap();
    let ids: Vec<&str> = path.split(',').collect();
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(ids.len(), unique.len(), "path must not repeat node IDs");
}

#[tokio::test]
async fn test_package_known_query_requires_single_match() {
    let client = spawn_backend(Arc::new(|body: &Value| {
        let query = body["query"].as_str().unwrap_or_default();
        assert!(query.contains("packages("));
        json!({"data": {"packages": [log4j_tree(), log4j_tree()]}})
    }))
    .await;

    let err = known_query(&client, input("package", "pkg:maven/log4j-core@2.8.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, GuacError::DataShape(_)));
    assert_eq!(err.to_string(), "failed to locate package based on purl");
}

#[tokio::test]
async fn test_package_known_query_bad_purl() {
    let client = spawn_backend(Arc::new(|_: &Value| json!({"data": {}}))).await;

    let err = known_query(&client, input("package", "not-a-purl"))
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("failed to parse PURL:"));
}

#[tokio::test]
async fn test_source_known_query() {
    let client = spawn_backend(Arc::new(|body: &Value| {
        let query = body["query"].as_str().unwrap_or_default();
        if query.contains("sources(") {
            return json!({"data": {"sources": [{
                "id": "50",
                "type": "git",
                "namespaces": [{
                    "id": "51",
                    "namespace": "github.com/guacsec",
                    "names": [{"id": "52", "name": "guac", "tag": null, "commit": null}]
                }]
            }]}});
        }
        assert!(query.contains("neighbors("));
        json!({"data": {"neighbors": [
            {"__typename": "CertifyScorecard", "id": "60", "scorecard": {"aggregateScore": 7.5}},
            {
                "__typename": "HasSourceAt",
                "id": "61",
                "source": {"id": "50", "type": "git", "namespaces": []},
                "package": log4j_tree()
            }
        ]}})
    }))
    .await;

    let result = known_query(&client, input("source", "git+https://github.com/guacsec/guac"))
        .await
        .unwrap();

    assert_eq!(result.sections.len(), 1);
    let section = &result.sections[0];
    assert_eq!(section.title, "Source Nodes");

    // Kind order: hasSrcAt before scorecard.
    assert_eq!(section.rows[0].node_type, "hasSrcAt");
    assert_eq!(
        section.rows[0].extra_info,
        "Source for Package: pkg:maven/org.apache.logging.log4j/log4j-core"
    );
    assert_eq!(section.rows[1].node_type, "scorecard");
    assert_eq!(section.rows[1].extra_info, "Overall Score: 7.500000");

    assert_eq!(
        result.visualizer_url,
        "http://localhost:3000/?path=52,51,50,60,61"
    );
}

#[tokio::test]
async fn test_source_known_query_requires_single_match() {
    let client =
        spawn_backend(Arc::new(|_: &Value| json!({"data": {"sources": []}}))).await;

    let err = known_query(&client, input("source", "git+https://github.com/guacsec/guac"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "failed to locate source based on input");
}

#[tokio::test]
async fn test_artifact_known_query() {
    let client = spawn_backend(Arc::new(|body: &Value| {
        let query = body["query"].as_str().unwrap_or_default();
        if query.contains("artifacts(") {
            // Subject components must arrive lowercased.
            assert_eq!(body["variables"]["filter"]["algorithm"], "sha256");
            assert_eq!(body["variables"]["filter"]["digest"], "abc123");
            return json!({"data": {"artifacts": [
                {"id": "70", "algorithm": "sha256", "digest": "abc123"}
            ]}});
        }
        assert!(query.contains("neighbors("));
        json!({"data": {"neighbors": [
            {"__typename": "HashEqual", "id": "80"},
            {
                "__typename": "IsOccurrence",
                "id": "81",
                "subject": log4j_subject(),
                "artifact": {"id": "70", "algorithm": "sha256", "digest": "abc123"}
            },
            {"__typename": "HasSBOM", "id": "82", "downloadLocation": "s3://sboms/log4j"}
        ]}})
    }))
    .await;

    let result = known_query(&client, input("artifact", "SHA256:ABC123"))
        .await
        .unwrap();

    let section = &result.sections[0];
    assert_eq!(section.title, "Artifact Nodes");
    assert_eq!(section.rows[0].node_type, "hashEqual");
    assert_eq!(section.rows[0].extra_info, "");
    assert_eq!(section.rows[1].node_type, "occurrence");
    assert_eq!(
        section.rows[1].extra_info,
        "Occurrence for Package: pkg:maven/org.apache.logging.log4j/log4j-core@2.8.1"
    );
    assert_eq!(section.rows[2].node_type, "hasSBOM");

    assert_eq!(
        result.visualizer_url,
        "http://localhost:3000/?path=70,80,81,82"
    );
}

#[tokio::test]
async fn test_artifact_known_query_malformed_subject() {
    let client = spawn_backend(Arc::new(|_: &Value| json!({"data": {}}))).await;

    let err = known_query(&client, input("artifact", "sha256"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "artifact must be in algorithm:digest form");
}

#[tokio::test]
async fn test_invalid_subject_type() {
    let client = spawn_backend(Arc::new(|_: &Value| json!({"data": {}}))).await;

    let err = known_query(&client, input("container", "whatever"))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid subjectType: must be package, source, or artifact"
    );
}

#[tokio::test]
async fn test_known_query_through_dispatcher() {
    let client = spawn_backend(Arc::new(package_responder)).await;
    let registry = ToolRegistry::new();

    let text = registry
        .dispatch(
            &client,
            "KnownQuery",
            &json!({
                "subjectType": "package",
                "subject": "pkg:maven/org.apache.logging.log4j/log4j-core@2.8.1"
            }),
        )
        .await
        .unwrap();

    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["sections"][0]["title"], "Package Name Nodes");
    assert_eq!(parsed["sections"][1]["title"], "Package Version Nodes");
    assert_eq!(parsed["sections"][0]["rows"][0]["nodeType"], "hasSrcAt");
    assert!(parsed["visualizerUrl"]
        .as_str()
        .unwrap()
        .starts_with("http://localhost:3000/?path="));
}

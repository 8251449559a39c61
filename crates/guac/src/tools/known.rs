//! Composite tool reporting everything known about a package, source, or
//! artifact by walking its graph neighbors, kind by kind.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::model::{
    self, ArtifactSpec, CertifyBad, CertifyGood, CertifyLegal, CertifyScorecard,
    CertifyVexStatement, CertifyVuln, Edge, HasSbom, HasSlsa, HasSourceAt, HashEqual, IsOccurrence,
    Neighbor, OccurrenceSubject, PkgEqual,
};
use crate::subject;
use crate::{GuacClient, GuacError, Result};

pub(crate) const INPUT_TYPE_NAME: &str = "KnownQueryInput";

const VISUALIZER_BASE: &str = "http://localhost:3000/?path=";
const NO_VULN_TYPE: &str = "noVuln";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownQueryInput {
    pub subject_type: String,
    pub subject: String,
}

pub(crate) fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "subjectType": {
                "type": "string",
                "description": "one of: package, source, artifact"
            },
            "subject": {
                "type": "string",
                "description": "for package: purl, for source: vcs_tool+transport, for artifact: algorithm:digest"
            }
        },
        "required": ["subjectType", "subject"]
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownResult {
    pub sections: Vec<KnownSection>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub visualizer_url: String,
}

/// A table-like section of results.
#[derive(Debug, Clone, Serialize)]
pub struct KnownSection {
    pub title: String,
    pub rows: Vec<KnownRow>,
    /// Neighbor node IDs contributing to the visualizer path.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownRow {
    pub node_type: String,
    pub node_id: String,
    pub extra_info: String,
}

impl KnownRow {
    fn new(kind: NodeKind, node_id: impl Into<String>, extra_info: impl Into<String>) -> Self {
        Self {
            node_type: kind.label().to_string(),
            node_id: node_id.into(),
            extra_info: extra_info.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    HashEqual,
    Scorecard,
    Occurrence,
    HasSrcAt,
    HasSbom,
    HasSlsa,
    CertifyVuln,
    CertifyLegal,
    VexLink,
    BadLink,
    GoodLink,
    PkgEqual,
}

impl NodeKind {
    fn label(self) -> &'static str {
        match self {
            NodeKind::HashEqual => "hashEqual",
            NodeKind::Scorecard => "scorecard",
            NodeKind::Occurrence => "occurrence",
            NodeKind::HasSrcAt => "hasSrcAt",
            NodeKind::HasSbom => "hasSBOM",
            NodeKind::HasSlsa => "hasSLSA",
            NodeKind::CertifyVuln => "certifyVuln",
            NodeKind::CertifyLegal => "certifyLegal",
            NodeKind::VexLink => "vexLink",
            NodeKind::BadLink => "badLink",
            NodeKind::GoodLink => "goodLink",
            NodeKind::PkgEqual => "pkgEqual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubjectKind {
    Package,
    Source,
    Artifact,
}

pub async fn known_query(client: &GuacClient, input: KnownQueryInput) -> Result<KnownResult> {
    match input.subject_type.as_str() {
        "package" => known_query_package(client, &input.subject).await,
        "source" => known_query_source(client, &input.subject).await,
        "artifact" => known_query_artifact(client, &input.subject).await,
        _ => Err(GuacError::DataShape(
            "invalid subjectType: must be package, source, or artifact".to_string(),
        )),
    }
}

async fn known_query_package(client: &GuacClient, purl: &str) -> Result<KnownResult> {
    let filter = subject::purl_to_pkg_spec(purl)
        .map_err(|err| GuacError::DataShape(format!("failed to parse PURL: {err}")))?;

    let response = model::packages(client, &filter).await?;
    if response.packages.len() != 1 {
        return Err(GuacError::DataShape(
            "failed to locate package based on purl".to_string(),
        ));
    }

    let package = &response.packages[0];
    let namespace = package.namespaces.first().ok_or_else(missing_package)?;
    let name_node = namespace.names.first().ok_or_else(missing_package)?;
    let version_node = name_node.versions.first().ok_or_else(missing_package)?;

    // Attestations hang off the name node and the version node separately.
    let (name_neighbors, name_path) = query_known_neighbors(client, &name_node.id).await?;
    let mut name_section = KnownSection {
        title: "Package Name Nodes".to_string(),
        rows: Vec::new(),
        edges: name_path.clone(),
    };
    for kind in [NodeKind::HasSrcAt, NodeKind::BadLink, NodeKind::GoodLink] {
        name_section
            .rows
            .extend(rows_for_kind(client, &name_neighbors, kind, SubjectKind::Package).await);
    }

    let mut name_path_full = vec![
        name_node.id.clone(),
        namespace.id.clone(),
        package.id.clone(),
    ];
    name_path_full.extend(name_path);

    let (version_neighbors, version_path) = query_known_neighbors(client, &version_node.id).await?;
    let mut version_section = KnownSection {
        title: "Package Version Nodes".to_string(),
        rows: Vec::new(),
        edges: version_path.clone(),
    };
    for kind in [
        NodeKind::CertifyVuln,
        NodeKind::HasSbom,
        NodeKind::Occurrence,
        NodeKind::CertifyLegal,
        NodeKind::HasSlsa,
        NodeKind::VexLink,
        NodeKind::PkgEqual,
        NodeKind::BadLink,
        NodeKind::GoodLink,
    ] {
        version_section
            .rows
            .extend(rows_for_kind(client, &version_neighbors, kind, SubjectKind::Package).await);
    }

    let mut version_path_full = vec![
        version_node.id.clone(),
        name_node.id.clone(),
        namespace.id.clone(),
        package.id.clone(),
    ];
    version_path_full.extend(version_path);

    name_path_full.extend(version_path_full);
    Ok(KnownResult {
        sections: vec![name_section, version_section],
        visualizer_url: visualizer_url(name_path_full),
    })
}

fn missing_package() -> GuacError {
    GuacError::DataShape("failed to locate package based on purl".to_string())
}

async fn known_query_source(client: &GuacClient, locator: &str) -> Result<KnownResult> {
    let filter = subject::vcs_to_source_spec(locator)
        .map_err(|err| GuacError::DataShape(format!("failed to parse source: {err}")))?;

    let response = model::sources(client, &filter).await?;
    if response.sources.len() != 1 {
        return Err(GuacError::DataShape(
            "failed to locate source based on input".to_string(),
        ));
    }

    let source = &response.sources[0];
    let namespace = source.namespaces.first().ok_or_else(missing_source)?;
    let name_node = namespace.names.first().ok_or_else(missing_source)?;

    let (neighbors, path) = query_known_neighbors(client, &name_node.id).await?;
    let mut section = KnownSection {
        title: "Source Nodes".to_string(),
        rows: Vec::new(),
        edges: path.clone(),
    };
    for kind in [
        NodeKind::HasSrcAt,
        NodeKind::Occurrence,
        NodeKind::Scorecard,
        NodeKind::BadLink,
        NodeKind::GoodLink,
    ] {
        section
            .rows
            .extend(rows_for_kind(client, &neighbors, kind, SubjectKind::Source).await);
    }

    let mut full_path = vec![
        name_node.id.clone(),
        namespace.id.clone(),
        source.id.clone(),
    ];
    full_path.extend(path);

    Ok(KnownResult {
        sections: vec![section],
        visualizer_url: visualizer_url(full_path),
    })
}

fn missing_source() -> GuacError {
    GuacError::DataShape("failed to locate source based on input".to_string())
}

async fn known_query_artifact(client: &GuacClient, subject: &str) -> Result<KnownResult> {
    let mut parts = subject.splitn(2, ':');
    let (algorithm, digest) = match (parts.next(), parts.next()) {
        (Some(algorithm), Some(digest)) if !algorithm.is_empty() && !digest.is_empty() => {
            (algorithm.to_lowercase(), digest.to_lowercase())
        }
        _ => {
            return Err(GuacError::DataShape(
                "artifact must be in algorithm:digest form".to_string(),
            ))
        }
    };

    let filter = ArtifactSpec {
        algorithm: Some(algorithm),
        digest: Some(digest),
        ..Default::default()
    };
    let response = model::artifacts(client, &filter).await?;
    if response.artifacts.len() != 1 {
        return Err(GuacError::DataShape(
            "failed to locate artifact based on (algorithm:digest)".to_string(),
        ));
    }

    let artifact = &response.artifacts[0];
    let (neighbors, path) = query_known_neighbors(client, &artifact.id).await?;
    let mut section = KnownSection {
        title: "Artifact Nodes".to_string(),
        rows: Vec::new(),
        edges: path.clone(),
    };
    for kind in [
        NodeKind::HashEqual,
        NodeKind::Occurrence,
        NodeKind::HasSbom,
        NodeKind::HasSlsa,
        NodeKind::VexLink,
        NodeKind::BadLink,
        NodeKind::GoodLink,
    ] {
        section
            .rows
            .extend(rows_for_kind(client, &neighbors, kind, SubjectKind::Artifact).await);
    }

    let mut full_path = vec![artifact.id.clone()];
    full_path.extend(path);

    Ok(KnownResult {
        sections: vec![section],
        visualizer_url: visualizer_url(full_path),
    })
}

/// Neighbors of one node, bucketed by kind, plus their IDs in discovery
/// order.
#[derive(Debug, Default)]
struct CollectedNeighbors {
    hash_equals: Vec<HashEqual>,
    scorecards: Vec<CertifyScorecard>,
    occurrences: Vec<IsOccurrence>,
    has_src_at: Vec<HasSourceAt>,
    has_sboms: Vec<HasSbom>,
    has_slsas: Vec<HasSlsa>,
    certify_vulns: Vec<CertifyVuln>,
    certify_legals: Vec<CertifyLegal>,
    vex_links: Vec<CertifyVexStatement>,
    bad_links: Vec<CertifyBad>,
    good_links: Vec<CertifyGood>,
    pkg_equals: Vec<PkgEqual>,
}

async fn query_known_neighbors(
    client: &GuacClient,
    node_id: &str,
) -> Result<(CollectedNeighbors, Vec<String>)> {
    let mut collected = CollectedNeighbors::default();
    let mut path = Vec::new();

    for neighbor in model::neighbors(client, node_id, &[]).await? {
        path.push(neighbor.id().to_string());
        match neighbor {
            Neighbor::CertifyVuln(n) => collected.certify_vulns.push(n),
            Neighbor::CertifyBad(n) => collected.bad_links.push(n),
            Neighbor::CertifyGood(n) => collected.good_links.push(n),
            Neighbor::CertifyScorecard(n) => collected.scorecards.push(n),
            Neighbor::CertifyVex(n) => collected.vex_links.push(n),
            Neighbor::HasSbom(n) => collected.has_sboms.push(n),
            Neighbor::HasSlsa(n) => collected.has_slsas.push(n),
            Neighbor::HasSourceAt(n) => collected.has_src_at.push(n),
            Neighbor::HashEqual(n) => collected.hash_equals.push(n),
            Neighbor::IsOccurrence(n) => collected.occurrences.push(n),
            Neighbor::PkgEqual(n) => collected.pkg_equals.push(n),
            Neighbor::CertifyLegal(n) => collected.certify_legals.push(n),
        }
    }

    Ok((collected, path))
}

async fn rows_for_kind(
    client: &GuacClient,
    collected: &CollectedNeighbors,
    kind: NodeKind,
    subject: SubjectKind,
) -> Vec<KnownRow> {
    let mut rows = Vec::new();
    match kind {
        NodeKind::CertifyVuln => {
            for vuln in &collected.certify_vulns {
                if vuln.vulnerability.vulnerability_type != NO_VULN_TYPE {
                    for vuln_id in &vuln.vulnerability.vulnerability_ids {
                        rows.push(KnownRow::new(
                            kind,
                            &vuln.id,
                            format!("vulnerability ID: {}", vuln_id.vulnerability_id),
                        ));
                    }
                } else {
                    rows.push(KnownRow::new(
                        kind,
                        &vuln.id,
                        format!("vulnerability ID: {NO_VULN_TYPE}"),
                    ));
                }
            }
        }
        NodeKind::BadLink => {
            for bad in &collected.bad_links {
                rows.push(KnownRow::new(
                    kind,
                    &bad.id,
                    format!("justification: {}", bad.justification),
                ));
            }
        }
        NodeKind::GoodLink => {
            for good in &collected.good_links {
                rows.push(KnownRow::new(
                    kind,
                    &good.id,
                    format!("justification: {}", good.justification),
                ));
            }
        }
        NodeKind::Scorecard => {
            for scorecard in &collected.scorecards {
                rows.push(KnownRow::new(
                    kind,
                    &scorecard.id,
                    format!("Overall Score: {:.6}", scorecard.scorecard.aggregate_score),
                ));
            }
        }
        NodeKind::VexLink => {
            for vex in &collected.vex_links {
                rows.push(KnownRow::new(
                    kind,
                    &vex.id,
                    format!("Vex Status: {}", vex.status),
                ));
            }
        }
        NodeKind::HasSbom => {
            if !collected.has_sboms.is_empty() {
                for sbom in &collected.has_sboms {
                    rows.push(KnownRow::new(
                        kind,
                        &sbom.id,
                        format!("SBOM Download Location: {}", sbom.download_location),
                    ));
                }
            } else {
                // SBOMs may be attached to the equivalent artifact instead.
                for occurrence in &collected.occurrences {
                    match associated_artifact_neighbors(client, occurrence, Edge::ArtifactHasSbom)
                        .await
                    {
                        Ok(neighbors) => {
                            for neighbor in neighbors {
                                if let Neighbor::HasSbom(sbom) = neighbor {
                                    rows.push(KnownRow::new(
                                        kind,
                                        &sbom.id,
                                        format!(
                                            "SBOM Download Location: {}",
                                            sbom.download_location
                                        ),
                                    ));
                                }
                            }
                        }
                        Err(err) => debug!(error = %err, "error querying neighbors"),
                    }
                }
            }
        }
        NodeKind::HasSlsa => {
            if !collected.has_slsas.is_empty() {
                for slsa in &collected.has_slsas {
                    rows.push(KnownRow::new(
                        kind,
                        &slsa.id,
                        format!("SLSA Attestation Location: {}", slsa.slsa.origin),
                    ));
                }
            } else {
                for occurrence in &collected.occurrences {
                    match associated_artifact_neighbors(client, occurrence, Edge::ArtifactHasSlsa)
                        .await
                    {
                        Ok(neighbors) => {
                            for neighbor in neighbors {
                                if let Neighbor::HasSlsa(slsa) = neighbor {
                                    rows.push(KnownRow::new(
                                        kind,
                                        &slsa.id,
                                        format!("SLSA Attestation Location: {}", slsa.slsa.origin),
                                    ));
                                }
                            }
                        }
                        Err(err) => debug!(error = %err, "error querying neighbors"),
                    }
                }
            }
        }
        NodeKind::HasSrcAt => {
            for src in &collected.has_src_at {
                if subject == SubjectKind::Package {
                    let Some(namespace) = src.source.namespaces.first() else {
                        continue;
                    };
                    let Some(name) = namespace.names.first() else {
                        continue;
                    };
                    rows.push(KnownRow::new(
                        kind,
                        &src.id,
                        format!(
                            "Source: {}+{}/{}",
                            src.source.source_type,
                            with_https_prefix(&namespace.namespace),
                            name.name
                        ),
                    ));
                } else {
                    let Some(namespace) = src.package.namespaces.first() else {
                        continue;
                    };
                    let Some(name) = namespace.names.first() else {
                        continue;
                    };
                    let purl = subject::pkg_to_purl(
                        &src.package.package_type,
                        &namespace.namespace,
                        &name.name,
                        "",
                    );
                    rows.push(KnownRow::new(
                        kind,
                        &src.id,
                        format!("Source for Package: {purl}"),
                    ));
                }
            }
        }
        NodeKind::HashEqual => {
            for hash in &collected.hash_equals {
                rows.push(KnownRow::new(kind, &hash.id, ""));
            }
        }
        NodeKind::Occurrence => {
            for occurrence in &collected.occurrences {
                if subject == SubjectKind::Artifact {
                    match &occurrence.subject {
                        OccurrenceSubject::Package(package) => {
                            let Some(namespace) = package.namespaces.first() else {
                                continue;
                            };
                            let Some(name) = namespace.names.first() else {
                                continue;
                            };
                            let Some(version) = name.versions.first() else {
                                continue;
                            };
                            let purl = subject::pkg_to_purl(
                                &package.package_type,
                                &namespace.namespace,
                                &name.name,
                                &version.version,
                            );
                            rows.push(KnownRow::new(
                                kind,
                                &occurrence.id,
                                format!("Occurrence for Package: {purl}"),
                            ));
                        }
                        OccurrenceSubject::Source(source) => {
                            let Some(namespace) = source.namespaces.first() else {
                                continue;
                            };
                            let Some(name) = namespace.names.first() else {
                                continue;
                            };
                            rows.push(KnownRow::new(
                                kind,
                                &occurrence.id,
                                format!(
                                    "Occurrence for Source: {}+{}/{}",
                                    source.source_type,
                                    with_https_prefix(&namespace.namespace),
                                    name.name
                                ),
                            ));
                        }
                    }
                } else {
                    rows.push(KnownRow::new(
                        kind,
                        &occurrence.id,
                        format!(
                            "Occurrence for Artifact: {}:{}",
                            occurrence.artifact.algorithm, occurrence.artifact.digest
                        ),
                    ));
                }
            }
        }
        NodeKind::PkgEqual => {
            for equal in &collected.pkg_equals {
                rows.push(KnownRow::new(kind, &equal.id, ""));
            }
        }
        NodeKind::CertifyLegal => {
            for legal in &collected.certify_legals {
                rows.push(KnownRow::new(
                    kind,
                    &legal.id,
                    format!(
                        "Declared License: {}, Discovered License: {}, Origin: {}",
                        legal.declared_license, legal.discovered_license, legal.origin
                    ),
                ));
            }
        }
    }
    rows
}

/// Resolve the occurrence's artifact and re-query its neighbors along one
/// edge. Requires the artifact to resolve uniquely.
async fn associated_artifact_neighbors(
    client: &GuacClient,
    occurrence: &IsOccurrence,
    edge: Edge,
) -> Result<Vec<Neighbor>> {
    let filter = ArtifactSpec {
        algorithm: Some(occurrence.artifact.algorithm.clone()),
        digest: Some(occurrence.artifact.digest.clone()),
        ..Default::default()
    };
    let response = model::artifacts(client, &filter).await?;
    if response.artifacts.len() != 1 {
        return Err(GuacError::DataShape("artifact not found".to_string()));
    }
    model::neighbors(client, &response.artifacts[0].id, &[edge]).await
}

fn with_https_prefix(namespace: &str) -> String {
    if namespace.starts_with("https://") {
        namespace.to_string()
    } else {
        format!("https://{namespace}")
    }
}

fn visualizer_url(path: Vec<String>) -> String {
    format!(
        "{VISUALIZER_BASE}{}",
        remove_duplicate_path_values(path).join(",")
    )
}

/// Dedupe node IDs, keeping first occurrence order.
fn remove_duplicate_path_values(path: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    path.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

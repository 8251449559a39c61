//! Typed GUAC operations: filter specs, response trees, and the GraphQL
//! documents behind them.
//!
//! Filter specs mirror the GUAC query inputs: every field is a nullable
//! match-all, so an empty spec selects everything at that level.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::{GuacClient, Result};

// ---------------------------------------------------------------------------
// Filter specs

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkgSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qualifiers: Vec<PackageQualifierSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_only_empty_qualifiers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageQualifierSpec {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsDependencySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PkgSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_package: Option<PkgSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilitySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub vulnerability_type: Option<String>,
    #[serde(rename = "vulnerabilityID", skip_serializing_if = "Option::is_none")]
    pub vulnerability_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_vuln: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

// ---------------------------------------------------------------------------
// Response trees

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    #[serde(rename = "type")]
    pub package_type: String,
    #[serde(default)]
    pub namespaces: Vec<PackageNamespace>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageNamespace {
    pub id: String,
    pub namespace: String,
    #[serde(default)]
    pub names: Vec<PackageName>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageName {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub versions: Vec<PackageVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageVersion {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub qualifiers: Vec<PackageQualifier>,
    #[serde(default)]
    pub subpath: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageQualifier {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub namespaces: Vec<SourceNamespace>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceNamespace {
    pub id: String,
    pub namespace: String,
    #[serde(default)]
    pub names: Vec<SourceName>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceName {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub algorithm: String,
    pub digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagesResponse {
    #[serde(default)]
    pub packages: Vec<Package>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesResponse {
    #[serde(default)]
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsResponse {
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

// ---------------------------------------------------------------------------
// Neighbor nodes

#[derive(Debug, Clone, Deserialize)]
pub struct CertifyVuln {
    pub id: String,
    pub vulnerability: VulnerabilityTree,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VulnerabilityTree {
    #[serde(rename = "type")]
    pub vulnerability_type: String,
    #[serde(rename = "vulnerabilityIDs", default)]
    pub vulnerability_ids: Vec<VulnerabilityId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VulnerabilityId {
    #[serde(rename = "vulnerabilityID")]
    pub vulnerability_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertifyBad {
    pub id: String,
    pub justification: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertifyGood {
    pub id: String,
    pub justification: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertifyScorecard {
    pub id: String,
    pub scorecard: Scorecard,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scorecard {
    #[serde(rename = "aggregateScore")]
    pub aggregate_score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertifyVexStatement {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HasSbom {
    pub id: String,
    #[serde(rename = "downloadLocation")]
    pub download_location: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HasSlsa {
    pub id: String,
    pub slsa: Slsa,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Slsa {
    pub origin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HasSourceAt {
    pub id: String,
    pub source: Source,
    pub package: Package,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashEqual {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IsOccurrence {
    pub id: String,
    pub subject: OccurrenceSubject,
    pub artifact: Artifact,
}

/// IsOccurrence subjects are a package-or-source union.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "__typename")]
pub enum OccurrenceSubject {
    Package(Package),
    Source(Source),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PkgEqual {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertifyLegal {
    pub id: String,
    #[serde(rename = "declaredLicense", default)]
    pub declared_license: String,
    #[serde(rename = "discoveredLicense", default)]
    pub discovered_license: String,
    #[serde(default)]
    pub origin: String,
}

/// One neighbor of a graph node, discriminated by GraphQL `__typename`.
#[derive(Debug, Clone)]
pub enum Neighbor {
    CertifyVuln(CertifyVuln),
    CertifyBad(CertifyBad),
    CertifyGood(CertifyGood),
    CertifyScorecard(CertifyScorecard),
    CertifyVex(CertifyVexStatement),
    HasSbom(HasSbom),
    HasSlsa(HasSlsa),
    HasSourceAt(HasSourceAt),
    HashEqual(HashEqual),
    IsOccurrence(IsOccurrence),
    PkgEqual(PkgEqual),
    CertifyLegal(CertifyLegal),
}

impl Neighbor {
    pub fn id(&self) -> &str {
        match self {
            Neighbor::CertifyVuln(n) => &n.id,
            Neighbor::CertifyBad(n) => &n.id,
            Neighbor::CertifyGood(n) => &n.id,
            Neighbor::CertifyScorecard(n) => &n.id,
            Neighbor::CertifyVex(n) => &n.id,
            Neighbor::HasSbom(n) => &n.id,
            Neighbor::HasSlsa(n) => &n.id,
            Neighbor::HasSourceAt(n) => &n.id,
            Neighbor::HashEqual(n) => &n.id,
            Neighbor::IsOccurrence(n) => &n.id,
            Neighbor::PkgEqual(n) => &n.id,
            Neighbor::CertifyLegal(n) => &n.id,
        }
    }

    /// Nodes of kinds we don't render (plus anything malformed) are dropped.
    fn from_value(value: &Value) -> Option<Self> {
        let typename = value.get("__typename")?.as_str()?;
        let node = value.clone();
        let parsed = match typename {
            "CertifyVuln" => Neighbor::CertifyVuln(serde_json::from_value(node).ok()?),
            "CertifyBad" => Neighbor::CertifyBad(serde_json::from_value(node).ok()?),
            "CertifyGood" => Neighbor::CertifyGood(serde_json::from_value(node).ok()?),
            "CertifyScorecard" => Neighbor::CertifyScorecard(serde_json::from_value(node).ok()?),
            "CertifyVEXStatement" => Neighbor::CertifyVex(serde_json::from_value(node).ok()?),
            "HasSBOM" => Neighbor::HasSbom(serde_json::from_value(node).ok()?),
            "HasSLSA" => Neighbor::HasSlsa(serde_json::from_value(node).ok()?),
            "HasSourceAt" => Neighbor::HasSourceAt(serde_json::from_value(node).ok()?),
            "HashEqual" => Neighbor::HashEqual(serde_json::from_value(node).ok()?),
            "IsOccurrence" => Neighbor::IsOccurrence(serde_json::from_value(node).ok()?),
            "PkgEqual" => Neighbor::PkgEqual(serde_json::from_value(node).ok()?),
            "CertifyLegal" => Neighbor::CertifyLegal(serde_json::from_value(node).ok()?),
            _ => return None,
        };
        Some(parsed)
    }
}

/// Edge filters accepted by the `neighbors` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Edge {
    ArtifactHasSbom,
    ArtifactHasSlsa,
}

// ---------------------------------------------------------------------------
// GraphQL documents

const ALL_PKG_TREE: &str = r#"
fragment AllPkgTree on Package {
  id
  type
  namespaces {
    id
    namespace
    names {
      id
      name
      versions {
        id
        version
        qualifiers { key value }
        subpath
      }
    }
  }
}
"#;

const ALL_SRC_TREE: &str = r#"
fragment AllSrcTree on Source {
  id
  type
  namespaces {
    id
    namespace
    names {
      id
      name
      tag
      commit
    }
  }
}
"#;

const PACKAGES_QUERY: &str = r#"
query Packages($filter: PkgSpec!) {
  packages(pkgSpec: $filter) { ...AllPkgTree }
}
"#;

const DEPENDENCIES_QUERY: &str = r#"
query Dependencies($filter: IsDependencySpec!) {
  IsDependency(isDependencySpec: $filter) {
    id
    justification
    versionRange
    dependencyType
    origin
    collector
    package { ...AllPkgTree }
    dependencyPackage { ...AllPkgTree }
  }
}
"#;

const VULNERABILITIES_QUERY: &str = r#"
query Vulnerabilities($filter: VulnerabilitySpec!) {
  vulnerabilities(vulnSpec: $filter) {
    id
    type
    vulnerabilityIDs { id vulnerabilityID }
  }
}
"#;

const SOURCES_QUERY: &str = r#"
query Sources($filter: SourceSpec!) {
  sources(sourceSpec: $filter) { ...AllSrcTree }
}
"#;

const ARTIFACTS_QUERY: &str = r#"
query Artifacts($filter: ArtifactSpec!) {
  artifacts(artifactSpec: $filter) { id algorithm digest }
}
"#;

const NEIGHBORS_QUERY: &str = r#"
query Neighbors($node: ID!, $usingOnly: [Edge!]!) {
  neighbors(node: $node, usingOnly: $usingOnly) {
    __typename
    ... on CertifyVuln {
      id
      vulnerability { type vulnerabilityIDs { vulnerabilityID } }
    }
    ... on CertifyBad { id justification }
    ... on CertifyGood { id justification }
    ... on CertifyScorecard { id scorecard { aggregateScore } }
    ... on CertifyVEXStatement { id status }
    ... on HasSBOM { id downloadLocation }
    ... on HasSLSA { id slsa { origin } }
    ... on HasSourceAt {
      id
      source { ...AllSrcTree }
      package { ...AllPkgTree }
    }
    ... on HashEqual { id }
    ... on IsOccurrence {
      id
      subject {
        __typename
        ... on Package { ...AllPkgTree }
        ... on Source { ...AllSrcTree }
      }
      artifact { id algorithm digest }
    }
    ... on PkgEqual { id }
    ... on CertifyLegal { id declaredLicense discoveredLicense origin }
  }
}
"#;

fn with_fragments(query: &str, fragments: &[&str]) -> String {
    let mut document = query.to_string();
    for fragment in fragments {
        document.push_str(fragment);
    }
    document
}

// ---------------------------------------------------------------------------
// Operations

pub async fn packages(client: &GuacClient, filter: &PkgSpec) -> Result<PackagesResponse> {
    let data = client
        .execute(
            &with_fragments(PACKAGES_QUERY, &[ALL_PKG_TREE]),
            json!({ "filter": filter }),
        )
        .await?;
    Ok(serde_json::from_value(data)?)
}

/// Dependency and vulnerability results are handed straight to the LLM, so
/// they stay as raw JSON.
pub async fn dependencies(client: &GuacClient, filter: &IsDependencySpec) -> Result<Value> {
    client
        .execute(
            &with_fragments(DEPENDENCIES_QUERY, &[ALL_PKG_TREE]),
            json!({ "filter": filter }),
        )
        .await
}

pub async fn vulnerabilities(client: &GuacClient, filter: &VulnerabilitySpec) -> Result<Value> {
    client
        .execute(VULNERABILITIES_QUERY, json!({ "filter": filter }))
        .await
}

pub async fn sources(client: &GuacClient, filter: &SourceSpec) -> Result<SourcesResponse> {
    let data = client
        .execute(
            &with_fragments(SOURCES_QUERY, &[ALL_SRC_TREE]),
            json!({ "filter": filter }),
        )
        .await?;
    Ok(serde_json::from_value(data)?)
}

pub async fn artifacts(client: &GuacClient, filter: &ArtifactSpec) -> Result<ArtifactsResponse> {
    let data = client
        .execute(ARTIFACTS_QUERY, json!({ "filter": filter }))
        .await?;
    Ok(serde_json::from_value(data)?)
}

pub async fn neighbors(
    client: &GuacClient,
    node: &str,
    using_only: &[Edge],
) -> Result<Vec<Neighbor>> {
    let data = client
        .execute(
            &with_fragments(NEIGHBORS_QUERY, &[ALL_PKG_TREE, ALL_SRC_TREE]),
            json!({ "node": node, "usingOnly": using_only }),
        )
        .await?;

    let nodes = data
        .get("neighbors")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut collected = Vec::new();
    for node in &nodes {
        match Neighbor::from_value(node) {
            Some(neighbor) => collected.push(neighbor),
            None => debug!(?node, "Skipping unrenderable neighbor node"),
        }
    }
    Ok(collected)
}

//! The function-tool surface exposed to the LLM: operation catalog, tool
//! registry, and the dispatcher that turns raw model arguments back into
//! typed GUAC calls.

pub mod known;

use analyst_provider::Tool;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info};

use crate::model::{self, IsDependencySpec, PkgSpec, VulnerabilitySpec};
use crate::schema::FilterSchema;
use crate::{GuacClient, GuacError, Result};

/// Tool results are capped before being handed back to the LLM.
pub const MAX_TOOL_OUTPUT_BYTES: usize = 5000;

const DEPENDENCIES_DESCRIPTION: &str = "\
IsDependencySpec allows filtering the list of dependencies to return.
To obtain the list of dependency packages, caller must fill in the package
field.
Dependency packages must be defined at PackageVersion.";

const VULNERABILITIES_DESCRIPTION: &str = "\
VulnerabilitySpec allows filtering the list of vulnerabilities to return in a query.
Use null to match on all values at that level.
For example, to get all vulnerabilities in GUAC backend, use a VulnSpec
where every field is null.
Setting the noVuln boolean true will ignore the other inputs for type and vulnerabilityID.
Setting noVuln to true means retrieving only nodes where the type of the vulnerability is \"novuln\"
and the it has an empty string for vulnerabilityID. Setting it to false filters out all results that are \"novuln\".
Setting one of the other fields and omitting the noVuln means retrieving vulnerabilities for the corresponding
type and vulnerabilityID. Omission of noVuln field will return all vulnerabilities and novuln.";

const PACKAGES_DESCRIPTION: &str = "\
PkgSpec allows filtering the list of sources to return in a query.
Each field matches a qualifier from pURL. Use null to match on all values at
that level. For example, to get all packages in GUAC backend, use a PkgSpec
where every field is null.
The id field can be used to match on a specific node in the trie to match packageTypeID,
packageNamespaceID, packageNameID, or packageVersionID.
Empty string at a field means matching with the empty string. If passing in
qualifiers, all of the values in the list must match. Since we want to return
nodes with any number of qualifiers if no qualifiers are passed in the input,
we must also return the same set of nodes it the qualifiers list is empty. To
match on nodes that don't contain any qualifier, set matchOnlyEmptyQualifiers
to true. If this field is true, then the qualifiers argument is ignored.";

const KNOWN_QUERY_DESCRIPTION: &str =
    "query all known info about a package, source, or artifact, just like guacone query known";

/// A graph operation exposed as a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Dependencies,
    Vulnerabilities,
    Packages,
}

impl Operation {
    pub const fn name(self) -> &'static str {
        match self {
            Operation::Dependencies => "Dependencies",
            Operation::Vulnerabilities => "Vulnerabilities",
            Operation::Packages => "Packages",
        }
    }

    /// Schema of the operation's filter input.
    pub fn parameters(self) -> Value {
        match self {
            Operation::Dependencies => IsDependencySpec::json_schema(),
            Operation::Vulnerabilities => VulnerabilitySpec::json_schema(),
            Operation::Packages => PkgSpec::json_schema(),
        }
    }

    /// Decode the raw arguments into this operation's filter type and call
    /// the backend.
    async fn invoke(self, client: &GuacClient, arguments: &Value) -> Result<Value> {
        match self {
            Operation::Dependencies => {
                let filter: IsDependencySpec =
                    decode_filter(IsDependencySpec::NAME, arguments)?;
                model::dependencies(client, &filter).await
            }
            Operation::Vulnerabilities => {
                let filter: VulnerabilitySpec =
                    decode_filter(VulnerabilitySpec::NAME, arguments)?;
                model::vulnerabilities(client, &filter).await
            }
            Operation::Packages => {
                let filter: PkgSpec = decode_filter(PkgSpec::NAME, arguments)?;
                let response = model::packages(client, &filter).await?;
                Ok(serde_json::to_value(response)?)
            }
        }
    }
}

pub struct CatalogEntry {
    pub operation: Operation,
    pub description: &'static str,
}

/// Operations exposed as generated tools, in prompt order. Adding an
/// operation means adding an entry here and a match arm on [`Operation`].
pub const ALLOWED_OPERATIONS: &[CatalogEntry] = &[
    CatalogEntry {
        operation: Operation::Dependencies,
        description: DEPENDENCIES_DESCRIPTION,
    },
    CatalogEntry {
        operation: Operation::Vulnerabilities,
        description: VULNERABILITIES_DESCRIPTION,
    },
    CatalogEntry {
        operation: Operation::Packages,
        description: PACKAGES_DESCRIPTION,
    },
];

#[derive(Debug, Clone, Copy)]
enum ToolBinding {
    Operation(Operation),
    KnownQuery,
}

/// One tool as advertised to the LLM, bound to its invocation.
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    binding: ToolBinding,
}

/// Registry of all tools, built once at startup and read-only afterwards.
/// Order is deterministic: catalog order, then the known-query tool last.
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let mut tools: Vec<ToolDescriptor> = ALLOWED_OPERATIONS
            .iter()
            .map(|entry| ToolDescriptor {
                name: entry.operation.name().to_string(),
                description: entry.description.to_string(),
                parameters: entry.operation.parameters(),
                binding: ToolBinding::Operation(entry.operation),
            })
            .collect();

        tools.push(ToolDescriptor {
            name: "KnownQuery".to_string(),
            description: KNOWN_QUERY_DESCRIPTION.to_string(),
            parameters: known::input_schema(),
            binding: ToolBinding::KnownQuery,
        });

        info!(tools = tools.len(), "Built tool registry");
        Self { tools }
    }

    /// Tool definitions in prompt form.
    pub fn definitions(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|t| Tool::new(t.name.clone(), t.description.clone(), t.parameters.clone()))
            .collect()
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Resolve a tool by name, decode its arguments, invoke it, and return
    /// the stringified result capped at [`MAX_TOOL_OUTPUT_BYTES`].
    pub async fn dispatch(
        &self,
        client: &GuacClient,
        name: &str,
        arguments: &Value,
    ) -> Result<String> {
        let descriptor = self
            .lookup(name)
            .ok_or_else(|| GuacError::UnknownFunction(name.to_string()))?;

        let result = match descriptor.binding {
            ToolBinding::Operation(operation) => operation.invoke(client, arguments).await?,
            ToolBinding::KnownQuery => {
                let input: known::KnownQueryInput =
                    decode_filter(known::INPUT_TYPE_NAME, arguments)?;
                serde_json::to_value(known::known_query(client, input).await?)?
            }
        };

        let text = match serde_json::to_string(&result) {
            Ok(text) => text,
            Err(err) => {
                error!(error = %err, "Failed to marshal tool output");
                return Ok("error: failed to parse tool output".to_string());
            }
        };

        Ok(truncate_bytes(text, MAX_TOOL_OUTPUT_BYTES))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_filter<T: DeserializeOwned>(filter: &'static str, arguments: &Value) -> Result<T> {
    serde_json::from_value(arguments.clone()).map_err(|source| GuacError::Decode { filter, source })
}

/// Cap `text` at `max` bytes on a char boundary, marking the cut.
pub fn truncate_bytes(text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[truncated]", &text[..end])
}

//! Declared tools and resources of a provider.

use std::collections::HashSet;

use conduit_core::{Error, ResourceDescriptor, Result, ToolDescriptor};

/// Response to a registration query: tools in declaration order plus
/// optional resources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderManifest {
    pub tools: Vec<ToolDescriptor>,
    pub resources: Vec<ResourceDescriptor>,
}

impl ProviderManifest {
    /// Creates a manifest with the given tools.
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self {
            tools,
            resources: Vec::new(),
        }
    }

    /// Sets the declared resources.
    pub fn with_resources(mut self, resources: Vec<ResourceDescriptor>) -> Self {
        self.resources = resources;
        self
    }

    /// Returns the tool names in declaration order.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name.clone()).collect()
    }

    /// Rejects manifests with empty or repeated tool names, or resources
    /// without a uri.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.tools.len());
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(Error::malformed_response().with_message("tool with an empty name"));
            }

            if !seen.insert(tool.name.as_str()) {
                return Err(Error::malformed_response()
                    .with_message(format!("tool `{}` is declared twice", tool.name)));
            }
        }

        if self.resources.iter().any(|resource| resource.uri.is_empty()) {
            return Err(Error::malformed_response().with_message("resource with an empty uri"));
        }

        Ok(())
    }
}

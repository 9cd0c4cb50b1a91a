//! ToolRegistry - named tool collection

use std::collections::HashMap;
use std::sync::Arc;

use super::builtin::{GlobTool, GrepTool, ListDirTool, ReadFileTool, ShellTool, WriteFileTool};
use super::{Tool, ToolSchema};

/// Registry of available tools
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Registry with the standard tool set
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ShellTool));
        registry.register(Arc::new(ReadFileTool));
        registry.register(Arc::new(WriteFileTool));
        registry.register(Arc::new(ListDirTool));
        registry.register(Arc::new(GrepTool));
        registry.register(Arc::new(GlobTool));
        registry
    }

    /// Empty registry (for testing)
    pub fn empty() -> Self {
        Self {
            tools: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register (or replace) a tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if let Some(&idx) = self.by_name.get(&name) {
            self.tools[idx] = tool;
        } else {
            self.by_name.insert(name, self.tools.len());
            self.tools.push(tool);
        }
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).map(|&idx| Arc::clone(&self.tools[idx]))
    }

    /// Whether a tool is registered
    pub fn has_tool(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All tools, in registration order
    pub fn list(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// Schemas for prompt assembly
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.to_schema()).collect()
    }

    /// Registered tool names
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

//! Built-in commands

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};

use super::{Command, CommandContext, CommandResult, StateChange};

fn arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

/// Check authentication and health state for a provider
pub struct AuthStatusCommand;

#[async_trait]
impl Command for AuthStatusCommand {
    fn name(&self) -> &'static str {
        "auth_status"
    }

    fn description(&self) -> &'static str {
        "Check authentication status for providers"
    }

    fn triggers(&self) -> &'static [&'static str] {
        &["/auth status", "/auth check", "/check auth"]
    }

    fn parse_args(&self, text: &str) -> Map<String, Value> {
        let lower = text.to_lowercase();
        let mut args = Map::new();
        if let Some(cap) = Regex::new(r"/auth\s+status\s+(\w+)").ok().and_then(|re| re.captures(&lower)) {
            args.insert("provider".to_string(), Value::from(&cap[1]));
        }
        args
    }

    async fn execute(&self, ctx: &CommandContext, args: &Map<String, Value>) -> CommandResult {
        let provider_name = arg(args, "provider")
            .map(str::to_string)
            .unwrap_or_else(|| ctx.router.default_provider().to_string());

        let Some(provider) = ctx.router.get(&provider_name) else {
            return CommandResult::fail(format!("Provider '{}' not found", provider_name));
        };

        let health = ctx.router.metrics().health(&provider_name).await;

        let mut lines = vec![
            format!("Provider: {}", provider_name),
            format!("Auth Type: {}", provider.auth_type()),
            format!("Streaming: {}", provider.supports_streaming()),
            format!("Available: {}", health.available),
            format!("Health Score: {:.2}", health.health_score),
            format!("Total Requests: {}", health.total_requests),
        ];
        if health.in_cooldown {
            lines.push("Status: In cooldown".to_string());
        }

        CommandResult::ok(lines.join("\n"))
    }
}

/// Switch the active model provider during execution
pub struct SwitchModelCommand;

#[async_trait]
impl Command for SwitchModelCommand {
    fn name(&self) -> &'static str {
        "switch_model"
    }

    fn description(&self) -> &'static str {
        "Switch to a different model provider"
    }

    fn triggers(&self) -> &'static [&'static str] {
        &["/switch model", "/switch provider", "/change model"]
    }

    fn parse_args(&self, text: &str) -> Map<String, Value> {
        let lower = text.to_lowercase();
        let mut args = Map::new();
        if let Some(cap) = Regex::new(r"/(?:switch|change)\s+(?:model|provider)\s+(\w+)")
            .ok()
            .and_then(|re| re.captures(&lower))
        {
            args.insert("provider".to_string(), Value::from(&cap[1]));
        }
        args
    }

    async fn execute(&self, ctx: &CommandContext, args: &Map<String, Value>) -> CommandResult {
        let Some(target) = arg(args, "provider") else {
            return CommandResult::fail("No provider specified for switch");
        };

        let Some(provider) = ctx.router.get(target) else {
            let available = ctx.router.list_providers().join(", ");
            return CommandResult::fail(format!("Provider '{}' not found. Available: {}", target, available));
        };

        if !ctx.router.metrics().is_available(target).await {
            return CommandResult::fail(format!("Provider '{}' is not currently available", target));
        }

        let output = format!(
            "Switched to provider: {}\nAuth Type: {}\nStreaming: {}",
            target,
            provider.auth_type(),
            provider.supports_streaming()
        );

        CommandResult::ok(output).with_changes(vec![StateChange::SwitchProvider(target.to_string())])
    }
}

/// Pause the current task
pub struct PauseCommand;

#[async_trait]
impl Command for PauseCommand {
    fn name(&self) -> &'static str {
        "pause"
    }

    fn description(&self) -> &'static str {
        "Pause current task execution"
    }

    fn triggers(&self) -> &'static [&'static str] {
        &["/pause", "/stop", "/halt"]
    }

    async fn execute(&self, ctx: &CommandContext, _args: &Map<String, Value>) -> CommandResult {
        CommandResult::ok(format!("Pausing task: {}", ctx.task.goal))
            .with_changes(vec![StateChange::Pause])
            .interrupting()
    }
}

/// Resume a paused task
pub struct ResumeCommand;

#[async_trait]
impl Command for ResumeCommand {
    fn name(&self) -> &'static str {
        "resume"
    }

    fn description(&self) -> &'static str {
        "Resume paused task execution"
    }

    fn triggers(&self) -> &'static [&'static str] {
        &["/resume", "/continue", "/start"]
    }

    async fn execute(&self, ctx: &CommandContext, _args: &Map<String, Value>) -> CommandResult {
        CommandResult::ok(format!("Resuming task: {}", ctx.task.goal)).with_changes(vec![StateChange::Resume])
    }
}

/// Show detailed task information
pub struct InspectTaskCommand;

#[async_trait]
impl Command for InspectTaskCommand {
    fn name(&self) -> &'static str {
        "inspect_task"
    }

    fn description(&self) -> &'static str {
        "Show detailed information about the current task"
    }

    fn triggers(&self) -> &'static [&'static str] {
        &["/inspect task", "/inspect", "/task info", "/status"]
    }

    async fn execute(&self, ctx: &CommandContext, _args: &Map<String, Value>) -> CommandResult {
        let task = &ctx.task;

        let mut lines = vec![
            format!("Task ID: {}", task.id),
            format!("Goal: {}", task.goal),
            format!("Status: {}", task.status),
            format!("Priority: {}", task.priority),
            format!("Created: {}", task.created_at),
            format!("Updated: {}", task.updated_at),
            format!("Steps Completed: {}", task.steps.len()),
        ];

        if !task.steps.is_empty() {
            lines.push("\nRecent Steps:".to_string());
            for step in task.last_steps(3) {
                let stamp: String = step.timestamp.chars().take(19).collect();
                let action: String = step.action.chars().take(50).collect();
                lines.push(format!("  [{}] {}", stamp, action));
            }
        }

        CommandResult::ok(lines.join("\n"))
    }
}

/// Inject additional context into the task's memory
pub struct InjectContextCommand;

#[async_trait]
impl Command for InjectContextCommand {
    fn name(&self) -> &'static str {
        "inject_context"
    }

    fn description(&self) -> &'static str {
        "Add additional context information to the current task"
    }

    fn triggers(&self) -> &'static [&'static str] {
        &["/inject context", "/add context", "/context"]
    }

    fn parse_args(&self, text: &str) -> Map<String, Value> {
        let mut args = Map::new();
        if let Some(cap) = Regex::new(r"(?is)/(?:inject|add)\s+context\s+(.+)")
            .ok()
            .and_then(|re| re.captures(text))
        {
            args.insert("context".to_string(), Value::from(cap[1].trim()));
        }
        args
    }

    async fn execute(&self, _ctx: &CommandContext, args: &Map<String, Value>) -> CommandResult {
        let Some(text) = arg(args, "context").filter(|t| !t.is_empty()) else {
            return CommandResult::fail("No context text provided");
        };

        let head: String = text.chars().take(100).collect();
        let ellipsis = if text.chars().count() > 100 { "..." } else { "" };

        CommandResult::ok(format!("Context injected: {}{}", head, ellipsis))
            .with_changes(vec![StateChange::InjectContext(text.to_string())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Task;
    use crate::llm::{DummyProvider, MetricsLedger, ModelRouter};
    use crate::skills::SkillRegistry;
    use crate::tools::ToolRegistry;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn context(temp: &std::path::Path) -> CommandContext {
        let metrics = Arc::new(MetricsLedger::open(temp.join("metrics.json")).unwrap());
        let mut router = ModelRouter::bare(metrics, None, None);
        router.register("dummy", Arc::new(DummyProvider));

        let mut task = Task::new(3, "fix the widget");
        task.add_step("decision", Some("looked around".to_string()), None);

        CommandContext {
            task,
            router: Arc::new(router),
            tools: Arc::new(ToolRegistry::empty()),
            skills: Arc::new(SkillRegistry::empty()),
        }
    }

    #[tokio::test]
    async fn test_pause_interrupts() {
        let temp = tempdir().unwrap();
        let ctx = context(temp.path());

        let result = PauseCommand.execute(&ctx, &Map::new()).await;
        assert!(result.success);
        assert!(result.interrupt_execution);
        assert_eq!(result.state_changes, vec![StateChange::Pause]);
    }

    #[tokio::test]
    async fn test_switch_model_valid_provider() {
        let temp = tempdir().unwrap();
        let ctx = context(temp.path());

        let args = SwitchModelCommand.parse_args("/switch model dummy");
        let result = SwitchModelCommand.execute(&ctx, &args).await;

        assert!(result.success);
        assert_eq!(result.state_changes, vec![StateChange::SwitchProvider("dummy".to_string())]);
    }

    #[tokio::test]
    async fn test_switch_model_unknown_provider_fails() {
        let temp = tempdir().unwrap();
        let ctx = context(temp.path());

        let args = SwitchModelCommand.parse_args("/switch model phantom");
        let result = SwitchModelCommand.execute(&ctx, &args).await;

        assert!(!result.success);
        assert!(result.output.contains("not found"));
        assert!(result.state_changes.is_empty());
    }

    #[tokio::test]
    async fn test_switch_model_unavailable_provider_fails() {
        let temp = tempdir().unwrap();
        let ctx = context(temp.path());
        ctx.router.metrics().mark_rate_limited("dummy", 60).await.unwrap();

        let args = SwitchModelCommand.parse_args("/switch model dummy");
        let result = SwitchModelCommand.execute(&ctx, &args).await;

        assert!(!result.success);
        assert!(result.output.contains("not currently available"));
    }

    #[tokio::test]
    async fn test_inspect_shows_recent_steps() {
        let temp = tempdir().unwrap();
        let ctx = context(temp.path());

        let result = InspectTaskCommand.execute(&ctx, &Map::new()).await;
        assert!(result.success);
        assert!(result.output.contains("Task ID: 3"));
        assert!(result.output.contains("Recent Steps:"));
    }

    #[tokio::test]
    async fn test_inject_context_parses_text() {
        let temp = tempdir().unwrap();
        let ctx = context(temp.path());

        let args = InjectContextCommand.parse_args("/inject context the API moved to v2");
        let result = InjectContextCommand.execute(&ctx, &args).await;

        assert!(result.success);
        assert_eq!(
            result.state_changes,
            vec![StateChange::InjectContext("the API moved to v2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_inject_context_empty_fails() {
        let temp = tempdir().unwrap();
        let ctx = context(temp.path());

        let result = InjectContextCommand.execute(&ctx, &Map::new()).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_auth_status_defaults_to_default_provider() {
        let temp = tempdir().unwrap();
        let ctx = context(temp.path());

        let result = AuthStatusCommand.execute(&ctx, &Map::new()).await;
        assert!(result.success);
        assert!(result.output.contains("Provider: dummy"));
        assert!(result.output.contains("Auth Type: apikey"));
    }
}

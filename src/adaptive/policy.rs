use crate::adaptive::types::{PolicyContext, RunMode};

/// Decides once per session whether adaptive behavior may run.
#[derive(Debug, Clone)]
pub struct PolicyGate {
    context: PolicyContext,
    enabled: bool,
}

impl PolicyGate {
    /// `config_enabled` is the global enablement flag; the run mode decides the rest.
    pub fn attach(context: PolicyContext, config_enabled: bool) -> Self {
        let mode_allows = match &context.run_mode {
            RunMode::Play => true,
            mode if mode.is_research_like() => context.override_enabled,
            _ => false,
        };
        let enabled = config_enabled && mode_allows;

        tracing::debug!(
            run_mode = %context.run_mode.as_str(),
            override_enabled = context.override_enabled,
            enabled,
            "policy gate attached"
        );

        Self { context, enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn context(&self) -> &PolicyContext {
        &self.context
    }
}

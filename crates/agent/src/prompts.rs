//! System prompt assembly.

use crate::error::AgentResult;
use crate::execution::ExecutionEnvironment;
use crate::profile::ProviderProfile;
use crate::project_docs::discover_project_docs;

/// Describe the execution environment for the system prompt.
#[must_use]
pub fn build_environment_context(env: &dyn ExecutionEnvironment) -> String {
    format!(
        "<environment>\nworking_directory: {}\nplatform: {}\nos_version: {}\n</environment>",
        env.working_directory(),
        env.platform(),
        env.os_version(),
    )
}

/// The full system prompt for a profile: base instructions, environment
/// context, project instruction files.
pub async fn build_system_prompt(
    profile: &dyn ProviderProfile,
    env: &dyn ExecutionEnvironment,
) -> AgentResult<String> {
    let environment_context = build_environment_context(env);
    let project_docs = discover_project_docs(env, profile.id()).await?;
    Ok(profile.build_system_prompt(&environment_context, &project_docs))
}

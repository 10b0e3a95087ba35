//! GitHub Actions workflow vocabulary

use crate::parser::Segment;

/// `(name, documentation)`
pub type Entry = (&'static str, &'static str);

pub const WORKFLOW_KEYS: &[Entry] = &[
    ("name", "The name of the workflow. GitHub displays it on the repository's Actions tab."),
    ("run-name", "The name for workflow runs generated from the workflow."),
    ("on", "The events that trigger the workflow."),
    ("permissions", "Modifies the default permissions granted to the `GITHUB_TOKEN`."),
    ("env", "A map of variables that are available to the steps of all jobs in the workflow."),
    ("defaults", "A map of default settings that will apply to all jobs in the workflow."),
    ("concurrency", "Ensures that only a single job or workflow using the same concurrency group runs at a time."),
    ("jobs", "A workflow run is made up of one or more jobs, which run in parallel by default."),
];

pub const TRIGGERS: &[Entry] = &[
    ("push", "Runs when commits or tags are pushed."),
    ("pull_request", "Runs on activity on a pull request."),
    ("pull_request_target", "Runs in the context of the base of a pull request."),
    ("workflow_dispatch", "Allows the workflow to be triggered manually."),
    ("workflow_call", "Allows the workflow to be called by another workflow."),
    ("workflow_run", "Runs when another workflow is requested or completed."),
    ("schedule", "Runs at scheduled times using POSIX cron syntax."),
    ("release", "Runs on release activity."),
    ("issues", "Runs on issue activity."),
    ("issue_comment", "Runs when an issue or pull request comment is created, edited or deleted."),
    ("merge_group", "Runs when a pull request is added to a merge queue."),
    ("repository_dispatch", "Runs when a webhook event is sent through the GitHub API."),
    ("create", "Runs when a Git reference is created."),
    ("delete", "Runs when a Git reference is deleted."),
    ("deployment", "Runs when a deployment is created."),
    ("deployment_status", "Runs when a third party provides a deployment status."),
];

pub const EVENT_KEYS: &[Entry] = &[
    ("branches", "Only run for the matching branch names."),
    ("branches-ignore", "Skip the matching branch names."),
    ("tags", "Only run for the matching tag names."),
    ("tags-ignore", "Skip the matching tag names."),
    ("paths", "Only run when a matching file path changes."),
    ("paths-ignore", "Skip when only matching file paths change."),
    ("types", "Activity types that trigger the event."),
    ("inputs", "Inputs passed to the workflow."),
    ("outputs", "Outputs of a called workflow."),
    ("secrets", "Secrets available to a called workflow."),
    ("workflows", "Workflows that trigger a `workflow_run` event."),
];

pub const JOB_KEYS: &[Entry] = &[
    ("name", "The name of the job displayed on GitHub."),
    ("needs", "Jobs that must complete successfully before this job will run."),
    ("runs-on", "The type of machine to run the job on."),
    ("permissions", "Modifies the default permissions granted to the `GITHUB_TOKEN` for this job."),
    ("environment", "The environment that the job references."),
    ("concurrency", "Ensures that only a single job using the same concurrency group runs at a time."),
    ("outputs", "A map of outputs for the job, available to all downstream jobs that depend on it."),
    ("env", "A map of variables available to all steps in the job."),
    ("defaults", "A map of default settings that will apply to all steps in the job."),
    ("if", "A conditional to prevent the job from running unless the condition is met."),
    ("steps", "A job contains a sequence of tasks called steps."),
    ("timeout-minutes", "The maximum number of minutes to let a job run before GitHub cancels it."),
    ("strategy", "A matrix strategy lets you use variables in a single job definition."),
    ("continue-on-error", "Prevents a workflow run from failing when this job fails."),
    ("container", "A container to run any steps in a job that don't already specify a container."),
    ("services", "Service containers to host services for a job."),
    ("uses", "The location and version of a reusable workflow file to run as a job."),
    ("with", "Inputs passed to the reusable workflow."),
    ("secrets", "Secrets passed to the reusable workflow."),
];

pub const STEP_KEYS: &[Entry] = &[
    ("id", "A unique identifier for the step, used to reference it in contexts."),
    ("name", "A name for the step to display on GitHub."),
    ("if", "A conditional to prevent the step from running unless the condition is met."),
    ("uses", "Selects an action to run as part of a step in the job."),
    ("run", "Runs command-line programs using the operating system's shell."),
    ("shell", "Overrides the default shell settings in the runner's operating system."),
    ("with", "A map of the input parameters defined by the action."),
    ("env", "Sets variables for the step to use in the runner environment."),
    ("working-directory", "The working directory where the command is run."),
    ("continue-on-error", "Prevents a job from failing when this step fails."),
    ("timeout-minutes", "The maximum number of minutes to run the step before killing the process."),
];

pub const STRATEGY_KEYS: &[Entry] = &[
    ("matrix", "Variables that define the job configurations to create."),
    ("fail-fast", "Cancel all in-progress matrix jobs if any matrix job fails."),
    ("max-parallel", "The maximum number of matrix jobs that can run simultaneously."),
];

pub const CONTEXTS: &[Entry] = &[
    ("github", "Information about the workflow run and the event that triggered the run."),
    ("env", "Variables set in a workflow, job, or step."),
    ("vars", "Configuration variables set at the organization, repository, and environment levels."),
    ("inputs", "Workflow inputs, e.g. from `workflow_dispatch` or `workflow_call`."),
    ("secrets", "The names and values of secrets available to a workflow run."),
    ("steps", "Steps with an `id` in the current job."),
    ("needs", "Outputs of all jobs defined as a dependency of the current job."),
    ("jobs", "For reusable workflows only, outputs of jobs from the reusable workflow."),
    ("matrix", "The matrix properties defined in the workflow that apply to the current job."),
    ("runner", "Information about the runner that is running the current job."),
    ("strategy", "Information about the matrix execution strategy for the current job."),
    ("job", "Information about the currently running job."),
];

pub const STEP_CONTEXT: &[Entry] = &[
    ("outputs", "The set of outputs defined for the step."),
    ("conclusion", "The result of a completed step after `continue-on-error` is applied."),
    ("outcome", "The result of a completed step before `continue-on-error` is applied."),
];

pub const NEEDS_CONTEXT: &[Entry] = &[
    ("outputs", "The set of outputs of a job that the current job depends on."),
    ("result", "The result of a job that the current job depends on."),
];

pub const GITHUB_CONTEXT: &[Entry] = &[
    ("action", "The name of the action currently running, or the id of a step."),
    ("action_path", "The path where an action is located. Only supported in composite actions."),
    ("action_ref", "For a step executing an action, this is the ref of the action being executed."),
    ("action_repository", "For a step executing an action, the owner and repository name of the action."),
    ("actor", "The username of the user that triggered the initial workflow run."),
    ("actor_id", "The account ID of the person or app that triggered the initial workflow run."),
    ("api_url", "The URL of the GitHub REST API."),
    ("base_ref", "The target branch of the pull request in a workflow run."),
    ("event", "The full event webhook payload."),
    ("event_name", "The name of the event that triggered the workflow run."),
    ("event_path", "The path to the file on the runner that contains the full event webhook payload."),
    ("head_ref", "The source branch of the pull request in a workflow run."),
    ("job", "The job_id of the current job."),
    ("ref", "The fully-formed ref of the branch or tag that triggered the workflow run."),
    ("ref_name", "The short ref name of the branch or tag that triggered the workflow run."),
    ("ref_protected", "true if branch protections are configured for the ref that triggered the workflow run."),
    ("ref_type", "The type of ref that triggered the workflow run. Valid values are branch or tag."),
    ("repository", "The owner and repository name. For example, octocat/Hello-World."),
    ("repository_id", "The ID of the repository."),
    ("repository_owner", "The repository owner's username."),
    ("run_attempt", "A unique number for each attempt of a particular workflow run in a repository."),
    ("run_id", "A unique number for each workflow run within a repository."),
    ("run_number", "A unique number for each run of a particular workflow in a repository."),
    ("server_url", "The URL of the GitHub server. For example: https://github.com."),
    ("sha", "The commit SHA that triggered the workflow."),
    ("token", "A token to authenticate on behalf of the GitHub App installed on your repository."),
    ("triggering_actor", "The username of the user that initiated the workflow run."),
    ("workflow", "The name of the workflow."),
    ("workflow_ref", "The ref path to the workflow."),
    ("workflow_sha", "The commit SHA for the workflow file."),
    ("workspace", "The default working directory on the runner for steps."),
];

pub const RUNNER_CONTEXT: &[Entry] = &[
    ("name", "The name of the runner executing the job."),
    ("os", "The operating system of the runner executing the job. Possible values are Linux, Windows, or macOS."),
    ("arch", "The architecture of the runner executing the job. Possible values are X86, X64, ARM, or ARM64."),
    ("temp", "The path to a temporary directory on the runner."),
    ("tool_cache", "The path to the directory containing preinstalled tools for GitHub-hosted runners."),
    ("debug", "Set only if debug logging is enabled, and always has the value of 1."),
];

pub const DEFAULT_ENV: &[Entry] = &[
    ("CI", "Always set to true."),
    ("GITHUB_ACTION", "The name of the action currently running, or the id of a step."),
    ("GITHUB_ACTIONS", "Always set to true when GitHub Actions is running the workflow."),
    ("GITHUB_ACTOR", "The name of the person or app that initiated the workflow."),
    ("GITHUB_API_URL", "Returns the API URL."),
    ("GITHUB_BASE_REF", "The name of the base ref or target branch of the pull request."),
    ("GITHUB_ENV", "The path on the runner to the file that sets variables from workflow commands."),
    ("GITHUB_EVENT_NAME", "The name of the event that triggered the workflow."),
    ("GITHUB_EVENT_PATH", "The path to the file on the runner that contains the full event webhook payload."),
    ("GITHUB_HEAD_REF", "The head ref or source branch of the pull request."),
    ("GITHUB_JOB", "The job_id of the current job."),
    ("GITHUB_OUTPUT", "The path on the runner to the file that sets the current step's outputs."),
    ("GITHUB_PATH", "The path on the runner to the file that sets system PATH variables."),
    ("GITHUB_REF", "The fully-formed ref of the branch or tag that triggered the workflow run."),
    ("GITHUB_REF_NAME", "The short ref name of the branch or tag that triggered the workflow run."),
    ("GITHUB_REPOSITORY", "The owner and repository name."),
    ("GITHUB_RUN_ID", "A unique number for each workflow run within a repository."),
    ("GITHUB_RUN_NUMBER", "A unique number for each run of a particular workflow in a repository."),
    ("GITHUB_SERVER_URL", "The URL of the GitHub server."),
    ("GITHUB_SHA", "The commit SHA that triggered the workflow."),
    ("GITHUB_STEP_SUMMARY", "The path on the runner to the file that contains job summaries."),
    ("GITHUB_WORKFLOW", "The name of the workflow."),
    ("GITHUB_WORKSPACE", "The default working directory on the runner for steps."),
    ("RUNNER_ARCH", "The architecture of the runner executing the job."),
    ("RUNNER_DEBUG", "Set only if debug logging is enabled, and always has the value of 1."),
    ("RUNNER_NAME", "The name of the runner executing the job."),
    ("RUNNER_OS", "The operating system of the runner executing the job."),
    ("RUNNER_TEMP", "The path to a temporary directory on the runner."),
    ("RUNNER_TOOL_CACHE", "The path to the directory containing preinstalled tools."),
];

pub const RUNNER_LABELS: &[Entry] = &[
    ("ubuntu-latest", "Latest Ubuntu runner image."),
    ("ubuntu-24.04", "Ubuntu 24.04 runner image."),
    ("ubuntu-22.04", "Ubuntu 22.04 runner image."),
    ("windows-latest", "Latest Windows Server runner image."),
    ("windows-2022", "Windows Server 2022 runner image."),
    ("macos-latest", "Latest macOS runner image."),
    ("macos-14", "macOS 14 (arm64) runner image."),
    ("self-hosted", "A self-hosted runner."),
];

pub const SHELLS: &[Entry] = &[
    ("bash", "bash -e {0}"),
    ("pwsh", "PowerShell Core"),
    ("python", "Executes the python command."),
    ("sh", "sh -e {0}"),
    ("cmd", "Windows cmd"),
    ("powershell", "Windows PowerShell"),
];

/// Key table that applies to children of the mapping at `path`.
pub fn keys_for(path: &[Segment]) -> Option<&'static [Entry]> {
    let keys: Vec<&str> = path.iter().map(Segment::as_key).collect();
    match keys.as_slice() {
        [] => Some(WORKFLOW_KEYS),
        ["on"] => Some(TRIGGERS),
        ["on", _] => Some(EVENT_KEYS),
        ["jobs", _] => Some(JOB_KEYS),
        ["jobs", _, "strategy"] => Some(STRATEGY_KEYS),
        ["jobs", _, "steps", "-"] => Some(STEP_KEYS),
        _ => None,
    }
}

/// Documentation for `key` written inside the mapping at `path`.
pub fn documentation(path: &[Segment], key: &str) -> Option<&'static str> {
    keys_for(path)?
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, doc)| *doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(keys: &[&str]) -> Vec<Segment> {
        keys.iter()
            .map(|k| match *k {
                "-" => Segment::Item(0),
                k => Segment::Key(k.to_string()),
            })
            .collect()
    }

    #[test]
    fn test_keys_for_known_paths() {
        assert_eq!(keys_for(&[]).map(|k| k.len()), Some(WORKFLOW_KEYS.len()));
        assert!(keys_for(&path(&["jobs", "build"])).is_some());
        assert!(keys_for(&path(&["jobs", "build", "steps", "-"])).is_some());
        assert!(keys_for(&path(&["jobs", "build", "env"])).is_none());
    }

    #[test]
    fn test_documentation_lookup() {
        let doc = documentation(&path(&["jobs", "build"]), "runs-on").unwrap();
        assert!(doc.contains("machine"));
        assert!(documentation(&path(&["jobs", "build"]), "unknown").is_none());
        assert!(documentation(&[], "jobs").is_some());
    }
}

// src/exec/context.rs

use crate::source::Run;

/// Context injected into every action subprocess as environment variables.
///
/// The variable set is a fixed contract any action command may reference;
/// fields the source could not supply render as empty strings rather than
/// failing the action.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub source: String,
    pub workflow: String,
    pub workflow_id: u64,
    pub branch: String,
    pub run_number: u64,
    pub run_id: u64,
    pub sha: String,
    pub message: String,
    pub author: String,
}

impl RunContext {
    pub fn new(source: &str, run: &Run) -> Self {
        Self {
            source: source.to_string(),
            workflow: run.workflow.clone(),
            workflow_id: run.workflow_id,
            branch: run.branch.clone(),
            run_number: run.number,
            run_id: run.id,
            sha: run.sha.clone(),
            message: run.message.clone(),
            author: run.author.clone(),
        }
    }

    /// The environment contract, in stable order.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("SOURCE_NAME", self.source.clone()),
            ("WORKFLOW_NAME", self.workflow.clone()),
            ("WORKFLOW_ID", self.workflow_id.to_string()),
            ("BRANCH_NAME", self.branch.clone()),
            ("RUN_NUMBER", self.run_number.to_string()),
            ("RUN_ID", self.run_id.to_string()),
            ("COMMIT_SHA", self.sha.clone()),
            ("COMMIT_MESSAGE", self.message.clone()),
            ("COMMIT_AUTHOR", self.author.clone()),
        ]
    }
}

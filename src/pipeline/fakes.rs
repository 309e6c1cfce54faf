//! Scripted in-memory collaborators for pipeline tests.
//!
//! Every fake records its calls as short strings (`"checkout -b feature/x"`,
//! `"create_ticket Add login"`) so tests can assert on exactly which external
//! effects a run produced. Replies are queued per operation and fall back to
//! a benign default when the queue is empty.

use async_trait::async_trait;
use conveyor_common::{Generator, Hosting, ToolError, ToolResult, VersionControl};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::conveyor_config::ConveyorToml;
use crate::pipeline::Pipeline;

fn scripted_failure(op: &str) -> ToolError {
    ToolError::Failed {
        command: op.to_string(),
        code: 1,
        stderr: "scripted failure".to_string(),
    }
}

#[derive(Default)]
struct Script {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl Script {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, op: &str) -> ToolResult<()> {
        if self.failing.lock().unwrap().contains(op) {
            Err(scripted_failure(op))
        } else {
            Ok(())
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

/// A recorded generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptCall {
    pub kind: &'static str,
    pub prompt: String,
    pub timeout: Duration,
}

#[derive(Default)]
pub struct FakeGenerator {
    prompts: Mutex<Vec<PromptCall>>,
    generate_replies: Mutex<VecDeque<ToolResult<String>>>,
    implement_replies: Mutex<VecDeque<ToolResult<String>>>,
}

impl FakeGenerator {
    pub fn push_generate(&self, reply: ToolResult<String>) {
        self.generate_replies.lock().unwrap().push_back(reply);
    }

    pub fn push_implement(&self, reply: ToolResult<String>) {
        self.implement_replies.lock().unwrap().push_back(reply);
    }

    pub fn prompts(&self) -> Vec<PromptCall> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.prompts().iter().filter(|p| p.kind == kind).count()
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, prompt: &str, timeout: Duration) -> ToolResult<String> {
        self.prompts.lock().unwrap().push(PromptCall {
            kind: "generate",
            prompt: prompt.to_string(),
            timeout,
        });
        self.generate_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("APPROVED - looks fine".to_string()))
    }

    async fn implement(
        &self,
        prompt: &str,
        _working_dir: &Path,
        timeout: Duration,
    ) -> ToolResult<String> {
        self.prompts.lock().unwrap().push(PromptCall {
            kind: "implement",
            prompt: prompt.to_string(),
            timeout,
        });
        self.implement_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("done".to_string()))
    }
}

pub struct FakeVcs {
    script: Script,
    current: Mutex<String>,
    has_changes: Mutex<VecDeque<bool>>,
    merge_results: Mutex<VecDeque<ToolResult<()>>>,
    conflicted: Mutex<Vec<String>>,
}

impl Default for FakeVcs {
    fn default() -> Self {
        Self {
            script: Script::default(),
            current: Mutex::new("main".to_string()),
            has_changes: Mutex::new(VecDeque::new()),
            merge_results: Mutex::new(VecDeque::new()),
            conflicted: Mutex::new(Vec::new()),
        }
    }
}

impl FakeVcs {
    pub fn calls(&self) -> Vec<String> {
        self.script.calls()
    }

    pub fn fail(&self, op: &str) {
        self.script.failing.lock().unwrap().insert(op.to_string());
    }

    pub fn push_has_changes(&self, value: bool) {
        self.has_changes.lock().unwrap().push_back(value);
    }

    pub fn push_merge(&self, result: ToolResult<()>) {
        self.merge_results.lock().unwrap().push_back(result);
    }

    pub fn set_conflicted(&self, paths: &[&str]) {
        *self.conflicted.lock().unwrap() = paths.iter().map(|p| p.to_string()).collect();
    }

    pub fn set_current(&self, branch: &str) {
        *self.current.lock().unwrap() = branch.to_string();
    }
}

pub fn merge_conflict(branch: &str) -> ToolError {
    ToolError::MergeConflict {
        command: format!("git merge --no-edit {branch}"),
        output: "CONFLICT (content): Merge conflict in src/app.rs".to_string(),
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn init(&self, default_branch: &str) -> ToolResult<()> {
        self.script.record(format!("init {default_branch}"));
        self.script.check("init")?;
        self.set_current(default_branch);
        Ok(())
    }

    async fn checkout(&self, branch: &str, create: bool) -> ToolResult<()> {
        if create {
            self.script.record(format!("checkout -b {branch}"));
        } else {
            self.script.record(format!("checkout {branch}"));
        }
        self.script.check("checkout")?;
        self.set_current(branch);
        Ok(())
    }

    async fn pull(&self, branch: &str) -> ToolResult<()> {
        self.script.record(format!("pull {branch}"));
        self.script.check("pull")
    }

    async fn add_all(&self) -> ToolResult<()> {
        self.script.record("add_all".to_string());
        self.script.check("add_all")
    }

    async fn commit(&self, message: &str) -> ToolResult<()> {
        self.script.record(format!("commit {message}"));
        self.script.check("commit")
    }

    async fn push(&self, branch: &str, set_upstream: bool) -> ToolResult<()> {
        if set_upstream {
            self.script.record(format!("push -u {branch}"));
        } else {
            self.script.record(format!("push {branch}"));
        }
        self.script.check("push")
    }

    async fn merge(&self, branch: &str) -> ToolResult<()> {
        self.script.record(format!("merge {branch}"));
        self.script.check("merge")?;
        self.merge_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn has_changes(&self) -> ToolResult<bool> {
        self.script.record("has_changes".to_string());
        self.script.check("has_changes")?;
        Ok(self.has_changes.lock().unwrap().pop_front().unwrap_or(true))
    }

    async fn conflicted_files(&self) -> ToolResult<Vec<String>> {
        self.script.record("conflicted_files".to_string());
        Ok(self.conflicted.lock().unwrap().clone())
    }

    async fn diff(&self, base: &str, head: &str) -> ToolResult<String> {
        self.script.record(format!("diff {base}..{head}"));
        self.script.check("diff")?;
        Ok("diff --git a/src/app.rs b/src/app.rs\n+fn feature() {}\n".to_string())
    }

    async fn current_branch(&self) -> ToolResult<String> {
        Ok(self.current.lock().unwrap().clone())
    }
}

pub struct FakeHosting {
    script: Script,
    next_ticket: AtomicU64,
    next_pr: AtomicU64,
    bodies: Mutex<HashMap<u64, String>>,
    merge_results: Mutex<VecDeque<ToolResult<String>>>,
    repo_description: Mutex<Option<String>>,
}

impl Default for FakeHosting {
    fn default() -> Self {
        Self {
            script: Script::default(),
            next_ticket: AtomicU64::new(1),
            next_pr: AtomicU64::new(100),
            bodies: Mutex::new(HashMap::new()),
            merge_results: Mutex::new(VecDeque::new()),
            repo_description: Mutex::new(None),
        }
    }
}

impl FakeHosting {
    pub fn calls(&self) -> Vec<String> {
        self.script.calls()
    }

    pub fn fail(&self, op: &str) {
        self.script.failing.lock().unwrap().insert(op.to_string());
    }

    pub fn push_merge(&self, result: ToolResult<String>) {
        self.merge_results.lock().unwrap().push_back(result);
    }

    pub fn set_body(&self, id: u64, body: &str) {
        self.bodies.lock().unwrap().insert(id, body.to_string());
    }

    pub fn body(&self, id: u64) -> Option<String> {
        self.bodies.lock().unwrap().get(&id).cloned()
    }

    /// Description passed to the last `create_repo`.
    pub fn repo_description(&self) -> Option<String> {
        self.repo_description.lock().unwrap().clone()
    }
}

#[async_trait]
impl Hosting for FakeHosting {
    async fn create_repo(
        &self,
        name: &str,
        private: bool,
        description: &str,
    ) -> ToolResult<String> {
        self.script.record(format!("create_repo {name} private={private}"));
        *self.repo_description.lock().unwrap() = Some(description.to_string());
        self.script.check("create_repo")?;
        Ok(format!("https://github.com/acme/{name}\n"))
    }

    async fn clone_repo(&self, full_name: &str, target: &Path) -> ToolResult<()> {
        self.script.record(format!("clone_repo {full_name}"));
        self.script.check("clone_repo")?;
        std::fs::create_dir_all(target).map_err(|source| ToolError::Spawn {
            command: "clone".to_string(),
            source,
        })?;
        std::fs::write(target.join("README.md"), "# cloned\n").map_err(|source| {
            ToolError::Spawn {
                command: "clone".to_string(),
                source,
            }
        })
    }

    async fn create_ticket(&self, title: &str, _body: &str, _labels: &[String]) -> ToolResult<u64> {
        self.script.record(format!("create_ticket {title}"));
        self.script.check("create_ticket")?;
        Ok(self.next_ticket.fetch_add(1, Ordering::SeqCst))
    }

    async fn create_change_request(
        &self,
        title: &str,
        body: &str,
        base: &str,
        head: &str,
    ) -> ToolResult<u64> {
        self.script
            .record(format!("create_change_request {title} {base}<-{head}"));
        self.script.check("create_change_request")?;
        let id = self.next_pr.fetch_add(1, Ordering::SeqCst);
        self.set_body(id, body);
        Ok(id)
    }

    async fn merge_change_request(
        &self,
        id: u64,
        squash: bool,
        delete_branch: bool,
    ) -> ToolResult<String> {
        self.script.record(format!(
            "merge_change_request {id} squash={squash} delete={delete_branch}"
        ));
        self.script.check("merge_change_request")?;
        self.merge_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("merged".to_string()))
    }

    async fn diff_change_request(&self, id: u64) -> ToolResult<String> {
        self.script.record(format!("diff_change_request {id}"));
        self.script.check("diff_change_request")?;
        Ok("diff --git a/src/app.rs b/src/app.rs\n+fn feature() {}\n".to_string())
    }

    async fn view_change_request(&self, id: u64) -> ToolResult<String> {
        self.script.record(format!("view_change_request {id}"));
        self.script.check("view_change_request")?;
        Ok(self.body(id).unwrap_or_default())
    }

    async fn edit_change_request(&self, id: u64, body: &str) -> ToolResult<()> {
        self.script.record(format!("edit_change_request {id}"));
        self.script.check("edit_change_request")?;
        self.set_body(id, body);
        Ok(())
    }

    async fn close_ticket(&self, id: u64, comment: &str) -> ToolResult<()> {
        self.script.record(format!("close_ticket {id} {comment}"));
        self.script.check("close_ticket")
    }
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub generator: Arc<FakeGenerator>,
    pub vcs: Arc<FakeVcs>,
    pub hosting: Arc<FakeHosting>,
}

/// A pipeline over fresh fakes rooted at `dir`, with default configuration.
pub fn harness(dir: &Path) -> Harness {
    harness_with(dir, ConveyorToml::default())
}

pub fn harness_with(dir: &Path, toml: ConveyorToml) -> Harness {
    let generator = Arc::new(FakeGenerator::default());
    let vcs = Arc::new(FakeVcs::default());
    let hosting = Arc::new(FakeHosting::default());
    let config = Config::new(dir.to_path_buf(), &toml);
    let pipeline = Pipeline::new(config, generator.clone(), vcs.clone(), hosting.clone());
    Harness {
        pipeline,
        generator,
        vcs,
        hosting,
    }
}

use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Engine-specific parameters. The core passes them through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOptions(BTreeMap<String, String>);

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success { output: PathBuf },
    Failure { error: String },
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }
}

/// One unit of conversion work.
///
/// The job references its input and owns nothing on disk; the orchestrator owns
/// `work_dir`. `complete` consumes the job, so a result can be sent at most once.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub input_path: PathBuf,
    pub source_format: String,
    pub target_format: String,
    pub work_dir: PathBuf,
    pub options: JobOptions,
    reply: oneshot::Sender<JobResult>,
}

impl Job {
    /// Build a job and the receiving half of its result channel.
    pub fn new(
        id: Uuid,
        input_path: PathBuf,
        source_format: &str,
        target_format: &str,
        work_dir: PathBuf,
        options: JobOptions,
    ) -> (Self, oneshot::Receiver<JobResult>) {
        let (reply, rx) = oneshot::channel();
        let job = Self {
            id,
            input_path,
            source_format: source_format.to_ascii_lowercase(),
            target_format: target_format.to_ascii_lowercase(),
            work_dir,
            options,
            reply,
        };
        (job, rx)
    }

    pub fn complete(self, result: JobResult) {
        // The waiter may already be gone (transport closed); nothing left to do then.
        let _ = self.reply.send(result);
    }
}

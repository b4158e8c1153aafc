//! In-process judge with scripted answers.
//!
//! Picks the first script entry whose needle occurs in the prompt, so the
//! same prompt always gets the same answer. Used by tests and by
//! `TURNGUARD_BACKEND=scripted` dry runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

use turnguard_core::JudgeError;

use super::JudgeBackend;

/// What the scripted judge does for a matching prompt.
#[derive(Debug, Clone)]
pub enum Reply {
    Answer(String),
    Fail(JudgeError),
    /// Wait, then behave like the inner reply
    Delayed(Duration, Box<Reply>),
    /// Panic inside the judge task
    #[cfg(test)]
    Panic,
}

impl Reply {
    pub fn yes(explanation: &str) -> Self {
        Reply::Answer(format!("YES\n\n{explanation}"))
    }

    pub fn no(explanation: &str) -> Self {
        Reply::Answer(format!("NO\n\n{explanation}"))
    }

    pub fn raw(answer: impl Into<String>) -> Self {
        Reply::Answer(answer.into())
    }

    pub fn fail(error: JudgeError) -> Self {
        Reply::Fail(error)
    }

    pub fn after(delay: Duration, reply: Reply) -> Self {
        Reply::Delayed(delay, Box::new(reply))
    }
}

/// Deterministic judge backend.
#[derive(Debug)]
pub struct ScriptedBackend {
    script: Vec<(String, Reply)>,
    fallback: Reply,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    /// A judge that gives `reply` to every prompt.
    pub fn always(reply: Reply) -> Self {
        Self {
            script: Vec::new(),
            fallback: reply,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer prompts containing `needle` with `reply`.
    pub fn when(mut self, needle: impl Into<String>, reply: Reply) -> Self {
        self.script.push((needle.into(), reply));
        self
    }

    /// Prompts received so far, in arrival order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }

    fn reply_for(&self, prompt: &str) -> Reply {
        self.script
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::always(Reply::no("No issues found."))
    }
}

#[async_trait]
impl JudgeBackend for ScriptedBackend {
    async fn ask(&self, prompt: &str, _timeout: Duration) -> Result<String, JudgeError> {
        self.prompts.lock().push(prompt.to_string());

        let mut reply = self.reply_for(prompt);
        loop {
            match reply {
                Reply::Answer(answer) => return Ok(answer),
                Reply::Fail(error) => return Err(error),
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                #[cfg(test)]
                Reply::Panic => panic!("scripted judge panic"),
            }
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_matching_needle_wins() {
        let backend = ScriptedBackend::always(Reply::no("fallback"))
            .when("skip tests", Reply::yes("skipped"))
            .when("tests", Reply::no("never reached for skip tests"));

        let answer = backend
            .ask("Did the agent skip tests?", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(answer, "YES\n\nskipped");

        let answer = backend.ask("Unrelated", Duration::from_secs(1)).await.unwrap();
        assert_eq!(answer, "NO\n\nfallback");
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_identical_prompts_get_identical_answers() {
        let backend = ScriptedBackend::default().when("TODO", Reply::yes("found one"));
        let first = backend.ask("Any TODO left?", Duration::from_secs(1)).await;
        let second = backend.ask("Any TODO left?", Duration::from_secs(1)).await;
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_reply() {
        let backend =
            ScriptedBackend::always(Reply::after(Duration::from_secs(30), Reply::yes("late")));

        let started = tokio::time::Instant::now();
        let answer = backend.ask("prompt", Duration::from_secs(60)).await.unwrap();
        assert_eq!(answer, "YES\n\nlate");
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_panic_reply_stays_in_its_task() {
        let backend = std::sync::Arc::new(ScriptedBackend::default().when("Explodes", Reply::Panic));

        let task = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.ask("Explodes?", Duration::from_secs(1)).await })
        };
        assert!(task.await.unwrap_err().is_panic());

        let answer = backend.ask("Calm?", Duration::from_secs(1)).await.unwrap();
        assert_eq!(answer, "NO\n\nNo issues found.");
    }

    #[tokio::test]
    async fn test_failure_reply() {
        let backend =
            ScriptedBackend::always(Reply::fail(JudgeError::Unavailable("offline".to_string())));
        let err = backend.ask("prompt", Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, JudgeError::Unavailable("offline".to_string()));
    }
}

/*!
 * Mock provider implementations for testing.
 *
 * This module provides a mock provider that simulates different behaviors:
 * - `MockProvider::working()` - Answers every numbered line with a tagged translation
 * - `MockProvider::echo()` - Answers with the numbered lines unchanged
 * - `MockProvider::failing()` - Always fails with a server error
 * - `MockProvider::scripted(..)` - Delegates to a closure that sees the call index
 */

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::providers::{ChatRequest, Provider};

static NUMBERED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(\d+)\.\s(.*)$").expect("numbered line regex is valid")
});

/// Closure answering a request; receives the zero-based call index
pub type Responder = Arc<dyn Fn(&ChatRequest, usize) -> Result<String, ProviderError> + Send + Sync>;

/// Behavior mode for the mock provider
#[derive(Clone)]
pub enum MockBehavior {
    /// Prefix every numbered line with `[TRANSLATED]`
    Working,
    /// Return the numbered lines untouched
    Echo,
    /// Fail every Nth request with a 503
    Intermittent { fail_every: usize },
    /// Always fail with a 500
    Failing,
    /// Return an empty completion
    Empty,
    /// Sleep, then behave like `Working`
    Slow { delay_ms: u64 },
    /// Custom answer
    Scripted(Responder),
}

impl fmt::Debug for MockBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Working => write!(f, "Working"),
            Self::Echo => write!(f, "Echo"),
            Self::Intermittent { fail_every } => write!(f, "Intermittent({})", fail_every),
            Self::Failing => write!(f, "Failing"),
            Self::Empty => write!(f, "Empty"),
            Self::Slow { delay_ms } => write!(f, "Slow({}ms)", delay_ms),
            Self::Scripted(_) => write!(f, "Scripted"),
        }
    }
}

/// Mock provider for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter shared between clones
    request_count: Arc<AtomicUsize>,
    /// Every request received, in order
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn echo() -> Self {
        Self::new(MockBehavior::Echo)
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every: fail_every.max(1) })
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    pub fn scripted<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest, usize) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self::new(MockBehavior::Scripted(Arc::new(responder)))
    }

    /// Number of requests served so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Snapshot of the received requests
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    /// The `(number, text)` pairs of a numbered-list prompt
    pub fn numbered_lines(prompt: &str) -> Vec<(usize, String)> {
        NUMBERED_LINE
            .captures_iter(prompt)
            .filter_map(|caps| {
                let number = caps[1].parse().ok()?;
                Some((number, caps[2].to_string()))
            })
            .collect()
    }

    /// Answer every numbered line with `f(text)`
    pub fn answer_lines(prompt: &str, f: impl Fn(&str) -> String) -> String {
        Self::numbered_lines(prompt)
            .into_iter()
            .map(|(n, text)| format!("{}. {}", n, f(&text)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, request: ChatRequest) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        match &self.behavior {
            MockBehavior::Working => {
                Ok(Self::answer_lines(&request.user, |text| format!("[TRANSLATED] {}", text)))
            }
            MockBehavior::Echo => Ok(Self::answer_lines(&request.user, str::to_string)),
            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    Ok(Self::answer_lines(&request.user, |text| format!("[TRANSLATED] {}", text)))
                }
            }
            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),
            MockBehavior::Empty => Ok(String::new()),
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(*delay_ms)).await;
                Ok(Self::answer_lines(&request.user, |text| format!("[TRANSLATED] {}", text)))
            }
            MockBehavior::Scripted(responder) => responder(&request, count),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

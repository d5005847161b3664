use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Error carried by a reconcile outcome.
///
/// Holds every cause produced by the units that were merged into the outcome,
/// so a failing pass reports all failed partitions instead of the first one.
#[derive(Clone)]
pub struct ReconcileError {
    causes: Vec<Arc<anyhow::Error>>,
}

impl ReconcileError {
    pub fn new<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self {
            causes: vec![Arc::new(err.into())],
        }
    }

    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::from(anyhow::Error::msg(message))
    }

    /// number of distinct causes
    pub fn len(&self) -> usize {
        self.causes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    pub fn causes(&self) -> impl Iterator<Item = &anyhow::Error> {
        self.causes.iter().map(|cause| cause.as_ref())
    }

    /// check if any cause (or any error in its chain) renders the given text
    pub fn contains(&self, text: &str) -> bool {
        self.causes()
            .any(|cause| cause.chain().any(|err| err.to_string().contains(text)))
    }

    fn append(&mut self, other: ReconcileError) {
        self.causes.extend(other.causes);
    }
}

impl From<anyhow::Error> for ReconcileError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            causes: vec![Arc::new(err)],
        }
    }
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.causes.as_slice() {
            [] => write!(f, "unknown reconcile error"),
            [single] => write!(f, "{single:#}"),
            many => {
                write!(f, "{} errors occurred:", many.len())?;
                for cause in many {
                    write!(f, "\n\t* {cause:#}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.causes.iter().map(|cause| format!("{cause:#}")))
            .finish()
    }
}

impl std::error::Error for ReconcileError {}

/// two errors are the same if they render the same causes in the same order
impl PartialEq for ReconcileError {
    fn eq(&self, other: &Self) -> bool {
        self.causes.len() == other.causes.len()
            && self
                .causes
                .iter()
                .zip(other.causes.iter())
                .all(|(a, b)| a.to_string() == b.to_string())
    }
}

/// Outcome of a single reconcile step.
///
/// The default value continues with no error and no explicit requeue delay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    completed: bool,
    error: Option<ReconcileError>,
    delay: Duration,
}

impl ReconcileOutcome {
    /// non terminal, nothing else to report
    pub fn proceed() -> Self {
        Self::default()
    }

    /// terminal, this unit has nothing left to do in this pass
    pub fn done() -> Self {
        Self {
            completed: true,
            ..Default::default()
        }
    }

    pub fn continue_and_requeue(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn complete_and_requeue(delay: Duration) -> Self {
        Self {
            completed: true,
            delay,
            ..Default::default()
        }
    }

    pub fn continue_with_error<E>(err: E) -> Self
    where
        E: Into<ReconcileError>,
    {
        Self {
            error: Some(err.into()),
            ..Default::default()
        }
    }

    pub fn complete_with_error<E>(err: E) -> Self
    where
        E: Into<ReconcileError>,
    {
        Self {
            completed: true,
            error: Some(err.into()),
            ..Default::default()
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn error(&self) -> Option<&ReconcileError> {
        self.error.as_ref()
    }

    /// explicit requeue delay, zero if none
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Merge two outcomes.
    ///
    /// Terminal flags are or-ed, the smallest non zero delay wins and errors are
    /// accumulated. Once an error is present the delay is dropped, the error
    /// itself causes an immediate requeue.
    pub fn merge(self, other: Self) -> Self {
        let completed = self.completed || other.completed;

        let delay = match (self.delay.is_zero(), other.delay.is_zero()) {
            (true, _) => other.delay,
            (_, true) => self.delay,
            _ => self.delay.min(other.delay),
        };

        let error = match (self.error, other.error) {
            (None, None) => None,
            (Some(err), None) | (None, Some(err)) => Some(err),
            (Some(mut first), Some(second)) => {
                first.append(second);
                Some(first)
            }
        };

        let delay = if error.is_some() {
            Duration::ZERO
        } else {
            delay
        };

        Self {
            completed,
            error,
            delay,
        }
    }

    /// left fold of all outcomes, empty input yields the default outcome
    pub fn merge_all<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        outcomes
            .into_iter()
            .fold(Self::default(), |acc, outcome| acc.merge(outcome))
    }

    /// Convert into what the control loop acts on.
    ///
    /// `Ok(Some(delay))` requeues after `delay`, `Ok(None)` waits for the next
    /// external change, `Err` hands the failure to the caller's backoff.
    pub fn output(self) -> Result<Option<Duration>, ReconcileError> {
        match self.error {
            Some(err) => Err(err),
            None if self.delay.is_zero() => Ok(None),
            None => Ok(Some(self.delay)),
        }
    }
}

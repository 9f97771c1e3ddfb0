use crate::foundation::error::{SeqcardError, SeqcardResult};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long a finished operation stays queryable for final callbacks.
const COMPLETED_RETENTION: Duration = Duration::from_secs(1);

/// Lifecycle of one batch operation.
///
/// Forward-only through the working stages; `Error` and `Cancelled` are
/// reachable from any non-terminal stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStage {
    Initializing,
    Loading,
    Processing,
    Rendering,
    Exporting,
    Finalizing,
    Completed,
    Error,
    Cancelled,
}

impl ExportStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExportStage::Completed | ExportStage::Error | ExportStage::Cancelled
        )
    }

    fn order(self) -> Option<u8> {
        match self {
            ExportStage::Initializing => Some(0),
            ExportStage::Loading => Some(1),
            ExportStage::Processing => Some(2),
            ExportStage::Rendering => Some(3),
            ExportStage::Exporting => Some(4),
            ExportStage::Finalizing => Some(5),
            ExportStage::Completed => Some(6),
            ExportStage::Error | ExportStage::Cancelled => None,
        }
    }

    pub fn can_transition_to(self, next: ExportStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, ExportStage::Error | ExportStage::Cancelled) {
            return true;
        }
        match (self.order(), next.order()) {
            (Some(a), Some(b)) => b > a,
            _ => false,
        }
    }
}

/// Read-only snapshot handed to listeners. Only the owning tracker mutates
/// the underlying operation.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ProgressInfo {
    pub operation_id: String,
    pub current: usize,
    pub total: usize,
    pub percentage: f64,
    pub message: String,
    pub stage: ExportStage,
    pub error_count: usize,
    pub warning_count: usize,
    pub elapsed_ms: u64,
}

struct Operation {
    info: ProgressInfo,
    started: Instant,
    completed_at: Option<Instant>,
}

pub type ListenerId = u64;

/// One `Operation` per in-flight job, keyed by operation id, with a
/// subscribe/unsubscribe listener model.
#[derive(Default)]
pub struct ProgressTracker {
    operations: HashMap<String, Operation>,
    listeners: HashMap<ListenerId, Box<dyn Fn(&ProgressInfo) + Send>>,
    next_listener: ListenerId,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl Fn(&ProgressInfo) + Send + 'static) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.insert(id, Box::new(listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) {
        self.listeners.remove(&id);
    }

    pub fn start_operation(&mut self, operation_id: &str, total: usize) -> SeqcardResult<()> {
        self.prune();
        if self.operations.contains_key(operation_id) {
            return Err(SeqcardError::export(format!(
                "operation '{operation_id}' is already tracked"
            )));
        }
        let op = Operation {
            info: ProgressInfo {
                operation_id: operation_id.to_string(),
                current: 0,
                total,
                percentage: 0.0,
                message: String::new(),
                stage: ExportStage::Initializing,
                error_count: 0,
                warning_count: 0,
                elapsed_ms: 0,
            },
            started: Instant::now(),
            completed_at: None,
        };
        self.notify(&op.info);
        self.operations.insert(operation_id.to_string(), op);
        Ok(())
    }

    pub fn set_stage(&mut self, operation_id: &str, stage: ExportStage) -> SeqcardResult<()> {
        let op = self.operation_mut(operation_id)?;
        if !op.info.stage.can_transition_to(stage) {
            return Err(SeqcardError::export(format!(
                "invalid stage transition {:?} -> {stage:?}",
                op.info.stage
            )));
        }
        op.info.stage = stage;
        if stage.is_terminal() {
            op.completed_at = Some(Instant::now());
        }
        self.touch_and_notify(operation_id)
    }

    pub fn update_progress(
        &mut self,
        operation_id: &str,
        current: usize,
        message: &str,
    ) -> SeqcardResult<()> {
        let op = self.operation_mut(operation_id)?;
        op.info.current = current;
        op.info.message = message.to_string();
        op.info.percentage = if op.info.total == 0 {
            100.0
        } else {
            (current as f64 / op.info.total as f64 * 100.0).min(100.0)
        };
        self.touch_and_notify(operation_id)
    }

    pub fn add_error(&mut self, operation_id: &str, message: &str) -> SeqcardResult<()> {
        let op = self.operation_mut(operation_id)?;
        op.info.error_count += 1;
        op.info.message = message.to_string();
        self.touch_and_notify(operation_id)
    }

    pub fn add_warning(&mut self, operation_id: &str, message: &str) -> SeqcardResult<()> {
        let op = self.operation_mut(operation_id)?;
        op.info.warning_count += 1;
        op.info.message = message.to_string();
        self.touch_and_notify(operation_id)
    }

    /// Move the operation to a terminal stage. It stays queryable for about
    /// a second so late subscribers still receive the final snapshot.
    pub fn complete_operation(
        &mut self,
        operation_id: &str,
        stage: ExportStage,
    ) -> SeqcardResult<()> {
        if !stage.is_terminal() {
            return Err(SeqcardError::export(format!(
                "{stage:?} is not a terminal stage"
            )));
        }
        self.set_stage(operation_id, stage)
    }

    pub fn snapshot(&self, operation_id: &str) -> Option<ProgressInfo> {
        self.operations.get(operation_id).map(|op| op.info.clone())
    }

    pub fn active_operations(&self) -> usize {
        self.operations
            .values()
            .filter(|op| op.completed_at.is_none())
            .count()
    }

    /// Drop completed operations past the retention window.
    pub fn prune(&mut self) {
        self.operations.retain(|_, op| {
            op.completed_at
                .is_none_or(|done| done.elapsed() < COMPLETED_RETENTION)
        });
    }

    fn operation_mut(&mut self, operation_id: &str) -> SeqcardResult<&mut Operation> {
        self.operations
            .get_mut(operation_id)
            .ok_or_else(|| SeqcardError::export(format!("unknown operation '{operation_id}'")))
    }

    fn touch_and_notify(&mut self, operation_id: &str) -> SeqcardResult<()> {
        let info = {
            let op = self.operation_mut(operation_id)?;
            op.info.elapsed_ms = op.started.elapsed().as_millis() as u64;
            op.info.clone()
        };
        self.notify(&info);
        Ok(())
    }

    fn notify(&self, info: &ProgressInfo) {
        for listener in self.listeners.values() {
            listener(info);
        }
    }
}

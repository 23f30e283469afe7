/// Minimal snapshot pushed to the home-screen widget collaborator: the next
/// incomplete task in default order, or nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetSnapshot {
    pub task_id: i64,
    pub name: String,
    pub total_time: i64,
}

/// Post-commit refresh hook for the widget.
///
/// Fire-and-forget: implementations handle their own failures and must never
/// block a task mutation or feed back into the task record's invariants.
pub trait WidgetSink: Send {
    fn refresh(&self, next: Option<&WidgetSnapshot>);
}

/// Default sink for hosts without a widget surface
pub struct NoopWidget;

impl WidgetSink for NoopWidget {
    fn refresh(&self, _next: Option<&WidgetSnapshot>) {}
}

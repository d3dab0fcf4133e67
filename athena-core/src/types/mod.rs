pub mod event;
pub mod fact;
pub mod graph;
pub mod meta;
pub mod pattern;
pub mod procedure;
pub mod task;

pub use event::{Event, EventContext, EventDraft, EventFilter, EventType, Outcome};
pub use fact::{Confidence, Fact};
pub use graph::{Community, Edge, EdgeType, Entity, GraphPath};
pub use meta::{MetaRecord, MetricKind};
pub use pattern::{ConsolidationReport, Pattern, PatternKind};
pub use procedure::{Procedure, ProcedureDraft, ProcedureStep};
pub use task::{Task, TaskPriority, TaskStatus, Trigger, TriggerKind};

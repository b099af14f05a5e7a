pub mod ai;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod flow;
pub mod logger;
pub mod schema;
pub mod session;
pub mod testing;

pub use context::{ExecutionContext, Replier, ReplyReceipt, Sender, TenantInfo};
pub use engine::{ExecutionOutcome, ExecutionReport, FlowEngine};
pub use flow::{Edge, FlowData, FlowManager, Node, NodeKind};

pub mod orchestrator;
pub mod parser;
pub mod stage;

pub use self::orchestrator::{ Orchestrator, StageLimits, TurnObserver, TurnRequest, TurnUpdate };
pub use self::stage::{ GenerationError, StageClient };
